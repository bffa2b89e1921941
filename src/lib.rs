//! concurrent-runner - apply one function to every item of a collection,
//! concurrently, without letting a single bad item stop the run.
//!
//! Each item becomes one task on a thread pool or a process pool. Results come
//! back in the order tasks finish. A task that fails is classified (error
//! kind, panic, transfer failure, lost worker) and sent to the handler
//! registered for that class; the handler decides what value, if any, stands
//! in for it. Unrouted failures are logged through `tracing`.
//!
//! # Quick Start
//!
//! ```
//! use concurrent_runner::prelude::*;
//! use std::io;
//!
//! let runner = ConcurrentRunner::new(vec!["1", "2", "x"], |s: &str| {
//!     s.parse::<u32>()
//!         .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
//! })
//! .on_error(io::ErrorKind::InvalidData, |_| Some(0));
//!
//! let mut values: Vec<u32> = runner
//!     .run_threads(Some(4))
//!     .unwrap()
//!     .into_iter()
//!     .filter_map(Outcome::into_value)
//!     .collect();
//! values.sort();
//! assert_eq!(values, vec![0, 1, 2]);
//! ```
//!
//! # Features
//!
//! - **Thread pools**: work-stealing worker threads sharing the caller's data
//! - **Process pools**: named tasks run in re-executed worker processes
//! - **Failure routing**: one handler per failure class, plus a fallback
//! - **Telemetry**: per-run counts and latency percentiles (optional)

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod prelude;
pub mod process;
pub mod routing;
pub mod runner;
pub mod task_fn;
pub mod telemetry;
pub mod util;

pub use config::{ConfigBuilder, PoolKind, RunConfig};
pub use error::{Error, Result};
pub use executor::TaskHandle;
pub use pool::{Completion, ProcessPool, ThreadPool, WorkerPool};
pub use process::{serve_if_worker, Registry, WorkerCommand};
pub use routing::{Classify, ErrorRoutes, Failure, FailureClass, Outcome, TaskError};
pub use runner::{ConcurrentRunner, RunReport};
pub use task_fn::{Args, RemoteFn, RemoteTask, TaskFn};
