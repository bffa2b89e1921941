pub use crate::config::{ConfigBuilder, PoolKind, RunConfig};
pub use crate::error::{Error, Result};
pub use crate::process::{serve_if_worker, Registry, WorkerCommand};
pub use crate::routing::{Classify, ErrorRoutes, Failure, FailureClass, Outcome, TaskError};
pub use crate::runner::{ConcurrentRunner, RunReport};
pub use crate::task_fn::{Args, RemoteFn, RemoteTask, TaskFn};

pub use crate::telemetry::MetricsSnapshot;
