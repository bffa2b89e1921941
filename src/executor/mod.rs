//! Task execution infrastructure.
//!
//! This module provides the thread-side primitives: task handles, panic
//! capture, the worker loop and the work-stealing CPU pool that backs
//! [`ThreadPool`](crate::pool::ThreadPool).

pub mod cpu_pool;
pub mod panic_handler;
pub mod task;
pub mod worker;

pub use cpu_pool::CpuPool;
pub use panic_handler::{catch_panic, PanicInfo};
pub use task::TaskHandle;

pub(crate) use task::Task;
