//! Worker pools as seen by the runner.
//!
//! A pool accepts one call per item, hands back a [`TaskHandle`], and later
//! reports each handle exactly once through [`WorkerPool::next_completed`] in
//! the order the tasks finish. Dropping the pool releases its workers.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::executor::{catch_panic, CpuPool, TaskHandle};
use crate::routing::TaskError;
use crate::task_fn::TaskFn;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use crate::process::ProcessPool;

/// One finished task.
#[derive(Debug)]
pub struct Completion<T, E> {
    pub handle: TaskHandle,
    pub result: std::result::Result<T, TaskError<E>>,
    /// Time spent running the task, excluding queueing.
    pub elapsed: Duration,
}

pub trait WorkerPool<F, I, A>
where
    F: TaskFn<I, A>,
{
    /// Queue `func(item, &args)`. Per-item problems (for example an item that
    /// cannot be encoded) are reported through the task's completion rather
    /// than here.
    fn submit(&mut self, func: &Arc<F>, item: I, args: &Arc<A>) -> TaskHandle;

    /// Block until some submitted task finishes.
    fn next_completed(&mut self) -> Result<Completion<F::Output, F::Error>>;

    fn workers(&self) -> usize;
}

/// Thread-backed pool.
///
/// Items, arguments and the function are shared with the workers, not
/// copied. A panicking task is reported as [`TaskError::Panicked`].
pub struct ThreadPool<T, E> {
    pool: CpuPool,
    completed_tx: Sender<Completion<T, E>>,
    completed_rx: Receiver<Completion<T, E>>,
}

impl<T, E> ThreadPool<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        let pool = CpuPool::new(config)?;
        let (completed_tx, completed_rx) = unbounded();

        Ok(Self {
            pool,
            completed_tx,
            completed_rx,
        })
    }

    /// Number of worker threads still alive.
    pub fn live_threads(&self) -> usize {
        self.pool.live_threads()
    }
}

impl<F, I, A> WorkerPool<F, I, A> for ThreadPool<F::Output, F::Error>
where
    F: TaskFn<I, A>,
    I: Send + 'static,
    A: Send + Sync + 'static,
{
    fn submit(&mut self, func: &Arc<F>, item: I, args: &Arc<A>) -> TaskHandle {
        let handle = TaskHandle::next();
        let func = Arc::clone(func);
        let args = Arc::clone(args);
        let completed_tx = self.completed_tx.clone();

        self.pool.execute(handle, move || {
            let start = Instant::now();
            let result = match catch_panic(|| func.call(item, &args)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(TaskError::Failed(err)),
                Err(panic) => Err(TaskError::Panicked(panic)),
            };

            // the receiver only goes away with the pool itself
            let _ = completed_tx.send(Completion {
                handle,
                result,
                elapsed: start.elapsed(),
            });
        });

        handle
    }

    fn next_completed(&mut self) -> Result<Completion<F::Output, F::Error>> {
        self.completed_rx
            .recv()
            .map_err(|_| Error::executor("thread pool completion channel closed"))
    }

    fn workers(&self) -> usize {
        self.pool.num_threads()
    }
}

impl<T, E> std::fmt::Debug for ThreadPool<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool").field("pool", &self.pool).finish()
    }
}
