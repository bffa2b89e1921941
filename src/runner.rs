//! The concurrent map itself.
//!
//! A [`ConcurrentRunner`] holds a collection, extra arguments, the function to
//! apply and the error routes. Each run acquires a fresh pool, submits one task
//! per item, then resolves results in the order they finish. The pool is
//! released when the run returns, whether it succeeded, failed or a handler
//! panicked.

use crate::config::{PoolKind, RunConfig};
use crate::error::Result;
use crate::pool::{ProcessPool, ThreadPool, WorkerPool};
use crate::process::WorkerCommand;
use crate::routing::{Classify, ErrorRoutes, Failure, Outcome};
use crate::task_fn::{ArgsFn, ItemFn, RemoteTask, TaskFn};
use crate::telemetry::{Metrics, MetricsSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type ErrorKind<F, I, A> = <<F as TaskFn<I, A>>::Error as Classify>::Kind;

/// Outcomes of one run plus what it cost.
#[derive(Debug, Clone)]
pub struct RunReport<T> {
    /// One entry per item, in completion order.
    pub outcomes: Vec<Outcome<T>>,
    pub metrics: MetricsSnapshot,
}

impl<T> RunReport<T> {
    /// Number of tasks whose function returned a value.
    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Every value produced, by the function or by a failure handler.
    pub fn into_values(self) -> Vec<T> {
        self.outcomes.into_iter().filter_map(Outcome::into_value).collect()
    }
}

/// Applies one function to every item of a collection on a worker pool.
///
/// ```
/// use concurrent_runner::{ConcurrentRunner, Outcome};
///
/// let runner = ConcurrentRunner::new(vec![1u64, 2, 3], |x| Ok::<_, std::io::Error>(x * 10));
/// let mut values: Vec<u64> = runner
///     .run_threads(Some(2))
///     .unwrap()
///     .into_iter()
///     .filter_map(Outcome::into_value)
///     .collect();
/// values.sort();
/// assert_eq!(values, vec![10, 20, 30]);
/// ```
pub struct ConcurrentRunner<C, A, F>
where
    C: IntoIterator,
    F: TaskFn<C::Item, A>,
    F::Error: Classify,
{
    items: C,
    args: Arc<A>,
    func: Arc<F>,
    routes: ErrorRoutes<C::Item, F::Output, F::Error>,
}

impl<C, T, E, G> ConcurrentRunner<C, (), ItemFn<G>>
where
    C: IntoIterator,
    G: Fn(C::Item) -> std::result::Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Classify + Send + 'static,
{
    /// Apply `f(item)` to every item.
    pub fn new(items: C, f: G) -> Self {
        Self::from_task(items, (), ItemFn(f))
    }
}

impl<C, A, T, E, G> ConcurrentRunner<C, A, ArgsFn<G>>
where
    C: IntoIterator,
    G: Fn(C::Item, &A) -> std::result::Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Classify + Send + 'static,
{
    /// Apply `f(item, &args)` to every item.
    ///
    /// Positional extras are a tuple, keyword extras a struct, and
    /// [`Args`](crate::task_fn::Args) carries both.
    pub fn with_args(items: C, args: A, f: G) -> Self {
        Self::from_task(items, args, ArgsFn(f))
    }
}

impl<C, A, F> ConcurrentRunner<C, A, F>
where
    C: IntoIterator,
    F: TaskFn<C::Item, A>,
    F::Error: Classify,
{
    /// Apply any [`TaskFn`], such as a [`RemoteFn`](crate::task_fn::RemoteFn)
    /// that can also run in worker processes.
    pub fn from_task(items: C, args: A, task: F) -> Self {
        Self {
            items,
            args: Arc::new(args),
            func: Arc::new(task),
            routes: ErrorRoutes::new(),
        }
    }

    /// Handle errors of `kind` returned by the function.
    pub fn on_error<H>(self, kind: ErrorKind<F, C::Item, A>, handler: H) -> Self
    where
        H: Fn(Failure<'_, C::Item, F::Error>) -> Option<F::Output> + Send + Sync + 'static,
    {
        Self {
            routes: self.routes.on(kind, handler),
            ..self
        }
    }

    pub fn on_panic<H>(self, handler: H) -> Self
    where
        H: Fn(Failure<'_, C::Item, F::Error>) -> Option<F::Output> + Send + Sync + 'static,
    {
        Self {
            routes: self.routes.on_panic(handler),
            ..self
        }
    }

    pub fn on_transfer_failure<H>(self, handler: H) -> Self
    where
        H: Fn(Failure<'_, C::Item, F::Error>) -> Option<F::Output> + Send + Sync + 'static,
    {
        Self {
            routes: self.routes.on_transfer_failure(handler),
            ..self
        }
    }

    pub fn on_worker_lost<H>(self, handler: H) -> Self
    where
        H: Fn(Failure<'_, C::Item, F::Error>) -> Option<F::Output> + Send + Sync + 'static,
    {
        Self {
            routes: self.routes.on_worker_lost(handler),
            ..self
        }
    }

    /// Handle every failure class without its own route.
    pub fn fallback<H>(self, handler: H) -> Self
    where
        H: Fn(Failure<'_, C::Item, F::Error>) -> Option<F::Output> + Send + Sync + 'static,
    {
        Self {
            routes: self.routes.fallback(handler),
            ..self
        }
    }

    /// Replace all routes at once.
    pub fn routes(self, routes: ErrorRoutes<C::Item, F::Output, F::Error>) -> Self {
        Self { routes, ..self }
    }

    pub fn error_routes(&self) -> &ErrorRoutes<C::Item, F::Output, F::Error> {
        &self.routes
    }
}

impl<C, A, F> ConcurrentRunner<C, A, F>
where
    C: IntoIterator + Clone,
    C::Item: Clone,
    F: TaskFn<C::Item, A>,
    F::Error: Classify,
{
    /// Run on a pool supplied by the caller. The pool is dropped before this
    /// returns.
    pub fn run_on<P>(&self, pool: P) -> Result<Vec<Outcome<F::Output>>>
    where
        P: WorkerPool<F, C::Item, A>,
    {
        self.drain(pool, &Metrics::new())
    }

    pub fn report_on<P>(&self, pool: P) -> Result<RunReport<F::Output>>
    where
        P: WorkerPool<F, C::Item, A>,
    {
        let metrics = Metrics::new();
        let outcomes = self.drain(pool, &metrics)?;
        Ok(RunReport {
            outcomes,
            metrics: metrics.snapshot(),
        })
    }

    fn drain<P>(&self, mut pool: P, metrics: &Metrics) -> Result<Vec<Outcome<F::Output>>>
    where
        P: WorkerPool<F, C::Item, A>,
    {
        let span = tracing::debug_span!("concurrent_run", workers = pool.workers());
        let _guard = span.enter();

        let mut pending = HashMap::new();
        for item in self.items.clone() {
            let handle = pool.submit(&self.func, item.clone(), &self.args);
            pending.insert(handle, item);
        }

        let submitted = pending.len();
        tracing::debug!(tasks = submitted, "submitted all items");

        let mut outcomes = Vec::with_capacity(submitted);
        while !pending.is_empty() {
            let completion = pool.next_completed()?;
            let Some(item) = pending.remove(&completion.handle) else {
                tracing::warn!(task = %completion.handle, "completion for a task this run did not submit");
                continue;
            };

            metrics.record_task(completion.elapsed, &completion.result);
            let failed = completion.result.is_err();

            let outcome = self.routes.resolve(completion.handle, &item, completion.result);
            if failed && outcome.value().is_some() {
                metrics.record_recovered();
            }
            outcomes.push(outcome);
        }

        tracing::debug!(
            tasks = submitted,
            succeeded = outcomes.iter().filter(|o| o.is_success()).count(),
            "run finished"
        );
        Ok(outcomes)
    }
}

impl<C, A, F> ConcurrentRunner<C, A, F>
where
    C: IntoIterator + Clone,
    C::Item: Clone + Send + 'static,
    A: Send + Sync + 'static,
    F: TaskFn<C::Item, A>,
    F::Error: Classify,
{
    /// Run on a thread pool of `max_workers` threads (default 10).
    ///
    /// `max_workers` must be in `1..=`[`MAX_WORKERS`](crate::config::MAX_WORKERS);
    /// anything else returns [`Error::Config`](crate::Error::Config) before a
    /// thread is started.
    pub fn run_threads(&self, max_workers: Option<usize>) -> Result<Vec<Outcome<F::Output>>> {
        self.run_on(ThreadPool::new(&thread_config(max_workers))?)
    }

    pub fn report_threads(&self, max_workers: Option<usize>) -> Result<RunReport<F::Output>> {
        self.report_on(ThreadPool::new(&thread_config(max_workers))?)
    }
}

impl<C, A, F> ConcurrentRunner<C, A, F>
where
    C: IntoIterator + Clone,
    C::Item: Clone + Send + Serialize + 'static,
    A: Send + Sync + Serialize + 'static,
    F: RemoteTask<C::Item, A>,
    F::Output: DeserializeOwned,
    F::Error: Classify + DeserializeOwned,
{
    /// Run in `max_workers` worker processes started from `worker`
    /// (default: one per core, less one for the caller).
    ///
    /// `max_workers` must be in `1..=`[`MAX_WORKERS`](crate::config::MAX_WORKERS);
    /// anything else returns [`Error::Config`](crate::Error::Config) before a
    /// process is spawned.
    pub fn run_processes(
        &self,
        max_workers: Option<usize>,
        worker: &WorkerCommand,
    ) -> Result<Vec<Outcome<F::Output>>> {
        let config = RunConfig {
            max_workers,
            worker_command: Some(worker.clone()),
            ..RunConfig::new(PoolKind::Process)
        };
        self.run(&config)
    }

    /// Run on the pool kind and size named by `config`.
    ///
    /// Available for [`RemoteTask`]s, which can run on either kind. Runners
    /// built from closures with [`new`](ConcurrentRunner::new) or
    /// [`with_args`](ConcurrentRunner::with_args) can only run on threads: use
    /// [`run_threads`](ConcurrentRunner::run_threads), or
    /// [`run_on`](ConcurrentRunner::run_on) with a
    /// [`ThreadPool`](crate::pool::ThreadPool) built from a `RunConfig`.
    pub fn run(&self, config: &RunConfig) -> Result<Vec<Outcome<F::Output>>> {
        match config.pool_kind {
            PoolKind::Thread => self.run_on(ThreadPool::new(config)?),
            PoolKind::Process => self.run_on(ProcessPool::new(config)?),
        }
    }

    pub fn report(&self, config: &RunConfig) -> Result<RunReport<F::Output>> {
        match config.pool_kind {
            PoolKind::Thread => self.report_on(ThreadPool::new(config)?),
            PoolKind::Process => self.report_on(ProcessPool::new(config)?),
        }
    }
}

fn thread_config(max_workers: Option<usize>) -> RunConfig {
    RunConfig {
        max_workers,
        ..RunConfig::new(PoolKind::Thread)
    }
}

impl<C, A, F> fmt::Debug for ConcurrentRunner<C, A, F>
where
    C: IntoIterator,
    F: TaskFn<C::Item, A> + fmt::Debug,
    F::Error: Classify,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentRunner")
            .field("func", &self.func)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}
