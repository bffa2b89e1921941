use super::task::{Task, TaskHandle};
use super::worker::{Worker, WorkerId, WorkerState};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crossbeam_deque::{Injector, Stealer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Fixed-size work-stealing thread pool.
///
/// Tasks go to a global injector; idle workers pull batches from it and
/// steal from each other. Dropping the pool waits for queued tasks to finish
/// and joins every worker thread.
pub struct CpuPool {
    workers: Vec<WorkerHandle>,
    injector: Arc<Injector<Task>>,
    stealers: Vec<Stealer<Task>>,
    shutdown: Arc<AtomicBool>,
    num_threads: usize,
    next_wake: AtomicUsize,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
    unparker: thread::Thread,
    state: Arc<WorkerState>,
}

impl CpuPool {
    pub fn new(config: &RunConfig) -> Result<Self> {
        let num_threads = config.worker_count();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(num_threads);
        let mut stealers = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let worker = Worker::new(id);
            stealers.push(worker.local_queue.stealer());
            workers.push(worker);
        }

        let mut pool = Self {
            workers: Vec::with_capacity(num_threads),
            injector,
            stealers,
            shutdown,
            num_threads,
            next_wake: AtomicUsize::new(0),
        };

        for worker in workers {
            let id = worker.id;
            let state = worker.state.clone();
            let stealers_clone = pool.stealers.clone();
            let injector_clone = pool.injector.clone();
            let shutdown_clone = pool.shutdown.clone();
            let name = format!("{}-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            // already-started workers are joined by Drop when this bails out
            let thread = builder
                .spawn(move || worker.run(stealers_clone, injector_clone, shutdown_clone))
                .map_err(|e| Error::spawn(format!("worker thread {}: {}", id, e)))?;

            let unparker = thread.thread().clone();

            pool.workers.push(WorkerHandle {
                id,
                thread: Some(thread),
                unparker,
                state,
            });
        }

        tracing::debug!(threads = num_threads, "thread pool started");
        Ok(pool)
    }

    pub fn execute<F>(&self, handle: TaskHandle, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Task::new(handle, f));

        // Wake up a worker, round robin
        let next = self.next_wake.fetch_add(1, Ordering::Relaxed);
        if let Some(worker) = self.workers.get(next % self.workers.len().max(1)) {
            worker.unparker.unpark();
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Tasks run so far, summed over all workers.
    pub fn tasks_executed(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| w.state.tasks_executed.load(Ordering::Relaxed))
            .sum()
    }

    /// Number of worker threads that have not been joined yet.
    pub fn live_threads(&self) -> usize {
        self.workers.iter().filter(|w| w.thread.is_some()).count()
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        // wake everyone up to check shutdown flag
        for worker in &self.workers {
            worker.unparker.unpark();
        }

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::error!(worker = worker.id, "worker thread panicked");
                }
            }
        }
    }
}

impl Drop for CpuPool {
    fn drop(&mut self) {
        self.shutdown();
        tracing::debug!(executed = self.tasks_executed(), "thread pool stopped");
    }
}

impl std::fmt::Debug for CpuPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuPool")
            .field("num_threads", &self.num_threads)
            .field("live_threads", &self.live_threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn config(threads: usize) -> RunConfig {
        RunConfig::builder().max_workers(threads).build().unwrap()
    }

    #[test]
    fn test_executes_all_tasks() {
        let pool = CpuPool::new(&config(4)).unwrap();
        let (tx, rx) = unbounded();

        for i in 0..100 {
            let tx = tx.clone();
            pool.execute(TaskHandle::next(), move || {
                tx.send(i).unwrap();
            });
        }

        let mut seen: Vec<i32> = rx.iter().take(100).collect();
        seen.sort();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_shutdown_drains_queue_and_joins() {
        let mut pool = CpuPool::new(&config(2)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            pool.execute(TaskHandle::next(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.live_threads(), 0);
        assert_eq!(pool.tasks_executed(), 50);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = CpuPool::new(&config(1)).unwrap();
        let (tx, rx) = unbounded();

        pool.execute(TaskHandle::next(), || panic!("boom"));
        pool.execute(TaskHandle::next(), move || tx.send(1).unwrap());

        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(pool.num_threads(), 1);
    }
}
