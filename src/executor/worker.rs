// worker thread loop
use super::task::Task;
use crate::util::Backoff;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as WorkerQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub type WorkerId = usize;

// stats for each worker
#[derive(Debug, Default)]
pub struct WorkerState {
    pub tasks_executed: AtomicU64,
    pub tasks_stolen: AtomicU64,
}

pub(crate) struct Worker {
    pub id: WorkerId,
    pub local_queue: WorkerQueue<Task>,
    pub state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            local_queue: WorkerQueue::new_fifo(),
            state: Arc::new(WorkerState::default()),
        }
    }

    // main loop; on shutdown keeps going until no work is left anywhere
    pub fn run(&self, stealers: Vec<Stealer<Task>>, injector: Arc<Injector<Task>>, shutdown: Arc<AtomicBool>) {
        let mut backoff = Backoff::new();

        loop {
            // local -> global -> steal
            if let Some(task) = self.find_task(&stealers, &injector) {
                backoff.reset();
                self.execute_task(task);
            } else if shutdown.load(Ordering::Acquire) {
                break;
            } else {
                backoff.snooze();
            }
        }

        tracing::trace!(
            worker = self.id,
            executed = self.state.tasks_executed.load(Ordering::Relaxed),
            stolen = self.state.tasks_stolen.load(Ordering::Relaxed),
            "worker exiting"
        );
    }

    fn find_task(&self, stealers: &[Stealer<Task>], injector: &Injector<Task>) -> Option<Task> {
        // 1. Check local queue first (best cache locality)
        if let Some(task) = self.local_queue.pop() {
            return Some(task);
        }

        // 2. Check global injector queue
        loop {
            match injector.steal_batch_and_pop(&self.local_queue) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }

        // 3. Steal from other workers
        self.try_steal_from_workers(stealers)
    }

    fn try_steal_from_workers(&self, stealers: &[Stealer<Task>]) -> Option<Task> {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        if stealers.len() <= 1 {
            return None;
        }

        let mut indices: Vec<usize> = (0..stealers.len()).collect();
        indices.shuffle(&mut thread_rng());

        for &idx in &indices {
            if idx == self.id {
                continue;
            }

            loop {
                match stealers[idx].steal_batch_and_pop(&self.local_queue) {
                    Steal::Success(task) => {
                        self.state.tasks_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(task);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    fn execute_task(&self, task: Task) {
        let handle = task.handle;
        let queued_for = task.spawn_time.elapsed();

        // task bodies capture their own panics; this guards the worker itself
        if super::panic_handler::catch_panic(|| task.execute()).is_err() {
            tracing::error!(task = %handle, worker = self.id, "task escaped panic capture");
        }

        tracing::trace!(task = %handle, worker = self.id, queued_us = queued_for.as_micros() as u64, "task executed");
        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }
}
