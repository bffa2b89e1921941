//! Task representation and execution.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global task handle counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for one submitted task.
///
/// Handles are unique for the lifetime of the process, so two submissions of
/// equal items are still tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub(crate) fn next() -> Self {
        TaskHandle(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric id, also used as the request id on the process wire.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Internal task representation
pub(crate) struct Task {
    pub(crate) handle: TaskHandle,
    pub(crate) func: Box<dyn FnOnce() + Send + 'static>,
    pub(crate) spawn_time: Instant,
}

impl Task {
    pub fn new<F>(handle: TaskHandle, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            handle,
            func: Box::new(f),
            spawn_time: Instant::now(),
        }
    }

    /// Execute the task
    pub fn execute(self) {
        (self.func)();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("handle", &self.handle)
            .field("spawn_time", &self.spawn_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let a = TaskHandle::next();
        let b = TaskHandle::next();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_handle_display() {
        let handle = TaskHandle(7);
        assert_eq!(handle.to_string(), "task-7");
    }
}
