//! Metrics collection for a single run.

use crate::routing::TaskError;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Run metrics collector
#[derive(Debug)]
pub struct Metrics {
    // Task counters
    tasks_succeeded: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_panicked: AtomicU64,
    tasks_transfer_failed: AtomicU64,
    tasks_lost: AtomicU64,
    tasks_recovered: AtomicU64,

    busy_time_ns: AtomicU64,

    // Latency histogram (protected by RwLock for interior mutability)
    latency_histogram: RwLock<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        // 3 significant figures, max value of 1 hour in nanoseconds
        let histogram = Histogram::new_with_max(3_600_000_000_000, 3)
            .expect("histogram bounds are valid constants");

        Self {
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            tasks_transfer_failed: AtomicU64::new(0),
            tasks_lost: AtomicU64::new(0),
            tasks_recovered: AtomicU64::new(0),
            busy_time_ns: AtomicU64::new(0),
            latency_histogram: RwLock::new(histogram),
            start_time: Instant::now(),
        }
    }

    /// Record one completed task and how long it ran
    pub fn record_task<T, E>(&self, elapsed: Duration, result: &Result<T, TaskError<E>>) {
        let counter = match result {
            Ok(_) => &self.tasks_succeeded,
            Err(TaskError::Failed(_)) => &self.tasks_failed,
            Err(TaskError::Panicked(_)) => &self.tasks_panicked,
            Err(TaskError::Transfer(_)) => &self.tasks_transfer_failed,
            Err(TaskError::WorkerLost(_)) => &self.tasks_lost,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        self.busy_time_ns.fetch_add(nanos, Ordering::Relaxed);

        // saturate instead of dropping out-of-range samples
        self.latency_histogram.write().saturating_record(nanos);
    }

    /// Record a failed task whose handler still produced a value
    pub fn record_recovered(&self) {
        self.tasks_recovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.latency_histogram.read();

        let tasks_succeeded = self.tasks_succeeded.load(Ordering::Relaxed);
        let tasks_failed = self.tasks_failed.load(Ordering::Relaxed);
        let tasks_panicked = self.tasks_panicked.load(Ordering::Relaxed);
        let tasks_transfer_failed = self.tasks_transfer_failed.load(Ordering::Relaxed);
        let tasks_lost = self.tasks_lost.load(Ordering::Relaxed);

        MetricsSnapshot {
            wall_time: self.start_time.elapsed(),
            tasks_completed: tasks_succeeded
                + tasks_failed
                + tasks_panicked
                + tasks_transfer_failed
                + tasks_lost,
            tasks_succeeded,
            tasks_failed,
            tasks_panicked,
            tasks_transfer_failed,
            tasks_lost,
            tasks_recovered: self.tasks_recovered.load(Ordering::Relaxed),
            busy_time_ns: self.busy_time_ns.load(Ordering::Relaxed),
            avg_latency_ns: if histogram.len() > 0 {
                histogram.mean() as u64
            } else {
                0
            },
            p50_latency_ns: histogram.value_at_quantile(0.50),
            p95_latency_ns: histogram.value_at_quantile(0.95),
            p99_latency_ns: histogram.value_at_quantile(0.99),
            max_latency_ns: histogram.max(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub wall_time: Duration,
    pub tasks_completed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_panicked: u64,
    pub tasks_transfer_failed: u64,
    pub tasks_lost: u64,
    pub tasks_recovered: u64,
    pub busy_time_ns: u64,
    pub avg_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p95_latency_ns: u64,
    pub p99_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl MetricsSnapshot {
    /// Fraction of tasks that returned a value on their own (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.tasks_completed == 0 {
            return 0.0;
        }
        self.tasks_succeeded as f64 / self.tasks_completed as f64
    }

    /// Calculate tasks per second
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.wall_time.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.tasks_completed as f64 / seconds
    }
}
