//! Telemetry for runs.
//!
//! Counts outcomes per failure class and keeps a latency histogram of task
//! run times. Without the `telemetry` feature the same API records nothing.

#[cfg(feature = "telemetry")]
pub mod metrics;

#[cfg(feature = "telemetry")]
pub use metrics::{Metrics, MetricsSnapshot};

// Stub implementations when telemetry is disabled
#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use crate::routing::TaskError;
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self {
            Self
        }
        pub fn record_task<T, E>(&self, _: Duration, _: &Result<T, TaskError<E>>) {}
        pub fn record_recovered(&self) {}
        pub fn snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
    }

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
}

#[cfg(not(feature = "telemetry"))]
pub use metrics::{Metrics, MetricsSnapshot};
