//! Backoff for idle worker loops.

use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

/// Spin, then yield, then park for a short while.
///
/// A parked worker is woken early by `Thread::unpark` when work is submitted.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 20;
    const PARK_TIMEOUT: Duration = Duration::from_micros(100);

    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Perform one step of backoff
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::park_timeout(Self::PARK_TIMEOUT);
        }

        self.step = self.step.saturating_add(1);
    }

    /// Whether the next snooze will park the thread.
    pub fn is_parking(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = Backoff::new();
        assert!(!backoff.is_parking());

        for _ in 0..=Backoff::YIELD_LIMIT {
            backoff.snooze();
        }

        assert!(backoff.is_parking());
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new();

        for _ in 0..30 {
            backoff.snooze();
        }
        assert!(backoff.is_parking());

        backoff.reset();
        assert!(!backoff.is_parking());
    }
}
