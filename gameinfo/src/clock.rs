//! Monotonic timestamps readable without a lock

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Seconds elapsed since a cache was created.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// An `f64` seconds value stored as its bit pattern.
///
/// Zero means "never".
#[derive(Debug, Default)]
pub(crate) struct AtomicSeconds(AtomicU64);

impl AtomicSeconds {
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, seconds: f64) {
        self.0.store(seconds.to_bits(), Ordering::Release);
    }
}
