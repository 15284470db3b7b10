//! Simple circuit breaker gates.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::ports::{BreakerStatus, CircuitBreaker};

/// Never trips. The default when no breaker is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysClosed;

impl CircuitBreaker for AlwaysClosed {
    fn status(&self) -> BreakerStatus {
        BreakerStatus::Closed
    }
}

/// Breaker whose status is set by its owner (an operator switch, or the
/// external breaker logic pushing its decisions in).
#[derive(Debug, Default)]
pub struct ManualBreaker {
    status: AtomicU8,
}

impl ManualBreaker {
    pub fn new(status: BreakerStatus) -> Self {
        let breaker = Self::default();
        breaker.set(status);
        breaker
    }

    pub fn set(&self, status: BreakerStatus) {
        let raw = match status {
            BreakerStatus::Closed => 0,
            BreakerStatus::Open => 1,
            BreakerStatus::HalfOpen => 2,
        };
        self.status.store(raw, Ordering::SeqCst);
    }

    pub fn open(&self) {
        self.set(BreakerStatus::Open);
    }

    pub fn close(&self) {
        self.set(BreakerStatus::Closed);
    }
}

impl CircuitBreaker for ManualBreaker {
    fn status(&self) -> BreakerStatus {
        match self.status.load(Ordering::SeqCst) {
            1 => BreakerStatus::Open,
            2 => BreakerStatus::HalfOpen,
            _ => BreakerStatus::Closed,
        }
    }
}
