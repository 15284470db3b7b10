//! Circuit breaker gate port.
//!
//! The breaker's decision logic lives outside the queue. The queue only asks
//! whether new enqueues are currently allowed; it never trips or resets it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerStatus {
    Closed,
    /// Reject new enqueues.
    Open,
    /// Probing; enqueues are allowed.
    HalfOpen,
}

impl BreakerStatus {
    pub fn allows_enqueue(self) -> bool {
        !matches!(self, BreakerStatus::Open)
    }
}

/// Read-only view of a circuit breaker.
pub trait CircuitBreaker: Send + Sync {
    fn status(&self) -> BreakerStatus;
}
