//! Retry policy: decides what a failed attempt turns into.

use super::MessageState;

/// Retry-by-count policy.
///
/// There is no backoff delay: a `RetryEligible` record is eligible for the very
/// next reload pass. Rate limiting belongs above the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed before a record goes `Dead`.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Next `(exec_count, state)` after a failed attempt.
    ///
    /// `new_exec_count = exec_count + 1`; `Dead` once it reaches
    /// `max_attempts`, `RetryEligible` otherwise.
    pub fn next(&self, exec_count: u32) -> (u32, MessageState) {
        let exec_count = exec_count.saturating_add(1);
        let state = if exec_count >= self.max_attempts {
            MessageState::Dead
        } else {
            MessageState::RetryEligible
        };
        (exec_count, state)
    }

    /// Whether a record with this many attempts may still be delivered.
    pub fn is_exhausted(&self, exec_count: u32) -> bool {
        exec_count >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}
