//! Durable message state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a durable message record.
///
/// State transitions:
/// - (insert) -> InFlight -> (deleted on success)
/// - InFlight -> RetryEligible -> InFlight (reload, until attempts run out)
/// - InFlight -> Dead (attempts exhausted)
/// - InFlight -> Pending (process restart) -> InFlight (reload)
/// - Pending | RetryEligible -> Dead (reload finds attempts already exhausted)
///
/// The discriminants are the stored representation and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageState {
    /// Durable, not held in memory.
    Pending = 0,

    /// Admitted to memory; being delivered or processed. Only trustworthy while
    /// the owning process is alive.
    InFlight = 1,

    /// Failed with attempts remaining; the next reload picks it up.
    RetryEligible = 2,

    /// Failed with attempts exhausted. Kept for inspection.
    Dead = 3,
}

impl MessageState {
    /// States a reload pass may admit into memory.
    pub const RECOVERABLE: [MessageState; 2] = [MessageState::Pending, MessageState::RetryEligible];

    pub fn is_recoverable(self) -> bool {
        matches!(self, MessageState::Pending | MessageState::RetryEligible)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MessageState::Dead)
    }

    pub fn as_i64(self) -> i64 {
        self as u8 as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(MessageState::Pending),
            1 => Some(MessageState::InFlight),
            2 => Some(MessageState::RetryEligible),
            3 => Some(MessageState::Dead),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MessageState::Pending, 0)]
    #[case(MessageState::InFlight, 1)]
    #[case(MessageState::RetryEligible, 2)]
    #[case(MessageState::Dead, 3)]
    fn stored_representation_is_stable(#[case] state: MessageState, #[case] raw: i64) {
        assert_eq!(state.as_i64(), raw);
        assert_eq!(MessageState::from_i64(raw), Some(state));
    }

    #[test]
    fn unknown_raw_state_is_rejected() {
        assert_eq!(MessageState::from_i64(4), None);
        assert_eq!(MessageState::from_i64(-1), None);
    }

    #[rstest]
    #[case(MessageState::Pending, true)]
    #[case(MessageState::InFlight, false)]
    #[case(MessageState::RetryEligible, true)]
    #[case(MessageState::Dead, false)]
    fn recoverable_states(#[case] state: MessageState, #[case] expected: bool) {
        assert_eq!(state.is_recoverable(), expected);
        assert_eq!(MessageState::RECOVERABLE.contains(&state), expected);
    }
}
