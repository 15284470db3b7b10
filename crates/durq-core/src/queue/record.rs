//! Durable message record.

use chrono::{DateTime, Utc};

use super::MessageState;
use crate::domain::MessageId;

/// One row of the record store.
///
/// Created on enqueue, mutated by outcome reporting and recovery, deleted on
/// success. `created_at` orders reloads oldest-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: MessageId,
    /// Serialized payload.
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// Attempts so far.
    pub exec_count: u32,
    pub state: MessageState,
    /// Set on retry and dead transitions.
    pub finished_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// A freshly enqueued record: `InFlight`, no attempts yet.
    pub fn new(id: MessageId, content: Vec<u8>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            content,
            created_at,
            exec_count: 0,
            state: MessageState::InFlight,
            finished_at: None,
        }
    }

    /// Applies a point update in place. Returns `false` if nothing changed.
    pub fn apply(&mut self, update: &RecordUpdate) -> bool {
        let before = (self.state, self.exec_count, self.finished_at);
        self.state = update.state;
        if let Some(exec_count) = update.exec_count {
            self.exec_count = exec_count;
        }
        if let Some(finished_at) = update.finished_at {
            self.finished_at = Some(finished_at);
        }
        before != (self.state, self.exec_count, self.finished_at)
    }
}

/// Point update of a record's mutable fields.
///
/// `None` leaves the field as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordUpdate {
    pub state: MessageState,
    pub exec_count: Option<u32>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    /// Change only the state.
    pub fn state(state: MessageState) -> Self {
        Self {
            state,
            exec_count: None,
            finished_at: None,
        }
    }

    /// Outcome of a failed attempt.
    pub fn failure(state: MessageState, exec_count: u32, finished_at: DateTime<Utc>) -> Self {
        Self {
            state,
            exec_count: Some(exec_count),
            finished_at: Some(finished_at),
        }
    }
}
