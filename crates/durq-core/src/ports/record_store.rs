//! RecordStore port - durable keyed storage for message records.
//!
//! The store is the source of truth across restarts. Implementations must
//! persist before acknowledging `insert` and `update`; the queue treats an `Ok`
//! as "this survives a crash".
//!
//! # Implementations
//! - `SqliteRecordStore`: relational table, one row per record
//! - `InMemoryRecordStore`: development and tests

use async_trait::async_trait;

use crate::domain::MessageId;
use crate::queue::{MessageRecord, MessageState, RecordUpdate};

/// Infrastructure failures. Storage never fails with a domain error; a missing
/// record is `Ok(None)` / `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("record store backend error: {0}")]
    Backend(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Keyed record storage.
///
/// Every method is a short, self-contained operation over one record or one
/// bounded scan; no cross-record transactions are required. Implementations
/// must be safe to call concurrently.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Stores a new record. The id is fresh; a duplicate is a backend error.
    async fn insert(&self, record: &MessageRecord) -> StoreResult<()>;

    /// Point read.
    async fn get(&self, id: MessageId) -> StoreResult<Option<MessageRecord>>;

    /// Point delete. Returns whether a record was removed.
    async fn delete(&self, id: MessageId) -> StoreResult<bool>;

    /// Point update of the mutable fields. Returns whether the record exists.
    async fn update(&self, id: MessageId, update: RecordUpdate) -> StoreResult<bool>;

    /// Moves one record to `to` if its current state is one of `from`, as a
    /// single atomic step. Returns whether it moved; a missing record did not.
    async fn transition_if(
        &self,
        id: MessageId,
        from: &[MessageState],
        to: MessageState,
    ) -> StoreResult<bool>;

    /// Moves every record in `from` to `to`. Returns the number moved.
    async fn transition_all(&self, from: MessageState, to: MessageState) -> StoreResult<u64>;

    /// Ids whose state is one of `states`, oldest `created_at` first (ties
    /// broken by id), at most `limit` entries.
    async fn scan_ids(&self, states: &[MessageState], limit: usize)
    -> StoreResult<Vec<MessageId>>;
}
