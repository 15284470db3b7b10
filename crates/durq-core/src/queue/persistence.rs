//! Persistence coordinator: message lifecycle events as record mutations.
//!
//! This layer knows nothing about the in-memory queue. It turns "enqueued",
//! "succeeded", "failed", "reloaded" into store calls, and serialises
//! read-modify-write sequences per id through a small set of lock stripes.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::{MessageRecord, MessageState, RecordUpdate, RetryPolicy};
use crate::domain::{DurqError, MessageId, Result};
use crate::ports::{Clock, IdGenerator, RecordStore, StoreResult};

const LOCK_STRIPES: usize = 16;

/// A record fetched for reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRecord {
    pub content: Vec<u8>,
    pub exec_count: u32,
    pub state: MessageState,
}

pub struct PersistenceCoordinator {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    retry: RetryPolicy,
    stripes: Vec<Mutex<()>>,
}

impl PersistenceCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            retry,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn stripe(&self, id: MessageId) -> &Mutex<()> {
        let index = (id.as_ulid().0 % LOCK_STRIPES as u128) as usize;
        &self.stripes[index]
    }

    /// Stores a new `InFlight` record with a fresh id.
    ///
    /// On error the message is not durably recorded and must not be admitted.
    pub async fn insert_new(&self, content: Vec<u8>) -> StoreResult<MessageId> {
        let id = self.ids.generate_message_id();
        let record = MessageRecord::new(id, content, self.clock.now());
        self.store.insert(&record).await?;
        debug!(msg_id = %id, "message recorded");
        Ok(id)
    }

    /// Removes a successfully processed record.
    ///
    /// Failures are logged and absorbed: the message is logically complete, so
    /// a lost delete only leaves an orphaned row behind.
    pub async fn delete(&self, id: MessageId) {
        let _guard = self.stripe(id).lock().await;
        match self.store.delete(id).await {
            Ok(true) => debug!(msg_id = %id, "message record deleted"),
            Ok(false) => warn!(msg_id = %id, "delete of missing message record"),
            Err(e) => error!(msg_id = %id, error = %e, "failed to delete message record"),
        }
    }

    /// Records a failed attempt and returns the record's new state.
    pub async fn mark_failed(&self, id: MessageId) -> Result<MessageState> {
        let _guard = self.stripe(id).lock().await;
        let record = self
            .store
            .get(id)
            .await?
            .ok_or(DurqError::RecordNotFound(id))?;

        if record.state != MessageState::InFlight {
            warn!(msg_id = %id, state = ?record.state, "failure reported for message not in flight");
        }

        let (exec_count, state) = self.retry.next(record.exec_count);
        let update = RecordUpdate::failure(state, exec_count, self.clock.now());
        if !self.store.update(id, update).await? {
            return Err(DurqError::RecordNotFound(id));
        }

        debug!(msg_id = %id, exec_count, ?state, "message failure recorded");
        Ok(state)
    }

    /// Moves every `InFlight` record back to `Pending`.
    ///
    /// Run once at startup, before any reload: whatever was in memory when the
    /// process last stopped is gone, the durable copy is what counts.
    pub async fn reset_interrupted(&self) -> StoreResult<u64> {
        self.store
            .transition_all(MessageState::InFlight, MessageState::Pending)
            .await
    }

    /// Recoverable ids (`Pending`, `RetryEligible`), oldest first.
    pub async fn list_recoverable_ids(&self, limit: usize) -> StoreResult<Vec<MessageId>> {
        self.store.scan_ids(&MessageState::RECOVERABLE, limit).await
    }

    /// Fetches a record for reload.
    ///
    /// Fails with `RecordNotFound` if the record vanished and `NotRecoverable`
    /// if it is no longer `Pending`/`RetryEligible`.
    pub async fn load(&self, id: MessageId) -> Result<LoadedRecord> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or(DurqError::RecordNotFound(id))?;

        if !record.state.is_recoverable() {
            return Err(DurqError::NotRecoverable(id, record.state));
        }

        Ok(LoadedRecord {
            content: record.content,
            exec_count: record.exec_count,
            state: record.state,
        })
    }

    /// Claims a recoverable record for the in-memory queue.
    ///
    /// `false` means another reload pass (or a removal) got there first and
    /// the caller must not admit it.
    pub async fn mark_loaded_in_flight(&self, id: MessageId) -> Result<bool> {
        self.claim(id, MessageState::InFlight).await
    }

    /// Buries a recoverable record whose attempts are exhausted. `false` if it
    /// is no longer recoverable.
    pub async fn mark_dead(&self, id: MessageId) -> Result<bool> {
        self.claim(id, MessageState::Dead).await
    }

    async fn claim(&self, id: MessageId, to: MessageState) -> Result<bool> {
        let _guard = self.stripe(id).lock().await;
        let moved = self
            .store
            .transition_if(id, &MessageState::RECOVERABLE, to)
            .await?;
        if moved {
            debug!(msg_id = %id, state = ?to, "message state changed");
        }
        Ok(moved)
    }
}
