//! InMemoryRecordStore - record store for development and tests.
//!
//! Not durable across processes, but durable across queue instances: a test
//! "restarts" by building a fresh queue over the same store handle.
//!
//! `set_unavailable(true)` makes every trait call fail with
//! `StoreError::Unavailable`, which is how tests exercise the error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::MessageId;
use crate::ports::{RecordStore, StoreError, StoreResult};
use crate::queue::{MessageRecord, MessageState, RecordUpdate};

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<MessageId, MessageRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (or end one).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored records, regardless of outage simulation.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records, oldest first.
    pub fn snapshot(&self) -> Vec<MessageRecord> {
        let mut records: Vec<MessageRecord> = self
            .records
            .lock()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        records
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<MessageId, MessageRecord>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        self.records
            .lock()
            .map_err(|e| StoreError::Backend(format!("poisoned lock: {e}")))
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: &MessageRecord) -> StoreResult<()> {
        let mut records = self.lock()?;
        if records.contains_key(&record.id) {
            return Err(StoreError::Backend(format!("duplicate id {}", record.id)));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: MessageId) -> StoreResult<Option<MessageRecord>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn delete(&self, id: MessageId) -> StoreResult<bool> {
        Ok(self.lock()?.remove(&id).is_some())
    }

    async fn update(&self, id: MessageId, update: RecordUpdate) -> StoreResult<bool> {
        let mut records = self.lock()?;
        match records.get_mut(&id) {
            Some(record) => {
                record.apply(&update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transition_if(
        &self,
        id: MessageId,
        from: &[MessageState],
        to: MessageState,
    ) -> StoreResult<bool> {
        let mut records = self.lock()?;
        match records.get_mut(&id) {
            Some(record) if from.contains(&record.state) => {
                record.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_all(&self, from: MessageState, to: MessageState) -> StoreResult<u64> {
        let mut records = self.lock()?;
        let mut moved = 0;
        for record in records.values_mut().filter(|r| r.state == from) {
            record.state = to;
            moved += 1;
        }
        Ok(moved)
    }

    async fn scan_ids(
        &self,
        states: &[MessageState],
        limit: usize,
    ) -> StoreResult<Vec<MessageId>> {
        let records = self.lock()?;
        let mut matching: Vec<&MessageRecord> = records
            .values()
            .filter(|r| states.contains(&r.state))
            .collect();
        matching.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(matching.into_iter().take(limit).map(|r| r.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ulid::Ulid;

    fn record_at(minute: i64, state: MessageState) -> MessageRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut record = MessageRecord::new(
            MessageId::from_ulid(Ulid::new()),
            minute.to_string().into_bytes(),
            base + Duration::minutes(minute),
        );
        record.state = state;
        record
    }

    #[tokio::test]
    async fn scan_orders_by_creation_and_filters_states() {
        let store = InMemoryRecordStore::new();
        let late = record_at(10, MessageState::Pending);
        let early = record_at(1, MessageState::RetryEligible);
        let middle_dead = record_at(5, MessageState::Dead);
        let middle_in_flight = record_at(6, MessageState::InFlight);
        for r in [&late, &early, &middle_dead, &middle_in_flight] {
            store.insert(r).await.unwrap();
        }

        let ids = store.scan_ids(&MessageState::RECOVERABLE, 10).await.unwrap();
        assert_eq!(ids, vec![early.id, late.id]);

        let ids = store.scan_ids(&MessageState::RECOVERABLE, 1).await.unwrap();
        assert_eq!(ids, vec![early.id]);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryRecordStore::new();
        let r = record_at(0, MessageState::InFlight);
        store.insert(&r).await.unwrap();
        assert!(store.insert(&r).await.is_err());
    }

    #[tokio::test]
    async fn transition_all_only_touches_matching_state() {
        let store = InMemoryRecordStore::new();
        let a = record_at(0, MessageState::InFlight);
        let b = record_at(1, MessageState::InFlight);
        let c = record_at(2, MessageState::Dead);
        for r in [&a, &b, &c] {
            store.insert(r).await.unwrap();
        }

        let moved = store
            .transition_all(MessageState::InFlight, MessageState::Pending)
            .await
            .unwrap();
        assert_eq!(moved, 2);
        assert_eq!(store.get(c.id).await.unwrap().unwrap().state, MessageState::Dead);
    }

    #[tokio::test]
    async fn transition_if_checks_current_state() {
        let store = InMemoryRecordStore::new();
        let r = record_at(0, MessageState::Pending);
        store.insert(&r).await.unwrap();

        let recoverable = MessageState::RECOVERABLE;
        assert!(store.transition_if(r.id, &recoverable, MessageState::InFlight).await.unwrap());
        assert!(!store.transition_if(r.id, &recoverable, MessageState::InFlight).await.unwrap());
        assert_eq!(store.get(r.id).await.unwrap().unwrap().state, MessageState::InFlight);

        let missing = MessageId::from_ulid(Ulid::new());
        assert!(
            !store
                .transition_if(missing, &MessageState::RECOVERABLE, MessageState::Dead)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_records() {
        let store = InMemoryRecordStore::new();
        let id = MessageId::from_ulid(Ulid::new());

        assert!(!store.update(id, RecordUpdate::state(MessageState::Dead)).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let store = InMemoryRecordStore::new();
        let r = record_at(0, MessageState::InFlight);
        store.insert(&r).await.unwrap();

        store.set_unavailable(true);
        assert!(matches!(store.get(r.id).await, Err(StoreError::Unavailable(_))));
        assert!(store.scan_ids(&MessageState::RECOVERABLE, 1).await.is_err());
        assert_eq!(store.len(), 1);

        store.set_unavailable(false);
        assert!(store.get(r.id).await.unwrap().is_some());
    }
}
