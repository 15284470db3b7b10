//! Durable bounded queue.
//!
//! One monitor (a mutex over the ready list plus a wake signal) is the single
//! synchronisation point between producers and consumers.
//!
//! # Admission
//! Durable I/O never happens while the monitor is held. A producer first
//! *reserves* a slot under the monitor (breaker and capacity are checked here),
//! then writes the record, then *publishes* the wrapper. Reserved slots count
//! against `max_size`, so `size() <= max_size` at every observable point, and a
//! failed or cancelled write just releases the slot: nothing becomes visible to
//! `dequeue` unless its record is already durable.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, warn};

use super::PersistenceCoordinator;
use crate::domain::{DurqError, MessageId, MessageWrapper};
use crate::ports::{BreakerStatus, CircuitBreaker, StoreError};
use crate::typed::{CodecError, PayloadCodec};

/// Why an admission was turned away. Expected conditions, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("queue is at capacity")]
    CapacityExceeded,

    #[error("circuit breaker is open")]
    BreakerOpen,
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("enqueue rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Serialization(#[from] CodecError),
}

/// Failure of the recovery admission path.
#[derive(Debug, thiserror::Error)]
pub(crate) enum AdmitError {
    #[error("admission rejected: {0}")]
    Rejected(#[from] Rejection),

    /// Another reload pass claimed the record first.
    #[error("message already claimed")]
    Taken,

    #[error(transparent)]
    Failed(#[from] DurqError),
}

struct QueueState<M> {
    ready: VecDeque<MessageWrapper<M>>,
    /// Slots promised to producers whose durable write is still running.
    reserved: usize,
}

pub struct DurableQueue<M> {
    state: Mutex<QueueState<M>>,
    notify: Notify,
    max_size: usize,
    breaker: Arc<dyn CircuitBreaker>,
    codec: Arc<dyn PayloadCodec<M>>,
    persistence: Arc<PersistenceCoordinator>,
}

impl<M: Send + 'static> DurableQueue<M> {
    pub fn new(
        max_size: usize,
        persistence: Arc<PersistenceCoordinator>,
        codec: Arc<dyn PayloadCodec<M>>,
        breaker: Arc<dyn CircuitBreaker>,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::with_capacity(max_size),
                reserved: 0,
            }),
            notify: Notify::new(),
            max_size,
            breaker,
            codec,
            persistence,
        }
    }

    // Critical sections never panic mid-update, so a poisoned lock still holds
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_reserve(&self) -> Result<Slot<'_, M>, Rejection> {
        if !self.breaker.status().allows_enqueue() {
            return Err(Rejection::BreakerOpen);
        }
        let mut state = self.lock();
        if state.ready.len() + state.reserved >= self.max_size {
            return Err(Rejection::CapacityExceeded);
        }
        state.reserved += 1;
        Ok(Slot {
            queue: self,
            armed: true,
        })
    }

    /// Durably records `message` and makes it available to consumers.
    ///
    /// Returns `false` without any side effect when the breaker is open or the
    /// queue is full, and `false` with nothing admitted when the payload cannot
    /// be encoded or the record cannot be written. Never waits for capacity.
    pub async fn enqueue(&self, message: M) -> bool {
        self.try_enqueue(message).await.is_ok()
    }

    /// [`enqueue`](Self::enqueue) with the reason for a refusal.
    pub async fn try_enqueue(&self, message: M) -> Result<MessageId, EnqueueError> {
        let slot = match self.try_reserve() {
            Ok(slot) => slot,
            Err(rejection) => {
                warn!(%rejection, size = self.size(), max_size = self.max_size, "message not enqueued");
                return Err(rejection.into());
            }
        };

        let content = self.codec.encode(&message).map_err(|e| {
            error!(error = %e, "failed to encode message");
            e
        })?;

        let id = self.persistence.insert_new(content).await.map_err(|e| {
            error!(error = %e, "failed to record message; not enqueued");
            e
        })?;

        slot.publish(MessageWrapper::new(message, id));
        debug!(msg_id = %id, "message enqueued");
        Ok(id)
    }

    /// Admits a message that is already durably recorded (recovery path).
    ///
    /// Same breaker and capacity gates as `enqueue`, but instead of inserting
    /// it claims the existing record (recoverable -> `InFlight`, atomically).
    /// The claim lands before the message becomes visible, so a consumer's
    /// outcome can never be overwritten by it, and only one pass can win it.
    /// On any failure the record keeps its state.
    pub(crate) async fn admit_recovered(
        &self,
        id: MessageId,
        content: &[u8],
    ) -> Result<(), AdmitError> {
        let slot = self.try_reserve()?;
        let message = self.codec.decode(content).map_err(DurqError::from)?;
        if !self.persistence.mark_loaded_in_flight(id).await? {
            return Err(AdmitError::Taken);
        }
        slot.publish(MessageWrapper::new(message, id));
        Ok(())
    }

    /// Waits until a message is available and takes the oldest one.
    pub async fn dequeue(&self) -> MessageWrapper<M> {
        loop {
            // Register for a wake-up before looking, so a publish between the
            // look and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.lock().ready.pop_front();
            if let Some(wrapper) = next {
                return wrapper;
            }
            notified.await;
        }
    }

    /// `dequeue` with a deadline. `None` if nothing arrived in time.
    pub async fn dequeue_timeout(&self, timeout: Duration) -> Option<MessageWrapper<M>> {
        tokio::time::timeout(timeout, self.dequeue()).await.ok()
    }

    /// `dequeue` that gives up as soon as `cancel` completes.
    pub async fn dequeue_until<F>(&self, cancel: F) -> Option<MessageWrapper<M>>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            wrapper = self.dequeue() => Some(wrapper),
            _ = cancel => None,
        }
    }

    /// Non-blocking take of the oldest message.
    pub fn try_dequeue(&self) -> Option<MessageWrapper<M>> {
        self.lock().ready.pop_front()
    }

    /// Advisory: whether an enqueue would currently find room.
    pub fn can_enqueue(&self) -> bool {
        let state = self.lock();
        state.ready.len() + state.reserved < self.max_size
    }

    /// Messages currently waiting in memory.
    pub fn size(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    pub fn persistence(&self) -> &Arc<PersistenceCoordinator> {
        &self.persistence
    }

    /// Closes the lifecycle of a dequeued message.
    ///
    /// Success deletes the record; failure applies the retry policy. Store
    /// problems are logged and absorbed, never raised to the consumer.
    pub async fn report_outcome(&self, success: bool, wrapper: MessageWrapper<M>) {
        let Some(id) = wrapper.msg_id() else {
            warn!("outcome reported for a message without a valid msgId attribute");
            return;
        };

        if success {
            self.persistence.delete(id).await;
            return;
        }

        match self.persistence.mark_failed(id).await {
            Ok(state) if state.is_terminal() => {
                warn!(msg_id = %id, "message exhausted its attempts and is dead");
            }
            Ok(state) => debug!(msg_id = %id, ?state, "message will be retried"),
            Err(e) => error!(msg_id = %id, error = %e, "failed to record message failure"),
        }
    }

    pub async fn ack(&self, wrapper: MessageWrapper<M>) {
        self.report_outcome(true, wrapper).await;
    }

    pub async fn nack(&self, wrapper: MessageWrapper<M>) {
        self.report_outcome(false, wrapper).await;
    }
}

/// A reserved capacity slot. Dropping it unused gives the slot back.
struct Slot<'a, M> {
    queue: &'a DurableQueue<M>,
    armed: bool,
}

impl<M> Slot<'_, M> {
    fn publish(mut self, wrapper: MessageWrapper<M>) {
        {
            let mut state = self
                .queue
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.reserved -= 1;
            state.ready.push_back(wrapper);
        }
        self.armed = false;
        self.queue.notify.notify_waiters();
    }
}

impl<M> Drop for Slot<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self
                .queue
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.reserved -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryRecordStore, ManualBreaker};
    use crate::ports::{RecordStore, SystemClock, UlidGenerator};
    use crate::queue::{MessageState, RetryPolicy};
    use crate::typed::JsonCodec;

    struct Fixture {
        store: Arc<InMemoryRecordStore>,
        breaker: Arc<ManualBreaker>,
        queue: Arc<DurableQueue<String>>,
    }

    fn fixture(max_size: usize, max_attempts: u32) -> Fixture {
        let store = Arc::new(InMemoryRecordStore::new());
        let breaker = Arc::new(ManualBreaker::default());
        let persistence = Arc::new(PersistenceCoordinator::new(
            store.clone(),
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            RetryPolicy::new(max_attempts),
        ));
        let queue = Arc::new(DurableQueue::new(
            max_size,
            persistence,
            Arc::new(JsonCodec::<String>::new()),
            breaker.clone(),
        ));
        Fixture {
            store,
            breaker,
            queue,
        }
    }

    #[tokio::test]
    async fn dequeue_order_is_enqueue_order() {
        let f = fixture(10, 3);
        for i in 0..10 {
            assert!(f.queue.enqueue(format!("m{i}")).await);
        }
        assert_eq!(f.queue.size(), 10);

        for i in 0..10 {
            let wrapper = f.queue.dequeue().await;
            assert_eq!(wrapper.message(), &format!("m{i}"));
        }
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn enqueue_records_in_flight_before_admission() {
        let f = fixture(2, 3);
        let id = f.queue.try_enqueue("a".to_string()).await.unwrap();

        let record = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, MessageState::InFlight);
        assert_eq!(record.exec_count, 0);
        assert_eq!(record.content, b"\"a\"");

        let wrapper = f.queue.dequeue().await;
        assert_eq!(wrapper.msg_id(), Some(id));
    }

    #[tokio::test]
    async fn full_queue_rejects_without_durable_write() {
        let f = fixture(2, 3);
        assert!(f.queue.enqueue("a".into()).await);
        assert!(f.queue.enqueue("b".into()).await);
        assert!(!f.queue.can_enqueue());

        let result = f.queue.try_enqueue("c".into()).await;
        assert!(matches!(
            result,
            Err(EnqueueError::Rejected(Rejection::CapacityExceeded))
        ));
        assert!(!f.queue.enqueue("c".into()).await);
        assert_eq!(f.store.len(), 2);
        assert_eq!(f.queue.size(), 2);
    }

    #[tokio::test]
    async fn open_breaker_rejects_regardless_of_capacity() {
        let f = fixture(5, 3);
        f.breaker.open();

        let result = f.queue.try_enqueue("a".into()).await;
        assert!(matches!(
            result,
            Err(EnqueueError::Rejected(Rejection::BreakerOpen))
        ));
        assert!(f.store.is_empty());

        f.breaker.set(BreakerStatus::HalfOpen);
        assert!(f.queue.enqueue("a".into()).await);
    }

    #[tokio::test]
    async fn failed_insert_admits_nothing_and_frees_the_slot() {
        let f = fixture(1, 3);
        f.store.set_unavailable(true);

        let result = f.queue.try_enqueue("a".into()).await;
        assert!(matches!(result, Err(EnqueueError::Store(_))));
        assert_eq!(f.queue.size(), 0);
        assert!(f.queue.can_enqueue());

        f.store.set_unavailable(false);
        assert!(f.queue.enqueue("a".into()).await);
    }

    #[tokio::test]
    async fn dequeue_blocks_until_enqueue() {
        let f = fixture(4, 3);
        let consumer = tokio::spawn({
            let queue = f.queue.clone();
            async move { queue.dequeue().await.into_message() }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        assert!(f.queue.enqueue("wake".into()).await);
        assert_eq!(consumer.await.unwrap(), "wake");
    }

    #[tokio::test]
    async fn every_blocked_consumer_gets_exactly_one_message() {
        let f = fixture(8, 3);
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = f.queue.clone();
                tokio::spawn(async move { queue.dequeue().await.into_message() })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        for i in 0..4 {
            assert!(f.queue.enqueue(format!("m{i}")).await);
        }

        let mut got = Vec::new();
        for c in consumers {
            got.push(c.await.unwrap());
        }
        got.sort();
        assert_eq!(got, vec!["m0", "m1", "m2", "m3"]);
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn bounded_dequeue_variants_give_up() {
        let f = fixture(1, 3);

        assert!(f.queue.dequeue_timeout(Duration::from_millis(20)).await.is_none());
        assert!(f.queue.dequeue_until(async {}).await.is_none());
        assert!(f.queue.try_dequeue().is_none());

        f.queue.enqueue("x".into()).await;
        let wrapper = f.queue.dequeue_timeout(Duration::from_millis(20)).await;
        assert_eq!(wrapper.map(|w| w.into_message()), Some("x".to_string()));
    }

    #[tokio::test]
    async fn success_deletes_record() {
        let f = fixture(2, 3);
        let id = f.queue.try_enqueue("a".into()).await.unwrap();

        let wrapper = f.queue.dequeue().await;
        f.queue.report_outcome(true, wrapper).await;

        assert!(f.store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_increments_count_then_kills() {
        let f = fixture(2, 2);
        let id = f.queue.try_enqueue("a".into()).await.unwrap();

        let wrapper = f.queue.dequeue().await;
        f.queue.nack(wrapper).await;
        let record = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, MessageState::RetryEligible);
        assert_eq!(record.exec_count, 1);

        // Pretend it was reloaded and failed again.
        assert!(f.queue.persistence().mark_loaded_in_flight(id).await.unwrap());
        f.queue.nack(MessageWrapper::new("a".to_string(), id)).await;
        let record = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(record.state, MessageState::Dead);
        assert_eq!(record.exec_count, 2);
    }

    #[tokio::test]
    async fn outcome_without_msg_id_is_ignored() {
        let f = fixture(2, 3);
        let id = f.queue.try_enqueue("a".into()).await.unwrap();

        let mut wrapper = f.queue.dequeue().await;
        wrapper.remove_attribute(crate::domain::MSG_ID_ATTR);
        f.queue.ack(wrapper).await;

        assert!(f.store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn outcome_store_failure_is_absorbed() {
        let f = fixture(2, 3);
        f.queue.enqueue("a".into()).await;
        let wrapper = f.queue.dequeue().await;

        f.store.set_unavailable(true);
        f.queue.nack(wrapper.clone()).await;
        f.queue.ack(wrapper).await;
    }

    #[tokio::test]
    async fn concurrent_producers_never_exceed_capacity() {
        let f = fixture(5, 3);
        let producers: Vec<_> = (0..20)
            .map(|i| {
                let queue = f.queue.clone();
                tokio::spawn(async move { queue.enqueue(format!("m{i}")).await })
            })
            .collect();

        let mut accepted = 0;
        for p in producers {
            if p.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(f.queue.size(), 5);
        assert_eq!(f.store.len(), 5);
    }

    #[test]
    fn queue_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DurableQueue<String>>();
    }
}
