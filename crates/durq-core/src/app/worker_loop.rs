//! WorkerGroup - consumers that drain a [`DurableQueue`].
//!
//! Each worker loops: dequeue -> handle -> report outcome. The handler's
//! `Err` becomes a failed attempt; the queue's retry policy decides the rest.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::queue::DurableQueue;

/// A failed attempt, with a reason for the logs.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for HandlerError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

/// Processes one message.
///
/// # Example
/// ```ignore
/// struct SendInvoiceHandler;
///
/// #[async_trait]
/// impl MessageHandler<SendInvoice> for SendInvoiceHandler {
///     async fn handle(&self, message: &SendInvoice) -> Result<(), HandlerError> {
///         billing::send(message.invoice_id).await.map_err(|e| e.to_string().into())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler<M>: Send + Sync {
    async fn handle(&self, message: &M) -> Result<(), HandlerError>;
}

/// Worker group handle.
/// - `request_shutdown()` (or dropping the group) stops every worker
/// - `shutdown_and_join()` waits for all of them
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn<M>(
        n: usize,
        queue: Arc<DurableQueue<M>>,
        handler: Arc<dyn MessageHandler<M>>,
    ) -> Self
    where
        M: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let handler = Arc::clone(&handler);
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, queue, handler, &mut rx).await;
                })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new messages. A handler already running finishes and its
    /// outcome is still reported.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop<M>(
    worker_id: usize,
    queue: Arc<DurableQueue<M>>,
    handler: Arc<dyn MessageHandler<M>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) where
    M: Send + Sync + 'static,
{
    debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let wrapper = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            wrapper = queue.dequeue() => wrapper,
        };

        match handler.handle(wrapper.message()).await {
            Ok(()) => queue.ack(wrapper).await,
            Err(e) => {
                warn!(worker_id, msg_id = ?wrapper.msg_id(), error = %e, "handler failed");
                queue.nack(wrapper).await;
            }
        }
    }
    debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{AlwaysClosed, InMemoryRecordStore};
    use crate::ports::{SystemClock, UlidGenerator};
    use crate::queue::{MessageState, PersistenceCoordinator, RetryPolicy};
    use crate::typed::JsonCodec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        seen: AtomicUsize,
        fail_on: &'static str,
    }

    #[async_trait]
    impl MessageHandler<String> for Counting {
        async fn handle(&self, message: &String) -> Result<(), HandlerError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if message == self.fail_on {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    fn queue(store: Arc<InMemoryRecordStore>) -> Arc<DurableQueue<String>> {
        let persistence = Arc::new(PersistenceCoordinator::new(
            store,
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
            RetryPolicy::new(3),
        ));
        Arc::new(DurableQueue::new(
            16,
            persistence,
            Arc::new(JsonCodec::<String>::new()),
            Arc::new(AlwaysClosed),
        ))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn workers_ack_and_nack() {
        let store = Arc::new(InMemoryRecordStore::new());
        let queue = queue(store.clone());
        let handler = Arc::new(Counting {
            seen: AtomicUsize::new(0),
            fail_on: "bad",
        });

        let group = WorkerGroup::spawn(3, queue.clone(), handler.clone());
        assert_eq!(group.len(), 3);
        for body in ["a", "b", "bad", "c"] {
            assert!(queue.enqueue(body.to_string()).await);
        }

        wait_until(|| {
            let left = store.snapshot();
            left.len() == 1 && left[0].state == MessageState::RetryEligible
        })
        .await;
        group.shutdown_and_join().await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 4);
        assert_eq!(store.snapshot()[0].exec_count, 1);
    }

    #[tokio::test]
    async fn shutdown_unblocks_idle_workers() {
        let store = Arc::new(InMemoryRecordStore::new());
        let handler = Arc::new(Counting {
            seen: AtomicUsize::new(0),
            fail_on: "",
        });
        let group = WorkerGroup::spawn(2, queue(store), handler);

        tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .unwrap();
    }
}
