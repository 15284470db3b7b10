//! QueueBuilder - wires store, breaker, codec and queue from a [`QueueConfig`].
//!
//! Everything that can be wrong with the setup is found in `build()`: a bad
//! config, an unknown `message_type`, an unreachable store. Recovery runs
//! before `build()` returns, so the queue handed out already holds the
//! recoverable backlog.

use std::sync::Arc;

use super::config::QueueConfig;
use super::reload_loop::ReloadLoop;
use super::worker_loop::{MessageHandler, WorkerGroup};
use crate::impls::{AlwaysClosed, SqliteRecordStore};
use crate::ports::{CircuitBreaker, Clock, RecordStore, StoreError, SystemClock, UlidGenerator};
use crate::queue::{DurableQueue, PersistenceCoordinator, RecoveryManager, RecoveryReport};
use crate::typed::{CodecRegistry, Message, PayloadCodec, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to open record store: {0}")]
    Store(#[from] StoreError),
}

/// # Example
/// ```ignore
/// let app = QueueBuilder::<SendInvoice>::new(QueueConfig::from_env()?)
///     .with_breaker(breaker)
///     .build()
///     .await?;
/// app.queue().enqueue(SendInvoice { invoice_id: 7 }).await;
/// ```
pub struct QueueBuilder<M> {
    config: QueueConfig,
    registry: CodecRegistry<M>,
    store: Option<Arc<dyn RecordStore>>,
    breaker: Arc<dyn CircuitBreaker>,
    clock: Arc<dyn Clock>,
}

impl<M: Message> QueueBuilder<M> {
    /// Starts with the JSON codec for `M` registered under `M::TYPE`, a
    /// breaker that never trips and the wall clock.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            registry: CodecRegistry::json(),
            store: None,
            breaker: Arc::new(AlwaysClosed),
            clock: Arc::new(SystemClock),
        }
    }

    /// Registers an extra codec, selectable through `message_type`.
    pub fn register_codec(
        mut self,
        message_type: impl Into<String>,
        codec: Arc<dyn PayloadCodec<M>>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(message_type, codec)?;
        Ok(self)
    }

    /// Uses `store` instead of opening `database_url`.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_breaker(mut self, breaker: Arc<dyn CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn build(self) -> Result<QueueApp<M>, BuildError> {
        self.config
            .validate()
            .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;

        let message_type = self.config.message_type.as_deref().unwrap_or(M::TYPE);
        let codec = self.registry.resolve(message_type)?;

        let store: Arc<dyn RecordStore> = match self.store {
            Some(store) => store,
            None => Arc::new(
                SqliteRecordStore::connect(self.config.database_url.as_deref(), &self.config.table)
                    .await?,
            ),
        };

        let persistence = Arc::new(PersistenceCoordinator::new(
            store,
            Arc::clone(&self.clock),
            Arc::new(UlidGenerator::new(Arc::clone(&self.clock))),
            self.config.retry_policy(),
        ));
        let queue = Arc::new(DurableQueue::new(
            self.config.max_size,
            persistence,
            codec,
            self.breaker,
        ));
        let recovery = Arc::new(RecoveryManager::new(Arc::clone(&queue)));
        let startup = recovery.startup().await;

        Ok(QueueApp {
            config: self.config,
            queue,
            recovery,
            startup,
        })
    }
}

/// A built, recovered queue and the pieces that run around it.
pub struct QueueApp<M> {
    config: QueueConfig,
    queue: Arc<DurableQueue<M>>,
    recovery: Arc<RecoveryManager<M>>,
    startup: RecoveryReport,
}

impl<M: Message> QueueApp<M> {
    pub fn queue(&self) -> &Arc<DurableQueue<M>> {
        &self.queue
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager<M>> {
        &self.recovery
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// What startup recovery did.
    pub fn startup_report(&self) -> RecoveryReport {
        self.startup
    }

    pub fn spawn_workers(&self, n: usize, handler: Arc<dyn MessageHandler<M>>) -> WorkerGroup {
        WorkerGroup::spawn(n, Arc::clone(&self.queue), handler)
    }

    /// Starts the periodic reload when `reload_interval_ms` is set.
    pub fn spawn_reload_loop(&self) -> Option<ReloadLoop> {
        self.config
            .reload_interval()
            .map(|interval| ReloadLoop::spawn(Arc::clone(&self.recovery), interval))
    }
}
