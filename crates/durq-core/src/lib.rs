//! durq-core
//!
//! A bounded in-memory message queue whose every message is backed by a
//! durable record, so messages survive restarts and failed attempts are
//! retried up to a limit.
//!
//! # Modules
//! - **domain**: ids, the `MessageWrapper` handle, errors
//! - **ports**: seams (RecordStore, CircuitBreaker, Clock, IdGenerator)
//! - **typed**: `Message` trait, payload codecs and the codec registry
//! - **queue**: states, retry policy, persistence, `DurableQueue`, recovery
//! - **impls**: SQLite and in-memory record stores, simple breakers
//! - **app**: config, builder, worker and reload loops

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod typed;

pub use crate::app::{QueueBuilder, QueueConfig};
pub use crate::domain::{DurqError, MessageId, MessageWrapper};
pub use crate::queue::{DurableQueue, EnqueueError, Rejection, RecoveryManager, RecoveryReport};
pub use crate::typed::Message;
