//! Crate-level error taxonomy.
//!
//! Capacity and breaker rejections are not errors: `enqueue` reports them as a
//! `false` result and `try_enqueue` as [`crate::queue::Rejection`].

use thiserror::Error;

use super::ids::MessageId;
use crate::ports::StoreError;
use crate::queue::MessageState;
use crate::typed::CodecError;

#[derive(Debug, Error)]
pub enum DurqError {
    /// Durable I/O failed (insert, update, delete or scan).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An outcome or reload referenced an id with no durable record.
    #[error("message record not found: {0}")]
    RecordNotFound(MessageId),

    /// A reload found the record already taken or finished.
    #[error("message record {0} is {1:?}, not recoverable")]
    NotRecoverable(MessageId, MessageState),

    /// A stored payload could not be turned back into a message.
    #[error(transparent)]
    Serialization(#[from] CodecError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DurqError>;
