//! PayloadCodec - converts messages to and from stored bytes.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialization failure. Decoding never yields a half-built message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode message: {0}")]
    Decode(String),
}

/// Serialization contract.
///
/// Must round-trip: `decode(encode(m))` is equivalent to `m`.
pub trait PayloadCodec<M>: Send + Sync {
    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<M, CodecError>;
}

/// JSON codec for any serde type.
pub struct JsonCodec<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> JsonCodec<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for JsonCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> PayloadCodec<M> for JsonCodec<M>
where
    M: Serialize + DeserializeOwned,
{
    fn encode(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<M, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
