//! CodecRegistry - resolves a stored message type name to its codec.
//!
//! Payloads outlive the process that wrote them, so the reader must know how
//! to decode whatever type name the configuration points at. The lookup happens
//! once, when the queue is built, not on every reload.

use std::collections::HashMap;
use std::sync::Arc;

use super::codec::{JsonCodec, PayloadCodec};
use super::message::Message;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("codec for message type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("no codec registered for message type '{0}'")]
    NotRegistered(String),
}

/// Type name -> codec producing `M`.
///
/// Several names may decode into the same `M`, e.g. an old schema version kept
/// readable next to the current one.
pub struct CodecRegistry<M> {
    codecs: HashMap<String, Arc<dyn PayloadCodec<M>>>,
}

impl<M> CodecRegistry<M> {
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        message_type: impl Into<String>,
        codec: Arc<dyn PayloadCodec<M>>,
    ) -> Result<(), RegistryError> {
        let message_type = message_type.into();
        if self.codecs.contains_key(&message_type) {
            return Err(RegistryError::AlreadyRegistered(message_type));
        }
        self.codecs.insert(message_type, codec);
        Ok(())
    }

    pub fn resolve(&self, message_type: &str) -> Result<Arc<dyn PayloadCodec<M>>, RegistryError> {
        self.codecs
            .get(message_type)
            .cloned()
            .ok_or_else(|| RegistryError::NotRegistered(message_type.to_string()))
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.codecs.keys().cloned().collect();
        types.sort();
        types
    }
}

impl<M: Message> CodecRegistry<M> {
    /// Registers a [`JsonCodec`] under `M::TYPE`.
    pub fn register_json(&mut self) -> Result<(), RegistryError> {
        self.register(M::TYPE, Arc::new(JsonCodec::<M>::new()))
    }

    /// A registry with just the JSON codec for `M`.
    pub fn json() -> Self {
        let mut registry = Self::new();
        registry
            .codecs
            .insert(M::TYPE.to_string(), Arc::new(JsonCodec::<M>::new()));
        registry
    }
}

impl<M> Default for CodecRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
