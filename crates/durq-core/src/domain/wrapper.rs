//! In-memory handle for an admitted message.

use std::collections::HashMap;

use super::ids::MessageId;

/// Attribute key linking a wrapper back to its durable record.
pub const MSG_ID_ATTR: &str = "msgId";

/// A message plus free-form attributes, as handed out by `dequeue`.
///
/// The wrapper is created when a message is admitted to memory and always
/// carries the [`MSG_ID_ATTR`] attribute. The consumer owns it after dequeue and
/// gives it back through `report_outcome`.
#[derive(Debug, Clone)]
pub struct MessageWrapper<M> {
    message: M,
    attributes: HashMap<String, String>,
}

impl<M> MessageWrapper<M> {
    pub fn new(message: M, id: MessageId) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(MSG_ID_ATTR.to_string(), id.to_string());
        Self {
            message,
            attributes,
        }
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut M {
        &mut self.message
    }

    pub fn into_message(self) -> M {
        self.message
    }

    /// The durable record id, if the `msgId` attribute is still present and valid.
    pub fn msg_id(&self) -> Option<MessageId> {
        self.attributes
            .get(MSG_ID_ATTR)
            .filter(|raw| !raw.is_empty())
            .and_then(|raw| raw.parse().ok())
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Sets an attribute, returning the previous value.
    pub fn put_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }
}
