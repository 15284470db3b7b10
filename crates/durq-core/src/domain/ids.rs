//! Strongly-typed identifiers.
//!
//! Ids are ULIDs: 128-bit, sortable by creation time, and generated without
//! coordination. `Id<T>` carries a zero-sized marker so a `MessageId` cannot be
//! confused with any other id the crate grows later.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait for id kinds.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display`, e.g. `"msg-"`.
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Canonical storage form (bare 26-char ULID, no prefix).
    ///
    /// Lexicographic order of this string matches id order, which the stores
    /// rely on to break `created_at` ties.
    pub fn to_storage_key(&self) -> String {
        self.ulid.to_string()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when an id string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid id: {0}")]
pub struct ParseIdError(pub String);

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    /// Accepts both the prefixed `Display` form and the bare storage form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError(s.to_string()))
    }
}

/// Marker for durable message records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Msg {}

impl IdMarker for Msg {
    fn prefix() -> &'static str {
        "msg-"
    }
}

/// Identifier of a durable message record.
pub type MessageId = Id<Msg>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed() {
        let id = MessageId::from_ulid(Ulid::new());
        assert!(id.to_string().starts_with("msg-"));
        assert!(!id.to_storage_key().starts_with("msg-"));
    }

    #[test]
    fn parses_display_and_storage_forms() {
        let id = MessageId::from_ulid(Ulid::new());

        let from_display: MessageId = id.to_string().parse().unwrap();
        let from_storage: MessageId = id.to_storage_key().parse().unwrap();

        assert_eq!(from_display, id);
        assert_eq!(from_storage, id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "msg-not-a-ulid".parse::<MessageId>().unwrap_err();
        assert_eq!(err, ParseIdError("msg-not-a-ulid".to_string()));
        assert!("".parse::<MessageId>().is_err());
    }

    #[test]
    fn ids_are_sortable_by_creation() {
        let id1 = MessageId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = MessageId::from_ulid(Ulid::new());

        assert!(id1 < id2);
        assert!(id1.to_storage_key() < id2.to_storage_key());
    }

    #[test]
    fn phantom_marker_is_free() {
        assert_eq!(std::mem::size_of::<MessageId>(), std::mem::size_of::<Ulid>());
    }
}
