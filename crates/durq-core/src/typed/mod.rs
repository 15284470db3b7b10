//! Typed message API.
//!
//! - **Message**: a serde type with a stable type name
//! - **PayloadCodec**: bytes <-> message
//! - **CodecRegistry**: type name -> codec, resolved at build time

pub mod codec;
pub mod message;
pub mod registry;

pub use self::codec::{CodecError, JsonCodec, PayloadCodec};
pub use self::message::Message;
pub use self::registry::{CodecRegistry, RegistryError};
