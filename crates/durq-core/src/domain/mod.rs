//! Domain model: ids, the in-memory message handle and errors.

pub mod errors;
pub mod ids;
pub mod wrapper;

pub use self::errors::{DurqError, Result};
pub use self::ids::{Id, IdMarker, MessageId, ParseIdError};
pub use self::wrapper::{MSG_ID_ATTR, MessageWrapper};
