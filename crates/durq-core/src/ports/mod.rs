//! Ports - seams to the collaborators the queue does not own.
//!
//! - **RecordStore**: durable record storage (source of truth)
//! - **CircuitBreaker**: enqueue gate, queried only
//! - **Clock** / **IdGenerator**: injected so tests are deterministic

pub mod breaker;
pub mod clock;
pub mod id_generator;
pub mod record_store;

pub use self::breaker::{BreakerStatus, CircuitBreaker};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::record_store::{RecordStore, StoreError, StoreResult};
