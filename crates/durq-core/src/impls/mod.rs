//! Impls - concrete adapters for the ports.
//!
//! - **SqliteRecordStore**: durable store, one table per queue
//! - **InMemoryRecordStore**: development and tests
//! - **AlwaysClosed** / **ManualBreaker**: breaker gates

pub mod breaker;
pub mod inmem_store;
pub mod sqlite_store;

pub use self::breaker::{AlwaysClosed, ManualBreaker};
pub use self::inmem_store::InMemoryRecordStore;
pub use self::sqlite_store::{SqliteRecordStore, is_valid_table_name};
