//! Queue module: lifecycle states, retry policy, persistence and the durable
//! in-memory queue with its recovery pass.

mod durable;
mod persistence;
mod record;
mod recovery;
mod retry;
mod state;

pub(crate) use durable::AdmitError;
pub use durable::{DurableQueue, EnqueueError, Rejection};
pub use persistence::{LoadedRecord, PersistenceCoordinator};
pub use record::{MessageRecord, RecordUpdate};
pub use recovery::{RecoveryManager, RecoveryReport};
pub use retry::RetryPolicy;
pub use state::MessageState;
