//! Message trait - ties a payload type to its stored type identifier.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A domain message that can be queued durably.
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendInvoice {
///     invoice_id: u64,
/// }
///
/// impl Message for SendInvoice {
///     const TYPE: &'static str = "billing.send_invoice.v1";
/// }
/// ```
///
/// `TYPE` is what `QueueConfig::message_type` refers to. Stored payloads are
/// decoded by the codec registered under that name.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}
