//! Interface to the pub/sub transport client.
//!
//! The wire protocol (topic discovery, account handshake, reconnect) lives in
//! an external client library. The daemon core only needs these three calls
//! plus asynchronous item delivery into an [`ItemHandler`]. Implementations
//! must be safe to call from multiple threads; the client is expected to
//! invoke handlers from its own I/O threads.

use crate::error::Result;
use crate::types::SubId;
use std::sync::Arc;

/// Receiver of published items for a subscribed topic.
///
/// Handlers are invoked from transport I/O threads and must not block: the
/// manifest pipeline hands work off to its pool, the reconciler only touches
/// in-memory maps and issues subscribe calls.
pub trait ItemHandler: Send + Sync {
    /// Deliver the item payloads published on `topic` in one event batch.
    fn handle_items(&self, topic: &str, items: &[String]);
}

/// Minimal pub/sub client surface consumed by the daemon.
pub trait Transport: Send + Sync {
    /// Authoritative list of all topics currently on the server.
    fn list_topics(&self) -> Result<Vec<String>>;

    /// Subscribe `handler` to `topic`. Returns the server-issued handle on
    /// success; failures are transient and retried by the resubscribe loop.
    fn subscribe(&self, topic: &str, handler: Arc<dyn ItemHandler>) -> Result<SubId>;

    /// Drop an existing subscription. Best effort; the server may already
    /// have forgotten it after a reconnect.
    fn unsubscribe(&self, topic: &str, sub: &SubId) -> Result<()>;
}
