pub mod producer;
pub mod shared;


pub use producer::KafkaPublishClient;
pub use shared::SharedClient;

use crate::error::TransportError;
use crate::event::OutboundMessage;

/// Sends resolved messages to the broker.
///
/// A single client may be shared by several sinks running on different
/// threads, so implementations must be safe for concurrent `send` calls.
/// Each sink calls `start` and `stop` once; wrap a shared client in
/// [`SharedClient`] so only the last `stop` closes it.
pub trait PublishClient: Send + Sync {
    fn start(&self) -> Result<(), TransportError>;

    fn stop(&self) -> Result<(), TransportError>;

    /// Publishes one message and blocks until the broker acknowledges it.
    fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}
