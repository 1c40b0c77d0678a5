//! The message envelope carried through the durable confirmation queue.

use serde::{Deserialize, Serialize};

/// One message waiting for a publish confirmation.
///
/// Created on enqueue, destroyed only after the broker confirms receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// The message body to publish.
    pub bytes: Vec<u8>,
    /// Destination exchange; empty means "use the configured default".
    pub exchange: String,
    /// Routing key computed at enqueue time (e.g. by the validator). Per
    /// the publisher's contract, this is not necessarily what gets sent
    /// as the AMQP routing key at publish time.
    pub routing_key: String,
}

impl QueueMessage {
    #[must_use]
    pub fn new(bytes: Vec<u8>, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            bytes,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}
