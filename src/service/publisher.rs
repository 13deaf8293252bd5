//! Outbound side of the protocol.

use std::sync::Arc;

use crate::broker::BrokerTransport;
use crate::protocol::ServerMessage;

/// Encodes messages and hands them to the broker, fire-and-forget.
///
/// A failed publish is logged and dropped: the caller's local event has
/// already happened and the next HEARTBEAT carries the full state anyway.
#[derive(Debug, Clone)]
pub struct SyncPublisher {
    broker: Arc<dyn BrokerTransport>,
    channel: Arc<str>,
}

impl SyncPublisher {
    /// Creates a publisher writing to `channel` on `broker`.
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerTransport>, channel: &str) -> Self {
        Self {
            broker,
            channel: Arc::from(channel),
        }
    }

    /// Channel messages are published on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publishes `message`. Never fails from the caller's point of view.
    pub async fn publish(&self, message: &ServerMessage) {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, kind = %message.kind(), "failed to encode message");
                return;
            }
        };
        if let Err(error) = self.broker.publish(&self.channel, payload).await {
            tracing::warn!(
                %error,
                kind = %message.kind(),
                server = message.server_name(),
                "publish failed, message dropped"
            );
            return;
        }
        tracing::debug!(kind = %message.kind(), server = message.server_name(), "published");
    }
}
