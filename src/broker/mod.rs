//! Broker transport: the pub/sub channel nodes exchange messages over.
//!
//! [`BrokerTransport`] is the only capability the sync subsystem needs
//! from a broker. Delivery is whatever the implementation provides; the
//! protocol assumes at-most-once with no ordering across publishers.

pub mod local;
#[cfg(feature = "redis")]
pub mod redis_broker;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

pub use local::LocalBroker;
#[cfg(feature = "redis")]
pub use redis_broker::RedisBroker;

/// Channel every node publishes to and subscribes on.
pub const DEFAULT_CHANNEL: &str = "serversync:servers";

/// Buffered payloads per subscription before the pump waits on the listener.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 1024;

/// Failures reported by a [`BrokerTransport`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// A message could not be handed to the broker.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The channel subscription could not be established.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The transport was used before `connect` or after `close`.
    #[error("broker transport is closed")]
    Closed,
}

/// Publish/subscribe primitives over named channels.
///
/// The async methods return boxed futures so the trait stays object safe
/// and a node can pick its transport at runtime.
pub trait BrokerTransport: Send + Sync + std::fmt::Debug {
    /// Establishes the connection and verifies the broker is reachable.
    fn connect(&self) -> BoxFuture<'_, Result<(), BrokerError>>;

    /// Hands `payload` to the broker for delivery on `channel`.
    fn publish<'a>(&'a self, channel: &'a str, payload: Vec<u8>)
    -> BoxFuture<'a, Result<(), BrokerError>>;

    /// Starts receiving every payload published on `channel`.
    fn subscribe<'a>(&'a self, channel: &'a str)
    -> BoxFuture<'a, Result<Subscription, BrokerError>>;

    /// Releases the connection and ends open subscriptions.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Stream of payloads received on one channel, delivered one at a time.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    /// Wraps the receiving half fed by a transport's pump task.
    #[must_use]
    pub fn new(channel: impl Into<String>, receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    /// Channel this subscription listens on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next payload. Returns `None` once the transport has
    /// ended the subscription.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }
}
