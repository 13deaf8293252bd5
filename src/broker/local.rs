//! In-process broker transport.
//!
//! [`LocalBroker`] wraps a [`tokio::sync::broadcast`] channel. Clones share
//! the same bus, so several nodes in one process exchange messages
//! exactly as they would through an external broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};

use super::{BrokerError, BrokerTransport, SUBSCRIPTION_BUFFER, Subscription};

/// One message on the shared bus.
#[derive(Debug, Clone)]
struct Envelope {
    channel: Arc<str>,
    payload: Arc<[u8]>,
}

/// Broadcast-backed transport for single-process deployments and tests.
///
/// When the ring buffer is full the oldest payloads are dropped for
/// lagging subscribers, mirroring the at-most-once delivery of a real
/// pub/sub broker.
#[derive(Debug, Clone)]
pub struct LocalBroker {
    sender: broadcast::Sender<Envelope>,
    closed: Arc<AtomicBool>,
}

impl LocalBroker {
    /// Creates a bus buffering up to `capacity` undelivered messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle on the same bus whose open/closed state is its own.
    ///
    /// Use one handle per node so that closing one node's transport does
    /// not disconnect the others.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the number of live subscriptions across all handles.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl BrokerTransport for LocalBroker {
    fn connect(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        async move { self.ensure_open() }.boxed()
    }

    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        async move {
            self.ensure_open()?;
            // No subscribers means nobody is listening; that is not an error.
            let _ = self.sender.send(Envelope {
                channel: Arc::from(channel),
                payload: Arc::from(payload),
            });
            Ok(())
        }
        .boxed()
    }

    fn subscribe<'a>(
        &'a self,
        channel: &'a str,
    ) -> BoxFuture<'a, Result<Subscription, BrokerError>> {
        async move {
            self.ensure_open()?;
            let mut bus = self.sender.subscribe();
            let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
            let wanted: Arc<str> = Arc::from(channel);
            let closed = Arc::clone(&self.closed);

            tokio::spawn(async move {
                loop {
                    match bus.recv().await {
                        Ok(envelope) => {
                            if closed.load(Ordering::Acquire) {
                                break;
                            }
                            if envelope.channel != wanted {
                                continue;
                            }
                            if tx.send(envelope.payload.to_vec()).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, channel = %wanted, "subscriber lagged behind local broker");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            Ok(Subscription::new(channel, rx))
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        async move {
            self.closed.store(true, Ordering::Release);
        }
        .boxed()
    }
}
