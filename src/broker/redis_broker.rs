//! Redis pub/sub transport.
//!
//! Publishing goes through one multiplexed connection. Each subscription
//! gets its own pub/sub connection, drained by a pump task into a
//! [`Subscription`].

use std::fmt;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use super::{BrokerError, BrokerTransport, SUBSCRIPTION_BUFFER, Subscription};

/// [`BrokerTransport`] backed by a Redis server.
pub struct RedisBroker {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    shutdown: CancellationToken,
}

impl RedisBroker {
    /// Creates a transport for the Redis instance at `url`
    /// (e.g. `redis://:password@host:6379/0`). No connection is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connect`] if `url` is not a valid Redis URL.
    pub fn new(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url).map_err(|e| BrokerError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            shutdown: CancellationToken::new(),
        })
    }
}

impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker")
            .field("client", &self.client)
            .field("closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl BrokerTransport for RedisBroker {
    fn connect(&self) -> BoxFuture<'_, Result<(), BrokerError>> {
        async move {
            if self.shutdown.is_cancelled() {
                return Err(BrokerError::Closed);
            }
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| BrokerError::Connect(e.to_string()))?;
            let _pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| BrokerError::Connect(e.to_string()))?;
            *self.connection.write().await = Some(conn);
            Ok(())
        }
        .boxed()
    }

    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        async move {
            let mut conn = self
                .connection
                .read()
                .await
                .clone()
                .ok_or(BrokerError::Closed)?;
            let _receivers: i64 = conn
                .publish(channel, payload)
                .await
                .map_err(|e| BrokerError::Publish(e.to_string()))?;
            Ok(())
        }
        .boxed()
    }

    fn subscribe<'a>(
        &'a self,
        channel: &'a str,
    ) -> BoxFuture<'a, Result<Subscription, BrokerError>> {
        async move {
            if self.shutdown.is_cancelled() {
                return Err(BrokerError::Closed);
            }
            let mut pubsub = self
                .client
                .get_async_pubsub()
                .await
                .map_err(|e| BrokerError::Subscribe(e.to_string()))?;
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

            let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
            let shutdown = self.shutdown.clone();
            let name = channel.to_string();

            tokio::spawn(async move {
                let mut messages = pubsub.on_message();
                loop {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        next = messages.next() => match next {
                            Some(msg) => {
                                if tx.send(msg.get_payload_bytes().to_vec()).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                tracing::warn!(channel = %name, "redis subscription ended");
                                break;
                            }
                        },
                    }
                }
            });

            Ok(Subscription::new(channel, rx))
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        async move {
            self.shutdown.cancel();
            self.connection.write().await.take();
        }
        .boxed()
    }
}
