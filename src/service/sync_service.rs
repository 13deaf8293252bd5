//! Proxy-side sync subsystem: inbound listener plus liveness sweeper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::publisher::SyncPublisher;
use super::sweeper::spawn_sweeper;
use crate::broker::{BrokerTransport, DEFAULT_CHANNEL, Subscription};
use crate::config::SyncConfig;
use crate::domain::ServerRegistry;
use crate::error::SyncError;
use crate::protocol::handle_payload;

/// Tunables for [`SyncService::start`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Channel to subscribe and publish on.
    pub channel: String,
    /// Period of the liveness sweep.
    pub sweep_period: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            sweep_period: Duration::from_secs(5),
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            channel: config.channel.clone(),
            sweep_period: config.heartbeat_scheduler_delay,
        }
    }
}

/// Running sync subsystem.
///
/// Owns the broker connection, the listener task applying inbound
/// messages to the registry, and the sweeper task evicting silent
/// servers. Both tasks stop on [`SyncService::shutdown`].
#[derive(Debug)]
pub struct SyncService {
    registry: Arc<ServerRegistry>,
    broker: Arc<dyn BrokerTransport>,
    publisher: SyncPublisher,
    shutdown: CancellationToken,
    listener: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl SyncService {
    /// Connects to the broker, subscribes to the channel and starts the
    /// listener and sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Broker`] if the broker cannot be reached or
    /// the subscription fails. No task is started in that case.
    pub async fn start(
        registry: Arc<ServerRegistry>,
        broker: Arc<dyn BrokerTransport>,
        options: SyncOptions,
    ) -> Result<Self, SyncError> {
        let started = Instant::now();

        if let Err(error) = broker.connect().await {
            tracing::error!(%error, "could not connect to broker");
            return Err(error.into());
        }
        let subscription = match broker.subscribe(&options.channel).await {
            Ok(subscription) => subscription,
            Err(error) => {
                tracing::error!(%error, channel = %options.channel, "could not subscribe");
                broker.close().await;
                return Err(error.into());
            }
        };

        let shutdown = CancellationToken::new();
        let listener = tokio::spawn(run_listener(
            Arc::clone(&registry),
            subscription,
            shutdown.clone(),
        ));
        let sweeper = spawn_sweeper(
            Arc::clone(&registry),
            options.sweep_period,
            shutdown.clone(),
        );
        let publisher = SyncPublisher::new(Arc::clone(&broker), &options.channel);

        tracing::info!(
            channel = %options.channel,
            sweep_period_ms = options.sweep_period.as_millis(),
            elapsed_ms = started.elapsed().as_millis(),
            "sync subsystem started"
        );

        Ok(Self {
            registry,
            broker,
            publisher,
            shutdown,
            listener,
            sweeper,
        })
    }

    /// Registry this service keeps up to date.
    #[must_use]
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Publisher on the same broker and channel.
    #[must_use]
    pub fn publisher(&self) -> &SyncPublisher {
        &self.publisher
    }

    /// Stops both tasks, waiting for an in-flight sweep or message to
    /// finish, then closes the broker connection.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.sweeper.await {
            tracing::warn!(%error, "sweeper task ended abnormally");
        }
        if let Err(error) = self.listener.await {
            tracing::warn!(%error, "listener task ended abnormally");
        }
        self.broker.close().await;
        tracing::info!("sync subsystem stopped");
    }
}

async fn run_listener(
    registry: Arc<ServerRegistry>,
    mut subscription: Subscription,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = subscription.recv() => {
                let Some(payload) = next else {
                    tracing::warn!(channel = subscription.channel(), "subscription closed");
                    break;
                };
                if let Err(error) = handle_payload(&registry, &payload).await {
                    if error.is_unknown_kind() {
                        tracing::debug!(%error, "ignoring message of unknown kind");
                    } else {
                        tracing::warn!(%error, "discarding malformed message");
                    }
                }
            }
        }
    }
    tracing::debug!("listener stopped");
}
