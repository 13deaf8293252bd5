//! Backend-side announcer for the server this node runs.
//!
//! [`LocalServer`] keeps the local roster and turns lifecycle events into
//! protocol messages: CREATE on start, UPDATE on roster and capacity
//! changes, periodic HEARTBEAT with the full state, REMOVE on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::publisher::SyncPublisher;
use crate::broker::BrokerTransport;
use crate::config::BackendConfig;
use crate::domain::{Player, PlayerId, Server};
use crate::error::SyncError;
use crate::protocol::{RosterAction, ServerMessage};

/// Running announcer for one backend server.
#[derive(Debug)]
pub struct LocalServer {
    name: String,
    state: Arc<Mutex<Server>>,
    publisher: SyncPublisher,
    broker: Arc<dyn BrokerTransport>,
    shutdown: CancellationToken,
    heartbeat: JoinHandle<()>,
}

impl LocalServer {
    /// Connects to the broker, announces the server with a CREATE and
    /// starts the heartbeat task.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Broker`] if the broker cannot be reached.
    pub async fn start(
        config: &BackendConfig,
        channel: &str,
        broker: Arc<dyn BrokerTransport>,
    ) -> Result<Self, SyncError> {
        broker.connect().await?;

        let mut server = Server::new(config.name.clone(), config.ip.clone(), config.port);
        server.set_max_players(config.max_players);
        let publisher = SyncPublisher::new(Arc::clone(&broker), channel);
        publisher.publish(&ServerMessage::create_for(&server)).await;

        let state = Arc::new(Mutex::new(server));
        let shutdown = CancellationToken::new();
        let heartbeat = spawn_heartbeat(
            Arc::clone(&state),
            publisher.clone(),
            config.heartbeat_interval,
            shutdown.clone(),
        );

        tracing::info!(
            server = %config.name,
            ip = %config.ip,
            port = config.port,
            "announced local server"
        );

        Ok(Self {
            name: config.name.clone(),
            state,
            publisher,
            broker,
            shutdown,
            heartbeat,
        })
    }

    /// Name this server is announced under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current local state.
    pub async fn snapshot(&self) -> Server {
        self.state.lock().await.clone()
    }

    /// Records a player joining and publishes an ADD. Returns `false`
    /// (publishing nothing) if the player was already on the roster.
    pub async fn player_joined(&self, player: Player) -> bool {
        // Held across the publish: publish order must match state order.
        let mut state = self.state.lock().await;
        if !state.add_player_if_absent(player.clone()) {
            return false;
        }
        self.publisher
            .publish(&ServerMessage::roster_update(
                self.name.as_str(),
                RosterAction::Add,
                player,
            ))
            .await;
        true
    }

    /// Records a player leaving and publishes a REMOVE directive. Returns
    /// `false` (publishing nothing) if the player was not on the roster.
    pub async fn player_left(&self, id: PlayerId) -> bool {
        let mut state = self.state.lock().await;
        let Some(player) = state.remove_player(id) else {
            return false;
        };
        self.publisher
            .publish(&ServerMessage::roster_update(
                self.name.as_str(),
                RosterAction::Remove,
                player,
            ))
            .await;
        true
    }

    /// Changes the announced capacity. Returns `false` (publishing
    /// nothing) if it is unchanged.
    pub async fn set_max_players(&self, max_players: u32) -> bool {
        let mut state = self.state.lock().await;
        if state.max_players() == max_players {
            return false;
        }
        state.set_max_players(max_players);
        self.publisher
            .publish(&ServerMessage::max_players_update(
                self.name.as_str(),
                max_players,
            ))
            .await;
        true
    }

    /// Stops heartbeats, withdraws the server with a REMOVE and closes
    /// the broker connection.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.heartbeat.await {
            tracing::warn!(%error, "heartbeat task ended abnormally");
        }
        self.publisher
            .publish(&ServerMessage::remove(self.name.as_str()))
            .await;
        self.broker.close().await;
        tracing::info!(server = %self.name, "withdrew local server");
    }
}

fn spawn_heartbeat(
    state: Arc<Mutex<Server>>,
    publisher: SyncPublisher,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let state = state.lock().await;
                    publisher.publish(&ServerMessage::heartbeat_for(&state)).await;
                }
            }
        }
    })
}
