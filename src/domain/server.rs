//! Fleet entities: backend servers and the players on their rosters.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::PlayerId;

/// A connected client attributed to a server's roster.
///
/// Only [`Player::id`] takes part in identity; the name is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    /// Unique player identifier.
    pub id: PlayerId,
    /// Display name reported by the backend.
    pub name: String,
}

impl Player {
    /// Creates a player record.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One backend process known to the fleet.
///
/// `name`, `ip` and `port` are fixed at construction. The roster, the
/// player capacity and the heartbeat timestamp are mutated in place by
/// the reducer while the server is held by a [`super::ServerRegistry`].
#[derive(Debug, Clone)]
pub struct Server {
    name: String,
    ip: String,
    port: u16,
    max_players: u32,
    players: HashMap<PlayerId, Player>,
    last_heartbeat: DateTime<Utc>,
}

impl Server {
    /// Creates a server with an empty roster, zero capacity and a
    /// heartbeat stamped now.
    #[must_use]
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self::new_at(name, ip, port, Utc::now())
    }

    /// Like [`Server::new`], stamping the heartbeat with `at`.
    #[must_use]
    pub fn new_at(
        name: impl Into<String>,
        ip: impl Into<String>,
        port: u16,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            max_players: 0,
            players: HashMap::new(),
            last_heartbeat: at,
        }
    }

    /// Registry key of this server.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address players are routed to.
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Port players are routed to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Player capacity, `0` until first reported.
    #[must_use]
    pub const fn max_players(&self) -> u32 {
        self.max_players
    }

    /// Replaces the player capacity.
    pub fn set_max_players(&mut self, max_players: u32) {
        self.max_players = max_players;
    }

    /// Timestamp of the most recent creation or heartbeat.
    #[must_use]
    pub const fn last_heartbeat(&self) -> DateTime<Utc> {
        self.last_heartbeat
    }

    /// Refreshes the heartbeat to `at`. The timestamp never moves backwards.
    pub fn heartbeat_at(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat = self.last_heartbeat.max(at);
    }

    /// Time elapsed between the last heartbeat and `now`.
    #[must_use]
    pub fn since_last_heartbeat_at(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.last_heartbeat
    }

    /// Time elapsed since the last heartbeat.
    #[must_use]
    pub fn since_last_heartbeat(&self) -> TimeDelta {
        self.since_last_heartbeat_at(Utc::now())
    }

    /// Inserts `player`, replacing any roster entry with the same id.
    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    /// Inserts `player` only if its id is not on the roster yet.
    ///
    /// Returns `true` if the roster changed.
    pub fn add_player_if_absent(&mut self, player: Player) -> bool {
        if self.players.contains_key(&player.id) {
            return false;
        }
        self.players.insert(player.id, player);
        true
    }

    /// Removes the player with the given id, returning it if present.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Looks up a roster entry.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Iterates the roster in no particular order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Number of players on the roster.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

/// Lightweight view of a server for list endpoints and logs.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    /// Server name.
    pub name: String,
    /// Routed address.
    pub ip: String,
    /// Routed port.
    pub port: u16,
    /// Player capacity.
    pub max_players: u32,
    /// Players currently on the roster.
    pub online_players: usize,
    /// Last heartbeat timestamp.
    pub last_heartbeat: DateTime<Utc>,
}

impl From<&Server> for ServerSummary {
    fn from(server: &Server) -> Self {
        Self {
            name: server.name.clone(),
            ip: server.ip.clone(),
            port: server.port,
            max_players: server.max_players,
            online_players: server.players.len(),
            last_heartbeat: server.last_heartbeat,
        }
    }
}
