//! Server DTOs for list and detail responses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Player, PlayerId, Server, ServerSummary};

/// One entry of `GET /servers`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServerSummaryDto {
    /// Server name.
    pub name: String,
    /// Routed address.
    pub ip: String,
    /// Routed port.
    pub port: u16,
    /// Player capacity.
    pub max_players: u32,
    /// Players currently on the server.
    pub online_players: usize,
    /// Last time the server was heard from.
    pub last_heartbeat: DateTime<Utc>,
}

impl From<ServerSummary> for ServerSummaryDto {
    fn from(summary: ServerSummary) -> Self {
        Self {
            name: summary.name,
            ip: summary.ip,
            port: summary.port,
            max_players: summary.max_players,
            online_players: summary.online_players,
            last_heartbeat: summary.last_heartbeat,
        }
    }
}

/// Response body for `GET /servers`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServerListResponse {
    /// Known servers, sorted by name.
    pub data: Vec<ServerSummaryDto>,
    /// Number of known servers.
    pub total: usize,
}

/// A player on a server roster.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerDto {
    /// Player UUID.
    #[schema(value_type = String, format = Uuid)]
    pub id: PlayerId,
    /// Display name.
    pub name: String,
}

impl From<&Player> for PlayerDto {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
        }
    }
}

/// Response body for `GET /servers/{name}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServerDetailResponse {
    /// Server name.
    pub name: String,
    /// Routed address.
    pub ip: String,
    /// Routed port.
    pub port: u16,
    /// Player capacity.
    pub max_players: u32,
    /// Last time the server was heard from.
    pub last_heartbeat: DateTime<Utc>,
    /// Seconds since the last heartbeat.
    pub seconds_since_heartbeat: i64,
    /// Current roster, sorted by player name.
    pub players: Vec<PlayerDto>,
}

impl From<&Server> for ServerDetailResponse {
    fn from(server: &Server) -> Self {
        let mut players: Vec<PlayerDto> = server.players().map(PlayerDto::from).collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            name: server.name().to_string(),
            ip: server.ip().to_string(),
            port: server.port(),
            max_players: server.max_players(),
            last_heartbeat: server.last_heartbeat(),
            seconds_since_heartbeat: server.since_last_heartbeat().num_seconds(),
            players,
        }
    }
}
