//! Deterministic application of [`ServerMessage`]s to a registry.
//!
//! Every node, publisher included, runs each observed message through
//! [`apply`]. Given the same registry state and message, the outcome is
//! the same on every node; that is what keeps the fleet view convergent
//! without a coordinator.

use chrono::{DateTime, Utc};

use super::message::{DecodeError, RosterAction, ServerMessage, UpdatePatch};
use crate::domain::{HeartbeatOutcome, Server, ServerRegistry};

/// What applying one message did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// CREATE inserted a fresh server.
    Created {
        /// Whether a server with the same name was replaced.
        replaced: bool,
    },
    /// HEARTBEAT for a known server advanced its heartbeat.
    Refreshed,
    /// HEARTBEAT for an unknown server recreated it from the payload.
    Resynced,
    /// UPDATE added a player.
    PlayerAdded,
    /// UPDATE tried to add a player that was already on the roster.
    PlayerAlreadyPresent,
    /// UPDATE removed a player.
    PlayerRemoved,
    /// UPDATE tried to remove a player that was not on the roster.
    PlayerAbsent,
    /// UPDATE replaced the player capacity.
    MaxPlayersSet,
    /// UPDATE for a known server carried no payload.
    EmptyUpdate,
    /// UPDATE referenced a server this node does not know.
    UnknownServer,
    /// REMOVE deleted the server.
    Removed,
    /// REMOVE referenced a server this node does not know.
    AlreadyAbsent,
}

/// Applies `message` to `registry`, stamping heartbeats with the current time.
pub async fn apply(registry: &ServerRegistry, message: ServerMessage) -> Applied {
    apply_at(registry, message, Utc::now()).await
}

/// Applies `message` to `registry`, stamping heartbeats with `now`.
pub async fn apply_at(
    registry: &ServerRegistry,
    message: ServerMessage,
    now: DateTime<Utc>,
) -> Applied {
    match message {
        ServerMessage::Create {
            name,
            ip,
            port,
            max_players,
        } => {
            let mut server = Server::new_at(name, ip, port, now);
            server.set_max_players(max_players);
            let replaced = registry.upsert(server).await.is_some();
            Applied::Created { replaced }
        }
        ServerMessage::Heartbeat {
            name,
            ip,
            port,
            max_players,
            players,
        } => {
            // A known server only gets its liveness refreshed; the payload
            // is used solely to rebuild a server this node has missed.
            let outcome = registry
                .heartbeat_or_insert_with(&name, now, || {
                    let mut server = Server::new_at(name.as_str(), ip, port, now);
                    server.set_max_players(max_players);
                    for player in players {
                        server.add_player(player);
                    }
                    server
                })
                .await;
            match outcome {
                HeartbeatOutcome::Refreshed => Applied::Refreshed,
                HeartbeatOutcome::Inserted => Applied::Resynced,
            }
        }
        ServerMessage::Update { name, patch } => apply_update(registry, &name, patch).await,
        ServerMessage::Remove { name } => match registry.remove(&name).await {
            Some(_) => Applied::Removed,
            None => Applied::AlreadyAbsent,
        },
    }
}

async fn apply_update(
    registry: &ServerRegistry,
    name: &str,
    patch: Option<UpdatePatch>,
) -> Applied {
    let applied = registry
        .modify(name, |server| match patch {
            Some(UpdatePatch::Roster {
                action: RosterAction::Add,
                player,
            }) => {
                if server.add_player_if_absent(player) {
                    Applied::PlayerAdded
                } else {
                    Applied::PlayerAlreadyPresent
                }
            }
            Some(UpdatePatch::Roster {
                action: RosterAction::Remove,
                player,
            }) => match server.remove_player(player.id) {
                Some(_) => Applied::PlayerRemoved,
                None => Applied::PlayerAbsent,
            },
            Some(UpdatePatch::MaxPlayers(max_players)) => {
                server.set_max_players(max_players);
                Applied::MaxPlayersSet
            }
            None => Applied::EmptyUpdate,
        })
        .await;
    applied.unwrap_or(Applied::UnknownServer)
}

/// Decodes one broker payload and applies it to `registry`.
///
/// A HEARTBEAT whose only defect is a bad roster token still refreshes the
/// liveness of a server this node already knows; its payload is ignored
/// for known servers anyway.
///
/// # Errors
///
/// Returns the [`DecodeError`] if the payload is not a valid message.
/// Apart from the liveness refresh above, the registry is left untouched
/// in that case.
pub async fn handle_payload(registry: &ServerRegistry, payload: &[u8]) -> Result<Applied, DecodeError> {
    let message = match ServerMessage::decode(payload) {
        Ok(message) => message,
        Err(error) => {
            if let Some(name) = error.heartbeat_server() {
                let now = Utc::now();
                registry.modify(name, |server| server.heartbeat_at(now)).await;
            }
            return Err(error);
        }
    };
    let kind = message.kind();
    let applied = apply(registry, message).await;
    if applied == Applied::UnknownServer {
        tracing::debug!(%kind, "update for unknown server dropped");
    } else {
        tracing::debug!(%kind, ?applied, "message applied");
    }
    Ok(applied)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeDelta;

    use super::*;
    use crate::domain::{HostAdapter, Player, PlayerId, RoutingTable};

    fn registry() -> (ServerRegistry, Arc<RoutingTable>) {
        let table = Arc::new(RoutingTable::new());
        let adapter = Arc::clone(&table) as Arc<dyn HostAdapter>;
        let registry = ServerRegistry::new(adapter, Duration::from_secs(30));
        (registry, table)
    }

    fn create(name: &str, ip: &str, port: u16) -> ServerMessage {
        ServerMessage::Create {
            name: name.to_string(),
            ip: ip.to_string(),
            port,
            max_players: 0,
        }
    }

    fn heartbeat(name: &str, max_players: u32, players: Vec<Player>) -> ServerMessage {
        ServerMessage::Heartbeat {
            name: name.to_string(),
            ip: "10.0.0.1".to_string(),
            port: 25565,
            max_players,
            players,
        }
    }

    #[tokio::test]
    async fn create_inserts_empty_server() {
        let (registry, table) = registry();
        let now = Utc::now();
        let applied = apply_at(&registry, create("lobby-1", "10.0.0.1", 25565), now).await;
        assert_eq!(applied, Applied::Created { replaced: false });

        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing after CREATE");
        };
        assert_eq!(server.ip(), "10.0.0.1");
        assert_eq!(server.port(), 25565);
        assert_eq!(server.max_players(), 0);
        assert_eq!(server.player_count(), 0);
        assert_eq!(server.last_heartbeat(), now);
        assert!(table.route("lobby-1").is_some());
    }

    #[tokio::test]
    async fn second_create_replaces_without_merge() {
        let (registry, _table) = registry();
        apply(&registry, create("lobby-1", "10.0.0.1", 25565)).await;
        apply(
            &registry,
            ServerMessage::roster_update("lobby-1", RosterAction::Add, Player::new(PlayerId::new(), "Steve")),
        )
        .await;

        let applied = apply(&registry, create("lobby-1", "10.0.0.2", 25566)).await;
        assert_eq!(applied, Applied::Created { replaced: true });

        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing after second CREATE");
        };
        assert_eq!(server.ip(), "10.0.0.2");
        assert_eq!(server.port(), 25566);
        assert_eq!(server.player_count(), 0);
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_resyncs_full_state() {
        let (registry, _table) = registry();
        let alice = Player::new(PlayerId::new(), "Alice");
        let bob = Player::new(PlayerId::new(), "Bob");

        let applied = apply(&registry, heartbeat("lobby-1", 40, vec![alice.clone(), bob.clone()])).await;
        assert_eq!(applied, Applied::Resynced);

        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing after resync");
        };
        assert_eq!(server.max_players(), 40);
        assert_eq!(server.player_count(), 2);
        assert_eq!(server.player(alice.id), Some(&alice));
        assert_eq!(server.player(bob.id), Some(&bob));
    }

    #[tokio::test]
    async fn heartbeat_for_known_only_refreshes() {
        let (registry, _table) = registry();
        let start = Utc::now();
        apply_at(&registry, create("lobby-1", "10.0.0.1", 25565), start).await;

        let later = start + TimeDelta::seconds(5);
        let msg = ServerMessage::Heartbeat {
            name: "lobby-1".to_string(),
            ip: "10.9.9.9".to_string(),
            port: 1,
            max_players: 99,
            players: vec![Player::new(PlayerId::new(), "Steve")],
        };
        assert_eq!(apply_at(&registry, msg, later).await, Applied::Refreshed);

        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing");
        };
        assert_eq!(server.ip(), "10.0.0.1");
        assert_eq!(server.port(), 25565);
        assert_eq!(server.max_players(), 0);
        assert_eq!(server.player_count(), 0);
        assert_eq!(server.last_heartbeat(), later);
    }

    #[tokio::test]
    async fn add_existing_player_is_idempotent() {
        let (registry, _table) = registry();
        apply(&registry, create("lobby-1", "10.0.0.1", 25565)).await;
        let steve = Player::new(PlayerId::new(), "Steve");

        let first = apply(
            &registry,
            ServerMessage::roster_update("lobby-1", RosterAction::Add, steve.clone()),
        )
        .await;
        let second = apply(
            &registry,
            ServerMessage::roster_update("lobby-1", RosterAction::Add, steve),
        )
        .await;

        assert_eq!(first, Applied::PlayerAdded);
        assert_eq!(second, Applied::PlayerAlreadyPresent);
        assert_eq!(registry.get("lobby-1").await.map(|s| s.player_count()), Some(1));
    }

    #[tokio::test]
    async fn remove_player_matches_by_id() {
        let (registry, _table) = registry();
        apply(&registry, create("lobby-1", "10.0.0.1", 25565)).await;
        let id = PlayerId::new();
        apply(
            &registry,
            ServerMessage::roster_update("lobby-1", RosterAction::Add, Player::new(id, "Steve")),
        )
        .await;

        let removed = apply(
            &registry,
            ServerMessage::roster_update("lobby-1", RosterAction::Remove, Player::new(id, "Renamed")),
        )
        .await;
        let again = apply(
            &registry,
            ServerMessage::roster_update("lobby-1", RosterAction::Remove, Player::new(id, "Steve")),
        )
        .await;

        assert_eq!(removed, Applied::PlayerRemoved);
        assert_eq!(again, Applied::PlayerAbsent);
    }

    #[tokio::test]
    async fn update_for_unknown_server_is_noop() {
        let (registry, table) = registry();
        let applied = apply(&registry, ServerMessage::max_players_update("ghost", 50)).await;

        assert_eq!(applied, Applied::UnknownServer);
        assert!(registry.get("ghost").await.is_none());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn empty_update_is_noop() {
        let (registry, _table) = registry();
        apply(&registry, create("lobby-1", "10.0.0.1", 25565)).await;
        let applied = apply(
            &registry,
            ServerMessage::Update {
                name: "lobby-1".to_string(),
                patch: None,
            },
        )
        .await;
        assert_eq!(applied, Applied::EmptyUpdate);
    }

    #[tokio::test]
    async fn lobby_scenario() {
        let (registry, table) = registry();
        apply(&registry, create("lobby-1", "10.0.0.1", 25565)).await;
        apply(
            &registry,
            heartbeat("lobby-1", 0, vec![Player::new(PlayerId::new(), "Steve")]),
        )
        .await;

        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing");
        };
        assert_eq!(server.player_count(), 0);
        assert_eq!(server.max_players(), 0);

        apply(&registry, ServerMessage::max_players_update("lobby-1", 100)).await;
        assert_eq!(registry.get("lobby-1").await.map(|s| s.max_players()), Some(100));

        let removed = apply(
            &registry,
            ServerMessage::Remove {
                name: "lobby-1".to_string(),
            },
        )
        .await;
        assert_eq!(removed, Applied::Removed);
        assert!(registry.get("lobby-1").await.is_none());
        assert!(table.route("lobby-1").is_none());
    }

    #[tokio::test]
    async fn remove_unknown_is_noop() {
        let (registry, _table) = registry();
        let applied = apply(
            &registry,
            ServerMessage::Remove {
                name: "ghost".to_string(),
            },
        )
        .await;
        assert_eq!(applied, Applied::AlreadyAbsent);
    }

    #[tokio::test]
    async fn evicted_server_reenters_on_heartbeat() {
        let (registry, _table) = registry();
        let start = Utc::now();
        apply_at(&registry, create("lobby-1", "10.0.0.1", 25565), start).await;
        registry.sweep_at(start + TimeDelta::seconds(31)).await;
        assert!(!registry.contains("lobby-1").await);

        let applied = apply(&registry, heartbeat("lobby-1", 10, Vec::new())).await;
        assert_eq!(applied, Applied::Resynced);
        assert!(registry.contains("lobby-1").await);
    }

    #[tokio::test]
    async fn handle_payload_rejects_without_mutation() {
        let (registry, _table) = registry();
        let result = handle_payload(&registry, br#"{"type":"CREATE","name":"lobby-1"}"#).await;
        assert!(result.is_err());
        assert!(registry.is_empty().await);

        let ok = handle_payload(&registry, br#"{"type":"REMOVE","name":"lobby-1"}"#).await;
        assert!(matches!(ok, Ok(Applied::AlreadyAbsent)));
    }

    #[tokio::test]
    async fn bad_roster_token_still_refreshes_known_server() {
        let (registry, _table) = registry();
        let stale = Utc::now() - TimeDelta::seconds(60);
        apply_at(&registry, create("lobby-1", "10.0.0.1", 25565), stale).await;

        let payload = br#"{"type":"HEARTBEAT","name":"lobby-1","ip":"10.0.0.1","port":25565,"maxPlayers":10,"players":["not-a-token"]}"#;
        let result = handle_payload(&registry, payload).await;
        assert!(matches!(result, Err(DecodeError::MalformedRoster { .. })));

        let Some(server) = registry.get("lobby-1").await else {
            panic!("known server dropped");
        };
        assert!(server.last_heartbeat() > stale);
        assert_eq!(server.max_players(), 0);
        assert!(registry.sweep().await.is_empty());

        let ghost = br#"{"type":"HEARTBEAT","name":"ghost","ip":"10.0.0.9","port":1,"maxPlayers":1,"players":["bad"]}"#;
        assert!(handle_payload(&registry, ghost).await.is_err());
        assert!(!registry.contains("ghost").await);
    }
}
