//! Authoritative local view of which servers are alive.
//!
//! [`ServerRegistry`] owns every [`Server`] this node knows about. A
//! server being present in the registry and being routable on the proxy
//! are the same fact: every insertion and removal goes through the
//! injected [`HostAdapter`] under the same lock that mutates the map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

use super::host_adapter::HostAdapter;
use super::server::{Server, ServerSummary};

/// Result of [`ServerRegistry::heartbeat_or_insert_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The server was known and only its heartbeat advanced.
    Refreshed,
    /// The server was unknown and has been inserted.
    Inserted,
}

/// Name-keyed store of live servers with liveness eviction.
///
/// # Concurrency
///
/// A single `RwLock` guards the whole map, entities included. Every
/// operation holds it for exactly one map operation, so concurrent
/// callers (inbound reducer, sweeper, local host events) never observe a
/// half-applied change. Host-adapter calls happen under the lock and are
/// required to be non-blocking.
#[derive(Debug)]
pub struct ServerRegistry {
    servers: RwLock<HashMap<String, Server>>,
    host: Arc<dyn HostAdapter>,
    max_alive_time: TimeDelta,
}

impl ServerRegistry {
    /// Creates an empty registry.
    ///
    /// Servers whose last heartbeat is strictly older than
    /// `max_alive_time` are evicted by [`ServerRegistry::sweep`].
    #[must_use]
    pub fn new(host: Arc<dyn HostAdapter>, max_alive_time: Duration) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            host,
            max_alive_time: TimeDelta::from_std(max_alive_time).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Inserts `server`, replacing any server with the same name.
    ///
    /// A replaced server is unregistered from the host before the new one
    /// is registered. Returns the replaced server, if any.
    pub async fn upsert(&self, server: Server) -> Option<Server> {
        let mut map = self.servers.write().await;
        let replaced = map.remove(server.name());
        if let Some(old) = &replaced {
            self.host.unregister_routable(old);
        }
        self.host.register_routable(&server);
        tracing::debug!(
            server = server.name(),
            replaced = replaced.is_some(),
            "server upserted"
        );
        map.insert(server.name().to_string(), server);
        replaced
    }

    /// Removes the server called `name`, unregistering it from the host.
    ///
    /// Returns the removed server; `None` (and no host call) if absent.
    pub async fn remove(&self, name: &str) -> Option<Server> {
        let mut map = self.servers.write().await;
        self.remove_locked(&mut map, name)
    }

    /// Returns a snapshot of the server called `name`.
    pub async fn get(&self, name: &str) -> Option<Server> {
        self.servers.read().await.get(name).cloned()
    }

    /// Returns `true` if a server called `name` is known.
    pub async fn contains(&self, name: &str) -> bool {
        self.servers.read().await.contains_key(name)
    }

    /// Advances the heartbeat of `name` to `at` if known; otherwise
    /// builds a server with `build` and inserts it.
    ///
    /// Lookup and insertion happen under one write lock, so no other
    /// activity can create the server in between.
    pub async fn heartbeat_or_insert_with<F>(
        &self,
        name: &str,
        at: DateTime<Utc>,
        build: F,
    ) -> HeartbeatOutcome
    where
        F: FnOnce() -> Server,
    {
        let mut map = self.servers.write().await;
        if let Some(server) = map.get_mut(name) {
            server.heartbeat_at(at);
            return HeartbeatOutcome::Refreshed;
        }
        let server = build();
        self.host.register_routable(&server);
        map.insert(name.to_string(), server);
        HeartbeatOutcome::Inserted
    }

    /// Applies `f` to the server called `name` in place.
    ///
    /// Returns `None` without calling `f` if the server is unknown.
    pub async fn modify<R, F>(&self, name: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Server) -> R,
    {
        let mut map = self.servers.write().await;
        map.get_mut(name).map(f)
    }

    /// Evicts every server whose heartbeat is older than the threshold.
    ///
    /// Returns the names of evicted servers.
    pub async fn sweep(&self) -> Vec<String> {
        self.sweep_at(Utc::now()).await
    }

    /// Like [`ServerRegistry::sweep`], measuring staleness against `now`.
    ///
    /// A server is evicted iff `now - last_heartbeat > max_alive_time`;
    /// exactly reaching the threshold keeps it alive.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut map = self.servers.write().await;
        let stale: Vec<String> = map
            .values()
            .filter(|server| server.since_last_heartbeat_at(now) > self.max_alive_time)
            .map(|server| server.name().to_string())
            .collect();

        for name in &stale {
            if let Some(server) = self.remove_locked(&mut map, name) {
                tracing::info!(
                    server = %name,
                    since_last_heartbeat_ms = server.since_last_heartbeat_at(now).num_milliseconds(),
                    "evicted stale server"
                );
            }
        }
        stale
    }

    /// Returns summaries of all servers, ordered by name.
    pub async fn list(&self) -> Vec<ServerSummary> {
        let map = self.servers.read().await;
        let mut summaries: Vec<ServerSummary> = map.values().map(ServerSummary::from).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Returns the number of known servers.
    pub async fn len(&self) -> usize {
        self.servers.read().await.len()
    }

    /// Returns `true` if no server is known.
    pub async fn is_empty(&self) -> bool {
        self.servers.read().await.is_empty()
    }

    fn remove_locked(&self, map: &mut HashMap<String, Server>, name: &str) -> Option<Server> {
        let server = map.get(name)?;
        self.host.unregister_routable(server);
        map.remove(name)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{Player, PlayerId};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum HostCall {
        Register(String),
        Unregister(String),
    }

    #[derive(Debug, Default)]
    struct RecordingHost {
        calls: Mutex<Vec<HostCall>>,
    }

    impl RecordingHost {
        fn calls(&self) -> Vec<HostCall> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    impl HostAdapter for RecordingHost {
        fn register_routable(&self, server: &Server) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(HostCall::Register(server.name().to_string()));
            }
        }

        fn unregister_routable(&self, server: &Server) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(HostCall::Unregister(server.name().to_string()));
            }
        }
    }

    fn registry() -> (ServerRegistry, Arc<RecordingHost>) {
        let host = Arc::new(RecordingHost::default());
        let registry = ServerRegistry::new(
            Arc::clone(&host) as Arc<dyn HostAdapter>,
            Duration::from_secs(30),
        );
        (registry, host)
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let (registry, host) = registry();
        assert!(registry.upsert(Server::new("lobby-1", "10.0.0.1", 25565)).await.is_none());

        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing after upsert");
        };
        assert_eq!(server.ip(), "10.0.0.1");
        assert_eq!(host.calls(), vec![HostCall::Register("lobby-1".to_string())]);
    }

    #[tokio::test]
    async fn upsert_replaces_with_unregister_then_register() {
        let (registry, host) = registry();
        let mut first = Server::new("lobby-1", "10.0.0.1", 25565);
        first.add_player(Player::new(PlayerId::new(), "Steve"));
        registry.upsert(first).await;

        let replaced = registry.upsert(Server::new("lobby-1", "10.0.0.2", 25566)).await;
        assert_eq!(replaced.map(|s| s.player_count()), Some(1));

        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing after replace");
        };
        assert_eq!(server.ip(), "10.0.0.2");
        assert_eq!(server.player_count(), 0);
        assert_eq!(
            host.calls(),
            vec![
                HostCall::Register("lobby-1".to_string()),
                HostCall::Unregister("lobby-1".to_string()),
                HostCall::Register("lobby-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn remove_absent_skips_host() {
        let (registry, host) = registry();
        assert!(registry.remove("ghost").await.is_none());
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn remove_unregisters_once() {
        let (registry, host) = registry();
        registry.upsert(Server::new("lobby-1", "10.0.0.1", 25565)).await;
        assert!(registry.remove("lobby-1").await.is_some());
        assert!(registry.remove("lobby-1").await.is_none());

        let unregisters = host
            .calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Unregister(_)))
            .count();
        assert_eq!(unregisters, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn heartbeat_or_insert_refreshes_known() {
        let (registry, host) = registry();
        let start = Utc::now();
        registry
            .upsert(Server::new_at("lobby-1", "10.0.0.1", 25565, start))
            .await;

        let later = start + TimeDelta::seconds(4);
        let outcome = registry
            .heartbeat_or_insert_with("lobby-1", later, || {
                Server::new("lobby-1", "10.9.9.9", 1)
            })
            .await;

        assert_eq!(outcome, HeartbeatOutcome::Refreshed);
        let Some(server) = registry.get("lobby-1").await else {
            panic!("server missing");
        };
        assert_eq!(server.last_heartbeat(), later);
        assert_eq!(server.ip(), "10.0.0.1");
        assert_eq!(host.calls().len(), 1);
    }

    #[tokio::test]
    async fn heartbeat_or_insert_inserts_unknown() {
        let (registry, host) = registry();
        let outcome = registry
            .heartbeat_or_insert_with("lobby-2", Utc::now(), || {
                Server::new("lobby-2", "10.0.0.2", 25565)
            })
            .await;

        assert_eq!(outcome, HeartbeatOutcome::Inserted);
        assert!(registry.contains("lobby-2").await);
        assert_eq!(host.calls(), vec![HostCall::Register("lobby-2".to_string())]);
    }

    #[tokio::test]
    async fn modify_unknown_returns_none() {
        let (registry, _host) = registry();
        let touched = registry.modify("ghost", |s| s.set_max_players(50)).await;
        assert!(touched.is_none());
        assert!(registry.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn sweep_boundary_is_exclusive() {
        let (registry, host) = registry();
        let start = Utc::now();
        registry
            .upsert(Server::new_at("at-limit", "10.0.0.1", 25565, start))
            .await;
        registry
            .upsert(Server::new_at(
                "past-limit",
                "10.0.0.2",
                25565,
                start - TimeDelta::milliseconds(1),
            ))
            .await;

        let evicted = registry.sweep_at(start + TimeDelta::seconds(30)).await;

        assert_eq!(evicted, vec!["past-limit".to_string()]);
        assert!(registry.contains("at-limit").await);
        assert!(!registry.contains("past-limit").await);
        assert!(host
            .calls()
            .contains(&HostCall::Unregister("past-limit".to_string())));
    }

    #[tokio::test]
    async fn sweep_keeps_fresh_servers() {
        let (registry, _host) = registry();
        registry.upsert(Server::new("lobby-1", "10.0.0.1", 25565)).await;
        assert!(registry.sweep().await.is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let (registry, _host) = registry();
        registry.upsert(Server::new("b", "10.0.0.2", 1)).await;
        registry.upsert(Server::new("a", "10.0.0.1", 1)).await;

        let names: Vec<String> = registry.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
