//! Multi-node convergence over a shared in-process broker.
//!
//! Each test wires backends and proxies to handles on one `LocalBroker`
//! bus and checks that every proxy ends up with the same view.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use serversync::broker::{BrokerError, BrokerTransport, DEFAULT_CHANNEL, LocalBroker};
use serversync::config::BackendConfig;
use serversync::domain::{HostAdapter, Player, PlayerId, RoutingTable, ServerRegistry};
use serversync::error::SyncError;
use serversync::service::{LocalServer, SyncOptions, SyncService};

struct Proxy {
    routes: Arc<RoutingTable>,
    service: SyncService,
}

impl Proxy {
    async fn start(bus: &LocalBroker, max_alive: Duration, sweep_period: Duration) -> Self {
        let routes = Arc::new(RoutingTable::new());
        let adapter = Arc::clone(&routes) as Arc<dyn HostAdapter>;
        let registry = Arc::new(ServerRegistry::new(adapter, max_alive));
        let options = SyncOptions {
            channel: DEFAULT_CHANNEL.to_string(),
            sweep_period,
        };
        let Ok(service) = SyncService::start(registry, Arc::new(bus.handle()), options).await else {
            panic!("proxy failed to start");
        };
        Self { routes, service }
    }

    fn registry(&self) -> &ServerRegistry {
        self.service.registry()
    }
}

async fn backend(bus: &LocalBroker, name: &str, heartbeat: Duration) -> LocalServer {
    let config = BackendConfig {
        name: name.to_string(),
        ip: "10.0.0.1".to_string(),
        port: 25565,
        max_players: 20,
        heartbeat_interval: heartbeat,
    };
    let Ok(local) = LocalServer::start(&config, DEFAULT_CHANNEL, Arc::new(bus.handle())).await
    else {
        panic!("backend failed to start");
    };
    local
}

/// Polls `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn online(registry: &ServerRegistry, name: &str) -> usize {
    registry.get(name).await.map_or(0, |s| s.player_count())
}

#[tokio::test]
async fn proxies_converge_on_backend_lifecycle() {
    let bus = LocalBroker::default();
    let alive = Duration::from_secs(30);
    let a = Proxy::start(&bus, alive, Duration::from_secs(5)).await;
    let b = Proxy::start(&bus, alive, Duration::from_secs(5)).await;

    let (ra, rb) = (a.registry(), b.registry());

    let lobby = backend(&bus, "lobby-1", Duration::from_secs(60)).await;
    assert!(eventually(move || ra.contains("lobby-1")).await);
    assert!(eventually(move || rb.contains("lobby-1")).await);
    assert!(a.routes.route("lobby-1").is_some());

    let steve = Player::new(PlayerId::new(), "Steve");
    assert!(lobby.player_joined(steve.clone()).await);
    assert!(eventually(move || async move { online(ra, "lobby-1").await == 1 }).await);
    assert!(eventually(move || async move { online(rb, "lobby-1").await == 1 }).await);

    assert!(lobby.player_left(steve.id).await);
    assert!(eventually(move || async move { online(rb, "lobby-1").await == 0 }).await);

    lobby.shutdown().await;
    assert!(eventually(move || async move { !ra.contains("lobby-1").await }).await);
    assert!(eventually(move || async move { !rb.contains("lobby-1").await }).await);
    assert!(a.routes.is_empty());

    a.service.shutdown().await;
    b.service.shutdown().await;
}

#[tokio::test]
async fn late_proxy_resyncs_from_heartbeat() {
    let bus = LocalBroker::default();
    let lobby = backend(&bus, "lobby-1", Duration::from_millis(100)).await;
    assert!(lobby.player_joined(Player::new(PlayerId::new(), "Alice")).await);
    assert!(lobby.set_max_players(64).await);

    // Joined after CREATE and the roster update went out.
    let late = Proxy::start(&bus, Duration::from_secs(30), Duration::from_secs(5)).await;
    let registry = late.registry();
    assert!(eventually(move || registry.contains("lobby-1")).await);

    let Some(server) = late.registry().get("lobby-1").await else {
        panic!("server missing after resync");
    };
    assert_eq!(server.player_count(), 1);
    assert_eq!(server.max_players(), 64);
    assert!(late.routes.route("lobby-1").is_some());

    lobby.shutdown().await;
    late.service.shutdown().await;
}

#[tokio::test]
async fn silent_backend_is_evicted() {
    let bus = LocalBroker::default();
    let proxy = Proxy::start(&bus, Duration::from_millis(200), Duration::from_millis(50)).await;

    let quiet = backend(&bus, "quiet", Duration::from_secs(60)).await;
    let chatty = backend(&bus, "chatty", Duration::from_millis(50)).await;
    let registry = proxy.registry();
    assert!(eventually(move || registry.contains("quiet")).await);

    assert!(eventually(move || async move { !registry.contains("quiet").await }).await);
    assert!(proxy.routes.route("quiet").is_none());
    assert!(proxy.registry().contains("chatty").await);

    quiet.shutdown().await;
    chatty.shutdown().await;
    proxy.service.shutdown().await;
}

#[tokio::test]
async fn garbage_on_the_channel_is_ignored() {
    let bus = LocalBroker::default();
    let proxy = Proxy::start(&bus, Duration::from_secs(30), Duration::from_secs(5)).await;

    let raw = bus.handle();
    for payload in [
        b"not json".as_slice(),
        br#"{"name":"no-type"}"#.as_slice(),
        br#"{"type":"SHUTDOWN","name":"x"}"#.as_slice(),
        br#"{"type":"CREATE","name":"missing-fields"}"#.as_slice(),
    ] {
        assert!(raw.publish(DEFAULT_CHANNEL, payload.to_vec()).await.is_ok());
    }

    let lobby = backend(&bus, "lobby-1", Duration::from_secs(60)).await;
    let registry = proxy.registry();
    assert!(eventually(move || registry.contains("lobby-1")).await);
    assert_eq!(proxy.registry().len().await, 1);

    lobby.shutdown().await;
    proxy.service.shutdown().await;
}

#[tokio::test]
async fn closed_transport_fails_proxy_start() {
    let bus = LocalBroker::default();
    let handle = bus.handle();
    handle.close().await;

    let registry = Arc::new(ServerRegistry::new(
        Arc::new(RoutingTable::new()),
        Duration::from_secs(30),
    ));
    let result = SyncService::start(registry, Arc::new(handle), SyncOptions::default()).await;
    assert!(matches!(
        result,
        Err(SyncError::Broker(BrokerError::Closed))
    ));
    assert_eq!(bus.subscriber_count(), 0);
}
