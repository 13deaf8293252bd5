//! serversync node entry point.
//!
//! Runs either a proxy (registry, listener, sweeper) or a backend
//! announcer, plus the read-only status API.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use serversync::api;
use serversync::app_state::AppState;
use serversync::broker::BrokerTransport;
use serversync::config::{NodeRole, SyncConfig};
use serversync::domain::{RoutingTable, ServerRegistry};
use serversync::service::{LocalServer, SyncOptions, SyncService};

/// Whichever half of the protocol this node runs.
enum Node {
    Proxy(SyncService),
    Backend(LocalServer),
}

impl Node {
    async fn shutdown(self) {
        match self {
            Self::Proxy(service) => service.shutdown().await,
            Self::Backend(local) => local.shutdown().await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = SyncConfig::from_env().context("invalid configuration")?;
    tracing::info!(role = %config.role, addr = %config.listen_addr, "starting serversync");

    // Build domain layer
    let routing = Arc::new(RoutingTable::new());
    let registry = Arc::new(ServerRegistry::new(routing, config.max_alive_time));

    // Start the sync subsystem; the status API stays up without it
    let broker = build_broker(&config)?;
    let node = match start_node(&config, Arc::clone(&registry), broker).await {
        Ok(node) => Some(node),
        Err(error) => {
            tracing::error!(error = %error, "sync subsystem not started");
            None
        }
    };

    let app_state = AppState {
        registry,
        role: config.role,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("could not bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(node) = node {
        node.shutdown().await;
    }
    tracing::info!("serversync stopped");
    Ok(())
}

async fn start_node(
    config: &SyncConfig,
    registry: Arc<ServerRegistry>,
    broker: Arc<dyn BrokerTransport>,
) -> anyhow::Result<Node> {
    match (config.role, &config.backend) {
        (NodeRole::Proxy, _) => {
            let service = SyncService::start(registry, broker, SyncOptions::from(config)).await?;
            Ok(Node::Proxy(service))
        }
        (NodeRole::Backend, Some(backend)) => {
            let local = LocalServer::start(backend, &config.channel, broker).await?;
            Ok(Node::Backend(local))
        }
        (NodeRole::Backend, None) => anyhow::bail!("backend role without backend settings"),
    }
}

#[cfg(feature = "redis")]
fn build_broker(config: &SyncConfig) -> anyhow::Result<Arc<dyn BrokerTransport>> {
    let url = config
        .redis_url
        .as_deref()
        .context("REDIS_URL is required")?;
    Ok(Arc::new(serversync::broker::RedisBroker::new(url)?))
}

#[cfg(not(feature = "redis"))]
fn build_broker(_config: &SyncConfig) -> anyhow::Result<Arc<dyn BrokerTransport>> {
    tracing::warn!("built without redis; using an in-process broker");
    Ok(Arc::new(serversync::broker::LocalBroker::default()))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
