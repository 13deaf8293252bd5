//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::NodeRole;
use crate::domain::ServerRegistry;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live view of the fleet.
    pub registry: Arc<ServerRegistry>,
    /// Role this node runs as.
    pub role: NodeRole,
}
