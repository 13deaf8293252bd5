//! Platform hook that makes servers routable on the local proxy.
//!
//! The [`super::ServerRegistry`] calls a [`HostAdapter`] exactly once per
//! logical add and once per logical remove. Each proxy platform supplies
//! its own implementation; [`RoutingTable`] is the in-process one used by
//! the bundled binary.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use super::Server;

/// Capability injected into the registry to mirror membership into the
/// proxy's live server table.
///
/// Calls are made while the registry lock is held, so implementations
/// must not block. Registering a name that is already routable and
/// unregistering a name that is not must both be no-ops.
pub trait HostAdapter: Send + Sync + fmt::Debug {
    /// Makes `server` routable.
    fn register_routable(&self, server: &Server);

    /// Stops routing to `server`.
    fn unregister_routable(&self, server: &Server);
}

/// Network location of a routable server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Target address.
    pub ip: String,
    /// Target port.
    pub port: u16,
}

/// In-memory proxy routing table keyed by server name.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: RwLock<HashMap<String, Route>>,
}

impl RoutingTable {
    /// Creates an empty routing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the route for `name`, if registered.
    #[must_use]
    pub fn route(&self, name: &str) -> Option<Route> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns the number of routable servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is routable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HostAdapter for RoutingTable {
    fn register_routable(&self, server: &Server) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(server.name()) {
            return;
        }
        routes.insert(
            server.name().to_string(),
            Route {
                ip: server.ip().to_string(),
                port: server.port(),
            },
        );
        tracing::info!(
            server = server.name(),
            ip = server.ip(),
            port = server.port(),
            "server registered in routing table"
        );
    }

    fn unregister_routable(&self, server: &Server) {
        let removed = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server.name());
        if removed.is_some() {
            tracing::info!(server = server.name(), "server unregistered from routing table");
        }
    }
}
