//! Domain layer: fleet entities, the server registry and the host hook.
//!
//! This module contains the node-local model of the fleet: player
//! identity, servers with their rosters and heartbeat timestamps, the
//! registry that owns them, and the [`HostAdapter`] capability through
//! which registry membership becomes proxy routability.

pub mod host_adapter;
pub mod player_id;
pub mod server;
pub mod server_registry;

pub use host_adapter::{HostAdapter, Route, RoutingTable};
pub use player_id::PlayerId;
pub use server::{Player, Server, ServerSummary};
pub use server_registry::{HeartbeatOutcome, ServerRegistry};
