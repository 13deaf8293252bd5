//! Service layer: the running halves of the sync protocol.
//!
//! [`SyncService`] is the proxy side: it listens on the broker channel,
//! feeds the reducer and sweeps silent servers. [`LocalServer`] is the
//! backend side: it announces one server and its roster. Both publish
//! through a [`SyncPublisher`].

pub mod local_server;
pub mod publisher;
pub mod sweeper;
pub mod sync_service;

pub use local_server::LocalServer;
pub use publisher::SyncPublisher;
pub use sweeper::spawn_sweeper;
pub use sync_service::{SyncOptions, SyncService};
