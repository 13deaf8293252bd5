//! # serversync
//!
//! Keeps a fleet of game-server backends and the proxies routing to them
//! in agreement about which backends exist and who is on them.
//!
//! Every node exchanges four lifecycle messages (CREATE, UPDATE,
//! HEARTBEAT, REMOVE) over one broker channel. Proxies fold them into a
//! [`domain::ServerRegistry`], keep routes in step through a
//! [`domain::HostAdapter`], and evict backends that stop heartbeating.
//!
//! ## Architecture
//!
//! ```text
//! Backend node                         Proxy node
//!     │                                    │
//!     ├── LocalServer (service/)           ├── Status API (api/)
//!     │                                    ├── SyncService (service/)
//!     │                                    │     ├── listener → reducer (protocol/)
//!     │                                    │     └── sweeper
//!     │                                    ├── ServerRegistry (domain/)
//!     │                                    └── HostAdapter (domain/)
//!     │                                    │
//!     └──────── BrokerTransport (broker/) ─┘
//!                 Redis pub/sub or in-process
//! ```

pub mod api;
pub mod app_state;
pub mod broker;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod service;
