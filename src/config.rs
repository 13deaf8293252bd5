//! Node configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Optional keys fall back to defaults;
//! required keys and unparsable values fail fast, before any connection
//! is attempted.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::broker::DEFAULT_CHANNEL;

/// Configuration failures detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required key is not set.
    #[error("missing required configuration key `{0}`")]
    MissingKey(&'static str),

    /// A key is set but its value cannot be used.
    #[error("invalid value `{value}` for configuration key `{key}`")]
    InvalidValue {
        /// Offending key.
        key: &'static str,
        /// Raw value found.
        value: String,
    },
}

/// What this node does in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Routing node: subscribes, reduces and sweeps.
    Proxy,
    /// Backend server: announces itself and its roster.
    Backend,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Proxy => "proxy",
            Self::Backend => "backend",
        })
    }
}

impl FromStr for NodeRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxy" => Ok(Self::Proxy),
            "backend" => Ok(Self::Backend),
            _ => Err(()),
        }
    }
}

/// Identity and cadence of the backend this node announces.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Name announced to the fleet.
    pub name: String,
    /// Address players are routed to.
    pub ip: String,
    /// Port players are routed to.
    pub port: u16,
    /// Announced player capacity.
    pub max_players: u32,
    /// Period between HEARTBEAT messages.
    pub heartbeat_interval: Duration,
}

/// Top-level node configuration.
///
/// Loaded once at startup via [`SyncConfig::from_env`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Proxy or backend.
    pub role: NodeRole,

    /// Broker channel shared by the fleet.
    pub channel: String,

    /// Redis endpoint; required when built with the `redis` feature.
    pub redis_url: Option<String>,

    /// Period of the liveness sweep.
    pub heartbeat_scheduler_delay: Duration,

    /// Servers silent for longer than this are evicted.
    pub max_alive_time: Duration,

    /// Socket address of the status API.
    pub listen_addr: SocketAddr,

    /// Present when `role` is [`NodeRole::Backend`].
    pub backend: Option<BackendConfig>,
}

impl SyncConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required key is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required key is missing or a value
    /// cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let role = parse_or(&lookup, "SERVERSYNC_ROLE", NodeRole::Proxy)?;
        let channel = lookup("SERVERSYNC_CHANNEL").unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

        let redis_url = lookup("REDIS_URL");
        if cfg!(feature = "redis") && redis_url.is_none() {
            return Err(ConfigError::MissingKey("REDIS_URL"));
        }

        let heartbeat_scheduler_delay = parse_secs(&lookup, "HEARTBEAT_SCHEDULER_DELAY_SECS", 5)?;
        let max_alive_time = Duration::from_secs(parse_or(&lookup, "MAX_ALIVE_TIME_SECS", 30)?);
        let listen_addr = parse_or(
            &lookup,
            "LISTEN_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 8080)),
        )?;

        let backend = match role {
            NodeRole::Proxy => None,
            NodeRole::Backend => Some(BackendConfig {
                name: lookup("SERVER_NAME").ok_or(ConfigError::MissingKey("SERVER_NAME"))?,
                ip: lookup("SERVER_IP").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: parse_or(&lookup, "SERVER_PORT", 25565)?,
                max_players: parse_or(&lookup, "SERVER_MAX_PLAYERS", 100)?,
                heartbeat_interval: parse_secs(&lookup, "HEARTBEAT_INTERVAL_SECS", 10)?,
            }),
        };

        Ok(Self {
            role,
            channel,
            redis_url,
            heartbeat_scheduler_delay,
            max_alive_time,
            listen_addr,
            backend,
        })
    }
}

/// Parses `key` as `T`, returning `default` when unset.
fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Parses a non-zero period in whole seconds.
fn parse_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, default)?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}
