//! Type-safe player identifier.
//!
//! [`PlayerId`] is a newtype wrapper around [`uuid::Uuid`] so that player
//! identifiers cannot be confused with other UUIDs flowing through the
//! system.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Globally unique identifier of a connected player.
///
/// Identity key within a server's roster: two [`super::Player`] records
/// with the same `PlayerId` are the same player regardless of name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(uuid::Uuid);

impl PlayerId {
    /// Creates a new random `PlayerId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `PlayerId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl From<uuid::Uuid> for PlayerId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<PlayerId> for uuid::Uuid {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}
