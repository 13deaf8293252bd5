//! Event protocol: the four-message wire format and its reducer.
//!
//! [`ServerMessage`] is the typed form of a broker message; the
//! [`reducer`] applies it to a [`crate::domain::ServerRegistry`].

pub mod message;
pub mod reducer;

pub use message::{DecodeError, MessageKind, RosterAction, ServerMessage, UpdatePatch};
pub use reducer::{Applied, apply, apply_at, handle_payload};
