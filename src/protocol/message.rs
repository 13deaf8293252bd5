//! Server lifecycle messages exchanged over the broker channel.
//!
//! On the wire every message is one flat JSON object with a `type`
//! discriminator (`CREATE`, `UPDATE`, `HEARTBEAT`, `REMOVE`) and camelCase
//! fields. Players travel as packed `"<uuid>;<name>"` tokens. Decoding
//! turns the object into a [`ServerMessage`] with typed payloads and
//! unpacks the tokens into [`Player`] records, so nothing past this
//! module sees the packed form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Player, PlayerId, Server};

/// Discriminator of a [`ServerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A server announced itself.
    Create,
    /// A server changed its roster or capacity.
    Update,
    /// A server is still alive; carries its full state.
    Heartbeat,
    /// A server left the fleet.
    Remove,
}

impl MessageKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Heartbeat => "HEARTBEAT",
            Self::Remove => "REMOVE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "HEARTBEAT" => Ok(Self::Heartbeat),
            "REMOVE" => Ok(Self::Remove),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

/// Roster directive carried by an UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterAction {
    /// Player joined the server.
    Add,
    /// Player left the server.
    Remove,
}

impl RosterAction {
    /// Returns the wire name of this directive.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
        }
    }
}

impl FromStr for RosterAction {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Self::Add),
            "REMOVE" => Ok(Self::Remove),
            other => Err(DecodeError::UnknownDirective(other.to_string())),
        }
    }
}

/// Payload of an UPDATE. The two shapes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePatch {
    /// Add or remove one player.
    Roster {
        /// Join or leave.
        action: RosterAction,
        /// Player the directive applies to.
        player: Player,
    },
    /// Replace the player capacity.
    MaxPlayers(u32),
}

/// One decoded broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Announce (or re-announce) a server with an empty roster.
    Create {
        /// Server name.
        name: String,
        /// Routed address.
        ip: String,
        /// Routed port.
        port: u16,
        /// Player capacity.
        max_players: u32,
    },
    /// Liveness ping carrying the sender's full state.
    Heartbeat {
        /// Server name.
        name: String,
        /// Routed address.
        ip: String,
        /// Routed port.
        port: u16,
        /// Player capacity.
        max_players: u32,
        /// Complete current roster.
        players: Vec<Player>,
    },
    /// Incremental change to a known server.
    Update {
        /// Server name.
        name: String,
        /// Change to apply; `None` when the message carried no payload.
        patch: Option<UpdatePatch>,
    },
    /// Server left the fleet.
    Remove {
        /// Server name.
        name: String,
    },
}

impl ServerMessage {
    /// Builds the CREATE announcing `server`. The roster is not carried.
    #[must_use]
    pub fn create_for(server: &Server) -> Self {
        Self::Create {
            name: server.name().to_string(),
            ip: server.ip().to_string(),
            port: server.port(),
            max_players: server.max_players(),
        }
    }

    /// Builds the HEARTBEAT carrying the full state of `server`.
    #[must_use]
    pub fn heartbeat_for(server: &Server) -> Self {
        let mut players: Vec<Player> = server.players().cloned().collect();
        players.sort_by_key(|p| p.id);
        Self::Heartbeat {
            name: server.name().to_string(),
            ip: server.ip().to_string(),
            port: server.port(),
            max_players: server.max_players(),
            players,
        }
    }

    /// Builds the REMOVE withdrawing `name`.
    #[must_use]
    pub fn remove(name: impl Into<String>) -> Self {
        Self::Remove { name: name.into() }
    }

    /// Builds an UPDATE carrying a roster directive.
    #[must_use]
    pub fn roster_update(name: impl Into<String>, action: RosterAction, player: Player) -> Self {
        Self::Update {
            name: name.into(),
            patch: Some(UpdatePatch::Roster { action, player }),
        }
    }

    /// Builds an UPDATE carrying a new capacity.
    #[must_use]
    pub fn max_players_update(name: impl Into<String>, max_players: u32) -> Self {
        Self::Update {
            name: name.into(),
            patch: Some(UpdatePatch::MaxPlayers(max_players)),
        }
    }

    /// Returns the discriminator of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Create { .. } => MessageKind::Create,
            Self::Update { .. } => MessageKind::Update,
            Self::Heartbeat { .. } => MessageKind::Heartbeat,
            Self::Remove { .. } => MessageKind::Remove,
        }
    }

    /// Returns the name of the server this message is about.
    #[must_use]
    pub fn server_name(&self) -> &str {
        match self {
            Self::Create { name, .. }
            | Self::Update { name, .. }
            | Self::Heartbeat { name, .. }
            | Self::Remove { name } => name,
        }
    }

    /// Decodes one JSON wire message.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] describing why the payload is not a valid
    /// message: unparseable JSON, no `type`, an unknown kind, a missing
    /// required field, an unknown roster directive or a bad player token.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireMessage = serde_json::from_slice(payload)?;
        let kind: MessageKind = wire.kind.as_deref().ok_or(DecodeError::MissingType)?.parse()?;
        let name = require(wire.name, kind, "name")?;

        match kind {
            MessageKind::Create => Ok(Self::Create {
                name,
                ip: require(wire.ip, kind, "ip")?,
                port: require(wire.port, kind, "port")?,
                max_players: require(wire.max_players, kind, "maxPlayers")?,
            }),
            MessageKind::Heartbeat => {
                let players = require(wire.players, kind, "players")?
                    .iter()
                    .map(|token| {
                        parse_player_token(token).map_err(|_| DecodeError::MalformedRoster {
                            server: name.clone(),
                            token: token.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Heartbeat {
                    name,
                    ip: require(wire.ip, kind, "ip")?,
                    port: require(wire.port, kind, "port")?,
                    max_players: require(wire.max_players, kind, "maxPlayers")?,
                    players,
                })
            }
            MessageKind::Update => {
                // A roster directive wins over a capacity field.
                let patch = match wire.player_update {
                    Some(directive) => {
                        let action: RosterAction = directive.parse()?;
                        let token = require(wire.player_to_update, kind, "playerToUpdate")?;
                        Some(UpdatePatch::Roster {
                            action,
                            player: parse_player_token(&token)?,
                        })
                    }
                    None => wire.max_players.map(UpdatePatch::MaxPlayers),
                };
                Ok(Self::Update { name, patch })
            }
            MessageKind::Remove => Ok(Self::Remove { name }),
        }
    }

    /// Encodes this message as one JSON wire object.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireMessage::from(self))
    }
}

/// Reasons a wire payload could not be turned into a [`ServerMessage`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not a JSON object of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The `type` discriminator is absent.
    #[error("message has no `type` field")]
    MissingType,

    /// The `type` discriminator names no known kind.
    #[error("unknown message type `{0}`")]
    UnknownKind(String),

    /// A field required by the message kind is absent.
    #[error("{kind} message is missing required field `{field}`")]
    MissingField {
        /// Kind of the offending message.
        kind: MessageKind,
        /// Wire name of the absent field.
        field: &'static str,
    },

    /// `playerUpdate` is neither `ADD` nor `REMOVE`.
    #[error("unknown player update directive `{0}`")]
    UnknownDirective(String),

    /// A player token is not `"<uuid>;<name>"`.
    #[error("malformed player token `{0}`")]
    MalformedPlayer(String),

    /// A HEARTBEAT roster holds a token that is not `"<uuid>;<name>"`.
    #[error("heartbeat from `{server}` has malformed player token `{token}`")]
    MalformedRoster {
        /// Server the heartbeat came from.
        server: String,
        /// The offending token.
        token: String,
    },
}

impl DecodeError {
    /// Returns `true` if the message was well formed but of an unknown kind.
    #[must_use]
    pub const fn is_unknown_kind(&self) -> bool {
        matches!(self, Self::UnknownKind(_))
    }

    /// Name of the server behind a HEARTBEAT whose roster failed to
    /// decode. The rest of such a message was valid.
    #[must_use]
    pub fn heartbeat_server(&self) -> Option<&str> {
        match self {
            Self::MalformedRoster { server, .. } => Some(server),
            _ => None,
        }
    }
}

/// Flat JSON shape shared by every message kind.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_players: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    players: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    player_update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    player_to_update: Option<String>,
}

impl From<&ServerMessage> for WireMessage {
    fn from(message: &ServerMessage) -> Self {
        let mut wire = Self {
            kind: Some(message.kind().as_str().to_string()),
            name: Some(message.server_name().to_string()),
            ..Self::default()
        };
        match message {
            ServerMessage::Create {
                ip,
                port,
                max_players,
                ..
            } => {
                wire.ip = Some(ip.clone());
                wire.port = Some(*port);
                wire.max_players = Some(*max_players);
            }
            ServerMessage::Heartbeat {
                ip,
                port,
                max_players,
                players,
                ..
            } => {
                wire.ip = Some(ip.clone());
                wire.port = Some(*port);
                wire.max_players = Some(*max_players);
                wire.players = Some(players.iter().map(player_token).collect());
            }
            ServerMessage::Update { patch, .. } => match patch {
                Some(UpdatePatch::Roster { action, player }) => {
                    wire.player_update = Some(action.as_str().to_string());
                    wire.player_to_update = Some(player_token(player));
                }
                Some(UpdatePatch::MaxPlayers(max_players)) => {
                    wire.max_players = Some(*max_players);
                }
                None => {}
            },
            ServerMessage::Remove { .. } => {}
        }
        wire
    }
}

fn require<T>(value: Option<T>, kind: MessageKind, field: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingField { kind, field })
}

fn parse_player_token(token: &str) -> Result<Player, DecodeError> {
    let malformed = || DecodeError::MalformedPlayer(token.to_string());
    let (id, name) = token.split_once(';').ok_or_else(malformed)?;
    if name.is_empty() {
        return Err(malformed());
    }
    let id: PlayerId = id.parse().map_err(|_| malformed())?;
    Ok(Player::new(id, name))
}

fn player_token(player: &Player) -> String {
    format!("{};{}", player.id, player.name)
}
