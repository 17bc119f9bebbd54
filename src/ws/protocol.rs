//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error codes reported to clients in acks and `error_event`s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RoomNotFound,
    RoomFull,
    NameInvalid,
    MatchNotStarted,
    MatchEnded,
    InvalidShot,
    InvalidSettings,
    InvalidSignal,
    RateLimited,
    NotHost,
    NotEnoughPlayers,
    MatchAlreadyStarted,
    /// Server-side failure (room code space exhausted)
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::RoomFull => "ROOM_FULL",
            Self::NameInvalid => "NAME_INVALID",
            Self::MatchNotStarted => "MATCH_NOT_STARTED",
            Self::MatchEnded => "MATCH_ENDED",
            Self::InvalidShot => "INVALID_SHOT",
            Self::InvalidSettings => "INVALID_SETTINGS",
            Self::InvalidSignal => "INVALID_SIGNAL",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotHost => "NOT_HOST",
            Self::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            Self::MatchAlreadyStarted => "MATCH_ALREADY_STARTED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized room code: uppercase alphanumerics of the configured length.
///
/// Only produced by the room store's generator or by
/// [`normalize_room_code`](crate::ws::validation::normalize_room_code).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub(crate) fn new_unchecked(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input device a match is played with. Opaque to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Hand,
    Eye,
    Mouse,
}

/// Per-match rule variants chosen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantFlags {
    /// Every shot fires two horizontally spread points
    pub two_guns: bool,
    pub input_mode: InputMode,
}

/// WebRTC signaling payload, relayed verbatim between room members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebRtcSignal {
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    Ice {
        candidate: String,
        #[serde(default)]
        sdp_mid: Option<String>,
        #[serde(default)]
        sdp_m_line_index: Option<u32>,
    },
}

// ============================================================================
// Client -> server
// ============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a room and become its host
    CreateRoom(CreateRoomPayload),
    /// Join an existing room by code
    JoinRoom(JoinRoomPayload),
    /// Host starts the match
    StartMatch(StartMatchPayload),
    /// Fire at a point; adjudicated on the next simulation tick
    Shoot(ShootPayload),
    /// Latest crosshair position, display only
    AimUpdate(AimPayload),
    /// Relay a WebRTC signal to the other player
    WebrtcSignal(SignalPayload),
    /// Clock sync probe
    Ping {
        /// Client timestamp, often fractional (`performance.now()`)
        t: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomPayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomPayload {
    pub room_code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMatchPayload {
    pub room_code: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub two_guns: Option<bool>,
    #[serde(default)]
    pub input_mode: Option<InputMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShootPayload {
    pub room_code: String,
    pub x: f64,
    pub y: f64,
    /// Client-side fire timestamp; logged, never used for adjudication
    #[serde(default)]
    pub t: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AimPayload {
    pub room_code: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPayload {
    pub room_code: String,
    pub target_id: String,
    pub signal: WebRtcSignal,
}

// ============================================================================
// Server -> client
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CreateRoomAck {
    Ok { room_code: RoomCode, player_id: Uuid },
    Error { error: ErrorCode },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinRoomAck {
    Ok { room_code: RoomCode, player_id: Uuid },
    Error { error: ErrorCode },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartMatchAck {
    Ok,
    Error { error: ErrorCode },
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Timeout,
    Forfeit,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: Uuid,
        server_time: u64,
    },

    CreateRoomAck {
        ack: CreateRoomAck,
    },

    JoinRoomAck {
        ack: JoinRoomAck,
    },

    StartMatchAck {
        ack: StartMatchAck,
    },

    /// Membership or settings changed
    RoomUpdate {
        room_code: RoomCode,
        players: Vec<PlayerView>,
        host_id: Option<Uuid>,
        started: bool,
        duration_ms: u64,
        variant: VariantFlags,
    },

    /// Match accepted; shots are live from `start_time`
    MatchStart {
        room_code: RoomCode,
        start_time: u64,
        duration_ms: u64,
        countdown_ms: u64,
        variant: VariantFlags,
    },

    /// Full room snapshot (periodic and after every hit)
    StateUpdate {
        room_code: RoomCode,
        players: Vec<PlayerView>,
        targets: Vec<TargetView>,
        aims: Vec<AimView>,
        time_remaining_ms: u64,
    },

    /// One adjudicated shot
    ShotResult {
        room_code: RoomCode,
        shooter_id: Uuid,
        hit: bool,
        hit_target_id: Option<u64>,
    },

    /// Match has ended
    MatchEnd {
        room_code: RoomCode,
        final_players: Vec<PlayerView>,
        winner_id: Option<Uuid>,
        tie: bool,
        reason: EndReason,
    },

    /// Error message, sent only to the offending connection
    ErrorEvent {
        code: ErrorCode,
        message: String,
    },

    /// Relayed signaling message
    WebrtcSignal {
        room_code: RoomCode,
        from_id: Uuid,
        signal: WebRtcSignal,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: f64,
        server_time: u64,
    },
}

impl ServerMsg {
    pub fn error(code: ErrorCode) -> Self {
        Self::ErrorEvent {
            code,
            message: code.to_string(),
        }
    }
}

/// Player info with current score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: Uuid,
    pub name: String,
    pub score: u32,
}

/// Live target in normalized arena coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetView {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

/// Last known crosshair of a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AimView {
    pub id: Uuid,
    pub x: f64,
    pub y: f64,
}
