//! Inbound message validation.
//!
//! Turns raw frames and payloads into bounds-checked values before anything
//! touches room state. Every failure maps to the [`ErrorCode`] the client
//! receives.

use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{
    AimPayload, ClientMsg, ErrorCode, InputMode, JoinRoomPayload, RoomCode, ShootPayload,
    SignalPayload, StartMatchPayload, WebRtcSignal,
};

/// A frame that did not decode into a [`ClientMsg`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed message (type {kind:?}): {reason}")]
pub struct MalformedMessage {
    /// The `type` field, when one could be read
    pub kind: Option<String>,
    pub reason: String,
}

impl MalformedMessage {
    /// Code reported back for a malformed message of this type; `None` means
    /// the frame is dropped without a reply
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self.kind.as_deref()? {
            "create_room" => Some(ErrorCode::NameInvalid),
            "join_room" => Some(ErrorCode::RoomNotFound),
            "start_match" => Some(ErrorCode::InvalidSettings),
            "shoot" => Some(ErrorCode::InvalidShot),
            "webrtc_signal" => Some(ErrorCode::InvalidSignal),
            _ => None,
        }
    }
}

pub fn parse_client_msg(text: &str) -> Result<ClientMsg, MalformedMessage> {
    serde_json::from_str::<ClientMsg>(text).map_err(|err| {
        let kind = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|value| value.get("type")?.as_str().map(str::to_owned));
        MalformedMessage {
            kind,
            reason: err.to_string(),
        }
    })
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-')
}

/// Trim, collapse whitespace runs, then check length and charset
pub fn validate_name(raw: &str, config: &GameConfig) -> Result<String, ErrorCode> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let len = name.chars().count();

    if len == 0 || len > config.max_name_len || !name.chars().all(is_name_char) {
        return Err(ErrorCode::NameInvalid);
    }
    Ok(name)
}

/// Trim and upper-case; `None` on wrong length or charset
pub fn normalize_room_code(raw: &str, config: &GameConfig) -> Option<RoomCode> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = code.len() == config.room_code_length
        && code
            .chars()
            .all(|c| config.room_code_alphabet.contains(c));
    valid.then(|| RoomCode::new_unchecked(code))
}

fn room_code_or(raw: &str, config: &GameConfig, code: ErrorCode) -> Result<RoomCode, ErrorCode> {
    normalize_room_code(raw, config).ok_or(code)
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub room_code: RoomCode,
    pub name: String,
}

pub fn validate_join(payload: &JoinRoomPayload, config: &GameConfig) -> Result<JoinRequest, ErrorCode> {
    Ok(JoinRequest {
        room_code: room_code_or(&payload.room_code, config, ErrorCode::RoomNotFound)?,
        name: validate_name(&payload.name, config)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShotRequest {
    pub room_code: RoomCode,
    pub x: f64,
    pub y: f64,
    pub client_timestamp: Option<f64>,
}

pub fn validate_shot(payload: &ShootPayload, config: &GameConfig) -> Result<ShotRequest, ErrorCode> {
    let room_code = room_code_or(&payload.room_code, config, ErrorCode::InvalidShot)?;
    if !payload.x.is_finite() || !payload.y.is_finite() {
        return Err(ErrorCode::InvalidShot);
    }
    if payload.t.is_some_and(|t| !t.is_finite()) {
        return Err(ErrorCode::InvalidShot);
    }

    Ok(ShotRequest {
        room_code,
        x: payload.x,
        y: payload.y,
        client_timestamp: payload.t,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AimRequest {
    pub room_code: RoomCode,
    pub x: f64,
    pub y: f64,
}

/// Aim points are clamped here; invalid updates are dropped by the caller
pub fn validate_aim(payload: &AimPayload, config: &GameConfig) -> Option<AimRequest> {
    let room_code = normalize_room_code(&payload.room_code, config)?;
    if !payload.x.is_finite() || !payload.y.is_finite() {
        return None;
    }
    Some(AimRequest {
        room_code,
        x: payload.x.clamp(0.0, 1.0),
        y: payload.y.clamp(0.0, 1.0),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub room_code: RoomCode,
    pub duration_ms: Option<u64>,
    pub two_guns: Option<bool>,
    pub input_mode: Option<InputMode>,
}

pub fn validate_start_match(
    payload: &StartMatchPayload,
    config: &GameConfig,
) -> Result<StartRequest, ErrorCode> {
    let room_code = room_code_or(&payload.room_code, config, ErrorCode::RoomNotFound)?;

    if let Some(duration) = payload.duration_ms {
        if !(config.min_duration_ms..=config.max_duration_ms).contains(&duration) {
            return Err(ErrorCode::InvalidSettings);
        }
    }

    Ok(StartRequest {
        room_code,
        duration_ms: payload.duration_ms,
        two_guns: payload.two_guns,
        input_mode: payload.input_mode,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalRequest {
    pub room_code: RoomCode,
    pub target_id: Uuid,
    pub signal: WebRtcSignal,
}

pub fn validate_signal(payload: &SignalPayload, config: &GameConfig) -> Result<SignalRequest, ErrorCode> {
    let room_code = room_code_or(&payload.room_code, config, ErrorCode::InvalidSignal)?;
    let target_id = Uuid::parse_str(payload.target_id.trim()).map_err(|_| ErrorCode::InvalidSignal)?;

    let shape_ok = match &payload.signal {
        WebRtcSignal::Offer { sdp } | WebRtcSignal::Answer { sdp } => !sdp.trim().is_empty(),
        WebRtcSignal::Ice { candidate, .. } => !candidate.trim().is_empty(),
    };
    if !shape_ok {
        return Err(ErrorCode::InvalidSignal);
    }

    Ok(SignalRequest {
        room_code,
        target_id,
        signal: payload.signal.clone(),
    })
}
