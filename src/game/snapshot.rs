//! Snapshot building for network transmission

use crate::ws::protocol::{EndReason, ServerMsg};

use super::room::Room;
use super::shot::time_remaining_ms;

/// Membership and settings view, sent after every lobby change
pub fn room_update(room: &Room) -> ServerMsg {
    ServerMsg::RoomUpdate {
        room_code: room.code.clone(),
        players: room.player_views(),
        host_id: room.host_id,
        started: room.started,
        duration_ms: room.duration_ms,
        variant: room.variant,
    }
}

/// Full match state. Time remaining reads zero outside a running match.
pub fn state_update(room: &Room, now: u64) -> ServerMsg {
    let time_remaining_ms = if room.started {
        time_remaining_ms(room, now)
    } else {
        0
    };

    ServerMsg::StateUpdate {
        room_code: room.code.clone(),
        players: room.player_views(),
        targets: room.target_views(),
        aims: room.aim_views(),
        time_remaining_ms,
    }
}

pub fn match_start(room: &Room, countdown_ms: u64) -> ServerMsg {
    ServerMsg::MatchStart {
        room_code: room.code.clone(),
        start_time: room.start_time,
        duration_ms: room.duration_ms,
        countdown_ms,
        variant: room.variant,
    }
}

pub fn match_end(
    room: &Room,
    reason: EndReason,
    winner_id: Option<uuid::Uuid>,
    tie: bool,
) -> ServerMsg {
    ServerMsg::MatchEnd {
        room_code: room.code.clone(),
        final_players: room.player_views(),
        winner_id,
        tie,
        reason,
    }
}
