//! Room store: room codes, membership and the connection reverse index

use std::collections::HashMap;

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{ErrorCode, RoomCode};

use super::room::{Aim, PlayerState, Room};

/// Room store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    RoomNotFound(RoomCode),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    #[error("player {0} already in room {1}")]
    AlreadyMember(Uuid, RoomCode),

    #[error("unable to generate unique room code after {0} attempts")]
    CodeSpaceExhausted(usize),
}

impl From<&StoreError> for ErrorCode {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            StoreError::RoomFull(_) | StoreError::AlreadyMember(..) => ErrorCode::RoomFull,
            StoreError::CodeSpaceExhausted(_) => ErrorCode::Internal,
        }
    }
}

/// Draw a room code that is not in `existing`
pub fn generate_room_code<R: Rng + ?Sized>(
    rng: &mut R,
    config: &GameConfig,
    existing: &HashMap<RoomCode, Room>,
) -> Result<RoomCode, StoreError> {
    let alphabet = config.room_code_alphabet.as_bytes();
    for _ in 0..config.max_room_code_attempts {
        let code: String = (0..config.room_code_length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect();
        let code = RoomCode::new_unchecked(code);
        if !existing.contains_key(&code) {
            return Ok(code);
        }
    }
    Err(StoreError::CodeSpaceExhausted(config.max_room_code_attempts))
}

/// Owns every live room and which room each connection belongs to.
///
/// Both maps are only touched through `&mut self`, so they change together.
/// Match timers live on the room; callers stop them through the match loop
/// before deleting a room.
pub struct RoomStore {
    config: GameConfig,
    rooms: HashMap<RoomCode, Room>,
    socket_rooms: HashMap<Uuid, RoomCode>,
}

impl RoomStore {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
            socket_rooms: HashMap::new(),
        }
    }

    /// Create a room with `host_id` as its only player
    pub fn create_room(&mut self, host_id: Uuid, host_name: String) -> Result<&mut Room, StoreError> {
        let mut rng = rand::thread_rng();
        let code = generate_room_code(&mut rng, &self.config, &self.rooms)?;
        let room = Room::new(code.clone(), host_id, host_name, &self.config, rng.gen());

        self.socket_rooms.insert(host_id, code.clone());
        info!(room_code = %code, host_id = %host_id, "Room created");
        Ok(self.rooms.entry(code).or_insert(room))
    }

    pub fn get(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &RoomCode) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    /// Code of the room a connection currently belongs to
    pub fn room_code_of(&self, socket_id: &Uuid) -> Option<&RoomCode> {
        self.socket_rooms.get(socket_id)
    }

    pub fn join_room(
        &mut self,
        code: &RoomCode,
        socket_id: Uuid,
        name: String,
    ) -> Result<&mut Room, StoreError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| StoreError::RoomNotFound(code.clone()))?;

        if room.has_player(&socket_id) {
            return Err(StoreError::AlreadyMember(socket_id, code.clone()));
        }
        if room.player_count() >= self.config.max_players {
            return Err(StoreError::RoomFull(code.clone()));
        }

        room.players.push(PlayerState {
            id: socket_id,
            name,
            score: 0,
        });
        room.aims.insert(socket_id, Aim::CENTER);
        self.socket_rooms.insert(socket_id, code.clone());

        info!(room_code = %code, player_id = %socket_id, "Player joined room");
        Ok(room)
    }

    /// Remove a connection from its room, purging its per-player state and
    /// queued shots. Hands host to a remaining player if needed.
    ///
    /// Returns the mutated room so the caller can decide on deletion or
    /// forfeit; `None` if the connection was in no room.
    pub fn remove_socket(&mut self, socket_id: &Uuid) -> Option<&mut Room> {
        let code = self.socket_rooms.remove(socket_id)?;
        let room = self.rooms.get_mut(&code)?;

        room.players.retain(|p| p.id != *socket_id);
        room.last_shot_at.remove(socket_id);
        room.shot_windows.remove(socket_id);
        room.aims.remove(socket_id);
        room.pending_shots.retain(|shot| shot.shooter_id != *socket_id);

        if room.is_host(socket_id) {
            room.host_id = room.players.first().map(|p| p.id);
        }

        info!(room_code = %code, player_id = %socket_id, remaining = room.player_count(), "Player left room");
        Some(room)
    }

    /// Remove a room and the reverse-index entries of its members
    pub fn delete_room(&mut self, code: &RoomCode) -> Option<Room> {
        let room = self.rooms.remove(code)?;
        for player in &room.players {
            self.socket_rooms.remove(&player.id);
        }
        info!(room_code = %code, "Room deleted");
        Some(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn player_count(&self) -> usize {
        self.socket_rooms.len()
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }
}
