//! Session handler: dispatches client messages onto rooms and matches

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::match_loop::{self, MatchDriver};
use crate::game::room::QueuedShot;
use crate::game::shot::check_shot_window;
use crate::game::{snapshot, RoomStore};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::ServerClock;
use crate::ws::outbox::Outbox;
use crate::ws::protocol::{
    AimPayload, ClientMsg, CreateRoomAck, CreateRoomPayload, EndReason, ErrorCode, JoinRoomAck,
    JoinRoomPayload, RoomCode, ServerMsg, ShootPayload, SignalPayload, StartMatchAck,
    StartMatchPayload,
};
use crate::ws::validation::{self, parse_client_msg};

/// Requests that are answered with an ack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckKind {
    CreateRoom,
    JoinRoom,
    StartMatch,
}

impl AckKind {
    fn failed(self, error: ErrorCode) -> ServerMsg {
        match self {
            AckKind::CreateRoom => ServerMsg::CreateRoomAck {
                ack: CreateRoomAck::Error { error },
            },
            AckKind::JoinRoom => ServerMsg::JoinRoomAck {
                ack: JoinRoomAck::Error { error },
            },
            AckKind::StartMatch => ServerMsg::StartMatchAck {
                ack: StartMatchAck::Error { error },
            },
        }
    }

    fn for_message_type(kind: &str) -> Option<Self> {
        match kind {
            "create_room" => Some(AckKind::CreateRoom),
            "join_room" => Some(AckKind::JoinRoom),
            "start_match" => Some(AckKind::StartMatch),
            _ => None,
        }
    }
}

/// Shared game server state.
///
/// Every room mutation happens under the store lock and never across an
/// `.await`, so each message or timer tick is one atomic turn.
pub struct SessionHandler {
    config: GameConfig,
    clock: ServerClock,
    store: Mutex<RoomStore>,
    outbox: Outbox,
    limiters: DashMap<Uuid, ConnectionRateLimiter>,
}

impl SessionHandler {
    pub fn new(config: GameConfig) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(RoomStore::new(config.clone())),
            config,
            clock: ServerClock::new(),
            outbox: Outbox::new(),
            limiters: DashMap::new(),
        })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn room_count(&self) -> usize {
        self.store.lock().room_count()
    }

    pub fn player_count(&self) -> usize {
        self.store.lock().player_count()
    }

    pub fn connection_count(&self) -> usize {
        self.outbox.connection_count()
    }

    /// Register a new connection and queue its welcome message
    pub fn connect(&self) -> (Uuid, mpsc::Receiver<ServerMsg>) {
        let player_id = Uuid::new_v4();
        let rx = self.outbox.register(player_id);
        self.limiters
            .insert(player_id, ConnectionRateLimiter::new(&self.config));

        self.outbox.send_to(
            &player_id,
            ServerMsg::Welcome {
                player_id,
                server_time: self.now_ms(),
            },
        );
        info!(player_id = %player_id, "Player connected");
        (player_id, rx)
    }

    /// Run the disconnect path: leave the room, forfeit or delete as needed
    pub fn disconnect(&self, player_id: &Uuid) {
        self.outbox.unregister(player_id);
        self.limiters.remove(player_id);

        let now = self.now_ms();
        let mut store = self.store.lock();
        self.detach(&mut store, player_id, now);
        info!(player_id = %player_id, "Player disconnected");
    }

    /// Handle one inbound text frame
    pub fn handle_text(self: &Arc<Self>, player_id: Uuid, text: &str) {
        let parsed = parse_client_msg(text);
        if !self.allow_frame(&player_id, parsed.as_ref().ok()) {
            return;
        }

        match parsed {
            Ok(msg) => self.handle_message(player_id, msg),
            Err(err) => {
                warn!(player_id = %player_id, error = %err, "Failed to parse client message");
                if let Some(code) = err.error_code() {
                    let ack = err.kind.as_deref().and_then(AckKind::for_message_type);
                    self.reject(&player_id, code, ack);
                }
            }
        }
    }

    pub fn handle_message(self: &Arc<Self>, player_id: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::CreateRoom(payload) => self.create_room(player_id, payload),
            ClientMsg::JoinRoom(payload) => self.join_room(player_id, payload),
            ClientMsg::StartMatch(payload) => self.start_match(player_id, payload),
            ClientMsg::Shoot(payload) => self.shoot(player_id, payload),
            ClientMsg::AimUpdate(payload) => self.aim_update(player_id, payload),
            ClientMsg::WebrtcSignal(payload) => self.relay_signal(player_id, payload),
            ClientMsg::Ping { t } => self.outbox.send_to(
                &player_id,
                ServerMsg::Pong {
                    t,
                    server_time: self.now_ms(),
                },
            ),
        }
    }

    fn reject(&self, player_id: &Uuid, code: ErrorCode, ack: Option<AckKind>) {
        debug!(player_id = %player_id, code = %code, "Request rejected");
        self.outbox.send_to(player_id, ServerMsg::error(code));
        if let Some(ack) = ack {
            self.outbox.send_to(player_id, ack.failed(code));
        }
    }

    /// Frame budget check. Shots are gated by the shot window instead.
    fn allow_frame(&self, player_id: &Uuid, msg: Option<&ClientMsg>) -> bool {
        let Some(limiter) = self.limiters.get(player_id) else {
            return true;
        };
        match msg {
            Some(ClientMsg::Shoot(_)) => true,
            Some(ClientMsg::AimUpdate(_)) => limiter.check_aim(),
            _ => {
                let allowed = limiter.check_input();
                if !allowed {
                    warn!(player_id = %player_id, "Rate limited input message");
                }
                allowed
            }
        }
    }

    fn allow_control(&self, player_id: &Uuid) -> bool {
        let allowed = self
            .limiters
            .get(player_id)
            .map_or(true, |limiter| limiter.check_control());
        if !allowed {
            warn!(player_id = %player_id, "Control event rate limited");
        }
        allowed
    }

    /// Remove a connection from its current room. Deletes the room when it
    /// empties; a running match with one player left ends as a forfeit.
    fn detach(&self, store: &mut RoomStore, player_id: &Uuid, now: u64) {
        let Some(room) = store.remove_socket(player_id) else {
            return;
        };

        if room.player_count() == 0 {
            let code = room.code.clone();
            match_loop::clear_room_intervals(room);
            store.delete_room(&code);
            return;
        }

        if room.started && room.player_count() == 1 {
            let winner_id = room.players.first().map(|p| p.id);
            match_loop::end_match(room, &self.outbox, EndReason::Forfeit, winner_id);
            match_loop::emit_state_update(room, &self.outbox, now);
        }

        self.outbox.send_to_room(room, snapshot::room_update(room));
    }

    fn create_room(&self, player_id: Uuid, payload: CreateRoomPayload) {
        let ack = Some(AckKind::CreateRoom);
        if !self.allow_control(&player_id) {
            return self.reject(&player_id, ErrorCode::RateLimited, ack);
        }
        let name = match validation::validate_name(&payload.name, &self.config) {
            Ok(name) => name,
            Err(code) => return self.reject(&player_id, code, ack),
        };

        let now = self.now_ms();
        let mut store = self.store.lock();
        self.detach(&mut store, &player_id, now);

        match store.create_room(player_id, name) {
            Ok(room) => {
                self.outbox.send_to(
                    &player_id,
                    ServerMsg::CreateRoomAck {
                        ack: CreateRoomAck::Ok {
                            room_code: room.code.clone(),
                            player_id,
                        },
                    },
                );
                self.outbox.send_to_room(room, snapshot::room_update(room));
            }
            Err(err) => {
                error!(player_id = %player_id, error = %err, "Failed to create room");
                self.reject(&player_id, ErrorCode::from(&err), ack);
            }
        }
    }

    fn join_room(&self, player_id: Uuid, payload: JoinRoomPayload) {
        let ack = Some(AckKind::JoinRoom);
        if !self.allow_control(&player_id) {
            return self.reject(&player_id, ErrorCode::RateLimited, ack);
        }
        let request = match validation::validate_join(&payload, &self.config) {
            Ok(request) => request,
            Err(code) => return self.reject(&player_id, code, ack),
        };

        let now = self.now_ms();
        let mut store = self.store.lock();
        let Some(room) = store.get(&request.room_code) else {
            return self.reject(&player_id, ErrorCode::RoomNotFound, ack);
        };
        if room.has_player(&player_id)
            || room.player_count() >= self.config.max_players
            || room.started
        {
            return self.reject(&player_id, ErrorCode::RoomFull, ack);
        }

        self.detach(&mut store, &player_id, now);

        match store.join_room(&request.room_code, player_id, request.name) {
            Ok(room) => {
                self.outbox.send_to(
                    &player_id,
                    ServerMsg::JoinRoomAck {
                        ack: JoinRoomAck::Ok {
                            room_code: room.code.clone(),
                            player_id,
                        },
                    },
                );
                self.outbox.send_to_room(room, snapshot::room_update(room));
            }
            Err(err) => {
                warn!(player_id = %player_id, error = %err, "Join failed");
                self.reject(&player_id, ErrorCode::from(&err), ack);
            }
        }
    }

    fn start_match(self: &Arc<Self>, player_id: Uuid, payload: StartMatchPayload) {
        let ack = Some(AckKind::StartMatch);
        if !self.allow_control(&player_id) {
            return self.reject(&player_id, ErrorCode::RateLimited, ack);
        }
        let request = match validation::validate_start_match(&payload, &self.config) {
            Ok(request) => request,
            Err(code) => return self.reject(&player_id, code, ack),
        };

        let now = self.now_ms();
        let mut store = self.store.lock();
        let Some(room) = store.get_mut(&request.room_code) else {
            return self.reject(&player_id, ErrorCode::RoomNotFound, ack);
        };

        let gate = if !room.has_player(&player_id) {
            Err(ErrorCode::RoomNotFound)
        } else if !room.is_host(&player_id) {
            Err(ErrorCode::NotHost)
        } else if room.started {
            Err(ErrorCode::MatchAlreadyStarted)
        } else if room.player_count() < self.config.max_players {
            Err(ErrorCode::NotEnoughPlayers)
        } else {
            Ok(())
        };
        if let Err(code) = gate {
            return self.reject(&player_id, code, ack);
        }

        if let Some(duration_ms) = request.duration_ms {
            room.duration_ms = duration_ms;
        }
        if let Some(two_guns) = request.two_guns {
            room.variant.two_guns = two_guns;
        }
        if let Some(input_mode) = request.input_mode {
            room.variant.input_mode = input_mode;
        }

        match_loop::start_match(room, &self.outbox, &self.config, now, Arc::downgrade(self));
        self.outbox.send_to_room(room, snapshot::room_update(room));
        self.outbox.send_to(
            &player_id,
            ServerMsg::StartMatchAck {
                ack: StartMatchAck::Ok,
            },
        );
    }

    /// Pre-check and queue a shot; adjudication happens on the next tick
    fn shoot(&self, player_id: Uuid, payload: ShootPayload) {
        let request = match validation::validate_shot(&payload, &self.config) {
            Ok(request) => request,
            Err(code) => return self.reject(&player_id, code, None),
        };

        let now = self.now_ms();
        let mut store = self.store.lock();
        let Some(room) = store.get_mut(&request.room_code) else {
            return self.reject(&player_id, ErrorCode::RoomNotFound, None);
        };
        if let Err(code) = check_shot_window(room, &player_id, now) {
            return self.reject(&player_id, code, None);
        }

        room.pending_shots.push_back(QueuedShot {
            shooter_id: player_id,
            x: request.x,
            y: request.y,
            received_at: now,
            client_timestamp: request.client_timestamp,
        });
        room.set_aim(player_id, request.x, request.y);
    }

    fn aim_update(&self, player_id: Uuid, payload: AimPayload) {
        let Some(request) = validation::validate_aim(&payload, &self.config) else {
            return;
        };

        let mut store = self.store.lock();
        if let Some(room) = store.get_mut(&request.room_code) {
            if room.has_player(&player_id) {
                room.set_aim(player_id, request.x, request.y);
            }
        }
    }

    fn relay_signal(&self, player_id: Uuid, payload: SignalPayload) {
        if !self.allow_control(&player_id) {
            return self.reject(&player_id, ErrorCode::RateLimited, None);
        }
        let request = match validation::validate_signal(&payload, &self.config) {
            Ok(request) => request,
            Err(code) => return self.reject(&player_id, code, None),
        };

        let store = self.store.lock();
        let Some(room) = store.get(&request.room_code) else {
            return self.reject(&player_id, ErrorCode::RoomNotFound, None);
        };
        if !room.has_player(&player_id) || !room.has_player(&request.target_id) {
            return self.reject(&player_id, ErrorCode::RoomNotFound, None);
        }
        if request.target_id == player_id {
            return self.reject(&player_id, ErrorCode::InvalidSignal, None);
        }

        self.outbox.send_to(
            &request.target_id,
            ServerMsg::WebrtcSignal {
                room_code: room.code.clone(),
                from_id: player_id,
                signal: request.signal,
            },
        );
    }
}

impl MatchDriver for SessionHandler {
    fn simulation_tick(&self, room_code: &RoomCode) -> bool {
        let now = self.now_ms();
        let mut store = self.store.lock();
        let Some(room) = store.get_mut(room_code) else {
            return false;
        };
        if !room.started {
            return false;
        }
        match_loop::run_simulation_tick(room, &self.outbox, &self.config, now);
        room.started
    }

    fn broadcast_tick(&self, room_code: &RoomCode) -> bool {
        let now = self.now_ms();
        let store = self.store.lock();
        match store.get(room_code) {
            Some(room) if room.started => {
                match_loop::emit_state_update(room, &self.outbox, now);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{AimView, InputMode, WebRtcSignal};
    use std::time::Duration;

    struct Client {
        id: Uuid,
        rx: mpsc::Receiver<ServerMsg>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<ServerMsg> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn connect(server: &Arc<SessionHandler>) -> Client {
        let (id, rx) = server.connect();
        let mut client = Client { id, rx };
        client.drain();
        client
    }

    fn send(server: &Arc<SessionHandler>, client: &Client, value: serde_json::Value) {
        server.handle_text(client.id, &value.to_string());
    }

    fn create(server: &Arc<SessionHandler>, host: &mut Client) -> RoomCode {
        send(server, host, serde_json::json!({ "type": "create_room", "name": "Alice" }));
        host.drain()
            .into_iter()
            .find_map(|msg| match msg {
                ServerMsg::CreateRoomAck {
                    ack: CreateRoomAck::Ok { room_code, .. },
                } => Some(room_code),
                _ => None,
            })
            .expect("create ack")
    }

    fn pair(server: &Arc<SessionHandler>) -> (Client, Client, RoomCode) {
        let mut host = connect(server);
        let mut guest = connect(server);
        let code = create(server, &mut host);
        send(
            server,
            &guest,
            serde_json::json!({ "type": "join_room", "room_code": code.as_str(), "name": "Bob" }),
        );
        host.drain();
        guest.drain();
        (host, guest, code)
    }

    fn start(server: &Arc<SessionHandler>, host: &mut Client, guest: &mut Client, code: &RoomCode) {
        send(
            server,
            host,
            serde_json::json!({ "type": "start_match", "room_code": code.as_str() }),
        );
        host.drain();
        guest.drain();
    }

    fn aims(server: &Arc<SessionHandler>, code: &RoomCode) -> Vec<AimView> {
        let store = server.store.lock();
        match snapshot::state_update(store.get(code).unwrap(), server.now_ms()) {
            ServerMsg::StateUpdate { aims, .. } => aims,
            other => panic!("unexpected snapshot: {other:?}"),
        }
    }

    fn aim_of(server: &Arc<SessionHandler>, code: &RoomCode, id: Uuid) -> Option<(f64, f64)> {
        aims(server, code)
            .into_iter()
            .find(|aim| aim.id == id)
            .map(|aim| (aim.x, aim.y))
    }

    fn error_codes(msgs: &[ServerMsg]) -> Vec<ErrorCode> {
        msgs.iter()
            .filter_map(|msg| match msg {
                ServerMsg::ErrorEvent { code, .. } => Some(*code),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn connect_sends_welcome() {
        let server = SessionHandler::new(GameConfig::default());
        let (id, mut rx) = server.connect();
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMsg::Welcome { player_id, .. } if player_id == id
        ));
    }

    #[tokio::test]
    async fn create_then_join_updates_both_players() {
        let server = SessionHandler::new(GameConfig::default());
        let mut host = connect(&server);
        let mut guest = connect(&server);
        let code = create(&server, &mut host);

        send(
            &server,
            &guest,
            serde_json::json!({ "type": "join_room", "room_code": code.as_str().to_lowercase(), "name": "Bob" }),
        );

        let guest_msgs = guest.drain();
        assert!(matches!(
            &guest_msgs[0],
            ServerMsg::JoinRoomAck { ack: JoinRoomAck::Ok { room_code, player_id } }
                if *room_code == code && *player_id == guest.id
        ));
        assert!(matches!(&guest_msgs[1], ServerMsg::RoomUpdate { players, .. } if players.len() == 2));
        assert!(matches!(
            host.drain().as_slice(),
            [ServerMsg::RoomUpdate { players, host_id, .. }] if players.len() == 2 && *host_id == Some(host.id)
        ));
        assert_eq!(server.player_count(), 2);
    }

    #[tokio::test]
    async fn third_player_gets_room_full() {
        let server = SessionHandler::new(GameConfig::default());
        let (_host, _guest, code) = pair(&server);
        let mut third = connect(&server);

        send(
            &server,
            &third,
            serde_json::json!({ "type": "join_room", "room_code": code.as_str(), "name": "Carol" }),
        );

        let msgs = third.drain();
        assert_eq!(error_codes(&msgs), vec![ErrorCode::RoomFull]);
        assert!(matches!(
            &msgs[1],
            ServerMsg::JoinRoomAck { ack: JoinRoomAck::Error { error: ErrorCode::RoomFull } }
        ));
    }

    #[tokio::test]
    async fn creating_a_second_room_leaves_the_first() {
        let server = SessionHandler::new(GameConfig::default());
        let mut host = connect(&server);
        let first = create(&server, &mut host);
        let second = create(&server, &mut host);

        assert_ne!(first, second);
        assert_eq!(server.room_count(), 1);
    }

    #[tokio::test]
    async fn start_requires_host_and_two_players() {
        let server = SessionHandler::new(GameConfig::default());
        let mut host = connect(&server);
        let code = create(&server, &mut host);

        send(
            &server,
            &host,
            serde_json::json!({ "type": "start_match", "room_code": code.as_str() }),
        );
        assert_eq!(error_codes(&host.drain()), vec![ErrorCode::NotEnoughPlayers]);

        let mut guest = connect(&server);
        send(
            &server,
            &guest,
            serde_json::json!({ "type": "join_room", "room_code": code.as_str(), "name": "Bob" }),
        );
        guest.drain();
        send(
            &server,
            &guest,
            serde_json::json!({ "type": "start_match", "room_code": code.as_str() }),
        );
        assert_eq!(error_codes(&guest.drain()), vec![ErrorCode::NotHost]);
    }

    #[tokio::test]
    async fn start_applies_settings_and_orders_messages() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, mut guest, code) = pair(&server);

        send(
            &server,
            &host,
            serde_json::json!({
                "type": "start_match",
                "room_code": code.as_str(),
                "duration_ms": 30_000,
                "two_guns": true,
                "input_mode": "mouse"
            }),
        );

        let msgs = host.drain();
        assert_eq!(msgs.len(), 4);
        assert!(matches!(
            &msgs[0],
            ServerMsg::MatchStart { duration_ms: 30_000, variant, .. }
                if variant.two_guns && variant.input_mode == InputMode::Mouse
        ));
        assert!(matches!(&msgs[1], ServerMsg::StateUpdate { .. }));
        assert!(matches!(&msgs[2], ServerMsg::RoomUpdate { started: true, .. }));
        assert!(matches!(
            &msgs[3],
            ServerMsg::StartMatchAck { ack: StartMatchAck::Ok }
        ));
        assert_eq!(guest.drain().len(), 3);

        send(
            &server,
            &host,
            serde_json::json!({ "type": "start_match", "room_code": code.as_str() }),
        );
        assert_eq!(error_codes(&host.drain()), vec![ErrorCode::MatchAlreadyStarted]);
    }

    #[tokio::test]
    async fn invalid_duration_is_rejected() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, _guest, code) = pair(&server);

        send(
            &server,
            &host,
            serde_json::json!({ "type": "start_match", "room_code": code.as_str(), "duration_ms": 1 }),
        );

        assert_eq!(error_codes(&host.drain()), vec![ErrorCode::InvalidSettings]);
    }

    #[tokio::test]
    async fn shots_during_countdown_are_rejected() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, mut guest, code) = pair(&server);
        start(&server, &mut host, &mut guest, &code);

        send(
            &server,
            &host,
            serde_json::json!({ "type": "shoot", "room_code": code.as_str(), "x": 0.5, "y": 0.5 }),
        );

        assert_eq!(error_codes(&host.drain()), vec![ErrorCode::MatchNotStarted]);
    }

    #[tokio::test]
    async fn shots_from_outsiders_are_rejected() {
        let server = SessionHandler::new(GameConfig::default());
        let (_host, _guest, code) = pair(&server);
        let mut outsider = connect(&server);

        send(
            &server,
            &outsider,
            serde_json::json!({ "type": "shoot", "room_code": code.as_str(), "x": 0.5, "y": 0.5 }),
        );

        assert_eq!(error_codes(&outsider.drain()), vec![ErrorCode::RoomNotFound]);
    }

    #[tokio::test]
    async fn malformed_messages_get_type_specific_codes() {
        let server = SessionHandler::new(GameConfig::default());
        let mut client = connect(&server);

        server.handle_text(client.id, r#"{"type":"join_room","room_code":7}"#);
        let msgs = client.drain();
        assert_eq!(error_codes(&msgs), vec![ErrorCode::RoomNotFound]);
        assert!(matches!(
            &msgs[1],
            ServerMsg::JoinRoomAck { ack: JoinRoomAck::Error { error: ErrorCode::RoomNotFound } }
        ));

        server.handle_text(client.id, r#"{"type":"aim_update","x":"?"}"#);
        server.handle_text(client.id, "garbage");
        assert!(client.drain().is_empty());
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let server = SessionHandler::new(GameConfig::default());
        let mut client = connect(&server);

        send(&server, &client, serde_json::json!({ "type": "ping", "t": 42 }));
        assert!(matches!(client.drain().as_slice(), [ServerMsg::Pong { t, .. }] if *t == 42.0));

        send(&server, &client, serde_json::json!({ "type": "ping", "t": 1234.75 }));
        assert!(matches!(client.drain().as_slice(), [ServerMsg::Pong { t, .. }] if *t == 1234.75));
    }

    #[tokio::test]
    async fn signals_are_relayed_to_the_target_only() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, mut guest, code) = pair(&server);

        send(
            &server,
            &host,
            serde_json::json!({
                "type": "webrtc_signal",
                "room_code": code.as_str(),
                "target_id": guest.id.to_string(),
                "signal": { "kind": "offer", "sdp": "v=0" }
            }),
        );

        assert!(host.drain().is_empty());
        assert!(matches!(
            guest.drain().as_slice(),
            [ServerMsg::WebrtcSignal { from_id, signal: WebRtcSignal::Offer { .. }, .. }] if *from_id == host.id
        ));

        send(
            &server,
            &host,
            serde_json::json!({
                "type": "webrtc_signal",
                "room_code": code.as_str(),
                "target_id": host.id.to_string(),
                "signal": { "kind": "answer", "sdp": "v=0" }
            }),
        );
        assert_eq!(error_codes(&host.drain()), vec![ErrorCode::InvalidSignal]);
    }

    #[tokio::test]
    async fn control_flood_is_rate_limited() {
        let config = GameConfig {
            control_max_per_window: 2,
            ..GameConfig::default()
        };
        let server = SessionHandler::new(config);
        let mut client = connect(&server);

        for _ in 0..3 {
            send(&server, &client, serde_json::json!({ "type": "create_room", "name": "Spam" }));
        }

        let msgs = client.drain();
        assert_eq!(error_codes(&msgs), vec![ErrorCode::RateLimited]);
        assert!(matches!(
            msgs.last(),
            Some(ServerMsg::CreateRoomAck { ack: CreateRoomAck::Error { error: ErrorCode::RateLimited } })
        ));
    }

    #[tokio::test]
    async fn disconnect_mid_match_is_a_forfeit() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, mut guest, code) = pair(&server);
        start(&server, &mut host, &mut guest, &code);

        server.disconnect(&guest.id);

        let msgs = host.drain();
        assert_eq!(msgs.len(), 3);
        assert!(matches!(
            &msgs[0],
            ServerMsg::MatchEnd { winner_id: Some(w), tie: false, reason: EndReason::Forfeit, .. }
                if *w == host.id
        ));
        assert!(matches!(&msgs[1], ServerMsg::StateUpdate { time_remaining_ms: 0, .. }));
        assert!(matches!(
            &msgs[2],
            ServerMsg::RoomUpdate { players, started: false, .. } if players.len() == 1
        ));
    }

    #[tokio::test]
    async fn last_player_leaving_deletes_room() {
        let server = SessionHandler::new(GameConfig::default());
        let (host, guest, _code) = pair(&server);

        server.disconnect(&host.id);
        assert_eq!(server.room_count(), 1);
        server.disconnect(&guest.id);
        assert_eq!(server.room_count(), 0);
        assert_eq!(server.player_count(), 0);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn host_leaving_lobby_hands_over_host() {
        let server = SessionHandler::new(GameConfig::default());
        let (host, mut guest, _code) = pair(&server);

        server.disconnect(&host.id);

        assert!(matches!(
            guest.drain().as_slice(),
            [ServerMsg::RoomUpdate { host_id, .. }] if *host_id == Some(guest.id)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_shot_is_adjudicated_on_the_next_tick() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, mut guest, code) = pair(&server);
        start(&server, &mut host, &mut guest, &code);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        host.drain();
        guest.drain();

        let (x, y, target_id) = {
            let store = server.store.lock();
            let target = &store.get(&code).unwrap().targets[0];
            (target.x, target.y, target.id)
        };
        send(
            &server,
            &host,
            serde_json::json!({ "type": "shoot", "room_code": code.as_str(), "x": x, "y": y }),
        );
        assert!(host.drain().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;

        let msgs = guest.drain();
        let at = msgs
            .iter()
            .position(|msg| matches!(msg, ServerMsg::ShotResult { .. }))
            .expect("shot result");
        assert!(matches!(
            &msgs[at],
            ServerMsg::ShotResult { hit: true, hit_target_id: Some(id), shooter_id, .. }
                if *id == target_id && *shooter_id == host.id
        ));
        assert!(matches!(
            &msgs[at + 1],
            ServerMsg::StateUpdate { players, targets, .. }
                if players[0].score == 1 && targets.iter().all(|t| t.id != target_id)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn match_times_out_and_goes_quiet() {
        let config = GameConfig {
            countdown_ms: 0,
            ..GameConfig::default()
        };
        let server = SessionHandler::new(config);
        let (mut host, mut guest, code) = pair(&server);
        send(
            &server,
            &host,
            serde_json::json!({ "type": "start_match", "room_code": code.as_str(), "duration_ms": 15_000 }),
        );

        tokio::time::sleep(Duration::from_millis(15_200)).await;

        let msgs = host.drain();
        assert!(msgs.iter().any(|msg| matches!(
            msg,
            ServerMsg::MatchEnd { tie: true, winner_id: None, reason: EndReason::Timeout, .. }
        )));
        guest.drain();

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(host.drain().is_empty());
        assert!(guest.drain().is_empty());
    }

    #[tokio::test]
    async fn member_aim_is_clamped_into_state_updates() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, _guest, code) = pair(&server);

        send(
            &server,
            &host,
            serde_json::json!({ "type": "aim_update", "room_code": code.as_str(), "x": 1.5, "y": -0.2 }),
        );

        assert!(host.drain().is_empty());
        assert_eq!(aim_of(&server, &code, host.id), Some((1.0, 0.0)));
    }

    #[tokio::test]
    async fn outsider_aim_is_ignored() {
        let server = SessionHandler::new(GameConfig::default());
        let (host, guest, code) = pair(&server);
        let mut outsider = connect(&server);

        send(
            &server,
            &outsider,
            serde_json::json!({ "type": "aim_update", "room_code": code.as_str(), "x": 0.1, "y": 0.1 }),
        );

        assert!(outsider.drain().is_empty());
        let aims = aims(&server, &code);
        assert_eq!(aims.len(), 2);
        assert!(aims.iter().all(|aim| aim.id == host.id || aim.id == guest.id));
        assert_eq!(aim_of(&server, &code, outsider.id), None);
    }

    #[tokio::test]
    async fn shot_point_becomes_the_shooter_aim() {
        let config = GameConfig {
            countdown_ms: 0,
            ..GameConfig::default()
        };
        let server = SessionHandler::new(config);
        let (mut host, mut guest, code) = pair(&server);
        start(&server, &mut host, &mut guest, &code);

        send(
            &server,
            &host,
            serde_json::json!({ "type": "shoot", "room_code": code.as_str(), "x": 0.2, "y": 0.3 }),
        );

        assert!(host.drain().is_empty());
        assert_eq!(aim_of(&server, &code, host.id), Some((0.2, 0.3)));
    }

    #[tokio::test]
    async fn aim_flood_does_not_drop_shots() {
        let config = GameConfig {
            countdown_ms: 0,
            ..GameConfig::default()
        };
        let server = SessionHandler::new(config);
        let (mut host, mut guest, code) = pair(&server);
        start(&server, &mut host, &mut guest, &code);

        for i in 0..80u32 {
            let x = f64::from(i) / 80.0;
            send(
                &server,
                &host,
                serde_json::json!({ "type": "aim_update", "room_code": code.as_str(), "x": x, "y": 0.5 }),
            );
        }
        send(
            &server,
            &host,
            serde_json::json!({ "type": "shoot", "room_code": code.as_str(), "x": 0.5, "y": 0.5 }),
        );
        send(&server, &host, serde_json::json!({ "type": "ping", "t": 1 }));

        let queued = server.store.lock().get(&code).unwrap().pending_shots.len();
        assert_eq!(queued, 1);
        assert!(matches!(host.drain().as_slice(), [ServerMsg::Pong { .. }]));
    }

    #[tokio::test]
    async fn creating_a_room_mid_match_forfeits_the_match() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, mut guest, code) = pair(&server);
        start(&server, &mut host, &mut guest, &code);

        let new_code = create(&server, &mut guest);

        assert_ne!(new_code, code);
        let msgs = host.drain();
        assert_eq!(msgs.len(), 3);
        assert!(matches!(
            &msgs[0],
            ServerMsg::MatchEnd { winner_id: Some(w), tie: false, reason: EndReason::Forfeit, .. }
                if *w == host.id
        ));
        assert!(matches!(&msgs[1], ServerMsg::StateUpdate { .. }));
        assert!(matches!(
            &msgs[2],
            ServerMsg::RoomUpdate { players, started: false, .. } if players.len() == 1
        ));
        assert_eq!(server.room_count(), 2);
    }

    #[tokio::test]
    async fn joining_another_room_mid_match_forfeits_the_match() {
        let server = SessionHandler::new(GameConfig::default());
        let (mut host, mut guest, code) = pair(&server);
        start(&server, &mut host, &mut guest, &code);
        let mut other = connect(&server);
        let other_code = create(&server, &mut other);

        send(
            &server,
            &guest,
            serde_json::json!({ "type": "join_room", "room_code": other_code.as_str(), "name": "Bob" }),
        );

        assert!(matches!(
            guest.drain().first(),
            Some(ServerMsg::JoinRoomAck { ack: JoinRoomAck::Ok { room_code, .. } }) if *room_code == other_code
        ));
        assert!(matches!(
            host.drain().first(),
            Some(ServerMsg::MatchEnd { winner_id: Some(w), reason: EndReason::Forfeit, .. }) if *w == host.id
        ));
        let store = server.store.lock();
        let old = store.get(&code).unwrap();
        assert!(!old.started);
        assert!(old.timers.is_none());
    }
}
