//! Room state: one match session between at most two players

use std::collections::{HashMap, VecDeque};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::{AimView, PlayerView, RoomCode, TargetView, VariantFlags};

use super::targets::create_initial_targets;

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: Uuid,
    pub name: String,
    pub score: u32,
}

/// A target in normalized arena coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub alive: bool,
}

/// Crosshair position, clamped to the unit square
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aim {
    pub x: f64,
    pub y: f64,
}

impl Aim {
    pub const CENTER: Aim = Aim { x: 0.5, y: 0.5 };
}

/// Fixed rate-limit window for one player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub window_start_ms: u64,
    pub count: u32,
}

/// Shot waiting for the next simulation tick
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedShot {
    pub shooter_id: Uuid,
    pub x: f64,
    pub y: f64,
    /// Server receipt time
    pub received_at: u64,
    /// Client-reported fire time, metadata only
    pub client_timestamp: Option<f64>,
}

/// The two periodic tasks of a running match.
///
/// Dropping the value aborts both tasks.
#[derive(Debug)]
pub struct MatchTimers {
    tick: JoinHandle<()>,
    broadcast: JoinHandle<()>,
}

impl MatchTimers {
    pub fn new(tick: JoinHandle<()>, broadcast: JoinHandle<()>) -> Self {
        Self { tick, broadcast }
    }

    pub fn is_finished(&self) -> bool {
        self.tick.is_finished() && self.broadcast.is_finished()
    }
}

impl Drop for MatchTimers {
    fn drop(&mut self) {
        self.tick.abort();
        self.broadcast.abort();
    }
}

/// Room state (owned by the room store)
#[derive(Debug)]
pub struct Room {
    pub code: RoomCode,
    /// Connection with start/settings privileges; `None` once empty
    pub host_id: Option<Uuid>,
    /// Members in join order, at most `max_players`
    pub players: Vec<PlayerState>,
    pub started: bool,
    /// When live shooting is permitted (start command + countdown)
    pub start_time: u64,
    pub duration_ms: u64,
    pub variant: VariantFlags,
    pub targets: Vec<TargetState>,
    pub next_target_id: u64,
    pub last_shot_at: HashMap<Uuid, u64>,
    pub shot_windows: HashMap<Uuid, RateWindow>,
    pub aims: HashMap<Uuid, Aim>,
    pub pending_shots: VecDeque<QueuedShot>,
    /// Present exactly while the match loop is running
    pub timers: Option<MatchTimers>,
    /// Target placement source
    pub rng: ChaCha8Rng,
}

impl Room {
    pub fn new(
        code: RoomCode,
        host_id: Uuid,
        host_name: String,
        config: &GameConfig,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let targets = create_initial_targets(&mut rng, config, config.target_count, 1);
        let next_target_id = 1 + config.target_count as u64;

        let mut aims = HashMap::new();
        aims.insert(host_id, Aim::CENTER);

        Self {
            code,
            host_id: Some(host_id),
            players: vec![PlayerState {
                id: host_id,
                name: host_name,
                score: 0,
            }],
            started: false,
            start_time: 0,
            duration_ms: config.default_duration_ms,
            variant: VariantFlags::default(),
            targets,
            next_target_id,
            last_shot_at: HashMap::new(),
            shot_windows: HashMap::new(),
            aims,
            pending_shots: VecDeque::new(),
            timers: None,
            rng,
        }
    }

    pub fn player(&self, id: &Uuid) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == *id)
    }

    pub fn player_mut(&mut self, id: &Uuid) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.id == *id)
    }

    pub fn has_player(&self, id: &Uuid) -> bool {
        self.player(id).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_host(&self, id: &Uuid) -> bool {
        self.host_id == Some(*id)
    }

    pub fn set_aim(&mut self, id: Uuid, x: f64, y: f64) {
        self.aims.insert(
            id,
            Aim {
                x: x.clamp(0.0, 1.0),
                y: y.clamp(0.0, 1.0),
            },
        );
    }

    /// Zero scores, center aims and drop all throttle and queue state
    pub fn reset_for_match(&mut self) {
        for player in &mut self.players {
            player.score = 0;
        }
        self.aims = self.players.iter().map(|p| (p.id, Aim::CENTER)).collect();
        self.last_shot_at.clear();
        self.shot_windows.clear();
        self.pending_shots.clear();
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players
            .iter()
            .map(|p| PlayerView {
                id: p.id,
                name: p.name.clone(),
                score: p.score,
            })
            .collect()
    }

    pub fn target_views(&self) -> Vec<TargetView> {
        self.targets
            .iter()
            .filter(|t| t.alive)
            .map(|t| TargetView {
                id: t.id,
                x: t.x,
                y: t.y,
                r: t.r,
            })
            .collect()
    }

    pub fn aim_views(&self) -> Vec<AimView> {
        self.players
            .iter()
            .map(|p| {
                let aim = self.aims.get(&p.id).copied().unwrap_or(Aim::CENTER);
                AimView {
                    id: p.id,
                    x: aim.x,
                    y: aim.y,
                }
            })
            .collect()
    }
}
