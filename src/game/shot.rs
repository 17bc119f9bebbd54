//! Shot adjudication - throttling, timing gates and hit detection

use tracing::debug;
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::protocol::ErrorCode;

use super::room::{QueuedShot, RateWindow, Room, TargetState};
use super::targets::spawn_target;

/// Outcome of one adjudicated shot point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    Hit { target_id: u64 },
    Miss,
    Rejected(ErrorCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotResult {
    pub shooter_id: Uuid,
    pub outcome: ShotOutcome,
}

impl ShotResult {
    fn rejected(shooter_id: Uuid, code: ErrorCode) -> Self {
        Self {
            shooter_id,
            outcome: ShotOutcome::Rejected(code),
        }
    }

    pub fn accepted(&self) -> bool {
        !matches!(self.outcome, ShotOutcome::Rejected(_))
    }

    pub fn hit_target_id(&self) -> Option<u64> {
        match self.outcome {
            ShotOutcome::Hit { target_id } => Some(target_id),
            _ => None,
        }
    }
}

/// Milliseconds of live play left. Full duration during the countdown,
/// zero once elapsed.
pub fn time_remaining_ms(room: &Room, now: u64) -> u64 {
    if now < room.start_time {
        return room.duration_ms;
    }
    room.duration_ms.saturating_sub(now - room.start_time)
}

/// Membership and match-timing gates. No side effects.
pub fn check_shot_window(room: &Room, shooter_id: &Uuid, now: u64) -> Result<(), ErrorCode> {
    if !room.has_player(shooter_id) {
        return Err(ErrorCode::RoomNotFound);
    }
    if !room.started || now < room.start_time {
        return Err(ErrorCode::MatchNotStarted);
    }
    if time_remaining_ms(room, now) == 0 {
        return Err(ErrorCode::MatchEnded);
    }
    Ok(())
}

/// Minimum gap between accepted shots. Records `now` on success.
fn apply_cooldown(room: &mut Room, player_id: Uuid, now: u64, config: &GameConfig) -> bool {
    if let Some(&last) = room.last_shot_at.get(&player_id) {
        if now.saturating_sub(last) < config.shot_cooldown_ms {
            return false;
        }
    }
    room.last_shot_at.insert(player_id, now);
    true
}

/// Fixed window counter; the window restarts once it has fully elapsed
fn apply_rate_limit(room: &mut Room, player_id: Uuid, now: u64, config: &GameConfig) -> bool {
    let fresh = RateWindow {
        window_start_ms: now,
        count: 0,
    };
    let window = room.shot_windows.entry(player_id).or_insert(fresh);
    if now.saturating_sub(window.window_start_ms) >= config.shot_rate_window_ms {
        *window = fresh;
    }
    if window.count >= config.shot_rate_limit {
        return false;
    }
    window.count += 1;
    true
}

fn validate_shot_acceptance(
    room: &mut Room,
    shot: &QueuedShot,
    now: u64,
    config: &GameConfig,
) -> Result<(), ErrorCode> {
    check_shot_window(room, &shot.shooter_id, now)?;

    if !apply_cooldown(room, shot.shooter_id, now, config) {
        return Err(ErrorCode::RateLimited);
    }
    if !apply_rate_limit(room, shot.shooter_id, now, config) {
        return Err(ErrorCode::RateLimited);
    }
    Ok(())
}

/// Point-in-circle test on squared distances
pub fn check_hit(x: f64, y: f64, target: &TargetState) -> bool {
    let dx = x - target.x;
    let dy = y - target.y;
    dx * dx + dy * dy <= target.r * target.r
}

/// First live target in array order containing the point, skipping
/// `excluded` ids
fn find_hit_target_index(room: &Room, x: f64, y: f64, excluded: &[u64]) -> Option<usize> {
    room.targets
        .iter()
        .position(|t| t.alive && !excluded.contains(&t.id) && check_hit(x, y, t))
}

/// Kill the target at `index` and put a fresh one with the next id in its slot
fn respawn_target(room: &mut Room, index: usize, config: &GameConfig) {
    room.targets[index].alive = false;
    let id = room.next_target_id;
    room.next_target_id += 1;
    room.targets[index] = spawn_target(&mut room.rng, config, id);
}

fn award_point(room: &mut Room, shooter_id: &Uuid) {
    if let Some(shooter) = room.player_mut(shooter_id) {
        shooter.score = shooter.score.saturating_add(1);
    }
}

/// Adjudicate a single-point shot against the room's live targets
pub fn process_shot(room: &mut Room, shot: &QueuedShot, now: u64, config: &GameConfig) -> ShotResult {
    if let Err(code) = validate_shot_acceptance(room, shot, now, config) {
        return ShotResult::rejected(shot.shooter_id, code);
    }

    let x = shot.x.clamp(0.0, 1.0);
    let y = shot.y.clamp(0.0, 1.0);

    let Some(index) = find_hit_target_index(room, x, y, &[]) else {
        debug!(room_code = %room.code, shooter_id = %shot.shooter_id, x, y, "Shot missed");
        return ShotResult {
            shooter_id: shot.shooter_id,
            outcome: ShotOutcome::Miss,
        };
    };

    let target_id = room.targets[index].id;
    respawn_target(room, index, config);
    award_point(room, &shot.shooter_id);

    debug!(room_code = %room.code, shooter_id = %shot.shooter_id, target_id, "Shot hit");
    ShotResult {
        shooter_id: shot.shooter_id,
        outcome: ShotOutcome::Hit { target_id },
    }
}

/// Adjudicate a two-gun shot: one acceptance check, two points spread
/// horizontally. A target can be claimed by only one of the points.
pub fn process_two_gun_shot(
    room: &mut Room,
    shot: &QueuedShot,
    now: u64,
    config: &GameConfig,
) -> Vec<ShotResult> {
    if let Err(code) = validate_shot_acceptance(room, shot, now, config) {
        return vec![ShotResult::rejected(shot.shooter_id, code)];
    }

    let half = config.two_gun_spread / 2.0;
    let y = shot.y.clamp(0.0, 1.0);
    let points = [
        ((shot.x - half).clamp(0.0, 1.0), y),
        ((shot.x + half).clamp(0.0, 1.0), y),
    ];

    let mut claimed: Vec<u64> = Vec::with_capacity(points.len());
    let mut hit_indices: Vec<usize> = Vec::with_capacity(points.len());
    let mut results = Vec::with_capacity(points.len());

    for (x, y) in points {
        let outcome = match find_hit_target_index(room, x, y, &claimed) {
            Some(index) => {
                let target_id = room.targets[index].id;
                claimed.push(target_id);
                hit_indices.push(index);
                ShotOutcome::Hit { target_id }
            }
            None => ShotOutcome::Miss,
        };
        results.push(ShotResult {
            shooter_id: shot.shooter_id,
            outcome,
        });
    }

    for index in hit_indices {
        respawn_target(room, index, config);
        award_point(room, &shot.shooter_id);
    }

    results
}

/// Adjudicate a queued shot according to the room's variant
pub fn adjudicate(room: &mut Room, shot: &QueuedShot, now: u64, config: &GameConfig) -> Vec<ShotResult> {
    if room.variant.two_guns {
        process_two_gun_shot(room, shot, now, config)
    } else {
        vec![process_shot(room, shot, now, config)]
    }
}
