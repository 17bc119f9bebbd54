//! Match lifecycle and the two per-room timers

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::ws::outbox::Outbox;
use crate::ws::protocol::{EndReason, RoomCode, ServerMsg};

use super::room::{MatchTimers, Room};
use super::shot::{adjudicate, time_remaining_ms, ShotOutcome};
use super::snapshot;
use super::targets::create_initial_targets;

/// Receiver of timer ticks for running matches.
///
/// Each method returns `false` once the room is gone or idle so the timer
/// task can stop on its own.
pub trait MatchDriver: Send + Sync + 'static {
    fn simulation_tick(&self, room_code: &RoomCode) -> bool;
    fn broadcast_tick(&self, room_code: &RoomCode) -> bool;
}

/// Begin a match: fresh targets and scores, countdown, then both timers.
///
/// No-op if the room is already running.
pub fn start_match<D: MatchDriver>(
    room: &mut Room,
    outbox: &Outbox,
    config: &GameConfig,
    now: u64,
    driver: Weak<D>,
) {
    if room.started {
        return;
    }

    room.started = true;
    room.start_time = now + config.countdown_ms;

    let first_id = room.next_target_id;
    room.targets = create_initial_targets(&mut room.rng, config, config.target_count, first_id);
    room.next_target_id = first_id + config.target_count as u64;
    room.reset_for_match();

    outbox.send_to_room(room, snapshot::match_start(room, config.countdown_ms));
    emit_state_update(room, outbox, now);

    room.timers = Some(spawn_timers(room.code.clone(), config, driver));

    info!(
        room_code = %room.code,
        start_time = room.start_time,
        duration_ms = room.duration_ms,
        two_guns = room.variant.two_guns,
        "Match started"
    );
}

fn spawn_timers<D: MatchDriver>(code: RoomCode, config: &GameConfig, driver: Weak<D>) -> MatchTimers {
    let tick = spawn_interval(
        Duration::from_millis(config.sim_tick_ms),
        code.clone(),
        driver.clone(),
        D::simulation_tick,
    );
    let broadcast = spawn_interval(
        Duration::from_millis(config.broadcast_ms),
        code,
        driver,
        D::broadcast_tick,
    );
    MatchTimers::new(tick, broadcast)
}

fn spawn_interval<D: MatchDriver>(
    period: Duration,
    code: RoomCode,
    driver: Weak<D>,
    on_tick: fn(&D, &RoomCode) -> bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(driver) = driver.upgrade() else {
                break;
            };
            if !on_tick(driver.as_ref(), &code) {
                debug!(room_code = %code, "Match timer stopping");
                break;
            }
        }
    })
}

/// One simulation step: drain queued shots in arrival order, report each
/// result, then end the match once its time is up
pub fn run_simulation_tick(room: &mut Room, outbox: &Outbox, config: &GameConfig, now: u64) {
    if !room.started || now < room.start_time {
        return;
    }

    while let Some(shot) = room.pending_shots.pop_front() {
        for result in adjudicate(room, &shot, now, config) {
            match result.outcome {
                ShotOutcome::Rejected(code) => {
                    outbox.send_to(
                        &result.shooter_id,
                        ServerMsg::ErrorEvent {
                            code,
                            message: format!("Shot rejected: {code}"),
                        },
                    );
                }
                ShotOutcome::Hit { target_id } => {
                    outbox.send_to_room(
                        room,
                        ServerMsg::ShotResult {
                            room_code: room.code.clone(),
                            shooter_id: result.shooter_id,
                            hit: true,
                            hit_target_id: Some(target_id),
                        },
                    );
                    emit_state_update(room, outbox, now);
                }
                ShotOutcome::Miss => {
                    outbox.send_to_room(
                        room,
                        ServerMsg::ShotResult {
                            room_code: room.code.clone(),
                            shooter_id: result.shooter_id,
                            hit: false,
                            hit_target_id: None,
                        },
                    );
                }
            }
        }
    }

    if time_remaining_ms(room, now) == 0 {
        end_match(room, outbox, EndReason::Timeout, None);
    }
}

/// Send the current state to every member
pub fn emit_state_update(room: &Room, outbox: &Outbox, now: u64) {
    outbox.send_to_room(room, snapshot::state_update(room, now));
}

/// Stop the match, stop its timers and announce the result.
///
/// A timeout on an idle room is ignored. A forfeit always announces, with
/// `winner_id` as given.
pub fn end_match(room: &mut Room, outbox: &Outbox, reason: EndReason, winner_id: Option<Uuid>) {
    if !room.started && reason != EndReason::Forfeit {
        return;
    }

    room.started = false;
    clear_room_intervals(room);

    let (winner_id, tie) = match reason {
        EndReason::Timeout => timeout_result(room),
        EndReason::Forfeit => (winner_id, false),
    };

    outbox.send_to_room(room, snapshot::match_end(room, reason, winner_id, tie));
    room.pending_shots.clear();
    room.targets.clear();

    info!(
        room_code = %room.code,
        reason = ?reason,
        winner_id = ?winner_id,
        tie,
        "Match ended"
    );
}

/// Stop both timers of a room; safe on an idle room
pub fn clear_room_intervals(room: &mut Room) {
    room.timers = None;
}

/// Winner by score: a lone player wins, equal top scores tie
fn timeout_result(room: &Room) -> (Option<Uuid>, bool) {
    let mut ranked: Vec<_> = room.players.iter().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));

    match ranked.as_slice() {
        [] => (None, true),
        [only] => (Some(only.id), false),
        [first, second, ..] if first.score == second.score => (None, true),
        [first, ..] => (Some(first.id), false),
    }
}
