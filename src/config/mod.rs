//! Configuration module - environment variable parsing and game tuning

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Match and room tuning
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT; fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let mut game = GameConfig::default();
        if let Some(tick_ms) = parse_env("SIM_TICK_MS")? {
            game.sim_tick_ms = tick_ms;
        }
        if let Some(broadcast_ms) = parse_env("BROADCAST_MS")? {
            game.broadcast_ms = broadcast_ms;
        }
        if let Some(countdown_ms) = parse_env("MATCH_START_COUNTDOWN_MS")? {
            game.countdown_ms = countdown_ms;
        }
        if game.sim_tick_ms == 0 {
            return Err(ConfigError::Invalid("SIM_TICK_MS"));
        }
        if game.broadcast_ms == 0 {
            return Err(ConfigError::Invalid("BROADCAST_MS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            game,
        })
    }
}

fn parse_env<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(None),
    }
}

/// Tuning for rooms, matches, targets and shot throttling.
///
/// Coordinates are normalized to the unit square; all durations are in
/// milliseconds.
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub room_code_length: usize,
    pub room_code_alphabet: &'static str,
    /// Attempts before room code generation gives up
    pub max_room_code_attempts: usize,

    pub max_players: usize,
    pub max_name_len: usize,

    pub default_duration_ms: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    /// Delay between a start command and the first accepted shot
    pub countdown_ms: u64,

    pub target_count: usize,
    pub target_radius: f64,
    pub target_x_range: (f64, f64),
    pub target_y_range: (f64, f64),

    pub shot_cooldown_ms: u64,
    pub shot_rate_window_ms: u64,
    pub shot_rate_limit: u32,
    /// Horizontal distance between the two aim points in two-gun mode
    pub two_gun_spread: f64,

    pub sim_tick_ms: u64,
    pub broadcast_ms: u64,

    pub control_window_ms: u64,
    pub control_max_per_window: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            room_code_length: 6,
            room_code_alphabet: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
            max_room_code_attempts: 1024,
            max_players: 2,
            max_name_len: 20,
            default_duration_ms: 60_000,
            min_duration_ms: 15_000,
            max_duration_ms: 300_000,
            countdown_ms: 3_000,
            target_count: 5,
            target_radius: 0.05,
            target_x_range: (0.15, 0.85),
            target_y_range: (0.15, 0.85),
            shot_cooldown_ms: 200,
            shot_rate_window_ms: 1_000,
            shot_rate_limit: 8,
            two_gun_spread: 0.12,
            sim_tick_ms: 100,
            broadcast_ms: 250,
            control_window_ms: 5_000,
            control_max_per_window: 24,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
