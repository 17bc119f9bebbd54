//! Time utilities for the match simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Authoritative match clock in Unix milliseconds.
///
/// Anchored to wall time once, then advanced by the tokio monotonic clock so
/// match timestamps never jump backwards and follow paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct ServerClock {
    anchor: tokio::time::Instant,
    anchor_unix_ms: u64,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            anchor: tokio::time::Instant::now(),
            anchor_unix_ms: unix_millis(),
        }
    }

    /// Current server time in Unix milliseconds
    pub fn now_ms(&self) -> u64 {
        self.anchor_unix_ms + self.anchor.elapsed().as_millis() as u64
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}
