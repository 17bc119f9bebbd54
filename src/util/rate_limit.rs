//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GameConfig;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Create a limiter allowing `max_per_window` events as a burst, refilled
/// evenly over `window`
pub fn create_window_limiter(max_per_window: u32, window: Duration) -> Arc<Limiter> {
    let burst = NonZeroU32::new(max_per_window).unwrap_or(NonZeroU32::MIN);
    let period = window / burst.get();
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);
    Arc::new(RateLimiter::direct(quota))
}

/// Frame rate limit for inbound WebSocket text messages other than aim
/// updates and shots (per connection)
pub const INPUT_RATE_LIMIT: u32 = 60;

/// Aim updates arrive at tracking frame rate and get their own budget
pub const AIM_RATE_LIMIT: u32 = 60;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    input_limiter: Arc<Limiter>,
    aim_limiter: Arc<Limiter>,
    control_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            input_limiter: create_limiter(INPUT_RATE_LIMIT),
            aim_limiter: create_limiter(AIM_RATE_LIMIT),
            control_limiter: create_window_limiter(
                config.control_max_per_window,
                Duration::from_millis(config.control_window_ms),
            ),
        }
    }

    /// Check if an inbound frame is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }

    /// Check if an aim update is allowed
    pub fn check_aim(&self) -> bool {
        self.aim_limiter.check().is_ok()
    }

    /// Check if a room/match control event is allowed (create, join,
    /// start, signaling)
    pub fn check_control(&self) -> bool {
        self.control_limiter.check().is_ok()
    }
}
