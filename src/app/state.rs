//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::ws::SessionHandler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionHandler>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = SessionHandler::new(config.game.clone());

        Self {
            config: Arc::new(config),
            sessions,
        }
    }
}
