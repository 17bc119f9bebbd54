//! WebSocket surface: wire protocol, validation and session dispatch

pub mod handler;
pub mod outbox;
pub mod protocol;
pub mod session;
pub mod validation;

pub use session::SessionHandler;
