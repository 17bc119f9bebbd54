//! Target Duel Server - authoritative two-player target shooting
//!
//! Rooms pair two players by a short code. The server owns the targets,
//! adjudicates every shot on a fixed simulation tick and streams match
//! state to both clients over WebSocket.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
