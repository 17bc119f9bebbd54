//! Game simulation modules

pub mod match_loop;
pub mod room;
pub mod shot;
pub mod snapshot;
pub mod store;
pub mod targets;

pub use match_loop::MatchDriver;
pub use room::{PlayerState, Room, TargetState};
pub use store::{RoomStore, StoreError};
