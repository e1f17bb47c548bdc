//! Game simulation modules

pub mod ai;
pub mod battle;
pub mod combat;
pub mod player;
pub mod race;
pub mod registry;
pub mod room;
pub mod session;
pub mod snapshot;
pub mod words;

pub use player::{Player, PlayerId};
pub use registry::{RoomRegistry, SharedRoom};
pub use room::{GameMode, Room, RoomError};
