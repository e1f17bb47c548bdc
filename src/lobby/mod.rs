//! Lobby commands: rooms, membership and owner controls

mod service;

pub use service::{JoinedRoom, LobbyService};
