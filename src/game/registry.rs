//! Process-wide room registry

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::util::names;

use super::player::{Player, PlayerId};
use super::room::{GameMode, Room, RoomError};

/// A room shared between handlers and its background tasks
pub type SharedRoom = Arc<Mutex<Room>>;

/// Give up generating codes after this many collisions in a row
const MAX_CODE_ATTEMPTS: usize = 32;

/// What happened when a player left their room
pub struct Departure {
    pub room_code: String,
    pub room: SharedRoom,
    pub player: Option<Player>,
    /// The room had no humans left and was removed
    pub pruned: bool,
}

/// Room lookup by code and by member.
///
/// Map guards are never held while a room is locked: handles are cloned out
/// first, so callers may use the registry while holding a room lock as long
/// as they do not call [`RoomRegistry::leave`] on that same room.
pub struct RoomRegistry {
    rooms: DashMap<String, SharedRoom>,
    player_rooms: DashMap<PlayerId, String>,
    max_rooms: usize,
}

impl RoomRegistry {
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            player_rooms: DashMap::new(),
            max_rooms,
        }
    }

    /// Create a room under a fresh random code with `owner` as its first member
    pub fn create_room(
        &self,
        name: &str,
        max_players: usize,
        mode: GameMode,
        owner: Player,
        now: u64,
    ) -> Result<SharedRoom, RoomError> {
        if self.rooms.len() >= self.max_rooms {
            return Err(RoomError::TooManyRooms);
        }

        let mut rng = rand::thread_rng();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = names::room_code(&mut rng);
            match self.try_create(code, name, max_players, mode, &owner, now) {
                Err(RoomError::CodeTaken) => continue,
                result => return result,
            }
        }
        Err(RoomError::CodeTaken)
    }

    /// Insert a room under `code` unless the code is live
    pub fn try_create(
        &self,
        code: String,
        name: &str,
        max_players: usize,
        mode: GameMode,
        owner: &Player,
        now: u64,
    ) -> Result<SharedRoom, RoomError> {
        match self.rooms.entry(code.clone()) {
            Entry::Occupied(_) => {
                debug!(room_code = %code, "Room code collision");
                Err(RoomError::CodeTaken)
            }
            Entry::Vacant(slot) => {
                let room = Room::new(
                    code.clone(),
                    name.to_string(),
                    max_players,
                    mode,
                    owner.clone(),
                    now,
                );
                let shared = Arc::new(Mutex::new(room));
                slot.insert(shared.clone());
                self.player_rooms.insert(owner.id, code.clone());
                info!(room_code = %code, owner_id = %owner.id, ?mode, "Room created");
                Ok(shared)
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.get(code).map(|entry| entry.value().clone())
    }

    /// The room a player is currently in
    pub fn room_of(&self, player_id: PlayerId) -> Option<SharedRoom> {
        let code = self.player_rooms.get(&player_id)?.value().clone();
        self.get(&code)
    }

    pub fn bind_player(&self, player_id: PlayerId, code: &str) {
        self.player_rooms.insert(player_id, code.to_string());
    }

    /// Remove a player from their room, pruning the room once no humans remain.
    /// Must not be called while holding that room's lock.
    pub fn leave(&self, player_id: PlayerId) -> Option<Departure> {
        let (_, code) = self.player_rooms.remove(&player_id)?;
        let room = self.get(&code)?;

        let (player, pruned) = {
            let mut guard = room.lock();
            let player = guard.remove_player(player_id);
            let pruned = !guard.has_humans();
            if pruned {
                guard.closed = true;
                guard.game_active = false;
                guard.tasks.cancel_all();
            }
            (player, pruned)
        };

        if pruned {
            self.rooms
                .remove_if(&code, |_, current| Arc::ptr_eq(current, &room));
            info!(room_code = %code, "Room pruned");
        }

        Some(Departure {
            room_code: code,
            room,
            player,
            pruned,
        })
    }

    /// Any open, idle room of the given mode with a free seat
    pub fn find_open_room(&self, mode: GameMode) -> Option<SharedRoom> {
        let candidates: Vec<SharedRoom> = self
            .rooms
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        candidates.into_iter().find(|shared| {
            let room = shared.lock();
            !room.closed && !room.game_active && !room.is_full() && room.game_mode() == mode
        })
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Connected humans currently in a room
    pub fn player_count(&self) -> usize {
        self.player_rooms.len()
    }
}
