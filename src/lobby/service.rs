//! Lobby service - command handlers behind the WebSocket transport

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::game::ai::Difficulty;
use crate::game::battle::{self, Completion};
use crate::game::room::{MAX_ROOM_SIZE, MIN_ROOM_SIZE};
use crate::game::{session, snapshot};
use crate::game::{GameMode, Player, PlayerId, Room, RoomError, RoomRegistry, SharedRoom};
use crate::util::names::{self, normalize_room_code, ROOM_CODE_LEN};
use crate::util::time::unix_millis;
use crate::ws::protocol::ServerMsg;

/// A connection that just entered a room
#[derive(Debug)]
pub struct JoinedRoom {
    pub room_code: String,
    /// `roomCreated` or `roomJoined` for the entering player
    pub ack: ServerMsg,
    /// Room events, subscribed before the entry was announced
    pub events: broadcast::Receiver<ServerMsg>,
}

/// Lobby and in-game commands
pub struct LobbyService {
    registry: Arc<RoomRegistry>,
    quick_play_room_size: usize,
}

impl LobbyService {
    pub fn new(registry: Arc<RoomRegistry>, quick_play_room_size: usize) -> Self {
        Self {
            registry,
            quick_play_room_size: quick_play_room_size.clamp(MIN_ROOM_SIZE, MAX_ROOM_SIZE),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn is_in_room(&self, player_id: PlayerId) -> bool {
        self.registry.room_of(player_id).is_some()
    }

    fn new_player(player_id: PlayerId, requested_name: &str) -> Player {
        let mut rng = rand::thread_rng();
        let name = names::display_name(requested_name, &mut rng);
        let icon = names::random_icon(&mut rng);
        Player::new(player_id, name, icon, unix_millis())
    }

    /// Subscribe, build the ack, then announce the new roster
    fn enter(shared: &SharedRoom, player_id: PlayerId, created: bool) -> JoinedRoom {
        let room = shared.lock();
        let events = room.subscribe();
        let ack = snapshot::room_ack(&room, player_id);
        room.broadcast(snapshot::lobby_update(&room));
        JoinedRoom {
            room_code: room.code.clone(),
            ack: if created {
                ServerMsg::RoomCreated(ack)
            } else {
                ServerMsg::RoomJoined(ack)
            },
            events,
        }
    }

    pub fn create_room(
        &self,
        player_id: PlayerId,
        room_name: &str,
        player_name: &str,
        max_players: Option<u32>,
        mode: GameMode,
    ) -> Result<JoinedRoom, RoomError> {
        self.depart(player_id);

        let player = Self::new_player(player_id, player_name);
        let room_name = match room_name.trim() {
            "" => format!("{}'s Room", player.name),
            name => name.chars().take(names::MAX_NAME_LEN * 2).collect(),
        };
        let max_players = max_players.map_or(MAX_ROOM_SIZE, |n| n as usize);

        let shared = self
            .registry
            .create_room(&room_name, max_players, mode, player, unix_millis())?;
        Ok(Self::enter(&shared, player_id, true))
    }

    pub fn join_room(
        &self,
        player_id: PlayerId,
        room_code: &str,
        player_name: &str,
    ) -> Result<JoinedRoom, RoomError> {
        let code = normalize_room_code(room_code);
        if code.chars().count() != ROOM_CODE_LEN {
            return Err(RoomError::InvalidRoomCode);
        }
        if self.registry.get(&code).is_none() {
            return Err(RoomError::RoomNotFound);
        }

        self.depart(player_id);
        let shared = self.registry.get(&code).ok_or(RoomError::RoomNotFound)?;
        self.admit(&shared, player_id, player_name)?;
        info!(room_code = %code, player_id = %player_id, "Player joined room");
        Ok(Self::enter(&shared, player_id, false))
    }

    fn admit(&self, shared: &SharedRoom, player_id: PlayerId, player_name: &str) -> Result<(), RoomError> {
        let mut room = shared.lock();
        room.add_player(Self::new_player(player_id, player_name))?;
        self.registry.bind_player(player_id, &room.code);
        Ok(())
    }

    /// Join any idle room of the mode with space, or open a new one
    pub fn quick_play(
        &self,
        player_id: PlayerId,
        player_name: &str,
        mode: GameMode,
    ) -> Result<JoinedRoom, RoomError> {
        self.depart(player_id);

        if let Some(shared) = self.registry.find_open_room(mode) {
            match self.admit(&shared, player_id, player_name) {
                Ok(()) => {
                    debug!(player_id = %player_id, "Quick play joined an open room");
                    return Ok(Self::enter(&shared, player_id, false));
                }
                // Filled or pruned since the search; open a fresh room instead
                Err(e) => debug!(player_id = %player_id, error = %e, "Quick play join lost a race"),
            }
        }

        let player = Self::new_player(player_id, player_name);
        let suffix = match mode {
            GameMode::Race => "Quick Game",
            GameMode::Battle => "Battle Arena",
        };
        let room_name = format!("{}'s {}", player.name, suffix);
        let shared = self.registry.create_room(
            &room_name,
            self.quick_play_room_size,
            mode,
            player,
            unix_millis(),
        )?;
        Ok(Self::enter(&shared, player_id, true))
    }

    /// Run `f` on the player's room if they own it; everyone else is ignored
    fn as_owner<T>(
        &self,
        player_id: PlayerId,
        action: &str,
        f: impl FnOnce(&mut Room, &SharedRoom) -> T,
    ) -> Option<T> {
        let shared = self.registry.room_of(player_id)?;
        let mut room = shared.lock();
        if !room.is_owner(player_id) {
            debug!(room_code = %room.code, player_id = %player_id, action, "Ignoring non-owner command");
            return None;
        }
        Some(f(&mut *room, &shared))
    }

    pub fn start_game(&self, player_id: PlayerId) {
        self.as_owner(player_id, "startGame", |room, shared| {
            session::start_game(room, shared, unix_millis())
        });
    }

    /// Returns the `aiAdded` reply, or `None` when the command was ignored
    pub fn add_ai(&self, player_id: PlayerId, difficulty: Difficulty) -> Result<Option<ServerMsg>, RoomError> {
        self.as_owner(player_id, "addAI", |room, _| -> Result<ServerMsg, RoomError> {
            let ai_id = room.add_ai_player(difficulty, unix_millis())?;
            let room = &*room;
            room.broadcast(snapshot::lobby_update(room));
            let ai_player = room
                .player(ai_id)
                .map(|ai| snapshot::lobby_player(room, ai))
                .ok_or(RoomError::RoomNotFound)?;
            info!(room_code = %room.code, ?difficulty, "AI player added");
            Ok(ServerMsg::AiAdded { ai_player })
        })
        .transpose()
    }

    pub fn remove_ai(&self, player_id: PlayerId) -> Result<Option<ServerMsg>, RoomError> {
        self.as_owner(player_id, "removeAI", |room, _| -> Result<ServerMsg, RoomError> {
            let ai_id = room.remove_ai_player()?;
            room.broadcast(snapshot::lobby_update(room));
            Ok(ServerMsg::AiRemoved { player_id: ai_id })
        })
        .transpose()
    }

    pub fn chat(&self, player_id: PlayerId, text: String) {
        if text.trim().is_empty() {
            return;
        }
        let Some(shared) = self.registry.room_of(player_id) else {
            return;
        };
        let mut room = shared.lock();
        if let Some(message) = room.add_chat_message(player_id, text, unix_millis()) {
            room.broadcast(ServerMsg::NewChatMessage(message));
            room.broadcast(snapshot::lobby_update(&room));
        }
    }

    /// Race key press; the reply goes to the pressing player only
    pub fn key_press(&self, player_id: PlayerId) -> Option<ServerMsg> {
        let shared = self.registry.room_of(player_id)?;
        let mut room = shared.lock();
        if room.game_mode() != GameMode::Race || !room.game_active || room.winner.is_some() {
            return None;
        }
        let player = room.player_mut(player_id)?;
        let accepted = player.press_key(unix_millis());
        Some(snapshot::speed_update(player, accepted))
    }

    pub fn complete_word(&self, player_id: PlayerId, typed_word: &str, time_taken: Option<u64>) {
        let Some(shared) = self.registry.room_of(player_id) else {
            return;
        };
        let mut room = shared.lock();
        if room.game_mode() != GameMode::Battle || !room.is_running() {
            return;
        }
        if !room.player(player_id).is_some_and(|p| p.is_alive()) {
            return;
        }

        let outcome = battle::resolve_completion(&mut room, &shared, player_id, typed_word, unix_millis());
        debug!(
            room_code = %room.code,
            player_id = %player_id,
            ?time_taken,
            ?outcome,
            "Word completed"
        );
        if outcome == Completion::Attacked {
            room.broadcast(snapshot::state_update(&room));
        }
    }

    /// Explicit leave; replies `leftRoom` if the player was in a room
    pub fn leave_room(&self, player_id: PlayerId) -> Option<ServerMsg> {
        self.depart(player_id).then_some(ServerMsg::LeftRoom)
    }

    pub fn host_restart(&self, player_id: PlayerId) {
        self.as_owner(player_id, "hostRestartGame", |room, shared| {
            session::host_restart(room, shared, unix_millis())
        });
    }

    pub fn host_end(&self, player_id: PlayerId) {
        self.as_owner(player_id, "hostEndGame", |room, _| {
            session::end_session(room);
            room.broadcast(snapshot::lobby_update(room));
        });
    }

    pub fn disconnect(&self, player_id: PlayerId) {
        if self.depart(player_id) {
            debug!(player_id = %player_id, "Disconnected player removed from room");
        }
    }

    /// Remove the player from their current room and tell whoever is left
    fn depart(&self, player_id: PlayerId) -> bool {
        let Some(departure) = self.registry.leave(player_id) else {
            return false;
        };
        info!(
            room_code = %departure.room_code,
            player_id = %player_id,
            pruned = departure.pruned,
            "Player left room"
        );
        if !departure.pruned {
            let room = departure.room.lock();
            room.broadcast(snapshot::lobby_update(&room));
            if room.game_active {
                room.broadcast(snapshot::state_update(&room));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::Receiver;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn service() -> LobbyService {
        LobbyService::new(Arc::new(RoomRegistry::new(100)), 15)
    }

    fn drain(rx: &mut Receiver<ServerMsg>) -> Vec<ServerMsg> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn ack_of(joined: &JoinedRoom) -> &crate::ws::protocol::RoomAck {
        match &joined.ack {
            ServerMsg::RoomCreated(ack) | ServerMsg::RoomJoined(ack) => ack,
            other => panic!("unexpected ack {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_then_join() {
        let svc = service();
        let (ana, bo) = (Uuid::new_v4(), Uuid::new_v4());

        let mut created = assert_ok!(svc.create_room(ana, "Friday", "Ana", Some(4), GameMode::Race));
        assert!(matches!(created.ack, ServerMsg::RoomCreated(_)));
        assert!(ack_of(&created).is_owner);
        assert_eq!(ack_of(&created).max_players, 4);
        // The creator sees their own lobby update
        assert!(matches!(
            drain(&mut created.events).as_slice(),
            [ServerMsg::LobbyUpdate(_)]
        ));

        let code = created.room_code.to_lowercase();
        let joined = assert_ok!(svc.join_room(bo, &format!("  {code} "), "Bo"));
        assert!(matches!(joined.ack, ServerMsg::RoomJoined(_)));
        assert!(!ack_of(&joined).is_owner);

        match drain(&mut created.events).last() {
            Some(ServerMsg::LobbyUpdate(lobby)) => {
                assert_eq!(lobby.player_count, 2);
                assert_eq!(lobby.owner_id, ana);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_errors() {
        let svc = service();
        let err = assert_err!(svc.join_room(Uuid::new_v4(), "ABC", "Bo"));
        assert_eq!(err, RoomError::InvalidRoomCode);
        let err = assert_err!(svc.join_room(Uuid::new_v4(), "ZZZZZZ", "Bo"));
        assert_eq!(err, RoomError::RoomNotFound);

        let created = assert_ok!(svc.create_room(Uuid::new_v4(), "Tiny", "Ana", Some(1), GameMode::Race));
        let err = assert_err!(svc.join_room(Uuid::new_v4(), &created.room_code, "Bo"));
        assert_eq!(err, RoomError::RoomFull);
        assert_eq!(err.to_string(), "Room is full!");
    }

    #[tokio::test]
    async fn test_joining_elsewhere_leaves_previous_room() {
        let svc = service();
        let (ana, bo) = (Uuid::new_v4(), Uuid::new_v4());
        let first = assert_ok!(svc.create_room(ana, "One", "Ana", None, GameMode::Race));
        let second = assert_ok!(svc.create_room(bo, "Two", "Bo", None, GameMode::Race));

        assert_ok!(svc.join_room(ana, &second.room_code, "Ana"));
        // Ana was alone in the first room, so it is gone
        assert!(svc.registry().get(&first.room_code).is_none());
        assert_eq!(svc.registry().room_count(), 1);
        assert_eq!(svc.registry().player_count(), 2);
    }

    #[tokio::test]
    async fn test_quick_play_reuses_open_room_of_same_mode() {
        let svc = service();
        let (ana, bo, cy) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let first = assert_ok!(svc.quick_play(ana, "Ana", GameMode::Battle));
        assert!(matches!(first.ack, ServerMsg::RoomCreated(_)));
        assert_eq!(ack_of(&first).room_name, "Ana's Battle Arena");
        assert_eq!(ack_of(&first).max_players, 15);

        let second = assert_ok!(svc.quick_play(bo, "Bo", GameMode::Battle));
        assert_eq!(second.room_code, first.room_code);
        assert!(matches!(second.ack, ServerMsg::RoomJoined(_)));

        let race = assert_ok!(svc.quick_play(cy, "Cy", GameMode::Race));
        assert_ne!(race.room_code, first.room_code);
        assert_eq!(ack_of(&race).room_name, "Cy's Quick Game");
    }

    #[tokio::test]
    async fn test_only_owner_controls_room() {
        let svc = service();
        let (ana, bo) = (Uuid::new_v4(), Uuid::new_v4());
        let created = assert_ok!(svc.create_room(ana, "Room", "Ana", Some(4), GameMode::Race));
        assert_ok!(svc.join_room(bo, &created.room_code, "Bo"));
        let shared = svc.registry().get(&created.room_code).expect("room exists");

        svc.start_game(bo);
        assert!(!shared.lock().game_active);
        assert!(matches!(svc.add_ai(bo, Difficulty::Hard), Ok(None)));
        assert_eq!(shared.lock().players.len(), 2);

        svc.start_game(ana);
        assert!(shared.lock().game_active);
        svc.host_end(ana);
        assert!(!shared.lock().game_active);
        shared.lock().tasks.cancel_all();
    }

    #[tokio::test]
    async fn test_ai_add_and_remove_replies() {
        let svc = service();
        let ana = Uuid::new_v4();
        assert_ok!(svc.create_room(ana, "Bots", "Ana", Some(2), GameMode::Race));

        let added = assert_ok!(svc.add_ai(ana, Difficulty::Easy));
        let ai_id = match added {
            Some(ServerMsg::AiAdded { ai_player }) => {
                assert!(ai_player.is_ai);
                ai_player.id
            }
            other => panic!("unexpected {other:?}"),
        };
        let err = assert_err!(svc.add_ai(ana, Difficulty::Easy));
        assert_eq!(err, RoomError::RoomFull);

        match assert_ok!(svc.remove_ai(ana)) {
            Some(ServerMsg::AiRemoved { player_id }) => assert_eq!(player_id, ai_id),
            other => panic!("unexpected {other:?}"),
        }
        let err = assert_err!(svc.remove_ai(ana));
        assert_eq!(err, RoomError::NoAiPlayers);
    }

    #[tokio::test]
    async fn test_key_press_only_during_race() {
        let svc = service();
        let ana = Uuid::new_v4();
        let created = assert_ok!(svc.create_room(ana, "Race", "Ana", Some(2), GameMode::Race));
        assert!(svc.key_press(ana).is_none());

        svc.start_game(ana);
        match svc.key_press(ana) {
            Some(ServerMsg::SpeedUpdate { key_accepted, key_count, .. }) => {
                assert!(key_accepted);
                assert_eq!(key_count, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(svc.key_press(Uuid::new_v4()).is_none());
        if let Some(shared) = svc.registry().get(&created.room_code) {
            shared.lock().tasks.cancel_all();
        }
    }

    #[tokio::test]
    async fn test_chat_broadcasts_message_and_lobby() {
        let svc = service();
        let ana = Uuid::new_v4();
        let mut created = assert_ok!(svc.create_room(ana, "Chat", "Ana", None, GameMode::Race));
        drain(&mut created.events);

        svc.chat(ana, "   ".into());
        assert!(drain(&mut created.events).is_empty());

        svc.chat(ana, "gl hf".into());
        let msgs = drain(&mut created.events);
        assert!(matches!(
            msgs.as_slice(),
            [ServerMsg::NewChatMessage(m), ServerMsg::LobbyUpdate(_)] if m.message == "gl hf" && m.player_name == "Ana"
        ));
    }

    #[tokio::test]
    async fn test_leave_and_disconnect() {
        let svc = service();
        let (ana, bo) = (Uuid::new_v4(), Uuid::new_v4());
        let mut created = assert_ok!(svc.create_room(ana, "Room", "Ana", None, GameMode::Battle));
        assert_ok!(svc.join_room(bo, &created.room_code, "Bo"));
        drain(&mut created.events);

        assert!(matches!(svc.leave_room(bo), Some(ServerMsg::LeftRoom)));
        assert!(svc.leave_room(bo).is_none());
        match drain(&mut created.events).as_slice() {
            [ServerMsg::LobbyUpdate(lobby)] => assert_eq!(lobby.player_count, 1),
            other => panic!("unexpected {other:?}"),
        }

        svc.disconnect(ana);
        assert_eq!(svc.registry().room_count(), 0);
        assert_eq!(svc.registry().player_count(), 0);
    }

    #[tokio::test]
    async fn test_owner_leaving_mid_game_hands_over_controls() {
        let svc = service();
        let (ana, bo) = (Uuid::new_v4(), Uuid::new_v4());
        let created = assert_ok!(svc.create_room(ana, "Room", "Ana", None, GameMode::Battle));
        let mut joined = assert_ok!(svc.join_room(bo, &created.room_code, "Bo"));
        svc.start_game(ana);
        drain(&mut joined.events);

        svc.disconnect(ana);
        let msgs = drain(&mut joined.events);
        assert!(matches!(msgs.first(), Some(ServerMsg::LobbyUpdate(l)) if l.owner_id == bo));
        assert!(msgs.iter().any(|m| matches!(m, ServerMsg::BattleStateUpdate(_))));

        svc.host_end(bo);
        let shared = svc.registry().get(&created.room_code).expect("room kept");
        assert!(!shared.lock().game_active);
        shared.lock().tasks.cancel_all();
    }
}
