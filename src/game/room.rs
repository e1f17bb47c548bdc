//! Room state: roster, chat and the per-mode game payload

use std::collections::{BTreeMap, VecDeque};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::util::names;
use crate::ws::protocol::ServerMsg;

use super::ai::Difficulty;
use super::combat::{word_damage, AttackResult, Elimination, WordCompletion};
use super::player::{Player, PlayerId, MAX_SLOWDOWN};
use super::words::{
    pick_word, select_word_length, WordData, WordPosition, BATTLE_DURATION_SECS,
    MAX_ACTIVE_WORDS, WORD_SPAWN_CHANCE,
};

pub const MIN_ROOM_SIZE: usize = 1;
pub const MAX_ROOM_SIZE: usize = 15;
pub const MAX_CHAT_MESSAGES: usize = 50;

/// Room event channel capacity; slow clients skip what they miss
const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Race,
    Battle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub player_name: String,
    pub message: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RaceState {
    pub tick: u64,
}

#[derive(Debug, Clone)]
pub struct BattleState {
    /// Seconds left in the current battle
    pub battle_timer: u32,
    /// Active words keyed by id, so iteration follows creation order
    pub current_words: BTreeMap<u64, WordData>,
    pub word_id: u64,
    pub battle_start_time: u64,
}

impl BattleState {
    fn new(now: u64) -> Self {
        Self {
            battle_timer: BATTLE_DURATION_SECS,
            current_words: BTreeMap::new(),
            word_id: 0,
            battle_start_time: now,
        }
    }
}

/// Mode-specific payload
#[derive(Debug, Clone)]
pub enum ModeState {
    Race(RaceState),
    Battle(BattleState),
}

impl ModeState {
    fn for_mode(mode: GameMode, now: u64) -> Self {
        match mode {
            GameMode::Race => ModeState::Race(RaceState::default()),
            GameMode::Battle => ModeState::Battle(BattleState::new(now)),
        }
    }
}

/// Background tasks owned by a room
#[derive(Debug, Default)]
pub struct RoomTasks {
    pub game_loop: Option<JoinHandle<()>>,
    pub battle_timer: Option<JoinHandle<()>>,
    pub restart: Option<JoinHandle<()>>,
}

impl RoomTasks {
    pub fn cancel_game(&mut self) {
        for handle in [self.game_loop.take(), self.battle_timer.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    pub fn cancel_restart(&mut self) {
        if let Some(handle) = self.restart.take() {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel_game();
        self.cancel_restart();
    }
}

/// Room errors, shown to the player as-is
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room is full!")]
    RoomFull,

    #[error("Room not found!")]
    RoomNotFound,

    #[error("Invalid room code!")]
    InvalidRoomCode,

    #[error("No AI players to remove")]
    NoAiPlayers,

    #[error("Too many active rooms, try again later")]
    TooManyRooms,

    #[error("Room code already in use")]
    CodeTaken,
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub name: String,
    pub max_players: usize,
    pub owner_id: PlayerId,
    /// Join order; used for owner hand-off and tie-breaks
    pub players: Vec<Player>,
    pub game_active: bool,
    /// Bumped on every start; loops spawned for an older game stop on mismatch
    pub game_epoch: u64,
    pub winner: Option<PlayerId>,
    pub chat_messages: VecDeque<ChatMessage>,
    pub mode: ModeState,
    /// Set once the room is pruned; late timers check it
    pub closed: bool,
    pub tasks: RoomTasks,
    events: broadcast::Sender<ServerMsg>,
    rng: ChaCha8Rng,
}

impl Room {
    pub fn new(
        code: String,
        name: String,
        max_players: usize,
        mode: GameMode,
        owner: Player,
        now: u64,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            code,
            name,
            max_players: max_players.clamp(MIN_ROOM_SIZE, MAX_ROOM_SIZE),
            owner_id: owner.id,
            players: vec![owner],
            game_active: false,
            game_epoch: 0,
            winner: None,
            chat_messages: VecDeque::with_capacity(MAX_CHAT_MESSAGES),
            mode: ModeState::for_mode(mode, now),
            closed: false,
            tasks: RoomTasks::default(),
            events,
            rng: ChaCha8Rng::seed_from_u64(rand::random()),
        }
    }

    /// Replace the room's random source with a fixed seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn game_mode(&self) -> GameMode {
        match self.mode {
            ModeState::Race(_) => GameMode::Race,
            ModeState::Battle(_) => GameMode::Battle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    /// Send to every connection in the room. No subscribers is not an error.
    pub fn broadcast(&self, msg: ServerMsg) {
        let _ = self.events.send(msg);
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn is_owner(&self, id: PlayerId) -> bool {
        self.owner_id == id
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn has_humans(&self) -> bool {
        self.players.iter().any(|p| !p.is_ai())
    }

    pub fn is_running(&self) -> bool {
        self.game_active && !self.closed
    }

    /// True while the game started as `epoch` is still the one running
    pub fn is_running_epoch(&self, epoch: u64) -> bool {
        self.game_epoch == epoch && self.is_running()
    }

    pub fn can_start_game(&self) -> bool {
        !self.players.is_empty() && !self.game_active
    }

    pub fn add_player(&mut self, player: Player) -> Result<(), RoomError> {
        if self.closed {
            return Err(RoomError::RoomNotFound);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }
        self.players.push(player);
        Ok(())
    }

    pub fn add_ai_player(&mut self, difficulty: Difficulty, now: u64) -> Result<PlayerId, RoomError> {
        if self.closed {
            return Err(RoomError::RoomNotFound);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }
        let name = names::ai_name(&mut self.rng);
        let icon = names::random_icon(&mut self.rng);
        let player = Player::new_ai(Uuid::new_v4(), name, icon, difficulty, now, &mut self.rng);
        let id = player.id;
        self.players.push(player);
        Ok(id)
    }

    /// Remove a player; ownership passes to the first remaining human
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        let removed = self.players.remove(index);

        if self.owner_id == id {
            let heir = self
                .players
                .iter()
                .find(|p| !p.is_ai())
                .or_else(|| self.players.first());
            if let Some(heir) = heir {
                self.owner_id = heir.id;
            }
        }
        Some(removed)
    }

    /// Remove the first AI in join order
    pub fn remove_ai_player(&mut self) -> Result<PlayerId, RoomError> {
        let id = self
            .players
            .iter()
            .find(|p| p.is_ai())
            .map(|p| p.id)
            .ok_or(RoomError::NoAiPlayers)?;
        self.remove_player(id);
        Ok(id)
    }

    pub fn add_chat_message(&mut self, player_id: PlayerId, text: String, now: u64) -> Option<ChatMessage> {
        let player = self.player(player_id)?;
        let message = ChatMessage {
            player_name: player.name.clone(),
            message: text,
            timestamp: now,
        };
        self.chat_messages.push_back(message.clone());
        while self.chat_messages.len() > MAX_CHAT_MESSAGES {
            self.chat_messages.pop_front();
        }
        Some(message)
    }

    // Race

    /// Everyone is slowed by the sum of the others' sabotage, using the
    /// levels as they stood before this tick's decay.
    pub fn aggregate_sabotage(&mut self, now: u64) {
        let levels: Vec<u32> = self.players.iter().map(|p| p.sabotage_level).collect();
        let total: u32 = levels.iter().sum();
        for (player, own) in self.players.iter_mut().zip(levels) {
            player.slowdown_effect = (total - own).min(MAX_SLOWDOWN);
            player.decay_sabotage(now);
        }
    }

    pub fn drive_race_ai(&mut self, now: u64) {
        for player in self.players.iter_mut() {
            player.drive_race_ai(now, &mut self.rng);
        }
    }

    /// Move every racer. Returns the first finisher of this tick in join order.
    pub fn advance_racers(&mut self, now: u64) -> Option<PlayerId> {
        let mut first = None;
        for player in self.players.iter_mut() {
            if player.advance(now) && first.is_none() {
                first = Some(player.id);
            }
        }
        if self.winner.is_none() {
            self.winner = first;
        }
        first
    }

    pub fn race_tick(&self) -> u64 {
        match &self.mode {
            ModeState::Race(race) => race.tick,
            ModeState::Battle(_) => 0,
        }
    }

    pub fn bump_race_tick(&mut self) {
        if let ModeState::Race(race) = &mut self.mode {
            race.tick += 1;
        }
    }

    // Battle

    pub fn battle(&self) -> Option<&BattleState> {
        match &self.mode {
            ModeState::Battle(battle) => Some(battle),
            ModeState::Race(_) => None,
        }
    }

    pub fn battle_mut(&mut self) -> Option<&mut BattleState> {
        match &mut self.mode {
            ModeState::Battle(battle) => Some(battle),
            ModeState::Race(_) => None,
        }
    }

    /// Spawn gate: room for another word and the per-tick roll passes
    pub fn should_spawn_word(&mut self) -> bool {
        let active = match self.battle() {
            Some(battle) => battle.current_words.len(),
            None => return false,
        };
        active < MAX_ACTIVE_WORDS && self.rng.gen_bool(WORD_SPAWN_CHANCE)
    }

    pub fn generate_word(&mut self, now: u64) -> Option<WordData> {
        let ModeState::Battle(battle) = &mut self.mode else {
            return None;
        };

        let elapsed = now.saturating_sub(battle.battle_start_time);
        let length = select_word_length(elapsed, &mut self.rng);
        let text = pick_word(length, &mut self.rng);
        let living: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.id)
            .collect();

        battle.word_id += 1;
        let word = WordData {
            id: battle.word_id,
            text: text.to_string(),
            length,
            damage: word_damage(length),
            target_player: living.choose(&mut self.rng).copied(),
            created_at: now,
            position: WordPosition::random(&mut self.rng),
        };
        battle.current_words.insert(word.id, word.clone());
        Some(word)
    }

    /// Drop words past their lifetime, returning their ids
    pub fn expire_words(&mut self, now: u64) -> Vec<u64> {
        let Some(battle) = self.battle_mut() else {
            return Vec::new();
        };
        let expired: Vec<u64> = battle
            .current_words
            .values()
            .filter(|w| w.is_expired(now))
            .map(|w| w.id)
            .collect();
        for id in &expired {
            battle.current_words.remove(id);
        }
        expired
    }

    /// Resolve a typed word against the active words.
    ///
    /// The first active word matching case-insensitively is consumed. Damage
    /// lands only when the word targets a living player other than the typist;
    /// otherwise the word is still consumed and nothing is returned.
    pub fn process_word_completion(
        &mut self,
        player_id: PlayerId,
        typed: &str,
        now: u64,
    ) -> Option<WordCompletion> {
        let attacker_index = self.players.iter().position(|p| p.id == player_id)?;
        let battle = self.battle_mut()?;
        let word_id = battle.current_words.values().find(|w| w.matches(typed))?.id;
        let word = battle.current_words.remove(&word_id)?;

        let target_id = word.target_player.filter(|target| *target != player_id)?;
        let target = self
            .players
            .iter_mut()
            .find(|p| p.id == target_id && p.is_alive())?;
        let eliminated = target.take_damage(word.damage);
        let target_health = target.health;
        let target_name = target.name.clone();

        let attacker = &mut self.players[attacker_index];
        attacker.hits += 1;
        attacker.complete_word(&word.text, now);

        let elimination = eliminated.then(|| Elimination {
            player_id: target_id,
            player_name: target_name,
            eliminated_by: attacker.name.clone(),
        });

        Some(WordCompletion {
            attack: AttackResult {
                attacker: player_id,
                target: target_id,
                damage: word.damage,
                word: word.text,
                word_length: word.length,
                target_health,
            },
            elimination,
        })
    }

    /// Decide whether the battle is over and record the winner.
    ///
    /// One or no survivors ends it. At timeout the healthiest survivor wins,
    /// earliest joiner on ties.
    pub fn check_battle_end(&mut self) -> bool {
        let Some(battle) = self.battle() else {
            return false;
        };
        let timed_out = battle.battle_timer == 0;

        let alive: Vec<&Player> = self.players.iter().filter(|p| p.is_alive()).collect();
        if alive.len() <= 1 {
            self.winner = alive.first().map(|p| p.id);
            return true;
        }

        if timed_out {
            let best = alive
                .iter()
                .copied()
                .reduce(|best, p| if p.health > best.health { p } else { best });
            self.winner = best.map(|p| p.id);
            return true;
        }

        false
    }

    /// One second off the battle clock; returns the seconds left
    pub fn tick_battle_timer(&mut self) -> Option<u32> {
        let battle = self.battle_mut()?;
        battle.battle_timer = battle.battle_timer.saturating_sub(1);
        Some(battle.battle_timer)
    }

    /// Step the AI at `index`. Returns (ai id, word text) when it finishes a word.
    pub fn drive_battle_ai(&mut self, index: usize, now: u64) -> Option<(PlayerId, String)> {
        let ModeState::Battle(battle) = &self.mode else {
            return None;
        };
        let player = self.players.get_mut(index)?;
        let text = player.drive_battle_ai(now, &battle.current_words, &mut self.rng)?;
        Some((player.id, text))
    }

    pub fn reset_for_race(&mut self, now: u64) {
        for player in self.players.iter_mut() {
            player.reset_for_race(now, &mut self.rng);
        }
        self.mode = ModeState::Race(RaceState::default());
        self.winner = None;
    }

    /// Full health, fresh clock and no words; word ids keep counting up
    pub fn reset_for_battle(&mut self, now: u64) {
        for player in self.players.iter_mut() {
            player.reset_for_battle(now, &mut self.rng);
        }
        match &mut self.mode {
            ModeState::Battle(battle) => {
                battle.battle_timer = BATTLE_DURATION_SECS;
                battle.current_words.clear();
                battle.battle_start_time = now;
            }
            ModeState::Race(_) => self.mode = ModeState::Battle(BattleState::new(now)),
        }
        self.winner = None;
    }
}
