//! Per-participant state for both game modes

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;
use uuid::Uuid;

use super::ai::{AiState, Difficulty};
use super::combat::apply_damage;
use super::words::WordData;

pub type PlayerId = Uuid;

/// Race constants
pub const FINISH_LINE: f64 = 100.0;
pub const MAX_SPEED: f64 = 20.0;
pub const MAX_SABOTAGE: u32 = 15;
pub const MAX_SLOWDOWN: u32 = 50;
/// Key presses are limited to this many per window
pub const KEY_WINDOW_MILLIS: u64 = 250;
pub const KEY_WINDOW_CAPACITY: usize = 4;
const SABOTAGE_PER_KEY: f64 = 3.75;
const SPEED_DECAY_GRACE_MILLIS: u64 = 100;
const SPEED_DECAY_DIVISOR: f64 = 50.0;
const SABOTAGE_DECAY_GRACE_MILLIS: u64 = 500;

/// Battle constants
pub const DEFAULT_MAX_HEALTH: u32 = 100;

#[derive(Debug, Clone)]
pub enum InputSource {
    Human,
    Ai(AiState),
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub icon: String,
    pub is_winner: bool,
    pub input: InputSource,

    // Race
    pub position: f64,
    pub speed: f64,
    pub key_count: u32,
    pub last_key_time: u64,
    key_buffer: VecDeque<u64>,
    pub sabotage_level: u32,
    pub slowdown_effect: u32,

    // Battle
    pub health: u32,
    pub max_health: u32,
    pub hits: u32,
    pub words_typed: u32,
    pub total_characters: u32,
    pub correct_characters: u32,
    pub accuracy: u32,
    pub wpm: u32,
    pub start_time: u64,
}

impl Player {
    pub fn new(id: PlayerId, name: String, icon: String, now: u64) -> Self {
        Self {
            id,
            name,
            icon,
            is_winner: false,
            input: InputSource::Human,
            position: 0.0,
            speed: 0.0,
            key_count: 0,
            last_key_time: now,
            key_buffer: VecDeque::with_capacity(KEY_WINDOW_CAPACITY),
            sabotage_level: 0,
            slowdown_effect: 0,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            hits: 0,
            words_typed: 0,
            total_characters: 0,
            correct_characters: 0,
            accuracy: 100,
            wpm: 0,
            start_time: now,
        }
    }

    pub fn new_ai<R: Rng + ?Sized>(
        id: PlayerId,
        name: String,
        icon: String,
        difficulty: Difficulty,
        now: u64,
        rng: &mut R,
    ) -> Self {
        let mut player = Self::new(id, name, icon, now);
        player.input = InputSource::Ai(AiState::new(difficulty, now, rng));
        player
    }

    pub fn is_ai(&self) -> bool {
        matches!(self.input, InputSource::Ai(_))
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    fn prune_key_window(&mut self, now: u64) {
        while let Some(&oldest) = self.key_buffer.front() {
            if now.saturating_sub(oldest) >= KEY_WINDOW_MILLIS {
                self.key_buffer.pop_front();
            } else {
                break;
            }
        }
    }

    /// Presses inside the sliding window ending at `now`
    pub fn keys_in_window(&mut self, now: u64) -> usize {
        self.prune_key_window(now);
        self.key_buffer.len()
    }

    /// Register a key press. Returns false when the window is already full;
    /// a rejected press changes nothing.
    pub fn press_key(&mut self, now: u64) -> bool {
        if self.keys_in_window(now) >= KEY_WINDOW_CAPACITY {
            return false;
        }

        self.key_buffer.push_back(now);
        self.key_count += 1;

        let time_diff = now.saturating_sub(self.last_key_time);
        let boost = if time_diff < 50 {
            2.0
        } else if time_diff < 100 {
            1.0
        } else {
            0.5
        };
        self.speed = (self.speed + boost).min(MAX_SPEED);
        self.last_key_time = now;

        let sabotage = (self.key_buffer.len() as f64 * SABOTAGE_PER_KEY).floor() as u32;
        self.sabotage_level = sabotage.min(MAX_SABOTAGE);
        true
    }

    /// Idle decay, applied every race tick
    pub fn calculate_speed(&mut self, now: u64) -> f64 {
        let elapsed = now.saturating_sub(self.last_key_time);
        if elapsed > SPEED_DECAY_GRACE_MILLIS {
            self.speed = (self.speed - elapsed as f64 / SPEED_DECAY_DIVISOR).max(0.0);
        }
        self.speed
    }

    /// Move toward the finish line. Returns true exactly once per race, on
    /// the tick this player crosses it.
    pub fn advance(&mut self, now: u64) -> bool {
        self.calculate_speed(now);
        let effective = self.speed * (1.0 - self.slowdown_effect as f64 / 100.0);
        self.position = (self.position + effective / 10.0).min(FINISH_LINE);

        if self.position >= FINISH_LINE && !self.is_winner {
            self.is_winner = true;
            return true;
        }
        false
    }

    pub fn decay_sabotage(&mut self, now: u64) {
        if now.saturating_sub(self.last_key_time) > SABOTAGE_DECAY_GRACE_MILLIS {
            self.sabotage_level = self.sabotage_level.saturating_sub(1);
        }
    }

    /// Typing stats after a word that landed
    pub fn complete_word(&mut self, word: &str, now: u64) {
        let chars = word.chars().count() as u32;
        self.words_typed += 1;
        self.total_characters += chars;
        self.correct_characters += chars;

        let minutes = now.saturating_sub(self.start_time).max(1) as f64 / 60_000.0;
        self.wpm = (self.words_typed as f64 / minutes).round() as u32;
        if self.total_characters > 0 {
            self.accuracy = (self.correct_characters as f64 / self.total_characters as f64 * 100.0)
                .round() as u32;
        }
    }

    /// Returns true if this hit eliminated the player
    pub fn take_damage(&mut self, damage: u32) -> bool {
        let (health, dead) = apply_damage(self.health, damage);
        self.health = health;
        dead
    }

    pub fn reset_for_race<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        self.position = 0.0;
        self.speed = 0.0;
        self.key_count = 0;
        self.last_key_time = now;
        self.key_buffer.clear();
        self.sabotage_level = 0;
        self.slowdown_effect = 0;
        self.is_winner = false;
        if let InputSource::Ai(ai) = &mut self.input {
            ai.reset_for_race(now, rng);
        }
    }

    pub fn reset_for_battle<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        self.health = self.max_health;
        self.hits = 0;
        self.words_typed = 0;
        self.total_characters = 0;
        self.correct_characters = 0;
        self.accuracy = 100;
        self.wpm = 0;
        self.start_time = now;
        self.is_winner = false;
        if let InputSource::Ai(ai) = &mut self.input {
            ai.reset_for_battle(now, rng);
        }
    }

    /// Race AI step. Returns true if the AI pressed and the press counted.
    pub fn drive_race_ai<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) -> bool {
        let wants = match &mut self.input {
            InputSource::Ai(ai) => ai.wants_key_press(now, rng),
            InputSource::Human => false,
        };
        wants && self.press_key(now)
    }

    /// Battle AI step. Returns the text of a word the AI just finished typing.
    pub fn drive_battle_ai<R: Rng + ?Sized>(
        &mut self,
        now: u64,
        words: &BTreeMap<u64, WordData>,
        rng: &mut R,
    ) -> Option<String> {
        if !self.is_alive() {
            return None;
        }
        let me = self.id;
        match &mut self.input {
            InputSource::Ai(ai) => ai.step_typing(now, me, words, rng).map(|target| target.text),
            InputSource::Human => None,
        }
    }
}
