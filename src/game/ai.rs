//! Computer-controlled players: difficulty profiles and decision stepping

use std::collections::BTreeMap;
use std::ops::Range;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::player::PlayerId;
use super::words::WordData;

/// Chance that an AI actually presses when its race timer fires
const RACE_PRESS_CHANCE: f64 = 0.9;

/// Pause after a word lands, and after a fumbled one
const SUCCESS_PAUSE_MILLIS: Range<u64> = 200..1_000;
const ERROR_PAUSE_MILLIS: Range<u64> = 500..1_500;

/// Initial jitter before the first action
const FIRST_ACTION_JITTER_MILLIS: u64 = 1_000;
const BATTLE_START_JITTER_MILLIS: u64 = 2_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Ranges the per-AI rates are rolled from
struct Profile {
    keys_per_sec: Range<f64>,
    wpm: Range<f64>,
    error_rate: Range<f64>,
}

impl Difficulty {
    fn profile(self) -> Profile {
        match self {
            Difficulty::Easy => Profile {
                keys_per_sec: 2.0..4.0,
                wpm: 25.0..40.0,
                error_rate: 0.15..0.25,
            },
            Difficulty::Medium => Profile {
                keys_per_sec: 4.0..7.0,
                wpm: 40.0..60.0,
                error_rate: 0.08..0.15,
            },
            Difficulty::Hard => Profile {
                keys_per_sec: 6.0..10.0,
                wpm: 60.0..90.0,
                error_rate: 0.02..0.07,
            },
        }
    }

    /// Word lengths this difficulty goes for first
    pub fn prefers(self, length: usize) -> bool {
        match self {
            Difficulty::Easy => length <= 5,
            Difficulty::Medium => true,
            Difficulty::Hard => length >= 7,
        }
    }
}

/// The word an AI is currently typing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetWord {
    pub id: u64,
    pub text: String,
    pub length: usize,
}

#[derive(Debug, Clone)]
pub struct AiState {
    pub difficulty: Difficulty,
    pub next_action_time: u64,
    pub target_word: Option<TargetWord>,
    /// Characters typed so far on the target word
    pub typing_progress: f64,
    pub last_step_time: u64,
    pub key_rate: f64,
    pub typing_speed: f64,
    pub error_rate: f64,
}

impl AiState {
    pub fn new<R: Rng + ?Sized>(difficulty: Difficulty, now: u64, rng: &mut R) -> Self {
        let profile = difficulty.profile();
        Self {
            difficulty,
            next_action_time: now + rng.gen_range(0..FIRST_ACTION_JITTER_MILLIS),
            target_word: None,
            typing_progress: 0.0,
            last_step_time: now,
            key_rate: rng.gen_range(profile.keys_per_sec),
            typing_speed: rng.gen_range(profile.wpm),
            error_rate: rng.gen_range(profile.error_rate),
        }
    }

    pub fn key_interval_millis(&self) -> f64 {
        1_000.0 / self.key_rate
    }

    /// Milliseconds per character at this AI's words-per-minute
    pub fn millis_per_char(&self) -> f64 {
        60_000.0 / self.typing_speed / 5.0
    }

    /// Race step: decide whether to press this tick and schedule the next try
    pub fn wants_key_press<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) -> bool {
        if now < self.next_action_time {
            return false;
        }
        let press = rng.gen_bool(RACE_PRESS_CHANCE);
        let wait = self.key_interval_millis() * (0.5 + rng.gen::<f64>());
        self.next_action_time = now + wait as u64;
        press
    }

    pub fn reset_for_battle<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        self.target_word = None;
        self.typing_progress = 0.0;
        self.last_step_time = now;
        self.next_action_time = now + rng.gen_range(0..BATTLE_START_JITTER_MILLIS);
    }

    pub fn reset_for_race<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        self.target_word = None;
        self.typing_progress = 0.0;
        self.next_action_time = now + rng.gen_range(0..FIRST_ACTION_JITTER_MILLIS);
    }

    /// Pick a target among the active words, preferring this difficulty's lengths
    pub fn choose_word<R: Rng + ?Sized>(
        &self,
        me: PlayerId,
        words: &BTreeMap<u64, WordData>,
        rng: &mut R,
    ) -> Option<TargetWord> {
        // Typing a word aimed at yourself only burns it
        let open: Vec<&WordData> = words
            .values()
            .filter(|w| w.target_player != Some(me))
            .collect();
        let preferred: Vec<&WordData> = open
            .iter()
            .copied()
            .filter(|w| self.difficulty.prefers(w.length))
            .collect();
        let pool = if preferred.is_empty() { open } else { preferred };
        pool.choose(rng).map(|w| TargetWord {
            id: w.id,
            text: w.text.clone(),
            length: w.length,
        })
    }

    /// Battle step. Returns the finished word when the AI lands one.
    pub fn step_typing<R: Rng + ?Sized>(
        &mut self,
        now: u64,
        me: PlayerId,
        words: &BTreeMap<u64, WordData>,
        rng: &mut R,
    ) -> Option<TargetWord> {
        if now < self.next_action_time {
            return None;
        }

        if let Some(target) = &self.target_word {
            if !words.contains_key(&target.id) {
                self.target_word = None;
                self.typing_progress = 0.0;
            }
        }

        let target_length = match &self.target_word {
            Some(target) => target.length,
            None => {
                let target = self.choose_word(me, words, rng)?;
                let length = target.length;
                self.target_word = Some(target);
                self.typing_progress = 0.0;
                self.last_step_time = now;
                length
            }
        };

        let per_char = self.millis_per_char();
        let elapsed = now.saturating_sub(self.last_step_time) as f64;
        self.typing_progress = (self.typing_progress + elapsed / per_char).min(target_length as f64);
        self.last_step_time = now;

        if self.typing_progress < target_length as f64 {
            self.next_action_time = now + per_char as u64;
            return None;
        }

        self.typing_progress = 0.0;
        if rng.gen_bool(self.error_rate) {
            self.next_action_time = now + rng.gen_range(ERROR_PAUSE_MILLIS);
            self.last_step_time = self.next_action_time;
            return None;
        }

        self.next_action_time = now + rng.gen_range(SUCCESS_PAUSE_MILLIS);
        self.last_step_time = self.next_action_time;
        self.target_word.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::words::WordPosition;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn word(id: u64, text: &str) -> WordData {
        WordData {
            id,
            text: text.to_string(),
            length: text.len(),
            damage: 5,
            target_player: None,
            created_at: 0,
            position: WordPosition { x: 50.0, y: 50.0 },
        }
    }

    fn words(list: &[(u64, &str)]) -> BTreeMap<u64, WordData> {
        list.iter().map(|(id, text)| (*id, word(*id, text))).collect()
    }

    #[test]
    fn test_rates_follow_difficulty() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..50 {
            let easy = AiState::new(Difficulty::Easy, 0, &mut rng);
            assert!((2.0..4.0).contains(&easy.key_rate));
            assert!((25.0..40.0).contains(&easy.typing_speed));
            assert!((0.15..0.25).contains(&easy.error_rate));

            let hard = AiState::new(Difficulty::Hard, 0, &mut rng);
            assert!((6.0..10.0).contains(&hard.key_rate));
            assert!((60.0..90.0).contains(&hard.typing_speed));
            assert!((0.02..0.07).contains(&hard.error_rate));
            assert!(hard.next_action_time < FIRST_ACTION_JITTER_MILLIS);
        }
    }

    #[test]
    fn test_word_preference_with_fallback() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let me = Uuid::new_v4();
        let active = words(&[(1, "fire"), (2, "warrior"), (3, "champion")]);

        let easy = AiState::new(Difficulty::Easy, 0, &mut rng);
        for _ in 0..20 {
            assert_eq!(easy.choose_word(me, &active, &mut rng).map(|t| t.id), Some(1));
        }

        let hard = AiState::new(Difficulty::Hard, 0, &mut rng);
        let only_short = words(&[(4, "bolt")]);
        assert_eq!(hard.choose_word(me, &only_short, &mut rng).map(|t| t.id), Some(4));
        assert!(hard.choose_word(me, &BTreeMap::new(), &mut rng).is_none());
    }

    #[test]
    fn test_waits_for_next_action_time() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let me = Uuid::new_v4();
        let mut ai = AiState::new(Difficulty::Medium, 0, &mut rng);
        ai.next_action_time = 5_000;
        let active = words(&[(1, "fire")]);
        assert!(ai.step_typing(4_999, me, &active, &mut rng).is_none());
        assert!(ai.target_word.is_none());
        assert!(!ai.wants_key_press(4_999, &mut rng));
    }

    #[test]
    fn test_types_word_to_completion() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let me = Uuid::new_v4();
        let mut ai = AiState::new(Difficulty::Hard, 0, &mut rng);
        ai.error_rate = 0.0;
        ai.next_action_time = 0;
        let active = words(&[(1, "fire")]);

        assert!(ai.step_typing(0, me, &active, &mut rng).is_none());
        assert_eq!(ai.target_word.as_ref().map(|t| t.id), Some(1));

        // Four characters at any hard speed fit in one battle tick
        let landed = ai.step_typing(1_000, me, &active, &mut rng);
        assert_eq!(landed.map(|t| t.text), Some("fire".to_string()));
        assert!(ai.target_word.is_none());
        assert!(ai.next_action_time >= 1_200 && ai.next_action_time < 2_000);
    }

    #[test]
    fn test_fumble_restarts_word() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let me = Uuid::new_v4();
        let mut ai = AiState::new(Difficulty::Easy, 0, &mut rng);
        ai.error_rate = 1.0;
        ai.next_action_time = 0;
        let active = words(&[(1, "fire")]);

        ai.step_typing(0, me, &active, &mut rng);
        assert!(ai.step_typing(5_000, me, &active, &mut rng).is_none());
        assert_eq!(ai.typing_progress, 0.0);
        assert!(ai.target_word.is_some());
        assert!(ai.next_action_time >= 5_500 && ai.next_action_time < 6_500);
    }

    #[test]
    fn test_drops_stale_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let me = Uuid::new_v4();
        let mut ai = AiState::new(Difficulty::Medium, 0, &mut rng);
        ai.next_action_time = 0;
        ai.step_typing(0, me, &words(&[(1, "fire")]), &mut rng);
        assert_eq!(ai.target_word.as_ref().map(|t| t.id), Some(1));

        let next = ai.next_action_time;
        ai.step_typing(next, me, &words(&[(2, "storm")]), &mut rng);
        assert_eq!(ai.target_word.as_ref().map(|t| t.id), Some(2));
        assert_eq!(ai.typing_progress, 0.0);
    }

    #[test]
    fn test_skips_words_aimed_at_itself() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let me = Uuid::new_v4();
        let ai = AiState::new(Difficulty::Easy, 0, &mut rng);

        let mut active = words(&[(1, "fire"), (2, "warrior")]);
        if let Some(w) = active.get_mut(&1) {
            w.target_player = Some(me);
        }
        // The preferred short word is ours, so fall back to the other one
        for _ in 0..20 {
            assert_eq!(ai.choose_word(me, &active, &mut rng).map(|t| t.id), Some(2));
        }

        active.remove(&2);
        assert!(ai.choose_word(me, &active, &mut rng).is_none());
    }
}
