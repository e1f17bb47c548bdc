//! Battle words: fixed word lists and time-progressive length selection

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use super::player::PlayerId;

/// Length of one battle in seconds
pub const BATTLE_DURATION_SECS: u32 = 180;
const BATTLE_DURATION_MILLIS: u64 = BATTLE_DURATION_SECS as u64 * 1_000;

/// Words disappear this long after spawning
pub const WORD_LIFETIME_MILLIS: u64 = 10_000;

/// Spawning stops while this many words are on screen
pub const MAX_ACTIVE_WORDS: usize = 3;

/// Chance per battle tick that a new word spawns
pub const WORD_SPAWN_CHANCE: f64 = 0.3;

/// Long-word chance at the start and end of a battle
const LONG_WORD_CHANCE_START: f64 = 0.3;
const LONG_WORD_CHANCE_END: f64 = 0.7;

const WORDS_4: &[&str] = &[
    "fire", "wave", "hunt", "bite", "claw", "rage", "fury", "slam", "bash", "kick", "fist",
    "bolt", "boom", "rush", "dash", "jolt",
];
const WORDS_5: &[&str] = &[
    "shark", "storm", "blade", "crush", "blast", "force", "power", "flame", "spike", "sword",
    "lance", "fight", "punch", "smash", "chaos", "blitz",
];
const WORDS_6: &[&str] = &[
    "battle", "combat", "attack", "strike", "damage", "weapon", "typing", "hammer", "rocket",
    "cannon", "charge", "slayer", "hunter", "wizard", "dragon", "falcon",
];
const WORDS_7: &[&str] = &[
    "warrior", "machine", "crusher", "tornado", "thunder", "cyclone", "rampage", "prowler",
    "phantom", "stealth", "inferno", "tempest", "blaster", "assault", "warlord", "avenger",
];
const WORDS_8: &[&str] = &[
    "champion", "defender", "predator", "colossus", "overlord", "superior", "enforcer",
    "guardian", "behemoth", "assassin", "marauder", "vanguard", "conquest", "sentinel",
    "hellfire", "skirmish",
];

/// Word list for a length; unknown lengths use the shortest list
pub fn words_of_length(length: usize) -> &'static [&'static str] {
    match length {
        5 => WORDS_5,
        6 => WORDS_6,
        7 => WORDS_7,
        8 => WORDS_8,
        _ => WORDS_4,
    }
}

/// Display coordinates in percent of the arena
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WordPosition {
    pub x: f64,
    pub y: f64,
}

impl WordPosition {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            x: rng.gen_range(10.0..90.0),
            y: rng.gen_range(20.0..80.0),
        }
    }
}

/// A word on screen waiting to be typed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordData {
    pub id: u64,
    pub text: String,
    pub length: usize,
    pub damage: u32,
    pub target_player: Option<PlayerId>,
    pub created_at: u64,
    pub position: WordPosition,
}

impl WordData {
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > WORD_LIFETIME_MILLIS
    }

    /// Case-insensitive exact match against typed input
    pub fn matches(&self, typed: &str) -> bool {
        self.text.to_lowercase() == typed.to_lowercase()
    }
}

/// Pick a word length for the current point in the battle.
///
/// The chance of a long (7 or 8 letter) word grows linearly from 30% to 70%
/// over the battle; otherwise 4, 5 and 6 are equally likely.
pub fn select_word_length<R: Rng + ?Sized>(elapsed_millis: u64, rng: &mut R) -> usize {
    let progress = (elapsed_millis as f64 / BATTLE_DURATION_MILLIS as f64).min(1.0);
    let long_chance =
        LONG_WORD_CHANCE_START + progress * (LONG_WORD_CHANCE_END - LONG_WORD_CHANCE_START);

    if rng.gen_bool(long_chance) {
        if rng.gen_bool(0.5) {
            7
        } else {
            8
        }
    } else {
        [4, 5, 6][rng.gen_range(0..3)]
    }
}

pub fn pick_word<R: Rng + ?Sized>(length: usize, rng: &mut R) -> &'static str {
    words_of_length(length).choose(rng).copied().unwrap_or("fire")
}
