//! Random room codes, display names and icons

use rand::seq::SliceRandom;
use rand::Rng;

/// Room codes are drawn from upper-case letters and digits
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const ROOM_CODE_LEN: usize = 6;

/// Longest display name kept after trimming
pub const MAX_NAME_LEN: usize = 20;

const PLAYER_ICONS: &[&str] = &[
    "🚂", "🚃", "🚄", "🚅", "🚆", "🚇", "🚈", "🚉", "🚊", "🚋", "🚌", "🚍", "🚎", "🚐", "🚑",
];

const AI_NAMES: &[&str] = &[
    "RoboRacer",
    "CyberSpeedster",
    "TurboBot",
    "SpeedDemon",
    "RaceAI",
    "VelocityBot",
    "ThunderBot",
    "BlitzBot",
];

/// Generate a candidate room code (uniqueness is checked by the registry)
pub fn room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalize a user-typed room code
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn random_icon<R: Rng + ?Sized>(rng: &mut R) -> String {
    PLAYER_ICONS.choose(rng).copied().unwrap_or("🚂").to_string()
}

/// Robot name with a numeric suffix, e.g. `TurboBot42`
pub fn ai_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let base = AI_NAMES.choose(rng).copied().unwrap_or("RaceAI");
    format!("{}{}", base, rng.gen_range(0..100))
}

/// Trim and cap a requested name, falling back to a guest name
pub fn display_name<R: Rng + ?Sized>(requested: &str, rng: &mut R) -> String {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return format!("Guest{}", rng.gen_range(1000..10000));
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}
