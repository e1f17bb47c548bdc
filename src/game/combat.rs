//! Combat system - word damage and attack results

use serde::Serialize;

use super::player::PlayerId;

/// Damage dealt by a completed word of the given length
pub fn word_damage(length: usize) -> u32 {
    match length {
        4 => 5,
        5 => 7,
        6 => 9,
        7 => 15,
        8 => 20,
        _ => 5,
    }
}

/// Apply damage to health, returns (new_health, is_dead)
pub fn apply_damage(current_health: u32, damage: u32) -> (u32, bool) {
    let new_health = current_health.saturating_sub(damage);
    (new_health, new_health == 0)
}

/// Broadcast to the room when a completed word lands on its target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackResult {
    pub attacker: PlayerId,
    pub target: PlayerId,
    pub damage: u32,
    pub word: String,
    pub word_length: usize,
    pub target_health: u32,
}

/// A target knocked out by an attack
#[derive(Debug, Clone, PartialEq)]
pub struct Elimination {
    pub player_id: PlayerId,
    pub player_name: String,
    pub eliminated_by: String,
}

/// Everything a successful word completion produced
#[derive(Debug, Clone, PartialEq)]
pub struct WordCompletion {
    pub attack: AttackResult,
    pub elimination: Option<Elimination>,
}
