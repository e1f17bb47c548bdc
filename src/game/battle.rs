//! Battle loop and countdown timer

use std::time::Duration;

use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::util::time::{battle_tick, unix_millis, BATTLE_TIMER_MILLIS};
use crate::ws::protocol::ServerMsg;

use super::player::PlayerId;
use super::registry::SharedRoom;
use super::room::Room;
use super::{session, snapshot};

/// Outcome of resolving one typed word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// No attack landed
    Missed,
    Attacked,
    /// The attack finished the battle
    BattleEnded,
}

/// Word spawning, AI typing, expiry and snapshots; first tick is immediate
pub async fn run(shared: SharedRoom, epoch: u64) {
    let mut ticker = interval(battle_tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut room = shared.lock();
        if !room.is_running_epoch(epoch) {
            debug!(room_code = %room.code, epoch, "Battle loop stopping");
            break;
        }
        if !tick(&mut room, &shared, unix_millis()) {
            break;
        }
    }
}

/// Counts the battle clock down once per second
pub async fn run_timer(shared: SharedRoom, epoch: u64) {
    let period = Duration::from_millis(BATTLE_TIMER_MILLIS);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut room = shared.lock();
        if !room.is_running_epoch(epoch) {
            debug!(room_code = %room.code, epoch, "Battle timer stopping");
            break;
        }
        let Some(seconds_remaining) = room.tick_battle_timer() else {
            break;
        };
        room.broadcast(ServerMsg::BattleTimer { seconds_remaining });

        if room.check_battle_end() {
            session::end_game(&mut room, &shared);
            break;
        }
    }
}

/// One battle step. Returns false once the battle has ended.
pub fn tick(room: &mut Room, shared: &SharedRoom, now: u64) -> bool {
    if room.should_spawn_word() {
        if let Some(word) = room.generate_word(now) {
            room.broadcast(ServerMsg::NewWord(word));
        }
    }

    for index in 0..room.players.len() {
        let Some((player_id, text)) = room.drive_battle_ai(index, now) else {
            continue;
        };
        if resolve_completion(room, shared, player_id, &text, now) == Completion::BattleEnded {
            return false;
        }
    }

    for word_id in room.expire_words(now) {
        room.broadcast(ServerMsg::WordExpired { word_id });
    }

    room.broadcast(ServerMsg::BattleStateUpdate(snapshot::battle_snapshot(room)));
    true
}

/// Apply a typed word for a human or an AI and announce the outcome
pub fn resolve_completion(
    room: &mut Room,
    shared: &SharedRoom,
    player_id: PlayerId,
    typed: &str,
    now: u64,
) -> Completion {
    let Some(result) = room.process_word_completion(player_id, typed, now) else {
        return Completion::Missed;
    };

    if let Some(elimination) = result.elimination {
        debug!(
            room_code = %room.code,
            player_id = %elimination.player_id,
            "Player eliminated"
        );
        room.broadcast(ServerMsg::PlayerEliminated {
            player_id: elimination.player_id,
            player_name: elimination.player_name,
            eliminated_by: elimination.eliminated_by,
        });
    }
    room.broadcast(ServerMsg::BattleAction(result.attack));

    if room.check_battle_end() {
        session::end_game(room, shared);
        return Completion::BattleEnded;
    }
    Completion::Attacked
}
