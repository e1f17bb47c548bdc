//! Game lifecycle: start, end, auto-restart and the owner's controls

use std::time::Duration;

use tracing::{debug, info};

use crate::util::time::unix_millis;
use crate::ws::protocol::ServerMsg;

use super::registry::SharedRoom;
use super::room::{GameMode, Room};
use super::{battle, race, snapshot};

/// Countdown before the next game when the owner has restart controls
pub const HOST_RESTART_DELAY: Duration = Duration::from_secs(10);
pub const SOLO_RACE_RESTART_DELAY: Duration = Duration::from_secs(5);
pub const SOLO_BATTLE_RESTART_DELAY: Duration = Duration::from_secs(10);

pub fn restart_delay(mode: GameMode, host_controls: bool) -> Duration {
    match (host_controls, mode) {
        (true, _) => HOST_RESTART_DELAY,
        (false, GameMode::Race) => SOLO_RACE_RESTART_DELAY,
        (false, GameMode::Battle) => SOLO_BATTLE_RESTART_DELAY,
    }
}

/// Reset the room and spawn its loops. Returns false if the room cannot start.
/// Caller holds the room lock.
pub fn start_game(room: &mut Room, shared: &SharedRoom, now: u64) -> bool {
    if room.closed || !room.can_start_game() {
        return false;
    }

    room.tasks.cancel_restart();
    room.game_active = true;
    room.game_epoch += 1;
    let epoch = room.game_epoch;

    match room.game_mode() {
        GameMode::Race => {
            room.reset_for_race(now);
            room.broadcast(ServerMsg::GameStarted);
            room.tasks.game_loop = Some(tokio::spawn(race::run(shared.clone(), epoch)));
        }
        GameMode::Battle => {
            room.reset_for_battle(now);
            room.broadcast(ServerMsg::BattleStarted);
            room.tasks.game_loop = Some(tokio::spawn(battle::run(shared.clone(), epoch)));
            room.tasks.battle_timer = Some(tokio::spawn(battle::run_timer(shared.clone(), epoch)));
        }
    }

    info!(
        room_code = %room.code,
        mode = ?room.game_mode(),
        epoch,
        players = room.players.len(),
        "Game started"
    );
    true
}

/// Stop the loops, announce the result and schedule the next game.
/// Caller holds the room lock.
pub fn end_game(room: &mut Room, shared: &SharedRoom) {
    if !room.game_active {
        return;
    }
    room.game_active = false;
    room.tasks.cancel_game();

    if let Some(winner_id) = room.winner {
        if let Some(winner) = room.player_mut(winner_id) {
            winner.is_winner = true;
        }
    }

    let host_controls = room.players.len() >= 2;
    let mode = room.game_mode();
    match mode {
        GameMode::Race => room.broadcast(ServerMsg::GameEnded {
            winner: snapshot::race_winner(room),
            host_controls,
        }),
        GameMode::Battle => room.broadcast(ServerMsg::BattleEnded {
            winner: snapshot::battle_winner(room),
            host_controls,
        }),
    }

    let delay = restart_delay(mode, host_controls);
    info!(
        room_code = %room.code,
        winner = ?room.winner,
        restart_in_secs = delay.as_secs(),
        "Game ended"
    );

    room.tasks.cancel_restart();
    room.tasks.restart = Some(tokio::spawn(auto_restart(shared.clone(), delay)));
}

async fn auto_restart(shared: SharedRoom, delay: Duration) {
    tokio::time::sleep(delay).await;

    let mut room = shared.lock();
    // This task is finishing; drop its own handle rather than abort it
    room.tasks.restart.take();
    if room.closed || room.players.is_empty() || room.game_active {
        debug!(room_code = %room.code, "Skipping auto-restart");
        return;
    }
    start_game(&mut room, &shared, unix_millis());
}

/// Owner restart: skip the countdown, replacing any game in progress
pub fn host_restart(room: &mut Room, shared: &SharedRoom, now: u64) -> bool {
    room.tasks.cancel_restart();
    stop_game(room);
    start_game(room, shared, now)
}

/// Owner end: cancel the countdown and send everyone back to the lobby
pub fn end_session(room: &mut Room) {
    room.tasks.cancel_restart();
    stop_game(room);
    room.broadcast(ServerMsg::GameSessionEnded);
    info!(room_code = %room.code, "Game session ended by host");
}

fn stop_game(room: &mut Room) {
    if room.game_active {
        room.game_active = false;
        room.tasks.cancel_game();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Player;
    use crate::game::room::RoomError;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_test::assert_ok;
    use uuid::Uuid;

    fn human(name: &str) -> Player {
        Player::new(Uuid::new_v4(), name.to_string(), "🚂".to_string(), 0)
    }

    fn shared_room(mode: GameMode) -> SharedRoom {
        let room = Room::new("SESS01".into(), "Lifecycle".into(), 4, mode, human("Ana"), 0).with_seed(7);
        Arc::new(Mutex::new(room))
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return out,
            }
        }
    }

    #[test]
    fn test_restart_delays() {
        assert_eq!(restart_delay(GameMode::Race, true), Duration::from_secs(10));
        assert_eq!(restart_delay(GameMode::Battle, true), Duration::from_secs(10));
        assert_eq!(restart_delay(GameMode::Race, false), Duration::from_secs(5));
        assert_eq!(restart_delay(GameMode::Battle, false), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_spawns_loops_once() {
        let shared = shared_room(GameMode::Battle);
        let mut rx = shared.lock().subscribe();
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, 0));
            assert!(room.game_active);
            assert!(room.tasks.game_loop.is_some());
            assert!(room.tasks.battle_timer.is_some());
            // Already running
            assert!(!start_game(&mut room, &shared, 0));
        }
        let msgs = drain(&mut rx);
        assert!(matches!(msgs.first(), Some(ServerMsg::BattleStarted)));
        shared.lock().tasks.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_solo_race_restarts_after_five_seconds() {
        let shared = shared_room(GameMode::Race);
        let mut rx = shared.lock().subscribe();
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, 0));
            room.winner = Some(room.owner_id);
            end_game(&mut room, &shared);
            assert!(!room.game_active);
            assert!(room.players[0].is_winner);
        }
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::GameEnded { winner: Some(_), host_controls: false }
        )));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(!shared.lock().game_active);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(shared.lock().game_active);
        assert!(drain(&mut rx).iter().any(|m| matches!(m, ServerMsg::GameStarted)));
        shared.lock().tasks.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_battle_without_winner_still_restarts() {
        let shared = shared_room(GameMode::Battle);
        assert_ok!(shared.lock().add_player(human("Bo")));
        let mut rx = shared.lock().subscribe();
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, 0));
            room.winner = None;
            end_game(&mut room, &shared);
        }
        assert!(drain(&mut rx).iter().any(|m| matches!(
            m,
            ServerMsg::BattleEnded { winner: None, host_controls: true }
        )));

        tokio::time::sleep(HOST_RESTART_DELAY + Duration::from_millis(100)).await;
        let room = shared.lock();
        assert!(room.game_active);
        assert_eq!(room.battle().map(|b| b.battle_timer), Some(crate::game::words::BATTLE_DURATION_SECS));
        drop(room);
        shared.lock().tasks.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_end_cancels_restart() {
        let shared = shared_room(GameMode::Race);
        assert_ok!(shared.lock().add_player(human("Bo")));
        let mut rx = shared.lock().subscribe();
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, 0));
            room.winner = Some(room.owner_id);
            end_game(&mut room, &shared);
            end_session(&mut room);
            assert!(room.tasks.restart.is_none());
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!shared.lock().game_active);
        assert!(drain(&mut rx).iter().any(|m| matches!(m, ServerMsg::GameSessionEnded)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_end_stops_running_game() {
        let shared = shared_room(GameMode::Battle);
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, 0));
            end_session(&mut room);
            assert!(!room.game_active);
            assert!(room.tasks.game_loop.is_none());
            assert!(room.tasks.battle_timer.is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_restart_is_immediate() {
        let shared = shared_room(GameMode::Race);
        assert_ok!(shared.lock().add_player(human("Bo")));
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, 0));
            room.winner = Some(room.owner_id);
            end_game(&mut room, &shared);
            assert!(host_restart(&mut room, &shared, 1_000));
            assert!(room.game_active);
            assert!(room.tasks.restart.is_none());
            assert_eq!(room.winner, None);
        }
        shared.lock().tasks.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_skipped_for_closed_room() {
        let shared = shared_room(GameMode::Race);
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, 0));
            room.winner = Some(room.owner_id);
            end_game(&mut room, &shared);
            // Pruned without going through cancel_all
            room.closed = true;
            assert_eq!(room.add_player(human("Late")), Err(RoomError::RoomNotFound));
        }
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!shared.lock().game_active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_host_restart_mid_battle_keeps_fresh_clock() {
        let shared = shared_room(GameMode::Battle);
        assert_ok!(shared.lock().add_player(human("Bo")));
        {
            let mut room = shared.lock();
            assert!(start_game(&mut room, &shared, unix_millis()));
        }

        tokio::time::sleep(Duration::from_millis(900)).await;
        {
            let mut room = shared.lock();
            // The first game's timer comes due while the lock is held
            std::thread::sleep(Duration::from_millis(300));
            assert!(host_restart(&mut room, &shared, unix_millis()));
            assert_eq!(room.game_epoch, 2);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        {
            let room = shared.lock();
            assert!(room.game_active);
            assert_eq!(
                room.battle().map(|b| b.battle_timer),
                Some(crate::game::words::BATTLE_DURATION_SECS)
            );
        }
        shared.lock().tasks.cancel_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_start_bumps_epoch() {
        let shared = shared_room(GameMode::Race);
        let mut room = shared.lock();
        assert_eq!(room.game_epoch, 0);
        assert!(start_game(&mut room, &shared, 0));
        assert_eq!(room.game_epoch, 1);
        assert!(host_restart(&mut room, &shared, 100));
        assert_eq!(room.game_epoch, 2);
        assert!(room.is_running_epoch(2));
        assert!(!room.is_running_epoch(1));
        room.tasks.cancel_all();
    }
}
