//! Snapshot building: room state to wire messages

use crate::ws::protocol::{
    BattleSnapshot, BattleWinner, FighterSnapshot, LobbyPlayer, LobbySnapshot, RaceSnapshot,
    RaceWinner, RacerSnapshot, RoomAck, ServerMsg, WinnerRef,
};

use super::player::{InputSource, Player, PlayerId};
use super::room::{GameMode, Room};

pub fn lobby_player(room: &Room, player: &Player) -> LobbyPlayer {
    let difficulty = match &player.input {
        InputSource::Ai(ai) => Some(ai.difficulty),
        InputSource::Human => None,
    };
    LobbyPlayer {
        id: player.id,
        name: player.name.clone(),
        icon: player.icon.clone(),
        is_owner: room.is_owner(player.id),
        is_ai: player.is_ai(),
        difficulty,
    }
}

pub fn lobby_update(room: &Room) -> ServerMsg {
    ServerMsg::LobbyUpdate(LobbySnapshot {
        room_code: room.code.clone(),
        room_name: room.name.clone(),
        max_players: room.max_players,
        player_count: room.players.len(),
        players: room.players.iter().map(|p| lobby_player(room, p)).collect(),
        chat_messages: room.chat_messages.iter().cloned().collect(),
        can_start_game: room.can_start_game(),
        owner_id: room.owner_id,
        game_mode: room.game_mode(),
    })
}

/// Acknowledgement for a player who just created or joined `room`
pub fn room_ack(room: &Room, player_id: PlayerId) -> RoomAck {
    RoomAck {
        room_code: room.code.clone(),
        room_name: room.name.clone(),
        max_players: room.max_players,
        player_id,
        is_owner: room.is_owner(player_id),
        game_mode: room.game_mode(),
    }
}

fn winner_ref(room: &Room) -> Option<WinnerRef> {
    let winner = room.player(room.winner?)?;
    Some(WinnerRef {
        id: winner.id,
        name: winner.name.clone(),
    })
}

pub fn race_snapshot(room: &Room) -> RaceSnapshot {
    let players: Vec<RacerSnapshot> = room
        .players
        .iter()
        .map(|p| RacerSnapshot {
            id: p.id,
            name: p.name.clone(),
            position: p.position,
            speed: p.speed,
            key_count: p.key_count,
            icon: p.icon.clone(),
            is_winner: p.is_winner,
            sabotage_level: p.sabotage_level,
            slowdown_effect: p.slowdown_effect,
        })
        .collect();

    // Stable sort keeps join order among equal positions
    let mut leaderboard = players.clone();
    leaderboard.sort_by(|a, b| b.position.total_cmp(&a.position));

    RaceSnapshot {
        tick: room.race_tick(),
        players,
        leaderboard,
        player_count: room.players.len(),
        max_players: room.max_players,
        game_active: room.game_active,
        room_name: room.name.clone(),
        winner: winner_ref(room),
    }
}

pub fn battle_snapshot(room: &Room) -> BattleSnapshot {
    let players = room
        .players
        .iter()
        .map(|p| FighterSnapshot {
            id: p.id,
            name: p.name.clone(),
            health: p.health,
            max_health: p.max_health,
            hits: p.hits,
            words_typed: p.words_typed,
            wpm: p.wpm,
            accuracy: p.accuracy,
            icon: p.icon.clone(),
            is_winner: p.is_winner,
        })
        .collect();

    let (words, battle_timer) = match room.battle() {
        Some(battle) => (
            battle.current_words.values().cloned().collect(),
            battle.battle_timer,
        ),
        None => (Vec::new(), 0),
    };

    BattleSnapshot {
        players,
        words,
        player_count: room.players.len(),
        max_players: room.max_players,
        game_active: room.game_active,
        room_name: room.name.clone(),
        battle_timer,
        winner: winner_ref(room),
    }
}

/// Tick snapshot for whichever mode the room plays
pub fn state_update(room: &Room) -> ServerMsg {
    match room.game_mode() {
        GameMode::Race => ServerMsg::GameStateUpdate(race_snapshot(room)),
        GameMode::Battle => ServerMsg::BattleStateUpdate(battle_snapshot(room)),
    }
}

pub fn race_winner(room: &Room) -> Option<RaceWinner> {
    let winner = room.player(room.winner?)?;
    Some(RaceWinner {
        id: winner.id,
        name: winner.name.clone(),
        key_count: winner.key_count,
    })
}

pub fn battle_winner(room: &Room) -> Option<BattleWinner> {
    let winner = room.player(room.winner?)?;
    Some(BattleWinner {
        id: winner.id,
        name: winner.name.clone(),
        hits: winner.hits,
        words_typed: winner.words_typed,
        wpm: winner.wpm,
        accuracy: winner.accuracy,
    })
}

/// Private feedback after a key press
pub fn speed_update(player: &Player, key_accepted: bool) -> ServerMsg {
    ServerMsg::SpeedUpdate {
        speed: player.speed,
        key_count: player.key_count,
        sabotage_level: player.sabotage_level,
        slowdown_effect: player.slowdown_effect,
        key_accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ai::Difficulty;
    use uuid::Uuid;

    fn human(name: &str) -> Player {
        Player::new(Uuid::new_v4(), name.to_string(), "🚂".to_string(), 0)
    }

    #[test]
    fn test_leaderboard_sorted_furthest_first() {
        let mut room = Room::new("SNAP01".into(), "Snap".into(), 4, GameMode::Race, human("A"), 0);
        room.add_player(human("B")).expect("space");
        room.add_player(human("C")).expect("space");
        room.players[0].position = 10.0;
        room.players[1].position = 80.0;
        room.players[2].position = 10.0;

        let snap = race_snapshot(&room);
        let order: Vec<&str> = snap.leaderboard.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        let roster: Vec<&str> = snap.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(roster, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_lobby_marks_owner_and_ai() {
        let mut room = Room::new("SNAP02".into(), "Snap".into(), 4, GameMode::Battle, human("A"), 0);
        let ai = room.add_ai_player(Difficulty::Easy, 0).expect("space");
        room.add_chat_message(room.owner_id, "hello".into(), 5);

        match lobby_update(&room) {
            ServerMsg::LobbyUpdate(lobby) => {
                assert_eq!(lobby.player_count, 2);
                assert!(lobby.can_start_game);
                assert_eq!(lobby.chat_messages.len(), 1);
                assert_eq!(lobby.game_mode, GameMode::Battle);
                assert!(lobby.players[0].is_owner);
                let ai_entry = lobby.players.iter().find(|p| p.id == ai).expect("listed");
                assert!(ai_entry.is_ai);
                assert_eq!(ai_entry.difficulty, Some(Difficulty::Easy));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_winner_stats() {
        let mut room = Room::new("SNAP03".into(), "Snap".into(), 4, GameMode::Battle, human("A"), 0);
        assert!(battle_winner(&room).is_none());
        room.winner = Some(room.owner_id);
        room.players[0].hits = 4;
        let winner = battle_winner(&room).expect("winner set");
        assert_eq!(winner.name, "A");
        assert_eq!(winner.hits, 4);

        // A winner who already left is reported as none
        room.winner = Some(Uuid::new_v4());
        assert!(race_winner(&room).is_none());
    }
}
