//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::ai::Difficulty;
use crate::game::combat::AttackResult;
use crate::game::player::PlayerId;
use crate::game::room::{ChatMessage, GameMode};
use crate::game::words::WordData;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Create a private room and become its owner
    CreateRoom {
        #[serde(default)]
        room_name: String,
        #[serde(default)]
        player_name: String,
        max_players: Option<u32>,
        #[serde(default)]
        game_mode: GameMode,
    },

    /// Join a room by its 6-character code
    JoinRoom {
        room_code: String,
        #[serde(default)]
        player_name: String,
    },

    /// Join any open room of the mode, or create one
    QuickPlay {
        #[serde(default)]
        player_name: String,
        #[serde(default)]
        game_mode: GameMode,
    },

    /// Owner only
    StartGame,

    /// Owner only
    #[serde(rename = "addAI")]
    AddAi {
        #[serde(default)]
        difficulty: Difficulty,
    },

    /// Owner only; removes the first AI in join order
    #[serde(rename = "removeAI")]
    RemoveAi,

    ChatMessage {
        text: String,
    },

    /// Race mode key press
    KeyPress,

    /// Battle mode word typed by the client
    CompleteWord {
        typed_word: String,
        /// Client-measured typing time, informational only
        #[serde(default)]
        time_taken: Option<u64>,
    },

    LeaveRoom,

    /// Owner only: skip the restart countdown
    HostRestartGame,

    /// Owner only: cancel the restart and return everyone to the lobby
    HostEndGame,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: PlayerId,
        server_time: u64,
    },

    RoomCreated(RoomAck),
    RoomJoined(RoomAck),

    /// Roster, chat and owner snapshot, sent on every lobby change
    LobbyUpdate(LobbySnapshot),

    GameStarted,
    BattleStarted,

    /// Race tick snapshot
    GameStateUpdate(RaceSnapshot),

    /// Battle tick snapshot
    BattleStateUpdate(BattleSnapshot),

    /// Feedback for the player who pressed a key
    SpeedUpdate {
        speed: f64,
        key_count: u32,
        sabotage_level: u32,
        slowdown_effect: u32,
        key_accepted: bool,
    },

    NewWord(WordData),

    WordExpired {
        word_id: u64,
    },

    BattleTimer {
        seconds_remaining: u32,
    },

    BattleAction(AttackResult),

    PlayerEliminated {
        player_id: PlayerId,
        player_name: String,
        eliminated_by: String,
    },

    GameEnded {
        winner: Option<RaceWinner>,
        /// Whether the owner gets restart / end controls
        host_controls: bool,
    },

    BattleEnded {
        winner: Option<BattleWinner>,
        host_controls: bool,
    },

    /// The owner ended the session; everyone goes back to the lobby
    GameSessionEnded,

    NewChatMessage(ChatMessage),

    AiAdded {
        ai_player: LobbyPlayer,
    },

    AiRemoved {
        player_id: PlayerId,
    },

    LeftRoom,

    Error {
        message: String,
    },
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Sent to a player entering a room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAck {
    pub room_code: String,
    pub room_name: String,
    pub max_players: usize,
    pub player_id: PlayerId,
    pub is_owner: bool,
    pub game_mode: GameMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub id: PlayerId,
    pub name: String,
    pub icon: String,
    pub is_owner: bool,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshot {
    pub room_code: String,
    pub room_name: String,
    pub max_players: usize,
    pub player_count: usize,
    pub players: Vec<LobbyPlayer>,
    pub chat_messages: Vec<ChatMessage>,
    pub can_start_game: bool,
    pub owner_id: PlayerId,
    pub game_mode: GameMode,
}

/// Winner reference inside tick snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinnerRef {
    pub id: PlayerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RacerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub position: f64,
    pub speed: f64,
    pub key_count: u32,
    pub icon: String,
    pub is_winner: bool,
    pub sabotage_level: u32,
    pub slowdown_effect: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSnapshot {
    pub tick: u64,
    pub players: Vec<RacerSnapshot>,
    /// Same entries as `players`, furthest first
    pub leaderboard: Vec<RacerSnapshot>,
    pub player_count: usize,
    pub max_players: usize,
    pub game_active: bool,
    pub room_name: String,
    pub winner: Option<WinnerRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FighterSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub health: u32,
    pub max_health: u32,
    pub hits: u32,
    pub words_typed: u32,
    pub wpm: u32,
    pub accuracy: u32,
    pub icon: String,
    pub is_winner: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSnapshot {
    pub players: Vec<FighterSnapshot>,
    pub words: Vec<WordData>,
    pub player_count: usize,
    pub max_players: usize,
    pub game_active: bool,
    pub room_name: String,
    pub battle_timer: u32,
    pub winner: Option<WinnerRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceWinner {
    pub id: PlayerId,
    pub name: String,
    pub key_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleWinner {
    pub id: PlayerId,
    pub name: String,
    pub hits: u32,
    pub words_typed: u32,
    pub wpm: u32,
    pub accuracy: u32,
}
