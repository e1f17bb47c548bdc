//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{PlayerId, RoomError};
use crate::lobby::{JoinedRoom, LobbyService};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Messages queued for one socket before the writer applies backpressure
const OUTBOUND_BUFFER: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_BUFFER);
    let writer_handle = tokio::spawn(write_loop(player_id, ws_sink, outbound_rx));

    let mut session = Session::new(player_id, outbound_tx);
    session
        .reply(ServerMsg::Welcome {
            player_id,
            server_time: unix_millis(),
        })
        .await;

    run_session(&state.lobby, &mut session, ws_stream).await;

    // Cleanup on disconnect
    session.detach();
    state.lobby.disconnect(player_id);
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> lobby service
async fn run_session(
    lobby: &LobbyService,
    session: &mut Session,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
) {
    let player_id = session.player_id;
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => dispatch(lobby, session, client_msg).await,
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Route one client command to the lobby service
async fn dispatch(lobby: &LobbyService, session: &mut Session, msg: ClientMsg) {
    let player_id = session.player_id;
    match msg {
        ClientMsg::CreateRoom {
            room_name,
            player_name,
            max_players,
            game_mode,
        } => {
            let result = lobby.create_room(player_id, &room_name, &player_name, max_players, game_mode);
            session.enter(lobby, result).await;
        }
        ClientMsg::JoinRoom {
            room_code,
            player_name,
        } => {
            let result = lobby.join_room(player_id, &room_code, &player_name);
            session.enter(lobby, result).await;
        }
        ClientMsg::QuickPlay {
            player_name,
            game_mode,
        } => {
            let result = lobby.quick_play(player_id, &player_name, game_mode);
            session.enter(lobby, result).await;
        }
        ClientMsg::StartGame => lobby.start_game(player_id),
        ClientMsg::AddAi { difficulty } => {
            let result = lobby.add_ai(player_id, difficulty);
            session.respond(result).await;
        }
        ClientMsg::RemoveAi => {
            let result = lobby.remove_ai(player_id);
            session.respond(result).await;
        }
        ClientMsg::ChatMessage { text } => lobby.chat(player_id, text),
        ClientMsg::KeyPress => {
            if let Some(update) = lobby.key_press(player_id) {
                session.reply(update).await;
            }
        }
        ClientMsg::CompleteWord {
            typed_word,
            time_taken,
        } => lobby.complete_word(player_id, &typed_word, time_taken),
        ClientMsg::LeaveRoom => {
            session.detach();
            if let Some(reply) = lobby.leave_room(player_id) {
                session.reply(reply).await;
            }
        }
        ClientMsg::HostRestartGame => lobby.host_restart(player_id),
        ClientMsg::HostEndGame => lobby.host_end(player_id),
    }
}

/// Per-connection state: the outbound queue and the current room feed
struct Session {
    player_id: PlayerId,
    outbound: mpsc::Sender<ServerMsg>,
    forwarder: Option<JoinHandle<()>>,
}

impl Session {
    fn new(player_id: PlayerId, outbound: mpsc::Sender<ServerMsg>) -> Self {
        Self {
            player_id,
            outbound,
            forwarder: None,
        }
    }

    /// Send to this connection only
    async fn reply(&self, msg: ServerMsg) {
        if self.outbound.send(msg).await.is_err() {
            debug!(player_id = %self.player_id, "Outbound channel closed");
        }
    }

    async fn respond(&self, result: Result<Option<ServerMsg>, RoomError>) {
        match result {
            Ok(Some(msg)) => self.reply(msg).await,
            Ok(None) => {}
            Err(e) => self.reply(ServerMsg::error(e.to_string())).await,
        }
    }

    /// Switch the room feed after a create / join / quick play
    async fn enter(&mut self, lobby: &LobbyService, result: Result<JoinedRoom, RoomError>) {
        match result {
            Ok(joined) => {
                self.detach();
                self.reply(joined.ack).await;
                self.attach(joined.room_code, joined.events);
            }
            Err(e) => {
                debug!(player_id = %self.player_id, error = %e, "Room entry failed");
                // A failed move may already have taken the player out of their old room
                if !lobby.is_in_room(self.player_id) {
                    self.detach();
                }
                self.reply(ServerMsg::error(e.to_string())).await;
            }
        }
    }

    /// Forward room broadcasts into this connection's outbound queue
    fn attach(&mut self, room_code: String, mut events: broadcast::Receiver<ServerMsg>) {
        let outbound = self.outbound.clone();
        let player_id = self.player_id;
        self.forwarder = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(msg) => {
                        if outbound.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            player_id = %player_id,
                            room_code = %room_code,
                            lagged_count = n,
                            "Client lagged, skipping {} room events", n
                        );
                        // Continue - don't disconnect for lag
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(player_id = %player_id, room_code = %room_code, "Room channel closed");
                        break;
                    }
                }
            }
        }));
    }

    fn detach(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}

/// Writer task: outbound queue -> WebSocket
async fn write_loop(
    player_id: PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
