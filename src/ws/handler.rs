//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::character::CharacterId;
use crate::game::{PlayerInput, SessionCommand, SessionHandle};
use crate::http::middleware::verify_jwt;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            let character_id = CharacterId(claims.sub);
            info!(character_id = %character_id, "WebSocket upgrade for authenticated player");
            ws.on_upgrade(move |socket| handle_socket(socket, character_id, state.session))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, character_id: CharacterId, session: SessionHandle) {
    info!(character_id = %character_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before the welcome so nothing between welcome and join is lost
    let snapshot_rx = session.snapshot_tx.subscribe();

    let welcome = ServerMsg::Welcome {
        character_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(character_id = %character_id, error = %e, "Failed to send welcome");
        return;
    }

    run_connection(character_id, ws_sink, ws_stream, &session, snapshot_rx).await;

    // The session removes the character on leave; a second leave is a no-op
    let _ = session
        .send(SessionCommand::Client(PlayerInput {
            user_id: character_id,
            msg: ClientMsg::LeaveSession,
        }))
        .await;

    info!(character_id = %character_id, "WebSocket connection closed");
}

/// Pump the socket until either side goes away
async fn run_connection(
    character_id: CharacterId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    session: &SessionHandle,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Spawn writer task: session broadcast -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match snapshot_rx.recv().await {
                Ok(msg) => {
                    if !is_for(&msg, character_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(character_id = %character_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        character_id = %character_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(character_id = %character_id, "Session channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> session task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(character_id = %character_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        let input = PlayerInput {
                            user_id: character_id,
                            msg,
                        };

                        if session.send(SessionCommand::Client(input)).await.is_err() {
                            debug!(character_id = %character_id, "Session channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(character_id = %character_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(character_id = %character_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(character_id = %character_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(character_id = %character_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Owner-targeted messages only reach their owner; everything else is broadcast
fn is_for(msg: &ServerMsg, character_id: CharacterId) -> bool {
    match msg {
        ServerMsg::Welcome { character_id: target, .. }
        | ServerMsg::SessionJoined { character_id: target, .. }
        | ServerMsg::GameOver { character_id: target, .. }
        | ServerMsg::Error { character_id: target, .. }
        | ServerMsg::Pong { character_id: target, .. } => *target == character_id,
        _ => true,
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
