//! WebSocket handler: bidirectional frame relay.
//!
//! DESIGN
//! ======
//! The credential is checked before the upgrade; a rejected client gets a
//! plain 401 and never reaches room logic. Once upgraded, the connection
//! enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by event name
//! - Frames queued by room peers → forward to client
//!
//! Dispatch goes through an explicit table (`Inbound`) and a per-connection
//! context (`Connection`) passed by reference, so every handler sees exactly
//! who is asking and which room they are in. Handlers return the frames meant
//! for the sender only; room fan-out happens inside `services::room` under
//! the room lock.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `connected` with the connection id
//! 2. `join-room` → `room-state` reply, presence broadcast
//! 3. Room events → dispatch → replies / errors
//! 4. Close or error → same cleanup as `leave-room`
//! 5. Server shutdown → close frame to the client, then the same cleanup

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Data, ERROR_EVENT, ErrorCode, FRAME_CODE, FRAME_MESSAGE, Frame, now_ms};
use crate::services::auth::{self, AuthError, Identity};
use crate::services::presence::Participant;
use crate::services::room::{self, RoomError};
use crate::services::signaling::SignalKind;
use crate::services::timer::{TimerCommand, TimerTick};
use crate::state::AppState;

// =============================================================================
// DISPATCH TABLE
// =============================================================================

/// Every event a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inbound {
    JoinRoom,
    LeaveRoom,
    SendMessage,
    Timer(TimerCommand),
    TimerTick,
    Signal(SignalKind),
}

impl Inbound {
    fn from_event(event: &str) -> Option<Self> {
        let inbound = match event {
            "join-room" => Self::JoinRoom,
            "leave-room" => Self::LeaveRoom,
            "send-message" => Self::SendMessage,
            "timer-start" => Self::Timer(TimerCommand::Start),
            "timer-pause" => Self::Timer(TimerCommand::Pause),
            "timer-reset" => Self::Timer(TimerCommand::Reset),
            "timer-switch-mode" => Self::Timer(TimerCommand::SwitchMode),
            "timer-tick" => Self::TimerTick,
            other => Self::Signal(SignalKind::from_event(other)?),
        };
        Some(inbound)
    }
}

/// Per-connection context.
struct Connection {
    connection_id: Uuid,
    identity: Identity,
    /// Room this connection has joined, if any.
    room_id: Option<String>,
    tx: mpsc::Sender<Frame>,
}

impl Connection {
    fn new(identity: Identity, tx: mpsc::Sender<Frame>) -> Self {
        Self { connection_id: Uuid::new_v4(), identity, room_id: None, tx }
    }

    fn joined_room(&self) -> Result<&str, RequestError> {
        self.room_id.as_deref().ok_or(RequestError::Room(RoomError::NotJoined))
    }
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("invalid frame: {0}")]
    BadRequest(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl ErrorCode for RequestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "E_BAD_REQUEST",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::Room(e) => e.error_code(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinPayload {
    room_id: Option<String>,
}

#[derive(Deserialize)]
struct MessagePayload {
    #[serde(alias = "message")]
    content: String,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.get("token").map(String::as_str).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(auth::bearer_token)
    });

    let identity = match token.map_or(Err(AuthError::Missing), |t| state.verifier.verify(t)) {
        Ok(identity) => identity,
        Err(e) => {
            info!(error = %e, "ws: credential rejected");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, identity))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, identity: Identity) {
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.ws_client_queue_capacity);
    let mut conn = Connection::new(identity, client_tx);
    let connection_id = conn.connection_id;

    let welcome = Frame::event("connected", Data::new())
        .with_data("connectionId", connection_id.to_string())
        .with_data("userId", conn.identity.user_id.clone())
        .with_data("displayName", conn.identity.display_name.clone());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%connection_id, user_id = %conn.identity.user_id, "ws: client connected");

    let mut shutdown = state.shutdown.subscribe();

    'conn: loop {
        if *shutdown.borrow_and_update() {
            let close = CloseFrame { code: close_code::AWAY, reason: "server shutting down".into() };
            let _ = socket.send(Message::Close(Some(close))).await;
            break;
        }

        tokio::select! {
            Ok(()) = shutdown.changed() => {}
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut conn, &text).await;
                        for frame in replies {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    disconnect(&state, &mut conn).await;
    info!(%connection_id, "ws: client disconnected");
}

/// Abrupt disconnect is handled exactly like `leave-room`.
async fn disconnect(state: &AppState, conn: &mut Connection) {
    if let Some(room_id) = conn.room_id.take() {
        room::leave_room(state, &room_id, conn.connection_id).await;
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, event = %frame.event, "ws: failed to encode frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Kept apart from the socket so tests can drive dispatch directly.
async fn process_inbound_text(state: &AppState, conn: &mut Connection, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(connection_id = %conn.connection_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::event(ERROR_EVENT, Data::new())
                .with_data(FRAME_CODE, "E_BAD_REQUEST")
                .with_data(FRAME_MESSAGE, format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Stamp the authenticated identity as `from`.
    req.from = Some(conn.identity.user_id.clone());
    debug!(connection_id = %conn.connection_id, id = %req.id, event = %req.event, "ws: recv frame");

    let result = match Inbound::from_event(&req.event) {
        Some(inbound) => dispatch(state, conn, inbound, &req).await,
        None => Err(RequestError::UnknownEvent(req.event.clone())),
    };

    match result {
        Ok(frames) => frames,
        Err(e) => {
            debug!(connection_id = %conn.connection_id, event = %req.event, code = e.error_code(), error = %e, "ws: request rejected");
            vec![req.error_from(&e)]
        }
    }
}

async fn dispatch(
    state: &AppState,
    conn: &mut Connection,
    inbound: Inbound,
    req: &Frame,
) -> Result<Vec<Frame>, RequestError> {
    match inbound {
        Inbound::JoinRoom => handle_join(state, conn, req).await,
        Inbound::LeaveRoom => {
            conn.joined_room()?;
            disconnect(state, conn).await;
            Ok(vec![])
        }
        Inbound::SendMessage => {
            let room_id = conn.joined_room()?;
            let payload: MessagePayload = decode(req)?;
            room::send_message(state, room_id, conn.connection_id, &payload.content).await?;
            Ok(vec![])
        }
        Inbound::Timer(command) => {
            let room_id = conn.joined_room()?;
            room::timer_command(state, room_id, conn.connection_id, command).await?;
            Ok(vec![])
        }
        Inbound::TimerTick => {
            let room_id = conn.joined_room()?;
            let tick: TimerTick = decode(req)?;
            room::timer_tick(state, room_id, conn.connection_id, tick).await?;
            Ok(vec![])
        }
        Inbound::Signal(kind) => {
            let room_id = conn.joined_room()?;
            room::relay_signal(state, room_id, conn.connection_id, kind, &req.data).await?;
            Ok(vec![])
        }
    }
}

/// Join (or switch to) a room. The previous room is left only once the new
/// join succeeded.
async fn handle_join(state: &AppState, conn: &mut Connection, req: &Frame) -> Result<Vec<Frame>, RequestError> {
    let payload: JoinPayload = decode(req)?;
    let Some(room_id) = payload
        .room_id
        .or_else(|| req.room_id.clone())
        .filter(|id| !id.trim().is_empty())
    else {
        return Err(RequestError::BadRequest("roomId required".into()));
    };

    let participant = Participant {
        connection_id: conn.connection_id,
        user_id: conn.identity.user_id.clone(),
        display_name: conn.identity.display_name.clone(),
        joined_at: now_ms(),
    };
    let snapshot = room::join_room(state, &room_id, participant, conn.tx.clone()).await?;

    if let Some(previous) = conn.room_id.replace(room_id.clone()) {
        if previous != room_id {
            room::leave_room(state, &previous, conn.connection_id).await;
        }
    }

    let mut reply = req.reply("room-state", snapshot.into_data());
    reply.room_id = Some(room_id);
    Ok(vec![reply])
}

fn decode<T: serde::de::DeserializeOwned>(req: &Frame) -> Result<T, RequestError> {
    req.payload().map_err(|e| RequestError::BadRequest(e.to_string()))
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
