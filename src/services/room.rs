//! Room service: per-room sessions, join/leave, and the room-scoped actions.
//!
//! ARCHITECTURE
//! ============
//! `RoomRegistry` maps a room id to one `RoomSession` behind its own mutex.
//! The registry lock is taken only to look up, insert or remove a session;
//! everything that touches a room (presence, chat, timer, fan-out) happens
//! under that room's mutex, so unrelated rooms never contend.
//!
//! LIFECYCLE
//! =========
//! A session is hydrated from the room store on the first join and torn down
//! when its last participant leaves. Chat history and the live timer go with
//! it; the timer's durable mirror stays in the store and seeds the next
//! session.
//!
//! The leaver that empties a session marks it `closed` before removing it from
//! the registry, and removal only succeeds if the registry still holds that
//! same session. A join that locks a closed session drops it and retries, so
//! a join racing a teardown always lands in a live session.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::info;
use uuid::Uuid;

use crate::config::TimerDefaults;
use crate::frame::{Data, ErrorCode, Frame, data_of, now_ms};
use crate::services::chat::{ChatLog, ChatMessage};
use crate::services::persistence;
use crate::services::presence::{Participant, Presence};
use crate::services::signaling::{self, SignalError, SignalKind};
use crate::services::store::{RoomRecord, StoreError};
use crate::services::timer::{TickOutcome, TimerCommand, TimerState, TimerTick};
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("join a room first")]
    NotJoined,
    #[error("only the host can control the timer")]
    NotHost,
    #[error("room lookup failed: {0}")]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_ROOM_NOT_FOUND",
            Self::NotJoined => "E_NOT_JOINED",
            Self::NotHost => "E_NOT_HOST",
            Self::Storage(_) => "E_STORAGE",
            Self::Signal(e) => e.error_code(),
        }
    }
}

/// Live state of one room while anyone is in it.
pub struct RoomSession {
    pub room_id: String,
    pub name: String,
    pub host_user_id: String,
    pub presence: Presence,
    pub chat: ChatLog,
    pub timer: TimerState,
    /// Set once the last participant left; a closed session accepts nothing.
    closed: bool,
}

impl RoomSession {
    #[must_use]
    pub fn hydrate(record: &RoomRecord, defaults: TimerDefaults, max_message_chars: usize) -> Self {
        Self {
            room_id: record.room_id.clone(),
            name: record.name.clone(),
            host_user_id: record.host_user_id.clone(),
            presence: Presence::new(),
            chat: ChatLog::new(max_message_chars),
            timer: TimerState::hydrate(
                record.work_duration,
                record.break_duration,
                record.time_remaining,
                record.is_break,
                defaults,
            ),
            closed: false,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn is_host(&self, user_id: &str) -> bool {
        self.host_user_id == user_id
    }

    /// Participant for `connection_id`, or `NotJoined`.
    fn member(&self, connection_id: Uuid) -> Result<Participant, RoomError> {
        if self.closed {
            return Err(RoomError::NotJoined);
        }
        self.presence.get(connection_id).cloned().ok_or(RoomError::NotJoined)
    }

    fn frame(&self, event: &str, data: Data) -> Frame {
        Frame::event(event, data).with_room_id(self.room_id.clone())
    }
}

/// Everything a client needs right after joining.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub name: String,
    pub host_user_id: String,
    pub connection_id: Uuid,
    pub timer: TimerState,
    pub messages: Vec<ChatMessage>,
    pub participants: Vec<Participant>,
}

impl RoomSnapshot {
    /// Flatten into a frame payload.
    #[must_use]
    pub fn into_data(self) -> Data {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => Data::new(),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

pub type SharedSession = Arc<Mutex<RoomSession>>;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, SharedSession>>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, room_id: &str) -> Option<SharedSession> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Existing session for `room_id`, or a new one from `make`. The flag is
    /// `true` when the session was created by this call.
    pub async fn get_or_insert_with(
        &self,
        room_id: &str,
        make: impl FnOnce() -> RoomSession,
    ) -> (SharedSession, bool) {
        let existing = self.rooms.read().await.get(room_id).cloned();
        if let Some(session) = existing {
            return (session, false);
        }

        let mut rooms = self.rooms.write().await;
        if let Some(session) = rooms.get(room_id) {
            return (Arc::clone(session), false);
        }
        let session = Arc::new(Mutex::new(make()));
        rooms.insert(room_id.to_owned(), Arc::clone(&session));
        (session, true)
    }

    /// Remove `room_id` only if it still maps to `session`.
    pub async fn remove_if_same(&self, room_id: &str, session: &SharedSession) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get(room_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                rooms.remove(room_id);
                true
            }
            _ => false,
        }
    }

    /// Number of rooms with a live session.
    pub async fn live_rooms(&self) -> usize {
        self.rooms.read().await.len()
    }

    #[cfg(test)]
    pub async fn contains(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Add a connection to a room, hydrating the session if needed.
///
/// # Errors
///
/// `NotFound` if the store has no such room, `Storage` if the lookup failed.
pub async fn join_room(
    state: &AppState,
    room_id: &str,
    participant: Participant,
    tx: mpsc::Sender<Frame>,
) -> Result<RoomSnapshot, RoomError> {
    // Lookup outside every lock; the record only matters if we hydrate.
    let record = state
        .store
        .find_room(room_id)
        .await?
        .ok_or_else(|| RoomError::NotFound(room_id.to_owned()))?;

    loop {
        let (session, created) = state
            .rooms
            .get_or_insert_with(room_id, || {
                RoomSession::hydrate(&record, state.config.timer_defaults, state.config.chat_max_message_chars)
            })
            .await;
        if created {
            info!(%room_id, host = %record.host_user_id, "hydrated room from store");
        }

        let mut room = session.lock().await;
        if room.is_closed() {
            drop(room);
            state.rooms.remove_if_same(room_id, &session).await;
            continue;
        }

        let connection_id = participant.connection_id;
        let participants = room.presence.join(participant.clone(), tx.clone());

        let joined = room.frame("user-joined", data_of("participant", &participant));
        room.presence.broadcast(&joined, Some(connection_id));
        let update = room.frame("users-update", data_of("participants", &participants));
        room.presence.broadcast(&update, None);

        info!(%room_id, %connection_id, user_id = %participant.user_id, count = participants.len(), "participant joined room");

        return Ok(RoomSnapshot {
            room_id: room.room_id.clone(),
            name: room.name.clone(),
            host_user_id: room.host_user_id.clone(),
            connection_id,
            timer: room.timer,
            messages: room.chat.history(),
            participants,
        });
    }
}

/// Remove a connection from a room. Tears the session down when it empties.
/// Returns the removed participant, or `None` if it was not in the room.
pub async fn leave_room(state: &AppState, room_id: &str, connection_id: Uuid) -> Option<Participant> {
    let session = state.rooms.get(room_id).await?;
    let mut room = session.lock().await;
    if room.closed {
        return None;
    }
    let removed = room.presence.leave(connection_id)?;

    let participants = room.presence.list();
    room.presence.broadcast(&room.frame("user-left", data_of("participant", &removed)), None);
    room.presence.broadcast(&room.frame("users-update", data_of("participants", &participants)), None);
    room.presence.broadcast(&signaling::left_frame(room_id, connection_id), None);

    info!(%room_id, %connection_id, user_id = %removed.user_id, remaining = participants.len(), "participant left room");

    if room.presence.is_empty() {
        room.closed = true;
        drop(room);
        if state.rooms.remove_if_same(room_id, &session).await {
            info!(%room_id, "evicted room from memory");
        }
    }
    Some(removed)
}

// =============================================================================
// CHAT
// =============================================================================

/// Append a chat message and relay it to everyone in the room. Blank
/// content is dropped silently (`Ok(None)`).
///
/// # Errors
///
/// `NotJoined` if the connection is not in the room.
pub async fn send_message(
    state: &AppState,
    room_id: &str,
    connection_id: Uuid,
    content: &str,
) -> Result<Option<ChatMessage>, RoomError> {
    let session = state.rooms.get(room_id).await.ok_or(RoomError::NotJoined)?;
    let mut room = session.lock().await;
    let sender = room.member(connection_id)?;

    let Some(message) = room
        .chat
        .append(&sender.user_id, &sender.display_name, content, now_ms())
    else {
        return Ok(None);
    };

    let frame = room.frame("receive-message", data_of("message", &message)).with_from(sender.user_id);
    room.presence.broadcast(&frame, None);
    Ok(Some(message))
}

// =============================================================================
// TIMER
// =============================================================================

/// Apply a host command. Returns the new state, or `None` for a no-op.
///
/// # Errors
///
/// `NotJoined` if the connection is not in the room, `NotHost` if the user
/// does not host it. Neither changes any state.
pub async fn timer_command(
    state: &AppState,
    room_id: &str,
    connection_id: Uuid,
    command: TimerCommand,
) -> Result<Option<TimerState>, RoomError> {
    let session = state.rooms.get(room_id).await.ok_or(RoomError::NotJoined)?;
    let mut room = session.lock().await;
    let sender = room.member(connection_id)?;
    if !room.is_host(&sender.user_id) {
        return Err(RoomError::NotHost);
    }

    if !room.timer.apply(command, now_ms()) {
        return Ok(None);
    }

    let timer = room.timer;
    room.presence.broadcast(&room.frame("timer-sync", data_of("timer", &timer)), None);
    persistence::enqueue_timer_snapshot(state, room_id, timer);
    Ok(Some(timer))
}

/// Apply a host tick. Peers get the new state; the host also gets it when
/// the tick completed a phase.
///
/// # Errors
///
/// `NotJoined` or `NotHost`, as for [`timer_command`].
pub async fn timer_tick(
    state: &AppState,
    room_id: &str,
    connection_id: Uuid,
    tick: TimerTick,
) -> Result<(TimerState, TickOutcome), RoomError> {
    let session = state.rooms.get(room_id).await.ok_or(RoomError::NotJoined)?;
    let mut room = session.lock().await;
    let sender = room.member(connection_id)?;
    if !room.is_host(&sender.user_id) {
        return Err(RoomError::NotHost);
    }

    let outcome = room.timer.tick(tick, now_ms());
    let timer = room.timer;
    let exclude = match outcome {
        TickOutcome::Advanced => Some(connection_id),
        TickOutcome::PhaseCompleted => {
            info!(%room_id, is_break = timer.is_break, "timer phase completed");
            None
        }
    };
    room.presence.broadcast(&room.frame("timer-sync", data_of("timer", &timer)), exclude);
    persistence::enqueue_timer_snapshot(state, room_id, timer);
    Ok((timer, outcome))
}

// =============================================================================
// SIGNALING
// =============================================================================

/// Forward a signaling event within the sender's room.
///
/// # Errors
///
/// `NotJoined` if the connection is not in the room; `Signal` when a
/// point-to-point event names no target.
pub async fn relay_signal(
    state: &AppState,
    room_id: &str,
    connection_id: Uuid,
    kind: SignalKind,
    payload: &Data,
) -> Result<usize, RoomError> {
    let session = state.rooms.get(room_id).await.ok_or(RoomError::NotJoined)?;
    let room = session.lock().await;
    let sender = room.member(connection_id)?;
    Ok(signaling::relay(&room.presence, room_id, kind, &sender, payload)?)
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
