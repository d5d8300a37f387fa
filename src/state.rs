//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the room store, the registry of live room sessions, the
//! credential verifier, and the queue feeding the timer persistence worker.
//! Each live room keeps its own presence, chat history and timer; see
//! `services::room`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::AppConfig;
use crate::services::auth::TokenVerifier;
use crate::services::persistence::Queued;
use crate::services::room::RoomRegistry;
use crate::services::store::RoomStore;

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RoomStore>,
    pub rooms: Arc<RoomRegistry>,
    pub verifier: TokenVerifier,
    pub config: Arc<AppConfig>,
    /// Timer persistence queue. `None` disables timer writes.
    pub timer_persist_tx: Option<mpsc::Sender<Queued>>,
    /// Flips to `true` once the server is stopping; open connections close.
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, store: Arc<dyn RoomStore>) -> Self {
        Self {
            store,
            rooms: Arc::new(RoomRegistry::new()),
            verifier: TokenVerifier::new(&config.jwt_secret),
            config: Arc::new(config),
            timer_persist_tx: None,
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    #[must_use]
    pub fn with_timer_persistence(mut self, tx: mpsc::Sender<Queued>) -> Self {
        self.timer_persist_tx = Some(tx);
        self
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::frame::Frame;
    use crate::services::presence::Participant;
    use crate::services::store::{MemoryRoomStore, RoomRecord};
    use tokio::time::{Duration, timeout};
    use uuid::Uuid;

    pub const TEST_SECRET: &str = "test-secret";

    /// Create a test `AppState` backed by an in-memory store, without timer
    /// persistence.
    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with_store().0
    }

    /// Create a test `AppState` and hand back its in-memory store for seeding.
    #[must_use]
    pub fn test_app_state_with_store() -> (AppState, Arc<MemoryRoomStore>) {
        let store = Arc::new(MemoryRoomStore::new());
        let state = AppState::new(AppConfig::with_secret(TEST_SECRET), store.clone());
        (state, store)
    }

    /// Like [`test_app_state_with_store`], with the timer persistence worker
    /// running against the same store.
    #[must_use]
    pub fn test_app_state_with_persistence() -> (AppState, Arc<MemoryRoomStore>) {
        let (state, store) = test_app_state_with_store();
        let (tx, _worker) =
            crate::services::persistence::spawn_timer_persistence_worker(store.clone(), 64);
        (state.with_timer_persistence(tx), store)
    }

    /// Seed a room record hosted by `host_user_id` with default durations.
    pub async fn seed_room(store: &MemoryRoomStore, room_id: &str, host_user_id: &str) {
        store
            .insert(RoomRecord {
                room_id: room_id.into(),
                name: format!("Room {room_id}"),
                host_user_id: host_user_id.into(),
                work_duration: Some(1500),
                break_duration: Some(300),
                time_remaining: None,
                is_break: false,
            })
            .await;
    }

    /// Signed credential for `user_id`, valid for an hour.
    #[must_use]
    pub fn token_for(user_id: &str, name: &str) -> String {
        let exp = u64::try_from(crate::frame::now_ms() / 1000).unwrap_or(0) + 3600;
        crate::services::auth::sign_for_tests(TEST_SECRET, user_id, name, exp)
    }

    /// Fresh participant with a new connection id.
    #[must_use]
    pub fn participant(user_id: &str) -> Participant {
        Participant {
            connection_id: Uuid::new_v4(),
            user_id: user_id.into(),
            display_name: format!("{user_id} name"),
            joined_at: crate::frame::now_ms(),
        }
    }

    pub async fn recv_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("frame receive timed out")
            .expect("channel closed")
    }

    /// Receive frames until one with `event` arrives, discarding the rest.
    pub async fn recv_event(rx: &mut mpsc::Receiver<Frame>, event: &str) -> Frame {
        loop {
            let frame = recv_frame(rx).await;
            if frame.event == event {
                return frame;
            }
        }
    }

    /// Discard everything currently queued.
    pub fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
