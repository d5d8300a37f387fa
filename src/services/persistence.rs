//! Persistence service: background writer for timer snapshots.
//!
//! DESIGN
//! ======
//! Timer changes are enqueued with `try_send` while the room lock is held and
//! written by a single worker, so no room ever waits on the store. The worker
//! drains whatever is queued and keeps only the newest snapshot per room
//! before writing: a host ticking every second produces one write per drain,
//! not a backlog.
//!
//! ERROR HANDLING
//! ==============
//! A failed write is logged and dropped. The next change to the room writes a
//! fresh snapshot anyway, and the live session is always authoritative.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::services::store::RoomStore;
use crate::services::timer::TimerState;
use crate::state::AppState;

/// One queued timer write: room id and the snapshot to mirror.
pub type Queued = (String, TimerState);

/// Spawn the timer persistence worker and return its queue sender. The worker
/// exits once every sender is dropped and the queue is drained.
#[must_use]
pub fn spawn_timer_persistence_worker(
    store: Arc<dyn RoomStore>,
    queue_capacity: usize,
) -> (mpsc::Sender<Queued>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Queued>(queue_capacity.max(1));
    info!(queue_capacity, "timer persistence worker configured");

    let handle = tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut pending: HashMap<String, TimerState> = HashMap::new();
            let (room_id, timer) = first;
            pending.insert(room_id, timer);
            while let Ok((room_id, timer)) = rx.try_recv() {
                pending.insert(room_id, timer);
            }
            flush(store.as_ref(), pending).await;
        }
        info!("timer persistence worker stopped");
    });

    (tx, handle)
}

async fn flush(store: &dyn RoomStore, pending: HashMap<String, TimerState>) {
    for (room_id, timer) in pending {
        if let Err(e) = store.update_timer_state(&room_id, &timer).await {
            warn!(error = %e, %room_id, "timer snapshot write failed; dropping");
        }
    }
}

/// Best-effort, non-blocking enqueue of a timer snapshot.
pub fn enqueue_timer_snapshot(state: &AppState, room_id: &str, timer: TimerState) {
    let Some(tx) = &state.timer_persist_tx else {
        return;
    };

    match tx.try_send((room_id.to_owned(), timer)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%room_id, "timer persist queue full; dropping snapshot");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!(%room_id, "timer persist queue closed; dropping snapshot");
        }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
