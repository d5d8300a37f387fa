//! Presence service: who is connected to a room right now.
//!
//! DESIGN
//! ======
//! One entry per live connection, kept in join order. A user with several
//! tabs open holds several entries, each with its own connection id. Each
//! entry carries the connection's outbound queue, so presence is also the
//! fan-out list for every broadcast in the room.
//!
//! Sends are best-effort `try_send`: a slow client whose queue is full misses
//! that frame, it never stalls the room.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::frame::Frame;

/// Public view of one presence entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    /// Milliseconds since epoch of the (latest) join.
    pub joined_at: i64,
}

struct Entry {
    participant: Participant,
    tx: mpsc::Sender<Frame>,
}

#[derive(Default)]
pub struct Presence {
    entries: Vec<Entry>,
}

impl Presence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Re-joining with the same connection id replaces
    /// the entry in place, keeping its position. Returns the participant list.
    pub fn join(&mut self, participant: Participant, tx: mpsc::Sender<Frame>) -> Vec<Participant> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.participant.connection_id == participant.connection_id)
        {
            entry.participant = participant;
            entry.tx = tx;
        } else {
            self.entries.push(Entry { participant, tx });
        }
        self.list()
    }

    /// Remove a connection. Returns the removed participant, or `None` if the
    /// connection was not present.
    pub fn leave(&mut self, connection_id: Uuid) -> Option<Participant> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.participant.connection_id == connection_id)?;
        Some(self.entries.remove(idx).participant)
    }

    /// Participants ordered by join time.
    #[must_use]
    pub fn list(&self) -> Vec<Participant> {
        self.entries.iter().map(|e| e.participant.clone()).collect()
    }

    #[must_use]
    pub fn get(&self, connection_id: Uuid) -> Option<&Participant> {
        self.entries
            .iter()
            .map(|e| &e.participant)
            .find(|p| p.connection_id == connection_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send a frame to every entry, optionally skipping one connection.
    pub fn broadcast(&self, frame: &Frame, exclude: Option<Uuid>) {
        for entry in &self.entries {
            if exclude == Some(entry.participant.connection_id) {
                continue;
            }
            push(entry, frame.clone());
        }
    }

    /// Send a frame to one connection. Returns `false` if it is not present.
    pub fn send_to(&self, connection_id: Uuid, frame: Frame) -> bool {
        let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.participant.connection_id == connection_id)
        else {
            return false;
        };
        push(entry, frame);
        true
    }
}

fn push(entry: &Entry, frame: Frame) {
    if let Err(e) = entry.tx.try_send(frame) {
        let reason = match e {
            mpsc::error::TrySendError::Full(_) => "queue full",
            mpsc::error::TrySendError::Closed(_) => "queue closed",
        };
        warn!(connection_id = %entry.participant.connection_id, reason, "presence: dropped outbound frame");
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
