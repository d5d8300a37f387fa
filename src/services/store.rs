//! Room store: the durable room record and its timer mirror.
//!
//! SYSTEM CONTEXT
//! ==============
//! Rooms are created elsewhere; the engine only reads a room's record on
//! first join and writes back timer snapshots. `RoomStore` is that minimal
//! contract. `PgRoomStore` backs it with the `rooms` table; `MemoryRoomStore`
//! keeps records in-process for local runs without a database and for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::services::timer::TimerState;

/// Durable room record as the engine consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    #[serde(alias = "id")]
    pub room_id: String,
    pub name: String,
    pub host_user_id: String,
    /// Seconds. `None` or zero falls back to the configured default.
    #[serde(default)]
    pub work_duration: Option<u32>,
    #[serde(default)]
    pub break_duration: Option<u32>,
    /// Last persisted countdown value, if any.
    #[serde(default)]
    pub time_remaining: Option<u32>,
    #[serde(default)]
    pub is_break: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("room not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Load a room record. `Ok(None)` when the room does not exist.
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError>;

    /// Mirror a timer snapshot onto the room record.
    async fn update_timer_state(&self, room_id: &str, timer: &TimerState) -> Result<(), StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgRoomStore {
    pool: PgPool,
}

impl PgRoomStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_secs(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn to_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl RoomStore for PgRoomStore {
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, Option<i32>, Option<i32>, Option<i32>, bool)>(
            "SELECT id, name, host_user_id, work_duration, break_duration, time_remaining, is_break
             FROM rooms
             WHERE id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(room_id, name, host_user_id, work, brk, remaining, is_break)| RoomRecord {
            room_id,
            name,
            host_user_id,
            work_duration: to_secs(work),
            break_duration: to_secs(brk),
            time_remaining: to_secs(remaining),
            is_break,
        }))
    }

    async fn update_timer_state(&self, room_id: &str, timer: &TimerState) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE rooms
             SET time_remaining = $2, is_break = $3, is_running = $4, started_at = $5,
                 work_duration = $6, break_duration = $7, updated_at = now()
             WHERE id = $1",
        )
        .bind(room_id)
        .bind(to_column(timer.time_remaining))
        .bind(timer.is_break)
        .bind(timer.is_running)
        .bind(timer.started_at)
        .bind(to_column(timer.work_duration))
        .bind(to_column(timer.break_duration))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(room_id.to_owned()));
        }
        Ok(())
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, RoomRecord>>,
    timers: Mutex<HashMap<String, TimerState>>,
}

impl MemoryRoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded from a JSON array of room records.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the document is not an array of records.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<RoomRecord> = serde_json::from_str(json)?;
        let rooms = records.into_iter().map(|r| (r.room_id.clone(), r)).collect();
        Ok(Self { rooms: Mutex::new(rooms), timers: Mutex::default() })
    }

    /// Create or replace a room record.
    #[cfg(test)]
    pub async fn insert(&self, record: RoomRecord) {
        self.rooms.lock().await.insert(record.room_id.clone(), record);
    }

    /// Last timer snapshot written for `room_id`.
    #[cfg(test)]
    pub async fn timer_snapshot(&self, room_id: &str) -> Option<TimerState> {
        self.timers.lock().await.get(room_id).copied()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.rooms.lock().await.get(room_id).cloned())
    }

    async fn update_timer_state(&self, room_id: &str, timer: &TimerState) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        let Some(record) = rooms.get_mut(room_id) else {
            return Err(StoreError::NotFound(room_id.to_owned()));
        };
        record.work_duration = Some(timer.work_duration);
        record.break_duration = Some(timer.break_duration);
        record.time_remaining = Some(timer.time_remaining);
        record.is_break = timer.is_break;
        drop(rooms);

        self.timers.lock().await.insert(room_id.to_owned(), *timer);
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
