//! Domain services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! Leaf services (`presence`, `chat`, `timer`, `signaling`) are plain data
//! and logic with no locking. `room` owns one of each per live room and does
//! the locking and fan-out; `store` and `persistence` handle the durable
//! room record. Route handlers stay focused on protocol translation.

pub mod auth;
pub mod chat;
pub mod persistence;
pub mod presence;
pub mod room;
pub mod signaling;
pub mod store;
pub mod timer;
