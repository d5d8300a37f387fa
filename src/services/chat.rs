//! Chat service: bounded per-room message history.
//!
//! Messages are session-only: they live in memory while the room has
//! participants and are dropped with the room. Ids come from a per-room
//! counter, so ordering by id is the order the relay accepted them.

use std::collections::VecDeque;

use serde::Serialize;

/// Maximum messages retained per room; the oldest is evicted first.
pub const HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub user_id: String,
    pub display_name: String,
    pub content: String,
    /// Milliseconds since epoch.
    pub created_at: i64,
}

pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    next_id: u64,
    max_chars: usize,
}

impl ChatLog {
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self { messages: VecDeque::with_capacity(HISTORY_CAPACITY), next_id: 1, max_chars: max_chars.max(1) }
    }

    /// Accept a message. Blank content is dropped (`None`); over-long content
    /// is cut to `max_chars` characters.
    pub fn append(&mut self, user_id: &str, display_name: &str, content: &str, now_ms: i64) -> Option<ChatMessage> {
        let content = normalize_content(content, self.max_chars)?;

        let message = ChatMessage {
            id: self.next_id,
            user_id: user_id.to_owned(),
            display_name: display_name.to_owned(),
            content,
            created_at: now_ms,
        };
        self.next_id += 1;

        self.messages.push_back(message.clone());
        while self.messages.len() > HISTORY_CAPACITY {
            self.messages.pop_front();
        }
        Some(message)
    }

    /// Retained messages, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }
}

fn normalize_content(raw: &str, max_chars: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => Some(trimmed[..cut].trim_end().to_owned()),
        None => Some(trimmed.to_owned()),
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
