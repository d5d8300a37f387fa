//! Signaling service: relays peer-connection negotiation between members.
//!
//! DESIGN
//! ======
//! Stateless. `offer`/`answer`/`candidate` go point-to-point to the
//! connection named by `targetConnectionId`; `ready` and `leave` announce to
//! the rest of the room. Payloads are forwarded verbatim: only the two
//! negotiating ends interpret them. Targets are resolved through the room's
//! presence, so nothing can be addressed outside the sender's room.

use tracing::debug;
use uuid::Uuid;

use crate::frame::{Data, Frame};
use crate::services::presence::{Participant, Presence};

pub const TARGET_KEY: &str = "targetConnectionId";
pub const FROM_KEY: &str = "fromConnectionId";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Ready,
    Offer,
    Answer,
    Candidate,
    Leave,
}

impl SignalKind {
    /// Map an inbound event name onto a signal kind.
    #[must_use]
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "video-ready" => Some(Self::Ready),
            "video-offer" => Some(Self::Offer),
            "video-answer" => Some(Self::Answer),
            "video-ice-candidate" => Some(Self::Candidate),
            "video-leave" => Some(Self::Leave),
            _ => None,
        }
    }

    /// Event name delivered to recipients.
    #[must_use]
    pub fn outbound_event(self) -> &'static str {
        match self {
            Self::Ready => "video-user-ready",
            Self::Offer => "video-offer",
            Self::Answer => "video-answer",
            Self::Candidate => "video-ice-candidate",
            Self::Leave => "video-user-left",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("{TARGET_KEY} required")]
    MissingTarget,
}

impl crate::frame::ErrorCode for SignalError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingTarget => "E_BAD_REQUEST",
        }
    }
}

/// Forward one signaling event from `from` within `presence`.
///
/// Returns the number of connections the frame was queued for. An unknown
/// target is not an error: the peer may have just left.
///
/// # Errors
///
/// Returns [`SignalError::MissingTarget`] when a point-to-point kind carries
/// no parseable `targetConnectionId`.
pub fn relay(
    presence: &Presence,
    room_id: &str,
    kind: SignalKind,
    from: &Participant,
    payload: &Data,
) -> Result<usize, SignalError> {
    match kind {
        SignalKind::Ready => {
            let frame = ready_frame(room_id, from);
            presence.broadcast(&frame, Some(from.connection_id));
            Ok(presence.len().saturating_sub(1))
        }
        SignalKind::Leave => {
            let frame = left_frame(room_id, from.connection_id);
            presence.broadcast(&frame, Some(from.connection_id));
            Ok(presence.len().saturating_sub(1))
        }
        SignalKind::Offer | SignalKind::Answer | SignalKind::Candidate => {
            let target = payload
                .get(TARGET_KEY)
                .and_then(serde_json::Value::as_str)
                .and_then(|s| s.parse::<Uuid>().ok())
                .ok_or(SignalError::MissingTarget)?;

            let mut data = payload.clone();
            data.remove(TARGET_KEY);
            data.insert(FROM_KEY.into(), serde_json::json!(from.connection_id));
            data.insert("fromUserId".into(), serde_json::json!(from.user_id));
            let frame = Frame::event(kind.outbound_event(), data)
                .with_room_id(room_id)
                .with_from(from.user_id.clone());

            if presence.send_to(target, frame) {
                debug!(%room_id, from = %from.connection_id, to = %target, event = kind.outbound_event(), "signal: forwarded");
                Ok(1)
            } else {
                debug!(%room_id, from = %from.connection_id, to = %target, "signal: target not in room; dropped");
                Ok(0)
            }
        }
    }
}

/// `video-user-ready` announcement for `who`.
#[must_use]
pub fn ready_frame(room_id: &str, who: &Participant) -> Frame {
    Frame::event(SignalKind::Ready.outbound_event(), Data::new())
        .with_room_id(room_id)
        .with_data("connectionId", serde_json::json!(who.connection_id))
        .with_data("userId", who.user_id.clone())
        .with_data("displayName", who.display_name.clone())
}

/// `video-user-left` announcement. Also sent when a member leaves the room.
#[must_use]
pub fn left_frame(room_id: &str, connection_id: Uuid) -> Frame {
    Frame::event(SignalKind::Leave.outbound_event(), Data::new())
        .with_room_id(room_id)
        .with_data("connectionId", serde_json::json!(connection_id))
}

#[cfg(test)]
#[path = "signaling_test.rs"]
mod tests;
