//! In-process session notifications.
//!
//! Published on a `tokio::sync::broadcast` channel; a websocket bridge can
//! forward them to the kiosk listening on [`SessionEvent::channel`].

use chrono::{DateTime, Utc};
use myrvm_core::{RvmId, UserId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Authorized {
        rvm_id: Option<RvmId>,
        session_id: String,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
    GuestActivated {
        rvm_id: Option<RvmId>,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    Destroyed {
        rvm_id: Option<RvmId>,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Broadcast name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authorized { .. } => "session.authorized",
            Self::GuestActivated { .. } => "session.guest-activated",
            Self::Destroyed { .. } => "session.destroyed",
        }
    }

    /// `rvm.{id}`, or `None` for sessions not tied to a machine.
    pub fn channel(&self) -> Option<String> {
        self.rvm_id().map(|id| format!("rvm.{}", id))
    }

    pub fn rvm_id(&self) -> Option<RvmId> {
        match self {
            Self::Authorized { rvm_id, .. }
            | Self::GuestActivated { rvm_id, .. }
            | Self::Destroyed { rvm_id, .. } => *rvm_id,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Authorized { session_id, .. }
            | Self::GuestActivated { session_id, .. }
            | Self::Destroyed { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_channel() {
        let event = SessionEvent::Authorized {
            rvm_id: Some(RvmId::new(7)),
            session_id: "abc".into(),
            user_id: UserId::new(42),
            timestamp: Utc::now(),
        };
        assert_eq!(event.name(), "session.authorized");
        assert_eq!(event.channel().as_deref(), Some("rvm.7"));
        assert_eq!(event.session_id(), "abc");

        let guest = SessionEvent::GuestActivated {
            rvm_id: None,
            session_id: "def".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(guest.name(), "session.guest-activated");
        assert_eq!(guest.channel(), None);
    }

    #[test]
    fn test_serializes_with_event_tag() {
        let event = SessionEvent::Destroyed {
            rvm_id: Some(RvmId::new(1)),
            session_id: "abc".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "destroyed");
        assert_eq!(json["rvm_id"], 1);
    }
}
