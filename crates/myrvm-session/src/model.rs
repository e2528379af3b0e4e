//! Kiosk session records and DTOs.
//!
//! A session starts when an RVM asks for a QR token and ends when it expires,
//! is destroyed after a failed security check, or is cleared by an operator.
//! Records are stored as JSON under `session:{id}`.

use chrono::{DateTime, Utc};
use myrvm_core::{RvmId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle state of a session.
///
/// `active` means pending authorization: the QR code is on screen and no
/// phone has claimed it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Authorized,
    GuestActive,
    Expired,
    Destroyed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Authorized => "authorized",
            Self::GuestActive => "guest_active",
            Self::Expired => "expired",
            Self::Destroyed => "destroyed",
        }
    }

    /// `expired` and `destroyed` have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Destroyed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "authorized" => Ok(Self::Authorized),
            "guest_active" => Ok(Self::GuestActive),
            "expired" => Ok(Self::Expired),
            "destroyed" => Ok(Self::Destroyed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Stored session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque 40-character token
    pub id: String,
    /// Machine that requested the session
    pub rvm_id: Option<RvmId>,
    pub status: SessionStatus,
    /// Bound on claim; `None` for pending and guest sessions
    pub user_id: Option<UserId>,
    /// Bound on the first security check if not known at creation
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Lifetime in seconds granted by the last write that set it
    pub ttl: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroyed_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Seconds left until `expires_at`, never below zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }

    /// Wall-clock length of the session so far.
    pub fn duration_secs(&self) -> i64 {
        (self.last_activity - self.created_at).num_seconds().max(0)
    }

    /// Reports `expired` once the embedded expiry has passed.
    pub(crate) fn observed_at(mut self, now: DateTime<Utc>) -> Self {
        if !self.status.is_terminal() && self.is_expired_at(now) {
            self.status = SessionStatus::Expired;
        }
        self
    }
}

/// Input for [`SessionService::create_session`](crate::SessionService::create_session).
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub rvm_id: Option<RvmId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub data: Map<String, Value>,
    /// Overrides the configured default lifetime
    pub ttl: Option<Duration>,
}

impl NewSession {
    pub fn for_rvm(rvm_id: RvmId) -> Self {
        Self {
            rvm_id: Some(rvm_id),
            ..Self::default()
        }
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.ttl = Some(ttl.into());
        self
    }
}

/// Aggregate view over every stored session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: u64,
    pub active_sessions: u64,
    pub authorized_sessions: u64,
    pub guest_active_sessions: u64,
    pub expired_sessions: u64,
    pub destroyed_sessions: u64,
    /// Sessions bound to a user
    pub user_sessions: u64,
    pub guest_sessions: u64,
    /// Mean of `last_activity - created_at`, rounded to whole seconds
    pub average_session_duration: u64,
    /// Creation hour (`"00"`..`"23"`, UTC) to session count
    pub sessions_by_hour: BTreeMap<String, u64>,
}

/// What a cleanup run would remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupPreview {
    pub expired: Vec<String>,
    pub undecodable: Vec<String>,
}

impl CleanupPreview {
    pub fn total(&self) -> usize {
        self.expired.len() + self.undecodable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myrvm_config::SessionTtl;
    use chrono::TimeDelta;

    fn record(now: DateTime<Utc>, ttl: i64) -> SessionRecord {
        SessionRecord {
            id: "a".repeat(40),
            rvm_id: Some(RvmId::new(7)),
            status: SessionStatus::Active,
            user_id: None,
            ip_address: None,
            user_agent: None,
            data: Map::new(),
            ttl: ttl as u64,
            created_at: now,
            last_activity: now,
            expires_at: now + TimeDelta::seconds(ttl),
            claimed_at: None,
            activated_at: None,
            destroyed_at: None,
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::GuestActive).unwrap(),
            "\"guest_active\""
        );
        assert_eq!("guest_active".parse::<SessionStatus>(), Ok(SessionStatus::GuestActive));
        assert!("pending".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_observed_expiry() {
        let now = Utc::now();
        let r = record(now, 60);
        assert_eq!(r.remaining_at(now), 60);
        assert_eq!(r.clone().observed_at(now).status, SessionStatus::Active);

        let later = now + TimeDelta::seconds(61);
        assert_eq!(r.remaining_at(later), 0);
        assert_eq!(r.observed_at(later).status, SessionStatus::Expired);
    }

    #[test]
    fn test_destroyed_stays_destroyed() {
        let now = Utc::now();
        let mut r = record(now, 60);
        r.status = SessionStatus::Destroyed;
        let later = now + TimeDelta::seconds(120);
        assert_eq!(r.observed_at(later).status, SessionStatus::Destroyed);
    }

    #[test]
    fn test_new_session_builder() {
        let new = NewSession::for_rvm(RvmId::new(7))
            .ip_address("10.0.0.5")
            .user_agent("kiosk/1.0")
            .data("lang", "id")
            .ttl(SessionTtl::Extended);
        assert_eq!(new.rvm_id, Some(RvmId::new(7)));
        assert_eq!(new.data.get("lang"), Some(&Value::from("id")));
        assert_eq!(new.ttl, Some(Duration::from_secs(3600)));
    }
}
