//! Kiosk session configuration.
//!
//! # Configuration
//!
//! - `SESSION_TTL_SECONDS`: Lifetime of a freshly created session (default: 600)
//! - `SESSION_RENEW_THRESHOLD_SECONDS`: Remaining lifetime below which an active
//!   session is renewed (default: 60)
//! - `SESSION_RENEW_TTL_SECONDS`: Lifetime granted on renewal (default: 120)
//! - `SESSION_DESTROYED_RETENTION_SECONDS`: How long a destroyed record stays
//!   readable (default: 60)
//! - `SESSION_LOGIN_PATH`: Redirect target for non-API callers whose session
//!   failed validation (default: `/admin/login`)

use std::env;
use std::time::Duration;

/// Session lifetime tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTtl {
    /// Renewal window granted on activity.
    Default,
    /// Lifetime of a QR code on a kiosk screen.
    Kiosk,
    Extended,
    Long,
    /// "Remember me".
    Remember,
}

impl SessionTtl {
    pub const fn as_secs(self) -> u64 {
        match self {
            Self::Default => 120,
            Self::Kiosk => 600,
            Self::Extended => 3600,
            Self::Long => 86_400,
            Self::Remember => 2_592_000,
        }
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl From<SessionTtl> for Duration {
    fn from(ttl: SessionTtl) -> Self {
        ttl.as_duration()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Seconds a new session lives before it must be claimed or renewed.
    pub default_ttl_seconds: u64,

    /// Low-water mark for sliding renewal, in seconds.
    pub renew_threshold_seconds: u64,

    /// Seconds granted when a session is renewed.
    pub renew_ttl_seconds: u64,

    /// Seconds a destroyed record is kept for inspection.
    pub destroyed_retention_seconds: u64,

    /// Where browsers are sent after a failed security check.
    pub login_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: SessionTtl::Kiosk.as_secs(),
            renew_threshold_seconds: 60,
            renew_ttl_seconds: SessionTtl::Default.as_secs(),
            destroyed_retention_seconds: 60,
            login_path: "/admin/login".into(),
        }
    }
}

impl SessionConfig {
    /// Creates a new `SessionConfig` from environment variables.
    ///
    /// Falls back to default values if environment variables are not set
    /// or cannot be parsed.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl_seconds: crate::env_or("SESSION_TTL_SECONDS", defaults.default_ttl_seconds),
            renew_threshold_seconds: crate::env_or(
                "SESSION_RENEW_THRESHOLD_SECONDS",
                defaults.renew_threshold_seconds,
            ),
            renew_ttl_seconds: crate::env_or("SESSION_RENEW_TTL_SECONDS", defaults.renew_ttl_seconds),
            destroyed_retention_seconds: crate::env_or(
                "SESSION_DESTROYED_RETENTION_SECONDS",
                defaults.destroyed_retention_seconds,
            ),
            login_path: env::var("SESSION_LOGIN_PATH").unwrap_or(defaults.login_path),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn renew_threshold(&self) -> Duration {
        Duration::from_secs(self.renew_threshold_seconds)
    }

    pub fn renew_ttl(&self) -> Duration {
        Duration::from_secs(self.renew_ttl_seconds)
    }

    pub fn destroyed_retention(&self) -> Duration {
        Duration::from_secs(self.destroyed_retention_seconds)
    }
}
