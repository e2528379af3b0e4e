//! Named TTL tiers.
//!
//! Callers pick a tier instead of a raw number of seconds so expiry policy
//! stays in one place.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ttl {
    /// 1 minute.
    Short,
    /// 5 minutes.
    Medium,
    /// 30 minutes.
    Long,
    /// 1 hour.
    VeryLong,
    /// 24 hours.
    Extreme,
}

impl Ttl {
    pub const DEFAULT: Ttl = Ttl::Medium;

    pub const fn as_secs(self) -> u64 {
        match self {
            Ttl::Short => 60,
            Ttl::Medium => 300,
            Ttl::Long => 1800,
            Ttl::VeryLong => 3600,
            Ttl::Extreme => 86400,
        }
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<Ttl> for Duration {
    fn from(ttl: Ttl) -> Self {
        ttl.as_duration()
    }
}
