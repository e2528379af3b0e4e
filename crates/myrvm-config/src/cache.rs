//! Cache store configuration.
//!
//! Selects the backing store and carries the Redis connection settings.

use std::env;
use std::fmt;
use std::str::FromStr;

/// Which store backs the cache and session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheDriver {
    /// Shared Redis instance (production).
    Redis,
    /// Process-local map; sessions and caches vanish with the process.
    Memory,
}

impl FromStr for CacheDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "array" => Ok(Self::Memory),
            other => Err(format!("unknown cache store: {other}")),
        }
    }
}

impl fmt::Display for CacheDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => f.write_str("redis"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Cache configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `CACHE_STORE`: `redis` or `memory` (default: `redis`)
/// - `REDIS_URL`: Redis connection URL (default: `redis://127.0.0.1:6379`)
/// - `CACHE_PREFIX`: Namespace for all physical keys (default: `myrvm`)
/// - `APP_NAME` / `APP_ENV`: Reported by the `config:app` warm-up entry
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Backing store.
    pub driver: CacheDriver,

    /// Redis connection URL.
    pub redis_url: String,

    /// Prefix for all cache keys to avoid collisions.
    pub key_prefix: String,

    /// Application name.
    pub app_name: String,

    /// Deployment environment.
    pub app_env: String,
}

impl CacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            driver: crate::env_or("CACHE_STORE", defaults.driver),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.key_prefix),
            app_name: env::var("APP_NAME").unwrap_or(defaults.app_name),
            app_env: env::var("APP_ENV").unwrap_or(defaults.app_env),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::Redis,
            redis_url: "redis://127.0.0.1:6379".into(),
            key_prefix: "myrvm".into(),
            app_name: "MyRVM".into(),
            app_env: "production".into(),
        }
    }
}
