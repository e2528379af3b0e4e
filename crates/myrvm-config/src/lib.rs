//! # MyRVM Config
//!
//! Configuration types for the MyRVM platform, loaded from environment
//! variables:
//!
//! - [`cache`]: Cache store selection, Redis connection and key namespace
//! - [`session`]: Kiosk session lifetimes and renewal policy
//!
//! # Example
//!
//! ```ignore
//! use myrvm_config::{CacheConfig, SessionConfig};
//!
//! let cache_config = CacheConfig::from_env();
//! let session_config = SessionConfig::from_env();
//! ```

pub mod cache;
pub mod session;

// Re-export commonly used types at crate root
pub use cache::{CacheConfig, CacheDriver};
pub use session::{SessionConfig, SessionTtl};

/// Parse an environment variable, falling back to `default` when it is unset
/// or malformed.
pub(crate) fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
