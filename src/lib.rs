//! # MyRVM
//!
//! Cache and kiosk-session layer of the MyRVM reverse vending machine
//! platform.
//!
//! ## Overview
//!
//! An RVM asks the platform for a session token, renders it as a QR code, and
//! waits for a user's phone to claim it (or starts a guest session). The
//! session then lives in Redis with a sliding expiry and an IP/user-agent
//! binding that is re-checked on every request. Domain reads go through a
//! read-through cache over the same Redis instance.
//!
//! ## Architecture
//!
//! ```text
//! crates/
//! ├── myrvm-core/      # AppError, typed ids
//! ├── myrvm-config/    # CacheConfig, SessionConfig
//! ├── myrvm-cache/     # stores, keys, TTL tiers, CacheService, Cacheable
//! └── myrvm-session/   # SessionService, events, session_security middleware
//! src/
//! ├── cli/             # myrvm-cli commands (cache, session)
//! ├── logging.rs       # tracing subscriber setup
//! └── state.rs         # AppState wiring
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! CACHE_STORE=redis
//! REDIS_URL=redis://127.0.0.1:6379
//! CACHE_PREFIX=myrvm
//! SESSION_TTL_SECONDS=600
//! ```
//!
//! ```bash
//! cargo run --bin myrvm-cli -- cache warm
//! cargo run --bin myrvm-cli -- session cleanup --dry-run
//! cargo run --bin myrvm-cli -- session manage list --user-id=42
//! ```
//!
//! ## Modules
//!
//! - [`cli`]: Administrative commands
//! - [`logging`]: Tracing initialisation
//! - [`state`]: Shared application state

pub mod cli;
pub mod logging;
pub mod state;

// Re-export workspace crates for convenience
pub use myrvm_cache;
pub use myrvm_config;
pub use myrvm_core;
pub use myrvm_session;
