//! # MyRVM Cache
//!
//! Redis-based caching utilities for the MyRVM platform.
//!
//! This crate provides:
//! - A store abstraction ([`CacheStore`], [`ScanPrefix`]) with Redis and
//!   in-memory backends
//! - Deterministic cache key construction and TTL tiers
//! - [`CacheService`]: remember/forget, tags, prefix-based bulk clear,
//!   statistics and warm-up
//! - [`Cacheable`]: read-through caching for domain entities, invalidated on
//!   mutation
//!
//! # Example
//!
//! ```ignore
//! use myrvm_cache::{CacheService, RedisStore, Ttl, keys};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = RedisStore::new("redis://127.0.0.1:6379", "myrvm").await?;
//!     let cache = CacheService::new(store);
//!
//!     let machines: Vec<Machine> = cache
//!         .remember(keys::rvm::PREFIX, keys::rvm::LIST, &keys::no_params(), Ttl::Long, || async {
//!             load_machines().await
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cacheable;
pub mod error;
pub mod keys;
pub mod memory;
pub mod redis;
pub mod service;
pub mod store;
pub mod ttl;

pub use cacheable::{Cacheable, EntityCache};
pub use error::CacheError;
pub use keys::{CacheParams, get_key, hash_params, params};
pub use memory::MemoryStore;
pub use crate::redis::RedisStore;
pub use service::{CacheService, Warmer};
pub use store::{AnyStore, CacheStore, ScanPrefix};
pub use ttl::Ttl;
