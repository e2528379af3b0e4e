//! Store abstraction.
//!
//! Services never talk to Redis directly: they are generic over a
//! [`CacheStore`] so tests can run against [`MemoryStore`]. Key enumeration
//! is a separate capability ([`ScanPrefix`]) because pattern scans are the
//! expensive part of the contract and a different backend may answer them
//! from a secondary index instead.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use myrvm_config::{CacheConfig, CacheDriver};
use tracing::info;

use crate::{CacheError, MemoryStore, RedisStore};

/// Key-value store with per-entry TTL.
///
/// Values are opaque strings; serialization happens in the services.
pub trait CacheStore: Clone + Send + Sync + 'static {
    /// Reads a live entry.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    /// Writes an entry, replacing any previous value and TTL.
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Writes an entry only if the key is absent. Returns whether it was written.
    fn add(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Replaces an entry only if it still holds `expected`, atomically with
    /// respect to other writers. Returns whether it was written.
    fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Removes an entry. Returns whether it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Removes several entries, returning how many existed.
    fn delete_many(&self, keys: &[String]) -> impl Future<Output = Result<u64, CacheError>> + Send;

    /// Remaining lifetime in whole seconds, `None` if the key is absent.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<Option<u64>, CacheError>> + Send;

    /// Resets the remaining lifetime. Returns whether the key existed.
    fn expire(&self, key: &str, ttl: Duration)
    -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// Raw introspection fields (Redis `INFO` names).
    fn info(&self) -> impl Future<Output = Result<BTreeMap<String, String>, CacheError>> + Send;
}

/// Enumerates keys starting with a literal prefix.
///
/// O(total keys) on Redis; reserve for maintenance paths.
pub trait ScanPrefix: Send + Sync {
    fn scan_prefix(&self, prefix: &str)
    -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;
}

/// Store selected at runtime from [`CacheConfig`].
#[derive(Clone, Debug)]
pub enum AnyStore {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl AnyStore {
    /// Connects to the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Connection` if Redis is selected and unreachable.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let store = match config.driver {
            CacheDriver::Redis => {
                Self::Redis(RedisStore::new(&config.redis_url, &config.key_prefix).await?)
            }
            CacheDriver::Memory => Self::Memory(MemoryStore::new()),
        };
        info!(cache.driver = %config.driver, "Cache store connected");
        Ok(store)
    }
}

impl CacheStore for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            Self::Redis(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        match self {
            Self::Redis(s) => s.set(key, value, ttl).await,
            Self::Memory(s) => s.set(key, value, ttl).await,
        }
    }

    async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
        match self {
            Self::Redis(s) => s.add(key, value, ttl).await,
            Self::Memory(s) => s.add(key, value, ttl).await,
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        match self {
            Self::Redis(s) => s.compare_and_set(key, expected, value, ttl).await,
            Self::Memory(s) => s.compare_and_set(key, expected, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            Self::Redis(s) => s.delete(key).await,
            Self::Memory(s) => s.delete(key).await,
        }
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        match self {
            Self::Redis(s) => s.delete_many(keys).await,
            Self::Memory(s) => s.delete_many(keys).await,
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError> {
        match self {
            Self::Redis(s) => s.ttl(key).await,
            Self::Memory(s) => s.ttl(key).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        match self {
            Self::Redis(s) => s.expire(key, ttl).await,
            Self::Memory(s) => s.expire(key, ttl).await,
        }
    }

    async fn info(&self) -> Result<BTreeMap<String, String>, CacheError> {
        match self {
            Self::Redis(s) => s.info().await,
            Self::Memory(s) => s.info().await,
        }
    }
}

impl ScanPrefix for AnyStore {
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        match self {
            Self::Redis(s) => s.scan_prefix(prefix).await,
            Self::Memory(s) => s.scan_prefix(prefix).await,
        }
    }
}

/// Whole seconds for a store TTL; stores reject zero-length expiries.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
