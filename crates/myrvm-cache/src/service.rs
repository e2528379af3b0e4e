//! Read-through caching over a [`CacheStore`].
//!
//! Reads are soft: a store failure is logged and the producer's value is
//! returned as if the entry were missing. Producer errors are never cached and
//! reach the caller unchanged.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::keys::{CacheParams, get_key};
use crate::store::{CacheStore, ScanPrefix};
use crate::{CacheError, Ttl};

const TAG_PREFIX: &str = "tag";
/// Separates a cache key from its tag-version suffix.
const TAG_VERSION_MARK: &str = "#t";

pub type WarmFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// A well-known entry that [`CacheService::warm_up`] repopulates.
#[derive(Clone)]
pub struct Warmer {
    pub name: String,
    pub prefix: String,
    pub key: String,
    pub ttl: Ttl,
    produce: Arc<dyn Fn() -> WarmFuture + Send + Sync>,
}

impl Warmer {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        prefix: impl Into<String>,
        key: impl Into<String>,
        ttl: Ttl,
        produce: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            key: key.into(),
            ttl,
            produce: Arc::new(move || Box::pin(produce())),
        }
    }
}

impl std::fmt::Debug for Warmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warmer")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Per-tag bookkeeping: the current version and the storage keys written
/// under it.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TagEntry {
    version: String,
    keys: BTreeSet<String>,
}

/// Cache facade shared by every service.
///
/// Cloning is cheap: the store is a shared client and the warmer list is
/// reference counted.
#[derive(Clone)]
pub struct CacheService<S> {
    store: S,
    warmers: Arc<Vec<Warmer>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for CacheService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("store", &self.store)
            .field("warmers", &self.warmers.len())
            .finish()
    }
}

impl<S> CacheService<S>
where
    S: CacheStore + ScanPrefix,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            warmers: Arc::new(Vec::new()),
        }
    }

    /// The underlying store, for callers that need TTL-level control.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registers an entry to be repopulated by [`warm_up`](Self::warm_up).
    pub fn with_warmer(mut self, warmer: Warmer) -> Self {
        Arc::make_mut(&mut self.warmers).push(warmer);
        self
    }

    pub fn warmers(&self) -> &[Warmer] {
        &self.warmers
    }

    pub fn get_key(&self, prefix: &str, key: &str, params: &CacheParams) -> String {
        get_key(prefix, key, params)
    }

    /// Returns the cached value, or runs `producer` and caches its result.
    ///
    /// Concurrent misses for the same key may each run the producer.
    pub async fn remember<T, E, F, Fut>(
        &self,
        prefix: &str,
        key: &str,
        params: &CacheParams,
        ttl: impl Into<Duration>,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cache_key = get_key(prefix, key, params);
        self.remember_at(prefix, &cache_key, &cache_key, ttl.into(), producer)
            .await
    }

    /// Like [`remember`](Self::remember), additionally grouping the entry
    /// under `tags` so [`clear_by_tags`](Self::clear_by_tags) can drop it.
    pub async fn remember_with_tags<T, E, F, Fut>(
        &self,
        prefix: &str,
        key: &str,
        params: &CacheParams,
        tags: &[&str],
        ttl: impl Into<Duration>,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cache_key = get_key(prefix, key, params);
        let ttl = ttl.into();

        let storage_key = match self.tagged_key(tags, &cache_key).await {
            Ok(storage_key) => storage_key,
            Err(e) => {
                error!(cache.key = %cache_key, error = %e, "Cache error for tagged key");
                return producer().await;
            }
        };

        let value = self
            .remember_at(prefix, &cache_key, &storage_key, ttl, producer)
            .await?;

        if let Err(e) = self.register_tags(tags, &storage_key, ttl).await {
            warn!(cache.key = %cache_key, error = %e, "Failed to register cache tags");
        }

        Ok(value)
    }

    async fn remember_at<T, E, F, Fut>(
        &self,
        prefix: &str,
        cache_key: &str,
        storage_key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.store.get(storage_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    record_hit(prefix);
                    debug!(cache.key = %cache_key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(cache.key = %cache_key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                error!(cache.key = %cache_key, error = %e, "Cache error");
                return producer().await;
            }
        }

        record_miss(prefix);
        info!(cache.key = %cache_key, "Cache miss");

        let value = producer().await?;

        match serde_json::to_string(&value) {
            Ok(json) => {
                if let Err(e) = self.store.set(storage_key, json, ttl).await {
                    error!(cache.key = %cache_key, error = %e, "Cache write failed");
                }
            }
            Err(e) => {
                error!(cache.key = %cache_key, error = %e, "Failed to serialize value for cache");
            }
        }

        Ok(value)
    }

    /// Writes a value under the standard key convention.
    pub async fn put<T: Serialize>(
        &self,
        prefix: &str,
        key: &str,
        params: &CacheParams,
        value: &T,
        ttl: impl Into<Duration>,
    ) -> Result<(), CacheError> {
        let cache_key = get_key(prefix, key, params);
        let json = serde_json::to_string(value)?;
        self.store.set(&cache_key, json, ttl.into()).await
    }

    /// Reads a value; store failures and undecodable entries read as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        prefix: &str,
        key: &str,
        params: &CacheParams,
    ) -> Option<T> {
        let cache_key = get_key(prefix, key, params);

        match self.store.get(&cache_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    error!(cache.key = %cache_key, error = %e, "Failed to deserialize cached value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!(cache.key = %cache_key, error = %e, "Cache get error");
                None
            }
        }
    }

    /// Removes one entry, including any copies remembered under tags.
    /// Returns whether anything existed.
    pub async fn forget(&self, prefix: &str, key: &str, params: &CacheParams) -> bool {
        let cache_key = get_key(prefix, key, params);

        let result = async {
            let mut keys = self
                .store
                .scan_prefix(&format!("{}{}", cache_key, TAG_VERSION_MARK))
                .await?;
            keys.push(cache_key.clone());
            self.store.delete_many(&keys).await
        }
        .await;

        match result {
            Ok(removed) => removed > 0,
            Err(e) => {
                error!(cache.key = %cache_key, error = %e, "Cache forget error");
                false
            }
        }
    }

    /// Removes every `prefix:*` key, returning how many were removed.
    #[instrument(skip(self))]
    pub async fn clear_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let keys = self.store.scan_prefix(&format!("{}:", prefix)).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = self.store.delete_many(&keys).await?;
        info!(cache.prefix = %prefix, keys_count = removed, "Cleared cache for prefix");

        Ok(removed)
    }

    /// Flushes each tag: every entry remembered under it must be recomputed.
    #[instrument(skip(self))]
    pub async fn clear_by_tags(&self, tags: &[&str]) -> Result<(), CacheError> {
        for tag in tags {
            let tag_key = tag_key(tag);

            if let Some(entry) = self.read_tag(&tag_key).await? {
                let keys: Vec<String> = entry.keys.into_iter().collect();
                if let Err(e) = self.store.delete_many(&keys).await {
                    warn!(cache.tag = %tag, error = %e, "Failed to delete tagged entries");
                }
            }

            self.store.delete(&tag_key).await?;
        }

        info!(?tags, "Cleared cache for tags");
        Ok(())
    }

    /// Removes every key in the store namespace.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<u64, CacheError> {
        let keys = self.store.scan_prefix("").await?;
        let removed = self.store.delete_many(&keys).await?;
        info!(keys_count = removed, "Cache flushed");
        Ok(removed)
    }

    /// Repopulates every registered entry. One failing warmer never stops the
    /// others; each reports its own outcome.
    #[instrument(skip(self))]
    pub async fn warm_up(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();

        for warmer in self.warmers.iter() {
            let ok = match (warmer.produce)().await {
                Ok(value) => {
                    let key = get_key(&warmer.prefix, &warmer.key, &CacheParams::new());
                    match self
                        .put(&warmer.prefix, &warmer.key, &CacheParams::new(), &value, warmer.ttl)
                        .await
                    {
                        Ok(()) => {
                            debug!(cache.key = %key, "Warmed cache entry");
                            true
                        }
                        Err(e) => {
                            error!(cache.key = %key, error = %e, "Warm up write failed");
                            false
                        }
                    }
                }
                Err(e) => {
                    error!(warmer = %warmer.name, error = %e, "Warm up producer failed");
                    false
                }
            };
            results.insert(warmer.name.clone(), ok);
        }

        info!(?results, "Cache warm up completed");
        results
    }

    /// Store-level statistics; empty when the store cannot report them.
    pub async fn get_stats(&self) -> BTreeMap<String, String> {
        let info = match self.store.info().await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "Cache stats error");
                return BTreeMap::new();
            }
        };

        let field = |name: &str, default: &str| {
            info.get(name)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };
        let count = |name: &str| {
            info.get(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };

        let hits = count("keyspace_hits");
        let misses = count("keyspace_misses");

        let mut stats = BTreeMap::new();
        stats.insert("used_memory".into(), field("used_memory_human", "N/A"));
        stats.insert("used_memory_peak".into(), field("used_memory_peak_human", "N/A"));
        stats.insert("connected_clients".into(), count("connected_clients").to_string());
        stats.insert(
            "total_commands_processed".into(),
            count("total_commands_processed").to_string(),
        );
        stats.insert("keyspace_hits".into(), hits.to_string());
        stats.insert("keyspace_misses".into(), misses.to_string());
        stats.insert("hit_rate".into(), format!("{:.2}", hit_rate(hits, misses)));
        stats
    }

    /// Storage key for a tagged entry, creating tag versions as needed.
    ///
    /// The key stays under the entry's own prefix (`{cache_key}#t{hash}`) so
    /// prefix clears and [`forget`](Self::forget) reach tagged copies too.
    async fn tagged_key(&self, tags: &[&str], cache_key: &str) -> Result<String, CacheError> {
        let mut sorted: Vec<&str> = tags.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut hasher = Sha256::new();
        for tag in sorted {
            let version = self.tag_version(tag).await?;
            hasher.update(tag.as_bytes());
            hasher.update(b"=");
            hasher.update(version.as_bytes());
            hasher.update(b"|");
        }
        let digest = hasher.finalize();

        Ok(format!("{}{}{}", cache_key, TAG_VERSION_MARK, hex::encode(&digest[..16])))
    }

    async fn tag_version(&self, tag: &str) -> Result<String, CacheError> {
        let tag_key = tag_key(tag);

        if let Some(entry) = self.read_tag(&tag_key).await? {
            return Ok(entry.version);
        }

        let entry = TagEntry {
            version: Uuid::new_v4().to_string(),
            keys: BTreeSet::new(),
        };
        let json = serde_json::to_string(&entry)?;
        if self.store.add(&tag_key, json, Ttl::Extreme.as_duration()).await? {
            return Ok(entry.version);
        }

        // Another writer created it first
        self.read_tag(&tag_key)
            .await?
            .map(|e| e.version)
            .ok_or_else(|| CacheError::Unavailable(format!("tag {} vanished", tag)))
    }

    // Read-modify-write without a lock; a concurrent registration can drop a
    // key from the list, which only affects eager deletion, not visibility.
    async fn register_tags(
        &self,
        tags: &[&str],
        storage_key: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let lifetime = ttl.max(Ttl::Extreme.as_duration());

        for tag in tags {
            let tag_key = tag_key(tag);
            let Some(mut entry) = self.read_tag(&tag_key).await? else {
                continue;
            };
            if entry.keys.insert(storage_key.to_string()) {
                let json = serde_json::to_string(&entry)?;
                self.store.set(&tag_key, json, lifetime).await?;
            }
        }

        Ok(())
    }

    async fn read_tag(&self, tag_key: &str) -> Result<Option<TagEntry>, CacheError> {
        match self.store.get(tag_key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }
}

fn tag_key(tag: &str) -> String {
    format!("{}:{}", TAG_PREFIX, tag)
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    (hits as f64 / total as f64) * 100.0
}

fn record_hit(prefix: &str) {
    metrics::counter!("cache_hits_total", "prefix" => prefix.to_string()).increment(1);
}

fn record_miss(prefix: &str) {
    metrics::counter!("cache_misses_total", "prefix" => prefix.to_string()).increment(1);
}
