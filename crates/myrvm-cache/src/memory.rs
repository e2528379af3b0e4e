//! Process-local store.
//!
//! Mirrors the Redis contract closely enough for the services (TTL, `SET NX`,
//! compare-and-set, prefix scans, hit/miss counters) without a server. Expiry
//! uses tokio's clock, so tests can pause and advance time.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::CacheError;
use crate::store::{CacheStore, ScanPrefix, ttl_secs};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

fn entry_bytes(key: &str, entry: &Entry) -> usize {
    key.len() + entry.value.len()
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    used_bytes: usize,
    peak_bytes: usize,
    hits: u64,
    misses: u64,
    commands: u64,
}

impl Inner {
    /// Returns the entry if it is still live, dropping it otherwise.
    fn live(&mut self, key: &str, now: Instant) -> Option<&Entry> {
        if self.entries.get(key).is_some_and(|e| e.expires_at <= now) {
            self.remove(key);
        }
        self.entries.get(key)
    }

    fn insert(&mut self, key: &str, value: String, ttl: Duration, now: Instant) {
        let entry = Entry {
            value,
            expires_at: now + Duration::from_secs(ttl_secs(ttl)),
        };
        self.used_bytes += entry_bytes(key, &entry);
        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            self.used_bytes -= entry_bytes(key, &old);
        }
        self.peak_bytes = self.peak_bytes.max(self.used_bytes);
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.used_bytes -= entry_bytes(key, &entry);
        Some(entry)
    }

    /// Drops every expired entry.
    fn prune(&mut self, now: Instant) {
        let mut freed = 0;
        self.entries.retain(|key, entry| {
            let keep = entry.expires_at > now;
            if !keep {
                freed += entry_bytes(key, entry);
            }
            keep
        });
        self.used_bytes -= freed;
    }
}

/// In-memory [`CacheStore`]; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, CacheError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| CacheError::Unavailable("memory store lock poisoned".into()))?;
        guard.commands += 1;
        Ok(guard)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .map(|inner| inner.entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut inner = self.lock()?;
        let value = inner.live(key, Instant::now()).map(|e| e.value.clone());
        if value.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.lock()?.insert(key, value, ttl, Instant::now());
        Ok(())
    }

    async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        if inner.live(key, now).is_some() {
            return Ok(false);
        }
        inner.insert(key, value, ttl, now);
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        if inner.live(key, now).is_none_or(|e| e.value != expected) {
            return Ok(false);
        }
        inner.insert(key, value, ttl, now);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        let existed = inner.live(key, now).is_some();
        inner.remove(key);
        Ok(existed)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        let mut removed = 0;
        for key in keys {
            if inner.live(key, now).is_some() {
                removed += 1;
            }
            inner.remove(key);
        }
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        Ok(inner
            .live(key, now)
            .map(|e| e.expires_at.saturating_duration_since(now).as_secs()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        if inner.live(key, now).is_none() {
            return Ok(false);
        }
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.expires_at = now + Duration::from_secs(ttl_secs(ttl));
        }
        Ok(true)
    }

    async fn info(&self) -> Result<BTreeMap<String, String>, CacheError> {
        let handles = Arc::strong_count(&self.inner);
        let inner = self.lock()?;
        let mut info = BTreeMap::new();
        info.insert("used_memory_human".into(), format!("{}B", inner.used_bytes));
        info.insert("used_memory_peak_human".into(), format!("{}B", inner.peak_bytes));
        info.insert("connected_clients".into(), handles.to_string());
        info.insert("total_commands_processed".into(), inner.commands.to_string());
        info.insert("keyspace_hits".into(), inner.hits.to_string());
        info.insert("keyspace_misses".into(), inner.misses.to_string());
        Ok(info)
    }
}

impl ScanPrefix for MemoryStore {
    /// Also prunes expired entries, the way Redis reclaims keys it touches.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut inner = self.lock()?;
        inner.prune(Instant::now());
        let mut keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
