//! Redis store for distributed caching.
//!
//! Every physical key is namespaced (`{namespace}:{key}`) so the platform can
//! share a Redis instance; the namespace is stripped again from scan results.

use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::CacheError;
use crate::store::{CacheStore, ScanPrefix, ttl_secs};

/// GET-compare-SETEX in one server-side step.
static COMPARE_AND_SET: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
            return 1
        end
        return 0
        ",
    )
});

/// Redis store with a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Creates a new Redis store.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `namespace` - Prefix applied to every physical key
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Connection` if connection fails.
    pub async fn new(redis_url: &str, namespace: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn physical(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn logical<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }
}

impl CacheStore for RedisStore {
    #[instrument(skip(self), fields(cache.operation = "GET"))]
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.physical(key)).await?;
        debug!(cache.key = %key, cache.hit = value.is_some(), "Redis GET");
        Ok(value)
    }

    #[instrument(skip(self, value), fields(cache.operation = "SETEX"))]
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();

        conn.set_ex::<_, _, ()>(self.physical(key), value, ttl_secs(ttl))
            .await?;

        debug!(cache.key = %key, cache.ttl_secs = %ttl.as_secs(), "Cache set");

        Ok(())
    }

    #[instrument(skip(self, value), fields(cache.operation = "SET_NX"))]
    async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.physical(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    #[instrument(skip(self, expected, value), fields(cache.operation = "CAS"))]
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();

        let written: i64 = COMPARE_AND_SET
            .key(self.physical(key))
            .arg(expected)
            .arg(value)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await?;

        debug!(cache.key = %key, cache.written = written == 1, "Redis compare-and-set");
        Ok(written == 1)
    }

    #[instrument(skip(self), fields(cache.operation = "DEL"))]
    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();

        let removed: u64 = conn.del(self.physical(key)).await?;

        debug!(cache.key = %key, "Cache invalidated");

        Ok(removed > 0)
    }

    #[instrument(skip(self, keys), fields(cache.operation = "DEL", cache.keys = keys.len()))]
    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let physical: Vec<String> = keys.iter().map(|k| self.physical(k)).collect();
        let removed: u64 = conn.del(&physical).await?;

        Ok(removed)
    }

    #[instrument(skip(self), fields(cache.operation = "TTL"))]
    async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let mut conn = self.conn.clone();

        let ttl: i64 = conn.ttl(self.physical(key)).await?;

        // -1 (no expiry) or -2 (doesn't exist)
        Ok(u64::try_from(ttl).ok().filter(|t| *t > 0))
    }

    #[instrument(skip(self), fields(cache.operation = "EXPIRE"))]
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();

        let updated: bool = redis::cmd("EXPIRE")
            .arg(self.physical(key))
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(updated)
    }

    #[instrument(skip(self), fields(cache.operation = "INFO"))]
    async fn info(&self) -> Result<BTreeMap<String, String>, CacheError> {
        let mut conn = self.conn.clone();

        let raw: String = redis::cmd("INFO").query_async(&mut conn).await?;

        Ok(parse_info(&raw))
    }
}

impl ScanPrefix for RedisStore {
    /// Uses SCAN which is safe for production, but may be slow with many keys.
    #[instrument(skip(self), fields(cache.operation = "SCAN"))]
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_pattern(&self.physical(prefix)));
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            found.extend(keys.iter().filter_map(|k| self.logical(k)).map(String::from));

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        found.sort();
        found.dedup();

        debug!(cache.pattern = %pattern, cache.found = found.len(), "Prefix scan complete");

        Ok(found)
    }
}

/// Escapes glob metacharacters so a prefix is matched literally.
fn escape_pattern(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Parses the `field:value` lines of a Redis `INFO` reply.
fn parse_info(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
