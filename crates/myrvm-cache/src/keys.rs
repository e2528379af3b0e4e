//! Cache key generation utilities.
//!
//! Every logical key is `prefix:key`, optionally followed by a hash of the
//! lookup parameters. Parameters live in a [`BTreeMap`], so they are always
//! canonicalized (sorted by name) before hashing and the order in which a
//! caller supplies them never changes cache identity.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Lookup parameters that distinguish otherwise identical keys.
pub type CacheParams = BTreeMap<String, Value>;

/// Prefix for reverse vending machine data.
pub const PREFIX_RVM: &str = "rvm";
/// Prefix for user data.
pub const PREFIX_USER: &str = "user";
/// Prefix for kiosk session records.
pub const PREFIX_SESSION: &str = "session";
/// Prefix for deposit data.
pub const PREFIX_DEPOSIT: &str = "deposit";
/// Prefix for aggregated analytics.
pub const PREFIX_ANALYTICS: &str = "analytics";
/// Prefix for application configuration snapshots.
pub const PREFIX_CONFIG: &str = "config";

/// Builds a cache key from a prefix, a logical key and lookup parameters.
pub fn get_key(prefix: &str, key: &str, params: &CacheParams) -> String {
    if params.is_empty() {
        format!("{}:{}", prefix, key)
    } else {
        format!("{}:{}:{}", prefix, key, hash_params(params))
    }
}

/// Generates a stable hash from lookup parameters.
///
/// SHA-256 over the canonical JSON encoding, truncated to 32 hex characters.
/// Unlike `DefaultHasher` the result is identical across processes, which
/// matters because every worker shares the same Redis keyspace.
pub fn hash_params(params: &CacheParams) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..16])
}

/// Builds [`CacheParams`] from name/value pairs.
///
/// # Example
///
/// ```ignore
/// let p = params([("status", json!("active")), ("limit", json!(10))]);
/// ```
pub fn params<I, K, V>(pairs: I) -> CacheParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Empty parameter set.
pub fn no_params() -> CacheParams {
    CacheParams::new()
}

/// Cache keys for reverse vending machine data.
pub mod rvm {
    pub const PREFIX: &str = super::PREFIX_RVM;

    /// Ordered list of all machines.
    pub const LIST: &str = "list";

    /// Key for the machine list.
    pub fn list() -> String {
        super::get_key(PREFIX, LIST, &super::no_params())
    }

    /// Key for a single machine by ID.
    pub fn by_id(id: impl std::fmt::Display) -> String {
        super::get_key(PREFIX, &format!("id:{}", id), &super::no_params())
    }
}

/// Cache keys for user data.
pub mod users {
    pub const PREFIX: &str = super::PREFIX_USER;

    /// Aggregate user counts.
    pub const STATS: &str = "stats";

    /// Key for the user statistics snapshot.
    pub fn stats() -> String {
        super::get_key(PREFIX, STATS, &super::no_params())
    }
}

/// Cache keys for application configuration.
pub mod config {
    pub const PREFIX: &str = super::PREFIX_CONFIG;

    /// Application settings snapshot.
    pub const APP: &str = "app";

    pub fn app() -> String {
        super::get_key(PREFIX, APP, &super::no_params())
    }
}

/// Cache keys for analytics snapshots.
pub mod analytics {
    pub const PREFIX: &str = super::PREFIX_ANALYTICS;

    /// Last computed session statistics.
    pub const SESSION_STATS: &str = "session_stats";

    pub fn session_stats() -> String {
        super::get_key(PREFIX, SESSION_STATS, &super::no_params())
    }
}

/// Cache keys for kiosk sessions.
pub mod sessions {
    use super::{PREFIX_SESSION, get_key, no_params};

    /// Key holding one session record.
    pub fn by_token(token: &str) -> String {
        get_key(PREFIX_SESSION, token, &no_params())
    }

    /// Prefix matched when scanning every session record.
    pub fn scan_prefix() -> String {
        format!("{}:", PREFIX_SESSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_without_params() {
        assert_eq!(get_key("rvm", "list", &no_params()), "rvm:list");
    }

    #[test]
    fn test_key_with_params_appends_hash() {
        let key = get_key("rvm", "list", &params([("status", json!("active"))]));
        let parts: Vec<&str> = key.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "rvm");
        assert_eq!(parts[1], "list");
        assert_eq!(parts[2].len(), 32);
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let a = params([("limit", json!(10)), ("status", json!("active"))]);
        let b = params([("status", json!("active")), ("limit", json!(10))]);
        assert_eq!(get_key("rvm", "list", &a), get_key("rvm", "list", &b));
    }

    #[test]
    fn test_different_params_different_keys() {
        let a = params([("limit", json!(10))]);
        let b = params([("limit", json!(20))]);
        assert_ne!(get_key("rvm", "list", &a), get_key("rvm", "list", &b));
    }

    #[test]
    fn test_hash_params_consistency() {
        let p = params([("user_id", json!(42)), ("page", json!(1))]);
        assert_eq!(hash_params(&p), hash_params(&p.clone()));
    }

    #[test]
    fn test_domain_key_helpers() {
        assert_eq!(rvm::list(), "rvm:list");
        assert_eq!(rvm::by_id(7), "rvm:id:7");
        assert_eq!(users::stats(), "user:stats");
        assert_eq!(config::app(), "config:app");
        assert_eq!(analytics::session_stats(), "analytics:session_stats");
    }

    #[test]
    fn test_session_keys() {
        assert_eq!(sessions::by_token("abc"), "session:abc");
        assert!(sessions::by_token("abc").starts_with(&sessions::scan_prefix()));
    }
}
