//! Read-through caching for domain entities.
//!
//! An entity opts in by implementing [`Cacheable`]; data-access code then goes
//! through [`CacheService::entity`], which scopes every key to
//! `{prefix}:{entity}:…` so the whole entity namespace can be dropped in one
//! call after a write.

use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use tracing::{debug, warn};

use crate::keys::{CacheParams, no_params};
use crate::service::CacheService;
use crate::store::{CacheStore, ScanPrefix};
use crate::Ttl;

/// Cache identity of a domain entity.
pub trait Cacheable {
    /// Key prefix, usually one of the well-known prefixes in [`crate::keys`].
    const CACHE_PREFIX: &'static str;
    /// Lowercase entity name; second key segment.
    const ENTITY_NAME: &'static str;
    /// TTL for [`EntityCache::cached_get`] when the caller has no preference.
    const CACHE_TTL: Ttl = Ttl::Medium;
}

impl<S> CacheService<S>
where
    S: CacheStore + ScanPrefix,
{
    /// Entity-scoped view of the cache.
    pub fn entity<E: Cacheable>(&self) -> EntityCache<'_, S, E> {
        EntityCache {
            cache: self,
            _entity: PhantomData,
        }
    }
}

pub struct EntityCache<'a, S, E> {
    cache: &'a CacheService<S>,
    _entity: PhantomData<fn() -> E>,
}

impl<S, E> EntityCache<'_, S, E>
where
    S: CacheStore + ScanPrefix,
    E: Cacheable,
{
    fn scoped(key: &str) -> String {
        format!("{}:{}", E::ENTITY_NAME, key)
    }

    /// Namespace cleared by [`invalidate`](Self::invalidate).
    pub fn namespace() -> String {
        format!("{}:{}", E::CACHE_PREFIX, E::ENTITY_NAME)
    }

    pub async fn cached_get<T, Err, F, Fut>(
        &self,
        key: &str,
        params: &CacheParams,
        ttl: Option<Ttl>,
        producer: F,
    ) -> Result<T, Err>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Err>>,
    {
        self.cache
            .remember(
                E::CACHE_PREFIX,
                &Self::scoped(key),
                params,
                ttl.unwrap_or(E::CACHE_TTL),
                producer,
            )
            .await
    }

    pub async fn cached_get_with_tags<T, Err, F, Fut>(
        &self,
        key: &str,
        params: &CacheParams,
        tags: &[&str],
        ttl: Option<Ttl>,
        producer: F,
    ) -> Result<T, Err>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Err>>,
    {
        self.cache
            .remember_with_tags(
                E::CACHE_PREFIX,
                &Self::scoped(key),
                params,
                tags,
                ttl.unwrap_or(E::CACHE_TTL),
                producer,
            )
            .await
    }

    /// Single entity by id, cached for [`Ttl::Long`].
    pub async fn find_cached<T, Err, F, Fut>(&self, id: impl Display, producer: F) -> Result<T, Err>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Err>>,
    {
        self.cached_get(&format!("id:{}", id), &no_params(), Some(Ttl::Long), producer)
            .await
    }

    pub async fn count_cached<Err, F, Fut>(&self, params: &CacheParams, producer: F) -> Result<u64, Err>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, Err>>,
    {
        self.cached_get("count", params, Some(Ttl::Medium), producer)
            .await
    }

    pub async fn list_cached<T, Err, F, Fut>(&self, params: &CacheParams, producer: F) -> Result<Vec<T>, Err>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, Err>>,
    {
        self.cached_get("list", params, Some(Ttl::Medium), producer)
            .await
    }

    /// Pages change quickly, so they only live for [`Ttl::Short`].
    pub async fn paginate_cached<T, Err, F, Fut>(&self, params: &CacheParams, producer: F) -> Result<T, Err>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Err>>,
    {
        self.cached_get("paginate", params, Some(Ttl::Short), producer)
            .await
    }

    pub async fn forget(&self, key: &str, params: &CacheParams) -> bool {
        self.cache
            .forget(E::CACHE_PREFIX, &Self::scoped(key), params)
            .await
    }

    /// Drops every cached entry of this entity. Returns how many were removed.
    pub async fn invalidate(&self) -> u64 {
        let namespace = Self::namespace();
        match self.cache.clear_by_prefix(&namespace).await {
            Ok(removed) => {
                debug!(cache.prefix = %namespace, removed, "Entity cache invalidated");
                removed
            }
            Err(e) => {
                warn!(cache.prefix = %namespace, error = %e, "Entity cache invalidation failed");
                0
            }
        }
    }

    /// Runs a create/update/delete and invalidates the entity on success.
    pub async fn mutate<T, Err, Fut>(&self, op: Fut) -> Result<T, Err>
    where
        Fut: Future<Output = Result<T, Err>>,
    {
        let result = op.await;
        if result.is_ok() {
            self.invalidate().await;
        }
        result
    }
}

impl<S, E> Clone for EntityCache<'_, S, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, E> Copy for EntityCache<'_, S, E> {}
