use chrono::{DateTime, TimeDelta, Utc};
use myrvm_cache::keys::sessions;
use myrvm_cache::{CacheService, CacheStore, ScanPrefix};
use myrvm_config::SessionConfig;
use myrvm_core::UserId;
use rand::{Rng, distributions::Alphanumeric};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::model::{CleanupPreview, NewSession, SessionRecord, SessionStats, SessionStatus};

/// Length of a session token.
pub const SESSION_ID_LENGTH: usize = 40;

const MAX_TOKEN_ATTEMPTS: usize = 3;
const MAX_WRITE_ATTEMPTS: usize = 3;
const EVENT_CAPACITY: usize = 64;

/// Session lifecycle over the shared cache store.
#[derive(Clone)]
pub struct SessionService<S> {
    cache: CacheService<S>,
    config: Arc<SessionConfig>,
    events: broadcast::Sender<SessionEvent>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for SessionService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> SessionService<S>
where
    S: CacheStore + ScanPrefix,
{
    pub fn new(cache: CacheService<S>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache,
            config: Arc::new(config),
            events,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheService<S> {
        &self.cache
    }

    /// Receives every event published after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Creates a pending session with a fresh token.
    ///
    /// The record is written with `SET NX`, so two requests can never share a
    /// token; a collision draws a new one.
    ///
    /// # Errors
    ///
    /// * `StoreUnavailable` if the store cannot be written.
    /// * `Conflict` if every drawn token was already taken.
    #[instrument(skip(self, new), fields(rvm.id = ?new.rvm_id))]
    pub async fn create_session(&self, new: NewSession) -> Result<SessionRecord, SessionError> {
        let ttl = new.ttl.unwrap_or_else(|| self.config.default_ttl());
        let now = Utc::now();

        let mut record = SessionRecord {
            id: String::new(),
            rvm_id: new.rvm_id,
            status: SessionStatus::Active,
            user_id: None,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            data: new.data,
            ttl: ttl.as_secs(),
            created_at: now,
            last_activity: now,
            expires_at: expiry(now, ttl),
            claimed_at: None,
            activated_at: None,
            destroyed_at: None,
        };

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            record.id = generate_session_id();
            let json = serde_json::to_string(&record)?;

            if self
                .cache
                .store()
                .add(&sessions::by_token(&record.id), json, ttl)
                .await?
            {
                metrics::counter!("sessions_created_total").increment(1);
                info!(session.id = %record.id, session.ttl = record.ttl, "Session stored");
                return Ok(record);
            }

            warn!("Session token collision, drawing a new token");
        }

        Err(SessionError::Conflict(
            "could not allocate a unique session token".into(),
        ))
    }

    /// Binds `user_id` to a pending session.
    pub async fn claim_session(
        &self,
        session_id: &str,
        user_id: UserId,
    ) -> Result<SessionRecord, SessionError> {
        self.authorize_session(session_id, user_id, Map::new()).await
    }

    /// `active → authorized`: binds the user and merges `data` into the record.
    ///
    /// Claiming again as the same user returns the record unchanged. The write
    /// only lands on the record it was decided from, so of two simultaneous
    /// claims exactly one wins.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the session is absent, expired or destroyed.
    /// * `Conflict` if another user claimed it or it runs as a guest session.
    #[instrument(skip(self, data))]
    pub async fn authorize_session(
        &self,
        session_id: &str,
        user_id: UserId,
        data: Map<String, Value>,
    ) -> Result<SessionRecord, SessionError> {
        let outcome = self
            .transition(session_id, |record, now| {
                match (record.status, record.user_id) {
                    (status, _) if status.is_terminal() => {
                        return Err(SessionError::NotFound(session_id.to_string()));
                    }
                    (SessionStatus::Active, _) => {}
                    (SessionStatus::Authorized, Some(bound)) if bound == user_id => return Ok(None),
                    (SessionStatus::Authorized, _) => {
                        return Err(SessionError::Conflict(format!(
                            "session {} is already claimed by another user",
                            session_id
                        )));
                    }
                    (status, _) => {
                        return Err(SessionError::Conflict(format!(
                            "session {} is already {}",
                            session_id, status
                        )));
                    }
                }

                record.status = SessionStatus::Authorized;
                record.user_id = Some(user_id);
                record.claimed_at = Some(now);
                record.last_activity = now;
                record.data.extend(data.clone());
                Ok(Some(remaining(record, now)))
            })
            .await?;

        let Some((record, written)) = outcome else {
            return Err(SessionError::NotFound(session_id.to_string()));
        };

        if written {
            info!(session.id = %session_id, user.id = %user_id, "Session authorized");
            self.publish(SessionEvent::Authorized {
                rvm_id: record.rvm_id,
                session_id: record.id.clone(),
                user_id,
                timestamp: record.last_activity,
            });
        }

        Ok(record)
    }

    /// `active → guest_active`: the kiosk proceeds without a user (donation
    /// mode). Same error rules as [`authorize_session`](Self::authorize_session).
    #[instrument(skip(self))]
    pub async fn activate_guest_session(
        &self,
        session_id: &str,
    ) -> Result<SessionRecord, SessionError> {
        let outcome = self
            .transition(session_id, |record, now| {
                match record.status {
                    status if status.is_terminal() => {
                        return Err(SessionError::NotFound(session_id.to_string()));
                    }
                    SessionStatus::Active => {}
                    SessionStatus::GuestActive => return Ok(None),
                    other => {
                        return Err(SessionError::Conflict(format!(
                            "session {} is already {}",
                            session_id, other
                        )));
                    }
                }

                record.status = SessionStatus::GuestActive;
                record.activated_at = Some(now);
                record.last_activity = now;
                Ok(Some(remaining(record, now)))
            })
            .await?;

        let Some((record, written)) = outcome else {
            return Err(SessionError::NotFound(session_id.to_string()));
        };

        if written {
            info!(session.id = %session_id, "Guest session activated");
            self.publish(SessionEvent::GuestActivated {
                rvm_id: record.rvm_id,
                session_id: record.id.clone(),
                timestamp: record.last_activity,
            });
        }

        Ok(record)
    }

    /// Reads a session without touching it.
    ///
    /// A record past its embedded expiry is reported as `expired`.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        self.load(session_id)
            .await?
            .map(|record| record.observed_at(Utc::now()))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Every decodable session, oldest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SessionError> {
        let now = Utc::now();
        let mut records: Vec<SessionRecord> = self
            .scan()
            .await?
            .into_iter()
            .filter_map(|(_, record)| record)
            .map(|record| record.observed_at(now))
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Sessions bound to `user_id`.
    ///
    /// Scans the whole session keyspace; an unreachable store yields an empty
    /// list.
    #[instrument(skip(self))]
    pub async fn get_user_sessions(&self, user_id: UserId) -> Vec<SessionRecord> {
        match self.list_sessions().await {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.user_id == Some(user_id))
                .collect(),
            Err(e) => {
                warn!(user.id = %user_id, error = %e, "Get user sessions error");
                Vec::new()
            }
        }
    }

    /// Removes the record outright. Returns whether it existed.
    #[instrument(skip(self))]
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let existed = self
            .cache
            .store()
            .delete(&sessions::by_token(session_id))
            .await?;
        debug!(session.id = %session_id, existed, "Session deleted");
        Ok(existed)
    }

    /// Marks the session `destroyed` and keeps the record readable for the
    /// configured retention window.
    ///
    /// Returns `false` if there was nothing to destroy. Expired and destroyed
    /// records are left as they are.
    #[instrument(skip(self))]
    pub async fn destroy_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let retention = self.config.destroyed_retention();
        let outcome = self
            .transition(session_id, |record, now| {
                if record.status.is_terminal() {
                    return Ok(None);
                }
                record.status = SessionStatus::Destroyed;
                record.destroyed_at = Some(now);
                record.ttl = retention.as_secs();
                record.expires_at = expiry(now, retention);
                Ok(Some(retention))
            })
            .await?;

        let Some((record, written)) = outcome else {
            return Ok(false);
        };

        if written {
            info!(session.id = %session_id, "Session destroyed");
            self.publish(SessionEvent::Destroyed {
                rvm_id: record.rvm_id,
                session_id: record.id.clone(),
                timestamp: record.destroyed_at.unwrap_or_else(Utc::now),
            });
        }

        Ok(true)
    }

    /// Lists what [`cleanup_expired_sessions`](Self::cleanup_expired_sessions)
    /// would remove, without removing anything.
    pub async fn preview_cleanup(&self) -> Result<CleanupPreview, SessionError> {
        let now = Utc::now();
        let mut preview = CleanupPreview::default();

        for (id, record) in self.scan().await? {
            match record {
                None => preview.undecodable.push(id),
                Some(record) if record.is_expired_at(now) => preview.expired.push(id),
                Some(_) => {}
            }
        }

        Ok(preview)
    }

    /// Removes undecodable records and records past their embedded expiry.
    ///
    /// Only entries actually deleted are counted, so an immediate second run
    /// returns 0.
    #[instrument(skip(self))]
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, SessionError> {
        let preview = self.preview_cleanup().await?;
        let keys: Vec<String> = preview
            .expired
            .iter()
            .chain(preview.undecodable.iter())
            .map(|id| sessions::by_token(id))
            .collect();

        let cleaned = self.cache.store().delete_many(&keys).await?;
        info!(cleaned_sessions = cleaned, "Session cleanup completed");
        Ok(cleaned)
    }

    /// Aggregates over every stored session, `None` if the store is
    /// unreachable.
    #[instrument(skip(self))]
    pub async fn get_session_stats(&self) -> Option<SessionStats> {
        let records = match self.list_sessions().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Get session stats error");
                return None;
            }
        };

        let mut stats = SessionStats::default();
        let mut total_duration: i64 = 0;

        for record in &records {
            stats.total_sessions += 1;
            match record.status {
                SessionStatus::Active => stats.active_sessions += 1,
                SessionStatus::Authorized => stats.authorized_sessions += 1,
                SessionStatus::GuestActive => stats.guest_active_sessions += 1,
                SessionStatus::Expired => stats.expired_sessions += 1,
                SessionStatus::Destroyed => stats.destroyed_sessions += 1,
            }

            if record.user_id.is_some() {
                stats.user_sessions += 1;
            } else {
                stats.guest_sessions += 1;
            }

            total_duration += record.duration_secs();

            *stats
                .sessions_by_hour
                .entry(record.created_at.format("%H").to_string())
                .or_default() += 1;
        }

        if !records.is_empty() {
            stats.average_session_duration =
                (total_duration as f64 / records.len() as f64).round() as u64;
        }

        Some(stats)
    }

    /// Checks the request's IP and user agent against the session binding.
    ///
    /// An unset binding is set from this request. On mismatch the session is
    /// destroyed. Absent, expired and destroyed sessions fail.
    #[instrument(skip(self, user_agent))]
    pub async fn validate_session_security(
        &self,
        session_id: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> bool {
        let outcome = self
            .transition(session_id, |record, now| {
                if record.status.is_terminal() {
                    return Ok(None);
                }

                let mut bound = false;

                match record.ip_address.as_deref() {
                    Some(expected) if expected != ip_address => {
                        warn!(
                            session.id = %session_id,
                            expected_ip = %expected,
                            actual_ip = %ip_address,
                            "Session IP mismatch"
                        );
                        return Err(SessionError::SecurityViolation);
                    }
                    Some(_) => {}
                    None => {
                        record.ip_address = Some(ip_address.to_string());
                        bound = true;
                    }
                }

                match record.user_agent.as_deref() {
                    Some(expected) if expected != user_agent => {
                        warn!(
                            session.id = %session_id,
                            expected_ua = %expected,
                            actual_ua = %user_agent,
                            "Session user agent mismatch"
                        );
                        return Err(SessionError::SecurityViolation);
                    }
                    Some(_) => {}
                    None => {
                        record.user_agent = Some(user_agent.to_string());
                        bound = true;
                    }
                }

                if !bound {
                    return Ok(None);
                }
                Ok(Some(remaining(record, now)))
            })
            .await;

        match outcome {
            Ok(Some((record, _))) if record.status.is_terminal() => {
                debug!(session.id = %session_id, status = %record.status, "Session no longer usable");
                false
            }
            Ok(Some((_, bound))) => {
                if bound {
                    debug!(session.id = %session_id, "Session binding set");
                }
                true
            }
            Ok(None) => false,
            Err(SessionError::SecurityViolation) => self.reject(session_id).await,
            Err(e) => {
                error!(session.id = %session_id, error = %e, "Session security validation error");
                false
            }
        }
    }

    async fn reject(&self, session_id: &str) -> bool {
        metrics::counter!("session_security_failures_total").increment(1);
        if let Err(e) = self.destroy_session(session_id).await {
            error!(session.id = %session_id, error = %e, "Failed to destroy session");
        }
        false
    }

    /// Seconds until the store evicts the session, 0 if absent.
    pub async fn get_session_ttl(&self, session_id: &str) -> u64 {
        match self.cache.store().ttl(&sessions::by_token(session_id)).await {
            Ok(ttl) => ttl.unwrap_or(0),
            Err(e) => {
                error!(session.id = %session_id, error = %e, "Session TTL error");
                0
            }
        }
    }

    /// Sliding renewal: the session now has exactly `new_ttl` left.
    ///
    /// Returns `false` for absent, expired and destroyed sessions.
    #[instrument(skip(self, new_ttl))]
    pub async fn extend_session(
        &self,
        session_id: &str,
        new_ttl: impl Into<Duration>,
    ) -> Result<bool, SessionError> {
        let new_ttl = new_ttl.into();
        let outcome = self
            .transition(session_id, |record, now| {
                if record.status.is_terminal() {
                    return Ok(None);
                }
                record.ttl = new_ttl.as_secs();
                record.last_activity = now;
                record.expires_at = expiry(now, new_ttl);
                Ok(Some(new_ttl))
            })
            .await?;

        let extended = matches!(outcome, Some((_, true)));
        if extended {
            debug!(session.id = %session_id, session.ttl = new_ttl.as_secs(), "Session extended");
        }
        Ok(extended)
    }

    /// Records activity without changing the remaining lifetime.
    pub async fn touch_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let outcome = self
            .transition(session_id, |record, now| {
                if record.status.is_terminal() {
                    return Ok(None);
                }
                record.last_activity = now;
                Ok(Some(remaining(record, now)))
            })
            .await?;

        Ok(matches!(outcome, Some((_, true))))
    }

    /// Deletes every session record.
    #[instrument(skip(self))]
    pub async fn clear_all_sessions(&self) -> Result<u64, SessionError> {
        let keys = self
            .cache
            .store()
            .scan_prefix(&sessions::scan_prefix())
            .await?;
        let removed = self.cache.store().delete_many(&keys).await?;
        info!(removed, "All sessions cleared");
        Ok(removed)
    }

    /// Deletes every session bound to `user_id`.
    #[instrument(skip(self))]
    pub async fn clear_user_sessions(&self, user_id: UserId) -> Result<u64, SessionError> {
        let keys: Vec<String> = self
            .list_sessions()
            .await?
            .into_iter()
            .filter(|r| r.user_id == Some(user_id))
            .map(|r| sessions::by_token(&r.id))
            .collect();
        let removed = self.cache.store().delete_many(&keys).await?;
        info!(user.id = %user_id, removed, "User sessions cleared");
        Ok(removed)
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.load_raw(session_id).await?.map(|(_, record)| record))
    }

    /// The stored JSON alongside its decoded record.
    async fn load_raw(
        &self,
        session_id: &str,
    ) -> Result<Option<(String, SessionRecord)>, SessionError> {
        match self
            .cache
            .store()
            .get(&sessions::by_token(session_id))
            .await?
        {
            Some(raw) => {
                let record = serde_json::from_str(&raw)?;
                Ok(Some((raw, record)))
            }
            None => Ok(None),
        }
    }

    /// Read-modify-write of one record.
    ///
    /// `apply` sees the record as observed now and returns the TTL to write it
    /// with, or `None` to leave it untouched. The write is a compare-and-set
    /// against the JSON that was read; if another writer got there first the
    /// record is read and `apply` run again. Gives up with `Conflict`.
    ///
    /// Yields `None` for an absent session, otherwise the resulting record and
    /// whether it was written.
    async fn transition<F>(
        &self,
        session_id: &str,
        mut apply: F,
    ) -> Result<Option<(SessionRecord, bool)>, SessionError>
    where
        F: FnMut(&mut SessionRecord, DateTime<Utc>) -> Result<Option<Duration>, SessionError>,
    {
        let key = sessions::by_token(session_id);

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let now = Utc::now();
            let Some((raw, record)) = self.load_raw(session_id).await? else {
                return Ok(None);
            };
            let mut record = record.observed_at(now);

            let Some(ttl) = apply(&mut record, now)? else {
                return Ok(Some((record, false)));
            };

            let json = serde_json::to_string(&record)?;
            if self
                .cache
                .store()
                .compare_and_set(&key, &raw, json, ttl)
                .await?
            {
                return Ok(Some((record, true)));
            }

            debug!(session.id = %session_id, "Session changed during update, re-reading");
        }

        metrics::counter!("session_write_conflicts_total").increment(1);
        Err(SessionError::Conflict(format!(
            "session {} is being modified concurrently",
            session_id
        )))
    }

    /// `(session id, record)` for every stored key; `None` marks a record
    /// that could not be decoded. Keys evicted mid-scan are skipped.
    async fn scan(&self) -> Result<Vec<(String, Option<SessionRecord>)>, SessionError> {
        let prefix = sessions::scan_prefix();
        let keys = self.cache.store().scan_prefix(&prefix).await?;
        let mut found = Vec::with_capacity(keys.len());

        for key in keys {
            let Some(raw) = self.cache.store().get(&key).await? else {
                continue;
            };
            let id = key.strip_prefix(prefix.as_str()).unwrap_or(&key).to_string();
            let record = match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(session.id = %id, error = %e, "Undecodable session record");
                    None
                }
            };
            found.push((id, record));
        }

        Ok(found)
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No session event subscribers");
        }
    }
}

/// Draws a new 40-character alphanumeric token from the thread CSPRNG.
pub fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Whatever lifetime the record has left, at least one second.
fn remaining(record: &SessionRecord, now: DateTime<Utc>) -> Duration {
    Duration::from_secs(record.remaining_at(now).max(1))
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use myrvm_cache::{CacheError, MemoryStore};
    use myrvm_core::RvmId;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn service() -> SessionService<MemoryStore> {
        SessionService::new(
            CacheService::new(MemoryStore::new()),
            SessionConfig::default(),
        )
    }

    async fn kiosk_session(service: &SessionService<MemoryStore>) -> SessionRecord {
        service
            .create_session(NewSession::for_rvm(RvmId::new(7)))
            .await
            .unwrap()
    }

    async fn store_raw(service: &SessionService<MemoryStore>, record: &SessionRecord) {
        service
            .cache()
            .store()
            .set(
                &sessions::by_token(&record.id),
                serde_json::to_string(record).unwrap(),
                Duration::from_secs(600),
            )
            .await
            .unwrap();
    }

    /// Memory store that lets one queued rival write land just before the
    /// next compare-and-set, like a second request winning the race.
    #[derive(Clone, Debug, Default)]
    struct RacingStore {
        inner: MemoryStore,
        rival: Arc<Mutex<Option<(String, String)>>>,
    }

    impl RacingStore {
        fn queue_rival(&self, record: &SessionRecord) {
            let json = serde_json::to_string(record).unwrap();
            *self.rival.lock().unwrap() = Some((sessions::by_token(&record.id), json));
        }
    }

    impl CacheStore for RacingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            self.inner.set(key, value, ttl).await
        }

        async fn add(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
            self.inner.add(key, value, ttl).await
        }

        async fn compare_and_set(
            &self,
            key: &str,
            expected: &str,
            value: String,
            ttl: Duration,
        ) -> Result<bool, CacheError> {
            let rival = self.rival.lock().unwrap().take();
            if let Some((rival_key, rival_value)) = rival {
                self.inner.set(&rival_key, rival_value, ttl).await?;
            }
            self.inner.compare_and_set(key, expected, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool, CacheError> {
            self.inner.delete(key).await
        }

        async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
            self.inner.delete_many(keys).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<u64>, CacheError> {
            self.inner.ttl(key).await
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
            self.inner.expire(key, ttl).await
        }

        async fn info(&self) -> Result<BTreeMap<String, String>, CacheError> {
            self.inner.info().await
        }
    }

    impl ScanPrefix for RacingStore {
        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
            self.inner.scan_prefix(prefix).await
        }
    }

    /// Store that refuses every call.
    #[derive(Clone, Debug)]
    struct DownStore;

    fn refused() -> CacheError {
        CacheError::Unavailable("connection refused".into())
    }

    impl CacheStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(refused())
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(refused())
        }

        async fn add(&self, _key: &str, _value: String, _ttl: Duration) -> Result<bool, CacheError> {
            Err(refused())
        }

        async fn compare_and_set(
            &self,
            _key: &str,
            _expected: &str,
            _value: String,
            _ttl: Duration,
        ) -> Result<bool, CacheError> {
            Err(refused())
        }

        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(refused())
        }

        async fn delete_many(&self, _keys: &[String]) -> Result<u64, CacheError> {
            Err(refused())
        }

        async fn ttl(&self, _key: &str) -> Result<Option<u64>, CacheError> {
            Err(refused())
        }

        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, CacheError> {
            Err(refused())
        }

        async fn info(&self) -> Result<BTreeMap<String, String>, CacheError> {
            Err(refused())
        }
    }

    impl ScanPrefix for DownStore {
        async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>, CacheError> {
            Err(refused())
        }
    }

    fn racing_service(store: &RacingStore) -> SessionService<RacingStore> {
        SessionService::new(CacheService::new(store.clone()), SessionConfig::default())
    }

    #[test]
    fn test_generate_session_id() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_session_id());
    }

    #[tokio::test]
    async fn test_create_session_is_pending() {
        let service = service();
        let record = kiosk_session(&service).await;

        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(record.ttl, 600);
        assert_eq!(record.user_id, None);

        let stored = service.get_session(&record.id).await.unwrap();
        assert_eq!(stored, record);
        assert!(service.get_session_ttl(&record.id).await > 590);
    }

    #[tokio::test]
    async fn test_claim_by_other_user_conflicts() {
        let service = service();
        let record = kiosk_session(&service).await;

        service.claim_session(&record.id, UserId::new(42)).await.unwrap();
        let again = service.claim_session(&record.id, UserId::new(42)).await.unwrap();
        assert_eq!(again.user_id, Some(UserId::new(42)));

        let err = service
            .claim_session(&record.id, UserId::new(43))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));

        let stored = service.get_session(&record.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Authorized);
        assert_eq!(stored.user_id, Some(UserId::new(42)));
    }

    #[tokio::test]
    async fn test_authorize_merges_data_and_publishes() {
        let service = service();
        let mut events = service.subscribe();
        let record = kiosk_session(&service).await;

        let mut data = Map::new();
        data.insert("user_name".into(), json!("Ayu"));
        let authorized = service
            .authorize_session(&record.id, UserId::new(42), data)
            .await
            .unwrap();
        assert_eq!(authorized.data.get("user_name"), Some(&json!("Ayu")));
        assert!(authorized.claimed_at.is_some());

        let event = events.recv().await.unwrap();
        assert_eq!(event.name(), "session.authorized");
        assert_eq!(event.channel().as_deref(), Some("rvm.7"));
    }

    #[tokio::test]
    async fn test_claim_missing_session_not_found() {
        let service = service();
        let err = service
            .claim_session("missing", UserId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_guest_activation_blocks_claim() {
        let service = service();
        let record = kiosk_session(&service).await;

        let guest = service.activate_guest_session(&record.id).await.unwrap();
        assert_eq!(guest.status, SessionStatus::GuestActive);
        assert_eq!(guest.user_id, None);

        let err = service
            .claim_session(&record.id, UserId::new(42))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_security_binds_then_rejects_mismatch() {
        let service = service();
        let record = kiosk_session(&service).await;

        assert!(service.validate_session_security(&record.id, "10.0.0.5", "kiosk/1.0").await);
        assert!(service.validate_session_security(&record.id, "10.0.0.5", "kiosk/1.0").await);

        let bound = service.get_session(&record.id).await.unwrap();
        assert_eq!(bound.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(bound.user_agent.as_deref(), Some("kiosk/1.0"));

        assert!(!service.validate_session_security(&record.id, "10.0.0.9", "kiosk/1.0").await);
        let destroyed = service.get_session(&record.id).await.unwrap();
        assert_eq!(destroyed.status, SessionStatus::Destroyed);
        assert!(destroyed.destroyed_at.is_some());
        assert!(service.get_session_ttl(&record.id).await <= 60);

        // no way back from destroyed
        assert!(!service.validate_session_security(&record.id, "10.0.0.5", "kiosk/1.0").await);
    }

    #[tokio::test]
    async fn test_user_agent_mismatch_destroys() {
        let service = service();
        let record = service
            .create_session(
                NewSession::for_rvm(RvmId::new(1))
                    .ip_address("10.0.0.5")
                    .user_agent("kiosk/1.0"),
            )
            .await
            .unwrap();

        assert!(!service.validate_session_security(&record.id, "10.0.0.5", "curl/8").await);
        assert_eq!(
            service.get_session(&record.id).await.unwrap().status,
            SessionStatus::Destroyed
        );
    }

    #[tokio::test]
    async fn test_extend_resets_ttl() {
        let service = service();
        let record = kiosk_session(&service).await;

        assert!(service.extend_session(&record.id, Duration::from_secs(300)).await.unwrap());
        let ttl = service.get_session_ttl(&record.id).await;
        assert!(ttl > 295 && ttl <= 300, "ttl was {ttl}");
        assert_eq!(service.get_session(&record.id).await.unwrap().ttl, 300);

        assert!(!service.extend_session("missing", Duration::from_secs(300)).await.unwrap());
    }

    #[tokio::test]
    async fn test_touch_keeps_remaining_lifetime() {
        let service = service();
        let record = service
            .create_session(NewSession::default().ttl(Duration::from_secs(90)))
            .await
            .unwrap();

        assert!(service.touch_session(&record.id).await.unwrap());
        let ttl = service.get_session_ttl(&record.id).await;
        assert!(ttl > 85 && ttl <= 90, "ttl was {ttl}");
    }

    #[tokio::test]
    async fn test_expired_record_reported_and_cleaned_once() {
        let service = service();
        let live = kiosk_session(&service).await;

        let mut stale = kiosk_session(&service).await;
        stale.expires_at = Utc::now() - TimeDelta::seconds(5);
        store_raw(&service, &stale).await;

        service
            .cache()
            .store()
            .set(&sessions::by_token("garbage"), "not json".into(), Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(
            service.get_session(&stale.id).await.unwrap().status,
            SessionStatus::Expired
        );
        assert!(matches!(
            service.claim_session(&stale.id, UserId::new(1)).await,
            Err(SessionError::NotFound(_))
        ));

        let preview = service.preview_cleanup().await.unwrap();
        assert_eq!(preview.expired, vec![stale.id.clone()]);
        assert_eq!(preview.undecodable, vec!["garbage".to_string()]);

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 2);
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
        assert!(service.get_session(&live.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_user_sessions_and_clear() {
        let service = service();
        let a = kiosk_session(&service).await;
        let b = kiosk_session(&service).await;
        let c = kiosk_session(&service).await;

        service.claim_session(&a.id, UserId::new(42)).await.unwrap();
        service.claim_session(&b.id, UserId::new(42)).await.unwrap();
        service.claim_session(&c.id, UserId::new(7)).await.unwrap();

        let sessions = service.get_user_sessions(UserId::new(42)).await;
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Authorized));

        assert_eq!(service.clear_user_sessions(UserId::new(42)).await.unwrap(), 2);
        assert!(service.get_user_sessions(UserId::new(42)).await.is_empty());
        assert_eq!(service.clear_all_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_stats() {
        let service = service();
        let a = kiosk_session(&service).await;
        let b = kiosk_session(&service).await;
        kiosk_session(&service).await;

        service.claim_session(&a.id, UserId::new(42)).await.unwrap();
        service.activate_guest_session(&b.id).await.unwrap();

        let stats = service.get_session_stats().await.unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.authorized_sessions, 1);
        assert_eq!(stats.guest_active_sessions, 1);
        assert_eq!(stats.user_sessions, 1);
        assert_eq!(stats.guest_sessions, 2);
        assert_eq!(stats.sessions_by_hour.values().sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn test_claim_racing_another_claim_conflicts() {
        let store = RacingStore::default();
        let service = racing_service(&store);
        let record = service
            .create_session(NewSession::for_rvm(RvmId::new(7)))
            .await
            .unwrap();

        let mut rival = record.clone();
        rival.status = SessionStatus::Authorized;
        rival.user_id = Some(UserId::new(43));
        rival.claimed_at = Some(Utc::now());
        store.queue_rival(&rival);

        let err = service
            .claim_session(&record.id, UserId::new(42))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));

        let stored = service.get_session(&record.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Authorized);
        assert_eq!(stored.user_id, Some(UserId::new(43)));
    }

    #[tokio::test]
    async fn test_claim_retries_after_unrelated_write() {
        let store = RacingStore::default();
        let service = racing_service(&store);
        let mut events = service.subscribe();
        let record = service
            .create_session(NewSession::for_rvm(RvmId::new(7)))
            .await
            .unwrap();

        let mut touched = record.clone();
        touched.ip_address = Some("10.0.0.5".into());
        store.queue_rival(&touched);

        let claimed = service.claim_session(&record.id, UserId::new(42)).await.unwrap();
        assert_eq!(claimed.user_id, Some(UserId::new(42)));
        assert_eq!(claimed.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(events.recv().await.unwrap().name(), "session.authorized");
    }

    #[tokio::test]
    async fn test_guest_activation_racing_claim_conflicts() {
        let store = RacingStore::default();
        let service = racing_service(&store);
        let record = service
            .create_session(NewSession::for_rvm(RvmId::new(7)))
            .await
            .unwrap();

        let mut rival = record.clone();
        rival.status = SessionStatus::Authorized;
        rival.user_id = Some(UserId::new(42));
        store.queue_rival(&rival);

        let err = service.activate_guest_session(&record.id).await.unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
        assert_eq!(
            service.get_session(&record.id).await.unwrap().user_id,
            Some(UserId::new(42))
        );
    }

    #[tokio::test]
    async fn test_destroy_leaves_expired_record_expired() {
        let service = service();
        let mut events = service.subscribe();
        let mut stale = kiosk_session(&service).await;
        stale.expires_at = Utc::now() - TimeDelta::seconds(5);
        store_raw(&service, &stale).await;

        assert!(service.destroy_session(&stale.id).await.unwrap());

        let stored = service.get_session(&stale.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);
        assert_eq!(stored.destroyed_at, None);
        assert!(service.get_session_ttl(&stale.id).await > 590);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_store_outage() {
        let service = SessionService::new(CacheService::new(DownStore), SessionConfig::default());

        assert!(matches!(
            service.create_session(NewSession::for_rvm(RvmId::new(7))).await,
            Err(SessionError::StoreUnavailable(_))
        ));
        assert!(matches!(
            service.claim_session("abc", UserId::new(42)).await,
            Err(SessionError::StoreUnavailable(_))
        ));
        assert!(matches!(
            service.destroy_session("abc").await,
            Err(SessionError::StoreUnavailable(_))
        ));

        assert!(service.get_user_sessions(UserId::new(42)).await.is_empty());
        assert!(service.get_session_stats().await.is_none());
        assert_eq!(service.get_session_ttl("abc").await, 0);
        assert!(!service.validate_session_security("abc", "10.0.0.5", "kiosk/1.0").await);
    }

    #[tokio::test]
    async fn test_delete_and_destroy_missing() {
        let service = service();
        let record = kiosk_session(&service).await;

        assert!(service.delete_session(&record.id).await.unwrap());
        assert!(!service.delete_session(&record.id).await.unwrap());
        assert!(!service.destroy_session(&record.id).await.unwrap());
        assert_eq!(service.get_session_ttl(&record.id).await, 0);
        assert!(matches!(
            service.get_session(&record.id).await,
            Err(SessionError::NotFound(_))
        ));
    }
}
