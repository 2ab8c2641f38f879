//! Issues, resolves, refreshes and revokes sessions.
//!
//! The store is the source of truth: a token whose signature checks out but
//! which has no record is not a session. Signing with a secret held only in
//! the record makes deleting the record the whole of revocation.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    config::SessionTtl,
    models::session::{Grant, IssuedSession, SessionPayload, SessionRecord},
    repositories::session_store::{SessionStore, StoreError},
    services::session_cache::{CachedSession, SessionCacheTrait},
    types::UserId,
    utils::{
        jwt::{generate_session_secret, sign_session_token, verify_session_token, TokenError},
        time::{Clock, SystemClock},
    },
};

const MAX_ISSUE_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    SessionNotFound,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("could not record a unique session token")]
    Conflict,
    #[error("session store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl SessionError {
    /// Failures a caller may retry; everything else means "not a session".
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::StoreUnavailable(_) | SessionError::Conflict)
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => SessionError::SessionNotFound,
            StoreError::Conflict => SessionError::Conflict,
            StoreError::Unavailable(source) => SessionError::StoreUnavailable(source),
        }
    }
}

/// What a grant sweep did to a user's sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub examined: usize,
    /// Sessions given a pending payload.
    pub marked: usize,
    /// Sessions whose stale pending payload was dropped.
    pub cleared: usize,
    /// Sessions already matching the requested grants.
    pub unchanged: usize,
    /// Expired or unverifiable sessions left alone.
    pub skipped: usize,
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: Option<Arc<dyn SessionCacheTrait>>,
    clock: Arc<dyn Clock>,
    ttl: SessionTtl,
    cache_ttl_seconds: u64,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, ttl: SessionTtl) -> Self {
        Self {
            store,
            cache: None,
            clock: Arc::new(SystemClock),
            ttl,
            cache_ttl_seconds: 0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SessionCacheTrait>, ttl_seconds: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Signs `payload` with a fresh secret and records the session. The token
    /// is only handed out once its record exists.
    pub async fn issue(&self, payload: &SessionPayload) -> Result<IssuedSession, SessionError> {
        let ttl_seconds = self.ttl.for_session(payload.persistent);

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let secret = generate_session_secret();
            let issued = sign_session_token(payload, &secret, ttl_seconds, self.clock.now())?;
            let record = SessionRecord {
                token: issued.token.clone(),
                secret,
                user_id: payload.user_id,
                expires_at: issued.expires_at,
                pending_payload: None,
            };

            match self.store.insert(&record).await {
                Ok(()) => {
                    tracing::info!(
                        user_id = %payload.user_id,
                        persistent = payload.persistent,
                        expires_at = %issued.expires_at,
                        "Session issued"
                    );
                    return Ok(issued);
                }
                Err(StoreError::Conflict) => {
                    tracing::warn!(attempt, "Session token collision, re-signing with a new secret");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(SessionError::Conflict)
    }

    pub async fn resolve(&self, token: &str) -> Result<SessionPayload, SessionError> {
        if let Some(cached) = self.cached(token).await {
            if self.clock.now().timestamp() > cached.expires_at.timestamp() {
                return Err(TokenError::Expired.into());
            }
            return Ok(cached.payload);
        }

        let record = self.store.find_by_token(token).await?;
        let payload = verify_session_token(token, &record.secret, self.clock.now())?;
        if record.pending_payload.is_none() {
            self.remember(token, &payload, record.expires_at).await;
        }
        Ok(payload)
    }

    /// Replacement payload left by a grant sweep, if any. Read only.
    pub async fn check_pending_refresh(
        &self,
        token: &str,
    ) -> Result<Option<SessionPayload>, SessionError> {
        if self.cached(token).await.is_some() {
            return Ok(None);
        }
        let record = self.store.find_by_token(token).await?;
        Ok(record.pending_payload)
    }

    /// Replaces `old_token` with a session for `payload`.
    ///
    /// The new session is recorded before the old one is deleted: a failure in
    /// between leaves two valid sessions rather than none.
    pub async fn refresh(
        &self,
        old_token: &str,
        payload: &SessionPayload,
    ) -> Result<IssuedSession, SessionError> {
        let issued = self.issue(payload).await?;

        if let Err(err) = self.store.delete(old_token).await {
            tracing::warn!(
                user_id = %payload.user_id,
                error = %err,
                "Refreshed session but could not delete the previous one; it stays valid until expiry"
            );
        }
        if let Err(err) = self.forget(old_token).await {
            tracing::warn!(
                user_id = %payload.user_id,
                error = %err,
                "Could not evict refreshed session from cache"
            );
        }

        tracing::info!(user_id = %payload.user_id, "Session refreshed");
        Ok(issued)
    }

    /// Deletes the session. Unknown or already revoked tokens are fine.
    pub async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        self.store.delete(token).await?;
        self.forget(token)
            .await
            .map_err(SessionError::StoreUnavailable)?;
        tracing::info!("Session revoked");
        Ok(())
    }

    /// Marks every live session of `user_id` whose grants differ from
    /// `grants` so its next authorization check swaps in the new set. Tokens
    /// are left untouched.
    pub async fn sweep_grant_changes<I>(
        &self,
        user_id: UserId,
        grants: I,
    ) -> Result<SweepOutcome, SessionError>
    where
        I: IntoIterator<Item = Grant>,
    {
        let grants: BTreeSet<Grant> = grants.into_iter().collect();
        let result = self.mark_pending(user_id, &grants).await;
        let evicted = self.forget_user(user_id).await;

        let outcome = result?;
        evicted.map_err(|err| {
            tracing::warn!(user_id = %user_id, error = %err, "Could not evict user sessions from cache");
            SessionError::StoreUnavailable(err)
        })?;
        tracing::info!(
            user_id = %user_id,
            examined = outcome.examined,
            marked = outcome.marked,
            cleared = outcome.cleared,
            unchanged = outcome.unchanged,
            skipped = outcome.skipped,
            "Grant sweep finished"
        );
        Ok(outcome)
    }

    /// Deletes records past their expiry; returns how many went.
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let deleted = self.store.delete_expired(self.clock.now()).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Purged expired sessions");
        }
        Ok(deleted)
    }

    async fn mark_pending(
        &self,
        user_id: UserId,
        grants: &BTreeSet<Grant>,
    ) -> Result<SweepOutcome, SessionError> {
        let records = self.store.find_all_by_user(user_id).await?;
        let now = self.clock.now();
        let mut outcome = SweepOutcome {
            examined: records.len(),
            ..SweepOutcome::default()
        };

        for record in records {
            let current = match verify_session_token(&record.token, &record.secret, now) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::debug!(user_id = %user_id, error = %err, "Skipping session during grant sweep");
                    outcome.skipped += 1;
                    continue;
                }
            };

            if &current.grants == grants {
                if record.pending_payload.is_some() {
                    ignore_missing(self.store.clear_pending_payload(&record.token).await)?;
                    outcome.cleared += 1;
                } else {
                    outcome.unchanged += 1;
                }
                continue;
            }

            let target = current.with_grants(grants.iter().copied());
            if record.pending_payload.as_ref() == Some(&target) {
                outcome.unchanged += 1;
                continue;
            }
            ignore_missing(self.store.set_pending_payload(&record.token, &target).await)?;
            outcome.marked += 1;
        }

        Ok(outcome)
    }

    async fn cached(&self, token: &str) -> Option<CachedSession> {
        let cache = self.cache.as_ref()?;
        match cache.get(token).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "Session cache read failed, falling back to store");
                None
            }
        }
    }

    async fn remember(&self, token: &str, payload: &SessionPayload, expires_at: DateTime<Utc>) {
        let Some(cache) = &self.cache else {
            return;
        };
        let remaining = (expires_at - self.clock.now()).num_seconds().max(0) as u64;
        let ttl_seconds = self.cache_ttl_seconds.min(remaining);
        if ttl_seconds == 0 {
            return;
        }
        let entry = CachedSession {
            payload: payload.clone(),
            expires_at,
        };
        if let Err(err) = cache.put(token, &entry, ttl_seconds).await {
            tracing::warn!(error = %err, "Session cache write failed");
            return;
        }

        // A revoke or sweep landing between the store read and the put has
        // already evicted; the entry must not outlive it.
        let still_current = matches!(
            self.store.find_by_token(token).await,
            Ok(record) if record.pending_payload.is_none()
        );
        if !still_current {
            tracing::debug!(user_id = %payload.user_id, "Session changed while caching, evicting");
            if let Err(err) = cache.invalidate_token(token).await {
                tracing::error!(error = %err, "Could not evict stale session cache entry");
            }
        }
    }

    async fn forget(&self, token: &str) -> anyhow::Result<()> {
        match &self.cache {
            Some(cache) => cache.invalidate_token(token).await,
            None => Ok(()),
        }
    }

    async fn forget_user(&self, user_id: UserId) -> anyhow::Result<()> {
        match &self.cache {
            Some(cache) => cache.invalidate_user_tokens(user_id).await,
            None => Ok(()),
        }
    }
}

/// A record revoked while the sweep was running needs no marking.
fn ignore_missing(result: Result<(), StoreError>) -> Result<(), StoreError> {
    match result {
        Err(StoreError::NotFound) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repositories::session_store::MockSessionStore,
        services::session_cache::MockSessionCacheTrait,
    };
    use chrono::Duration;

    fn payload(grants: &[Grant]) -> SessionPayload {
        SessionPayload {
            user_id: UserId::new(),
            full_name: "Mock User".into(),
            email: "mock@example.com".into(),
            grants: grants.iter().copied().collect(),
            persistent: false,
        }
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable(anyhow::anyhow!("connection refused"))
    }

    fn signed_record(payload: &SessionPayload) -> SessionRecord {
        let secret = generate_session_secret();
        let issued = sign_session_token(payload, &secret, 3600, Utc::now()).unwrap();
        SessionRecord {
            token: issued.token,
            secret,
            user_id: payload.user_id,
            expires_at: issued.expires_at,
            pending_payload: None,
        }
    }

    fn manager(store: MockSessionStore) -> SessionManager {
        SessionManager::new(Arc::new(store), SessionTtl::default())
    }

    #[tokio::test]
    async fn issue_surfaces_store_outage_without_a_token() {
        let mut store = MockSessionStore::new();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(unavailable()));

        let err = manager(store).issue(&payload(&[])).await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn issue_retries_token_collisions() {
        let mut store = MockSessionStore::new();
        let mut calls = 0;
        store.expect_insert().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(StoreError::Conflict)
            } else {
                Ok(())
            }
        });

        let issued = manager(store).issue(&payload(&[])).await.unwrap();
        assert!(!issued.token.is_empty());
    }

    #[tokio::test]
    async fn issue_gives_up_after_repeated_collisions() {
        let mut store = MockSessionStore::new();
        store
            .expect_insert()
            .times(MAX_ISSUE_ATTEMPTS)
            .returning(|_| Err(StoreError::Conflict));

        let err = manager(store).issue(&payload(&[])).await.unwrap_err();
        assert!(matches!(err, SessionError::Conflict));
    }

    #[tokio::test]
    async fn resolve_reports_outage_instead_of_not_found() {
        let mut store = MockSessionStore::new();
        store
            .expect_find_by_token()
            .returning(|_| Err(unavailable()));

        let err = manager(store).resolve("anything").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn refresh_returns_new_token_when_old_delete_fails() {
        let mut store = MockSessionStore::new();
        store.expect_insert().times(1).returning(|_| Ok(()));
        store
            .expect_delete()
            .withf(|token| token == "old-token")
            .times(1)
            .returning(|_| Err(unavailable()));

        let issued = manager(store)
            .refresh("old-token", &payload(&[2]))
            .await
            .unwrap();
        assert_ne!(issued.token, "old-token");
    }

    #[tokio::test]
    async fn refresh_fails_without_deleting_when_issue_fails() {
        let mut store = MockSessionStore::new();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(unavailable()));
        store.expect_delete().times(0);

        let err = manager(store)
            .refresh("old-token", &payload(&[2]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn sweep_ignores_sessions_revoked_mid_sweep() {
        let owner = payload(&[1]);
        let records = vec![signed_record(&owner), signed_record(&owner)];
        let user_id = owner.user_id;

        let mut store = MockSessionStore::new();
        store
            .expect_find_all_by_user()
            .returning(move |_| Ok(records.clone()));
        let mut calls = 0;
        store
            .expect_set_pending_payload()
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Err(StoreError::NotFound)
                } else {
                    Ok(())
                }
            });

        let outcome = manager(store)
            .sweep_grant_changes(user_id, [1, 2])
            .await
            .unwrap();
        assert_eq!(outcome.examined, 2);
        assert_eq!(outcome.marked, 2);
    }

    #[tokio::test]
    async fn sweep_skips_expired_records() {
        let owner = payload(&[1]);
        let mut record = signed_record(&owner);
        let secret = generate_session_secret();
        let stale = sign_session_token(&owner, &secret, 60, Utc::now() - Duration::hours(2)).unwrap();
        record.token = stale.token;
        record.secret = secret;
        let user_id = owner.user_id;

        let mut store = MockSessionStore::new();
        store
            .expect_find_all_by_user()
            .returning(move |_| Ok(vec![record.clone()]));
        store.expect_set_pending_payload().times(0);

        let outcome = manager(store)
            .sweep_grant_changes(user_id, [7])
            .await
            .unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.marked, 0);
    }

    #[tokio::test]
    async fn cached_payload_skips_the_store() {
        let owner = payload(&[3]);
        let cached = CachedSession {
            payload: owner.clone(),
            expires_at: Utc::now() + Duration::minutes(10),
        };

        let mut cache = MockSessionCacheTrait::new();
        cache
            .expect_get()
            .returning(move |_| Ok(Some(cached.clone())));
        let mut store = MockSessionStore::new();
        store.expect_find_by_token().times(0);

        let manager = manager(store).with_cache(Arc::new(cache), 30);
        assert_eq!(manager.resolve("cached-token").await.unwrap(), owner);
        assert!(manager
            .check_pending_refresh("cached-token")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn revoke_fails_when_cache_entry_cannot_be_evicted() {
        let mut store = MockSessionStore::new();
        store.expect_delete().times(1).returning(|_| Ok(()));
        let mut cache = MockSessionCacheTrait::new();
        cache
            .expect_invalidate_token()
            .returning(|_| Err(anyhow::anyhow!("redis down")));

        let manager = manager(store).with_cache(Arc::new(cache), 30);
        let err = manager.revoke("token").await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn cache_entry_is_evicted_when_session_vanishes_while_caching() {
        let owner = payload(&[1]);
        let record = signed_record(&owner);
        let token = record.token.clone();

        let mut store = MockSessionStore::new();
        let mut reads = 0;
        store.expect_find_by_token().times(2).returning(move |_| {
            reads += 1;
            if reads == 1 {
                Ok(record.clone())
            } else {
                Err(StoreError::NotFound)
            }
        });
        let mut cache = MockSessionCacheTrait::new();
        cache.expect_get().returning(|_| Ok(None));
        cache.expect_put().times(1).returning(|_, _, _| Ok(()));
        let evicted = token.clone();
        cache
            .expect_invalidate_token()
            .withf(move |t| t == evicted)
            .times(1)
            .returning(|_| Ok(()));

        let manager = manager(store).with_cache(Arc::new(cache), 30);
        assert_eq!(manager.resolve(&token).await.unwrap(), owner);
    }

    #[tokio::test]
    async fn records_with_pending_payload_are_not_cached() {
        let owner = payload(&[1]);
        let mut record = signed_record(&owner);
        record.pending_payload = Some(owner.with_grants([1, 2]));
        let token = record.token.clone();

        let mut store = MockSessionStore::new();
        store
            .expect_find_by_token()
            .returning(move |_| Ok(record.clone()));
        let mut cache = MockSessionCacheTrait::new();
        cache.expect_get().returning(|_| Ok(None));
        cache.expect_put().times(0);

        let manager = manager(store).with_cache(Arc::new(cache), 30);
        assert_eq!(manager.resolve(&token).await.unwrap(), owner);
    }
}
