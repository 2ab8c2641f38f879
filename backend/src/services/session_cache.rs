use async_trait::async_trait;
use bb8_redis::redis::{self, AsyncCommands};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::Instrument;

use crate::{db::redis::RedisPool, models::session::SessionPayload, types::UserId};

/// Resolved payload kept in front of the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub payload: SessionPayload,
    pub expires_at: DateTime<Utc>,
}

/// Short-lived token -> payload cache. Holding an entry implies the record had
/// no pending payload when it was cached; anything that sets one must
/// invalidate the entry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionCacheTrait: Send + Sync {
    async fn get(&self, token: &str) -> anyhow::Result<Option<CachedSession>>;
    async fn put(&self, token: &str, session: &CachedSession, ttl_seconds: u64)
        -> anyhow::Result<()>;
    async fn invalidate_token(&self, token: &str) -> anyhow::Result<()>;
    async fn invalidate_user_tokens(&self, user_id: UserId) -> anyhow::Result<()>;
}

/// Cache keys never contain the token itself.
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub struct RedisSessionCache {
    pool: RedisPool,
    /// Lifetime of a user's index; at least as long as any entry it lists.
    index_ttl_seconds: u64,
}

impl RedisSessionCache {
    pub fn new(pool: RedisPool, max_ttl_seconds: u64) -> Self {
        Self {
            pool,
            index_ttl_seconds: max_ttl_seconds,
        }
    }

    fn session_key(fingerprint: &str) -> String {
        format!("session:{}", fingerprint)
    }

    fn user_sessions_key(user_id: UserId) -> String {
        format!("user_sessions:{}", user_id)
    }
}

#[async_trait]
impl SessionCacheTrait for RedisSessionCache {
    async fn get(&self, token: &str) -> anyhow::Result<Option<CachedSession>> {
        let fingerprint = token_fingerprint(token);
        let span = tracing::debug_span!("redis_session_get", %fingerprint);

        async move {
            let mut conn = self.pool.get().await?;
            let raw: Option<String> = conn.get(Self::session_key(&fingerprint)).await?;
            match raw {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok::<_, anyhow::Error>(None),
            }
        }
        .instrument(span)
        .await
    }

    async fn put(
        &self,
        token: &str,
        session: &CachedSession,
        ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }
        let fingerprint = token_fingerprint(token);
        let user_id = session.payload.user_id;
        let span = tracing::debug_span!("redis_session_put", %fingerprint, %user_id);

        async move {
            let mut conn = self.pool.get().await?;
            let key = Self::session_key(&fingerprint);
            let user_key = Self::user_sessions_key(user_id);
            let value = serde_json::to_string(session)?;
            // Never shorter than the entry just added, so siblings stay reachable.
            let index_ttl = self.index_ttl_seconds.max(ttl_seconds);
            let index_ttl = i64::try_from(index_ttl).unwrap_or(i64::MAX);

            redis::pipe()
                .atomic()
                .set_ex(&key, value, ttl_seconds)
                .sadd(&user_key, &fingerprint)
                .expire(&user_key, index_ttl)
                .query_async::<_, ()>(&mut *conn)
                .await?;

            Ok::<_, anyhow::Error>(())
        }
        .instrument(span)
        .await
    }

    async fn invalidate_token(&self, token: &str) -> anyhow::Result<()> {
        let fingerprint = token_fingerprint(token);
        let span = tracing::debug_span!("redis_session_invalidate", %fingerprint);

        async move {
            let mut conn = self.pool.get().await?;
            let key = Self::session_key(&fingerprint);
            let raw: Option<String> = conn.get(&key).await?;
            let Some(raw) = raw else {
                return Ok::<_, anyhow::Error>(());
            };

            let mut pipe = redis::pipe();
            pipe.atomic().del(&key);
            match serde_json::from_str::<CachedSession>(&raw) {
                Ok(entry) => {
                    pipe.srem(Self::user_sessions_key(entry.payload.user_id), &fingerprint);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Unreadable session cache entry, dropping it");
                }
            }
            pipe.query_async::<_, ()>(&mut *conn).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn invalidate_user_tokens(&self, user_id: UserId) -> anyhow::Result<()> {
        let span = tracing::debug_span!("redis_session_invalidate_user", %user_id);

        async move {
            let mut conn = self.pool.get().await?;
            let user_key = Self::user_sessions_key(user_id);

            let fingerprints: Vec<String> = conn.smembers(&user_key).await?;
            if fingerprints.is_empty() {
                return Ok::<_, anyhow::Error>(());
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for fingerprint in fingerprints {
                pipe.del(Self::session_key(&fingerprint));
            }
            pipe.del(user_key);

            pipe.query_async::<_, ()>(&mut *conn).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }
}
