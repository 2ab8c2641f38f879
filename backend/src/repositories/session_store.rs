//! Persistence seam for session records.
//!
//! Every operation touches a single record; nothing here needs a transaction
//! spanning several sessions because each session is revoked on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::session::{SessionPayload, SessionRecord},
    types::UserId,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a session with this token already exists")]
    Conflict,
    #[error("session not found")]
    NotFound,
    #[error("session store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Unavailable(err.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with `Conflict` when the token is already recorded.
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn find_by_token(&self, token: &str) -> Result<SessionRecord, StoreError>;

    /// Unordered.
    async fn find_all_by_user(&self, user_id: UserId) -> Result<Vec<SessionRecord>, StoreError>;

    /// Fails with `NotFound` when the token has no record.
    async fn set_pending_payload(
        &self,
        token: &str,
        payload: &SessionPayload,
    ) -> Result<(), StoreError>;

    /// Fails with `NotFound` when the token has no record.
    async fn clear_pending_payload(&self, token: &str) -> Result<(), StoreError>;

    /// Succeeds whether or not the record existed.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;

    /// Removes every record whose expiry lies strictly before `now`; returns how
    /// many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
