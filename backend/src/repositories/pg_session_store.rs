use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};

use crate::{
    models::session::{SessionPayload, SessionRecord},
    repositories::session_store::{SessionStore, StoreError},
    types::UserId,
};

#[derive(Debug, FromRow)]
struct SessionRow {
    token: String,
    secret: String,
    user_id: UserId,
    expires_at: DateTime<Utc>,
    pending_payload: Option<Json<SessionPayload>>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            token: row.token,
            secret: row.secret,
            user_id: row.user_id,
            expires_at: row.expires_at,
            pending_payload: row.pending_payload.map(|Json(payload)| payload),
        }
    }
}

/// `sessions` table backed store. Expired rows stay until the reaper removes
/// them; the codec rejects them on read in the meantime.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, secret, user_id, expires_at, pending_payload)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.token)
        .bind(&record.secret)
        .bind(record.user_id)
        .bind(record.expires_at)
        .bind(record.pending_payload.as_ref().map(Json))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<SessionRecord, StoreError> {
        sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT token, secret, user_id, expires_at, pending_payload
            FROM sessions
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .map(SessionRecord::from)
        .ok_or(StoreError::NotFound)
    }

    async fn find_all_by_user(&self, user_id: UserId) -> Result<Vec<SessionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT token, secret, user_id, expires_at, pending_payload
            FROM sessions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    async fn set_pending_payload(
        &self,
        token: &str,
        payload: &SessionPayload,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET pending_payload = $1 WHERE token = $2")
            .bind(Json(payload))
            .bind(token)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn clear_pending_payload(&self, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET pending_payload = NULL WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
