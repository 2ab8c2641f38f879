//! Access to user accounts. The session subsystem only needs lookups and a
//! handful of single-field updates.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    models::{session::Grant, user::User},
    types::UserId,
};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Returns the updated account, or `None` when it does not exist.
    async fn update_profile(
        &self,
        id: UserId,
        full_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>>;
    async fn update_password(&self, id: UserId, password_hash: &str) -> anyhow::Result<bool>;
    /// Returns the updated account, or `None` when it does not exist.
    async fn update_grants(&self, id: UserId, grants: &[Grant]) -> anyhow::Result<Option<User>>;
}

const USER_COLUMNS: &str = "id, full_name, email, password_hash, grants, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: UserId,
        full_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET full_name = $1, email = $2, updated_at = NOW() \
             WHERE id = $3 RETURNING {USER_COLUMNS}"
        ))
        .bind(full_name)
        .bind(email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_grants(&self, id: UserId, grants: &[Grant]) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET grants = $1, updated_at = NOW() WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(grants)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
