//! Models that represent user accounts and the authentication payloads
//! exchanged with the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    models::session::{Grant, SessionPayload},
    types::UserId,
};

/// Grant required to change another user's permissions.
pub const MANAGE_GRANTS: Grant = 1;

#[derive(Debug, Clone, FromRow)]
/// Database representation of a user account.
pub struct User {
    /// Unique identifier for the user.
    pub id: UserId,
    /// Human-readable full name.
    pub full_name: String,
    /// Login email, unique across accounts.
    pub email: String,
    /// Argon2 hash of the user's password.
    pub password_hash: String,
    /// Permission identifiers currently assigned.
    pub grants: Vec<Grant>,
    /// Creation timestamp for auditing.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp for auditing.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Snapshot of this account for a new session.
    pub fn session_payload(&self, persistent: bool) -> SessionPayload {
        SessionPayload {
            user_id: self.id,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            grants: self.grants.iter().copied().collect(),
            persistent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// User data safe to return to clients.
pub struct UserResponse {
    #[schema(value_type = String)]
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub grants: Vec<Grant>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let mut grants = user.grants;
        grants.sort_unstable();
        grants.dedup();
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            grants,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Credentials submitted to `/api/auth/login`.
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// Long-lived session when true.
    #[serde(default)]
    pub persistent: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub old_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateGrantsRequest {
    pub grants: Vec<Grant>,
}
