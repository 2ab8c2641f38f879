//! Models for issued sessions and the identity snapshot they carry.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::UserId;

/// Permission identifier carried by a session.
pub type Grant = i32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Identity and authorization snapshot embedded in a signed token.
pub struct SessionPayload {
    /// Owner of the session.
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Display name at the time the token was signed.
    pub full_name: String,
    /// Email address at the time the token was signed.
    pub email: String,
    /// Permissions granted to the session. Compared as a set.
    #[serde(default)]
    #[schema(value_type = Vec<i32>)]
    pub grants: BTreeSet<Grant>,
    /// Long-lived session when true, short-lived otherwise.
    pub persistent: bool,
}

impl SessionPayload {
    pub fn has_grant(&self, grant: Grant) -> bool {
        self.grants.contains(&grant)
    }

    pub fn has_any_grant(&self, grants: &[Grant]) -> bool {
        grants.iter().any(|grant| self.grants.contains(grant))
    }

    /// Same identity, different permission set.
    pub fn with_grants<I>(&self, grants: I) -> Self
    where
        I: IntoIterator<Item = Grant>,
    {
        Self {
            grants: grants.into_iter().collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Server-side counterpart of an issued token.
pub struct SessionRecord {
    /// Signed credential handed to the client. Unique per record.
    pub token: String,
    /// Per-token signing key. Never leaves the server.
    pub secret: String,
    /// Owning user, used for bulk operations.
    pub user_id: UserId,
    /// Absolute expiry, equal to the `exp` claim of `token`.
    pub expires_at: DateTime<Utc>,
    /// Replacement payload waiting to be swapped in on the next check.
    pub pending_payload: Option<SessionPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of issuing a session: the token and when it stops being valid.
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
