use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    middleware::CurrentSession,
    models::user::{UpdateGrantsRequest, UserResponse},
    state::AppState,
    types::UserId,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateGrantsResponse {
    pub user: UserResponse,
    /// Live sessions that will pick up the new grants on their next request.
    pub sessions_marked: usize,
}

/// Stores a user's new grants and marks their live sessions for refresh.
pub async fn update_user_grants(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentSession>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<UpdateGrantsRequest>,
) -> Result<Json<UpdateGrantsResponse>, AppError> {
    let mut grants = payload.grants;
    if grants.iter().any(|grant| *grant < 0) {
        return Err(AppError::BadRequest(
            "Grant identifiers must not be negative".to_string(),
        ));
    }
    grants.sort_unstable();
    grants.dedup();

    let user = state
        .users
        .update_grants(user_id, &grants)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let outcome = state
        .sessions
        .sweep_grant_changes(user.id, user.grants.iter().copied())
        .await?;
    tracing::info!(
        admin_id = %admin.payload.user_id,
        user_id = %user.id,
        sessions_marked = outcome.marked,
        "User grants updated"
    );

    Ok(Json(UpdateGrantsResponse {
        user: UserResponse::from(user),
        sessions_marked: outcome.marked,
    }))
}
