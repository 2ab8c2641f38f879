use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::CurrentSession,
    models::{
        session::SessionPayload,
        user::{UpdateProfileRequest, UserResponse},
    },
    state::AppState,
};

/// Updates the caller's profile and re-issues their session so the token
/// carries the new name and email.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<(HeaderMap, Json<UserResponse>), AppError> {
    payload.validate()?;

    let user = state
        .users
        .update_profile(
            session.payload.user_id,
            payload.full_name.trim(),
            payload.email.trim(),
        )
        .await
        .map_err(conflict_on_duplicate_email)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let refreshed = SessionPayload {
        full_name: user.full_name.clone(),
        email: user.email.clone(),
        ..session.payload.clone()
    };
    let issued = state.sessions.refresh(&session.token, &refreshed).await?;

    let mut headers = HeaderMap::new();
    state
        .transport
        .write_back(&mut headers, session.channel, &issued, refreshed.persistent)?;

    Ok((headers, Json(UserResponse::from(user))))
}

fn conflict_on_duplicate_email(err: anyhow::Error) -> AppError {
    let duplicate = err
        .downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation());
    if duplicate {
        AppError::Conflict("Email already in use".to_string())
    } else {
        AppError::InternalServerError(err)
    }
}
