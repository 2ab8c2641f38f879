use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::AppError,
    middleware::{CurrentSession, TokenChannel},
    models::{
        session::SessionPayload,
        user::{ChangePasswordRequest, LoginRequest, LoginResponse, UserResponse},
    },
    state::AppState,
};

/// Wrong email and wrong password look the same to the caller.
fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password".to_string())
}

async fn verify_password(
    state: &AppState,
    plain: &str,
    digest: Option<&str>,
) -> Result<bool, AppError> {
    let passwords = Arc::clone(&state.passwords);
    let plain = plain.to_string();
    let digest = digest.map(str::to_string);
    tokio::task::spawn_blocking(move || passwords.compare_or_decoy(&plain, digest.as_deref()))
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .map_err(AppError::InternalServerError)
}

async fn hash_password(state: &AppState, plain: &str) -> Result<String, AppError> {
    let passwords = Arc::clone(&state.passwords);
    let plain = plain.to_string();
    tokio::task::spawn_blocking(move || passwords.hash(&plain))
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?
        .map_err(AppError::InternalServerError)
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<LoginResponse>), AppError> {
    payload.validate()?;

    let user = state.users.find_by_email(payload.email.trim()).await?;
    let digest = user.as_ref().map(|user| user.password_hash.as_str());
    let matches = verify_password(&state, &payload.password, digest).await?;
    let user = match user {
        Some(user) if matches => user,
        Some(user) => {
            tracing::debug!(user_id = %user.id, "Login rejected: password mismatch");
            return Err(invalid_credentials());
        }
        None => return Err(invalid_credentials()),
    };

    let issued = state
        .sessions
        .issue(&user.session_payload(payload.persistent))
        .await?;

    let mut headers = HeaderMap::new();
    state.transport.write_back(
        &mut headers,
        TokenChannel::Cookie,
        &issued,
        payload.persistent,
    )?;

    Ok((
        headers,
        Json(LoginResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            user: UserResponse::from(user),
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
) -> Result<(StatusCode, HeaderMap), AppError> {
    state.sessions.revoke(&session.token).await?;

    let mut headers = HeaderMap::new();
    state.transport.clear(&mut headers, session.channel)?;
    Ok((StatusCode::NO_CONTENT, headers))
}

pub async fn current_session(
    Extension(session): Extension<CurrentSession>,
) -> Json<SessionPayload> {
    Json(session.payload)
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;

    let user = state
        .users
        .find_by_id(session.payload.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if !verify_password(&state, &payload.old_password, Some(&user.password_hash)).await? {
        return Err(AppError::Forbidden(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = hash_password(&state, &payload.new_password).await?;
    if !state.users.update_password(user.id, &password_hash).await? {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    tracing::info!(user_id = %user.id, "Password changed");

    Ok(Json(json!({ "message": "Password updated successfully" })))
}
