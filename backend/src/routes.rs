use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};

use crate::{handlers, middleware::session_guard, models::user::MANAGE_GRANTS, state::AppState};

/// API routes with their session guards. Shared layers (CORS, tracing, docs)
/// are added by the binary.
pub fn build_router(state: AppState) -> Router {
    let auth = state.session_auth();

    // Build public routes (no session)
    let public_routes = Router::new().route("/api/auth/login", post(handlers::auth::login));

    // Build routes for any live session
    let user_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/session", get(handlers::auth::current_session))
        .route("/api/auth/password", put(handlers::auth::change_password))
        .route("/api/users/me", patch(handlers::users::update_me))
        .route_layer(axum_middleware::from_fn_with_state(
            auth.authenticated(),
            session_guard,
        ));

    // Build routes that need grant management rights
    let admin_routes = Router::new()
        .route(
            "/api/admin/users/{id}/grants",
            put(handlers::admin::update_user_grants),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth.require_permission(MANAGE_GRANTS),
            session_guard,
        ));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .with_state(state)
}
