#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    handlers::admin::UpdateGrantsResponse,
    models::{
        session::SessionPayload,
        user::{
            ChangePasswordRequest, LoginRequest, LoginResponse, UpdateGrantsRequest,
            UpdateProfileRequest, UserResponse,
        },
    },
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

/// Header name documented for header-channel clients; the server reads the
/// configured one.
pub const DOCUMENTED_SESSION_HEADER: &str = "x-session-token";

#[derive(OpenApi)]
#[openapi(
    paths(
        login_doc,
        logout_doc,
        current_session_doc,
        change_password_doc,
        update_me_doc,
        update_user_grants_doc
    ),
    components(
        schemas(
            // auth
            LoginRequest,
            LoginResponse,
            ChangePasswordRequest,
            SessionPayload,
            // users
            UserResponse,
            UpdateProfileRequest,
            // admin
            UpdateGrantsRequest,
            UpdateGrantsResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Auth", description = "Login, logout and the current session"),
        (name = "Users", description = "Self-service profile updates"),
        (name = "Admin", description = "Permission management")
    ),
    security(("SessionHeader" = []), ("SessionCookie" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "SessionHeader",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                DOCUMENTED_SESSION_HEADER,
            ))),
        );
        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("sid"))),
        );
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued; cookie set", body = LoginResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "Auth",
    security(())
)]
fn login_doc() {}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Auth"
)]
fn logout_doc() {}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Active session payload", body = SessionPayload),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Auth"
)]
fn current_session_doc() {}

#[utoipa::path(
    put,
    path = "/api/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = serde_json::Value),
        (status = 403, description = "Current password is incorrect")
    ),
    tag = "Auth"
)]
fn change_password_doc() {}

#[utoipa::path(
    patch,
    path = "/api/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated; session re-issued", body = UserResponse),
        (status = 409, description = "Email already in use")
    ),
    tag = "Users"
)]
fn update_me_doc() {}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/grants",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateGrantsRequest,
    responses(
        (status = 200, description = "Grants stored; live sessions marked", body = UpdateGrantsResponse),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "User not found")
    ),
    tag = "Admin"
)]
fn update_user_grants_doc() {}
