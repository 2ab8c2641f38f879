//! Authorization guards.
//!
//! Every guard runs the same steps: find a token, resolve it, swap in a
//! pending refresh, then apply its requirement. Guards differ only in the
//! [`Requirement`] they check.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    error::AuthError,
    middleware::transport::{PresentedToken, SessionTransport, TokenChannel},
    models::session::{Grant, IssuedSession, SessionPayload},
    services::{SessionError, SessionManager},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any live session.
    Authenticated,
    /// The session holds this grant.
    Permission(Grant),
    /// The session holds at least one of these grants.
    AnyPermission(Vec<Grant>),
}

impl Requirement {
    pub fn permits(&self, payload: &SessionPayload) -> bool {
        match self {
            Requirement::Authenticated => true,
            Requirement::Permission(grant) => payload.has_grant(*grant),
            Requirement::AnyPermission(grants) => payload.has_any_grant(grants),
        }
    }
}

/// Session of a request that passed its guard, available to handlers as an
/// extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSession {
    pub payload: SessionPayload,
    /// Token valid for this session now; differs from the presented one
    /// after a refresh.
    pub token: String,
    pub channel: TokenChannel,
}

/// Outcome of the resolve and refresh steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub payload: SessionPayload,
    pub token: String,
    pub channel: TokenChannel,
    /// Set when a pending payload was swapped in during this request.
    pub refreshed: Option<IssuedSession>,
}

impl From<&ActiveSession> for CurrentSession {
    fn from(active: &ActiveSession) -> Self {
        Self {
            payload: active.payload.clone(),
            token: active.token.clone(),
            channel: active.channel,
        }
    }
}

/// Guard factory shared by the router.
#[derive(Clone)]
pub struct SessionAuth {
    manager: Arc<SessionManager>,
    transport: Arc<SessionTransport>,
}

impl SessionAuth {
    pub fn new(manager: Arc<SessionManager>, transport: Arc<SessionTransport>) -> Self {
        Self { manager, transport }
    }

    pub fn authenticated(&self) -> SessionGuard {
        self.guard(Requirement::Authenticated)
    }

    pub fn require_permission(&self, grant: Grant) -> SessionGuard {
        self.guard(Requirement::Permission(grant))
    }

    pub fn require_any_permission<I>(&self, grants: I) -> SessionGuard
    where
        I: IntoIterator<Item = Grant>,
    {
        self.guard(Requirement::AnyPermission(grants.into_iter().collect()))
    }

    pub fn guard(&self, requirement: Requirement) -> SessionGuard {
        SessionGuard {
            auth: self.clone(),
            requirement,
        }
    }
}

#[derive(Clone)]
pub struct SessionGuard {
    auth: SessionAuth,
    requirement: Requirement,
}

impl SessionGuard {
    pub fn extract(&self, headers: &HeaderMap) -> Result<PresentedToken, AuthError> {
        self.auth.transport.extract(headers).ok_or_else(|| {
            tracing::debug!("Rejecting request without session token");
            AuthError::NotAuthenticated
        })
    }

    pub async fn resolve(&self, presented: &PresentedToken) -> Result<SessionPayload, AuthError> {
        self.auth
            .manager
            .resolve(&presented.token)
            .await
            .map_err(|err| not_authenticated("resolve", err))
    }

    /// Swaps in the pending payload, if any, by refreshing the session.
    pub async fn refresh_if_pending(
        &self,
        presented: PresentedToken,
        payload: SessionPayload,
    ) -> Result<ActiveSession, AuthError> {
        let manager = &self.auth.manager;
        let pending = manager
            .check_pending_refresh(&presented.token)
            .await
            .map_err(|err| not_authenticated("check pending refresh", err))?;

        let Some(pending) = pending else {
            return Ok(ActiveSession {
                payload,
                token: presented.token,
                channel: presented.channel,
                refreshed: None,
            });
        };

        // Runs detached so a client hanging up cannot leave a refresh half done.
        let refresh = {
            let manager = Arc::clone(manager);
            let old_token = presented.token.clone();
            let pending = pending.clone();
            tokio::spawn(async move { manager.refresh(&old_token, &pending).await })
        };
        let issued = refresh
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "Session refresh task failed");
                AuthError::NotAuthenticated
            })?
            .map_err(|err| not_authenticated("refresh", err))?;
        tracing::debug!(user_id = %pending.user_id, "Applied pending session payload");

        Ok(ActiveSession {
            payload: pending,
            token: issued.token.clone(),
            channel: presented.channel,
            refreshed: Some(issued),
        })
    }

    pub fn authorize(&self, active: &ActiveSession) -> Result<(), AuthError> {
        if self.requirement.permits(&active.payload) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %active.payload.user_id,
                requirement = ?self.requirement,
                "Session lacks required grants"
            );
            Err(AuthError::NotAuthorized)
        }
    }

    /// Runs every step before the authorization decision. A session that
    /// comes back refreshed must reach the client whatever that decision is.
    pub async fn establish(&self, headers: &HeaderMap) -> Result<ActiveSession, AuthError> {
        let presented = self.extract(headers)?;
        let payload = self.resolve(&presented).await?;
        self.refresh_if_pending(presented, payload).await
    }

    /// Puts a refreshed token on the response unless the handler already
    /// wrote a newer one on the same channel.
    pub fn write_back(&self, response: &mut Response, active: &ActiveSession) {
        let Some(issued) = &active.refreshed else {
            return;
        };
        let transport = &self.auth.transport;
        if transport.has_written(response.headers(), active.channel) {
            return;
        }
        if let Err(err) = transport.write_back(
            response.headers_mut(),
            active.channel,
            issued,
            active.payload.persistent,
        ) {
            tracing::error!(error = %err, "Failed to write refreshed session token");
        }
    }
}

/// axum middleware for a [`SessionGuard`]; attach with
/// `axum::middleware::from_fn_with_state(guard, session_guard)`.
pub async fn session_guard(
    State(guard): State<SessionGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let active = guard.establish(request.headers()).await?;
    if let Err(err) = guard.authorize(&active) {
        let mut response = err.into_response();
        guard.write_back(&mut response, &active);
        return Ok(response);
    }
    request
        .extensions_mut()
        .insert(CurrentSession::from(&active));

    let mut response = next.run(request).await;
    guard.write_back(&mut response, &active);
    Ok(response)
}

fn not_authenticated(step: &'static str, err: SessionError) -> AuthError {
    if err.is_retryable() {
        tracing::warn!(step, error = %err, "Session check failed, denying request");
    } else {
        tracing::debug!(step, error = %err, "Session rejected");
    }
    AuthError::NotAuthenticated
}
