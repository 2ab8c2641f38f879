use std::sync::Arc;

use crate::{
    config::Config,
    middleware::{SessionAuth, SessionTransport},
    repositories::UserDirectory,
    services::SessionManager,
    utils::password::PasswordService,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub transport: Arc<SessionTransport>,
    pub users: Arc<dyn UserDirectory>,
    pub passwords: Arc<dyn PasswordService>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionManager>,
        transport: Arc<SessionTransport>,
        users: Arc<dyn UserDirectory>,
        passwords: Arc<dyn PasswordService>,
        config: Config,
    ) -> Self {
        Self {
            sessions,
            transport,
            users,
            passwords,
            config,
        }
    }

    /// Guard factory bound to this state's manager and transport.
    pub fn session_auth(&self) -> SessionAuth {
        SessionAuth::new(self.sessions.clone(), self.transport.clone())
    }
}
