#![allow(dead_code)]
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::Response,
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sessionkeeper_backend::{
    config::{Config, SessionTtl},
    middleware::SessionTransport,
    models::{
        session::{Grant, SessionPayload, SessionRecord},
        user::User,
    },
    repositories::{InMemorySessionStore, SessionStore, StoreError, UserDirectory},
    routes::build_router,
    services::{session_cache::CachedSession, SessionCacheTrait, SessionManager},
    state::AppState,
    types::UserId,
    utils::{cookies::SameSite, password::PasswordService, time::ManualClock},
};
use tokio::sync::{Notify, RwLock};

pub const HEADER_NAME: &str = "x-session-token";
pub const COOKIE_NAME: &str = "sid";
pub const DEFAULT_PASSWORD: &str = "correct horse battery";

pub fn test_config() -> Config {
    let ttl = SessionTtl::default();
    Config {
        database_url: "postgres://localhost/sessionkeeper_test".into(),
        database_max_connections: 5,
        bind_address: "127.0.0.1:0".into(),
        session_cookie_name: COOKIE_NAME.into(),
        session_header_name: HEADER_NAME.into(),
        session_ttl_short_seconds: ttl.short_seconds,
        session_ttl_long_seconds: ttl.long_seconds,
        session_reaper_interval_seconds: 0,
        session_cache_ttl_seconds: 30,
        redis_url: None,
        redis_pool_size: 2,
        redis_connect_timeout: 5,
        cookie_secure: false,
        cookie_same_site: SameSite::Lax,
        cors_allow_origins: vec!["http://localhost:8000".into()],
    }
}

pub fn sample_payload(grants: &[Grant]) -> SessionPayload {
    SessionPayload {
        user_id: UserId::new(),
        full_name: "Test User".into(),
        email: format!("user_{}@example.com", UserId::new()),
        grants: grants.iter().copied().collect(),
        persistent: false,
    }
}

pub fn sample_user(email: &str, grants: &[Grant]) -> User {
    let now = Utc::now();
    User {
        id: UserId::new(),
        full_name: "Test User".into(),
        email: email.into(),
        password_hash: PlainPasswordService::digest(DEFAULT_PASSWORD),
        grants: grants.to_vec(),
        created_at: now,
        updated_at: now,
    }
}

/// Reversible "hash" so API tests do not pay for Argon2.
#[derive(Debug, Default, Clone)]
pub struct PlainPasswordService;

impl PlainPasswordService {
    pub fn digest(plain: &str) -> String {
        format!("plain${plain}")
    }
}

impl PasswordService for PlainPasswordService {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        Ok(Self::digest(plain))
    }

    fn compare(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        Ok(Self::digest(plain) == digest)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn get(&self, id: UserId) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.get(id).await)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_profile(
        &self,
        id: UserId,
        full_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.full_name = full_name.to_string();
            user.email = email.to_string();
            user.clone()
        }))
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        Ok(users
            .get_mut(&id)
            .map(|user| user.password_hash = password_hash.to_string())
            .is_some())
    }

    async fn update_grants(&self, id: UserId, grants: &[Grant]) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.grants = grants.to_vec();
            user.clone()
        }))
    }
}

/// In-memory store that can be switched off to simulate an outage.
#[derive(Default)]
pub struct SwitchableStore {
    inner: InMemorySessionStore,
    down: AtomicBool,
}

impl SwitchableStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(anyhow::anyhow!("store switched off")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for SwitchableStore {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.insert(record).await
    }

    async fn find_by_token(&self, token: &str) -> Result<SessionRecord, StoreError> {
        self.check()?;
        self.inner.find_by_token(token).await
    }

    async fn find_all_by_user(&self, user_id: UserId) -> Result<Vec<SessionRecord>, StoreError> {
        self.check()?;
        self.inner.find_all_by_user(user_id).await
    }

    async fn set_pending_payload(
        &self,
        token: &str,
        payload: &SessionPayload,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set_pending_payload(token, payload).await
    }

    async fn clear_pending_payload(&self, token: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.clear_pending_payload(token).await
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(token).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.delete_expired(now).await
    }
}

/// Store whose next `find_by_token` pauses after reading, until released.
#[derive(Default)]
pub struct GatedStore {
    inner: InMemorySessionStore,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl GatedStore {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Waits until a lookup is held at the gate.
    pub async fn wait_until_held(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl SessionStore for GatedStore {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.inner.insert(record).await
    }

    async fn find_by_token(&self, token: &str) -> Result<SessionRecord, StoreError> {
        let found = self.inner.find_by_token(token).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        found
    }

    async fn find_all_by_user(&self, user_id: UserId) -> Result<Vec<SessionRecord>, StoreError> {
        self.inner.find_all_by_user(user_id).await
    }

    async fn set_pending_payload(
        &self,
        token: &str,
        payload: &SessionPayload,
    ) -> Result<(), StoreError> {
        self.inner.set_pending_payload(token, payload).await
    }

    async fn clear_pending_payload(&self, token: &str) -> Result<(), StoreError> {
        self.inner.clear_pending_payload(token).await
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.inner.delete(token).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_expired(now).await
    }
}

/// Process-local session cache; entry TTLs are ignored.
#[derive(Default)]
pub struct InMemorySessionCache {
    entries: RwLock<HashMap<String, CachedSession>>,
}

impl InMemorySessionCache {
    pub async fn contains(&self, token: &str) -> bool {
        self.entries.read().await.contains_key(token)
    }
}

#[async_trait]
impl SessionCacheTrait for InMemorySessionCache {
    async fn get(&self, token: &str) -> anyhow::Result<Option<CachedSession>> {
        Ok(self.entries.read().await.get(token).cloned())
    }

    async fn put(
        &self,
        token: &str,
        session: &CachedSession,
        _ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(token.to_string(), session.clone());
        Ok(())
    }

    async fn invalidate_token(&self, token: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(token);
        Ok(())
    }

    async fn invalidate_user_tokens(&self, user_id: UserId) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.payload.user_id != user_id);
        Ok(())
    }
}

/// Everything an API test needs, wired with in-memory collaborators and a
/// manual clock.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<SwitchableStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = test_config();
        let store = Arc::new(SwitchableStore::default());
        let users = Arc::new(InMemoryUserDirectory::default());
        let clock = Arc::new(ManualClock::default());
        let sessions = Arc::new(
            SessionManager::new(store.clone(), config.session_ttl()).with_clock(clock.clone()),
        );
        let transport =
            Arc::new(SessionTransport::from_config(&config).expect("build session transport"));
        let state = AppState::new(
            sessions,
            transport,
            users.clone(),
            Arc::new(PlainPasswordService),
            config,
        );
        Self {
            state,
            store,
            users,
            clock,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.state.sessions
    }

    pub async fn seed_user(&self, email: &str, grants: &[Grant]) -> User {
        let user = sample_user(email, grants);
        self.users.insert(user.clone()).await;
        user
    }

    /// Issues a session for `user` directly, skipping the login route.
    pub async fn session_for(&self, user: &User) -> String {
        self.sessions()
            .issue(&user.session_payload(false))
            .await
            .expect("issue session")
            .token
    }
}

pub async fn read_json(response: Response<Body>) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("parse json body")
}

pub fn header_str<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

/// Value of the session cookie set on `response`, if any.
pub fn session_cookie_value(response: &Response<Body>) -> Option<String> {
    let prefix = format!("{COOKIE_NAME}=");
    set_cookies(response).into_iter().find_map(|cookie| {
        cookie
            .strip_prefix(&prefix)
            .and_then(|rest| rest.split(';').next())
            .map(str::to_string)
    })
}
