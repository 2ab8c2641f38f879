use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    models::session::{SessionPayload, SessionRecord},
    repositories::session_store::{SessionStore, StoreError},
    types::UserId,
};

/// Process-local store. Sessions vanish with the process; meant for tests and
/// single-node development.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.token) {
            return Err(StoreError::Conflict);
        }
        records.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<SessionRecord, StoreError> {
        self.records
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_all_by_user(&self, user_id: UserId) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_pending_payload(
        &self,
        token: &str,
        payload: &SessionPayload,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(token).ok_or(StoreError::NotFound)?;
        record.pending_payload = Some(payload.clone());
        Ok(())
    }

    async fn clear_pending_payload(&self, token: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(token).ok_or(StoreError::NotFound)?;
        record.pending_payload = None;
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(token);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.expires_at >= now);
        Ok((before - records.len()) as u64)
    }
}
