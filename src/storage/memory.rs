use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{RefreshTokenStore, StorageError, UserStore};
use crate::models::{RefreshTokenRecord, User};

#[derive(Default)]
struct Users {
    by_id: HashMap<Uuid, User>,
    id_by_email: HashMap<String, Uuid>,
}

/// Process-local store for tests and single-instance runs.
///
/// Each operation holds its lock for the whole check-and-write, which gives
/// the same guarantees the Postgres constraints give.
#[derive(Default)]
pub struct InMemoryStore {
    users: Mutex<Users>,
    refresh_tokens: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All refresh-token records owned by `user_id`.
    pub fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.refresh_tokens
            .lock()
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.lock().len()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn save_user(&self, user: &User) -> Result<(), StorageError> {
        let mut users = self.users.lock();
        if users.id_by_email.contains_key(&user.email) || users.by_id.contains_key(&user.id) {
            return Err(StorageError::AlreadyExists);
        }
        users.id_by_email.insert(user.email.clone(), user.id);
        users.by_id.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let users = self.users.lock();
        users
            .id_by_email
            .get(email)
            .and_then(|id| users.by_id.get(id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User, StorageError> {
        self.users
            .lock()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryStore {
    async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StorageError> {
        let mut tokens = self.refresh_tokens.lock();
        if tokens.contains_key(&record.hash) {
            return Err(StorageError::AlreadyExists);
        }
        tokens.insert(record.hash.clone(), record.clone());
        Ok(())
    }

    async fn refresh_token_by_hash(&self, hash: &str) -> Result<RefreshTokenRecord, StorageError> {
        self.refresh_tokens
            .lock()
            .get(hash)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn revoke_refresh_token(&self, hash: &str) -> Result<bool, StorageError> {
        let mut tokens = self.refresh_tokens.lock();
        let record = tokens.get_mut(hash).ok_or(StorageError::NotFound)?;
        if record.revoked {
            return Ok(false);
        }
        record.revoked = true;
        Ok(true)
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tokens = self.refresh_tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, record| !record.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}
