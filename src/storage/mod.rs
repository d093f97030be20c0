/// Storage Contracts
///
/// The core never talks to a database directly. Uniqueness of emails and
/// refresh-token hashes, and the single `revoked: false -> true` transition,
/// are guaranteed by the implementations (unique constraints and conditional
/// updates), not by in-process locks.

mod memory;
mod postgres;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::BoxError;
use crate::models::{RefreshTokenRecord, User};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists")]
    AlreadyExists,

    #[error("record not found")]
    NotFound,

    #[error("storage call exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("storage backend failure")]
    Backend(#[source] BoxError),
}

impl StorageError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        StorageError::Backend(err.into())
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    async fn save_user(&self, user: &User) -> Result<(), StorageError>;

    async fn user_by_email(&self, email: &str) -> Result<User, StorageError>;

    async fn user_by_id(&self, id: Uuid) -> Result<User, StorageError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Fails with `AlreadyExists` when the hash is already stored.
    async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StorageError>;

    async fn refresh_token_by_hash(&self, hash: &str) -> Result<RefreshTokenRecord, StorageError>;

    /// Atomically flip `revoked` to `true`.
    ///
    /// Returns `true` if this call revoked the record, `false` if it was
    /// already revoked, and `NotFound` if there is no such hash.
    async fn revoke_refresh_token(&self, hash: &str) -> Result<bool, StorageError>;

    /// Delete every record with `expires_at <= now`, returning how many
    /// were removed.
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Everything the token service needs from persistence.
pub trait Store: UserStore + RefreshTokenStore {}

impl<T: UserStore + RefreshTokenStore + ?Sized> Store for T {}

/// Bounds every call of the wrapped store by a deadline.
///
/// An elapsed deadline drops the in-flight call and reports
/// `DeadlineExceeded`.
pub struct DeadlineStore<S: ?Sized> {
    inner: Arc<S>,
    timeout: Duration,
}

impl<S: ?Sized> DeadlineStore<S> {
    pub fn new(inner: Arc<S>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StorageError::DeadlineExceeded(self.timeout))?
    }
}

#[async_trait]
impl<S: UserStore + ?Sized> UserStore for DeadlineStore<S> {
    async fn save_user(&self, user: &User) -> Result<(), StorageError> {
        self.bounded(self.inner.save_user(user)).await
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StorageError> {
        self.bounded(self.inner.user_by_email(email)).await
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User, StorageError> {
        self.bounded(self.inner.user_by_id(id)).await
    }
}

#[async_trait]
impl<S: RefreshTokenStore + ?Sized> RefreshTokenStore for DeadlineStore<S> {
    async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StorageError> {
        self.bounded(self.inner.save_refresh_token(record)).await
    }

    async fn refresh_token_by_hash(&self, hash: &str) -> Result<RefreshTokenRecord, StorageError> {
        self.bounded(self.inner.refresh_token_by_hash(hash)).await
    }

    async fn revoke_refresh_token(&self, hash: &str) -> Result<bool, StorageError> {
        self.bounded(self.inner.revoke_refresh_token(hash)).await
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        self.bounded(self.inner.delete_expired_tokens(now)).await
    }
}
