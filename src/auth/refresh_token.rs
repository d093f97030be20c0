/// Refresh Token Management
///
/// Handles secure refresh token generation, storage, validation, and revocation.
/// Refresh tokens are:
/// - 32 random bytes from the OS-seeded CSPRNG, base64url encoded without padding
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: a successful refresh revokes the presented token
/// - Store-backed for revocation support

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::RefreshTokenRecord;
use crate::storage::{RefreshTokenStore, StorageError};

pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Total number of draws `issue` makes before reporting a collision.
pub const MAX_ISSUE_ATTEMPTS: usize = 5;

/// Generate a new cryptographically secure refresh token
///
/// The token is returned in plaintext (this is what the client stores).
/// The server stores only its hash.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `base64url(SHA-256(token))`, the only form of a refresh token the
/// server keeps.
pub fn hash_refresh_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// The plaintext handed to the caller together with the stored record.
#[derive(Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: RefreshTokenRecord,
}

impl fmt::Debug for IssuedRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedRefreshToken")
            .field("token", &"[redacted]")
            .field("record", &self.record)
            .finish()
    }
}

pub struct RefreshTokenManager<S: ?Sized> {
    store: Arc<S>,
    ttl: Duration,
}

impl<S: RefreshTokenStore + ?Sized> RefreshTokenManager<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue and persist a new refresh token for `user_id`
    ///
    /// A hash collision reported by the store is retried with a fresh
    /// random draw, `MAX_ISSUE_ATTEMPTS` draws in total.
    ///
    /// # Errors
    /// `RefreshTokenCollision` when every draw collided, `Internal` for any
    /// other storage failure.
    pub async fn issue(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedRefreshToken, AuthError> {
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let token = generate_refresh_token();
            let record = RefreshTokenRecord {
                hash: hash_refresh_token(&token),
                user_id,
                issued_at: now,
                expires_at: now + self.ttl,
                revoked: false,
            };

            match self.store.save_refresh_token(&record).await {
                Ok(()) => return Ok(IssuedRefreshToken { token, record }),
                Err(StorageError::AlreadyExists) => {
                    tracing::warn!(user_id = %user_id, attempt, "Refresh token hash collision");
                }
                Err(e) => return Err(AuthError::internal("issue_refresh_token", e)),
            }
        }

        Err(AuthError::RefreshTokenCollision)
    }

    /// Validate a refresh token
    ///
    /// Checks:
    /// 1. Token hash exists in the store
    /// 2. Token has not been revoked
    /// 3. Token has not expired (`expires_at <= now` counts as expired)
    ///
    /// # Returns
    /// The stored record if the token is usable
    pub async fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AuthError> {
        let record = match self.store.refresh_token_by_hash(&hash_refresh_token(token)).await {
            Ok(record) => record,
            Err(StorageError::NotFound) => {
                tracing::debug!("Refresh token not found");
                return Err(AuthError::InvalidToken);
            }
            Err(e) => return Err(AuthError::internal("validate_refresh_token", e)),
        };

        if record.revoked {
            tracing::warn!(user_id = %record.user_id, "Attempt to use revoked refresh token");
            return Err(AuthError::TokenRevoked);
        }

        if record.is_expired_at(now) {
            tracing::info!(user_id = %record.user_id, "Refresh token expired");
            return Err(AuthError::TokenExpired);
        }

        Ok(record)
    }

    /// Revoke a single refresh token
    ///
    /// Returns `true` if this call revoked it and `false` if it was already
    /// revoked. An unknown token is `InvalidToken`.
    pub async fn revoke(&self, token: &str) -> Result<bool, AuthError> {
        match self.store.revoke_refresh_token(&hash_refresh_token(token)).await {
            Ok(revoked) => Ok(revoked),
            Err(StorageError::NotFound) => Err(AuthError::InvalidToken),
            Err(e) => Err(AuthError::internal("revoke_refresh_token", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers `save_refresh_token` with `AlreadyExists` for the first
    /// `collisions` calls.
    struct CollidingStore {
        collisions: usize,
        attempts: AtomicUsize,
        inner: InMemoryStore,
    }

    impl CollidingStore {
        fn new(collisions: usize) -> Self {
            Self {
                collisions,
                attempts: AtomicUsize::new(0),
                inner: InMemoryStore::new(),
            }
        }
    }

    #[async_trait]
    impl RefreshTokenStore for CollidingStore {
        async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StorageError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.collisions {
                return Err(StorageError::AlreadyExists);
            }
            self.inner.save_refresh_token(record).await
        }

        async fn refresh_token_by_hash(&self, hash: &str) -> Result<RefreshTokenRecord, StorageError> {
            self.inner.refresh_token_by_hash(hash).await
        }

        async fn revoke_refresh_token(&self, hash: &str) -> Result<bool, StorageError> {
            self.inner.revoke_refresh_token(hash).await
        }

        async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
            self.inner.delete_expired_tokens(now).await
        }
    }

    struct BrokenStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl RefreshTokenStore for BrokenStore {
        async fn save_refresh_token(&self, _record: &RefreshTokenRecord) -> Result<(), StorageError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::backend("connection refused"))
        }

        async fn refresh_token_by_hash(&self, _hash: &str) -> Result<RefreshTokenRecord, StorageError> {
            Err(StorageError::backend("connection refused"))
        }

        async fn revoke_refresh_token(&self, _hash: &str) -> Result<bool, StorageError> {
            Err(StorageError::backend("connection refused"))
        }

        async fn delete_expired_tokens(&self, _now: DateTime<Utc>) -> Result<u64, StorageError> {
            Err(StorageError::backend("connection refused"))
        }
    }

    fn manager<S: RefreshTokenStore>(store: Arc<S>) -> RefreshTokenManager<S> {
        RefreshTokenManager::new(store, Duration::days(7))
    }

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        // 32 bytes -> 43 base64url characters, no padding
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_refresh_token());
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_refresh_token();
        let hash = hash_refresh_token(&token);

        assert_eq!(hash, hash_refresh_token(&token));
        assert_ne!(hash, token);
        // SHA-256 digest -> 43 base64url characters
        assert_eq!(hash.len(), 43);
        assert_ne!(hash, hash_refresh_token("other"));
    }

    #[test]
    fn test_issued_token_debug_is_redacted() {
        let issued = IssuedRefreshToken {
            token: "super-secret".to_string(),
            record: RefreshTokenRecord {
                hash: "h".to_string(),
                user_id: Uuid::new_v4(),
                issued_at: Utc::now(),
                expires_at: Utc::now(),
                revoked: false,
            },
        };

        assert!(!format!("{issued:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_issue_persists_only_the_hash() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let user_id = Uuid::new_v4();

        let issued = manager(store.clone()).issue(user_id, now).await.unwrap();
        let stored = store.refresh_tokens_for(user_id);

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].hash, hash_refresh_token(&issued.token));
        assert_ne!(stored[0].hash, issued.token);
        assert_eq!(stored[0].issued_at, now);
        assert_eq!(stored[0].expires_at, now + Duration::days(7));
        assert!(!stored[0].revoked);
    }

    #[tokio::test]
    async fn test_issue_retries_collisions() {
        let store = Arc::new(CollidingStore::new(4));

        let issued = manager(store.clone()).issue(Uuid::new_v4(), Utc::now()).await;

        assert!(issued.is_ok());
        assert_eq!(store.attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_issue_gives_up_after_five_attempts() {
        let store = Arc::new(CollidingStore::new(usize::MAX));

        let result = manager(store.clone()).issue(Uuid::new_v4(), Utc::now()).await;

        assert!(matches!(result, Err(AuthError::RefreshTokenCollision)));
        assert_eq!(store.attempts.load(Ordering::SeqCst), MAX_ISSUE_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_issue_does_not_retry_other_errors() {
        let store = Arc::new(BrokenStore {
            attempts: AtomicUsize::new(0),
        });

        let result = manager(store.clone()).issue(Uuid::new_v4(), Utc::now()).await;

        assert!(matches!(result, Err(AuthError::Internal { .. })));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validate_unknown_token() {
        let manager = manager(Arc::new(InMemoryStore::new()));

        let result = manager.validate("definitely-not-issued", Utc::now()).await;

        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_validate_expiry_boundary() {
        let manager = manager(Arc::new(InMemoryStore::new()));
        let now = Utc::now();
        let issued = manager.issue(Uuid::new_v4(), now).await.unwrap();
        let expires_at = issued.record.expires_at;

        assert!(manager
            .validate(&issued.token, expires_at - Duration::seconds(1))
            .await
            .is_ok());
        assert!(matches!(
            manager.validate(&issued.token, expires_at).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_revoked_token_never_validates() {
        let manager = manager(Arc::new(InMemoryStore::new()));
        let now = Utc::now();
        let issued = manager.issue(Uuid::new_v4(), now).await.unwrap();

        assert!(manager.revoke(&issued.token).await.unwrap());
        assert!(!manager.revoke(&issued.token).await.unwrap());
        assert!(matches!(
            manager.validate(&issued.token, now).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_revoke_unknown_token() {
        let manager = manager(Arc::new(InMemoryStore::new()));

        assert!(matches!(
            manager.revoke("unknown").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal() {
        let manager = manager(Arc::new(BrokenStore {
            attempts: AtomicUsize::new(0),
        }));

        assert!(matches!(
            manager.validate("token", Utc::now()).await,
            Err(AuthError::Internal { .. })
        ));
        assert!(matches!(
            manager.revoke("token").await,
            Err(AuthError::Internal { .. })
        ));
    }
}
