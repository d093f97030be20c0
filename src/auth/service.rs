/// Token Lifecycle Service
///
/// Orchestrates register, login, refresh, revoke and access-token
/// validation over the storage and cache collaborators.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::auth::jwt::{AccessTokenCodec, VerifiedIdentity};
use crate::auth::password::{
    check_password_policy, check_password_shape, hash_password_blocking, verify_password_blocking,
};
use crate::auth::refresh_token::{hash_refresh_token, IssuedRefreshToken, RefreshTokenManager};
use crate::cache::{CacheEntry, CacheError, NoopCache, TokenCache};
use crate::configuration::JwtSettings;
use crate::error::{AuthError, ErrorContext};
use crate::models::User;
use crate::storage::{DeadlineStore, StorageError, Store};
use crate::validators::normalize_email;

const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(50);

/// Credentials handed to the client. Never persisted, never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("access_expires_at", &self.access_expires_at)
            .finish()
    }
}

/// Result of every credential-issuing operation.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}

/// Token lifecycle service.
///
/// Shares no mutable state between calls except the store and cache, so one
/// instance serves all requests concurrently. The cache is always present;
/// with caching disabled it is a `NoopCache`.
pub struct TokenService {
    store: Arc<dyn Store>,
    cache: Arc<dyn TokenCache>,
    codec: AccessTokenCodec,
    refresh_tokens: RefreshTokenManager<dyn Store>,
    cache_timeout: Duration,
    span: Span,
}

impl TokenService {
    /// Build a service over `store`. Every store call is bounded by
    /// `config.storage_timeout()`.
    pub fn new(store: Arc<dyn Store>, config: &JwtSettings) -> Self {
        let store: Arc<dyn Store> = Arc::new(DeadlineStore::new(store, config.storage_timeout()));

        Self {
            refresh_tokens: RefreshTokenManager::new(store.clone(), config.refresh_ttl()),
            store,
            cache: Arc::new(NoopCache),
            codec: AccessTokenCodec::new(config),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            span: tracing::info_span!("token_service"),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>, timeout: Duration) -> Self {
        self.cache = cache;
        self.cache_timeout = timeout;
        self
    }

    /// Parent span for everything this service logs.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Create an account and issue its first token pair.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IssuedCredentials, AuthError> {
        self.run("register", async {
            let email = normalize_email(email)?;
            check_password_policy(password)?;

            match self.store.user_by_email(&email).await {
                Ok(_) => return Err(AuthError::EmailTaken),
                Err(StorageError::NotFound) => {}
                Err(e) => return Err(AuthError::internal("register", e)),
            }

            let password_hash = hash_password_blocking(password.to_owned()).await?;
            let now = Utc::now();
            let user = User::new(email, password_hash, now);

            // A concurrent registration may win between the check and here.
            match self.store.save_user(&user).await {
                Ok(()) => {}
                Err(StorageError::AlreadyExists) => return Err(AuthError::EmailTaken),
                Err(e) => return Err(AuthError::internal("register", e)),
            }
            tracing::info!(user_id = %user.id, "User registered");

            let tokens = self.issue_token_pair(&user, now).await?;
            Ok(IssuedCredentials {
                user_id: user.id,
                tokens,
            })
        })
        .await
    }

    /// Authenticate with email and password and issue a fresh token pair.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedCredentials, AuthError> {
        self.run("login", async {
            let email = normalize_email(email)?;
            check_password_shape(password)?;

            let user = match self.store.user_by_email(&email).await {
                Ok(user) => Some(user),
                Err(StorageError::NotFound) => None,
                Err(e) => return Err(AuthError::internal("login", e)),
            };

            let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
            let password_valid = verify_password_blocking(stored_hash, password.to_owned()).await?;

            let user = match user {
                Some(user) if password_valid => user,
                _ => return Err(AuthError::InvalidCredentials),
            };

            let tokens = self.issue_token_pair(&user, Utc::now()).await?;
            tracing::info!(user_id = %user.id, "User logged in");

            Ok(IssuedCredentials {
                user_id: user.id,
                tokens,
            })
        })
        .await
    }

    /// Exchange a refresh token for a new pair, rotating the refresh token.
    ///
    /// The presented token is revoked before its replacement is issued. If
    /// issuing then fails the caller gets `Internal` and has to log in again.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedCredentials, AuthError> {
        self.run("refresh", async {
            let now = Utc::now();
            let old_hash = hash_refresh_token(refresh_token);

            if let Some(entry) = self.cached(&old_hash).await {
                if entry.revoked {
                    tracing::warn!(user_id = %entry.user_id, "Revoked refresh token replayed");
                    return Err(AuthError::TokenRevoked);
                }
            }

            let record = self.refresh_tokens.validate(refresh_token, now).await?;

            let user = match self.store.user_by_id(record.user_id).await {
                Ok(user) => user,
                Err(StorageError::NotFound) => return Err(AuthError::InvalidToken),
                Err(e) => return Err(AuthError::internal("refresh", e)),
            };

            let access = self.codec.sign(user.id, &user.email, now)?;

            if !self.refresh_tokens.revoke(refresh_token).await? {
                // Lost a race with another refresh of the same token.
                tracing::warn!(user_id = %user.id, "Refresh token already rotated");
                return Err(AuthError::TokenRevoked);
            }
            self.cache_mark_revoked(&old_hash).await;

            let issued = self.refresh_tokens.issue(user.id, now).await.map_err(|e| {
                tracing::error!(
                    user_id = %user.id,
                    "Refresh token revoked but its replacement could not be issued"
                );
                match e {
                    AuthError::Internal { .. } => e,
                    other => AuthError::internal("refresh", other),
                }
            })?;
            self.cache_issued(&issued).await;

            tracing::info!(user_id = %user.id, "Token refreshed");

            Ok(IssuedCredentials {
                user_id: user.id,
                tokens: TokenPair {
                    access_token: access.token,
                    refresh_token: issued.token,
                    access_expires_at: access.expires_at,
                },
            })
        })
        .await
    }

    /// Revoke a refresh token (logout).
    ///
    /// Revoking an already revoked token is `TokenRevoked`, an unknown token
    /// is `InvalidToken`.
    pub async fn revoke_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.run("revoke", async {
            if !self.refresh_tokens.revoke(refresh_token).await? {
                return Err(AuthError::TokenRevoked);
            }
            self.cache_mark_revoked(&hash_refresh_token(refresh_token)).await;
            tracing::info!("Refresh token revoked");
            Ok(())
        })
        .await
    }

    /// Check an access token. Purely local; no storage access.
    pub fn validate_access_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        self.span.in_scope(|| self.codec.verify(token))
    }

    /// Release the cache. The store is owned by the caller.
    pub async fn close(&self) {
        if let Err(e) = self.cache.close().await {
            self.span
                .in_scope(|| tracing::warn!(error = %e, "Failed to close token cache"));
        }
    }

    async fn issue_token_pair(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair, AuthError> {
        let access = self.codec.sign(user.id, &user.email, now)?;
        let issued = self.refresh_tokens.issue(user.id, now).await?;
        self.cache_issued(&issued).await;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: issued.token,
            access_expires_at: access.expires_at,
        })
    }

    /// Run one operation inside its own span and log its failure with the
    /// operation name.
    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        let context = ErrorContext::new(operation);
        let span = tracing::info_span!(
            parent: &self.span,
            "token_operation",
            operation,
            request_id = %context.request_id
        );

        let result = fut.instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| context.log_error(e));
        }
        result
    }

    async fn cached(&self, hash: &str) -> Option<CacheEntry> {
        self.best_effort("get", self.cache.get(hash)).await.flatten()
    }

    async fn cache_issued(&self, issued: &IssuedRefreshToken) {
        let ttl = (issued.record.expires_at - issued.record.issued_at)
            .to_std()
            .unwrap_or_default();
        let entry = CacheEntry {
            user_id: issued.record.user_id,
            expires_at: issued.record.expires_at,
            revoked: false,
        };
        self.best_effort("set", self.cache.set(&issued.record.hash, entry, ttl))
            .await;
    }

    async fn cache_mark_revoked(&self, hash: &str) {
        self.best_effort("mark_revoked", self.cache.mark_revoked(hash))
            .await;
    }

    /// Cache failures and slow caches are logged and otherwise ignored.
    async fn best_effort<T>(
        &self,
        action: &'static str,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.cache_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(cache_action = action, error = %e, "Token cache call failed");
                None
            }
            Err(_) => {
                tracing::warn!(cache_action = action, "Token cache call timed out");
                None
            }
        }
    }
}
