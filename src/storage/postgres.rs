use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{RefreshTokenStore, StorageError, UserStore};
use crate::models::{RefreshTokenRecord, User};

const UNIQUE_VIOLATION: &str = "23505";

type UserRow = (Uuid, String, String, DateTime<Utc>, DateTime<Utc>);
type RefreshTokenRow = (String, Uuid, DateTime<Utc>, DateTime<Utc>, bool);

/// Postgres-backed store
///
/// Tables are created by the migrations in `migrations/`. Email and token
/// hash uniqueness are enforced by unique indexes; revocation is a
/// conditional `UPDATE` whose affected-row count tells the caller whether
/// this call did the transition.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::backend)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::RowNotFound => StorageError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StorageError::AlreadyExists
        }
        _ => StorageError::backend(err),
    }
}

fn user_from_row((id, email, password_hash, created_at, updated_at): UserRow) -> User {
    User {
        id,
        email,
        password_hash,
        created_at,
        updated_at,
    }
}

fn record_from_row((hash, user_id, issued_at, expires_at, revoked): RefreshTokenRow) -> RefreshTokenRecord {
    RefreshTokenRecord {
        hash,
        user_id,
        issued_at,
        expires_at,
        revoked,
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn save_user(&self, user: &User) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<User, StorageError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(user_from_row)
        .ok_or(StorageError::NotFound)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<User, StorageError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(user_from_row)
        .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresStore {
    async fn save_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, user_id, issued_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.hash)
        .bind(record.user_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn refresh_token_by_hash(&self, hash: &str) -> Result<RefreshTokenRecord, StorageError> {
        sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT token_hash, user_id, issued_at, expires_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(record_from_row)
        .ok_or(StorageError::NotFound)
    }

    async fn revoke_refresh_token(&self, hash: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE token_hash = $2 AND revoked = false
            "#,
        )
        .bind(Utc::now())
        .bind(hash)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Nothing flipped: either already revoked or never existed.
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM refresh_tokens WHERE token_hash = $1)",
        )
        .bind(hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if exists {
            Ok(false)
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
