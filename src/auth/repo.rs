use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::{RefreshToken, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record conflicts with an existing one")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        _ => StoreError::Database(e),
    }
}

/// 32 bytes from the OS RNG, URL-safe so it can ride in a cookie untouched.
pub(crate) fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Only the digest of a refresh token is ever stored.
pub(crate) fn digest_token(token: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(token.as_bytes()))
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Replaces email and hash, bumping `updated_at`. `None` if the user is gone.
    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Issues a new token. The user's expired and revoked rows are swept first.
    async fn save(&self, user_id: Uuid) -> Result<RefreshToken, StoreError>;
    /// Owner of the token, only while it is unexpired and unrevoked.
    async fn find_active_by_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Idempotent: unknown or already revoked tokens are not an error.
    async fn revoke(&self, token: &str) -> Result<(), StoreError>;
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, password_hash, created_at, updated_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, updated_at = now()
            WHERE id = $1
            RETURNING id, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    db: PgPool,
    ttl: Duration,
}

impl PgRefreshTokenStore {
    pub fn new(db: PgPool, ttl: Duration) -> Self {
        Self { db, ttl }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn save(&self, user_id: Uuid) -> Result<RefreshToken, StoreError> {
        let swept = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1 AND (expires_at <= now() OR revoked_at IS NOT NULL)
            "#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await?
        .rows_affected();
        if swept > 0 {
            debug!(user_id = %user_id, swept, "inactive refresh tokens removed");
        }

        let token = generate_refresh_token();
        let expires_at = OffsetDateTime::now_utc() + self.ttl;
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(digest_token(&token))
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(map_write_err)?;
        Ok(RefreshToken {
            token,
            user_id,
            expires_at,
        })
    }

    async fn find_active_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.password_hash, u.created_at, u.updated_at
            FROM refresh_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.token_hash = $1
              AND t.revoked_at IS NULL
              AND t.expires_at > now()
            "#,
        )
        .bind(digest_token(token))
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE refresh_tokens SET revoked_at = now() WHERE token_hash = $1 AND revoked_at IS NULL"#,
        )
        .bind(digest_token(token))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query(
            r#"UPDATE refresh_tokens SET revoked_at = now() WHERE user_id = $1 AND revoked_at IS NULL"#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected())
    }
}
