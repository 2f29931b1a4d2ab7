//! Login, refresh, logout and credential flows.
//!
//! A refresh token moves `active -> revoked` on logout or credential change,
//! or becomes expired once `expires_at` passes. Neither state leads back to
//! `active`; the store only ever answers for active tokens.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CredentialsRequest, PublicUser},
    jwt::{TokenError, TokenKeys},
    password::{hash_password, verify_password, HashingError, DUMMY_HASH},
    repo::{RefreshTokenStore, StoreError, UserStore},
    repo_types::RefreshToken,
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Refresh token cookie is required")]
    MissingRefreshToken,
    #[error("Bearer token is required")]
    MissingBearer,
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("Refresh token is invalid, expired or revoked")]
    InactiveRefreshToken,
    #[error("Access token missing, refresh required")]
    RefreshRequired,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("user {0} no longer exists")]
    MissingUser(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Hashing(#[from] HashingError),
    #[error("background task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Pulls both fields out of the body, rejecting absent or blank values.
fn require_credentials(req: CredentialsRequest) -> Result<(String, String), AuthError> {
    let email = req
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or(AuthError::MissingField("email"))?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or(AuthError::MissingField("password"))?;
    Ok((email, password))
}

// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(plain: String) -> Result<String, AuthError> {
    Ok(tokio::task::spawn_blocking(move || hash_password(&plain)).await??)
}

async fn verify_blocking(plain: String, hash: String) -> Result<bool, AuthError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await??)
}

/// Result of a successful login: the user plus both freshly minted tokens.
#[derive(Debug)]
pub struct LoginSession {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: RefreshToken,
}

#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    keys: TokenKeys,
    refresh_ttl: time::Duration,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        keys: TokenKeys,
        refresh_ttl: time::Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            keys,
            refresh_ttl,
        }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl.whole_seconds().max(0) as u64
    }

    #[instrument(skip(self, req))]
    pub async fn register(&self, req: CredentialsRequest) -> Result<PublicUser, AuthError> {
        let (email, password) = require_credentials(req)?;
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::InvalidEmail);
        }

        let hash = hash_blocking(password).await?;
        let user = self.users.create(&email, &hash).await.map_err(|e| {
            if matches!(e, StoreError::Conflict) {
                warn!(email = %email, "email already registered");
            }
            e
        })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user.into())
    }

    #[instrument(skip(self, req))]
    pub async fn login(&self, req: CredentialsRequest) -> Result<LoginSession, AuthError> {
        let (email, password) = require_credentials(req)?;

        let Some(user) = self.users.find_by_email(&email).await? else {
            // pay the same Argon2 cost as a wrong password
            let _ = verify_blocking(password, DUMMY_HASH.to_string()).await;
            warn!(email = %email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_blocking(password, user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.keys.issue_default(user.id)?;
        let refresh_token = self.tokens.save(user.id).await?;

        info!(
            user_id = %refresh_token.user_id,
            refresh_expires_at = %refresh_token.expires_at,
            "user logged in"
        );
        Ok(LoginSession {
            user: user.into(),
            access_token,
            refresh_token,
        })
    }

    /// Mints a new access token from an active refresh token. The refresh
    /// token itself is left as is.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<String, AuthError> {
        let token = refresh_token.ok_or(AuthError::MissingRefreshToken)?;
        let Some(user) = self.tokens.find_active_by_token(token).await? else {
            warn!("refresh with inactive token");
            return Err(AuthError::InactiveRefreshToken);
        };
        let access_token = self.keys.issue_default(user.id)?;
        info!(user_id = %user.id, "access token refreshed");
        Ok(access_token)
    }

    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        let token = refresh_token.ok_or(AuthError::MissingRefreshToken)?;
        self.tokens.revoke(token).await?;
        info!("refresh token revoked");
        Ok(())
    }

    pub fn authenticate(&self, access_token: &str) -> Result<Uuid, AuthError> {
        Ok(self.keys.validate(access_token)?)
    }

    /// Revokes every refresh token the user holds, then replaces email and
    /// password. If revocation fails nothing is changed; if the update fails
    /// the old sessions are already gone.
    #[instrument(skip(self, req))]
    pub async fn update_credentials(
        &self,
        user_id: Uuid,
        req: CredentialsRequest,
    ) -> Result<PublicUser, AuthError> {
        let (email, password) = require_credentials(req)?;
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let hash = hash_blocking(password).await?;
        let revoked = self.tokens.revoke_all_for_user(user_id).await?;
        let user = self
            .users
            .update_credentials(user_id, &email, &hash)
            .await?
            .ok_or(AuthError::MissingUser(user_id))?;

        info!(user_id = %user.id, revoked, "credentials updated");
        Ok(user.into())
    }

    /// Anonymous callers get `None`. A caller holding only a refresh token is
    /// told to refresh rather than treated as anonymous.
    #[instrument(skip_all)]
    pub async fn current_user(
        &self,
        access_token: Option<&str>,
        has_refresh_token: bool,
    ) -> Result<Option<PublicUser>, AuthError> {
        let Some(token) = access_token else {
            return if has_refresh_token {
                Err(AuthError::RefreshRequired)
            } else {
                Ok(None)
            };
        };

        let user_id = self.authenticate(token)?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::MissingUser(user_id))?;
        Ok(Some(user.into()))
    }
}
