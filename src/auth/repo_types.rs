use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                     // unique user ID
    pub email: String,                // normalized email
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub created_at: OffsetDateTime,   // creation timestamp
    pub updated_at: OffsetDateTime,   // last credential change
}

/// A freshly issued refresh token. `token` is the plaintext value handed to
/// the client; only its digest is persisted.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}
