use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::session::AuthError;
use crate::{error::AppError, state::AppState};

/// Extracts and validates a `Bearer` access token, returning the user ID.
/// A missing header is a bad request; a bad token is unauthorized.
pub struct BearerUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for BearerUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingBearer)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingBearer)?;

        let user_id = state.sessions.authenticate(token).map_err(|e| {
            warn!(error = %e, "bearer token rejected");
            e
        })?;
        Ok(BearerUser(user_id))
    }
}
