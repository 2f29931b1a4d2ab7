use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::auth::{jwt::TokenError, session::AuthError};

/// JSON body sent with every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Every failure a request can end in. `into_response` is the only place
/// that decides status codes.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::BadRequest(message) => ErrorBody {
                code: "BAD_REQUEST".into(),
                message,
            },
            AppError::Unauthorized(message) => ErrorBody {
                code: "UNAUTHORIZED".into(),
                message,
            },
            AppError::Internal(e) => {
                error!(error = ?e, "request failed");
                ErrorBody {
                    code: "INTERNAL_ERROR".into(),
                    message: "Internal server error".into(),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingField(_)
            | AuthError::InvalidEmail
            | AuthError::MissingRefreshToken
            | AuthError::MissingBearer => AppError::BadRequest(e.to_string()),
            AuthError::InvalidCredentials
            | AuthError::InactiveRefreshToken
            | AuthError::RefreshRequired => AppError::Unauthorized(e.to_string()),
            AuthError::Token(TokenError::Expired) => AppError::unauthorized("Access token expired"),
            AuthError::Token(TokenError::Invalid | TokenError::Malformed) => {
                AppError::unauthorized("Invalid access token")
            }
            AuthError::Token(TokenError::Signing(_))
            | AuthError::MissingUser(_)
            | AuthError::Store(_)
            | AuthError::Hashing(_)
            | AuthError::Background(_) => AppError::Internal(e.into()),
        }
    }
}
