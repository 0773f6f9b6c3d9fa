//! HTTP error mapping. Every error category from the domain crates lands
//! on exactly one status code; unexpected failures are logged in full and
//! surfaced as a generic 500.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use errors::{AuthError, StorageError, TokenError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = match &self {
            // Never leak internals to the client; the log has the context.
            ApiError::Internal(inner) => {
                tracing::error!(error = %inner, "Unhandled internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{entity} {id} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Keypair { reason } => ApiError::Internal(reason),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::Unauthorized(err.to_string()),
            AuthError::Token(token_err) => token_err.into(),
            AuthError::WrongTokenType { .. } | AuthError::InsufficientRole { .. } => {
                ApiError::Forbidden(err.to_string())
            }
            AuthError::InvalidAgentKey | AuthError::InvalidAdminKey => {
                ApiError::Forbidden(err.to_string())
            }
            AuthError::AgentInactive { .. } => ApiError::NotFound(err.to_string()),
        }
    }
}
