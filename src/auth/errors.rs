//! # Auth Error Types
//!
//! Status-bearing errors for the authentication subsystem.
//!
//! Every workflow failure is normalized into one of four caller-facing
//! kinds before it leaves the service layer. Messages are deliberately
//! generic where a specific one would aid credential guessing: login,
//! OTP validation and token validation report the same message for
//! every root cause.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result alias used across the auth module
pub type AuthResult<T> = Result<T, AuthError>;

/// Caller-facing auth error
///
/// Variants map 1:1 onto HTTP status codes; handlers convert them with
/// [`AuthError::status_code`] or via the [`IntoResponse`] impl.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing/invalid session token, wrong credentials, failed OTP or
    /// recovery-code check
    #[error("{0}")]
    Unauthorized(String),

    /// Permission precondition not met (unverified account, reused
    /// recovery code, reset cancellation without an active request)
    #[error("{0}")]
    Forbidden(String),

    /// Malformed or expired action tokens, illegal state transitions
    #[error("{0}")]
    BadRequest(String),

    /// User lookup miss
    #[error("{0}")]
    NotFound(String),

    /// Infrastructure failure (store, hashing, mail transport); the only
    /// kind that surfaces as a 500
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// HTTP status code for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs, not in the response body.
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                "something went wrong".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "status": if status.is_server_error() { "error" } else { "fail" },
            "message": message,
        }));

        (status, body).into_response()
    }
}

// ==================
// Tests
// ==================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::unauthorized("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::forbidden("x").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display_is_message() {
        let err = AuthError::unauthorized("wrong credentials");
        assert_eq!(err.to_string(), "wrong credentials");
    }
}
