//! Error types for SocialHub
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::{HashError, RejectReason, TokenError};
use crate::data::StoreError;

/// Application-wide error type
///
/// Each variant belongs to one class of failure: input, authentication,
/// conflict, consistency or infrastructure. The HTTP mapping lives in
/// `into_response`; the core never chooses status codes itself.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request rejected by the auth gate (401, or 503 when the revocation list is down)
    #[error("Unauthorized: {0}")]
    Unauthorized(RejectReason),

    /// Unknown email or wrong password (401)
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Account does not exist (404)
    #[error("Account not found")]
    AccountNotFound,

    /// Post does not exist (404)
    #[error("Post not found")]
    PostNotFound,

    /// Email already registered (409)
    #[error("Account already exists")]
    DuplicateAccount,

    /// Follow edge already present (409)
    #[error("Already following this account")]
    AlreadyFollowing,

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key-value store error on a path that cannot degrade (500)
    #[error("Key-value store error: {0}")]
    KeyValue(#[from] StoreError),

    /// Stored password digest is unusable (500)
    #[error("Credential error: {0}")]
    Credential(#[from] HashError),

    /// Token could not be signed (500)
    #[error("Token error: {0}")]
    Token(TokenError),

    /// Media storage error (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation exceeded its deadline (504)
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err.reject_reason() {
            Some(reason) => AppError::Unauthorized(reason),
            None => AppError::Token(err),
        }
    }
}

impl AppError {
    /// Status code and machine-readable error type for this error.
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::Unauthorized(RejectReason::RevocationUnavailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, "auth_unavailable")
            }
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::AccountNotFound | AppError::PostNotFound => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            AppError::DuplicateAccount | AppError::AlreadyFollowing => {
                (StatusCode::CONFLICT, "conflict")
            }
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database"),
            AppError::KeyValue(_) => (StatusCode::INTERNAL_SERVER_ERROR, "key_value"),
            AppError::Credential(_) => (StatusCode::INTERNAL_SERVER_ERROR, "credential"),
            AppError::Token(_) => (StatusCode::INTERNAL_SERVER_ERROR, "token"),
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }

    /// Message safe to show to clients.
    ///
    /// Infrastructure details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Unauthorized(reason) => reason.message().to_string(),
            AppError::Database(_)
            | AppError::KeyValue(_)
            | AppError::Credential(_)
            | AppError::Token(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and the `{success, status, message}` envelope.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        } else {
            tracing::debug!(error = %self, error_type, "Request rejected");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "success": false,
            "status": status.as_u16(),
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
