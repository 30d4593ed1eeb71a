//! API request and response DTOs
//!
//! Every JSON response uses the `{success, status, data?, message?}`
//! envelope; errors produce the same shape from `AppError`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Account, LikeOutcome};

/// Response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with data
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, data)
    }

    /// 201 with data
    pub fn created(data: T) -> Self {
        Self::with_status(StatusCode::CREATED, data)
    }

    fn with_status(status: StatusCode, data: T) -> Self {
        Self {
            success: true,
            status: status.as_u16(),
            data: Some(data),
            message: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// 200 with only a message
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            status: StatusCode::OK.as_u16(),
            data: None,
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registered account, without credentials
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            created_at: account.created_at,
        }
    }
}

// =============================================================================
// Posts
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub post_id: String,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub post_id: String,
    pub account_id: String,
    pub already_liked: bool,
}

impl LikeResponse {
    pub fn new(post_id: String, account_id: String, outcome: LikeOutcome) -> Self {
        Self {
            post_id,
            account_id,
            already_liked: outcome == LikeOutcome::AlreadyLiked,
        }
    }

    pub fn message(&self) -> &'static str {
        if self.already_liked {
            "post already liked"
        } else {
            "post liked successfully"
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub post_id: String,
    pub comment: String,
}
