//! Registration, login and logout endpoints

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, post},
};

use super::dto::{AccountResponse, ApiResponse, LoginRequest, RegisterRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::service::IssuedToken;

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<ApiResponse<AccountResponse>, AppError> {
    let account = state.accounts.register(&req.email, &req.password).await?;
    Ok(ApiResponse::created(account.into()).message("account created"))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<ApiResponse<IssuedToken>, AppError> {
    let issued = state.accounts.login(&req.email, &req.password).await?;
    Ok(ApiResponse::ok(issued).message("login successful"))
}

/// DELETE /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<ApiResponse<()>, AppError> {
    state.accounts.logout(&principal).await?;
    Ok(ApiResponse::message_only("logged out"))
}

/// Routes that do not need a token
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Routes behind the auth gate
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/auth/logout", delete(logout))
}
