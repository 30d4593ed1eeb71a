//! Profile and follow endpoints

use axum::{
    Router,
    extract::{Multipart, Path, State},
    routing::{get, patch, post},
};

use super::dto::ApiResponse;
use super::multipart::{next_field, read_text, read_upload};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{FollowEdge, Profile};
use crate::error::AppError;
use crate::service::ProfileEdit;

/// GET /api/v1/user/:id
async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(_principal): CurrentUser,
    Path(account_id): Path<String>,
) -> Result<ApiResponse<Profile>, AppError> {
    let profile = state.accounts.get_profile(&account_id).await?;
    Ok(ApiResponse::ok(profile))
}

/// PATCH /api/v1/user
///
/// Multipart fields: `name`, `bio`, `avatar` (file). All optional.
async fn edit_profile(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<Profile>, AppError> {
    let max_bytes = state.config.media.max_upload_bytes;
    let mut edit = ProfileEdit::default();

    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "name" => edit.name = Some(read_text(field).await?),
            "bio" => edit.bio = Some(read_text(field).await?),
            "avatar" => edit.avatar = Some(read_upload(field, max_bytes).await?),
            other => tracing::debug!(field = other, "Ignoring unknown profile field"),
        }
    }

    let profile = state
        .accounts
        .edit_profile(principal.account_id.as_str(), edit)
        .await?;
    Ok(ApiResponse::ok(profile).message("profile updated"))
}

/// POST /api/v1/user/:id/follow
async fn follow(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(target_id): Path<String>,
) -> Result<ApiResponse<FollowEdge>, AppError> {
    let edge = state
        .accounts
        .follow(principal.account_id.as_str(), &target_id)
        .await?;
    Ok(ApiResponse::created(edge).message("followed successfully"))
}

/// Routes behind the auth gate
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/user", patch(edit_profile))
        .route("/user/:id", get(get_profile))
        .route("/user/:id/follow", post(follow))
}
