//! Post, like, comment and feed endpoints

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    routing::{get, post},
};

use super::dto::{ApiResponse, CommentRequest, LikeRequest, LikeResponse};
use super::multipart::{next_field, read_text, read_upload};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{Comment, FeedPost, Post};
use crate::error::AppError;
use crate::service::MAX_IMAGES_PER_POST;

/// POST /api/v1/post
///
/// Multipart fields: `text-content` and any number of `images` files.
async fn create_post(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<Post>, AppError> {
    let max_bytes = state.config.media.max_upload_bytes;
    let mut text_content = String::new();
    let mut images = Vec::new();

    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "text-content" => text_content = read_text(field).await?,
            "images" => {
                if images.len() == MAX_IMAGES_PER_POST {
                    return Err(AppError::Validation(format!(
                        "at most {} images per post",
                        MAX_IMAGES_PER_POST
                    )));
                }
                images.push(read_upload(field, max_bytes).await?);
            }
            other => tracing::debug!(field = other, "Ignoring unknown post field"),
        }
    }

    let post = state
        .posts
        .create_post(principal.account_id.as_str(), &text_content, &images)
        .await?;
    Ok(ApiResponse::created(post).message("post created"))
}

/// GET /api/v1/post/:id
async fn get_post(
    State(state): State<AppState>,
    CurrentUser(_principal): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<ApiResponse<Post>, AppError> {
    let post = state.posts.get_post(&post_id).await?;
    Ok(ApiResponse::ok(post))
}

/// POST /api/v1/post/like
async fn like(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<LikeRequest>,
) -> Result<ApiResponse<LikeResponse>, AppError> {
    let outcome = state
        .posts
        .like(principal.account_id.as_str(), &req.post_id)
        .await?;
    let response = LikeResponse::new(req.post_id, principal.account_id.0, outcome);
    let message = response.message();
    Ok(ApiResponse::ok(response).message(message))
}

/// POST /api/v1/post/comment
async fn comment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<CommentRequest>,
) -> Result<ApiResponse<Comment>, AppError> {
    let comment = state
        .posts
        .comment(principal.account_id.as_str(), &req.post_id, &req.comment)
        .await?;
    Ok(ApiResponse::created(comment).message("comment added"))
}

/// GET /api/v1/feed
async fn feed(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<ApiResponse<Vec<FeedPost>>, AppError> {
    let posts = state
        .posts
        .following_feed(principal.account_id.as_str())
        .await?;
    Ok(ApiResponse::ok(posts))
}

/// Routes behind the auth gate
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/post", post(create_post))
        .route("/post/:id", get(get_post))
        .route("/post/like", post(like))
        .route("/post/comment", post(comment))
        .route("/feed", get(feed))
}
