//! API layer
//!
//! HTTP handlers for:
//! - Registration, login and logout
//! - Profiles and follows
//! - Posts, likes, comments and the following feed
//! - Metrics (Prometheus)

mod auth;
mod dto;
pub mod metrics;
mod multipart;
mod posts;
mod users;

pub use dto::*;
pub use metrics::{metrics_router, track_http_metrics};

use axum::{Router, middleware};

use crate::AppState;
use crate::auth::require_auth;

/// Versioned API router, mounted at `/api/v1`.
///
/// Registration and login are public; everything else passes the auth
/// gate before reaching its handler.
pub fn api_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .merge(auth::protected_router())
        .merge(users::protected_router())
        .merge(posts::protected_router())
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new().merge(auth::public_router()).merge(protected)
}
