//! Authentication middleware
//!
//! Protects routes that require authentication.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};

use super::gate::{Admission, Principal};
use crate::AppState;
use crate::error::AppError;

async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<Principal, AppError> {
    match state.gate.admit(headers).await {
        Admission::Admitted(principal) => Ok(principal),
        Admission::Rejected(reason) => Err(AppError::Unauthorized(reason)),
    }
}

/// Middleware to require authentication
///
/// Runs the auth gate on the bearer token and adds the `Principal`
/// to request extensions if admitted.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/api/v1/...", ...)
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let principal = authenticate(request.headers(), &state).await?;
    tracing::debug!(account_id = %principal.account_id.0, "Request admitted");

    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

/// Extractor for the current authenticated caller
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(principal): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", principal.account_id.0)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    /// Reuses the principal admitted by `require_auth`, or runs the gate
    /// itself when the route is not behind the middleware.
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>().cloned() {
            return Ok(CurrentUser(principal));
        }

        let state = AppState::from_ref(state);
        let principal = authenticate(&parts.headers, &state).await?;
        parts.extensions.insert(principal.clone());

        Ok(CurrentUser(principal))
    }
}
