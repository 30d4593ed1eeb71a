//! SocialHub - accounts, posts, likes, comments, follows and a following feed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - JSON and multipart handlers under /api/v1                │
//! │  - Auth gate middleware                                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Account and post flows                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - Key-value stores (moka or Redis): revocations, cache     │
//! │  - Local media directory                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Database, key-value stores and cache-aside
//! - `storage`: Uploaded media on disk
//! - `auth`: Password hashing, session tokens, revocation and the auth gate
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request. Every handle inside is process-wide and safe
/// for concurrent use; `shutdown` releases the pool and the key-value stores.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Key-value stores of the read cache and the revocation list
    pub kv: data::KeyValueStores,

    /// Bearer token admission
    pub gate: Arc<auth::AuthGate>,

    /// Uploaded media on local disk
    pub storage: Arc<storage::MediaStorage>,

    pub accounts: Arc<service::AccountService>,
    pub posts: Arc<service::PostService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database and run migrations
    /// 2. Connect the key-value stores
    /// 3. Prepare the media directory
    /// 4. Build hasher, token service, revocation list and auth gate
    /// 5. Wire services
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database).await?);
        tracing::info!(path = %config.database.path.display(), "Database connected");

        // 2. Connect the key-value stores
        let kv = match data::connect_key_value_stores(&config.cache).await {
            Ok(kv) => kv,
            Err(e) => {
                db.close().await;
                return Err(e.into());
            }
        };
        tracing::info!(backend = ?config.cache.backend, "Key-value stores connected");

        // 3. Prepare the media directory
        let storage = Arc::new(storage::MediaStorage::new(&config.media).await?);
        tracing::info!(root = %config.media.root.display(), "Media storage initialized");

        // 4. Authentication
        let hasher = Arc::new(auth::CredentialHasher::new(&config.auth.password_hash)?);
        let tokens =
            auth::SessionTokenService::new(&config.auth.token_secret, config.auth.token_ttl_seconds);
        let revocations = auth::RevocationStore::new(kv.revocations.clone());
        let gate = Arc::new(auth::AuthGate::new(tokens.clone(), revocations.clone()));

        // 5. Services
        let cache = data::CacheAsideStore::new(kv.cache.clone());
        let accounts = Arc::new(service::AccountService::new(
            db.clone(),
            hasher,
            tokens,
            revocations,
            cache.clone(),
            storage.clone(),
            config.cache.profile_ttl(),
        ));
        let posts = Arc::new(service::PostService::new(
            db.clone(),
            cache,
            storage.clone(),
            config.cache.feed_ttl(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            kv,
            gate,
            storage,
            accounts,
            posts,
        })
    }

    /// Release the connection pool and the key-value stores.
    pub async fn shutdown(&self) {
        self.db.close().await;
        self.kv.close().await;
        tracing::info!("Connections closed");
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use std::time::Duration;

    use axum::Router;
    use axum::extract::DefaultBodyLimit;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, services::ServeDir,
        trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_seconds);
    // Room for a post's worth of images plus form overhead.
    let body_limit = state
        .config
        .media
        .max_upload_bytes
        .saturating_mul(service::MAX_IMAGES_PER_POST + 1);

    let routes = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api::api_router(state.clone()))
        .nest_service(storage::PUBLIC_PREFIX, ServeDir::new(state.storage.root()))
        .layer(axum::middleware::from_fn(api::track_http_metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit));

    with_request_timeout(routes, request_timeout)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    let Some(origin) = server.cors_origin.as_deref() else {
        return CorsLayer::permissive();
    };

    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %origin,
                "Failed to parse server.cors_origin; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

/// Bound every request by `timeout`.
///
/// An elapsed request is dropped and answered with the same 504 envelope as
/// an operation that ran past its own deadline.
fn with_request_timeout<S>(router: axum::Router<S>, timeout: std::time::Duration) -> axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    use axum::error_handling::HandleErrorLayer;
    use tower::ServiceBuilder;

    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_request_error))
            .layer(tower::timeout::TimeoutLayer::new(timeout)),
    )
}

async fn handle_request_error(error: tower::BoxError) -> error::AppError {
    if error.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Request exceeded its deadline");
        error::AppError::Timeout("request")
    } else {
        error::AppError::Internal(anyhow::anyhow!("request failed: {error}"))
    }
}

async fn health_check() -> &'static str {
    "OK"
}
