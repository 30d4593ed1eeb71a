//! Common test utilities for E2E tests

use serde_json::{Value, json};
use socialhub::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database and media
        let temp_dir = TempDir::new().unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                request_timeout_seconds: 10,
                cors_origin: None,
            },
            database: config::DatabaseConfig {
                path: temp_dir.path().join("test.db"),
                max_connections: 8,
                acquire_timeout_ms: 2000,
                statement_timeout_ms: 5000,
            },
            cache: config::CacheConfig {
                backend: config::CacheBackend::Memory,
                redis_url: None,
                max_capacity: 10_000,
                op_timeout_ms: 500,
                feed_ttl_seconds: 60,
                profile_ttl_seconds: 60,
            },
            auth: config::AuthConfig {
                token_secret: "test-secret-key-that-is-32-bytes!".to_string(),
                token_ttl_seconds: 3600,
                password_hash: config::PasswordHashConfig {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                },
            },
            media: config::MediaConfig {
                root: temp_dir.path().join("media"),
                max_upload_bytes: 64 * 1024,
                allowed_extensions: config::default_allowed_extensions(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = socialhub::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Register an account through the API and return its id
    pub async fn register(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);

        let body: Value = response.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    /// Log in through the API and return the bearer token
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        body["data"]["token"].as_str().unwrap().to_string()
    }

    /// Register and log in; returns `(account_id, token)`
    pub async fn signed_up(&self, email: &str) -> (String, String) {
        let account_id = self.register(email, "correct-horse-battery").await;
        let token = self.login(email, "correct-horse-battery").await;
        (account_id, token)
    }

    /// Create a post with one PNG image; returns the post id
    pub async fn create_post(&self, token: &str, text: &str) -> String {
        let image = reqwest::multipart::Part::bytes(b"\x89PNG\r\n\x1a\n".to_vec())
            .file_name("photo.png")
            .mime_str("image/png")
            .unwrap();
        let form = reqwest::multipart::Form::new()
            .text("text-content", text.to_string())
            .part("images", image);

        let response = self
            .client
            .post(self.url("/api/v1/post"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);

        let body: Value = response.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }
}
