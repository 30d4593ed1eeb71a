//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Whole-request deadline; the handler future is dropped when it passes
    pub request_timeout_seconds: u64,
    /// Allowed CORS origin; permissive when unset
    pub cors_origin: Option<String>,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
    /// Upper bound of pooled connections shared by all requests
    pub max_connections: u32,
    /// How long a request may wait for a pooled connection
    pub acquire_timeout_ms: u64,
    /// Deadline for a single store operation (including its transaction)
    pub statement_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

/// Key-value backend selector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process store, lost on restart
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

/// Cache and revocation store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Redis URL, required when backend = "redis"
    pub redis_url: Option<String>,
    /// Maximum entries held by the in-memory read cache
    pub max_capacity: u64,
    /// Deadline for a single key-value operation
    pub op_timeout_ms: u64,
    /// Staleness bound of cached following feeds
    pub feed_ttl_seconds: u64,
    /// Staleness bound of cached profiles
    pub profile_ttl_seconds: u64,
}

impl CacheConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_seconds)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_seconds)
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Token signing key (32+ bytes), fixed for the process lifetime
    pub token_secret: String,
    /// Token lifetime in seconds (default: 86400 = 1 day)
    pub token_ttl_seconds: i64,
    pub password_hash: PasswordHashConfig,
}

/// Argon2id work factor
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Uploaded media configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory that receives post images and avatars
    pub root: PathBuf,
    /// Per-file upload limit in bytes
    pub max_upload_bytes: usize,
    /// Accepted file extensions, lowercase, without the dot
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

pub fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "webp"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (SOCIALHUB__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.request_timeout_seconds", 30)?
            .set_default("database.path", "data/socialhub.db")?
            .set_default("database.max_connections", 16)?
            .set_default("database.acquire_timeout_ms", 3000)?
            .set_default("database.statement_timeout_ms", 5000)?
            .set_default("cache.backend", "memory")?
            .set_default("cache.max_capacity", 100_000)?
            .set_default("cache.op_timeout_ms", 500)?
            .set_default("cache.feed_ttl_seconds", 60)?
            .set_default("cache.profile_ttl_seconds", 300)?
            .set_default("auth.token_ttl_seconds", 86400)?
            .set_default("auth.password_hash.memory_kib", 19456)?
            .set_default("auth.password_hash.iterations", 2)?
            .set_default("auth.password_hash.parallelism", 1)?
            .set_default("media.root", "public")?
            .set_default("media.max_upload_bytes", 5 * 1024 * 1024)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SOCIALHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;
        const MIN_TOKEN_SECRET_BYTES: usize = 32;

        if self.auth.token_secret.len() < MIN_TOKEN_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "auth.token_secret must be at least {} bytes",
                MIN_TOKEN_SECRET_BYTES
            )));
        }

        if self.auth.token_ttl_seconds <= 0 {
            return Err(AppError::Config(
                "auth.token_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        let hash = &self.auth.password_hash;
        argon2::Params::new(hash.memory_kib, hash.iterations, hash.parallelism, None)
            .map_err(|e| AppError::Config(format!("auth.password_hash is invalid: {e}")))?;

        if self.cache.backend == CacheBackend::Redis
            && self
                .cache
                .redis_url
                .as_deref()
                .map(str::trim)
                .is_none_or(str::is_empty)
        {
            return Err(AppError::Config(
                "cache.redis_url is required when cache.backend=redis".to_string(),
            ));
        }

        if self.cache.feed_ttl_seconds == 0 || self.cache.profile_ttl_seconds == 0 {
            return Err(AppError::Config(
                "cache ttl values must be greater than 0".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.media.allowed_extensions.is_empty() {
            return Err(AppError::Config(
                "media.allowed_extensions must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                request_timeout_seconds: 30,
                cors_origin: None,
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/socialhub-test.db"),
                max_connections: 4,
                acquire_timeout_ms: 1000,
                statement_timeout_ms: 1000,
            },
            cache: CacheConfig {
                backend: CacheBackend::Memory,
                redis_url: None,
                max_capacity: 1000,
                op_timeout_ms: 200,
                feed_ttl_seconds: 60,
                profile_ttl_seconds: 300,
            },
            auth: AuthConfig {
                token_secret: "x".repeat(32),
                token_ttl_seconds: 3600,
                password_hash: PasswordHashConfig {
                    memory_kib: 1024,
                    iterations: 1,
                    parallelism: 1,
                },
            },
            media: MediaConfig {
                root: PathBuf::from("/tmp/socialhub-media"),
                max_upload_bytes: 1024,
                allowed_extensions: default_allowed_extensions(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_token_secret() {
        let mut config = valid_config();
        config.auth.token_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("token secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("auth.token_secret")
        ));
    }

    #[test]
    fn validate_rejects_redis_without_url() {
        let mut config = valid_config();
        config.cache.backend = CacheBackend::Redis;
        config.cache.redis_url = Some("  ".to_string());

        let error = config.validate().expect_err("redis backend needs a url");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("cache.redis_url")
        ));
    }

    #[test]
    fn validate_rejects_unusable_hash_parameters() {
        let mut config = valid_config();
        config.auth.password_hash.parallelism = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_cache_ttl() {
        let mut config = valid_config();
        config.cache.feed_ttl_seconds = 0;

        assert!(config.validate().is_err());
    }
}
