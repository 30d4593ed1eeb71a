//! SQLite database operations
//!
//! All database access goes through this module.
//! Multi-statement writes run in a single transaction; dropping an
//! unfinished transaction (for example when a request deadline fires)
//! rolls it back.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use super::models::*;
use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::metrics::{DB_QUERY_DURATION_SECONDS, DB_TRANSACTIONS_TOTAL};

/// Number of posts returned by the following feed
pub const FEED_LIMIT: i64 = 10;

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn constraint_kind(error: &sqlx::Error) -> Option<ErrorKind> {
    match error {
        sqlx::Error::Database(db_err) => Some(db_err.kind()),
        _ => None,
    }
}

fn record_transaction<T>(operation: &'static str, result: &Result<T, AppError>) {
    let outcome = if result.is_ok() { "commit" } else { "rollback" };
    DB_TRANSACTIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
    op_timeout: Duration,
}

impl Database {
    /// Connect to the configured SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let path = config.path.as_path();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.statement_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(
            path = %path.display(),
            max_connections = config.max_connections,
            "Database connected and migrated successfully"
        );

        Ok(Self {
            pool,
            op_timeout: config.statement_timeout(),
        })
    }

    /// Connect to a database file with default pool settings.
    pub async fn connect_path(path: &Path) -> Result<Self, AppError> {
        Self::connect(&DatabaseConfig {
            path: path.to_path_buf(),
            max_connections: 8,
            acquire_timeout_ms: 3000,
            statement_timeout_ms: 5000,
        })
        .await
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }

    /// Run one store operation under the per-operation deadline.
    ///
    /// On expiry the future is dropped, which rolls back any open
    /// transaction it owns.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let started = Instant::now();
        let result = tokio::time::timeout(self.op_timeout, fut)
            .await
            .unwrap_or(Err(AppError::Timeout(operation)));
        DB_QUERY_DURATION_SECONDS
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create an account and its empty profile atomically.
    ///
    /// # Errors
    /// `DuplicateAccount` when the email is already registered
    pub async fn create_account(&self, email: &str, password_hash: &str) -> Result<Account, AppError> {
        self.bounded("create_account", async {
            let account = Account {
                id: EntityId::new().0,
                email: email.to_string(),
                created_at: Utc::now(),
            };
            let created_at = timestamp(account.created_at);

            let mut tx = self.pool.begin().await?;
            let result = async {
                sqlx::query(
                    r#"
                    INSERT INTO accounts (id, email, password_hash, created_at)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(&account.id)
                .bind(&account.email)
                .bind(password_hash)
                .bind(&created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| match constraint_kind(&e) {
                    Some(ErrorKind::UniqueViolation) => AppError::DuplicateAccount,
                    _ => AppError::Database(e),
                })?;

                sqlx::query(
                    r#"
                    INSERT INTO profiles (account_id, name, bio, avatar, created_at, updated_at)
                    VALUES (?, NULL, NULL, NULL, ?, ?)
                    "#,
                )
                .bind(&account.id)
                .bind(&created_at)
                .bind(&created_at)
                .execute(&mut *tx)
                .await?;

                Ok::<(), AppError>(())
            }
            .await;

            record_transaction("create_account", &result);
            match result {
                Ok(()) => {
                    tx.commit().await?;
                    Ok(account)
                }
                Err(error) => {
                    let _ = tx.rollback().await;
                    Err(error)
                }
            }
        })
        .await
    }

    /// Look up login material by (normalized) email.
    pub async fn get_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, AppError> {
        self.bounded("get_credentials", async {
            let credentials = sqlx::query_as::<_, Credentials>(
                "SELECT id AS account_id, password_hash FROM accounts WHERE email = ?",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
            Ok::<_, AppError>(credentials)
        })
        .await
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Get the profile of an account, joined with its email.
    pub async fn get_profile(&self, account_id: &str) -> Result<Option<Profile>, AppError> {
        self.bounded("get_profile", async {
            let profile = sqlx::query_as::<_, Profile>(
                r#"
                SELECT p.account_id, a.email, p.name, p.bio, p.avatar, p.created_at, p.updated_at
                FROM profiles p
                INNER JOIN accounts a ON a.id = p.account_id
                WHERE p.account_id = ?
                "#,
            )
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok::<_, AppError>(profile)
        })
        .await
    }

    /// Apply a partial profile update.
    ///
    /// Returns the updated profile together with the avatar it replaced.
    ///
    /// # Errors
    /// `AccountNotFound` when the account has no profile
    pub async fn update_profile(
        &self,
        account_id: &str,
        patch: &ProfilePatch,
    ) -> Result<ProfileUpdate, AppError> {
        self.bounded("update_profile", async {
            let mut tx = self.pool.begin().await?;
            let result = async {
                let previous: Option<(Option<String>,)> =
                    sqlx::query_as("SELECT avatar FROM profiles WHERE account_id = ?")
                        .bind(account_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                let Some((previous_avatar,)) = previous else {
                    return Err(AppError::AccountNotFound);
                };

                sqlx::query(
                    r#"
                    UPDATE profiles
                    SET name = COALESCE(?, name),
                        bio = COALESCE(?, bio),
                        avatar = COALESCE(?, avatar),
                        updated_at = ?
                    WHERE account_id = ?
                    "#,
                )
                .bind(&patch.name)
                .bind(&patch.bio)
                .bind(&patch.avatar)
                .bind(timestamp(Utc::now()))
                .bind(account_id)
                .execute(&mut *tx)
                .await?;

                let profile = sqlx::query_as::<_, Profile>(
                    r#"
                    SELECT p.account_id, a.email, p.name, p.bio, p.avatar, p.created_at, p.updated_at
                    FROM profiles p
                    INNER JOIN accounts a ON a.id = p.account_id
                    WHERE p.account_id = ?
                    "#,
                )
                .bind(account_id)
                .fetch_one(&mut *tx)
                .await?;

                let previous_avatar = match (&patch.avatar, previous_avatar) {
                    (Some(new), Some(old)) if *new != old => Some(old),
                    _ => None,
                };

                Ok(ProfileUpdate {
                    profile,
                    previous_avatar,
                })
            }
            .await;

            record_transaction("update_profile", &result);
            match result {
                Ok(update) => {
                    tx.commit().await?;
                    Ok(update)
                }
                Err(error) => {
                    let _ = tx.rollback().await;
                    Err(error)
                }
            }
        })
        .await
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Create a post and its images as one unit.
    ///
    /// Image positions follow the order of `image_urls`. Either the post
    /// and every image row are committed, or nothing is.
    pub async fn create_post(
        &self,
        account_id: &str,
        text_content: &str,
        image_urls: &[String],
    ) -> Result<Post, AppError> {
        self.bounded("create_post", async {
            let now = Utc::now();
            let created_at = timestamp(now);

            let mut tx = self.pool.begin().await?;
            let result = async {
                let row = sqlx::query_as::<_, PostRow>(
                    r#"
                    INSERT INTO posts (id, account_id, text_content, created_at)
                    VALUES (?, ?, ?, ?)
                    RETURNING id, account_id, text_content, created_at
                    "#,
                )
                .bind(EntityId::new().0)
                .bind(account_id)
                .bind(text_content)
                .bind(&created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| match constraint_kind(&e) {
                    Some(ErrorKind::ForeignKeyViolation) => AppError::AccountNotFound,
                    _ => AppError::Database(e),
                })?;

                let mut images = Vec::with_capacity(image_urls.len());
                for (position, image_url) in image_urls.iter().enumerate() {
                    let image = sqlx::query_as::<_, PostImage>(
                        r#"
                        INSERT INTO post_images (id, post_id, position, image_url, created_at)
                        VALUES (?, ?, ?, ?, ?)
                        RETURNING id, post_id, position, image_url
                        "#,
                    )
                    .bind(EntityId::new().0)
                    .bind(&row.id)
                    .bind(position as i64)
                    .bind(image_url)
                    .bind(&created_at)
                    .fetch_one(&mut *tx)
                    .await?;
                    images.push(image);
                }

                Ok::<Post, AppError>(row.into_post(images))
            }
            .await;

            record_transaction("create_post", &result);
            match result {
                Ok(post) => {
                    tx.commit().await?;
                    Ok(post)
                }
                Err(error) => {
                    let _ = tx.rollback().await;
                    Err(error)
                }
            }
        })
        .await
    }

    /// Get a post with its images.
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>, AppError> {
        self.bounded("get_post", async {
            let Some(row) = sqlx::query_as::<_, PostRow>(
                "SELECT id, account_id, text_content, created_at FROM posts WHERE id = ?",
            )
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?
            else {
                return Ok(None);
            };

            let images = sqlx::query_as::<_, PostImage>(
                r#"
                SELECT id, post_id, position, image_url
                FROM post_images
                WHERE post_id = ?
                ORDER BY position ASC
                "#,
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

            Ok::<_, AppError>(Some(row.into_post(images)))
        })
        .await
    }

    // =========================================================================
    // Likes and comments
    // =========================================================================

    /// Record a like; liking twice is a no-op reported as `AlreadyLiked`.
    ///
    /// The unique (post, account) constraint decides, so concurrent likes
    /// by the same account leave exactly one row.
    ///
    /// # Errors
    /// `PostNotFound` when the post does not exist
    pub async fn like_post(&self, account_id: &str, post_id: &str) -> Result<LikeOutcome, AppError> {
        self.bounded("like_post", async {
            let inserted: Option<String> = sqlx::query_scalar(
                r#"
                INSERT INTO post_likes (id, post_id, account_id, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (post_id, account_id) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(EntityId::new().0)
            .bind(post_id)
            .bind(account_id)
            .bind(timestamp(Utc::now()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match constraint_kind(&e) {
                Some(ErrorKind::ForeignKeyViolation) => AppError::PostNotFound,
                _ => AppError::Database(e),
            })?;

            Ok::<_, AppError>(match inserted {
                Some(_) => LikeOutcome::Liked,
                None => LikeOutcome::AlreadyLiked,
            })
        })
        .await
    }

    /// Number of likes on a post.
    #[cfg(test)]
    pub async fn like_count(&self, post_id: &str) -> Result<i64, AppError> {
        self.bounded("like_count", async {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
                .bind(post_id)
                .fetch_one(&self.pool)
                .await?;
            Ok::<_, AppError>(count)
        })
        .await
    }

    /// Add a comment to a post.
    ///
    /// # Errors
    /// `PostNotFound` when the post does not exist
    pub async fn add_comment(
        &self,
        account_id: &str,
        post_id: &str,
        comment: &str,
    ) -> Result<Comment, AppError> {
        self.bounded("add_comment", async {
            let comment = sqlx::query_as::<_, Comment>(
                r#"
                INSERT INTO post_comments (id, post_id, account_id, comment, created_at)
                VALUES (?, ?, ?, ?, ?)
                RETURNING id, post_id, account_id, comment, created_at
                "#,
            )
            .bind(EntityId::new().0)
            .bind(post_id)
            .bind(account_id)
            .bind(comment)
            .bind(timestamp(Utc::now()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match constraint_kind(&e) {
                Some(ErrorKind::ForeignKeyViolation) => AppError::PostNotFound,
                _ => AppError::Database(e),
            })?;
            Ok::<_, AppError>(comment)
        })
        .await
    }

    // =========================================================================
    // Follow graph
    // =========================================================================

    /// Create a follow edge.
    ///
    /// # Errors
    /// - `AlreadyFollowing` when the edge exists
    /// - `AccountNotFound` when either account does not exist
    pub async fn follow(&self, follower_id: &str, followee_id: &str) -> Result<FollowEdge, AppError> {
        self.bounded("follow", async {
            let edge = sqlx::query_as::<_, FollowEdge>(
                r#"
                INSERT INTO follow_edges (id, follower_id, followee_id, created_at)
                VALUES (?, ?, ?, ?)
                RETURNING id, follower_id, followee_id, created_at
                "#,
            )
            .bind(EntityId::new().0)
            .bind(follower_id)
            .bind(followee_id)
            .bind(timestamp(Utc::now()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match constraint_kind(&e) {
                Some(ErrorKind::UniqueViolation) => AppError::AlreadyFollowing,
                Some(ErrorKind::ForeignKeyViolation) => AppError::AccountNotFound,
                Some(ErrorKind::CheckViolation) => {
                    AppError::Validation("cannot follow yourself".to_string())
                }
                _ => AppError::Database(e),
            })?;
            Ok::<_, AppError>(edge)
        })
        .await
    }

    /// Whether `follower_id` follows `followee_id`.
    #[cfg(test)]
    pub async fn is_following(&self, follower_id: &str, followee_id: &str) -> Result<bool, AppError> {
        self.bounded("is_following", async {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM follow_edges WHERE follower_id = ? AND followee_id = ?)",
            )
            .bind(follower_id)
            .bind(followee_id)
            .fetch_one(&self.pool)
            .await?;
            Ok::<_, AppError>(exists)
        })
        .await
    }

    // =========================================================================
    // Feed
    // =========================================================================

    /// Newest posts by accounts that `account_id` follows.
    ///
    /// Each post carries its author name, like count, images in upload
    /// order and comments newest first. All reads share one transaction so
    /// the parts are consistent with each other.
    pub async fn following_feed(&self, account_id: &str, limit: i64) -> Result<Vec<FeedPost>, AppError> {
        self.bounded("following_feed", async {
            let mut tx = self.pool.begin().await?;

            let rows = sqlx::query_as::<_, FeedPostRow>(
                r#"
                SELECT
                    p.id,
                    p.account_id,
                    COALESCE(pr.name, a.email) AS author_name,
                    p.text_content,
                    (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) AS like_count,
                    p.created_at
                FROM posts p
                INNER JOIN follow_edges f ON f.followee_id = p.account_id
                INNER JOIN accounts a ON a.id = p.account_id
                LEFT JOIN profiles pr ON pr.account_id = p.account_id
                WHERE f.follower_id = ?
                ORDER BY p.created_at DESC, p.id DESC
                LIMIT ?
                "#,
            )
            .bind(account_id)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;

            if rows.is_empty() {
                tx.commit().await?;
                return Ok(Vec::new());
            }

            let mut images_query = QueryBuilder::<Sqlite>::new(
                "SELECT id, post_id, position, image_url FROM post_images WHERE post_id IN (",
            );
            let mut separated = images_query.separated(", ");
            for row in &rows {
                separated.push_bind(&row.id);
            }
            separated.push_unseparated(") ORDER BY post_id, position ASC");
            let images = images_query
                .build_query_as::<PostImage>()
                .fetch_all(&mut *tx)
                .await?;

            let mut comments_query = QueryBuilder::<Sqlite>::new(
                r#"
                SELECT
                    c.id,
                    c.post_id,
                    c.account_id,
                    COALESCE(pr.name, a.email) AS commenter_name,
                    c.comment,
                    c.created_at
                FROM post_comments c
                INNER JOIN accounts a ON a.id = c.account_id
                LEFT JOIN profiles pr ON pr.account_id = c.account_id
                WHERE c.post_id IN ("#,
            );
            let mut separated = comments_query.separated(", ");
            for row in &rows {
                separated.push_bind(&row.id);
            }
            separated.push_unseparated(") ORDER BY c.created_at DESC, c.id DESC");
            let comments = comments_query
                .build_query_as::<FeedComment>()
                .fetch_all(&mut *tx)
                .await?;

            tx.commit().await?;

            let mut images_by_post: HashMap<String, Vec<String>> = HashMap::new();
            for image in images {
                images_by_post
                    .entry(image.post_id)
                    .or_default()
                    .push(image.image_url);
            }
            let mut comments_by_post: HashMap<String, Vec<FeedComment>> = HashMap::new();
            for comment in comments {
                comments_by_post
                    .entry(comment.post_id.clone())
                    .or_default()
                    .push(comment);
            }

            Ok::<_, AppError>(rows
                .into_iter()
                .map(|row| FeedPost {
                    images: images_by_post.remove(&row.id).unwrap_or_default(),
                    comments: comments_by_post.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    account_id: row.account_id,
                    author_name: row.author_name,
                    text_content: row.text_content,
                    like_count: row.like_count,
                    created_at: row.created_at,
                })
                .collect())
        })
        .await
    }

    /// Count rows of a table (test helper)
    #[cfg(test)]
    pub async fn count_rows(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
