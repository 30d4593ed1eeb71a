//! Post service
//!
//! Post creation with images, likes, comments and the following feed.

use std::sync::Arc;
use std::time::Duration;

use crate::data::{CacheAsideStore, Comment, Database, FEED_LIMIT, FeedPost, LikeOutcome, Post};
use crate::error::AppError;
use crate::storage::{MediaKind, MediaStorage, PendingUploads, UploadedFile};

/// Upper bound on images attached to one post
pub const MAX_IMAGES_PER_POST: usize = 10;

/// Cache key of an account's following feed
pub fn feed_cache_key(account_id: &str) -> String {
    format!("feed:{}", account_id)
}

/// Post service
pub struct PostService {
    db: Arc<Database>,
    cache: CacheAsideStore,
    storage: Arc<MediaStorage>,
    feed_ttl: Duration,
}

impl PostService {
    /// Create new post service
    pub fn new(
        db: Arc<Database>,
        cache: CacheAsideStore,
        storage: Arc<MediaStorage>,
        feed_ttl: Duration,
    ) -> Self {
        Self {
            db,
            cache,
            storage,
            feed_ttl,
        }
    }

    /// Create a post with its images
    ///
    /// Every upload is validated before anything is written. Files are
    /// stored first, then the post and image rows are inserted in one
    /// transaction. If the insert fails or the request is dropped before
    /// it commits, the stored files are removed again.
    pub async fn create_post(
        &self,
        account_id: &str,
        text_content: &str,
        images: &[UploadedFile],
    ) -> Result<Post, AppError> {
        let text_content = text_content.trim();
        if text_content.is_empty() && images.is_empty() {
            return Err(AppError::Validation(
                "post needs text content or at least one image".to_string(),
            ));
        }
        if images.len() > MAX_IMAGES_PER_POST {
            return Err(AppError::Validation(format!(
                "at most {} images per post",
                MAX_IMAGES_PER_POST
            )));
        }
        for upload in images {
            self.storage.validate(upload)?;
        }

        // Stored files are removed again unless the insert commits
        let mut pending = PendingUploads::new(self.storage.clone());
        for upload in images {
            pending.store(MediaKind::PostImage, upload).await?;
        }

        let post = self
            .db
            .create_post(account_id, text_content, pending.urls())
            .await?;
        pending.commit();

        tracing::info!(
            account_id,
            post_id = %post.id,
            images = post.images.len(),
            "Post created"
        );
        Ok(post)
    }

    /// Like a post; a repeated like reports `AlreadyLiked`
    pub async fn like(&self, account_id: &str, post_id: &str) -> Result<LikeOutcome, AppError> {
        let outcome = self.db.like_post(account_id, post_id).await?;
        tracing::debug!(account_id, post_id, ?outcome, "Like recorded");
        Ok(outcome)
    }

    /// Comment on a post
    pub async fn comment(
        &self,
        account_id: &str,
        post_id: &str,
        comment: &str,
    ) -> Result<Comment, AppError> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(AppError::Validation("comment cannot be empty".to_string()));
        }

        let comment = self.db.add_comment(account_id, post_id, comment).await?;
        tracing::debug!(account_id, post_id, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    /// A single post with its images
    pub async fn get_post(&self, post_id: &str) -> Result<Post, AppError> {
        self.db.get_post(post_id).await?.ok_or(AppError::PostNotFound)
    }

    /// Newest posts from followed accounts, served through the cache
    ///
    /// The cached copy may lag behind writes by up to the feed TTL.
    pub async fn following_feed(&self, account_id: &str) -> Result<Vec<FeedPost>, AppError> {
        let key = feed_cache_key(account_id);
        self.cache
            .get_or_fetch(&key, self.feed_ttl, || {
                self.db.following_feed(account_id, FEED_LIMIT)
            })
            .await
    }
}
