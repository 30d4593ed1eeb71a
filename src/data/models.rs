//! Data models
//!
//! Rust structs representing database entities and cached read models.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Accounts and profiles
// =============================================================================

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Login material for one account
///
/// Never serialized; the digest does not leave the data layer except to
/// the credential hasher.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credentials {
    pub account_id: String,
    pub password_hash: String,
}

/// Public profile of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub account_id: String,
    pub email: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    /// Public path of the avatar image
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.avatar.is_none()
    }
}

/// Result of a profile update
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub profile: Profile,
    /// Avatar replaced by this update, if any
    pub previous_avatar: Option<String>,
}

// =============================================================================
// Posts
// =============================================================================

/// A post with its images in upload order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub account_id: String,
    pub text_content: String,
    pub images: Vec<PostImage>,
    pub created_at: DateTime<Utc>,
}

/// An image attached to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostImage {
    pub id: String,
    pub post_id: String,
    pub position: i64,
    pub image_url: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: String,
    pub account_id: String,
    pub text_content: String,
    pub created_at: DateTime<Utc>,
}

impl PostRow {
    pub(crate) fn into_post(self, images: Vec<PostImage>) -> Post {
        Post {
            id: self.id,
            account_id: self.account_id,
            text_content: self.text_content,
            images,
            created_at: self.created_at,
        }
    }
}

/// Outcome of a like request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
    /// A new like was recorded
    Liked,
    /// The account had already liked the post; nothing changed
    AlreadyLiked,
}

/// A comment on a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub account_id: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Follow graph
// =============================================================================

/// Directed follow edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub id: String,
    pub follower_id: String,
    pub followee_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Feed read model
// =============================================================================

/// A post as shown in the following feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub account_id: String,
    /// Author display name, falling back to the author's email
    pub author_name: String,
    pub text_content: String,
    pub like_count: i64,
    pub images: Vec<String>,
    pub comments: Vec<FeedComment>,
    pub created_at: DateTime<Utc>,
}

/// A comment as shown in the following feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedComment {
    pub id: String,
    pub post_id: String,
    pub account_id: String,
    pub commenter_name: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct FeedPostRow {
    pub id: String,
    pub account_id: String,
    pub author_name: String,
    pub text_content: String,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}
