//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, cache, token and media operations.

mod account;
mod post;

pub use account::{AccountService, IssuedToken, ProfileEdit, profile_cache_key};
pub use post::{MAX_IMAGES_PER_POST, PostService, feed_cache_key};
