//! Data layer module
//!
//! Handles all data persistence and caching:
//! - SQLite database operations
//! - Key-value store (revocation list and cache backing)
//! - Read-through cache

mod cache;
mod database;
mod kv;
mod models;

pub use cache::CacheAsideStore;
pub use database::{Database, FEED_LIMIT};
#[cfg(test)]
pub use kv::MockKeyValueStore;
pub use kv::{
    KeyValueStore, KeyValueStores, MemoryStore, RedisStore, StoreError,
    connect as connect_key_value_stores,
};
pub use models::*;
