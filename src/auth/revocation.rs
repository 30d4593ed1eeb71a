//! Revoked-token list
//!
//! Entries live under `revoked:<sha256(token)>` and expire with the token
//! they revoke, so the list never outgrows the set of live tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::token::Claims;
use crate::data::{KeyValueStore, StoreError};
use crate::metrics::TOKENS_REVOKED_TOTAL;

const KEY_PREFIX: &str = "revoked:";

/// Fingerprint identifying a token in the revocation list.
///
/// Hex SHA-256 of the raw token; the token itself is never stored.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Revocation list over a dedicated key-value store.
#[derive(Clone)]
pub struct RevocationStore {
    kv: Arc<dyn KeyValueStore>,
}

impl RevocationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn key(token: &str) -> String {
        format!("{}{}", KEY_PREFIX, token_fingerprint(token))
    }

    /// Mark a token revoked for `ttl`.
    pub async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        self.kv.set(&Self::key(token), b"1", ttl).await?;
        TOKENS_REVOKED_TOTAL.inc();
        Ok(())
    }

    /// Revoke a token until validation would reject it on expiry.
    ///
    /// The record lives for [`Claims::remaining`], measured to the
    /// millisecond, so it never lapses while the token still validates.
    /// Nothing is written only when no validity is left at `now`.
    pub async fn revoke_for_remaining(
        &self,
        token: &str,
        claims: &Claims,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let remaining = claims.remaining(now);
        if remaining.is_zero() {
            tracing::debug!(sub = %claims.sub, "Token already expired, not recording revocation");
            return Ok(());
        }

        self.revoke(token, remaining).await?;
        tracing::info!(
            sub = %claims.sub,
            ttl_ms = remaining.as_millis() as u64,
            "Token revoked"
        );
        Ok(())
    }

    /// Whether a token has been revoked.
    ///
    /// Store failures are returned to the caller, never read as "not revoked".
    pub async fn is_revoked(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.kv.get(&Self::key(token)).await?.is_some())
    }
}
