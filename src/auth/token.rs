//! Session tokens
//!
//! Stateless HMAC-signed bearer tokens. Validation is a pure function of
//! the token, the signing key and the clock; revocation is checked
//! separately by the auth gate.
//!
//! Token format: base64url(claims_json).base64url(hmac_sha256(payload_b64))

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::gate::RejectReason;
use crate::data::EntityId;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account the token was issued to
    pub sub: String,
    /// Issued-at, unix seconds
    pub iat: i64,
    /// Expiry, unix seconds
    pub exp: i64,
    /// Unique token id; two tokens issued in the same second still differ
    pub jti: String,
}

impl Claims {
    /// Account id of the subject.
    pub fn account_id(&self) -> EntityId {
        EntityId::from_string(self.sub.clone())
    }

    /// Time left at `now` before validation starts rejecting the token.
    ///
    /// Expiry is checked at whole-second resolution and the token is still
    /// accepted during the `exp` second itself, so validity ends at the
    /// start of `exp + 1`. Zero once that instant has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        let valid_until_ms = self.exp.saturating_add(1).saturating_mul(1000);
        let left_ms = valid_until_ms.saturating_sub(now.timestamp_millis()).max(0);
        std::time::Duration::from_millis(left_ms as u64)
    }
}

/// Token validation and signing failures
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token could not be signed: {0}")]
    Signing(String),
}

impl TokenError {
    /// Rejection reason for failures caused by the presented token.
    ///
    /// `None` for signing failures, which are server faults.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            TokenError::Malformed => Some(RejectReason::Malformed),
            TokenError::BadSignature => Some(RejectReason::BadSignature),
            TokenError::Expired => Some(RejectReason::Expired),
            TokenError::Signing(_) => None,
        }
    }
}

/// Issues and validates session tokens with a process-wide signing key.
#[derive(Clone)]
pub struct SessionTokenService {
    secret: Vec<u8>,
    ttl: chrono::Duration,
}

impl SessionTokenService {
    pub fn new(secret: impl AsRef<[u8]>, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: chrono::Duration::seconds(ttl_seconds),
        }
    }

    /// Lifetime of newly issued tokens.
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Issue a token for `account_id` valid from now.
    pub fn issue(&self, account_id: &EntityId) -> Result<String, TokenError> {
        self.issue_at(account_id, Utc::now())
    }

    /// Issue a token as if the clock read `now`.
    pub fn issue_at(&self, account_id: &EntityId, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: account_id.0.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: ulid::Ulid::new().to_string(),
        };

        let payload =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Signing(e.to_string()))?;
        let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        Ok(format!("{}.{}", payload_b64, signature_b64))
    }

    /// Validate a token against the signing key and the current clock.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token as if the clock read `now`.
    ///
    /// The signature is checked before the payload is decoded, so claims
    /// of a forged token are never interpreted.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
        if payload_b64.is_empty() || signature_b64.is_empty() || signature_b64.contains('.') {
            return Err(TokenError::Malformed);
        }

        let signature = general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let payload = general_purpose::URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if claims.sub.is_empty() {
            return Err(TokenError::Malformed);
        }
        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| TokenError::Signing(e.to_string()))
    }
}
