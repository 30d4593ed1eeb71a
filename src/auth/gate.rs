//! Request admission
//!
//! Every protected request passes through [`AuthGate::admit`]: bearer
//! extraction, token validation, then the revocation lookup. A request is
//! admitted only when all three succeed. When the revocation list cannot be
//! consulted the request is refused.

use std::fmt;

use axum::http::{HeaderMap, header};

use super::revocation::RevocationStore;
use super::token::{Claims, SessionTokenService};
use crate::data::EntityId;
use crate::metrics::AUTH_REJECTIONS_TOTAL;

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingToken,
    Malformed,
    BadSignature,
    Expired,
    Revoked,
    /// The revocation list could not be consulted
    RevocationUnavailable,
}

impl RejectReason {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingToken => "missing_token",
            RejectReason::Malformed => "malformed",
            RejectReason::BadSignature => "bad_signature",
            RejectReason::Expired => "expired",
            RejectReason::Revoked => "revoked",
            RejectReason::RevocationUnavailable => "revocation_unavailable",
        }
    }

    /// Client-facing message
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::MissingToken => "Authorization token is required",
            RejectReason::Malformed | RejectReason::BadSignature => "Invalid token",
            RejectReason::Expired => "Token has expired",
            RejectReason::Revoked => "Token has been revoked",
            RejectReason::RevocationUnavailable => {
                "Authentication is temporarily unavailable"
            }
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admitted caller
#[derive(Debug, Clone)]
pub struct Principal {
    pub account_id: EntityId,
    pub claims: Claims,
    /// Raw bearer token, kept for logout
    pub token: String,
}

/// Outcome of [`AuthGate::admit`]
#[derive(Debug, Clone)]
pub enum Admission {
    Admitted(Principal),
    Rejected(RejectReason),
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively; an empty token counts as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Combines token validation and the revocation list.
#[derive(Clone)]
pub struct AuthGate {
    tokens: SessionTokenService,
    revocations: RevocationStore,
}

impl AuthGate {
    pub fn new(tokens: SessionTokenService, revocations: RevocationStore) -> Self {
        Self {
            tokens,
            revocations,
        }
    }

    /// Decide whether a request carrying `headers` may proceed.
    pub async fn admit(&self, headers: &HeaderMap) -> Admission {
        let admission = self.admit_inner(headers).await;
        if let Admission::Rejected(reason) = &admission {
            AUTH_REJECTIONS_TOTAL
                .with_label_values(&[reason.as_str()])
                .inc();
        }
        admission
    }

    async fn admit_inner(&self, headers: &HeaderMap) -> Admission {
        let Some(token) = bearer_token(headers) else {
            return Admission::Rejected(RejectReason::MissingToken);
        };

        let claims = match self.tokens.validate(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Token validation failed");
                return Admission::Rejected(e.reject_reason().unwrap_or(RejectReason::Malformed));
            }
        };

        match self.revocations.is_revoked(token).await {
            Ok(false) => {}
            Ok(true) => return Admission::Rejected(RejectReason::Revoked),
            Err(e) => {
                tracing::warn!(error = %e, "Revocation list unavailable, refusing request");
                return Admission::Rejected(RejectReason::RevocationUnavailable);
            }
        }

        Admission::Admitted(Principal {
            account_id: claims.account_id(),
            claims,
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::HeaderValue;
    use chrono::Utc;

    use super::*;
    use crate::data::{MemoryStore, MockKeyValueStore, StoreError};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn account() -> EntityId {
        EntityId::from_string("01HZZZACCOUNT0000000000000".to_string())
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn gate_with(kv: Arc<dyn crate::data::KeyValueStore>) -> (AuthGate, SessionTokenService, RevocationStore) {
        let tokens = SessionTokenService::new(SECRET, 3600);
        let revocations = RevocationStore::new(kv);
        (
            AuthGate::new(tokens.clone(), revocations.clone()),
            tokens,
            revocations,
        )
    }

    fn rejected(admission: Admission) -> RejectReason {
        match admission {
            Admission::Rejected(reason) => reason,
            Admission::Admitted(p) => panic!("expected rejection, admitted {:?}", p.account_id),
        }
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&headers_with("abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn valid_token_is_admitted() {
        let (gate, tokens, _) = gate_with(Arc::new(MemoryStore::new(100)));
        let token = tokens.issue(&account()).unwrap();

        match gate.admit(&headers_with(&format!("Bearer {token}"))).await {
            Admission::Admitted(principal) => {
                assert_eq!(principal.account_id, account());
                assert_eq!(principal.token, token);
            }
            Admission::Rejected(reason) => panic!("rejected: {reason}"),
        }
    }

    #[tokio::test]
    async fn missing_and_invalid_tokens_are_rejected() {
        let (gate, _, _) = gate_with(Arc::new(MemoryStore::new(100)));

        assert_eq!(
            rejected(gate.admit(&HeaderMap::new()).await),
            RejectReason::MissingToken
        );
        assert_eq!(
            rejected(gate.admit(&headers_with("Bearer garbage")).await),
            RejectReason::Malformed
        );

        let foreign = SessionTokenService::new("ffffffffffffffffffffffffffffffff", 3600)
            .issue(&account())
            .unwrap();
        assert_eq!(
            rejected(gate.admit(&headers_with(&format!("Bearer {foreign}"))).await),
            RejectReason::BadSignature
        );

        let (gate, tokens, _) = gate_with(Arc::new(MemoryStore::new(100)));
        let stale = tokens
            .issue_at(&account(), Utc::now() - chrono::Duration::seconds(7200))
            .unwrap();
        assert_eq!(
            rejected(gate.admit(&headers_with(&format!("Bearer {stale}"))).await),
            RejectReason::Expired
        );
    }

    #[tokio::test]
    async fn revoked_token_is_rejected_while_others_pass() {
        let (gate, tokens, revocations) = gate_with(Arc::new(MemoryStore::new(100)));
        let revoked = tokens.issue(&account()).unwrap();
        let other = tokens
            .issue_at(&account(), Utc::now() - chrono::Duration::seconds(1))
            .unwrap();
        revocations
            .revoke(&revoked, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            rejected(gate.admit(&headers_with(&format!("Bearer {revoked}"))).await),
            RejectReason::Revoked
        );
        assert!(matches!(
            gate.admit(&headers_with(&format!("Bearer {other}"))).await,
            Admission::Admitted(_)
        ));
    }

    #[tokio::test]
    async fn token_logged_out_in_its_expiry_second_stays_rejected() {
        let kv: Arc<dyn crate::data::KeyValueStore> = Arc::new(MemoryStore::unbounded());
        let tokens = SessionTokenService::new(SECRET, 0);
        let revocations = RevocationStore::new(kv);
        let gate = AuthGate::new(tokens.clone(), revocations.clone());

        let now = Utc::now();
        let token = tokens.issue_at(&account(), now).unwrap();
        let claims = tokens.validate_at(&token, now).unwrap();
        revocations
            .revoke_for_remaining(&token, &claims, now)
            .await
            .unwrap();

        let reason = rejected(gate.admit(&headers_with(&format!("Bearer {token}"))).await);
        assert!(
            matches!(reason, RejectReason::Revoked | RejectReason::Expired),
            "unexpected reason {reason}"
        );
    }

    #[tokio::test]
    async fn unavailable_revocation_list_fails_closed() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get()
            .returning(|_| Err(StoreError::Timeout));
        let (gate, tokens, _) = gate_with(Arc::new(kv));
        let token = tokens.issue(&account()).unwrap();

        assert_eq!(
            rejected(gate.admit(&headers_with(&format!("Bearer {token}"))).await),
            RejectReason::RevocationUnavailable
        );
    }

    #[tokio::test]
    async fn forged_token_never_reaches_the_revocation_list() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get().times(0);
        let (gate, _, _) = gate_with(Arc::new(kv));

        assert_eq!(
            rejected(gate.admit(&headers_with("Bearer a.b")).await),
            RejectReason::Malformed
        );
    }
}
