//! Account service
//!
//! Registration, login and logout, profiles and the follow graph.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{CredentialHasher, Principal, RevocationStore, SessionTokenService};
use crate::data::{Account, CacheAsideStore, Database, EntityId, FollowEdge, Profile, ProfilePatch};
use crate::error::AppError;
use crate::storage::{MediaKind, MediaStorage, PendingUploads, UploadedFile};

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_EMAIL_CHARS: usize = 254;

/// Cache key of an account's profile
pub fn profile_cache_key(account_id: &str) -> String {
    format!("profile:{}", account_id)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let invalid = || AppError::Validation(format!("invalid email address: {}", email));

    if email.is_empty() || email.len() > MAX_EMAIL_CHARS || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.is_empty() {
        return Err(invalid());
    }
    Ok(())
}

fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// A freshly issued session token
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub account_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Profile edit request; unset fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<UploadedFile>,
}

/// Account service
pub struct AccountService {
    db: Arc<Database>,
    hasher: Arc<CredentialHasher>,
    tokens: SessionTokenService,
    revocations: RevocationStore,
    cache: CacheAsideStore,
    storage: Arc<MediaStorage>,
    profile_ttl: Duration,
}

impl AccountService {
    /// Create new account service
    pub fn new(
        db: Arc<Database>,
        hasher: Arc<CredentialHasher>,
        tokens: SessionTokenService,
        revocations: RevocationStore,
        cache: CacheAsideStore,
        storage: Arc<MediaStorage>,
        profile_ttl: Duration,
    ) -> Self {
        Self {
            db,
            hasher,
            tokens,
            revocations,
            cache,
            storage,
            profile_ttl,
        }
    }

    /// Register a new account
    ///
    /// The email is trimmed and lowercased before it is stored.
    ///
    /// # Errors
    /// - `Validation` for an implausible email or a short password
    /// - `DuplicateAccount` when the email is taken
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, AppError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let digest = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let account = self.db.create_account(&email, &digest).await?;
        tracing::info!(account_id = %account.id, "Account registered");
        Ok(account)
    }

    /// Exchange email and password for a session token
    ///
    /// Unknown emails and wrong passwords produce the same error, and an
    /// unknown email still costs one full hash verification.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken, AppError> {
        let email = normalize_email(email);
        let credentials = self.db.get_credentials_by_email(&email).await?;

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || match &credentials {
            Some(credentials) => hasher
                .verify(&password, &credentials.password_hash)
                .map(|ok| ok.then(|| credentials.account_id.clone())),
            None => {
                hasher.verify_dummy(&password);
                Ok(None)
            }
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

        let Some(account_id) = verified else {
            tracing::debug!("Login rejected");
            return Err(AppError::InvalidCredentials);
        };

        let now = Utc::now();
        let account_id = EntityId::from_string(account_id);
        let token = self.tokens.issue_at(&account_id, now)?;
        tracing::info!(account_id = %account_id, "Session token issued");

        Ok(IssuedToken {
            token,
            account_id: account_id.0,
            expires_at: now + self.tokens.ttl(),
        })
    }

    /// Revoke the caller's token for the rest of its lifetime
    ///
    /// A store failure is returned; the token is not reported as revoked
    /// when it was not.
    pub async fn logout(&self, principal: &Principal) -> Result<(), AppError> {
        self.revocations
            .revoke_for_remaining(&principal.token, &principal.claims, Utc::now())
            .await?;
        Ok(())
    }

    /// Get an account's profile, served through the cache
    pub async fn get_profile(&self, account_id: &str) -> Result<Profile, AppError> {
        let key = profile_cache_key(account_id);
        self.cache
            .get_or_fetch(&key, self.profile_ttl, || async {
                self.db
                    .get_profile(account_id)
                    .await?
                    .ok_or(AppError::AccountNotFound)
            })
            .await
    }

    /// Edit the caller's profile
    ///
    /// A new avatar is written before the update and removed again unless
    /// the update commits; the replaced avatar file is removed afterwards.
    pub async fn edit_profile(&self, account_id: &str, edit: ProfileEdit) -> Result<Profile, AppError> {
        let mut pending = PendingUploads::new(self.storage.clone());
        let avatar_url = match &edit.avatar {
            Some(upload) => Some(pending.store(MediaKind::Avatar, upload).await?),
            None => None,
        };

        let patch = ProfilePatch {
            name: normalize_optional_text(edit.name),
            bio: normalize_optional_text(edit.bio),
            avatar: avatar_url,
        };
        if patch.is_empty() {
            return Err(AppError::Validation("nothing to update".to_string()));
        }

        let update = self.db.update_profile(account_id, &patch).await?;
        pending.commit();

        self.cache.invalidate(&profile_cache_key(account_id)).await;

        if let Some(previous) = &update.previous_avatar {
            if let Err(e) = self.storage.remove(previous).await {
                tracing::warn!(account_id, error = %e, "Failed to remove replaced avatar");
            }
        }

        tracing::info!(account_id, "Profile updated");
        Ok(update.profile)
    }

    /// Follow another account
    ///
    /// # Errors
    /// - `Validation` when following oneself
    /// - `AlreadyFollowing` when the edge exists
    /// - `AccountNotFound` when the target does not exist
    pub async fn follow(&self, follower_id: &str, followee_id: &str) -> Result<FollowEdge, AppError> {
        if follower_id == followee_id {
            return Err(AppError::Validation("cannot follow yourself".to_string()));
        }

        let edge = self.db.follow(follower_id, followee_id).await?;
        tracing::info!(follower_id, followee_id, "Follow edge created");
        Ok(edge)
    }
}
