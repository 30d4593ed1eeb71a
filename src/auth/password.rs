//! Password hashing
//!
//! Argon2id with a per-call random salt and a configurable work factor.
//! Digests are PHC strings, so each one carries the parameters it was
//! produced with and keeps verifying after the work factor is raised.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

use crate::config::PasswordHashConfig;

/// Password used to build the digest that absorbs logins for unknown emails.
const DUMMY_PASSWORD: &str = "socialhub-dummy-password";

/// Errors raised by [`CredentialHasher`]
#[derive(Debug, Error)]
pub enum HashError {
    /// The stored digest is not a digest this hasher produced
    #[error("stored password digest is malformed or of a foreign format")]
    HashFormat,
    /// Hashing itself failed (parameters or resource exhaustion)
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// One-way password hasher.
///
/// Cheap to clone; hashing and verification are CPU bound and should be
/// called from `spawn_blocking` on request paths.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    dummy_digest: String,
}

impl CredentialHasher {
    /// Build a hasher with the configured work factor.
    pub fn new(config: &PasswordHashConfig) -> Result<Self, HashError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_digest = hash_with(&argon2, DUMMY_PASSWORD)?;

        Ok(Self {
            argon2,
            dummy_digest,
        })
    }

    /// Hash a plaintext password into a PHC string.
    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        hash_with(&self.argon2, plaintext)
    }

    /// Check a plaintext password against a stored digest.
    ///
    /// Returns `Ok(false)` on mismatch. The digest comparison is done in
    /// constant time over the full output by `password-hash`.
    ///
    /// # Errors
    /// `HashError::HashFormat` when `digest` is not an Argon2 PHC string.
    pub fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(digest).map_err(|_| HashError::HashFormat)?;
        if Algorithm::try_from(parsed.algorithm).is_err() {
            return Err(HashError::HashFormat);
        }

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(password_hash::Error::Algorithm)
            | Err(password_hash::Error::ParamNameInvalid)
            | Err(password_hash::Error::ParamValueInvalid(_))
            | Err(password_hash::Error::Version)
            | Err(password_hash::Error::SaltInvalid(_))
            | Err(password_hash::Error::OutputSize { .. }) => Err(HashError::HashFormat),
            Err(e) => Err(HashError::Hashing(e.to_string())),
        }
    }

    /// Run one full verification against a fixed digest and discard the result.
    ///
    /// Used when the account does not exist so the response time matches a
    /// wrong-password attempt.
    pub fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify(plaintext, &self.dummy_digest);
    }
}

fn hash_with(argon2: &Argon2<'static>, plaintext: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::Hashing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(&PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn verify_accepts_the_original_password() {
        let hasher = hasher();
        let digest = hasher.hash("Secret1!").unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("Secret1!", &digest).unwrap());
    }

    #[test]
    fn verify_rejects_a_different_password() {
        let hasher = hasher();
        let digest = hasher.hash("Secret1!").unwrap();

        assert!(!hasher.verify("Secret2!", &digest).unwrap());
        assert!(!hasher.verify("", &digest).unwrap());
    }

    #[test]
    fn hashing_is_salted_per_call() {
        let hasher = hasher();
        let first = hasher.hash("Secret1!").unwrap();
        let second = hasher.hash("Secret1!").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify("Secret1!", &first).unwrap());
        assert!(hasher.verify("Secret1!", &second).unwrap());
    }

    #[test]
    fn digests_from_an_older_work_factor_still_verify() {
        let old = hasher();
        let digest = old.hash("Secret1!").unwrap();

        let stronger = CredentialHasher::new(&PasswordHashConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(stronger.verify("Secret1!", &digest).unwrap());
    }

    #[test]
    fn corrupted_digest_is_a_format_error() {
        let hasher = hasher();

        assert!(matches!(
            hasher.verify("Secret1!", "not-a-digest"),
            Err(HashError::HashFormat)
        ));
        assert!(matches!(
            hasher.verify("Secret1!", ""),
            Err(HashError::HashFormat)
        ));
    }

    #[test]
    fn foreign_digest_format_is_a_format_error() {
        let hasher = hasher();
        let bcrypt = "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

        assert!(matches!(
            hasher.verify("Secret1!", bcrypt),
            Err(HashError::HashFormat)
        ));
    }

    #[test]
    fn dummy_verification_does_not_panic() {
        hasher().verify_dummy("whatever");
    }
}
