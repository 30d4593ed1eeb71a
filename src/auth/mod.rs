//! Authentication
//!
//! Handles:
//! - Password hashing
//! - Session token issue and validation
//! - Token revocation
//! - Request admission (auth gate and middleware)

mod gate;
mod middleware;
mod password;
mod revocation;
mod token;

pub use gate::{Admission, AuthGate, Principal, RejectReason, bearer_token};
pub use middleware::{CurrentUser, require_auth};
pub use password::{CredentialHasher, HashError};
pub use revocation::{RevocationStore, token_fingerprint};
pub use token::{Claims, SessionTokenService, TokenError};
