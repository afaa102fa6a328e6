//! Stateless sessions.
//!
//! Flow Overview:
//! 1) Login issues an HS256 token carrying `{sub, role, iat, exp}`.
//! 2) Each request presents it as `Authorization: Bearer` or the session cookie.
//! 3) [`verifier::verify`] checks the signature and expiry, then reloads the
//!    credential so deactivation, password changes and locks apply at once.
//! 4) [`authz::authorize`] checks the identity's role against the operation.

pub mod authz;
pub mod token;
pub mod verifier;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::credentials::models::{CredentialView, Role};

pub use authz::{Permission, authorize};
pub use token::{Claims, IssuedToken, SessionKeys, TokenError};
pub use verifier::verify;

/// Verified caller of an authenticated request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Identity {
    pub user: CredentialView,
    pub role: Role,
}

/// Token handed out by login, password change and reset.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: CredentialView,
}

impl Session {
    #[must_use]
    pub fn new(issued: IssuedToken, user: CredentialView) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
            user,
        }
    }
}
