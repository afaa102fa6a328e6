use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Identity, SessionKeys, TokenError};
use crate::{
    error::{Error, Result},
    store::Store,
};

/// Resolve a presented token to the caller's identity.
///
/// # Errors
/// `Authentication` for a bad, expired or revoked token and for missing or
/// inactive credentials; `AccountLocked` while the credential is locked;
/// `StorageUnavailable` when the store cannot be read.
pub async fn verify(
    store: &Store,
    keys: &SessionKeys,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Identity> {
    let claims = keys.decode(token, now).map_err(|err| {
        debug!("Rejected session token: {err}");
        match err {
            TokenError::Expired => Error::Authentication("session expired"),
            _ => Error::Authentication("invalid session token"),
        }
    })?;

    let credential = store
        .find_credential(claims.sub)
        .await?
        .filter(|credential| credential.active)
        .ok_or(Error::Authentication("user no longer exists"))?;

    if credential.changed_password_after(claims.iat) {
        return Err(Error::Authentication("password changed, log in again"));
    }

    if let Some(until) = credential.lockout.locked_until(now) {
        return Err(Error::AccountLocked { until });
    }

    Ok(Identity {
        role: credential.role,
        user: credential.view(),
    })
}
