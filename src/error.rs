//! Request-scoped error taxonomy.
//!
//! Every failure a request can hit maps to one variant here. The HTTP layer
//! turns each variant into a stable status code and machine-readable kind
//! (see `api::response`); nothing in this enum is fatal to the process.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::StoreError;

/// A single violated input field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing input; carries every violated field.
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
    /// Wrong email/password pair, or wrong current password.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("too many requests, retry in {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    #[error("authentication failed: {0}")]
    Authentication(&'static str),
    #[error("account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },
    #[error("insufficient role for this operation")]
    Authorization,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage unavailable")]
    StorageUnavailable(#[source] StoreError),
}

impl Error {
    /// Shorthand for a validation error on a single field.
    #[must_use]
    pub fn field(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Stable machine-readable kind exposed to API callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidCredentials => "invalid_credentials",
            Self::RateLimited { .. } => "rate_limited",
            Self::Authentication(_) => "authentication_error",
            Self::AccountLocked { .. } => "account_locked",
            Self::Authorization => "authorization_error",
            Self::NotFound(_) => "not_found",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Whether a caller may retry the same request later without changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::AccountLocked { .. } | Self::StorageUnavailable(_)
        )
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::StorageUnavailable(err)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
