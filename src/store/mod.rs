//! Persistence behind repository traits.
//!
//! Flow Overview:
//! 1) [`open`] picks a backend from the DSN scheme (`postgres://` or `memory://`).
//! 2) Handlers and services only talk to the [`Store`] facade.
//! 3) The facade bounds every repository call with the configured timeout;
//!    a timeout or driver failure becomes `StoreError`, which the request
//!    layer reports as `storage_unavailable`.

pub mod memory;
pub mod postgres;

use anyhow::{Context, Result as AnyResult, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{future::Future, sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{
    credentials::{
        lockout::LockoutState,
        models::{Credential, CredentialCounts, CredentialField, ResetToken},
    },
    query::{Filter, ListQuery, Page},
    submissions::{
        models::{StatusChange, Submission, SubmissionField},
        rate_limit::{RateDecision, RateLimiter, RatePolicy},
        stats::{StatsWindow, SubmissionCounts},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait SubmissionRepo: Send + Sync {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError>;

    /// Submissions created since `since` from `ip` (when known) or `email`.
    async fn count_recent(
        &self,
        ip: Option<&str>,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Submission>, StoreError>;

    async fn list(
        &self,
        query: &ListQuery<SubmissionField>,
    ) -> Result<Page<Submission>, StoreError>;

    /// Apply a status change and append it to the history.
    async fn update_status(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Submission>, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Counts for the dashboard, read from one consistent snapshot.
    async fn counts(&self, window: &StatsWindow) -> Result<SubmissionCounts, StoreError>;

    /// Every match, newest first.
    async fn export(
        &self,
        filter: &Filter<SubmissionField>,
    ) -> Result<Vec<Submission>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CredentialRepo: Send + Sync {
    /// Fails with `StoreError::Duplicate("email")` when the email is taken.
    async fn insert(&self, credential: &Credential) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError>;

    /// Credential holding an unexpired reset token with this hash.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError>;

    /// Replace the lockout state only if it still equals `expected`.
    async fn swap_lockout(
        &self,
        id: Uuid,
        expected: LockoutState,
        next: LockoutState,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Store a new hash, stamp the change time and drop any reset token.
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &ResetToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError>;

    async fn list(
        &self,
        query: &ListQuery<CredentialField>,
    ) -> Result<Page<Credential>, StoreError>;

    async fn counts(&self) -> Result<CredentialCounts, StoreError>;
}

async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}

/// Timeout-bounded access to every repository.
#[derive(Clone)]
pub struct Store {
    submissions: Arc<dyn SubmissionRepo>,
    credentials: Arc<dyn CredentialRepo>,
    limiter: Arc<dyn RateLimiter>,
    timeout: Duration,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Store {
    #[must_use]
    pub fn new(
        submissions: Arc<dyn SubmissionRepo>,
        credentials: Arc<dyn CredentialRepo>,
        limiter: Arc<dyn RateLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            submissions,
            credentials,
            limiter,
            timeout,
        }
    }

    /// Single-process store backed by tokio locks.
    #[must_use]
    pub fn memory(timeout: Duration) -> Self {
        let store = Arc::new(MemoryStore::default());
        Self::new(
            store.clone(),
            store,
            Arc::new(crate::submissions::rate_limit::MemoryRateLimiter::default()),
            timeout,
        )
    }

    #[must_use]
    pub fn postgres(store: PgStore, timeout: Duration) -> Self {
        let limiter = Arc::new(crate::submissions::rate_limit::PgRateLimiter::new(
            store.pool().clone(),
        ));
        let store = Arc::new(store);
        Self::new(store.clone(), store, limiter, timeout)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record one hit against `key` and return the limiter's decision.
    ///
    /// # Errors
    /// Returns `StoreError` if the counter service is unavailable.
    pub async fn hit(
        &self,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        bounded(self.timeout, self.limiter.hit(key, policy, now)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn insert_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        bounded(self.timeout, self.submissions.insert(submission)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn count_recent_submissions(
        &self,
        ip: Option<&str>,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        bounded(self.timeout, self.submissions.count_recent(ip, email, since)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn find_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        bounded(self.timeout, self.submissions.find(id)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn list_submissions(
        &self,
        query: &ListQuery<SubmissionField>,
    ) -> Result<Page<Submission>, StoreError> {
        bounded(self.timeout, self.submissions.list(query)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn update_submission_status(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Submission>, StoreError> {
        bounded(self.timeout, self.submissions.update_status(id, change)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn delete_submission(&self, id: Uuid) -> Result<bool, StoreError> {
        bounded(self.timeout, self.submissions.delete(id)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn submission_counts(
        &self,
        window: &StatsWindow,
    ) -> Result<SubmissionCounts, StoreError> {
        bounded(self.timeout, self.submissions.counts(window)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn export_submissions(
        &self,
        filter: &Filter<SubmissionField>,
    ) -> Result<Vec<Submission>, StoreError> {
        bounded(self.timeout, self.submissions.export(filter)).await
    }

    /// # Errors
    /// Returns `StoreError` when the backing store is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        bounded(self.timeout, self.submissions.ping()).await
    }

    /// # Errors
    /// Returns `StoreError::Duplicate` when the email is already registered.
    pub async fn insert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        bounded(self.timeout, self.credentials.insert(credential)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn find_credential(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        bounded(self.timeout, self.credentials.find_by_id(id)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Credential>, StoreError> {
        bounded(self.timeout, self.credentials.find_by_email(email)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn find_credential_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        bounded(
            self.timeout,
            self.credentials.find_by_reset_token(token_hash, now),
        )
        .await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn swap_lockout(
        &self,
        id: Uuid,
        expected: LockoutState,
        next: LockoutState,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        bounded(
            self.timeout,
            self.credentials.swap_lockout(id, expected, next, now),
        )
        .await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        bounded(self.timeout, self.credentials.record_login(id, at)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        bounded(
            self.timeout,
            self.credentials.set_password(id, password_hash, changed_at),
        )
        .await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn set_reset_token(
        &self,
        id: Uuid,
        token: &ResetToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        bounded(self.timeout, self.credentials.set_reset_token(id, token, now)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn set_credential_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        bounded(self.timeout, self.credentials.set_active(id, active, now)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn list_credentials(
        &self,
        query: &ListQuery<CredentialField>,
    ) -> Result<Page<Credential>, StoreError> {
        bounded(self.timeout, self.credentials.list(query)).await
    }

    /// # Errors
    /// Returns `StoreError` on timeout or driver failure.
    pub async fn credential_counts(&self) -> Result<CredentialCounts, StoreError> {
        bounded(self.timeout, self.credentials.counts()).await
    }
}

/// Open the store named by `dsn`.
///
/// # Errors
/// Returns an error if the scheme is unsupported or Postgres is unreachable.
pub async fn open(dsn: &str, timeout: Duration) -> AnyResult<Store> {
    let scheme = dsn.split_once("://").map_or("", |(scheme, _)| scheme);
    match scheme {
        "memory" => Ok(Store::memory(timeout)),
        "postgres" | "postgresql" => {
            let store = PgStore::connect(dsn)
                .await
                .context("Failed to connect to database")?;
            store
                .migrate()
                .await
                .context("Failed to apply database schema")?;
            Ok(Store::postgres(store, timeout))
        }
        other => Err(anyhow!("Unsupported DSN scheme: {other:?}")),
    }
}
