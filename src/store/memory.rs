//! In-process store for single-instance deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialRepo, StoreError, SubmissionRepo};
use crate::{
    credentials::{
        lockout::LockoutState,
        models::{Credential, CredentialCounts, CredentialField, ResetToken},
    },
    query::{Filter, ListQuery, Page, eval},
    submissions::{
        models::{StatusChange, Submission, SubmissionField},
        stats::{StatsWindow, SubmissionCounts},
    },
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    submissions: RwLock<HashMap<Uuid, Submission>>,
    credentials: RwLock<HashMap<Uuid, Credential>>,
}

#[async_trait]
impl SubmissionRepo for MemoryStore {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        self.submissions
            .write()
            .await
            .insert(submission.id, submission.clone());
        Ok(())
    }

    async fn count_recent(
        &self,
        ip: Option<&str>,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let submissions = self.submissions.read().await;
        let count = submissions
            .values()
            .filter(|submission| submission.created_at >= since)
            .filter(|submission| {
                submission.email == email
                    || ip.is_some_and(|ip| submission.metadata.ip_address.as_deref() == Some(ip))
            })
            .count();
        Ok(count as u64)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self.submissions.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        query: &ListQuery<SubmissionField>,
    ) -> Result<Page<Submission>, StoreError> {
        let submissions = self.submissions.read().await;
        Ok(eval::paginate(submissions.values(), query))
    }

    async fn update_status(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Submission>, StoreError> {
        let mut submissions = self.submissions.write().await;
        let Some(current) = submissions.remove(&id) else {
            return Ok(None);
        };
        let updated = current.with_status(change.clone());
        submissions.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.submissions.write().await.remove(&id).is_some())
    }

    async fn counts(&self, window: &StatsWindow) -> Result<SubmissionCounts, StoreError> {
        let submissions = self.submissions.read().await;
        let mut counts = SubmissionCounts {
            daily: vec![0; window.days as usize],
            ..SubmissionCounts::default()
        };
        for submission in submissions.values() {
            counts.total += 1;
            counts.by_status.add(submission.status, 1);
            if submission.created_at >= window.today_start {
                counts.today += 1;
            }
            if let Some(slot) = window
                .bucket(submission.created_at)
                .and_then(|index| counts.daily.get_mut(index))
            {
                *slot += 1;
            }
        }
        Ok(counts)
    }

    async fn export(
        &self,
        filter: &Filter<SubmissionField>,
    ) -> Result<Vec<Submission>, StoreError> {
        let submissions = self.submissions.read().await;
        let mut matched: Vec<Submission> = submissions
            .values()
            .filter(|submission| filter.matches(*submission))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl CredentialRepo for MemoryStore {
    async fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write().await;
        if credentials
            .values()
            .any(|existing| existing.email == credential.email)
        {
            return Err(StoreError::Duplicate("email"));
        }
        credentials.insert(credential.id, credential.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .read()
            .await
            .values()
            .find(|credential| credential.email == email)
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .credentials
            .read()
            .await
            .values()
            .find(|credential| {
                credential
                    .reset_token
                    .as_ref()
                    .is_some_and(|token| token.hash == token_hash && token.expires_at > now)
            })
            .cloned())
    }

    async fn swap_lockout(
        &self,
        id: Uuid,
        expected: LockoutState,
        next: LockoutState,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut credentials = self.credentials.write().await;
        match credentials.get_mut(&id) {
            Some(credential) if credential.lockout == expected => {
                credential.lockout = next;
                credential.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(credential) = self.credentials.write().await.get_mut(&id) {
            credential.last_login = Some(at);
        }
        Ok(())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut credentials = self.credentials.write().await;
        let Some(credential) = credentials.get_mut(&id) else {
            return Ok(false);
        };
        credential.password_hash = password_hash.to_string();
        credential.password_changed_at = Some(changed_at);
        credential.reset_token = None;
        credential.updated_at = changed_at;
        Ok(true)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &ResetToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut credentials = self.credentials.write().await;
        let Some(credential) = credentials.get_mut(&id) else {
            return Ok(false);
        };
        credential.reset_token = Some(token.clone());
        credential.updated_at = now;
        Ok(true)
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        let mut credentials = self.credentials.write().await;
        Ok(credentials.get_mut(&id).map(|credential| {
            credential.active = active;
            credential.updated_at = now;
            credential.clone()
        }))
    }

    async fn list(
        &self,
        query: &ListQuery<CredentialField>,
    ) -> Result<Page<Credential>, StoreError> {
        let credentials = self.credentials.read().await;
        Ok(eval::paginate(credentials.values(), query))
    }

    async fn counts(&self) -> Result<CredentialCounts, StoreError> {
        let credentials = self.credentials.read().await;
        Ok(CredentialCounts {
            total: credentials.len() as u64,
            active: credentials.values().filter(|c| c.active).count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        credentials::models::Role,
        query::QueryLimits,
        submissions::models::{Contact, Metadata, Status},
    };
    use chrono::Duration;

    fn submission(email: &str, ip: Option<&str>, created_at: DateTime<Utc>) -> Submission {
        Submission::new(
            Contact {
                name: "Lin".to_string(),
                email: email.to_string(),
                phone: None,
                subject: "Fit-out".to_string(),
                message: "Office fit-out on two floors.".to_string(),
                category: None,
                budget: None,
            },
            Metadata {
                ip_address: ip.map(ToString::to_string),
                ..Metadata::default()
            },
            false,
            created_at,
        )
    }

    fn credential(email: &str) -> Credential {
        let now = Utc::now();
        Credential {
            id: Uuid::new_v4(),
            name: "Editor".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::Editor,
            active: true,
            lockout: LockoutState::default(),
            last_login: None,
            password_changed_at: None,
            reset_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn count_recent_matches_ip_or_email() -> Result<(), StoreError> {
        let store = MemoryStore::default();
        let now = Utc::now();
        SubmissionRepo::insert(&store, &submission("a@example.com", Some("10.0.0.1"), now)).await?;
        SubmissionRepo::insert(&store, &submission("b@example.com", Some("10.0.0.1"), now)).await?;
        SubmissionRepo::insert(&store, &submission("a@example.com", Some("10.0.0.2"), now)).await?;
        SubmissionRepo::insert(
            &store,
            &submission("a@example.com", None, now - Duration::hours(2)),
        )
        .await?;

        let since = now - Duration::hours(1);
        assert_eq!(store.count_recent(Some("10.0.0.1"), "c@example.com", since).await?, 2);
        assert_eq!(store.count_recent(Some("10.0.0.9"), "a@example.com", since).await?, 2);
        assert_eq!(store.count_recent(None, "a@example.com", since).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn update_status_appends_history() -> Result<(), StoreError> {
        let store = MemoryStore::default();
        let record = submission("a@example.com", None, Utc::now());
        SubmissionRepo::insert(&store, &record).await?;
        let change = StatusChange {
            status: Status::Resolved,
            changed_by: Uuid::new_v4(),
            notes: None,
            changed_at: Utc::now(),
        };
        let updated = store.update_status(record.id, &change).await?;
        assert_eq!(updated.map(|s| s.status_history.len()), Some(1));
        assert!(store.update_status(Uuid::new_v4(), &change).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() -> Result<(), StoreError> {
        let store = MemoryStore::default();
        CredentialRepo::insert(&store, &credential("x@example.com")).await?;
        let result = CredentialRepo::insert(&store, &credential("x@example.com")).await;
        assert!(matches!(result, Err(StoreError::Duplicate("email"))));
        Ok(())
    }

    #[tokio::test]
    async fn swap_lockout_only_from_expected_state() -> Result<(), StoreError> {
        let store = MemoryStore::default();
        let record = credential("x@example.com");
        CredentialRepo::insert(&store, &record).await?;
        let next = LockoutState {
            failed_attempts: 1,
            lock_until: None,
        };
        let now = Utc::now();
        assert!(store.swap_lockout(record.id, LockoutState::default(), next, now).await?);
        assert!(!store.swap_lockout(record.id, LockoutState::default(), next, now).await?);
        let stored = store.find_by_id(record.id).await?;
        assert_eq!(stored.map(|c| c.lockout), Some(next));
        Ok(())
    }

    #[tokio::test]
    async fn reset_token_lookup_honours_expiry() -> Result<(), StoreError> {
        let store = MemoryStore::default();
        let record = credential("x@example.com");
        CredentialRepo::insert(&store, &record).await?;
        let now = Utc::now();
        let token = ResetToken {
            hash: "abc".to_string(),
            expires_at: now + Duration::minutes(10),
        };
        store.set_reset_token(record.id, &token, now).await?;
        assert!(store.find_by_reset_token("abc", now).await?.is_some());
        assert!(
            store
                .find_by_reset_token("abc", now + Duration::minutes(11))
                .await?
                .is_none()
        );
        store.set_password(record.id, "new-hash", now).await?;
        assert!(store.find_by_reset_token("abc", now).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn credential_listing_filters_active() -> Result<(), StoreError> {
        let store = MemoryStore::default();
        let active = credential("a@example.com");
        let inactive = credential("b@example.com");
        CredentialRepo::insert(&store, &active).await?;
        CredentialRepo::insert(&store, &inactive).await?;
        store.set_active(inactive.id, false, Utc::now()).await?;

        let params = vec![("active".to_string(), "false".to_string())];
        let query = match ListQuery::parse(&params, QueryLimits::new()) {
            Ok(query) => query,
            Err(err) => panic!("query should parse: {err:?}"),
        };
        let page = CredentialRepo::list(&store, &query).await?;
        assert_eq!(page.total, 1);
        assert_eq!(page.items.first().map(|c| c.id), Some(inactive.id));
        assert_eq!(
            CredentialRepo::counts(&store).await?,
            CredentialCounts {
                total: 2,
                active: 1
            }
        );
        Ok(())
    }
}
