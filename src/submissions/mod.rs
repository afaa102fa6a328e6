//! Submissions: public intake plus the admin triage operations.

pub mod export;
pub mod intake;
pub mod models;
pub mod rate_limit;
pub mod stats;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    query::{ListQuery, Page},
    store::Store,
};

pub use intake::{IntakePolicy, Receipt, SubmissionInput, submit};
pub use models::{Category, Metadata, Status, StatusChange, Submission, SubmissionField};

/// Body of a status change.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct StatusUpdate {
    pub status: Option<String>,
    pub notes: Option<String>,
}

impl StatusUpdate {
    fn status(&self) -> Result<Status> {
        self.status
            .as_deref()
            .map(str::trim)
            .and_then(Status::parse)
            .ok_or_else(|| {
                Error::field(
                    "status",
                    &format!("Status must be one of: {}", status_names()),
                )
            })
    }
}

fn status_names() -> String {
    Status::ALL
        .iter()
        .map(|status| status.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// # Errors
/// `NotFound` when no submission has `id`.
pub async fn get(store: &Store, id: Uuid) -> Result<Submission> {
    store
        .find_submission(id)
        .await?
        .ok_or(Error::NotFound("submission"))
}

/// # Errors
/// Returns `StorageUnavailable` when the store cannot be read.
pub async fn list(store: &Store, query: &ListQuery<SubmissionField>) -> Result<Page<Submission>> {
    Ok(store.list_submissions(query).await?)
}

/// Set a new status and append it to the history.
///
/// Any status may follow any other.
///
/// # Errors
/// `Validation` for an unknown status, `NotFound` for an unknown id.
pub async fn update_status(
    store: &Store,
    id: Uuid,
    update: &StatusUpdate,
    changed_by: Uuid,
    now: DateTime<Utc>,
) -> Result<Submission> {
    let change = StatusChange {
        status: update.status()?,
        changed_by,
        notes: update
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(ToString::to_string),
        changed_at: now,
    };
    let updated = store
        .update_submission_status(id, &change)
        .await?
        .ok_or(Error::NotFound("submission"))?;
    info!(submission_id = %id, status = %change.status, %changed_by, "Updated submission status");
    Ok(updated)
}

/// # Errors
/// `NotFound` when no submission has `id`.
pub async fn delete(store: &Store, id: Uuid) -> Result<()> {
    if store.delete_submission(id).await? {
        info!(submission_id = %id, "Deleted submission");
        Ok(())
    } else {
        Err(Error::NotFound("submission"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryLimits;
    use models::Contact;
    use std::time::Duration as StdDuration;

    async fn seeded(store: &Store) -> Result<Submission> {
        let contact = Contact {
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
            phone: None,
            subject: "Bridge repair".to_string(),
            message: "Pedestrian bridge needs resurfacing.".to_string(),
            category: Some(Category::Infrastructure),
            budget: None,
        };
        let submission = Submission::new(contact, Metadata::default(), false, Utc::now());
        store.insert_submission(&submission).await?;
        Ok(submission)
    }

    #[tokio::test]
    async fn update_status_appends_history() -> Result<()> {
        let store = Store::memory(StdDuration::from_secs(1));
        let submission = seeded(&store).await?;
        let editor = Uuid::new_v4();

        let update = StatusUpdate {
            status: Some("in_progress".to_string()),
            notes: Some("  site visit booked ".to_string()),
        };
        let updated = update_status(&store, submission.id, &update, editor, Utc::now()).await?;
        assert_eq!(updated.status, Status::InProgress);
        assert_eq!(updated.status_history.len(), 1);
        assert_eq!(
            updated.status_history.first().map(|c| (c.changed_by, c.notes.clone())),
            Some((editor, Some("site visit booked".to_string())))
        );

        let back = StatusUpdate {
            status: Some("new".to_string()),
            notes: None,
        };
        let reopened = update_status(&store, submission.id, &back, editor, Utc::now()).await?;
        assert_eq!(reopened.status, Status::New);
        assert_eq!(reopened.status_history.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn update_status_rejects_unknown_status_and_id() -> Result<()> {
        let store = Store::memory(StdDuration::from_secs(1));
        let submission = seeded(&store).await?;

        let bogus = StatusUpdate {
            status: Some("archived".to_string()),
            notes: None,
        };
        let err = update_status(&store, submission.id, &bogus, Uuid::new_v4(), Utc::now()).await;
        assert!(matches!(err, Err(Error::Validation(_))));

        let valid = StatusUpdate {
            status: Some("resolved".to_string()),
            notes: None,
        };
        let missing = update_status(&store, Uuid::new_v4(), &valid, Uuid::new_v4(), Utc::now()).await;
        assert!(matches!(missing, Err(Error::NotFound("submission"))));
        Ok(())
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() -> Result<()> {
        let store = Store::memory(StdDuration::from_secs(1));
        let submission = seeded(&store).await?;

        let listed = list(&store, &ListQuery::new(QueryLimits::new())).await?;
        assert_eq!(listed.total, 1);

        delete(&store, submission.id).await?;
        assert!(matches!(
            get(&store, submission.id).await,
            Err(Error::NotFound("submission"))
        ));
        assert!(matches!(
            delete(&store, submission.id).await,
            Err(Error::NotFound("submission"))
        ));
        Ok(())
    }
}
