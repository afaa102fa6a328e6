use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::query::{Direction, FieldKind, Schema, SortKey, Value, eval::Record};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    InProgress,
    Resolved,
    Spam,
}

impl Status {
    pub const ALL: [Self; 4] = [Self::New, Self::InProgress, Self::Resolved, Self::Spam];
    const NAMES: &'static [&'static str] = &["new", "in_progress", "resolved", "spam"];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Spam => "spam",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == raw)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Commercial,
    Infrastructure,
    Industrial,
    Residential,
    Other,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::Commercial,
        Self::Infrastructure,
        Self::Industrial,
        Self::Residential,
        Self::Other,
    ];
    const NAMES: &'static [&'static str] = &[
        "commercial",
        "infrastructure",
        "industrial",
        "residential",
        "other",
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commercial => "commercial",
            Self::Infrastructure => "infrastructure",
            Self::Industrial => "industrial",
            Self::Residential => "residential",
            Self::Other => "other",
        }
    }

    /// Case-insensitive lookup.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        Self::ALL.into_iter().find(|category| category.as_str() == raw)
    }
}

/// Request context captured at intake.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Metadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub is_potential_spam: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusChange {
    pub status: Status,
    pub changed_by: Uuid,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Validated and normalised contact fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub category: Option<Category>,
    pub budget: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Submission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub category: Option<Category>,
    pub budget: Option<String>,
    pub status: Status,
    pub metadata: Metadata,
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// Build a new record; spam-flagged submissions start as `spam`.
    #[must_use]
    pub fn new(contact: Contact, mut metadata: Metadata, spam: bool, now: DateTime<Utc>) -> Self {
        metadata.is_potential_spam = spam;
        Self {
            id: Uuid::new_v4(),
            name: contact.name,
            email: contact.email,
            phone: contact.phone,
            subject: contact.subject,
            message: contact.message,
            category: contact.category,
            budget: contact.budget,
            status: if spam { Status::Spam } else { Status::New },
            metadata,
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Return the record with `change` applied and appended to the history.
    #[must_use]
    pub fn with_status(mut self, change: StatusChange) -> Self {
        self.status = change.status;
        self.updated_at = change.changed_at;
        self.status_history.push(change);
        self
    }
}

/// Queryable fields of a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionField {
    Name,
    Email,
    Phone,
    Subject,
    Message,
    Category,
    Budget,
    Status,
    IpAddress,
    IsPotentialSpam,
    CreatedAt,
    UpdatedAt,
}

impl Schema for SubmissionField {
    const FIELDS: &'static [Self] = &[
        Self::Name,
        Self::Email,
        Self::Phone,
        Self::Subject,
        Self::Message,
        Self::Category,
        Self::Budget,
        Self::Status,
        Self::IpAddress,
        Self::IsPotentialSpam,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];
    const PROJECTION: &'static [&'static str] = &[
        "name",
        "email",
        "phone",
        "subject",
        "message",
        "category",
        "budget",
        "status",
        "metadata",
        "status_history",
        "created_at",
        "updated_at",
    ];
    const SEARCH: &'static [Self] = &[Self::Name, Self::Email, Self::Subject, Self::Message];
    const DEFAULT_SORT: &'static [SortKey<Self>] = &[SortKey {
        field: Self::CreatedAt,
        direction: Direction::Desc,
    }];

    fn name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Subject => "subject",
            Self::Message => "message",
            Self::Category => "category",
            Self::Budget => "budget",
            Self::Status => "status",
            Self::IpAddress => "ip_address",
            Self::IsPotentialSpam => "is_potential_spam",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    fn column(self) -> &'static str {
        self.name()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Category => FieldKind::Enum(Category::NAMES),
            Self::Status => FieldKind::Enum(Status::NAMES),
            Self::IsPotentialSpam => FieldKind::Bool,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn filterable(self) -> bool {
        !matches!(self, Self::Message)
    }

    fn sortable(self) -> bool {
        !matches!(self, Self::Message | Self::Budget)
    }
}

impl Record<SubmissionField> for Submission {
    fn id(&self) -> Uuid {
        self.id
    }

    fn value(&self, field: SubmissionField) -> Option<Value> {
        let text = |value: &str| Some(Value::Text(value.to_string()));
        match field {
            SubmissionField::Name => text(&self.name),
            SubmissionField::Email => text(&self.email),
            SubmissionField::Phone => self.phone.as_deref().and_then(text),
            SubmissionField::Subject => text(&self.subject),
            SubmissionField::Message => text(&self.message),
            SubmissionField::Category => self.category.map(Category::as_str).and_then(text),
            SubmissionField::Budget => self.budget.as_deref().and_then(text),
            SubmissionField::Status => text(self.status.as_str()),
            SubmissionField::IpAddress => self.metadata.ip_address.as_deref().and_then(text),
            SubmissionField::IsPotentialSpam => Some(Value::Bool(self.metadata.is_potential_spam)),
            SubmissionField::CreatedAt => Some(Value::Timestamp(self.created_at)),
            SubmissionField::UpdatedAt => Some(Value::Timestamp(self.updated_at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact {
            name: "Ada Builder".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            subject: "Warehouse extension".to_string(),
            message: "We need a quote for a 2,000 sqm extension.".to_string(),
            category: Some(Category::Industrial),
            budget: Some("250k".to_string()),
        }
    }

    #[test]
    fn new_submission_status_follows_spam_flag() {
        let now = Utc::now();
        let clean = Submission::new(contact(), Metadata::default(), false, now);
        assert_eq!(clean.status, Status::New);
        assert!(!clean.metadata.is_potential_spam);

        let spam = Submission::new(contact(), Metadata::default(), true, now);
        assert_eq!(spam.status, Status::Spam);
        assert!(spam.metadata.is_potential_spam);
        assert_ne!(clean.id, spam.id);
    }

    #[test]
    fn with_status_appends_history() {
        let now = Utc::now();
        let submission = Submission::new(contact(), Metadata::default(), false, now);
        let change = StatusChange {
            status: Status::InProgress,
            changed_by: Uuid::new_v4(),
            notes: Some("called back".to_string()),
            changed_at: now + chrono::Duration::minutes(5),
        };
        let updated = submission.with_status(change.clone());
        assert_eq!(updated.status, Status::InProgress);
        assert_eq!(updated.updated_at, change.changed_at);
        assert_eq!(updated.status_history, vec![change]);
    }

    #[test]
    fn status_round_trips_through_names() {
        for status in Status::ALL {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("pending"), None);
        assert_eq!(
            serde_json::to_value(Status::InProgress).ok(),
            Some(serde_json::json!("in_progress"))
        );
    }

    #[test]
    fn category_parse_ignores_case() {
        assert_eq!(Category::parse(" Residential "), Some(Category::Residential));
        assert_eq!(Category::parse("castle"), None);
    }
}
