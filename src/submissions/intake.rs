//! Public submission intake.
//!
//! Flow Overview:
//! 1) Validate the payload, reporting every violated field at once.
//! 2) Count the request against the per-IP limiter (only valid requests count).
//! 3) Score it: more than `spam_threshold` submissions from the same IP or
//!    email inside `spam_window` marks it as spam without rejecting it.
//! 4) Persist exactly one record and acknowledge with the same message
//!    whether or not it was classified as spam.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    models::{Category, Contact, Metadata, Submission},
    rate_limit::{RateDecision, RatePolicy},
};
use crate::{
    error::{Error, FieldError, Result},
    store::Store,
};

pub const ACKNOWLEDGEMENT: &str = "Thank you for your submission. We will get back to you soon!";
/// Limiter key shared by requests without a resolvable client IP.
pub const UNKNOWN_ORIGIN: &str = "unknown";
pub const DEFAULT_SPAM_WINDOW_SECONDS: i64 = 60 * 60;
pub const DEFAULT_SPAM_THRESHOLD: u64 = 3;
const MIN_MESSAGE_CHARS: usize = 10;

#[derive(Clone, Copy, Debug)]
pub struct IntakePolicy {
    rate: RatePolicy,
    spam_window: Duration,
    spam_threshold: u64,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl IntakePolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rate: RatePolicy::new(),
            spam_window: Duration::seconds(DEFAULT_SPAM_WINDOW_SECONDS),
            spam_threshold: DEFAULT_SPAM_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_rate_policy(mut self, rate: RatePolicy) -> Self {
        self.rate = rate;
        self
    }

    #[must_use]
    pub fn with_spam_window_seconds(mut self, seconds: i64) -> Self {
        self.spam_window = Duration::seconds(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_spam_threshold(mut self, threshold: u64) -> Self {
        self.spam_threshold = threshold;
        self
    }
}

/// Untrusted payload from the public contact form.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct SubmissionInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub category: Option<String>,
    pub budget: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Receipt {
    pub id: Uuid,
    pub message: String,
}

/// Lower-case and trim an email for storage and comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Optional leading `+`, then digits, spaces, `-`, `.` or parentheses with
/// 7 to 15 digits overall.
#[must_use]
pub fn valid_phone(phone: &str) -> bool {
    let shape = Regex::new(r"^\+?[0-9 ().-]+$").is_ok_and(|regex| regex.is_match(phone));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    shape && (7..=15).contains(&digits)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl SubmissionInput {
    /// Normalise the payload into [`Contact`] fields.
    ///
    /// # Errors
    /// Returns `Error::Validation` listing every invalid field.
    pub fn validate(self) -> Result<Contact> {
        let mut errors = Vec::new();

        let name = trimmed(self.name);
        if name.is_none() {
            errors.push(FieldError::new("name", "Name is required"));
        }

        let email = self.email.as_deref().map(normalize_email);
        if !email.as_deref().is_some_and(valid_email) {
            errors.push(FieldError::new("email", "Please include a valid email"));
        }

        let phone = trimmed(self.phone);
        if phone.as_deref().is_some_and(|phone| !valid_phone(phone)) {
            errors.push(FieldError::new("phone", "Please enter a valid phone number"));
        }

        let subject = trimmed(self.subject);
        if subject.is_none() {
            errors.push(FieldError::new("subject", "Subject is required"));
        }

        let message = trimmed(self.message);
        if !message
            .as_deref()
            .is_some_and(|message| message.chars().count() >= MIN_MESSAGE_CHARS)
        {
            errors.push(FieldError::new(
                "message",
                "Message must be at least 10 characters long",
            ));
        }

        let category = match trimmed(self.category) {
            None => None,
            Some(raw) => {
                let parsed = Category::parse(&raw);
                if parsed.is_none() {
                    let allowed: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
                    errors.push(FieldError::new(
                        "category",
                        format!("Category must be one of: {}", allowed.join(", ")),
                    ));
                }
                parsed
            }
        };

        match (name, email, subject, message) {
            (Some(name), Some(email), Some(subject), Some(message)) if errors.is_empty() => {
                Ok(Contact {
                    name,
                    email,
                    phone,
                    subject,
                    message,
                    category,
                    budget: trimmed(self.budget),
                })
            }
            _ => Err(Error::Validation(errors)),
        }
    }
}

/// Run one public submission through the pipeline.
///
/// # Errors
/// `Validation` for bad input, `RateLimited` when the origin exceeded its
/// window, `StorageUnavailable` when the store cannot be reached.
pub async fn submit(
    store: &Store,
    policy: &IntakePolicy,
    input: SubmissionInput,
    origin: Metadata,
    now: DateTime<Utc>,
) -> Result<Receipt> {
    let contact = input.validate()?;

    let key = origin.ip_address.as_deref().unwrap_or(UNKNOWN_ORIGIN);
    if let RateDecision::Limited {
        retry_after_seconds,
    } = store
        .hit(&format!("submission:{key}"), &policy.rate, now)
        .await?
    {
        warn!(origin = key, retry_after_seconds, "Submission rate limit exceeded");
        return Err(Error::RateLimited {
            retry_after_seconds,
        });
    }

    let recent = store
        .count_recent_submissions(
            origin.ip_address.as_deref(),
            &contact.email,
            now - policy.spam_window,
        )
        .await?;
    let spam = recent > policy.spam_threshold;

    let submission = Submission::new(contact, origin, spam, now);
    store.insert_submission(&submission).await?;
    info!(
        submission_id = %submission.id,
        status = %submission.status,
        recent,
        "Stored submission"
    );

    Ok(Receipt {
        id: submission.id,
        message: ACKNOWLEDGEMENT.to_string(),
    })
}
