//! Date-range export of submissions as JSON or CSV.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use super::models::{Submission, SubmissionField};
use crate::{
    error::{Error, FieldError, Result},
    query::{Comparison, Filter, Value},
    store::Store,
};

const CSV_HEADER: [&str; 9] = [
    "name",
    "email",
    "phone",
    "subject",
    "message",
    "category",
    "budget",
    "status",
    "created_at",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ExportRequest {
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// RFC 3339 timestamp or `YYYY-MM-DD` (whole day included).
    pub end_date: Option<String>,
    /// `json` (default) or `csv`.
    pub format: Option<String>,
}

/// Rendered export ready to be sent as an attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportFile {
    pub format: ExportFormat,
    pub filename: String,
    pub body: String,
}

/// Parsed export bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRange {
    pub start: DateTime<Utc>,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
    pub format: ExportFormat,
}

impl ExportRange {
    #[must_use]
    pub fn filter(&self) -> Filter<SubmissionField> {
        Filter::default()
            .with(
                SubmissionField::CreatedAt,
                Comparison::Gte,
                Value::Timestamp(self.start),
            )
            .with(
                SubmissionField::CreatedAt,
                Comparison::Lt,
                Value::Timestamp(self.end),
            )
    }
}

/// Parse a bound; a bare date also yields the start of the following day.
fn parse_bound(raw: &str) -> Option<(DateTime<Utc>, Option<DateTime<Utc>>)> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some((parsed.with_timezone(&Utc), None));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some((start, Some(start + Duration::days(1))))
}

impl ExportRequest {
    /// # Errors
    /// Returns `Error::Validation` for missing or malformed dates, an inverted
    /// range or an unknown format.
    pub fn parse(&self) -> Result<ExportRange> {
        let mut errors = Vec::new();

        let start = match self.start_date.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push(FieldError::new("start_date", "Start date is required"));
                None
            }
            Some(raw) => {
                let parsed = parse_bound(raw).map(|(start, _)| start);
                if parsed.is_none() {
                    errors.push(FieldError::new("start_date", "Start date is not a valid date"));
                }
                parsed
            }
        };

        let end = match self.end_date.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push(FieldError::new("end_date", "End date is required"));
                None
            }
            Some(raw) => {
                // An explicit timestamp is inclusive; a date covers the whole day.
                let parsed = parse_bound(raw).map(|(at, next_day)| {
                    next_day.unwrap_or_else(|| at + Duration::microseconds(1))
                });
                if parsed.is_none() {
                    errors.push(FieldError::new("end_date", "End date is not a valid date"));
                }
                parsed
            }
        };

        let format = match self.format.as_deref().map(|f| f.trim().to_lowercase()) {
            None => ExportFormat::Json,
            Some(format) if format.is_empty() || format == "json" => ExportFormat::Json,
            Some(format) if format == "csv" => ExportFormat::Csv,
            Some(_) => {
                errors.push(FieldError::new("format", "Format must be json or csv"));
                ExportFormat::Json
            }
        };

        if let (Some(start), Some(end)) = (start, end)
            && start >= end
        {
            errors.push(FieldError::new(
                "start_date",
                "Start date must not be after end date",
            ));
        }

        match (start, end) {
            (Some(start), Some(end)) if errors.is_empty() => Ok(ExportRange { start, end, format }),
            _ => Err(Error::Validation(errors)),
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

#[must_use]
pub fn render_csv(submissions: &[Submission]) -> String {
    let mut out = csv_row(&CSV_HEADER);
    for submission in submissions {
        let created_at = submission.created_at.to_rfc3339();
        out.push_str(&csv_row(&[
            &submission.name,
            &submission.email,
            submission.phone.as_deref().unwrap_or(""),
            &submission.subject,
            &submission.message,
            submission.category.map_or("", |category| category.as_str()),
            submission.budget.as_deref().unwrap_or(""),
            submission.status.as_str(),
            &created_at,
        ]));
    }
    out
}

/// Run an export as of `now`.
///
/// # Errors
/// Returns `Error::Validation` for a bad request and `StorageUnavailable`
/// when the store cannot be read.
pub async fn export(store: &Store, request: &ExportRequest, now: DateTime<Utc>) -> Result<ExportFile> {
    let range = request.parse()?;
    let submissions = store.export_submissions(&range.filter()).await?;
    let body = match range.format {
        ExportFormat::Csv => render_csv(&submissions),
        ExportFormat::Json => serde_json::to_string_pretty(&submissions)
            .map_err(|err| Error::field("format", &format!("failed to encode export: {err}")))?,
    };
    Ok(ExportFile {
        format: range.format,
        filename: format!(
            "submissions-{}.{}",
            now.format("%Y%m%dT%H%M%SZ"),
            range.format.extension()
        ),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submissions::models::{Contact, Metadata};
    use std::time::Duration as StdDuration;

    fn request(start: Option<&str>, end: Option<&str>, format: Option<&str>) -> ExportRequest {
        ExportRequest {
            start_date: start.map(ToString::to_string),
            end_date: end.map(ToString::to_string),
            format: format.map(ToString::to_string),
        }
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_default()
    }

    #[test]
    fn date_only_end_covers_whole_day() -> Result<()> {
        let range = request(Some("2024-06-01"), Some("2024-06-30"), Some("CSV")).parse()?;
        assert_eq!(range.start, at("2024-06-01T00:00:00Z"));
        assert_eq!(range.end, at("2024-07-01T00:00:00Z"));
        assert_eq!(range.format, ExportFormat::Csv);
        Ok(())
    }

    #[test]
    fn rejects_missing_and_inverted_ranges() {
        let missing = request(None, Some(" "), Some("xml")).parse();
        match missing {
            Err(Error::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["start_date", "end_date", "format"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        let inverted = request(Some("2024-06-30"), Some("2024-06-01"), None).parse();
        assert!(matches!(inverted, Err(Error::Validation(_))));
    }

    #[test]
    fn csv_quotes_special_characters() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[tokio::test]
    async fn export_selects_range_newest_first() -> Result<()> {
        let store = Store::memory(StdDuration::from_secs(1));
        for (name, created) in [
            ("May", "2024-05-31T23:59:59Z"),
            ("Early June", "2024-06-01T08:00:00Z"),
            ("Late June", "2024-06-30T22:00:00Z"),
            ("July", "2024-07-01T00:00:00Z"),
        ] {
            let contact = Contact {
                name: name.to_string(),
                email: "client@example.com".to_string(),
                phone: None,
                subject: "Roof, gutters".to_string(),
                message: "Replace roof and gutters.".to_string(),
                category: None,
                budget: None,
            };
            store
                .insert_submission(&Submission::new(contact, Metadata::default(), false, at(created)))
                .await?;
        }

        let file = export(
            &store,
            &request(Some("2024-06-01"), Some("2024-06-30"), Some("csv")),
            at("2024-07-02T10:11:12Z"),
        )
        .await?;
        assert_eq!(file.filename, "submissions-20240702T101112Z.csv");
        let lines: Vec<&str> = file.body.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines.first().copied(),
            Some("name,email,phone,subject,message,category,budget,status,created_at")
        );
        assert!(lines.get(1).is_some_and(|line| line.starts_with("Late June,")));
        assert!(lines.get(1).is_some_and(|line| line.contains("\"Roof, gutters\"")));

        let json = export(
            &store,
            &request(Some("2024-06-01T00:00:00Z"), Some("2024-06-01T08:00:00Z"), None),
            at("2024-07-02T10:11:12Z"),
        )
        .await?;
        assert_eq!(json.format, ExportFormat::Json);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json.body)
            .map_err(|err| Error::field("body", &err.to_string()))?;
        assert_eq!(parsed.len(), 1);
        Ok(())
    }
}
