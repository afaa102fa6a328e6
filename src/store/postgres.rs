//! Postgres backend (`sqlx`).
//!
//! Every statement runs inside a `db.query` span. Schema lives in
//! `sql/schema.sql` and is applied idempotently at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    PgPool, Postgres, QueryBuilder, Row,
    postgres::{PgPoolOptions, PgRow},
    types::Json,
};
use std::time::Duration;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{CredentialRepo, StoreError, SubmissionRepo};
use crate::{
    credentials::{
        lockout::LockoutState,
        models::{Credential, CredentialCounts, CredentialField, ResetToken, Role},
    },
    query::{Filter, ListQuery, Page, sql},
    submissions::{
        models::{Category, Metadata, Status, StatusChange, Submission, SubmissionField},
        stats::{StatsWindow, SubmissionCounts},
    },
};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const SUBMISSION_COLUMNS: &str = "id, name, email, phone, subject, message, category, budget, \
     status, ip_address, user_agent, referrer, is_potential_spam, status_history, created_at, \
     updated_at";

const CREDENTIAL_COLUMNS: &str = "id, name, email, password_hash, role, active, failed_attempts, \
     lock_until, last_login, password_changed_at, reset_token_hash, reset_token_expires_at, \
     created_at, updated_at";

fn db_span(operation: &'static str) -> tracing::Span {
    info_span!("db.query", db.system = "postgresql", db.operation = operation)
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool sized for a single API instance.
    ///
    /// # Errors
    /// Returns `sqlx::Error` if the database is unreachable.
    pub async fn connect(dsn: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    ///
    /// # Errors
    /// Returns `sqlx::Error` if any statement fails.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(db_span("MIGRATE"))
            .await?;
        Ok(())
    }
}

fn submission_from_row(row: &PgRow) -> Result<Submission, StoreError> {
    let status: String = row.try_get("status")?;
    let status = Status::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown submission status {status:?}")))?;
    let category: Option<String> = row.try_get("category")?;
    let category = match category {
        Some(raw) => Some(
            Category::parse(&raw)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown category {raw:?}")))?,
        ),
        None => None,
    };
    let Json(status_history): Json<Vec<StatusChange>> = row.try_get("status_history")?;

    Ok(Submission {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        category,
        budget: row.try_get("budget")?,
        status,
        metadata: Metadata {
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            referrer: row.try_get("referrer")?,
            is_potential_spam: row.try_get("is_potential_spam")?,
        },
        status_history,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn credential_from_row(row: &PgRow) -> Result<Credential, StoreError> {
    let role: String = row.try_get("role")?;
    let role =
        Role::parse(&role).ok_or_else(|| StoreError::Corrupt(format!("unknown role {role:?}")))?;
    let failed_attempts: i32 = row.try_get("failed_attempts")?;
    let reset_hash: Option<String> = row.try_get("reset_token_hash")?;
    let reset_expires: Option<DateTime<Utc>> = row.try_get("reset_token_expires_at")?;
    let reset_token = match (reset_hash, reset_expires) {
        (Some(hash), Some(expires_at)) => Some(ResetToken { hash, expires_at }),
        _ => None,
    };

    Ok(Credential {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role,
        active: row.try_get("active")?,
        lockout: LockoutState {
            failed_attempts: u32::try_from(failed_attempts).unwrap_or(0),
            lock_until: row.try_get("lock_until")?,
        },
        last_login: row.try_get("last_login")?,
        password_changed_at: row.try_get("password_changed_at")?,
        reset_token,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn attempts(state: LockoutState) -> i32 {
    i32::try_from(state.failed_attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl SubmissionRepo for PgStore {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO submissions ({SUBMISSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        );
        sqlx::query(&query)
            .bind(submission.id)
            .bind(&submission.name)
            .bind(&submission.email)
            .bind(&submission.phone)
            .bind(&submission.subject)
            .bind(&submission.message)
            .bind(submission.category.map(Category::as_str))
            .bind(&submission.budget)
            .bind(submission.status.as_str())
            .bind(&submission.metadata.ip_address)
            .bind(&submission.metadata.user_agent)
            .bind(&submission.metadata.referrer)
            .bind(submission.metadata.is_potential_spam)
            .bind(Json(&submission.status_history))
            .bind(submission.created_at)
            .bind(submission.updated_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await?;
        Ok(())
    }

    async fn count_recent(
        &self,
        ip: Option<&str>,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let query = r"
            SELECT COUNT(*)
            FROM submissions
            WHERE created_at >= $1
              AND (email = $2 OR ($3::TEXT IS NOT NULL AND ip_address = $3))
        ";
        let total: i64 = sqlx::query_scalar(query)
            .bind(since)
            .bind(email)
            .bind(ip)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        Ok(count(total))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        let query = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn list(
        &self,
        query: &ListQuery<SubmissionField>,
    ) -> Result<Page<Submission>, StoreError> {
        let mut counter = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM submissions");
        sql::push_filter(&mut counter, &query.filter);
        let total: i64 = counter
            .build_query_scalar()
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {SUBMISSION_COLUMNS} FROM submissions"));
        sql::push_filter(&mut select, &query.filter);
        sql::push_page(&mut select, query);
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;

        Ok(Page {
            items: rows
                .iter()
                .map(submission_from_row)
                .collect::<Result<_, _>>()?,
            total: count(total),
        })
    }

    async fn update_status(
        &self,
        id: Uuid,
        change: &StatusChange,
    ) -> Result<Option<Submission>, StoreError> {
        let query = format!(
            "UPDATE submissions \
             SET status = $2, status_history = status_history || $3::JSONB, updated_at = $4 \
             WHERE id = $1 RETURNING {SUBMISSION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(change.status.as_str())
            .bind(Json(std::slice::from_ref(change)))
            .bind(change.changed_at)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE"))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self, window: &StatsWindow) -> Result<SubmissionCounts, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let span = db_span("SELECT");
        let (total, today): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE created_at >= $1) FROM submissions",
        )
        .bind(window.today_start)
        .fetch_one(&mut *tx)
        .instrument(span.clone())
        .await?;

        let mut counts = SubmissionCounts {
            total: count(total),
            today: count(today),
            daily: vec![0; window.days as usize],
            ..SubmissionCounts::default()
        };

        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM submissions GROUP BY status")
                .fetch_all(&mut *tx)
                .instrument(span.clone())
                .await?;
        for (status, n) in by_status {
            let status = Status::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown submission status {status:?}")))?;
            counts.by_status.add(status, count(n));
        }

        let daily: Vec<(i64, i64)> = sqlx::query_as(
            r"
            SELECT FLOOR(EXTRACT(EPOCH FROM (created_at - $1)) / 86400)::BIGINT AS day,
                   COUNT(*)
            FROM submissions
            WHERE created_at >= $1 AND created_at < $2
            GROUP BY day
            ",
        )
        .bind(window.series_start)
        .bind(window.series_end())
        .fetch_all(&mut *tx)
        .instrument(span)
        .await?;
        for (day, n) in daily {
            if let Some(slot) = usize::try_from(day)
                .ok()
                .and_then(|index| counts.daily.get_mut(index))
            {
                *slot = count(n);
            }
        }

        tx.commit().await?;
        Ok(counts)
    }

    async fn export(
        &self,
        filter: &Filter<SubmissionField>,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {SUBMISSION_COLUMNS} FROM submissions"));
        sql::push_filter(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id ASC");
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialRepo for PgStore {
    async fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO credentials ({CREDENTIAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        let result = sqlx::query(&query)
            .bind(credential.id)
            .bind(&credential.name)
            .bind(&credential.email)
            .bind(&credential.password_hash)
            .bind(credential.role.as_str())
            .bind(credential.active)
            .bind(attempts(credential.lockout))
            .bind(credential.lockout.lock_until)
            .bind(credential.last_login)
            .bind(credential.password_changed_at)
            .bind(credential.reset_token.as_ref().map(|token| token.hash.as_str()))
            .bind(credential.reset_token.as_ref().map(|token| token.expires_at))
            .bind(credential.created_at)
            .bind(credential.updated_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(StoreError::Duplicate("email"))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        let query = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let query = format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        let query = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials \
             WHERE reset_token_hash = $1 AND reset_token_expires_at > $2"
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn swap_lockout(
        &self,
        id: Uuid,
        expected: LockoutState,
        next: LockoutState,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE credentials
            SET failed_attempts = $4, lock_until = $5, updated_at = $6
            WHERE id = $1
              AND failed_attempts = $2
              AND lock_until IS NOT DISTINCT FROM $3
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(attempts(expected))
            .bind(expected.lock_until)
            .bind(attempts(next))
            .bind(next.lock_until)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE credentials SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;
        Ok(())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE credentials
            SET password_hash = $2,
                password_changed_at = $3,
                reset_token_hash = NULL,
                reset_token_expires_at = NULL,
                updated_at = $3
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .bind(changed_at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &ResetToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE credentials
            SET reset_token_hash = $2, reset_token_expires_at = $3, updated_at = $4
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(&token.hash)
            .bind(token.expires_at)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, StoreError> {
        let query = format!(
            "UPDATE credentials SET active = $2, updated_at = $3 WHERE id = $1 \
             RETURNING {CREDENTIAL_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(active)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE"))
            .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn list(
        &self,
        query: &ListQuery<CredentialField>,
    ) -> Result<Page<Credential>, StoreError> {
        let mut counter = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM credentials");
        sql::push_filter(&mut counter, &query.filter);
        let total: i64 = counter
            .build_query_scalar()
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials"));
        sql::push_filter(&mut select, &query.filter);
        sql::push_page(&mut select, query);
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT"))
            .await?;

        Ok(Page {
            items: rows
                .iter()
                .map(credential_from_row)
                .collect::<Result<_, _>>()?,
            total: count(total),
        })
    }

    async fn counts(&self) -> Result<CredentialCounts, StoreError> {
        let (total, active): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE active) FROM credentials",
        )
        .fetch_one(&self.pool)
        .instrument(db_span("SELECT"))
        .await?;
        Ok(CredentialCounts {
            total: count(total),
            active: count(active),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submissions::models::Contact;

    /// Connects to `QUOTEDESK_TEST_DSN`, or skips when unset.
    async fn test_store() -> Option<PgStore> {
        let dsn = std::env::var("QUOTEDESK_TEST_DSN").ok()?;
        let store = match PgStore::connect(&dsn).await {
            Ok(store) => store,
            Err(err) => {
                eprintln!("Skipping postgres test: {err}");
                return None;
            }
        };
        if let Err(err) = store.migrate().await {
            eprintln!("Skipping postgres test: {err}");
            return None;
        }
        Some(store)
    }

    #[tokio::test]
    async fn submission_round_trip_and_status_history() -> Result<(), StoreError> {
        let Some(store) = test_store().await else {
            return Ok(());
        };
        let now = Utc::now();
        let submission = Submission::new(
            Contact {
                name: "Pg Test".to_string(),
                email: format!("{}@example.com", Uuid::new_v4()),
                phone: Some("+1 555 0100".to_string()),
                subject: "Bridge".to_string(),
                message: "Footbridge over the creek.".to_string(),
                category: Some(Category::Infrastructure),
                budget: None,
            },
            Metadata {
                ip_address: Some("192.0.2.10".to_string()),
                ..Metadata::default()
            },
            false,
            now,
        );
        SubmissionRepo::insert(&store, &submission).await?;
        let found = store.find(submission.id).await?;
        assert_eq!(found.as_ref().map(|s| s.category), Some(Some(Category::Infrastructure)));

        let change = StatusChange {
            status: Status::InProgress,
            changed_by: Uuid::new_v4(),
            notes: Some("site visit booked".to_string()),
            changed_at: now,
        };
        let updated = store.update_status(submission.id, &change).await?;
        assert_eq!(updated.map(|s| s.status_history.len()), Some(1));
        assert!(store.delete(submission.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_credential_email() -> Result<(), StoreError> {
        let Some(store) = test_store().await else {
            return Ok(());
        };
        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4(),
            name: "Pg Editor".to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            password_hash: "hash".to_string(),
            role: Role::Editor,
            active: true,
            lockout: LockoutState::default(),
            last_login: None,
            password_changed_at: None,
            reset_token: None,
            created_at: now,
            updated_at: now,
        };
        CredentialRepo::insert(&store, &credential).await?;
        let again = Credential {
            id: Uuid::new_v4(),
            ..credential.clone()
        };
        let result = CredentialRepo::insert(&store, &again).await;
        assert!(matches!(result, Err(StoreError::Duplicate("email"))));

        let next = LockoutState {
            failed_attempts: 1,
            lock_until: None,
        };
        assert!(
            store
                .swap_lockout(credential.id, LockoutState::default(), next, now)
                .await?
        );
        assert!(
            !store
                .swap_lockout(credential.id, LockoutState::default(), next, now)
                .await?
        );
        Ok(())
    }
}
