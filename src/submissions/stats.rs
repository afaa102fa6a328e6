//! Aggregate counts for the admin dashboard.
//!
//! Day boundaries follow the server's local offset: "today" starts at local
//! midnight and the daily series covers today plus the 29 preceding days.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::models::Status;
use crate::{credentials::models::CredentialCounts, error::Result, store::Store};

pub const SERIES_DAYS: u32 = 30;
const SECONDS_PER_DAY: i64 = 86_400;

/// Time boundaries of one report, fixed before the store is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsWindow {
    pub today_start: DateTime<Utc>,
    pub series_start: DateTime<Utc>,
    pub days: u32,
    offset: FixedOffset,
}

impl StatsWindow {
    #[must_use]
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let today_start = now
            .with_timezone(&offset)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| midnight.and_local_timezone(offset).single())
            .map_or(now, |midnight| midnight.with_timezone(&Utc));
        let series_start = today_start - Duration::days(i64::from(SERIES_DAYS) - 1);
        Self {
            today_start,
            series_start,
            days: SERIES_DAYS,
            offset,
        }
    }

    /// Index into the daily series for `at`, if it falls inside the window.
    #[must_use]
    pub fn bucket(&self, at: DateTime<Utc>) -> Option<usize> {
        if at < self.series_start {
            return None;
        }
        let index = (at - self.series_start).num_seconds() / SECONDS_PER_DAY;
        usize::try_from(index)
            .ok()
            .filter(|index| *index < self.days as usize)
    }

    /// End of the series window (exclusive).
    #[must_use]
    pub fn series_end(&self) -> DateTime<Utc> {
        self.series_start + Duration::days(i64::from(self.days))
    }

    fn local_date(&self, index: usize) -> NaiveDate {
        let start = self.series_start + Duration::days(i64::try_from(index).unwrap_or(0));
        start.with_timezone(&self.offset).date_naive()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCounts {
    pub new: u64,
    pub in_progress: u64,
    pub resolved: u64,
    pub spam: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: Status, count: u64) {
        let slot = match status {
            Status::New => &mut self.new,
            Status::InProgress => &mut self.in_progress,
            Status::Resolved => &mut self.resolved,
            Status::Spam => &mut self.spam,
        };
        *slot += count;
    }
}

/// Raw counts read from one store snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionCounts {
    pub total: u64,
    pub today: u64,
    pub by_status: StatusCounts,
    /// One slot per day of the window, oldest first.
    pub daily: Vec<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Totals {
    pub submissions: u64,
    pub today: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Stats {
    pub totals: Totals,
    pub by_status: StatusCounts,
    pub daily_series: Vec<DailyCount>,
    pub users: CredentialCounts,
}

impl Stats {
    #[must_use]
    pub fn from_counts(
        window: &StatsWindow,
        counts: SubmissionCounts,
        users: CredentialCounts,
    ) -> Self {
        let daily_series = (0..window.days as usize)
            .map(|index| DailyCount {
                date: window.local_date(index),
                count: counts.daily.get(index).copied().unwrap_or(0),
            })
            .collect();
        Self {
            totals: Totals {
                submissions: counts.total,
                today: counts.today,
            },
            by_status: counts.by_status,
            daily_series,
            users,
        }
    }
}

/// Build the dashboard report as of `now`.
///
/// # Errors
/// Returns `Error::StorageUnavailable` if the store cannot be read.
pub async fn report(store: &Store, now: DateTime<Utc>, offset: FixedOffset) -> Result<Stats> {
    let window = StatsWindow::new(now, offset);
    let counts = store.submission_counts(&window).await?;
    let users = store.credential_counts().await?;
    Ok(Stats::from_counts(&window, counts, users))
}
