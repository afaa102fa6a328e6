//! Per-key sliding-window rate limiting for public intake.
//!
//! Flow Overview:
//! 1) Hits are counted per (key, time bucket); buckets are one minute wide.
//! 2) A request is limited when the live buckets (those inside the window)
//!    already hold `limit` hits; limited requests are not recorded.
//! 3) `Retry-After` is the time until the oldest live bucket leaves the window.
//! 4) Keys with no live buckets are swept at least once per window, so
//!    one-off clients do not accumulate.
//!
//! Scaling: `MemoryRateLimiter` serves a single instance; `PgRateLimiter`
//! shares counters across instances through the `rate_limit_hits` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info_span};

use crate::store::StoreError;

pub const DEFAULT_WINDOW_SECONDS: i64 = 15 * 60;
pub const DEFAULT_LIMIT: u32 = 5;
const BUCKET_SECONDS: i64 = 60;
/// The in-memory table is also swept when it doubles past this many keys.
const SWEEP_MIN_KEYS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatePolicy {
    window_seconds: i64,
    limit: u32,
    bucket_seconds: i64,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RatePolicy {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            limit: DEFAULT_LIMIT,
            bucket_seconds: BUCKET_SECONDS,
        }
    }

    #[must_use]
    pub fn with_window_seconds(mut self, seconds: i64) -> Self {
        self.window_seconds = seconds.max(1);
        self.bucket_seconds = BUCKET_SECONDS.min(self.window_seconds);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    fn buckets(&self) -> i64 {
        (self.window_seconds + self.bucket_seconds - 1) / self.bucket_seconds
    }

    fn bucket_of(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp().div_euclid(self.bucket_seconds)
    }

    /// Oldest bucket still inside the window at `now`.
    fn first_live_bucket(&self, now: DateTime<Utc>) -> i64 {
        self.bucket_of(now) - self.buckets() + 1
    }

    /// Decide from the live `(bucket, hits)` pairs, oldest first.
    fn decide(&self, now: DateTime<Utc>, live: &[(i64, u32)]) -> RateDecision {
        let used: u64 = live.iter().map(|(_, hits)| u64::from(*hits)).sum();
        if used < u64::from(self.limit) {
            return RateDecision::Allowed;
        }
        let oldest = live
            .iter()
            .find(|(_, hits)| *hits > 0)
            .map_or_else(|| self.bucket_of(now), |(bucket, _)| *bucket);
        let frees_at = (oldest + self.buckets()) * self.bucket_seconds;
        let retry_after_seconds = u64::try_from(frees_at - now.timestamp())
            .unwrap_or(1)
            .max(1);
        RateDecision::Limited {
            retry_after_seconds,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `key` at `now` unless the key is already limited.
    async fn hit(
        &self,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    counters: Mutex<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    keys: HashMap<String, BTreeMap<i64, u32>>,
    swept_bucket: Option<i64>,
    sweep_len: usize,
}

impl Counters {
    fn sweep_due(&self, policy: &RatePolicy, now: DateTime<Utc>) -> bool {
        self.keys.len() >= self.sweep_len
            || self
                .swept_bucket
                .is_none_or(|swept| policy.bucket_of(now) - swept >= policy.buckets())
    }

    /// Drop expired buckets of every key, then keys left empty.
    fn sweep(&mut self, policy: &RatePolicy, now: DateTime<Utc>) {
        let first_live = policy.first_live_bucket(now);
        self.keys.retain(|_, buckets| {
            buckets.retain(|bucket, _| *bucket >= first_live);
            !buckets.is_empty()
        });
        self.swept_bucket = Some(policy.bucket_of(now));
        self.sweep_len = (self.keys.len() * 2).max(SWEEP_MIN_KEYS);
    }
}

#[cfg(test)]
impl MemoryRateLimiter {
    async fn tracked_keys(&self) -> usize {
        self.counters.lock().await.keys.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn hit(
        &self,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let mut counters = self.counters.lock().await;
        if counters.sweep_due(policy, now) {
            counters.sweep(policy, now);
        }

        let buckets = counters.keys.entry(key.to_string()).or_default();
        let first_live = policy.first_live_bucket(now);
        buckets.retain(|bucket, _| *bucket >= first_live);

        let live: Vec<(i64, u32)> = buckets.iter().map(|(b, h)| (*b, *h)).collect();
        let decision = policy.decide(now, &live);
        if decision == RateDecision::Allowed {
            *buckets.entry(policy.bucket_of(now)).or_insert(0) += 1;
        }
        Ok(decision)
    }
}

#[derive(Clone, Debug)]
pub struct PgRateLimiter {
    pool: PgPool,
    swept_bucket: Arc<AtomicI64>,
}

impl PgRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            swept_bucket: Arc::new(AtomicI64::new(i64::MIN)),
        }
    }

    /// Delete expired rows of every key, at most once per window per instance.
    async fn sweep(&self, policy: &RatePolicy, now: DateTime<Utc>) -> Result<(), StoreError> {
        let bucket = policy.bucket_of(now);
        let swept = self.swept_bucket.load(Ordering::Relaxed);
        if bucket.saturating_sub(swept) < policy.buckets()
            || self
                .swept_bucket
                .compare_exchange(swept, bucket, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
        {
            return Ok(());
        }

        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
        let result = sqlx::query("DELETE FROM rate_limit_hits WHERE bucket < $1")
            .bind(policy.first_live_bucket(now))
            .execute(&self.pool)
            .instrument(span)
            .await?;
        debug!(rows = result.rows_affected(), "Swept expired rate limit buckets");
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for PgRateLimiter {
    async fn hit(
        &self,
        key: &str,
        policy: &RatePolicy,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPSERT");
        let mut tx = self.pool.begin().await?;

        // Serialize hits per key for the rest of the transaction.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *tx)
            .instrument(span.clone())
            .await?;

        sqlx::query("DELETE FROM rate_limit_hits WHERE key = $1 AND bucket < $2")
            .bind(key)
            .bind(policy.first_live_bucket(now))
            .execute(&mut *tx)
            .instrument(span.clone())
            .await?;

        let rows: Vec<(i64, i32)> = sqlx::query_as(
            "SELECT bucket, hits FROM rate_limit_hits WHERE key = $1 ORDER BY bucket ASC",
        )
        .bind(key)
        .fetch_all(&mut *tx)
        .instrument(span.clone())
        .await?;
        let live: Vec<(i64, u32)> = rows
            .into_iter()
            .map(|(bucket, hits)| (bucket, u32::try_from(hits).unwrap_or(0)))
            .collect();

        let decision = policy.decide(now, &live);
        if decision == RateDecision::Allowed {
            let query = r"
                INSERT INTO rate_limit_hits (key, bucket, hits)
                VALUES ($1, $2, 1)
                ON CONFLICT (key, bucket) DO UPDATE SET hits = rate_limit_hits.hits + 1
            ";
            sqlx::query(query)
                .bind(key)
                .bind(policy.bucket_of(now))
                .execute(&mut *tx)
                .instrument(span)
                .await?;
        }

        tx.commit().await?;
        self.sweep(policy, now).await?;
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn sixth_hit_in_window_is_limited() -> Result<(), StoreError> {
        let limiter = MemoryRateLimiter::default();
        let policy = RatePolicy::new();
        let start = at("2024-06-10T12:00:00Z");
        for i in 0..5 {
            let decision = limiter
                .hit("203.0.113.7", &policy, start + Duration::minutes(i))
                .await?;
            assert_eq!(decision, RateDecision::Allowed, "hit {i}");
        }
        let decision = limiter
            .hit("203.0.113.7", &policy, start + Duration::minutes(5))
            .await?;
        // the first hit leaves the window at 12:15
        assert_eq!(
            decision,
            RateDecision::Limited {
                retry_after_seconds: 600
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn window_slides() -> Result<(), StoreError> {
        let limiter = MemoryRateLimiter::default();
        let policy = RatePolicy::new();
        let start = at("2024-06-10T12:00:00Z");
        for _ in 0..5 {
            limiter.hit("ip", &policy, start).await?;
        }
        assert!(matches!(
            limiter.hit("ip", &policy, start + Duration::minutes(14)).await?,
            RateDecision::Limited { .. }
        ));
        assert_eq!(
            limiter.hit("ip", &policy, start + Duration::minutes(15)).await?,
            RateDecision::Allowed
        );
        Ok(())
    }

    #[tokio::test]
    async fn keys_are_independent() -> Result<(), StoreError> {
        let limiter = MemoryRateLimiter::default();
        let policy = RatePolicy::new().with_limit(1);
        let now = Utc::now();
        assert_eq!(limiter.hit("a", &policy, now).await?, RateDecision::Allowed);
        assert!(matches!(
            limiter.hit("a", &policy, now).await?,
            RateDecision::Limited { .. }
        ));
        assert_eq!(limiter.hit("b", &policy, now).await?, RateDecision::Allowed);
        Ok(())
    }

    #[tokio::test]
    async fn limited_hits_are_not_recorded() -> Result<(), StoreError> {
        let limiter = MemoryRateLimiter::default();
        let policy = RatePolicy::new().with_limit(2).with_window_seconds(120);
        let start = at("2024-06-10T12:00:00Z");
        limiter.hit("ip", &policy, start).await?;
        limiter.hit("ip", &policy, start + Duration::seconds(60)).await?;
        for _ in 0..10 {
            limiter.hit("ip", &policy, start + Duration::seconds(90)).await?;
        }
        // only the 12:00 bucket has left the window
        assert_eq!(
            limiter.hit("ip", &policy, start + Duration::seconds(120)).await?,
            RateDecision::Allowed
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_keys_are_evicted() -> Result<(), StoreError> {
        let limiter = MemoryRateLimiter::default();
        let policy = RatePolicy::new();
        let start = at("2024-06-10T12:00:00Z");
        for i in 0..10_000 {
            limiter.hit(&format!("10.0.{}.{}", i / 256, i % 256), &policy, start).await?;
        }
        assert_eq!(limiter.tracked_keys().await, 10_000);

        limiter
            .hit("192.0.2.1", &policy, start + Duration::hours(24))
            .await?;
        assert_eq!(limiter.tracked_keys().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn sweep_keeps_live_keys() -> Result<(), StoreError> {
        let limiter = MemoryRateLimiter::default();
        let policy = RatePolicy::new().with_limit(1);
        let start = at("2024-06-10T12:00:00Z");
        limiter.hit("old", &policy, start).await?;
        limiter
            .hit("recent", &policy, start + Duration::minutes(10))
            .await?;

        // 12:16 is a full window after the last sweep at 12:00
        limiter
            .hit("new", &policy, start + Duration::minutes(16))
            .await?;
        assert_eq!(limiter.tracked_keys().await, 2);
        assert!(matches!(
            limiter
                .hit("recent", &policy, start + Duration::minutes(16))
                .await?,
            RateDecision::Limited { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn postgres_sweep_deletes_expired_rows() -> Result<(), StoreError> {
        let Ok(dsn) = std::env::var("QUOTEDESK_TEST_DSN") else {
            return Ok(());
        };
        let store = crate::store::PgStore::connect(&dsn).await?;
        store.migrate().await?;
        let limiter = PgRateLimiter::new(store.pool().clone());
        let policy = RatePolicy::new();
        let stale_key = format!("sweep-{}", uuid::Uuid::new_v4());
        let start = at("2000-01-01T00:00:00Z");

        limiter.hit(&stale_key, &policy, start).await?;
        let fresh = PgRateLimiter::new(store.pool().clone());
        fresh.hit("sweep-fresh", &policy, Utc::now()).await?;

        let (left,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM rate_limit_hits WHERE key = $1")
                .bind(&stale_key)
                .fetch_one(store.pool())
                .await?;
        assert_eq!(left, 0);
        Ok(())
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let policy = RatePolicy::new().with_limit(1);
        let now = at("2024-06-10T12:14:59Z");
        let first = policy.first_live_bucket(now);
        assert_eq!(
            policy.decide(now, &[(first, 1)]),
            RateDecision::Limited {
                retry_after_seconds: 1
            }
        );
    }
}
