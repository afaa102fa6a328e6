//! Failed-login tracking per credential.
//!
//! The state is a plain value; the store persists it with a compare-and-set so
//! concurrent logins against the same credential never lose an increment.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_THRESHOLD: u32 = 5;
pub const DEFAULT_LOCK_SECONDS: i64 = 15 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    threshold: u32,
    lock_for: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            lock_for: Duration::seconds(DEFAULT_LOCK_SECONDS),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_lock_seconds(mut self, seconds: i64) -> Self {
        self.lock_for = Duration::seconds(seconds.max(1));
        self
    }

    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    /// The lock expiry when a lock is in force at `now`.
    #[must_use]
    pub fn locked_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lock_until.filter(|until| *until > now)
    }

    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until(now).is_some()
    }

    /// State after one more failed attempt at `now`.
    ///
    /// An expired lock restarts the count at one; reaching the threshold locks.
    #[must_use]
    pub fn after_failure(self, now: DateTime<Utc>, policy: &LockoutPolicy) -> Self {
        if self.lock_until.is_some_and(|until| until <= now) {
            return Self {
                failed_attempts: 1,
                lock_until: None,
            };
        }
        let failed_attempts = self.failed_attempts.saturating_add(1);
        let lock_until = if failed_attempts >= policy.threshold {
            Some(now + policy.lock_for)
        } else {
            self.lock_until
        };
        Self {
            failed_attempts,
            lock_until,
        }
    }

    /// Whether a successful login has anything to reset.
    #[must_use]
    pub fn needs_reset(&self) -> bool {
        self.failed_attempts > 0 || self.lock_until.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_on_threshold() {
        let policy = LockoutPolicy::new();
        let now = Utc::now();
        let mut state = LockoutState::default();
        for attempt in 1..DEFAULT_THRESHOLD {
            state = state.after_failure(now, &policy);
            assert_eq!(state.failed_attempts, attempt);
            assert!(!state.is_locked(now));
        }
        state = state.after_failure(now, &policy);
        assert_eq!(state.failed_attempts, DEFAULT_THRESHOLD);
        assert_eq!(state.locked_until(now), Some(now + Duration::minutes(15)));
    }

    #[test]
    fn expired_lock_restarts_count() {
        let policy = LockoutPolicy::new();
        let now = Utc::now();
        let state = LockoutState {
            failed_attempts: 5,
            lock_until: Some(now - Duration::seconds(1)),
        };
        assert!(!state.is_locked(now));
        assert_eq!(
            state.after_failure(now, &policy),
            LockoutState {
                failed_attempts: 1,
                lock_until: None,
            }
        );
    }

    #[test]
    fn lock_is_exclusive_of_expiry_instant() {
        let now = Utc::now();
        let state = LockoutState {
            failed_attempts: 5,
            lock_until: Some(now),
        };
        assert!(!state.is_locked(now));
        assert!(state.is_locked(now - Duration::milliseconds(1)));
    }

    #[test]
    fn custom_policy() {
        let policy = LockoutPolicy::new()
            .with_threshold(2)
            .with_lock_seconds(60);
        let now = Utc::now();
        let state = LockoutState::default()
            .after_failure(now, &policy)
            .after_failure(now, &policy);
        assert_eq!(state.locked_until(now), Some(now + Duration::seconds(60)));
    }

    #[test]
    fn needs_reset_only_when_dirty() {
        assert!(!LockoutState::default().needs_reset());
        assert!(
            LockoutState {
                failed_attempts: 1,
                lock_until: None
            }
            .needs_reset()
        );
    }
}
