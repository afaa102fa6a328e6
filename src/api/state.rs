//! Shared request state, injected as an `Extension`.

use chrono::{FixedOffset, Local};
use std::sync::Arc;

use crate::{
    credentials::{LockoutPolicy, LogMailer, Mailer},
    query::QueryLimits,
    session::SessionKeys,
    store::Store,
    submissions::IntakePolicy,
};

#[derive(Clone)]
pub struct AppState {
    store: Store,
    keys: SessionKeys,
    lockout: LockoutPolicy,
    intake: IntakePolicy,
    limits: QueryLimits,
    mailer: Arc<dyn Mailer>,
    frontend_base_url: String,
    local_offset: Option<FixedOffset>,
    trust_proxy_headers: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("lockout", &self.lockout)
            .field("limits", &self.limits)
            .field("frontend_base_url", &self.frontend_base_url)
            .field("trust_proxy_headers", &self.trust_proxy_headers)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(store: Store, keys: SessionKeys, frontend_base_url: impl Into<String>) -> Self {
        Self {
            store,
            keys,
            lockout: LockoutPolicy::new(),
            intake: IntakePolicy::new(),
            limits: QueryLimits::new(),
            mailer: Arc::new(LogMailer),
            frontend_base_url: frontend_base_url.into(),
            local_offset: None,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_intake(mut self, intake: IntakePolicy) -> Self {
        self.intake = intake;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Pin the offset used for "today" and daily buckets instead of the host's.
    #[must_use]
    pub fn with_local_offset(mut self, offset: FixedOffset) -> Self {
        self.local_offset = Some(offset);
        self
    }

    /// Take the client IP from `X-Forwarded-For`/`X-Real-IP` instead of the socket peer.
    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutPolicy {
        &self.lockout
    }

    #[must_use]
    pub fn intake(&self) -> &IntakePolicy {
        &self.intake
    }

    #[must_use]
    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// Session cookies are only marked `Secure` when the frontend is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }

    #[must_use]
    pub fn local_offset(&self) -> FixedOffset {
        self.local_offset
            .unwrap_or_else(|| *Local::now().offset())
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}
