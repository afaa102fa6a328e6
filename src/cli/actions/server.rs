use crate::{
    api::{self, AppState},
    credentials::{LockoutPolicy, service},
    query::QueryLimits,
    session::SessionKeys,
    store,
    submissions::{IntakePolicy, rate_limit::RatePolicy},
};
use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub session_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub store_timeout: Duration,
    pub list_max_limit: u32,
    pub submission_rate_limit: u32,
    pub submission_rate_window_seconds: i64,
    pub spam_window_seconds: i64,
    pub spam_threshold: u64,
    pub lockout_threshold: u32,
    pub lockout_seconds: i64,
    pub trust_proxy_headers: bool,
    pub bootstrap_admin: Option<(String, SecretString)>,
}

impl Args {
    fn intake(&self) -> IntakePolicy {
        IntakePolicy::new()
            .with_rate_policy(
                RatePolicy::new()
                    .with_limit(self.submission_rate_limit)
                    .with_window_seconds(self.submission_rate_window_seconds),
            )
            .with_spam_window_seconds(self.spam_window_seconds)
            .with_spam_threshold(self.spam_threshold)
    }

    fn lockout(&self) -> LockoutPolicy {
        LockoutPolicy::new()
            .with_threshold(self.lockout_threshold)
            .with_lock_seconds(self.lockout_seconds)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be opened, the bootstrap admin cannot
/// be created, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = store::open(&args.dsn, args.store_timeout)
        .await
        .context("Could not open store")?;

    if let Some((email, password)) = &args.bootstrap_admin {
        let created =
            service::bootstrap_admin(&store, email, password.expose_secret(), Utc::now())
                .await
                .context("Could not create bootstrap admin")?;
        if created {
            info!(email = %email, "Created bootstrap admin");
        }
    }

    let lockout = args.lockout();
    let intake = args.intake();
    let limits = QueryLimits::new().with_max_limit(args.list_max_limit);
    let keys = SessionKeys::new(args.session_secret).with_ttl_seconds(args.session_ttl_seconds);
    let state = AppState::new(store, keys, args.frontend_base_url)
        .with_lockout(lockout)
        .with_intake(intake)
        .with_limits(limits)
        .with_trust_proxy_headers(args.trust_proxy_headers);

    api::new(args.port, state).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("frontend_base_url", args.frontend_base_url.clone()),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
        (
            "store_timeout_ms",
            args.store_timeout.as_millis().to_string(),
        ),
        ("list_max_limit", args.list_max_limit.to_string()),
        (
            "submission_rate",
            format!(
                "{}/{}s",
                args.submission_rate_limit, args.submission_rate_window_seconds
            ),
        ),
        (
            "spam",
            format!(">{} in {}s", args.spam_threshold, args.spam_window_seconds),
        ),
        (
            "lockout",
            format!(
                "{} failures, {}s",
                args.lockout_threshold, args.lockout_seconds
            ),
        ),
        ("trust_proxy_headers", args.trust_proxy_headers.to_string()),
        (
            "bootstrap_admin",
            args.bootstrap_admin
                .as_ref()
                .map_or_else(|| "none".to_string(), |(email, _)| email.clone()),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", quotedesk_banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn quotedesk_banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    QUOTEDESK_BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed).to_string()
}

const QUOTEDESK_BANNER: &str = r"
   _________
  |  _____  |
  | |     | |
  | |_____| |   Q U O T E D E S K {VERSION}
  |_________|
  /_/_/_/_/_\";
