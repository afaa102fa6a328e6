//! # Quotedesk (quote request intake & admin triage)
//!
//! `quotedesk` is the backend behind a construction company's marketing site.
//! It accepts contact and quote-request submissions from the public site and
//! exposes a small authenticated API the admin panel uses to triage them.
//!
//! ## Intake
//!
//! Public submissions are validated (every invalid field is reported at once),
//! rate-limited per origin IP (5 per rolling 15 minutes) and scored by a
//! frequency heuristic: more than 3 submissions from the same IP or email in
//! the last hour are stored with status `spam`. Spam classification is silent;
//! the submitter always gets the same acknowledgement.
//!
//! ## Admin queries
//!
//! Every admin listing goes through [`query::ListQuery`], which turns a query
//! string into a typed filter, sort order, projection and page. The filter is
//! built once and shared by the count and the page read.
//!
//! ## Authentication
//!
//! Credentials log in with email and password (argon2 hashes) and receive an
//! HS256 session token. Tokens are stateless; they are revoked implicitly when
//! the password changes after the token was issued. Five consecutive failures
//! lock a credential for 15 minutes.
//!
//! ## Storage
//!
//! Storage sits behind repository traits with a Postgres backend (`sqlx`) and
//! an in-memory backend for single-instance deployments and tests. Every call
//! is bounded by a timeout and surfaces as a 503 when the store is unavailable.

pub mod api;
pub mod cli;
pub mod credentials;
pub mod error;
pub mod query;
pub mod session;
pub mod store;
pub mod submissions;

pub use error::{Error, FieldError};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
