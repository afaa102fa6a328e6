use crate::cli::{
    actions::{Action, server::Args},
    commands::{auth, limits},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let session_secret = matches
        .get_one::<String>(auth::ARG_SESSION_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --session-secret")?;
    let frontend_base_url = matches
        .get_one::<String>(auth::ARG_FRONTEND_BASE_URL)
        .cloned()
        .context("missing required argument: --frontend-base-url")?;

    crate::api::frontend_origin(&frontend_base_url).context("invalid QUOTEDESK_FRONTEND_BASE_URL")?;

    let bootstrap_admin = matches
        .get_one::<String>(auth::ARG_BOOTSTRAP_ADMIN_EMAIL)
        .cloned()
        .zip(
            matches
                .get_one::<String>(auth::ARG_BOOTSTRAP_ADMIN_PASSWORD)
                .cloned()
                .map(SecretString::from),
        );

    Ok(Action::Server(Args {
        port,
        dsn,
        session_secret,
        session_ttl_seconds: value(matches, auth::ARG_SESSION_TTL_SECONDS, 86_400),
        frontend_base_url,
        store_timeout: Duration::from_millis(value(matches, limits::ARG_STORE_TIMEOUT_MS, 5_000)),
        list_max_limit: value(matches, limits::ARG_LIST_MAX_LIMIT, 100),
        submission_rate_limit: value(matches, limits::ARG_SUBMISSION_RATE_LIMIT, 5),
        submission_rate_window_seconds: value(
            matches,
            limits::ARG_SUBMISSION_RATE_WINDOW_SECONDS,
            900,
        ),
        spam_window_seconds: value(matches, limits::ARG_SPAM_WINDOW_SECONDS, 3_600),
        spam_threshold: value(matches, limits::ARG_SPAM_THRESHOLD, 3),
        lockout_threshold: value(matches, limits::ARG_LOCKOUT_THRESHOLD, 5),
        lockout_seconds: value(matches, limits::ARG_LOCKOUT_SECONDS, 900),
        trust_proxy_headers: matches.get_flag(limits::ARG_TRUST_PROXY_HEADERS),
        bootstrap_admin,
    }))
}

fn value<T>(matches: &clap::ArgMatches, id: &str, fallback: T) -> T
where
    T: Clone + Send + Sync + 'static,
{
    matches.get_one::<T>(id).cloned().unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn dispatch(args: &[&str]) -> Result<Args> {
        let matches = commands::new().try_get_matches_from(args.iter().copied())?;
        let Action::Server(args) = handler(&matches)?;
        Ok(args)
    }

    #[test]
    fn defaults_fill_tuning_knobs() -> Result<()> {
        temp_env::with_vars_unset(
            [
                "QUOTEDESK_PORT",
                "QUOTEDESK_LOCKOUT_SECONDS",
                "QUOTEDESK_TRUST_PROXY_HEADERS",
                "QUOTEDESK_BOOTSTRAP_ADMIN_EMAIL",
                "QUOTEDESK_BOOTSTRAP_ADMIN_PASSWORD",
            ],
            || {
                let args = dispatch(&[
                    "quotedesk",
                    "--dsn",
                    "memory://",
                    "--session-secret",
                    SECRET,
                ])?;
                assert_eq!(args.port, 8080);
                assert_eq!(args.session_secret.expose_secret(), SECRET);
                assert_eq!(args.store_timeout, Duration::from_millis(5_000));
                assert_eq!(args.lockout_seconds, 900);
                assert!(args.bootstrap_admin.is_none());
                assert!(!args.trust_proxy_headers);
                Ok(())
            },
        )
    }

    #[test]
    fn trust_proxy_headers_from_env() -> Result<()> {
        temp_env::with_var("QUOTEDESK_TRUST_PROXY_HEADERS", Some("true"), || {
            let args = dispatch(&[
                "quotedesk",
                "--dsn",
                "memory://",
                "--session-secret",
                SECRET,
            ])?;
            assert!(args.trust_proxy_headers);
            Ok(())
        })
    }

    #[test]
    fn bootstrap_admin_pairs_email_and_password() -> Result<()> {
        let args = dispatch(&[
            "quotedesk",
            "--dsn",
            "memory://",
            "--session-secret",
            SECRET,
            "--bootstrap-admin-email",
            "admin@example.com",
            "--bootstrap-admin-password",
            "Sup3r$ecret",
        ])?;
        let (email, password) = args.bootstrap_admin.context("bootstrap admin missing")?;
        assert_eq!(email, "admin@example.com");
        assert_eq!(password.expose_secret(), "Sup3r$ecret");
        Ok(())
    }

    #[test]
    fn frontend_url_without_host_is_rejected() {
        let result = dispatch(&[
            "quotedesk",
            "--dsn",
            "memory://",
            "--session-secret",
            SECRET,
            "--frontend-base-url",
            "not-a-url",
        ]);
        assert!(result.is_err());
    }
}
