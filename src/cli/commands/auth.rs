use clap::{Arg, Command, builder::ValueParser};

use crate::session::token::MIN_SECRET_LEN;

pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_BOOTSTRAP_ADMIN_EMAIL: &str = "bootstrap-admin-email";
pub const ARG_BOOTSTRAP_ADMIN_PASSWORD: &str = "bootstrap-admin-password";

#[must_use]
pub fn validator_session_secret() -> ValueParser {
    ValueParser::from(move |secret: &str| -> std::result::Result<String, String> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(format!(
                "session secret must be at least {MIN_SECRET_LEN} bytes"
            ));
        }
        Ok(secret.to_string())
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_bootstrap_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("HMAC key for session tokens (at least 32 bytes)")
                .env("QUOTEDESK_SESSION_SECRET")
                .hide_env_values(true)
                .required(true)
                .value_parser(validator_session_secret()),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session token and cookie TTL in seconds")
                .env("QUOTEDESK_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Admin frontend base URL, used as CORS origin and for reset links")
                .env("QUOTEDESK_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
}

fn with_bootstrap_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BOOTSTRAP_ADMIN_EMAIL)
                .long(ARG_BOOTSTRAP_ADMIN_EMAIL)
                .help("Create this admin on startup if no credential uses the email")
                .env("QUOTEDESK_BOOTSTRAP_ADMIN_EMAIL")
                .requires(ARG_BOOTSTRAP_ADMIN_PASSWORD),
        )
        .arg(
            Arg::new(ARG_BOOTSTRAP_ADMIN_PASSWORD)
                .long(ARG_BOOTSTRAP_ADMIN_PASSWORD)
                .help("Password for the bootstrap admin")
                .env("QUOTEDESK_BOOTSTRAP_ADMIN_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_BOOTSTRAP_ADMIN_EMAIL),
        )
}
