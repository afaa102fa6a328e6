//! Tuning knobs for intake, lockout, listing and the store.

use clap::{Arg, ArgAction, Command};

pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";
pub const ARG_LIST_MAX_LIMIT: &str = "list-max-limit";
pub const ARG_SUBMISSION_RATE_LIMIT: &str = "submission-rate-limit";
pub const ARG_SUBMISSION_RATE_WINDOW_SECONDS: &str = "submission-rate-window-seconds";
pub const ARG_SPAM_WINDOW_SECONDS: &str = "spam-window-seconds";
pub const ARG_SPAM_THRESHOLD: &str = "spam-threshold";
pub const ARG_LOCKOUT_THRESHOLD: &str = "lockout-threshold";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_store_args(command);
    let command = with_intake_args(command);
    with_lockout_args(command)
}

fn with_store_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Upper bound for a single store call in milliseconds")
                .env("QUOTEDESK_STORE_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_LIST_MAX_LIMIT)
                .long(ARG_LIST_MAX_LIMIT)
                .help("Largest page size admin listings accept")
                .env("QUOTEDESK_LIST_MAX_LIMIT")
                .default_value("100")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}

fn with_intake_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Key intake limits on X-Forwarded-For/X-Real-IP instead of the socket peer; only set behind a proxy that overwrites them")
                .env("QUOTEDESK_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_SUBMISSION_RATE_LIMIT)
                .long(ARG_SUBMISSION_RATE_LIMIT)
                .help("Submissions accepted per client IP within the rate window")
                .env("QUOTEDESK_SUBMISSION_RATE_LIMIT")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_SUBMISSION_RATE_WINDOW_SECONDS)
                .long(ARG_SUBMISSION_RATE_WINDOW_SECONDS)
                .help("Rolling rate window in seconds")
                .env("QUOTEDESK_SUBMISSION_RATE_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SPAM_WINDOW_SECONDS)
                .long(ARG_SPAM_WINDOW_SECONDS)
                .help("Look-back window of the spam heuristic in seconds")
                .env("QUOTEDESK_SPAM_WINDOW_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SPAM_THRESHOLD)
                .long(ARG_SPAM_THRESHOLD)
                .help("Prior submissions from the same IP or email above which a new one is spam")
                .env("QUOTEDESK_SPAM_THRESHOLD")
                .default_value("3")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOCKOUT_THRESHOLD)
                .long(ARG_LOCKOUT_THRESHOLD)
                .help("Consecutive failed logins before a credential is locked")
                .env("QUOTEDESK_LOCKOUT_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("How long a locked credential stays locked, in seconds")
                .env("QUOTEDESK_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}
