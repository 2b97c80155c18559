//! Auth tuning arguments: session TTL, hashing cost, and login limits.

use anyhow::{Context, Result};
use clap::{Arg, Command};

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_WORK_FACTOR: &str = "work-factor";
pub const ARG_LOGIN_MAX_ATTEMPTS: &str = "login-max-attempts";
pub const ARG_LOGIN_WINDOW_SECONDS: &str = "login-window-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .default_value("43200")
                .env("VIGIL_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_WORK_FACTOR)
                .long(ARG_WORK_FACTOR)
                .help("Password hashing work factor (higher is slower and stronger)")
                .default_value("12")
                .env("VIGIL_WORK_FACTOR")
                .value_parser(clap::value_parser!(u32).range(1..=64)),
        )
        .arg(
            Arg::new(ARG_LOGIN_MAX_ATTEMPTS)
                .long(ARG_LOGIN_MAX_ATTEMPTS)
                .help("Login attempts allowed per client per window")
                .default_value("5")
                .env("VIGIL_LOGIN_MAX_ATTEMPTS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_WINDOW_SECONDS)
                .long(ARG_LOGIN_WINDOW_SECONDS)
                .help("Login rate-limit window length in seconds")
                .default_value("900")
                .env("VIGIL_LOGIN_WINDOW_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub work_factor: u32,
    pub login_max_attempts: u32,
    pub login_window_seconds: u64,
}

impl Options {
    /// Collect auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is somehow absent.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .context("missing session-ttl-seconds")?,
            work_factor: matches
                .get_one::<u32>(ARG_WORK_FACTOR)
                .copied()
                .context("missing work-factor")?,
            login_max_attempts: matches
                .get_one::<u32>(ARG_LOGIN_MAX_ATTEMPTS)
                .copied()
                .context("missing login-max-attempts")?,
            login_window_seconds: matches
                .get_one::<u64>(ARG_LOGIN_WINDOW_SECONDS)
                .copied()
                .context("missing login-window-seconds")?,
        })
    }
}
