//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action,
//! such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let frontend_base_url = matches
        .get_one::<String>("frontend-url")
        .cloned()
        .context("missing required argument: --frontend-url")?;
    let policy_test_mode = matches.get_flag("policy-test-mode");

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        work_factor: auth_opts.work_factor,
        login_max_attempts: auth_opts.login_max_attempts,
        login_window_seconds: auth_opts.login_window_seconds,
        policy_test_mode,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars(
            [
                ("VIGIL_DSN", Some("postgres://user@localhost:5432/vigil")),
                ("VIGIL_SESSION_TTL_SECONDS", Some("3600")),
                ("VIGIL_POLICY_TEST_MODE", Some("true")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["vigil"]);
                let action = handler(&matches).expect("handler should succeed");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://user@localhost:5432/vigil");
                assert_eq!(args.session_ttl_seconds, 3600);
                assert_eq!(args.work_factor, 12);
                assert_eq!(args.login_max_attempts, 5);
                assert_eq!(args.login_window_seconds, 900);
                assert!(args.policy_test_mode);
            },
        );
    }
}
