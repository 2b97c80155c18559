use crate::api;
use crate::api::handlers::AuthConfig;
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub work_factor: u32,
    pub login_max_attempts: u32,
    pub login_window_seconds: u64,
    pub policy_test_mode: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_work_factor(args.work_factor)
        .with_login_max_attempts(args.login_max_attempts)
        .with_login_window_seconds(args.login_window_seconds)
        .with_policy_test_mode(args.policy_test_mode);

    api::new(args.port, args.dsn, auth_config).await
}
