//! Auth configuration and shared state.

use std::sync::Arc;
use std::time::Duration;

use super::password::{DEFAULT_WORK_FACTOR, PasswordHasher};
use super::rate_limit::{FixedWindowLimiter, LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW, RateLimiter};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    work_factor: u32,
    login_max_attempts: u32,
    login_window_seconds: u64,
    policy_test_mode: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            work_factor: DEFAULT_WORK_FACTOR,
            login_max_attempts: LOGIN_MAX_ATTEMPTS,
            login_window_seconds: LOGIN_WINDOW.as_secs(),
            policy_test_mode: false,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_work_factor(mut self, work_factor: u32) -> Self {
        self.work_factor = work_factor;
        self
    }

    #[must_use]
    pub fn with_login_max_attempts(mut self, attempts: u32) -> Self {
        self.login_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_login_window_seconds(mut self, seconds: u64) -> Self {
        self.login_window_seconds = seconds;
        self
    }

    /// Allows the manual policy trigger to fall back to an arbitrary
    /// employee when none is given. Never enable outside test rigs.
    #[must_use]
    pub fn with_policy_test_mode(mut self, enabled: bool) -> Self {
        self.policy_test_mode = enabled;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn work_factor(&self) -> u32 {
        self.work_factor
    }

    pub(crate) fn login_max_attempts(&self) -> u32 {
        self.login_max_attempts
    }

    pub(crate) fn login_window(&self) -> Duration {
        Duration::from_secs(self.login_window_seconds)
    }

    pub(crate) fn policy_test_mode(&self) -> bool {
        self.policy_test_mode
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    hasher: PasswordHasher,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        let hasher = PasswordHasher::new(config.work_factor());
        Self {
            config,
            hasher,
            rate_limiter,
        }
    }

    /// State with the fixed-window limiter derived from the config.
    #[must_use]
    pub fn with_default_limiter(config: AuthConfig) -> Self {
        let limiter = Arc::new(FixedWindowLimiter::new(
            config.login_max_attempts(),
            config.login_window(),
        ));
        Self::new(config, limiter)
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn hasher(&self) -> PasswordHasher {
        self.hasher
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::NoopRateLimiter;
    use super::{AuthConfig, AuthState};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://console.vigil.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://console.vigil.dev");
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(config.work_factor(), 12);
        assert_eq!(config.login_max_attempts(), 5);
        assert_eq!(config.login_window(), Duration::from_secs(900));
        assert!(!config.policy_test_mode());
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(3600)
            .with_work_factor(4)
            .with_login_max_attempts(10)
            .with_login_window_seconds(60)
            .with_policy_test_mode(true);

        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.work_factor(), 4);
        assert_eq!(config.login_max_attempts(), 10);
        assert_eq!(config.login_window(), Duration::from_secs(60));
        assert!(config.policy_test_mode());
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookie() {
        let config = AuthConfig::new("http://localhost:5173".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_hasher_uses_configured_work_factor() {
        let config = AuthConfig::new("http://localhost:5173".to_string()).with_work_factor(3);
        let state = AuthState::new(config, Arc::new(NoopRateLimiter));
        assert_eq!(state.hasher().work_factor(), 3);
    }
}
