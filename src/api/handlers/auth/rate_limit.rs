//! Fixed-window rate limiting for auth endpoints.
//!
//! Counters live in process memory keyed by client identity. State is not
//! shared across instances; at console scale a per-instance window is the
//! accepted trade. The trait keeps a distributed backing store swappable
//! without touching call sites.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Login window: 5 attempts per 15 minutes per client identity.
pub const LOGIN_MAX_ATTEMPTS: u32 = 5;
pub const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Callers pass `now` explicitly so windows are testable without clock
/// control and so the decision point stays pure.
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str, now: Instant) -> RateLimitDecision;
}

#[derive(Debug)]
struct Window {
    count: u32,
    started_at: Instant,
}

#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, key: &str, now: Instant) -> RateLimitDecision {
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned lock means a panic mid-update; fail open and let
            // the next request start clean state.
            warn!("rate limiter lock poisoned, allowing request");
            return RateLimitDecision::Allowed;
        };

        // Drop elapsed windows so the map stays bounded by active clients.
        let window = self.window;
        windows.retain(|_, entry| now.duration_since(entry.started_at) < window);

        match windows.get_mut(key) {
            Some(entry) => {
                entry.count += 1;
                if entry.count > self.max_requests {
                    let elapsed = now.duration_since(entry.started_at);
                    RateLimitDecision::Limited {
                        retry_after: self.window.saturating_sub(elapsed),
                    }
                } else {
                    RateLimitDecision::Allowed
                }
            }
            None => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        started_at: now,
                    },
                );
                RateLimitDecision::Allowed
            }
        }
    }
}

/// Limiter that never denies; used in tests and local tooling.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _key: &str, _now: Instant) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FixedWindowLimiter, LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW, NoopRateLimiter, RateLimitDecision,
        RateLimiter,
    };
    use std::time::{Duration, Instant};

    #[test]
    fn sixth_attempt_in_window_is_limited() {
        let limiter = FixedWindowLimiter::new(LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW);
        let start = Instant::now();

        for attempt in 0..5u64 {
            let now = start + Duration::from_secs(attempt * 10);
            assert_eq!(
                limiter.check("10.0.0.1", now),
                RateLimitDecision::Allowed,
                "attempt {attempt} should pass"
            );
        }

        let decision = limiter.check("10.0.0.1", start + Duration::from_secs(60));
        match decision {
            RateLimitDecision::Limited { retry_after } => {
                assert!(retry_after <= LOGIN_WINDOW);
                assert!(retry_after >= LOGIN_WINDOW - Duration::from_secs(60));
            }
            RateLimitDecision::Allowed => panic!("sixth attempt should be limited"),
        }
    }

    #[test]
    fn fresh_window_after_expiry() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(30));
        let start = Instant::now();

        assert_eq!(limiter.check("k", start), RateLimitDecision::Allowed);
        assert_eq!(
            limiter.check("k", start + Duration::from_secs(1)),
            RateLimitDecision::Allowed
        );
        assert!(matches!(
            limiter.check("k", start + Duration::from_secs(2)),
            RateLimitDecision::Limited { .. }
        ));

        // First request after the window elapses starts a new count.
        assert_eq!(
            limiter.check("k", start + Duration::from_secs(31)),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check("a", now), RateLimitDecision::Allowed);
        assert_eq!(limiter.check("b", now), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check("a", now + Duration::from_secs(1)),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn zero_max_is_clamped_to_one() {
        let limiter = FixedWindowLimiter::new(0, Duration::from_secs(60));
        let now = Instant::now();
        assert_eq!(limiter.check("k", now), RateLimitDecision::Allowed);
    }

    #[test]
    fn noop_always_allows() {
        let limiter = NoopRateLimiter;
        for _ in 0..100 {
            assert_eq!(
                limiter.check("k", Instant::now()),
                RateLimitDecision::Allowed
            );
        }
    }
}
