//! Authentication and session management.
//!
//! ## Flow
//!
//! Login verifies credentials against the Argon2id hash, creates a
//! server-side session keyed by an opaque token, and returns the token in
//! an `HttpOnly` cookie. Only a SHA-256 hash of the token is stored.
//!
//! Every authenticated request resolves the cookie through
//! [`principal::require_auth`], which re-reads the user row so account
//! deactivation and role changes cut access immediately. Sessions whose
//! user disappeared or was deactivated are destroyed during resolution.
//!
//! ## Rate limiting
//!
//! `/v1/auth/login` is guarded by a fixed-window limiter keyed by client
//! identity (5 attempts per 15 minutes by default). Windows are process
//! local; see `rate_limit` for the trade-off.

pub(crate) mod account;
pub(crate) mod login;
mod password;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
pub(crate) mod utils;

pub use password::PasswordHasher;
pub use rate_limit::{FixedWindowLimiter, NoopRateLimiter, RateLimitDecision, RateLimiter};
pub use state::{AuthConfig, AuthState};
