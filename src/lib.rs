//! # Vigil (insider-threat monitoring console API)
//!
//! `vigil` is the HTTP API behind the security monitoring admin console:
//! authentication and session management, user administration, security
//! policy CRUD, and application settings, all backed by `PostgreSQL`.
//!
//! ## Authentication
//!
//! Credentials are verified against Argon2id hashes with a configurable
//! work factor. Successful logins create a server-side session; the opaque
//! token travels in an `HttpOnly` cookie and only its SHA-256 hash is
//! stored. Session validation re-reads the user row on every request so
//! deactivation and role changes take effect immediately.
//!
//! Unknown emails and wrong passwords fail with the same code and status
//! to prevent account enumeration, and the login endpoint sits behind a
//! fixed-window rate limiter keyed by client identity.
//!
//! ## Policies
//!
//! Security policies scope to global, group, or user level; scoped
//! policies carry a target, global ones must not. A policy owns ordered
//! conditions and actions, created together in one transaction. Effective
//! policy resolution is delegated to the `get_effective_policies` database
//! function shared with the execution engine; this service never evaluates
//! policies itself.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
