//! Authenticated principal resolution and role gating.
//!
//! Handlers call `require_auth` explicitly and receive a typed principal;
//! nothing is smuggled through request extensions. The user row is
//! re-fetched on every request so deactivation and role changes take
//! effect immediately, at the cost of one extra round-trip.

use axum::http::HeaderMap;
use sqlx::PgPool;
use tracing::error;

use super::session::extract_session_token;
use super::storage::{UserRecord, delete_session, fetch_user, lookup_session};
use super::types::{Role, UserResponse};
use super::utils::hash_session_token;
use crate::api::error::ApiError;

/// Authenticated user context derived from the session cookie.
#[derive(Clone, Debug)]
pub(crate) struct Principal {
    pub(crate) user: UserRecord,
}

impl Principal {
    pub(crate) fn user_id(&self) -> uuid::Uuid {
        self.user.id
    }

    pub(crate) fn is_admin(&self) -> bool {
        self.user.role == Role::Admin.as_str()
    }

    pub(crate) fn to_response(&self) -> UserResponse {
        self.user.to_response()
    }
}

/// Resolve the session cookie into a principal, or fail with 401.
///
/// A session pointing at a missing or deactivated user is destroyed on the
/// spot so the stale cookie cannot be replayed.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Principal, ApiError> {
    let Some(token) = extract_session_token(headers) else {
        return Err(ApiError::unauthenticated());
    };
    let token_hash = hash_session_token(&token);

    let session = lookup_session(pool, &token_hash).await.map_err(|err| {
        error!("Failed to lookup session: {err}");
        ApiError::internal()
    })?;
    let Some(session) = session else {
        return Err(ApiError::unauthenticated());
    };

    let user = fetch_user(pool, session.user_id).await.map_err(|err| {
        error!("Failed to fetch session user: {err}");
        ApiError::internal()
    })?;

    match user {
        Some(user) if user.is_active => Ok(Principal { user }),
        _ => {
            if let Err(err) = delete_session(pool, &token_hash).await {
                error!("Failed to destroy orphaned session: {err}");
            }
            Err(ApiError::unauthenticated())
        }
    }
}

/// Role gate; runs after `require_auth`.
pub(crate) fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::{Principal, require_admin};
    use crate::api::handlers::auth::storage::UserRecord;
    use uuid::Uuid;

    fn principal(role: &str) -> Principal {
        Principal {
            user: UserRecord {
                id: Uuid::nil(),
                email: "user@example.com".to_string(),
                name: "User".to_string(),
                role: role.to_string(),
                department: None,
                password_hash: "$argon2id$stub".to_string(),
                is_active: true,
                last_login_at: None,
                created_at: "2025-01-01T00:00:00Z".to_string(),
                updated_at: "2025-01-01T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn admin_passes_role_gate() {
        assert!(require_admin(&principal("admin")).is_ok());
    }

    #[test]
    fn non_admin_roles_are_forbidden() {
        assert!(require_admin(&principal("analyst")).is_err());
        assert!(require_admin(&principal("viewer")).is_err());
        assert!(require_admin(&principal("")).is_err());
    }
}
