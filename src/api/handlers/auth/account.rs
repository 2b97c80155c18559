//! Self-service account endpoints: password change and profile update.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::principal::require_auth;
use super::state::AuthState;
use super::storage::{update_password, update_profile};
use super::types::{ChangePasswordRequest, ProfileUpdateRequest, UserResponse};
use crate::api::error::{ApiError, ErrorBody};

const MIN_PASSWORD_LENGTH: usize = 8;

#[utoipa::path(
    put,
    path = "/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "New password too short", body = ErrorBody),
        (status = 401, description = "Current password mismatch or no session", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::validation(
            "MISSING_CREDENTIALS",
            "Current and new password are required",
        ));
    };
    if request.new_password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(
            "PASSWORD_TOO_SHORT",
            format!("New password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }

    // Re-verify the current password; a stolen session alone must not be
    // enough to rotate the credential.
    let verified = auth_state
        .hasher()
        .verify_blocking(
            request.current_password,
            principal.user.password_hash.clone(),
        )
        .await
        .map_err(|err| {
            error!("Password verification failed: {err}");
            ApiError::internal()
        })?;
    if !verified {
        return Err(ApiError::auth(
            "INVALID_CURRENT_PASSWORD",
            "Current password is incorrect",
        ));
    }

    let new_hash = auth_state
        .hasher()
        .hash_blocking(request.new_password)
        .await
        .map_err(|err| {
            error!("Password hashing failed: {err}");
            ApiError::internal()
        })?;

    update_password(&pool, principal.user_id(), &new_hash)
        .await
        .map_err(|err| {
            error!("Failed to persist new password: {err}");
            ApiError::internal()
        })?;

    Ok(StatusCode::OK.into_response())
}

#[utoipa::path(
    put,
    path = "/v1/auth/profile",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Name is required", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn update_own_profile(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<ProfileUpdateRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;

    let Some(Json(request)) = payload else {
        return Err(missing_name());
    };
    let name = request.name.trim();
    if name.is_empty() {
        return Err(missing_name());
    }
    let department = request
        .department
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let updated = update_profile(&pool, principal.user_id(), name, department)
        .await
        .map_err(|err| {
            error!("Failed to update profile: {err}");
            ApiError::internal()
        })?;

    match updated {
        Some(user) => Ok((StatusCode::OK, Json(user.to_response())).into_response()),
        None => Err(ApiError::unauthenticated()),
    }
}

fn missing_name() -> ApiError {
    ApiError::validation("MISSING_NAME", "Name is required")
}

#[cfg(test)]
mod tests {
    use super::{change_password, update_own_profile};
    use anyhow::Result;
    use axum::{
        extract::Extension,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
    };
    use sqlx::postgres::PgPoolOptions;

    // Without a session cookie both endpoints reject before touching the
    // database, so a lazy pool is enough.
    #[tokio::test]
    async fn change_password_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let config = crate::api::handlers::auth::AuthConfig::new("http://localhost".to_string());
        let state = std::sync::Arc::new(
            crate::api::handlers::auth::AuthState::with_default_limiter(config),
        );
        let response = change_password(HeaderMap::new(), Extension(pool), Extension(state), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn profile_update_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = update_own_profile(HeaderMap::new(), Extension(pool), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
