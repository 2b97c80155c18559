//! Login endpoint: credential check, session creation, cookie issuance.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use super::rate_limit::RateLimitDecision;
use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{self, UserRecord, insert_session, lookup_user_by_email};
use super::types::{LoginRequest, LoginResponse};
use super::utils::{client_key, normalize_email};
use crate::api::error::{ApiError, ErrorBody};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded; session cookie set", body = LoginResponse),
        (status = 400, description = "Missing credentials", body = ErrorBody),
        (status = 401, description = "Invalid credentials or inactive account", body = ErrorBody),
        (status = 429, description = "Too many attempts from this client", body = ErrorBody),
        (status = 500, description = "Session could not be persisted", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, ApiError> {
    // Rate limit before anything else so abusive clients stay cheap to
    // reject, whatever they send.
    let key = client_key(&headers);
    if let RateLimitDecision::Limited { retry_after } =
        auth_state.rate_limiter().check(&key, Instant::now())
    {
        return Err(ApiError::rate_limited(retry_after.as_secs().max(1)));
    }

    let Some(Json(request)) = payload else {
        return Err(missing_credentials());
    };
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(missing_credentials());
    }

    let email = normalize_email(&request.email);
    let user = lookup_user_by_email(&pool, &email).await.map_err(|err| {
        error!("Login lookup failed: {err}");
        ApiError::internal()
    })?;

    let user = match user {
        Some(user) => user,
        None => {
            // Burn a hash for unknown emails so the response timing matches
            // the wrong-password path, then fail identically.
            let _ = auth_state
                .hasher()
                .hash_blocking(request.password.clone())
                .await;
            return Err(invalid_credentials());
        }
    };

    if !user.is_active {
        return Err(ApiError::auth("ACCOUNT_INACTIVE", "Account is disabled"));
    }

    let verified = auth_state
        .hasher()
        .verify_blocking(request.password, user.password_hash.clone())
        .await
        .map_err(|err| {
            error!("Password verification failed: {err}");
            ApiError::internal()
        })?;
    if !verified {
        return Err(invalid_credentials());
    }

    let token = insert_session(&pool, user.id, auth_state.config().session_ttl_seconds())
        .await
        .map_err(|err| {
            error!("Failed to create session: {err}");
            ApiError::session_error()
        })?;

    spawn_last_login_update(&pool, &user);

    let cookie = session_cookie(auth_state.config(), &token).map_err(|err| {
        error!("Failed to build session cookie: {err}");
        ApiError::session_error()
    })?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    let body = LoginResponse {
        user: user.to_response(),
    };
    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

/// Last-login bookkeeping must never fail the login itself; errors are
/// logged and swallowed.
fn spawn_last_login_update(pool: &PgPool, user: &UserRecord) {
    let pool = pool.clone();
    let user_id = user.id;
    tokio::spawn(async move {
        if let Err(err) = storage::touch_last_login(&pool, user_id).await {
            error!("Failed to update last login for {user_id}: {err}");
        }
    });
}

fn missing_credentials() -> ApiError {
    ApiError::validation("MISSING_CREDENTIALS", "Email and password are required")
}

/// Identical code for unknown email and wrong password, so responses do not
/// reveal which accounts exist.
fn invalid_credentials() -> ApiError {
    ApiError::auth("INVALID_CREDENTIALS", "Invalid email or password")
}

#[cfg(test)]
mod tests {
    use super::login;
    use crate::api::handlers::auth::state::{AuthConfig, AuthState};
    use anyhow::Result;
    use axum::{
        Json,
        extract::Extension,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
    };
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("http://localhost:5173".to_string()).with_work_factor(1);
        Arc::new(AuthState::with_default_limiter(config))
    }

    fn lazy_pool() -> Result<sqlx::PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn login_missing_payload_is_bad_request() -> Result<()> {
        let response = login(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn login_empty_fields_are_bad_request() -> Result<()> {
        let request = super::LoginRequest {
            email: "  ".to_string(),
            password: String::new(),
        };
        let response = login(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn sixth_attempt_is_rate_limited() -> Result<()> {
        let state = auth_state();
        let pool = lazy_pool()?;
        // Exhaust the window with malformed requests; the limiter counts
        // every call against the same client identity.
        for _ in 0..5 {
            let response = login(
                HeaderMap::new(),
                Extension(pool.clone()),
                Extension(state.clone()),
                None,
            )
            .await
            .into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let response = login(
            HeaderMap::new(),
            Extension(pool),
            Extension(state),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after = response
            .headers()
            .get(axum::http::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        assert!(retry_after.is_some_and(|seconds| seconds <= 900));
        Ok(())
    }
}
