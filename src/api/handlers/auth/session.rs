//! Session cookie handling plus logout, status, and me endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::principal::require_auth;
use super::state::{AuthConfig, AuthState};
use super::storage::delete_session;
use super::types::{StatusResponse, UserResponse};
use super::utils::hash_session_token;
use crate::api::error::{ApiError, ErrorBody};

const SESSION_COOKIE_NAME: &str = "vigil_session";

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "The authenticated user", body = UserResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    Ok((StatusCode::OK, Json(principal.to_response())).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/auth/status",
    responses(
        (status = 200, description = "Session state; never errors the transport", body = StatusResponse)
    ),
    tag = "auth"
)]
pub async fn status(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    // Lookup failures collapse into "not authenticated"; this endpoint is
    // polled by the frontend and must never surface a 500.
    let user = match require_auth(&headers, &pool).await {
        Ok(principal) => Some(principal.to_response()),
        Err(_) => None,
    };
    let response = StatusResponse {
        authenticated: user.is_some(),
        user,
    };
    (StatusCode::OK, Json(response))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Session destroyed, cookie cleared"),
        (status = 500, description = "Session destruction failed", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        delete_session(&pool, &token_hash).await.map_err(|err| {
            error!("Failed to delete session: {err}");
            ApiError::session_error()
        })?;
    }

    // Clear the cookie even when no session token was presented.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    Ok((StatusCode::OK, response_headers).into_response())
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        clear_session_cookie, extract_session_token, session_cookie, status, SESSION_COOKIE_NAME,
    };
    use crate::api::handlers::auth::state::AuthConfig;
    use anyhow::{Context, Result};
    use axum::{
        extract::Extension,
        http::{HeaderMap, HeaderValue, StatusCode},
        response::IntoResponse,
    };
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn cookie_carries_token_and_flags() -> Result<()> {
        let config = AuthConfig::new("https://console.vigil.dev".to_string())
            .with_session_ttl_seconds(3600);
        let cookie = session_cookie(&config, "tok123").context("cookie")?;
        let value = cookie.to_str().context("cookie str")?;
        assert!(value.starts_with(&format!("{SESSION_COOKIE_NAME}=tok123")));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Max-Age=3600"));
        assert!(value.contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_expires_immediately() -> Result<()> {
        let config = AuthConfig::new("http://localhost:5173".to_string());
        let cookie = clear_session_cookie(&config).context("cookie")?;
        let value = cookie.to_str().context("cookie str")?;
        assert!(value.contains("Max-Age=0"));
        assert!(!value.contains("Secure"));
        Ok(())
    }

    #[test]
    fn extract_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; vigil_session=abc123; theme=dark"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer tok-from-header"),
        );
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("vigil_session=tok-from-cookie"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("tok-from-header".to_string())
        );
    }

    #[test]
    fn extract_token_none_without_headers() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn status_without_session_is_unauthenticated() -> Result<()> {
        // No cookie means no database access, so a lazy pool is enough.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = status(HeaderMap::new(), Extension(pool))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
