//! HTTP error taxonomy shared by all handlers.
//!
//! Every handler converts failures into an `ApiError` at its own boundary.
//! Clients only ever see a stable machine-readable code plus a human
//! message; raw database or transport detail stays in the server logs.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },
    #[error("{message}")]
    Auth { code: &'static str, message: String },
    #[error("Insufficient privileges")]
    Forbidden,
    #[error("{message}")]
    NotFound { code: &'static str, message: String },
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("Too many requests")]
    RateLimited { retry_after: u64 },
    #[error("Internal server error")]
    Internal { code: &'static str },
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn auth(code: &'static str, message: impl Into<String>) -> Self {
        Self::Auth {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rate_limited(retry_after: u64) -> Self {
        Self::RateLimited { retry_after }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::auth("UNAUTHENTICATED", "Authentication required")
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::Internal {
            code: "INTERNAL_ERROR",
        }
    }

    /// Session persistence and destruction failures carry their own code so
    /// operators can tell them apart from generic 500s.
    #[must_use]
    pub fn session_error() -> Self {
        Self::Internal {
            code: "SESSION_ERROR",
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. }
            | Self::Auth { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::Internal { code } => code,
            Self::Forbidden => "FORBIDDEN",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape for every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Seconds until the rate-limit window resets; only set on 429.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match self {
            Self::RateLimited { retry_after } => Some(retry_after),
            _ => None,
        };

        let mut headers = HeaderMap::new();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                headers.insert(RETRY_AFTER, value);
            }
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            retry_after,
        };

        (self.status(), headers, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn codes_and_statuses_are_stable() {
        let err = ApiError::validation("MISSING_CREDENTIALS", "Email and password are required");
        assert_eq!(err.code(), "MISSING_CREDENTIALS");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::auth("INVALID_CREDENTIALS", "Invalid email or password");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Forbidden.code(), "FORBIDDEN");

        let err = ApiError::rate_limited(120);
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        assert_eq!(ApiError::session_error().code(), "SESSION_ERROR");
        assert_eq!(
            ApiError::internal().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rate_limited_sets_retry_after_header() {
        let response = ApiError::rate_limited(42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let header = response
            .headers()
            .get(axum::http::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        assert_eq!(header.as_deref(), Some("42"));
    }
}
