//! Application settings endpoints.
//!
//! Reads require a session; writes require the admin role. Values are
//! validated by key (see `types`) and stored as JSONB; unknown keys pass
//! through untouched.

pub(crate) mod types;

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use self::types::{
    COMPANY_INFO_KEY, DASHBOARD_CONFIG_KEY, EMAIL_CONFIG_KEY, EmailConfig, EmailTestResponse,
    SettingResponse, SettingUpdateRequest, SettingValue, redact_setting,
};
use super::auth::principal::{require_admin, require_auth};
use crate::api::email::{EmailProbe, EmailTester};
use crate::api::error::{ApiError, ErrorBody};

#[utoipa::path(
    get,
    path = "/v1/settings",
    responses(
        (status = 200, description = "All settings, secrets redacted", body = [SettingResponse]),
        (status = 401, description = "Missing or invalid session", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn list_settings(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &pool).await?;

    let settings = fetch_all_settings(&pool).await.map_err(|err| {
        error!("Failed to list settings: {err}");
        ApiError::internal()
    })?;
    Ok((StatusCode::OK, Json(settings)).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/settings/{key}",
    params(("key" = String, Path, description = "Setting key")),
    responses(
        (status = 200, description = "Setting value", body = SettingResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 404, description = "Unknown setting key", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn get_setting(
    Path(key): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &pool).await?;
    let setting = load_setting(&pool, key.trim()).await?;
    Ok((StatusCode::OK, Json(setting)).into_response())
}

#[utoipa::path(
    put,
    path = "/v1/settings/{key}",
    params(("key" = String, Path, description = "Setting key")),
    request_body = SettingUpdateRequest,
    responses(
        (status = 200, description = "Setting stored", body = SettingResponse),
        (status = 400, description = "Value fails the key's schema", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn put_setting(
    Path(key): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<SettingUpdateRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("MISSING_PAYLOAD", "Missing payload"));
    };
    store_setting(&pool, key.trim(), request.value, principal.user_id()).await
}

#[utoipa::path(
    get,
    path = "/v1/settings/company/info",
    responses(
        (status = 200, description = "Company info", body = SettingResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 404, description = "Not configured yet", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn get_company_info(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &pool).await?;
    let setting = load_setting(&pool, COMPANY_INFO_KEY).await?;
    Ok((StatusCode::OK, Json(setting)).into_response())
}

#[utoipa::path(
    put,
    path = "/v1/settings/company/info",
    request_body = SettingUpdateRequest,
    responses(
        (status = 200, description = "Company info stored", body = SettingResponse),
        (status = 400, description = "Invalid company info", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn put_company_info(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<SettingUpdateRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("MISSING_PAYLOAD", "Missing payload"));
    };
    store_setting(&pool, COMPANY_INFO_KEY, request.value, principal.user_id()).await
}

#[utoipa::path(
    get,
    path = "/v1/settings/email/config",
    responses(
        (status = 200, description = "SMTP config with password redacted", body = SettingResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 404, description = "Not configured yet", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn get_email_config(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &pool).await?;
    let setting = load_setting(&pool, EMAIL_CONFIG_KEY).await?;
    Ok((StatusCode::OK, Json(setting)).into_response())
}

#[utoipa::path(
    put,
    path = "/v1/settings/email/config",
    request_body = SettingUpdateRequest,
    responses(
        (status = 200, description = "SMTP config stored", body = SettingResponse),
        (status = 400, description = "Invalid SMTP config", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn put_email_config(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<SettingUpdateRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("MISSING_PAYLOAD", "Missing payload"));
    };
    store_setting(&pool, EMAIL_CONFIG_KEY, request.value, principal.user_id()).await
}

#[utoipa::path(
    post,
    path = "/v1/settings/email/test",
    responses(
        (status = 200, description = "Probe outcome", body = EmailTestResponse),
        (status = 400, description = "SMTP config missing or invalid", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn test_email_config(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    tester: Extension<Arc<dyn EmailTester>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;

    let stored = fetch_setting_value(&pool, EMAIL_CONFIG_KEY)
        .await
        .map_err(|err| {
            error!("Failed to load email config: {err}");
            ApiError::internal()
        })?
        .ok_or_else(|| {
            ApiError::validation("EMAIL_CONFIG_MISSING", "SMTP configuration is not set")
        })?;

    let config: EmailConfig = serde_json::from_value(stored).map_err(|err| {
        error!("Stored email config is malformed: {err}");
        ApiError::validation("INVALID_SETTING_VALUE", "Stored SMTP configuration is invalid")
    })?;

    let probe = EmailProbe {
        host: config.host,
        port: config.port,
        from_address: config.from_address,
        username: config.username,
        password: config.password.map(secrecy::SecretString::from),
        use_tls: config.use_tls,
    };

    let response = match tester.test(&probe) {
        Ok(()) => EmailTestResponse {
            success: true,
            message: "SMTP configuration verified".to_string(),
        },
        Err(err) => EmailTestResponse {
            success: false,
            message: format!("SMTP verification failed: {err}"),
        },
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/settings/dashboard/config",
    responses(
        (status = 200, description = "Dashboard config", body = SettingResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 404, description = "Not configured yet", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn get_dashboard_config(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, ApiError> {
    require_auth(&headers, &pool).await?;
    let setting = load_setting(&pool, DASHBOARD_CONFIG_KEY).await?;
    Ok((StatusCode::OK, Json(setting)).into_response())
}

#[utoipa::path(
    put,
    path = "/v1/settings/dashboard/config",
    request_body = SettingUpdateRequest,
    responses(
        (status = 200, description = "Dashboard config stored", body = SettingResponse),
        (status = 400, description = "Invalid dashboard config", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody)
    ),
    tag = "settings"
)]
pub async fn put_dashboard_config(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<SettingUpdateRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("MISSING_PAYLOAD", "Missing payload"));
    };
    store_setting(
        &pool,
        DASHBOARD_CONFIG_KEY,
        request.value,
        principal.user_id(),
    )
    .await
}

async fn load_setting(pool: &PgPool, key: &str) -> Result<SettingResponse, ApiError> {
    let setting = fetch_setting(pool, key).await.map_err(|err| {
        error!("Failed to fetch setting {key}: {err}");
        ApiError::internal()
    })?;
    setting.ok_or_else(|| ApiError::not_found("SETTING_NOT_FOUND", "Setting not found"))
}

async fn store_setting(
    pool: &PgPool,
    key: &str,
    value: serde_json::Value,
    updated_by: Uuid,
) -> Result<Response, ApiError> {
    if key.is_empty() {
        return Err(ApiError::validation("MISSING_KEY", "Setting key is required"));
    }

    let parsed = SettingValue::parse(key, value)
        .map_err(|message| ApiError::validation("INVALID_SETTING_VALUE", message))?;
    let json = parsed.to_json().map_err(|err| {
        error!("Failed to serialize setting {key}: {err}");
        ApiError::internal()
    })?;

    let stored = upsert_setting(pool, key, &json, updated_by)
        .await
        .map_err(|err| {
            error!("Failed to store setting {key}: {err}");
            ApiError::internal()
        })?;
    Ok((StatusCode::OK, Json(stored)).into_response())
}

fn response_from_row(row: &sqlx::postgres::PgRow) -> anyhow::Result<SettingResponse> {
    let key: String = row.get("key");
    let raw: String = row.get("value");
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(SettingResponse {
        value: redact_setting(&key, value),
        key,
        updated_by: row.get("updated_by"),
        updated_at: row.get("updated_at"),
    })
}

const SETTING_COLUMNS: &str = r#"
    key,
    value::text AS value,
    updated_by::text AS updated_by,
    to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
"#;

async fn fetch_all_settings(pool: &PgPool) -> anyhow::Result<Vec<SettingResponse>> {
    let query = format!("SELECT {SETTING_COLUMNS} FROM app_settings ORDER BY key");
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(response_from_row).collect()
}

async fn fetch_setting(pool: &PgPool, key: &str) -> anyhow::Result<Option<SettingResponse>> {
    let query = format!("SELECT {SETTING_COLUMNS} FROM app_settings WHERE key = $1");
    let row = sqlx::query(&query).bind(key).fetch_optional(pool).await?;
    row.as_ref().map(response_from_row).transpose()
}

/// Raw value without redaction; only for server-side consumers.
async fn fetch_setting_value(
    pool: &PgPool,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let query = "SELECT value::text AS value FROM app_settings WHERE key = $1";
    let row = sqlx::query(query).bind(key).fetch_optional(pool).await?;
    row.map(|row| {
        let raw: String = row.get("value");
        Ok(serde_json::from_str(&raw)?)
    })
    .transpose()
}

async fn upsert_setting(
    pool: &PgPool,
    key: &str,
    value: &serde_json::Value,
    updated_by: Uuid,
) -> anyhow::Result<SettingResponse> {
    let value_text = serde_json::to_string(value)?;
    let query = format!(
        r"
        INSERT INTO app_settings (key, value, updated_by, updated_at)
        VALUES ($1, $2::jsonb, $3, NOW())
        ON CONFLICT (key)
        DO UPDATE SET value = EXCLUDED.value, updated_by = EXCLUDED.updated_by, updated_at = NOW()
        RETURNING {SETTING_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(key)
        .bind(value_text)
        .bind(updated_by)
        .fetch_one(pool)
        .await?;
    response_from_row(&row)
}

#[cfg(test)]
mod tests {
    use super::{get_setting, list_settings};
    use anyhow::Result;
    use axum::{
        extract::{Extension, Path},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
    };
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn settings_reads_require_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = list_settings(HeaderMap::new(), Extension(pool.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = get_setting(
            Path("company.info".to_string()),
            HeaderMap::new(),
            Extension(pool),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
