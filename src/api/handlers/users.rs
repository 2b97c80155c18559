//! User administration endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via session cookie.
//! 2) Require the admin role for every route here.
//! 3) Perform reads or allow-listed writes on user records.
//!
//! Accounts are never hard-deleted; DELETE deactivates so audit history
//! stays attributable.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::AuthState;
use super::auth::principal::{require_admin, require_auth};
use super::auth::storage::{USER_COLUMNS, UserRecord, fetch_user};
use super::auth::types::{Role, UserResponse};
use super::auth::utils::{is_unique_violation, normalize_email, valid_email};
use crate::api::error::{ApiError, ErrorBody};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "All users, newest first", body = [UserResponse]),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn list_users(headers: HeaderMap, pool: Extension<PgPool>) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;

    let users = fetch_all_users(&pool).await.map_err(|err| {
        error!("Failed to list users: {err}");
        ApiError::internal()
    })?;
    Ok((StatusCode::OK, Json(users)).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn create_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateUserRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;

    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("MISSING_PAYLOAD", "Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::validation("INVALID_EMAIL", "Invalid email"));
    }
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("MISSING_NAME", "Name is required"));
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(
            "PASSWORD_TOO_SHORT",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    let role = match &request.role {
        Some(value) => Role::parse(value)
            .ok_or_else(|| ApiError::validation("INVALID_ROLE", "Unknown role"))?,
        None => Role::Viewer,
    };
    let department = normalize_optional(request.department);

    let password_hash = auth_state
        .hasher()
        .hash_blocking(request.password)
        .await
        .map_err(|err| {
            error!("Password hashing failed: {err}");
            ApiError::internal()
        })?;

    let created = insert_user(&pool, &email, name, &password_hash, role, department.as_deref())
        .await
        .map_err(|err| match err {
            InsertUserError::DuplicateEmail => {
                ApiError::conflict("DUPLICATE_EMAIL", "Email already registered")
            }
            InsertUserError::Database(err) => {
                error!("Failed to create user: {err}");
                ApiError::internal()
            }
        })?;

    Ok((StatusCode::CREATED, Json(created.to_response())).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = UserResponse),
        (status = 400, description = "Invalid user id", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;

    let user_id = parse_user_id(&id)?;
    let user = fetch_user(&pool, user_id).await.map_err(|err| {
        error!("Failed to fetch user: {err}");
        ApiError::internal()
    })?;
    match user {
        Some(user) => Ok((StatusCode::OK, Json(user.to_response())).into_response()),
        None => Err(user_not_found()),
    }
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<UpdateUserRequest>>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;

    let user_id = parse_user_id(&id)?;
    let Some(Json(request)) = payload else {
        return Err(ApiError::validation("MISSING_PAYLOAD", "Missing payload"));
    };

    let role = match &request.role {
        Some(value) => Some(
            Role::parse(value)
                .ok_or_else(|| ApiError::validation("INVALID_ROLE", "Unknown role"))?,
        ),
        None => None,
    };
    let name = normalize_optional(request.name);
    let department = normalize_optional(request.department);

    if name.is_none() && role.is_none() && department.is_none() && request.is_active.is_none() {
        return Err(ApiError::validation("NO_UPDATES", "No updates provided"));
    }

    let updated = apply_user_update(
        &pool,
        user_id,
        name.as_deref(),
        role,
        department.as_deref(),
        request.is_active,
    )
    .await
    .map_err(|err| {
        error!("Failed to update user: {err}");
        ApiError::internal()
    })?;

    match updated {
        Some(user) => Ok((StatusCode::OK, Json(user.to_response())).into_response()),
        None => Err(user_not_found()),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deactivated"),
        (status = 400, description = "Invalid user id", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Admin role required", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, ApiError> {
    let principal = require_auth(&headers, &pool).await?;
    require_admin(&principal)?;

    let user_id = parse_user_id(&id)?;
    let deactivated = deactivate_user(&pool, user_id).await.map_err(|err| {
        error!("Failed to deactivate user: {err}");
        ApiError::internal()
    })?;
    if deactivated {
        Ok(StatusCode::OK.into_response())
    } else {
        Err(user_not_found())
    }
}

fn parse_user_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::validation("INVALID_USER_ID", "Invalid user id"))
}

fn user_not_found() -> ApiError {
    ApiError::not_found("USER_NOT_FOUND", "User not found")
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

enum InsertUserError {
    DuplicateEmail,
    Database(anyhow::Error),
}

async fn fetch_all_users(pool: &PgPool) -> anyhow::Result<Vec<UserResponse>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| UserRecord::from_row(row).to_response())
        .collect())
}

async fn insert_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    password_hash: &str,
    role: Role,
    department: Option<&str>,
) -> Result<UserRecord, InsertUserError> {
    let query = format!(
        r"
        INSERT INTO users (email, name, password_hash, role, department)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(department)
        .fetch_one(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                InsertUserError::DuplicateEmail
            } else {
                InsertUserError::Database(err.into())
            }
        })?;
    Ok(UserRecord::from_row(&row))
}

async fn apply_user_update(
    pool: &PgPool,
    user_id: Uuid,
    name: Option<&str>,
    role: Option<Role>,
    department: Option<&str>,
    is_active: Option<bool>,
) -> anyhow::Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET name = COALESCE($1, name),
            role = COALESCE($2, role),
            department = COALESCE($3, department),
            is_active = COALESCE($4, is_active),
            updated_at = NOW()
        WHERE id = $5
        RETURNING {USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(name)
        .bind(role.map(Role::as_str))
        .bind(department)
        .bind(is_active)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| UserRecord::from_row(&row)))
}

async fn deactivate_user(pool: &PgPool, user_id: Uuid) -> anyhow::Result<bool> {
    // Deactivation, not deletion: execution history keeps its author and a
    // later login attempt gets ACCOUNT_INACTIVE.
    let query = "UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1";
    let result = sqlx::query(query).bind(user_id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::{list_users, parse_user_id};
    use anyhow::Result;
    use axum::{
        extract::Extension,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
    };
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn parse_user_id_accepts_uuid() {
        assert!(parse_user_id(" 6f9619ff-8b86-d011-b42d-00c04fc964ff ").is_ok());
        assert!(parse_user_id("42").is_err());
        assert!(parse_user_id("").is_err());
    }

    #[tokio::test]
    async fn list_users_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = list_users(HeaderMap::new(), Extension(pool))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
