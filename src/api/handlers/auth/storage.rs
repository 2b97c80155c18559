//! Database helpers for users and sessions.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::types::UserResponse;
use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Column list shared by every user query so row mapping stays uniform.
pub(crate) const USER_COLUMNS: &str = r#"
    id,
    email,
    name,
    role,
    department,
    password_hash,
    is_active,
    CASE
        WHEN last_login_at IS NULL THEN NULL
        ELSE to_char(last_login_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
    END AS last_login_at,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
"#;

/// Full user row; only ever sanitized before leaving the server.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) role: String,
    pub(crate) department: Option<String>,
    pub(crate) password_hash: String,
    pub(crate) is_active: bool,
    pub(crate) last_login_at: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl UserRecord {
    pub(crate) fn from_row(row: &sqlx::postgres::PgRow) -> Self {
        Self {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            role: row.get("role"),
            department: row.get("department"),
            password_hash: row.get("password_hash"),
            is_active: row.get("is_active"),
            last_login_at: row.get("last_login_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    pub(crate) fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.id.to_string(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            department: self.department.clone(),
            is_active: self.is_active,
            last_login_at: self.last_login_at.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
}

pub(crate) async fn lookup_user_by_email(
    pool: &PgPool,
    email_normalized: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(&query)
        .bind(email_normalized)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.map(|row| UserRecord::from_row(&row)))
}

pub(crate) async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;
    Ok(row.map(|row| UserRecord::from_row(&row)))
}

pub(crate) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT"
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Look up an unexpired session by token hash.
///
/// The user row is deliberately not joined here: callers re-fetch it on
/// every request so deactivation and role changes take effect immediately.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT user_id
        FROM user_sessions
        WHERE session_hash = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    if row.is_none() {
        return Ok(None);
    }

    // Record activity for audit visibility without extending the TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE"
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("user_id"),
    }))
}

pub(crate) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE"
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(crate) async fn touch_last_login(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET last_login_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE"
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update last login")?;
    Ok(())
}

pub(crate) async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE"
    );
    sqlx::query(query)
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;
    Ok(())
}

pub(crate) async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    name: &str,
    department: Option<&str>,
) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET name = $1,
            department = COALESCE($2, department),
            updated_at = NOW()
        WHERE id = $3
        RETURNING {USER_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE"
    );
    let row = sqlx::query(&query)
        .bind(name)
        .bind(department)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile")?;
    Ok(row.map(|row| UserRecord::from_row(&row)))
}

#[cfg(test)]
mod tests {
    use super::UserRecord;
    use uuid::Uuid;

    fn record() -> UserRecord {
        UserRecord {
            id: Uuid::nil(),
            email: "analyst@example.com".to_string(),
            name: "Analyst".to_string(),
            role: "analyst".to_string(),
            department: Some("soc".to_string()),
            password_hash: "$argon2id$stub".to_string(),
            is_active: true,
            last_login_at: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn response_never_carries_the_hash() {
        let response = record().to_response();
        let value = serde_json::to_value(&response).expect("serialize");
        assert!(value.get("password_hash").is_none());
        assert_eq!(
            value.get("email").and_then(serde_json::Value::as_str),
            Some("analyst@example.com")
        );
    }
}
