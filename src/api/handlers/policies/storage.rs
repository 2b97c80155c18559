//! Database access for security policies.
//!
//! Policy creation is the one multi-row write in the console and runs as a
//! single transaction: the policy row, its ordered conditions, and its
//! ordered actions land together or not at all. Name uniqueness is
//! arbitrated by the database constraint, not application locking.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::{Instrument, error};
use uuid::Uuid;

use super::types::{
    ActionResponse, ConditionResponse, CreatePolicyRequest, EffectivePolicy, ExecutionResponse,
    PolicyFilters, PolicySummary, UpdatePolicyRequest,
};
use crate::api::handlers::auth::utils::{is_check_violation, is_unique_violation};

const SUMMARY_COLUMNS: &str = r#"
    p.id,
    p.name,
    p.description,
    p.policy_level,
    p.target_id,
    p.target_type,
    p.is_active,
    p.priority,
    p.created_by::text AS created_by,
    to_char(p.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(p.updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at,
    (SELECT COUNT(*) FROM policy_conditions c WHERE c.policy_id = p.id) AS condition_count,
    (SELECT COUNT(*) FROM policy_actions a WHERE a.policy_id = p.id) AS action_count,
    (SELECT COUNT(*) FROM policy_executions e
        WHERE e.policy_id = p.id
          AND e.executed_at > NOW() - INTERVAL '30 days') AS recent_execution_count
"#;

fn summary_from_row(row: &PgRow) -> PolicySummary {
    PolicySummary {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        policy_level: row.get("policy_level"),
        target_id: row.get("target_id"),
        target_type: row.get("target_type"),
        is_active: row.get("is_active"),
        priority: row.get("priority"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        condition_count: row.get("condition_count"),
        action_count: row.get("action_count"),
        recent_execution_count: row.get("recent_execution_count"),
    }
}

/// Filters are appended only when present and already validated against
/// the enum allow-lists; the builder owns placeholder numbering.
pub(super) async fn list_policies(
    pool: &PgPool,
    filters: PolicyFilters,
) -> Result<Vec<PolicySummary>> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {SUMMARY_COLUMNS} FROM security_policies p WHERE 1=1"
    ));
    if let Some(level) = filters.level {
        builder.push(" AND p.policy_level = ");
        builder.push_bind(level);
    }
    if let Some(active) = filters.active {
        builder.push(" AND p.is_active = ");
        builder.push_bind(active);
    }
    if let Some(target_type) = filters.target_type {
        builder.push(" AND p.target_type = ");
        builder.push_bind(target_type);
    }
    builder.push(" ORDER BY p.priority DESC, p.created_at DESC");

    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let rows = builder
        .build()
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list policies")?;
    Ok(rows.iter().map(summary_from_row).collect())
}

pub(super) async fn fetch_policy_summary(
    pool: &PgPool,
    policy_id: i64,
) -> Result<Option<PolicySummary>> {
    let query = format!("SELECT {SUMMARY_COLUMNS} FROM security_policies p WHERE p.id = $1");
    let row = sqlx::query(&query)
        .bind(policy_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch policy")?;
    Ok(row.as_ref().map(summary_from_row))
}

pub(super) async fn fetch_conditions(
    pool: &PgPool,
    policy_id: i64,
) -> Result<Vec<ConditionResponse>> {
    let query = r"
        SELECT id, condition_type, operator, value, logical_operator, condition_order
        FROM policy_conditions
        WHERE policy_id = $1
        ORDER BY condition_order ASC, id ASC
    ";
    let rows = sqlx::query(query)
        .bind(policy_id)
        .fetch_all(pool)
        .await
        .context("failed to fetch policy conditions")?;
    Ok(rows
        .into_iter()
        .map(|row| ConditionResponse {
            id: row.get("id"),
            condition_type: row.get("condition_type"),
            operator: row.get("operator"),
            value: row.get("value"),
            logical_operator: row.get("logical_operator"),
            condition_order: row.get("condition_order"),
        })
        .collect())
}

pub(super) async fn fetch_actions(pool: &PgPool, policy_id: i64) -> Result<Vec<ActionResponse>> {
    let query = r"
        SELECT id, action_type, action_config::text AS action_config,
               execution_order, delay_minutes, is_enabled
        FROM policy_actions
        WHERE policy_id = $1
        ORDER BY execution_order ASC, id ASC
    ";
    let rows = sqlx::query(query)
        .bind(policy_id)
        .fetch_all(pool)
        .await
        .context("failed to fetch policy actions")?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let raw: String = row.get("action_config");
            let action_config = serde_json::from_str(&raw).unwrap_or_else(|err| {
                error!("Malformed action config for action {}: {err}", row.get::<i64, _>("id"));
                serde_json::Value::Null
            });
            ActionResponse {
                id: row.get("id"),
                action_type: row.get("action_type"),
                action_config,
                execution_order: row.get("execution_order"),
                delay_minutes: row.get("delay_minutes"),
                is_enabled: row.get("is_enabled"),
            }
        })
        .collect())
}

/// The 10 most recent executions with employee and violation context.
pub(super) async fn fetch_recent_executions(
    pool: &PgPool,
    policy_id: i64,
) -> Result<Vec<ExecutionResponse>> {
    let query = r#"
        SELECT
            x.id,
            x.employee_id,
            emp.name AS employee_name,
            emp.email AS employee_email,
            x.violation_id,
            v.violation_type,
            v.severity AS violation_severity,
            x.status,
            x.details,
            to_char(x.executed_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS executed_at
        FROM policy_executions x
        LEFT JOIN employees emp ON emp.id = x.employee_id
        LEFT JOIN violations v ON v.id = x.violation_id
        WHERE x.policy_id = $1
        ORDER BY x.executed_at DESC
        LIMIT 10
    "#;
    let rows = sqlx::query(query)
        .bind(policy_id)
        .fetch_all(pool)
        .await
        .context("failed to fetch policy executions")?;
    Ok(rows
        .into_iter()
        .map(|row| ExecutionResponse {
            id: row.get("id"),
            employee_id: row.get("employee_id"),
            employee_name: row.get("employee_name"),
            employee_email: row.get("employee_email"),
            violation_id: row.get("violation_id"),
            violation_type: row.get("violation_type"),
            violation_severity: row.get("violation_severity"),
            status: row.get("status"),
            details: row.get("details"),
            executed_at: row.get("executed_at"),
        })
        .collect())
}

#[derive(Debug)]
pub(super) enum PolicyWriteError {
    DuplicateName,
    ConstraintViolation,
    Other(anyhow::Error),
}

impl PolicyWriteError {
    fn classify(err: sqlx::Error, context: &'static str) -> Self {
        if is_unique_violation(&err) {
            Self::DuplicateName
        } else if is_check_violation(&err) {
            Self::ConstraintViolation
        } else {
            Self::Other(anyhow::Error::from(err).context(context))
        }
    }
}

/// Insert a policy with its conditions and actions in one transaction.
///
/// Any failure rolls the whole write back; partial policies never persist.
pub(super) async fn create_policy(
    pool: &PgPool,
    created_by: Uuid,
    request: &CreatePolicyRequest,
) -> Result<i64, PolicyWriteError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| PolicyWriteError::Other(anyhow::Error::from(err).context("begin")))?;

    let query = r"
        INSERT INTO security_policies
            (name, description, policy_level, target_id, target_type, priority, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT"
    );
    let row = sqlx::query(query)
        .bind(request.name.trim())
        .bind(request.description.as_deref())
        .bind(&request.policy_level)
        .bind(request.target_id.as_deref())
        .bind(request.target_type.as_deref())
        .bind(request.priority.unwrap_or(0))
        .bind(created_by)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let policy_id: i64 = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            let _ = tx.rollback().await;
            return Err(PolicyWriteError::classify(err, "failed to insert policy"));
        }
    };

    for (position, condition) in request.conditions.iter().enumerate() {
        let logical_operator = condition
            .logical_operator
            .as_deref()
            .map_or_else(|| "AND".to_string(), str::to_uppercase);
        let order = condition
            .condition_order
            .unwrap_or(i32::try_from(position).unwrap_or(i32::MAX));
        let result = sqlx::query(
            r"
            INSERT INTO policy_conditions
                (policy_id, condition_type, operator, value, logical_operator, condition_order)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(policy_id)
        .bind(&condition.condition_type)
        .bind(&condition.operator)
        .bind(&condition.value)
        .bind(logical_operator)
        .bind(order)
        .execute(&mut *tx)
        .await;
        if let Err(err) = result {
            let _ = tx.rollback().await;
            return Err(PolicyWriteError::classify(
                err,
                "failed to insert policy condition",
            ));
        }
    }

    for (position, action) in request.actions.iter().enumerate() {
        let config = action
            .action_config
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let config_text = match serde_json::to_string(&config) {
            Ok(text) => text,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(PolicyWriteError::Other(
                    anyhow::Error::from(err).context("failed to serialize action config"),
                ));
            }
        };
        let order = action
            .execution_order
            .unwrap_or(i32::try_from(position).unwrap_or(i32::MAX));
        let result = sqlx::query(
            r"
            INSERT INTO policy_actions
                (policy_id, action_type, action_config, execution_order, delay_minutes, is_enabled)
            VALUES ($1, $2, $3::jsonb, $4, $5, $6)
            ",
        )
        .bind(policy_id)
        .bind(&action.action_type)
        .bind(config_text)
        .bind(order)
        .bind(action.delay_minutes.unwrap_or(0))
        .bind(action.is_enabled.unwrap_or(true))
        .execute(&mut *tx)
        .await;
        if let Err(err) = result {
            let _ = tx.rollback().await;
            return Err(PolicyWriteError::classify(
                err,
                "failed to insert policy action",
            ));
        }
    }

    tx.commit()
        .await
        .map_err(|err| PolicyWriteError::Other(anyhow::Error::from(err).context("commit")))?;

    Ok(policy_id)
}

/// Partial update; level and target are immutable after creation.
pub(super) async fn update_policy(
    pool: &PgPool,
    policy_id: i64,
    request: &UpdatePolicyRequest,
) -> Result<bool, PolicyWriteError> {
    let query = r"
        UPDATE security_policies
        SET name = COALESCE($1, name),
            description = COALESCE($2, description),
            is_active = COALESCE($3, is_active),
            priority = COALESCE($4, priority),
            updated_at = NOW()
        WHERE id = $5
    ";
    let result = sqlx::query(query)
        .bind(request.name.as_deref().map(str::trim))
        .bind(request.description.as_deref())
        .bind(request.is_active)
        .bind(request.priority)
        .bind(policy_id)
        .execute(pool)
        .await
        .map_err(|err| PolicyWriteError::classify(err, "failed to update policy"))?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn delete_policy(pool: &PgPool, policy_id: i64) -> Result<bool> {
    // Conditions and actions go with the policy via ON DELETE CASCADE.
    let result = sqlx::query("DELETE FROM security_policies WHERE id = $1")
        .bind(policy_id)
        .execute(pool)
        .await
        .context("failed to delete policy")?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn toggle_policy(pool: &PgPool, policy_id: i64) -> Result<Option<bool>> {
    let query = r"
        UPDATE security_policies
        SET is_active = NOT is_active,
            updated_at = NOW()
        WHERE id = $1
        RETURNING is_active
    ";
    let row = sqlx::query(query)
        .bind(policy_id)
        .fetch_optional(pool)
        .await
        .context("failed to toggle policy")?;
    Ok(row.map(|row| row.get("is_active")))
}

/// Precedence resolution is delegated to the database; this only shapes rows.
pub(super) async fn effective_policies(
    pool: &PgPool,
    employee_id: i64,
) -> Result<Vec<EffectivePolicy>> {
    let query = "SELECT * FROM get_effective_policies($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let rows = sqlx::query(query)
        .bind(employee_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to resolve effective policies")?;
    Ok(rows
        .into_iter()
        .map(|row| EffectivePolicy {
            policy_id: row.get("policy_id"),
            name: row.get("name"),
            description: row.get("description"),
            policy_level: row.get("policy_level"),
            priority: row.get("priority"),
        })
        .collect())
}

pub(super) struct PolicyStatus {
    pub(super) is_active: bool,
}

pub(super) async fn fetch_policy_status(
    pool: &PgPool,
    policy_id: i64,
) -> Result<Option<PolicyStatus>> {
    let row = sqlx::query("SELECT is_active FROM security_policies WHERE id = $1")
        .bind(policy_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch policy status")?;
    Ok(row.map(|row| PolicyStatus {
        is_active: row.get("is_active"),
    }))
}

pub(super) async fn employee_exists(pool: &PgPool, employee_id: i64) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM employees WHERE id = $1")
        .bind(employee_id)
        .fetch_optional(pool)
        .await
        .context("failed to check employee")?;
    Ok(row.is_some())
}

pub(super) async fn pick_any_employee(pool: &PgPool) -> Result<Option<i64>> {
    let row = sqlx::query("SELECT id FROM employees ORDER BY id LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("failed to pick employee")?;
    Ok(row.map(|row| row.get("id")))
}

pub(super) async fn insert_execution(
    pool: &PgPool,
    policy_id: i64,
    employee_id: i64,
    details: Option<&str>,
) -> Result<i64> {
    let query = r"
        INSERT INTO policy_executions (policy_id, employee_id, status, details)
        VALUES ($1, $2, 'pending', $3)
        RETURNING id
    ";
    let row = sqlx::query(query)
        .bind(policy_id)
        .bind(employee_id)
        .bind(details)
        .fetch_one(pool)
        .await
        .context("failed to insert execution record")?;
    Ok(row.get("id"))
}
