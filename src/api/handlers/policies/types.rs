//! Request/response types and validation for security policies.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiError;

pub(crate) const POLICY_LEVELS: &[&str] = &["global", "group", "user"];
pub(crate) const TARGET_TYPES: &[&str] = &["department", "role", "user"];
const LOGICAL_OPERATORS: &[&str] = &["AND", "OR"];

#[derive(Debug, Serialize, ToSchema)]
pub struct PolicySummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub policy_level: String,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub is_active: bool,
    pub priority: i32,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub condition_count: i64,
    pub action_count: i64,
    /// Executions recorded in the trailing 30 days.
    pub recent_execution_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConditionResponse {
    pub id: i64,
    pub condition_type: String,
    pub operator: String,
    pub value: String,
    pub logical_operator: String,
    pub condition_order: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub id: i64,
    pub action_type: String,
    pub action_config: serde_json::Value,
    pub execution_order: i32,
    pub delay_minutes: i32,
    pub is_enabled: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionResponse {
    pub id: i64,
    pub employee_id: i64,
    pub employee_name: Option<String>,
    pub employee_email: Option<String>,
    pub violation_id: Option<i64>,
    pub violation_type: Option<String>,
    pub violation_severity: Option<String>,
    pub status: String,
    pub details: Option<String>,
    pub executed_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PolicyDetail {
    #[serde(flatten)]
    pub policy: PolicySummary,
    pub conditions: Vec<ConditionResponse>,
    pub actions: Vec<ActionResponse>,
    pub recent_executions: Vec<ExecutionResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePolicy {
    pub policy_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub policy_level: String,
    pub priority: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ToggleResponse {
    pub id: i64,
    pub is_active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerResponse {
    pub execution_id: i64,
    pub policy_id: i64,
    pub employee_id: i64,
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConditionInput {
    pub condition_type: String,
    pub operator: String,
    pub value: String,
    pub logical_operator: Option<String>,
    pub condition_order: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionInput {
    pub action_type: String,
    pub action_config: Option<serde_json::Value>,
    pub execution_order: Option<i32>,
    pub delay_minutes: Option<i32>,
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePolicyRequest {
    pub name: String,
    pub description: Option<String>,
    pub policy_level: String,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub priority: Option<i32>,
    #[serde(default)]
    pub conditions: Vec<ConditionInput>,
    #[serde(default)]
    pub actions: Vec<ActionInput>,
}

impl CreatePolicyRequest {
    /// Reject invalid shapes before any row is written, so a failing
    /// request provably leaves the store untouched.
    pub(crate) fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::validation(
                "MISSING_POLICY_NAME",
                "Policy name is required",
            ));
        }
        if !POLICY_LEVELS.contains(&self.policy_level.as_str()) {
            return Err(ApiError::validation(
                "INVALID_POLICY_LEVEL",
                "Policy level must be one of: global, group, user",
            ));
        }

        let has_target = self.target_id.is_some() || self.target_type.is_some();
        if self.policy_level == "global" {
            if has_target {
                return Err(ApiError::validation(
                    "INVALID_POLICY_TARGET",
                    "Global policies must not carry a target",
                ));
            }
        } else {
            if self.target_id.is_none() || self.target_type.is_none() {
                return Err(ApiError::validation(
                    "INVALID_POLICY_TARGET",
                    "Scoped policies require both target id and target type",
                ));
            }
            let target_type = self.target_type.as_deref().unwrap_or_default();
            if !TARGET_TYPES.contains(&target_type) {
                return Err(ApiError::validation(
                    "INVALID_TARGET_TYPE",
                    "Target type must be one of: department, role, user",
                ));
            }
        }

        for condition in &self.conditions {
            if let Some(op) = &condition.logical_operator {
                if !LOGICAL_OPERATORS.contains(&op.to_uppercase().as_str()) {
                    return Err(ApiError::validation(
                        "INVALID_LOGICAL_OPERATOR",
                        "Logical operator must be AND or OR",
                    ));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePolicyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TriggerRequest {
    pub employee_id: Option<i64>,
    pub details: Option<String>,
}

/// List filters; unknown or invalid values are silently dropped rather
/// than rejected.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PolicyListQuery {
    pub level: Option<String>,
    pub active: Option<String>,
    pub target_type: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct PolicyFilters {
    pub(crate) level: Option<String>,
    pub(crate) active: Option<bool>,
    pub(crate) target_type: Option<String>,
}

impl PolicyListQuery {
    pub(crate) fn into_filters(self) -> PolicyFilters {
        PolicyFilters {
            level: self
                .level
                .map(|value| value.trim().to_lowercase())
                .filter(|value| POLICY_LEVELS.contains(&value.as_str())),
            active: self
                .active
                .map(|value| value.trim().to_lowercase())
                .and_then(|value| match value.as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => None,
                }),
            target_type: self
                .target_type
                .map(|value| value.trim().to_lowercase())
                .filter(|value| TARGET_TYPES.contains(&value.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConditionInput, CreatePolicyRequest, PolicyListQuery};

    fn base_request() -> CreatePolicyRequest {
        CreatePolicyRequest {
            name: "usb-exfil".to_string(),
            description: None,
            policy_level: "global".to_string(),
            target_id: None,
            target_type: None,
            priority: None,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[test]
    fn global_policy_without_target_is_valid() {
        assert!(base_request().validate().is_ok());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut request = base_request();
        request.name = "   ".to_string();
        let err = request.validate().expect_err("should fail");
        assert_eq!(err.code(), "MISSING_POLICY_NAME");
    }

    #[test]
    fn unknown_level_is_rejected() {
        let mut request = base_request();
        request.policy_level = "galaxy".to_string();
        let err = request.validate().expect_err("should fail");
        assert_eq!(err.code(), "INVALID_POLICY_LEVEL");
    }

    #[test]
    fn global_policy_with_target_is_rejected() {
        let mut request = base_request();
        request.target_id = Some("eng".to_string());
        let err = request.validate().expect_err("should fail");
        assert_eq!(err.code(), "INVALID_POLICY_TARGET");
    }

    #[test]
    fn scoped_policy_requires_full_target() {
        let mut request = base_request();
        request.policy_level = "group".to_string();
        request.target_id = Some("eng".to_string());
        let err = request.validate().expect_err("should fail");
        assert_eq!(err.code(), "INVALID_POLICY_TARGET");

        request.target_type = Some("department".to_string());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn scoped_policy_rejects_unknown_target_type() {
        let mut request = base_request();
        request.policy_level = "user".to_string();
        request.target_id = Some("42".to_string());
        request.target_type = Some("planet".to_string());
        let err = request.validate().expect_err("should fail");
        assert_eq!(err.code(), "INVALID_TARGET_TYPE");
    }

    #[test]
    fn logical_operator_allow_list() {
        let mut request = base_request();
        request.conditions.push(ConditionInput {
            condition_type: "file_access".to_string(),
            operator: "gt".to_string(),
            value: "100".to_string(),
            logical_operator: Some("or".to_string()),
            condition_order: None,
        });
        assert!(request.validate().is_ok());

        request.conditions[0].logical_operator = Some("XOR".to_string());
        let err = request.validate().expect_err("should fail");
        assert_eq!(err.code(), "INVALID_LOGICAL_OPERATOR");
    }

    #[test]
    fn invalid_filters_are_silently_dropped() {
        let query = PolicyListQuery {
            level: Some("galaxy".to_string()),
            active: Some("banana".to_string()),
            target_type: Some("ROLE".to_string()),
        };
        let filters = query.into_filters();
        assert!(filters.level.is_none());
        assert!(filters.active.is_none());
        assert_eq!(filters.target_type.as_deref(), Some("role"));
    }

    #[test]
    fn valid_filters_pass_through() {
        let query = PolicyListQuery {
            level: Some("Global".to_string()),
            active: Some("TRUE".to_string()),
            target_type: None,
        };
        let filters = query.into_filters();
        assert_eq!(filters.level.as_deref(), Some("global"));
        assert_eq!(filters.active, Some(true));
    }
}
