//! Typed application settings.
//!
//! Known keys parse into validated variants; anything else round-trips as
//! an opaque JSON blob so deployments can stash custom configuration
//! without a schema change.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::handlers::auth::utils::valid_email;

pub const COMPANY_INFO_KEY: &str = "company.info";
pub const EMAIL_CONFIG_KEY: &str = "email.config";
pub const DASHBOARD_CONFIG_KEY: &str = "dashboard.config";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompanyInfo {
    pub name: String,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub timezone: Option<String>,
}

impl CompanyInfo {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("company name is required".to_string());
        }
        if let Some(email) = &self.contact_email {
            if !valid_email(&email.trim().to_lowercase()) {
                return Err("contact email is invalid".to_string());
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub username: Option<String>,
    /// Stored as-is; redacted by the read endpoints.
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
}

impl EmailConfig {
    fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("smtp host is required".to_string());
        }
        if self.port == 0 {
            return Err("smtp port must be non-zero".to_string());
        }
        if !valid_email(&self.from_address.trim().to_lowercase()) {
            return Err("from address is invalid".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardConfig {
    pub refresh_seconds: u32,
    pub default_range_days: u32,
    #[serde(default)]
    pub widgets: Vec<String>,
}

impl DashboardConfig {
    fn validate(&self) -> Result<(), String> {
        if self.refresh_seconds < 5 {
            return Err("refresh interval must be at least 5 seconds".to_string());
        }
        if self.default_range_days == 0 {
            return Err("default range must be at least one day".to_string());
        }
        Ok(())
    }
}

/// A setting value tagged by its key.
#[derive(Debug, Clone)]
pub enum SettingValue {
    CompanyInfo(CompanyInfo),
    EmailConfig(EmailConfig),
    DashboardConfig(DashboardConfig),
    /// Unrecognized keys keep their raw JSON.
    Custom(serde_json::Value),
}

impl SettingValue {
    /// Parse and validate a value for the given key.
    ///
    /// # Errors
    /// Returns a human-readable message when a known key fails its schema.
    pub fn parse(key: &str, value: serde_json::Value) -> Result<Self, String> {
        match key {
            COMPANY_INFO_KEY => {
                let info: CompanyInfo = serde_json::from_value(value)
                    .map_err(|err| format!("invalid company info: {err}"))?;
                info.validate()?;
                Ok(Self::CompanyInfo(info))
            }
            EMAIL_CONFIG_KEY => {
                let config: EmailConfig = serde_json::from_value(value)
                    .map_err(|err| format!("invalid email config: {err}"))?;
                config.validate()?;
                Ok(Self::EmailConfig(config))
            }
            DASHBOARD_CONFIG_KEY => {
                let config: DashboardConfig = serde_json::from_value(value)
                    .map_err(|err| format!("invalid dashboard config: {err}"))?;
                config.validate()?;
                Ok(Self::DashboardConfig(config))
            }
            _ => Ok(Self::Custom(value)),
        }
    }

    /// The JSON stored in the database.
    ///
    /// # Errors
    /// Returns an error when a typed variant fails to serialize.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::CompanyInfo(info) => serde_json::to_value(info),
            Self::EmailConfig(config) => serde_json::to_value(config),
            Self::DashboardConfig(config) => serde_json::to_value(config),
            Self::Custom(value) => Ok(value.clone()),
        }
    }
}

/// Strip the SMTP password before a config leaves the server.
pub(crate) fn redact_setting(key: &str, mut value: serde_json::Value) -> serde_json::Value {
    if key == EMAIL_CONFIG_KEY {
        if let Some(object) = value.as_object_mut() {
            let had_password = object
                .get("password")
                .is_some_and(|password| !password.is_null());
            object.remove("password");
            object.insert("password_set".to_string(), serde_json::json!(had_password));
        }
    }
    value
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SettingResponse {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_by: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SettingUpdateRequest {
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailTestResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::{
        DASHBOARD_CONFIG_KEY, EMAIL_CONFIG_KEY, COMPANY_INFO_KEY, SettingValue, redact_setting,
    };
    use serde_json::json;

    #[test]
    fn company_info_requires_name() {
        let err = SettingValue::parse(COMPANY_INFO_KEY, json!({"name": "  "}))
            .expect_err("empty name should fail");
        assert!(err.contains("name"));

        let ok = SettingValue::parse(
            COMPANY_INFO_KEY,
            json!({"name": "Acme", "contact_email": "sec@acme.com"}),
        );
        assert!(matches!(ok, Ok(SettingValue::CompanyInfo(_))));
    }

    #[test]
    fn company_info_rejects_bad_contact() {
        let err = SettingValue::parse(
            COMPANY_INFO_KEY,
            json!({"name": "Acme", "contact_email": "not-an-email"}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn email_config_validates_shape() {
        let err = SettingValue::parse(EMAIL_CONFIG_KEY, json!({"host": "", "port": 587, "from_address": "a@b.co"}));
        assert!(err.is_err());

        let err = SettingValue::parse(
            EMAIL_CONFIG_KEY,
            json!({"host": "smtp.acme.com", "port": 0, "from_address": "a@b.co"}),
        );
        assert!(err.is_err());

        let ok = SettingValue::parse(
            EMAIL_CONFIG_KEY,
            json!({
                "host": "smtp.acme.com",
                "port": 587,
                "from_address": "alerts@acme.com",
                "username": "alerts",
                "password": "s3cret"
            }),
        );
        match ok {
            Ok(SettingValue::EmailConfig(config)) => {
                assert!(config.use_tls, "tls defaults on");
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn dashboard_config_bounds() {
        let err = SettingValue::parse(
            DASHBOARD_CONFIG_KEY,
            json!({"refresh_seconds": 1, "default_range_days": 7}),
        );
        assert!(err.is_err());

        let ok = SettingValue::parse(
            DASHBOARD_CONFIG_KEY,
            json!({"refresh_seconds": 30, "default_range_days": 7, "widgets": ["violations"]}),
        );
        assert!(matches!(ok, Ok(SettingValue::DashboardConfig(_))));
    }

    #[test]
    fn unknown_keys_stay_opaque() {
        let value = json!({"anything": ["goes", 42]});
        let parsed = SettingValue::parse("custom.blob", value.clone()).expect("opaque");
        match parsed {
            SettingValue::Custom(stored) => assert_eq!(stored, value),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn round_trip_to_json() {
        let value = json!({
            "host": "smtp.acme.com",
            "port": 587,
            "from_address": "alerts@acme.com",
            "username": null,
            "password": null,
            "use_tls": false
        });
        let parsed = SettingValue::parse(EMAIL_CONFIG_KEY, value.clone()).expect("parse");
        let stored = parsed.to_json().expect("serialize");
        assert_eq!(stored, value);
    }

    #[test]
    fn email_password_is_redacted() {
        let value = json!({
            "host": "smtp.acme.com",
            "port": 587,
            "from_address": "alerts@acme.com",
            "password": "s3cret"
        });
        let redacted = redact_setting(EMAIL_CONFIG_KEY, value);
        assert!(redacted.get("password").is_none());
        assert_eq!(redacted.get("password_set"), Some(&json!(true)));

        let other = redact_setting("custom.blob", json!({"password": "keep"}));
        assert_eq!(other.get("password"), Some(&json!("keep")));
    }
}
