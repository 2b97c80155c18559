use super::handlers::{auth, health, policies, settings, users};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and documented. Routes added outside (like `/` and the
/// preflight-only `OPTIONS /health`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, logout, and session management".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Console user administration (admin only)".to_string());

    let mut policies_tag = Tag::new("policies");
    policies_tag.description = Some("Security policy definitions and audit".to_string());

    let mut settings_tag = Tag::new("settings");
    settings_tag.description = Some("Application configuration store".to_string());

    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![auth_tag, users_tag, policies_tag, settings_tag]);

    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let router = OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::session::me))
        .routes(routes!(auth::session::status))
        .routes(routes!(auth::account::change_password))
        .routes(routes!(auth::account::update_own_profile))
        .routes(routes!(users::list_users, users::create_user))
        .routes(routes!(users::get_user, users::update_user, users::delete_user))
        .routes(routes!(policies::list_policies, policies::create_policy))
        .routes(routes!(
            policies::get_policy,
            policies::update_policy,
            policies::delete_policy
        ))
        .routes(routes!(policies::toggle_policy))
        .routes(routes!(policies::effective_policies))
        .routes(routes!(policies::trigger_policy))
        .routes(routes!(settings::list_settings))
        .routes(routes!(
            settings::get_company_info,
            settings::put_company_info
        ))
        .routes(routes!(settings::get_email_config, settings::put_email_config))
        .routes(routes!(settings::test_email_config))
        .routes(routes!(
            settings::get_dashboard_config,
            settings::put_dashboard_config
        ))
        .routes(routes!(settings::get_setting, settings::put_setting));

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.license = Some(License::new(env!("CARGO_PKG_LICENSE")));

    OpenApiBuilder::new().info(info).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "policies"));

        assert!(spec.paths.paths.contains_key("/v1/auth/login"));
        assert!(spec.paths.paths.contains_key("/v1/auth/status"));
        assert!(spec.paths.paths.contains_key("/v1/policies/{id}/toggle"));
        assert!(
            spec.paths
                .paths
                .contains_key("/v1/policies/effective/{employee_id}")
        );
        assert!(spec.paths.paths.contains_key("/v1/settings/email/test"));
        assert!(spec.paths.paths.contains_key("/health"));
    }
}
