//! OpenAPI document and Swagger UI

use axum::Router;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::health::readiness_check,
        crate::handlers::auth::register_handler,
        crate::handlers::auth::login_handler,
        crate::handlers::auth::refresh_handler,
        crate::handlers::auth::logout_handler,
        crate::handlers::auth::forgot_password_handler,
        crate::handlers::auth::reset_password_handler,
        crate::handlers::admin::me_handler,
        crate::handlers::admin::ban_handler,
        crate::handlers::admin::unban_handler
    ),
    components(
        schemas(
            crate::error::ApiError,
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ReadinessResponse,
            crate::handlers::health::ReadinessChecks,
            crate::auth::models::LoginRequest,
            crate::auth::models::RefreshRequest,
            crate::auth::models::LogoutRequest,
            crate::auth::models::ForgotPasswordRequest,
            crate::auth::models::ResetPasswordRequest,
            crate::auth::models::RegisterCompanyRequest,
            crate::auth::models::BanRequest,
            crate::auth::models::AccountPublic,
            crate::auth::models::CompanyPublic,
            crate::auth::models::LoginResponse,
            crate::auth::models::RefreshResponse,
            crate::auth::models::RegisterResponse,
            crate::auth::models::MessageResponse
        )
    ),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "auth", description = "Registration, login, tokens and password reset"),
        (name = "admin", description = "Admin surface behind the request gate and route guard")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{
            ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme,
        };

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "cookieAuth",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("auth_token"))),
        );
    }
}

pub fn docs_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_auth_and_admin_paths() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;

        for path in [
            "/api/auth/login",
            "/api/auth/register",
            "/api/auth/reset-password",
            "/api/admin/me",
            "/api/admin/users/{id}/ban",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }

        let schemes = &openapi.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("bearerAuth"));
        assert!(schemes.contains_key("cookieAuth"));
    }
}
