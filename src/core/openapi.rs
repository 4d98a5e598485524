use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::core::session::SESSION_COOKIE;
use crate::features::analysis::{dtos as analysis_dtos, handlers as analysis_handlers, models as analysis_models};
use crate::features::audit::models as audit_models;
use crate::features::auth::{dtos as auth_dtos, handlers as auth_handlers, model as auth_model};
use crate::features::pages::{dtos as pages_dtos, handlers as pages_handlers};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth
        auth_handlers::register,
        auth_handlers::login,
        auth_handlers::logout,
        auth_handlers::forgot_password,
        auth_handlers::get_me,
        // Analysis
        analysis_handlers::upload,
        analysis_handlers::analyze,
        analysis_handlers::get_result,
        analysis_handlers::list_analyses,
        // Pages
        pages_handlers::ping,
        pages_handlers::dashboard,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Auth
            auth_model::Role,
            auth_model::CurrentUser,
            auth_dtos::RegisterForm,
            auth_dtos::LoginForm,
            auth_dtos::ForgotPasswordForm,
            ApiResponse<auth_model::CurrentUser>,
            // Audit
            audit_models::AuditAction,
            audit_models::AuditLog,
            // Analysis
            analysis_models::AnalysisStatus,
            analysis_models::StatusCounts,
            analysis_dtos::UploadAnalysisDto,
            analysis_dtos::AnalysisResponseDto,
            ApiResponse<analysis_dtos::AnalysisResponseDto>,
            ApiResponse<Vec<analysis_dtos::AnalysisResponseDto>>,
            // Pages
            pages_dtos::PingDto,
            pages_dtos::MapDefaultsDto,
            pages_dtos::DashboardDto,
            ApiResponse<pages_dtos::PingDto>,
            ApiResponse<pages_dtos::DashboardDto>,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and logout"),
        (name = "analysis", description = "Image upload, recognition and results"),
        (name = "pages", description = "Dashboard data and liveness"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Geolens API",
        version = "0.1.0",
        description = "API documentation for Geolens",
    )
)]
pub struct ApiDoc;

/// Adds the session cookie security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_documents_json_endpoints() {
        let doc = ApiDoc::openapi();
        for path in [
            "/upload",
            "/analyze/{id}",
            "/results/{id}",
            "/api/analyses",
            "/login",
            "/api/me",
            "/ping",
            "/dashboard",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{} missing", path);
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("session_cookie"));
    }

    #[test]
    fn test_swagger_info_modifier() {
        let mut doc = ApiDoc::openapi();
        SwaggerInfoModifier {
            title: "Custom".to_string(),
            version: "9.9.9".to_string(),
            description: "Docs".to_string(),
        }
        .modify(&mut doc);
        assert_eq!(doc.info.title, "Custom");
        assert_eq!(doc.info.description.as_deref(), Some("Docs"));
    }
}
