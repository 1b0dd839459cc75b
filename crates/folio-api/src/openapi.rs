//! OpenAPI document for the Folio API
//!
//! Author: hephaex@gmail.com

use crate::auth::service::{
    AuthSession, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, TokenPair,
};
use crate::error::ApiError;
use crate::handlers::{auth, health};
use folio_core::{UserPublic, UserRole};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Path at which the JSON document is served
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::me_handler,
        health::health_check,
        health::readiness_check,
        health::metrics,
    ),
    components(schemas(
        RegisterRequest,
        LoginRequest,
        RefreshRequest,
        LogoutRequest,
        AuthSession,
        TokenPair,
        UserPublic,
        UserRole,
        auth::MeResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        health::MetricsResponse,
        ApiError,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and session tokens"),
        (name = "health", description = "Liveness, readiness and counters")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_includes_auth_paths() {
        let json = ApiDoc::openapi().to_json().unwrap();
        for path in [
            "/api/auth/register",
            "/api/auth/login",
            "/api/auth/refresh",
            "/api/auth/logout",
            "/api/auth/me",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
        assert!(json.contains("bearer_auth"));
    }
}
