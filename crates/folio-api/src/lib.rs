//! Folio API - authentication service
//!
//! HTTP endpoints for account registration, login, token refresh, logout
//! and current-user lookup, plus the guards other routes use to require an
//! identity or a role.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use crate::auth::middleware::identity_middleware;
use crate::handlers::health;
use crate::middleware::{metrics_middleware, security_headers_middleware};
use crate::openapi::{ApiDoc, OPENAPI_PATH};
use crate::state::AppState;
use axum::http::{header, HeaderValue, Method};
use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router over shared state
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()))
        .layer(axum_middleware::from_fn_with_state(
            state.codec(),
            identity_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy: `*` allows any origin, otherwise only the listed ones.
/// An empty list allows no cross-origin requests.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Router over an in-memory store with cheap hashing, for integration tests
#[cfg(feature = "test-utils")]
pub mod test_utils {
    use super::*;
    use folio_core::config::{AppConfig, HashingConfig};
    use folio_core::MemoryAuthStore;

    pub struct TestApp {
        pub router: Router,
        pub state: Arc<AppState>,
        pub store: Arc<MemoryAuthStore>,
    }

    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.access_secret = "test-access-secret".to_string();
        config.auth.refresh_secret = "test-refresh-secret".to_string();
        config.auth.hashing = HashingConfig::minimal();
        config
    }

    pub fn create_router_for_testing() -> TestApp {
        create_router_with_config(test_config())
    }

    pub fn create_router_with_config(config: AppConfig) -> TestApp {
        let store = Arc::new(MemoryAuthStore::new());
        let state = match AppState::new(config, store.clone()) {
            Ok(state) => Arc::new(state),
            Err(e) => panic!("invalid test configuration: {e}"),
        };
        TestApp {
            router: create_router(state.clone()),
            state,
            store,
        }
    }
}

#[cfg(feature = "test-utils")]
pub use test_utils::create_router_for_testing;
