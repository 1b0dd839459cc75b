//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::middleware::require_auth;
use crate::handlers::auth;
use crate::middleware::no_store_middleware;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Routes nested under `/api/auth`
pub fn auth_routes() -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/register", post(auth::register_handler))
        .route("/login", post(auth::login_handler))
        .route("/refresh", post(auth::refresh_handler))
        .route("/logout", post(auth::logout_handler));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/me", get(auth::me_handler))
        .route_layer(middleware::from_fn(require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(no_store_middleware))
}

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/auth", auth_routes())
}
