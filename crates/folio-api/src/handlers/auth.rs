//! Authentication API handlers
//!
//! Author: hephaex@gmail.com

use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::auth::middleware::AuthenticatedUser;
use crate::auth::service::{
    LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, RotatedSession, SessionError,
};
use crate::error::{ApiResponse, AppError};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use folio_core::UserPublic;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Current user response data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserPublic,
}

/// Register a new user account
///
/// New users are readers unless `author` is requested. The response is
/// wrapped in the `{success, message, data}` envelope.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = crate::auth::service::AuthSession),
        (status = 409, description = "Email or username already in use", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let email = request.email.clone();
    let client = ClientInfo::from_headers(&headers);

    let session = match state.sessions.register(request).await {
        Ok(session) => session,
        Err(e) => {
            audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: e.to_string(),
                client,
            });
            return Err(e.into());
        }
    };

    audit_log(&AuditEvent::RegistrationSuccess {
        user_id: session.user.id,
        email: session.user.email.clone(),
        role: session.user.role.to_string(),
        client,
    });

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User registered successfully", session)),
    ))
}

/// Login with email and password
///
/// Unknown email and wrong password produce the same 401 response.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = crate::auth::service::AuthSession),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let client = ClientInfo::from_headers(&headers);

    match state.sessions.login(&request.email, &request.password).await {
        Ok(session) => {
            audit_log(&AuditEvent::LoginSuccess {
                user_id: session.user.id,
                email: session.user.email.clone(),
                client,
            });
            Ok(Json(ApiResponse::ok("Login successful", session)))
        }
        Err(e) => {
            audit_log(&AuditEvent::LoginFailure {
                email: request.email,
                reason: e.to_string(),
                client,
            });
            Err(e.into())
        }
    }
}

/// Exchange a refresh token for a new token pair
///
/// The presented refresh token is revoked; reusing it fails with 401.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = crate::auth::service::TokenPair),
        (status = 401, description = "Invalid, revoked or expired refresh token", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let client = ClientInfo::from_headers(&headers);

    let result: Result<RotatedSession, SessionError> =
        state.sessions.refresh(&request.refresh_token).await;

    match result {
        Ok(RotatedSession { user_id, tokens }) => {
            audit_log(&AuditEvent::TokenRefresh { user_id, client });
            Ok(Json(ApiResponse::ok("Token refreshed successfully", tokens)))
        }
        Err(e) => {
            audit_log(&AuditEvent::RefreshRejected {
                reason: e.to_string(),
                client,
            });
            Err(e.into())
        }
    }
}

/// Revoke a refresh token
///
/// Always succeeds, whether or not the token was known.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logout successful"),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;

    state.sessions.logout(&request.refresh_token).await;
    audit_log(&AuditEvent::Logout {
        client: ClientInfo::from_headers(&headers),
    });

    Ok(Json(ApiResponse::message("Logout successful")))
}

/// Get the authenticated user's profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = MeResponse),
        (status = 401, description = "Missing or invalid access token, or user no longer exists", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.sessions.current_user(user.user_id).await?;

    Ok(Json(ApiResponse::ok(
        "User retrieved successfully",
        MeResponse { user: profile },
    )))
}
