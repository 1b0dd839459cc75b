//! Identity resolution and authorization guards
//!
//! `identity_middleware` runs on every request: it verifies a presented
//! bearer token and records the caller's `Identity` in the request
//! extensions, never rejecting. `require_auth` and `require_roles` are
//! route layers that reject on that recorded identity.
use super::jwt::{JwtError, TokenCodec};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use folio_core::{RoleSet, TokenPayload, UserRole};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Authenticated user information extracted from an access token
///
/// Inserted into request extensions by `require_auth`; handlers extract it
/// with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl From<TokenPayload> for AuthenticatedUser {
    fn from(payload: TokenPayload) -> Self {
        Self {
            user_id: payload.user_id,
            email: payload.email,
            role: payload.role,
        }
    }
}

/// Who is making the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    Identified(AuthenticatedUser),
    #[default]
    Anonymous,
}

impl Identity {
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Identity::Identified(user) => Some(user),
            Identity::Anonymous => None,
        }
    }

    /// Effective role; anonymous callers are guests
    pub fn role(&self) -> UserRole {
        self.user().map_or(UserRole::Guest, |u| u.role)
    }
}

/// Guard rejections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden { required: RoleSet },
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// Require an identified caller
pub fn require_authenticated(
    identity: Option<&Identity>,
) -> Result<&AuthenticatedUser, GuardError> {
    identity
        .and_then(Identity::user)
        .ok_or(GuardError::Unauthorized)
}

/// Require an identified caller whose role is in `allowed`
///
/// The authentication check runs first, so an anonymous caller gets
/// `Unauthorized` even when `allowed` is empty. Admin is not implied.
pub fn require_role(
    identity: Option<&Identity>,
    allowed: RoleSet,
) -> Result<&AuthenticatedUser, GuardError> {
    let user = require_authenticated(identity)?;
    if allowed.contains(user.role) {
        Ok(user)
    } else {
        Err(GuardError::Forbidden { required: allowed })
    }
}

/// Extract the bearer token from an Authorization header value
fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller's identity from the Authorization header
///
/// Missing, malformed, invalid and expired tokens all yield `Anonymous`;
/// a presented token that fails verification is audited.
pub async fn identity_middleware(
    State(codec): State<Arc<TokenCodec>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let identity = match bearer_token(&request) {
        None => Identity::Anonymous,
        Some(token) => match codec.verify_access(token) {
            Ok(payload) => Identity::Identified(payload.into()),
            Err(e) => {
                let reason = match e {
                    JwtError::Expired => "expired",
                    _ => "invalid",
                };
                audit_log(&AuditEvent::InvalidToken {
                    reason: reason.to_string(),
                    client: ClientInfo::from_headers(request.headers()),
                });
                Identity::Anonymous
            }
        },
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Route layer rejecting anonymous callers with 401
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use folio_api::auth::middleware::require_auth;
///
/// let app = Router::new()
///     .route("/me", get(me_handler))
///     .route_layer(middleware::from_fn(require_auth));
/// ```
pub async fn require_auth(mut request: Request<Body>, next: Next) -> Result<Response, GuardError> {
    let user = require_authenticated(request.extensions().get::<Identity>())?.clone();
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, GuardError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Anonymous callers get 401, identified callers outside `allowed` get 403.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, routing::post, Router};
/// use folio_api::auth::middleware::require_roles;
/// use folio_core::UserRole;
///
/// let app = Router::new()
///     .route("/books", post(create_book))
///     .route_layer(middleware::from_fn(require_roles(&[UserRole::Author, UserRole::Admin])));
/// ```
pub fn require_roles(
    allowed: &'static [UserRole],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    let allowed = RoleSet::of(allowed);
    move |mut request: Request<Body>, next: Next| {
        Box::pin(async move {
            let identity = request.extensions().get::<Identity>();
            let user = match require_role(identity, allowed) {
                Ok(user) => user.clone(),
                Err(err) => {
                    if let GuardError::Forbidden { required } = &err {
                        let user = identity.and_then(Identity::user);
                        audit_log(&AuditEvent::AccessDenied {
                            user_id: user.map(|u| u.user_id),
                            role: user.map(|u| u.role.to_string()),
                            resource: request.uri().path().to_string(),
                            required_roles: Some(required.to_string()),
                            client: ClientInfo::from_headers(request.headers()),
                        });
                    }
                    return Err(err);
                }
            };

            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identified(role: UserRole) -> Identity {
        Identity::Identified(AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            role,
        })
    }

    #[test]
    fn test_require_authenticated() {
        let identity = identified(UserRole::Reader);
        assert!(require_authenticated(Some(&identity)).is_ok());
        assert_eq!(
            require_authenticated(Some(&Identity::Anonymous)),
            Err(GuardError::Unauthorized)
        );
        assert_eq!(require_authenticated(None), Err(GuardError::Unauthorized));
    }

    #[test]
    fn test_require_role_membership() {
        let writers = RoleSet::of(&[UserRole::Author, UserRole::Admin]);

        assert!(require_role(Some(&identified(UserRole::Author)), writers).is_ok());
        assert!(require_role(Some(&identified(UserRole::Admin)), writers).is_ok());
        assert_eq!(
            require_role(Some(&identified(UserRole::Reader)), writers),
            Err(GuardError::Forbidden { required: writers })
        );
    }

    #[test]
    fn test_admin_has_no_implicit_bypass() {
        let authors = RoleSet::of(&[UserRole::Author]);
        assert!(matches!(
            require_role(Some(&identified(UserRole::Admin)), authors),
            Err(GuardError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_anonymous_is_unauthorized_before_role_check() {
        assert_eq!(
            require_role(Some(&Identity::Anonymous), RoleSet::EMPTY),
            Err(GuardError::Unauthorized)
        );
        // Even a set containing guest requires authentication
        assert_eq!(
            require_role(None, RoleSet::of(&[UserRole::Guest])),
            Err(GuardError::Unauthorized)
        );
    }

    #[test]
    fn test_identity_role() {
        assert_eq!(Identity::Anonymous.role(), UserRole::Guest);
        assert_eq!(identified(UserRole::Author).role(), UserRole::Author);
        assert_eq!(Identity::default(), Identity::Anonymous);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc.def.ghi"));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}
