//! Authentication and authorization module
//!
//! - Token issuance and verification (two HS256 signing contexts)
//! - Password hashing with Argon2id
//! - Session management over the auth store
//! - Identity resolution and role guards for routes

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use jwt::{JwtError, TokenCodec};
pub use middleware::{
    identity_middleware, require_auth, require_authenticated, require_role, require_roles,
    AuthenticatedUser, GuardError, Identity,
};
pub use password::{CredentialHasher, PasswordError};
pub use service::{
    AuthSession, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, RotatedSession,
    SessionError, SessionManager, TokenPair,
};
