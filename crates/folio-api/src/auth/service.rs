//! Session management
//!
//! Business logic for registration, login, token refresh, logout and
//! current-user lookup. Each successful authentication yields one access
//! token and one persisted refresh token; a refresh token can be
//! exchanged exactly once.

use super::jwt::{JwtError, TokenCodec};
use super::password::{CredentialHasher, PasswordError};
use crate::audit::{audit_log, AuditEvent};
use chrono::{DateTime, Utc};
use folio_core::{
    AuthStore, DuplicateField, NewRefreshToken, NewUser, StoreError, TokenPayload, TokenStore,
    UserPublic, UserRole,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Same message for unknown email and wrong password
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(min = 3, max = 100, message = "Username must be 3-100 characters"))]
    pub username: String,

    /// Requested role; defaults to reader. Only reader and author may self-register.
    #[validate(custom(function = "validate_self_assignable_role"))]
    pub role: Option<UserRole>,
}

fn validate_self_assignable_role(role: &UserRole) -> Result<(), ValidationError> {
    match role {
        UserRole::Reader | UserRole::Author => Ok(()),
        UserRole::Guest | UserRole::Admin => {
            let mut err = ValidationError::new("role");
            err.message = Some(format!("Role '{role}' cannot be self-assigned").into());
            Err(err)
        }
    }
}

/// User login request
///
/// Not validated beyond shape: any failure here is reported as bad credentials.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token pair issued by a refresh, plus the account it was issued to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedSession {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}

/// Result of a successful register or login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: UserPublic,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    EmailExists,
    UsernameExists,
}

impl ConflictReason {
    pub fn message(&self) -> &'static str {
        match self {
            ConflictReason::EmailExists => "Email already registered",
            ConflictReason::UsernameExists => "Username already taken",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    InvalidCredentials,
    InvalidToken,
    TokenExpired,
    UserNotFound,
}

impl UnauthorizedReason {
    pub fn message(&self) -> &'static str {
        match self {
            UnauthorizedReason::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE,
            UnauthorizedReason::InvalidToken => "Invalid or revoked refresh token",
            UnauthorizedReason::TokenExpired => "Refresh token has expired",
            UnauthorizedReason::UserNotFound => "User not found",
        }
    }
}

/// Session manager errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Conflict: {}", .0.message())]
    Conflict(ConflictReason),

    #[error("Unauthorized: {}", .0.message())]
    Unauthorized(UnauthorizedReason),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(DuplicateField::Email) => {
                SessionError::Conflict(ConflictReason::EmailExists)
            }
            StoreError::Duplicate(DuplicateField::Username) => {
                SessionError::Conflict(ConflictReason::UsernameExists)
            }
            other => SessionError::Store(other),
        }
    }
}

impl From<JwtError> for SessionError {
    fn from(err: JwtError) -> Self {
        SessionError::Internal(format!("token issuance failed: {err}"))
    }
}

impl From<PasswordError> for SessionError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::EmptyPassword => SessionError::Validation(err.to_string()),
            other => SessionError::Internal(other.to_string()),
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Session manager
///
/// Stateless apart from the shared store; safe to share across tasks.
pub struct SessionManager {
    store: Arc<dyn AuthStore>,
    codec: Arc<TokenCodec>,
    hasher: CredentialHasher,
}

impl SessionManager {
    pub fn new(store: Arc<dyn AuthStore>, codec: Arc<TokenCodec>, hasher: CredentialHasher) -> Self {
        Self {
            store,
            codec,
            hasher,
        }
    }

    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    /// Register a new user
    ///
    /// # Arguments
    ///
    /// * `request` - Registration details; `role` defaults to reader
    ///
    /// # Returns
    ///
    /// * `Ok(AuthSession)` - Created user with a fresh token pair
    /// * `Err(SessionError::Conflict)` - Email or username already in use
    /// * `Err(SessionError::Validation)` - Malformed input or non-assignable role
    pub async fn register(&self, request: RegisterRequest) -> SessionResult<AuthSession> {
        request
            .validate()
            .map_err(|e| SessionError::Validation(e.to_string()))?;

        let role = request.role.unwrap_or_default();

        if self.store.exists_by_email(&request.email).await? {
            return Err(SessionError::Conflict(ConflictReason::EmailExists));
        }
        if self.store.exists_by_username(&request.username).await? {
            return Err(SessionError::Conflict(ConflictReason::UsernameExists));
        }

        let password_hash = self.hash_password(request.password).await?;
        let new_user = NewUser::new(request.email, request.username, password_hash, role);

        let payload = new_user.token_payload();
        let tokens = self.issue_pair(&payload)?;
        let record = self.refresh_record(payload.user_id, &tokens.refresh_token);

        // Races past the exists checks surface here as Duplicate -> Conflict
        let user = self.store.create_account(new_user, record).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");

        Ok(AuthSession {
            user: user.to_public(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    /// Existing sessions of the user are left untouched.
    pub async fn login(&self, email: &str, password: &str) -> SessionResult<AuthSession> {
        let user = match self.store.find_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::debug!("Login for unknown email");
                return Err(SessionError::Unauthorized(
                    UnauthorizedReason::InvalidCredentials,
                ));
            }
        };

        if !self
            .verify_password(password.to_string(), user.password_hash.clone())
            .await?
        {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(SessionError::Unauthorized(
                UnauthorizedReason::InvalidCredentials,
            ));
        }

        let payload = user.token_payload();
        let tokens = self.issue_pair(&payload)?;
        let record = self.refresh_record(user.id, &tokens.refresh_token);
        TokenStore::create(self.store.as_ref(), record).await?;

        Ok(AuthSession {
            user: user.to_public(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    /// Exchange a refresh token for a new token pair
    ///
    /// The presented token is revoked in the same atomic step that stores
    /// its replacement. Of concurrent presentations of one token, one wins
    /// and the rest get `InvalidToken`.
    pub async fn refresh(&self, refresh_token: &str) -> SessionResult<RotatedSession> {
        let record = self
            .store
            .find_active(refresh_token)
            .await?
            .ok_or(SessionError::Unauthorized(UnauthorizedReason::InvalidToken))?;

        if record.is_expired_at(Utc::now()) {
            return Err(SessionError::Unauthorized(UnauthorizedReason::TokenExpired));
        }

        let payload = self
            .codec
            .verify_refresh(refresh_token)
            .map_err(|e| match e {
                JwtError::Expired => SessionError::Unauthorized(UnauthorizedReason::TokenExpired),
                _ => SessionError::Unauthorized(UnauthorizedReason::InvalidToken),
            })?;

        if payload.user_id != record.user_id {
            tracing::warn!(
                record_owner = %record.user_id,
                claimed = %payload.user_id,
                "Refresh token subject does not match stored owner"
            );
            return Err(SessionError::Unauthorized(UnauthorizedReason::InvalidToken));
        }

        let tokens = self.issue_pair(&payload)?;
        let replacement = self.refresh_record(record.user_id, &tokens.refresh_token);

        match self.store.rotate(refresh_token, replacement).await? {
            Some(_) => Ok(RotatedSession {
                user_id: record.user_id,
                tokens,
            }),
            None => Err(SessionError::Unauthorized(UnauthorizedReason::InvalidToken)),
        }
    }

    /// Revoke a refresh token
    ///
    /// Never fails: unknown tokens and store errors are logged only.
    pub async fn logout(&self, refresh_token: &str) {
        match self.store.revoke(refresh_token).await {
            Ok(true) => tracing::debug!("Refresh token revoked"),
            Ok(false) => tracing::debug!("Logout with unknown refresh token"),
            Err(e) => tracing::warn!("Failed to revoke refresh token on logout: {}", e),
        }
    }

    /// Fetch the public profile of an authenticated user
    pub async fn current_user(&self, user_id: Uuid) -> SessionResult<UserPublic> {
        self.store
            .find_by_id(user_id)
            .await?
            .map(UserPublic::from)
            .ok_or(SessionError::Unauthorized(UnauthorizedReason::UserNotFound))
    }

    /// Revoke every refresh token of a user ("log out everywhere")
    ///
    /// Access tokens already issued stay valid until they expire.
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> SessionResult<u64> {
        let revoked = self.store.revoke_all(user_id).await?;
        audit_log(&AuditEvent::SessionsRevoked { user_id, revoked });
        Ok(revoked)
    }

    /// Delete expired refresh tokens
    pub async fn purge_expired_tokens(&self) -> SessionResult<u64> {
        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired refresh tokens");
        }
        Ok(purged)
    }

    fn issue_pair(&self, payload: &TokenPayload) -> SessionResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.codec.issue_access(payload)?,
            refresh_token: self.codec.issue_refresh(payload)?,
        })
    }

    fn refresh_record(&self, user_id: Uuid, token: &str) -> NewRefreshToken {
        NewRefreshToken {
            user_id,
            token: token.to_string(),
            expires_at: self.refresh_expiry(Utc::now()),
        }
    }

    fn refresh_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.codec.refresh_lifetime())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    async fn hash_password(&self, password: String) -> SessionResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| SessionError::Internal(format!("hashing task failed: {e}")))?
            .map_err(SessionError::from)
    }

    async fn verify_password(&self, password: String, hash: String) -> SessionResult<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| SessionError::Internal(format!("verification task failed: {e}")))
    }
}
