//! Identity models for authentication and authorization
//!
//! This module defines the core data structures for the auth system:
//! - UserRole / RoleSet: the closed role enumeration and sets of roles
//! - User: persisted identity record
//! - RefreshToken: persisted, revocable session credential
//! - TokenPayload: claims carried inside signed tokens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// User role enum
///
/// - Guest: no user record (anonymous); never stored
/// - Reader: can read, comment and keep collections
/// - Author: can additionally publish books and chapters
/// - Admin: moderation and user management
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Guest,
    #[default]
    #[serde(alias = "user")]
    Reader,
    Author,
    Admin,
}

impl UserRole {
    /// Every role, in ascending privilege order
    pub const ALL: [UserRole; 4] = [
        UserRole::Guest,
        UserRole::Reader,
        UserRole::Author,
        UserRole::Admin,
    ];

    /// Convert role to string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            UserRole::Guest => "guest",
            UserRole::Reader => "reader",
            UserRole::Author => "author",
            UserRole::Admin => "admin",
        }
    }

    /// Whether a user record may carry this role
    pub const fn is_storable(&self) -> bool {
        !matches!(self, UserRole::Guest)
    }

    const fn bit(self) -> u8 {
        match self {
            UserRole::Guest => 1 << 0,
            UserRole::Reader => 1 << 1,
            UserRole::Author => 1 << 2,
            UserRole::Admin => 1 << 3,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for UserRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guest" => Ok(UserRole::Guest),
            // "user" is the legacy name of the reader role
            "reader" | "user" => Ok(UserRole::Reader),
            "author" => Ok(UserRole::Author),
            "admin" => Ok(UserRole::Admin),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// A set of roles, used by role guards
///
/// ```
/// use folio_core::{RoleSet, UserRole};
///
/// const WRITERS: RoleSet = RoleSet::of(&[UserRole::Author, UserRole::Admin]);
/// assert!(WRITERS.contains(UserRole::Author));
/// assert!(!WRITERS.contains(UserRole::Reader));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    /// Build a set from a slice of roles
    pub const fn of(roles: &[UserRole]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < roles.len() {
            bits |= roles[i].bit();
            i += 1;
        }
        RoleSet(bits)
    }

    /// Return a copy of the set with `role` added
    pub const fn with(self, role: UserRole) -> Self {
        RoleSet(self.0 | role.bit())
    }

    pub const fn contains(self, role: UserRole) -> bool {
        self.0 & role.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over members in ascending privilege order
    pub fn iter(self) -> impl Iterator<Item = UserRole> {
        UserRole::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl From<&[UserRole]> for RoleSet {
    fn from(roles: &[UserRole]) -> Self {
        RoleSet::of(roles)
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|r| r.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// User account model
///
/// This maps to the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,

    /// User's email address (unique, used for login)
    pub email: String,

    /// User's public handle (unique)
    pub username: String,

    /// Hashed password (Argon2id PHC string)
    /// This field is never serialized in API responses
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: UserRole,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Convert user to public representation (without the password hash)
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Claims to embed in tokens issued for this user
    pub fn token_payload(&self) -> TokenPayload {
        TokenPayload {
            user_id: self.id,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// A user record about to be inserted
///
/// The id is assigned up front so that tokens can be issued before the
/// record is persisted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

impl NewUser {
    pub fn new(email: String, username: String, password_hash: String, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            password_hash,
            role,
        }
    }

    pub fn token_payload(&self) -> TokenPayload {
        TokenPayload {
            user_id: self.id,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Refresh token model
///
/// The signed refresh token is stored verbatim: it is both the bearer value
/// and the lookup key. This maps to the `refresh_tokens` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,

    /// Owner of the session
    pub user_id: Uuid,

    /// Signed token string (globally unique)
    pub token: String,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    /// Only ever moves from false to true
    pub revoked: bool,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Check if the token is usable at `now` (not expired and not revoked)
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

/// A refresh token about to be persisted
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims payload carried inside access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            username: "tester".to_string(),
            password_hash: "secret_hash".to_string(),
            role: UserRole::Author,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_user_role_conversion() {
        assert_eq!(UserRole::Admin.as_str(), "admin");
        assert_eq!(UserRole::Reader.to_string(), "reader");

        assert_eq!("author".parse::<UserRole>(), Ok(UserRole::Author));
        assert_eq!("ADMIN".parse::<UserRole>(), Ok(UserRole::Admin));
        assert_eq!("user".parse::<UserRole>(), Ok(UserRole::Reader));
        assert!("superuser".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_user_role_serde() {
        assert_eq!(serde_json::to_string(&UserRole::Reader).unwrap(), "\"reader\"");
        let legacy: UserRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(legacy, UserRole::Reader);
        assert_eq!(UserRole::default(), UserRole::Reader);
    }

    #[test]
    fn test_guest_is_not_storable() {
        assert!(!UserRole::Guest.is_storable());
        assert!(UserRole::Reader.is_storable());
        assert!(UserRole::Admin.is_storable());
    }

    #[test]
    fn test_role_set_membership() {
        let set = RoleSet::of(&[UserRole::Author, UserRole::Admin]);
        assert!(set.contains(UserRole::Author));
        assert!(set.contains(UserRole::Admin));
        assert!(!set.contains(UserRole::Reader));
        assert!(!set.contains(UserRole::Guest));

        let widened = set.with(UserRole::Reader);
        assert!(widened.contains(UserRole::Reader));
        assert_eq!(widened.to_string(), "reader,author,admin");

        assert!(RoleSet::EMPTY.is_empty());
        assert!(!RoleSet::EMPTY.contains(UserRole::Admin));
    }

    #[test]
    fn test_user_to_public_strips_hash() {
        let user = sample_user();
        let public = user.to_public();

        assert_eq!(public.email, user.email);
        assert_eq!(public.username, user.username);
        assert_eq!(public.role, user.role);

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret_hash"));
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_token_payload_matches_user() {
        let user = sample_user();
        let payload = user.token_payload();
        assert_eq!(payload.user_id, user.id);
        assert_eq!(payload.email, user.email);
        assert_eq!(payload.role, UserRole::Author);
    }

    #[test]
    fn test_refresh_token_activity() {
        let now = Utc::now();
        let mut token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: "t".to_string(),
            expires_at: now + Duration::days(7),
            created_at: now,
            revoked: false,
        };

        assert!(token.is_active_at(now));

        token.expires_at = now - Duration::seconds(1);
        assert!(token.is_expired_at(now));
        assert!(!token.is_active_at(now));

        token.expires_at = now + Duration::days(7);
        token.revoked = true;
        assert!(!token.is_active_at(now));
    }
}
