//! Storage traits for identity records and refresh tokens
//!
//! `UserDirectory` and `TokenStore` are the two capabilities the session
//! layer consumes. `AuthStore` combines them with the one operation that
//! spans both tables (account creation). `PgAuthStore` implements all three
//! on PostgreSQL.

use crate::models::{NewRefreshToken, NewUser, RefreshToken, User, UserRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Which uniqueness constraint a write violated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Email,
    Username,
    Token,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate value for {0:?}")]
    Duplicate(DuplicateField),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Role {0:?} cannot be stored on a user")]
    UnstorableRole(UserRole),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Reject a new user whose role never belongs on a stored record
pub(crate) fn check_storable(user: &NewUser) -> StoreResult<()> {
    if user.role.is_storable() {
        Ok(())
    } else {
        Err(StoreError::UnstorableRole(user.role))
    }
}

/// Lookup and creation of user identity records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    async fn exists_by_username(&self, username: &str) -> StoreResult<bool> {
        Ok(self.find_by_username(username).await?.is_some())
    }

    /// Insert a user; duplicate email or username yields `StoreError::Duplicate`
    /// and a `Guest` role yields `StoreError::UnstorableRole`
    async fn create(&self, user: NewUser) -> StoreResult<User>;
}

/// Persistent record of issued refresh tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new, unrevoked token
    async fn create(&self, token: NewRefreshToken) -> StoreResult<RefreshToken>;

    /// Return the token only if it exists and is not revoked.
    /// Expiry is not checked here.
    async fn find_active(&self, token: &str) -> StoreResult<Option<RefreshToken>>;

    /// Mark a token revoked; returns whether a row matched
    async fn revoke(&self, token: &str) -> StoreResult<bool>;

    /// Revoke every token of a user; returns the number newly revoked
    async fn revoke_all(&self, user_id: Uuid) -> StoreResult<u64>;

    /// Delete tokens whose expiry has passed
    async fn purge_expired(&self) -> StoreResult<u64>;

    /// Atomically insert `replacement` and revoke `old`.
    ///
    /// Returns `None` without writing anything when `old` is no longer
    /// active, so at most one caller can rotate a given token.
    async fn rotate(
        &self,
        old: &str,
        replacement: NewRefreshToken,
    ) -> StoreResult<Option<RefreshToken>>;
}

/// Combined store used by the session layer
#[async_trait]
pub trait AuthStore: UserDirectory + TokenStore {
    /// Insert a user together with its first refresh token, all or nothing
    async fn create_account(&self, user: NewUser, token: NewRefreshToken) -> StoreResult<User>;

    /// Check that the backing storage is reachable
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Schema for the auth tables, applied by `PgAuthStore::migrate`
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            UUID PRIMARY KEY,
    email         TEXT NOT NULL,
    username      TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT users_email_key UNIQUE (email),
    CONSTRAINT users_username_key UNIQUE (username)
);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id         UUID PRIMARY KEY,
    user_id    UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token      TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    revoked    BOOLEAN NOT NULL DEFAULT FALSE,
    CONSTRAINT refresh_tokens_token_key UNIQUE (token)
);

CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires_at ON refresh_tokens (expires_at);
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user_id ON refresh_tokens (user_id);
"#;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: UserRole = row
            .role
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("user {}: {e}", row.id)))?;

        Ok(User {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    revoked: bool,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            expires_at: row.expires_at,
            created_at: row.created_at,
            revoked: row.revoked,
        }
    }
}

const USER_COLUMNS: &str = "id, email, username, password_hash, role, created_at, updated_at";

const INSERT_USER: &str = r#"
    INSERT INTO users (id, email, username, password_hash, role, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
    RETURNING id, email, username, password_hash, role, created_at, updated_at
"#;

const INSERT_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (id, user_id, token, expires_at, created_at, revoked)
    VALUES ($1, $2, $3, $4, NOW(), FALSE)
    RETURNING id, user_id, token, expires_at, created_at, revoked
"#;

/// Map an sqlx error, recognising unique violations by constraint name
fn map_db_error(context: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_email_key") => Some(DuplicateField::Email),
                Some("users_username_key") => Some(DuplicateField::Username),
                Some("refresh_tokens_token_key") => Some(DuplicateField::Token),
                _ => None,
            };
            if let Some(field) = field {
                return StoreError::Duplicate(field);
            }
        }
    }
    StoreError::Database(format!("{context}: {err}"))
}

/// PostgreSQL-backed user directory and token store
#[derive(Debug, Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `url`
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_db_error("Failed to connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the auth tables if they do not exist
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to apply schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_user_where(&self, column: &str, value: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to fetch user", e))?;

        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserDirectory for PgAuthStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find_user_where("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.find_user_where("username", username).await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to fetch user", e))?;

        row.map(User::try_from).transpose()
    }

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to check email", e))
    }

    async fn exists_by_username(&self, username: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to check username", e))
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        check_storable(&user)?;
        let row = sqlx::query_as::<_, UserRow>(INSERT_USER)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to create user", e))?;

        User::try_from(row)
    }
}

#[async_trait]
impl TokenStore for PgAuthStore {
    async fn create(&self, token: NewRefreshToken) -> StoreResult<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(INSERT_TOKEN)
            .bind(Uuid::new_v4())
            .bind(token.user_id)
            .bind(&token.token)
            .bind(token.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to store refresh token", e))?;

        Ok(row.into())
    }

    async fn find_active(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT id, user_id, token, expires_at, created_at, revoked FROM refresh_tokens WHERE token = $1 AND revoked = FALSE",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to fetch refresh token", e))?;

        Ok(row.map(RefreshToken::from))
    }

    async fn revoke(&self, token: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to revoke refresh token", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to revoke user tokens", e))?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to purge expired tokens", e))?;

        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        old: &str,
        replacement: NewRefreshToken,
    ) -> StoreResult<Option<RefreshToken>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("Failed to begin transaction", e))?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1 AND revoked = FALSE",
        )
        .bind(old)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error("Failed to revoke refresh token", e))?;

        if revoked.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_db_error("Failed to roll back", e))?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, RefreshTokenRow>(INSERT_TOKEN)
            .bind(Uuid::new_v4())
            .bind(replacement.user_id)
            .bind(&replacement.token)
            .bind(replacement.expires_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_db_error("Failed to store refresh token", e))?;

        tx.commit()
            .await
            .map_err(|e| map_db_error("Failed to commit rotation", e))?;

        Ok(Some(row.into()))
    }
}

#[async_trait]
impl AuthStore for PgAuthStore {
    async fn create_account(&self, user: NewUser, token: NewRefreshToken) -> StoreResult<User> {
        check_storable(&user)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("Failed to begin transaction", e))?;

        let row = sqlx::query_as::<_, UserRow>(INSERT_USER)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_db_error("Failed to create user", e))?;

        sqlx::query(INSERT_TOKEN)
            .bind(Uuid::new_v4())
            .bind(token.user_id)
            .bind(&token.token)
            .bind(token.expires_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error("Failed to store refresh token", e))?;

        tx.commit()
            .await
            .map_err(|e| map_db_error("Failed to commit account", e))?;

        User::try_from(row)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Database unreachable", e))?;
        Ok(())
    }
}
