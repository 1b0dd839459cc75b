//! JWT token generation and validation
//!
//! Two HMAC-SHA256 signing contexts share one claim layout: a short-lived
//! access context and a long-lived refresh context, each with its own secret.
//! The `typ` claim pins a token to the context that issued it.

use chrono::{Duration, Utc};
use folio_core::config::MAX_TOKEN_LIFETIME_SECS;
use folio_core::{AuthConfig, TokenPayload, UserRole};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Which signing context a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - keeps tokens issued in the same second distinct
    pub jti: String,
    pub typ: TokenKind,
    /// Issued at timestamp (Unix epoch)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch)
    pub exp: i64,
    pub email: String,
    pub role: UserRole,
}

/// JWT errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Failed to encode JWT: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token configuration: {0}")]
    Configuration(String),
}

struct SigningContext {
    kind: TokenKind,
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: u64,
}

impl SigningContext {
    fn new(kind: TokenKind, secret: &str, lifetime_secs: u64) -> Self {
        Self {
            kind,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_secs,
        }
    }
}

/// Issues and verifies signed access and refresh tokens
pub struct TokenCodec {
    issuer: String,
    access: SigningContext,
    refresh: SigningContext,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("access_lifetime_secs", &self.access.lifetime_secs)
            .field("refresh_lifetime_secs", &self.refresh.lifetime_secs)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build both signing contexts from auth configuration
    ///
    /// # Returns
    ///
    /// * `Err(JwtError::Configuration)` - a secret is empty or a lifetime is
    ///   out of range (refresh above `MAX_TOKEN_LIFETIME_SECS`, access not at
    ///   least ten times shorter than refresh)
    pub fn new(config: &AuthConfig) -> Result<Self, JwtError> {
        if config.access_secret.is_empty() || config.refresh_secret.is_empty() {
            return Err(JwtError::Configuration(
                "signing secrets must not be empty".to_string(),
            ));
        }
        if config.access_lifetime_secs == 0 {
            return Err(JwtError::Configuration(
                "access token lifetime must be positive".to_string(),
            ));
        }
        if config.refresh_lifetime_secs > MAX_TOKEN_LIFETIME_SECS {
            return Err(JwtError::Configuration(format!(
                "refresh lifetime {}s exceeds the {}s maximum",
                config.refresh_lifetime_secs, MAX_TOKEN_LIFETIME_SECS
            )));
        }
        if config.access_lifetime_secs.saturating_mul(10) > config.refresh_lifetime_secs {
            return Err(JwtError::Configuration(format!(
                "access lifetime {}s must be at most a tenth of refresh lifetime {}s",
                config.access_lifetime_secs, config.refresh_lifetime_secs
            )));
        }

        Ok(Self {
            issuer: config.issuer.clone(),
            access: SigningContext::new(
                TokenKind::Access,
                &config.access_secret,
                config.access_lifetime_secs,
            ),
            refresh: SigningContext::new(
                TokenKind::Refresh,
                &config.refresh_secret,
                config.refresh_lifetime_secs,
            ),
        })
    }

    pub fn access_lifetime_secs(&self) -> u64 {
        self.access.lifetime_secs
    }

    /// Lifetime used for persisted refresh token expiry
    pub fn refresh_lifetime(&self) -> Duration {
        i64::try_from(self.refresh.lifetime_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    pub fn issue_access(&self, payload: &TokenPayload) -> Result<String, JwtError> {
        self.issue(&self.access, payload)
    }

    pub fn issue_refresh(&self, payload: &TokenPayload) -> Result<String, JwtError> {
        self.issue(&self.refresh, payload)
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenPayload, JwtError> {
        self.verify(&self.access, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenPayload, JwtError> {
        self.verify(&self.refresh, token)
    }

    fn issue(&self, ctx: &SigningContext, payload: &TokenPayload) -> Result<String, JwtError> {
        let now = Utc::now().timestamp();
        let lifetime = i64::try_from(ctx.lifetime_secs)
            .map_err(|_| JwtError::Configuration("token lifetime overflows".to_string()))?;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: payload.user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            typ: ctx.kind,
            iat: now,
            exp: now.saturating_add(lifetime),
            email: payload.email.clone(),
            role: payload.role,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &ctx.encoding)?)
    }

    fn verify(&self, ctx: &SigningContext, token: &str) -> Result<TokenPayload, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &ctx.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid,
            }
        })?;

        let claims = data.claims;
        if claims.typ != ctx.kind {
            return Err(JwtError::Invalid);
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| JwtError::Invalid)?;

        Ok(TokenPayload {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}
