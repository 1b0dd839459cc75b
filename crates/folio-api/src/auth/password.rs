//! Password hashing and verification using Argon2id
//!
//! Hashes are PHC strings carrying algorithm, parameters and salt, so a
//! stored hash stays verifiable after the configured cost changes.
//! Both operations are CPU-bound; async callers run them on the blocking pool.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use folio_core::config::HashingConfig;
use thiserror::Error;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Invalid hashing parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to hash password: {0}")]
    HashingFailed(String),
}

/// Salted, adaptive one-way password hasher
///
/// Cost parameters are fixed at construction.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Build a hasher from configured Argon2 costs
    ///
    /// # Arguments
    ///
    /// * `config` - memory cost (KiB), time cost and parallelism
    ///
    /// # Returns
    ///
    /// * `Err(PasswordError::InvalidParameters)` if argon2 rejects the costs
    pub fn new(config: &HashingConfig) -> Result<Self, PasswordError> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            Some(32),
        )
        .map_err(|e| PasswordError::InvalidParameters(e.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password with a fresh random salt
    ///
    /// The same input hashed twice yields different strings.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::EmptyPassword);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Check a plaintext password against a stored hash
    ///
    /// A malformed hash verifies as `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Stored password hash is malformed: {}", e);
                return false;
            }
        };

        // Parameters come from the PHC string, not from self
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
