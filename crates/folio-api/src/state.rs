//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::jwt::TokenCodec;
use crate::auth::password::CredentialHasher;
use crate::auth::service::SessionManager;
use axum::http::StatusCode;
use folio_core::config::AppConfig;
use folio_core::AuthStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Error building application state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Jwt(#[from] crate::auth::jwt::JwtError),

    #[error(transparent)]
    Password(#[from] crate::auth::password::PasswordError),
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    pub sessions: Arc<SessionManager>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Responses with 4xx status
    pub client_errors: AtomicU64,
    /// Responses with 5xx status
    pub server_errors: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Build state over a store, deriving codec and hasher from config
    pub fn new(config: AppConfig, store: Arc<dyn AuthStore>) -> Result<Self, StateError> {
        let codec = Arc::new(TokenCodec::new(&config.auth)?);
        let hasher = CredentialHasher::new(&config.auth.hashing)?;
        let sessions = Arc::new(SessionManager::new(store, codec, hasher));

        Ok(Self {
            config,
            sessions,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        })
    }

    pub fn codec(&self) -> Arc<TokenCodec> {
        Arc::clone(self.sessions.codec())
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn record_status(&self, status: StatusCode) {
        if status.is_client_error() {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else if status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
