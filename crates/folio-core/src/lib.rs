//! Folio Core - Domain models, configuration and storage traits
//!
//! This crate defines the abstractions shared by the Folio services:
//! - Identity models (users, roles, refresh tokens, token payloads)
//! - Configuration management
//! - Storage traits for the user directory and the refresh-token store
//! - PostgreSQL and in-memory store implementations

pub mod config;
pub mod memory;
pub mod models;
pub mod store;

pub use config::{AppConfig, AuthConfig, ConfigError, DatabaseConfig, Environment, StoreBackend};
pub use memory::MemoryAuthStore;
pub use models::{
    NewRefreshToken, NewUser, RefreshToken, RoleSet, TokenPayload, User, UserPublic, UserRole,
};
pub use store::{AuthStore, DuplicateField, PgAuthStore, StoreError, TokenStore, UserDirectory};
