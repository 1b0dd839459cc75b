//! Security audit logging for authentication events
//!
//! Every event is logged at INFO level with the "audit" target, so
//! deployments can route the trail separately from application logs
//! (e.g. `RUST_LOG=audit=info`). The full event is attached as JSON.
//!
//! # Example
//!
//! ```ignore
//! use folio_api::audit::{audit_log, AuditEvent, ClientInfo};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id,
//!     email: user.email.clone(),
//!     client: ClientInfo::from_headers(&headers),
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Request origin recorded with each event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: Uuid,
        email: String,
        role: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    LoginSuccess {
        user_id: Uuid,
        email: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Failed login; `reason` is internal and never sent to the client
    LoginFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    TokenRefresh {
        user_id: Uuid,
        #[serde(flatten)]
        client: ClientInfo,
    },

    RefreshRejected {
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    Logout {
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// All refresh tokens of a user were revoked
    SessionsRevoked {
        user_id: Uuid,
        revoked: u64,
    },

    /// Authenticated request lacking the required role
    AccessDenied {
        user_id: Option<Uuid>,
        role: Option<String>,
        resource: String,
        required_roles: Option<String>,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// A presented bearer token failed verification
    InvalidToken {
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },
}

impl AuditEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "registration_success",
            AuditEvent::RegistrationFailure { .. } => "registration_failure",
            AuditEvent::LoginSuccess { .. } => "login_success",
            AuditEvent::LoginFailure { .. } => "login_failure",
            AuditEvent::TokenRefresh { .. } => "token_refresh",
            AuditEvent::RefreshRejected { .. } => "refresh_rejected",
            AuditEvent::Logout { .. } => "logout",
            AuditEvent::SessionsRevoked { .. } => "sessions_revoked",
            AuditEvent::AccessDenied { .. } => "access_denied",
            AuditEvent::InvalidToken { .. } => "invalid_token",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshRejected { .. } => "Token refresh rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::SessionsRevoked { .. } => "All sessions revoked",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
        }
    }

    fn client(&self) -> Option<&ClientInfo> {
        match self {
            AuditEvent::RegistrationSuccess { client, .. }
            | AuditEvent::RegistrationFailure { client, .. }
            | AuditEvent::LoginSuccess { client, .. }
            | AuditEvent::LoginFailure { client, .. }
            | AuditEvent::TokenRefresh { client, .. }
            | AuditEvent::RefreshRejected { client, .. }
            | AuditEvent::Logout { client }
            | AuditEvent::AccessDenied { client, .. }
            | AuditEvent::InvalidToken { client, .. } => Some(client),
            AuditEvent::SessionsRevoked { .. } => None,
        }
    }
}

/// Log a security audit event
///
/// The event is serialized to JSON and attached as the `event` field:
///
/// ```json
/// {
///   "event_type": "login_success",
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "email": "reader@example.com",
///   "ip_address": "192.168.1.1",
///   "user_agent": "Mozilla/5.0..."
/// }
/// ```
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));
    let ip_address = event.client().and_then(|c| c.ip_address.as_deref());

    info!(
        target: "audit",
        timestamp = %Utc::now(),
        event_type = event.event_type(),
        event = %event_json,
        ip_address = ?ip_address,
        "{}",
        event.summary()
    );
}

/// Extract client IP from proxy headers
///
/// Checks X-Forwarded-For (first hop), then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ClientInfo {
        ClientInfo {
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("Test Agent".to_string()),
        }
    }

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            client: client(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "login_success");
        assert_eq!(json["email"], "test@example.com");
        // Client fields are flattened into the event
        assert_eq!(json["ip_address"], "192.168.1.1");
        assert_eq!(event.event_type(), "login_success");
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::LoginFailure {
            email: "test@example.com".to_string(),
            reason: "wrong password".to_string(),
            client: client(),
        });
        audit_log(&AuditEvent::SessionsRevoked {
            user_id: Uuid::new_v4(),
            revoked: 3,
        });
        audit_log(&AuditEvent::AccessDenied {
            user_id: None,
            role: None,
            resource: "/api/auth/me".to_string(),
            required_roles: Some("admin".to_string()),
            client: ClientInfo::default(),
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_client_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            "Mozilla/5.0 (Test)".parse().unwrap(),
        );

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.user_agent.as_deref(), Some("Mozilla/5.0 (Test)"));
        assert_eq!(info.ip_address, None);
    }

    #[test]
    fn test_extract_missing_headers() {
        let headers = HeaderMap::new();
        assert_eq!(extract_ip_address(&headers), None);
        assert_eq!(extract_user_agent(&headers), None);
    }
}
