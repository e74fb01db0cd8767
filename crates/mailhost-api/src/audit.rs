//! Security audit logging for authentication events
//!
//! Every security-relevant decision of the auth core is recorded as an
//! [`AuditEvent`] on the `audit` tracing target, so it can be filtered and
//! routed separately from application logs. Failure events carry the
//! internal reason that the HTTP response deliberately hides.
//!
//! Tokens, password hashes and reset secrets never appear in an event.

use crate::middleware::metrics;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Where a request came from, as far as the headers tell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: Uuid,
        email: String,
        company_id: Option<Uuid>,
        client: ClientInfo,
    },

    LoginFailure {
        email: String,
        /// Internal reason; the caller only sees the generic error
        reason: String,
        client: ClientInfo,
    },

    TokenRefresh {
        user_id: Uuid,
        client: ClientInfo,
    },

    TokenRefreshFailure {
        user_id: Option<Uuid>,
        reason: String,
        client: ClientInfo,
    },

    Logout {
        user_id: Option<Uuid>,
        client: ClientInfo,
    },

    RegistrationSuccess {
        user_id: Uuid,
        company_id: Uuid,
        email: String,
        domain: String,
        client: ClientInfo,
    },

    RegistrationFailure {
        email: String,
        domain: String,
        reason: String,
        client: ClientInfo,
    },

    PasswordResetRequested {
        email: String,
        /// Whether a token was actually issued
        issued: bool,
        client: ClientInfo,
    },

    PasswordResetCompleted {
        user_id: Uuid,
        client: ClientInfo,
    },

    PasswordResetFailed {
        reason: String,
        client: ClientInfo,
    },

    /// Authenticated, but not allowed
    AccessDenied {
        user_id: Option<Uuid>,
        email: Option<String>,
        resource: String,
        reason: String,
        client: ClientInfo,
    },

    /// Missing, malformed, forged or expired token, or a dead session
    InvalidToken {
        resource: String,
        reason: String,
        client: ClientInfo,
    },

    AccountBanned {
        user_id: Uuid,
        banned_by: Uuid,
        reason: Option<String>,
        client: ClientInfo,
    },

    AccountUnbanned {
        user_id: Uuid,
        unbanned_by: Uuid,
        client: ClientInfo,
    },
}

impl AuditEvent {
    /// Event name used as the metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } | AuditEvent::LoginFailure { .. } => "login",
            AuditEvent::TokenRefresh { .. } | AuditEvent::TokenRefreshFailure { .. } => "refresh",
            AuditEvent::Logout { .. } => "logout",
            AuditEvent::RegistrationSuccess { .. } | AuditEvent::RegistrationFailure { .. } => {
                "registration"
            }
            AuditEvent::PasswordResetRequested { .. } => "password_reset_request",
            AuditEvent::PasswordResetCompleted { .. } | AuditEvent::PasswordResetFailed { .. } => {
                "password_reset"
            }
            AuditEvent::AccessDenied { .. } => "access_denied",
            AuditEvent::InvalidToken { .. } => "invalid_token",
            AuditEvent::AccountBanned { .. } => "ban",
            AuditEvent::AccountUnbanned { .. } => "unban",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AuditEvent::LoginFailure { .. }
                | AuditEvent::TokenRefreshFailure { .. }
                | AuditEvent::RegistrationFailure { .. }
                | AuditEvent::PasswordResetFailed { .. }
                | AuditEvent::AccessDenied { .. }
                | AuditEvent::InvalidToken { .. }
        )
    }

    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Access token refreshed",
            AuditEvent::TokenRefreshFailure { .. } => "Token refresh rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::RegistrationSuccess { .. } => "Company registered",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::PasswordResetRequested { .. } => "Password reset requested",
            AuditEvent::PasswordResetCompleted { .. } => "Password reset completed",
            AuditEvent::PasswordResetFailed { .. } => "Password reset failed",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::AccountBanned { .. } => "Account banned",
            AuditEvent::AccountUnbanned { .. } => "Account unbanned",
        }
    }

    fn client(&self) -> &ClientInfo {
        match self {
            AuditEvent::LoginSuccess { client, .. }
            | AuditEvent::LoginFailure { client, .. }
            | AuditEvent::TokenRefresh { client, .. }
            | AuditEvent::TokenRefreshFailure { client, .. }
            | AuditEvent::Logout { client, .. }
            | AuditEvent::RegistrationSuccess { client, .. }
            | AuditEvent::RegistrationFailure { client, .. }
            | AuditEvent::PasswordResetRequested { client, .. }
            | AuditEvent::PasswordResetCompleted { client, .. }
            | AuditEvent::PasswordResetFailed { client, .. }
            | AuditEvent::AccessDenied { client, .. }
            | AuditEvent::InvalidToken { client, .. }
            | AuditEvent::AccountBanned { client, .. }
            | AuditEvent::AccountUnbanned { client, .. } => client,
        }
    }
}

/// Log a security audit event and count it.
///
/// Successes are logged at INFO, failures at WARN, both on the `audit`
/// target with the full event serialized as JSON.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));
    let client = event.client();
    let outcome = if event.is_failure() {
        "failure"
    } else {
        "success"
    };

    metrics::record_auth_event(event.kind(), outcome);

    if event.is_failure() {
        warn!(
            target: "audit",
            timestamp = %timestamp,
            event_type = event.kind(),
            outcome,
            ip_address = ?client.ip_address,
            event = %event_json,
            "{}",
            event.summary()
        );
    } else {
        info!(
            target: "audit",
            timestamp = %timestamp,
            event_type = event.kind(),
            outcome,
            ip_address = ?client.ip_address,
            event = %event_json,
            "{}",
            event.summary()
        );
    }
}

/// Client IP from `X-Forwarded-For` (first hop) or `X-Real-IP`
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
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
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.to_string())
}

pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
