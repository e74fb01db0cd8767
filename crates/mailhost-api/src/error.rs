//! API error handling
//!
//! Every failure leaving the service is rendered as [`ApiError`]: a stable
//! machine-readable `code` plus a human-readable `message`. Credential,
//! account and tenant failures share generic messages; the specific reason
//! is logged server-side, not returned.

use crate::auth::repository::RepositoryError;
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

const RESTRICTED_ACCESS_MESSAGE: &str = "Access to this account is not permitted";

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input, detected before the store is touched
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is inactive or banned")]
    AccountInactive,

    #[error("Company is not active")]
    CompanySuspended,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid or expired reset token")]
    InvalidOrExpiredResetToken,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Domain already exists")]
    DomainAlreadyExists,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Admin access required")]
    AdminAccessRequired,

    #[error("{0} not found")]
    NotFound(String),

    /// Store or network failure the caller may retry
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable code exposed to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::AccountInactive => "ACCOUNT_INACTIVE",
            AppError::CompanySuspended => "COMPANY_SUSPENDED",
            AppError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::InvalidOrExpiredResetToken => "INVALID_OR_EXPIRED_RESET_TOKEN",
            AppError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            AppError::DomainAlreadyExists => "DOMAIN_ALREADY_EXISTS",
            AppError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            AppError::AdminAccessRequired => "ADMIN_ACCESS_REQUIRED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidOrExpiredResetToken => {
                StatusCode::BAD_REQUEST
            }
            AppError::InvalidCredentials
            | AppError::InvalidRefreshToken
            | AppError::UserNotFound
            | AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::AccountInactive
            | AppError::CompanySuspended
            | AppError::AdminAccessRequired => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::EmailAlreadyExists | AppError::DomainAlreadyExists => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ApiError {
        let message = match self {
            AppError::Validation(msg) => return ApiError::new(self.code(), msg.clone()),
            AppError::InvalidCredentials => "Invalid email or password",
            AppError::AccountInactive | AppError::CompanySuspended => RESTRICTED_ACCESS_MESSAGE,
            AppError::InvalidRefreshToken | AppError::UserNotFound => {
                "Session expired, please sign in again"
            }
            AppError::InvalidOrExpiredResetToken => "Reset link is invalid or has expired",
            AppError::EmailAlreadyExists => "An account with this email already exists",
            AppError::DomainAlreadyExists => "A company with this domain already exists",
            AppError::AuthenticationRequired => "Authentication required",
            AppError::AdminAccessRequired => "Admin access required",
            AppError::NotFound(resource) => {
                return ApiError::new(self.code(), format!("{resource} not found"))
            }
            AppError::ServiceUnavailable(_) => "Service temporarily unavailable, please retry",
            AppError::Internal(_) => "Internal server error",
        };
        ApiError::new(self.code(), message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Internal(detail) => {
                tracing::error!(code = self.code(), detail = %detail, "request failed");
            }
            AppError::ServiceUnavailable(detail) => {
                tracing::warn!(code = self.code(), detail = %detail, "dependency unavailable");
            }
            _ => {}
        }

        let mut response = (status, Json(self.body())).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            RepositoryError::EmailAlreadyExists => AppError::EmailAlreadyExists,
            RepositoryError::DomainAlreadyExists => AppError::DomainAlreadyExists,
            RepositoryError::NotFound => AppError::NotFound("Record".to_string()),
            RepositoryError::Database(msg) => AppError::Internal(format!("Database error: {msg}")),
            RepositoryError::CorruptRecord(msg) => {
                AppError::Internal(format!("Corrupt record: {msg}"))
            }
        }
    }
}

/// Body extraction failures (broken JSON, missing fields, wrong content
/// type) are input errors like any other
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let reasons: Vec<String> = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                format!("{field}: {}", reasons.join(", "))
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_company_suspended_response() {
        let response = AppError::CompanySuspended.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let json = body_json(response).await;
        assert_eq!(json["code"], "COMPANY_SUSPENDED");
        assert_eq!(json["message"], RESTRICTED_ACCESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_inactive_and_suspended_share_message() {
        let inactive = body_json(AppError::AccountInactive.into_response()).await;
        let suspended = body_json(AppError::CompanySuspended.into_response()).await;
        assert_eq!(inactive["message"], suspended["message"]);
        assert_ne!(inactive["code"], suspended["code"]);
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AppError::Internal("connection string leaked".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert!(json.get("details").is_none());
        assert!(!json.to_string().contains("leaked"));
    }

    #[test]
    fn test_service_unavailable_sets_retry_after() {
        let response = AppError::ServiceUnavailable("timeout".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_repository_error_mapping() {
        assert!(matches!(
            AppError::from(RepositoryError::Unavailable("x".into())),
            AppError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            AppError::from(RepositoryError::DomainAlreadyExists),
            AppError::DomainAlreadyExists
        ));
        assert!(matches!(
            AppError::from(RepositoryError::Database("x".into())),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::AdminAccessRequired.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::EmailAlreadyExists.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
