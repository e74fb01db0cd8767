//! Request and response bodies of the auth endpoints
//!
//! Wire names are camelCase. Nothing in here ever carries a password hash.

use chrono::{DateTime, Utc};
use mailhost_core::{Account, AccountStatus, Company, CompanyStatus, UserRole};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Login credentials
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Logout body; the refresh token is accepted but there is nothing to revoke
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    pub new_password: String,
}

/// Tenant self-registration
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCompanyRequest {
    #[validate(length(min = 2, max = 100, message = "Company name must be 2-100 characters"))]
    pub company_name: String,
    #[validate(custom(function = "validate_domain"))]
    pub domain: String,
    #[validate(length(min = 1, max = 100, message = "Admin name must be 1-100 characters"))]
    pub admin_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub admin_email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct BanRequest {
    #[serde(default)]
    #[validate(length(max = 500, message = "Ban reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

/// Hostname made of dot-separated labels, with at least two labels
pub fn validate_domain(domain: &str) -> Result<(), ValidationError> {
    let domain = domain.trim();
    let labels: Vec<&str> = domain.split('.').collect();

    let label_ok = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };

    if domain.len() > 253 || labels.len() < 2 || !labels.iter().all(label_ok) {
        let mut error = ValidationError::new("domain");
        error.message = Some("Invalid domain format".into());
        return Err(error);
    }
    Ok(())
}

/// Account as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountPublic {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[schema(value_type = String, example = "admin")]
    pub role: UserRole,
    #[schema(value_type = String, example = "active")]
    pub status: AccountStatus,
    pub is_banned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_reason: Option<String>,
    pub company_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountPublic {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            role: account.role,
            status: account.status,
            is_banned: account.ban.is_banned,
            ban_reason: account.ban.reason.clone(),
            company_id: account.company_id,
            last_login: account.last_login,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyPublic {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    #[schema(value_type = String, example = "active")]
    pub status: CompanyStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Company> for CompanyPublic {
    fn from(company: &Company) -> Self {
        Self {
            id: company.id,
            name: company.name.clone(),
            domain: company.domain.clone(),
            status: company.status,
            created_at: company.created_at,
        }
    }
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: AccountPublic,
    /// Access token (also set as the http-only cookie)
    pub token: String,
    pub refresh_token: String,
    /// Access token expiry, Unix seconds
    pub expires_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub company: CompanyPublic,
    pub user: AccountPublic,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailhost_core::BanState;

    #[test]
    fn test_validate_domain() {
        assert!(validate_domain("acme.com").is_ok());
        assert!(validate_domain("mail.acme-corp.co.uk").is_ok());

        assert!(validate_domain("localhost").is_err());
        assert!(validate_domain("acme..com").is_err());
        assert!(validate_domain("-acme.com").is_err());
        assert!(validate_domain("acme.com/evil").is_err());
        assert!(validate_domain("").is_err());
    }

    #[test]
    fn test_register_request_validation() {
        let request = RegisterCompanyRequest {
            company_name: "A".to_string(),
            domain: "bad".to_string(),
            admin_name: "Admin".to_string(),
            admin_email: "not-an-email".to_string(),
            password: "Secret123!".to_string(),
        };

        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("company_name"));
        assert!(fields.contains_key("domain"));
        assert!(fields.contains_key("admin_email"));
        assert!(!fields.contains_key("admin_name"));
    }

    #[test]
    fn test_login_response_wire_names() {
        let account = Account {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            name: "A".to_string(),
            role: UserRole::SuperAdmin,
            status: AccountStatus::Active,
            ban: BanState::default(),
            company_id: None,
            token_version: 0,
            last_login: None,
            created_at: Utc::now(),
        };

        let response = LoginResponse {
            user: AccountPublic::from(&account),
            token: "t".to_string(),
            refresh_token: "r".to_string(),
            expires_at: 42,
        };
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["refreshToken"], "r");
        assert_eq!(json["expiresAt"], 42);
        assert_eq!(json["user"]["role"], "super_admin");
        assert_eq!(json["user"]["isBanned"], false);
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn test_refresh_request_accepts_camel_case() {
        let request: RefreshRequest =
            serde_json::from_str(r#"{"refreshToken":"abc"}"#).unwrap();
        assert_eq!(request.refresh_token, "abc");
    }
}
