//! Mailhost Core - Domain models and shared types
//!
//! This crate defines the records the authentication core reads and writes:
//! - Back-office accounts and their ban state
//! - Tenants (companies) and their lifecycle status
//! - The two role vocabularies (back-office users vs. company mailboxes)
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while interpreting stored domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

impl DomainError {
    fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}

// ============================================================================
// Roles
// ============================================================================

/// Role of a back-office account (the `users` table).
///
/// This is the vocabulary signed into access tokens and checked by the
/// request gate and the route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }

    /// Whether this role may enter the admin surfaces
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            "super_admin" => Ok(UserRole::SuperAdmin),
            other => Err(DomainError::unknown("user role", other)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a company mailbox account (the `email_accounts` table).
///
/// Deliberately not convertible to or from [`UserRole`]: the two vocabularies
/// describe different kinds of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    Employee,
    Admin,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRole::Employee => "employee",
            EmployeeRole::Admin => "admin",
        }
    }
}

impl FromStr for EmployeeRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" => Ok(EmployeeRole::Employee),
            "admin" => Ok(EmployeeRole::Admin),
            other => Err(DomainError::unknown("employee role", other)),
        }
    }
}

impl fmt::Display for EmployeeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Statuses
// ============================================================================

/// Account lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            other => Err(DomainError::unknown("account status", other)),
        }
    }
}

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyStatus {
    Active,
    Suspended,
    Pending,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::Active => "active",
            CompanyStatus::Suspended => "suspended",
            CompanyStatus::Pending => "pending",
        }
    }
}

impl FromStr for CompanyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CompanyStatus::Active),
            "suspended" => Ok(CompanyStatus::Suspended),
            "pending" => Ok(CompanyStatus::Pending),
            other => Err(DomainError::unknown("company status", other)),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Ban fields of an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanState {
    pub is_banned: bool,
    pub reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    /// Account that issued the ban
    pub banned_by: Option<Uuid>,
}

impl BanState {
    /// Ban issued by `actor` at `at`
    pub fn banned(reason: Option<String>, actor: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            is_banned: true,
            reason,
            banned_at: Some(at),
            banned_by: Some(actor),
        }
    }

    /// Cleared ban state
    pub fn lifted() -> Self {
        Self::default()
    }
}

/// Back-office account as owned by the credential store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    /// Always stored trimmed and lowercased
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    pub status: AccountStatus,
    pub ban: BanState,
    /// Owning tenant; platform staff have none
    pub company_id: Option<Uuid>,
    /// Generation counter compared against refresh token claims
    pub token_version: i32,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Active and not banned
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active && !self.ban.is_banned
    }
}

/// Tenant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    /// Always stored lowercased
    pub domain: String,
    pub status: CompanyStatus,
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn is_active(&self) -> bool {
        self.status == CompanyStatus::Active
    }
}

/// Company mailbox row created alongside a tenant's first admin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub address: String,
    pub role: EmployeeRole,
    pub created_at: DateTime<Utc>,
}

/// Normalize an email address or domain for storage and lookup
pub fn normalize_identifier(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(status: AccountStatus, banned: bool) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            password_hash: "hash".to_string(),
            name: "A".to_string(),
            role: UserRole::Admin,
            status,
            ban: BanState {
                is_banned: banned,
                ..Default::default()
            },
            company_id: None,
            token_version: 0,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_role_round_trip_and_privilege() {
        for role in [UserRole::User, UserRole::Admin, UserRole::SuperAdmin] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!(!UserRole::User.is_privileged());
        assert!(UserRole::Admin.is_privileged());
        assert!(UserRole::SuperAdmin.is_privileged());
    }

    #[test]
    fn test_role_vocabularies_stay_separate() {
        assert!("employee".parse::<UserRole>().is_err());
        assert!("super_admin".parse::<EmployeeRole>().is_err());
        assert!("user".parse::<EmployeeRole>().is_err());
        assert_eq!(
            "employee".parse::<EmployeeRole>().unwrap(),
            EmployeeRole::Employee
        );
    }

    #[test]
    fn test_role_serde_uses_snake_case() {
        let json = serde_json::to_string(&UserRole::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
        assert!(serde_json::from_str::<UserRole>("\"SuperAdmin\"").is_err());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "suspended".parse::<CompanyStatus>().unwrap(),
            CompanyStatus::Suspended
        );
        assert_eq!(
            "inactive".parse::<AccountStatus>().unwrap(),
            AccountStatus::Inactive
        );
        assert!("deleted".parse::<CompanyStatus>().is_err());
    }

    #[test]
    fn test_account_is_active_requires_status_and_no_ban() {
        assert!(account(AccountStatus::Active, false).is_active());
        assert!(!account(AccountStatus::Active, true).is_active());
        assert!(!account(AccountStatus::Inactive, false).is_active());
    }

    #[test]
    fn test_ban_state_constructors() {
        let actor = Uuid::new_v4();
        let now = Utc::now();
        let ban = BanState::banned(Some("spam".to_string()), actor, now);
        assert!(ban.is_banned);
        assert_eq!(ban.banned_by, Some(actor));
        assert_eq!(BanState::lifted(), BanState::default());
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  Admin@Example.COM "), "admin@example.com");
    }
}
