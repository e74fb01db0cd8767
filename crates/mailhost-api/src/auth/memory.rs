//! In-memory credential store for tests and local runs.
//!
//! Mirrors the PostgreSQL semantics the auth core depends on: unique emails,
//! domains and mailbox addresses; all-or-nothing registration; single-use
//! reset tokens. A switch simulates an unreachable store.

use super::repository::{CredentialStore, NewTenant, RegisteredTenant, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailhost_core::{Account, BanState, Company, CompanyStatus, EmployeeRole, Mailbox, UserRole};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ResetTokenRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, Account>,
    companies: HashMap<Uuid, Company>,
    mailboxes: HashMap<Uuid, Mailbox>,
    reset_tokens: HashMap<String, ResetTokenRecord>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }
}

/// Credential store held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable` (or recover)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn insert_company(&self, company: Company) {
        self.tables
            .write()
            .await
            .companies
            .insert(company.id, company);
    }

    pub async fn insert_account(&self, account: Account) {
        self.tables.write().await.users.insert(account.id, account);
    }

    pub async fn set_company_status(&self, company_id: Uuid, status: CompanyStatus) {
        if let Some(company) = self.tables.write().await.companies.get_mut(&company_id) {
            company.status = status;
        }
    }

    /// Bump the token generation, invalidating refresh tokens that carry one
    pub async fn bump_token_version(&self, user_id: Uuid) {
        if let Some(user) = self.tables.write().await.users.get_mut(&user_id) {
            user.token_version += 1;
        }
    }

    pub async fn account(&self, user_id: Uuid) -> Option<Account> {
        self.tables.read().await.users.get(&user_id).cloned()
    }

    pub async fn company_count(&self) -> usize {
        self.tables.read().await.companies.len()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn mailbox_count(&self) -> usize {
        self.tables.read().await.mailboxes.len()
    }

    /// Stored digests of reset tokens issued for `user_id`
    pub async fn reset_token_hashes(&self, user_id: Uuid) -> Vec<String> {
        self.tables
            .read()
            .await
            .reset_tokens
            .iter()
            .filter(|(_, record)| record.user_id == user_id)
            .map(|(hash, _)| hash.clone())
            .collect()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<Account>, RepositoryError> {
        self.check_available()?;
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_company_by_id(
        &self,
        company_id: Uuid,
    ) -> Result<Option<Company>, RepositoryError> {
        self.check_available()?;
        Ok(self.tables.read().await.companies.get(&company_id).cloned())
    }

    async fn update_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        if let Some(user) = self.tables.write().await.users.get_mut(&user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn update_ban_state(
        &self,
        user_id: Uuid,
        ban: &BanState,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(RepositoryError::NotFound)?;
        user.ban = ban.clone();
        Ok(())
    }

    async fn create_company_and_admin_user(
        &self,
        tenant: NewTenant,
    ) -> Result<RegisteredTenant, RepositoryError> {
        self.check_available()?;

        // One write lock for the whole registration stands in for the
        // transaction: every uniqueness check runs before any insert.
        let mut tables = self.tables.write().await;

        if tables.companies.values().any(|c| c.domain == tenant.domain) {
            return Err(RepositoryError::DomainAlreadyExists);
        }
        if tables.email_taken(&tenant.admin_email)
            || tables
                .mailboxes
                .values()
                .any(|m| m.address == tenant.mailbox_address)
        {
            return Err(RepositoryError::EmailAlreadyExists);
        }

        let now = Utc::now();
        let company = Company {
            id: Uuid::new_v4(),
            name: tenant.company_name,
            domain: tenant.domain,
            status: CompanyStatus::Active,
            created_at: now,
        };
        let admin = Account {
            id: Uuid::new_v4(),
            email: tenant.admin_email,
            password_hash: tenant.admin_password_hash,
            name: tenant.admin_name,
            role: UserRole::Admin,
            status: Default::default(),
            ban: BanState::default(),
            company_id: Some(company.id),
            token_version: 0,
            last_login: None,
            created_at: now,
        };
        let mailbox = Mailbox {
            id: Uuid::new_v4(),
            company_id: company.id,
            user_id: admin.id,
            address: tenant.mailbox_address,
            role: EmployeeRole::Admin,
            created_at: now,
        };

        tables.companies.insert(company.id, company.clone());
        tables.users.insert(admin.id, admin.clone());
        tables.mailboxes.insert(mailbox.id, mailbox.clone());

        Ok(RegisteredTenant {
            company,
            admin,
            mailbox,
        })
    }

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check_available()?;
        self.tables.write().await.reset_tokens.insert(
            token_hash.to_string(),
            ResetTokenRecord {
                user_id,
                expires_at,
                used_at: None,
            },
        );
        Ok(())
    }

    async fn reset_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, RepositoryError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let user_id = match tables.reset_tokens.get_mut(token_hash) {
            Some(record) if record.used_at.is_none() && record.expires_at > now => {
                record.used_at = Some(now);
                record.user_id
            }
            _ => return Ok(None),
        };

        match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.password_hash = new_password_hash.to_string();
                user.token_version += 1;
                Ok(Some(user_id))
            }
            None => Err(RepositoryError::CorruptRecord(format!(
                "reset token references missing user {user_id}"
            ))),
        }
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tenant(domain: &str, email: &str) -> NewTenant {
        NewTenant {
            company_name: "Acme".to_string(),
            domain: domain.to_string(),
            admin_email: email.to_string(),
            admin_name: "Admin".to_string(),
            admin_password_hash: "hash".to_string(),
            mailbox_address: format!("admin@{domain}"),
        }
    }

    #[tokio::test]
    async fn test_registration_creates_all_rows() {
        let store = InMemoryCredentialStore::new();
        let registered = store
            .create_company_and_admin_user(tenant("acme.com", "boss@acme.com"))
            .await
            .unwrap();

        assert_eq!(registered.admin.role, UserRole::Admin);
        assert_eq!(registered.mailbox.role, EmployeeRole::Admin);
        assert_eq!(registered.admin.company_id, Some(registered.company.id));
        assert_eq!(store.company_count().await, 1);
        assert_eq!(store.user_count().await, 1);
        assert_eq!(store.mailbox_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_leaves_store_unchanged() {
        let store = InMemoryCredentialStore::new();
        store
            .create_company_and_admin_user(tenant("acme.com", "boss@acme.com"))
            .await
            .unwrap();

        let result = store
            .create_company_and_admin_user(tenant("other.com", "boss@acme.com"))
            .await;
        assert!(matches!(result, Err(RepositoryError::EmailAlreadyExists)));
        assert_eq!(store.company_count().await, 1);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_domain() {
        let store = InMemoryCredentialStore::new();
        store
            .create_company_and_admin_user(tenant("acme.com", "one@acme.com"))
            .await
            .unwrap();

        let result = store
            .create_company_and_admin_user(tenant("acme.com", "two@acme.com"))
            .await;
        assert!(matches!(result, Err(RepositoryError::DomainAlreadyExists)));
    }

    #[tokio::test]
    async fn test_reset_token_is_single_use() {
        let store = InMemoryCredentialStore::new();
        let registered = store
            .create_company_and_admin_user(tenant("acme.com", "boss@acme.com"))
            .await
            .unwrap();
        let now = Utc::now();
        store
            .store_reset_token(registered.admin.id, "digest", now + Duration::hours(1))
            .await
            .unwrap();

        let first = store.reset_password("digest", "new-hash", now).await.unwrap();
        assert_eq!(first, Some(registered.admin.id));
        let second = store.reset_password("digest", "other", now).await.unwrap();
        assert_eq!(second, None);

        let account = store.account(registered.admin.id).await.unwrap();
        assert_eq!(account.password_hash, "new-hash");
        assert_eq!(account.token_version, registered.admin.token_version + 1);
    }

    #[tokio::test]
    async fn test_expired_reset_token() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        store
            .store_reset_token(Uuid::new_v4(), "digest", now)
            .await
            .unwrap();

        assert_eq!(store.reset_password("digest", "h", now).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ban_unknown_user() {
        let store = InMemoryCredentialStore::new();
        let result = store
            .update_ban_state(Uuid::new_v4(), &BanState::lifted())
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_outage_switch() {
        let store = InMemoryCredentialStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.find_user_by_email("a@b.com").await,
            Err(RepositoryError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.health_check().await.is_ok());
    }
}
