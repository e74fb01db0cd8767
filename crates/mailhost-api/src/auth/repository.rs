//! Credential store adapter
//!
//! The auth core reads and writes accounts, tenants and password reset
//! tokens only through [`CredentialStore`]. The production implementation is
//! [`PgCredentialStore`]; every statement it runs is parameterized.
//!
//! Callers pass emails and domains already normalized (trimmed, lowercased).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailhost_core::{
    Account, BanState, Company, DatabaseConfig, DomainError, Mailbox,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("../../migrations/001_auth_schema.sql");

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    /// Store unreachable or too slow; retryable by the caller
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Domain already exists")]
    DomainAlreadyExists,

    #[error("Record not found")]
    NotFound,

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl From<DomainError> for RepositoryError {
    fn from(err: DomainError) -> Self {
        RepositoryError::CorruptRecord(err.to_string())
    }
}

/// Everything needed to create a tenant and its first admin
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub company_name: String,
    pub domain: String,
    pub admin_email: String,
    pub admin_name: String,
    pub admin_password_hash: String,
    /// Address of the admin's company mailbox
    pub mailbox_address: String,
}

/// Rows written by a successful registration
#[derive(Debug, Clone)]
pub struct RegisteredTenant {
    pub company: Company,
    pub admin: Account,
    pub mailbox: Mailbox,
}

/// Credential store contract consumed by the auth core
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<Account>, RepositoryError>;

    async fn find_company_by_id(&self, company_id: Uuid)
        -> Result<Option<Company>, RepositoryError>;

    async fn update_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Overwrite the ban fields; `NotFound` when the account does not exist
    async fn update_ban_state(&self, user_id: Uuid, ban: &BanState)
        -> Result<(), RepositoryError>;

    /// Create company, admin user and admin mailbox in one transaction.
    ///
    /// Either all rows are written or none are.
    async fn create_company_and_admin_user(
        &self,
        tenant: NewTenant,
    ) -> Result<RegisteredTenant, RepositoryError>;

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Consume an unused, unexpired reset token, set the new password hash and
    /// advance the account's token generation, atomically. Returns the account
    /// id, or `None` if the token is unknown, already used, or expired.
    async fn reset_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, RepositoryError>;

    async fn health_check(&self) -> Result<(), RepositoryError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    company_id: Option<Uuid>,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    status: String,
    is_banned: bool,
    ban_reason: Option<String>,
    banned_at: Option<DateTime<Utc>>,
    banned_by: Option<Uuid>,
    token_version: i32,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role.parse()?,
            status: row.status.parse()?,
            ban: BanState {
                is_banned: row.is_banned,
                reason: row.ban_reason,
                banned_at: row.banned_at,
                banned_by: row.banned_by,
            },
            company_id: row.company_id,
            token_version: row.token_version,
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    domain: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CompanyRow> for Company {
    type Error = RepositoryError;

    fn try_from(row: CompanyRow) -> Result<Self, Self::Error> {
        Ok(Company {
            id: row.id,
            name: row.name,
            domain: row.domain,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MailboxRow {
    id: Uuid,
    company_id: Uuid,
    user_id: Uuid,
    address: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MailboxRow> for Mailbox {
    type Error = RepositoryError;

    fn try_from(row: MailboxRow) -> Result<Self, Self::Error> {
        Ok(Mailbox {
            id: row.id,
            company_id: row.company_id,
            user_id: row.user_id,
            address: row.address,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => match db.constraint() {
            Some("users_email_key") | Some("email_accounts_address_key") => {
                RepositoryError::EmailAlreadyExists
            }
            Some("companies_domain_key") => RepositoryError::DomainAlreadyExists,
            _ => RepositoryError::Database(err.to_string()),
        },
        _ => RepositoryError::Database(err.to_string()),
    }
}

/// PostgreSQL-backed credential store
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgCredentialStore {
    /// Connect a pool using the configured size and timeouts
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Self::from_pool(
            pool,
            Duration::from_secs(config.query_timeout_secs),
        ))
    }

    pub fn from_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Create tables and constraints if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        self.timed("ensure_schema", async {
            sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(RepositoryError::Unavailable(format!(
                "{operation} exceeded {}s",
                self.query_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<Account>, RepositoryError> {
        let row = self
            .timed(
                "find_user_by_email",
                sqlx::query_as::<_, UserRow>(
                    r#"
                    SELECT id, company_id, email, password_hash, name, role, status,
                           is_banned, ban_reason, banned_at, banned_by, token_version,
                           last_login, created_at
                    FROM users WHERE email = $1
                    "#,
                )
                .bind(email)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<Account>, RepositoryError> {
        let row = self
            .timed(
                "find_user_by_id",
                sqlx::query_as::<_, UserRow>(
                    r#"
                    SELECT id, company_id, email, password_hash, name, role, status,
                           is_banned, ban_reason, banned_at, banned_by, token_version,
                           last_login, created_at
                    FROM users WHERE id = $1
                    "#,
                )
                .bind(user_id)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_company_by_id(
        &self,
        company_id: Uuid,
    ) -> Result<Option<Company>, RepositoryError> {
        let row = self
            .timed(
                "find_company_by_id",
                sqlx::query_as::<_, CompanyRow>(
                    "SELECT id, name, domain, status, created_at FROM companies WHERE id = $1",
                )
                .bind(company_id)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(Company::try_from).transpose()
    }

    async fn update_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.timed(
            "update_last_login",
            sqlx::query("UPDATE users SET last_login = $2, updated_at = $2 WHERE id = $1")
                .bind(user_id)
                .bind(at)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn update_ban_state(
        &self,
        user_id: Uuid,
        ban: &BanState,
    ) -> Result<(), RepositoryError> {
        let result = self
            .timed(
                "update_ban_state",
                sqlx::query(
                    r#"
                    UPDATE users SET
                        is_banned = $2,
                        ban_reason = $3,
                        banned_at = $4,
                        banned_by = $5,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(user_id)
                .bind(ban.is_banned)
                .bind(&ban.reason)
                .bind(ban.banned_at)
                .bind(ban.banned_by)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_company_and_admin_user(
        &self,
        tenant: NewTenant,
    ) -> Result<RegisteredTenant, RepositoryError> {
        // Dropping the transaction without commit rolls every insert back.
        let (company, admin, mailbox) = self
            .timed("create_company_and_admin_user", async {
                let mut tx = self.pool.begin().await?;

                let company = sqlx::query_as::<_, CompanyRow>(
                    r#"
                    INSERT INTO companies (id, name, domain, status, created_at)
                    VALUES ($1, $2, $3, 'active', NOW())
                    RETURNING id, name, domain, status, created_at
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&tenant.company_name)
                .bind(&tenant.domain)
                .fetch_one(&mut *tx)
                .await?;

                let admin = sqlx::query_as::<_, UserRow>(
                    r#"
                    INSERT INTO users (id, company_id, email, password_hash, name, role, status,
                                       created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, 'admin', 'active', NOW(), NOW())
                    RETURNING id, company_id, email, password_hash, name, role, status,
                              is_banned, ban_reason, banned_at, banned_by, token_version,
                              last_login, created_at
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(company.id)
                .bind(&tenant.admin_email)
                .bind(&tenant.admin_password_hash)
                .bind(&tenant.admin_name)
                .fetch_one(&mut *tx)
                .await?;

                let mailbox = sqlx::query_as::<_, MailboxRow>(
                    r#"
                    INSERT INTO email_accounts (id, company_id, user_id, address, role, created_at)
                    VALUES ($1, $2, $3, $4, 'admin', NOW())
                    RETURNING id, company_id, user_id, address, role, created_at
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(company.id)
                .bind(admin.id)
                .bind(&tenant.mailbox_address)
                .fetch_one(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok((company, admin, mailbox))
            })
            .await?;

        Ok(RegisteredTenant {
            company: company.try_into()?,
            admin: admin.try_into()?,
            mailbox: mailbox.try_into()?,
        })
    }

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.timed(
            "store_reset_token",
            sqlx::query(
                r#"
                INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn reset_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, RepositoryError> {
        self.timed("reset_password", async {
            let mut tx = self.pool.begin().await?;

            // The conditional update is what makes a token single-use under
            // concurrent redemption.
            let user_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                UPDATE password_reset_tokens SET used_at = $2
                WHERE token_hash = $1 AND used_at IS NULL AND expires_at > $2
                RETURNING user_id
                "#,
            )
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(user_id) = user_id else {
                return Ok(None);
            };

            // Refresh tokens minted before the reset stop redeeming
            sqlx::query(
                "UPDATE users SET password_hash = $2, token_version = token_version + 1, \
                 updated_at = $3 WHERE id = $1",
            )
                .bind(user_id)
                .bind(new_password_hash)
                .bind(now)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(Some(user_id))
        })
        .await
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        self.timed("health_check", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}
