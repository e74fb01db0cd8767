//! Authentication service layer
//!
//! Orchestrates login, tenant registration, token refresh, logout, password
//! reset and account moderation. This is the only component that talks to
//! both the [`TokenCodec`] and the [`CredentialStore`].
//!
//! Every rejection is audited with its precise internal reason; callers only
//! ever see the coarse [`AppError`] kind.

use super::guard::Session;
use super::jwt::{Identity, IssuedToken, TokenCodec};
use super::models::{
    BanRequest, ForgotPasswordRequest, LoginRequest, RegisterCompanyRequest,
    ResetPasswordRequest,
};
use super::password::{
    hash_password_with_config, validate_password_strength, verify_password, PasswordConfig,
};
use super::repository::{CredentialStore, NewTenant, RegisteredTenant};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use mailhost_core::{normalize_identifier, Account, AuthConfig, BanState, UserRole};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Delivers password reset links. Outbound mail itself lives elsewhere.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset_link(
        &self,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Mailer that only records that a link was issued
#[derive(Debug, Default, Clone)]
pub struct TracingMailer;

#[async_trait]
impl ResetMailer for TracingMailer {
    async fn send_reset_link(
        &self,
        email: &str,
        _token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        tracing::info!(email = %email, expires_at = %expires_at, "password reset link issued");
        Ok(())
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: Account,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Authentication service
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    mailer: Arc<dyn ResetMailer>,
    password_config: PasswordConfig,
    reset_token_ttl: Duration,
    /// Verified against when the email is unknown, to keep timing uniform
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        codec: Arc<TokenCodec>,
        mailer: Arc<dyn ResetMailer>,
        password_config: PasswordConfig,
    ) -> Result<Self, AppError> {
        let dummy_hash = hash_password_with_config("mailhost-timing-equalizer", &password_config)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Self {
            store,
            codec,
            mailer,
            password_config,
            reset_token_ttl: Duration::seconds(
                i64::try_from(config.reset_token_ttl_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
            dummy_hash,
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Login with email and password
    ///
    /// Order of checks: credentials, then account state, then tenant state.
    /// Nothing about the account is disclosed until the password verified.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AppError> {
        request.validate()?;
        let email = normalize_identifier(&request.email);

        let Some(mut account) = self.store.find_user_by_email(&email).await? else {
            // Same work as a real mismatch.
            let _ = verify_password(&request.password, &self.dummy_hash);
            return Err(self.login_rejected(
                &email,
                "unknown email",
                AppError::InvalidCredentials,
                client,
            ));
        };

        let password_ok = verify_password(&request.password, &account.password_hash)
            .map_err(|e| AppError::Internal(format!("stored hash for {}: {e}", account.id)))?;
        if !password_ok {
            return Err(self.login_rejected(
                &email,
                "password mismatch",
                AppError::InvalidCredentials,
                client,
            ));
        }

        if account.ban.is_banned {
            return Err(self.login_rejected(
                &email,
                "account banned",
                AppError::AccountInactive,
                client,
            ));
        }
        if !account.is_active() {
            return Err(self.login_rejected(
                &email,
                "account inactive",
                AppError::AccountInactive,
                client,
            ));
        }

        if let Some(company_id) = account.company_id {
            match self.store.find_company_by_id(company_id).await? {
                Some(company) if company.is_active() => {}
                Some(company) => {
                    let reason = format!("company {}", company.status.as_str());
                    return Err(self.login_rejected(
                        &email,
                        &reason,
                        AppError::CompanySuspended,
                        client,
                    ));
                }
                None => {
                    return Err(self.login_rejected(
                        &email,
                        "company missing",
                        AppError::CompanySuspended,
                        client,
                    ));
                }
            }
        }

        let now = Utc::now();
        self.store.update_last_login(account.id, now).await?;
        account.last_login = Some(now);

        let access = self
            .codec
            .issue_access_token(&identity_of(&account))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let refresh = self
            .codec
            .issue_refresh_token(account.id, Some(account.token_version))
            .map_err(|e| AppError::Internal(e.to_string()))?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: account.id,
            email: account.email.clone(),
            company_id: account.company_id,
            client: client.clone(),
        });

        Ok(LoginOutcome {
            account,
            access,
            refresh,
        })
    }

    fn login_rejected(
        &self,
        email: &str,
        reason: &str,
        error: AppError,
        client: &ClientInfo,
    ) -> AppError {
        audit_log(&AuditEvent::LoginFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            client: client.clone(),
        });
        error
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<IssuedToken, AppError> {
        let claims = match self.codec.verify_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                return Err(self.refresh_rejected(
                    None,
                    &e.to_string(),
                    AppError::InvalidRefreshToken,
                    client,
                ));
            }
        };

        let Some(account) = self.store.find_user_by_id(claims.sub).await? else {
            return Err(self.refresh_rejected(
                Some(claims.sub),
                "account missing",
                AppError::UserNotFound,
                client,
            ));
        };

        if !account.is_active() {
            return Err(self.refresh_rejected(
                Some(account.id),
                "account inactive or banned",
                AppError::InvalidRefreshToken,
                client,
            ));
        }
        if claims.ver.is_some_and(|ver| ver != account.token_version) {
            return Err(self.refresh_rejected(
                Some(account.id),
                "token generation superseded",
                AppError::InvalidRefreshToken,
                client,
            ));
        }
        if let Some(company_id) = account.company_id {
            let active = self
                .store
                .find_company_by_id(company_id)
                .await?
                .is_some_and(|company| company.is_active());
            if !active {
                return Err(self.refresh_rejected(
                    Some(account.id),
                    "company not active",
                    AppError::CompanySuspended,
                    client,
                ));
            }
        }

        let access = self
            .codec
            .issue_access_token(&identity_of(&account))
            .map_err(|e| AppError::Internal(e.to_string()))?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id: account.id,
            client: client.clone(),
        });

        Ok(access)
    }

    fn refresh_rejected(
        &self,
        user_id: Option<Uuid>,
        reason: &str,
        error: AppError,
        client: &ClientInfo,
    ) -> AppError {
        audit_log(&AuditEvent::TokenRefreshFailure {
            user_id,
            reason: reason.to_string(),
            client: client.clone(),
        });
        error
    }

    /// Logout never fails: there is no server-side token state to revoke.
    pub async fn logout(&self, refresh_token: Option<&str>, client: &ClientInfo) {
        let user_id = refresh_token
            .and_then(|token| self.codec.verify_refresh(token).ok())
            .map(|claims| claims.sub);

        audit_log(&AuditEvent::Logout {
            user_id,
            client: client.clone(),
        });
    }

    /// Issue a single-use reset token if the email belongs to an active
    /// account. The caller sees the same result either way.
    pub async fn request_password_reset(
        &self,
        request: ForgotPasswordRequest,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        request.validate()?;
        let email = normalize_identifier(&request.email);

        let account = self
            .store
            .find_user_by_email(&email)
            .await?
            .filter(Account::is_active);

        let issued = match account {
            Some(account) => {
                let token = generate_reset_token();
                let expires_at = Utc::now()
                    .checked_add_signed(self.reset_token_ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.store
                    .store_reset_token(account.id, &hash_token(&token), expires_at)
                    .await?;

                if let Err(e) = self
                    .mailer
                    .send_reset_link(&account.email, &token, expires_at)
                    .await
                {
                    tracing::warn!(
                        user_id = %account.id,
                        error = %e,
                        "failed to deliver reset link"
                    );
                }
                true
            }
            None => false,
        };

        audit_log(&AuditEvent::PasswordResetRequested {
            email,
            issued,
            client: client.clone(),
        });

        Ok(())
    }

    /// Redeem a reset token and set a new password
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        request.validate()?;
        validate_password_strength(&request.new_password).map_err(AppError::Validation)?;

        let new_hash = hash_password_with_config(&request.new_password, &self.password_config)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let redeemed = self
            .store
            .reset_password(&hash_token(&request.token), &new_hash, Utc::now())
            .await?;

        match redeemed {
            Some(user_id) => {
                audit_log(&AuditEvent::PasswordResetCompleted {
                    user_id,
                    client: client.clone(),
                });
                Ok(())
            }
            None => {
                audit_log(&AuditEvent::PasswordResetFailed {
                    reason: "token unknown, used or expired".to_string(),
                    client: client.clone(),
                });
                Err(AppError::InvalidOrExpiredResetToken)
            }
        }
    }

    /// Create a tenant together with its first admin account and mailbox
    pub async fn register_company(
        &self,
        request: RegisterCompanyRequest,
        client: &ClientInfo,
    ) -> Result<RegisteredTenant, AppError> {
        request.validate()?;
        validate_password_strength(&request.password).map_err(AppError::Validation)?;

        let admin_email = normalize_identifier(&request.admin_email);
        let domain = normalize_identifier(&request.domain);
        let local_part = admin_email.split('@').next().unwrap_or_default();
        let mailbox_address = format!("{local_part}@{domain}");

        let admin_password_hash =
            hash_password_with_config(&request.password, &self.password_config)
                .map_err(|e| AppError::Internal(e.to_string()))?;

        let tenant = NewTenant {
            company_name: request.company_name.trim().to_string(),
            domain: domain.clone(),
            admin_email: admin_email.clone(),
            admin_name: request.admin_name.trim().to_string(),
            admin_password_hash,
            mailbox_address,
        };

        match self.store.create_company_and_admin_user(tenant).await {
            Ok(registered) => {
                audit_log(&AuditEvent::RegistrationSuccess {
                    user_id: registered.admin.id,
                    company_id: registered.company.id,
                    email: admin_email,
                    domain,
                    client: client.clone(),
                });
                Ok(registered)
            }
            Err(e) => {
                audit_log(&AuditEvent::RegistrationFailure {
                    email: admin_email,
                    domain,
                    reason: e.to_string(),
                    client: client.clone(),
                });
                Err(e.into())
            }
        }
    }

    /// Ban an account on behalf of a verified session
    pub async fn ban_user(
        &self,
        actor: &Session,
        target_id: Uuid,
        request: BanRequest,
        client: &ClientInfo,
    ) -> Result<Account, AppError> {
        request.validate()?;
        let mut target = self.moderation_target(actor, target_id, client).await?;

        let reason = request
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let ban = BanState::banned(reason.clone(), actor.user_id, Utc::now());
        self.store.update_ban_state(target.id, &ban).await?;
        target.ban = ban;

        audit_log(&AuditEvent::AccountBanned {
            user_id: target.id,
            banned_by: actor.user_id,
            reason,
            client: client.clone(),
        });
        Ok(target)
    }

    pub async fn unban_user(
        &self,
        actor: &Session,
        target_id: Uuid,
        client: &ClientInfo,
    ) -> Result<Account, AppError> {
        let mut target = self.moderation_target(actor, target_id, client).await?;

        let ban = BanState::lifted();
        self.store.update_ban_state(target.id, &ban).await?;
        target.ban = ban;

        audit_log(&AuditEvent::AccountUnbanned {
            user_id: target.id,
            unbanned_by: actor.user_id,
            client: client.clone(),
        });
        Ok(target)
    }

    async fn moderation_target(
        &self,
        actor: &Session,
        target_id: Uuid,
        client: &ClientInfo,
    ) -> Result<Account, AppError> {
        let target = self
            .store
            .find_user_by_id(target_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if let Err(reason) = may_moderate(actor, &target) {
            audit_log(&AuditEvent::AccessDenied {
                user_id: Some(actor.user_id),
                email: Some(actor.email.clone()),
                resource: format!("users/{target_id}"),
                reason: reason.to_string(),
                client: client.clone(),
            });
            return Err(AppError::AdminAccessRequired);
        }
        Ok(target)
    }

    /// Live account record for a verified session
    pub async fn profile(&self, user_id: Uuid) -> Result<Account, AppError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)
    }
}

/// Moderation rules: no self-moderation, tenant admins stay inside their
/// tenant and never touch platform super admins.
fn may_moderate(actor: &Session, target: &Account) -> Result<(), &'static str> {
    if actor.user_id == target.id {
        return Err("cannot moderate own account");
    }
    match actor.role {
        UserRole::SuperAdmin => Ok(()),
        UserRole::Admin => {
            if target.role == UserRole::SuperAdmin {
                Err("target is super admin")
            } else if actor.company_id.is_none() || actor.company_id != target.company_id {
                Err("target belongs to another tenant")
            } else {
                Ok(())
            }
        }
        UserRole::User => Err("role not privileged"),
    }
}

fn identity_of(account: &Account) -> Identity {
    Identity {
        user_id: account.id,
        email: account.email.clone(),
        role: account.role,
        company_id: account.company_id,
    }
}

/// 32 random bytes, base64url without padding
fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest; only this form of a reset token is stored
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::InMemoryCredentialStore;
    use mailhost_core::{AccountStatus, Company, CompanyStatus};
    use tokio::sync::Mutex;

    const PASSWORD: &str = "Correct-Horse1";

    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ResetMailer for CapturingMailer {
        async fn send_reset_link(
            &self,
            email: &str,
            token: &str,
            _expires_at: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .await
                .push((email.to_string(), token.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<InMemoryCredentialStore>,
        mailer: Arc<CapturingMailer>,
        service: AuthService,
        company: Company,
        admin: Account,
    }

    fn account(email: &str, role: UserRole, company_id: Option<Uuid>) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: hash_password_with_config(PASSWORD, &PasswordConfig::low_cost())
                .unwrap(),
            name: "Test".to_string(),
            role,
            status: AccountStatus::Active,
            ban: BanState::default(),
            company_id,
            token_version: 0,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mailer = Arc::new(CapturingMailer::default());
        let config = AuthConfig::default();
        let service = AuthService::new(
            &config,
            store.clone(),
            Arc::new(TokenCodec::new(&config)),
            mailer.clone(),
            PasswordConfig::low_cost(),
        )
        .unwrap();

        let company = Company {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            domain: "acme.com".to_string(),
            status: CompanyStatus::Active,
            created_at: Utc::now(),
        };
        let admin = account("a@b.com", UserRole::Admin, Some(company.id));
        store.insert_company(company.clone()).await;
        store.insert_account(admin.clone()).await;

        Fixture {
            store,
            mailer,
            service,
            company,
            admin,
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn session_of(account: &Account) -> Session {
        Session {
            user_id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            role: account.role,
            company_id: account.company_id,
        }
    }

    #[tokio::test]
    async fn test_login_success_issues_both_tokens() {
        let f = fixture().await;
        let outcome = f
            .service
            .login(login_request("A@B.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(outcome.account.id, f.admin.id);
        assert!(outcome.account.last_login.is_some());

        let claims = f.service.codec().verify_access(&outcome.access.token).unwrap();
        assert_eq!(claims.sub, f.admin.id);
        assert_eq!(claims.company_id, Some(f.company.id));

        let refresh = f.service.codec().verify_refresh(&outcome.refresh.token).unwrap();
        assert_eq!(refresh.sub, f.admin.id);
        assert_eq!(refresh.ver, Some(0));

        let stored = f.store.account(f.admin.id).await.unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn test_login_unknown_email_and_wrong_password_look_alike() {
        let f = fixture().await;
        let unknown = f
            .service
            .login(login_request("nobody@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap_err();
        let wrong = f
            .service
            .login(login_request("a@b.com", "Wrong-Horse1"), &ClientInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert!(matches!(wrong, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_banned_account_with_correct_password() {
        let f = fixture().await;
        f.store
            .update_ban_state(
                f.admin.id,
                &BanState::banned(None, Uuid::new_v4(), Utc::now()),
            )
            .await
            .unwrap();

        let err = f
            .service
            .login(login_request("a@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccountInactive));
    }

    #[tokio::test]
    async fn test_login_banned_account_with_wrong_password_reveals_nothing() {
        let f = fixture().await;
        f.store
            .update_ban_state(
                f.admin.id,
                &BanState::banned(None, Uuid::new_v4(), Utc::now()),
            )
            .await
            .unwrap();

        let err = f
            .service
            .login(login_request("a@b.com", "Wrong-Horse1"), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_suspended_company() {
        let f = fixture().await;
        f.store
            .set_company_status(f.company.id, CompanyStatus::Suspended)
            .await;

        let err = f
            .service
            .login(login_request("a@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CompanySuspended));
    }

    #[tokio::test]
    async fn test_login_pending_company_is_rejected() {
        let f = fixture().await;
        f.store
            .set_company_status(f.company.id, CompanyStatus::Pending)
            .await;

        let err = f
            .service
            .login(login_request("a@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CompanySuspended));
    }

    #[tokio::test]
    async fn test_platform_staff_skip_tenant_check() {
        let f = fixture().await;
        let staff = account("ops@mailhost.io", UserRole::SuperAdmin, None);
        f.store.insert_account(staff.clone()).await;

        let outcome = f
            .service
            .login(login_request("ops@mailhost.io", PASSWORD), &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(outcome.account.id, staff.id);
    }

    #[tokio::test]
    async fn test_login_store_outage_is_unavailable() {
        let f = fixture().await;
        f.store.set_unavailable(true);

        let err = f
            .service
            .login(login_request("a@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_refresh_issues_access_token_only() {
        let f = fixture().await;
        let outcome = f
            .service
            .login(login_request("a@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap();

        let access = f
            .service
            .refresh_access_token(&outcome.refresh.token, &ClientInfo::default())
            .await
            .unwrap();
        let claims = f.service.codec().verify_access(&access.token).unwrap();
        assert_eq!(claims.sub, f.admin.id);
    }

    #[tokio::test]
    async fn test_refresh_rejections() {
        let f = fixture().await;
        let outcome = f
            .service
            .login(login_request("a@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap();
        let client = ClientInfo::default();

        // An access token is not a refresh token.
        let err = f
            .service
            .refresh_access_token(&outcome.access.token, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRefreshToken));

        // Superseded generation.
        f.store.bump_token_version(f.admin.id).await;
        let err = f
            .service
            .refresh_access_token(&outcome.refresh.token, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRefreshToken));

        // Unknown account.
        let orphan = f
            .service
            .codec()
            .issue_refresh_token(Uuid::new_v4(), None)
            .unwrap();
        let err = f
            .service
            .refresh_access_token(&orphan.token, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn test_refresh_rejects_banned_account() {
        let f = fixture().await;
        let outcome = f
            .service
            .login(login_request("a@b.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap();
        f.store
            .update_ban_state(
                f.admin.id,
                &BanState::banned(None, Uuid::new_v4(), Utc::now()),
            )
            .await
            .unwrap();

        let err = f
            .service
            .refresh_access_token(&outcome.refresh.token, &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_password_reset_is_single_use() {
        let f = fixture().await;
        let client = ClientInfo::default();
        f.service
            .request_password_reset(
                ForgotPasswordRequest {
                    email: "A@b.com".to_string(),
                },
                &client,
            )
            .await
            .unwrap();

        let (email, token) = f.mailer.sent.lock().await[0].clone();
        assert_eq!(email, "a@b.com");
        let stored = f.store.reset_token_hashes(f.admin.id).await;
        assert_eq!(stored, vec![hash_token(&token)]);

        let reset = |token: String| ResetPasswordRequest {
            token,
            new_password: "Brand-New-Pass2".to_string(),
        };
        f.service.reset_password(reset(token.clone()), &client).await.unwrap();
        let err = f
            .service
            .reset_password(reset(token), &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredResetToken));

        f.service
            .login(login_request("a@b.com", "Brand-New-Pass2"), &client)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_password_reset_retires_outstanding_refresh_tokens() {
        let f = fixture().await;
        let client = ClientInfo::default();
        let outcome = f
            .service
            .login(login_request("a@b.com", PASSWORD), &client)
            .await
            .unwrap();

        f.service
            .request_password_reset(
                ForgotPasswordRequest {
                    email: "a@b.com".to_string(),
                },
                &client,
            )
            .await
            .unwrap();
        let (_, token) = f.mailer.sent.lock().await[0].clone();
        f.service
            .reset_password(
                ResetPasswordRequest {
                    token,
                    new_password: "Brand-New-Pass2".to_string(),
                },
                &client,
            )
            .await
            .unwrap();

        let err = f
            .service
            .refresh_access_token(&outcome.refresh.token, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRefreshToken));

        let fresh = f
            .service
            .login(login_request("a@b.com", "Brand-New-Pass2"), &client)
            .await
            .unwrap();
        f.service
            .refresh_access_token(&fresh.refresh.token, &client)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_password_reset_for_unknown_email_succeeds_silently() {
        let f = fixture().await;
        f.service
            .request_password_reset(
                ForgotPasswordRequest {
                    email: "ghost@b.com".to_string(),
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        assert!(f.mailer.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_rejects_weak_password_before_store() {
        let f = fixture().await;
        f.store.set_unavailable(true);
        let err = f
            .service
            .reset_password(
                ResetPasswordRequest {
                    token: "whatever".to_string(),
                    new_password: "weak".to_string(),
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    fn registration(domain: &str, email: &str) -> RegisterCompanyRequest {
        RegisterCompanyRequest {
            company_name: "Globex".to_string(),
            domain: domain.to_string(),
            admin_name: "Hank".to_string(),
            admin_email: email.to_string(),
            password: PASSWORD.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_company() {
        let f = fixture().await;
        let registered = f
            .service
            .register_company(
                registration("Globex.COM", "Hank@Gmail.com"),
                &ClientInfo::default(),
            )
            .await
            .unwrap();

        assert_eq!(registered.company.domain, "globex.com");
        assert_eq!(registered.company.status, CompanyStatus::Active);
        assert_eq!(registered.admin.email, "hank@gmail.com");
        assert_eq!(registered.admin.role, UserRole::Admin);
        assert_eq!(registered.mailbox.address, "hank@globex.com");

        f.service
            .login(login_request("hank@gmail.com", PASSWORD), &ClientInfo::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_duplicate_email_leaves_no_orphan() {
        let f = fixture().await;
        let before = f.store.company_count().await;

        let err = f
            .service
            .register_company(registration("initech.com", "a@b.com"), &ClientInfo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::EmailAlreadyExists));
        assert_eq!(f.store.company_count().await, before);
    }

    #[tokio::test]
    async fn test_register_duplicate_domain() {
        let f = fixture().await;
        let err = f
            .service
            .register_company(registration("ACME.com", "new@acme.com"), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DomainAlreadyExists));
    }

    #[tokio::test]
    async fn test_ban_and_unban_within_tenant() {
        let f = fixture().await;
        let member = account("member@acme.com", UserRole::User, Some(f.company.id));
        f.store.insert_account(member.clone()).await;
        let actor = session_of(&f.admin);

        let banned = f
            .service
            .ban_user(
                &actor,
                member.id,
                BanRequest {
                    reason: Some("  spam  ".to_string()),
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        assert!(banned.ban.is_banned);
        assert_eq!(banned.ban.reason.as_deref(), Some("spam"));
        assert_eq!(banned.ban.banned_by, Some(f.admin.id));
        assert!(f.store.account(member.id).await.unwrap().ban.is_banned);

        let lifted = f
            .service
            .unban_user(&actor, member.id, &ClientInfo::default())
            .await
            .unwrap();
        assert!(!lifted.ban.is_banned);
        assert!(!f.store.account(member.id).await.unwrap().ban.is_banned);
    }

    #[tokio::test]
    async fn test_moderation_boundaries() {
        let f = fixture().await;
        let outsider = account("x@other.com", UserRole::User, Some(Uuid::new_v4()));
        let platform = account("root@mailhost.io", UserRole::SuperAdmin, None);
        f.store.insert_account(outsider.clone()).await;
        f.store.insert_account(platform.clone()).await;
        let actor = session_of(&f.admin);
        let client = ClientInfo::default();

        for target in [outsider.id, platform.id, f.admin.id] {
            let err = f
                .service
                .ban_user(&actor, target, BanRequest::default(), &client)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::AdminAccessRequired));
        }

        let err = f
            .service
            .ban_user(&actor, Uuid::new_v4(), BanRequest::default(), &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // Platform staff may act across tenants.
        f.service
            .ban_user(&session_of(&platform), outsider.id, BanRequest::default(), &client)
            .await
            .unwrap();
    }

    #[test]
    fn test_reset_token_shape() {
        let token = generate_reset_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_reset_token());
        assert_eq!(hash_token(&token).len(), 64);
    }
}
