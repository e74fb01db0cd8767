//! Route guard
//!
//! The authoritative check behind every admin surface. Unlike the request
//! gate it verifies the access token signature with the real secret and
//! confirms against the store that the account is still active, not banned,
//! still privileged and that its tenant is still active.
//!
//! Evaluation runs `Unchecked -> Checking -> Authorized | Denied`. `Denied`
//! is terminal: the handler behind the guard never runs.

use super::jwt::TokenCodec;
use super::repository::CredentialStore;
use super::transport::{extract_token, login_redirect, RouteKind};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use mailhost_core::{AuthConfig, UserRole};
use std::sync::Arc;
use uuid::Uuid;

/// Verified session, available to handlers as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// No usable session: send the caller back to login
    Unauthenticated { reason: String },
    /// Live session without the privileged role
    Forbidden {
        user_id: Uuid,
        email: String,
        reason: String,
    },
}

impl Denial {
    fn unauthenticated(reason: impl Into<String>) -> Self {
        Denial::Unauthenticated {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Unchecked,
    Checking,
    Authorized(Session),
    Denied(Denial),
}

impl GuardState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GuardState::Authorized(_) | GuardState::Denied(_))
    }
}

pub struct RouteGuard {
    codec: Arc<TokenCodec>,
    store: Arc<dyn CredentialStore>,
    cookie_name: String,
    login_path: String,
    forbidden_path: String,
}

impl RouteGuard {
    pub fn new(
        config: &AuthConfig,
        codec: Arc<TokenCodec>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            codec,
            store,
            cookie_name: config.cookie_name.clone(),
            login_path: config.login_path.clone(),
            forbidden_path: config.forbidden_path.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Drive the guard to a terminal state.
    ///
    /// Store failures are returned as errors instead of a denial, so an
    /// outage surfaces as `ServiceUnavailable` rather than a login redirect.
    pub async fn evaluate(&self, token: Option<&str>) -> Result<GuardState, AppError> {
        let mut state = GuardState::Unchecked;

        loop {
            state = match state {
                GuardState::Unchecked => match token {
                    Some(_) => GuardState::Checking,
                    None => GuardState::Denied(Denial::unauthenticated("no token provided")),
                },
                GuardState::Checking => match token {
                    Some(token) => self.check(token).await?,
                    None => GuardState::Denied(Denial::unauthenticated("no token provided")),
                },
                terminal => return Ok(terminal),
            };
        }
    }

    async fn check(&self, token: &str) -> Result<GuardState, AppError> {
        let claims = match self.codec.verify_access(token) {
            Ok(claims) => claims,
            Err(e) => {
                return Ok(GuardState::Denied(Denial::unauthenticated(format!(
                    "token rejected: {e}"
                ))))
            }
        };

        let Some(account) = self.store.find_user_by_id(claims.sub).await? else {
            return Ok(GuardState::Denied(Denial::unauthenticated(
                "account no longer exists",
            )));
        };

        if account.ban.is_banned {
            return Ok(GuardState::Denied(Denial::unauthenticated("account banned")));
        }
        if !account.is_active() {
            return Ok(GuardState::Denied(Denial::unauthenticated("account inactive")));
        }

        if let Some(company_id) = account.company_id {
            let company_active = self
                .store
                .find_company_by_id(company_id)
                .await?
                .is_some_and(|company| company.is_active());
            if !company_active {
                return Ok(GuardState::Denied(Denial::unauthenticated(
                    "company not active",
                )));
            }
        }

        // Role comes from the store, not from the token
        if !account.role.is_privileged() {
            return Ok(GuardState::Denied(Denial::Forbidden {
                user_id: account.id,
                email: account.email,
                reason: format!("role {} is not privileged", account.role.as_str()),
            }));
        }

        Ok(GuardState::Authorized(Session {
            user_id: account.id,
            email: account.email,
            name: account.name,
            role: account.role,
            company_id: account.company_id,
        }))
    }

    /// Redirect for pages, error body for API routes
    pub fn deny_response(&self, denial: &Denial, original: &str) -> Response {
        let path = original.split('?').next().unwrap_or(original);

        match (RouteKind::of(path), denial) {
            (RouteKind::Page, Denial::Unauthenticated { .. }) => {
                Redirect::to(&login_redirect(&self.login_path, original)).into_response()
            }
            (RouteKind::Page, Denial::Forbidden { .. }) => {
                Redirect::to(&self.forbidden_path).into_response()
            }
            (RouteKind::Api, Denial::Unauthenticated { .. }) => {
                AppError::AuthenticationRequired.into_response()
            }
            (RouteKind::Api, Denial::Forbidden { .. }) => {
                AppError::AdminAccessRequired.into_response()
            }
        }
    }
}

fn audit_denial(denial: &Denial, resource: &str, client: ClientInfo) {
    let event = match denial {
        Denial::Unauthenticated { reason } => AuditEvent::InvalidToken {
            resource: resource.to_string(),
            reason: reason.clone(),
            client,
        },
        Denial::Forbidden {
            user_id,
            email,
            reason,
        } => AuditEvent::AccessDenied {
            user_id: Some(*user_id),
            email: Some(email.clone()),
            resource: resource.to_string(),
            reason: reason.clone(),
            client,
        },
    };
    audit_log(&event);
}

/// Guard middleware for admin routers (`route_layer`)
pub async fn guard_middleware(
    State(state): State<Arc<AppState>>,
    OriginalUri(original): OriginalUri,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers(), state.guard.cookie_name());

    match state.guard.evaluate(token.as_deref()).await? {
        GuardState::Authorized(session) => {
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
        GuardState::Denied(denial) => {
            let original = original
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| original.path().to_string());

            audit_denial(
                &denial,
                original.split('?').next().unwrap_or(&original),
                ClientInfo::from_headers(request.headers()),
            );
            Ok(state.guard.deny_response(&denial, &original))
        }
        GuardState::Unchecked | GuardState::Checking => Err(AppError::Internal(
            "route guard stopped before reaching a verdict".to_string(),
        )),
    }
}
