//! Request gate
//!
//! First, cheap filter in front of the protected prefixes. It decodes the
//! access token WITHOUT checking its signature and never touches the store,
//! so a forged token with a future `exp` and a privileged role passes here.
//! That is acceptable only because every protected route also sits behind the
//! route guard, which is the actual authority.
//!
//! Decoded claims are forwarded as a [`GateIdentity`] extension and as
//! `x-user-*` / `x-company-id` headers. Client-supplied copies of those
//! headers are always stripped first.

use super::jwt::{decode_unverified, now_secs, Expiring};
use super::transport::{extract_token, login_redirect, RouteKind};
use crate::middleware::metrics;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use mailhost_core::{AuthConfig, UserRole};
use std::sync::Arc;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const COMPANY_ID_HEADER: &str = "x-company-id";

/// Claims as decoded by the gate. UNVERIFIED: never authorize on these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateIdentity {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    MissingToken,
    InvalidToken,
    ExpiredToken,
    InsufficientRole,
}

impl GateRejection {
    fn label(&self) -> &'static str {
        match self {
            GateRejection::MissingToken => "missing_token",
            GateRejection::InvalidToken => "invalid_token",
            GateRejection::ExpiredToken => "expired_token",
            GateRejection::InsufficientRole => "insufficient_role",
        }
    }

    fn api_message(&self) -> &'static str {
        match self {
            GateRejection::MissingToken => "No token provided",
            GateRejection::InvalidToken => "Invalid token",
            GateRejection::ExpiredToken => "Token expired",
            GateRejection::InsufficientRole => "Admin access required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Path is not protected
    Bypass,
    Pass(GateIdentity),
    Reject(GateRejection),
}

/// Gate configuration, resolved once from [`AuthConfig`]
#[derive(Debug, Clone)]
pub struct RequestGate {
    cookie_name: String,
    protected_prefixes: Vec<String>,
    login_path: String,
    forbidden_path: String,
}

impl RequestGate {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            cookie_name: config.cookie_name.clone(),
            protected_prefixes: config
                .protected_prefixes
                .iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            login_path: config.login_path.clone(),
            forbidden_path: config.forbidden_path.clone(),
        }
    }

    /// Segment-aware prefix match: `/admin` covers `/admin/x` but not `/administrator`
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Pure, single-pass decision for one request. No I/O.
    pub fn evaluate(&self, path: &str, headers: &HeaderMap, now: u64) -> GateDecision {
        if !self.is_protected(path) {
            return GateDecision::Bypass;
        }

        let Some(token) = extract_token(headers, &self.cookie_name) else {
            return GateDecision::Reject(GateRejection::MissingToken);
        };

        let Some(claims) = decode_unverified(&token) else {
            return GateDecision::Reject(GateRejection::InvalidToken);
        };

        if claims.is_expired_at(now) {
            return GateDecision::Reject(GateRejection::ExpiredToken);
        }

        if !claims.role.is_privileged() {
            return GateDecision::Reject(GateRejection::InsufficientRole);
        }

        GateDecision::Pass(GateIdentity {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            company_id: claims.company_id,
        })
    }

    /// Redirect for pages, JSON for API routes
    pub fn reject_response(&self, rejection: GateRejection, original: &str) -> Response {
        let path = original.split('?').next().unwrap_or(original);

        match (RouteKind::of(path), rejection) {
            (RouteKind::Page, GateRejection::InsufficientRole) => {
                Redirect::to(&self.forbidden_path).into_response()
            }
            (RouteKind::Page, _) => {
                Redirect::to(&login_redirect(&self.login_path, original)).into_response()
            }
            (RouteKind::Api, rejection) => {
                let status = if rejection == GateRejection::InsufficientRole {
                    StatusCode::FORBIDDEN
                } else {
                    StatusCode::UNAUTHORIZED
                };
                (
                    status,
                    Json(serde_json::json!({ "error": rejection.api_message() })),
                )
                    .into_response()
            }
        }
    }
}

/// Remove identity headers a client may have forged
fn strip_identity_headers(headers: &mut HeaderMap) {
    let forged: Vec<HeaderName> = headers
        .keys()
        .filter(|name| {
            let name = name.as_str();
            name.starts_with("x-user-") || name == COMPANY_ID_HEADER
        })
        .cloned()
        .collect();

    for name in forged {
        headers.remove(name);
    }
}

fn forward_identity(headers: &mut HeaderMap, identity: &GateIdentity) {
    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };

    set(USER_ID_HEADER, identity.user_id.to_string());
    set(USER_EMAIL_HEADER, identity.email.clone());
    set(USER_ROLE_HEADER, identity.role.as_str().to_string());
    if let Some(company_id) = identity.company_id {
        set(COMPANY_ID_HEADER, company_id.to_string());
    }
}

/// Gate middleware, layered over the whole router
pub async fn gate_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    strip_identity_headers(request.headers_mut());

    let path = request.uri().path().to_string();
    match state.gate.evaluate(&path, request.headers(), now_secs()) {
        GateDecision::Bypass => next.run(request).await,
        GateDecision::Pass(identity) => {
            metrics::record_gate_decision("pass");
            forward_identity(request.headers_mut(), &identity);
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        GateDecision::Reject(rejection) => {
            metrics::record_gate_decision(rejection.label());
            tracing::debug!(path = %path, reason = rejection.label(), "request gate rejected");

            let original = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or(path);
            state.gate.reject_response(rejection, &original)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Identity, TokenCodec};
    use axum::http::header;

    fn gate() -> RequestGate {
        RequestGate::new(&AuthConfig::default())
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn token_for(role: UserRole, secret: &str, issued_at: u64) -> String {
        let mut config = AuthConfig::default();
        config.access_secret = secret.to_string();
        TokenCodec::new(&config)
            .issue_access_token_at(
                &Identity {
                    user_id: Uuid::new_v4(),
                    email: "a@b.com".to_string(),
                    role,
                    company_id: None,
                },
                issued_at,
            )
            .unwrap()
            .token
    }

    #[test]
    fn test_unprotected_paths_bypass() {
        let gate = gate();
        assert_eq!(
            gate.evaluate("/api/auth/login", &HeaderMap::new(), now_secs()),
            GateDecision::Bypass
        );
        assert_eq!(
            gate.evaluate("/administrator", &HeaderMap::new(), now_secs()),
            GateDecision::Bypass
        );
    }

    #[test]
    fn test_missing_token() {
        assert_eq!(
            gate().evaluate("/admin/users", &HeaderMap::new(), now_secs()),
            GateDecision::Reject(GateRejection::MissingToken)
        );
    }

    #[test]
    fn test_garbage_token() {
        assert_eq!(
            gate().evaluate("/admin", &bearer("not.a.jwt"), now_secs()),
            GateDecision::Reject(GateRejection::InvalidToken)
        );
    }

    #[test]
    fn test_expired_token() {
        let now = now_secs();
        let token = token_for(UserRole::Admin, "any-secret", now - 7200);
        assert_eq!(
            gate().evaluate("/api/admin/me", &bearer(&token), now),
            GateDecision::Reject(GateRejection::ExpiredToken)
        );
    }

    #[test]
    fn test_insufficient_role() {
        let now = now_secs();
        let token = token_for(UserRole::User, "any-secret", now);
        assert_eq!(
            gate().evaluate("/admin", &bearer(&token), now),
            GateDecision::Reject(GateRejection::InsufficientRole)
        );
    }

    #[test]
    fn test_forged_signature_still_passes_the_gate() {
        let now = now_secs();
        let token = token_for(UserRole::SuperAdmin, "attacker-secret", now);
        assert!(matches!(
            gate().evaluate("/admin/settings", &bearer(&token), now),
            GateDecision::Pass(GateIdentity {
                role: UserRole::SuperAdmin,
                ..
            })
        ));
    }

    #[test]
    fn test_strip_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-role", HeaderValue::from_static("super_admin"));
        headers.insert("x-user-id", HeaderValue::from_static("someone"));
        headers.insert("x-company-id", HeaderValue::from_static("other"));
        headers.insert("x-request-id", HeaderValue::from_static("keep"));

        strip_identity_headers(&mut headers);
        assert!(headers.get("x-user-role").is_none());
        assert!(headers.get("x-user-id").is_none());
        assert!(headers.get("x-company-id").is_none());
        assert_eq!(headers["x-request-id"], "keep");
    }

    #[test]
    fn test_reject_responses() {
        let gate = gate();

        let page = gate.reject_response(GateRejection::MissingToken, "/admin/users?tab=banned");
        assert_eq!(page.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            page.headers()[header::LOCATION],
            "/login?redirect=%2Fadmin%2Fusers%3Ftab%3Dbanned"
        );

        let forbidden = gate.reject_response(GateRejection::InsufficientRole, "/admin");
        assert_eq!(forbidden.headers()[header::LOCATION], "/unauthorized");

        let api = gate.reject_response(GateRejection::ExpiredToken, "/api/admin/me");
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);

        let api = gate.reject_response(GateRejection::InsufficientRole, "/api/admin/me");
        assert_eq!(api.status(), StatusCode::FORBIDDEN);
    }
}
