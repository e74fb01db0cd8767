//! Token transport helpers shared by the request gate and the route guard.
//!
//! Access tokens travel in an http-only cookie (preferred) or an
//! `Authorization: Bearer` header. Refresh tokens never travel here.

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use mailhost_core::AuthConfig;

/// Whether a rejected request should be answered with a redirect or JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Page,
    Api,
}

impl RouteKind {
    pub fn of(path: &str) -> Self {
        if path == "/api" || path.starts_with("/api/") {
            RouteKind::Api
        } else {
            RouteKind::Page
        }
    }
}

/// Locate the access token: cookie first, then bearer header.
///
/// Empty values count as absent.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Http-only, same-site cookie carrying an access token
pub fn access_cookie(
    config: &AuthConfig,
    secure: bool,
    token: String,
    max_age_secs: u64,
) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            i64::try_from(max_age_secs).unwrap_or(i64::MAX),
        ))
        .build()
}

/// Expired cookie that makes the browser drop the access token
pub fn clear_access_cookie(config: &AuthConfig, secure: bool) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), String::new()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

/// `/login?redirect=<original path and query>`
pub fn login_redirect(login_path: &str, original: &str) -> String {
    format!("{login_path}?redirect={}", urlencoding::encode(original))
}
