//! Public authentication endpoints
//!
//! Registration, login, refresh, logout and the password reset pair. None of
//! these sit behind the gate; the access token they hand out is what the
//! gate and guard look for on the admin surface.

use crate::audit::ClientInfo;
use crate::auth::models::{
    AccountPublic, CompanyPublic, ForgotPasswordRequest, LoginRequest, LoginResponse,
    LogoutRequest, MessageResponse, RefreshRequest, RefreshResponse, RegisterCompanyRequest,
    RegisterResponse, ResetPasswordRequest,
};
use crate::auth::transport::{access_cookie, clear_access_cookie};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::Cookie;
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

/// JSON body plus a `Set-Cookie` header for the access token
pub struct WithAccessCookie<T> {
    status: StatusCode,
    body: T,
    cookie: Cookie<'static>,
}

impl<T: Serialize> IntoResponse for WithAccessCookie<T> {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();

        if let Ok(cookie_value) = self.cookie.to_string().parse() {
            response
                .headers_mut()
                .insert(header::SET_COOKIE, cookie_value);
        }

        response
    }
}

/// Register a company with its first admin
///
/// Creates the tenant, the admin account and the admin's mailbox in one
/// transaction. The tenant starts active.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterCompanyRequest,
    responses(
        (status = 201, description = "Company registered", body = RegisterResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email or domain already taken", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RegisterCompanyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    let client = ClientInfo::from_headers(&headers);
    let tenant = state.auth.register_company(request, &client).await?;

    let response = RegisterResponse {
        company: CompanyPublic::from(&tenant.company),
        user: AccountPublic::from(&tenant.admin),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Login with email and password
///
/// Returns both tokens in the body and sets the access token as an
/// http-only cookie. Credential failures are indistinguishable.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse,
         headers(("Set-Cookie" = String, description = "Access token cookie"))),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 403, description = "Account or company not active", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<WithAccessCookie<LoginResponse>, AppError> {
    let Json(request) = body?;
    let client = ClientInfo::from_headers(&headers);
    let outcome = state.auth.login(request, &client).await?;

    let cookie = access_cookie(
        &state.config.auth,
        state.config.server.secure_cookies,
        outcome.access.token.clone(),
        state.auth.codec().access_ttl_secs(),
    );

    Ok(WithAccessCookie {
        status: StatusCode::OK,
        body: LoginResponse {
            user: AccountPublic::from(&outcome.account),
            token: outcome.access.token,
            refresh_token: outcome.refresh.token,
            expires_at: outcome.access.expires_at,
        },
        cookie,
    })
}

/// Exchange a refresh token for a new access token
///
/// The refresh token itself is not rotated.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token issued", body = RefreshResponse),
        (status = 400, description = "Malformed body", body = crate::error::ApiError),
        (status = 401, description = "Invalid refresh token", body = crate::error::ApiError),
        (status = 403, description = "Company not active", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<WithAccessCookie<RefreshResponse>, AppError> {
    let Json(request) = body?;
    request.validate()?;
    let client = ClientInfo::from_headers(&headers);
    let access = state
        .auth
        .refresh_access_token(&request.refresh_token, &client)
        .await?;

    let cookie = access_cookie(
        &state.config.auth,
        state.config.server.secure_cookies,
        access.token.clone(),
        state.auth.codec().access_ttl_secs(),
    );

    Ok(WithAccessCookie {
        status: StatusCode::OK,
        body: RefreshResponse {
            token: access.token,
            expires_at: access.expires_at,
        },
        cookie,
    })
}

/// Logout
///
/// Always succeeds and clears the access cookie. Tokens already handed out
/// stay valid until they expire.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    request_body(content = LogoutRequest, description = "Optional refresh token, for auditing"),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Option<Json<LogoutRequest>>,
) -> WithAccessCookie<MessageResponse> {
    let client = ClientInfo::from_headers(&headers);
    let request = request.map(|Json(body)| body).unwrap_or_default();
    state
        .auth
        .logout(request.refresh_token.as_deref(), &client)
        .await;

    WithAccessCookie {
        status: StatusCode::OK,
        body: MessageResponse::new("Logged out successfully"),
        cookie: clear_access_cookie(&state.config.auth, state.config.server.secure_cookies),
    }
}

/// Request a password reset link
///
/// The response is the same whether or not the email belongs to an account.
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse),
        (status = 400, description = "Malformed email", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = body?;
    let client = ClientInfo::from_headers(&headers);
    state.auth.request_password_reset(request, &client).await?;

    Ok(Json(MessageResponse::new(
        "If an account exists for this email, a reset link has been sent",
    )))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Weak password or invalid/expired token", body = crate::error::ApiError),
        (status = 503, description = "Store unavailable", body = crate::error::ApiError),
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = body?;
    let client = ClientInfo::from_headers(&headers);
    state.auth.reset_password(request, &client).await?;

    Ok(Json(MessageResponse::new("Password has been reset")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailhost_core::AuthConfig;

    #[test]
    fn test_with_access_cookie_sets_header() {
        let response = WithAccessCookie {
            status: StatusCode::OK,
            body: MessageResponse::new("ok"),
            cookie: access_cookie(&AuthConfig::default(), false, "tok".to_string(), 60),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("auth_token=tok"));
        assert!(cookie.contains("HttpOnly"));
    }
}
