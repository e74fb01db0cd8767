//! Admin surface handlers
//!
//! Every route here is mounted behind the route guard, so a [`Session`]
//! extension is always present.

use crate::audit::ClientInfo;
use crate::auth::models::{AccountPublic, BanRequest};
use crate::auth::Session;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Html,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Profile of the verified session
#[utoipa::path(
    get,
    path = "/api/admin/me",
    tag = "admin",
    responses(
        (status = 200, description = "Current admin profile", body = AccountPublic),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Admin access required", body = crate::error::ApiError),
    ),
    security(("bearerAuth" = []), ("cookieAuth" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<AccountPublic>, AppError> {
    let account = state.auth.profile(session.user_id).await?;
    Ok(Json(AccountPublic::from(&account)))
}

/// Ban an account
///
/// Tenant admins may only ban accounts of their own company and never a
/// super admin. Nobody can ban themselves.
#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/ban",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Account to ban")),
    request_body(content = BanRequest, description = "Optional ban reason"),
    responses(
        (status = 200, description = "Account banned", body = AccountPublic),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Not allowed to moderate this account", body = crate::error::ApiError),
        (status = 404, description = "Account not found", body = crate::error::ApiError),
    ),
    security(("bearerAuth" = []), ("cookieAuth" = []))
)]
pub async fn ban_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
    request: Option<Json<BanRequest>>,
) -> Result<Json<AccountPublic>, AppError> {
    let client = ClientInfo::from_headers(&headers);
    let request = request.map(|Json(body)| body).unwrap_or_default();

    let account = state
        .auth
        .ban_user(&session, user_id, request, &client)
        .await?;
    Ok(Json(AccountPublic::from(&account)))
}

/// Lift a ban
#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/unban",
    tag = "admin",
    params(("id" = Uuid, Path, description = "Account to unban")),
    responses(
        (status = 200, description = "Ban lifted", body = AccountPublic),
        (status = 401, description = "Authentication required", body = crate::error::ApiError),
        (status = 403, description = "Not allowed to moderate this account", body = crate::error::ApiError),
        (status = 404, description = "Account not found", body = crate::error::ApiError),
    ),
    security(("bearerAuth" = []), ("cookieAuth" = []))
)]
pub async fn unban_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<AccountPublic>, AppError> {
    let client = ClientInfo::from_headers(&headers);
    let account = state.auth.unban_user(&session, user_id, &client).await?;
    Ok(Json(AccountPublic::from(&account)))
}

/// Admin console shell, rendered only for a verified session
pub async fn admin_page_handler(Extension(session): Extension<Session>) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html><head><title>mailhost admin</title></head>\
         <body><h1>mailhost admin</h1><p>Signed in as {} ({})</p></body></html>\n",
        escape_html(&session.email),
        session.role.as_str(),
    ))
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailhost_core::UserRole;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[tokio::test]
    async fn test_admin_page_names_the_session() {
        let Html(body) = admin_page_handler(Extension(Session {
            user_id: Uuid::new_v4(),
            email: "boss@acme.com".to_string(),
            name: "Boss".to_string(),
            role: UserRole::SuperAdmin,
            company_id: None,
        }))
        .await;

        assert!(body.contains("boss@acme.com"));
        assert!(body.contains("super_admin"));
    }
}
