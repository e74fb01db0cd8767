//! API route definitions

use crate::auth::{gate_middleware, guard_middleware};
use crate::handlers::{admin, auth, health};
use crate::middleware::{metrics_middleware, prometheus_metrics};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Public auth routes, nested under `/api/auth`
pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(auth::register_handler))
        .route("/login", post(auth::login_handler))
        .route("/refresh", post(auth::refresh_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/forgot-password", post(auth::forgot_password_handler))
        .route("/reset-password", post(auth::reset_password_handler))
}

/// Admin API, nested under `/api/admin`, behind the route guard
pub fn admin_api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(admin::me_handler))
        .route("/users/:id/ban", post(admin::ban_handler))
        .route("/users/:id/unban", post(admin::unban_handler))
        .route_layer(middleware::from_fn_with_state(state, guard_middleware))
}

/// Admin pages, behind the route guard
pub fn admin_page_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin", get(admin::admin_page_handler))
        .route("/admin/*path", get(admin::admin_page_handler))
        .route_layer(middleware::from_fn_with_state(state, guard_middleware))
}

/// Probes and metrics
pub fn ops_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(prometheus_metrics))
}

/// Assemble the full application: the request gate runs on every request,
/// the route guard only on admin routers.
pub fn app_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ops_routes())
        .nest("/api/auth", auth_routes())
        .nest("/api/admin", admin_api_routes(state.clone()))
        .merge(admin_page_routes(state.clone()))
        .merge(crate::docs::docs_router())
        .layer(middleware::from_fn_with_state(state.clone(), gate_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
