//! mailhost API - authentication core of the multi-tenant email service
//!
//! Provides tenant registration, login, token refresh, password reset and
//! the two-layer protection (request gate, route guard) in front of the
//! admin surface.

pub mod audit;
pub mod auth;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::Router;
use state::AppState;
use std::sync::Arc;

pub use docs::ApiDoc;
pub use error::{ApiError, AppError};

/// Build the application router around shared state
pub fn create_router(state: Arc<AppState>) -> Router {
    routes::app_routes(state)
}

/// Helpers for integration tests: an [`AppState`] over the in-memory store
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use crate::auth::memory::InMemoryCredentialStore;
    use crate::auth::{PasswordConfig, TracingMailer};
    use crate::state::AppState;
    use mailhost_core::AppConfig;
    use std::sync::Arc;

    /// State wired to `store` with default config and cheap password hashing
    pub fn state_with_store(store: Arc<InMemoryCredentialStore>) -> Arc<AppState> {
        state_with(AppConfig::default(), store)
    }

    pub fn state_with(config: AppConfig, store: Arc<InMemoryCredentialStore>) -> Arc<AppState> {
        match AppState::new(
            config,
            store,
            Arc::new(TracingMailer),
            PasswordConfig::low_cost(),
        ) {
            Ok(state) => Arc::new(state),
            Err(e) => panic!("failed to build test state: {e}"),
        }
    }
}
