//! Application state management

use crate::auth::{
    AuthService, CredentialStore, PasswordConfig, RequestGate, ResetMailer, RouteGuard,
    TokenCodec,
};
use crate::error::AppError;
use mailhost_core::AppConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers and middleware
pub struct AppState {
    /// Resolved once at startup
    pub config: AppConfig,
    pub store: Arc<dyn CredentialStore>,
    pub auth: AuthService,
    pub gate: RequestGate,
    pub guard: RouteGuard,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Wire the auth core around a credential store
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn ResetMailer>,
        password_config: PasswordConfig,
    ) -> Result<Self, AppError> {
        let codec = Arc::new(TokenCodec::new(&config.auth));
        let auth = AuthService::new(
            &config.auth,
            store.clone(),
            codec.clone(),
            mailer,
            password_config,
        )?;
        let gate = RequestGate::new(&config.auth);
        let guard = RouteGuard::new(&config.auth, codec, store.clone());

        Ok(Self {
            config,
            store,
            auth,
            gate,
            guard,
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
