//! mailhost API server

use mailhost_api::auth::{PasswordConfig, PgCredentialStore, TracingMailer};
use mailhost_api::{create_router, state::AppState};
use mailhost_core::{AppConfig, LoggingConfig};
use std::sync::Arc;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "mailhost_api={level},audit={level},tower_http=info",
            level = logging.level
        )
        .into()
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("MAILHOST_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

/// Resolve on Ctrl+C, reporting not-ready first so traffic drains
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    state.set_ready(false);
    tracing::info!("shutdown requested, no longer ready");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);

    let store = PgCredentialStore::connect(&config.database).await?;
    store.ensure_schema().await?;
    tracing::info!("Credential store connected and schema ensured");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(
        config,
        Arc::new(store),
        Arc::new(TracingMailer),
        PasswordConfig::default(),
    )?);

    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("mailhost API server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}
