//! DevOps Dashboard - browser dashboard for Azure DevOps.
//!
//! Proxies projects, boards and pipelines from the Azure DevOps REST API,
//! edits pipeline YAML through the Git API, and keeps a small local mirror
//! of projects and work items in SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::AppConfig;
use error::StartupError;
use services::{
    build_router, AppState, DevOpsClient, DevOpsClientConfig, IdentityClient, Renderer,
    SessionStore,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build the shared state from a loaded configuration.
pub async fn build_state(config: &AppConfig) -> Result<AppState, StartupError> {
    let db = db::initialize(&config.database_path).await?;

    let api = DevOpsClient::new(DevOpsClientConfig {
        base_url: config.devops_base_url.clone(),
        organization: config.organization.clone(),
        token: config.personal_access_token.clone(),
        timeout_secs: config.request_timeout_secs,
    })?;

    let identity = IdentityClient::new(config.identity.clone(), config.request_timeout_secs)?;

    Ok(AppState {
        db,
        api: Arc::new(api),
        renderer: Arc::new(Renderer::new()?),
        identity: Arc::new(identity),
        sessions: SessionStore::new(config.session_secret.as_str()),
        callback_path: config.callback_path(),
        static_dir: config.static_dir.clone(),
    })
}

/// Load configuration, open the database and serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    log::info!(
        "[server] Starting for organization {} (database {})",
        config.organization,
        config.database_path.display()
    );

    let state = build_state(&config).await?;
    let router = build_router(state);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[server] Failed to listen for shutdown signal: {}", e);
            return;
        }
        log::info!("[server] Shutdown requested");
        trigger.cancel();
    });

    services::web_server::serve(router, config.bind_addr, shutdown).await?;
    Ok(())
}
