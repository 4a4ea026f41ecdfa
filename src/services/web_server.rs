//! HTTP server hosting the dashboard.
//!
//! Both surfaces live in one router: the remote-API pages at the root and
//! the local mirror under `/mirror`. They share the session layer and the
//! sign-in flow but nothing else.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::routes::{auth_routes, dashboard_routes, mirror_routes, pipeline_routes};
use crate::services::devops_client::DevOpsApi;
use crate::services::identity::IdentityClient;
use crate::services::renderer::Renderer;
use crate::services::session::{session_middleware, SessionStore};
use axum::middleware;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub api: Arc<dyn DevOpsApi>,
    pub renderer: Arc<Renderer>,
    pub identity: Arc<IdentityClient>,
    pub sessions: SessionStore,
    /// Path the identity provider redirects back to.
    pub callback_path: String,
    pub static_dir: PathBuf,
}

/// Assemble the full router.
pub fn build_router(state: AppState) -> Router {
    let sessions = state.sessions.clone();
    let static_dir = state.static_dir.clone();

    Router::new()
        .merge(auth_routes(&state.callback_path))
        .merge(dashboard_routes())
        .merge(pipeline_routes())
        .merge(mirror_routes())
        .with_state(state)
        .layer(middleware::from_fn_with_state(sessions, session_middleware))
        .nest_service("/static", ServeDir::new(static_dir))
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind to {}: {}", addr, e)))?;

    log::info!("[server] Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    log::info!("[server] Server stopped");
    Ok(())
}
