//! Project list, project selection and the remote work-item board.

use super::ApiErr;
use crate::services::dashboard;
use crate::services::session::RequestContext;
use crate::services::web_server::AppState;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use tera::Context;

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/select/{project}", get(select_project))
        .route("/boards", get(boards))
}

async fn index(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ApiErr> {
    let projects = dashboard::projects(state.api.as_ref()).await;

    let mut context = Context::new();
    context.insert("projects", &projects);
    Ok(Html(state.renderer.render("dashboard.html", "Dashboard", &ctx, context)?))
}

// Any name is accepted; an unknown project just yields empty pages.
async fn select_project(ctx: RequestContext, Path(project): Path<String>) -> Redirect {
    log::info!("[server] Selected project {}", project);
    ctx.select_project(&project).await;
    Redirect::to("/")
}

async fn boards(State(state): State<AppState>, ctx: RequestContext) -> Result<Response, ApiErr> {
    let Some(project) = ctx.project.as_deref() else {
        return Ok(Redirect::to("/").into_response());
    };

    let work_items = dashboard::recent_work_items(state.api.as_ref(), project).await;

    let mut context = Context::new();
    context.insert("work_items", &work_items);
    let html = state.renderer.render("boards.html", "Boards", &ctx, context)?;
    Ok(Html(html).into_response())
}
