//! Pipeline listing, runs and the YAML editor.
//!
//! Every route here needs a selected project and sends the browser back to
//! `/` when there is none.

use super::ApiErr;
use crate::services::dashboard;
use crate::services::session::RequestContext;
use crate::services::web_server::AppState;
use crate::services::yaml_sync::YamlSynchronizer;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use tera::Context;

pub fn pipeline_routes() -> Router<AppState> {
    Router::new()
        .route("/pipelines", get(list_pipelines))
        .route("/pipelines/{id}", get(pipeline_detail))
        .route("/pipelines/{id}/run", get(confirm_run).post(run_pipeline))
        .route("/pipelines/{id}/yaml", get(edit_yaml).post(commit_yaml))
}

#[derive(Debug, Deserialize)]
struct YamlForm {
    #[serde(default)]
    yaml_content: String,
}

fn back_to_dashboard() -> Result<Response, ApiErr> {
    Ok(Redirect::to("/").into_response())
}

async fn list_pipelines(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, ApiErr> {
    let Some(project) = ctx.project.as_deref() else {
        return back_to_dashboard();
    };

    let pipelines = dashboard::pipelines_with_latest_run(state.api.as_ref(), project).await;

    let mut context = Context::new();
    context.insert("pipelines", &pipelines);
    let html = state.renderer.render("pipelines.html", "Pipelines", &ctx, context)?;
    Ok(Html(html).into_response())
}

async fn pipeline_detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, ApiErr> {
    let Some(project) = ctx.project.as_deref() else {
        return back_to_dashboard();
    };

    let pipeline = state.api.get_pipeline(project, id).await?;

    let mut context = Context::new();
    context.insert("pipeline", &pipeline);
    let html = state
        .renderer
        .render("pipeline_detail.html", "Pipeline Detail", &ctx, context)?;
    Ok(Html(html).into_response())
}

async fn confirm_run(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, ApiErr> {
    if ctx.project.is_none() {
        return back_to_dashboard();
    }

    let mut context = Context::new();
    context.insert("pipeline_id", &id);
    let html = state
        .renderer
        .render("confirm_run.html", "Run Pipeline", &ctx, context)?;
    Ok(Html(html).into_response())
}

async fn run_pipeline(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, ApiErr> {
    let Some(project) = ctx.project.as_deref() else {
        return back_to_dashboard();
    };

    let run = state.api.run_pipeline(project, id).await?;
    log::info!(
        "[server] Queued run {} of pipeline {} in {}",
        run.id,
        id,
        project
    );

    Ok(Redirect::to("/pipelines").into_response())
}

async fn edit_yaml(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Response, ApiErr> {
    let Some(project) = ctx.project.as_deref() else {
        return back_to_dashboard();
    };

    let sync = YamlSynchronizer::new(state.api.as_ref(), project);
    let source = sync.load_source(id).await?;
    let yaml = sync.read_yaml(&source).await?;

    let mut context = Context::new();
    context.insert("yaml", &yaml);
    context.insert("file_path", &source.yaml_path);
    context.insert("pipeline_id", &id);
    let html = state
        .renderer
        .render("edit_yaml.html", "Edit Pipeline YAML", &ctx, context)?;
    Ok(Html(html).into_response())
}

async fn commit_yaml(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i64>,
    Form(form): Form<YamlForm>,
) -> Result<Response, ApiErr> {
    let Some(project) = ctx.project.as_deref() else {
        return back_to_dashboard();
    };

    let sync = YamlSynchronizer::new(state.api.as_ref(), project);
    let source = sync.load_source(id).await?;
    let result = sync.commit_yaml(&source, &form.yaml_content).await?;

    log::info!(
        "[yaml-sync] Committed {} for pipeline {} (push {:?})",
        source.yaml_path,
        id,
        result.push_id
    );

    Ok(Redirect::to("/pipelines").into_response())
}
