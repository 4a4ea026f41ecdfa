//! Local mirror: projects and work items stored in SQLite.
//!
//! All routes require a signed-in user. Records are owned by the user's
//! display name.

use super::ApiErr;
use crate::error::AppError;
use crate::models::project::{self, Project};
use crate::models::work_item::{self, WorkItem};
use crate::models::{NewProject, NewWorkItem, Priority, WorkItemForm, WorkItemStatus, WorkItemType};
use crate::services::session::RequestContext;
use crate::services::web_server::AppState;
use axum::extract::{Path, State};
use axum::response::{Html, Redirect};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::{Deserialize, Serialize};
use tera::Context;

pub fn mirror_routes() -> Router<AppState> {
    Router::new()
        .route("/mirror", get(index))
        .route("/mirror/", get(index))
        .route("/mirror/create_project", post(create_project))
        .route("/mirror/boards/{project_id}", get(boards))
        .route("/mirror/add_item/{project_id}", post(add_item))
        .route("/mirror/update_item/{item_id}/{project_id}", post(update_item))
        .route("/mirror/pipelines", get(pipelines))
        .route("/mirror/upload_yaml", post(upload_yaml))
}

/// Work item row with its effective status for the board template.
#[derive(Serialize)]
struct WorkItemRow<'a> {
    #[serde(flatten)]
    item: &'a WorkItem,
    status_label: &'static str,
}

#[derive(Debug, Deserialize)]
struct StatusForm {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct YamlUpload {
    #[serde(default)]
    yaml_content: String,
}

/// Load a project the caller owns, or fail with `NotFound`.
async fn owned_project(state: &AppState, project_id: i64, owner: &str) -> Result<Project, AppError> {
    project::get_project_for_owner(&state.db, project_id, owner)
        .await?
        .ok_or_else(|| AppError::not_found_with_id("Project", project_id.to_string()))
}

fn board_url(project_id: i64) -> String {
    format!("/mirror/boards/{}", project_id)
}

async fn index(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ApiErr> {
    let user = ctx.require_user()?;
    let projects = project::list_projects_for_owner(&state.db, &user.name).await?;

    let mut context = Context::new();
    context.insert("projects", &projects);
    Ok(Html(state.renderer.render("mirror/index.html", "Local Projects", &ctx, context)?))
}

async fn create_project(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<NewProject>,
) -> Result<Redirect, ApiErr> {
    let user = ctx.require_user()?;
    if form.name.trim().is_empty() {
        return Err(AppError::invalid_input_field("Project name is required", "name").into());
    }

    let project = project::create_project(&state.db, &form, &user.name).await?;
    log::info!("[mirror] {} created project {} ({})", user.name, project.name, project.id);

    Ok(Redirect::to("/mirror/"))
}

async fn boards(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(project_id): Path<i64>,
) -> Result<Html<String>, ApiErr> {
    let user = ctx.require_user()?;
    let project = owned_project(&state, project_id, &user.name).await?;
    let items = work_item::list_work_items(&state.db, project.id).await?;

    let rows: Vec<WorkItemRow> = items
        .iter()
        .map(|item| WorkItemRow {
            item,
            status_label: item.status_enum().as_str(),
        })
        .collect();

    let mut context = Context::new();
    context.insert("project", &project);
    context.insert("work_items", &rows);
    context.insert(
        "item_types",
        &WorkItemType::ALL.map(|t| t.as_str()),
    );
    context.insert("priorities", &Priority::ALL.map(|p| p.as_str()));
    context.insert("statuses", &WorkItemStatus::ALL.map(|s| s.as_str()));

    let title = project.name.clone();
    Ok(Html(state.renderer.render("mirror/boards.html", &title, &ctx, context)?))
}

async fn add_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(project_id): Path<i64>,
    Form(form): Form<WorkItemForm>,
) -> Result<Redirect, ApiErr> {
    let user = ctx.require_user()?;
    let project = owned_project(&state, project_id, &user.name).await?;
    let new_item = NewWorkItem::try_from(form)?;

    let item = work_item::create_work_item(&state.db, project.id, &new_item, &user.name).await?;
    log::info!("[mirror] Added work item {} to project {}", item.id, project.id);

    Ok(Redirect::to(&board_url(project.id)))
}

async fn update_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((item_id, project_id)): Path<(i64, i64)>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect, ApiErr> {
    let user = ctx.require_user()?;
    let project = owned_project(&state, project_id, &user.name).await?;
    let status: WorkItemStatus = form.status.parse()?;

    let item = work_item::get_work_item(&state.db, item_id)
        .await?
        .filter(|item| item.project_id == project.id)
        .ok_or_else(|| AppError::not_found_with_id("WorkItem", item_id.to_string()))?;

    if !work_item::update_status(&state.db, item.id, project.id, status).await? {
        return Err(AppError::not_found_with_id("WorkItem", item_id.to_string()).into());
    }
    log::info!(
        "[mirror] Work item {} ({}) set to {}",
        item.id,
        item.title,
        status
    );

    Ok(Redirect::to(&board_url(project.id)))
}

async fn pipelines(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ApiErr> {
    ctx.require_user()?;

    let mut context = Context::new();
    context.insert("yaml", &ctx.uploaded_yaml);
    Ok(Html(state.renderer.render("mirror/pipelines.html", "Pipelines", &ctx, context)?))
}

/// Parse and normalize an uploaded pipeline definition.
pub fn normalize_yaml(content: &str) -> Result<String, AppError> {
    let document: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| AppError::invalid_input_field(format!("Invalid YAML: {}", e), "yaml_content"))?;

    serde_yaml::to_string(&document)
        .map_err(|e| AppError::internal(format!("Failed to serialize YAML: {}", e)))
}

async fn upload_yaml(ctx: RequestContext, Form(form): Form<YamlUpload>) -> Result<Redirect, ApiErr> {
    ctx.require_user()?;
    let normalized = normalize_yaml(&form.yaml_content)?;

    ctx.update(|data| data.uploaded_yaml = Some(normalized)).await;
    Ok(Redirect::to("/mirror/pipelines"))
}
