//! Read-only views over the remote API for the dashboard pages.
//!
//! List pages degrade to an empty list when the remote call fails; the
//! failure is logged here and the page renders without data.

use crate::error::AppError;
use crate::services::devops_client::{
    DevOpsApi, Pipeline, PipelineRun, RemoteProject, RemoteWorkItem,
};
use futures::future::join_all;
use serde::Serialize;

/// Maximum number of work items shown on the board.
pub const BOARD_LIMIT: usize = 20;

/// A work item flattened for the board template.
#[derive(Debug, Clone, Serialize)]
pub struct BoardItem {
    pub id: i64,
    pub title: String,
    pub state: Option<String>,
    pub work_item_type: Option<String>,
    pub assigned_to: Option<String>,
}

impl From<&RemoteWorkItem> for BoardItem {
    fn from(item: &RemoteWorkItem) -> Self {
        Self {
            id: item.id,
            title: item.title().to_string(),
            state: item.state().map(String::from),
            work_item_type: item.work_item_type().map(String::from),
            assigned_to: item.assigned_to().map(String::from),
        }
    }
}

/// A pipeline together with its most recent run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    #[serde(flatten)]
    pub pipeline: Pipeline,
    pub latest: Option<PipelineRun>,
}

fn or_empty<T>(result: Result<Vec<T>, AppError>, what: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        log::warn!("[dashboard] Rendering without {}: {}", what, e);
        Vec::new()
    })
}

/// Team projects in the organization.
pub async fn projects(api: &dyn DevOpsApi) -> Vec<RemoteProject> {
    or_empty(api.list_projects().await, "projects")
}

/// The newest work items of `project`, at most [`BOARD_LIMIT`].
pub async fn recent_work_items(api: &dyn DevOpsApi, project: &str) -> Vec<BoardItem> {
    let mut ids = or_empty(api.query_recent_work_item_ids(project).await, "work item ids");
    ids.truncate(BOARD_LIMIT);

    if ids.is_empty() {
        return Vec::new();
    }

    or_empty(api.get_work_items(project, &ids).await, "work items")
        .iter()
        .map(BoardItem::from)
        .collect()
}

/// Pipelines of `project`, each with its latest run if any.
pub async fn pipelines_with_latest_run(
    api: &dyn DevOpsApi,
    project: &str,
) -> Vec<PipelineSummary> {
    let pipelines = or_empty(api.list_pipelines(project).await, "pipelines");

    let runs = join_all(
        pipelines
            .iter()
            .map(|p| api.list_pipeline_runs(project, p.id)),
    )
    .await;

    pipelines
        .into_iter()
        .zip(runs)
        .map(|(pipeline, runs)| PipelineSummary {
            latest: or_empty(runs, "pipeline runs").into_iter().next(),
            pipeline,
        })
        .collect()
}
