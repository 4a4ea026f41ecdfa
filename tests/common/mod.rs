//! Shared fixtures: a recording fake of the remote API and a test app.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use devops_dashboard::config::IdentityConfig;
use devops_dashboard::error::AppError;
use devops_dashboard::services::devops_client::{
    DevOpsApi, GitItem, GitPush, GitPushResult, GitRef, Pipeline, PipelineRun, RemoteProject,
    RemoteWorkItem,
};
use devops_dashboard::services::session::SESSION_COOKIE;
use devops_dashboard::services::{AppState, IdentityClient, Renderer, SessionStore, UserIdentity};
use http_body_util::BodyExt;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Fake remote API that records every call it receives.
pub struct FakeDevOps {
    pub projects: Vec<RemoteProject>,
    pub work_item_ids: Vec<i64>,
    pub work_items: Vec<RemoteWorkItem>,
    pub pipelines: Vec<Pipeline>,
    pub runs: HashMap<i64, Vec<PipelineRun>>,
    pub refs: Vec<GitRef>,
    pub item: GitItem,
    pub blob: String,
    /// Make list endpoints fail with a transport error.
    pub fail_lists: bool,
    /// Reject pushes as if the branch moved.
    pub reject_push: bool,
    pub calls: Mutex<Vec<String>>,
    pub pushes: Mutex<Vec<GitPush>>,
    pub requested_ids: Mutex<Vec<Vec<i64>>>,
}

impl Default for FakeDevOps {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            work_item_ids: Vec::new(),
            work_items: Vec::new(),
            pipelines: Vec::new(),
            runs: HashMap::new(),
            refs: Vec::new(),
            item: GitItem::default(),
            blob: String::new(),
            fail_lists: false,
            reject_push: false,
            calls: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            requested_ids: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDevOps {
    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn pushes(&self) -> Vec<GitPush> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn requested_ids(&self) -> Vec<Vec<i64>> {
        self.requested_ids.lock().unwrap().clone()
    }

    fn list_failure(&self) -> Result<(), AppError> {
        if self.fail_lists {
            Err(AppError::transport("Failed to connect to server"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DevOpsApi for FakeDevOps {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>, AppError> {
        self.record("list_projects");
        self.list_failure()?;
        Ok(self.projects.clone())
    }

    async fn query_recent_work_item_ids(&self, _project: &str) -> Result<Vec<i64>, AppError> {
        self.record("query_recent_work_item_ids");
        self.list_failure()?;
        Ok(self.work_item_ids.clone())
    }

    async fn get_work_items(
        &self,
        _project: &str,
        ids: &[i64],
    ) -> Result<Vec<RemoteWorkItem>, AppError> {
        self.record("get_work_items");
        self.requested_ids.lock().unwrap().push(ids.to_vec());
        Ok(self
            .work_items
            .iter()
            .filter(|w| ids.contains(&w.id))
            .cloned()
            .collect())
    }

    async fn list_pipelines(&self, _project: &str) -> Result<Vec<Pipeline>, AppError> {
        self.record("list_pipelines");
        self.list_failure()?;
        Ok(self.pipelines.clone())
    }

    async fn get_pipeline(&self, _project: &str, pipeline_id: i64) -> Result<Pipeline, AppError> {
        self.record("get_pipeline");
        self.pipelines
            .iter()
            .find(|p| p.id == pipeline_id)
            .cloned()
            .ok_or_else(|| AppError::remote_api_full("Pipeline not found", 404, "/pipelines"))
    }

    async fn list_pipeline_runs(
        &self,
        _project: &str,
        pipeline_id: i64,
    ) -> Result<Vec<PipelineRun>, AppError> {
        self.record("list_pipeline_runs");
        Ok(self.runs.get(&pipeline_id).cloned().unwrap_or_default())
    }

    async fn run_pipeline(&self, _project: &str, pipeline_id: i64) -> Result<PipelineRun, AppError> {
        self.record("run_pipeline");
        Ok(run(pipeline_id * 100, "inProgress", None))
    }

    async fn get_refs(
        &self,
        _project: &str,
        _repo_id: &str,
        _filter: &str,
    ) -> Result<Vec<GitRef>, AppError> {
        self.record("get_refs");
        Ok(self.refs.clone())
    }

    async fn get_item_metadata(
        &self,
        _project: &str,
        _repo_id: &str,
        _path: &str,
    ) -> Result<GitItem, AppError> {
        self.record("get_item_metadata");
        Ok(self.item.clone())
    }

    async fn get_blob_text(
        &self,
        _project: &str,
        _repo_id: &str,
        _object_id: &str,
    ) -> Result<String, AppError> {
        self.record("get_blob_text");
        Ok(self.blob.clone())
    }

    async fn push(
        &self,
        _project: &str,
        _repo_id: &str,
        push: &GitPush,
    ) -> Result<GitPushResult, AppError> {
        self.record("push");
        self.pushes.lock().unwrap().push(push.clone());
        if self.reject_push {
            return Err(AppError::remote_api_full(
                "TF401028: The reference 'refs/heads/main' has already been updated by another client",
                409,
                "/pushes",
            ));
        }
        Ok(GitPushResult {
            push_id: Some(7),
            commits: Vec::new(),
        })
    }
}

pub fn project(name: &str) -> RemoteProject {
    serde_json::from_value(json!({ "id": format!("id-{}", name), "name": name })).unwrap()
}

pub fn work_item(id: i64, title: &str) -> RemoteWorkItem {
    serde_json::from_value(json!({
        "id": id,
        "fields": {
            "System.Title": title,
            "System.State": "Active",
            "System.WorkItemType": "Bug",
            "System.AssignedTo": { "displayName": "Grace Hopper" }
        }
    }))
    .unwrap()
}

/// A YAML pipeline backed by a repository of `repo_type`.
pub fn yaml_pipeline(id: i64, repo_type: &str, default_branch: Option<&str>) -> Pipeline {
    let mut repository = json!({ "id": "repo-1", "type": repo_type });
    if let Some(branch) = default_branch {
        repository["defaultBranch"] = json!(branch);
    }
    serde_json::from_value(json!({
        "id": id,
        "name": format!("pipeline-{}", id),
        "configuration": {
            "type": "yaml",
            "path": "/azure-pipelines.yml",
            "repository": repository
        }
    }))
    .unwrap()
}

pub fn run(id: i64, state: &str, result: Option<&str>) -> PipelineRun {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("20240101.{}", id),
        "state": state,
        "result": result
    }))
    .unwrap()
}

pub fn git_ref(name: &str, object_id: &str) -> GitRef {
    GitRef {
        name: name.to_string(),
        object_id: Some(object_id.to_string()),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub api: Arc<FakeDevOps>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new(api: FakeDevOps) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = devops_dashboard::db::initialize(&dir.path().join("test.db"))
            .await
            .unwrap();

        let identity = IdentityClient::new(
            IdentityConfig {
                authority: "https://login.example.com/tenant".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "http://localhost:5000/getAToken".to_string(),
            },
            5,
        )
        .unwrap();

        let api = Arc::new(api);
        let state = AppState {
            db,
            api: api.clone(),
            renderer: Arc::new(Renderer::new().unwrap()),
            identity: Arc::new(identity),
            sessions: SessionStore::new("test-secret"),
            callback_path: "/getAToken".to_string(),
            static_dir: PathBuf::from("static"),
        };

        Self {
            state,
            api,
            _dir: dir,
        }
    }

    pub fn router(&self) -> axum::Router {
        devops_dashboard::services::build_router(self.state.clone())
    }

    /// Cookie header for a fresh session, optionally signed in and with a project.
    pub async fn session(&self, user: Option<&str>, project: Option<&str>) -> (String, String) {
        let sessions = &self.state.sessions;
        let id = sessions.create().await;
        let user = user.map(|name| UserIdentity {
            name: name.to_string(),
            preferred_username: None,
            subject: None,
        });
        let project = project.map(String::from);
        sessions
            .update(&id, |data| {
                data.user = user;
                data.project = project;
            })
            .await;

        let cookie = format!("{}={}", SESSION_COOKIE, sessions.cookie_value(&id));
        (id, cookie)
    }
}

pub fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn post_form(uri: &str, cookie: &str, form: &[(&str, &str)]) -> Request<Body> {
    let body = form
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(resp: &Response<Body>) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}
