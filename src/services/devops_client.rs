//! Azure DevOps REST API client.
//!
//! Wraps the handful of `_apis` endpoints the dashboard uses behind the
//! [`DevOpsApi`] trait. Every call authenticates with a Basic header built
//! from the personal access token and pins a fixed `api-version`.

use crate::error::AppError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const PROJECTS_API_VERSION: &str = "7.1-preview.4";
const PIPELINES_API_VERSION: &str = "7.1-preview.1";
const WIT_API_VERSION: &str = "7.1";
const REFS_API_VERSION: &str = "7.1-preview";
const GIT_API_VERSION: &str = "7.1";

/// Fixed board query: every work item, newest first.
pub const RECENT_WORK_ITEMS_WIQL: &str = "SELECT [System.Id], [System.Title], [System.State] FROM WorkItems ORDER BY [System.CreatedDate] DESC";

/// Azure DevOps client configuration.
#[derive(Debug, Clone)]
pub struct DevOpsClientConfig {
    /// Service URL without organization (e.g., `https://dev.azure.com`).
    pub base_url: String,

    /// Organization name, appended to the base URL.
    pub organization: String,

    /// Personal access token for Basic authentication.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DevOpsClientConfig {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_DEVOPS_BASE_URL.to_string(),
            organization: String::new(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Azure DevOps API client.
#[derive(Debug, Clone)]
pub struct DevOpsClient {
    client: Client,
    config: DevOpsClientConfig,
}

/// Envelope used by list endpoints: `{"count": n, "value": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// Team project from `_apis/projects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub state: Option<String>,
    pub last_update_time: Option<String>,
}

/// Response of a WIQL query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiqlResult {
    #[serde(default)]
    pub work_items: Vec<WorkItemReference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemReference {
    pub id: i64,
}

/// Work item from the batch endpoint; fields are keyed by reference name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteWorkItem {
    pub id: i64,
    pub rev: Option<i64>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub url: Option<String>,
}

impl RemoteWorkItem {
    fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    pub fn title(&self) -> &str {
        self.field_str("System.Title").unwrap_or("(untitled)")
    }

    pub fn state(&self) -> Option<&str> {
        self.field_str("System.State")
    }

    pub fn work_item_type(&self) -> Option<&str> {
        self.field_str("System.WorkItemType")
    }

    /// Assignee display name; the API returns an identity object here.
    pub fn assigned_to(&self) -> Option<&str> {
        match self.fields.get("System.AssignedTo")? {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(identity) => identity
                .get("displayName")
                .and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// Pipeline definition from `_apis/pipelines`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub name: String,
    pub folder: Option<String>,
    pub revision: Option<i64>,
    pub url: Option<String>,
    /// Only present on the single-pipeline endpoint.
    pub configuration: Option<PipelineConfiguration>,
}

/// Where a pipeline's definition lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfiguration {
    /// Configuration kind, e.g. `yaml` or `designerJson`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Path of the YAML file inside the repository.
    pub path: Option<String>,
    pub repository: Option<RepositoryRef>,
}

/// Repository backing a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    pub id: Option<String>,
    /// `azureReposGit`, `gitHub`, ...
    #[serde(rename = "type")]
    pub repo_type: Option<String>,
    pub default_branch: Option<String>,
}

/// Pipeline run from `_apis/pipelines/{id}/runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: i64,
    pub name: Option<String>,
    pub state: Option<String>,
    pub result: Option<String>,
    pub created_date: Option<String>,
    pub finished_date: Option<String>,
    pub url: Option<String>,
}

/// Git ref from `_apis/git/repositories/{id}/refs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRef {
    pub name: String,
    pub object_id: Option<String>,
}

/// Item metadata from `_apis/git/repositories/{id}/items`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitItem {
    /// Blob id of the file content.
    pub object_id: Option<String>,
    pub commit_id: Option<String>,
    pub path: Option<String>,
}

/// Body of `POST _apis/git/repositories/{id}/pushes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitPush {
    pub ref_updates: Vec<GitRefUpdate>,
    pub commits: Vec<GitCommit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRefUpdate {
    pub name: String,
    /// Head the push is anchored to; the server rejects it if the ref moved.
    pub old_object_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitCommit {
    pub comment: String,
    pub changes: Vec<GitChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitChange {
    pub change_type: String,
    pub item: GitChangeItem,
    pub new_content: GitNewContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitChangeItem {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitNewContent {
    pub content: String,
    pub content_type: String,
}

/// Response of a successful push.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitPushResult {
    pub push_id: Option<i64>,
    #[serde(default)]
    pub commits: Vec<GitCommitRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommitRef {
    pub commit_id: String,
}

/// The remote operations the dashboard depends on.
///
/// Implemented by [`DevOpsClient`]; tests substitute recording fakes.
#[async_trait]
pub trait DevOpsApi: Send + Sync {
    /// List team projects in the organization.
    async fn list_projects(&self) -> Result<Vec<RemoteProject>, AppError>;

    /// Run [`RECENT_WORK_ITEMS_WIQL`] and return the matching ids in order.
    async fn query_recent_work_item_ids(&self, project: &str) -> Result<Vec<i64>, AppError>;

    /// Fetch work items by id in one batch.
    async fn get_work_items(
        &self,
        project: &str,
        ids: &[i64],
    ) -> Result<Vec<RemoteWorkItem>, AppError>;

    async fn list_pipelines(&self, project: &str) -> Result<Vec<Pipeline>, AppError>;

    async fn get_pipeline(&self, project: &str, pipeline_id: i64) -> Result<Pipeline, AppError>;

    /// Runs of a pipeline, most recent first.
    async fn list_pipeline_runs(
        &self,
        project: &str,
        pipeline_id: i64,
    ) -> Result<Vec<PipelineRun>, AppError>;

    /// Queue a new run with default parameters.
    async fn run_pipeline(&self, project: &str, pipeline_id: i64) -> Result<PipelineRun, AppError>;

    /// Refs whose name starts with `filter` (e.g. `heads/main`).
    async fn get_refs(
        &self,
        project: &str,
        repo_id: &str,
        filter: &str,
    ) -> Result<Vec<GitRef>, AppError>;

    async fn get_item_metadata(
        &self,
        project: &str,
        repo_id: &str,
        path: &str,
    ) -> Result<GitItem, AppError>;

    /// Raw blob content as text.
    async fn get_blob_text(
        &self,
        project: &str,
        repo_id: &str,
        object_id: &str,
    ) -> Result<String, AppError>;

    async fn push(
        &self,
        project: &str,
        repo_id: &str,
        push: &GitPush,
    ) -> Result<GitPushResult, AppError>;
}

impl DevOpsClient {
    /// Create a new Azure DevOps client.
    pub fn new(config: DevOpsClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let credential = STANDARD.encode(format!(":{}", config.token));
        let mut auth_value = header::HeaderValue::from_str(&format!("Basic {}", credential))
            .map_err(|_| AppError::internal("Invalid personal access token format"))?;
        auth_value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth_value);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the full URL for an organization-relative path.
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.organization),
            path.trim_start_matches('/')
        )
    }

    /// Decode a response body, mapping failures onto [`AppError`] kinds.
    async fn handle_response<T: DeserializeOwned>(
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            // A bad PAT yields 203 with an HTML sign-in page, caught here.
            return serde_json::from_str::<T>(&body).map_err(|e| {
                log::error!(
                    "[devops] Response text for {}: {}",
                    endpoint,
                    excerpt(&body)
                );
                AppError::parse(format!("Failed to parse response: {}", e), endpoint)
            });
        }

        Err(Self::status_error(status, &body, endpoint))
    }

    fn status_error(status: StatusCode, body: &str, endpoint: &str) -> AppError {
        let body_message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));

        let message = match (status, body_message) {
            (StatusCode::UNAUTHORIZED, _) | (StatusCode::FORBIDDEN, None) => {
                "Azure DevOps rejected the personal access token".to_string()
            }
            (_, Some(msg)) => msg,
            (StatusCode::NOT_FOUND, None) => "Resource not found".to_string(),
            (StatusCode::TOO_MANY_REQUESTS, None) => "Rate limit exceeded".to_string(),
            (_, None) => format!("Request failed ({}): {}", status.as_u16(), excerpt(body)),
        };

        AppError::remote_api_full(message, status.as_u16(), endpoint)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let result: Result<T, AppError> = async {
            let response = self
                .client
                .get(self.api_url(endpoint))
                .query(query)
                .send()
                .await?;
            Self::handle_response(response, endpoint).await
        }
        .await;

        if let Err(e) = &result {
            log::error!("[devops] GET {} failed: {}", endpoint, e);
        }
        result
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, AppError> {
        let result: Result<T, AppError> = async {
            let response = self
                .client
                .post(self.api_url(endpoint))
                .query(query)
                .json(body)
                .send()
                .await?;
            Self::handle_response(response, endpoint).await
        }
        .await;

        if let Err(e) = &result {
            log::error!("[devops] POST {} failed: {}", endpoint, e);
        }
        result
    }
}

#[async_trait]
impl DevOpsApi for DevOpsClient {
    async fn list_projects(&self) -> Result<Vec<RemoteProject>, AppError> {
        let list: ValueList<RemoteProject> = self
            .get_json("_apis/projects", &[("api-version", PROJECTS_API_VERSION)])
            .await?;
        Ok(list.value)
    }

    async fn query_recent_work_item_ids(&self, project: &str) -> Result<Vec<i64>, AppError> {
        let endpoint = format!("{}/_apis/wit/wiql", urlencoding::encode(project));
        let result: WiqlResult = self
            .post_json(
                &endpoint,
                &[("api-version", WIT_API_VERSION)],
                &serde_json::json!({ "query": RECENT_WORK_ITEMS_WIQL }),
            )
            .await?;
        Ok(result.work_items.into_iter().map(|w| w.id).collect())
    }

    async fn get_work_items(
        &self,
        project: &str,
        ids: &[i64],
    ) -> Result<Vec<RemoteWorkItem>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("{}/_apis/wit/workitems", urlencoding::encode(project));
        let ids = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let list: ValueList<RemoteWorkItem> = self
            .get_json(
                &endpoint,
                &[("ids", ids.as_str()), ("api-version", WIT_API_VERSION)],
            )
            .await?;
        Ok(list.value)
    }

    async fn list_pipelines(&self, project: &str) -> Result<Vec<Pipeline>, AppError> {
        let endpoint = format!("{}/_apis/pipelines", urlencoding::encode(project));
        let list: ValueList<Pipeline> = self
            .get_json(&endpoint, &[("api-version", PIPELINES_API_VERSION)])
            .await?;
        Ok(list.value)
    }

    async fn get_pipeline(&self, project: &str, pipeline_id: i64) -> Result<Pipeline, AppError> {
        let endpoint = format!(
            "{}/_apis/pipelines/{}",
            urlencoding::encode(project),
            pipeline_id
        );
        self.get_json(&endpoint, &[("api-version", PIPELINES_API_VERSION)])
            .await
    }

    async fn list_pipeline_runs(
        &self,
        project: &str,
        pipeline_id: i64,
    ) -> Result<Vec<PipelineRun>, AppError> {
        let endpoint = format!(
            "{}/_apis/pipelines/{}/runs",
            urlencoding::encode(project),
            pipeline_id
        );
        let list: ValueList<PipelineRun> = self
            .get_json(&endpoint, &[("api-version", PIPELINES_API_VERSION)])
            .await?;
        Ok(list.value)
    }

    async fn run_pipeline(&self, project: &str, pipeline_id: i64) -> Result<PipelineRun, AppError> {
        let endpoint = format!(
            "{}/_apis/pipelines/{}/runs",
            urlencoding::encode(project),
            pipeline_id
        );
        self.post_json(
            &endpoint,
            &[("api-version", PIPELINES_API_VERSION)],
            &serde_json::json!({}),
        )
        .await
    }

    async fn get_refs(
        &self,
        project: &str,
        repo_id: &str,
        filter: &str,
    ) -> Result<Vec<GitRef>, AppError> {
        let endpoint = format!(
            "{}/_apis/git/repositories/{}/refs",
            urlencoding::encode(project),
            urlencoding::encode(repo_id)
        );
        let list: ValueList<GitRef> = self
            .get_json(
                &endpoint,
                &[("filter", filter), ("api-version", REFS_API_VERSION)],
            )
            .await?;
        Ok(list.value)
    }

    async fn get_item_metadata(
        &self,
        project: &str,
        repo_id: &str,
        path: &str,
    ) -> Result<GitItem, AppError> {
        let endpoint = format!(
            "{}/_apis/git/repositories/{}/items",
            urlencoding::encode(project),
            urlencoding::encode(repo_id)
        );
        self.get_json(&endpoint, &[("path", path), ("api-version", GIT_API_VERSION)])
            .await
    }

    async fn get_blob_text(
        &self,
        project: &str,
        repo_id: &str,
        object_id: &str,
    ) -> Result<String, AppError> {
        let endpoint = format!(
            "{}/_apis/git/repositories/{}/blobs/{}",
            urlencoding::encode(project),
            urlencoding::encode(repo_id),
            urlencoding::encode(object_id)
        );

        let result: Result<String, AppError> = async {
            let response = self
                .client
                .get(self.api_url(&endpoint))
                .header(header::ACCEPT, "text/plain")
                .query(&[("api-version", GIT_API_VERSION)])
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if status.is_success() {
                Ok(body)
            } else {
                Err(Self::status_error(status, &body, &endpoint))
            }
        }
        .await;

        if let Err(e) = &result {
            log::error!("[devops] GET {} failed: {}", endpoint, e);
        }
        result
    }

    async fn push(
        &self,
        project: &str,
        repo_id: &str,
        push: &GitPush,
    ) -> Result<GitPushResult, AppError> {
        let endpoint = format!(
            "{}/_apis/git/repositories/{}/pushes",
            urlencoding::encode(project),
            urlencoding::encode(repo_id)
        );
        self.post_json(&endpoint, &[("api-version", GIT_API_VERSION)], push)
            .await
    }
}

/// Trim a response body for logging.
fn excerpt(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
