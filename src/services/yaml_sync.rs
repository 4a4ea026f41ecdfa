//! Pipeline YAML read/edit/commit flow.
//!
//! Reading resolves the pipeline's YAML path to a blob id and fetches the
//! blob as text. Writing reads the branch head and pushes a single commit
//! anchored to it; the remote API rejects the push if the branch moved in
//! between.

use crate::error::AppError;
use crate::services::devops_client::{
    DevOpsApi, GitChange, GitChangeItem, GitCommit, GitNewContent, GitPush, GitPushResult,
    GitRefUpdate, Pipeline,
};
use serde::Serialize;

/// The only repository type whose files can be edited through the Git API.
pub const SUPPORTED_REPO_TYPE: &str = "azureReposGit";

const DEFAULT_BRANCH: &str = "main";
const BRANCH_PREFIX: &str = "refs/heads/";

/// Location of a pipeline's YAML definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSource {
    pub pipeline_id: i64,
    pub yaml_path: String,
    pub repo_id: String,
    pub repo_type: String,
    /// Short branch name, without `refs/heads/`.
    pub branch: String,
}

impl PipelineSource {
    /// Extract the YAML location from a pipeline's configuration.
    pub fn from_pipeline(pipeline: &Pipeline) -> Result<Self, AppError> {
        let config = pipeline.configuration.as_ref();
        let yaml_path = config
            .and_then(|c| c.path.clone())
            .filter(|p| !p.trim().is_empty());
        let repo = config.and_then(|c| c.repository.as_ref());
        let repo_id = repo
            .and_then(|r| r.id.clone())
            .filter(|id| !id.trim().is_empty());

        let (Some(yaml_path), Some(repo_id)) = (yaml_path, repo_id) else {
            return Err(AppError::unsupported_source(
                "YAML path or repo info missing. Check if the pipeline uses a classic editor or non-azureReposGit source.",
            ));
        };

        let repo_type = repo.and_then(|r| r.repo_type.clone()).unwrap_or_default();
        if repo_type != SUPPORTED_REPO_TYPE {
            return Err(AppError::unsupported_repo_type(
                "Only azureReposGit is supported.",
                repo_type,
            ));
        }

        let branch = repo
            .and_then(|r| r.default_branch.as_deref())
            .map(|b| b.strip_prefix(BRANCH_PREFIX).unwrap_or(b).to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        Ok(Self {
            pipeline_id: pipeline.id,
            yaml_path,
            repo_id,
            repo_type,
            branch,
        })
    }

    /// Fully qualified ref name of the branch.
    pub fn ref_name(&self) -> String {
        format!("{}{}", BRANCH_PREFIX, self.branch)
    }
}

/// Build the single-commit push that replaces the YAML file's content.
pub fn build_yaml_push(source: &PipelineSource, old_object_id: &str, content: &str) -> GitPush {
    GitPush {
        ref_updates: vec![GitRefUpdate {
            name: source.ref_name(),
            old_object_id: old_object_id.to_string(),
        }],
        commits: vec![GitCommit {
            comment: format!(
                "Update pipeline YAML for pipeline ID {}",
                source.pipeline_id
            ),
            changes: vec![GitChange {
                change_type: "edit".to_string(),
                item: GitChangeItem {
                    path: source.yaml_path.clone(),
                },
                new_content: GitNewContent {
                    content: content.to_string(),
                    content_type: "rawtext".to_string(),
                },
            }],
        }],
    }
}

/// Sequences the remote calls for one project's pipelines.
pub struct YamlSynchronizer<'a> {
    api: &'a dyn DevOpsApi,
    project: &'a str,
}

impl<'a> YamlSynchronizer<'a> {
    pub fn new(api: &'a dyn DevOpsApi, project: &'a str) -> Self {
        Self { api, project }
    }

    /// Fetch the pipeline and validate that its YAML can be edited here.
    pub async fn load_source(&self, pipeline_id: i64) -> Result<PipelineSource, AppError> {
        let pipeline = self.api.get_pipeline(self.project, pipeline_id).await?;
        let source = PipelineSource::from_pipeline(&pipeline);
        if let Err(e) = &source {
            log::warn!(
                "[yaml-sync] Pipeline {} in {} is not editable: {}",
                pipeline_id,
                self.project,
                e
            );
        }
        source
    }

    /// Current content of the YAML file on the repository's default branch.
    pub async fn read_yaml(&self, source: &PipelineSource) -> Result<String, AppError> {
        let item = self
            .api
            .get_item_metadata(self.project, &source.repo_id, &source.yaml_path)
            .await?;

        let blob_id = item
            .object_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::not_found_with_id("Could not find file in repository.", &source.yaml_path))?;

        self.api
            .get_blob_text(self.project, &source.repo_id, &blob_id)
            .await
    }

    /// Object id the branch currently points to.
    pub async fn branch_head(&self, source: &PipelineSource) -> Result<String, AppError> {
        let filter = format!("heads/{}", source.branch);
        let refs = self
            .api
            .get_refs(self.project, &source.repo_id, &filter)
            .await?;

        // The filter is a prefix match; `heads/main` also returns `heads/main-old`.
        let ref_name = source.ref_name();
        refs.into_iter()
            .find(|r| r.name == ref_name)
            .and_then(|r| r.object_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::missing_metadata(
                    "Could not determine latest commit for the branch.",
                    "objectId",
                )
            })
    }

    /// Replace the YAML file's content with one commit on top of the current head.
    pub async fn commit_yaml(
        &self,
        source: &PipelineSource,
        content: &str,
    ) -> Result<GitPushResult, AppError> {
        let head = self.branch_head(source).await?;
        let push = build_yaml_push(source, &head, content);

        log::info!(
            "[yaml-sync] Pushing {} to {} in {} (base {})",
            source.yaml_path,
            source.ref_name(),
            self.project,
            head
        );

        match self.api.push(self.project, &source.repo_id, &push).await {
            Ok(result) => Ok(result),
            Err(e) if is_stale_push(&e) => Err(AppError::stale_token(
                "The branch was updated by someone else. Reload the editor and try again.",
                Some(head),
            )),
            Err(e) => Err(e),
        }
    }
}

/// Whether a push failure means the branch head moved.
fn is_stale_push(err: &AppError) -> bool {
    match err {
        AppError::RemoteApi {
            status_code,
            message,
            ..
        } => *status_code == Some(409) || message.contains("TF401028"),
        _ => false,
    }
}
