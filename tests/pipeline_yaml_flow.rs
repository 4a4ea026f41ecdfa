//! Pipeline YAML read/commit flow against a recording fake of the remote API.
//!
//! Covers the concurrency anchor of the push, the unsupported-source and
//! missing-metadata short circuits, and the HTTP statuses they surface as.

mod common;

use axum::http::StatusCode;
use common::{body_text, get, git_ref, location, post_form, yaml_pipeline, FakeDevOps, TestApp};
use devops_dashboard::error::AppError;
use devops_dashboard::services::devops_client::GitItem;
use devops_dashboard::services::YamlSynchronizer;
use tower::ServiceExt;

fn editable_api() -> FakeDevOps {
    FakeDevOps {
        pipelines: vec![yaml_pipeline(42, "azureReposGit", Some("refs/heads/main"))],
        refs: vec![
            git_ref("refs/heads/main-old", "stale-sha"),
            git_ref("refs/heads/main", "head-sha"),
        ],
        item: GitItem {
            object_id: Some("blob-sha".to_string()),
            commit_id: None,
            path: Some("/azure-pipelines.yml".to_string()),
        },
        blob: "trigger:\n  - main\n".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_commit_pushes_once_anchored_to_branch_head() {
    let api = editable_api();
    let sync = YamlSynchronizer::new(&api, "Apollo");

    let source = sync.load_source(42).await.unwrap();
    sync.commit_yaml(&source, "steps: []\n").await.unwrap();

    let pushes = api.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].ref_updates[0].name, "refs/heads/main");
    assert_eq!(pushes[0].ref_updates[0].old_object_id, "head-sha");
    assert_eq!(pushes[0].commits.len(), 1);
    assert_eq!(pushes[0].commits[0].changes[0].new_content.content, "steps: []\n");
}

#[tokio::test]
async fn test_non_azure_repo_makes_no_ref_lookup_or_push() {
    let api = FakeDevOps {
        pipelines: vec![yaml_pipeline(42, "gitHub", None)],
        ..editable_api()
    };
    let sync = YamlSynchronizer::new(&api, "Apollo");

    let err = sync.load_source(42).await.unwrap_err();

    assert!(matches!(err, AppError::UnsupportedSource { .. }));
    assert_eq!(err.to_string(), "Only azureReposGit is supported.");
    assert_eq!(api.count("get_refs"), 0);
    assert_eq!(api.count("push"), 0);
}

#[tokio::test]
async fn test_missing_branch_head_is_server_error_without_push() {
    let api = FakeDevOps {
        refs: vec![git_ref("refs/heads/main-old", "stale-sha")],
        ..editable_api()
    };
    let sync = YamlSynchronizer::new(&api, "Apollo");
    let source = sync.load_source(42).await.unwrap();

    let err = sync.commit_yaml(&source, "steps: []\n").await.unwrap_err();

    assert!(matches!(err, AppError::MissingMetadata { .. }));
    assert_eq!(
        err.to_string(),
        "Could not determine latest commit for the branch."
    );
    assert_eq!(api.count("push"), 0);
}

#[tokio::test]
async fn test_missing_blob_id_is_not_found_without_blob_fetch() {
    let api = FakeDevOps {
        item: GitItem::default(),
        ..editable_api()
    };
    let sync = YamlSynchronizer::new(&api, "Apollo");
    let source = sync.load_source(42).await.unwrap();

    let err = sync.read_yaml(&source).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound { .. }));
    assert!(err.to_string().contains("Could not find file in repository."));
    assert_eq!(api.count("get_blob_text"), 0);
}

#[tokio::test]
async fn test_editor_renders_blob_content() {
    let app = TestApp::new(editable_api()).await;
    let (_, cookie) = app.session(None, Some("Apollo")).await;

    let resp = app
        .router()
        .oneshot(get("/pipelines/42/yaml", &cookie))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("azure-pipelines.yml"));
    assert!(html.contains("trigger:"));
    assert_eq!(
        app.api.calls(),
        vec!["get_pipeline", "get_item_metadata", "get_blob_text"]
    );
}

#[tokio::test]
async fn test_commit_route_redirects_to_pipelines() {
    let app = TestApp::new(editable_api()).await;
    let (_, cookie) = app.session(None, Some("Apollo")).await;

    let resp = app
        .router()
        .oneshot(post_form(
            "/pipelines/42/yaml",
            &cookie,
            &[("yaml_content", "steps:\n  - script: echo hi\n")],
        ))
        .await
        .unwrap();

    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), "/pipelines");
    let pushes = app.api.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(
        pushes[0].commits[0].changes[0].new_content.content,
        "steps:\n  - script: echo hi\n"
    );
}

#[tokio::test]
async fn test_stale_push_is_conflict() {
    let app = TestApp::new(FakeDevOps {
        reject_push: true,
        ..editable_api()
    })
    .await;
    let (_, cookie) = app.session(None, Some("Apollo")).await;

    let resp = app
        .router()
        .oneshot(post_form(
            "/pipelines/42/yaml",
            &cookie,
            &[("yaml_content", "steps: []\n")],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(app.api.count("push"), 1);
}

#[tokio::test]
async fn test_unsupported_source_route_status() {
    let app = TestApp::new(FakeDevOps {
        pipelines: vec![yaml_pipeline(42, "gitHub", None)],
        ..editable_api()
    })
    .await;
    let (_, cookie) = app.session(None, Some("Apollo")).await;

    let resp = app
        .router()
        .oneshot(post_form(
            "/pipelines/42/yaml",
            &cookie,
            &[("yaml_content", "steps: []\n")],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_text(resp).await, "Only azureReposGit is supported.");
    assert_eq!(app.api.count("get_refs"), 0);
}

#[tokio::test]
async fn test_missing_head_route_status() {
    let app = TestApp::new(FakeDevOps {
        refs: Vec::new(),
        ..editable_api()
    })
    .await;
    let (_, cookie) = app.session(None, Some("Apollo")).await;

    let resp = app
        .router()
        .oneshot(post_form(
            "/pipelines/42/yaml",
            &cookie,
            &[("yaml_content", "steps: []\n")],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.api.count("push"), 0);
}
