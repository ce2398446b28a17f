// SPDX-License-Identifier: MIT OR Apache-2.0
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rb_config::RunbookConfig;
use rb_core::BlockOutputs;
use rb_daemon::{build_app, AppState};
use rb_exec::Engine;
use rb_pathsafe::RootFs;
use rb_registry::{Mode, Registry};
use rb_workspace::Workspace;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

fn test_state(dir: &std::path::Path, manifest: &str) -> Arc<AppState> {
    std::fs::write(dir.join(rb_registry::MANIFEST_FILE_NAME), manifest).unwrap();
    let root = RootFs::new(dir).unwrap();
    let registry = Arc::new(Registry::load(RootFs::new(dir).unwrap(), Mode::Frozen).unwrap());
    let workspace = Arc::new(Workspace::new(RootFs::new(dir).unwrap()).unwrap());
    let block_outputs = Arc::new(BlockOutputs::new());
    let engine = Arc::new(Engine::new(registry.clone(), workspace.clone(), block_outputs.clone(), Duration::from_secs(5)));

    Arc::new(AppState {
        root,
        registry,
        workspace,
        block_outputs,
        engine,
        config: RunbookConfig::default(),
        cancellations: Mutex::new(BTreeMap::new()),
    })
}

#[tokio::test]
async fn session_reports_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path(), "blocks: []\n"));

    let resp = app.oneshot(Request::builder().uri("/api/session").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["workingDir"].as_str().unwrap().ends_with(&*dir.path().file_name().unwrap().to_string_lossy()));
}

#[tokio::test]
async fn tree_lists_files_under_the_root() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("README.md"), "# hi").unwrap();
    let app = build_app(test_state(dir.path(), "blocks: []\n"));

    let resp = app.oneshot(Request::builder().uri("/api/tree").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = json.as_array().unwrap().iter().map(|n| n["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"README.md"));
}

#[tokio::test]
async fn file_reads_requested_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
    let app = build_app(test_state(dir.path(), "blocks: []\n"));

    let resp = app
        .oneshot(Request::builder().uri("/api/file?path=hello.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["content"], "hi there");
}

#[tokio::test]
async fn file_escaping_the_root_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path(), "blocks: []\n"));

    let resp = app
        .oneshot(Request::builder().uri("/api/file?path=../outside.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn executables_lists_the_frozen_registry() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = "blocks:\n  - component_id: hello\n    kind: inline\n    source: \"echo hi\"\n";
    let app = build_app(test_state(dir.path(), manifest));

    let resp = app.oneshot(Request::builder().uri("/api/executables").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["componentId"], "hello");
}

#[tokio::test]
async fn unauthenticated_request_is_rejected_when_a_token_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), "blocks: []\n");
    let mut config = (*state).config.clone();
    config.auth_token = Some("secret".to_string());
    let state = Arc::new(AppState {
        root: RootFs::new(dir.path()).unwrap(),
        registry: state.registry.clone(),
        workspace: state.workspace.clone(),
        block_outputs: state.block_outputs.clone(),
        engine: state.engine.clone(),
        config,
        cancellations: Mutex::new(BTreeMap::new()),
    });
    let app = build_app(state);

    let resp = app.oneshot(Request::builder().uri("/api/session").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
