// SPDX-License-Identifier: MIT OR Apache-2.0
//! Non-streaming `/api` handlers: session, file, tree, boilerplate, and
//! executable listing.

use crate::dto::{
    BoilerplateConfigRequest, BoilerplateConfigResponse, BoilerplateRenderInlineRequest,
    BoilerplateRenderInlineResponse, BoilerplateRenderRequest, BoilerplateRenderResponse,
    ExecutableSummary, FileQuery, FileResponse, SessionResponse,
};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use rb_core::{ErrorCode, ErrorInfo};
use std::collections::BTreeMap;
use std::sync::Arc;

pub async fn session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        working_dir: state.root.root().display().to_string(),
    })
}

pub async fn file(State(state): State<Arc<AppState>>, Query(query): Query<FileQuery>) -> Result<Json<FileResponse>, ApiError> {
    let rendered = rb_fs::get_file(&state.root, &query.path)?;
    Ok(Json(rendered.into()))
}

pub async fn tree(State(state): State<Arc<AppState>>) -> Result<Json<Vec<rb_core::FileTreeNode>>, ApiError> {
    let root_node = rb_fs::walk(&state.root, state.config.max_inline_file_bytes)?;
    Ok(Json(root_node.children.unwrap_or_default()))
}

pub async fn boilerplate_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BoilerplateConfigRequest>,
) -> Result<Json<BoilerplateConfigResponse>, ApiError> {
    let schema = match (request.template_path, request.boilerplate_content) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(ErrorInfo::new(ErrorCode::UsageError, "exactly one of templatePath or boilerplateContent is required").into());
        }
        (Some(path), None) => rb_template::load_directory_schema(&state.root, &path)?
            .ok_or_else(|| ErrorInfo::new(ErrorCode::NotFound, "no boilerplate.yml found under templatePath").with_context("templatePath", path))?,
        (None, Some(content)) => rb_schema::parse_yaml(&content)?,
    };

    let raw_yaml = rb_schema::to_yaml(&schema)?;
    Ok(Json(BoilerplateConfigResponse::from_schema(&schema, raw_yaml)))
}

pub async fn boilerplate_render(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BoilerplateRenderRequest>,
) -> Result<Json<BoilerplateRenderResponse>, ApiError> {
    if let Some(schema) = rb_template::load_directory_schema(&state.root, &request.template_path)? {
        rb_schema::validate_values(&schema, &request.variables)?;
    }

    let out_dir_rel = rb_workspace::Workspace::component_subtree_rel(&slugify(&request.template_path));
    let blocks = state.block_outputs.snapshot();
    let file_tree = rb_template::render_directory(&state.root, &request.template_path, &out_dir_rel, &request.variables, &blocks)?;

    Ok(Json(BoilerplateRenderResponse {
        file_tree,
        output_dir: out_dir_rel,
        template_path: request.template_path,
    }))
}

pub async fn boilerplate_render_inline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BoilerplateRenderInlineRequest>,
) -> Result<Json<BoilerplateRenderInlineResponse>, ApiError> {
    let values: BTreeMap<String, serde_json::Value> = request.inputs.into_iter().map(|input| (input.name, input.value)).collect();
    let blocks = state.block_outputs.snapshot();
    let rendered_files = rb_template::render_inline(&request.template_files, &values, &blocks)?;

    let file_tree = match request.generate_file {
        Some(component_id) => {
            let source_dir = tempfile::tempdir().map_err(|e| ErrorInfo::new(ErrorCode::Io, "failed to stage rendered files").with_source(e))?;
            for rendered in rendered_files.values() {
                if let Some(content) = &rendered.content {
                    let dest = source_dir.path().join(&rendered.relative_path);
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| ErrorInfo::new(ErrorCode::Io, "failed to stage rendered files").with_source(e))?;
                    }
                    std::fs::write(&dest, content).map_err(|e| ErrorInfo::new(ErrorCode::Io, "failed to stage rendered files").with_source(e))?;
                }
            }
            Some(state.workspace.merge_subtree(&component_id, source_dir.path())?)
        }
        None => None,
    };

    Ok(Json(BoilerplateRenderInlineResponse { rendered_files, file_tree }))
}

pub async fn executables(State(state): State<Arc<AppState>>) -> Json<Vec<ExecutableSummary>> {
    Json(state.registry.list().into_iter().map(ExecutableSummary::from).collect())
}

pub async fn workspace_changes(State(state): State<Arc<AppState>>) -> Json<rb_change_tracker::ChangeSummary> {
    Json(state.workspace.change_summary())
}

fn slugify(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
