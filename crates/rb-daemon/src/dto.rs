// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire-format request/response bodies for the `/api` surface. Internal
//! types use `snake_case`; every DTO here renders `camelCase` on the
//! wire to match the browser client's conventions.

use rb_core::{Executable, ExecutableKind, FileTreeNode, RenderedFile};
use rb_schema::{Schema, Section, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub working_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub content: Option<String>,
    pub language: String,
    pub size: u64,
    pub content_hash: Option<String>,
}

impl From<RenderedFile> for FileResponse {
    fn from(value: RenderedFile) -> Self {
        Self {
            content: value.content,
            language: value.language,
            size: value.size,
            content_hash: value.content_hash,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BoilerplateConfigRequest {
    pub template_path: Option<String>,
    pub boilerplate_content: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoilerplateConfigResponse {
    pub variables: Vec<Variable>,
    pub sections: Vec<Section>,
    pub raw_yaml: String,
}

impl BoilerplateConfigResponse {
    pub fn from_schema(schema: &Schema, raw_yaml: String) -> Self {
        Self {
            variables: schema.variables.clone(),
            sections: schema.sections.clone(),
            raw_yaml,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoilerplateRenderRequest {
    pub template_path: String,
    pub variables: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoilerplateRenderResponse {
    pub file_tree: FileTreeNode,
    pub output_dir: String,
    pub template_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValue {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoilerplateRenderInlineRequest {
    pub template_files: BTreeMap<String, String>,
    pub inputs: Vec<InputValue>,
    /// When present, names the workspace subtree the rendered files are
    /// additionally persisted under; the response then includes
    /// `fileTree` for that subtree.
    #[serde(default)]
    pub generate_file: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoilerplateRenderInlineResponse {
    pub rendered_files: BTreeMap<String, RenderedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_tree: Option<FileTreeNode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableSummary {
    pub id: String,
    pub component_id: String,
    pub sha256_hash: String,
    pub kind: ExecutableKind,
}

impl From<Executable> for ExecutableSummary {
    fn from(value: Executable) -> Self {
        Self {
            id: value.id,
            component_id: value.component_id,
            sha256_hash: value.sha256_hash,
            kind: value.kind,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    #[serde(default)]
    pub executable_id: Option<String>,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub auth_env: BTreeMap<String, String>,
    #[serde(default)]
    pub use_pty: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCancelRequest {
    pub execution_id: String,
}
