// SPDX-License-Identifier: MIT OR Apache-2.0
//! The declarative manifest that stands in for the out-of-scope document
//! parser: it lists every executable block the UI would otherwise extract
//! from the runbook document's JSX and hand to the server.

use rb_core::{ErrorCode, ErrorInfo};
use rb_pathsafe::RootFs;
use serde::Deserialize;

/// Fixed manifest filename at the runbook root.
pub const MANIFEST_FILE_NAME: &str = "runbook.blocks.yaml";

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawKind {
    Inline,
    Path,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawBlockKind {
    Check,
    Command,
}

fn default_block_kind() -> RawBlockKind {
    RawBlockKind::Command
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawBlock {
    pub component_id: String,
    pub kind: RawKind,
    #[serde(default = "default_block_kind")]
    pub block_kind: RawBlockKind,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct RawManifest {
    #[serde(default)]
    pub blocks: Vec<RawBlock>,
}

/// Read and parse the manifest at the runbook root.
///
/// An absent manifest is an empty block list, not an error — a runbook
/// with no executable blocks is valid.
pub(crate) fn load_manifest(root: &RootFs) -> Result<RawManifest, ErrorInfo> {
    let path = root.root().join(MANIFEST_FILE_NAME);
    if !path.exists() {
        return Ok(RawManifest::default());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        ErrorInfo::new(ErrorCode::Io, "failed to read block manifest")
            .with_context("path", path.display().to_string())
            .with_source(e)
    })?;
    serde_yaml::from_str(&raw).map_err(|e| {
        ErrorInfo::new(ErrorCode::SchemaInvalid, "block manifest failed to parse")
            .with_context("path", path.display().to_string())
            .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_yields_empty_block_list() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootFs::new(dir.path()).unwrap();
        let manifest = load_manifest(&root).unwrap();
        assert!(manifest.blocks.is_empty());
    }

    #[test]
    fn parses_inline_and_path_blocks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            r#"
blocks:
  - component_id: hello
    kind: inline
    source: "echo hi"
  - component_id: check-disk
    kind: path
    block_kind: check
    path: scripts/check-disk.sh
"#,
        )
        .unwrap();
        let root = RootFs::new(dir.path()).unwrap();
        let manifest = load_manifest(&root).unwrap();
        assert_eq!(manifest.blocks.len(), 2);
        assert_eq!(manifest.blocks[0].component_id, "hello");
        assert_eq!(manifest.blocks[1].path.as_deref(), Some("scripts/check-disk.sh"));
    }

    #[test]
    fn malformed_manifest_is_schema_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), "blocks: [this is not a block]").unwrap();
        let root = RootFs::new(dir.path()).unwrap();
        let err = load_manifest(&root).unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaInvalid);
    }
}
