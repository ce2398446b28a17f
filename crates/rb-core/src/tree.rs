// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-tree data model shared by the file service, template renderer, and
//! workspace tracker.

use serde::{Deserialize, Serialize};

/// The kind of a [`FileTreeNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A regular file.
    File,
    /// A directory.
    Folder,
}

/// Metadata and content for a single rendered or on-disk file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedFile {
    /// The base file name (no directory components).
    pub name: String,
    /// Path relative to the tree's root.
    pub relative_path: String,
    /// File content, when small enough to include inline.
    pub content: Option<String>,
    /// Hex-encoded SHA-256 of the file's bytes, present whenever `content`
    /// is (the two are computed from the same read).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Language, derived from the file extension.
    pub language: String,
    /// Size in bytes.
    pub size: u64,
}

/// A node in a recursive file tree, as served to the browser UI.
///
/// `id` is stable for a given absolute path within a single render/walk
/// session (derived from the path itself, not randomly assigned), so
/// repeated walks of an unchanged tree produce identical ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeNode {
    /// Stable identifier for this node.
    pub id: String,
    /// Base name of the file or folder.
    pub name: String,
    /// Whether this node is a file or a folder.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Child nodes, present only for folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileTreeNode>>,
    /// File metadata, present only for files. `None` for oversized files
    /// whose content was not loaded; the node is still included with this
    /// field absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<RenderedFile>,
}

impl FileTreeNode {
    /// Build a folder node. Children are sorted: folders precede files,
    /// then case-insensitively by name.
    #[must_use]
    pub fn folder(id: impl Into<String>, name: impl Into<String>, mut children: Vec<FileTreeNode>) -> Self {
        children.sort_by(|a, b| match (a.kind, b.kind) {
            (NodeKind::Folder, NodeKind::File) => std::cmp::Ordering::Less,
            (NodeKind::File, NodeKind::Folder) => std::cmp::Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::Folder,
            children: Some(children),
            file: None,
        }
    }

    /// Build a file node.
    #[must_use]
    pub fn file(id: impl Into<String>, name: impl Into<String>, file: Option<RenderedFile>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::File,
            children: None,
            file,
        }
    }

    /// Depth-first count of file leaves in this subtree.
    #[must_use]
    pub fn file_count(&self) -> usize {
        match self.kind {
            NodeKind::File => 1,
            NodeKind::Folder => self
                .children
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(FileTreeNode::file_count)
                .sum(),
        }
    }
}

/// Derive a display language from a file name's extension.
///
/// Falls back to `"plaintext"` for unrecognized or missing extensions.
#[must_use]
pub fn language_for_filename(name: &str) -> String {
    let ext = name.rsplit('.').next().filter(|e| *e != name).unwrap_or("");
    let ext_lower = ext.to_ascii_lowercase();
    let lang = match ext_lower.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "tsx" => "tsx",
        "jsx" => "jsx",
        "sh" | "bash" => "shell",
        "yml" | "yaml" => "yaml",
        "json" => "json",
        "toml" => "toml",
        "md" | "mdx" => "markdown",
        "tf" => "hcl",
        "go" => "go",
        "rb" => "ruby",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" => "css",
        "dockerfile" => "dockerfile",
        "" => "plaintext",
        other => other,
    };
    lang.to_string()
}
