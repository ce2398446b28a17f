// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generated-files workspace tracking.
//!
//! A single directory under the runbook root (name fixed:
//! [`WORKSPACE_DIR_NAME`]) holds every file produced by directory-mode
//! template renders and per-execution `GENERATED_FILES` captures, each
//! under a subtree named after the originating `componentId`. The
//! workspace tree is the sole source of truth for generated files exposed
//! to the UI.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use rb_change_tracker::{ChangeKind, ChangeTracker, FileChange};
use rb_core::{ErrorCode, ErrorInfo, FileTreeNode};
use rb_pathsafe::RootFs;
use std::path::Path;
use std::sync::Mutex;
use walkdir::WalkDir;

/// Fixed name of the generated-files directory under the runbook root.
pub const WORKSPACE_DIR_NAME: &str = ".runbooks-workspace";

/// Owns the generated-files workspace directory and its change history.
pub struct Workspace {
    root: RootFs,
    tracker: Mutex<ChangeTracker>,
}

impl Workspace {
    /// Open (creating if absent) the workspace directory under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Io`] if the directory cannot be created.
    pub fn new(root: RootFs) -> Result<Self, ErrorInfo> {
        let workspace_dir = root.root().join(WORKSPACE_DIR_NAME);
        std::fs::create_dir_all(&workspace_dir).map_err(|e| io_error(&workspace_dir, e))?;
        Ok(Self {
            root,
            tracker: Mutex::new(ChangeTracker::new()),
        })
    }

    /// Path, relative to the runbook root, of a component's subtree.
    #[must_use]
    pub fn component_subtree_rel(component_id: &str) -> String {
        format!("{WORKSPACE_DIR_NAME}/{component_id}")
    }

    /// Replace a component's subtree with the contents of `source_dir`
    /// (an absolute, already-resolved path, e.g. a `GENERATED_FILES`
    /// capture directory or a directory-mode render's output), then
    /// return a fresh snapshot of the whole workspace tree.
    ///
    /// An absent or empty `source_dir` is a no-op beyond removing any
    /// existing subtree for `component_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Io`] on any filesystem failure.
    pub fn merge_subtree(&self, component_id: &str, source_dir: &Path) -> Result<FileTreeNode, ErrorInfo> {
        let component_dir = self.root.root().join(WORKSPACE_DIR_NAME).join(component_id);

        if component_dir.exists() {
            std::fs::remove_dir_all(&component_dir).map_err(|e| io_error(&component_dir, e))?;
        }

        if source_dir.exists() && has_entries(source_dir) {
            copy_tree(source_dir, &component_dir)?;
            self.record_created(component_id, &component_dir)?;
        }

        self.snapshot()
    }

    /// A fresh snapshot of the whole workspace tree, for the file
    /// endpoint and for reconnecting SSE clients.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Io`] if the workspace directory cannot be
    /// read.
    pub fn snapshot(&self) -> Result<FileTreeNode, ErrorInfo> {
        let workspace_dir = self.root.root().join(WORKSPACE_DIR_NAME);
        let workspace_fs = RootFs::new(&workspace_dir)?;
        rb_fs::walk(&workspace_fs, u64::MAX)
    }

    /// Aggregate change statistics across every merge performed so far.
    #[must_use]
    pub fn change_summary(&self) -> rb_change_tracker::ChangeSummary {
        self.tracker.lock().expect("change tracker lock poisoned").summary()
    }

    fn record_created(&self, component_id: &str, component_dir: &Path) -> Result<(), ErrorInfo> {
        let mut tracker = self.tracker.lock().expect("change tracker lock poisoned");
        for entry in WalkDir::new(component_dir) {
            let entry = entry.map_err(|e| {
                ErrorInfo::new(ErrorCode::Io, "failed to walk merged subtree")
                    .with_source(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(component_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            tracker.record(FileChange {
                path: relative,
                kind: ChangeKind::Created,
                size_before: None,
                size_after: Some(size),
                content_hash: None,
                component_id: component_id.to_string(),
            });
        }
        Ok(())
    }
}

fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut it| it.next().is_some()).unwrap_or(false)
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), ErrorInfo> {
    std::fs::create_dir_all(dest).map_err(|e| io_error(dest, e))?;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| {
            ErrorInfo::new(ErrorCode::Io, "failed to walk source directory")
                .with_source(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| io_error(&target, e))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| io_error(&target, e))?;
        }
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::Io, "filesystem operation failed")
        .with_context("path", path.display().to_string())
        .with_source(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_runbook_root() -> tempfile::TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    #[test]
    fn merge_creates_component_subtree() {
        let root_dir = make_runbook_root();
        let workspace = Workspace::new(RootFs::new(root_dir.path()).unwrap()).unwrap();

        let captured = tempfile::tempdir().unwrap();
        fs::write(captured.path().join("report.txt"), b"hi").unwrap();

        let tree = workspace.merge_subtree("deploy", captured.path()).unwrap();
        assert!(tree.file_count() >= 1);

        let written = root_dir.path().join(WORKSPACE_DIR_NAME).join("deploy/report.txt");
        assert!(written.exists());
    }

    #[test]
    fn merge_replaces_previous_subtree_for_same_component() {
        let root_dir = make_runbook_root();
        let workspace = Workspace::new(RootFs::new(root_dir.path()).unwrap()).unwrap();

        let first = tempfile::tempdir().unwrap();
        fs::write(first.path().join("old.txt"), b"old").unwrap();
        workspace.merge_subtree("deploy", first.path()).unwrap();

        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("new.txt"), b"new").unwrap();
        workspace.merge_subtree("deploy", second.path()).unwrap();

        let component_dir = root_dir.path().join(WORKSPACE_DIR_NAME).join("deploy");
        assert!(!component_dir.join("old.txt").exists());
        assert!(component_dir.join("new.txt").exists());
    }

    #[test]
    fn empty_source_dir_clears_the_subtree_without_error() {
        let root_dir = make_runbook_root();
        let workspace = Workspace::new(RootFs::new(root_dir.path()).unwrap()).unwrap();

        let captured = tempfile::tempdir().unwrap();
        fs::write(captured.path().join("x.txt"), b"x").unwrap();
        workspace.merge_subtree("deploy", captured.path()).unwrap();

        let empty = tempfile::tempdir().unwrap();
        workspace.merge_subtree("deploy", empty.path()).unwrap();

        let component_dir = root_dir.path().join(WORKSPACE_DIR_NAME).join("deploy");
        assert!(!component_dir.exists());
    }

    #[test]
    fn change_summary_reflects_merged_files() {
        let root_dir = make_runbook_root();
        let workspace = Workspace::new(RootFs::new(root_dir.path()).unwrap()).unwrap();

        let captured = tempfile::tempdir().unwrap();
        fs::write(captured.path().join("a.txt"), b"a").unwrap();
        fs::write(captured.path().join("b.txt"), b"b").unwrap();
        workspace.merge_subtree("deploy", captured.path()).unwrap();

        assert_eq!(workspace.change_summary().created, 2);
    }
}
