// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory script registry, keyed by both executable id and `componentId`.

use crate::manifest::{load_manifest, RawBlock, RawKind};
use chrono::{DateTime, Utc};
use rb_core::{BlockKind, ErrorCode, ErrorInfo, Executable, ExecutableKind};
use rb_pathsafe::RootFs;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Whether the registry is immutable after load or live-reloads on change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Immutable after load; unknown ids/componentIds fail.
    Frozen,
    /// Rebuilt on filesystem change by a [`crate::watch`] consumer.
    Watch,
}

#[derive(Debug, Default)]
struct Snapshot {
    by_id: BTreeMap<String, Executable>,
    by_component: BTreeMap<String, Executable>,
}

/// The process-wide script registry. Cheap to clone the handle (wraps an
/// `Arc`-free `RwLock`, so share it behind an `Arc<Registry>` at the call
/// site) — lookups take a read lock, [`Registry::reload`] takes a write
/// lock and swaps the whole snapshot atomically.
#[derive(Debug)]
pub struct Registry {
    root: RootFs,
    mode: Mode,
    snapshot: RwLock<Snapshot>,
}

impl Registry {
    /// Load the registry from the manifest at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::SchemaInvalid`] if the manifest is malformed,
    /// [`ErrorCode::Io`] if a `path`-kind block's script can't be read, or
    /// [`ErrorCode::UsageError`] if two blocks share a `componentId`.
    pub fn load(root: RootFs, mode: Mode) -> Result<Self, ErrorInfo> {
        let snapshot = build_snapshot(&root)?;
        Ok(Self {
            root,
            mode,
            snapshot: RwLock::new(snapshot),
        })
    }

    /// Rebuild the registry from the manifest, replacing the snapshot in
    /// one atomic swap. Readers never observe a partially rebuilt map.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::load`]. On error the previous snapshot is left
    /// in place.
    pub fn reload(&self) -> Result<(), ErrorInfo> {
        let snapshot = build_snapshot(&self.root)?;
        *self.snapshot.write().expect("registry lock poisoned") = snapshot;
        Ok(())
    }

    /// Which mode this registry runs in.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The runbook root this registry was loaded from.
    #[must_use]
    pub fn root(&self) -> &RootFs {
        &self.root
    }

    /// Look up an executable by its stable id.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ExecutableNotFound`] if no block has that id.
    pub fn lookup_by_id(&self, id: &str) -> Result<Executable, ErrorInfo> {
        self.snapshot
            .read()
            .expect("registry lock poisoned")
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("id", id))
    }

    /// Look up an executable by its `componentId`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ExecutableNotFound`] if no block has that id.
    pub fn lookup_by_component_id(&self, component_id: &str) -> Result<Executable, ErrorInfo> {
        self.snapshot
            .read()
            .expect("registry lock poisoned")
            .by_component
            .get(component_id)
            .cloned()
            .ok_or_else(|| not_found("componentId", component_id))
    }

    /// Every registered executable, for the `/executables` listing
    /// endpoint, ordered by `componentId`.
    #[must_use]
    pub fn list(&self) -> Vec<Executable> {
        self.snapshot
            .read()
            .expect("registry lock poisoned")
            .by_component
            .values()
            .cloned()
            .collect()
    }
}

fn not_found(field: &str, value: &str) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::ExecutableNotFound, "no executable registered for this reference").with_context(field, value)
}

fn build_snapshot(root: &RootFs) -> Result<Snapshot, ErrorInfo> {
    let manifest = load_manifest(root)?;
    let mut snapshot = Snapshot::default();
    let loaded_at = Utc::now();

    for block in manifest.blocks {
        if snapshot.by_component.contains_key(&block.component_id) {
            return Err(
                ErrorInfo::new(ErrorCode::UsageError, "duplicate componentId in block manifest")
                    .with_context("componentId", block.component_id.clone()),
            );
        }
        let executable = build_executable(root, block, loaded_at)?;
        snapshot.by_id.insert(executable.id.clone(), executable.clone());
        snapshot.by_component.insert(executable.component_id.clone(), executable);
    }

    Ok(snapshot)
}

fn build_executable(root: &RootFs, block: RawBlock, loaded_at: DateTime<Utc>) -> Result<Executable, ErrorInfo> {
    let block_kind: BlockKind = match block.block_kind {
        crate::manifest::RawBlockKind::Check => BlockKind::Check,
        crate::manifest::RawBlockKind::Command => BlockKind::Command,
    };

    match block.kind {
        RawKind::Inline => {
            let source = block.source.ok_or_else(|| {
                ErrorInfo::new(ErrorCode::SchemaInvalid, "inline block missing `source`")
                    .with_context("componentId", block.component_id.clone())
            })?;
            Ok(Executable::new(
                block.component_id,
                ExecutableKind::Inline,
                block_kind,
                source.into_bytes(),
                block.language,
                None,
                loaded_at,
            ))
        }
        RawKind::Path => {
            let relative = block.path.ok_or_else(|| {
                ErrorInfo::new(ErrorCode::SchemaInvalid, "path block missing `path`")
                    .with_context("componentId", block.component_id.clone())
            })?;
            let absolute = root.resolve(&relative)?;
            let source_bytes = std::fs::read(&absolute).map_err(|e| {
                ErrorInfo::new(ErrorCode::Io, "failed to read script file")
                    .with_context("path", relative.clone())
                    .with_source(e)
            })?;
            let language = block.language.or_else(|| language_from_relative(&relative));
            Ok(Executable::new(
                block.component_id,
                ExecutableKind::Path,
                block_kind,
                source_bytes,
                language,
                Some(absolute.display().to_string()),
                loaded_at,
            ))
        }
    }
}

fn language_from_relative(relative: &str) -> Option<String> {
    let name = relative.rsplit('/').next().unwrap_or(relative);
    let lang = rb_core::language_for_filename(name);
    (lang != "plaintext").then_some(lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(dir: &std::path::Path, yaml: &str) {
        std::fs::write(dir.join(crate::manifest::MANIFEST_FILE_NAME), yaml).unwrap();
    }

    #[test]
    fn inline_block_round_trips_by_id_and_component_id() {
        let dir = tempfile::tempdir().unwrap();
        manifest(
            dir.path(),
            "blocks:\n  - component_id: hello\n    kind: inline\n    source: \"echo hi\"\n",
        );
        let registry = Registry::load(RootFs::new(dir.path()).unwrap(), Mode::Frozen).unwrap();

        let by_component = registry.lookup_by_component_id("hello").unwrap();
        let by_id = registry.lookup_by_id(&by_component.id).unwrap();
        assert_eq!(by_component.id, by_id.id);
        assert_eq!(by_component.source_text(), "echo hi");
    }

    #[test]
    fn path_block_reads_and_hashes_the_script_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::write(dir.path().join("scripts/check.sh"), "#!/bin/sh\nexit 2\n").unwrap();
        manifest(
            dir.path(),
            "blocks:\n  - component_id: check\n    kind: path\n    block_kind: check\n    path: scripts/check.sh\n",
        );
        let registry = Registry::load(RootFs::new(dir.path()).unwrap(), Mode::Frozen).unwrap();

        let exe = registry.lookup_by_component_id("check").unwrap();
        assert!(exe.hash_is_consistent());
        assert_eq!(exe.block_kind, BlockKind::Check);
        assert!(exe.absolute_path.is_some());
    }

    #[test]
    fn unknown_reference_is_executable_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(RootFs::new(dir.path()).unwrap(), Mode::Frozen).unwrap();
        let err = registry.lookup_by_id("nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecutableNotFound);
    }

    #[test]
    fn duplicate_component_id_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        manifest(
            dir.path(),
            "blocks:\n  - component_id: dup\n    kind: inline\n    source: a\n  - component_id: dup\n    kind: inline\n    source: b\n",
        );
        let err = Registry::load(RootFs::new(dir.path()).unwrap(), Mode::Frozen).unwrap_err();
        assert_eq!(err.code, ErrorCode::UsageError);
    }

    #[test]
    fn reload_picks_up_manifest_changes() {
        let dir = tempfile::tempdir().unwrap();
        manifest(dir.path(), "blocks:\n  - component_id: a\n    kind: inline\n    source: first\n");
        let registry = Registry::load(RootFs::new(dir.path()).unwrap(), Mode::Watch).unwrap();
        assert_eq!(registry.lookup_by_component_id("a").unwrap().source_text(), "first");

        manifest(dir.path(), "blocks:\n  - component_id: a\n    kind: inline\n    source: second\n");
        registry.reload().unwrap();
        assert_eq!(registry.lookup_by_component_id("a").unwrap().source_text(), "second");
    }

    #[test]
    fn list_is_ordered_by_component_id() {
        let dir = tempfile::tempdir().unwrap();
        manifest(
            dir.path(),
            "blocks:\n  - component_id: zeta\n    kind: inline\n    source: z\n  - component_id: alpha\n    kind: inline\n    source: a\n",
        );
        let registry = Registry::load(RootFs::new(dir.path()).unwrap(), Mode::Frozen).unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|e| e.component_id).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
