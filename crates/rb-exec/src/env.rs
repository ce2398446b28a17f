// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builds the per-execution child environment.

use std::collections::BTreeMap;
use std::path::Path;

/// Environment variables always exported to an executing script, in
/// addition to the inherited process/session/auth environment.
pub struct InjectedPaths<'a> {
    /// `RUNBOOK_OUTPUT` — a per-execution empty temp file for `KEY=VALUE`
    /// side-channel output.
    pub output_file: &'a Path,
    /// `GENERATED_FILES` — a per-execution empty temp directory for
    /// captured files.
    pub generated_files_dir: &'a Path,
    /// `RUNBOOK_ROOT` — the runbook's root directory.
    pub runbook_root: &'a Path,
}

/// Merge the process environment, the session environment, and `auth_env`
/// (highest priority: process ∪ session ∪ auth, later overrides earlier),
/// then add the three injected paths.
#[must_use]
pub fn build_child_env(
    session_env: &BTreeMap<String, String>,
    auth_env: &BTreeMap<String, String>,
    injected: &InjectedPaths<'_>,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = std::env::vars().collect();
    env.extend(session_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env.extend(auth_env.iter().map(|(k, v)| (k.clone(), v.clone())));

    env.insert("RUNBOOK_OUTPUT".to_string(), injected.output_file.display().to_string());
    env.insert(
        "GENERATED_FILES".to_string(),
        injected.generated_files_dir.display().to_string(),
    );
    env.insert("RUNBOOK_ROOT".to_string(), injected.runbook_root.display().to_string());

    env
}
