// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution-related data model: executables, log entries, status, and the
//! key/value outputs side-channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// How an executable's source was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableKind {
    /// An inline command string embedded in the document.
    Inline,
    /// A script file referenced by path.
    Path,
}

/// Whether a block's exit-code-to-status mapping treats code 2 as a warning
/// (checks) or as a hard failure (commands).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// A check: exit code 2 maps to `warn`.
    Check,
    /// A command: any non-zero exit code maps to `fail`.
    Command,
}

/// An immutable, content-addressed snapshot of a script or inline command
/// the server is willing to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Executable {
    /// Opaque stable token identifying this executable.
    pub id: String,
    /// UI-visible identifier for the originating block.
    pub component_id: String,
    /// Whether the source came from an inline string or a file path.
    pub kind: ExecutableKind,
    /// Check vs. command exit-code semantics.
    pub block_kind: BlockKind,
    /// Raw bytes of the script or inline command, exactly as captured at
    /// registry load time.
    pub source_bytes: Vec<u8>,
    /// Hex-encoded SHA-256 of `source_bytes`.
    pub sha256_hash: String,
    /// Display language, when known (derived from the source path).
    pub language: Option<String>,
    /// Absolute path on disk, for `kind = Path` executables.
    pub absolute_path: Option<String>,
    /// When this executable was registered.
    pub loaded_at: DateTime<Utc>,
}

impl Executable {
    /// Build an executable, computing its id and hash from its fields.
    ///
    /// `id` is a stable hash over `(component_id, kind, content)`.
    #[must_use]
    pub fn new(
        component_id: impl Into<String>,
        kind: ExecutableKind,
        block_kind: BlockKind,
        source_bytes: Vec<u8>,
        language: Option<String>,
        absolute_path: Option<String>,
        loaded_at: DateTime<Utc>,
    ) -> Self {
        let component_id = component_id.into();
        let sha256_hash = hex_sha256(&source_bytes);

        let mut id_hasher = Sha256::new();
        id_hasher.update(component_id.as_bytes());
        id_hasher.update([kind as u8]);
        id_hasher.update(&source_bytes);
        let id = format!("{:x}", id_hasher.finalize());

        Self {
            id,
            component_id,
            kind,
            block_kind,
            source_bytes,
            sha256_hash,
            language,
            absolute_path,
            loaded_at,
        }
    }

    /// The source as a UTF-8 string. Stored bytes are binary-safe, but
    /// scripts are always rendered and executed as text.
    #[must_use]
    pub fn source_text(&self) -> String {
        String::from_utf8_lossy(&self.source_bytes).into_owned()
    }

    /// Verify that the stored hash matches a freshly computed one.
    ///
    /// Used by tests asserting content-addressing holds; never called on
    /// the execution hot path since the registry is the sole source of
    /// hashes.
    #[must_use]
    pub fn hash_is_consistent(&self) -> bool {
        self.sha256_hash == hex_sha256(&self.source_bytes)
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A single line of process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The line content (without its terminator).
    pub line: String,
    /// ISO-8601 UTC timestamp of when the line was captured.
    pub timestamp: DateTime<Utc>,
    /// When `true`, the consumer should overwrite the previously emitted
    /// line instead of appending a new one (collapses `\r` progress
    /// updates).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replace: bool,
}

impl LogEntry {
    /// Build a log entry for a newline-terminated line.
    #[must_use]
    pub fn line(line: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            line: line.into(),
            timestamp,
            replace: false,
        }
    }

    /// Build a log entry for a carriage-return-only overwrite.
    #[must_use]
    pub fn overwrite(line: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            line: line.into(),
            timestamp,
            replace: true,
        }
    }
}

/// Terminal or in-flight state of an execution's state machine:
/// `pending -> running -> {success, fail, warn, cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Queued but not yet spawned.
    Pending,
    /// Currently running.
    Running,
    /// Exited with code 0.
    Success,
    /// Exited with a non-zero code the block kind classifies as a failure.
    Fail,
    /// A `check`-kind block exited with code 2.
    Warn,
    /// Terminated by cancellation (client disconnect, explicit cancel, or
    /// shutdown).
    Cancelled,
}

impl ExecutionStatus {
    /// Classify a process exit code: 0 is always success; a `check`-kind
    /// block maps exit code 2 to a warning; everything else is a failure.
    #[must_use]
    pub fn from_exit_code(code: i32, block_kind: BlockKind) -> Self {
        match (code, block_kind) {
            (0, _) => Self::Success,
            (2, BlockKind::Check) => Self::Warn,
            _ => Self::Fail,
        }
    }

    /// `true` for any of the three terminal-via-completion states
    /// (`success`, `fail`, `warn`) — i.e. everything except `pending`,
    /// `running`, and `cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Parse the `RUNBOOK_OUTPUT` KV file format: `KEY=VALUE` lines, blank
/// lines and `#`-prefixed comments skipped, later duplicates overwrite
/// earlier ones.
#[must_use]
pub fn parse_outputs(raw: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            let key = key.trim();
            if is_valid_identifier(key) {
                out.insert(key.to_string(), value.to_string());
            }
        }
    }
    out
}

/// Variable-identifier grammar used for output keys: starts with a letter
/// or underscore, followed by letters, digits, or underscores.
#[must_use]
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_hash_is_consistent() {
        let exe = Executable::new(
            "hello",
            ExecutableKind::Inline,
            BlockKind::Command,
            b"echo hi".to_vec(),
            None,
            None,
            Utc::now(),
        );
        assert!(exe.hash_is_consistent());
        assert_eq!(exe.sha256_hash.len(), 64);
    }

    #[test]
    fn same_content_and_component_yields_same_id() {
        let now = Utc::now();
        let a = Executable::new("hello", ExecutableKind::Inline, BlockKind::Command, b"echo hi".to_vec(), None, None, now);
        let b = Executable::new("hello", ExecutableKind::Inline, BlockKind::Command, b"echo hi".to_vec(), None, None, now);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_content_yields_different_id() {
        let now = Utc::now();
        let a = Executable::new("hello", ExecutableKind::Inline, BlockKind::Command, b"echo hi".to_vec(), None, None, now);
        let b = Executable::new("hello", ExecutableKind::Inline, BlockKind::Command, b"echo bye".to_vec(), None, None, now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn status_from_exit_code_classifies_check_and_command_blocks() {
        assert_eq!(ExecutionStatus::from_exit_code(0, BlockKind::Command), ExecutionStatus::Success);
        assert_eq!(ExecutionStatus::from_exit_code(2, BlockKind::Check), ExecutionStatus::Warn);
        assert_eq!(ExecutionStatus::from_exit_code(2, BlockKind::Command), ExecutionStatus::Fail);
        assert_eq!(ExecutionStatus::from_exit_code(1, BlockKind::Check), ExecutionStatus::Fail);
    }

    #[test]
    fn parse_outputs_handles_comments_blanks_and_duplicates() {
        let raw = "# a comment\n\nNAME=ada\nNAME=grace\nBAD KEY=x\n1invalid=y\n";
        let parsed = parse_outputs(raw);
        assert_eq!(parsed.get("NAME"), Some(&"grace".to_string()));
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn identifier_grammar() {
        assert!(is_valid_identifier("NAME"));
        assert!(is_valid_identifier("_private1"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("bad key"));
        assert!(!is_valid_identifier(""));
    }
}
