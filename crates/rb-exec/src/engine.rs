// SPDX-License-Identifier: MIT OR Apache-2.0
//! Orchestrates a single execution: resolve the executable, acquire the
//! per-id concurrency guard, render its source, spawn it, stream output
//! lines, and finalize outputs and captured files on termination.

use crate::child_io::{self, SpawnMode};
use crate::env::{build_child_env, InjectedPaths};
use crate::guard::ConcurrencyGuard;
use crate::lines::LineSplitter;
use chrono::Utc;
use rb_core::{BlockOutputs, ErrorCode, ErrorInfo, Executable, ExecutionStatus, FileTreeNode, LogEntry};
use rb_registry::{Mode, Registry};
use rb_workspace::Workspace;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// One `/exec` request's parameters.
pub struct ExecutionRequest {
    /// Executable id (frozen mode) or componentId (watch mode).
    pub executable_ref: String,
    /// Template variable values supplied by the caller.
    pub values: BTreeMap<String, serde_json::Value>,
    /// Environment variables from an auth block, merged on top of the
    /// session environment for this run only.
    pub auth_env: BTreeMap<String, String>,
    /// `true` to request a PTY on POSIX (ignored on Windows, which always
    /// uses pipes).
    pub use_pty: bool,
}

/// One event in the SSE sequence: zero-or-more `log`, then zero-or-one
/// `outputs`, then zero-or-one `files`, then exactly one terminal
/// `status`.
#[derive(Debug, Clone)]
pub enum ExecEvent {
    /// A line (or overwrite) of child output.
    Log(LogEntry),
    /// Parsed `RUNBOOK_OUTPUT` key/value pairs.
    Outputs(BTreeMap<String, String>),
    /// Updated whole workspace tree after a `GENERATED_FILES` merge.
    Files(FileTreeNode),
    /// Terminal status for this execution, with the raw exit code when
    /// the process actually ran.
    Status(ExecutionStatus, Option<i32>),
}

/// Drives executions against a registry, block-outputs map, and
/// generated-files workspace.
pub struct Engine {
    registry: Arc<Registry>,
    workspace: Arc<Workspace>,
    block_outputs: Arc<BlockOutputs>,
    guard: ConcurrencyGuard,
    grace_period: Duration,
}

impl Engine {
    /// Build an engine over the given shared components.
    #[must_use]
    pub fn new(registry: Arc<Registry>, workspace: Arc<Workspace>, block_outputs: Arc<BlockOutputs>, grace_period: Duration) -> Self {
        Self {
            registry,
            workspace,
            block_outputs,
            guard: ConcurrencyGuard::new(),
            grace_period,
        }
    }

    /// Run one execution to completion, emitting [`ExecEvent`]s over
    /// `events` as they occur.
    ///
    /// Errors returned *before* any event is sent (resolve, concurrency,
    /// or template render failures) mean no SSE stream need be opened at
    /// all — the caller can respond with a plain error status. Once the
    /// first `log`/`status` event is sent, the execution is considered to
    /// have started and every subsequent failure is reported as a
    /// terminal `status` event instead of a `Result::Err`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ExecutableNotFound`], [`ErrorCode::Busy`], or
    /// [`ErrorCode::TemplateExec`] for pre-spawn failures.
    pub async fn execute(&self, request: ExecutionRequest, events: mpsc::UnboundedSender<ExecEvent>, mut cancel: watch::Receiver<bool>) -> Result<(), ErrorInfo> {
        let executable = self.resolve(&request.executable_ref)?;
        let permit = self.guard.acquire(&executable.id).await?;

        let blocks = self.block_outputs.snapshot();
        let rendered = rb_template::render_text(&executable.component_id, &executable.source_text(), &request.values, &blocks)?;

        let output_file = tempfile::NamedTempFile::new().map_err(|e| ErrorInfo::new(ErrorCode::Io, "failed to create output capture file").with_source(e))?;
        let generated_dir = tempfile::tempdir().map_err(|e| ErrorInfo::new(ErrorCode::Io, "failed to create generated-files directory").with_source(e))?;

        let env = build_child_env(
            &BTreeMap::new(),
            &request.auth_env,
            &InjectedPaths {
                output_file: output_file.path(),
                generated_files_dir: generated_dir.path(),
                runbook_root: self.registry.root().root(),
            },
        );

        let mode = spawn_mode(request.use_pty);
        let mut handle = match child_io::spawn(mode, &rendered, &env, self.registry.root().root()).await {
            Ok(handle) => handle,
            Err(e) => {
                let _ = events.send(ExecEvent::Log(LogEntry::line(e.to_string(), Utc::now())));
                let _ = events.send(ExecEvent::Status(ExecutionStatus::Fail, None));
                self.block_outputs.record(executable.component_id.clone(), BTreeMap::new(), Utc::now());
                drop(permit);
                return Ok(());
            }
        };

        let mut splitter = LineSplitter::new();
        let mut cancelled = false;
        let mut kill_deadline: Option<tokio::time::Instant> = None;

        loop {
            if let Some(deadline) = kill_deadline {
                tokio::select! {
                    chunk = handle.next_chunk() => {
                        match chunk {
                            Some(bytes) => emit_lines(&events, &mut splitter, &bytes),
                            None => break,
                        }
                    }
                    () = tokio::time::sleep_until(deadline) => {
                        handle.kill();
                        kill_deadline = None;
                    }
                }
            } else if cancelled {
                match handle.next_chunk().await {
                    Some(bytes) => emit_lines(&events, &mut splitter, &bytes),
                    None => break,
                }
            } else {
                tokio::select! {
                    chunk = handle.next_chunk() => {
                        match chunk {
                            Some(bytes) => emit_lines(&events, &mut splitter, &bytes),
                            None => break,
                        }
                    }
                    changed = cancel.changed() => {
                        if changed.is_ok() && *cancel.borrow() {
                            handle.terminate();
                            cancelled = true;
                            kill_deadline = Some(tokio::time::Instant::now() + self.grace_period);
                        }
                    }
                }
            }
        }

        if let Some(last) = splitter.finish() {
            let _ = events.send(ExecEvent::Log(last));
        }

        let exit_result = handle.wait().await;
        drop(permit);

        let exit_code = exit_result.as_ref().ok().copied();
        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else {
            match exit_result {
                Ok(code) => ExecutionStatus::from_exit_code(code, executable.block_kind),
                Err(e) => {
                    let _ = events.send(ExecEvent::Log(LogEntry::line(e.to_string(), Utc::now())));
                    ExecutionStatus::Fail
                }
            }
        };

        self.finalize(&executable, &events, output_file.path(), generated_dir.path());
        let _ = events.send(ExecEvent::Status(status, exit_code));

        Ok(())
    }

    fn finalize(&self, executable: &Executable, events: &mpsc::UnboundedSender<ExecEvent>, output_path: &std::path::Path, generated_dir: &std::path::Path) {
        let raw = std::fs::read_to_string(output_path).unwrap_or_default();
        let outputs = rb_core::parse_outputs(&raw);
        self.block_outputs.record(executable.component_id.clone(), outputs.clone(), Utc::now());
        let _ = events.send(ExecEvent::Outputs(outputs));

        let has_generated = std::fs::read_dir(generated_dir).map(|mut it| it.next().is_some()).unwrap_or(false);
        if has_generated {
            match self.workspace.merge_subtree(&executable.component_id, generated_dir) {
                Ok(tree) => {
                    let _ = events.send(ExecEvent::Files(tree));
                }
                Err(e) => {
                    let _ = events.send(ExecEvent::Log(LogEntry::line(format!("failed to merge generated files: {e}"), Utc::now())));
                }
            }
        }
    }

    fn resolve(&self, reference: &str) -> Result<Executable, ErrorInfo> {
        match self.registry.mode() {
            Mode::Frozen => self.registry.lookup_by_id(reference),
            Mode::Watch => self.registry.lookup_by_component_id(reference),
        }
    }
}

fn emit_lines(events: &mpsc::UnboundedSender<ExecEvent>, splitter: &mut LineSplitter, bytes: &[u8]) {
    for line in splitter.feed(bytes) {
        let _ = events.send(ExecEvent::Log(line));
    }
}

fn spawn_mode(use_pty: bool) -> SpawnMode {
    if cfg!(unix) && use_pty {
        SpawnMode::Pty
    } else {
        SpawnMode::Pipes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rb_pathsafe::RootFs;
    use rb_registry::Registry;

    fn make_registry(dir: &std::path::Path, manifest: &str) -> Arc<Registry> {
        std::fs::write(dir.join(rb_registry::MANIFEST_FILE_NAME), manifest).unwrap();
        Arc::new(Registry::load(RootFs::new(dir).unwrap(), Mode::Frozen).unwrap())
    }

    #[tokio::test]
    async fn executes_inline_command_and_collects_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let registry = make_registry(
            dir.path(),
            "blocks:\n  - component_id: hello\n    kind: inline\n    source: |\n      echo \"V=1\" >> \"$RUNBOOK_OUTPUT\"\n      echo hi\n",
        );
        let workspace = Arc::new(Workspace::new(RootFs::new(dir.path()).unwrap()).unwrap());
        let block_outputs = Arc::new(BlockOutputs::new());
        let engine = Engine::new(registry.clone(), workspace, block_outputs.clone(), Duration::from_secs(5));

        let id = registry.lookup_by_component_id("hello").unwrap().id;
        let request = ExecutionRequest {
            executable_ref: id,
            values: BTreeMap::new(),
            auth_env: BTreeMap::new(),
            use_pty: false,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        engine.execute(request, tx, cancel_rx).await.unwrap();

        let mut saw_outputs = false;
        let mut saw_terminal_success = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ExecEvent::Outputs(map) => {
                    assert_eq!(map.get("V"), Some(&"1".to_string()));
                    saw_outputs = true;
                }
                ExecEvent::Status(ExecutionStatus::Success, Some(0)) => saw_terminal_success = true,
                _ => {}
            }
        }
        assert!(saw_outputs);
        assert!(saw_terminal_success);
        assert_eq!(block_outputs.get("hello").unwrap().values.get("V"), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn unknown_executable_id_fails_before_any_event() {
        let dir = tempfile::tempdir().unwrap();
        let registry = make_registry(dir.path(), "blocks: []\n");
        let workspace = Arc::new(Workspace::new(RootFs::new(dir.path()).unwrap()).unwrap());
        let engine = Engine::new(registry, workspace, Arc::new(BlockOutputs::new()), Duration::from_secs(5));

        let request = ExecutionRequest {
            executable_ref: "nope".to_string(),
            values: BTreeMap::new(),
            auth_env: BTreeMap::new(),
            use_pty: false,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let err = engine.execute(request, tx, cancel_rx).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecutableNotFound);
    }

    #[tokio::test]
    async fn command_exit_code_maps_to_fail_status() {
        let dir = tempfile::tempdir().unwrap();
        let registry = make_registry(dir.path(), "blocks:\n  - component_id: bad\n    kind: inline\n    source: \"exit 1\"\n");
        let workspace = Arc::new(Workspace::new(RootFs::new(dir.path()).unwrap()).unwrap());
        let engine = Engine::new(registry.clone(), workspace, Arc::new(BlockOutputs::new()), Duration::from_secs(5));

        let id = registry.lookup_by_component_id("bad").unwrap().id;
        let request = ExecutionRequest {
            executable_ref: id,
            values: BTreeMap::new(),
            auth_env: BTreeMap::new(),
            use_pty: false,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        engine.execute(request, tx, cancel_rx).await.unwrap();

        let mut terminal = None;
        while let Ok(event) = rx.try_recv() {
            if let ExecEvent::Status(status, _code) = event {
                terminal = Some(status);
            }
        }
        assert_eq!(terminal, Some(ExecutionStatus::Fail));
    }

    #[tokio::test]
    async fn cancellation_yields_cancelled_status() {
        let dir = tempfile::tempdir().unwrap();
        let registry = make_registry(dir.path(), "blocks:\n  - component_id: sleepy\n    kind: inline\n    source: \"sleep 30\"\n");
        let workspace = Arc::new(Workspace::new(RootFs::new(dir.path()).unwrap()).unwrap());
        let engine = Engine::new(registry.clone(), workspace, Arc::new(BlockOutputs::new()), Duration::from_millis(200));

        let id = registry.lookup_by_component_id("sleepy").unwrap().id;
        let request = ExecutionRequest {
            executable_ref: id,
            values: BTreeMap::new(),
            auth_env: BTreeMap::new(),
            use_pty: false,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let exec = tokio::spawn(async move { engine.execute(request, tx, cancel_rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_tx.send(true).unwrap();
        exec.await.unwrap().unwrap();

        let mut terminal = None;
        while let Ok(event) = rx.try_recv() {
            if let ExecEvent::Status(status, _code) = event {
                terminal = Some(status);
            }
        }
        assert_eq!(terminal, Some(ExecutionStatus::Cancelled));
    }
}
