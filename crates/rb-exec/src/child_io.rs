// SPDX-License-Identifier: MIT OR Apache-2.0
#![allow(unsafe_code)]
//! Child process abstraction over a PTY or plain pipes.
//!
//! PTY mode uses `portable-pty`, whose `Read`/`Child` traits are
//! synchronous; per the scheduling model's "two threads per execution"
//! (one reading output, one waiting on termination), PTY I/O runs on
//! dedicated OS threads that forward chunks over a channel. Pipes mode
//! uses `tokio::process` directly since its stdout/stderr handles are
//! already async, so the "threads" there are tokio tasks instead.

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use rb_core::{ErrorCode, ErrorInfo};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};

/// Whether to allocate a pseudo-terminal or use plain pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    /// Attach a PTY; combined stdout/stderr arrive on the master side.
    Pty,
    /// Separate stdout/stderr pipes, interleaved in arrival order.
    Pipes,
}

/// A running (or just-finished) child process.
pub struct ChildHandle {
    pid: Option<u32>,
    output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    exit_rx: oneshot::Receiver<Result<i32, ErrorInfo>>,
}

impl ChildHandle {
    /// The next chunk of combined output, or `None` once every output
    /// stream has closed.
    pub async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.output_rx.recv().await
    }

    /// Await the child's exit code. Call only after `next_chunk` has
    /// returned `None`.
    pub async fn wait(self) -> Result<i32, ErrorInfo> {
        self.exit_rx
            .await
            .unwrap_or_else(|_| Err(ErrorInfo::new(ErrorCode::Internal, "child exit channel dropped before reporting")))
    }

    /// Ask the child to terminate (`SIGTERM` on Unix). A no-op if the pid
    /// is unavailable or on non-Unix platforms, where [`ChildHandle::kill`]
    /// is the only termination primitive available without extra deps.
    pub fn terminate(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    /// Forcibly kill the child (`SIGKILL` on Unix).
    pub fn kill(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.pid;
        }
    }
}

/// Spawn a shell invocation of `command` under the requested mode.
///
/// A PTY allocation failure falls back to pipes mode transparently,
/// logged by the caller rather than surfaced as an error.
pub async fn spawn(mode: SpawnMode, command: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<ChildHandle, ErrorInfo> {
    match mode {
        SpawnMode::Pty => match spawn_pty(command, env, cwd) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                tracing::warn!(error = %e, "pty allocation failed, falling back to pipes");
                spawn_pipes(command, env, cwd).await
            }
        },
        SpawnMode::Pipes => spawn_pipes(command, env, cwd).await,
    }
}

fn spawn_pty(command: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<ChildHandle, ErrorInfo> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 120,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| pty_error("failed to allocate pty", e))?;

    let mut cmd = CommandBuilder::new("/bin/sh");
    cmd.arg("-c");
    cmd.arg(command);
    cmd.cwd(cwd);
    for (k, v) in env {
        cmd.env(k, v);
    }

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| pty_error("failed to spawn child under pty", e))?;
    drop(pair.slave);

    let pid = child.process_id();
    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| pty_error("failed to clone pty reader", e))?;

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut buf = [0_u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let (exit_tx, exit_rx) = oneshot::channel();
    std::thread::spawn(move || {
        let result = child
            .wait()
            .map(|status| status.exit_code() as i32)
            .map_err(|e| ErrorInfo::new(ErrorCode::Internal, "failed to wait on pty child").with_source(std::io::Error::other(e.to_string())));
        let _ = exit_tx.send(result);
    });

    Ok(ChildHandle { pid, output_rx, exit_rx })
}

fn pty_error(message: &'static str, source: impl std::fmt::Display) -> ErrorInfo {
    ErrorInfo::new(ErrorCode::SpawnFailed, message).with_source(std::io::Error::other(source.to_string()))
}

async fn spawn_pipes(command: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<ChildHandle, ErrorInfo> {
    let mut cmd = tokio::process::Command::new("/bin/sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .env_clear()
        .envs(env)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| ErrorInfo::new(ErrorCode::SpawnFailed, "failed to spawn child process").with_source(e))?;

    let pid = child.id();
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    let (output_tx, output_rx) = mpsc::unbounded_channel();

    let stdout_tx = output_tx.clone();
    tokio::spawn(async move {
        let mut buf = [0_u8; 4096];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stdout_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut buf = [0_u8; 4096];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = child
            .wait()
            .await
            .map(|status| status.code().unwrap_or(-1))
            .map_err(|e| ErrorInfo::new(ErrorCode::Internal, "failed to wait on child process").with_source(e));
        let _ = exit_tx.send(result);
    });

    Ok(ChildHandle { pid, output_rx, exit_rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipes_mode_streams_output_and_exit_code() {
        let mut handle = spawn(SpawnMode::Pipes, "echo hi", &BTreeMap::new(), Path::new(".")).await.unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = handle.next_chunk().await {
            collected.extend_from_slice(&chunk);
        }
        let code = handle.wait().await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(String::from_utf8_lossy(&collected).trim(), "hi");
    }

    #[tokio::test]
    async fn pipes_mode_reports_non_zero_exit_code() {
        let mut handle = spawn(SpawnMode::Pipes, "exit 3", &BTreeMap::new(), Path::new(".")).await.unwrap();
        while handle.next_chunk().await.is_some() {}
        assert_eq!(handle.wait().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn env_vars_reach_the_child() {
        let mut env = BTreeMap::new();
        env.insert("RB_TEST_VAR".to_string(), "ok".to_string());
        let mut handle = spawn(SpawnMode::Pipes, "echo $RB_TEST_VAR", &env, Path::new(".")).await.unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = handle.next_chunk().await {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(String::from_utf8_lossy(&collected).trim(), "ok");
    }
}
