// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared state for a single running runbook document session.

use rb_config::RunbookConfig;
use rb_core::BlockOutputs;
use rb_exec::Engine;
use rb_pathsafe::RootFs;
use rb_registry::Registry;
use rb_workspace::Workspace;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Everything a handler needs to serve one runbook document.
pub struct AppState {
    /// The runbook root, already canonicalized.
    pub root: RootFs,
    /// The loaded (frozen or watch-mode) script registry.
    pub registry: Arc<Registry>,
    /// Generated-files workspace tracker.
    pub workspace: Arc<Workspace>,
    /// Process-wide `_blocks` outputs namespace.
    pub block_outputs: Arc<BlockOutputs>,
    /// Execution engine.
    pub engine: Arc<Engine>,
    /// Effective session configuration.
    pub config: RunbookConfig,
    /// Cancellation senders for executions currently streaming, keyed by
    /// a server-generated execution id.
    pub cancellations: Mutex<BTreeMap<String, watch::Sender<bool>>>,
}

impl AppState {
    /// Register a cancellation channel for a newly started execution.
    pub fn register_execution(&self, execution_id: String, sender: watch::Sender<bool>) {
        self.cancellations
            .lock()
            .expect("cancellations lock poisoned")
            .insert(execution_id, sender);
    }

    /// Remove a finished execution's cancellation channel.
    pub fn unregister_execution(&self, execution_id: &str) {
        self.cancellations
            .lock()
            .expect("cancellations lock poisoned")
            .remove(execution_id);
    }

    /// Signal cancellation for a running execution. Returns `false` if no
    /// such execution is currently streaming.
    pub fn cancel_execution(&self, execution_id: &str) -> bool {
        let senders = self.cancellations.lock().expect("cancellations lock poisoned");
        match senders.get(execution_id) {
            Some(sender) => sender.send(true).is_ok(),
            None => false,
        }
    }
}
