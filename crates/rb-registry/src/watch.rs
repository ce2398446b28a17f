// SPDX-License-Identifier: MIT OR Apache-2.0
//! Debounced filesystem watcher that drives registry reloads in watch mode.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Subtree excluded from triggering a reload — mutating it is a side
/// effect of execution and directory-mode renders, not an authoring
/// change to the runbook itself.
const EXCLUDED_DIR: &str = ".runbooks-workspace";

const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// An event worth rebuilding the registry for.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// The path that changed, relative to the watched root.
    pub path: PathBuf,
}

/// Watches a runbook root for changes outside the generated-files
/// workspace, emitting a debounced [`ChangeEvent`] per batch.
pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns a `notify::Error` if the underlying OS watch cannot be
    /// established.
    pub fn new(root: &Path) -> notify::Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let root_owned = root.to_path_buf();

        let mut debouncer = new_debouncer(
            Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if is_excluded(&root_owned, &event.path) {
                            continue;
                        }
                        debug!(path = %event.path.display(), "runbook file changed");
                        if event_tx.send(ChangeEvent { path: event.path }).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "registry watcher error");
                }
            },
        )?;

        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Receive the next change event. Returns `None` once the watcher has
    /// stopped (the debouncer was dropped).
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.event_rx.recv().await
    }
}

fn is_excluded(root: &Path, changed: &Path) -> bool {
    changed
        .strip_prefix(root)
        .map(|rel| rel.starts_with(EXCLUDED_DIR))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_subtree_is_excluded() {
        let root = Path::new("/runbook");
        assert!(is_excluded(root, Path::new("/runbook/.runbooks-workspace/deploy/out.txt")));
        assert!(!is_excluded(root, Path::new("/runbook/scripts/deploy.sh")));
    }

    #[tokio::test]
    async fn detects_a_change_outside_the_workspace_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("runbook.blocks.yaml"), "blocks: []\n").unwrap();

        let mut watcher = FileWatcher::new(&root).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(root.join("runbook.blocks.yaml"), "blocks: []\nextra\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), watcher.recv()).await;
        assert!(matches!(event, Ok(Some(_))));
    }
}
