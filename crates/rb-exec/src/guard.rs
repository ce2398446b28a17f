// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-executable-id concurrency guard.
//!
//! The engine must never run two executions of the same executable id
//! concurrently. A second call queues (blocks its caller) until the first
//! finishes; a third concurrent call fails immediately with `Busy` rather
//! than queuing further (queue depth 1).

use rb_core::{ErrorCode, ErrorInfo};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, Mutex as AsyncMutex};

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    waiting: AtomicUsize,
}

/// Bounds concurrent executions of the same executable id to a queue
/// depth of one.
#[derive(Default)]
pub struct ConcurrencyGuard {
    slots: Mutex<BTreeMap<String, Arc<Slot>>>,
}

/// Held for the duration of one execution; releases the slot on drop.
#[derive(Debug)]
pub struct ExecutionPermit {
    _guard: OwnedMutexGuard<()>,
    slot: Arc<Slot>,
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.slot.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGuard {
    /// New, empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_for(&self, executable_id: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().expect("guard lock poisoned");
        slots
            .entry(executable_id.to_string())
            .or_insert_with(|| {
                Arc::new(Slot {
                    lock: Arc::new(AsyncMutex::new(())),
                    waiting: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    /// Acquire a permit to run `executable_id`. Awaits if exactly one
    /// other execution is already running; fails immediately with
    /// [`ErrorCode::Busy`] if the queue is already full.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Busy`] when a slot is already running *and*
    /// already has a queued waiter.
    pub async fn acquire(&self, executable_id: &str) -> Result<ExecutionPermit, ErrorInfo> {
        let slot = self.slot_for(executable_id);
        let position = slot.waiting.fetch_add(1, Ordering::SeqCst);

        if position >= 2 {
            slot.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(
                ErrorInfo::new(ErrorCode::Busy, "an execution of this executable is already queued")
                    .with_context("executableId", executable_id),
            );
        }

        let guard = Arc::clone(&slot.lock).lock_owned().await;
        Ok(ExecutionPermit { _guard: guard, slot })
    }
}
