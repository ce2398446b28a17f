// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `_blocks` namespace: outputs captured from prior executions in the
//! current process, made available to templates under the reserved root
//! key `_blocks`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Outputs recorded by a single completed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Key/value pairs parsed from that execution's outputs side-channel.
    pub values: BTreeMap<String, String>,
    /// When this record was written.
    pub timestamp: DateTime<Utc>,
}

/// Process-wide map from `componentId` to that block's most recent
/// [`BlockRecord`].
///
/// A single instance is shared across every render and execution in a
/// server process; there is no persistence across restarts, and nothing
/// here is written to disk.
#[derive(Debug, Default)]
pub struct BlockOutputs {
    records: RwLock<BTreeMap<String, BlockRecord>>,
}

impl BlockOutputs {
    /// Create an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or replace a block's outputs.
    pub fn record(&self, component_id: impl Into<String>, values: BTreeMap<String, String>, timestamp: DateTime<Utc>) {
        let mut records = self.records.write().expect("block outputs lock poisoned");
        records.insert(component_id.into(), BlockRecord { values, timestamp });
    }

    /// Fetch a snapshot of a single block's record, if any.
    #[must_use]
    pub fn get(&self, component_id: &str) -> Option<BlockRecord> {
        let records = self.records.read().expect("block outputs lock poisoned");
        records.get(component_id).cloned()
    }

    /// Snapshot the full namespace, suitable for injection as the
    /// `_blocks` template root key.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, BlockRecord> {
        let records = self.records.read().expect("block outputs lock poisoned");
        records.clone()
    }

    /// Remove a block's record, e.g. when its executable is unregistered.
    pub fn clear(&self, component_id: &str) {
        let mut records = self.records.write().expect("block outputs lock poisoned");
        records.remove(component_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_fetch_round_trip() {
        let outputs = BlockOutputs::new();
        let mut values = BTreeMap::new();
        values.insert("STATUS".to_string(), "ok".to_string());
        outputs.record("check-disk", values.clone(), Utc::now());

        let record = outputs.get("check-disk").expect("record present");
        assert_eq!(record.values, values);
    }

    #[test]
    fn missing_block_returns_none() {
        let outputs = BlockOutputs::new();
        assert!(outputs.get("nope").is_none());
    }

    #[test]
    fn later_record_replaces_earlier_one() {
        let outputs = BlockOutputs::new();
        let mut first = BTreeMap::new();
        first.insert("A".to_string(), "1".to_string());
        outputs.record("c", first, Utc::now());

        let mut second = BTreeMap::new();
        second.insert("A".to_string(), "2".to_string());
        outputs.record("c", second, Utc::now());

        assert_eq!(outputs.get("c").unwrap().values.get("A"), Some(&"2".to_string()));
    }

    #[test]
    fn snapshot_reflects_all_recorded_blocks() {
        let outputs = BlockOutputs::new();
        outputs.record("a", BTreeMap::new(), Utc::now());
        outputs.record("b", BTreeMap::new(), Utc::now());
        assert_eq!(outputs.snapshot().len(), 2);
    }

    #[test]
    fn clear_removes_a_block() {
        let outputs = BlockOutputs::new();
        outputs.record("a", BTreeMap::new(), Utc::now());
        outputs.clear("a");
        assert!(outputs.get("a").is_none());
    }
}
