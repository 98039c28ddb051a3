//! The single status snapshot served to clients.
//!
//! Only the supervisor writes; the socket server and tests read. Writes go
//! through a `watch` channel, so a reader always clones a whole snapshot and
//! never sees half of an update even if the runtime were multi-threaded.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::parser::CycleReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub output: String,
    pub has_errors: bool,
    pub has_warnings: bool,
    pub is_complete: bool,
    /// Epoch milliseconds of the last transition.
    pub last_update: u64,
}

impl Snapshot {
    fn in_progress() -> Self {
        Self {
            output: String::new(),
            has_errors: false,
            has_warnings: false,
            is_complete: false,
            last_update: unix_millis_now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Snapshot::in_progress());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// A new check cycle began; the previous output stays until it finishes.
    pub fn mark_started(&self) {
        self.tx.send_modify(|snapshot| {
            snapshot.is_complete = false;
            snapshot.last_update = unix_millis_now();
        });
    }

    pub fn commit(&self, report: &CycleReport) {
        self.tx.send_modify(|snapshot| {
            snapshot.output.clone_from(&report.output);
            snapshot.has_errors = report.errors > 0;
            snapshot.has_warnings = report.warnings > 0;
            snapshot.is_complete = true;
            snapshot.last_update = unix_millis_now();
        });
    }

    /// Drop the previous cycle entirely: empty output, in progress.
    pub fn reset(&self) {
        self.tx.send_replace(Snapshot::in_progress());
    }
}

pub(crate) fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn report(output: &str, errors: u32, warnings: u32) -> CycleReport {
        CycleReport {
            output: output.to_string(),
            errors,
            warnings,
        }
    }

    #[test]
    fn starts_incomplete_and_empty() {
        let store = SnapshotStore::new();
        let snapshot = store.current();
        assert!(!snapshot.is_complete);
        assert!(snapshot.output.is_empty());
        assert!(snapshot.last_update > 0);
    }

    #[test]
    fn started_marker_keeps_previous_output() {
        let store = SnapshotStore::new();
        store.commit(&report("first run", 1, 0));
        store.mark_started();

        let snapshot = store.current();
        assert!(!snapshot.is_complete);
        assert_eq!(snapshot.output, "first run");
        assert!(snapshot.has_errors);
    }

    #[test]
    fn commit_derives_flags_from_counts() {
        let store = SnapshotStore::new();
        store.commit(&report("ok", 0, 0));
        let clean = store.current();
        assert!(clean.is_complete);
        assert!(!clean.has_errors);
        assert!(!clean.has_warnings);

        store.commit(&report("bad", 3, 1));
        let dirty = store.current();
        assert!(dirty.has_errors);
        assert!(dirty.has_warnings);
    }

    #[test]
    fn reset_discards_previous_cycle() {
        let store = SnapshotStore::new();
        store.commit(&report("stale", 2, 0));
        store.reset();

        let snapshot = store.current();
        assert!(!snapshot.is_complete);
        assert!(snapshot.output.is_empty());
        assert!(!snapshot.has_errors);
    }

    #[test]
    fn subscribers_wake_on_commit() {
        let store = SnapshotStore::new();
        let mut rx = store.subscribe();
        let mut changed = task::spawn(async move { rx.changed().await });
        assert_pending!(changed.poll());

        store.commit(&report("done", 0, 0));
        assert!(changed.is_woken());
        let result = assert_ready!(changed.poll());
        assert!(result.is_ok());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let snapshot = Snapshot {
            output: "svelte-check found 0 errors and 0 warnings".to_string(),
            has_errors: false,
            has_warnings: false,
            is_complete: true,
            last_update: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(value["hasErrors"], serde_json::json!(false));
        assert_eq!(value["hasWarnings"], serde_json::json!(false));
        assert_eq!(value["isComplete"], serde_json::json!(true));
        assert_eq!(value["lastUpdate"], serde_json::json!(1_700_000_000_000u64));
        assert!(value["output"].is_string());
    }
}
