//! Watches a large directory for deletions the checker's own watcher tends to miss.
//!
//! After many files vanish at once the checker's incremental state drifts
//! from disk; a full restart is the only reliable way back.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use tokio::sync::{broadcast, mpsc};

use crate::error::{io_err, DaemonError};
use crate::paths::EVENT_SETTLE_WINDOW;
use crate::supervisor::RestartReason;

use super::{next_batch, watch_path, EventRx};

/// Baseline of files known to exist under the watched directory.
#[derive(Debug, Default, Clone)]
pub struct KnownFiles {
    files: BTreeSet<PathBuf>,
}

impl KnownFiles {
    pub fn scan(root: &Path) -> Result<Self, DaemonError> {
        let mut files = BTreeSet::new();
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&dir, err)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&dir, e))?;
                let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
                if ty.is_dir() {
                    dirs.push(entry.path());
                } else {
                    files.insert(entry.path());
                }
            }
        }
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Reconcile one affected path with disk; returns how many known files vanished.
    pub fn observe(&mut self, path: &Path) -> usize {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => {
                // A directory moved in brings its whole subtree with a single event.
                match Self::scan(path) {
                    Ok(found) => self.files.extend(found.files),
                    Err(err) => {
                        tracing::warn!(dir = %path.display(), error = %err, "could not scan new directory")
                    }
                }
                0
            }
            Ok(_) => {
                self.files.insert(path.to_path_buf());
                0
            }
            Err(_) => self.forget(path),
        }
    }

    /// Drop `path` and, if it was a directory, everything known beneath it.
    fn forget(&mut self, path: &Path) -> usize {
        let under: Vec<PathBuf> = self
            .files
            .range(path.to_path_buf()..)
            .take_while(|known| known.starts_with(path))
            .cloned()
            .collect();
        for known in &under {
            self.files.remove(known);
        }
        under.len()
    }
}

/// Creates, deletes and renames all surface as these kinds; plain writes do not matter here.
fn is_rename_class(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

/// Apply one batch of events; returns the number of known files that disappeared.
pub fn apply_batch(known: &mut KnownFiles, batch: &[Event]) -> usize {
    batch
        .iter()
        .filter(|event| is_rename_class(&event.kind))
        .flat_map(|event| event.paths.iter())
        .map(|path| known.observe(path))
        .sum()
}

pub struct BigChangesWatcher {
    _watcher: RecommendedWatcher,
    events: EventRx,
    known: KnownFiles,
    restart_tx: mpsc::Sender<RestartReason>,
}

impl BigChangesWatcher {
    pub fn start(dir: &Path, restart_tx: mpsc::Sender<RestartReason>) -> Result<Self, DaemonError> {
        let dir = fs::canonicalize(dir).map_err(|e| io_err(dir, e))?;
        let (watcher, events) = watch_path(&dir, RecursiveMode::Recursive)?;
        let known = KnownFiles::scan(&dir)?;
        tracing::info!(dir = %dir.display(), files = known.len(), "big-changes watcher started");
        Ok(Self {
            _watcher: watcher,
            events,
            known,
            restart_tx,
        })
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                batch = next_batch(&mut self.events, EVENT_SETTLE_WINDOW) => {
                    let Some(batch) = batch else { break };
                    let removed = apply_batch(&mut self.known, &batch);
                    if removed > 0 {
                        tracing::info!(removed, remaining = self.known.len(), "known files deleted");
                        self.restart_tx
                            .send(RestartReason::FilesDeleted)
                            .await
                            .map_err(|_| DaemonError::ChannelClosed("restart queue"))?;
                    }
                }
            }
        }
        Ok(())
    }
}
