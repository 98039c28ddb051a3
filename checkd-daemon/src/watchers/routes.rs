//! Route-file watcher: regenerates route types by running the sync tool.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use regex::Regex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::paths::ROUTE_DEBOUNCE;

use super::{is_ignored, watch_path, EventRx};

static ROUTE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+(page|layout|server|error)(@[^.]*)?(\.server)?\.(svelte|js|ts)$")
        .expect("route file pattern is valid")
});

pub fn is_route_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| ROUTE_FILE.is_match(name))
}

/// A single pending delayed task; scheduling again restarts the delay.
///
/// Only the delay is cancellable. Once it elapses the task runs on its own
/// and survives later events; [`Debouncer::shutdown`] stops everything.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
    fired: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            fired: Arc::default(),
        }
    }

    /// Restart the delay; `task` runs once `delay` passes undisturbed.
    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        let fired = Arc::clone(&self.fired);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // No await past this point, so an abort either lands in the sleep or not at all.
            let handle = tokio::spawn(task);
            let mut fired = fired.lock().unwrap_or_else(PoisonError::into_inner);
            fired.retain(|running| !running.is_finished());
            fired.push(handle);
        }));
    }

    /// Drop the pending timer. A task that already fired keeps running.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    /// Drop the pending timer and abort any task still running.
    pub fn shutdown(&mut self) {
        self.cancel();
        let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
        for running in fired.drain(..) {
            running.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone)]
struct SyncCommand {
    program: OsString,
    args: Vec<OsString>,
    cwd: PathBuf,
}

impl SyncCommand {
    async fn run(self) {
        tracing::info!(program = %self.program.to_string_lossy(), "route files changed; running sync");
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(status) if status.success() => tracing::debug!("route sync finished"),
            Ok(status) => tracing::warn!(%status, "route sync exited unsuccessfully"),
            Err(err) => tracing::warn!(error = %err, "route sync failed to start"),
        }
    }
}

pub struct RouteWatcher {
    _watcher: RecommendedWatcher,
    events: EventRx,
    sync: SyncCommand,
    debouncer: Debouncer,
}

impl RouteWatcher {
    pub fn start(config: &DaemonConfig) -> Result<Self, DaemonError> {
        let (watcher, events) = watch_path(&config.root, RecursiveMode::Recursive)?;
        tracing::info!(root = %config.root.display(), "route watcher started");
        Ok(Self {
            _watcher: watcher,
            events,
            sync: SyncCommand {
                program: config.sync_tool.clone(),
                args: config.sync_args(),
                cwd: config.root.clone(),
            },
            debouncer: Debouncer::new(ROUTE_DEBOUNCE),
        })
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    let event = match event {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(error = %err, "route watcher event error");
                            continue;
                        }
                    };
                    if matches!(event.kind, EventKind::Access(_)) {
                        continue;
                    }
                    if event.paths.iter().any(|path| !is_ignored(path) && is_route_file(path)) {
                        self.debouncer.schedule(self.sync.clone().run());
                    }
                }
            }
        }

        self.debouncer.shutdown();
        Ok(())
    }
}
