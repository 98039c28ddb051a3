//! Filesystem watchers that keep the checker in step with the workspace.
//!
//! Each watcher owns a `notify` watcher whose callback thread forwards raw
//! events into a tokio channel; the async side filters, batches and reacts.

pub mod big_changes;
pub mod git_head;
pub mod routes;

use std::path::Path;
use std::time::Duration;

use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::DaemonError;

pub use big_changes::{BigChangesWatcher, KnownFiles};
pub use git_head::{find_head_file, HeadWatcher};
pub use routes::{is_route_file, Debouncer, RouteWatcher};

pub(crate) type EventRx = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Directories whose churn never concerns the checker.
const IGNORED_DIRS: &[&str] = &["node_modules", ".svelte-kit", ".git"];

pub(crate) fn watch_path(
    path: &Path,
    mode: RecursiveMode,
) -> Result<(RecommendedWatcher, EventRx), DaemonError> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(path, mode)?;
    Ok((watcher, event_rx))
}

/// Wait for one event, then keep collecting until `window` passes without another.
///
/// Returns `None` once the channel is closed and drained.
pub(crate) async fn next_batch(rx: &mut EventRx, window: Duration) -> Option<Vec<Event>> {
    let first = rx.recv().await?;
    let mut batch = Vec::new();
    push_event(&mut batch, first);
    while let Ok(Some(event)) = tokio::time::timeout(window, rx.recv()).await {
        push_event(&mut batch, event);
    }
    Some(batch)
}

fn push_event(batch: &mut Vec<Event>, event: notify::Result<Event>) {
    match event {
        Ok(event) => batch.push(event),
        Err(err) => tracing::warn!(error = %err, "watcher event error"),
    }
}

pub(crate) fn is_ignored(path: &Path) -> bool {
    path.components().any(|component| match component {
        std::path::Component::Normal(name) => IGNORED_DIRS
            .iter()
            .any(|ignored| name == std::ffi::OsStr::new(ignored)),
        _ => false,
    })
}
