//! Client side of the status protocol.
//!
//! One connection carries one exchange: the client writes [`STATUS_QUERY`]
//! with no framing, the daemon answers with a JSON [`Snapshot`] and closes.
//! Every failure on this path means "no daemon" rather than an error.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::Instant;

use crate::paths::{WorkspacePaths, QUERY_TIMEOUT};
use crate::snapshot::Snapshot;

pub const STATUS_QUERY: &str = "GET_STATUS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Complete(Snapshot),
    /// The ceiling passed with a cycle still running; carries the last snapshot seen.
    TimedOut(Snapshot),
    NoDaemon,
}

/// True when the PID marker names a process that accepts a null signal.
pub fn is_alive(paths: &WorkspacePaths) -> bool {
    read_pid(paths.pid_file()).is_some_and(process_exists)
}

pub(crate) fn read_pid(pid_file: &Path) -> Option<i32> {
    fs::read_to_string(pid_file).ok()?.trim().parse().ok()
}

pub(crate) fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs the existence and permission check only.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Ask the workspace daemon for its snapshot; `None` means no daemon answered.
pub async fn query_status(paths: &WorkspacePaths) -> Option<Snapshot> {
    query_status_with_timeout(paths.socket(), QUERY_TIMEOUT).await
}

pub async fn query_status_with_timeout(socket: &Path, ceiling: Duration) -> Option<Snapshot> {
    if !socket.exists() {
        return None;
    }
    // Dropping the exchange future on timeout closes the stream with it.
    match tokio::time::timeout(ceiling, exchange(socket)).await {
        Ok(Ok(snapshot)) => Some(snapshot),
        Ok(Err(err)) => {
            tracing::debug!(socket = %socket.display(), error = %err, "status query failed");
            None
        }
        Err(_) => {
            tracing::debug!(socket = %socket.display(), "status query timed out");
            None
        }
    }
}

async fn exchange(socket: &Path) -> Result<Snapshot, crate::DaemonError> {
    let mut stream = UnixStream::connect(socket)
        .await
        .map_err(|e| crate::error::io_err(socket, e))?;
    stream
        .write_all(STATUS_QUERY.as_bytes())
        .await
        .map_err(|e| crate::error::io_err(socket, e))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .map_err(|e| crate::error::io_err(socket, e))?;
    Ok(serde_json::from_slice(&response)?)
}

/// Poll until the running cycle finishes or `ceiling` passes.
pub async fn wait_for_complete(
    paths: &WorkspacePaths,
    ceiling: Duration,
    poll: Duration,
) -> WaitOutcome {
    let deadline = Instant::now() + ceiling;
    loop {
        let Some(snapshot) = query_status(paths).await else {
            return WaitOutcome::NoDaemon;
        };
        if snapshot.is_complete {
            return WaitOutcome::Complete(snapshot);
        }
        if Instant::now() + poll > deadline {
            return WaitOutcome::TimedOut(snapshot);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Send SIGTERM to the registered daemon; `false` when none is alive.
pub fn stop_daemon(paths: &WorkspacePaths) -> bool {
    let Some(pid) = read_pid(paths.pid_file()).filter(|pid| process_exists(*pid)) else {
        return false;
    };
    // SAFETY: plain kill(2) on a pid we just confirmed exists.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}
