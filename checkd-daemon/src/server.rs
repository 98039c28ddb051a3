//! Local socket server exposing the current snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use crate::error::{io_err, DaemonError};
use crate::protocol::STATUS_QUERY;
use crate::snapshot::SnapshotStore;

/// Bind the workspace endpoint; any failure here aborts startup.
pub fn bind(socket: &Path) -> Result<UnixListener, DaemonError> {
    let listener = UnixListener::bind(socket).map_err(|source| DaemonError::Bind {
        socket: socket.to_path_buf(),
        source,
    })?;
    set_socket_permissions(socket)?;
    tracing::info!(socket = %socket.display(), "status server listening");
    Ok(listener)
}

pub async fn serve(
    listener: UnixListener,
    socket: PathBuf,
    store: SnapshotStore,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let store = store.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, store).await {
                        tracing::debug!(error = %err, "status client error");
                    }
                });
            }
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Request {
    Status,
    Unknown,
    Closed,
}

/// Read until the bytes either spell the query token or can no longer become it.
async fn read_request(stream: &mut UnixStream) -> std::io::Result<Request> {
    let token = STATUS_QUERY.as_bytes();
    let mut received = Vec::with_capacity(token.len());
    let mut buf = [0u8; 64];
    loop {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            return Ok(Request::Closed);
        }
        received.extend_from_slice(&buf[..read]);
        if received == token {
            return Ok(Request::Status);
        }
        if !token.starts_with(&received) {
            return Ok(Request::Unknown);
        }
    }
}

async fn handle_client(mut stream: UnixStream, store: SnapshotStore) -> Result<(), DaemonError> {
    match read_request(&mut stream)
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        Request::Status => {
            let payload = serde_json::to_vec(&store.current())?;
            stream
                .write_all(&payload)
                .await
                .map_err(|e| io_err("daemon socket write", e))?;
            stream
                .shutdown()
                .await
                .map_err(|e| io_err("daemon socket shutdown", e))?;
        }
        Request::Unknown => {
            // No reply; the client decides when to hang up.
            let mut sink = [0u8; 256];
            while stream.read(&mut sink).await.map_err(|e| io_err("daemon socket read", e))? > 0 {}
        }
        Request::Closed => {}
    }
    Ok(())
}

pub(crate) fn remove_socket(socket: &Path) {
    match fs::remove_file(socket) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::debug!(socket = %socket.display(), error = %err, "could not remove socket"),
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
