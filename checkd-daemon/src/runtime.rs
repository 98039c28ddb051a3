use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::DaemonConfig;
use crate::error::{io_err, DaemonError};
use crate::paths::WorkspacePaths;
use crate::protocol::read_pid;
use crate::server::{self, remove_socket};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::supervisor::{CheckerCommand, RestartReason, Supervisor};
use crate::watchers::{BigChangesWatcher, HeadWatcher, RouteWatcher};

type Task = (&'static str, JoinHandle<Result<(), DaemonError>>);

/// Cloneable trigger for a graceful shutdown, independent of OS signals.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

/// A started daemon: supervisor, watchers and status server all running.
pub struct Daemon {
    paths: WorkspacePaths,
    store: SnapshotStore,
    shutdown_tx: broadcast::Sender<()>,
    watchers: Vec<Task>,
    server: Option<Task>,
    supervisor: Option<Task>,
}

impl Daemon {
    /// Startup: claim artifacts, launch the checker, start watchers, bind the endpoint.
    pub async fn start(config: DaemonConfig) -> Result<Self, DaemonError> {
        let paths = config.paths();
        claim_artifacts(&paths)?;

        let store = SnapshotStore::new();
        let (shutdown_tx, _) = broadcast::channel::<()>(16);
        let (restart_tx, restart_rx) = mpsc::channel::<RestartReason>(16);

        let supervisor = {
            let supervisor = Supervisor::new(CheckerCommand::watch(&config), store.clone());
            let shutdown_rx = shutdown_tx.subscribe();
            spawn_task(&shutdown_tx, "supervisor", supervisor.run(restart_rx, shutdown_rx))
        };

        let mut daemon = Self {
            paths,
            store,
            shutdown_tx,
            watchers: Vec::new(),
            server: None,
            supervisor: Some(supervisor),
        };
        daemon.start_watchers(&config, &restart_tx);

        let socket = daemon.paths.socket().to_path_buf();
        let listener = match server::bind(&socket) {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, "daemon startup failed");
                daemon.shutdown_handle().shutdown();
                // The endpoint never belonged to us, so only the PID marker is released.
                daemon.join_all().await;
                release_pid(&daemon.paths);
                return Err(err);
            }
        };
        let shutdown_rx = daemon.shutdown_tx.subscribe();
        daemon.server = Some(spawn_task(
            &daemon.shutdown_tx,
            "status_server",
            server::serve(listener, socket, daemon.store.clone(), shutdown_rx),
        ));

        tracing::info!(root = %config.root.display(), pid = std::process::id(), "daemon started");
        Ok(daemon)
    }

    fn start_watchers(&mut self, config: &DaemonConfig, restart_tx: &mpsc::Sender<RestartReason>) {
        match RouteWatcher::start(config) {
            Ok(watcher) => {
                let rx = self.shutdown_tx.subscribe();
                self.watchers
                    .push(spawn_task(&self.shutdown_tx, "route_watcher", watcher.run(rx)));
            }
            Err(err) => tracing::warn!(error = %err, "route watcher failed to start"),
        }

        match HeadWatcher::start(&config.root, restart_tx.clone()) {
            Ok(Some(watcher)) => {
                let rx = self.shutdown_tx.subscribe();
                self.watchers
                    .push(spawn_task(&self.shutdown_tx, "head_watcher", watcher.run(rx)));
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "head watcher failed to start"),
        }

        if let Some(dir) = &config.big_changes_dir {
            match BigChangesWatcher::start(dir, restart_tx.clone()) {
                Ok(watcher) => {
                    let rx = self.shutdown_tx.subscribe();
                    self.watchers
                        .push(spawn_task(&self.shutdown_tx, "big_changes_watcher", watcher.run(rx)));
                }
                Err(err) => tracing::warn!(
                    dir = %dir.display(),
                    error = %err,
                    "big-changes watcher failed to start",
                ),
            }
        }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.current()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Wait for shutdown, tear components down in order, then release the artifacts.
    pub async fn wait(mut self) -> Result<(), DaemonError> {
        let results = self.join_all().await;
        remove_socket(self.paths.socket());
        release_pid(&self.paths);
        tracing::info!("daemon stopped");

        for (task, result) in results {
            handle_join(task, result)?;
        }
        Ok(())
    }

    /// Watchers first, then the server, then the checker.
    async fn join_all(&mut self) -> Vec<(&'static str, Result<Result<(), DaemonError>, tokio::task::JoinError>)> {
        let mut tasks: Vec<Task> = std::mem::take(&mut self.watchers);
        tasks.extend(self.server.take());
        tasks.extend(self.supervisor.take());

        let mut results = Vec::with_capacity(tasks.len());
        for (name, handle) in tasks {
            results.push((name, handle.await));
        }
        results
    }
}

/// Run the daemon until SIGINT/SIGTERM.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let daemon = Daemon::start(config).await?;
    let shutdown = daemon.shutdown_handle();
    let mut shutdown_rx = daemon.shutdown_tx.subscribe();

    let signals = tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(err), _) | (_, Err(err)) => {
                tracing::error!(error = %err, "failed to install signal handlers");
                return;
            }
        };
        tokio::select! {
            _ = shutdown_rx.recv() => {}
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down daemon");
                shutdown.shutdown();
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down daemon");
                shutdown.shutdown();
            }
        }
    });

    let result = daemon.wait().await;
    signals.abort();
    result
}

/// Run the daemon on a single-threaded runtime and block until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

fn spawn_task<F>(shutdown_tx: &broadcast::Sender<()>, name: &'static str, task: F) -> Task
where
    F: std::future::Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    let shutdown = shutdown_tx.clone();
    let handle = tokio::spawn(async move {
        let result = task.await;
        if let Err(err) = &result {
            tracing::error!(task = name, error = %err, "daemon task failed");
        }
        let _ = shutdown.send(());
        result
    });
    (name, handle)
}

/// Clear what a previous instance left behind and register this process.
fn claim_artifacts(paths: &WorkspacePaths) -> Result<(), DaemonError> {
    let cache = paths.cache_dir();
    fs::create_dir_all(cache).map_err(|e| io_err(cache, e))?;

    prepare_socket_for_bind(paths.socket())?;
    if let Err(err) = fs::remove_file(paths.pid_file()) {
        if err.kind() != ErrorKind::NotFound {
            tracing::debug!(error = %err, "could not remove stale pid marker");
        }
    }

    let pid_file = paths.pid_file();
    fs::write(pid_file, std::process::id().to_string()).map_err(|e| io_err(pid_file, e))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::AlreadyRunning {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }
    remove_socket(socket);
    Ok(())
}

/// Remove the PID marker unless another instance has since claimed it.
fn release_pid(paths: &WorkspacePaths) {
    let pid_file = paths.pid_file();
    match read_pid(pid_file) {
        Some(pid) if pid != std::process::id() as i32 => {
            tracing::debug!(pid, "pid marker belongs to another daemon; leaving it");
        }
        _ => {
            let _ = fs::remove_file(pid_file);
        }
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}
