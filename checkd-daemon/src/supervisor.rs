//! Supervision of the long-lived watch-mode checker process.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::parser::{OutputParser, OutputSource, ParseEvent};
use crate::snapshot::SnapshotStore;

const READ_BUFFER_BYTES: usize = 8 * 1024;

/// Why a restart was requested; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    HeadChanged,
    FilesDeleted,
}

#[derive(Debug)]
struct OutputChunk {
    generation: u64,
    source: OutputSource,
    bytes: Vec<u8>,
}

/// How to launch the checker; split out of [`DaemonConfig`] so tests can run any program.
#[derive(Debug, Clone)]
pub struct CheckerCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl CheckerCommand {
    pub fn watch(config: &DaemonConfig) -> Self {
        Self {
            program: config.checker.clone(),
            args: config.watch_args(),
            cwd: config.root.clone(),
        }
    }
}

pub struct Supervisor {
    command: CheckerCommand,
    store: SnapshotStore,
    parser: OutputParser,
    child: Option<Child>,
    generation: u64,
    chunk_tx: mpsc::UnboundedSender<OutputChunk>,
    chunk_rx: mpsc::UnboundedReceiver<OutputChunk>,
}

impl Supervisor {
    pub fn new(command: CheckerCommand, store: SnapshotStore) -> Self {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        Self {
            command,
            store,
            parser: OutputParser::new(),
            child: None,
            generation: 0,
            chunk_tx,
            chunk_rx,
        }
    }

    /// Launch the checker. A spawn failure leaves the supervisor idle until the next restart.
    pub fn start(&mut self) {
        self.generation += 1;
        match self.spawn_child() {
            Ok(child) => {
                tracing::info!(
                    pid = child.id().unwrap_or_default(),
                    generation = self.generation,
                    "checker started",
                );
                self.child = Some(child);
            }
            Err(err) => {
                tracing::error!(error = %err, "checker failed to start");
                self.child = None;
            }
        }
    }

    /// Kill the running checker, forget its partial output, and start a fresh one.
    pub async fn restart(&mut self, reason: RestartReason) {
        tracing::info!(?reason, "restarting checker");
        self.stop().await;
        self.parser.reset();
        self.store.reset();
        self.start();
    }

    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(err) = child.kill().await {
            tracing::warn!(error = %err, "failed to kill checker");
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Drive the supervisor until shutdown, reacting to output, exits and restart requests.
    pub async fn run(
        mut self,
        mut restart_rx: mpsc::Receiver<RestartReason>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        self.start();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                // No watcher may be holding a sender; a closed queue just means no restarts.
                Some(reason) = restart_rx.recv() => self.restart(reason).await,
                Some(chunk) = self.chunk_rx.recv() => self.handle_chunk(chunk),
                status = wait_for_exit(&mut self.child) => {
                    self.child = None;
                    match status {
                        Ok(status) => tracing::warn!(%status, "checker exited; waiting for a restart trigger"),
                        Err(err) => tracing::warn!(error = %err, "failed to wait on checker"),
                    }
                }
            }
        }

        self.stop().await;
        Ok(())
    }

    fn handle_chunk(&mut self, chunk: OutputChunk) {
        if chunk.generation != self.generation {
            tracing::trace!(generation = chunk.generation, "dropping output from a previous checker");
            return;
        }
        for event in self.parser.push_chunk(chunk.source, &chunk.bytes) {
            match event {
                ParseEvent::CycleStarted => {
                    tracing::debug!("check cycle started");
                    self.store.mark_started();
                }
                ParseEvent::CycleFinished(report) => {
                    tracing::info!(
                        errors = report.errors,
                        warnings = report.warnings,
                        "check cycle finished",
                    );
                    self.store.commit(&report);
                }
            }
        }
    }

    fn spawn_child(&self) -> Result<Child, DaemonError> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(&self.command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DaemonError::Spawn {
                program: self.command.program.to_string_lossy().into_owned(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, OutputSource::Stdout, self.generation, self.chunk_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, OutputSource::Stderr, self.generation, self.chunk_tx.clone());
        }
        Ok(child)
    }
}

fn forward_output<R>(
    mut reader: R,
    source: OutputSource,
    generation: u64,
    chunk_tx: mpsc::UnboundedSender<OutputChunk>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_BYTES];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(read) => {
                    let chunk = OutputChunk {
                        generation,
                        source,
                        bytes: buf[..read].to_vec(),
                    };
                    if chunk_tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, ?source, "checker output closed");
                    break;
                }
            }
        }
    });
}

async fn wait_for_exit(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}
