pub mod check;
pub mod start;
pub mod status;
pub mod stop;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use checkd_daemon::{DaemonConfig, WorkspacePaths};

/// Selects the workspace; all a verb needs when it only talks to the daemon.
#[derive(Args, Debug)]
pub struct RootArgs {
    /// Workspace root the daemon is bound to.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

impl RootArgs {
    pub fn canonical_root(&self) -> Result<PathBuf> {
        self.root
            .canonicalize()
            .with_context(|| format!("workspace root {} is not accessible", self.root.display()))
    }

    pub fn paths(&self) -> Result<WorkspacePaths> {
        Ok(WorkspacePaths::new(self.canonical_root()?))
    }
}

/// Options for verbs that may launch the checker.
#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    #[command(flatten)]
    pub root: RootArgs,

    /// Checker project config (passed through as `--tsconfig`).
    #[arg(long)]
    pub tsconfig: Option<PathBuf>,
}

impl WorkspaceArgs {
    pub fn config(&self) -> Result<DaemonConfig> {
        let root = self.root.canonical_root()?;
        Ok(DaemonConfig::from_env(root, self.tsconfig.clone()))
    }
}

/// Client-side calls are async; a throwaway current-thread runtime drives them.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(future))
}
