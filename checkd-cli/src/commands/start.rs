//! `checkd start`: run the daemon in the foreground.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use super::WorkspaceArgs;

#[derive(Args, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

impl StartArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = self.workspace.config()?;
        checkd_daemon::start_blocking(config).context("daemon exited with error")?;
        Ok(ExitCode::SUCCESS)
    }
}
