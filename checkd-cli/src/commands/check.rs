//! `checkd check`: the daemon's answer when one is running, a direct run otherwise.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use checkd_daemon::config::daemon_disabled;
use checkd_daemon::paths::{CHECK_POLL_INTERVAL, CHECK_WAIT_CEILING};
use checkd_daemon::{direct_check, wait_for_complete, DaemonConfig, WaitOutcome};

use super::{block_on, WorkspaceArgs};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

impl CheckArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = self.workspace.config()?;
        if daemon_disabled() {
            return run_direct(&config);
        }

        let paths = config.paths();
        let outcome = block_on(wait_for_complete(
            &paths,
            CHECK_WAIT_CEILING,
            CHECK_POLL_INTERVAL,
        ))?;

        match outcome {
            WaitOutcome::Complete(snapshot) => {
                if !snapshot.output.is_empty() {
                    println!("{}", snapshot.output);
                }
                Ok(exit_code(!snapshot.has_errors))
            }
            WaitOutcome::TimedOut(_) => {
                eprintln!(
                    "timed out after {}s waiting for the running check to finish",
                    CHECK_WAIT_CEILING.as_secs()
                );
                Ok(ExitCode::FAILURE)
            }
            WaitOutcome::NoDaemon => {
                tracing::debug!(root = %config.root.display(), "no daemon reachable; checking directly");
                run_direct(&config)
            }
        }
    }
}

fn run_direct(config: &DaemonConfig) -> Result<ExitCode> {
    let passed = direct_check(config).context("failed to run the checker directly")?;
    Ok(exit_code(passed))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
