use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use checkd_daemon::stop_daemon;

use super::RootArgs;

#[derive(Args, Debug)]
pub struct StopArgs {
    #[command(flatten)]
    pub workspace: RootArgs,
}

impl StopArgs {
    pub fn run(self) -> Result<ExitCode> {
        let paths = self.workspace.paths()?;
        if stop_daemon(&paths) {
            println!("daemon stop requested");
            Ok(ExitCode::SUCCESS)
        } else {
            println!("daemon is not running");
            Ok(ExitCode::FAILURE)
        }
    }
}
