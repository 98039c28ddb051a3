//! checkd: near-instant type-check status from a long-running watch-mode checker.
//!
//! # Usage
//!
//! ```text
//! checkd start  [--root <dir>] [--tsconfig <file>]
//! checkd check  [--root <dir>] [--tsconfig <file>]
//! checkd stop   [--root <dir>]
//! checkd status [--root <dir>] [--json]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, start::StartArgs, status::StatusArgs, stop::StopArgs};

#[derive(Parser, Debug)]
#[command(
    name = "checkd",
    version,
    about = "Keep a type checker warm and ask it for results instantly",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon in the foreground for a workspace.
    Start(StartArgs),

    /// Report the latest check result, waiting for a running check to finish.
    Check(CheckArgs),

    /// Signal the workspace daemon to shut down.
    Stop(StopArgs),

    /// Print a short summary of the daemon's state.
    Status(StatusArgs),
}

fn main() -> ExitCode {
    checkd_daemon::init_tracing(checkd_daemon::config::verbose(), checkd_daemon::config::json_logs());

    let cli = Cli::parse();
    let result: Result<ExitCode> = match cli.command {
        Commands::Start(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Stop(args) => args.run(),
        Commands::Status(args) => args.run(),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
