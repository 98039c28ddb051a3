//! `checkd status`: one-glance view of the workspace daemon.

use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use checkd_daemon::{is_alive, query_status, Snapshot};

use super::{block_on, RootArgs};

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub workspace: RootArgs,

    /// Emit the raw snapshot as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<ExitCode> {
        let paths = self.workspace.paths()?;
        let Some(snapshot) = block_on(query_status(&paths))? else {
            let note = if is_alive(&paths) {
                "daemon process is alive but not answering"
            } else {
                "daemon is not running"
            };
            println!("{}", note.red());
            return Ok(ExitCode::FAILURE);
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&snapshot).context("failed to render snapshot JSON")?
            );
        } else {
            print_summary(&snapshot);
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(snapshot: &Snapshot) {
    let state = if snapshot.is_complete {
        "idle".green()
    } else {
        "checking".yellow()
    };
    println!("daemon:   {} ({state})", "running".green());
    println!("errors:   {}", flag(snapshot.has_errors, "red"));
    println!("warnings: {}", flag(snapshot.has_warnings, "yellow"));
    println!(
        "updated:  {}",
        format_age(now_millis().saturating_sub(snapshot.last_update))
    );
}

fn flag(set: bool, colour: &str) -> colored::ColoredString {
    if set {
        "yes".color(colour)
    } else {
        "no".green()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

fn format_age(elapsed_ms: u64) -> String {
    let secs = elapsed_ms / 1000;
    match secs {
        0 => "just now".to_string(),
        1..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}
