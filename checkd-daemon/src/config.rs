//! Daemon configuration assembled from CLI arguments and environment toggles.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::paths::WorkspacePaths;

pub const ENV_DISABLE: &str = "CHECKD_DISABLE";
pub const ENV_BIG_CHANGES_DIR: &str = "CHECKD_BIG_CHANGES_DIR";
pub const ENV_VERBOSE: &str = "CHECKD_VERBOSE";
pub const ENV_CHECKER: &str = "CHECKD_CHECKER";
pub const ENV_SYNC: &str = "CHECKD_SYNC";
pub const ENV_LOG_FORMAT: &str = "CHECKD_LOG_FORMAT";

const DEFAULT_CHECKER: &str = "svelte-check";
const DEFAULT_SYNC_TOOL: &str = "svelte-kit";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub root: PathBuf,
    pub tsconfig: Option<PathBuf>,
    pub big_changes_dir: Option<PathBuf>,
    pub checker: OsString,
    pub sync_tool: OsString,
}

impl DaemonConfig {
    /// Defaults for `root` with no environment overrides applied.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let checker = local_bin(&root, DEFAULT_CHECKER);
        let sync_tool = local_bin(&root, DEFAULT_SYNC_TOOL);
        Self {
            root,
            tsconfig: None,
            big_changes_dir: None,
            checker,
            sync_tool,
        }
    }

    pub fn from_env(root: impl Into<PathBuf>, tsconfig: Option<PathBuf>) -> Self {
        let mut config = Self::new(root);
        config.tsconfig = tsconfig;
        if let Some(dir) = env_non_empty(ENV_BIG_CHANGES_DIR) {
            config.big_changes_dir = Some(config.root.join(dir));
        }
        if let Some(checker) = env_non_empty(ENV_CHECKER) {
            config.checker = checker;
        }
        if let Some(sync_tool) = env_non_empty(ENV_SYNC) {
            config.sync_tool = sync_tool;
        }
        config
    }

    pub fn paths(&self) -> WorkspacePaths {
        WorkspacePaths::new(&self.root)
    }

    /// Arguments for the long-lived watch-mode checker.
    pub fn watch_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--watch".into(), "--workspace".into()];
        args.push(self.root.clone().into_os_string());
        self.push_tsconfig(&mut args);
        args
    }

    /// Arguments for a one-shot, machine-readable check run.
    pub fn direct_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--workspace".into()];
        args.push(self.root.clone().into_os_string());
        args.extend(["--output".into(), "machine".into()]);
        self.push_tsconfig(&mut args);
        args
    }

    pub fn sync_args(&self) -> Vec<OsString> {
        vec!["sync".into()]
    }

    fn push_tsconfig(&self, args: &mut Vec<OsString>) {
        if let Some(tsconfig) = &self.tsconfig {
            args.push("--tsconfig".into());
            args.push(tsconfig.clone().into_os_string());
        }
    }
}

/// `CHECKD_DISABLE`: skip the daemon and always run the checker directly.
pub fn daemon_disabled() -> bool {
    env_flag(ENV_DISABLE)
}

pub fn verbose() -> bool {
    env_flag(ENV_VERBOSE)
}

pub fn json_logs() -> bool {
    std::env::var(ENV_LOG_FORMAT)
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_non_empty(name: &str) -> Option<OsString> {
    std::env::var_os(name).filter(|value| !value.is_empty())
}

fn local_bin(root: &Path, name: &str) -> OsString {
    let candidate = root.join("node_modules").join(".bin").join(name);
    if candidate.is_file() {
        candidate.into_os_string()
    } else {
        OsString::from(name)
    }
}
