use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};

pub const CACHE_DIR: &str = "node_modules/.cache/checkd";
pub const DAEMON_PID: &str = "daemon.pid";
pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Longest socket path we hand to `bind`; `sun_path` is 104 bytes on macOS, 108 on Linux.
pub const MAX_SOCKET_PATH: usize = 100;

pub const ROUTE_DEBOUNCE: Duration = Duration::from_millis(250);
pub const EVENT_SETTLE_WINDOW: Duration = Duration::from_millis(100);
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const CHECK_WAIT_CEILING: Duration = Duration::from_secs(120);
pub const CHECK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Filesystem artifacts owned by the daemon serving one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
    cache_dir: PathBuf,
    pid_file: PathBuf,
    socket: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let cache_dir = cache_dir(&root);
        let pid_file = cache_dir.join(DAEMON_PID);
        let socket = socket_path(&root);
        Self {
            root,
            cache_dir,
            pid_file,
            socket,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Endpoint for the daemon serving `root`.
///
/// Lives next to the PID marker unless that path is too long for a Unix
/// socket, in which case a per-workspace name under the temp dir is used.
pub fn socket_path(root: &Path) -> PathBuf {
    let in_cache = cache_dir(root).join(DAEMON_SOCKET);
    if in_cache.as_os_str().len() <= MAX_SOCKET_PATH {
        return in_cache;
    }
    std::env::temp_dir().join(format!("checkd-{}.sock", workspace_hash(root)))
}

fn workspace_hash(root: &Path) -> String {
    let digest = Sha256::digest(root.as_os_str().as_encoded_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
