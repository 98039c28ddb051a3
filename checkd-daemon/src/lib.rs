//! checkd daemon: keeps a watch-mode type checker running and serves its latest result.
//!
//! ```text
//! watchers ──restart──▶ supervisor ──output──▶ parser ──▶ snapshot store ──▶ socket server ──▶ client
//! ```

pub mod config;
mod direct;
mod error;
pub mod logging;
pub mod parser;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod server;
pub mod snapshot;
pub mod supervisor;
pub mod watchers;

pub use config::DaemonConfig;
pub use direct::direct_check;
pub use error::DaemonError;
pub use logging::init_tracing;
pub use paths::WorkspacePaths;
pub use protocol::{
    is_alive, query_status, query_status_with_timeout, stop_daemon, wait_for_complete, WaitOutcome,
    STATUS_QUERY,
};
pub use runtime::{run, start_blocking, Daemon, ShutdownHandle};
pub use snapshot::{Snapshot, SnapshotStore};
