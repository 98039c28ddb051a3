//! Restarts the checker whenever the repository's HEAD moves.

use std::fs;
use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use tokio::sync::{broadcast, mpsc};

use crate::error::DaemonError;
use crate::paths::EVENT_SETTLE_WINDOW;
use crate::supervisor::RestartReason;

use super::{next_batch, watch_path, EventRx};

/// Locate the HEAD file of the repository enclosing `start`, if any.
pub fn find_head_file(start: &Path) -> Option<PathBuf> {
    let dot_git = start.ancestors().map(|dir| dir.join(".git")).find(|p| p.exists())?;
    if dot_git.is_dir() {
        return Some(dot_git.join("HEAD"));
    }

    // Worktrees and submodules: `.git` is a file pointing at the real git dir.
    let contents = fs::read_to_string(&dot_git).ok()?;
    let gitdir = contents
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))
        .map(str::trim)?;
    let gitdir = Path::new(gitdir);
    let gitdir = if gitdir.is_absolute() {
        gitdir.to_path_buf()
    } else {
        dot_git.parent()?.join(gitdir)
    };
    Some(gitdir.join("HEAD"))
}

pub struct HeadWatcher {
    _watcher: RecommendedWatcher,
    events: EventRx,
    head: PathBuf,
    restart_tx: mpsc::Sender<RestartReason>,
}

impl HeadWatcher {
    /// `Ok(None)` when the workspace is not inside a git repository.
    pub fn start(
        root: &Path,
        restart_tx: mpsc::Sender<RestartReason>,
    ) -> Result<Option<Self>, DaemonError> {
        let Some(head) = find_head_file(root) else {
            tracing::debug!(root = %root.display(), "not inside a git repository; head watcher disabled");
            return Ok(None);
        };
        // git swaps HEAD in by renaming HEAD.lock, so watch the directory rather than the inode.
        let Some(git_dir) = head.parent() else {
            return Ok(None);
        };
        let (watcher, events) = watch_path(git_dir, RecursiveMode::NonRecursive)?;
        tracing::info!(head = %head.display(), "head watcher started");
        Ok(Some(Self {
            _watcher: watcher,
            events,
            head,
            restart_tx,
        }))
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                batch = next_batch(&mut self.events, EVENT_SETTLE_WINDOW) => {
                    let Some(batch) = batch else { break };
                    let head_changed = batch.iter().any(|event| {
                        !matches!(event.kind, EventKind::Access(_))
                            && event.paths.iter().any(|path| is_head(path, &self.head))
                    });
                    if head_changed {
                        tracing::info!("git HEAD changed");
                        self.restart_tx
                            .send(RestartReason::HeadChanged)
                            .await
                            .map_err(|_| DaemonError::ChannelClosed("restart queue"))?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_head(path: &Path, head: &Path) -> bool {
    path == head || path.file_name() == head.file_name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_head_from_nested_directory() {
        let repo = TempDir::new().expect("repo");
        fs::create_dir_all(repo.path().join(".git")).expect("mkdir .git");
        let nested = repo.path().join("apps/web");
        fs::create_dir_all(&nested).expect("mkdir nested");

        assert_eq!(
            find_head_file(&nested),
            Some(repo.path().join(".git").join("HEAD"))
        );
    }

    #[test]
    fn follows_gitdir_file_for_worktrees() {
        let repo = TempDir::new().expect("repo");
        let worktree = repo.path().join("wt");
        fs::create_dir_all(&worktree).expect("mkdir worktree");
        fs::write(worktree.join(".git"), "gitdir: ../main/.git/worktrees/wt\n").expect("write .git");

        assert_eq!(
            find_head_file(&worktree),
            Some(worktree.join("../main/.git/worktrees/wt").join("HEAD"))
        );
    }

    #[test]
    fn outside_a_repository_there_is_no_head() {
        let dir = TempDir::new().expect("dir");
        let head = find_head_file(dir.path());
        // The temp dir may itself live inside a checkout; only assert when it does not.
        if dir.path().ancestors().all(|a| !a.join(".git").exists()) {
            assert_eq!(head, None);
        }
    }

    #[tokio::test]
    async fn head_rewrite_requests_one_restart() {
        let repo = TempDir::new().expect("repo");
        let git_dir = repo.path().join(".git");
        fs::create_dir_all(&git_dir).expect("mkdir .git");
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").expect("write HEAD");

        let (restart_tx, mut restart_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let watcher = HeadWatcher::start(repo.path(), restart_tx)
            .expect("start watcher")
            .expect("inside repository");
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        // Same dance as `git checkout`: write the lock file, rename it over HEAD.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        fs::write(git_dir.join("HEAD.lock"), "ref: refs/heads/feature\n").expect("write lock");
        fs::rename(git_dir.join("HEAD.lock"), git_dir.join("HEAD")).expect("rename lock");

        let reason = tokio::time::timeout(std::time::Duration::from_secs(5), restart_rx.recv())
            .await
            .expect("restart not requested in time");
        assert_eq!(reason, Some(RestartReason::HeadChanged));

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(restart_rx.try_recv().is_err(), "one checkout should restart once");

        shutdown_tx.send(()).expect("shutdown");
        handle.await.expect("join").expect("watcher result");
    }
}
