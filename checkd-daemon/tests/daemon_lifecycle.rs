use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use checkd_daemon::{
    is_alive, query_status, wait_for_complete, Daemon, DaemonConfig, DaemonError, WaitOutcome,
};
use tempfile::TempDir;

/// Fake watch-mode checker: counts its runs and reports `errors` each time.
fn fake_checker(dir: &Path, errors: u32) -> PathBuf {
    let counter = dir.join("runs");
    let script = dir.join("fake-svelte-check");
    let body = format!(
        r#"#!/bin/sh
runs=$(cat '{counter}' 2>/dev/null || echo 0)
runs=$((runs + 1))
echo "$runs" > '{counter}'
echo "===================================="
echo "Loading svelte-check in workspace: $PWD"
echo "Getting Svelte diagnostics..."
echo "run $runs"
echo "===================================="
echo "svelte-check found {errors} errors and 0 warnings"
echo "Watching for file changes..."
exec sleep 600
"#,
        counter = counter.display(),
    );
    fs::write(&script, body).expect("write fake checker");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
    script
}

fn config_for(workspace: &TempDir, tools: &TempDir, errors: u32) -> DaemonConfig {
    let mut config = DaemonConfig::new(workspace.path());
    config.checker = fake_checker(tools.path(), errors).into_os_string();
    config.sync_tool = "true".into();
    config
}

async fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

#[tokio::test]
async fn serves_completed_snapshot_and_cleans_up_on_shutdown() {
    let workspace = TempDir::new().expect("workspace");
    let tools = TempDir::new().expect("tools");
    let daemon = Daemon::start(config_for(&workspace, &tools, 0))
        .await
        .expect("daemon start");
    let paths = daemon.paths().clone();

    assert!(paths.pid_file().exists());
    assert!(paths.socket().exists());
    assert!(is_alive(&paths));

    let outcome = wait_for_complete(&paths, Duration::from_secs(10), Duration::from_millis(50)).await;
    let snapshot = match outcome {
        WaitOutcome::Complete(snapshot) => snapshot,
        other => panic!("expected a completed snapshot, got {other:?}"),
    };
    assert!(!snapshot.has_errors);
    assert!(!snapshot.has_warnings);
    assert!(snapshot.output.contains("run 1"));
    assert!(!snapshot.output.contains("Watching for file changes"));

    daemon.shutdown_handle().shutdown();
    daemon.wait().await.expect("clean shutdown");

    assert!(!paths.pid_file().exists());
    assert!(!paths.socket().exists());
    assert_eq!(query_status(&paths).await, None);
}

#[tokio::test]
async fn errors_are_reported_in_flags() {
    let workspace = TempDir::new().expect("workspace");
    let tools = TempDir::new().expect("tools");
    let daemon = Daemon::start(config_for(&workspace, &tools, 2))
        .await
        .expect("daemon start");

    let outcome = wait_for_complete(
        daemon.paths(),
        Duration::from_secs(10),
        Duration::from_millis(50),
    )
    .await;
    let snapshot = match outcome {
        WaitOutcome::Complete(snapshot) => snapshot,
        other => panic!("expected a completed snapshot, got {other:?}"),
    };
    assert!(snapshot.has_errors);
    assert!(!snapshot.has_warnings);

    daemon.shutdown_handle().shutdown();
    daemon.wait().await.expect("clean shutdown");
}

#[tokio::test]
async fn head_change_restarts_the_checker() {
    let workspace = TempDir::new().expect("workspace");
    let tools = TempDir::new().expect("tools");
    let git_dir = workspace.path().join(".git");
    fs::create_dir_all(&git_dir).expect("mkdir .git");
    fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").expect("write HEAD");

    let daemon = Daemon::start(config_for(&workspace, &tools, 0))
        .await
        .expect("daemon start");
    let store = daemon.store().clone();
    assert!(
        wait_for(Duration::from_secs(10), || store.current().output.contains("run 1")).await,
        "first cycle never completed"
    );

    fs::write(git_dir.join("HEAD"), "ref: refs/heads/feature\n").expect("rewrite HEAD");

    assert!(
        wait_for(Duration::from_secs(10), || {
            let snapshot = store.current();
            snapshot.is_complete && snapshot.output.contains("run 2")
        })
        .await,
        "checker was not restarted after HEAD moved"
    );
    assert!(!store.current().output.contains("run 1"));

    daemon.shutdown_handle().shutdown();
    daemon.wait().await.expect("clean shutdown");
}

#[tokio::test]
async fn bind_failure_aborts_startup_and_releases_pid() {
    let workspace = TempDir::new().expect("workspace");
    let tools = TempDir::new().expect("tools");
    let config = config_for(&workspace, &tools, 0);
    let paths = config.paths();

    // A directory squatting on the endpoint path cannot be removed as a stale socket.
    fs::create_dir_all(paths.socket().join("occupied")).expect("squat endpoint");

    let err = match Daemon::start(config).await {
        Ok(_) => panic!("startup should fail when the endpoint cannot be bound"),
        Err(err) => err,
    };
    assert!(matches!(err, DaemonError::Bind { .. }), "unexpected error: {err}");
    assert!(!paths.pid_file().exists());
}

#[tokio::test]
async fn second_daemon_for_the_same_workspace_is_refused() {
    let workspace = TempDir::new().expect("workspace");
    let tools = TempDir::new().expect("tools");
    let config = config_for(&workspace, &tools, 0);
    let first = Daemon::start(config.clone()).await.expect("first daemon");

    let second = Daemon::start(config).await;
    assert!(matches!(second, Err(DaemonError::AlreadyRunning { .. })));
    assert!(first.paths().socket().exists(), "first daemon keeps its endpoint");

    first.shutdown_handle().shutdown();
    first.wait().await.expect("clean shutdown");
}
