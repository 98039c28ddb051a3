use std::process::{Command, Stdio};

use crate::config::DaemonConfig;
use crate::error::DaemonError;

/// Run the checker once in the foreground, sharing our stdio.
///
/// Used when no daemon is reachable. Returns whether the checker exited cleanly.
pub fn direct_check(config: &DaemonConfig) -> Result<bool, DaemonError> {
    tracing::debug!(checker = %config.checker.to_string_lossy(), "running checker directly");
    let status = Command::new(&config.checker)
        .args(config.direct_args())
        .current_dir(&config.root)
        .stdin(Stdio::null())
        .status()
        .map_err(|source| DaemonError::Spawn {
            program: config.checker.to_string_lossy().into_owned(),
            source,
        })?;
    Ok(status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("fake-check");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    #[test]
    fn exit_status_decides_success() {
        let dir = TempDir::new().expect("dir");
        let mut config = DaemonConfig::new(dir.path());

        config.checker = script(&dir, "exit 0").into_os_string();
        assert!(direct_check(&config).expect("run"));

        config.checker = script(&dir, "exit 1").into_os_string();
        assert!(!direct_check(&config).expect("run"));
    }

    #[test]
    fn receives_machine_output_arguments() {
        let dir = TempDir::new().expect("dir");
        let mut config = DaemonConfig::new(dir.path());
        config.checker =
            script(&dir, r#"[ "$3" = "--output" ] && [ "$4" = "machine" ]"#).into_os_string();
        assert!(direct_check(&config).expect("run"));
    }

    #[test]
    fn missing_checker_is_a_spawn_error() {
        let dir = TempDir::new().expect("dir");
        let mut config = DaemonConfig::new(dir.path());
        config.checker = "checkd-definitely-not-a-real-binary".into();
        assert!(matches!(
            direct_check(&config),
            Err(DaemonError::Spawn { .. })
        ));
    }
}
