/// Status file: writes `watchdog.status` as JSON on every state transition,
/// so an operator can see at a glance what the supervisor is doing.
///
/// Uses atomic write pattern: write to temp file then rename.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Supervisor states written to the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Starting,
    Monitoring,
    Failing,
    Cooldown,
    ShuttingDown,
}

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    /// Supervisor pid.
    pub pid: u32,
    pub state: SupervisorState,
    /// 1-based supervision cycle number.
    pub cycle: u64,
    /// Pid of the supervised automation process, when one is running.
    pub child_pid: Option<u32>,
    /// Total restarts performed since the supervisor started.
    pub restarts: u64,
    /// Description of the failure that ended the previous cycle.
    pub last_failure: Option<String>,
    pub last_update: DateTime<Utc>,
}

/// Errors that can occur while writing the status file.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => {
                write!(f, "failed to serialize status: {source}")
            }
            StatusError::Write { path, source } => {
                write!(f, "failed to write status to {}: {}", path.display(), source)
            }
            StatusError::Rename { from, to, source } => write!(
                f,
                "failed to rename {} to {}: {}",
                from.display(),
                to.display(),
                source
            ),
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
        }
    }
}

/// Manages the status file lifecycle.
#[derive(Debug)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically write status data.
    ///
    /// Writes to a temporary file in the same directory, then renames, so
    /// readers never see a partial write.
    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StatusError::Serialize { source: e })?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".watchdog.status.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    /// Remove the status file (on clean shutdown).
    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(state: SupervisorState) -> StatusData {
        StatusData {
            pid: std::process::id(),
            state,
            cycle: 3,
            child_pid: Some(4242),
            restarts: 2,
            last_failure: Some("freeze/no heartbeat".to_string()),
            last_update: Utc::now(),
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.status");
        let status = StatusFile::new(path.clone());

        status.write(&sample(SupervisorState::Monitoring)).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["state"], "monitoring");
        assert_eq!(parsed["cycle"], 3);
        assert_eq!(parsed["child_pid"], 4242);
        assert_eq!(parsed["last_failure"], "freeze/no heartbeat");
    }

    #[test]
    fn test_write_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.status");
        let status = StatusFile::new(path.clone());

        status.write(&sample(SupervisorState::Starting)).unwrap();
        status.write(&sample(SupervisorState::Failing)).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["state"], "failing");
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let status = StatusFile::new(dir.path().join("watchdog.status"));
        status.write(&sample(SupervisorState::Cooldown)).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.status");
        let status = StatusFile::new(path.clone());

        status.write(&sample(SupervisorState::Monitoring)).unwrap();
        status.remove();
        assert!(!path.exists());
        status.remove(); // no-op
    }

    #[test]
    fn test_write_to_missing_directory_errors() {
        let status = StatusFile::new(PathBuf::from("/nonexistent-dir/impossible/status"));
        let err = status.write(&sample(SupervisorState::Starting)).unwrap_err();
        assert!(matches!(err, StatusError::Write { .. }));
    }
}
