use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from watchdog.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WatchdogConfig {
    pub child: ChildConfig,
    pub heartbeat: HeartbeatConfig,
    pub timing: TimingConfig,
    pub windows: WindowConfig,
    pub sweep: SweepConfig,
    pub alert: AlertConfig,
    pub status: StatusConfig,
    pub log: LogConfig,
}

/// The automation process the supervisor starts and tears down.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChildConfig {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Marker file the automation process refreshes; only its mtime matters.
    pub path: PathBuf,
    /// Heartbeat older than this means the automation process is frozen.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_secs: u64,
    /// Tolerance for the automation process's slow browser-launch sequence.
    pub startup_grace_secs: u64,
    /// Pause after teardown so the OS can release profile locks.
    pub cooldown_secs: u64,
    /// Log a healthy-poll entry every Nth poll (0 disables).
    pub healthy_log_every: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// External command whose stdout lists visible window titles, one per line.
    pub list_command: Vec<String>,
    /// Title fragments identifying the automated (KPI) dashboard.
    pub kpi_fragments: Vec<String>,
    /// Title fragments identifying the manual-login (POD) dashboard.
    pub pod_fragments: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Executable name of stray browser processes to kill before each cycle
    /// (case-insensitive exact match). Empty disables the sweep.
    pub process_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct AlertConfig {
    /// Notifier command; `{reason}` in any argument is replaced with the
    /// failure description. Empty disables alerting.
    pub command: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub file: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for the rolling watchdog.log.
    pub dir: PathBuf,
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl WatchdogConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults, so the watchdog runs out of the box.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Full child command line: program followed by its arguments.
    pub fn child_command(&self) -> Vec<String> {
        let mut cmd = Vec::with_capacity(1 + self.child.args.len());
        cmd.push(self.child.command.clone());
        cmd.extend(self.child.args.iter().cloned());
        cmd
    }
}

// --- Default implementations ---

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            command: "python".to_string(),
            args: vec!["autologin.py".to_string()],
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("heartbeat.txt"),
            timeout_secs: 300,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            startup_grace_secs: 30,
            cooldown_secs: 5,
            healthy_log_every: 6,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            list_command: vec!["wmctrl".to_string(), "-l".to_string()],
            kpi_fragments: vec!["Dashboards".to_string()],
            pod_fragments: vec!["SAP POD".to_string()],
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            process_name: "msedge".to_string(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("watchdog.status"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}
