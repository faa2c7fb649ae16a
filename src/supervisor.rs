/// Supervisor loop: the process-lifecycle state machine.
///
/// STARTING -> MONITORING -> FAILING -> (cooldown) -> STARTING, with no
/// terminal state short of a shutdown signal. Every anomaly is fatal to the
/// current cycle: the policy is full stack restart, trading restart cost for
/// operational simplicity on a kiosk that tolerates brief reconnection gaps.
use crate::alert;
use crate::config::WatchdogConfig;
use crate::heartbeat::HealthSignal;
use crate::process::{self, SupervisedProcess};
use crate::signals::ShutdownHandle;
use crate::status::{StatusData, StatusFile, SupervisorState};
use crate::windows::{self, WindowProbe};
use chrono::Utc;
use std::time::Duration;

/// Why a supervision cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The automation process terminated on its own.
    UnexpectedExit,
    /// The heartbeat is missing, unreadable, or older than the timeout.
    HeartbeatStale,
    /// An expected dashboard window is no longer on screen.
    WindowMissing,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::UnexpectedExit => write!(f, "unexpected exit"),
            FailureReason::HeartbeatStale => write!(f, "freeze/no heartbeat"),
            FailureReason::WindowMissing => write!(f, "window closed"),
        }
    }
}

/// Classify one monitoring poll. Order is significant: once the process has
/// exited, heartbeat and window checks are meaningless, and a stale heartbeat
/// outranks a missing window. First failing check wins.
pub fn classify(
    exited: bool,
    heartbeat_stale: bool,
    windows_present: bool,
) -> Option<FailureReason> {
    if exited {
        Some(FailureReason::UnexpectedExit)
    } else if heartbeat_stale {
        Some(FailureReason::HeartbeatStale)
    } else if !windows_present {
        Some(FailureReason::WindowMissing)
    } else {
        None
    }
}

/// All loop timings, resolved to durations so tests can run at millisecond
/// scale while production config stays in whole seconds.
#[derive(Debug, Clone)]
pub struct Timing {
    pub startup_grace: Duration,
    pub poll_interval: Duration,
    pub cooldown: Duration,
    pub heartbeat_timeout: Duration,
    /// Log a healthy poll every Nth check (0 disables).
    pub healthy_log_every: u32,
}

impl Timing {
    pub fn from_config(cfg: &WatchdogConfig) -> Self {
        Self {
            startup_grace: Duration::from_secs(cfg.timing.startup_grace_secs),
            poll_interval: Duration::from_secs(cfg.timing.poll_interval_secs),
            cooldown: Duration::from_secs(cfg.timing.cooldown_secs),
            heartbeat_timeout: Duration::from_secs(cfg.heartbeat.timeout_secs),
            healthy_log_every: cfg.timing.healthy_log_every,
        }
    }
}

/// Everything the loop needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct Options {
    pub child_command: Vec<String>,
    /// Executable name swept before each cycle; empty disables.
    pub sweep_process: String,
    pub alert_command: Vec<String>,
    pub kpi_fragments: Vec<String>,
    pub pod_fragments: Vec<String>,
    pub timing: Timing,
}

impl Options {
    pub fn from_config(cfg: &WatchdogConfig) -> Self {
        Self {
            child_command: cfg.child_command(),
            sweep_process: cfg.sweep.process_name.clone(),
            alert_command: cfg.alert.command.clone(),
            kpi_fragments: cfg.windows.kpi_fragments.clone(),
            pod_fragments: cfg.windows.pod_fragments.clone(),
            timing: Timing::from_config(cfg),
        }
    }
}

/// How a single supervision cycle ended.
enum CycleEnd {
    /// A monitoring check failed; the stack was torn down.
    Failed(FailureReason),
    /// The child could not be launched at all.
    LaunchFailed,
    /// Shutdown was requested; the child (if any) was torn down.
    Shutdown,
}

pub struct Supervisor {
    opts: Options,
    health: Box<dyn HealthSignal>,
    probe: Box<dyn WindowProbe>,
    status: Option<StatusFile>,
    shutdown: ShutdownHandle,
    cycle: u64,
    restarts: u64,
    last_failure: Option<FailureReason>,
}

impl Supervisor {
    pub fn new(
        opts: Options,
        health: Box<dyn HealthSignal>,
        probe: Box<dyn WindowProbe>,
        status: Option<StatusFile>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            opts,
            health,
            probe,
            status,
            shutdown,
            cycle: 0,
            restarts: 0,
            last_failure: None,
        }
    }

    /// Total restarts performed so far.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Number of supervision cycles started so far.
    #[allow(dead_code)]
    pub fn cycles_started(&self) -> u64 {
        self.cycle
    }

    /// Reason the most recent cycle was torn down.
    #[allow(dead_code)]
    pub fn last_failure(&self) -> Option<FailureReason> {
        self.last_failure
    }

    /// Run supervision cycles until shutdown is requested.
    pub async fn run(&mut self) {
        tracing::info!(command = ?self.opts.child_command, "supervisor loop starting");

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }
            self.cycle += 1;

            match self.run_cycle().await {
                CycleEnd::Shutdown => break,
                CycleEnd::Failed(reason) => {
                    self.restarts += 1;
                    self.last_failure = Some(reason);
                    tracing::info!(
                        cycle = self.cycle,
                        restarts = self.restarts,
                        "cycle ended, restarting after cooldown"
                    );
                }
                CycleEnd::LaunchFailed => {
                    tracing::info!(cycle = self.cycle, "launch failed, retrying after cooldown");
                }
            }

            self.write_status(SupervisorState::Cooldown, None);
            if self.sleep_or_shutdown(self.opts.timing.cooldown).await {
                break;
            }
        }

        self.write_status(SupervisorState::ShuttingDown, None);
        if let Some(status) = &self.status {
            status.remove();
        }
        tracing::info!(restarts = self.restarts, "supervisor loop stopped");
    }

    /// One supervision cycle: sweep strays, start the child, wait out the
    /// startup grace, then poll until a check fails or shutdown arrives.
    async fn run_cycle(&mut self) -> CycleEnd {
        self.write_status(SupervisorState::Starting, None);

        if !self.opts.sweep_process.is_empty() {
            process::kill_all_matching(&self.opts.sweep_process);
        }

        let mut child = match process::spawn(&self.opts.child_command) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(error = %e, "failed to launch automation process");
                return CycleEnd::LaunchFailed;
            }
        };

        tracing::info!(
            pid = child.pid(),
            grace_secs = self.opts.timing.startup_grace.as_secs(),
            "waiting out startup grace period"
        );
        if self.sleep_or_shutdown(self.opts.timing.startup_grace).await {
            return self.teardown_for_shutdown(child).await;
        }

        self.write_status(SupervisorState::Monitoring, Some(child.pid()));
        let mut polls: u64 = 0;

        let reason = loop {
            if self.sleep_or_shutdown(self.opts.timing.poll_interval).await {
                return self.teardown_for_shutdown(child).await;
            }
            polls += 1;

            let exited = child.poll_exited();
            let stale = self.health.is_stale(self.opts.timing.heartbeat_timeout);
            let present = self.windows_present();

            if let Some(reason) = classify(exited, stale, present) {
                break reason;
            }

            let every = self.opts.timing.healthy_log_every as u64;
            if every > 0 && polls % every == 0 {
                tracing::info!(pid = child.pid(), polls, "automation process healthy");
            } else {
                tracing::debug!(pid = child.pid(), polls, "health checks passed");
            }
        };

        tracing::warn!(pid = child.pid(), %reason, "failure detected, tearing down stack");
        self.write_status(SupervisorState::Failing, Some(child.pid()));

        // Warn the operator before the session disappears.
        alert::notify(&self.opts.alert_command, &reason.to_string());
        child.kill_tree().await;

        CycleEnd::Failed(reason)
    }

    async fn teardown_for_shutdown(&mut self, mut child: SupervisedProcess) -> CycleEnd {
        tracing::info!(pid = child.pid(), "shutdown requested, tearing down child");
        child.kill_tree().await;
        CycleEnd::Shutdown
    }

    fn windows_present(&self) -> bool {
        let titles = match self.probe.titles() {
            Ok(titles) => titles,
            Err(e) => {
                // Fail-safe: an unenumerable desktop counts as "windows gone".
                tracing::warn!(error = %e, "window enumeration failed");
                Vec::new()
            }
        };
        windows::windows_ok(&titles, &self.opts.kpi_fragments, &self.opts.pod_fragments)
    }

    /// Sleep for `duration`, returning true if shutdown arrived first.
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown.cancelled() => true,
        }
    }

    fn write_status(&self, state: SupervisorState, child_pid: Option<u32>) {
        let Some(status) = &self.status else { return };
        let data = StatusData {
            pid: std::process::id(),
            state,
            cycle: self.cycle,
            child_pid,
            restarts: self.restarts,
            last_failure: self.last_failure.map(|r| r.to_string()),
            last_update: Utc::now(),
        };
        if let Err(e) = status.write(&data) {
            tracing::warn!(error = %e, "failed to write status file");
        }
    }
}
