/// Process controller: spawn the automation process in its own process group,
/// poll it without blocking, and tear down its whole process tree on failure.
use std::process::Stdio;
use sysinfo::{Pid, System};
use tokio::process::{Child, Command};

/// Handle to the one child the supervisor owns for the duration of a cycle.
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
    pid: u32,
}

/// Errors that can occur when launching the automation process.
#[derive(Debug)]
pub enum SpawnError {
    /// The configured command line is empty.
    EmptyCommand,
    /// The underlying launch failed (missing executable, permission).
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SpawnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnError::EmptyCommand => write!(f, "child command is empty"),
            SpawnError::Spawn { command, source } => {
                write!(f, "failed to spawn {command}: {source}")
            }
        }
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpawnError::EmptyCommand => None,
            SpawnError::Spawn { source, .. } => Some(source),
        }
    }
}

/// Launch the automation process as a supervised child.
///
/// The child gets its own process group so a later tree kill cannot take the
/// supervisor down with it. `kill_on_drop` is a backstop only — the supervisor
/// always tears the child down explicitly via `kill_tree`.
pub fn spawn(command: &[String]) -> Result<SupervisedProcess, SpawnError> {
    let (program, args) = command.split_first().ok_or(SpawnError::EmptyCommand)?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SpawnError::Spawn {
            command: program.clone(),
            source: e,
        })?;

    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, command = %program, "automation process spawned");

    Ok(SupervisedProcess { child, pid })
}

impl SupervisedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking exit check. True if the child has terminated for any
    /// reason, including crash.
    pub fn poll_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::warn!(pid = self.pid, exit_code = ?status.code(), "child has exited");
                true
            }
            Ok(None) => false,
            Err(e) => {
                // Cannot poll the child at all; fail-safe toward restart.
                tracing::warn!(pid = self.pid, error = %e, "exit poll failed, treating as exited");
                true
            }
        }
    }

    /// Kill the child and every descendant alive at the time of the call.
    ///
    /// Descendants are enumerated once up front, so processes forked mid-kill
    /// may be missed; the stray sweep at the next cycle start picks those up.
    /// Idempotent: an already-dead child is logged and reaped, never an error.
    pub async fn kill_tree(&mut self) {
        let mut sys = System::new();
        sys.refresh_processes();

        let descendants = collect_descendants(&sys, Pid::from_u32(self.pid));
        for pid in &descendants {
            if let Some(proc_) = sys.process(*pid) {
                if proc_.kill() {
                    tracing::info!(pid = pid.as_u32(), name = proc_.name(), "killed descendant");
                } else {
                    tracing::warn!(pid = pid.as_u32(), name = proc_.name(), "failed to kill descendant");
                }
            }
        }

        // The child leads its own process group; signal the whole group too,
        // catching anything forked after the enumeration above.
        if self.pid != 0 {
            use nix::sys::signal::{killpg, Signal};
            match killpg(nix::unistd::Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => tracing::warn!(pid = self.pid, error = %e, "process group kill failed"),
            }
        }

        match self.child.start_kill() {
            Ok(()) => tracing::info!(
                pid = self.pid,
                descendants = descendants.len(),
                "killed process tree"
            ),
            // Raised when the child was already waited on; nothing left to kill.
            Err(e) => tracing::info!(pid = self.pid, error = %e, "child already gone"),
        }

        // Reap so the pid cannot linger as a zombie into the next cycle.
        match self.child.wait().await {
            Ok(status) => tracing::debug!(pid = self.pid, exit_code = ?status.code(), "child reaped"),
            Err(e) => tracing::warn!(pid = self.pid, error = %e, "failed to reap child"),
        }
    }
}

/// Transitive children of `root` in the current process table, parents before
/// their own children.
fn collect_descendants(sys: &System, root: Pid) -> Vec<Pid> {
    let mut found: Vec<Pid> = Vec::new();
    let mut frontier = vec![root];

    while let Some(parent) = frontier.pop() {
        for (pid, proc_) in sys.processes() {
            if proc_.parent() == Some(parent) && !found.contains(pid) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }
    found
}

/// Best-effort sweep: kill every running process whose executable name matches
/// exactly (case-insensitive). Run before each cycle so leftover browser
/// instances can't hold profile locks against the fresh launch. Individual
/// failures are logged and skipped, never fatal.
pub fn kill_all_matching(name: &str) -> usize {
    let mut sys = System::new();
    sys.refresh_processes();

    let own_pid = Pid::from_u32(std::process::id());
    let mut killed = 0;

    for (pid, proc_) in sys.processes() {
        if *pid == own_pid || !proc_.name().eq_ignore_ascii_case(name) {
            continue;
        }
        if proc_.kill() {
            tracing::info!(pid = pid.as_u32(), name = proc_.name(), "killed stray process");
            killed += 1;
        } else {
            tracing::warn!(
                pid = pid.as_u32(),
                name = proc_.name(),
                "could not kill stray process, skipping"
            );
        }
    }

    if killed > 0 {
        tracing::info!(name, killed, "stray process sweep done");
    }
    killed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Signal-0 probe, with zombies counted as dead: a killed child shows up
    /// as a zombie until its parent reaps it.
    fn pid_alive(pid: u32) -> bool {
        if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_err() {
            return false;
        }
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return false;
        };
        // State letter follows the parenthesized comm field.
        let state = stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next());
        state != Some("Z")
    }

    async fn wait_until_dead(pid: u32) -> bool {
        for _ in 0..40 {
            if !pid_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_spawn_empty_command_fails() {
        let err = spawn(&[]).unwrap_err();
        assert!(matches!(err, SpawnError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_fails() {
        let err = spawn(&["nonexistent-automation-xyz".to_string()]).unwrap_err();
        assert!(matches!(err, SpawnError::Spawn { .. }));
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_poll_exited_running_then_done() {
        let mut child = spawn(&sh("sleep 0.2")).unwrap();
        assert!(!child.poll_exited());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(child.poll_exited());

        child.kill_tree().await;
    }

    #[tokio::test]
    async fn test_kill_tree_terminates_children() {
        let mut child = spawn(&sh("sleep 30 & sleep 30 & wait")).unwrap();
        // Give the shell a moment to fork its two sleepers.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut sys = System::new();
        sys.refresh_processes();
        let descendants = collect_descendants(&sys, Pid::from_u32(child.pid()));
        assert!(
            descendants.len() >= 2,
            "expected at least two descendants, found {descendants:?}"
        );

        let root = child.pid();
        child.kill_tree().await;

        assert!(wait_until_dead(root).await, "root still alive after kill_tree");
        for pid in descendants {
            assert!(
                wait_until_dead(pid.as_u32()).await,
                "descendant {pid} still alive after kill_tree"
            );
        }
    }

    #[tokio::test]
    async fn test_kill_tree_is_idempotent() {
        let mut child = spawn(&sh("sleep 30")).unwrap();
        child.kill_tree().await;
        // Second call on an already-reaped child must not panic or error.
        child.kill_tree().await;
    }

    #[tokio::test]
    async fn test_kill_tree_on_already_exited_child() {
        let mut child = spawn(&["true".to_string()]).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(child.poll_exited());

        // Killing an already-dead process is success, not error.
        child.kill_tree().await;
    }

    #[tokio::test]
    async fn test_kill_all_matching_no_match_is_noop() {
        assert_eq!(kill_all_matching("no-such-process-name-xyz"), 0);
    }

    #[tokio::test]
    async fn test_kill_all_matching_sweeps_named_process() {
        // `sleep` under a distinct name so the sweep can't hit anything else.
        let dir = tempfile::tempdir().unwrap();
        let sleep_path = std::process::Command::new("which")
            .arg("sleep")
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());
        let Some(sleep_path) = sleep_path.filter(|p| !p.is_empty()) else {
            return;
        };
        // Short name: the kernel truncates comm to 15 bytes.
        let named = dir.path().join("stray-tgt");
        std::fs::copy(&sleep_path, &named).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&named, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut stray = spawn(&[named.display().to_string(), "30".to_string()]).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let killed = kill_all_matching("STRAY-TGT");
        assert!(killed >= 1, "sweep did not find the stray process");

        // Reap before probing: the swept child lingers as our zombie until then.
        stray.kill_tree().await;
        assert!(wait_until_dead(stray.pid()).await);
    }
}
