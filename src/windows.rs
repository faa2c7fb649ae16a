/// Window-presence probe: an independent health signal for the dashboards.
///
/// Process exit doesn't catch a closed browser window (the browser may keep
/// running other windows), and the heartbeat only proves the automation loop
/// is alive, not that its target window still exists. Title matching is a
/// best-effort heuristic, not a verified contract — titles are locale- and
/// deployment-specific, which is why the probe sits behind a trait.
use std::io;

/// Point-in-time enumeration of visible top-level window titles.
pub trait WindowProbe: Send {
    fn titles(&self) -> io::Result<Vec<String>>;
}

/// Probe backed by an external window-listing command (e.g. `wmctrl -l`).
///
/// Each line of the command's stdout is treated as one window title. Leading
/// fields (window id, desktop number) are harmless since classification is by
/// substring containment.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: Vec<String>,
}

impl CommandProbe {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl WindowProbe for CommandProbe {
    fn titles(&self) -> io::Result<Vec<String>> {
        let (program, args) = self.command.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "window list command is empty")
        })?;

        let output = std::process::Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "window list command exited with {}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// True only if both dashboards are on screen: at least one title contains a
/// KPI fragment AND at least one contains a POD fragment. Matching is
/// case-sensitive substring containment. An empty window list never matches
/// a non-empty fragment set.
pub fn windows_ok(titles: &[String], kpi_fragments: &[String], pod_fragments: &[String]) -> bool {
    matches_any(titles, kpi_fragments) && matches_any(titles, pod_fragments)
}

/// An empty fragment set disables its predicate, so deployments with a single
/// monitored dashboard can opt out of half the check.
fn matches_any(titles: &[String], fragments: &[String]) -> bool {
    if fragments.is_empty() {
        return true;
    }
    titles
        .iter()
        .any(|title| fragments.iter().any(|frag| title.contains(frag)))
}
