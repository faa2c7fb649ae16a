/// Health channel between the automation process and the supervisor.
///
/// The producer periodically asserts "alive and making progress"; the consumer
/// only ever looks at the timestamp of the last assertion. Content is an opaque
/// marker — presence and freshness are everything.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// Consumer side of the health channel.
pub trait HealthSignal: Send {
    /// Timestamp of the most recent liveness assertion, or `None` if the
    /// signal was never written or cannot be read.
    fn last_seen(&self) -> Option<SystemTime>;

    /// True if the signal is absent, unreadable, or older than `max_age`.
    ///
    /// Unreadable is treated identically to stale: an unreadable health
    /// signal must trigger a restart, never be silently tolerated.
    fn is_stale(&self, max_age: Duration) -> bool {
        match self.last_seen() {
            Some(ts) => match ts.elapsed() {
                Ok(age) => age > max_age,
                // Timestamp in the future (clock adjustment) counts as fresh.
                Err(_) => false,
            },
            None => true,
        }
    }
}

/// Filesystem heartbeat: a marker file whose modification time is the signal.
///
/// The write is a whole-value overwrite, so a concurrent reader never observes
/// anything worse than "stale". One writer, one reader, no locking needed.
#[derive(Debug, Clone)]
pub struct FileHeartbeat {
    path: PathBuf,
}

impl FileHeartbeat {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Producer: refresh the marker file's modification time.
    pub fn report(&self) -> std::io::Result<()> {
        std::fs::write(&self.path, b"up")
    }
}

impl HealthSignal for FileHeartbeat {
    fn last_seen(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
    }
}

/// In-memory heartbeat for collaborators running inside the same process
/// (and for exercising the supervisor without a filesystem).
#[derive(Debug, Clone, Default)]
pub struct SharedHeartbeat {
    last: Arc<Mutex<Option<SystemTime>>>,
}

#[allow(dead_code)] // production wiring uses FileHeartbeat; this one backs the tests
impl SharedHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer: record "now" as the last liveness assertion.
    pub fn report(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(SystemTime::now());
        }
    }
}

impl HealthSignal for SharedHeartbeat {
    fn last_seen(&self) -> Option<SystemTime> {
        self.last.lock().ok().and_then(|last| *last)
    }
}
