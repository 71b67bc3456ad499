//! Change notifications for a single path, synthesized by polling lstat
//! snapshots. Events fire on create, remove, and any size/mtime/mode change.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Default snapshot period. Short enough that waits feel immediate, long
/// enough that an idle watcher costs almost nothing.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// One observed change on a watched path.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// lstat fingerprint of an entry; `None` upstream means the entry is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    len: u64,
    mtime: Option<SystemTime>,
    mode: u32,
}

fn probe(path: &Path) -> Option<Snapshot> {
    use std::os::unix::fs::MetadataExt;
    std::fs::symlink_metadata(path).ok().map(|m| Snapshot {
        len: m.len(),
        mtime: m.modified().ok(),
        mode: m.mode(),
    })
}

/// Watches one path for changes. The baseline snapshot is taken at
/// construction, so a change that happens after `new` but before the first
/// wait is still observed.
#[derive(Debug)]
pub struct PathWatcher {
    path: PathBuf,
    period: Duration,
    last: Option<Snapshot>,
}

impl PathWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = probe(&path);
        Self {
            path,
            period: DEFAULT_POLL_PERIOD,
            last,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Compare the current snapshot against the last one seen. Returns the
    /// change if there was one, without waiting.
    pub fn poll_once(&mut self) -> Option<Change> {
        let current = probe(&self.path);
        if current == self.last {
            return None;
        }
        let kind = match (&self.last, &current) {
            (None, Some(_)) => ChangeKind::Created,
            (Some(_), None) => ChangeKind::Removed,
            _ => ChangeKind::Modified,
        };
        self.last = current;
        tracing::trace!(path = %self.path.display(), ?kind, "path changed");
        Some(Change {
            kind,
            path: self.path.clone(),
        })
    }

    /// Suspend until the next change on the path.
    pub async fn next_change(&mut self) -> Change {
        loop {
            if let Some(change) = self.poll_once() {
                return change;
            }
            tokio::time::sleep(self.period).await;
        }
    }

    /// Block the calling thread until the next change on the path.
    pub fn next_change_sync(&mut self) -> Change {
        loop {
            if let Some(change) = self.poll_once() {
                return change;
            }
            std::thread::sleep(self.period);
        }
    }
}
