use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use outpost_common::internal;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

/// A change observed in the watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Modification time of the directory when the change was seen, if it
    /// could be read
    pub modified: Option<SystemTime>,
}

impl ChangeEvent {
    /// Snapshot the directory's current modification time
    #[must_use]
    pub fn observe(dir: &Path) -> Self {
        Self {
            modified: std::fs::metadata(dir).and_then(|m| m.modified()).ok(),
        }
    }
}

/// Watches a spool's incoming directory and reports changes
///
/// Events are forwarded on a bounded channel; when the receiver falls
/// behind, further events are dropped since the directory's state, not each
/// individual event, is what the dispatcher acts on.
///
/// Dropping the watcher stops the notifications and closes the channel.
pub struct SpoolWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl SpoolWatcher {
    /// Start watching `dir`
    ///
    /// # Errors
    /// If the platform watcher cannot be created or `dir` cannot be watched
    pub fn watch(
        dir: impl Into<PathBuf>,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<ChangeEvent>)> {
        let dir = dir.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let observed = dir.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }

                debug!(kind = ?event.kind, paths = ?event.paths, "Spool directory changed");
                if tx.try_send(ChangeEvent::observe(&observed)).is_err() {
                    debug!("Change channel full or closed, dropping event");
                }
            }
            Err(e) => warn!(error = %e, "Spool watcher error"),
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        internal!("Watching {} for new mail", dir.display());

        Ok((
            Self {
                dir,
                _watcher: watcher,
            },
            rx,
        ))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for SpoolWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolWatcher").field("dir", &self.dir).finish()
    }
}
