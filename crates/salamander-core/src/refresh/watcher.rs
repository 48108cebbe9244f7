//! Directory watcher feeding a panel.
//!
//! Uses platform-native file watching (inotify on Linux, FSEvents on macOS)
//! and posts `Changed { from_watcher: true }` for create, modify and remove
//! events under the watched directory.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::refresh::driver::PanelHandle;
use crate::refresh::errors::RefreshError;

pub struct DirectoryWatcher {
    /// The underlying notify watcher. Must be kept alive.
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl DirectoryWatcher {
    /// Start watching `path` non-recursively; changes go to `panel`.
    pub fn new(path: &Path, panel: PanelHandle) -> Result<Self, RefreshError> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant_event(&event) => {
                debug!(
                    event = "core.refresh.watcher.event_detected",
                    kind = ?event.kind,
                    paths = ?event.paths
                );
                if let Err(e) = panel.changed(true) {
                    debug!(event = "core.refresh.watcher.send_failed", error = %e);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(event = "core.refresh.watcher.event_error", error = %e);
            }
        })?;

        watcher.watch(path, RecursiveMode::NonRecursive)?;

        info!(event = "core.refresh.watcher.started", path = %path.display());

        Ok(Self {
            _watcher: watcher,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_relevant_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TimeCounter;
    use crate::refresh::types::PanelEvent;
    use notify::event::{AccessKind, CreateKind};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_relevant_event_kinds() {
        let create = Event::new(EventKind::Create(CreateKind::File));
        let access = Event::new(EventKind::Access(AccessKind::Read));
        assert!(is_relevant_event(&create));
        assert!(!is_relevant_event(&access));
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _rx) = PanelHandle::channel(Arc::new(TimeCounter::new()));
        let result = DirectoryWatcher::new(&dir.path().join("nope"), handle);
        assert!(matches!(result, Err(RefreshError::Watch(_))));
    }

    #[test]
    fn test_file_creation_posts_watcher_change() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, rx) = PanelHandle::channel(Arc::new(TimeCounter::new()));
        let watcher = DirectoryWatcher::new(dir.path(), handle).unwrap();
        assert_eq!(watcher.path(), dir.path());

        std::fs::write(dir.path().join("new.txt"), "hello").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            event,
            PanelEvent::Changed {
                from_watcher: true,
                ..
            }
        ));
    }
}
