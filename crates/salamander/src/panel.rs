//! A terminal "panel": a directory listing kept fresh by the refresh driver.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::Instant;

use salamander_config::RefreshConfig;
use salamander_core::{
    DirectoryWatcher, PanelDriver, PanelHandle, PanelHost, PanelRefresher, RefreshError,
    RefreshRequest, TimeCounter,
};
use tracing::{debug, info, warn};

/// Everything the main loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Another instance asked us to draw attention.
    Flash,
    /// Activation params are staged; take them at the next idle point.
    WakeFromIdle,
    Refreshed {
        path: PathBuf,
        entries: usize,
        stamp: u64,
        probably_useless: bool,
    },
    /// The displayed directory vanished; the panel fell back to `to`.
    Moved { to: PathBuf },
    Quit,
}

/// Panel host that lists a directory and reports to the main loop.
pub struct ListingPanel {
    path: PathBuf,
    events: Sender<AppEvent>,
}

impl ListingPanel {
    pub fn new(path: PathBuf, events: Sender<AppEvent>) -> Self {
        Self { path, events }
    }

    fn report(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            debug!(event = "cli.panel.report_dropped", path = %self.path.display());
        }
    }
}

impl PanelHost for ListingPanel {
    fn is_suspended(&self) -> bool {
        false
    }

    // A terminal panel has no window focus to track
    fn is_foreground(&self) -> bool {
        true
    }

    fn location(&self) -> String {
        format!("disk:{}", self.path.display())
    }

    fn refresh_directory(&mut self, request: RefreshRequest) -> Result<(), RefreshError> {
        if !self.path.is_dir() {
            self.recheck_location();
        }
        let entries = fs::read_dir(&self.path)
            .map_err(|source| RefreshError::ReadDir {
                path: self.path.clone(),
                source,
            })?
            .filter_map(Result::ok)
            .count();
        self.report(AppEvent::Refreshed {
            path: self.path.clone(),
            entries,
            stamp: request.stamp,
            probably_useless: request.probably_useless,
        });
        Ok(())
    }

    fn recheck_location(&mut self) {
        if self.path.is_dir() {
            return;
        }
        let Some(existing) = nearest_existing_dir(&self.path) else {
            warn!(event = "cli.panel.no_existing_parent", path = %self.path.display());
            return;
        };
        info!(
            event = "cli.panel.location_moved",
            from = %self.path.display(),
            to = %existing.display(),
        );
        self.path = existing.clone();
        self.report(AppEvent::Moved { to: existing });
    }
}

/// Closest ancestor of `path` (or `path` itself) that is a directory.
pub fn nearest_existing_dir(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|candidate| candidate.is_dir())
        .map(Path::to_path_buf)
}

/// A running panel: driver thread plus directory watcher.
pub struct Panel {
    handle: PanelHandle,
    watcher: Option<DirectoryWatcher>,
    driver: Option<JoinHandle<ListingPanel>>,
}

impl Panel {
    /// Start the driver and the watcher, then request the first listing.
    pub fn open(
        path: &Path,
        counter: Arc<TimeCounter>,
        config: RefreshConfig,
        events: Sender<AppEvent>,
    ) -> Result<Self, RefreshError> {
        let (handle, rx) = PanelHandle::channel(Arc::clone(&counter));
        let refresher = PanelRefresher::new(counter, config, Instant::now());
        let host = ListingPanel::new(path.to_path_buf(), events);
        let driver = PanelDriver::new(refresher, host, rx).spawn("main")?;
        let mut panel = Self {
            handle,
            watcher: None,
            driver: Some(driver),
        };
        // On error the drop of `panel` stops the driver
        panel.watcher = Some(DirectoryWatcher::new(path, panel.handle.clone())?);
        panel.handle.changed(false)?;
        Ok(panel)
    }

    pub fn path(&self) -> Option<&Path> {
        self.watcher.as_ref().map(DirectoryWatcher::path)
    }

    /// Stop watching and shut the driver down. Idempotent.
    pub fn close(&mut self) {
        self.watcher = None;
        let Some(driver) = self.driver.take() else {
            return;
        };
        if let Err(e) = self.handle.shutdown() {
            debug!(event = "cli.panel.shutdown_send_failed", error = %e);
        }
        if driver.join().is_err() {
            warn!(event = "cli.panel.driver_panicked");
        }
    }
}

impl Drop for Panel {
    fn drop(&mut self) {
        self.close();
    }
}
