use std::ops::{Deref, DerefMut};
use std::time::Instant;

use crate::refresh::errors::RefreshError;
use crate::refresh::types::RefreshRequest;

/// Environment queries and actions the refresh machine needs from its panel.
pub trait PanelHost {
    /// Suspend mode or the global stop-refresh flag is active.
    fn is_suspended(&self) -> bool;

    /// The application's main window is the foreground window.
    fn is_foreground(&self) -> bool;

    /// Whether refreshes should wait for icon reading to finish. True for
    /// network drives displayed with system icons.
    fn defers_refresh_while_reading_icons(&self) -> bool {
        false
    }

    /// Identity of the displayed location (panel type and path).
    fn location(&self) -> String;

    /// Re-read the directory.
    fn refresh_directory(&mut self, request: RefreshRequest) -> Result<(), RefreshError>;

    /// Verify the displayed path still exists and re-register change
    /// notifications for it.
    fn recheck_location(&mut self) {}

    fn overlays_enabled(&self) -> bool {
        false
    }

    fn refresh_icon_overlays(&mut self) {}

    /// Show the busy cursor. Returns `false` if it was already showing.
    fn set_busy_cursor(&mut self) -> bool {
        false
    }

    fn restore_cursor(&mut self) {}

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Busy cursor held for the duration of a refresh; restored on drop.
pub(crate) struct BusyCursor<'a, H: PanelHost> {
    host: &'a mut H,
    restore: bool,
}

impl<'a, H: PanelHost> BusyCursor<'a, H> {
    pub(crate) fn acquire(host: &'a mut H) -> Self {
        let restore = host.set_busy_cursor();
        Self { host, restore }
    }
}

impl<H: PanelHost> Deref for BusyCursor<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.host
    }
}

impl<H: PanelHost> DerefMut for BusyCursor<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        self.host
    }
}

impl<H: PanelHost> Drop for BusyCursor<'_, H> {
    fn drop(&mut self) {
        if self.restore {
            self.host.restore_cursor();
        }
    }
}
