use crate::refresh::timers::TimerToken;

/// The four per-panel timers. At most one of each kind is armed at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Coalesces `RefreshDirEx` requests (fast or slow).
    RefreshDirEx,
    /// Background-throttled refresh while the app is not in the foreground.
    InactiveRefresh,
    /// Settling delay after suspend mode ends.
    SmEndNotify,
    /// Rate limit for icon overlay refreshes.
    IconOverlayRefresh,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::RefreshDirEx,
        TimerKind::InactiveRefresh,
        TimerKind::SmEndNotify,
        TimerKind::IconOverlayRefresh,
    ];

    pub(crate) fn slot(self) -> usize {
        match self {
            TimerKind::RefreshDirEx => 0,
            TimerKind::InactiveRefresh => 1,
            TimerKind::SmEndNotify => 2,
            TimerKind::IconOverlayRefresh => 3,
        }
    }
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKind::RefreshDirEx => write!(f, "refresh_dir_ex"),
            TimerKind::InactiveRefresh => write!(f, "inactive_refresh"),
            TimerKind::SmEndNotify => write!(f, "sm_end_notify"),
            TimerKind::IconOverlayRefresh => write!(f, "icon_overlay_refresh"),
        }
    }
}

/// Input to a panel's refresh state machine.
///
/// `stamp` values come from the process-wide [`crate::TimeCounter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    /// The directory may have changed. `from_watcher` marks change-notifier origin,
    /// which is subject to icon-reading deferral and background throttling.
    Changed { stamp: u64, from_watcher: bool },
    /// Request a delayed refresh; `slow` selects the long delay.
    RefreshDirEx { stamp: u64, slow: bool },
    /// A change recorded while suspend mode was active.
    SuspendedChange { stamp: u64 },
    /// Suspend mode ended somewhere in the process.
    SuspendEnded,
    IconReadingStarted,
    IconReadingEnded,
    /// Icon overlay state changed for the displayed path.
    IconOverlaysChanged,
    /// The main window was activated.
    Activated,
    /// Someone needs an up-to-date listing now; run a pending inactive refresh.
    FlushInactive,
    TimerFired { kind: TimerKind, token: TimerToken },
    /// Stop the driver loop.
    Shutdown,
}

/// A directory re-read handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Stamp of the signal that triggered the refresh.
    pub stamp: u64,
    /// The refresh is likely redundant (delayed, inactive, or right after icon
    /// reading). Hosts may skip expensive follow-up work such as re-reading icons.
    pub probably_useless: bool,
    /// Performed while the app was in the background.
    pub inactive: bool,
}
