//! The refresh-debounce state machine for one panel.
//!
//! [`PanelRefresher::handle`] is the only entry point. It is pure with respect
//! to time: callers pass `now`, and every environment query or side effect
//! goes through the [`PanelHost`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use salamander_config::RefreshConfig;
use tracing::{debug, info, warn};

use crate::clock::TimeCounter;
use crate::refresh::host::{BusyCursor, PanelHost};
use crate::refresh::timers::{TimerToken, Timers};
use crate::refresh::types::{PanelEvent, RefreshRequest, TimerKind};

const INACTIVE_DELAY_FACTOR: u32 = 20;
const MIN_TIMER_DELAY: Duration = Duration::from_millis(200);
/// Keeps a deferred inactive refresh at least this far in the future.
const INACTIVE_TIMER_SLACK: Duration = Duration::from_millis(100);
/// Refreshes this soon after icon reading ends are usually caused by it.
const ICON_READING_AFTERSHOCK: Duration = Duration::from_secs(1);

/// Where a refresh request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Direct,
    Watcher,
    DelayedEx,
    InactiveReplay,
    IconReadingReplay,
    SuspendedChange,
    SmEndReplay,
}

impl Source {
    /// Watcher changes and replays of them. These wait for icon reading and
    /// are throttled while the app is in the background.
    fn is_notifier_driven(self) -> bool {
        matches!(
            self,
            Source::Watcher | Source::IconReadingReplay | Source::InactiveReplay
        )
    }

    fn name(self) -> &'static str {
        match self {
            Source::Direct => "direct",
            Source::Watcher => "watcher",
            Source::DelayedEx => "delayed",
            Source::InactiveReplay => "inactive_replay",
            Source::IconReadingReplay => "icon_reading_replay",
            Source::SuspendedChange => "suspended_change",
            Source::SmEndReplay => "suspend_end_replay",
        }
    }
}

#[derive(Debug)]
pub struct PanelRefresher {
    counter: Arc<TimeCounter>,
    config: RefreshConfig,
    timers: Timers,

    /// Counter value taken when the most recent refresh started.
    last_refresh_time: u64,
    refresh_dir_ex_stamp: u64,
    inactive_refresh_stamp: u64,

    need_refresh_after_end_of_sm: bool,
    refresh_after_end_of_sm_time: u64,

    need_refresh_after_icons_reading: bool,
    refresh_after_icons_reading_time: u64,
    need_icon_overlay_refresh_after_icons_reading: bool,

    icon_cache_valid: bool,
    end_of_icon_reading: Option<Instant>,

    /// Equal values mean no inactive refresh since the last activation.
    last_inactive_refresh_start: Instant,
    last_inactive_refresh_end: Instant,

    last_icon_overlay_refresh: Option<Instant>,
}

impl PanelRefresher {
    pub fn new(counter: Arc<TimeCounter>, config: RefreshConfig, now: Instant) -> Self {
        Self {
            counter,
            config,
            timers: Timers::new(),
            last_refresh_time: 0,
            refresh_dir_ex_stamp: 0,
            inactive_refresh_stamp: 0,
            need_refresh_after_end_of_sm: false,
            refresh_after_end_of_sm_time: 0,
            need_refresh_after_icons_reading: false,
            refresh_after_icons_reading_time: 0,
            need_icon_overlay_refresh_after_icons_reading: false,
            icon_cache_valid: true,
            end_of_icon_reading: None,
            last_inactive_refresh_start: now,
            last_inactive_refresh_end: now,
            last_icon_overlay_refresh: None,
        }
    }

    pub fn last_refresh_time(&self) -> u64 {
        self.last_refresh_time
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn needs_refresh_after_suspend(&self) -> bool {
        self.need_refresh_after_end_of_sm
    }

    pub fn needs_refresh_after_icons_reading(&self) -> bool {
        self.need_refresh_after_icons_reading
    }

    /// Fire every timer that is due at `now`.
    pub fn fire_due_timers<H: PanelHost>(&mut self, now: Instant, host: &mut H) {
        for (kind, token) in self.timers.due(now) {
            self.handle(PanelEvent::TimerFired { kind, token }, now, host);
        }
    }

    pub fn handle<H: PanelHost>(&mut self, event: PanelEvent, now: Instant, host: &mut H) {
        match event {
            PanelEvent::Changed {
                stamp,
                from_watcher,
            } => {
                let source = if from_watcher {
                    Source::Watcher
                } else {
                    Source::Direct
                };
                self.request_refresh(source, stamp, now, host);
            }
            PanelEvent::RefreshDirEx { stamp, slow } => {
                self.schedule_refresh_dir_ex(stamp, slow, now);
            }
            PanelEvent::SuspendedChange { stamp } => self.suspended_change(stamp, now, host),
            PanelEvent::SuspendEnded => {
                if !self.timers.is_armed(TimerKind::SmEndNotify) {
                    self.timers
                        .arm(TimerKind::SmEndNotify, now, self.config.sm_end_notify());
                }
            }
            PanelEvent::IconReadingStarted => {
                self.icon_cache_valid = false;
                self.need_refresh_after_icons_reading = false;
            }
            PanelEvent::IconReadingEnded => self.icon_reading_ended(now, host),
            PanelEvent::IconOverlaysChanged => self.icon_overlays_changed(now, host),
            PanelEvent::Activated => self.activated(now),
            PanelEvent::FlushInactive => self.flush_inactive(now, host),
            PanelEvent::TimerFired { kind, token } => self.timer_fired(kind, token, now, host),
            PanelEvent::Shutdown => {}
        }
    }

    fn timer_fired<H: PanelHost>(
        &mut self,
        kind: TimerKind,
        token: TimerToken,
        now: Instant,
        host: &mut H,
    ) {
        if !self.timers.fire(kind, token) {
            debug!(event = "core.refresh.timer_stale", kind = %kind);
            return;
        }

        match kind {
            TimerKind::RefreshDirEx => {
                let stamp = self.refresh_dir_ex_stamp;
                self.request_refresh(Source::DelayedEx, stamp, now, host);
            }
            TimerKind::InactiveRefresh => {
                let stamp = self.inactive_refresh_stamp;
                self.request_refresh(Source::InactiveReplay, stamp, now, host);
            }
            TimerKind::SmEndNotify => self.suspend_end_settled(now, host),
            TimerKind::IconOverlayRefresh => {
                if host.overlays_enabled() {
                    self.refresh_overlays(now, host);
                }
            }
        }
    }

    fn schedule_refresh_dir_ex(&mut self, stamp: u64, slow: bool, now: Instant) {
        if self.timers.is_armed(TimerKind::RefreshDirEx) {
            self.refresh_dir_ex_stamp = self.refresh_dir_ex_stamp.max(stamp);
        } else {
            self.refresh_dir_ex_stamp = stamp;
        }
        // Re-armed on every request so the delay always matches the latest kind
        let delay = if slow {
            self.config.refresh_dir_ex_slow()
        } else {
            self.config.refresh_dir_ex_fast()
        };
        self.timers.arm(TimerKind::RefreshDirEx, now, delay);
    }

    fn suspend_end_settled<H: PanelHost>(&mut self, now: Instant, host: &mut H) {
        if host.is_suspended() {
            // Wait for the next SuspendEnded
            return;
        }
        if !self.need_refresh_after_end_of_sm {
            return;
        }
        self.need_refresh_after_end_of_sm = false;
        let stamp = self.refresh_after_end_of_sm_time;
        debug!(event = "core.refresh.suspend_replay_started", stamp = stamp);
        self.recheck_location(stamp, host);
        self.request_refresh(Source::SmEndReplay, stamp, now, host);
    }

    fn suspended_change<H: PanelHost>(&mut self, stamp: u64, now: Instant, host: &mut H) {
        if !self.icon_cache_valid && host.defers_refresh_while_reading_icons() {
            self.latch_icons_reading(stamp);
            return;
        }
        self.recheck_location(stamp, host);
        self.request_refresh(Source::SuspendedChange, stamp, now, host);
    }

    fn recheck_location<H: PanelHost>(&self, stamp: u64, host: &mut H) {
        if stamp >= self.last_refresh_time {
            let mut busy = BusyCursor::acquire(host);
            busy.recheck_location();
        }
    }

    fn icon_reading_ended<H: PanelHost>(&mut self, now: Instant, host: &mut H) {
        self.icon_cache_valid = true;
        self.end_of_icon_reading = Some(now);

        if self.need_refresh_after_icons_reading {
            self.need_refresh_after_icons_reading = false;
            let stamp = self.refresh_after_icons_reading_time;
            debug!(event = "core.refresh.icons_replay_started", stamp = stamp);
            self.request_refresh(Source::IconReadingReplay, stamp, now, host);
        } else if self.need_icon_overlay_refresh_after_icons_reading {
            self.need_icon_overlay_refresh_after_icons_reading = false;
            if host.overlays_enabled() {
                self.refresh_overlays(now, host);
            }
        }
    }

    fn icon_overlays_changed<H: PanelHost>(&mut self, now: Instant, host: &mut H) {
        if self.timers.is_armed(TimerKind::IconOverlayRefresh)
            || self.need_icon_overlay_refresh_after_icons_reading
            || !host.overlays_enabled()
        {
            return;
        }

        let period = self.config.icon_overlay_period();
        if let Some(last) = self.last_icon_overlay_refresh {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < period {
                let delay = (period - elapsed).max(MIN_TIMER_DELAY);
                self.timers.arm(TimerKind::IconOverlayRefresh, now, delay);
                return;
            }
        }

        if self.icon_cache_valid {
            self.refresh_overlays(now, host);
        } else {
            self.need_icon_overlay_refresh_after_icons_reading = true;
        }
    }

    fn refresh_overlays<H: PanelHost>(&mut self, now: Instant, host: &mut H) {
        self.last_icon_overlay_refresh = Some(now);
        debug!(event = "core.refresh.overlays_refreshed");
        host.refresh_icon_overlays();
    }

    fn activated(&mut self, now: Instant) {
        self.last_inactive_refresh_start = self.last_inactive_refresh_end;
        if self.timers.cancel(TimerKind::InactiveRefresh) {
            // The deferred background refresh runs right away, as a fast delayed one
            let stamp = self.counter.next();
            debug!(event = "core.refresh.inactive_promoted", stamp = stamp);
            self.schedule_refresh_dir_ex(stamp, false, now);
        }
    }

    fn flush_inactive<H: PanelHost>(&mut self, now: Instant, host: &mut H) {
        if self.timers.cancel(TimerKind::InactiveRefresh) {
            self.last_inactive_refresh_end = self.last_inactive_refresh_start;
            let stamp = self.inactive_refresh_stamp;
            self.request_refresh(Source::InactiveReplay, stamp, now, host);
        }
    }

    fn latch_icons_reading(&mut self, stamp: u64) {
        self.need_refresh_after_icons_reading = true;
        self.refresh_after_icons_reading_time = self.refresh_after_icons_reading_time.max(stamp);
        debug!(event = "core.refresh.icons_latched", stamp = stamp);
    }

    /// Delay between background refreshes, or `None` if none happened since
    /// activation.
    fn inactive_delay(&self) -> Option<Duration> {
        if self.last_inactive_refresh_start == self.last_inactive_refresh_end {
            return None;
        }
        let last_duration = self
            .last_inactive_refresh_end
            .saturating_duration_since(self.last_inactive_refresh_start);
        Some(
            (last_duration * INACTIVE_DELAY_FACTOR)
                .clamp(self.config.min_inactive_delay(), self.config.max_inactive_delay()),
        )
    }

    fn request_refresh<H: PanelHost>(
        &mut self,
        source: Source,
        stamp: u64,
        now: Instant,
        host: &mut H,
    ) {
        let probably_useless = match source {
            Source::IconReadingReplay => true,
            _ if self
                .end_of_icon_reading
                .is_some_and(|end| now.saturating_duration_since(end) < ICON_READING_AFTERSHOCK) =>
            {
                true
            }
            _ => matches!(source, Source::DelayedEx | Source::InactiveReplay),
        };

        if source.is_notifier_driven()
            && !self.icon_cache_valid
            && host.defers_refresh_while_reading_icons()
        {
            self.latch_icons_reading(stamp);
            return;
        }

        if host.is_suspended() {
            self.need_refresh_after_end_of_sm = true;
            self.refresh_after_end_of_sm_time = self.refresh_after_end_of_sm_time.max(stamp);
            debug!(
                event = "core.refresh.suspend_latched",
                stamp = stamp,
                source = source.name()
            );
            return;
        }

        if stamp < self.last_refresh_time {
            debug!(
                event = "core.refresh.stale_dropped",
                stamp = stamp,
                last_refresh_time = self.last_refresh_time,
                source = source.name()
            );
            return;
        }

        let inactive = source.is_notifier_driven() && !host.is_foreground();
        if inactive && let Some(delay) = self.inactive_delay() {
            if self.timers.is_armed(TimerKind::InactiveRefresh) {
                self.inactive_refresh_stamp = self.inactive_refresh_stamp.max(stamp);
                return;
            }
            let since_end = now.saturating_duration_since(self.last_inactive_refresh_end);
            if since_end + INACTIVE_TIMER_SLACK < delay {
                let wait = (delay - since_end).max(MIN_TIMER_DELAY);
                self.timers.arm(TimerKind::InactiveRefresh, now, wait);
                self.inactive_refresh_stamp = stamp;
                debug!(
                    event = "core.refresh.inactive_deferred",
                    stamp = stamp,
                    delay_ms = delay.as_millis() as u64,
                    wait_ms = wait.as_millis() as u64
                );
                return;
            }
        }

        self.perform_refresh(
            RefreshRequest {
                stamp,
                probably_useless,
                inactive,
            },
            now,
            host,
        );
    }

    fn perform_refresh<H: PanelHost>(
        &mut self,
        request: RefreshRequest,
        now: Instant,
        host: &mut H,
    ) {
        let location_before = request.inactive.then(|| host.location());
        if request.inactive {
            self.last_inactive_refresh_start = now;
        }

        let mut busy = BusyCursor::acquire(host);

        // Taken before the re-read: a change reported while it runs is newer
        // than this value and triggers another refresh.
        self.last_refresh_time = self.counter.next();

        info!(
            event = "core.refresh.refresh_started",
            stamp = request.stamp,
            refresh_time = self.last_refresh_time,
            probably_useless = request.probably_useless,
            inactive = request.inactive
        );

        if let Err(e) = busy.refresh_directory(request) {
            warn!(
                event = "core.refresh.refresh_failed",
                error = %e,
                code = e.error_code()
            );
        }

        if let Some(before) = location_before {
            if busy.location() != before {
                // Panel moved away (the directory was probably deleted); the
                // next background refresh must not be throttled.
                self.last_inactive_refresh_end = self.last_inactive_refresh_start;
            } else {
                let start = self.last_inactive_refresh_start;
                self.last_inactive_refresh_end = busy.now().max(start + Duration::from_millis(1));
            }
        }

        debug!(event = "core.refresh.refresh_completed", stamp = request.stamp);
    }
}
