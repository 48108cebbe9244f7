use nix::sys::signal::{Signal, kill};
use nix::unistd::getpid;
use tracing::error;

/// Side effects the control thread performs on behalf of a command.
///
/// Called from the control thread; implementations forward to the main
/// thread where the work touches UI state.
pub trait InstanceHost: Send + Sync + 'static {
    /// Draw the user's attention to the main window.
    fn flash_main_window(&self);

    /// Nudge the main loop so it calls `ActivationStaging::take_pending`.
    fn wake_main(&self);

    /// Crash on request so the crash reporter captures a dump.
    fn raise_break(&self) {
        error!(
            event = "core.tasklist.break_requested",
            pid = std::process::id(),
        );
        std::process::abort();
    }

    fn terminate_self(&self) {
        if let Err(e) = kill(getpid(), Signal::SIGKILL) {
            error!(event = "core.tasklist.terminate_failed", error = %e);
            std::process::exit(1);
        }
    }

    /// Pid of the attached crash reporter, recorded in the table entry.
    fn salmon_pid(&self) -> Option<u32> {
        None
    }
}
