use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Answers whether a registered pid still belongs to a running process.
pub trait Liveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Checks the pid with a null signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalLiveness;

impl Liveness for SignalLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but owned by someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(SignalLiveness.is_alive(std::process::id()));
    }

    #[test]
    fn test_reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!SignalLiveness.is_alive(pid));
    }

    #[test]
    fn test_invalid_pids() {
        assert!(!SignalLiveness.is_alive(0));
        assert!(!SignalLiveness.is_alive(u32::MAX));
    }
}
