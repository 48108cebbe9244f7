use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::tasklist::errors::TaskListError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock on the process table. Released on drop.
///
/// `flock` is tied to the open file description, so two holders inside one
/// process exclude each other just like two processes do.
#[derive(Debug)]
pub struct TableLock {
    _flock: Flock<File>,
}

impl TableLock {
    /// Poll a non-blocking `flock` until it succeeds or `timeout` elapses.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self, TaskListError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;

        let start = Instant::now();
        loop {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(flock) => return Ok(Self { _flock: flock }),
                Err((returned, Errno::EWOULDBLOCK)) => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        debug!(
                            event = "core.tasklist.lock_timed_out",
                            waited_ms = waited.as_millis() as u64,
                        );
                        return Err(TaskListError::LockTimeout {
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    file = returned;
                    std::thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err((_, errno)) => return Err(TaskListError::Lock(errno)),
            }
        }
    }
}
