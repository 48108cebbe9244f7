//! Hand-off of activation params from the control thread to the main thread.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use salamander_protocol::CommandLineParams;
use tracing::debug;

#[derive(Debug, Default)]
struct Slot {
    params: Option<CommandLineParams>,
    processed: bool,
}

/// Params staged by the control thread, consumed by the main thread at its
/// idle point.
#[derive(Debug)]
pub struct ActivationStaging {
    slot: Mutex<Slot>,
    consumed: Condvar,
    todo_timeout: Duration,
}

impl ActivationStaging {
    pub fn new(todo_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            consumed: Condvar::new(),
            todo_timeout,
        }
    }

    fn guard(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the staged params and reset the processed flag.
    pub fn stage(&self, params: CommandLineParams) {
        let mut slot = self.guard();
        slot.params = Some(params);
        slot.processed = false;
    }

    /// Block until the main thread consumes the staged params or `timeout`
    /// elapses. Returns whether they were consumed.
    pub fn wait_processed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.guard();
        while !slot.processed {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            slot = self
                .consumed
                .wait_timeout(slot, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        slot.processed
    }

    /// Close the request: zero its uid so a late main thread ignores it.
    /// Returns whether it was consumed before closing.
    pub fn finish_request(&self) -> bool {
        let mut slot = self.guard();
        if let Some(params) = slot.params.as_mut() {
            params.request_uid = 0;
        }
        slot.processed
    }

    /// Main-thread side. Returns the staged params when they carry a live
    /// request newer than `last_seen_uid`, and marks them processed.
    pub fn take_pending(&self, last_seen_uid: u64, now_ms: i64) -> Option<CommandLineParams> {
        let mut slot = self.guard();
        let params = slot.params.as_ref()?;
        let uid = params.request_uid;
        if uid == 0 || uid <= last_seen_uid {
            return None;
        }
        let timeout_ms = self.todo_timeout.as_millis() as i64;
        if now_ms - params.request_timestamp_ms >= timeout_ms {
            debug!(
                event = "core.tasklist.staging.request_expired",
                request_uid = uid,
            );
            return None;
        }

        let taken = params.clone();
        slot.processed = true;
        self.consumed.notify_all();
        debug!(
            event = "core.tasklist.staging.request_taken",
            request_uid = uid,
        );
        Some(taken)
    }

    /// Copy of the staged params, if any.
    pub fn snapshot(&self) -> Option<CommandLineParams> {
        self.guard().params.clone()
    }
}
