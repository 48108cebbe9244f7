//! Event loop that owns one panel's refresher and host.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, info};

use crate::clock::TimeCounter;
use crate::refresh::errors::RefreshError;
use crate::refresh::host::PanelHost;
use crate::refresh::machine::PanelRefresher;
use crate::refresh::types::PanelEvent;

/// Cloneable sender for a panel's event loop.
///
/// Every refresh request it sends is stamped from the shared counter at send
/// time.
#[derive(Debug, Clone)]
pub struct PanelHandle {
    tx: Sender<PanelEvent>,
    counter: Arc<TimeCounter>,
}

impl PanelHandle {
    /// Create a handle and the receiver the driver consumes.
    pub fn channel(counter: Arc<TimeCounter>) -> (Self, Receiver<PanelEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx, counter }, rx)
    }

    pub fn send(&self, event: PanelEvent) -> Result<(), RefreshError> {
        self.tx.send(event).map_err(|_| RefreshError::DriverGone)
    }

    pub fn changed(&self, from_watcher: bool) -> Result<(), RefreshError> {
        self.send(PanelEvent::Changed {
            stamp: self.counter.next(),
            from_watcher,
        })
    }

    pub fn refresh_dir_ex(&self, slow: bool) -> Result<(), RefreshError> {
        self.send(PanelEvent::RefreshDirEx {
            stamp: self.counter.next(),
            slow,
        })
    }

    pub fn suspended_change(&self) -> Result<(), RefreshError> {
        self.send(PanelEvent::SuspendedChange {
            stamp: self.counter.next(),
        })
    }

    pub fn shutdown(&self) -> Result<(), RefreshError> {
        self.send(PanelEvent::Shutdown)
    }
}

pub struct PanelDriver<H: PanelHost> {
    refresher: PanelRefresher,
    host: H,
    events: Receiver<PanelEvent>,
}

impl<H: PanelHost> PanelDriver<H> {
    pub fn new(refresher: PanelRefresher, host: H, events: Receiver<PanelEvent>) -> Self {
        Self {
            refresher,
            host,
            events,
        }
    }

    /// Run until `Shutdown` arrives or every sender is dropped. Returns the host.
    pub fn run(mut self) -> H {
        debug!(event = "core.refresh.driver.loop_started");
        loop {
            self.refresher.fire_due_timers(Instant::now(), &mut self.host);

            let received = match self.refresher.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.events.recv_timeout(wait) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.events.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            if received == PanelEvent::Shutdown {
                break;
            }
            self.refresher
                .handle(received, Instant::now(), &mut self.host);
        }
        debug!(event = "core.refresh.driver.loop_completed");
        self.host
    }
}

impl<H: PanelHost + Send + 'static> PanelDriver<H> {
    /// Run the loop on a dedicated named thread.
    pub fn spawn(self, name: &str) -> Result<JoinHandle<H>, RefreshError> {
        let handle = std::thread::Builder::new()
            .name(format!("panel-{}", name))
            .spawn(move || self.run())?;
        info!(event = "core.refresh.driver.spawn_completed", panel = name);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::types::RefreshRequest;
    use salamander_config::RefreshConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHost {
        refreshes: Arc<Mutex<Vec<RefreshRequest>>>,
    }

    impl PanelHost for RecordingHost {
        fn is_suspended(&self) -> bool {
            false
        }

        fn is_foreground(&self) -> bool {
            true
        }

        fn location(&self) -> String {
            "/tmp".to_string()
        }

        fn refresh_directory(&mut self, request: RefreshRequest) -> Result<(), RefreshError> {
            self.refreshes.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn spawn_driver() -> (PanelHandle, JoinHandle<RecordingHost>, Arc<Mutex<Vec<RefreshRequest>>>) {
        let counter = Arc::new(TimeCounter::new());
        let (handle, rx) = PanelHandle::channel(counter.clone());
        let host = RecordingHost::default();
        let refreshes = host.refreshes.clone();
        let refresher = PanelRefresher::new(counter, RefreshConfig::default(), Instant::now());
        let join = PanelDriver::new(refresher, host, rx).spawn("test").unwrap();
        (handle, join, refreshes)
    }

    #[test]
    fn test_driver_fires_delayed_refresh() {
        let (handle, join, refreshes) = spawn_driver();

        for _ in 0..3 {
            handle.refresh_dir_ex(false).unwrap();
        }
        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(refreshes.lock().unwrap().len(), 1);

        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[test]
    fn test_driver_stops_when_senders_dropped() {
        let (handle, join, refreshes) = spawn_driver();
        handle.changed(false).unwrap();
        drop(handle);

        let host = join.join().unwrap();
        assert_eq!(host.refreshes.lock().unwrap().len(), 1);
        assert_eq!(refreshes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_send_after_shutdown_reports_driver_gone() {
        let (handle, join, _) = spawn_driver();
        handle.shutdown().unwrap();
        join.join().unwrap();

        assert!(matches!(handle.changed(true), Err(RefreshError::DriverGone)));
    }
}
