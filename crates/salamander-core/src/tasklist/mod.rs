//! Cross-process registry of running instances.
//!
//! Every instance registers itself in a shared table (`processlist.json`,
//! guarded by `flock`) and serves a control socket. Another instance posts a
//! command in the table header and wakes the target through its socket; the
//! target's control thread executes it and answers.

mod codec;
mod control;
mod errors;
mod host;
mod identity;
mod liveness;
mod lock;
mod requester;
mod staging;
mod table;

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use salamander_config::TaskListConfig;
use salamander_paths::SalamanderPaths;
use salamander_protocol::{
    CommandLineParams, IgnoreReason, ProcessListItem, ProcessState, Todo,
};
use tracing::{info, warn};

use crate::tasklist::control::{ControlContext, ControlServer};
use crate::tasklist::table::{append_item, remove_item, sweep_dead};

pub use errors::TaskListError;
pub use host::InstanceHost;
pub use identity::{Identity, current_privilege};
pub use liveness::{Liveness, SignalLiveness};
pub use lock::TableLock;
pub use requester::TaskListClient;
pub use staging::ActivationStaging;
pub use table::TableStore;

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// How a command sent to another instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The target executed the command.
    Processed,
    /// No answer within the wait bound, or the table lock was busy.
    TimedOut,
    /// No such instance, or nobody listening on its socket.
    NoResponder,
    /// The target answered but did not execute.
    Ignored(IgnoreReason),
    /// The target saw the command only after it expired.
    Expired,
}

impl Delivery {
    pub fn is_processed(&self) -> bool {
        matches!(self, Delivery::Processed)
    }
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Processed => write!(f, "processed"),
            Delivery::TimedOut => write!(f, "timed_out"),
            Delivery::NoResponder => write!(f, "no_responder"),
            Delivery::Ignored(reason) => write!(f, "ignored ({})", reason),
            Delivery::Expired => write!(f, "expired"),
        }
    }
}

/// Registered instances at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsSnapshot {
    pub items: Vec<ProcessListItem>,
    /// Changes whenever membership changes.
    pub items_state_uid: u64,
}

/// This process's registration plus its control thread.
///
/// Dropping it stops the control thread and removes the entry.
pub struct TaskList {
    client: TaskListClient,
    staging: Arc<ActivationStaging>,
    entry: Arc<Mutex<ProcessListItem>>,
    control: Option<ControlServer>,
    first_instance: bool,
    registered: bool,
}

impl TaskList {
    /// Register this process and start serving commands.
    pub fn init(
        paths: &SalamanderPaths,
        config: TaskListConfig,
        host: Arc<dyn InstanceHost>,
    ) -> Result<Self, TaskListError> {
        Self::init_with(
            paths,
            config,
            Identity::current(),
            host,
            Arc::new(SignalLiveness),
        )
    }

    /// `init` with an explicit identity and liveness check.
    pub fn init_with(
        paths: &SalamanderPaths,
        config: TaskListConfig,
        identity: Identity,
        host: Arc<dyn InstanceHost>,
        liveness: Arc<dyn Liveness>,
    ) -> Result<Self, TaskListError> {
        let pid = identity.pid;
        info!(event = "core.tasklist.register_started", pid = pid);

        let client = TaskListClient::with_identity(paths, config.clone(), identity, liveness);
        let socket_path = paths.control_socket(pid);
        let entry = ProcessListItem {
            pid,
            privilege: client.identity().privilege.clone(),
            state: ProcessState::Starting,
            main_window: None,
            salmon_pid: host.salmon_pid(),
            start_time: Utc::now(),
            heartbeat_ms: now_ms(),
            control_socket: socket_path.clone(),
        };

        let max_items = config.max_items();
        let expiry_ms = client.expiry_ms();
        let (first_instance, seen_todo_uid) =
            client.store().update(config.todo_timeout(), |list| {
                if let Err(TaskListError::TableFull { .. }) =
                    append_item(list, entry.clone(), max_items)
                {
                    sweep_dead(list, client.liveness(), pid, now_ms(), expiry_ms);
                    append_item(list, entry.clone(), max_items)?;
                }
                let first = !list
                    .items
                    .iter()
                    .any(|item| item.pid != pid && item.privilege == entry.privilege);
                Ok::<_, TaskListError>((first, list.todo_uid))
            })??;

        let staging = Arc::new(ActivationStaging::new(config.todo_timeout()));
        let entry = Arc::new(Mutex::new(entry));
        let ctx = Arc::new(ControlContext {
            identity: client.identity().clone(),
            store: client.store().clone(),
            config,
            staging: Arc::clone(&staging),
            host,
            entry: Arc::clone(&entry),
        });
        let mut tasklist = Self {
            client,
            staging,
            entry,
            control: None,
            first_instance,
            registered: true,
        };
        // On failure the drop of `tasklist` removes the entry again
        tasklist.control = Some(ControlServer::start(ctx, socket_path, seen_todo_uid)?);

        info!(
            event = "core.tasklist.register_completed",
            pid = pid,
            first_instance = first_instance,
        );
        Ok(tasklist)
    }

    pub fn pid(&self) -> u32 {
        self.client.identity().pid
    }

    /// Whether no other instance of the same privilege class was registered
    /// when this one joined.
    pub fn is_first_instance(&self) -> bool {
        self.first_instance
    }

    /// The hand-off the main thread polls for activation params.
    pub fn staging(&self) -> &Arc<ActivationStaging> {
        &self.staging
    }

    pub fn client(&self) -> &TaskListClient {
        &self.client
    }

    pub fn control_socket(&self) -> Option<&Path> {
        self.control.as_ref().map(|control| control.socket_path())
    }

    /// Record a lifecycle change of this instance. Returns `Ok(false)` when
    /// the table lock could not be taken in time.
    ///
    /// If the entry went missing from the table it is added back.
    pub fn set_process_state(
        &self,
        state: ProcessState,
        main_window: Option<u64>,
    ) -> Result<bool, TaskListError> {
        let pid = self.pid();
        if !self.registered {
            return Err(TaskListError::NotRegistered(pid));
        }
        let now = now_ms();
        let entry = {
            let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
            entry.state = state;
            entry.main_window = main_window;
            entry.heartbeat_ms = now;
            entry.clone()
        };
        let max_items = self.client.config().max_items();
        let result = self
            .client
            .store()
            .update(self.client.config().todo_timeout(), |list| {
                match list.find_mut(pid) {
                    Some(item) => {
                        item.state = state;
                        item.main_window = main_window;
                        item.heartbeat_ms = now;
                        Ok(())
                    }
                    None => {
                        warn!(event = "core.tasklist.state_change_entry_restored", pid = pid);
                        append_item(list, entry, max_items)
                    }
                }
            });
        match result {
            Ok(Ok(())) => {
                info!(event = "core.tasklist.state_changed", pid = pid, state = %state);
                Ok(true)
            }
            Ok(Err(e)) => Err(e),
            Err(e) if e.is_timeout() => {
                warn!(event = "core.tasklist.state_change_timed_out", pid = pid);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn items(&self) -> Result<ItemsSnapshot, TaskListError> {
        self.client.items()
    }

    pub fn fire_event(&self, todo: Todo, pid: u32) -> Result<Delivery, TaskListError> {
        self.client.fire_event(todo, pid)
    }

    pub fn activate_running_instance(
        &self,
        params: &CommandLineParams,
    ) -> Result<Delivery, TaskListError> {
        self.client.activate_running_instance(params)
    }

    /// Stop the control thread and deregister. Safe to call twice.
    pub fn shutdown(&mut self) {
        if let Some(mut control) = self.control.take() {
            control.stop();
        }
        if !self.registered {
            return;
        }
        self.registered = false;

        let pid = self.pid();
        let result = self
            .client
            .store()
            .update(self.client.config().todo_timeout(), |list| {
                remove_item(list, pid)
            });
        match result {
            Ok(_) => info!(event = "core.tasklist.deregister_completed", pid = pid),
            Err(e) => warn!(event = "core.tasklist.deregister_failed", pid = pid, error = %e),
        }
    }
}

impl Drop for TaskList {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use salamander_paths::SalamanderPaths;
    use salamander_protocol::{IntegrityLevel, PrivilegeClass, ProcessListItem, ProcessState};

    use super::{InstanceHost, Liveness};

    pub fn paths_in(dir: &Path) -> SalamanderPaths {
        SalamanderPaths::from_dir(dir.to_path_buf())
    }

    pub fn item(pid: u32) -> ProcessListItem {
        ProcessListItem {
            pid,
            privilege: PrivilegeClass {
                sid_hash: "ab".repeat(16),
                integrity_level: IntegrityLevel::Medium,
            },
            state: ProcessState::Starting,
            main_window: None,
            salmon_pid: None,
            start_time: Utc::now(),
            heartbeat_ms: 0,
            control_socket: PathBuf::from(format!("/nonexistent/{pid}.sock")),
        }
    }

    pub struct FixedLiveness {
        dead: HashSet<u32>,
    }

    impl FixedLiveness {
        pub fn dead(pids: &[u32]) -> Self {
            Self {
                dead: pids.iter().copied().collect(),
            }
        }
    }

    impl Liveness for FixedLiveness {
        fn is_alive(&self, pid: u32) -> bool {
            !self.dead.contains(&pid)
        }
    }

    #[derive(Default)]
    pub struct RecordingHost {
        flashes: AtomicUsize,
        wakes: AtomicUsize,
    }

    impl RecordingHost {
        pub fn flashes(&self) -> usize {
            self.flashes.load(Ordering::SeqCst)
        }

        pub fn wakes(&self) -> usize {
            self.wakes.load(Ordering::SeqCst)
        }
    }

    impl InstanceHost for RecordingHost {
        fn flash_main_window(&self) {
            self.flashes.fetch_add(1, Ordering::SeqCst);
        }

        fn wake_main(&self) {
            self.wakes.fetch_add(1, Ordering::SeqCst);
        }

        fn raise_break(&self) {}

        fn terminate_self(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FixedLiveness, RecordingHost, item, paths_in};
    use super::*;
    use std::time::Duration;

    fn register(dir: &Path, pid: u32, config: TaskListConfig) -> Result<TaskList, TaskListError> {
        TaskList::init_with(
            &paths_in(dir),
            config,
            Identity {
                pid,
                privilege: item(pid).privilege,
            },
            Arc::new(RecordingHost::default()),
            Arc::new(FixedLiveness::dead(&[])),
        )
    }

    #[test]
    fn test_first_instance_detection() {
        let dir = tempfile::tempdir().unwrap();
        let a = register(dir.path(), 9001, TaskListConfig::default()).unwrap();
        let b = register(dir.path(), 9002, TaskListConfig::default()).unwrap();
        assert!(a.is_first_instance());
        assert!(!b.is_first_instance());
        assert!(a.control_socket().unwrap().exists());
    }

    #[test]
    fn test_state_change_and_deregister() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = register(dir.path(), 9011, TaskListConfig::default()).unwrap();
        assert!(a.set_process_state(ProcessState::Running, Some(77)).unwrap());

        let snapshot = a.items().unwrap();
        let me = snapshot.items.iter().find(|i| i.pid == 9011).unwrap();
        assert_eq!(me.state, ProcessState::Running);
        assert_eq!(me.main_window, Some(77));

        let socket = a.control_socket().unwrap().to_path_buf();
        a.shutdown();
        a.shutdown();
        assert!(!socket.exists());

        let store = TableStore::new(&paths_in(dir.path()));
        let list = store.read(Duration::from_millis(200)).unwrap();
        assert!(list.find(9011).is_none());
    }

    #[test]
    fn test_state_change_restores_evicted_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = register(dir.path(), 9041, TaskListConfig::default()).unwrap();
        let store = TableStore::new(&paths_in(dir.path()));
        store
            .update(Duration::from_millis(200), |list| remove_item(list, 9041))
            .unwrap();

        assert!(a.set_process_state(ProcessState::Running, Some(5)).unwrap());
        let list = store.read(Duration::from_millis(200)).unwrap();
        let me = list.find(9041).unwrap();
        assert_eq!(me.state, ProcessState::Running);
        assert_eq!(me.main_window, Some(5));

        a.shutdown();
        let err = a.set_process_state(ProcessState::Running, None).err().unwrap();
        assert!(matches!(err, TaskListError::NotRegistered(9041)));
    }

    #[test]
    fn test_full_table_sweeps_once_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskListConfig {
            max_items: Some(1),
            ..Default::default()
        };
        let _a = register(dir.path(), 9021, config.clone()).unwrap();
        let err = register(dir.path(), 9022, config).err().unwrap();
        assert!(matches!(err, TaskListError::TableFull { max_items: 1 }));
    }

    #[test]
    fn test_state_change_timeout_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskListConfig {
            todo_timeout_ms: Some(50),
            ..Default::default()
        };
        let a = register(dir.path(), 9031, config).unwrap();
        let store = TableStore::new(&paths_in(dir.path()));
        let _held = store.lock(Duration::from_millis(200)).unwrap();
        assert!(!a.set_process_state(ProcessState::Running, None).unwrap());
    }

    #[test]
    fn test_delivery_display() {
        assert_eq!(Delivery::NoResponder.to_string(), "no_responder");
        assert_eq!(
            Delivery::Ignored(IgnoreReason::NotConsumed).to_string(),
            "ignored (not_consumed)"
        );
        assert!(Delivery::Processed.is_processed());
        assert!(!Delivery::Expired.is_processed());
    }
}
