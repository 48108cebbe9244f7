//! Requester side: posting commands to other instances and waiting for them.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use salamander_config::TaskListConfig;
use salamander_paths::SalamanderPaths;
use salamander_protocol::{
    CommandLineParams, ControlReply, ControlRequest, IpcConnection, IpcError, ProcessListItem,
    ProcessState, Todo,
};
use tracing::{debug, info, warn};

use crate::tasklist::errors::TaskListError;
use crate::tasklist::identity::Identity;
use crate::tasklist::liveness::{Liveness, SignalLiveness};
use crate::tasklist::now_ms;
use crate::tasklist::table::{TableStore, sweep_dead};
use crate::tasklist::{Delivery, ItemsSnapshot};

const ACTIVATE_LOCK_TIMEOUT: Duration = Duration::from_millis(200);
const STARTING_RETRY: Duration = Duration::from_millis(200);
const ACTIVATE_REPLY_SLACK: Duration = Duration::from_millis(500);

/// Reads the table and sends commands. Needs no registration of its own, so
/// tools that only inspect or poke instances can use it directly.
pub struct TaskListClient {
    identity: Identity,
    config: TaskListConfig,
    store: TableStore,
    liveness: Arc<dyn Liveness>,
}

impl TaskListClient {
    pub fn new(paths: &SalamanderPaths, config: TaskListConfig) -> Self {
        Self::with_identity(paths, config, Identity::current(), Arc::new(SignalLiveness))
    }

    pub fn with_identity(
        paths: &SalamanderPaths,
        config: TaskListConfig,
        identity: Identity,
        liveness: Arc<dyn Liveness>,
    ) -> Self {
        Self {
            identity,
            config,
            store: TableStore::new(paths),
            liveness,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &TaskListConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &TableStore {
        &self.store
    }

    pub(crate) fn liveness(&self) -> &dyn Liveness {
        self.liveness.as_ref()
    }

    pub(crate) fn expiry_ms(&self) -> i64 {
        self.config.heartbeat_expiry().as_millis() as i64
    }

    /// Registered instances, after dropping dead ones.
    pub fn items(&self) -> Result<ItemsSnapshot, TaskListError> {
        let own_pid = self.identity.pid;
        let expiry_ms = self.expiry_ms();
        self.store.update(self.config.todo_timeout(), |list| {
            sweep_dead(list, self.liveness(), own_pid, now_ms(), expiry_ms);
            ItemsSnapshot {
                items: list.items.clone(),
                items_state_uid: list.items_state_uid,
            }
        })
    }

    /// Post `todo` for `pid` and wait briefly for it to be processed.
    pub fn fire_event(&self, todo: Todo, pid: u32) -> Result<Delivery, TaskListError> {
        let now = now_ms();
        let posted = self
            .store
            .update(self.config.fire_lock_timeout(), |list| {
                let target = list.find(pid).cloned()?;
                let todo_uid = list.post_todo(todo, pid, now, None);
                Some((target, todo_uid))
            });
        let (target, todo_uid) = match posted {
            Ok(Some(posted)) => posted,
            Ok(None) => {
                info!(
                    event = "core.tasklist.fire_target_missing",
                    todo = %todo,
                    pid = pid,
                );
                return Ok(Delivery::NoResponder);
            }
            Err(e) if e.is_timeout() => {
                warn!(event = "core.tasklist.fire_lock_timed_out", todo = %todo, pid = pid);
                return Ok(Delivery::TimedOut);
            }
            Err(e) => return Err(e),
        };

        if todo == Todo::Break {
            self.allow_set_foreground(target.pid);
            if let Some(salmon_pid) = target.salmon_pid {
                self.allow_set_foreground(salmon_pid);
            }
        }

        info!(
            event = "core.tasklist.fire_started",
            todo = %todo,
            pid = pid,
            todo_uid = todo_uid,
        );
        let delivery = self.wake(&target, todo_uid, self.config.fire_reply_timeout());
        info!(
            event = "core.tasklist.fire_completed",
            todo = %todo,
            pid = pid,
            delivery = %delivery,
        );
        Ok(delivery)
    }

    /// Hand `params` to a running sibling of the same privilege class.
    ///
    /// Returns `Delivery::NoResponder` at once when no sibling exists. A sibling
    /// still `Starting` is waited for up to `todo_timeout`.
    pub fn activate_running_instance(
        &self,
        params: &CommandLineParams,
    ) -> Result<Delivery, TaskListError> {
        let todo_timeout = self.config.todo_timeout();
        let started = Instant::now();

        let posted = loop {
            let attempt = self.store.update(ACTIVATE_LOCK_TIMEOUT, |list| {
                let now = now_ms();
                sweep_dead(list, self.liveness(), self.identity.pid, now, self.expiry_ms());
                match self.pick_sibling(&list.items) {
                    Sibling::Running(target) => {
                        let todo_uid =
                            list.post_todo(Todo::Activate, target.pid, now, Some(params.clone()));
                        Sibling::Posted(target, todo_uid)
                    }
                    other => other,
                }
            });

            match attempt {
                Ok(Sibling::Posted(target, todo_uid)) => break (target, todo_uid),
                Ok(Sibling::None) => {
                    debug!(event = "core.tasklist.activate_no_sibling");
                    return Ok(Delivery::NoResponder);
                }
                Ok(Sibling::Starting | Sibling::Running(_)) => {
                    debug!(event = "core.tasklist.activate_waiting_for_starting");
                }
                Err(e) if e.is_timeout() => {
                    debug!(event = "core.tasklist.activate_lock_busy");
                }
                Err(e) => return Err(e),
            }

            if started.elapsed() >= todo_timeout {
                info!(event = "core.tasklist.activate_timed_out");
                return Ok(Delivery::TimedOut);
            }
            std::thread::sleep(STARTING_RETRY);
        };

        let (target, todo_uid) = posted;
        self.allow_set_foreground(target.pid);
        info!(
            event = "core.tasklist.activate_started",
            pid = target.pid,
            todo_uid = todo_uid,
        );
        let delivery = self.wake(&target, todo_uid, todo_timeout + ACTIVATE_REPLY_SLACK);
        info!(
            event = "core.tasklist.activate_completed",
            pid = target.pid,
            delivery = %delivery,
        );
        Ok(delivery)
    }

    fn pick_sibling(&self, items: &[ProcessListItem]) -> Sibling {
        let siblings = items
            .iter()
            .filter(|item| item.pid != self.identity.pid)
            .filter(|item| self.identity.same_class(&item.privilege));
        let mut starting = false;
        for item in siblings {
            match item.state {
                ProcessState::Running => return Sibling::Running(item.clone()),
                ProcessState::Starting => starting = true,
            }
        }
        if starting {
            Sibling::Starting
        } else {
            Sibling::None
        }
    }

    /// Wake `target` and wait up to `timeout` for its verdict on `todo_uid`.
    fn wake(&self, target: &ProcessListItem, todo_uid: u64, timeout: Duration) -> Delivery {
        wake_socket(&target.control_socket, todo_uid, timeout)
    }

    /// Permit `pid` to take the foreground. Window managers here have no such
    /// grant, so this only records the intent.
    fn allow_set_foreground(&self, pid: u32) {
        debug!(event = "core.tasklist.allow_set_foreground", pid = pid);
    }
}

enum Sibling {
    None,
    Starting,
    Running(ProcessListItem),
    Posted(ProcessListItem, u64),
}

fn wake_socket(socket: &Path, todo_uid: u64, timeout: Duration) -> Delivery {
    let request = ControlRequest::Wake {
        id: uuid::Uuid::new_v4().to_string(),
        todo_uid,
    };
    let result = IpcConnection::connect(socket, timeout).and_then(|mut conn| conn.send(&request));
    match result {
        Ok(ControlReply::Processed { .. }) => Delivery::Processed,
        Ok(ControlReply::Ignored { reason, .. }) => Delivery::Ignored(reason),
        Ok(ControlReply::Expired { .. }) => Delivery::Expired,
        Ok(other) => {
            warn!(event = "core.tasklist.wake_unexpected_reply", reply = ?other);
            Delivery::NoResponder
        }
        Err(IpcError::NoResponder { path }) => {
            debug!(event = "core.tasklist.wake_no_responder", path = %path);
            Delivery::NoResponder
        }
        Err(IpcError::TimedOut) => Delivery::TimedOut,
        Err(e) => {
            warn!(event = "core.tasklist.wake_failed", error = %e);
            Delivery::NoResponder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasklist::table::append_item;
    use crate::tasklist::testing::{item, paths_in, FixedLiveness};
    use salamander_protocol::{IntegrityLevel, PrivilegeClass};

    fn client(dir: &Path, pid: u32) -> TaskListClient {
        TaskListClient::with_identity(
            &paths_in(dir),
            TaskListConfig {
                todo_timeout_ms: Some(600),
                ..Default::default()
            },
            Identity {
                pid,
                privilege: item(pid).privilege,
            },
            Arc::new(FixedLiveness::dead(&[])),
        )
    }

    fn seed(client: &TaskListClient, items: Vec<ProcessListItem>) {
        client
            .store()
            .update(Duration::from_millis(200), |list| {
                for entry in items {
                    append_item(list, entry, 10).unwrap();
                }
            })
            .unwrap();
    }

    #[test]
    fn test_pick_sibling_prefers_running_same_class() {
        let dir = tempfile::tempdir().unwrap();
        let me = client(dir.path(), 1);

        let mut starting = item(2);
        starting.state = ProcessState::Starting;
        let mut foreign = item(3);
        foreign.state = ProcessState::Running;
        foreign.privilege = PrivilegeClass {
            sid_hash: "ff".repeat(16),
            integrity_level: IntegrityLevel::Medium,
        };
        let mut running = item(4);
        running.state = ProcessState::Running;
        let mut own = item(1);
        own.state = ProcessState::Running;

        let picked = me.pick_sibling(&[own.clone(), starting.clone(), foreign.clone(), running]);
        assert!(matches!(picked, Sibling::Running(ref target) if target.pid == 4));
        let picked = me.pick_sibling(&[own.clone(), starting, foreign.clone()]);
        assert!(matches!(picked, Sibling::Starting));
        let picked = me.pick_sibling(&[own, foreign]);
        assert!(matches!(picked, Sibling::None));
    }

    #[test]
    fn test_activate_without_sibling_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let me = client(dir.path(), 1);
        let start = Instant::now();
        let delivery = me
            .activate_running_instance(&CommandLineParams::default())
            .unwrap();
        assert_eq!(delivery, Delivery::NoResponder);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_activate_waits_for_starting_then_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let me = client(dir.path(), 1);
        let mut starting = item(2);
        starting.state = ProcessState::Starting;
        starting.heartbeat_ms = now_ms() + 60_000;
        seed(&me, vec![starting]);

        let start = Instant::now();
        let delivery = me
            .activate_running_instance(&CommandLineParams::default())
            .unwrap();
        assert_eq!(delivery, Delivery::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(600));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_fire_at_unregistered_pid() {
        let dir = tempfile::tempdir().unwrap();
        let me = client(dir.path(), 1);
        let delivery = me.fire_event(Todo::Break, 999).unwrap();
        assert_eq!(delivery, Delivery::NoResponder);
        // Nothing was posted
        let list = me.store().read(Duration::from_millis(200)).unwrap();
        assert_eq!(list.todo_uid, 0);
    }

    #[test]
    fn test_fire_at_entry_without_listener() {
        let dir = tempfile::tempdir().unwrap();
        let me = client(dir.path(), 1);
        let mut target = item(2);
        target.heartbeat_ms = now_ms();
        target.control_socket = dir.path().join("2.sock");
        seed(&me, vec![target]);

        let delivery = me.fire_event(Todo::Highlight, 2).unwrap();
        assert_eq!(delivery, Delivery::NoResponder);
        let list = me.store().read(Duration::from_millis(200)).unwrap();
        assert_eq!(list.todo, Some(Todo::Highlight));
        assert_eq!(list.target_pid, 2);
    }

    #[test]
    fn test_items_sweeps_dead() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let me = TaskListClient::with_identity(
            &paths,
            TaskListConfig::default(),
            Identity {
                pid: 1,
                privilege: item(1).privilege,
            },
            Arc::new(FixedLiveness::dead(&[3])),
        );
        let now = now_ms();
        let entries = [2, 3]
            .into_iter()
            .map(|pid| {
                let mut entry = item(pid);
                entry.heartbeat_ms = now;
                entry
            })
            .collect();
        seed(&me, entries);

        let snapshot = me.items().unwrap();
        let pids: Vec<u32> = snapshot.items.iter().map(|i| i.pid).collect();
        assert_eq!(pids, vec![2]);
        assert_eq!(snapshot.items_state_uid, 3);
    }
}
