//! Persistent process table: a JSON file guarded by `TableLock`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use salamander_paths::SalamanderPaths;
use salamander_protocol::{ProcessList, ProcessListItem};
use tracing::{debug, info, warn};

use crate::tasklist::errors::TaskListError;
use crate::tasklist::liveness::Liveness;
use crate::tasklist::lock::TableLock;

#[derive(Debug, Clone)]
pub struct TableStore {
    table_path: PathBuf,
    lock_path: PathBuf,
}

impl TableStore {
    pub fn new(paths: &SalamanderPaths) -> Self {
        Self {
            table_path: paths.tasklist_file(),
            lock_path: paths.tasklist_lock(),
        }
    }

    pub fn lock(&self, timeout: Duration) -> Result<TableLock, TaskListError> {
        TableLock::acquire(&self.lock_path, timeout)
    }

    /// Read the table. Caller must hold the lock.
    ///
    /// A missing or empty file is a fresh table. An unreadable one is reset:
    /// the table only describes live processes, which re-register on start.
    pub fn load(&self, _lock: &TableLock) -> Result<ProcessList, TaskListError> {
        let content = match fs::read_to_string(&self.table_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProcessList::default());
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(ProcessList::default());
        }

        match serde_json::from_str::<ProcessList>(&content) {
            Ok(list) if list.version == ProcessList::VERSION => Ok(list),
            Ok(list) => {
                warn!(
                    event = "core.tasklist.table_version_mismatch",
                    found = list.version,
                    expected = ProcessList::VERSION,
                );
                Ok(ProcessList::default())
            }
            Err(e) => {
                warn!(
                    event = "core.tasklist.table_corrupt",
                    path = %self.table_path.display(),
                    error = %e,
                );
                Ok(ProcessList::default())
            }
        }
    }

    /// Write the table. Caller must hold the lock.
    ///
    /// Written to a temp file and renamed over the table, so readers see
    /// either the old or the new table, never a partial one.
    pub fn save(&self, _lock: &TableLock, list: &ProcessList) -> Result<(), TaskListError> {
        if let Some(parent) = self.table_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(list)?;
        let temp_path = self.temp_path();
        if let Err(e) = write_synced(&temp_path, content.as_bytes()) {
            cleanup_temp_file(&temp_path, &e);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &self.table_path) {
            cleanup_temp_file(&temp_path, &e);
            return Err(e.into());
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.table_path.with_extension("json.tmp")
    }

    /// Lock, load, apply `f`, and save if the table changed.
    pub fn update<R>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&mut ProcessList) -> R,
    ) -> Result<R, TaskListError> {
        let lock = self.lock(timeout)?;
        let mut list = self.load(&lock)?;
        let before = list.clone();
        let result = f(&mut list);
        if list != before {
            self.save(&lock, &list)?;
        }
        // Lock released on drop
        Ok(result)
    }

    /// Lock and load without writing back.
    pub fn read(&self, timeout: Duration) -> Result<ProcessList, TaskListError> {
        let lock = self.lock(timeout)?;
        self.load(&lock)
    }
}

fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

fn cleanup_temp_file(path: &Path, cause: &std::io::Error) {
    warn!(
        event = "core.tasklist.table_write_failed",
        path = %path.display(),
        error = %cause,
    );
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        debug!(event = "core.tasklist.temp_cleanup_failed", error = %e);
    }
}

/// Append `item`, refusing duplicates and enforcing the capacity.
pub fn append_item(
    list: &mut ProcessList,
    item: ProcessListItem,
    max_items: usize,
) -> Result<(), TaskListError> {
    if let Some(existing) = list.find_mut(item.pid) {
        // Pid reuse: the old owner is gone
        *existing = item;
        list.items_state_uid += 1;
        return Ok(());
    }
    if list.items.len() >= max_items {
        return Err(TaskListError::TableFull { max_items });
    }
    list.items.push(item);
    list.items_state_uid += 1;
    Ok(())
}

pub fn remove_item(list: &mut ProcessList, pid: u32) -> bool {
    let before = list.items.len();
    list.items.retain(|item| item.pid != pid);
    let removed = list.items.len() != before;
    if removed {
        list.items_state_uid += 1;
    }
    removed
}

/// Drop entries whose process is gone or whose heartbeat went silent.
///
/// `own_pid` is never swept. Leftover socket files of removed entries are
/// deleted. Returns the removed pids.
pub fn sweep_dead(
    list: &mut ProcessList,
    liveness: &dyn Liveness,
    own_pid: u32,
    now_ms: i64,
    expiry_ms: i64,
) -> Vec<u32> {
    let mut removed = Vec::new();
    list.items.retain(|item| {
        if item.pid == own_pid {
            return true;
        }
        let exists = liveness.is_alive(item.pid);
        let silent = now_ms - item.heartbeat_ms > expiry_ms;
        if exists && !silent {
            return true;
        }
        debug!(
            event = "core.tasklist.sweep_entry_removed",
            pid = item.pid,
            exists = exists,
            silent_ms = now_ms - item.heartbeat_ms,
        );
        if !exists
            && let Err(e) = fs::remove_file(&item.control_socket)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                event = "core.tasklist.socket_cleanup_failed",
                path = %item.control_socket.display(),
                error = %e,
            );
        }
        removed.push(item.pid);
        false
    });
    if !removed.is_empty() {
        list.items_state_uid += 1;
        info!(
            event = "core.tasklist.sweep_completed",
            removed = removed.len(),
            remaining = list.items.len(),
        );
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasklist::testing::{item, paths_in, FixedLiveness};
    use salamander_protocol::Todo;

    #[test]
    fn test_missing_table_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(&paths_in(dir.path()));
        let list = store.read(Duration::from_millis(100)).unwrap();
        assert_eq!(list, ProcessList::default());
    }

    #[test]
    fn test_corrupt_table_resets() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        fs::create_dir_all(paths.tasklist_dir()).unwrap();
        fs::write(paths.tasklist_file(), "{ not json").unwrap();

        let store = TableStore::new(&paths);
        let list = store.read(Duration::from_millis(100)).unwrap();
        assert!(list.items.is_empty());
    }

    #[test]
    fn test_update_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(&paths_in(dir.path()));

        let uid = store
            .update(Duration::from_millis(100), |list| {
                append_item(list, item(10), 5).unwrap();
                list.post_todo(Todo::Highlight, 10, 1, None)
            })
            .unwrap();
        assert_eq!(uid, 1);

        let list = store.read(Duration::from_millis(100)).unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.todo, Some(Todo::Highlight));
        assert_eq!(list.items_state_uid, 1);
    }

    #[test]
    fn test_save_replaces_table_through_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let store = TableStore::new(&paths);
        store
            .update(Duration::from_millis(100), |list| {
                append_item(list, item(10), 5).unwrap();
            })
            .unwrap();

        // Leftover of a writer killed before its rename
        let temp = paths.tasklist_dir().join("processlist.json.tmp");
        fs::write(&temp, "{ \"version\": 1, \"ite").unwrap();
        let list = store.read(Duration::from_millis(100)).unwrap();
        assert_eq!(list.items.len(), 1);

        store
            .update(Duration::from_millis(100), |list| {
                append_item(list, item(11), 5).unwrap();
            })
            .unwrap();
        assert!(!temp.exists());
        let list = store.read(Duration::from_millis(100)).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items_state_uid, 2);
    }

    #[test]
    fn test_unchanged_update_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let store = TableStore::new(&paths);
        store.update(Duration::from_millis(100), |_| ()).unwrap();
        assert!(!paths.tasklist_file().exists());
    }

    #[test]
    fn test_append_enforces_capacity() {
        let mut list = ProcessList::default();
        append_item(&mut list, item(1), 2).unwrap();
        append_item(&mut list, item(2), 2).unwrap();
        let err = append_item(&mut list, item(3), 2).unwrap_err();
        assert!(matches!(err, TaskListError::TableFull { max_items: 2 }));
        assert_eq!(list.items.len(), 2);
    }

    #[test]
    fn test_append_replaces_reused_pid() {
        let mut list = ProcessList::default();
        append_item(&mut list, item(1), 1).unwrap();
        let mut again = item(1);
        again.heartbeat_ms = 99;
        append_item(&mut list, again, 1).unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].heartbeat_ms, 99);
    }

    #[test]
    fn test_remove_bumps_state_uid_only_when_removed() {
        let mut list = ProcessList::default();
        append_item(&mut list, item(1), 5).unwrap();
        let uid = list.items_state_uid;
        assert!(!remove_item(&mut list, 2));
        assert_eq!(list.items_state_uid, uid);
        assert!(remove_item(&mut list, 1));
        assert_eq!(list.items_state_uid, uid + 1);
    }

    #[test]
    fn test_sweep_removes_dead_and_silent_but_not_self() {
        let mut list = ProcessList::default();
        for pid in [1, 2, 3, 4] {
            let mut entry = item(pid);
            entry.heartbeat_ms = 10_000;
            append_item(&mut list, entry, 10).unwrap();
        }
        list.find_mut(3).unwrap().heartbeat_ms = 1_000;
        let liveness = FixedLiveness::dead(&[2, 4]);
        let uid = list.items_state_uid;

        // pid 4 is dead but is ourselves
        let removed = sweep_dead(&mut list, &liveness, 4, 12_000, 5_000);

        assert_eq!(removed, vec![2, 3]);
        let left: Vec<u32> = list.items.iter().map(|i| i.pid).collect();
        assert_eq!(left, vec![1, 4]);
        assert_eq!(list.items_state_uid, uid + 1);
    }

    #[test]
    fn test_sweep_deletes_socket_of_dead_process() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("2.sock");
        fs::write(&socket, "").unwrap();

        let mut list = ProcessList::default();
        let mut entry = item(2);
        entry.control_socket = socket.clone();
        entry.heartbeat_ms = 0;
        append_item(&mut list, entry, 10).unwrap();

        sweep_dead(&mut list, &FixedLiveness::dead(&[2]), 1, 0, 5_000);
        assert!(!socket.exists());
    }
}
