use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an instance as recorded in the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Registered, main window not created yet. Cannot accept activation.
    Starting,
    /// Main window exists; the instance accepts commands.
    Running,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
        }
    }
}

/// Command posted in the table header for one target instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Todo {
    /// Flash the main window.
    Highlight,
    /// Crash with a report.
    Break,
    /// Kill the process immediately.
    Terminate,
    /// Bring to front and apply the posted `CommandLineParams`.
    Activate,
}

impl std::fmt::Display for Todo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Todo::Highlight => write!(f, "highlight"),
            Todo::Break => write!(f, "break"),
            Todo::Terminate => write!(f, "terminate"),
            Todo::Activate => write!(f, "activate"),
        }
    }
}

impl std::str::FromStr for Todo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "highlight" => Ok(Todo::Highlight),
            "break" => Ok(Todo::Break),
            "terminate" => Ok(Todo::Terminate),
            "activate" => Ok(Todo::Activate),
            other => Err(format!(
                "unknown command '{}' (expected highlight, break, terminate or activate)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityLevel {
    Low,
    Medium,
    High,
    System,
}

/// Instances may only command siblings of the same class: same user and same
/// elevation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeClass {
    /// Hex of a 16-byte digest of the user identity.
    pub sid_hash: String,
    pub integrity_level: IntegrityLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelSide {
    Left,
    Right,
}

/// Paths and window tweaks handed from a fresh launch to a running instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLineParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_path: Option<String>,
    /// Applied to the active panel, only when neither left nor right is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate_panel: Option<PanelSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_window_icon_index: Option<u32>,
    /// Set by the requester to the command's `todo_uid`. Zero means "no request".
    #[serde(default)]
    pub request_uid: u64,
    /// Epoch milliseconds at which the request was posted.
    #[serde(default)]
    pub request_timestamp_ms: i64,
}

/// One registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessListItem {
    pub pid: u32,
    pub privilege: PrivilegeClass,
    pub state: ProcessState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_window: Option<u64>,
    /// Crash reporter attached to this instance, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salmon_pid: Option<u32>,
    pub start_time: DateTime<Utc>,
    /// Epoch milliseconds of the last liveness heartbeat.
    pub heartbeat_ms: i64,
    pub control_socket: PathBuf,
}

/// The shared process table: header plus items.
///
/// Persisted as JSON and only read or written while holding the table lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessList {
    pub version: u32,
    /// Bumped on every membership change so readers can cheaply detect changes.
    pub items_state_uid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo: Option<Todo>,
    /// Pid of the only instance allowed to execute `todo`.
    #[serde(default)]
    pub target_pid: u32,
    /// Sequence number of the posted command.
    #[serde(default)]
    pub todo_uid: u64,
    #[serde(default)]
    pub todo_timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line_params: Option<CommandLineParams>,
    #[serde(default)]
    pub items: Vec<ProcessListItem>,
}

impl Default for ProcessList {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            items_state_uid: 0,
            todo: None,
            target_pid: 0,
            todo_uid: 0,
            todo_timestamp_ms: 0,
            command_line_params: None,
            items: Vec::new(),
        }
    }
}

impl ProcessList {
    pub const VERSION: u32 = 1;

    pub fn find(&self, pid: u32) -> Option<&ProcessListItem> {
        self.items.iter().find(|item| item.pid == pid)
    }

    pub fn find_mut(&mut self, pid: u32) -> Option<&mut ProcessListItem> {
        self.items.iter_mut().find(|item| item.pid == pid)
    }

    /// Post a command for `target_pid` and return its new `todo_uid`.
    ///
    /// For `Todo::Activate` the params are stamped with the uid and timestamp
    /// so the target's main thread can validate them independently.
    pub fn post_todo(
        &mut self,
        todo: Todo,
        target_pid: u32,
        now_ms: i64,
        params: Option<CommandLineParams>,
    ) -> u64 {
        self.todo = Some(todo);
        self.todo_uid += 1;
        self.todo_timestamp_ms = now_ms;
        self.target_pid = target_pid;
        let uid = self.todo_uid;
        self.command_line_params = params.map(|mut p| {
            p.request_uid = uid;
            p.request_timestamp_ms = now_ms;
            p
        });
        uid
    }

    /// Whether the posted command is too old to execute.
    pub fn is_todo_expired(&self, now_ms: i64, timeout_ms: i64) -> bool {
        now_ms - self.todo_timestamp_ms >= timeout_ms
    }
}
