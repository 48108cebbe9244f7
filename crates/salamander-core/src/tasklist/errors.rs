use std::io;

use salamander_paths::PathError;

/// All error types for the task list.
#[derive(Debug, thiserror::Error)]
pub enum TaskListError {
    #[error("timed out after {waited_ms}ms waiting for the process table lock")]
    LockTimeout { waited_ms: u64 },

    #[error("process table is full ({max_items} entries)")]
    TableFull { max_items: usize },

    #[error("process table is corrupt: {message}")]
    TableCorrupt { message: String },

    #[error("pid {0} is not registered in the process table")]
    NotRegistered(u32),

    #[error("failed to lock process table: {0}")]
    Lock(nix::errno::Errno),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("control thread error: {0}")]
    ControlThread(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("path error: {0}")]
    Path(#[from] PathError),
}

impl TaskListError {
    /// Error code string for control replies.
    pub fn error_code(&self) -> &'static str {
        match self {
            TaskListError::LockTimeout { .. } => "lock_timeout",
            TaskListError::TableFull { .. } => "table_full",
            TaskListError::TableCorrupt { .. } => "table_corrupt",
            TaskListError::NotRegistered(_) => "not_registered",
            TaskListError::Lock(_) => "lock_error",
            TaskListError::Protocol(_) => "protocol_error",
            TaskListError::ControlThread(_) => "control_thread_error",
            TaskListError::Io(_) => "io_error",
            TaskListError::Serde(_) => "serialization_error",
            TaskListError::Path(_) => "path_error",
        }
    }

    /// Whether the failure is a bounded wait that ran out. Callers treat these
    /// as "no answer" rather than as hard failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskListError::LockTimeout { .. })
    }
}
