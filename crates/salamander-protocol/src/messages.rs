use serde::{Deserialize, Serialize};

/// Error codes returned by a control thread in error replies.
///
/// Unknown codes from newer instances deserialize to `Unknown` via `#[serde(other)]`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    LockTimeout,
    TableCorrupt,
    IoError,
    ProtocolError,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    /// Convert a string error code (from `TaskListError::error_code()`) to an `ErrorCode`.
    pub fn from_code(code: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(code.to_string()))
            .unwrap_or(ErrorCode::Unknown)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::LockTimeout => write!(f, "lock_timeout"),
            ErrorCode::TableCorrupt => write!(f, "table_corrupt"),
            ErrorCode::IoError => write!(f, "io_error"),
            ErrorCode::ProtocolError => write!(f, "protocol_error"),
            ErrorCode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Why a control thread declined to execute a wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The table lock could not be taken in time.
    Busy,
    /// The posted `todo_uid` was already handled.
    AlreadySeen,
    /// The posted command targets another pid.
    OtherTarget,
    /// The table header carries no command.
    NoTodo,
    /// The main thread did not pick up staged activation params in time.
    NotConsumed,
    /// Another command replaced the woken one in the table header.
    Superseded,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::Busy => write!(f, "busy"),
            IgnoreReason::AlreadySeen => write!(f, "already_seen"),
            IgnoreReason::OtherTarget => write!(f, "other_target"),
            IgnoreReason::NoTodo => write!(f, "no_todo"),
            IgnoreReason::NotConsumed => write!(f, "not_consumed"),
            IgnoreReason::Superseded => write!(f, "superseded"),
        }
    }
}

/// Requester -> control thread messages.
///
/// Each variant maps to a JSONL message with `"type"` as the tag field.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlRequest {
    /// A command was posted in the table. The target re-reads the header
    /// itself and only acts if the header still carries `todo_uid`.
    #[serde(rename = "wake")]
    Wake { id: String, todo_uid: u64 },

    #[serde(rename = "ping")]
    Ping { id: String },
}

/// Control thread -> requester replies. Echo the request `id`.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlReply {
    #[serde(rename = "processed")]
    Processed { id: String },

    #[serde(rename = "ignored")]
    Ignored { id: String, reason: IgnoreReason },

    #[serde(rename = "expired")]
    Expired { id: String },

    #[serde(rename = "pong")]
    Pong { id: String, pid: u32 },

    #[serde(rename = "error")]
    Error {
        id: String,
        code: ErrorCode,
        message: String,
    },
}

impl ControlRequest {
    /// Extract the request ID from any request.
    pub fn id(&self) -> &str {
        match self {
            ControlRequest::Wake { id, .. } | ControlRequest::Ping { id } => id,
        }
    }
}

impl ControlReply {
    pub fn id(&self) -> &str {
        match self {
            ControlReply::Processed { id }
            | ControlReply::Ignored { id, .. }
            | ControlReply::Expired { id }
            | ControlReply::Pong { id, .. }
            | ControlReply::Error { id, .. } => id,
        }
    }
}
