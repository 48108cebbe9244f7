#[cfg(unix)]
pub mod client;
mod messages;
mod types;

#[cfg(unix)]
pub use client::{IpcConnection, IpcError};
pub use messages::{ControlReply, ControlRequest, ErrorCode, IgnoreReason};
pub use types::{
    CommandLineParams, IntegrityLevel, PanelSide, PrivilegeClass, ProcessList, ProcessListItem,
    ProcessState, Todo,
};
