//! salamander-core: coordination primitives for the Salamander file manager
//!
//! # Main Entry Points
//!
//! - [`refresh`] - Per-panel refresh debouncing and its event-loop driver
//! - [`tasklist`] - Cross-process registry of running instances and the
//!   command rendezvous between them
//! - [`clock`] - Process-wide logical time counter shared by panels

pub mod clock;
pub mod logging;
pub mod refresh;
pub mod tasklist;

pub use clock::TimeCounter;
pub use refresh::{
    DirectoryWatcher, PanelDriver, PanelEvent, PanelHandle, PanelHost, PanelRefresher,
    RefreshError, RefreshRequest, TimerKind,
};
pub use tasklist::{
    ActivationStaging, Delivery, InstanceHost, ItemsSnapshot, TaskList, TaskListClient,
    TaskListError,
};

// Re-export config and wire types used in this crate's public API
pub use salamander_config::{ConfigError, SalamanderConfig};
pub use salamander_protocol::{
    CommandLineParams, IgnoreReason, PanelSide, ProcessListItem, ProcessState, Todo,
};

pub use logging::init_logging;
