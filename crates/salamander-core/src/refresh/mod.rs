//! Per-panel refresh debouncing.
//!
//! Directory-change signals from the watcher, the icon reader, user actions
//! and deferred timers are funnelled into one [`PanelRefresher`], which turns
//! them into at most one directory re-read per burst. [`PanelDriver`] runs the
//! refresher on its own thread and [`DirectoryWatcher`] feeds it from `notify`.

pub mod driver;
pub mod errors;
pub mod host;
pub mod machine;
pub mod timers;
pub mod types;
pub mod watcher;

pub use driver::{PanelDriver, PanelHandle};
pub use errors::RefreshError;
pub use host::PanelHost;
pub use machine::PanelRefresher;
pub use timers::{TimerToken, Timers};
pub use types::{PanelEvent, RefreshRequest, TimerKind};
pub use watcher::DirectoryWatcher;
