//! Per-process control thread.
//!
//! Listens on this instance's socket. A `wake` makes it re-read the table
//! header and, if the posted command is addressed to this pid, execute it
//! and answer. A separate task refreshes the heartbeat of its entry, so a
//! slow request never lets the entry go silent.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use salamander_config::TaskListConfig;
use salamander_protocol::{
    CommandLineParams, ControlReply, ControlRequest, ErrorCode, IgnoreReason, ProcessListItem,
    Todo,
};
use tokio::io::{AsyncWrite, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::tasklist::codec::{read_message, write_message};
use crate::tasklist::errors::TaskListError;
use crate::tasklist::host::InstanceHost;
use crate::tasklist::identity::Identity;
use crate::tasklist::now_ms;
use crate::tasklist::staging::ActivationStaging;
use crate::tasklist::table::{TableStore, append_item};

const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// Outcome of reading the table header on a wake-up.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Ignore(IgnoreReason),
    Expired,
    Run {
        todo: Todo,
        todo_uid: u64,
        params: Option<CommandLineParams>,
    },
}

/// Everything the control thread needs, shared with its blocking workers.
pub(crate) struct ControlContext {
    pub identity: Identity,
    pub store: TableStore,
    pub config: TaskListConfig,
    pub staging: Arc<ActivationStaging>,
    pub host: Arc<dyn InstanceHost>,
    /// Our entry as last recorded; put back if the table loses it.
    pub entry: Arc<Mutex<ProcessListItem>>,
}

impl ControlContext {
    /// Read the posted command and decide whether this process runs it.
    ///
    /// `last_todo_uid` advances for every newer command, including ones
    /// addressed to other instances. `woken_uid` is the uid the requester
    /// posted; a header carrying another uid belongs to someone else's wake.
    pub fn take_command(
        &self,
        last_todo_uid: &mut u64,
        woken_uid: u64,
    ) -> Result<Command, TaskListError> {
        let lock = match self.store.lock(self.config.todo_timeout()) {
            Ok(lock) => lock,
            Err(e) if e.is_timeout() => {
                std::thread::sleep(BUSY_BACKOFF);
                return Ok(Command::Ignore(IgnoreReason::Busy));
            }
            Err(e) => return Err(e),
        };
        let list = self.store.load(&lock)?;
        drop(lock);

        if list.todo_uid < *last_todo_uid {
            // The table was recreated; its counter restarted
            info!(
                event = "core.tasklist.control.table_rewound",
                todo_uid = list.todo_uid,
                last_todo_uid = *last_todo_uid,
            );
            *last_todo_uid = 0;
        }
        if list.todo_uid <= *last_todo_uid {
            return Ok(Command::Ignore(IgnoreReason::AlreadySeen));
        }
        if list.todo_uid != woken_uid {
            // Leave the newer command to the wake that posted it
            return Ok(Command::Ignore(IgnoreReason::Superseded));
        }
        *last_todo_uid = list.todo_uid;

        let Some(todo) = list.todo else {
            return Ok(Command::Ignore(IgnoreReason::NoTodo));
        };
        if list.target_pid != self.identity.pid {
            return Ok(Command::Ignore(IgnoreReason::OtherTarget));
        }
        let timeout_ms = self.config.todo_timeout().as_millis() as i64;
        if list.is_todo_expired(now_ms(), timeout_ms) {
            return Ok(Command::Expired);
        }

        Ok(Command::Run {
            todo,
            todo_uid: list.todo_uid,
            params: list.command_line_params,
        })
    }

    /// Stage params for the main thread and wait for it to take them.
    pub fn deliver_activation(&self, params: CommandLineParams) -> bool {
        self.staging.stage(params);
        self.host.wake_main();
        self.staging.wait_processed(self.config.todo_timeout());
        self.staging.finish_request()
    }

    /// Refresh the heartbeat of our own entry, re-adding the entry if a
    /// sweep or a table reset removed it.
    pub fn beat(&self) {
        let pid = self.identity.pid;
        let now = now_ms();
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner).clone();
        entry.heartbeat_ms = now;
        let max_items = self.config.max_items();
        let result = self
            .store
            .update(self.config.heartbeat_interval(), |list| {
                match list.find_mut(pid) {
                    Some(item) => {
                        item.heartbeat_ms = now;
                        Ok(false)
                    }
                    None => append_item(list, entry, max_items).map(|()| true),
                }
            });
        match result {
            Ok(Ok(false)) => {}
            Ok(Ok(true)) => warn!(event = "core.tasklist.heartbeat_entry_restored", pid = pid),
            Ok(Err(e)) => {
                warn!(event = "core.tasklist.heartbeat_restore_failed", pid = pid, error = %e)
            }
            Err(e) if e.is_timeout() => {
                debug!(event = "core.tasklist.heartbeat_skipped", reason = "lock_busy")
            }
            Err(e) => warn!(event = "core.tasklist.heartbeat_failed", error = %e),
        }
    }
}

/// Handle to the running control thread. Stopping it removes the socket.
pub(crate) struct ControlServer {
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
    socket_path: PathBuf,
}

impl ControlServer {
    /// Bind `socket_path` and serve it on a dedicated thread.
    ///
    /// `seen_todo_uid` is the table's `todo_uid` at registration; commands up
    /// to it predate this process.
    pub fn start(
        ctx: Arc<ControlContext>,
        socket_path: PathBuf,
        seen_todo_uid: u64,
    ) -> Result<Self, TaskListError> {
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::remove_file(&socket_path) {
            Ok(()) => debug!(
                event = "core.tasklist.control.stale_socket_removed",
                path = %socket_path.display(),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let std_listener = std::os::unix::net::UnixListener::bind(&socket_path)?;
        std_listener.set_nonblocking(true)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let pid = ctx.identity.pid;
        let thread = std::thread::Builder::new()
            .name(format!("tasklist-control-{}", pid))
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match UnixListener::from_std(std_listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            error!(event = "core.tasklist.control.listen_failed", error = %e);
                            return;
                        }
                    };
                    serve(listener, ctx, token, seen_todo_uid).await;
                });
            })
            .map_err(|e| TaskListError::ControlThread(e.to_string()))?;

        info!(
            event = "core.tasklist.control.start_completed",
            pid = pid,
            socket = %socket_path.display(),
        );

        Ok(Self {
            shutdown,
            thread: Some(thread),
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop the thread and remove the socket file. Idempotent.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shutdown.cancel();
        if thread.join().is_err() {
            error!(event = "core.tasklist.control.thread_panicked");
        }
        if let Err(e) = fs::remove_file(&self.socket_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                event = "core.tasklist.control.socket_cleanup_failed",
                path = %self.socket_path.display(),
                error = %e,
            );
        }
        info!(event = "core.tasklist.control.stop_completed");
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    listener: UnixListener,
    ctx: Arc<ControlContext>,
    shutdown: CancellationToken,
    mut last_todo_uid: u64,
) {
    let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&ctx), shutdown.clone()));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(event = "core.tasklist.control.shutdown_requested");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        last_todo_uid = handle_connection(stream, &ctx, last_todo_uid).await;
                    }
                    Err(e) => {
                        warn!(event = "core.tasklist.control.accept_failed", error = %e);
                    }
                }
            }
        }
    }

    // A beat in flight must not re-add the entry after deregistration
    if let Err(e) = heartbeat.await {
        error!(event = "core.tasklist.heartbeat_panicked", error = %e);
    }
}

/// Beat every `heartbeat_interval` until shutdown, independent of requests.
async fn heartbeat_loop(ctx: Arc<ControlContext>, shutdown: CancellationToken) {
    let mut ticks = tokio::time::interval(ctx.config.heartbeat_interval());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticks.tick() => {
                let worker = Arc::clone(&ctx);
                if let Err(e) = tokio::task::spawn_blocking(move || worker.beat()).await {
                    error!(event = "core.tasklist.heartbeat_panicked", error = %e);
                }
            }
        }
    }
}

/// Serve one request. Returns the updated `last_todo_uid`.
async fn handle_connection(
    stream: UnixStream,
    ctx: &Arc<ControlContext>,
    last_todo_uid: u64,
) -> u64 {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let read = tokio::time::timeout(
        ctx.config.todo_timeout(),
        read_message::<_, ControlRequest>(&mut reader),
    )
    .await;
    let request = match read {
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => return last_todo_uid,
        Ok(Err(e)) => {
            warn!(event = "core.tasklist.control.request_invalid", error = %e);
            let reply = ControlReply::Error {
                id: String::new(),
                code: ErrorCode::ProtocolError,
                message: e.to_string(),
            };
            send_reply(&mut writer, &reply).await;
            return last_todo_uid;
        }
        Err(_) => {
            debug!(event = "core.tasklist.control.request_timed_out");
            return last_todo_uid;
        }
    };

    let (id, todo_uid) = match request {
        ControlRequest::Ping { id } => {
            let reply = ControlReply::Pong {
                id,
                pid: ctx.identity.pid,
            };
            send_reply(&mut writer, &reply).await;
            return last_todo_uid;
        }
        ControlRequest::Wake { id, todo_uid } => (id, todo_uid),
        other => {
            let reply = ControlReply::Error {
                id: other.id().to_string(),
                code: ErrorCode::ProtocolError,
                message: "unsupported request".to_string(),
            };
            send_reply(&mut writer, &reply).await;
            return last_todo_uid;
        }
    };

    debug!(event = "core.tasklist.control.wake_received", todo_uid = todo_uid);

    let worker = Arc::clone(ctx);
    let joined = tokio::task::spawn_blocking(move || {
        let mut seen = last_todo_uid;
        let result = worker.take_command(&mut seen, todo_uid);
        (result, seen)
    })
    .await;
    let (result, seen) = match joined {
        Ok(pair) => pair,
        Err(e) => {
            error!(event = "core.tasklist.control.worker_panicked", error = %e);
            return last_todo_uid;
        }
    };

    match result {
        Err(e) => {
            warn!(event = "core.tasklist.control.todo_failed", error = %e);
            let reply = ControlReply::Error {
                id,
                code: ErrorCode::from_code(e.error_code()),
                message: e.to_string(),
            };
            send_reply(&mut writer, &reply).await;
        }
        Ok(Command::Ignore(reason)) => {
            debug!(event = "core.tasklist.control.todo_ignored", reason = %reason);
            send_reply(&mut writer, &ControlReply::Ignored { id, reason }).await;
        }
        Ok(Command::Expired) => {
            info!(event = "core.tasklist.control.todo_expired", todo_uid = seen);
            send_reply(&mut writer, &ControlReply::Expired { id }).await;
        }
        Ok(Command::Run {
            todo,
            todo_uid,
            params,
        }) => {
            info!(
                event = "core.tasklist.control.todo_started",
                todo = %todo,
                todo_uid = todo_uid,
            );
            run_todo(ctx, &mut writer, id, todo, params).await;
        }
    }
    seen
}

async fn run_todo<W>(
    ctx: &Arc<ControlContext>,
    writer: &mut W,
    id: String,
    todo: Todo,
    params: Option<CommandLineParams>,
) where
    W: AsyncWrite + Unpin,
{
    match todo {
        Todo::Highlight => {
            send_reply(writer, &ControlReply::Processed { id }).await;
            ctx.host.flash_main_window();
        }
        Todo::Break => {
            send_reply(writer, &ControlReply::Processed { id }).await;
            ctx.host.raise_break();
        }
        Todo::Terminate => {
            send_reply(writer, &ControlReply::Processed { id }).await;
            ctx.host.terminate_self();
        }
        Todo::Activate => {
            let Some(params) = params else {
                warn!(event = "core.tasklist.control.activate_without_params");
                let reason = IgnoreReason::NoTodo;
                send_reply(writer, &ControlReply::Ignored { id, reason }).await;
                return;
            };
            let worker = Arc::clone(ctx);
            let consumed = tokio::task::spawn_blocking(move || worker.deliver_activation(params))
                .await
                .unwrap_or(false);
            let reply = if consumed {
                info!(event = "core.tasklist.control.activate_completed");
                ControlReply::Processed { id }
            } else {
                info!(event = "core.tasklist.control.activate_not_consumed");
                ControlReply::Ignored {
                    id,
                    reason: IgnoreReason::NotConsumed,
                }
            };
            send_reply(writer, &reply).await;
        }
    }
}

async fn send_reply<W>(writer: &mut W, reply: &ControlReply)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = write_message(writer, reply).await {
        debug!(event = "core.tasklist.control.reply_failed", error = %e);
    }
}
