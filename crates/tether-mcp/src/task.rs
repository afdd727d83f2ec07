//! Posting closures to the execution thread
//!
//! [`TaskDispatcher`] keeps a table of pending tasks keyed by id and wakes the
//! execution thread through a [`SignalHost`] channel. The consumer running on
//! that thread removes the task from the table before invoking it, so a task
//! runs at most once and a cancelled or discarded task never runs.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::signal::{SignalConsumer, SignalError, SignalHost, TaskSignal};

/// Channel name used when none is configured
pub const DEFAULT_CHANNEL: &str = "tether.task-dispatcher";

/// Unique id of a posted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Closure run on the execution thread with the task's payload
pub type TaskCallback = Box<dyn FnOnce(Value) + Send + 'static>;

struct PendingTask {
    command: String,
    // Locked only so the table is Sync; taken out exactly once on execution.
    callback: Mutex<TaskCallback>,
    data: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task dispatcher is not running")]
    NotRunning,

    #[error("Signal channel error: {0}")]
    Signal(#[from] SignalError),
}

/// Hands closures from any thread to the execution thread
pub struct TaskDispatcher {
    host: Arc<dyn SignalHost>,
    channel: String,
    running: RwLock<bool>,
    pending: Arc<DashMap<TaskId, PendingTask>>,
}

impl TaskDispatcher {
    pub fn new(host: Arc<dyn SignalHost>) -> Self {
        Self::with_channel(host, DEFAULT_CHANNEL)
    }

    pub fn with_channel(host: Arc<dyn SignalHost>, channel: impl Into<String>) -> Self {
        Self {
            host,
            channel: channel.into(),
            running: RwLock::new(false),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Register the consumer channel. Calling it again while running is a no-op.
    pub fn start(&self) -> Result<(), TaskError> {
        let mut running = self.running.write();
        if *running {
            debug!(channel = %self.channel, "Task dispatcher already running");
            return Ok(());
        }

        let pending = Arc::clone(&self.pending);
        let consumer: SignalConsumer =
            Arc::new(move |signal: TaskSignal| execute_signal(&pending, signal));
        self.host.register_channel(&self.channel, consumer)?;

        *running = true;
        info!(channel = %self.channel, "Task dispatcher started");
        Ok(())
    }

    /// Unregister the channel and discard every pending task without running
    /// it. Returns the number of discarded tasks.
    pub fn stop(&self) -> usize {
        let mut running = self.running.write();
        if !*running {
            return 0;
        }

        if let Err(err) = self.host.unregister_channel(&self.channel) {
            warn!(channel = %self.channel, error = %err, "Failed to unregister signal channel");
        }
        let discarded = self.pending.len();
        self.pending.clear();
        *running = false;

        info!(channel = %self.channel, discarded, "Task dispatcher stopped");
        discarded
    }

    /// Queue `callback` to run on the execution thread with `data`.
    ///
    /// Returns as soon as the signal is fired; the callback runs later.
    pub fn post<F>(
        &self,
        command: impl Into<String>,
        callback: F,
        data: Value,
    ) -> Result<TaskId, TaskError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let command = command.into();
        let running = self.running.read();
        if !*running {
            warn!(command = %command, "Task posted while dispatcher is stopped");
            return Err(TaskError::NotRunning);
        }

        let task_id = TaskId::new();
        self.pending.insert(
            task_id,
            PendingTask {
                command: command.clone(),
                callback: Mutex::new(Box::new(callback)),
                data: data.clone(),
            },
        );

        let signal = TaskSignal {
            task_id,
            command: command.clone(),
            data,
        };
        if let Err(err) = self.host.fire(&self.channel, signal) {
            self.pending.remove(&task_id);
            error!(task_id = %task_id, command = %command, error = %err, "Failed to fire task signal");
            return Err(err.into());
        }

        debug!(task_id = %task_id, command = %command, "Task posted");
        Ok(task_id)
    }

    /// Drop a task that has not started yet. Returns whether it was pending.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let cancelled = self.pending.remove(task_id).is_some();
        if cancelled {
            debug!(task_id = %task_id, "Task cancelled");
        }
        cancelled
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("channel", &self.channel)
            .field("running", &self.is_running())
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn execute_signal(pending: &DashMap<TaskId, PendingTask>, signal: TaskSignal) {
    let Some((task_id, task)) = pending.remove(&signal.task_id) else {
        debug!(
            task_id = %signal.task_id,
            command = %signal.command,
            "Ignoring signal for unknown task"
        );
        return;
    };

    let PendingTask {
        command,
        callback,
        data,
    } = task;
    let callback = callback.into_inner();
    match panic::catch_unwind(AssertUnwindSafe(move || callback(data))) {
        Ok(()) => debug!(task_id = %task_id, command = %command, "Task executed"),
        Err(payload) => error!(
            task_id = %task_id,
            command = %command,
            panic = %panic_message(payload.as_ref()),
            "Task callback panicked"
        ),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
