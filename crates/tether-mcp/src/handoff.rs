//! Awaiting handler results produced on the execution thread

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::item::{Arguments, Category, Handler, HandlerResult};
use crate::task::{panic_message, TaskDispatcher};

/// How long a request waits for the execution thread by default
pub const DEFAULT_MAIN_THREAD_TIMEOUT: Duration = Duration::from_secs(30);

enum Outcome {
    Value(Value),
    Failed(anyhow::Error),
    Panicked(String),
}

/// Runs handlers on the execution thread and waits for their result.
///
/// A wait that times out cancels the task if it has not started. A task that
/// is already running completes and its result is dropped.
#[derive(Debug, Clone)]
pub struct MainThreadCaller {
    tasks: Arc<TaskDispatcher>,
    timeout: Duration,
}

impl MainThreadCaller {
    pub fn new(tasks: Arc<TaskDispatcher>, timeout: Duration) -> Self {
        Self { tasks, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn tasks(&self) -> &Arc<TaskDispatcher> {
        &self.tasks
    }

    pub async fn call(
        &self,
        category: Category,
        handler: Arc<dyn Handler>,
        arguments: Arguments,
    ) -> Result<Value, DispatchError> {
        if !self.tasks.is_running() {
            warn!("Task dispatcher not running, starting it");
            self.tasks.start().map_err(|err| {
                DispatchError::Internal(format!("Failed to start task dispatcher: {err}"))
            })?;
        }

        let (sender, receiver) = oneshot::channel();
        let callback = move |data: Value| {
            let outcome = run_handler(handler.as_ref(), extract_arguments(data));
            if sender.send(outcome).is_err() {
                debug!("Waiter already gone, dropping handler result");
            }
        };

        let task_id = self
            .tasks
            .post(
                format!("execute_{}", category.as_str()),
                callback,
                json!({ "arguments": arguments }),
            )
            .map_err(|err| {
                DispatchError::Internal(format!("Failed to post {category} task: {err}"))
            })?;

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(Outcome::Value(value))) => Ok(value),
            Ok(Ok(Outcome::Failed(err))) => Err(DispatchError::handler_failed(category, err)),
            Ok(Ok(Outcome::Panicked(message))) => {
                Err(DispatchError::handler_panicked(category, &message))
            }
            Ok(Err(_)) => Err(DispatchError::Internal(format!(
                "{} task {task_id} was discarded before it ran",
                category.title()
            ))),
            Err(_) => {
                let cancelled = self.tasks.cancel(&task_id);
                warn!(
                    task_id = %task_id,
                    category = %category,
                    timeout_ms = self.timeout.as_millis() as u64,
                    cancelled,
                    "Timed out waiting for execution thread"
                );
                Err(DispatchError::Timeout {
                    operation: category,
                    timeout: self.timeout,
                })
            }
        }
    }
}

fn extract_arguments(data: Value) -> Arguments {
    match data {
        Value::Object(mut payload) => match payload.remove("arguments") {
            Some(Value::Object(arguments)) => arguments,
            _ => Arguments::new(),
        },
        _ => Arguments::new(),
    }
}

fn run_handler(handler: &dyn Handler, arguments: Arguments) -> Outcome {
    let result: std::thread::Result<HandlerResult> =
        panic::catch_unwind(AssertUnwindSafe(|| handler.call(arguments)));
    match result {
        Ok(Ok(value)) => Outcome::Value(value),
        Ok(Err(err)) => Outcome::Failed(err),
        Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MainThreadQueue;

    #[test]
    fn test_extract_arguments() {
        let args = extract_arguments(json!({"arguments": {"x": 1}}));
        assert_eq!(args.get("x"), Some(&json!(1)));
        assert!(extract_arguments(json!({"arguments": [1, 2]})).is_empty());
        assert!(extract_arguments(Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_call_starts_stopped_dispatcher() {
        let (queue, execution) = MainThreadQueue::new();
        let tasks = Arc::new(TaskDispatcher::new(Arc::new(queue)));
        let caller = MainThreadCaller::new(Arc::clone(&tasks), Duration::from_secs(5));

        let pump = std::thread::spawn(move || {
            // deliver until the single task ran
            while execution.pump_timeout(Duration::from_millis(50)) == 0 {}
        });

        let handler: Arc<dyn Handler> =
            Arc::new(|_: Arguments| -> HandlerResult { Ok(json!("done")) });
        let value = caller
            .call(Category::Tool, handler, Arguments::new())
            .await
            .unwrap();

        assert_eq!(value, json!("done"));
        assert!(tasks.is_running());
        pump.join().unwrap();
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let (queue, execution) = MainThreadQueue::new();
        let tasks = Arc::new(TaskDispatcher::new(Arc::new(queue)));
        tasks.start().unwrap();
        let caller = MainThreadCaller::new(tasks, Duration::from_secs(5));

        let pump = std::thread::spawn(move || {
            while execution.pump_timeout(Duration::from_millis(50)) == 0 {}
        });

        let handler: Arc<dyn Handler> =
            Arc::new(|_: Arguments| -> HandlerResult { panic!("handler blew up") });
        let err = caller
            .call(Category::Resource, handler, Arguments::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), crate::types::error_codes::INTERNAL_ERROR);
        assert!(err.to_string().contains("handler blew up"));
        pump.join().unwrap();
    }
}
