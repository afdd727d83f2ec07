//! Cross-thread signal channel into the host's execution thread
//!
//! A host application exposes some way to wake its main thread with a named
//! event carrying a payload. [`SignalHost`] is that primitive. The in-process
//! implementation pairs a [`MainThreadQueue`] (the firing side, shareable
//! across threads) with an [`ExecutionLoop`] that a single thread drives.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::task::{panic_message, TaskId};

/// Payload delivered to the execution thread for one posted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSignal {
    pub task_id: TaskId,
    pub command: String,
    pub data: Value,
}

/// Callback invoked on the execution thread for each delivered signal
pub type SignalConsumer = Arc<dyn Fn(TaskSignal) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("Channel already registered: {0}")]
    ChannelExists(String),

    #[error("Channel not registered: {0}")]
    UnknownChannel(String),

    #[error("Execution thread is no longer accepting signals")]
    Disconnected,
}

/// Host primitive for waking the execution thread
pub trait SignalHost: Send + Sync {
    /// Attach a consumer to a named channel
    fn register_channel(&self, name: &str, consumer: SignalConsumer) -> Result<(), SignalError>;

    fn unregister_channel(&self, name: &str) -> Result<(), SignalError>;

    /// Queue a signal for delivery on the execution thread. Never blocks on
    /// the consumer.
    fn fire(&self, name: &str, signal: TaskSignal) -> Result<(), SignalError>;
}

struct Envelope {
    channel: String,
    signal: TaskSignal,
}

type ConsumerMap = Arc<RwLock<HashMap<String, SignalConsumer>>>;

/// Firing side of the in-process signal channel
pub struct MainThreadQueue {
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    consumers: ConsumerMap,
}

/// Receiving side; owned and driven by exactly one thread
pub struct ExecutionLoop {
    receiver: mpsc::Receiver<Envelope>,
    consumers: ConsumerMap,
}

impl MainThreadQueue {
    /// Create a connected queue and execution loop
    pub fn new() -> (Self, ExecutionLoop) {
        let (sender, receiver) = mpsc::channel();
        let consumers: ConsumerMap = Arc::default();

        let queue = Self {
            sender: Mutex::new(Some(sender)),
            consumers: Arc::clone(&consumers),
        };
        let execution = ExecutionLoop {
            receiver,
            consumers,
        };
        (queue, execution)
    }

    /// Stop accepting signals. [`ExecutionLoop::run`] returns once the
    /// already queued signals are delivered.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            debug!("Main thread queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.consumers.read().contains_key(name)
    }
}

impl SignalHost for MainThreadQueue {
    fn register_channel(&self, name: &str, consumer: SignalConsumer) -> Result<(), SignalError> {
        let mut consumers = self.consumers.write();
        if consumers.contains_key(name) {
            return Err(SignalError::ChannelExists(name.to_string()));
        }
        consumers.insert(name.to_string(), consumer);
        debug!(channel = name, "Registered signal channel");
        Ok(())
    }

    fn unregister_channel(&self, name: &str) -> Result<(), SignalError> {
        self.consumers
            .write()
            .remove(name)
            .map(|_| debug!(channel = name, "Unregistered signal channel"))
            .ok_or_else(|| SignalError::UnknownChannel(name.to_string()))
    }

    fn fire(&self, name: &str, signal: TaskSignal) -> Result<(), SignalError> {
        if !self.consumers.read().contains_key(name) {
            return Err(SignalError::UnknownChannel(name.to_string()));
        }

        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(SignalError::Disconnected)?;
        trace!(channel = name, task_id = %signal.task_id, "Firing signal");
        sender
            .send(Envelope {
                channel: name.to_string(),
                signal,
            })
            .map_err(|_| SignalError::Disconnected)
    }
}

impl ExecutionLoop {
    /// Deliver signals until the queue is closed, returning how many were
    /// delivered.
    pub fn run(&self) -> usize {
        debug!("Execution loop started");
        let mut delivered = 0;
        while let Ok(envelope) = self.receiver.recv() {
            self.deliver(envelope);
            delivered += 1;
        }
        debug!(delivered, "Execution loop finished");
        delivered
    }

    /// Deliver everything currently queued without blocking
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        while let Ok(envelope) = self.receiver.try_recv() {
            self.deliver(envelope);
            delivered += 1;
        }
        delivered
    }

    /// Wait up to `timeout` for a first signal, then drain the queue
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(envelope) => {
                self.deliver(envelope);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    fn deliver(&self, envelope: Envelope) {
        let Envelope { channel, signal } = envelope;
        // Release the map lock before running the consumer so it may
        // re-register or fire further signals.
        let consumer = self.consumers.read().get(&channel).cloned();
        let Some(consumer) = consumer else {
            warn!(channel = %channel, task_id = %signal.task_id, "Dropping signal for unregistered channel");
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| consumer(signal))) {
            error!(
                channel = %channel,
                panic = %panic_message(payload.as_ref()),
                "Signal consumer panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signal(command: &str) -> TaskSignal {
        TaskSignal {
            task_id: TaskId::new(),
            command: command.to_string(),
            data: json!({}),
        }
    }

    #[test]
    fn test_fire_requires_registered_channel() {
        let (queue, _execution) = MainThreadQueue::new();
        assert_eq!(
            queue.fire("missing", signal("x")),
            Err(SignalError::UnknownChannel("missing".to_string()))
        );
    }

    #[test]
    fn test_pump_delivers_on_calling_thread() {
        let (queue, execution) = MainThreadQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        queue
            .register_channel(
                "events",
                Arc::new(move |signal: TaskSignal| {
                    sink.lock().push((signal.command, std::thread::current().id()))
                }),
            )
            .unwrap();

        queue.fire("events", signal("first")).unwrap();
        queue.fire("events", signal("second")).unwrap();
        assert!(seen.lock().is_empty());

        assert_eq!(execution.pump(), 2);
        let seen = seen.lock();
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        assert!(seen.iter().all(|(_, id)| *id == std::thread::current().id()));
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let (queue, _execution) = MainThreadQueue::new();
        let consumer: SignalConsumer = Arc::new(|_: TaskSignal| {});
        queue.register_channel("a", Arc::clone(&consumer)).unwrap();
        assert!(matches!(
            queue.register_channel("a", consumer),
            Err(SignalError::ChannelExists(_))
        ));
        queue.unregister_channel("a").unwrap();
        assert!(queue.unregister_channel("a").is_err());
    }

    #[test]
    fn test_consumer_panic_does_not_stop_loop() {
        let (queue, execution) = MainThreadQueue::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        queue
            .register_channel(
                "events",
                Arc::new(move |signal: TaskSignal| {
                    if signal.command == "boom" {
                        panic!("consumer failure");
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        queue.fire("events", signal("boom")).unwrap();
        queue.fire("events", signal("ok")).unwrap();
        assert_eq!(execution.pump(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_returns_after_close() {
        let (queue, execution) = MainThreadQueue::new();
        let queue = Arc::new(queue);
        queue
            .register_channel("events", Arc::new(|_: TaskSignal| {}))
            .unwrap();
        queue.fire("events", signal("queued")).unwrap();

        let closer = Arc::clone(&queue);
        let handle = std::thread::spawn(move || closer.close());
        assert_eq!(execution.run(), 1);
        handle.join().unwrap();

        assert!(queue.is_closed());
        assert_eq!(queue.fire("events", signal("late")), Err(SignalError::Disconnected));
    }

    #[test]
    fn test_pump_timeout_without_signals() {
        let (_queue, execution) = MainThreadQueue::new();
        assert_eq!(execution.pump_timeout(Duration::from_millis(10)), 0);
    }
}
