//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tether_mcp::prelude::*;

/// Dispatcher wired to an in-process execution thread
pub struct Harness {
    pub queue: Arc<MainThreadQueue>,
    pub registry: Arc<Registry>,
    pub tasks: Arc<TaskDispatcher>,
    pub dispatcher: McpDispatcher,
    execution: Option<JoinHandle<usize>>,
}

impl Harness {
    /// Harness whose execution thread delivers signals until dropped
    pub fn running(items: Vec<Item>, timeout: Duration) -> Self {
        let (mut harness, execution) = Self::idle(items, timeout);
        harness.execution = Some(spawn_execution_thread(execution));
        harness
    }

    /// Harness plus an execution loop nobody drives yet
    pub fn idle(items: Vec<Item>, timeout: Duration) -> (Self, ExecutionLoop) {
        let (queue, execution) = MainThreadQueue::new();
        let queue = Arc::new(queue);
        let registry = Arc::new(Registry::new());
        registry.register_all(items).expect("register items");

        let tasks = Arc::new(TaskDispatcher::new(Arc::clone(&queue) as Arc<dyn SignalHost>));
        tasks.start().expect("start task dispatcher");

        let config = DispatcherConfig {
            main_thread_timeout: timeout,
            ..DispatcherConfig::default()
        };
        let dispatcher = McpDispatcher::new(config, Arc::clone(&registry), Arc::clone(&tasks));

        let harness = Self {
            queue,
            registry,
            tasks,
            dispatcher,
            execution: None,
        };
        (harness, execution)
    }

    pub fn execution_thread(&self) -> Option<ThreadId> {
        self.execution.as_ref().map(|handle| handle.thread().id())
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.tasks.stop();
        self.queue.close();
        if let Some(handle) = self.execution.take() {
            let _ = handle.join();
        }
    }
}

pub fn spawn_execution_thread(execution: ExecutionLoop) -> JoinHandle<usize> {
    thread::Builder::new()
        .name("execution".to_string())
        .spawn(move || execution.run())
        .expect("spawn execution thread")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("tether_mcp=debug")
        .try_init();
}
