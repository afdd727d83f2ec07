//! Task dispatcher behaviour across real threads

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tether_mcp::prelude::*;

use common::spawn_execution_thread;

#[test]
fn test_concurrent_posts_each_run_once_on_execution_thread() {
    const POSTERS: usize = 8;
    const PER_POSTER: usize = 25;

    let (queue, execution) = MainThreadQueue::new();
    let queue = Arc::new(queue);
    let tasks = Arc::new(TaskDispatcher::new(Arc::clone(&queue) as Arc<dyn SignalHost>));
    tasks.start().unwrap();
    let execution = spawn_execution_thread(execution);
    let execution_id = execution.thread().id();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let posters: Vec<_> = (0..POSTERS)
        .map(|poster| {
            let tasks = Arc::clone(&tasks);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                let mut ids = Vec::with_capacity(PER_POSTER);
                for n in 0..PER_POSTER {
                    let seen = Arc::clone(&seen);
                    let task_id = tasks
                        .post(
                            "record",
                            move |data: Value| {
                                let key = data["key"].as_u64().unwrap_or_default();
                                seen.lock().push((key, thread::current().id()));
                            },
                            json!({"key": poster * PER_POSTER + n}),
                        )
                        .unwrap();
                    ids.push(task_id);
                }
                ids
            })
        })
        .collect();
    let mut task_ids = HashSet::new();
    for poster in posters {
        task_ids.extend(poster.join().unwrap());
    }
    assert_eq!(task_ids.len(), POSTERS * PER_POSTER);

    while tasks.pending_count() > 0 {
        thread::sleep(Duration::from_millis(5));
    }
    queue.close();
    execution.join().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), POSTERS * PER_POSTER);
    let keys: HashSet<u64> = seen.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys.len(), POSTERS * PER_POSTER);
    assert!(seen.iter().all(|(_, id)| *id == execution_id));
}

#[test]
fn test_stop_drops_queued_callbacks() {
    let (queue, execution) = MainThreadQueue::new();
    let tasks = TaskDispatcher::new(Arc::new(queue));
    tasks.start().unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    for _ in 0..5 {
        let runs = Arc::clone(&runs);
        tasks
            .post(
                "count",
                move |_| {
                    runs.fetch_add(1, Ordering::SeqCst);
                },
                Value::Null,
            )
            .unwrap();
    }

    assert_eq!(tasks.stop(), 5);
    assert_eq!(tasks.pending_count(), 0);

    // signals are still queued; their ids are simply unknown now
    execution.pump();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_post_before_start_is_rejected() {
    let (queue, _execution) = MainThreadQueue::new();
    let tasks = TaskDispatcher::new(Arc::new(queue));

    let err = tasks.post("early", |_| {}, Value::Null).unwrap_err();
    assert!(matches!(err, TaskError::NotRunning));
    assert_eq!(err.to_string(), "Task dispatcher is not running");
}

#[test]
fn test_restart_after_stop() {
    let (queue, execution) = MainThreadQueue::new();
    let queue = Arc::new(queue);
    let tasks = TaskDispatcher::with_channel(Arc::clone(&queue) as Arc<dyn SignalHost>, "custom");

    tasks.start().unwrap();
    assert!(queue.has_channel("custom"));
    tasks.stop();
    assert!(!queue.has_channel("custom"));

    tasks.start().unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    tasks
        .post(
            "again",
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Value::Null,
        )
        .unwrap();
    assert_eq!(execution.pump(), 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn test_two_dispatchers_cannot_share_a_channel() {
    let (queue, _execution) = MainThreadQueue::new();
    let queue: Arc<dyn SignalHost> = Arc::new(queue);
    let first = TaskDispatcher::new(Arc::clone(&queue));
    let second = TaskDispatcher::new(queue);

    first.start().unwrap();
    assert!(matches!(
        second.start(),
        Err(TaskError::Signal(SignalError::ChannelExists(_)))
    ));
    assert!(!second.is_running());
}
