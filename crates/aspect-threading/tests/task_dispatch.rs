// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use aspect_core::{SystemError, SystemRegistry, SystemState};
use aspect_threading::{
    TaskParams, TaskPriority, ThreadState, ThreadedTasks, ThreadedTasksSettings, Threading,
    ThreadingSettings,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn threading(workers: usize) -> Box<Threading> {
    Box::new(Threading::with_settings(ThreadingSettings {
        worker_threads: workers,
        idle_wait_ms: 1,
    }))
}

fn tasks(dedicated_threads: u8) -> Box<ThreadedTasks> {
    Box::new(ThreadedTasks::with_settings(ThreadedTasksSettings {
        dedicated_threads,
        idle_wait_ms: 1,
    }))
}

#[test]
fn spawned_tasks_deliver_their_results() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut registry = SystemRegistry::new();
    registry.insert(threading(2));
    registry.insert(tasks(1));
    registry.initialize_all().unwrap();

    let dispatcher = registry.find::<ThreadedTasks>().unwrap();
    assert_eq!(dispatcher.dedicated_threads(), 1);

    let receivers: Vec<_> = TaskPriority::ALL
        .into_iter()
        .enumerate()
        .map(|(i, priority)| dispatcher.spawn(priority, move || i * 10))
        .collect();

    for (i, rx) in receivers.into_iter().enumerate() {
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), i * 10);
    }
    assert_eq!(dispatcher.pending_tasks(), 0);

    let stats = registry.find::<Threading>().unwrap().thread_stats();
    assert!(stats
        .iter()
        .any(|s| s.name == "Threaded Tasks dedicated thread 0."));
}

#[test]
fn competing_dedicated_threads_run_every_task_once() {
    let mut registry = SystemRegistry::new();
    registry.insert(threading(4));
    registry.insert(tasks(4));
    registry.initialize_all().unwrap();

    let dispatcher = registry.find::<ThreadedTasks>().unwrap();
    assert_eq!(dispatcher.dedicated_threads(), 4);

    const COUNT: usize = 2000;
    let (tx, rx) = flume::unbounded();
    for i in 0..COUNT {
        let tx = tx.clone();
        let priority = TaskPriority::ALL[i % TaskPriority::ALL.len()];
        dispatcher.request_task_run(TaskParams::new(priority, move || {
            let _ = tx.send(i);
        }));
    }
    drop(tx);

    let mut seen: Vec<usize> = (0..COUNT)
        .map(|_| rx.recv_timeout(TIMEOUT).unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..COUNT).collect::<Vec<_>>());
    assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    assert_eq!(dispatcher.pending_tasks(), 0);
}

#[test]
fn tasks_wait_for_threading_to_initialize() {
    let mut registry = SystemRegistry::new();
    registry.insert(tasks(1));
    registry.insert(threading(1));

    registry.initialize_all().unwrap();
    assert_eq!(
        registry.state_of::<ThreadedTasks>(),
        Some(SystemState::Initialized)
    );
}

#[test]
fn tasks_without_threading_fail() {
    let mut registry = SystemRegistry::new();
    registry.insert(tasks(1));

    assert_eq!(
        registry.initialize_all(),
        Err(SystemError::InitFailed(ThreadedTasks::NAME.to_string()))
    );
}

#[test]
fn dedicated_threads_are_clamped_to_the_pool() {
    let mut registry = SystemRegistry::new();
    registry.insert(threading(2));
    registry.insert(tasks(8));
    registry.initialize_all().unwrap();

    assert_eq!(registry.find::<ThreadedTasks>().unwrap().dedicated_threads(), 2);
    assert_eq!(registry.find::<Threading>().unwrap().threads_in_use(), 2);
}

#[test]
fn any_thread_can_drain_the_queue() {
    let mut registry = SystemRegistry::new();
    registry.insert(threading(1));
    registry.insert(tasks(0));
    registry.initialize_all().unwrap();

    let dispatcher = registry.find::<ThreadedTasks>().unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = ran.clone();
        let rx = dispatcher.spawn(TaskPriority::Normal, move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
        drop(rx);
    }

    assert_eq!(dispatcher.pending_tasks(), 3);
    while dispatcher.run_next_available_task() {}
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

#[test]
fn workers_report_running_task_while_a_task_executes() {
    let mut registry = SystemRegistry::new();
    registry.insert(threading(1));
    registry.insert(tasks(1));
    registry.initialize_all().unwrap();

    let dispatcher = registry.find::<ThreadedTasks>().unwrap();
    let (started_tx, started_rx) = flume::bounded(1);
    let (release_tx, release_rx) = flume::bounded::<()>(1);
    let done = dispatcher.spawn(TaskPriority::Asap, move || {
        let _ = started_tx.send(());
        let _ = release_rx.recv_timeout(TIMEOUT);
    });

    started_rx.recv_timeout(TIMEOUT).unwrap();
    let threading = registry.find::<Threading>().unwrap();
    assert_eq!(threading.thread_stats()[0].state, ThreadState::RunningTask);

    release_tx.send(()).unwrap();
    done.recv_timeout(TIMEOUT).unwrap();
}

#[test]
fn shutdown_releases_dedicated_threads() {
    let mut registry = SystemRegistry::new();
    registry.insert(threading(2));
    registry.insert(tasks(2));
    registry.initialize_all().unwrap();
    registry.shutdown_all();
    assert!(registry.is_empty());
}
