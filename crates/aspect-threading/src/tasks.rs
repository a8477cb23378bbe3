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

//! Prioritized one-shot tasks.
//!
//! Tasks wait in a [`TaskQueue`] until a dedicated worker (or any caller of
//! [`TaskQueue::run_next`]) picks them up. Every pick ages the whole queue by
//! one, so low priority work is eventually selected even under a steady
//! stream of urgent tasks.

use crate::threading::{
    self, ObtainThreadParams, ThreadHandle, ThreadResult, ThreadState, Threading,
};
use aspect_core::settings::parse_property;
use aspect_core::{
    InitResult, LockOwner, MultiReadLocked, SettingsError, SettingsFile, SettingsItem, System,
    SystemContext, SystemState,
};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

const LOG_TAG: &str = "Threaded Tasks";

/// Scheduling priority of a task. Lower values are picked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskPriority {
    /// As soon as possible.
    Asap = 0,
    /// Very high.
    VeryHigh = 1,
    /// High.
    High = 2,
    /// The default priority.
    #[default]
    Normal = 3,
    /// Low.
    Low = 4,
    /// Background work.
    VeryLow = 5,
}

impl TaskPriority {
    /// Every priority, most urgent first.
    pub const ALL: [TaskPriority; 6] = [
        TaskPriority::Asap,
        TaskPriority::VeryHigh,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
        TaskPriority::VeryLow,
    ];

    /// Returns the display name of the priority.
    pub fn name(&self) -> &'static str {
        match self {
            TaskPriority::Asap => "ASAP",
            TaskPriority::VeryHigh => "VeryHigh",
            TaskPriority::High => "High",
            TaskPriority::Normal => "Normal",
            TaskPriority::Low => "Low",
            TaskPriority::VeryLow => "VeryLow",
        }
    }

    fn initial_counter(self) -> i32 {
        self as i32 * 1000
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskPriority::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// A task request.
pub struct TaskParams {
    /// The work to run, exactly once.
    pub callback: Box<dyn FnOnce() + Send>,
    /// Scheduling priority.
    pub priority: TaskPriority,
}

impl TaskParams {
    /// Creates a task request.
    pub fn new(priority: TaskPriority, callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            priority,
        }
    }
}

impl fmt::Debug for TaskParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskParams")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// A task callback that can only be consumed.
///
/// Queued tasks are visible to several readers at once, so the queue needs
/// `Sync` contents. The callback is never reachable through a shared
/// reference, which makes sharing the wrapper sound.
struct TaskCallback(Box<dyn FnOnce() + Send>);

// SAFETY: no `&self` method exposes the inner closure; it is only reachable
// by value through `into_inner`.
unsafe impl Sync for TaskCallback {}

impl TaskCallback {
    fn into_inner(self) -> Box<dyn FnOnce() + Send> {
        self.0
    }
}

/// A queued task and its ageing counter.
pub struct Task {
    callback: TaskCallback,
    priority: TaskPriority,
    priority_counter: i32,
}

impl Task {
    /// Wraps a request; the counter starts at the priority times 1000.
    pub fn new(params: TaskParams) -> Self {
        Self {
            callback: TaskCallback(params.callback),
            priority: params.priority,
            priority_counter: params.priority.initial_counter(),
        }
    }

    /// The priority the task was requested with.
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// The current ageing counter. The lowest counter runs next.
    pub fn priority_counter(&self) -> i32 {
        self.priority_counter
    }

    fn run(self) {
        let callback = self.callback.into_inner();
        threading::mark_current_thread(ThreadState::RunningTask);
        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            log::error!(target: LOG_TAG, "A task with priority {} panicked", self.priority);
        }
        threading::mark_current_thread(ThreadState::Running);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("priority", &self.priority)
            .field("priority_counter", &self.priority_counter)
            .finish_non_exhaustive()
    }
}

/// Removes and returns the next task, ageing every queued task by one.
fn select_next(tasks: &mut Vec<Task>) -> Option<Task> {
    for task in tasks.iter_mut() {
        task.priority_counter -= 1;
    }
    let index = tasks
        .iter()
        .enumerate()
        .min_by_key(|(_, task)| task.priority_counter)
        .map(|(index, _)| index)?;
    Some(tasks.remove(index))
}

/// A priority-aged queue of tasks, shared between the requesting side and the
/// threads running them.
#[derive(Default)]
pub struct TaskQueue {
    tasks: MultiReadLocked<Vec<Task>>,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task.
    pub fn push(&self, params: TaskParams) {
        let mut tasks = self.tasks.get_write(LockOwner::current_thread());
        tasks.push(Task::new(params));
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.get_read(LockOwner::current_thread()).len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the next task on the calling thread.
    ///
    /// Returns `false` when the queue is empty or another thread is currently
    /// picking a task.
    pub fn run_next(&self) -> bool {
        let owner = LockOwner::current_thread();
        if self.tasks.get_read(owner).is_empty() {
            return false;
        }

        let next = match self.tasks.try_get_write(owner) {
            Some(mut tasks) => select_next(&mut tasks),
            None => return false,
        };

        match next {
            Some(task) => {
                task.run();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

/// Settings of the [`ThreadedTasks`] system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadedTasksSettings {
    /// Number of workers obtained for running tasks.
    pub dedicated_threads: u8,
    /// How long an idle dedicated worker waits before polling again, in ms.
    pub idle_wait_ms: u64,
}

impl Default for ThreadedTasksSettings {
    fn default() -> Self {
        Self {
            dedicated_threads: 1,
            idle_wait_ms: 1,
        }
    }
}

impl SettingsItem for ThreadedTasksSettings {
    fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dedicated_threads", self.dedicated_threads.to_string()),
            ("idle_wait_ms", self.idle_wait_ms.to_string()),
        ]
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), SettingsError> {
        match name {
            "dedicated_threads" => self.dedicated_threads = parse_property(name, value)?,
            "idle_wait_ms" => self.idle_wait_ms = parse_property(name, value)?,
            _ => {
                return Err(SettingsError::UnknownProperty {
                    section: ThreadedTasks::NAME.to_owned(),
                    property: name.to_owned(),
                })
            }
        }
        Ok(())
    }
}

/// Dispatches one-shot tasks onto dedicated worker threads.
///
/// Requires a [`Threading`] system in the same registry.
pub struct ThreadedTasks {
    settings: Arc<RwLock<ThreadedTasksSettings>>,
    queue: Arc<TaskQueue>,
    threads: Vec<ThreadHandle>,
}

impl Default for ThreadedTasks {
    fn default() -> Self {
        Self::with_settings(ThreadedTasksSettings::default())
    }
}

impl ThreadedTasks {
    /// The system and settings section name.
    pub const NAME: &'static str = "ThreadedTasks";

    /// Creates the system with preset settings.
    pub fn with_settings(settings: ThreadedTasksSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            queue: Arc::new(TaskQueue::new()),
            threads: Vec::new(),
        }
    }

    /// Queues a task.
    pub fn request_task_run(&self, params: TaskParams) {
        self.queue.push(params);
    }

    /// Queues `f` and returns a receiver for its result.
    pub fn spawn<R, F>(&self, priority: TaskPriority, f: F) -> flume::Receiver<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = flume::bounded(1);
        self.request_task_run(TaskParams::new(priority, move || {
            // The caller may have dropped the receiver.
            let _ = tx.send(f());
        }));
        rx
    }

    /// Runs the next queued task on the calling thread. See
    /// [`TaskQueue::run_next`].
    pub fn run_next_available_task(&self) -> bool {
        self.queue.run_next()
    }

    /// Number of queued tasks.
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Number of workers currently dedicated to tasks.
    pub fn dedicated_threads(&self) -> usize {
        self.threads.len()
    }

    /// The shared queue.
    pub fn queue(&self) -> Arc<TaskQueue> {
        self.queue.clone()
    }

    fn obtain_threads(&mut self, threading: &Threading) -> InitResult {
        let settings = *self.settings.read().unwrap_or_else(PoisonError::into_inner);
        let requested = usize::from(settings.dedicated_threads);
        let count = requested.min(threading.max_threads());
        if count < requested {
            log::warn!(
                target: LOG_TAG,
                "Requested {requested} dedicated threads, only {count} available"
            );
        }

        let idle_wait = Duration::from_millis(settings.idle_wait_ms);
        for index in 0..count {
            let queue = self.queue.clone();
            let params = ObtainThreadParams::new(
                format!("Threaded Tasks dedicated thread {index}."),
                move || {
                    if queue.run_next() {
                        ThreadResult::ReRun
                    } else {
                        ThreadResult::RerunDelay(idle_wait)
                    }
                },
            );
            match threading.obtain_thread(params) {
                Ok(handle) => self.threads.push(handle),
                Err(e) => {
                    log::error!(target: LOG_TAG, "Unable to obtain dedicated thread {index}: {e}");
                    self.release_threads(threading);
                    return InitResult::Failed;
                }
            }
        }
        InitResult::Initialized
    }

    fn release_threads(&mut self, threading: &Threading) {
        for mut handle in self.threads.drain(..) {
            threading.release_thread(&mut handle);
        }
    }
}

impl System for ThreadedTasks {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_settings(&mut self, settings: &mut SettingsFile) {
        let fresh = settings.get::<ThreadedTasksSettings>(Self::NAME).is_err();
        match settings.register::<ThreadedTasksSettings>(Self::NAME) {
            Ok(item) => {
                if fresh {
                    let preset = *self.settings.read().unwrap_or_else(PoisonError::into_inner);
                    *item.write().unwrap_or_else(PoisonError::into_inner) = preset;
                }
                self.settings = item;
            }
            Err(e) => log::warn!(target: LOG_TAG, "{e}"),
        }
    }

    fn on_initialize(&mut self, ctx: &mut SystemContext<'_>) -> InitResult {
        match ctx.state_of::<Threading>() {
            None => {
                log::error!(target: LOG_TAG, "No Threading system registered");
                InitResult::Failed
            }
            Some(SystemState::Uninitialized) => InitResult::Retry,
            Some(SystemState::Initialized) => match ctx.find::<Threading>() {
                Some(threading) => self.obtain_threads(threading),
                None => InitResult::Retry,
            },
            Some(state) => {
                log::error!(target: LOG_TAG, "Threading system is not usable: {state}");
                InitResult::Failed
            }
        }
    }

    fn on_shutdown(&mut self, ctx: &mut SystemContext<'_>) {
        match ctx.find::<Threading>() {
            Some(threading) => self.release_threads(threading),
            None => self.threads.clear(),
        }
        let pending = self.queue.len();
        if pending > 0 {
            log::warn!(target: LOG_TAG, "Shutting down with {pending} tasks still queued");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Order = Arc<Mutex<Vec<&'static str>>>;

    fn recording(queue: &TaskQueue, order: &Order, priority: TaskPriority, tag: &'static str) {
        let order = order.clone();
        queue.push(TaskParams::new(priority, move || order.lock().unwrap().push(tag)));
    }

    #[test]
    fn priority_names() {
        let names: Vec<_> = TaskPriority::ALL.iter().map(TaskPriority::name).collect();
        assert_eq!(names, ["ASAP", "VeryHigh", "High", "Normal", "Low", "VeryLow"]);
        assert_eq!("veryhigh".parse::<TaskPriority>(), Ok(TaskPriority::VeryHigh));
    }

    #[test]
    fn contended_queue_is_skipped_instead_of_waited_on() {
        let queue = TaskQueue::default();
        let order = Order::default();
        recording(&queue, &order, TaskPriority::Normal, "late");

        let other = queue.tasks.get_read(LockOwner::new());
        assert!(!queue.run_next());
        assert_eq!(queue.len(), 1);
        drop(other);

        assert!(queue.run_next());
        assert_eq!(*order.lock().unwrap(), ["late"]);
    }

    #[test]
    fn create_settings_keeps_an_existing_section() {
        let mut file = SettingsFile::new("engine");
        file.register::<ThreadedTasksSettings>(ThreadedTasks::NAME)
            .unwrap()
            .write()
            .unwrap()
            .dedicated_threads = 3;

        let mut tasks = ThreadedTasks::with_settings(ThreadedTasksSettings {
            dedicated_threads: 1,
            idle_wait_ms: 1,
        });
        tasks.create_settings(&mut file);

        let item = file.get::<ThreadedTasksSettings>(ThreadedTasks::NAME).unwrap();
        assert_eq!(item.read().unwrap().dedicated_threads, 3);
        assert_eq!(tasks.settings.read().unwrap().dedicated_threads, 3);
    }

    #[test]
    fn counters_start_at_priority_times_thousand() {
        let task = Task::new(TaskParams::new(TaskPriority::Low, || {}));
        assert_eq!(task.priority_counter(), 4000);
        assert_eq!(task.priority(), TaskPriority::Low);
    }

    #[test]
    fn tasks_run_by_priority() {
        let queue = TaskQueue::new();
        let order = Order::default();
        recording(&queue, &order, TaskPriority::Normal, "normal");
        recording(&queue, &order, TaskPriority::Low, "low");
        recording(&queue, &order, TaskPriority::Asap, "asap");
        recording(&queue, &order, TaskPriority::VeryLow, "very-low");
        recording(&queue, &order, TaskPriority::High, "high");
        recording(&queue, &order, TaskPriority::VeryHigh, "very-high");

        while queue.run_next() {}
        assert_eq!(
            *order.lock().unwrap(),
            ["asap", "very-high", "high", "normal", "low", "very-low"]
        );
        assert!(queue.is_empty());
        assert!(!queue.run_next());
    }

    #[test]
    fn ties_go_to_the_oldest_task() {
        let queue = TaskQueue::new();
        let order = Order::default();
        recording(&queue, &order, TaskPriority::Normal, "first");
        recording(&queue, &order, TaskPriority::Normal, "second");

        assert!(queue.run_next());
        assert_eq!(*order.lock().unwrap(), ["first"]);
    }

    #[test]
    fn ageing_lets_low_priority_work_through() {
        let queue = TaskQueue::new();
        let order = Order::default();
        recording(&queue, &order, TaskPriority::Low, "low");

        let mut runs = 0;
        while !order.lock().unwrap().contains(&"low") {
            recording(&queue, &order, TaskPriority::High, "high");
            assert!(queue.run_next());
            runs += 1;
            assert!(runs <= 5000, "low priority task starved");
        }
        // Low starts 2000 above High and ages one step per pick; the tie at
        // run 2001 goes to the older task.
        assert_eq!(runs, 2001);
    }

    #[test]
    fn a_panicking_task_does_not_poison_the_queue() {
        let queue = TaskQueue::new();
        queue.push(TaskParams::new(TaskPriority::Asap, || panic!("task failure")));
        queue.push(TaskParams::new(TaskPriority::Low, || {}));

        assert!(queue.run_next());
        assert!(queue.run_next());
        assert!(queue.is_empty());
    }
}
