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

//! The worker thread pool.
//!
//! [`Threading`] spawns a fixed number of OS threads at initialization. Each
//! worker owns a slot of a [`FixedSizeResourcePool`]; obtaining a thread
//! allocates a slot and hands it a callback, which the worker keeps invoking
//! until it answers [`ThreadResult::Finish`] or the thread is released.

use crate::error::ThreadingError;
use aspect_core::settings::parse_property;
use aspect_core::{
    FixedSizeResourcePool, Handle, HandleMarker, InitResult, SettingsError, SettingsFile,
    SettingsItem, System, SystemContext,
};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const LOG_TAG: &str = "Threads";

/// Logical name of a free worker.
pub const AVAILABLE_THREAD_NAME: &str = "Available";

/// What a worker does after its callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadResult {
    /// Invoke the callback again right away.
    ReRun,
    /// Invoke the callback again after the delay. [`Threading::wake`] cuts the
    /// delay short.
    RerunDelay(Duration),
    /// Stop invoking the callback and release the thread.
    Finish,
}

/// Work assigned to an obtained thread.
pub type ThreadCallback = Box<dyn FnMut() -> ThreadResult + Send>;

/// Parameters for [`Threading::obtain_thread`].
pub struct ObtainThreadParams {
    /// Invoked repeatedly on the worker.
    pub callback: ThreadCallback,
    /// Logical name shown in thread statistics.
    pub thread_name: String,
}

impl ObtainThreadParams {
    /// Creates parameters from a name and a callback.
    pub fn new(
        thread_name: impl Into<String>,
        callback: impl FnMut() -> ThreadResult + Send + 'static,
    ) -> Self {
        Self {
            callback: Box::new(callback),
            thread_name: thread_name.into(),
        }
    }
}

impl fmt::Debug for ObtainThreadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObtainThreadParams")
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}

/// Handle marker for worker threads. Ids fit in a byte, so a pool holds at
/// most 254 workers.
#[derive(Debug)]
pub enum WorkerMarker {}

impl HandleMarker for WorkerMarker {
    const MAX_ID: u32 = u8::MAX as u32;
}

/// Identifies an obtained worker thread.
pub type ThreadHandle = Handle<WorkerMarker>;

/// What a worker is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Free, waiting to be obtained.
    #[default]
    Available,
    /// Running its callback.
    Running,
    /// Asleep or delaying the next callback run.
    Waiting,
    /// Running a one-shot task.
    RunningTask,
}

impl ThreadState {
    /// Returns the display name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            ThreadState::Available => "Available",
            ThreadState::Running => "Running",
            ThreadState::Waiting => "Waiting",
            ThreadState::RunningTask => "Running task",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ThreadState::Running,
            2 => ThreadState::Waiting,
            3 => ThreadState::RunningTask,
            _ => ThreadState::Available,
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStats {
    /// Worker index.
    pub index: usize,
    /// Logical thread name.
    pub name: String,
    /// State at the time of the snapshot.
    pub state: ThreadState,
    /// Handle of the current owner, invalid while free.
    pub handle: ThreadHandle,
}

thread_local! {
    static CURRENT_STATE: RefCell<Option<Arc<AtomicU8>>> = const { RefCell::new(None) };
}

/// Updates the state reported for the calling worker thread.
///
/// Does nothing when called from a thread that is not a pool worker.
pub fn mark_current_thread(state: ThreadState) {
    CURRENT_STATE.with(|current| {
        if let Some(slot_state) = current.borrow().as_ref() {
            slot_state.store(state as u8, Ordering::Release);
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sleep {
    Awake,
    Until(Instant),
    Indefinite,
}

struct Assignment {
    callback: Option<ThreadCallback>,
    name: String,
    handle: ThreadHandle,
    sleep: Sleep,
}

struct WorkerSlot {
    assignment: Mutex<Assignment>,
    signal: Condvar,
    state: Arc<AtomicU8>,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            assignment: Mutex::new(Assignment {
                callback: None,
                name: AVAILABLE_THREAD_NAME.to_owned(),
                handle: ThreadHandle::INVALID,
                sleep: Sleep::Awake,
            }),
            signal: Condvar::new(),
            state: Arc::new(AtomicU8::new(ThreadState::Available as u8)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Assignment> {
        self.assignment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, Assignment>,
        timeout: Duration,
    ) -> MutexGuard<'a, Assignment> {
        let (guard, _) = self
            .signal
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
        guard
    }
}

struct WorkerPool {
    slots: FixedSizeResourcePool<WorkerSlot, WorkerMarker>,
    shutting_down: AtomicBool,
    idle_wait: Duration,
}

impl WorkerPool {
    fn new(count: usize, idle_wait: Duration) -> Result<Self, ThreadingError> {
        let slots = FixedSizeResourcePool::with_factory(count, |_| WorkerSlot::new())
            .map_err(|e| ThreadingError::SpawnFailed(e.to_string()))?;
        Ok(Self {
            slots,
            shutting_down: AtomicBool::new(false),
            idle_wait,
        })
    }

    fn obtain(&self, params: ObtainThreadParams) -> Result<ThreadHandle, ThreadingError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(ThreadingError::NotInitialized);
        }
        let Some((handle, slot)) = self.slots.allocate() else {
            log::warn!(target: LOG_TAG, "No thread available for '{}'", params.thread_name);
            return Err(ThreadingError::NoThreadAvailable);
        };

        let mut assignment = slot.lock();
        assignment.callback = Some(params.callback);
        assignment.name = params.thread_name;
        assignment.handle = handle;
        assignment.sleep = Sleep::Awake;
        slot.set_state(ThreadState::Running);
        drop(assignment);
        slot.signal.notify_all();

        log::debug!(target: LOG_TAG, "Obtained thread {handle}");
        Ok(handle)
    }

    fn release(&self, handle: &mut ThreadHandle) {
        if let Some(slot) = self.slots.try_get(*handle) {
            let mut assignment = slot.lock();
            if assignment.handle == *handle {
                // A running callback is detached and dropped by its worker.
                assignment.callback = None;
                assignment.name = AVAILABLE_THREAD_NAME.to_owned();
                assignment.handle = ThreadHandle::INVALID;
                assignment.sleep = Sleep::Awake;
                slot.set_state(ThreadState::Available);
            }
        }
        if self.slots.release(handle) {
            log::debug!(target: LOG_TAG, "Released thread");
        }
    }

    fn set_sleep(&self, handle: ThreadHandle, sleep: Sleep) {
        let Some(slot) = self.slots.try_get(handle) else {
            return;
        };
        let mut assignment = slot.lock();
        if assignment.handle == handle {
            assignment.sleep = sleep;
            drop(assignment);
            slot.signal.notify_all();
        }
    }

    fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        for slot in &self.slots {
            let _guard = slot.lock();
            slot.signal.notify_all();
        }
    }

    fn stats(&self) -> Vec<ThreadStats> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let assignment = slot.lock();
                ThreadStats {
                    index,
                    name: assignment.name.clone(),
                    state: slot.state(),
                    handle: assignment.handle,
                }
            })
            .collect()
    }
}

fn worker_loop(pool: Arc<WorkerPool>, index: usize) {
    let Some(slot) = pool.slots.iter().nth(index) else {
        return;
    };
    log::info!(target: LOG_TAG, "Starting thread: {index}");
    CURRENT_STATE.with(|current| *current.borrow_mut() = Some(slot.state.clone()));

    while !pool.shutting_down.load(Ordering::Acquire) {
        let mut assignment = slot.lock();

        let sleep = assignment.sleep;
        match sleep {
            Sleep::Indefinite => {
                slot.set_state(ThreadState::Waiting);
                drop(slot.wait(assignment, pool.idle_wait));
                continue;
            }
            Sleep::Until(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    slot.set_state(ThreadState::Waiting);
                    drop(slot.wait(assignment, deadline - now));
                    continue;
                }
                assignment.sleep = Sleep::Awake;
            }
            Sleep::Awake => {}
        }

        let Some(mut callback) = assignment.callback.take() else {
            drop(slot.wait(assignment, pool.idle_wait));
            continue;
        };
        let handle = assignment.handle;
        drop(assignment);

        slot.set_state(ThreadState::Running);
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback())).unwrap_or_else(|_| {
            log::error!(target: LOG_TAG, "Callback on thread {index} panicked, releasing {handle}");
            ThreadResult::Finish
        });

        let mut assignment = slot.lock();
        if assignment.handle != handle {
            // Released while running.
            continue;
        }
        match result {
            ThreadResult::ReRun => assignment.callback = Some(callback),
            ThreadResult::RerunDelay(delay) => {
                assignment.callback = Some(callback);
                if assignment.sleep == Sleep::Awake {
                    assignment.sleep = Sleep::Until(Instant::now() + delay);
                }
            }
            ThreadResult::Finish => {
                drop(assignment);
                drop(callback);
                let mut handle = handle;
                pool.release(&mut handle);
            }
        }
    }

    CURRENT_STATE.with(|current| *current.borrow_mut() = None);
    log::info!(target: LOG_TAG, "Shutting down thread: {index}");
}

/// Settings of the [`Threading`] system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadingSettings {
    /// Number of workers. `0` sizes the pool to the hardware concurrency
    /// minus one.
    pub worker_threads: usize,
    /// How long a free worker parks before re-checking its slot, in ms.
    pub idle_wait_ms: u64,
}

impl Default for ThreadingSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            idle_wait_ms: 10,
        }
    }
}

impl SettingsItem for ThreadingSettings {
    fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("worker_threads", self.worker_threads.to_string()),
            ("idle_wait_ms", self.idle_wait_ms.to_string()),
        ]
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), SettingsError> {
        match name {
            "worker_threads" => self.worker_threads = parse_property(name, value)?,
            "idle_wait_ms" => self.idle_wait_ms = parse_property(name, value)?,
            _ => {
                return Err(SettingsError::UnknownProperty {
                    section: Threading::NAME.to_owned(),
                    property: name.to_owned(),
                })
            }
        }
        Ok(())
    }
}

/// Resolves the number of workers to spawn.
///
/// The result stays below [`ThreadHandle::MAX_ID`].
pub fn resolve_worker_count(requested: usize, hardware: usize) -> Result<usize, ThreadingError> {
    let max = ThreadHandle::MAX_ID as usize - 1;
    if requested > 0 {
        return Ok(requested.min(max));
    }
    if hardware < 2 {
        return Err(ThreadingError::InsufficientConcurrency {
            available: hardware,
        });
    }
    Ok((hardware - 1).min(max))
}

/// The threading system: owns the worker pool.
pub struct Threading {
    settings: Arc<RwLock<ThreadingSettings>>,
    pool: Option<Arc<WorkerPool>>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for Threading {
    fn default() -> Self {
        Self::with_settings(ThreadingSettings::default())
    }
}

impl Threading {
    /// The system and settings section name.
    pub const NAME: &'static str = "Threading";

    /// Creates the system with preset settings. Command-line overrides still
    /// apply on top of them.
    pub fn with_settings(settings: ThreadingSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            pool: None,
            workers: Vec::new(),
        }
    }

    /// Returns `true` while the worker pool is running.
    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Number of workers in the pool, `0` before initialization.
    pub fn max_threads(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.slots.capacity())
    }

    /// Number of workers currently obtained.
    pub fn threads_in_use(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.slots.count())
    }

    /// Assigns `params.callback` to a free worker.
    pub fn obtain_thread(
        &self,
        params: ObtainThreadParams,
    ) -> Result<ThreadHandle, ThreadingError> {
        self.pool
            .as_ref()
            .ok_or(ThreadingError::NotInitialized)?
            .obtain(params)
    }

    /// Returns the worker to the pool and invalidates `handle`.
    ///
    /// If the callback is running, it is dropped once it returns. Stale
    /// handles are ignored.
    pub fn release_thread(&self, handle: &mut ThreadHandle) {
        match &self.pool {
            Some(pool) => pool.release(handle),
            None => *handle = ThreadHandle::INVALID,
        }
    }

    /// Suspends the worker before its next callback run, for `duration` or
    /// until [`wake`](Self::wake) when `None`.
    pub fn sleep(&self, handle: ThreadHandle, duration: Option<Duration>) {
        if let Some(pool) = &self.pool {
            let sleep = match duration {
                Some(duration) => Sleep::Until(Instant::now() + duration),
                None => Sleep::Indefinite,
            };
            pool.set_sleep(handle, sleep);
        }
    }

    /// Cancels a pending sleep or delay.
    pub fn wake(&self, handle: ThreadHandle) {
        if let Some(pool) = &self.pool {
            pool.set_sleep(handle, Sleep::Awake);
        }
    }

    /// Returns a snapshot of every worker.
    pub fn thread_stats(&self) -> Vec<ThreadStats> {
        self.pool.as_ref().map(|pool| pool.stats()).unwrap_or_default()
    }

    /// Logs one line per worker.
    pub fn log_thread_summary(&self) {
        log::info!(
            target: LOG_TAG,
            "{} of {} threads in use",
            self.threads_in_use(),
            self.max_threads()
        );
        for stats in self.thread_stats() {
            log::info!(
                target: LOG_TAG,
                "Thread {:>3}: {:<40} [{}]",
                stats.index,
                stats.name,
                stats.state
            );
        }
    }

    fn start(&mut self) -> Result<(), ThreadingError> {
        let settings = *self.settings.read().unwrap_or_else(PoisonError::into_inner);
        let hardware = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let count = resolve_worker_count(settings.worker_threads, hardware)?;

        let pool = Arc::new(WorkerPool::new(
            count,
            Duration::from_millis(settings.idle_wait_ms.max(1)),
        )?);
        self.pool = Some(pool.clone());

        for index in 0..count {
            let worker_pool = pool.clone();
            let spawned = thread::Builder::new()
                .name(format!("aspect-worker-{index}"))
                .spawn(move || worker_loop(worker_pool, index));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    self.stop();
                    return Err(ThreadingError::SpawnFailed(e.to_string()));
                }
            }
        }

        log::info!(target: LOG_TAG, "Started {count} worker threads");
        Ok(())
    }

    fn stop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        log::info!(target: LOG_TAG, "Waiting for threads to shut down.");
        pool.begin_shutdown();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!(target: LOG_TAG, "A worker thread panicked");
            }
        }
        log::info!(target: LOG_TAG, "All threads shut down");
    }
}

impl System for Threading {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_settings(&mut self, settings: &mut SettingsFile) {
        let fresh = settings.get::<ThreadingSettings>(Self::NAME).is_err();
        match settings.register::<ThreadingSettings>(Self::NAME) {
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

    fn on_initialize(&mut self, _ctx: &mut SystemContext<'_>) -> InitResult {
        match self.start() {
            Ok(()) => InitResult::Initialized,
            Err(e) => {
                log::error!(target: LOG_TAG, "{e}");
                InitResult::Failed
            }
        }
    }

    fn on_shutdown(&mut self, _ctx: &mut SystemContext<'_>) {
        self.stop();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for Threading {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aspect_core::SystemRegistry;
    use std::sync::atomic::AtomicUsize;

    fn running(workers: usize) -> SystemRegistry {
        let mut registry = SystemRegistry::new();
        registry.insert(Box::new(Threading::with_settings(ThreadingSettings {
            worker_threads: workers,
            idle_wait_ms: 1,
        })));
        registry.initialize_all().unwrap();
        registry
    }

    #[test]
    fn worker_count_resolution() {
        assert_eq!(resolve_worker_count(3, 1), Ok(3));
        assert_eq!(resolve_worker_count(0, 8), Ok(7));
        assert_eq!(resolve_worker_count(1000, 8), Ok(254));
        assert_eq!(resolve_worker_count(0, 512), Ok(254));
        assert_eq!(
            resolve_worker_count(0, 1),
            Err(ThreadingError::InsufficientConcurrency { available: 1 })
        );
    }

    #[test]
    fn obtain_before_initialize_fails() {
        let threading = Threading::default();
        let result = threading.obtain_thread(ObtainThreadParams::new("early", || {
            ThreadResult::Finish
        }));
        assert_eq!(result.unwrap_err(), ThreadingError::NotInitialized);
        assert_eq!(threading.max_threads(), 0);
    }

    #[test]
    fn free_workers_report_defaults() {
        let registry = running(2);
        let threading = registry.find::<Threading>().unwrap();
        let stats = threading.thread_stats();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.name == AVAILABLE_THREAD_NAME
            && s.state == ThreadState::Available
            && !s.handle.is_valid()));
    }

    #[test]
    fn finish_releases_the_thread() {
        let registry = running(1);
        let threading = registry.find::<Threading>().unwrap();
        let (tx, rx) = flume::bounded(1);

        let handle = threading
            .obtain_thread(ObtainThreadParams::new("one-shot", move || {
                let _ = tx.send(());
                ThreadResult::Finish
            }))
            .unwrap();
        assert!(handle.is_valid());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while threading.threads_in_use() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(threading.threads_in_use(), 0);
        let stats = &threading.thread_stats()[0];
        assert_eq!(stats.name, AVAILABLE_THREAD_NAME);
        assert_eq!(stats.state, ThreadState::Available);
    }

    #[test]
    fn exhausted_pool_reports_no_thread_available() {
        let registry = running(1);
        let threading = registry.find::<Threading>().unwrap();
        let mut first = threading
            .obtain_thread(ObtainThreadParams::new("busy", || {
                ThreadResult::RerunDelay(Duration::from_millis(5))
            }))
            .unwrap();

        let second = threading.obtain_thread(ObtainThreadParams::new("extra", || {
            ThreadResult::Finish
        }));
        assert_eq!(second.unwrap_err(), ThreadingError::NoThreadAvailable);

        threading.release_thread(&mut first);
        assert!(!first.is_valid());
        assert_eq!(threading.threads_in_use(), 0);
    }

    #[test]
    fn released_callback_stops_running() {
        let registry = running(1);
        let threading = registry.find::<Threading>().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let mut handle = threading
            .obtain_thread(ObtainThreadParams::new("counter", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                ThreadResult::RerunDelay(Duration::from_millis(1))
            }))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(runs.load(Ordering::SeqCst) >= 3);

        threading.release_thread(&mut handle);
        thread::sleep(Duration::from_millis(20));
        let settled = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(runs.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn indefinite_sleep_holds_until_woken() {
        let registry = running(1);
        let threading = registry.find::<Threading>().unwrap();
        let (tx, rx) = flume::unbounded();

        let handle = threading
            .obtain_thread(ObtainThreadParams::new("sleeper", move || {
                let _ = tx.send(());
                ThreadResult::RerunDelay(Duration::from_millis(1))
            }))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        threading.sleep(handle, None);
        thread::sleep(Duration::from_millis(20));
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(threading.thread_stats()[0].state, ThreadState::Waiting);

        threading.wake(handle);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn panicking_callback_releases_its_thread() {
        let registry = running(1);
        let threading = registry.find::<Threading>().unwrap();

        threading
            .obtain_thread(ObtainThreadParams::new("boom", || -> ThreadResult {
                panic!("callback failure")
            }))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while threading.threads_in_use() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(threading.threads_in_use(), 0);
        let stats = &threading.thread_stats()[0];
        assert_eq!(stats.name, AVAILABLE_THREAD_NAME);
        assert_eq!(stats.state, ThreadState::Available);

        let (tx, rx) = flume::bounded(1);
        threading
            .obtain_thread(ObtainThreadParams::new("after", move || {
                let _ = tx.send(());
                ThreadResult::Finish
            }))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn timed_sleep_resumes_on_its_own() {
        let registry = running(1);
        let threading = registry.find::<Threading>().unwrap();
        let (tx, rx) = flume::unbounded();

        let mut handle = threading
            .obtain_thread(ObtainThreadParams::new("napper", move || {
                let _ = tx.send(Instant::now());
                ThreadResult::RerunDelay(Duration::from_millis(1))
            }))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let nap = Duration::from_millis(100);
        threading.sleep(handle, Some(nap));
        let slept_at = Instant::now();
        thread::sleep(Duration::from_millis(20));
        while rx.try_recv().is_ok() {}
        assert_eq!(threading.thread_stats()[0].state, ThreadState::Waiting);

        let resumed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(resumed >= slept_at + nap);
        threading.release_thread(&mut handle);
    }

    #[test]
    fn wake_cuts_a_rerun_delay_short() {
        let registry = running(1);
        let threading = registry.find::<Threading>().unwrap();
        let (tx, rx) = flume::unbounded();

        let mut handle = threading
            .obtain_thread(ObtainThreadParams::new("patient", move || {
                let _ = tx.send(());
                ThreadResult::RerunDelay(Duration::from_secs(60))
            }))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while threading.thread_stats()[0].state != ThreadState::Waiting
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(threading.thread_stats()[0].state, ThreadState::Waiting);

        threading.wake(handle);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        threading.release_thread(&mut handle);
    }

    #[test]
    fn create_settings_keeps_an_existing_section() {
        let mut file = SettingsFile::new("engine");
        file.register::<ThreadingSettings>(Threading::NAME)
            .unwrap()
            .write()
            .unwrap()
            .worker_threads = 6;

        let mut threading = Threading::with_settings(ThreadingSettings {
            worker_threads: 2,
            idle_wait_ms: 1,
        });
        threading.create_settings(&mut file);

        let item = file.get::<ThreadingSettings>(Threading::NAME).unwrap();
        assert_eq!(item.read().unwrap().worker_threads, 6);
        assert_eq!(threading.settings.read().unwrap().worker_threads, 6);
    }

    #[test]
    fn shutdown_joins_every_worker() {
        let mut registry = running(3);
        assert_eq!(registry.find::<Threading>().unwrap().max_threads(), 3);
        registry.shutdown_all();
        assert!(registry.is_empty());
    }
}
