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

//! A spin based multi-reader / single-writer lock.
//!
//! Unlike [`std::sync::RwLock`], locks are taken on behalf of an explicit
//! [`LockOwner`], which allows querying whether a given owner currently holds
//! the lock and releasing on its behalf. Every operation is a short critical
//! section around the reader list; blocking variants spin until the
//! non-blocking variant succeeds.

use std::cell::UnsafeCell;
use std::fmt;
use std::num::NonZeroU64;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identity on whose behalf a [`MultiReadLock`] is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockOwner(NonZeroU64);

impl LockOwner {
    /// Creates a new, process-wide unique owner.
    pub fn new() -> Self {
        let id = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        // Zero means "no writer", the counter starts at one and would need 2^64 owners to wrap.
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the owner bound to the calling thread. Repeated calls on the
    /// same thread return the same owner.
    pub fn current_thread() -> Self {
        thread_local! {
            static THREAD_OWNER: LockOwner = LockOwner::new();
        }
        THREAD_OWNER.with(|owner| *owner)
    }

    /// Returns the raw id of this owner.
    pub fn id(&self) -> u64 {
        self.0.get()
    }
}

impl Default for LockOwner {
    fn default() -> Self {
        Self::new()
    }
}

/// A multi-reader / single-writer spin lock keyed by [`LockOwner`].
pub struct MultiReadLock {
    /// Guards `readers`; held only for the duration of a single operation.
    state_locked: AtomicBool,
    /// Id of the owner holding the write lock, zero when unlocked.
    writer: AtomicU64,
    /// Owners currently holding a read lock. An owner may appear several times.
    readers: UnsafeCell<Vec<u64>>,
}

// SAFETY: `readers` is only accessed through `StateGuard`, which is obtained by
// winning the `state_locked` flag and therefore gives exclusive access.
unsafe impl Sync for MultiReadLock {}
unsafe impl Send for MultiReadLock {}

/// Exclusive access to the internal reader list.
struct StateGuard<'a> {
    lock: &'a MultiReadLock,
}

impl StateGuard<'_> {
    fn readers(&mut self) -> &mut Vec<u64> {
        // SAFETY: a `StateGuard` exists only while `state_locked` is held by us.
        unsafe { &mut *self.lock.readers.get() }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.lock.state_locked.store(false, Ordering::Release);
    }
}

impl MultiReadLock {
    /// Creates an unlocked lock.
    pub const fn new() -> Self {
        Self {
            state_locked: AtomicBool::new(false),
            writer: AtomicU64::new(0),
            readers: UnsafeCell::new(Vec::new()),
        }
    }

    fn try_lock_state(&self) -> Option<StateGuard<'_>> {
        self.state_locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| StateGuard { lock: self })
    }

    fn lock_state(&self) -> StateGuard<'_> {
        loop {
            if let Some(guard) = self.try_lock_state() {
                return guard;
            }
            std::hint::spin_loop();
        }
    }

    /// Takes the write lock only if nobody (including `owner`) holds it.
    fn try_acquire_write(&self, owner: LockOwner) -> bool {
        let Some(mut state) = self.try_lock_state() else {
            return false;
        };
        if !state.readers().is_empty() {
            return false;
        }
        self.writer
            .compare_exchange(0, owner.id(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Removes a single read entry of `owner`.
    fn release_one_read(&self, owner: LockOwner) {
        let mut state = self.lock_state();
        let readers = state.readers();
        if let Some(pos) = readers.iter().position(|id| *id == owner.id()) {
            readers.swap_remove(pos);
        }
    }

    /// Attempts to take the write lock without blocking.
    ///
    /// Returns `true` when `owner` holds the write lock after the call, which
    /// includes the case where it already held it. May fail spuriously while
    /// another thread is inside a lock operation.
    pub fn try_write_lock(&self, owner: LockOwner) -> bool {
        self.try_acquire_write(owner);
        self.has_write_lock(owner)
    }

    /// Spins until the write lock is obtained.
    pub fn write_lock(&self, owner: LockOwner) {
        while !self.try_write_lock(owner) {
            std::hint::spin_loop();
        }
    }

    /// Releases the write lock if `owner` holds it.
    pub fn release_write_lock(&self, owner: LockOwner) {
        let _ = self
            .writer
            .compare_exchange(owner.id(), 0, Ordering::Release, Ordering::Relaxed);
    }

    /// Returns `true` if `owner` currently holds the write lock.
    pub fn has_write_lock(&self, owner: LockOwner) -> bool {
        self.writer.load(Ordering::Acquire) == owner.id()
    }

    /// Attempts to take a read lock without blocking.
    ///
    /// Fails while any writer holds the lock, and may fail spuriously while
    /// another thread is inside a lock operation.
    pub fn try_read_lock(&self, owner: LockOwner) -> bool {
        let Some(mut state) = self.try_lock_state() else {
            return false;
        };
        if self.writer.load(Ordering::Acquire) != 0 {
            return false;
        }
        state.readers().push(owner.id());
        true
    }

    /// Spins until a read lock is obtained.
    pub fn read_lock(&self, owner: LockOwner) {
        while !self.try_read_lock(owner) {
            std::hint::spin_loop();
        }
    }

    /// Releases every read lock held by `owner`.
    pub fn release_read_lock(&self, owner: LockOwner) {
        let mut state = self.lock_state();
        state.readers().retain(|id| *id != owner.id());
    }

    /// Returns `true` if `owner` holds a read lock and no writer is active.
    pub fn has_read_lock(&self, owner: LockOwner) -> bool {
        if self.writer.load(Ordering::Acquire) != 0 {
            return false;
        }
        let mut state = self.lock_state();
        state.readers().contains(&owner.id())
    }

    /// Releases both read and write locks held by `owner`.
    pub fn release_lock(&self, owner: LockOwner) {
        self.release_read_lock(owner);
        self.release_write_lock(owner);
    }

    /// Returns the number of read locks currently held.
    pub fn reader_count(&self) -> usize {
        let mut state = self.lock_state();
        state.readers().len()
    }

    /// Blocks until a read lock is held, released when the guard is dropped.
    pub fn read(&self) -> ScopedRead<'_> {
        let owner = LockOwner::new();
        self.read_lock(owner);
        ScopedRead { lock: self, owner }
    }

    /// Blocks until the write lock is held, released when the guard is dropped.
    pub fn write(&self) -> ScopedWrite<'_> {
        let owner = LockOwner::new();
        self.write_lock(owner);
        ScopedWrite { lock: self, owner }
    }
}

impl Default for MultiReadLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MultiReadLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiReadLock")
            .field("writer", &self.writer.load(Ordering::Relaxed))
            .field("state_locked", &self.state_locked.load(Ordering::Relaxed))
            .finish()
    }
}

/// Holds a read lock on a [`MultiReadLock`] for its lifetime.
#[derive(Debug)]
pub struct ScopedRead<'a> {
    lock: &'a MultiReadLock,
    owner: LockOwner,
}

impl ScopedRead<'_> {
    /// The owner the read lock was taken for.
    pub fn owner(&self) -> LockOwner {
        self.owner
    }
}

impl Drop for ScopedRead<'_> {
    fn drop(&mut self) {
        self.lock.release_read_lock(self.owner);
    }
}

/// Holds the write lock on a [`MultiReadLock`] for its lifetime.
#[derive(Debug)]
pub struct ScopedWrite<'a> {
    lock: &'a MultiReadLock,
    owner: LockOwner,
}

impl ScopedWrite<'_> {
    /// The owner the write lock was taken for.
    pub fn owner(&self) -> LockOwner {
        self.owner
    }
}

impl Drop for ScopedWrite<'_> {
    fn drop(&mut self) {
        self.lock.release_write_lock(self.owner);
    }
}

/// A value protected by a [`MultiReadLock`].
///
/// Access is handed out as [`ReadRef`] / [`WriteRef`] which release the
/// owner's lock when dropped. An owner that already holds the write lock
/// cannot obtain a second [`WriteRef`]: `try_get_write` returns `None` and
/// `get_write` spins forever.
pub struct MultiReadLocked<T> {
    lock: MultiReadLock,
    value: UnsafeCell<T>,
}

// SAFETY: shared access hands out `&T` to several threads at once (needs `Sync`)
// and exclusive access hands out `&mut T` on arbitrary threads (needs `Send`).
unsafe impl<T: Send> Send for MultiReadLocked<T> {}
unsafe impl<T: Send + Sync> Sync for MultiReadLocked<T> {}

impl<T> MultiReadLocked<T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self {
            lock: MultiReadLock::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Spins until a read lock is held for `owner` and returns the value.
    pub fn get_read(&self, owner: LockOwner) -> ReadRef<'_, T> {
        self.lock.read_lock(owner);
        ReadRef { cell: self, owner }
    }

    /// Returns the value read locked for `owner`, or `None` if the lock could
    /// not be taken immediately.
    pub fn try_get_read(&self, owner: LockOwner) -> Option<ReadRef<'_, T>> {
        self.lock
            .try_read_lock(owner)
            .then(|| ReadRef { cell: self, owner })
    }

    /// Spins until the write lock is held for `owner` and returns the value.
    pub fn get_write(&self, owner: LockOwner) -> WriteRef<'_, T> {
        while !self.lock.try_acquire_write(owner) {
            std::hint::spin_loop();
        }
        WriteRef { cell: self, owner }
    }

    /// Returns the value write locked for `owner`, or `None` if the lock could
    /// not be taken immediately.
    pub fn try_get_write(&self, owner: LockOwner) -> Option<WriteRef<'_, T>> {
        self.lock
            .try_acquire_write(owner)
            .then(|| WriteRef { cell: self, owner })
    }

    /// Returns `true` if `owner` currently holds a read lock.
    pub fn has_read_lock(&self, owner: LockOwner) -> bool {
        self.lock.has_read_lock(owner)
    }

    /// Returns `true` if `owner` currently holds the write lock.
    pub fn has_write_lock(&self, owner: LockOwner) -> bool {
        self.lock.has_write_lock(owner)
    }

    /// Mutable access without locking, available when the value is not shared.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the wrapper and returns the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for MultiReadLocked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for MultiReadLocked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiReadLocked")
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

/// Shared access to a [`MultiReadLocked`] value.
pub struct ReadRef<'a, T> {
    cell: &'a MultiReadLocked<T>,
    owner: LockOwner,
}

impl<T> Deref for ReadRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a read lock is held, so no `WriteRef` exists.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> Drop for ReadRef<'_, T> {
    fn drop(&mut self) {
        self.cell.lock.release_one_read(self.owner);
    }
}

/// Exclusive access to a [`MultiReadLocked`] value.
pub struct WriteRef<'a, T> {
    cell: &'a MultiReadLocked<T>,
    owner: LockOwner,
}

impl<T> Deref for WriteRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the write lock is held by this reference alone.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> DerefMut for WriteRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the write lock is held by this reference alone.
        unsafe { &mut *self.cell.value.get() }
    }
}

impl<T> Drop for WriteRef<'_, T> {
    fn drop(&mut self) {
        self.cell.lock.release_write_lock(self.owner);
    }
}
