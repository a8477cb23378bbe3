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

//! A fixed-capacity, handle-indexed object pool.
//!
//! Every slot is created up front. Slots are claimed with a compare-and-swap
//! on their in-use flag, so allocation and release only need `&self` and the
//! pool can be shared between threads. Items needing mutation from several
//! threads bring their own interior mutability.

use crate::error::PoolError;
use crate::handle::{AnyResource, Handle, HandleMarker};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

const INVALID_BITS: u64 = 0;

#[derive(Default)]
struct SlotMeta {
    in_use: AtomicBool,
    /// The currently valid handle for the slot, packed; zero while free.
    handle: AtomicU64,
}

/// A pool with a capacity fixed at construction.
pub struct FixedSizeResourcePool<T, M: HandleMarker = AnyResource> {
    items: Vec<T>,
    metas: Vec<SlotMeta>,
    in_use: AtomicUsize,
    _marker: PhantomData<fn() -> M>,
}

impl<T: Default, M: HandleMarker> FixedSizeResourcePool<T, M> {
    /// Creates a pool of `capacity` default-constructed items.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        Self::with_factory(capacity, |_| T::default())
    }
}

impl<T, M: HandleMarker> FixedSizeResourcePool<T, M> {
    /// Creates a pool whose item at slot `i` is built by `factory(i)`.
    pub fn with_factory(
        capacity: usize,
        factory: impl FnMut(usize) -> T,
    ) -> Result<Self, PoolError> {
        if capacity as u64 >= u64::from(M::MAX_ID) {
            return Err(PoolError::CapacityTooLarge {
                requested: capacity,
                max_id: M::MAX_ID,
            });
        }

        Ok(Self {
            items: (0..capacity).map(factory).collect(),
            metas: (0..capacity).map(|_| SlotMeta::default()).collect(),
            in_use: AtomicUsize::new(0),
            _marker: PhantomData,
        })
    }

    /// Claims the first free slot and returns its handle together with the item.
    ///
    /// Returns `None` (and logs a warning) when every slot is in use.
    pub fn allocate(&self) -> Option<(Handle<M>, &T)> {
        for (index, (item, meta)) in self.items.iter().zip(&self.metas).enumerate() {
            if meta
                .in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let handle = Handle::create(index as u32);
                meta.handle.store(handle.to_bits(), Ordering::Release);
                let previous = self.in_use.fetch_add(1, Ordering::AcqRel);
                debug_assert!(previous < self.capacity(), "resource pool count overflow");
                return Some((handle, item));
            }
        }

        log::warn!(target: "Resource Pool", "Unable to allocate inside fixed size resource pool");
        None
    }

    /// Releases the slot `handle` refers to, if `handle` is still current.
    ///
    /// The caller's handle is always reset to [`Handle::INVALID`]. Returns
    /// whether a slot was actually released.
    pub fn release(&self, handle: &mut Handle<M>) -> bool {
        let released = handle.is_valid()
            && self.metas.get(handle.id() as usize).is_some_and(|meta| {
                let won = meta
                    .handle
                    .compare_exchange(
                        handle.to_bits(),
                        INVALID_BITS,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok();
                if won {
                    meta.in_use.store(false, Ordering::Release);
                    let previous = self.in_use.fetch_sub(1, Ordering::AcqRel);
                    debug_assert!(previous > 0, "resource pool count underflow");
                }
                won
            });

        *handle = Handle::INVALID;
        released
    }

    fn is_current(&self, handle: Handle<M>) -> bool {
        handle.is_valid()
            && self
                .metas
                .get(handle.id() as usize)
                .is_some_and(|meta| meta.handle.load(Ordering::Acquire) == handle.to_bits())
    }

    /// Returns the item `handle` refers to while the handle is current.
    pub fn try_get(&self, handle: Handle<M>) -> Option<&T> {
        if self.is_current(handle) {
            self.items.get(handle.id() as usize)
        } else {
            None
        }
    }

    /// Mutable variant of [`try_get`](Self::try_get).
    pub fn try_get_mut(&mut self, handle: Handle<M>) -> Option<&mut T> {
        if self.is_current(handle) {
            self.items.get_mut(handle.id() as usize)
        } else {
            None
        }
    }

    /// Returns the item `handle` refers to, or [`PoolError::StaleHandle`].
    pub fn get(&self, handle: Handle<M>) -> Result<&T, PoolError> {
        self.try_get(handle)
            .ok_or(PoolError::StaleHandle { id: handle.id() })
    }

    /// Returns `true` while `handle` refers to an allocated slot.
    pub fn contains(&self, handle: Handle<M>) -> bool {
        self.is_current(handle)
    }

    /// The maximum number of items.
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// The number of slots currently allocated.
    pub fn count(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Iterates over every slot, allocated or not.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates over the allocated slots with their current handles.
    pub fn iter_in_use(&self) -> impl Iterator<Item = (Handle<M>, &T)> + '_ {
        self.items
            .iter()
            .zip(&self.metas)
            .filter_map(|(item, meta)| {
                let bits = meta.handle.load(Ordering::Acquire);
                (bits != INVALID_BITS).then(|| (Handle::from_bits(bits), item))
            })
    }
}

impl<'a, T, M: HandleMarker> IntoIterator for &'a FixedSizeResourcePool<T, M> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, M: HandleMarker> fmt::Debug for FixedSizeResourcePool<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedSizeResourcePool")
            .field("capacity", &self.capacity())
            .field("count", &self.count())
            .finish()
    }
}
