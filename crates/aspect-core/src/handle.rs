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

//! Typed, recyclable handles.
//!
//! A [`Handle`] pairs a slot id with a process-wide unique stamp. When a slot
//! is released and handed out again, the new handle gets a fresh stamp, so old
//! handles pointing to the recycled slot compare unequal and can no longer
//! reach the new item.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

/// Stamp source shared by every handle type. Zero is reserved for [`Handle::INVALID`].
static NEXT_UNIQUE: AtomicU32 = AtomicU32::new(1);

/// Marker trait tying a [`Handle`] to the kind of resource it addresses.
pub trait HandleMarker: 'static {
    /// The largest id this handle kind can address. Pools using the handle
    /// must have a capacity strictly below this value.
    const MAX_ID: u32 = u32::MAX;
}

/// Default marker for general purpose pools.
#[derive(Debug)]
pub enum AnyResource {}

impl HandleMarker for AnyResource {}

/// A handle to a slot in a fixed-size pool.
pub struct Handle<M: HandleMarker = AnyResource> {
    id: u32,
    unique: u32,
    _marker: PhantomData<fn() -> M>,
}

impl<M: HandleMarker> Handle<M> {
    /// The handle that never refers to anything.
    pub const INVALID: Self = Self::from_raw(0, 0);

    /// The largest id this handle type can address.
    pub const MAX_ID: u32 = M::MAX_ID;

    /// Creates a handle for `id` with a fresh unique stamp.
    pub fn create(id: u32) -> Self {
        let mut unique = NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed);
        if unique == 0 {
            // Wrapped around; zero belongs to INVALID.
            unique = NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed);
        }
        Self::from_raw(id, unique)
    }

    pub(crate) const fn from_raw(id: u32, unique: u32) -> Self {
        Self {
            id,
            unique,
            _marker: PhantomData,
        }
    }

    /// Returns the slot id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the unique stamp.
    pub fn unique(&self) -> u32 {
        self.unique
    }

    /// Returns `true` unless this is [`Handle::INVALID`].
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Packs the handle into a single word, used for atomic storage.
    pub(crate) fn to_bits(self) -> u64 {
        (u64::from(self.id) << 32) | u64::from(self.unique)
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    pub(crate) fn from_bits(bits: u64) -> Self {
        Self::from_raw((bits >> 32) as u32, bits as u32)
    }
}

impl<M: HandleMarker> Clone for Handle<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: HandleMarker> Copy for Handle<M> {}

impl<M: HandleMarker> PartialEq for Handle<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.unique == other.unique
    }
}

impl<M: HandleMarker> Eq for Handle<M> {}

impl<M: HandleMarker> Hash for Handle<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.unique.hash(state);
    }
}

impl<M: HandleMarker> Default for Handle<M> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<M: HandleMarker> fmt::Debug for Handle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("unique", &self.unique)
            .finish()
    }
}

impl<M: HandleMarker> fmt::Display for Handle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Small {}

    impl HandleMarker for Small {
        const MAX_ID: u32 = u8::MAX as u32;
    }

    #[test]
    fn invalid_handle_is_not_valid() {
        let handle: Handle = Handle::INVALID;
        assert!(!handle.is_valid());
        assert_eq!(Handle::<AnyResource>::default(), Handle::INVALID);
    }

    #[test]
    fn created_handles_are_valid_even_for_slot_zero() {
        let handle: Handle = Handle::create(0);
        assert!(handle.is_valid());
        assert_eq!(handle.id(), 0);
    }

    #[test]
    fn recreating_the_same_slot_gives_a_different_handle() {
        let first: Handle = Handle::create(3);
        let second: Handle = Handle::create(3);
        assert_eq!(first.id(), second.id());
        assert_ne!(first, second);
    }

    #[test]
    fn bits_round_trip() {
        let handle: Handle = Handle::create(42);
        assert_eq!(Handle::<AnyResource>::from_bits(handle.to_bits()), handle);
        assert_eq!(Handle::<AnyResource>::INVALID.to_bits(), 0);
    }

    #[test]
    fn marker_controls_max_id() {
        assert_eq!(Handle::<Small>::MAX_ID, 255);
        assert_eq!(Handle::<AnyResource>::MAX_ID, u32::MAX);
    }
}
