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

//! A system ticking arbitrary objects once per frame.

use aspect_core::System;
use std::any::Any;

/// Something updated once per frame.
pub trait Updateable: Send {
    /// Advances the object by `dt` seconds.
    fn update(&mut self, dt: f32);
}

impl<F> Updateable for F
where
    F: FnMut(f32) + Send,
{
    fn update(&mut self, dt: f32) {
        self(dt)
    }
}

/// Identifies a registered [`Updateable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdateableId(u64);

/// Holds updateable objects and ticks them in registration order.
#[derive(Default)]
pub struct Updateables {
    items: Vec<(UpdateableId, Box<dyn Updateable>)>,
    next_id: u64,
}

impl Updateables {
    /// The system name.
    pub const NAME: &'static str = "Updateables";

    /// Registers an object and returns its id.
    pub fn register(&mut self, item: Box<dyn Updateable>) -> UpdateableId {
        self.next_id += 1;
        let id = UpdateableId(self.next_id);
        self.items.push((id, item));
        id
    }

    /// Removes an object. Returns `false` if the id is unknown.
    pub fn unregister(&mut self, id: UpdateableId) -> bool {
        let before = self.items.len();
        self.items.retain(|(item_id, _)| *item_id != id);
        self.items.len() != before
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl System for Updateables {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn update(&mut self, dt: f32) {
        for (_, item) in &mut self.items {
            item.update(dt);
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
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn registered_items_are_ticked_until_removed() {
        let ticks = Arc::new(AtomicU32::new(0));
        let mut updateables = Updateables::default();
        let counter = ticks.clone();
        let id = updateables.register(Box::new(move |_dt: f32| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        updateables.update(0.1);
        updateables.update(0.1);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        assert!(updateables.unregister(id));
        assert!(!updateables.unregister(id));
        updateables.update(0.1);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert!(updateables.is_empty());
    }
}
