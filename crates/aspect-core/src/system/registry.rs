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

use super::{InitResult, System, SystemState};
use crate::error::SystemError;
use crate::settings::SettingsFile;

const LOG_TAG: &str = "Systems";

struct SystemEntry {
    name: String,
    state: SystemState,
    // Vacant only while the system runs one of its own lifecycle hooks.
    system: Option<Box<dyn System>>,
}

impl SystemEntry {
    fn new(system: Box<dyn System>) -> Self {
        Self {
            name: system.name().to_owned(),
            state: SystemState::Uninitialized,
            system: Some(system),
        }
    }

    fn downcast_ref<T: System>(&self) -> Option<&T> {
        self.system.as_deref()?.as_any().downcast_ref::<T>()
    }

    fn downcast_mut<T: System>(&mut self) -> Option<&mut T> {
        self.system.as_deref_mut()?.as_any_mut().downcast_mut::<T>()
    }
}

/// Owns the engine systems and drives their lifecycle in creation order.
#[derive(Default)]
pub struct SystemRegistry {
    entries: Vec<SystemEntry>,
}

impl SystemRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the system of type `T`, creating it first if it does not exist.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly while the `T` system is running one of
    /// its lifecycle hooks, which the registry's borrow rules prevent.
    pub fn create<T: System + Default>(&mut self) -> &mut T {
        let index = match self.index_of::<T>() {
            Some(index) => index,
            None => {
                self.push(Box::new(T::default()));
                self.entries.len() - 1
            }
        };
        self.entries[index]
            .downcast_mut::<T>()
            .expect("system slot is occupied outside of lifecycle hooks")
    }

    /// Adds an already constructed system and returns its index.
    ///
    /// Use this for systems that need constructor arguments. Adding a second
    /// system of an existing type keeps both; lookups return the first one.
    pub fn insert(&mut self, system: Box<dyn System>) -> usize {
        self.push(system);
        self.entries.len() - 1
    }

    fn push(&mut self, system: Box<dyn System>) {
        log::debug!(target: LOG_TAG, "Created system: {}", system.name());
        self.entries.push(SystemEntry::new(system));
    }

    fn index_of<T: System>(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.downcast_ref::<T>().is_some())
    }

    /// Returns the system of type `T`, if one was created.
    #[must_use]
    pub fn find<T: System>(&self) -> Option<&T> {
        self.entries.iter().find_map(SystemEntry::downcast_ref::<T>)
    }

    /// Returns the system of type `T` mutably, if one was created.
    pub fn find_mut<T: System>(&mut self) -> Option<&mut T> {
        self.entries.iter_mut().find_map(SystemEntry::downcast_mut::<T>)
    }

    /// Returns the system registered under `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&dyn System> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.system.as_deref())
    }

    /// Returns the lifecycle state of the system of type `T`.
    #[must_use]
    pub fn state_of<T: System>(&self) -> Option<SystemState> {
        self.entries
            .iter()
            .find(|e| e.downcast_ref::<T>().is_some())
            .map(|e| e.state)
    }

    /// Returns the lifecycle state of the system registered under `name`.
    #[must_use]
    pub fn state_by_name(&self, name: &str) -> Option<SystemState> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.state)
    }

    /// Names of every system, in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry holds no systems.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lets every system register its settings.
    pub fn create_settings_all(&mut self, settings: &mut SettingsFile) {
        for system in self.systems_mut() {
            system.create_settings(settings);
        }
    }

    /// Forwards the split command line to every system.
    pub fn handle_command_line_all(&mut self, args: &[String]) {
        for system in self.systems_mut() {
            system.handle_command_line(args);
        }
    }

    /// Initializes every system, in creation order.
    ///
    /// Systems answering [`InitResult::Retry`] are retried on further passes
    /// until they succeed. A system answering [`InitResult::Failed`] aborts
    /// initialization. A pass that initializes nothing while systems are still
    /// retrying aborts with [`SystemError::InitStalled`].
    pub fn initialize_all(&mut self) -> Result<(), SystemError> {
        loop {
            let mut progressed = false;
            let mut waiting = Vec::new();

            for index in 0..self.entries.len() {
                if self.entries[index].state != SystemState::Uninitialized {
                    continue;
                }

                let name = self.entries[index].name.clone();
                match self.initialize_at(index) {
                    InitResult::Initialized => {
                        log::info!(target: LOG_TAG, "Initialized system: {name}");
                        progressed = true;
                    }
                    InitResult::Retry => waiting.push(name),
                    InitResult::Failed => {
                        log::error!(target: LOG_TAG, "Failed to initialize system: {name}");
                        return Err(SystemError::InitFailed(name));
                    }
                }
            }

            if waiting.is_empty() {
                return Ok(());
            }
            if !progressed {
                log::error!(
                    target: LOG_TAG,
                    "System initialization stalled, still waiting on: {}",
                    waiting.join(", ")
                );
                return Err(SystemError::InitStalled(waiting));
            }
        }
    }

    fn initialize_at(&mut self, index: usize) -> InitResult {
        let Some(mut system) = self.entries[index].system.take() else {
            return InitResult::Retry;
        };

        let result = system.on_initialize(&mut SystemContext {
            entries: &mut self.entries,
        });

        let entry = &mut self.entries[index];
        entry.system = Some(system);
        match result {
            InitResult::Initialized => entry.state = SystemState::Initialized,
            InitResult::Failed => entry.state = SystemState::FailedToInitialize,
            InitResult::Retry => {}
        }
        result
    }

    /// Shuts every system down in reverse creation order, then drops them.
    ///
    /// Only systems that were initialized (or failed to) receive
    /// [`System::on_shutdown`]. Every system ends in [`SystemState::Shutdown`].
    pub fn shutdown_all(&mut self) {
        for index in (0..self.entries.len()).rev() {
            let state = self.entries[index].state;
            if matches!(
                state,
                SystemState::Initialized | SystemState::FailedToInitialize
            ) {
                if let Some(mut system) = self.entries[index].system.take() {
                    log::info!(target: LOG_TAG, "Shutting down system: {}", system.name());
                    system.on_shutdown(&mut SystemContext {
                        entries: &mut self.entries,
                    });
                    self.entries[index].system = Some(system);
                }
            }
            self.entries[index].state = SystemState::Shutdown;
        }

        while let Some(entry) = self.entries.pop() {
            drop(entry);
        }
    }

    /// Calls [`System::begin_frame`] on every system.
    pub fn begin_frame_all(&mut self) {
        for system in self.systems_mut() {
            system.begin_frame();
        }
    }

    /// Calls [`System::update`] on every system.
    pub fn update_all(&mut self, dt: f32) {
        for system in self.systems_mut() {
            system.update(dt);
        }
    }

    /// Calls [`System::render`] on every system.
    pub fn render_all(&mut self) {
        for system in self.systems_mut() {
            system.render();
        }
    }

    /// Calls [`System::end_frame`] on every system.
    pub fn end_frame_all(&mut self) {
        for system in self.systems_mut() {
            system.end_frame();
        }
    }

    fn systems_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn System>> {
        self.entries.iter_mut().filter_map(|e| e.system.as_mut())
    }
}

impl Drop for SystemRegistry {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.shutdown_all();
        }
    }
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.name, e.state)))
            .finish()
    }
}

/// A view of the other systems handed to a system during its initialization
/// and shutdown.
///
/// The system being initialized is not reachable through its own context.
pub struct SystemContext<'a> {
    entries: &'a mut Vec<SystemEntry>,
}

impl SystemContext<'_> {
    /// Returns another system of type `T`.
    #[must_use]
    pub fn find<T: System>(&self) -> Option<&T> {
        self.entries.iter().find_map(SystemEntry::downcast_ref::<T>)
    }

    /// Returns another system of type `T` mutably.
    pub fn find_mut<T: System>(&mut self) -> Option<&mut T> {
        self.entries.iter_mut().find_map(SystemEntry::downcast_mut::<T>)
    }

    /// Returns the lifecycle state of another system of type `T`.
    #[must_use]
    pub fn state_of<T: System>(&self) -> Option<SystemState> {
        self.entries
            .iter()
            .find(|e| e.downcast_ref::<T>().is_some())
            .map(|e| e.state)
    }

    /// Returns another system by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&dyn System> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.system.as_deref())
    }
}
