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

//! Engine systems and their lifecycle.
//!
//! A [`System`] is a long-lived engine subsystem (threading, task dispatch,
//! logging, ...). Systems are owned by a [`SystemRegistry`], which drives them
//! through settings registration, command-line handling, initialization,
//! per-frame updates and shutdown.

mod registry;

pub use self::registry::{SystemContext, SystemRegistry};

use crate::settings::SettingsFile;
use std::any::Any;
use std::fmt;

/// The outcome of a single initialization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitResult {
    /// The system is ready.
    Initialized,
    /// The system depends on something that is not ready yet; try again on the
    /// next pass.
    Retry,
    /// The system cannot be initialized. Startup is aborted.
    Failed,
}

/// The lifecycle state of a system inside a [`SystemRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    /// Created but not initialized yet (or still retrying).
    #[default]
    Uninitialized,
    /// Successfully initialized.
    Initialized,
    /// Initialization reported [`InitResult::Failed`].
    FailedToInitialize,
    /// The system has been shut down.
    Shutdown,
}

impl SystemState {
    /// Returns a human-readable name for the state.
    pub fn name(&self) -> &'static str {
        match self {
            SystemState::Uninitialized => "Uninitialized",
            SystemState::Initialized => "Initialized",
            SystemState::FailedToInitialize => "Failed to initialize",
            SystemState::Shutdown => "Shutdown",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The interface every engine system implements.
///
/// Every hook except [`name`](System::name) and the downcasting accessors has
/// a no-op default, so a system only implements the phases it cares about.
pub trait System: Send + 'static {
    /// A unique, human-readable name used in logs and lookups.
    fn name(&self) -> &str;

    /// Registers the system's settings item(s).
    fn create_settings(&mut self, _settings: &mut SettingsFile) {}

    /// Receives the application command line, split on spaces.
    fn handle_command_line(&mut self, _args: &[String]) {}

    /// Attempts to initialize the system.
    ///
    /// `ctx` gives access to the other systems of the registry.
    fn on_initialize(&mut self, _ctx: &mut SystemContext<'_>) -> InitResult {
        InitResult::Initialized
    }

    /// Releases the system's resources. Called in reverse creation order.
    fn on_shutdown(&mut self, _ctx: &mut SystemContext<'_>) {}

    /// Called at the start of every frame.
    fn begin_frame(&mut self) {}

    /// Called once per frame with the duration of the previous frame in seconds.
    fn update(&mut self, _dt: f32) {}

    /// Called once per frame after every system has been updated.
    fn render(&mut self) {}

    /// Called at the end of every frame.
    fn end_frame(&mut self) {}

    /// Allows downcasting to concrete system types.
    fn as_any(&self) -> &dyn Any;

    /// Allows mutable downcasting to concrete system types.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
