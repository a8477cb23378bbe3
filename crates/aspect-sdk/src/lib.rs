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

//! The public-facing SDK of the Aspect engine.
//!
//! An [`Application`] owns the engine systems, drives their lifecycle and runs
//! the frame loop. Games customize it through an [`AppDelegate`].

pub mod application;
pub mod updateables;

pub use application::{
    create_default_systems, frame_budget, AppDelegate, AppSettings, Application, DefaultDelegate,
    FrameContext, QuitHandle, SetupParams,
};
pub use updateables::{Updateable, UpdateableId, Updateables};

pub mod prelude {
    //! Commonly used engine types.
    pub use crate::{
        AppDelegate, AppSettings, Application, FrameContext, QuitHandle, SetupParams, Updateable,
        Updateables,
    };
    pub use aspect_core::logging::{ConsoleListener, LogEntry, LogLevel, LogListener, Logging};
    pub use aspect_core::{
        FixedSizeResourcePool, Handle, InitResult, MultiReadLocked, SettingsFile, SettingsItem,
        Stopwatch, System, SystemContext, SystemRegistry, SystemState,
    };
    pub use aspect_threading::{
        ObtainThreadParams, TaskParams, TaskPriority, ThreadHandle, ThreadResult, ThreadedTasks,
        Threading,
    };
}
