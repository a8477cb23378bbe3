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

//! # Aspect Core
//!
//! Foundational crate containing the concurrency primitives, the handle-indexed
//! resource pool and the system lifecycle contracts the rest of the engine is
//! built on.

#![warn(missing_docs)]

pub mod error;
pub mod handle;
pub mod logging;
pub mod pool;
pub mod settings;
pub mod sync;
pub mod system;
pub mod utils;

pub use error::{PoolError, SettingsError, SystemError};
pub use handle::{Handle, HandleMarker};
pub use logging::{ConsoleListener, LogEntry, LogLevel, LogListener, Logging, LoggingSettings};
pub use pool::FixedSizeResourcePool;
pub use settings::{SettingsFile, SettingsItem};
pub use sync::{LockOwner, MultiReadLock, MultiReadLocked};
pub use system::{InitResult, System, SystemContext, SystemRegistry, SystemState};
pub use utils::timer::Stopwatch;
