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

//! # Aspect Threading
//!
//! The engine's thread management: a [`Threading`] system owning a fixed pool
//! of worker threads that run permanent callback-driven work, and a
//! [`ThreadedTasks`] system dispatching one-shot prioritized tasks on
//! dedicated workers.

#![warn(missing_docs)]

pub mod error;
pub mod tasks;
pub mod threading;

pub use error::ThreadingError;
pub use tasks::{
    Task, TaskParams, TaskPriority, TaskQueue, ThreadedTasks, ThreadedTasksSettings,
};
pub use threading::{
    ObtainThreadParams, ThreadCallback, ThreadHandle, ThreadResult, ThreadState, ThreadStats,
    Threading, ThreadingSettings,
};
