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

//! Errors raised by the threading systems.

/// An error raised while obtaining or starting worker threads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadingError {
    /// The [`Threading`](crate::Threading) system has not been initialized
    /// (or has already been shut down).
    #[error("Threading system is not initialized")]
    NotInitialized,
    /// Every worker thread is already assigned.
    #[error("No thread available")]
    NoThreadAvailable,
    /// Automatic sizing needs at least two hardware threads.
    #[error("Hardware concurrency of {available} is too low, at least 2 threads are required")]
    InsufficientConcurrency {
        /// Hardware threads reported by the platform.
        available: usize,
    },
    /// The operating system refused to start a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(String),
}
