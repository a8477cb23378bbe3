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

//! Defines the error types shared by the core building blocks.

use std::fmt;

/// An error raised by a [`FixedSizeResourcePool`](crate::pool::FixedSizeResourcePool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The requested capacity cannot be addressed by the pool's handle type.
    CapacityTooLarge {
        /// The capacity that was requested.
        requested: usize,
        /// The largest id the handle type can represent.
        max_id: u32,
    },
    /// The handle does not refer to a live item (released, recycled or invalid).
    StaleHandle {
        /// The id part of the offending handle.
        id: u32,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::CapacityTooLarge { requested, max_id } => write!(
                f,
                "Handle type does not provide support for {requested} items (max id {max_id})"
            ),
            PoolError::StaleHandle { id } => {
                write!(f, "Handle with id {id} does not refer to a live pool item")
            }
        }
    }
}

impl std::error::Error for PoolError {}

/// An error raised while registering or overriding settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// No settings item is registered under this name.
    UnknownSection(String),
    /// The settings item exists but has no property with this name.
    UnknownProperty {
        /// The settings item name.
        section: String,
        /// The property name that was not found.
        property: String,
    },
    /// The value could not be parsed into the property's type.
    InvalidValue {
        /// The property name.
        property: String,
        /// The raw value that failed to parse.
        value: String,
    },
    /// A settings item is already registered under this name with another type.
    TypeMismatch(String),
    /// An override token was not of the form `Section.Property=value`.
    MalformedOverride(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::UnknownSection(name) => write!(f, "Unknown settings section '{name}'"),
            SettingsError::UnknownProperty { section, property } => {
                write!(f, "Settings section '{section}' has no property '{property}'")
            }
            SettingsError::InvalidValue { property, value } => {
                write!(f, "Invalid value '{value}' for property '{property}'")
            }
            SettingsError::TypeMismatch(name) => write!(
                f,
                "Settings section '{name}' is already registered with a different type"
            ),
            SettingsError::MalformedOverride(token) => write!(
                f,
                "Malformed settings override '{token}', expected Section.Property=value"
            ),
        }
    }
}

impl std::error::Error for SettingsError {}

/// An error raised by the [`SystemRegistry`](crate::system::SystemRegistry) lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// A system reported [`InitResult::Failed`](crate::system::InitResult::Failed).
    InitFailed(String),
    /// A full initialization pass made no progress while systems kept asking to retry.
    InitStalled(Vec<String>),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::InitFailed(name) => write!(f, "Failed to initialize system: {name}"),
            SystemError::InitStalled(names) => write!(
                f,
                "System initialization stalled, still waiting on: {}",
                names.join(", ")
            ),
        }
    }
}

impl std::error::Error for SystemError {}
