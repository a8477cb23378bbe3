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

//! Named, typed settings items shared between systems.
//!
//! A [`SettingsFile`] collects one settings item per system. Systems register
//! their item while the application loads settings and keep the returned
//! shared handle. Items expose their properties as strings so they can be
//! listed and overridden from the command line with `Section.Property=value`.

use crate::error::SettingsError;
use std::any::Any;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

/// A group of properties belonging to one system.
pub trait SettingsItem: Any + Send + Sync {
    /// Returns every property with its current value rendered as a string.
    fn properties(&self) -> Vec<(&'static str, String)>;

    /// Parses `value` into the property called `name`.
    fn set_property(&mut self, name: &str, value: &str) -> Result<(), SettingsError>;
}

/// Parses a property value, mapping failures to [`SettingsError::InvalidValue`].
pub fn parse_property<T: FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidValue {
        property: name.to_owned(),
        value: value.to_owned(),
    })
}

struct SettingsEntry {
    name: String,
    item: Arc<RwLock<dyn SettingsItem>>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// A collection of named settings items.
pub struct SettingsFile {
    name: String,
    entries: Vec<SettingsEntry>,
}

impl SettingsFile {
    /// Creates an empty settings file.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// The name of this settings file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a default-constructed item under `name` and returns it.
    ///
    /// Registering the same name twice returns the original item. Reusing a
    /// name with another item type fails with [`SettingsError::TypeMismatch`].
    pub fn register<T: SettingsItem + Default>(
        &mut self,
        name: &str,
    ) -> Result<Arc<RwLock<T>>, SettingsError> {
        if self.entries.iter().any(|e| e.name == name) {
            return self.get::<T>(name);
        }

        let item = Arc::new(RwLock::new(T::default()));
        self.entries.push(SettingsEntry {
            name: name.to_owned(),
            item: item.clone(),
            typed: item.clone(),
        });
        log::debug!(target: "Settings", "Registered settings item: {name}");
        Ok(item)
    }

    /// Returns the item registered under `name`.
    pub fn get<T: SettingsItem>(&self, name: &str) -> Result<Arc<RwLock<T>>, SettingsError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| SettingsError::UnknownSection(name.to_owned()))?;

        entry
            .typed
            .clone()
            .downcast::<RwLock<T>>()
            .map_err(|_| SettingsError::TypeMismatch(name.to_owned()))
    }

    /// Names of all registered items, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets a single property of the item registered under `section`.
    pub fn set(&self, section: &str, property: &str, value: &str) -> Result<(), SettingsError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == section)
            .ok_or_else(|| SettingsError::UnknownSection(section.to_owned()))?;

        let mut item = entry.item.write().unwrap_or_else(PoisonError::into_inner);
        match item.set_property(property, value) {
            Err(SettingsError::UnknownProperty { .. }) => Err(SettingsError::UnknownProperty {
                section: section.to_owned(),
                property: property.to_owned(),
            }),
            other => other,
        }
    }

    /// Applies an override of the form `Section.Property=value`.
    pub fn apply_override(&self, token: &str) -> Result<(), SettingsError> {
        let malformed = || SettingsError::MalformedOverride(token.to_owned());
        let (key, value) = token.split_once('=').ok_or_else(malformed)?;
        let (section, property) = key.split_once('.').ok_or_else(malformed)?;
        if section.is_empty() || property.is_empty() {
            return Err(malformed());
        }
        self.set(section, property, value)
    }

    /// Applies every override token in `args`, skipping tokens that are not
    /// overrides (flags, positional arguments). Returns the errors of the
    /// overrides that could not be applied.
    pub fn apply_overrides<S: AsRef<str>>(&self, args: &[S]) -> Vec<SettingsError> {
        args.iter()
            .map(AsRef::as_ref)
            .filter(|arg| !arg.starts_with('-') && arg.contains('='))
            .filter_map(|arg| self.apply_override(arg).err())
            .collect()
    }

    /// Returns every `(section, property, value)` triple.
    pub fn snapshot(&self) -> Vec<(String, &'static str, String)> {
        self.entries
            .iter()
            .flat_map(|entry| {
                let item = entry.item.read().unwrap_or_else(PoisonError::into_inner);
                item.properties()
                    .into_iter()
                    .map(|(property, value)| (entry.name.clone(), property, value))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Logs every registered property.
    pub fn dump(&self) {
        log::info!(target: "Settings", "--- {} ---", self.name);
        for (section, property, value) in self.snapshot() {
            log::info!(target: "Settings", "  {section}.{property} = {value}");
        }
    }
}

impl std::fmt::Debug for SettingsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsFile")
            .field("name", &self.name)
            .field("items", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
