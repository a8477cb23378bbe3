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

//! The engine's listener-based logging backend.
//!
//! Engine code logs through the `log` facade, using the record target as the
//! message tag (`log::warn!(target: "Threads", ...)`). The [`Logging`] system
//! installs a global dispatcher that converts each record into a [`LogEntry`]
//! and forwards it to every registered [`LogListener`].

use crate::error::SettingsError;
use crate::settings::{parse_property, SettingsFile, SettingsItem};
use crate::system::{InitResult, System, SystemContext};
use std::any::Any;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    /// Informational messages, including debug and trace records.
    #[default]
    Info,
    /// Something unexpected that the engine can recover from.
    Warning,
    /// A failure.
    Error,
}

impl LogLevel {
    /// Returns the level's display name.
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Info => "Info",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Info,
            1 => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }

    fn as_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Info => log::LevelFilter::Trace,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warning,
            log::Level::Info | log::Level::Debug | log::Level::Trace => LogLevel::Info,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single message handed to listeners.
#[derive(Debug, Clone, Copy)]
pub struct LogEntry<'a> {
    /// Severity.
    pub level: LogLevel,
    /// The tag (the `log` record target).
    pub tag: &'a str,
    /// The formatted message.
    pub message: &'a str,
    /// Source file of the call site, when known.
    pub file: Option<&'a str>,
    /// Source line of the call site, when known.
    pub line: Option<u32>,
}

impl fmt::Display for LogEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:<8}] [{:<16}] {} ({} : {})",
            self.level.name(),
            self.tag,
            self.message,
            self.file.unwrap_or("unknown"),
            self.line.unwrap_or(0)
        )
    }
}

/// Receives every log entry accepted by the dispatcher.
pub trait LogListener: Send + Sync {
    /// Handles one entry.
    fn log(&self, entry: &LogEntry<'_>);
}

impl<F> LogListener for F
where
    F: Fn(&LogEntry<'_>) + Send + Sync,
{
    fn log(&self, entry: &LogEntry<'_>) {
        self(entry)
    }
}

/// Prints entries to the console. Errors go to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleListener;

impl LogListener for ConsoleListener {
    fn log(&self, entry: &LogEntry<'_>) {
        // Console write failures have nowhere else to be reported.
        let _ = if entry.level == LogLevel::Error {
            writeln!(std::io::stderr().lock(), "{entry}")
        } else {
            writeln!(std::io::stdout().lock(), "{entry}")
        };
    }
}

struct Dispatcher {
    listeners: RwLock<Vec<Arc<dyn LogListener>>>,
    level_filter: AtomicU8,
    crash_on_error: AtomicBool,
}

static DISPATCHER: Dispatcher = Dispatcher {
    listeners: RwLock::new(Vec::new()),
    level_filter: AtomicU8::new(0),
    crash_on_error: AtomicBool::new(false),
};

impl Dispatcher {
    fn level_filter(&self) -> LogLevel {
        LogLevel::from_u8(self.level_filter.load(Ordering::Relaxed))
    }

    fn snapshot(&self) -> Vec<Arc<dyn LogListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(&self, entry: &LogEntry<'_>) {
        if entry.level < self.level_filter() {
            return;
        }

        let listeners = self.snapshot();
        if listeners.is_empty() {
            return;
        }
        for listener in &listeners {
            listener.log(entry);
        }

        if entry.level == LogLevel::Error && self.crash_on_error.load(Ordering::Relaxed) {
            panic!("[{}] {}", entry.tag, entry.message);
        }
    }
}

impl log::Log for Dispatcher {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        LogLevel::from(metadata.level()) >= self.level_filter()
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        self.dispatch(&LogEntry {
            level: record.level().into(),
            tag: record.target(),
            message: &message,
            file: record.file(),
            line: record.line(),
        });
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Installs the dispatcher as the global `log` backend.
///
/// Fails if another logger was installed first.
pub fn install() -> Result<(), log::SetLoggerError> {
    log::set_logger(&DISPATCHER)?;
    log::set_max_level(DISPATCHER.level_filter().as_level_filter());
    Ok(())
}

/// Adds a listener to the global dispatcher.
pub fn add_listener(listener: Arc<dyn LogListener>) {
    DISPATCHER
        .listeners
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(listener);
}

/// Removes every listener from the global dispatcher.
pub fn clear_listeners() {
    DISPATCHER
        .listeners
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Number of listeners registered with the global dispatcher.
pub fn listener_count() -> usize {
    DISPATCHER.snapshot().len()
}

/// Sends an entry straight to the listeners, bypassing the `log` facade.
///
/// The level filter and crash-on-error switch still apply.
pub fn dispatch(entry: &LogEntry<'_>) {
    DISPATCHER.dispatch(entry);
}

/// Sets the minimum level forwarded to listeners.
pub fn set_level_filter(level: LogLevel) {
    DISPATCHER.level_filter.store(level as u8, Ordering::Relaxed);
    if log::max_level() != log::LevelFilter::Off {
        log::set_max_level(level.as_level_filter());
    }
}

/// When enabled, logging an error panics after listeners received it.
pub fn set_crash_on_error(enabled: bool) {
    DISPATCHER.crash_on_error.store(enabled, Ordering::Relaxed);
}

/// Settings of the [`Logging`] system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoggingSettings {
    /// Entries below this level are dropped.
    pub level_filter: LogLevel,
    /// Panic after dispatching an error entry.
    pub crash_on_error: bool,
}

impl SettingsItem for LoggingSettings {
    fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("level_filter", self.level_filter.to_string()),
            ("crash_on_error", self.crash_on_error.to_string()),
        ]
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), SettingsError> {
        match name {
            "level_filter" => self.level_filter = parse_property(name, value)?,
            "crash_on_error" => self.crash_on_error = parse_property(name, value)?,
            _ => {
                return Err(SettingsError::UnknownProperty {
                    section: Logging::NAME.to_owned(),
                    property: name.to_owned(),
                })
            }
        }
        Ok(())
    }
}

/// The logging system: owns the dispatcher configuration and its listeners.
#[derive(Default)]
pub struct Logging {
    settings: Option<Arc<RwLock<LoggingSettings>>>,
}

impl Logging {
    /// The system and settings section name.
    pub const NAME: &'static str = "Logging";

    /// Registers a listener. Listeners receive entries once the dispatcher is
    /// installed.
    pub fn register_listener(&self, listener: Arc<dyn LogListener>) {
        add_listener(listener);
    }

    fn current_settings(&self) -> LoggingSettings {
        self.settings
            .as_ref()
            .map(|s| *s.read().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or_default()
    }
}

impl System for Logging {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_settings(&mut self, settings: &mut SettingsFile) {
        match settings.register::<LoggingSettings>(Self::NAME) {
            Ok(item) => self.settings = Some(item),
            Err(e) => log::warn!(target: Self::NAME, "{e}"),
        }
    }

    fn on_initialize(&mut self, _ctx: &mut SystemContext<'_>) -> InitResult {
        let settings = self.current_settings();
        set_level_filter(settings.level_filter);
        set_crash_on_error(settings.crash_on_error);

        if let Err(e) = install() {
            log::warn!(target: Self::NAME, "Another logger is already installed: {e}");
        }
        InitResult::Initialized
    }

    fn on_shutdown(&mut self, _ctx: &mut SystemContext<'_>) {
        clear_listeners();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
