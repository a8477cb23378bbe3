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

//! The application lifecycle and frame loop.

use crate::updateables::Updateables;
use anyhow::{Context, Result};
use aspect_core::settings::parse_property;
use aspect_core::utils::split_string;
use aspect_core::{SettingsError, SettingsFile, SettingsItem, Stopwatch, SystemRegistry};
use aspect_threading::{ThreadedTasks, Threading};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

const LOG_TAG: &str = "Application";

/// Startup parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupParams {
    /// The raw command line, arguments separated by spaces.
    pub command_line: String,
}

impl SetupParams {
    /// Builds parameters from a command line string.
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
        }
    }

    /// Builds parameters from the process arguments, skipping the program name.
    pub fn from_env() -> Self {
        Self::new(std::env::args().skip(1).collect::<Vec<_>>().join(" "))
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    /// Display name of the application.
    pub name: String,
    /// Frame rate cap, `0` for uncapped.
    pub max_fps: u8,
}

impl AppSettings {
    /// The settings section name.
    pub const SECTION: &'static str = "Application";
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "AspectX Application".to_owned(),
            max_fps: 60,
        }
    }
}

impl SettingsItem for AppSettings {
    fn properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("max_fps", self.max_fps.to_string()),
        ]
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<(), SettingsError> {
        match name {
            "name" => self.name = value.to_owned(),
            "max_fps" => self.max_fps = parse_property(name, value)?,
            _ => {
                return Err(SettingsError::UnknownProperty {
                    section: Self::SECTION.to_owned(),
                    property: name.to_owned(),
                })
            }
        }
        Ok(())
    }
}

/// Minimum duration of a frame at `max_fps`, `None` when uncapped.
pub fn frame_budget(max_fps: u8) -> Option<Duration> {
    (max_fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(max_fps)))
}

/// Requests the frame loop to stop. Cloneable and usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct QuitHandle(Arc<AtomicBool>);

impl QuitHandle {
    /// Ends the loop after the current frame.
    pub fn quit(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once [`quit`](Self::quit) was called.
    pub fn is_quit_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What the delegate sees each frame.
pub struct FrameContext<'a> {
    /// The engine systems.
    pub systems: &'a mut SystemRegistry,
    /// Duration of the previous frame in seconds.
    pub dt: f32,
    /// Number of frames completed before this one.
    pub frame: u64,
    quit: &'a QuitHandle,
}

impl FrameContext<'_> {
    /// Ends the loop after this frame.
    pub fn quit(&self) {
        self.quit.quit();
    }

    /// A handle other threads can use to end the loop.
    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.clone()
    }
}

/// Creates the systems every application gets by default.
pub fn create_default_systems(systems: &mut SystemRegistry) {
    systems.create::<Updateables>();
    systems.create::<Threading>();
    systems.create::<ThreadedTasks>();
}

/// Customization points of an [`Application`].
pub trait AppDelegate {
    /// Creates the engine systems, in initialization order.
    fn create_systems(&mut self, systems: &mut SystemRegistry) {
        create_default_systems(systems);
    }

    /// Called once every system is initialized, before the first frame.
    fn on_start(&mut self, _systems: &mut SystemRegistry, _quit: &QuitHandle) -> Result<()> {
        Ok(())
    }

    /// Called at the end of every frame.
    fn on_frame(&mut self, _ctx: &mut FrameContext<'_>) {}

    /// Called before the systems are shut down.
    fn on_shutdown(&mut self, _systems: &mut SystemRegistry) {}
}

/// The default delegate: default systems, no per-frame work.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDelegate;

impl AppDelegate for DefaultDelegate {}

/// Owns the engine systems and runs the frame loop.
pub struct Application<D: AppDelegate = DefaultDelegate> {
    delegate: D,
    systems: SystemRegistry,
    settings: SettingsFile,
    app_settings: Arc<RwLock<AppSettings>>,
    quit: QuitHandle,
    frame_count: u64,
}

impl<D: AppDelegate> Application<D> {
    /// Creates an application driven by `delegate`.
    pub fn new(delegate: D) -> Self {
        Self {
            delegate,
            systems: SystemRegistry::new(),
            settings: SettingsFile::new("Engine Settings"),
            app_settings: Arc::default(),
            quit: QuitHandle::default(),
            frame_count: 0,
        }
    }

    /// A handle that ends the loop from anywhere.
    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.clone()
    }

    /// Ends the loop after the current frame.
    pub fn quit(&self) {
        self.quit.quit();
    }

    /// The engine systems.
    pub fn systems(&self) -> &SystemRegistry {
        &self.systems
    }

    /// The engine settings.
    pub fn settings(&self) -> &SettingsFile {
        &self.settings
    }

    /// The application settings currently in effect.
    pub fn app_settings(&self) -> AppSettings {
        self.app_settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The delegate.
    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    /// Number of frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Starts up, runs frames until quit is requested, then shuts down.
    ///
    /// Shutdown always runs, including after a failed startup.
    pub fn run(&mut self, params: SetupParams) -> Result<()> {
        let result = self.startup(&params).and_then(|()| self.run_loop());
        self.shutdown();
        if let Err(e) = &result {
            log::error!(target: LOG_TAG, "{e:#}");
        }
        result
    }

    fn startup(&mut self, params: &SetupParams) -> Result<()> {
        log::info!(target: LOG_TAG, "Starting up");
        self.delegate.create_systems(&mut self.systems);
        self.load_settings()?;

        let args = split_string(&params.command_line, ' ');
        for error in self.settings.apply_overrides(&args) {
            log::warn!(target: LOG_TAG, "Ignoring settings override: {error}");
        }
        self.systems.handle_command_line_all(&args);

        self.systems
            .initialize_all()
            .context("Failed to initialize engine systems")?;
        self.settings.dump();

        let name = self.app_settings().name;
        log::info!(target: LOG_TAG, "{name} started");
        self.delegate
            .on_start(&mut self.systems, &self.quit)
            .context("Application start hook failed")
    }

    fn load_settings(&mut self) -> Result<()> {
        self.app_settings = self
            .settings
            .register::<AppSettings>(AppSettings::SECTION)
            .context("Failed to register application settings")?;
        self.systems.create_settings_all(&mut self.settings);
        Ok(())
    }

    fn run_loop(&mut self) -> Result<()> {
        let mut stopwatch = Stopwatch::new();
        let mut dt = 0.0;

        while !self.quit.is_quit_requested() {
            stopwatch.restart();
            self.frame(dt);
            dt = self.cap_frame(&stopwatch);
        }

        log::info!(target: LOG_TAG, "Quit after {} frames", self.frame_count);
        Ok(())
    }

    fn frame(&mut self, dt: f32) {
        self.systems.begin_frame_all();
        self.systems.update_all(dt);
        self.systems.render_all();
        self.systems.end_frame_all();

        self.delegate.on_frame(&mut FrameContext {
            systems: &mut self.systems,
            dt,
            frame: self.frame_count,
            quit: &self.quit,
        });
        self.frame_count += 1;
    }

    /// Sleeps out the rest of the frame budget and returns the frame's
    /// duration in seconds.
    fn cap_frame(&self, stopwatch: &Stopwatch) -> f32 {
        let elapsed = stopwatch.elapsed().unwrap_or_default();
        let max_fps = self
            .app_settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .max_fps;

        match frame_budget(max_fps) {
            Some(budget) if elapsed < budget => {
                thread::sleep(budget - elapsed);
                budget.as_secs_f32()
            }
            _ => elapsed.as_secs_f32(),
        }
    }

    fn shutdown(&mut self) {
        log::info!(target: LOG_TAG, "Shutting down");
        self.delegate.on_shutdown(&mut self.systems);
        self.systems.shutdown_all();
    }
}

impl Default for Application<DefaultDelegate> {
    fn default() -> Self {
        Self::new(DefaultDelegate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_budget_follows_max_fps() {
        assert_eq!(frame_budget(0), None);
        assert_eq!(frame_budget(50), Some(Duration::from_millis(20)));
        let sixty = frame_budget(60).unwrap();
        assert!(sixty > Duration::from_micros(16_600) && sixty < Duration::from_micros(16_700));
    }

    #[test]
    fn app_settings_defaults_and_overrides() {
        let mut settings = AppSettings::default();
        assert_eq!(settings.name, "AspectX Application");
        assert_eq!(settings.max_fps, 60);

        settings.set_property("max_fps", "144").unwrap();
        settings.set_property("name", "Demo").unwrap();
        assert_eq!(settings.max_fps, 144);
        assert_eq!(settings.name, "Demo");
        assert!(settings.set_property("max_fps", "1000").is_err());
    }

    #[test]
    fn quit_handles_share_state() {
        let quit = QuitHandle::default();
        let remote = quit.clone();
        assert!(!quit.is_quit_requested());
        remote.quit();
        assert!(quit.is_quit_requested());
    }
}
