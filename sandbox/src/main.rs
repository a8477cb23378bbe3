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

// Aspect Engine Sandbox
// Runs the default systems for a few seconds of frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aspect_sdk::prelude::*;
use aspect_sdk::{create_default_systems, SetupParams};

const FRAMES_TO_RUN: u64 = 180;
const SUMMARY_INTERVAL: u64 = 60;

struct SandboxApp {
    console_logging: bool,
    counter: Arc<AtomicU64>,
    counter_thread: ThreadHandle,
}

impl SandboxApp {
    fn new(console_logging: bool) -> Self {
        Self {
            console_logging,
            counter: Arc::new(AtomicU64::new(0)),
            counter_thread: ThreadHandle::INVALID,
        }
    }
}

impl AppDelegate for SandboxApp {
    fn create_systems(&mut self, systems: &mut SystemRegistry) {
        if self.console_logging {
            let logging = systems.create::<Logging>();
            logging.register_listener(Arc::new(ConsoleListener));
        }
        create_default_systems(systems);
    }

    fn on_start(&mut self, systems: &mut SystemRegistry, _quit: &QuitHandle) -> Result<()> {
        let tasks = systems
            .find::<ThreadedTasks>()
            .context("ThreadedTasks system is missing")?;
        for priority in TaskPriority::ALL.into_iter().rev() {
            tasks.request_task_run(TaskParams::new(priority, move || {
                log::info!(target: "Sandbox", "Running task with priority {priority}");
            }));
        }
        let answer = tasks.spawn(TaskPriority::High, || (1..=10u64).sum::<u64>());

        let threading = systems
            .find::<Threading>()
            .context("Threading system is missing")?;
        let counter = self.counter.clone();
        self.counter_thread = threading.obtain_thread(ObtainThreadParams::new(
            "Sandbox counter",
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
                ThreadResult::RerunDelay(Duration::from_millis(1))
            },
        ))?;

        let sum = answer
            .recv_timeout(Duration::from_secs(5))
            .context("Spawned task did not complete")?;
        log::info!(target: "Sandbox", "Spawned task returned {sum}");
        Ok(())
    }

    fn on_frame(&mut self, ctx: &mut FrameContext<'_>) {
        let frame = ctx.frame + 1;
        if frame % SUMMARY_INTERVAL == 0 {
            log::info!(
                target: "Sandbox",
                "Frame {frame}, dt {:.2} ms, counter at {}",
                ctx.dt * 1000.0,
                self.counter.load(Ordering::Relaxed)
            );
            if let Some(threading) = ctx.systems.find::<Threading>() {
                threading.log_thread_summary();
            }
        }
        if frame >= FRAMES_TO_RUN {
            ctx.quit();
        }
    }

    fn on_shutdown(&mut self, systems: &mut SystemRegistry) {
        if let Some(threading) = systems.find::<Threading>() {
            threading.release_thread(&mut self.counter_thread);
        }
        log::info!(
            target: "Sandbox",
            "Counter thread ran {} times",
            self.counter.load(Ordering::Relaxed)
        );
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    // RUST_LOG selects env_logger; otherwise the engine's console listener.
    let console_logging = std::env::var_os("RUST_LOG").is_none();
    if !console_logging {
        Builder::from_env(Env::default().default_filter_or("info")).init();
    }

    let mut app = Application::new(SandboxApp::new(console_logging));
    app.run(SetupParams::from_env())
}
