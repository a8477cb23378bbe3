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

use aspect_core::logging::{self, LogEntry, LogLevel, LogListener};
use std::panic;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Capture {
    entries: Mutex<Vec<(LogLevel, String, String)>>,
}

impl LogListener for Capture {
    fn log(&self, entry: &LogEntry<'_>) {
        self.entries.lock().unwrap().push((
            entry.level,
            entry.tag.to_owned(),
            entry.message.to_owned(),
        ));
    }
}

impl Capture {
    fn take(&self) -> Vec<(LogLevel, String, String)> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }
}

// The dispatcher is process-global, so every scenario runs in one test.
#[test]
fn dispatcher_forwards_filters_and_crashes() {
    logging::install().expect("no other logger in this test binary");
    let capture = Arc::new(Capture::default());
    logging::add_listener(capture.clone());
    assert_eq!(logging::listener_count(), 1);

    log::info!(target: "Threads", "Starting thread: {}", 3);
    log::debug!(target: "Threads", "debug maps to info");
    log::trace!(target: "Threads", "trace maps to info");
    assert_eq!(
        capture.take(),
        vec![
            (LogLevel::Info, "Threads".into(), "Starting thread: 3".into()),
            (LogLevel::Info, "Threads".into(), "debug maps to info".into()),
            (LogLevel::Info, "Threads".into(), "trace maps to info".into()),
        ]
    );

    logging::set_level_filter(LogLevel::Warning);
    log::info!(target: "Threads", "dropped");
    log::warn!(target: "Threads", "kept");
    assert_eq!(
        capture.take(),
        vec![(LogLevel::Warning, "Threads".into(), "kept".into())]
    );

    logging::set_crash_on_error(true);
    let crashed = panic::catch_unwind(|| {
        log::error!(target: "Pool", "fatal");
    });
    assert!(crashed.is_err(), "an error entry must panic when crash-on-error is set");
    assert_eq!(
        capture.take(),
        vec![(LogLevel::Error, "Pool".into(), "fatal".into())],
        "listeners receive the entry before the panic"
    );
    logging::set_crash_on_error(false);

    logging::clear_listeners();
    logging::set_crash_on_error(true);
    let silent = panic::catch_unwind(|| {
        log::error!(target: "Pool", "nobody is listening");
    });
    assert!(silent.is_ok(), "without listeners logging is a no-op");
    logging::set_crash_on_error(false);
    assert!(capture.take().is_empty());
}
