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

//! Wall-clock timing used by the frame loop.

use std::time::{Duration, Instant};

/// Measures elapsed wall-clock time since it was started.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    start_time: Option<Instant>,
}

impl Stopwatch {
    /// Creates a new stopwatch, already running.
    #[inline]
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
        }
    }

    /// Creates a stopwatch that has not been started yet.
    #[inline]
    pub fn stopped() -> Self {
        Self { start_time: None }
    }

    /// Restarts the stopwatch and returns the time elapsed before the restart.
    #[inline]
    pub fn restart(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        self.start_time = Some(Instant::now());
        elapsed
    }

    /// Returns the elapsed time, or `None` if the stopwatch was never started.
    #[inline]
    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|start| start.elapsed())
    }

    /// Elapsed time in whole milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.elapsed().map(|d| d.as_millis() as u64)
    }

    /// Elapsed time in whole microseconds.
    #[inline]
    pub fn elapsed_us(&self) -> Option<u64> {
        self.elapsed().map(|d| d.as_micros() as u64)
    }

    /// Elapsed time in seconds.
    #[inline]
    pub fn elapsed_secs_f64(&self) -> Option<f64> {
        self.elapsed().map(|d| d.as_secs_f64())
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SLEEP_DURATION_MS: u64 = 50;
    const SLEEP_MARGIN_MS: u64 = 200;

    #[test]
    fn stopped_stopwatch_reports_nothing() {
        let watch = Stopwatch::stopped();
        assert!(watch.elapsed().is_none());
        assert!(watch.elapsed_ms().is_none());
    }

    #[test]
    fn stopwatch_elapsed_time_after_delay() {
        let watch = Stopwatch::new();
        thread::sleep(Duration::from_millis(SLEEP_DURATION_MS));

        let elapsed_ms = watch.elapsed_ms().expect("Should have elapsed ms after sleep");
        assert!(
            elapsed_ms >= SLEEP_DURATION_MS,
            "Elapsed ms ({elapsed_ms}) should be >= sleep duration ms ({SLEEP_DURATION_MS})"
        );
        assert!(
            elapsed_ms < SLEEP_DURATION_MS + SLEEP_MARGIN_MS,
            "Elapsed ms ({elapsed_ms}) should be < sleep duration ms + margin"
        );
        assert!(watch.elapsed_us().unwrap_or(0) >= SLEEP_DURATION_MS * 1000);
    }

    #[test]
    fn restart_returns_previous_lap_and_resets() {
        let mut watch = Stopwatch::new();
        thread::sleep(Duration::from_millis(20));
        let lap = watch.restart().expect("running stopwatch has a lap");
        assert!(lap >= Duration::from_millis(20));
        assert!(watch.elapsed().expect("still running") < lap);

        let mut fresh = Stopwatch::stopped();
        assert!(fresh.restart().is_none());
        assert!(fresh.elapsed().is_some());
    }
}
