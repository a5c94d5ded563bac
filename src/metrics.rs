use crate::CaptureMode;
use metrics::{Counter, Gauge, Histogram};
use std::time::Duration;

/// Engine-level counters and gauges behind the `metrics` facade.
///
/// Handles are no-ops until the embedding process installs a recorder;
/// the engine records unconditionally either way.
pub struct Metrics {
    pub captures_taken: Counter,
    pub captures_failed: Counter,
    pub recordings_taken: Counter,
    pub capture_duration: Histogram,
    pub active_jobs: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            captures_taken: Counter::noop(),
            captures_failed: Counter::noop(),
            recordings_taken: Counter::noop(),
            capture_duration: Histogram::noop(),
            active_jobs: Gauge::noop(),
        }
    }

    pub fn job_started(&self) {
        self.active_jobs.increment(1.0);
    }

    pub fn job_finished(&self, duration: Duration, success: bool, mode: CaptureMode) {
        self.active_jobs.decrement(1.0);
        self.capture_duration.record(duration.as_secs_f64());

        if success {
            self.captures_taken.increment(1);
            if mode == CaptureMode::Recording {
                self.recordings_taken.increment(1);
            }
        } else {
            self.captures_failed.increment(1);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
