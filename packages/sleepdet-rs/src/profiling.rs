//! Wall-clock accounting for detection runs.
//!
//! `StageClock` splits one unit's processing into named stages whose
//! timings end up in [`UnitStats`](crate::types::UnitStats). `ProfileScope`
//! only logs, for spans that have no place in the output.

use std::time::Instant;

use crate::types::StageTiming;

fn millis(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Logs the time spent in a scope when dropped
pub struct ProfileScope {
    label: String,
    start: Instant,
}

impl ProfileScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        log::debug!("[PROFILE] {} - {:.3}ms", self.label, millis(self.start));
    }
}

/// Consecutive stage timer. Each `lap` closes the stage that began at the
/// previous lap (or at `start`).
#[derive(Debug)]
pub struct StageClock {
    label: String,
    started: Instant,
    last: Instant,
    stages: Vec<StageTiming>,
}

impl StageClock {
    pub fn start(label: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            started: now,
            last: now,
            stages: Vec::new(),
        }
    }

    /// Close the current stage under `stage` and return its length in ms.
    pub fn lap(&mut self, stage: &str) -> f64 {
        let elapsed_ms = millis(self.last);
        self.last = Instant::now();
        self.stages.push(StageTiming {
            stage: stage.to_string(),
            elapsed_ms,
        });
        elapsed_ms
    }

    pub fn total_ms(&self) -> f64 {
        millis(self.started)
    }

    /// Stage timings and the total since `start`.
    pub fn finish(self) -> (Vec<StageTiming>, f64) {
        let total = self.total_ms();
        if log::log_enabled!(log::Level::Debug) {
            let parts: Vec<String> = self
                .stages
                .iter()
                .map(|s| format!("{} {:.3}ms", s.stage, s.elapsed_ms))
                .collect();
            log::debug!(
                "[PROFILE] {} - {:.3}ms ({})",
                self.label,
                total,
                parts.join(", ")
            );
        }
        (self.stages, total)
    }
}

/// Log the time spent in the rest of the enclosing block
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {
        let _profile_scope = $crate::profiling::ProfileScope::new($label);
    };
}
