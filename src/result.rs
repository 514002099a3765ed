//! Result reporting: the per-step metric map and the standard keys the
//! worker bookkeeping merges into every report.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of completed iterations since the trial was created, across
/// restores.
pub const TRAINING_ITERATION: &str = "training_iteration";

/// Timesteps reported by the worker for the most recent iteration.
pub const TIMESTEPS_THIS_ITER: &str = "timesteps_this_iter";

/// Cumulative timesteps since the trial was created, across restores.
pub const TIMESTEPS_TOTAL: &str = "timesteps_total";

/// Cumulative wall-clock seconds spent stepping, across restores.
pub const TIME_TOTAL_S: &str = "time_total_s";

/// Iterations completed since the most recent restore (or fresh start).
pub const ITERATIONS_SINCE_RESTORE: &str = "iterations_since_restore";

/// Timesteps accumulated since the most recent restore (or fresh start).
pub const TIMESTEPS_SINCE_RESTORE: &str = "timesteps_since_restore";

/// Wall-clock seconds since the most recent restore (or fresh start).
pub const TIME_SINCE_RESTORE: &str = "time_since_restore";

/// One reported result from a trial's remote worker.
///
/// Carries the worker's own metrics merged with the standard progress
/// counters, plus the `done` flag. The flag is set by the worker when it
/// declares itself finished, or stamped by the runner when the trial's
/// stopping criterion is met — exactly once either way.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialResult {
    /// Metric name to value.
    pub metrics: HashMap<String, f64>,
    /// Whether this is the trial's final result.
    pub done: bool,
}

impl TrialResult {
    /// Create an empty, not-done result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a metric value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    /// The [`TRAINING_ITERATION`] counter, `0` if absent.
    #[must_use]
    pub fn training_iteration(&self) -> u64 {
        self.counter(TRAINING_ITERATION)
    }

    /// The [`ITERATIONS_SINCE_RESTORE`] counter, `0` if absent.
    #[must_use]
    pub fn iterations_since_restore(&self) -> u64 {
        self.counter(ITERATIONS_SINCE_RESTORE)
    }

    /// The [`TIMESTEPS_SINCE_RESTORE`] counter, `0` if absent.
    #[must_use]
    pub fn timesteps_since_restore(&self) -> u64 {
        self.counter(TIMESTEPS_SINCE_RESTORE)
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn counter(&self, key: &str) -> u64 {
        self.get(key).map_or(0, |value| value.max(0.0) as u64)
    }
}
