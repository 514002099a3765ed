//! The trial record: identity, configuration, lifecycle state, result
//! history, and checkpoint pointer.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::HashMap;
use std::sync::Arc;

use crate::resources::Resources;
use crate::result::TrialResult;
use crate::types::{Config, TrialId, TrialStatus};

static NEXT_TRIAL_ID: AtomicU64 = AtomicU64::new(0);

/// Progress snapshot persisted by a checkpoint save.
///
/// Wraps the worker's opaque snapshot bytes together with the progress
/// counters needed to resume bookkeeping after a restore.
#[derive(Debug)]
pub(crate) struct CheckpointData {
    pub(crate) snapshot: Vec<u8>,
    pub(crate) iteration: u64,
    pub(crate) timesteps_total: u64,
    pub(crate) time_total_s: f64,
}

/// Opaque handle to a successfully persisted checkpoint.
///
/// Cheap to clone; holding one keeps the underlying snapshot alive. A trial's
/// checkpoint pointer is updated only when a save request completes, so a
/// `Checkpoint` in hand is always valid.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    data: Arc<CheckpointData>,
}

impl Checkpoint {
    pub(crate) fn new(data: CheckpointData) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub(crate) fn data(&self) -> &CheckpointData {
        &self.data
    }

    /// The training iteration at which this checkpoint was taken.
    #[must_use]
    pub fn iteration(&self) -> u64 {
        self.data.iteration
    }
}

/// The persistent record of one unit of iterative remote work.
///
/// Owned exclusively by the [`TrialRunner`](crate::TrialRunner); the executor
/// and policies read it or request transitions through the runner, never
/// mutate it directly.
///
/// # Examples
///
/// ```
/// use tuner::{Resources, Trial, TrialStatus, result};
///
/// let trial = Trial::builder()
///     .resources(Resources::new().cpu(1.0))
///     .stop_when(result::TRAINING_ITERATION, 100.0)
///     .max_failures(2)
///     .checkpoint_freq(10)
///     .build();
///
/// assert_eq!(trial.status(), TrialStatus::Pending);
/// assert_eq!(trial.num_failures(), 0);
/// assert!(!trial.has_checkpoint());
/// ```
#[derive(Debug)]
pub struct Trial {
    id: TrialId,
    config: Config,
    resources: Resources,
    stopping_criterion: HashMap<String, f64>,
    max_failures: i32,
    checkpoint_freq: u64,
    checkpoint_at_end: bool,
    status: TrialStatus,
    num_failures: u32,
    checkpoint: Option<Checkpoint>,
    last_result: Option<TrialResult>,
    error_message: Option<String>,
    stop_after_save: bool,
}

impl Trial {
    /// Return a [`TrialBuilder`] for constructing a trial.
    #[must_use]
    pub fn builder() -> TrialBuilder {
        TrialBuilder::new()
    }

    /// The unique identifier assigned at creation.
    #[must_use]
    pub fn id(&self) -> TrialId {
        self.id
    }

    /// The configuration handed to the remote worker at start.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The resource demand this trial needs admitted before it can run.
    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn status(&self) -> TrialStatus {
        self.status
    }

    /// Count of classified remote-execution failures so far.
    #[must_use]
    pub fn num_failures(&self) -> u32 {
        self.num_failures
    }

    /// The retry budget; `-1` means unlimited, `0` means no retry.
    #[must_use]
    pub fn max_failures(&self) -> i32 {
        self.max_failures
    }

    /// Checkpoint cadence in iterations; `0` disables periodic checkpoints.
    #[must_use]
    pub fn checkpoint_freq(&self) -> u64 {
        self.checkpoint_freq
    }

    /// Whether a final checkpoint is taken before the trial terminates.
    #[must_use]
    pub fn checkpoint_at_end(&self) -> bool {
        self.checkpoint_at_end
    }

    /// The metric thresholds that end the trial when any is reached.
    #[must_use]
    pub fn stopping_criterion(&self) -> &HashMap<String, f64> {
        &self.stopping_criterion
    }

    /// The most recent successfully persisted checkpoint, if any.
    #[must_use]
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    /// Whether a valid checkpoint exists for this trial.
    #[must_use]
    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// The most recent reported result, if any.
    #[must_use]
    pub fn last_result(&self) -> Option<&TrialResult> {
        self.last_result.as_ref()
    }

    /// The most recent failure message, if the trial has ever failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether the trial is in a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn set_status(&mut self, status: TrialStatus) {
        self.status = status;
    }

    pub(crate) fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = Some(checkpoint);
    }

    pub(crate) fn set_last_result(&mut self, result: TrialResult) {
        self.last_result = Some(result);
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.num_failures += 1;
        self.error_message = Some(message);
    }

    /// Whether one more failure still fits into the retry budget.
    #[allow(clippy::cast_sign_loss)]
    pub(crate) fn retry_budget_left(&self) -> bool {
        if self.max_failures < 0 {
            true
        } else {
            self.num_failures + 1 <= self.max_failures as u32
        }
    }

    /// Whether any stopping-criterion metric in `result` reached its
    /// threshold.
    pub(crate) fn criterion_met(&self, result: &TrialResult) -> bool {
        self.stopping_criterion
            .iter()
            .any(|(metric, threshold)| result.get(metric).is_some_and(|value| value >= *threshold))
    }

    /// Whether the periodic checkpoint cadence is due at `iteration`.
    pub(crate) fn checkpoint_due(&self, iteration: u64) -> bool {
        self.checkpoint_freq > 0 && iteration > 0 && iteration % self.checkpoint_freq == 0
    }

    /// Whether a stopping trial needs one last save before terminating.
    pub(crate) fn wants_final_checkpoint(&self, iteration: u64) -> bool {
        self.checkpoint_at_end || self.checkpoint_due(iteration)
    }

    pub(crate) fn stop_after_save(&self) -> bool {
        self.stop_after_save
    }

    pub(crate) fn set_stop_after_save(&mut self, value: bool) {
        self.stop_after_save = value;
    }
}

/// A builder for constructing [`Trial`] records with a fluent API.
///
/// # Defaults
///
/// - empty configuration and resource request
/// - no stopping criterion (the trial runs until the worker declares itself
///   done or it is stopped externally)
/// - `max_failures = 0` (no retry)
/// - no checkpointing
#[derive(Debug, Default)]
pub struct TrialBuilder {
    config: Config,
    resources: Resources,
    stopping_criterion: HashMap<String, f64>,
    max_failures: i32,
    checkpoint_freq: u64,
    checkpoint_at_end: bool,
    restore_from: Option<Checkpoint>,
}

impl TrialBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Set the configuration handed to the remote worker.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the resource demand.
    #[must_use]
    pub fn resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Add a stopping criterion: the trial is done when `metric` reaches
    /// `threshold` in any reported result.
    #[must_use]
    pub fn stop_when(mut self, metric: impl Into<String>, threshold: f64) -> Self {
        self.stopping_criterion.insert(metric.into(), threshold);
        self
    }

    /// Set the retry budget; `-1` for unlimited, `0` (the default) for none.
    #[must_use]
    pub fn max_failures(mut self, max_failures: i32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Checkpoint every `freq` iterations; `0` disables periodic saves.
    #[must_use]
    pub fn checkpoint_freq(mut self, freq: u64) -> Self {
        self.checkpoint_freq = freq;
        self
    }

    /// Take one final checkpoint before the trial terminates.
    #[must_use]
    pub fn checkpoint_at_end(mut self, at_end: bool) -> Self {
        self.checkpoint_at_end = at_end;
        self
    }

    /// Seed the trial from an existing checkpoint; it is restored into the
    /// worker before the first step.
    #[must_use]
    pub fn restore_from(mut self, checkpoint: Checkpoint) -> Self {
        self.restore_from = Some(checkpoint);
        self
    }

    /// Build the trial, assigning it a fresh unique id.
    #[must_use]
    pub fn build(self) -> Trial {
        Trial {
            id: NEXT_TRIAL_ID.fetch_add(1, Ordering::SeqCst),
            config: self.config,
            resources: self.resources,
            stopping_criterion: self.stopping_criterion,
            max_failures: self.max_failures,
            checkpoint_freq: self.checkpoint_freq,
            checkpoint_at_end: self.checkpoint_at_end,
            status: TrialStatus::Pending,
            num_failures: 0,
            checkpoint: self.restore_from,
            last_result: None,
            error_message: None,
            stop_after_save: false,
        }
    }
}
