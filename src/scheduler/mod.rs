//! Scheduler trait and implementations for trial admission and early
//! pause/stop decisions.
//!
//! Schedulers decide which pending or paused trials to admit given current
//! cluster capacity, and react to intermediate results by letting a trial
//! continue, pausing it to free resources, or stopping it early. They are
//! always invoked from the control thread, never concurrently.

mod fifo;

pub use fifo::FifoScheduler;

use crate::executor::TrialExecutor;
use crate::resources::Resources;
use crate::result::TrialResult;
use crate::trial::Trial;
use crate::types::{TrialId, TrialStatus};

/// A scheduler's verdict on a trial after an intermediate result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Keep the trial running.
    Continue,
    /// Pause the trial, releasing its resources; it may be resumed later.
    Pause,
    /// Stop the trial; it terminates without meeting its stopping criterion.
    Stop,
}

/// Read-only view of the runner's state offered to
/// [`choose_trial_to_run`](Scheduler::choose_trial_to_run).
pub struct SchedulingContext<'a> {
    trials: &'a [Trial],
    executor: &'a TrialExecutor,
}

impl<'a> SchedulingContext<'a> {
    pub(crate) fn new(trials: &'a [Trial], executor: &'a TrialExecutor) -> Self {
        Self { trials, executor }
    }

    /// Every trial managed by the runner, in submission order.
    #[must_use]
    pub fn trials(&self) -> &[Trial] {
        self.trials
    }

    /// Trials eligible for admission: pending or paused, with no request
    /// already dispatched.
    pub fn schedulable(&self) -> impl Iterator<Item = &Trial> + '_ {
        self.trials.iter().filter(|trial| {
            matches!(trial.status(), TrialStatus::Pending | TrialStatus::Paused)
                && !self.executor.has_inflight(trial.id())
                && !self.executor.has_handle(trial.id())
        })
    }

    /// Whether `request` currently fits the uncommitted cluster capacity.
    #[must_use]
    pub fn can_admit(&self, request: &Resources) -> bool {
        self.executor.ledger().can_admit(request)
    }
}

/// Trait for pluggable admission and early-stopping policies.
///
/// Only [`choose_trial_to_run`](Scheduler::choose_trial_to_run) is required;
/// the lifecycle hooks default to no-ops and
/// [`on_trial_result`](Scheduler::on_trial_result) defaults to
/// [`Decision::Continue`].
///
/// # Implementing a custom scheduler
///
/// ```
/// use tuner::scheduler::{Scheduler, SchedulingContext};
/// use tuner::{Trial, TrialId};
///
/// /// Admits largest resource requests first.
/// struct GreedyScheduler;
///
/// impl Scheduler for GreedyScheduler {
///     fn choose_trial_to_run(&mut self, ctx: &SchedulingContext<'_>) -> Option<TrialId> {
///         let mut candidates: Vec<&Trial> = ctx
///             .schedulable()
///             .filter(|trial| ctx.can_admit(trial.resources()))
///             .collect();
///         candidates.sort_by(|a, b| {
///             b.resources()
///                 .get("cpu")
///                 .total_cmp(&a.resources().get("cpu"))
///         });
///         candidates.first().map(|trial| trial.id())
///     }
/// }
/// ```
pub trait Scheduler {
    /// Called once when a trial is submitted to the runner.
    fn on_trial_add(&mut self, _trial: &Trial) {}

    /// Called on every intermediate result of a running trial; the returned
    /// decision is applied unless the result is final.
    fn on_trial_result(&mut self, _trial: &Trial, _result: &TrialResult) -> Decision {
        Decision::Continue
    }

    /// Called when a trial finishes successfully (stopping criterion met or
    /// explicitly stopped).
    fn on_trial_complete(&mut self, _trial: &Trial) {}

    /// Called on every classified execution failure, including ones that are
    /// retried.
    fn on_trial_error(&mut self, _trial: &Trial) {}

    /// Pick the next trial to admit, or `None` to end this scheduling pass.
    ///
    /// Called repeatedly within one control-loop step until it returns
    /// `None` or admission hits the capacity limit.
    fn choose_trial_to_run(&mut self, ctx: &SchedulingContext<'_>) -> Option<TrialId>;
}
