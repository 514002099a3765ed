use super::{Scheduler, SchedulingContext};
use crate::types::TrialId;

/// Admit trials in submission order, as capacity allows (the default).
///
/// Picks the first pending or paused trial whose resource request fits the
/// uncommitted capacity; never pauses or stops trials on its own.
///
/// # Examples
///
/// ```
/// use tuner::scheduler::FifoScheduler;
///
/// let scheduler = FifoScheduler;
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct FifoScheduler;

impl Scheduler for FifoScheduler {
    fn choose_trial_to_run(&mut self, ctx: &SchedulingContext<'_>) -> Option<TrialId> {
        ctx.schedulable()
            .find(|trial| ctx.can_admit(trial.resources()))
            .map(crate::trial::Trial::id)
    }
}
