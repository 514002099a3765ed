//! Read-only observation of trial progress.

use crate::result::TrialResult;
use crate::trial::{Checkpoint, Trial};
use crate::types::TrialStatus;

/// Observer notified of every result, every status transition, and every new
/// checkpoint.
///
/// Callbacks see trials read-only and must not try to influence scheduling;
/// they exist for metrics, logging, and progress tracking outside the core.
/// All methods default to no-ops, so implementations override only what they
/// watch.
pub trait Callback {
    /// A trial reported a result (final or intermediate).
    fn on_trial_result(&mut self, _trial: &Trial, _result: &TrialResult) {}

    /// A trial's status changed; the trial already carries the new status.
    fn on_status_change(&mut self, _trial: &Trial, _previous: TrialStatus) {}

    /// A trial persisted a new checkpoint.
    fn on_checkpoint(&mut self, _trial: &Trial, _checkpoint: &Checkpoint) {}
}
