//! Search-algorithm trait and implementations for proposing trials.
//!
//! A search algorithm decides *which* trial configurations to run; the
//! scheduler decides *when*. The runner pulls proposals lazily at the start
//! of every control-loop step and feeds results and completions back, so an
//! algorithm can condition later proposals on earlier outcomes. All calls
//! happen on the control thread, never concurrently.

mod basic;

pub use basic::BasicSearch;

use crate::result::TrialResult;
use crate::trial::Trial;
use crate::types::TrialId;

/// Trait for pluggable trial-proposal policies.
pub trait SearchAlgorithm {
    /// Propose new trials to submit; may be empty. Called once per
    /// control-loop step.
    fn next_trials(&mut self) -> Vec<Trial>;

    /// Called on every intermediate result, for progressive pruning.
    fn on_trial_result(&mut self, _trial: TrialId, _result: &TrialResult) {}

    /// Called exactly once per trial, when it reaches a terminal state.
    ///
    /// `error` is true only for the final, non-retried failure; retried
    /// failures are not reported here.
    fn on_trial_complete(&mut self, _trial: TrialId, _error: bool) {}

    /// Whether the algorithm will never propose another trial.
    fn is_finished(&self) -> bool;
}
