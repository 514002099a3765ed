//! The control loop: owns the trial set and the pluggable policies, drives
//! the executor, classifies completed requests, and applies the retry and
//! fail-fast policies.

mod builder;

pub use builder::TrialRunnerBuilder;

use crate::callback::Callback;
use crate::error::{Error, Result, WorkerFailure};
use crate::executor::TrialExecutor;
use crate::resources::Resources;
use crate::result::TrialResult;
use crate::scheduler::{Decision, Scheduler, SchedulingContext};
use crate::search::SearchAlgorithm;
use crate::trial::{Checkpoint, Trial};
use crate::types::{FailFast, RequestKind, TrialId, TrialStatus};
use crate::worker::{CompletionPayload, WorkerFactory};

/// Single-threaded orchestrator of many concurrently executing trials.
///
/// One [`step`](TrialRunner::step) call performs exactly one unit of
/// scheduling work: pull proposals from the search algorithm, admit what the
/// scheduler chooses and capacity allows, then classify every remote request
/// that completed since the last call. Remote work proceeds between calls;
/// the runner never blocks on an individual trial, so one slow worker cannot
/// stall progress on the others.
///
/// Drive it to completion with:
///
/// ```no_run
/// # fn demo(runner: &mut tuner::TrialRunner) -> tuner::Result<()> {
/// while !runner.is_finished() {
///     runner.step()?;
/// }
/// # Ok(())
/// # }
/// ```
///
/// See the crate-level docs for a complete example with a worker
/// implementation.
pub struct TrialRunner {
    executor: TrialExecutor,
    search_alg: Box<dyn SearchAlgorithm>,
    scheduler: Box<dyn Scheduler>,
    callbacks: Vec<Box<dyn Callback>>,
    trials: Vec<Trial>,
    fail_fast: FailFast,
}

impl TrialRunner {
    /// Return a [`TrialRunnerBuilder`] over the given worker factory.
    #[must_use]
    pub fn builder(factory: impl WorkerFactory + 'static) -> TrialRunnerBuilder {
        TrialRunnerBuilder::new(std::sync::Arc::new(factory))
    }

    /// Create a runner with default policies over the given factory and
    /// cluster capacity.
    #[must_use]
    pub fn new(factory: impl WorkerFactory + 'static, capacity: Resources) -> Self {
        Self::builder(factory).resources(capacity).build()
    }

    /// Submit a trial; it starts in [`TrialStatus::Pending`].
    pub fn add_trial(&mut self, trial: Trial) -> TrialId {
        let id = trial.id();
        trace_info!(trial = id, "trial added");
        self.scheduler.on_trial_add(&trial);
        self.trials.push(trial);
        id
    }

    /// Every managed trial, in submission order.
    #[must_use]
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Look up a managed trial by id.
    #[must_use]
    pub fn trial(&self, id: TrialId) -> Option<&Trial> {
        self.trials.iter().find(|trial| trial.id() == id)
    }

    /// The executor, for ledger inspection and out-of-band worker access.
    #[must_use]
    pub fn executor(&self) -> &TrialExecutor {
        &self.executor
    }

    /// True iff the search algorithm is exhausted and every trial is in a
    /// terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.search_alg.is_finished() && self.trials.iter().all(Trial::is_finished)
    }

    /// Perform one unit of scheduling work.
    ///
    /// 1. Pull newly proposed trials from the search algorithm.
    /// 2. Admit pending/paused trials chosen by the scheduler, as capacity
    ///    allows; running out of capacity is expected backpressure, not an
    ///    error.
    /// 3. Classify every completed remote request: apply the lifecycle
    ///    transition and forward events to the scheduler, the search
    ///    algorithm, and the registered callbacks.
    ///
    /// # Errors
    ///
    /// [`Error::NoRunnableTrials`] when invoked on a finished run;
    /// [`Error::RemoteExecution`] under [`FailFast::Raise`] when a trial
    /// fails beyond its retry budget; [`Error::OverCommit`] or
    /// [`Error::Internal`] on broken invariants.
    pub fn step(&mut self) -> Result<()> {
        if self.is_finished() {
            return Err(Error::NoRunnableTrials);
        }
        self.refill_trial_queue();
        self.admit_trials()?;
        for completion in self.executor.fetch_ready() {
            let (trial, kind) = (completion.trial, completion.kind);
            match completion.outcome {
                Ok(payload) => self.process_payload(trial, payload)?,
                Err(failure) => self.process_failure(trial, kind, &failure)?,
            }
        }
        Ok(())
    }

    /// Pause a running (or still pending) trial: its worker is torn down,
    /// resources are released, and the record is preserved for a later
    /// scheduler-driven resume.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] for an unknown trial or one already in a terminal
    /// state.
    pub fn pause_trial(&mut self, id: TrialId) -> Result<()> {
        let idx = self
            .position(id)
            .ok_or(Error::Internal("unknown trial id"))?;
        if self.trials[idx].is_finished() {
            return Err(Error::Internal("cannot pause a finished trial"));
        }
        trace_info!(trial = id, "trial paused");
        self.pause_at(idx);
        Ok(())
    }

    /// Stop a trial, marking it [`TrialStatus::Terminated`] regardless of its
    /// stopping criterion. No-op for trials already terminal.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] for an unknown trial.
    pub fn stop_trial(&mut self, id: TrialId) -> Result<()> {
        let idx = self
            .position(id)
            .ok_or(Error::Internal("unknown trial id"))?;
        if self.trials[idx].is_finished() {
            return Ok(());
        }
        trace_info!(trial = id, "trial stopped");
        self.finalize_stop(idx);
        Ok(())
    }

    fn refill_trial_queue(&mut self) {
        for trial in self.search_alg.next_trials() {
            self.add_trial(trial);
        }
    }

    fn admit_trials(&mut self) -> Result<()> {
        loop {
            let chosen = {
                let ctx = SchedulingContext::new(&self.trials, &self.executor);
                self.scheduler.choose_trial_to_run(&ctx)
            };
            let Some(id) = chosen else { break };
            let Some(idx) = self.position(id) else { break };
            match self.executor.start_trial(&self.trials[idx]) {
                Ok(()) => {
                    trace_info!(trial = id, "trial admitted");
                }
                // Expected backpressure: the trial waits for capacity.
                Err(Error::ResourceUnavailable { .. }) => break,
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn process_payload(&mut self, id: TrialId, payload: CompletionPayload) -> Result<()> {
        let Some(idx) = self.position(id) else {
            return Ok(());
        };
        // A teardown earlier in this batch (failure requeue, pause, fail-fast
        // cleanup) makes the trial's remaining completions stale.
        if self.trials[idx].is_finished() || !self.executor.has_handle(id) {
            return Ok(());
        }
        match payload {
            CompletionPayload::Started => {
                self.set_status(idx, TrialStatus::Running);
                // A checkpointed trial has a RESTORE behind its START; the
                // first STEP is dispatched when that restore completes.
                if !self.trials[idx].has_checkpoint() {
                    self.executor.continue_trial(&self.trials[idx])?;
                }
            }
            CompletionPayload::Restored => {
                self.executor.continue_trial(&self.trials[idx])?;
            }
            CompletionPayload::Stepped(result) => self.process_result(idx, result)?,
            CompletionPayload::Saved(checkpoint) => self.process_save(idx, checkpoint)?,
            CompletionPayload::Stopped => {}
        }
        Ok(())
    }

    fn process_result(&mut self, idx: usize, mut result: TrialResult) -> Result<()> {
        let id = self.trials[idx].id();
        if !result.done && self.trials[idx].criterion_met(&result) {
            result.done = true;
        }
        let iteration = result.training_iteration();
        let done = result.done;
        self.trials[idx].set_last_result(result.clone());
        {
            let trial = &self.trials[idx];
            for callback in &mut self.callbacks {
                callback.on_trial_result(trial, &result);
            }
        }
        if done {
            trace_info!(trial = id, iteration, "trial reached its stopping condition");
            return self.begin_stop(idx, iteration);
        }
        self.search_alg.on_trial_result(id, &result);
        match self.scheduler.on_trial_result(&self.trials[idx], &result) {
            Decision::Continue => {
                if self.trials[idx].checkpoint_due(iteration) {
                    self.executor.save_trial(&self.trials[idx])?;
                } else {
                    self.executor.continue_trial(&self.trials[idx])?;
                }
            }
            Decision::Pause => {
                trace_info!(trial = id, "scheduler paused trial");
                self.pause_at(idx);
            }
            Decision::Stop => {
                trace_info!(trial = id, "scheduler stopped trial");
                self.begin_stop(idx, iteration)?;
            }
        }
        Ok(())
    }

    fn process_save(&mut self, idx: usize, checkpoint: Checkpoint) -> Result<()> {
        trace_debug!(
            trial = self.trials[idx].id(),
            iteration = checkpoint.iteration(),
            "checkpoint saved"
        );
        self.trials[idx].set_checkpoint(checkpoint.clone());
        {
            let trial = &self.trials[idx];
            for callback in &mut self.callbacks {
                callback.on_checkpoint(trial, &checkpoint);
            }
        }
        if self.trials[idx].stop_after_save() {
            self.trials[idx].set_stop_after_save(false);
            self.finalize_stop(idx);
        } else {
            self.executor.continue_trial(&self.trials[idx])?;
        }
        Ok(())
    }

    fn process_failure(
        &mut self,
        id: TrialId,
        kind: RequestKind,
        failure: &WorkerFailure,
    ) -> Result<()> {
        let Some(idx) = self.position(id) else {
            return Ok(());
        };
        if self.trials[idx].is_finished() || !self.executor.has_handle(id) {
            return Ok(());
        }
        let recoverable = self.trials[idx].retry_budget_left();
        if self.fail_fast == FailFast::Raise && !recoverable {
            return Err(Error::RemoteExecution {
                trial: id,
                kind,
                message: failure.to_string(),
            });
        }
        trace_info!(trial = id, kind = %kind, recoverable, "remote request failed");
        self.trials[idx].record_failure(failure.to_string());
        self.scheduler.on_trial_error(&self.trials[idx]);
        self.executor.clear_trial(id);
        if recoverable {
            // Requeue; the retained checkpoint is restored on restart.
            self.trials[idx].set_stop_after_save(false);
            self.set_status(idx, TrialStatus::Pending);
        } else {
            self.set_status(idx, TrialStatus::Error);
            self.search_alg.on_trial_complete(id, true);
            if self.fail_fast == FailFast::Enabled {
                trace_info!(trial = id, "fail-fast engaged, terminating remaining trials");
                self.terminate_siblings(idx);
            }
        }
        Ok(())
    }

    fn begin_stop(&mut self, idx: usize, iteration: u64) -> Result<()> {
        if self.trials[idx].wants_final_checkpoint(iteration) {
            self.trials[idx].set_stop_after_save(true);
            self.executor.save_trial(&self.trials[idx])?;
        } else {
            self.finalize_stop(idx);
        }
        Ok(())
    }

    fn finalize_stop(&mut self, idx: usize) {
        let id = self.trials[idx].id();
        self.scheduler.on_trial_complete(&self.trials[idx]);
        self.search_alg.on_trial_complete(id, false);
        self.executor.clear_trial(id);
        self.set_status(idx, TrialStatus::Terminated);
    }

    fn pause_at(&mut self, idx: usize) {
        let id = self.trials[idx].id();
        self.executor.clear_trial(id);
        self.set_status(idx, TrialStatus::Paused);
    }

    fn terminate_siblings(&mut self, failed_idx: usize) {
        for idx in 0..self.trials.len() {
            if idx == failed_idx || self.trials[idx].is_finished() {
                continue;
            }
            let id = self.trials[idx].id();
            self.executor.clear_trial(id);
            self.set_status(idx, TrialStatus::Terminated);
        }
    }

    fn set_status(&mut self, idx: usize, status: TrialStatus) {
        let previous = self.trials[idx].status();
        if previous == status {
            return;
        }
        self.trials[idx].set_status(status);
        trace_info!(
            trial = self.trials[idx].id(),
            from = ?previous,
            to = ?status,
            "trial status changed"
        );
        let trial = &self.trials[idx];
        for callback in &mut self.callbacks {
            callback.on_status_change(trial, previous);
        }
    }

    fn position(&self, id: TrialId) -> Option<usize> {
        self.trials.iter().position(|trial| trial.id() == id)
    }
}
