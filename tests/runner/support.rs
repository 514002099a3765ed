//! Deterministic mocks for driving the control loop: a configurable worker,
//! recording policy wrappers, and a read-only observer.

use std::sync::Arc;

use parking_lot::Mutex;

use tuner::scheduler::{FifoScheduler, Scheduler, SchedulingContext};
use tuner::search::{BasicSearch, SearchAlgorithm};
use tuner::worker::{StepReport, Worker, WorkerFactory};
use tuner::{
    Callback, Checkpoint, Config, Trial, TrialId, TrialResult, TrialRunner, TrialStatus,
    WorkerFailure,
};

pub const TIMESTEPS_PER_ITER: u64 = 10;

/// Stand-in for a remote training workload, driven by config keys:
///
/// - `start_error`: fail worker construction.
/// - `mock_error`: fail the step taken at iteration `error_at` (default 1).
///   The failure recurs on every attempt when `persistent_error` is set;
///   otherwise a restored worker runs through cleanly.
pub struct MockWorker {
    pub iteration: u64,
    restored: bool,
    mock_error: bool,
    persistent_error: bool,
    error_at: u64,
}

impl MockWorker {
    #[allow(clippy::cast_sign_loss)]
    fn from_config(config: &Config) -> Self {
        Self {
            iteration: 0,
            restored: false,
            mock_error: config.bool("mock_error").unwrap_or(false),
            persistent_error: config.bool("persistent_error").unwrap_or(false),
            error_at: config.int("error_at").map_or(1, |at| at as u64),
        }
    }
}

impl Worker for MockWorker {
    fn step(&mut self) -> Result<StepReport, WorkerFailure> {
        if self.mock_error
            && self.iteration == self.error_at
            && (self.persistent_error || !self.restored)
        {
            return Err(WorkerFailure::new("intentional step failure"));
        }
        self.iteration += 1;
        Ok(StepReport::new()
            .with_metric("score", self.iteration as f64)
            .with_timesteps(TIMESTEPS_PER_ITER))
    }

    fn save(&mut self) -> Result<Vec<u8>, WorkerFailure> {
        Ok(self.iteration.to_le_bytes().to_vec())
    }

    fn restore(&mut self, snapshot: &[u8]) -> Result<(), WorkerFailure> {
        let bytes: [u8; 8] = snapshot
            .try_into()
            .map_err(|_| WorkerFailure::new("malformed snapshot"))?;
        self.iteration = u64::from_le_bytes(bytes);
        self.restored = true;
        Ok(())
    }
}

pub fn mock_factory() -> impl WorkerFactory {
    |config: &Config| {
        if config.bool("start_error").unwrap_or(false) {
            return Err(WorkerFailure::new("intentional start failure"));
        }
        Ok(MockWorker::from_config(config))
    }
}

/// Shared id list handed out by the recording policies.
#[derive(Clone, Default)]
pub struct SharedIds(Arc<Mutex<Vec<TrialId>>>);

impl SharedIds {
    pub fn ids(&self) -> Vec<TrialId> {
        self.0.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().len()
    }

    fn push(&self, id: TrialId) {
        self.0.lock().push(id);
    }
}

/// FIFO scheduler that records every trial it is told errored, including
/// retried failures.
pub struct RecordingScheduler {
    inner: FifoScheduler,
    errored: SharedIds,
}

impl RecordingScheduler {
    pub fn new() -> (Self, SharedIds) {
        let errored = SharedIds::default();
        (
            Self {
                inner: FifoScheduler,
                errored: errored.clone(),
            },
            errored,
        )
    }
}

impl Scheduler for RecordingScheduler {
    fn on_trial_error(&mut self, trial: &Trial) {
        self.errored.push(trial.id());
    }

    fn choose_trial_to_run(&mut self, ctx: &SchedulingContext<'_>) -> Option<TrialId> {
        self.inner.choose_trial_to_run(ctx)
    }
}

/// Search algorithm that records trials completing with a terminal error.
pub struct RecordingSearch {
    inner: BasicSearch,
    errored: SharedIds,
}

impl RecordingSearch {
    pub fn new() -> (Self, SharedIds) {
        let errored = SharedIds::default();
        (
            Self {
                inner: BasicSearch::new(),
                errored: errored.clone(),
            },
            errored,
        )
    }
}

impl SearchAlgorithm for RecordingSearch {
    fn next_trials(&mut self) -> Vec<Trial> {
        self.inner.next_trials()
    }

    fn on_trial_complete(&mut self, trial: TrialId, error: bool) {
        if error {
            self.errored.push(trial);
        }
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Read-only observer collecting every result, status transition, and
/// checkpoint notification.
#[derive(Clone, Default)]
pub struct Recorder {
    results: Arc<Mutex<Vec<(TrialId, TrialResult)>>>,
    transitions: Arc<Mutex<Vec<(TrialId, TrialStatus, TrialStatus)>>>,
    checkpoints: Arc<Mutex<Vec<TrialId>>>,
}

impl Recorder {
    pub fn results_for(&self, trial: TrialId) -> Vec<TrialResult> {
        self.results
            .lock()
            .iter()
            .filter(|(id, _)| *id == trial)
            .map(|(_, result)| result.clone())
            .collect()
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().len()
    }

    pub fn transitions_for(&self, trial: TrialId) -> Vec<(TrialStatus, TrialStatus)> {
        self.transitions
            .lock()
            .iter()
            .filter(|(id, _, _)| *id == trial)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.lock().len()
    }
}

impl Callback for Recorder {
    fn on_trial_result(&mut self, trial: &Trial, result: &TrialResult) {
        self.results.lock().push((trial.id(), result.clone()));
    }

    fn on_status_change(&mut self, trial: &Trial, previous: TrialStatus) {
        self.transitions
            .lock()
            .push((trial.id(), previous, trial.status()));
    }

    fn on_checkpoint(&mut self, trial: &Trial, _checkpoint: &Checkpoint) {
        self.checkpoints.lock().push(trial.id());
    }
}

/// Drive the runner until every trial is terminal, with a generous step
/// bound so a livelock fails loudly instead of hanging.
pub fn run_to_completion(runner: &mut TrialRunner) {
    for _ in 0..200 {
        if runner.is_finished() {
            return;
        }
        runner.step().expect("step should succeed");
    }
    panic!("runner did not finish within 200 steps");
}
