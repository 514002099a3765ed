//! The remote worker boundary: the [`Worker`] trait, worker factories, and
//! the [`RemoteWorkerHandle`] proxy that issues asynchronous requests against
//! one trial's execution context.
//!
//! Each started trial gets a dedicated worker thread that owns the
//! `Box<dyn Worker>` and executes that trial's requests strictly in order, so
//! operations within one trial are sequential by construction. Completions
//! from every thread fan into a single channel owned by the executor; the
//! control loop observes them only through
//! [`TrialExecutor::fetch_ready`](crate::TrialExecutor::fetch_ready), never
//! through a blocking per-trial wait.
//!
//! The thread also wraps the domain worker with progress bookkeeping: it
//! accumulates the cumulative counters across restores, resets the
//! `*_since_restore` counters on start and restore, and merges the standard
//! keys of [`crate::result`] into every step report.

use core::any::Any;
use core::time::Duration;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::error::WorkerFailure;
use crate::result::{
    ITERATIONS_SINCE_RESTORE, TIMESTEPS_SINCE_RESTORE, TIMESTEPS_THIS_ITER, TIMESTEPS_TOTAL,
    TIME_SINCE_RESTORE, TIME_TOTAL_S, TRAINING_ITERATION, TrialResult,
};
use crate::trial::{Checkpoint, CheckpointData};
use crate::types::{Config, RequestKind, TrialId};

/// The raw output of one worker iteration.
///
/// The worker thread merges these metrics with the standard progress
/// counters before reporting a [`TrialResult`] to the control loop.
#[derive(Clone, Debug, Default)]
pub struct StepReport {
    /// Metric name to value.
    pub metrics: HashMap<String, f64>,
    /// Timesteps processed by this iteration, if the workload counts them.
    pub timesteps_this_iter: u64,
    /// Whether the worker declares itself finished.
    pub done: bool,
}

impl StepReport {
    /// Create an empty, not-done report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric, consuming and returning the report for chaining.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Set the timesteps processed by this iteration.
    #[must_use]
    pub fn with_timesteps(mut self, timesteps: u64) -> Self {
        self.timesteps_this_iter = timesteps;
        self
    }

    /// Mark the worker as finished.
    #[must_use]
    pub fn finished(mut self) -> Self {
        self.done = true;
        self
    }
}

/// One trial's iterative computation, executing inside a remote worker.
///
/// This is the external collaborator contract: the scheduler core never
/// interprets what a step computes or how a snapshot is encoded. After
/// [`restore`](Worker::restore), the next step's since-restore counters (kept
/// by the scheduler's bookkeeping, not the worker) reflect progress since
/// that restore point.
pub trait Worker: Any + Send {
    /// Run one unit of iterative work and report its metrics.
    ///
    /// # Errors
    ///
    /// A [`WorkerFailure`] counts as one execution failure against the
    /// trial's retry budget.
    fn step(&mut self) -> Result<StepReport, WorkerFailure>;

    /// Persist the worker's progress as an opaque snapshot.
    ///
    /// # Errors
    ///
    /// A [`WorkerFailure`] counts against the retry budget like a failed step.
    fn save(&mut self) -> Result<Vec<u8>, WorkerFailure>;

    /// Load a previously saved snapshot.
    ///
    /// # Errors
    ///
    /// A [`WorkerFailure`] counts against the retry budget like a failed step.
    fn restore(&mut self, snapshot: &[u8]) -> Result<(), WorkerFailure>;

    /// Tear the worker down. Called once before the execution context goes
    /// away; defaults to doing nothing.
    fn stop(&mut self) {}
}

impl<W: Worker + ?Sized> Worker for Box<W> {
    fn step(&mut self) -> Result<StepReport, WorkerFailure> {
        (**self).step()
    }

    fn save(&mut self) -> Result<Vec<u8>, WorkerFailure> {
        (**self).save()
    }

    fn restore(&mut self, snapshot: &[u8]) -> Result<(), WorkerFailure> {
        (**self).restore(snapshot)
    }

    fn stop(&mut self) {
        (**self).stop();
    }
}

/// Produces a fresh [`Worker`] for a trial from its configuration.
///
/// Implemented by plain closures; a factory error is classified as a START
/// failure of the trial that requested it.
///
/// # Examples
///
/// ```
/// use tuner::worker::{StepReport, Worker, WorkerFactory};
/// use tuner::{Config, WorkerFailure};
///
/// struct Noop;
///
/// impl Worker for Noop {
///     fn step(&mut self) -> Result<StepReport, WorkerFailure> {
///         Ok(StepReport::new().finished())
///     }
///     fn save(&mut self) -> Result<Vec<u8>, WorkerFailure> {
///         Ok(Vec::new())
///     }
///     fn restore(&mut self, _snapshot: &[u8]) -> Result<(), WorkerFailure> {
///         Ok(())
///     }
/// }
///
/// let factory = |_config: &Config| Ok::<_, WorkerFailure>(Noop);
/// assert!(factory.create(&Config::new()).is_ok());
/// ```
pub trait WorkerFactory: Send + Sync {
    /// Create a worker for the given trial configuration.
    ///
    /// # Errors
    ///
    /// A [`WorkerFailure`] here fails the trial's START request.
    fn create(&self, config: &Config) -> Result<Box<dyn Worker>, WorkerFailure>;
}

impl<W, F> WorkerFactory for F
where
    W: Worker + 'static,
    F: Fn(&Config) -> Result<W, WorkerFailure> + Send + Sync,
{
    fn create(&self, config: &Config) -> Result<Box<dyn Worker>, WorkerFailure> {
        self(config).map(|worker| Box::new(worker) as Box<dyn Worker>)
    }
}

/// The payload of a successfully completed request.
#[derive(Debug)]
pub enum CompletionPayload {
    /// The worker was constructed and is ready to step.
    Started,
    /// A checkpoint was loaded; since-restore counters were reset.
    Restored,
    /// One iteration finished and reported a result.
    Stepped(TrialResult),
    /// A checkpoint was persisted.
    Saved(Checkpoint),
    /// The worker was torn down.
    Stopped,
}

/// One completed asynchronous request, tagged with its trial and kind.
#[derive(Debug)]
pub struct Completion {
    /// The trial whose request completed.
    pub trial: TrialId,
    /// The kind of request that completed.
    pub kind: RequestKind,
    /// The request's outcome.
    pub outcome: Result<CompletionPayload, WorkerFailure>,
}

enum WorkerRequest {
    Start,
    Restore(Checkpoint),
    Step,
    Save,
    Stop,
    Call(Box<dyn FnOnce(&mut dyn Worker) + Send>),
}

/// Thin proxy for one trial's remote execution context.
///
/// Requests are fired asynchronously and return immediately; their
/// completions surface only through the executor's polling operation. The
/// out-of-band [`call`](RemoteWorkerHandle::call) pass-through runs a closure
/// against the live worker between scheduled requests, for auxiliary
/// inspection outside the scheduling protocol.
pub struct RemoteWorkerHandle {
    trial: TrialId,
    requests: Sender<WorkerRequest>,
}

impl RemoteWorkerHandle {
    pub(crate) fn spawn(
        trial: TrialId,
        config: Config,
        factory: Arc<dyn WorkerFactory>,
        completions: Sender<Completion>,
    ) -> Self {
        let (requests, inbox) = crossbeam_channel::unbounded();
        let host = WorkerHost {
            trial,
            config,
            factory,
            completions,
            worker: None,
            iteration: 0,
            timesteps_total: 0,
            time_total_s: 0.0,
            iterations_since_restore: 0,
            timesteps_since_restore: 0,
            restore_mark: Instant::now(),
        };
        thread::Builder::new()
            .name(format!("trial-worker-{trial}"))
            .spawn(move || host.run(&inbox))
            .expect("failed to spawn worker thread");
        Self { trial, requests }
    }

    /// The trial this handle is bound to.
    #[must_use]
    pub fn trial(&self) -> TrialId {
        self.trial
    }

    pub(crate) fn start(&self) -> Result<(), WorkerFailure> {
        self.request(WorkerRequest::Start)
    }

    pub(crate) fn step(&self) -> Result<(), WorkerFailure> {
        self.request(WorkerRequest::Step)
    }

    pub(crate) fn save(&self) -> Result<(), WorkerFailure> {
        self.request(WorkerRequest::Save)
    }

    pub(crate) fn restore(&self, checkpoint: Checkpoint) -> Result<(), WorkerFailure> {
        self.request(WorkerRequest::Restore(checkpoint))
    }

    pub(crate) fn stop(&self) {
        let _ = self.request(WorkerRequest::Stop);
    }

    /// Run `f` against the live worker and return its result.
    ///
    /// Blocks the caller until the worker thread gets to the call; intended
    /// for out-of-band inspection, not for the control loop.
    ///
    /// # Errors
    ///
    /// [`WorkerFailure`] if the worker has not started or its thread is gone.
    pub fn call<R, F>(&self, f: F) -> Result<R, WorkerFailure>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Worker) -> R + Send + 'static,
    {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.request(WorkerRequest::Call(Box::new(move |worker| {
            let _ = reply.send(f(worker));
        })))?;
        response
            .recv_timeout(Duration::from_secs(10))
            .map_err(|_| WorkerFailure::new("worker did not answer the call"))
    }

    fn request(&self, request: WorkerRequest) -> Result<(), WorkerFailure> {
        self.requests
            .send(request)
            .map_err(|_| WorkerFailure::new("worker thread terminated"))
    }
}

/// State owned by one trial's worker thread: the domain worker plus the
/// progress counters merged into every step report.
struct WorkerHost {
    trial: TrialId,
    config: Config,
    factory: Arc<dyn WorkerFactory>,
    completions: Sender<Completion>,
    worker: Option<Box<dyn Worker>>,
    iteration: u64,
    timesteps_total: u64,
    time_total_s: f64,
    iterations_since_restore: u64,
    timesteps_since_restore: u64,
    restore_mark: Instant,
}

impl WorkerHost {
    fn run(mut self, inbox: &Receiver<WorkerRequest>) {
        loop {
            let Ok(request) = inbox.recv() else {
                // Handle dropped without an explicit stop.
                self.shutdown();
                return;
            };
            match request {
                WorkerRequest::Start => {
                    let outcome = self.handle_start();
                    if !self.complete(RequestKind::Start, outcome) {
                        return;
                    }
                }
                WorkerRequest::Restore(checkpoint) => {
                    let outcome = self.handle_restore(&checkpoint);
                    if !self.complete(RequestKind::Restore, outcome) {
                        return;
                    }
                }
                WorkerRequest::Step => {
                    let outcome = self.handle_step();
                    if !self.complete(RequestKind::Step, outcome) {
                        return;
                    }
                }
                WorkerRequest::Save => {
                    let outcome = self.handle_save();
                    if !self.complete(RequestKind::Save, outcome) {
                        return;
                    }
                }
                WorkerRequest::Stop => {
                    self.shutdown();
                    let _ = self.completions.send(Completion {
                        trial: self.trial,
                        kind: RequestKind::Stop,
                        outcome: Ok(CompletionPayload::Stopped),
                    });
                    return;
                }
                WorkerRequest::Call(f) => {
                    if let Some(worker) = self.worker.as_mut() {
                        let _ = panic::catch_unwind(AssertUnwindSafe(|| f(worker.as_mut())));
                    }
                }
            }
        }
    }

    fn handle_start(&mut self) -> Result<CompletionPayload, WorkerFailure> {
        let factory = Arc::clone(&self.factory);
        let config = self.config.clone();
        let worker = guarded(
            RequestKind::Start,
            AssertUnwindSafe(move || factory.create(&config)),
        )?;
        self.worker = Some(worker);
        self.restore_mark = Instant::now();
        Ok(CompletionPayload::Started)
    }

    fn handle_restore(&mut self, checkpoint: &Checkpoint) -> Result<CompletionPayload, WorkerFailure> {
        let worker = self
            .worker
            .as_mut()
            .ok_or_else(|| WorkerFailure::new("restore requested before start"))?;
        let data = checkpoint.data();
        guarded(RequestKind::Restore, AssertUnwindSafe(|| {
            worker.restore(&data.snapshot)
        }))?;
        self.iteration = data.iteration;
        self.timesteps_total = data.timesteps_total;
        self.time_total_s = data.time_total_s;
        self.iterations_since_restore = 0;
        self.timesteps_since_restore = 0;
        self.restore_mark = Instant::now();
        Ok(CompletionPayload::Restored)
    }

    fn handle_step(&mut self) -> Result<CompletionPayload, WorkerFailure> {
        let worker = self
            .worker
            .as_mut()
            .ok_or_else(|| WorkerFailure::new("step requested before start"))?;
        let step_mark = Instant::now();
        let report = guarded(RequestKind::Step, AssertUnwindSafe(|| worker.step()))?;

        self.iteration += 1;
        self.iterations_since_restore += 1;
        self.timesteps_total += report.timesteps_this_iter;
        self.timesteps_since_restore += report.timesteps_this_iter;
        self.time_total_s += step_mark.elapsed().as_secs_f64();

        let mut result = TrialResult {
            metrics: report.metrics,
            done: report.done,
        };
        self.stamp_counters(&mut result, report.timesteps_this_iter);
        Ok(CompletionPayload::Stepped(result))
    }

    fn handle_save(&mut self) -> Result<CompletionPayload, WorkerFailure> {
        let worker = self
            .worker
            .as_mut()
            .ok_or_else(|| WorkerFailure::new("save requested before start"))?;
        let snapshot = guarded(RequestKind::Save, AssertUnwindSafe(|| worker.save()))?;
        let checkpoint = Checkpoint::new(CheckpointData {
            snapshot,
            iteration: self.iteration,
            timesteps_total: self.timesteps_total,
            time_total_s: self.time_total_s,
        });
        Ok(CompletionPayload::Saved(checkpoint))
    }

    #[allow(clippy::cast_precision_loss)]
    fn stamp_counters(&self, result: &mut TrialResult, timesteps_this_iter: u64) {
        let metrics = &mut result.metrics;
        metrics.insert(TRAINING_ITERATION.to_string(), self.iteration as f64);
        metrics.insert(TIMESTEPS_THIS_ITER.to_string(), timesteps_this_iter as f64);
        metrics.insert(TIMESTEPS_TOTAL.to_string(), self.timesteps_total as f64);
        metrics.insert(TIME_TOTAL_S.to_string(), self.time_total_s);
        metrics.insert(
            ITERATIONS_SINCE_RESTORE.to_string(),
            self.iterations_since_restore as f64,
        );
        metrics.insert(
            TIMESTEPS_SINCE_RESTORE.to_string(),
            self.timesteps_since_restore as f64,
        );
        metrics.insert(
            TIME_SINCE_RESTORE.to_string(),
            self.restore_mark.elapsed().as_secs_f64(),
        );
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| worker.stop()));
        }
    }

    /// Send the completion; false when the executor is gone and the thread
    /// should exit.
    fn complete(
        &mut self,
        kind: RequestKind,
        outcome: Result<CompletionPayload, WorkerFailure>,
    ) -> bool {
        self.completions
            .send(Completion {
                trial: self.trial,
                kind,
                outcome,
            })
            .is_ok()
    }
}

/// Run a worker operation, converting a panic into a [`WorkerFailure`].
fn guarded<T>(
    kind: RequestKind,
    op: impl FnOnce() -> Result<T, WorkerFailure> + std::panic::UnwindSafe,
) -> Result<T, WorkerFailure> {
    match panic::catch_unwind(op) {
        Ok(outcome) => outcome,
        Err(payload) => Err(WorkerFailure::new(format!(
            "{kind} panicked: {}",
            describe_panic(&payload)
        ))),
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "opaque panic payload"
    }
}
