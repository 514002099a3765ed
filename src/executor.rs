//! The trial executor: translates lifecycle intents into resource-ledger and
//! remote-worker operations, and reconciles which outstanding requests have
//! completed on each control-loop tick.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::resources::ResourceLedger;
use crate::trial::Trial;
use crate::types::{RequestKind, TrialId};
use crate::worker::{Completion, RemoteWorkerHandle, WorkerFactory};

/// Owns the remote worker handles and the outstanding-request registry.
///
/// All methods run on the control thread. Completions are observed solely
/// through [`fetch_ready`](TrialExecutor::fetch_ready); a completion whose
/// trial was paused or stopped while the request was in flight is discarded
/// there as stale.
pub struct TrialExecutor {
    factory: Arc<dyn WorkerFactory>,
    ledger: ResourceLedger,
    handles: HashMap<TrialId, RemoteWorkerHandle>,
    inflight: HashMap<TrialId, Vec<RequestKind>>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    poll_interval: Duration,
}

impl TrialExecutor {
    /// Create an executor over the given worker factory and capacity ledger.
    ///
    /// `poll_interval` bounds how long a single
    /// [`fetch_ready`](TrialExecutor::fetch_ready) waits for the first
    /// completion when requests are in flight.
    #[must_use]
    pub fn new(
        factory: Arc<dyn WorkerFactory>,
        ledger: ResourceLedger,
        poll_interval: Duration,
    ) -> Self {
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();
        Self {
            factory,
            ledger,
            handles: HashMap::new(),
            inflight: HashMap::new(),
            completions_tx,
            completions_rx,
            poll_interval,
        }
    }

    /// The capacity ledger backing admission decisions.
    #[must_use]
    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// The worker handle of a started trial, for out-of-band inspection.
    #[must_use]
    pub fn handle(&self, trial: TrialId) -> Option<&RemoteWorkerHandle> {
        self.handles.get(&trial)
    }

    /// Whether the trial has any request in flight.
    #[must_use]
    pub fn has_inflight(&self, trial: TrialId) -> bool {
        self.inflight
            .get(&trial)
            .is_some_and(|kinds| !kinds.is_empty())
    }

    /// Whether the trial has a live worker.
    #[must_use]
    pub fn has_handle(&self, trial: TrialId) -> bool {
        self.handles.contains_key(&trial)
    }

    /// Admit the trial and dispatch its START (and RESTORE, when a checkpoint
    /// exists).
    ///
    /// The trial stays `Pending` until the START completion is classified.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceUnavailable`] when the request does not fit the
    /// uncommitted capacity — expected backpressure, the trial simply waits.
    /// [`Error::Internal`] when the trial already has a request in flight.
    pub fn start_trial(&mut self, trial: &Trial) -> Result<()> {
        if self.has_inflight(trial.id()) || self.has_handle(trial.id()) {
            return Err(Error::Internal("trial started while already dispatched"));
        }
        if !self.ledger.can_admit(trial.resources()) {
            return Err(Error::ResourceUnavailable {
                requested: trial.resources().clone(),
            });
        }
        self.ledger.commit(trial.id(), trial.resources())?;

        let handle = RemoteWorkerHandle::spawn(
            trial.id(),
            trial.config().clone(),
            Arc::clone(&self.factory),
            self.completions_tx.clone(),
        );
        self.dispatch(trial.id(), RequestKind::Start, handle.start());
        if let Some(checkpoint) = trial.checkpoint() {
            self.dispatch(trial.id(), RequestKind::Restore, handle.restore(checkpoint.clone()));
        }
        self.handles.insert(trial.id(), handle);
        Ok(())
    }

    /// Dispatch the trial's next STEP.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] if another request is outstanding or the trial has
    /// no live worker.
    pub fn continue_trial(&mut self, trial: &Trial) -> Result<()> {
        self.dispatch_exclusive(trial.id(), RequestKind::Step)
    }

    /// Dispatch a SAVE of the trial's current progress.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] if another request is outstanding or the trial has
    /// no live worker.
    pub fn save_trial(&mut self, trial: &Trial) -> Result<()> {
        self.dispatch_exclusive(trial.id(), RequestKind::Save)
    }

    /// Tear the trial's worker down and release its resources, keeping the
    /// in-memory record; in-flight work is cancelled logically and any late
    /// completion is discarded as stale.
    pub fn pause_trial(&mut self, trial: &Trial) {
        self.clear_trial(trial.id());
    }

    /// Same teardown as [`pause_trial`](TrialExecutor::pause_trial); the
    /// runner marks the trial terminal.
    pub fn stop_trial(&mut self, trial: &Trial) {
        self.clear_trial(trial.id());
    }

    pub(crate) fn clear_trial(&mut self, trial: TrialId) {
        self.inflight.remove(&trial);
        if let Some(handle) = self.handles.remove(&trial) {
            handle.stop();
        }
        self.ledger.release(trial);
    }

    /// Drain every completed request without blocking on those still in
    /// flight.
    ///
    /// Waits at most the configured poll interval for the first completion
    /// when requests are outstanding and none is ready yet — a bounded wait
    /// over the whole set, never on any individual trial. Stale completions
    /// (for requests no longer in the registry) are dropped.
    pub fn fetch_ready(&mut self) -> Vec<Completion> {
        let mut ready = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.collect(completion, &mut ready);
        }
        if ready.is_empty() && self.has_outstanding() {
            let deadline = Instant::now() + self.poll_interval;
            while ready.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match self.completions_rx.recv_timeout(remaining) {
                    Ok(completion) => self.collect(completion, &mut ready),
                    Err(_) => break,
                }
            }
            // Pick up anything else that arrived in the meantime.
            while let Ok(completion) = self.completions_rx.try_recv() {
                self.collect(completion, &mut ready);
            }
        }
        ready
    }

    fn collect(&mut self, completion: Completion, ready: &mut Vec<Completion>) {
        let mut known = false;
        let mut now_empty = false;
        if let Some(kinds) = self.inflight.get_mut(&completion.trial) {
            if let Some(index) = kinds.iter().position(|kind| *kind == completion.kind) {
                kinds.remove(index);
                known = true;
            }
            now_empty = kinds.is_empty();
        }
        if now_empty {
            self.inflight.remove(&completion.trial);
        }
        if known {
            ready.push(completion);
        } else {
            trace_debug!(
                trial = completion.trial,
                kind = %completion.kind,
                "discarding stale completion"
            );
        }
    }

    fn has_outstanding(&self) -> bool {
        self.inflight.values().any(|kinds| !kinds.is_empty())
    }

    fn dispatch_exclusive(&mut self, trial: TrialId, kind: RequestKind) -> Result<()> {
        if self.has_inflight(trial) {
            return Err(Error::Internal(
                "request dispatched while another is outstanding",
            ));
        }
        let Some(handle) = self.handles.get(&trial) else {
            return Err(Error::Internal("request dispatched without a live worker"));
        };
        let sent = match kind {
            RequestKind::Step => handle.step(),
            RequestKind::Save => handle.save(),
            _ => return Err(Error::Internal("unsupported exclusive request kind")),
        };
        self.dispatch(trial, kind, sent);
        Ok(())
    }

    /// Record the request as in flight; a send failure (dead worker thread)
    /// surfaces as a synthetic failed completion so classification stays
    /// uniform.
    fn dispatch(
        &mut self,
        trial: TrialId,
        kind: RequestKind,
        sent: core::result::Result<(), crate::error::WorkerFailure>,
    ) {
        self.inflight.entry(trial).or_default().push(kind);
        if let Err(failure) = sent {
            let _ = self.completions_tx.send(Completion {
                trial,
                kind,
                outcome: Err(failure),
            });
        }
    }
}
