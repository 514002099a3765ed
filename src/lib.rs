#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::std_instead_of_core)]

//! Fault-tolerant scheduler for long-lived iterative trials on a shared,
//! resource-constrained cluster.
//!
//! A *trial* is one unit of iterative remote work — a training run, a
//! simulation, a tuning candidate — with its own lifecycle, retry budget,
//! and checkpoint history. The [`TrialRunner`] drives any number of trials
//! from a single control thread: admission against a capacity ledger,
//! asynchronous start/step/save/restore requests against per-trial remote
//! workers, failure classification with checkpoint-based recovery, and
//! pluggable [`Scheduler`](scheduler::Scheduler) /
//! [`SearchAlgorithm`](search::SearchAlgorithm) policies hooked into every
//! lifecycle transition.
//!
//! The control loop is step-driven: one [`step`](TrialRunner::step) call
//! performs one unit of scheduling work and returns, polling remote
//! completions without ever blocking on an individual trial. One slow worker
//! never stalls the rest.
//!
//! # Getting Started
//!
//! Implement [`Worker`](worker::Worker) for the iterative computation, hand
//! the runner a factory closure, and drive the loop:
//!
//! ```
//! use tuner::worker::{StepReport, Worker};
//! use tuner::{result, Config, Resources, Trial, TrialRunner, TrialStatus, WorkerFailure};
//!
//! struct CountingWorker {
//!     count: u64,
//! }
//!
//! impl Worker for CountingWorker {
//!     fn step(&mut self) -> Result<StepReport, WorkerFailure> {
//!         self.count += 1;
//!         Ok(StepReport::new().with_metric("score", 1.0 / self.count as f64))
//!     }
//!
//!     fn save(&mut self) -> Result<Vec<u8>, WorkerFailure> {
//!         Ok(self.count.to_le_bytes().to_vec())
//!     }
//!
//!     fn restore(&mut self, snapshot: &[u8]) -> Result<(), WorkerFailure> {
//!         let bytes: [u8; 8] = snapshot
//!             .try_into()
//!             .map_err(|_| WorkerFailure::new("malformed snapshot"))?;
//!         self.count = u64::from_le_bytes(bytes);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> tuner::Result<()> {
//! let mut runner = TrialRunner::builder(|_config: &Config| {
//!     Ok::<_, WorkerFailure>(CountingWorker { count: 0 })
//! })
//! .resources(Resources::new().cpu(4.0))
//! .build();
//!
//! runner.add_trial(
//!     Trial::builder()
//!         .resources(Resources::new().cpu(1.0))
//!         .stop_when(result::TRAINING_ITERATION, 3.0)
//!         .build(),
//! );
//!
//! while !runner.is_finished() {
//!     runner.step()?;
//! }
//!
//! let trial = &runner.trials()[0];
//! assert_eq!(trial.status(), TrialStatus::Terminated);
//! assert_eq!(trial.last_result().unwrap().training_iteration(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`TrialRunner`] | Drive the control loop: admit trials, classify remote completions, apply retry and fail-fast policy. |
//! | [`Trial`] | The persistent record of one unit of work: status, results, checkpoint pointer, failure count. |
//! | [`TrialExecutor`] | Translate lifecycle intents into ledger and remote-worker operations; poll outstanding requests. |
//! | [`Worker`](worker::Worker) | The domain computation executing remotely: step, save, restore. |
//! | [`ResourceLedger`] | Track total versus committed capacity; answer admission queries. |
//! | [`Scheduler`](scheduler::Scheduler) | External policy for admission order and early pause/stop decisions. |
//! | [`SearchAlgorithm`](search::SearchAlgorithm) | External policy proposing trial configurations. |
//! | [`Callback`] | Read-only observer of every result and status transition. |
//!
//! # Fault tolerance
//!
//! A failed start/step/save/restore counts against the trial's retry budget
//! (`max_failures`; `-1` for unlimited). Within budget, the trial is requeued
//! and restored from its last valid checkpoint; beyond it, the trial ends in
//! [`TrialStatus::Error`] and — depending on [`FailFast`] — the rest of the
//! run proceeds, is terminated, or the failure is re-raised out of the loop.
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on the public value types | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at every lifecycle transition | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

mod callback;
mod error;
mod executor;
pub mod resources;
pub mod result;
mod runner;
pub mod scheduler;
pub mod search;
mod trial;
mod types;
pub mod worker;

pub use callback::Callback;
pub use error::{Error, Result, WorkerFailure};
pub use executor::TrialExecutor;
pub use resources::{CapacityHandle, ResourceLedger, Resources};
pub use result::TrialResult;
pub use runner::{TrialRunner, TrialRunnerBuilder};
pub use trial::{Checkpoint, Trial, TrialBuilder};
pub use types::{Config, ConfigValue, FailFast, RequestKind, TrialId, TrialStatus};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use tuner::prelude::*;
/// ```
pub mod prelude {
    pub use crate::callback::Callback;
    pub use crate::error::{Error, Result, WorkerFailure};
    pub use crate::executor::TrialExecutor;
    pub use crate::resources::{CapacityHandle, ResourceLedger, Resources};
    pub use crate::result::TrialResult;
    pub use crate::runner::{TrialRunner, TrialRunnerBuilder};
    pub use crate::scheduler::{Decision, FifoScheduler, Scheduler, SchedulingContext};
    pub use crate::search::{BasicSearch, SearchAlgorithm};
    pub use crate::trial::{Checkpoint, Trial, TrialBuilder};
    pub use crate::types::{Config, ConfigValue, FailFast, RequestKind, TrialId, TrialStatus};
    pub use crate::worker::{RemoteWorkerHandle, StepReport, Worker, WorkerFactory};
}
