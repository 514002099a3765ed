use core::time::Duration;
use std::sync::Arc;

use crate::callback::Callback;
use crate::executor::TrialExecutor;
use crate::resources::{ResourceLedger, Resources};
use crate::scheduler::{FifoScheduler, Scheduler};
use crate::search::{BasicSearch, SearchAlgorithm};
use crate::types::FailFast;
use crate::worker::WorkerFactory;

use super::TrialRunner;

/// A builder for constructing [`TrialRunner`] instances with a fluent API.
///
/// Created via [`TrialRunner::builder`]. Collects the cluster capacity,
/// policies, observers, and loop tuning before constructing the runner.
///
/// # Defaults
///
/// - Capacity: empty (set [`resources`](TrialRunnerBuilder::resources) to
///   admit anything that demands resources)
/// - Search algorithm: [`BasicSearch`]
/// - Scheduler: [`FifoScheduler`]
/// - Fail-fast: [`FailFast::Disabled`]
/// - Poll interval: 500 ms
pub struct TrialRunnerBuilder {
    factory: Arc<dyn WorkerFactory>,
    capacity: Resources,
    search_alg: Option<Box<dyn SearchAlgorithm>>,
    scheduler: Option<Box<dyn Scheduler>>,
    callbacks: Vec<Box<dyn Callback>>,
    fail_fast: FailFast,
    poll_interval: Duration,
}

impl TrialRunnerBuilder {
    pub(super) fn new(factory: Arc<dyn WorkerFactory>) -> Self {
        Self {
            factory,
            capacity: Resources::new(),
            search_alg: None,
            scheduler: None,
            callbacks: Vec::new(),
            fail_fast: FailFast::default(),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Set the total cluster capacity backing admission decisions.
    #[must_use]
    pub fn resources(mut self, capacity: Resources) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the search algorithm proposing trials.
    ///
    /// Defaults to [`BasicSearch`] if not specified.
    #[must_use]
    pub fn search_algorithm(mut self, search_alg: impl SearchAlgorithm + 'static) -> Self {
        self.search_alg = Some(Box::new(search_alg));
        self
    }

    /// Set the scheduler deciding admission order and pause/stop decisions.
    ///
    /// Defaults to [`FifoScheduler`] if not specified.
    #[must_use]
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Register a read-only observer; may be called multiple times.
    #[must_use]
    pub fn callback(mut self, callback: impl Callback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Set how one trial's unrecoverable error affects the rest of the run.
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: FailFast) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Bound how long one [`step`](TrialRunner::step) waits for the first
    /// remote completion when requests are in flight.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Build the [`TrialRunner`] with the configured options.
    #[must_use]
    pub fn build(self) -> TrialRunner {
        let executor = TrialExecutor::new(
            self.factory,
            ResourceLedger::new(self.capacity),
            self.poll_interval,
        );
        TrialRunner {
            executor,
            search_alg: self
                .search_alg
                .unwrap_or_else(|| Box::new(BasicSearch::new())),
            scheduler: self.scheduler.unwrap_or_else(|| Box::new(FifoScheduler)),
            callbacks: self.callbacks,
            trials: Vec::new(),
            fail_fast: self.fail_fast,
        }
    }
}
