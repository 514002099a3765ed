//! Resource requests and the cluster capacity ledger.
//!
//! The [`ResourceLedger`] tracks total cluster capacity against currently
//! committed amounts and answers admission queries for the executor. Totals
//! live behind a shared lock so an external autoscaler can grow the cluster
//! at any time through a [`CapacityHandle`]; committed amounts are mutated
//! only from the control thread.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::types::TrialId;

/// Standard resource name for CPU cores.
pub const CPU: &str = "cpu";

/// Standard resource name for GPU devices.
pub const GPU: &str = "gpu";

/// A named-quantity resource demand, e.g. `{cpu: 1, gpu: 1}`.
///
/// # Examples
///
/// ```
/// use tuner::Resources;
///
/// let request = Resources::new().cpu(2.0).gpu(1.0).custom("tpu", 4.0);
/// assert_eq!(request.get("cpu"), 2.0);
/// assert_eq!(request.get("tpu"), 4.0);
/// assert_eq!(request.get("disk"), 0.0);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resources {
    quantities: BTreeMap<String, f64>,
}

impl Resources {
    /// Create an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CPU quantity.
    #[must_use]
    pub fn cpu(self, amount: f64) -> Self {
        self.custom(CPU, amount)
    }

    /// Set the GPU quantity.
    #[must_use]
    pub fn gpu(self, amount: f64) -> Self {
        self.custom(GPU, amount)
    }

    /// Set a custom-named quantity.
    #[must_use]
    pub fn custom(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.quantities.insert(name.into(), amount);
        self
    }

    /// The quantity for a resource name, `0` if absent.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.quantities.get(name).copied().unwrap_or(0.0)
    }

    /// Iterate over `(name, quantity)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.quantities
            .iter()
            .map(|(name, amount)| (name.as_str(), *amount))
    }

    /// Whether the request demands nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantities.values().all(|amount| *amount <= 0.0)
    }
}

impl core::fmt::Display for Resources {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{{")?;
        for (index, (name, amount)) in self.quantities.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {amount}")?;
        }
        write!(f, "}}")
    }
}

/// Grows cluster capacity from outside the control thread.
///
/// Cloneable handle given to the external autoscaler collaborator. Capacity
/// can only be added through it; shrinking is not expressible, so committed
/// amounts are never invalidated.
#[derive(Clone)]
pub struct CapacityHandle {
    totals: Arc<RwLock<BTreeMap<String, f64>>>,
}

impl CapacityHandle {
    /// Add capacity for every resource named in `additional`.
    pub fn add(&self, additional: &Resources) {
        let mut totals = self.totals.write();
        for (name, amount) in additional.iter() {
            *totals.entry(name.to_string()).or_insert(0.0) += amount;
        }
    }
}

/// Tracks total versus committed cluster capacity and answers admission
/// queries.
///
/// Invariant: `committed <= total` for every resource name, at every
/// observable point between control-loop steps. Commitments are keyed by
/// trial so [`release`](ResourceLedger::release) is idempotent and releases
/// exactly what that trial committed.
pub struct ResourceLedger {
    totals: Arc<RwLock<BTreeMap<String, f64>>>,
    committed: BTreeMap<String, f64>,
    by_trial: HashMap<TrialId, Resources>,
}

impl ResourceLedger {
    /// Create a ledger with the given initial total capacity.
    #[must_use]
    pub fn new(capacity: Resources) -> Self {
        let mut totals = BTreeMap::new();
        for (name, amount) in capacity.iter() {
            totals.insert(name.to_string(), amount);
        }
        Self {
            totals: Arc::new(RwLock::new(totals)),
            committed: BTreeMap::new(),
            by_trial: HashMap::new(),
        }
    }

    /// A handle through which the autoscaler collaborator may add capacity.
    #[must_use]
    pub fn capacity_handle(&self) -> CapacityHandle {
        CapacityHandle {
            totals: Arc::clone(&self.totals),
        }
    }

    /// Whether `request` fits into the currently uncommitted capacity.
    ///
    /// Pure query, no side effect.
    #[must_use]
    pub fn can_admit(&self, request: &Resources) -> bool {
        let totals = self.totals.read();
        request.iter().all(|(name, amount)| {
            let total = totals.get(name).copied().unwrap_or(0.0);
            self.committed_for(name) + amount <= total
        })
    }

    /// Commit `request` on behalf of `trial`.
    ///
    /// # Errors
    ///
    /// [`Error::OverCommit`] if any resource would exceed capacity, or
    /// [`Error::Internal`] if the trial already holds a commitment. Neither
    /// occurs when callers check [`can_admit`](ResourceLedger::can_admit)
    /// first and release between attempts; capacity growth between the check
    /// and the commit only widens the margin.
    pub fn commit(&mut self, trial: TrialId, request: &Resources) -> Result<()> {
        if self.by_trial.contains_key(&trial) {
            return Err(Error::Internal("trial already holds a resource commitment"));
        }
        {
            let totals = self.totals.read();
            for (name, amount) in request.iter() {
                let total = totals.get(name).copied().unwrap_or(0.0);
                let committed = self.committed_for(name);
                if committed + amount > total {
                    return Err(Error::OverCommit {
                        resource: name.to_string(),
                        requested: amount,
                        available: total - committed,
                    });
                }
            }
        }
        for (name, amount) in request.iter() {
            *self.committed.entry(name.to_string()).or_insert(0.0) += amount;
        }
        self.by_trial.insert(trial, request.clone());
        Ok(())
    }

    /// Release whatever `trial` committed. No-op if nothing was committed.
    pub fn release(&mut self, trial: TrialId) {
        let Some(request) = self.by_trial.remove(&trial) else {
            return;
        };
        for (name, amount) in request.iter() {
            if let Some(entry) = self.committed.get_mut(name) {
                *entry = (*entry - amount).max(0.0);
            }
        }
    }

    /// Total capacity for a resource name.
    #[must_use]
    pub fn total(&self, name: &str) -> f64 {
        self.totals.read().get(name).copied().unwrap_or(0.0)
    }

    /// Currently committed amount for a resource name.
    #[must_use]
    pub fn committed(&self, name: &str) -> f64 {
        self.committed_for(name)
    }

    /// Uncommitted capacity for a resource name.
    #[must_use]
    pub fn available(&self, name: &str) -> f64 {
        self.total(name) - self.committed_for(name)
    }

    fn committed_for(&self, name: &str) -> f64 {
        self.committed.get(name).copied().unwrap_or(0.0)
    }
}
