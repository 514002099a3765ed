//! Core types for the trial scheduler.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier of a trial, assigned at creation.
pub type TrialId = u64;

/// The lifecycle state of a trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrialStatus {
    /// Waiting for admission (initial state, and the requeue state after a
    /// recoverable failure).
    Pending,
    /// Executing on a remote worker.
    Running,
    /// Explicitly paused; resources released, record preserved.
    Paused,
    /// Failed beyond its retry budget (terminal).
    Error,
    /// Finished, either by meeting its stopping criterion or by an explicit
    /// stop (terminal).
    Terminated,
}

impl TrialStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Terminated)
    }
}

/// Policy for how one trial's unrecoverable error affects the rest of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailFast {
    /// Record the errored trial and let every other trial proceed normally.
    #[default]
    Disabled,
    /// After the first terminal error, force every other non-terminal trial
    /// to `Terminated`, bypassing their stopping criteria.
    Enabled,
    /// Re-raise the first unrecoverable failure out of the control loop,
    /// performing no cleanup and leaving other trials as they were.
    Raise,
}

/// The kind of an asynchronous remote request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RequestKind {
    /// Construct the remote worker from the trial's configuration.
    Start,
    /// Run one unit of iterative work and report a result.
    Step,
    /// Persist a checkpoint of the worker's progress.
    Save,
    /// Load a previously saved checkpoint into the worker.
    Restore,
    /// Tear the remote worker down.
    Stop,
}

impl core::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Step => "step",
            Self::Save => "save",
            Self::Restore => "restore",
            Self::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// A typed configuration value.
///
/// Trial configuration is opaque to the scheduler; it is handed to the worker
/// factory at start time and never interpreted by the control loop.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConfigValue {
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    Str(String),
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Opaque key-value configuration passed to a trial's remote worker.
///
/// # Examples
///
/// ```
/// use tuner::Config;
///
/// let config = Config::new()
///     .with("learning_rate", 0.01)
///     .with("batch_size", 64_i64)
///     .with("augment", true);
///
/// assert_eq!(config.float("learning_rate"), Some(0.01));
/// assert_eq!(config.int("batch_size"), Some(64));
/// assert_eq!(config.bool("augment"), Some(true));
/// assert_eq!(config.bool("missing"), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    values: HashMap<String, ConfigValue>,
}

impl Config {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, consuming and returning the configuration for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Set a key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Look up a boolean value; `None` if absent or of another type.
    #[must_use]
    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(ConfigValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Look up an integer value; `None` if absent or of another type.
    #[must_use]
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ConfigValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Look up a float value; `None` if absent or of another type.
    #[must_use]
    pub fn float(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(ConfigValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    /// Look up a string value; `None` if absent or of another type.
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ConfigValue::Str(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Whether the configuration has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
