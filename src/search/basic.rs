use std::collections::VecDeque;

use super::SearchAlgorithm;
use crate::trial::Trial;

/// A FIFO queue of pre-built trials (the default).
///
/// Hands out every queued trial on the first
/// [`next_trials`](SearchAlgorithm::next_trials) call and reports itself
/// exhausted afterwards, until more trials are enqueued.
///
/// # Examples
///
/// ```
/// use tuner::search::{BasicSearch, SearchAlgorithm};
/// use tuner::Trial;
///
/// let mut search = BasicSearch::with_trials([Trial::builder().build()]);
/// assert!(!search.is_finished());
///
/// let proposed = search.next_trials();
/// assert_eq!(proposed.len(), 1);
/// assert!(search.is_finished());
/// ```
#[derive(Default)]
pub struct BasicSearch {
    queue: VecDeque<Trial>,
    exhausted: bool,
}

impl BasicSearch {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue seeded with `trials`.
    #[must_use]
    pub fn with_trials(trials: impl IntoIterator<Item = Trial>) -> Self {
        Self {
            queue: trials.into_iter().collect(),
            exhausted: false,
        }
    }

    /// Enqueue another trial for the next proposal round.
    pub fn add_trial(&mut self, trial: Trial) {
        self.queue.push_back(trial);
        self.exhausted = false;
    }
}

impl SearchAlgorithm for BasicSearch {
    fn next_trials(&mut self) -> Vec<Trial> {
        self.exhausted = true;
        self.queue.drain(..).collect()
    }

    fn is_finished(&self) -> bool {
        self.exhausted && self.queue.is_empty()
    }
}
