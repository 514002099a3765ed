use tuner::result::TRAINING_ITERATION;
use tuner::scheduler::{Decision, FifoScheduler, Scheduler, SchedulingContext};
use tuner::{Resources, Trial, TrialId, TrialResult, TrialRunner, TrialStatus};

use crate::support::{mock_factory, run_to_completion, Recorder};

fn one_cpu() -> Resources {
    Resources::new().cpu(1.0)
}

/// FIFO admission that pauses a trial once, at a fixed iteration.
struct PauseOnce {
    at_iteration: u64,
    paused: bool,
    inner: FifoScheduler,
}

impl PauseOnce {
    fn new(at_iteration: u64) -> Self {
        Self {
            at_iteration,
            paused: false,
            inner: FifoScheduler,
        }
    }
}

impl Scheduler for PauseOnce {
    fn on_trial_result(&mut self, _trial: &Trial, result: &TrialResult) -> Decision {
        if !self.paused && result.training_iteration() == self.at_iteration {
            self.paused = true;
            Decision::Pause
        } else {
            Decision::Continue
        }
    }

    fn choose_trial_to_run(&mut self, ctx: &SchedulingContext<'_>) -> Option<TrialId> {
        self.inner.choose_trial_to_run(ctx)
    }
}

/// Admission policy that never resumes paused trials.
struct PendingOnly;

impl Scheduler for PendingOnly {
    fn choose_trial_to_run(&mut self, ctx: &SchedulingContext<'_>) -> Option<TrialId> {
        ctx.schedulable()
            .find(|trial| {
                trial.status() == TrialStatus::Pending && ctx.can_admit(trial.resources())
            })
            .map(Trial::id)
    }
}

#[test]
fn test_pause_releases_resources_and_keeps_the_record() {
    let mut runner = TrialRunner::new(mock_factory(), one_cpu());
    let id = runner.add_trial(
        Trial::builder()
            .resources(one_cpu())
            .stop_when(TRAINING_ITERATION, 5.0)
            .build(),
    );

    runner.step().unwrap();
    runner.step().unwrap();
    assert_eq!(runner.trial(id).unwrap().status(), TrialStatus::Running);
    assert_eq!(runner.executor().ledger().committed("cpu"), 1.0);

    runner.pause_trial(id).unwrap();
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Paused);
    assert_eq!(runner.executor().ledger().committed("cpu"), 0.0);
    assert!(trial.last_result().is_some(), "record survives the pause");
}

#[test]
fn test_scheduler_pause_then_resume_restores_from_checkpoint() {
    let recorder = Recorder::default();
    let mut runner = TrialRunner::builder(mock_factory())
        .resources(one_cpu())
        .scheduler(PauseOnce::new(2))
        .callback(recorder.clone())
        .build();
    let id = runner.add_trial(
        Trial::builder()
            .resources(one_cpu())
            .stop_when(TRAINING_ITERATION, 3.0)
            .checkpoint_freq(1)
            .build(),
    );

    // Step until the scheduler's pause lands, then verify resources freed.
    for _ in 0..10 {
        if runner.trial(id).unwrap().status() == TrialStatus::Paused {
            break;
        }
        runner.step().unwrap();
    }
    assert_eq!(runner.trial(id).unwrap().status(), TrialStatus::Paused);
    assert_eq!(runner.executor().ledger().committed("cpu"), 0.0);
    assert_eq!(runner.trial(id).unwrap().checkpoint().unwrap().iteration(), 1);

    run_to_completion(&mut runner);
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Terminated);
    assert_eq!(trial.num_failures(), 0);
    let result = trial.last_result().unwrap();
    assert_eq!(result.training_iteration(), 3);
    // Resumed from the iteration-1 checkpoint, so two steps ran since.
    assert_eq!(result.iterations_since_restore(), 2);

    let transitions = recorder.transitions_for(id);
    assert!(transitions.contains(&(TrialStatus::Running, TrialStatus::Paused)));
    assert!(transitions.contains(&(TrialStatus::Paused, TrialStatus::Running)));
}

#[test]
fn test_stale_completion_after_pause_is_discarded() {
    let mut runner = TrialRunner::builder(mock_factory())
        .resources(one_cpu())
        .scheduler(PendingOnly)
        .build();
    let id = runner.add_trial(
        Trial::builder()
            .resources(one_cpu())
            .stop_when(TRAINING_ITERATION, 10.0)
            .build(),
    );

    runner.step().unwrap();
    runner.step().unwrap();
    assert_eq!(runner.trial(id).unwrap().status(), TrialStatus::Running);

    // A step request is in flight; pausing cancels it logically and its late
    // completion must be dropped, not applied.
    runner.pause_trial(id).unwrap();
    for _ in 0..3 {
        runner.step().unwrap();
        assert_eq!(runner.trial(id).unwrap().status(), TrialStatus::Paused);
        assert_eq!(runner.trial(id).unwrap().last_result().unwrap().training_iteration(), 1);
    }

    runner.stop_trial(id).unwrap();
    assert!(runner.is_finished());
}
