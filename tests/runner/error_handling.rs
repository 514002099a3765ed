use tuner::{Config, Resources, Trial, TrialRunner, TrialStatus};

use crate::support::{mock_factory, run_to_completion, RecordingScheduler, RecordingSearch};

fn one_cpu() -> Resources {
    Resources::new().cpu(1.0)
}

#[test]
fn test_failure_without_retry_budget_is_terminal() {
    let (search, search_errors) = RecordingSearch::new();
    let (scheduler, scheduler_errors) = RecordingScheduler::new();
    let mut runner = TrialRunner::builder(mock_factory())
        .resources(one_cpu())
        .search_algorithm(search)
        .scheduler(scheduler)
        .build();
    let id = runner.add_trial(
        Trial::builder()
            .config(Config::new().with("mock_error", true))
            .resources(one_cpu())
            .checkpoint_freq(1)
            .max_failures(0)
            .build(),
    );

    run_to_completion(&mut runner);
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Error);
    assert_eq!(trial.num_failures(), 1);
    assert!(trial.error_message().is_some());
    assert_eq!(scheduler_errors.ids(), vec![id]);
    assert_eq!(search_errors.ids(), vec![id]);
}

#[test]
fn test_recovered_failure_is_invisible_to_the_searcher() {
    let (search, search_errors) = RecordingSearch::new();
    let (scheduler, scheduler_errors) = RecordingScheduler::new();
    let mut runner = TrialRunner::builder(mock_factory())
        .resources(one_cpu())
        .search_algorithm(search)
        .scheduler(scheduler)
        .build();
    let id = runner.add_trial(
        Trial::builder()
            .config(Config::new().with("mock_error", true))
            .resources(one_cpu())
            .stop_when(tuner::result::TRAINING_ITERATION, 2.0)
            .checkpoint_freq(1)
            .max_failures(1)
            .build(),
    );

    run_to_completion(&mut runner);
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Terminated);
    assert_eq!(trial.num_failures(), 1);
    // The scheduler hears about the retried failure; the searcher only hears
    // about terminal ones, and there was none.
    assert_eq!(scheduler_errors.count(), 1);
    assert_eq!(search_errors.count(), 0);
}

#[test]
fn test_retry_budget_is_exhausted_on_the_extra_failure() {
    let mut runner = TrialRunner::new(mock_factory(), one_cpu());
    let id = runner.add_trial(
        Trial::builder()
            .config(
                Config::new()
                    .with("mock_error", true)
                    .with("persistent_error", true),
            )
            .resources(one_cpu())
            .checkpoint_freq(1)
            .max_failures(2)
            .build(),
    );

    run_to_completion(&mut runner);
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Error);
    assert_eq!(
        trial.num_failures(),
        3,
        "two retries consumed, the third failure is terminal"
    );
}

#[test]
fn test_unlimited_retry_budget_never_goes_terminal() {
    let mut runner = TrialRunner::new(mock_factory(), one_cpu());
    let id = runner.add_trial(
        Trial::builder()
            .config(
                Config::new()
                    .with("mock_error", true)
                    .with("persistent_error", true),
            )
            .resources(one_cpu())
            .checkpoint_freq(1)
            .max_failures(-1)
            .build(),
    );

    for _ in 0..30 {
        runner.step().unwrap();
    }
    let trial = runner.trial(id).unwrap();
    assert!(trial.num_failures() >= 2);
    assert_ne!(trial.status(), TrialStatus::Error);

    runner.stop_trial(id).unwrap();
    assert_eq!(runner.trial(id).unwrap().status(), TrialStatus::Terminated);
    assert!(runner.is_finished());
}
