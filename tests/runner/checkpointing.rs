use tuner::result::TRAINING_ITERATION;
use tuner::{Config, Resources, Trial, TrialRunner, TrialStatus};

use crate::support::{mock_factory, run_to_completion, Recorder, TIMESTEPS_PER_ITER};

fn one_cpu() -> Resources {
    Resources::new().cpu(1.0)
}

#[test]
fn test_periodic_save_completes_before_termination() {
    let mut runner = TrialRunner::new(mock_factory(), one_cpu());
    let id = runner.add_trial(
        Trial::builder()
            .resources(one_cpu())
            .stop_when(TRAINING_ITERATION, 1.0)
            .checkpoint_freq(1)
            .build(),
    );

    // Start the trial.
    runner.step().unwrap();
    assert_eq!(runner.trial(id).unwrap().status(), TrialStatus::Running);

    // Process the final result, dispatch the save.
    runner.step().unwrap();
    assert_eq!(runner.trial(id).unwrap().status(), TrialStatus::Running);
    assert!(!runner.trial(id).unwrap().has_checkpoint());

    // Process the save, stop the trial.
    runner.step().unwrap();
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Terminated);
    assert!(trial.has_checkpoint());
    assert_eq!(trial.checkpoint().unwrap().iteration(), 1);
}

#[test]
fn test_checkpoint_at_end() {
    let mut runner = TrialRunner::new(mock_factory(), one_cpu());
    let id = runner.add_trial(
        Trial::builder()
            .resources(one_cpu())
            .stop_when(TRAINING_ITERATION, 2.0)
            .checkpoint_at_end(true)
            .build(),
    );

    run_to_completion(&mut runner);
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Terminated);
    assert!(trial.last_result().unwrap().done);
    assert!(trial.has_checkpoint());
    assert_eq!(trial.checkpoint().unwrap().iteration(), 2);
}

#[test]
fn test_restored_trial_resumes_counters() {
    let recorder = Recorder::default();
    let mut runner = TrialRunner::builder(mock_factory())
        .resources(one_cpu())
        .callback(recorder.clone())
        .build();
    let first = runner.add_trial(
        Trial::builder()
            .resources(one_cpu())
            .stop_when(TRAINING_ITERATION, 2.0)
            .checkpoint_freq(1)
            .build(),
    );

    run_to_completion(&mut runner);
    let checkpoint = runner
        .trial(first)
        .unwrap()
        .checkpoint()
        .expect("first trial should have checkpointed")
        .clone();
    assert_eq!(checkpoint.iteration(), 2);

    // A new trial seeded from the checkpoint continues where it left off,
    // with fresh since-restore counters.
    let second = runner.add_trial(
        Trial::builder()
            .resources(one_cpu())
            .restore_from(checkpoint)
            .build(),
    );

    while recorder.results_for(second).is_empty() {
        runner.step().unwrap();
    }
    let results = recorder.results_for(second);
    let result = results.last().unwrap();
    assert_eq!(result.training_iteration(), 3);
    assert_eq!(result.iterations_since_restore(), 1);
    assert_eq!(result.timesteps_since_restore(), TIMESTEPS_PER_ITER);
    assert!(result.get(tuner::result::TIME_SINCE_RESTORE).unwrap() >= 0.0);

    while recorder.results_for(second).len() < 2 {
        runner.step().unwrap();
    }
    let results = recorder.results_for(second);
    let result = results.last().unwrap();
    assert_eq!(result.training_iteration(), 4);
    assert_eq!(result.iterations_since_restore(), 2);
    assert_eq!(result.timesteps_since_restore(), 2 * TIMESTEPS_PER_ITER);

    runner.stop_trial(second).unwrap();
    assert_eq!(
        runner.trial(second).unwrap().status(),
        TrialStatus::Terminated
    );
    assert!(runner.is_finished());
}

#[test]
fn test_failure_recovery_restores_from_checkpoint() {
    let recorder = Recorder::default();
    let mut runner = TrialRunner::builder(mock_factory())
        .resources(one_cpu())
        .callback(recorder.clone())
        .build();
    let id = runner.add_trial(
        Trial::builder()
            .config(Config::new().with("mock_error", true))
            .resources(one_cpu())
            .stop_when(TRAINING_ITERATION, 2.0)
            .checkpoint_freq(1)
            .max_failures(1)
            .build(),
    );

    run_to_completion(&mut runner);
    let trial = runner.trial(id).unwrap();
    assert_eq!(trial.status(), TrialStatus::Terminated);
    assert_eq!(trial.num_failures(), 1);
    assert_eq!(trial.last_result().unwrap().training_iteration(), 2);
    assert!(trial.last_result().unwrap().done);
    assert_eq!(
        recorder.checkpoint_count(),
        2,
        "one periodic save before the failure, one final save after recovery"
    );

    // Requeue and restart are visible as status transitions.
    let transitions = recorder.transitions_for(id);
    assert!(transitions.contains(&(TrialStatus::Running, TrialStatus::Pending)));
    assert_eq!(
        transitions.last(),
        Some(&(TrialStatus::Running, TrialStatus::Terminated))
    );
}
