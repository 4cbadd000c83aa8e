//! End-to-end walks through the progression controller.
//!
//! Every test drives a controller on a manual clock and in-memory storage,
//! so elapsed time is fully deterministic.

use chrono::{TimeZone, Utc};
use loopkeeper_core::{
    sync, ActivityExecutionResult, Clock, ConflictChoice, ConflictOutcome, CoreError, EngineError,
    ExecutionStatus, Loop, LoopActivityInstance, ManualClock, MemoryPersistence,
    ProgressionController, Resolution, RunOutcome, StartOutcome, TimerMode, TimerReading,
};
use pretty_assertions::assert_eq;

type Controller = ProgressionController<MemoryPersistence, ManualClock>;

fn setup() -> (Controller, ManualClock, MemoryPersistence) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 6, 30, 0).unwrap());
    let persistence = MemoryPersistence::new();
    let controller = ProgressionController::new(persistence.clone(), clock.clone());
    (controller, clock, persistence)
}

fn three_step_loop(id: &str) -> Loop {
    Loop::new(id, format!("Loop {id}"))
        .with_activity(LoopActivityInstance::new(format!("{id}-1"), "wake-up", 0).with_duration(5))
        .with_activity(LoopActivityInstance::new(format!("{id}-2"), "hydrate", 0).with_duration(0))
        .with_activity(LoopActivityInstance::new(format!("{id}-3"), "stretch", 0).with_duration(10))
}

fn engine_error(result: Result<impl std::fmt::Debug, CoreError>) -> EngineError {
    match result {
        Err(CoreError::Engine(e)) => e,
        other => panic!("expected engine error, got {other:?}"),
    }
}

#[test]
fn countdown_overtime_then_untimed_activity() {
    let (mut ctl, clock, _) = setup();
    ctl.start(&three_step_loop("a")).unwrap();
    let timer = ctl.current_timer().unwrap().clone();
    assert_eq!(timer.activity_id, "a-1");
    assert!(timer.is_running);

    clock.advance_secs(301);
    let synced = sync(&timer, clock.now());
    assert_eq!(synced.elapsed_seconds, 301);
    let reading = TimerReading::from_timer(&synced, Some(5));
    assert_eq!(reading.overtime_seconds, 1);
    assert_eq!(reading.mode, TimerMode::Overtime);

    ctl.advance(ActivityExecutionResult::completed("a-1", 301)).unwrap();
    assert_eq!(ctl.progress().unwrap().current_index, 1);

    clock.advance_secs(3_600);
    let reading = ctl.current_reading().unwrap();
    assert_eq!(reading.activity_id, "a-2");
    assert_eq!(reading.mode, TimerMode::NoTimer);
    assert_eq!(reading.overtime_seconds, 0);
    assert_eq!(reading.remaining_seconds, None);
}

#[test]
fn conflict_continue_current_keeps_first_loop() {
    let (mut ctl, _, _) = setup();
    let loop_a = three_step_loop("loopA");
    let loop_b = three_step_loop("loopB");
    ctl.start(&loop_a).unwrap();

    let outcome = ctl.request_start(&loop_b).unwrap();
    match &outcome {
        StartOutcome::Conflict(Resolution::Conflict {
            current_loop,
            requested_loop_id,
        }) => {
            assert_eq!(current_loop.loop_id, "loopA");
            assert_eq!(requested_loop_id, "loopB");
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let outcome = ctl
        .resolve_conflict(ConflictChoice::ContinueCurrent, &loop_b)
        .unwrap();
    assert!(matches!(outcome, ConflictOutcome::Continued(_)));
    assert_eq!(ctl.active().unwrap().loop_id(), "loopA");
}

#[test]
fn conflict_start_new_replaces_execution() {
    let (mut ctl, _, persistence) = setup();
    let loop_a = three_step_loop("loopA");
    let loop_b = three_step_loop("loopB");
    ctl.start(&loop_a).unwrap();
    ctl.advance(ActivityExecutionResult::completed("loopA-1", 12)).unwrap();

    let outcome = ctl.resolve_conflict(ConflictChoice::StartNew, &loop_b).unwrap();
    assert!(matches!(outcome, ConflictOutcome::Replaced { .. }));

    let active = ctl.active().unwrap();
    assert_eq!(active.loop_id(), "loopB");
    assert!(active.execution_state.completed_activities.is_empty());
    assert_eq!(active.execution_state.time_spent_seconds, 0);
    assert_eq!(ctl.current_timer().unwrap().activity_id, "loopB-1");
    assert_eq!(ctl.store().timer_count(), 1);

    let runs = persistence.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].loop_id, "loopA");
    assert_eq!(runs[0].outcome, RunOutcome::Discarded);
}

#[test]
fn conflict_cancel_changes_nothing() {
    let (mut ctl, _, _) = setup();
    let loop_a = three_step_loop("loopA");
    ctl.start(&loop_a).unwrap();
    let before = ctl.active().cloned();

    let outcome = ctl
        .resolve_conflict(ConflictChoice::Cancel, &three_step_loop("loopB"))
        .unwrap();
    assert_eq!(outcome, ConflictOutcome::Cancelled);
    assert_eq!(ctl.active().cloned(), before);
}

#[test]
fn request_start_of_active_loop_reopens_it() {
    let (mut ctl, _, _) = setup();
    let loop_a = three_step_loop("loopA");
    ctl.start(&loop_a).unwrap();
    ctl.advance(ActivityExecutionResult::skipped("loopA-1", 0)).unwrap();

    let outcome = ctl.request_start(&loop_a).unwrap();
    assert!(matches!(outcome, StartOutcome::Reopened(_)));
    assert_eq!(ctl.progress().unwrap().current_index, 1);
}

#[test]
fn partial_sub_actions_do_not_block_advance() {
    let (mut ctl, _, _) = setup();
    let definition = Loop::new("subs", "Subs").with_activity(
        LoopActivityInstance::new("s1", "stretch", 0).with_sub_actions(["neck", "back", "legs"]),
    );
    ctl.start(&definition).unwrap();

    let result = ActivityExecutionResult::completed("s1", 90)
        .with_sub_actions(["s1-sub-0", "s1-sub-1"]);
    ctl.advance(result).unwrap();

    let stored = &ctl.activity_results()[0];
    assert_eq!(stored.completed_sub_actions.len(), 2);
    assert!(ctl
        .active()
        .unwrap()
        .execution_state
        .completed_activities
        .contains("s1"));
    assert_eq!(ctl.status(), ExecutionStatus::Completed);
}

#[test]
fn paused_interval_does_not_accrue_time() {
    let (mut ctl, clock, _) = setup();
    ctl.start(&three_step_loop("p")).unwrap();
    clock.advance_secs(20);

    ctl.pause(true).unwrap();
    assert_eq!(ctl.status(), ExecutionStatus::Paused);
    let paused = ctl.current_timer().unwrap().clone();
    assert_eq!(paused.elapsed_seconds, 20);
    assert!(!paused.is_running);

    clock.advance_secs(10);
    assert_eq!(sync(&paused, clock.now()).elapsed_seconds, 20);
    ctl.tick().unwrap();

    ctl.pause(false).unwrap();
    assert_eq!(ctl.current_timer().unwrap().elapsed_seconds, 20);
    clock.advance_secs(5);
    assert_eq!(ctl.current_reading().unwrap().elapsed_seconds, 25);
}

#[test]
fn empty_loop_completes_with_zero_progress() {
    let (mut ctl, _, persistence) = setup();
    ctl.start(&Loop::new("empty", "Nothing")).unwrap();
    assert_eq!(ctl.status(), ExecutionStatus::Completed);
    assert_eq!(ctl.progress().unwrap().progress, 0.0);

    ctl.complete("empty").unwrap();
    assert_eq!(persistence.runs()[0].outcome, RunOutcome::Finished);
}

#[test]
fn rejected_operations_leave_state_untouched() {
    let (mut ctl, _, _) = setup();
    assert_eq!(
        engine_error(ctl.advance(ActivityExecutionResult::completed("x", 1))),
        EngineError::NoActiveExecution
    );

    ctl.start(&three_step_loop("r")).unwrap();
    let before = ctl.active().cloned();
    assert_eq!(
        engine_error(ctl.advance(ActivityExecutionResult::completed("r-3", 1))),
        EngineError::StateMismatch {
            expected: "r-1".into(),
            actual: "r-3".into(),
        }
    );
    assert!(matches!(
        engine_error(ctl.complete("other")),
        EngineError::LoopMismatch { .. }
    ));
    assert_eq!(ctl.active().cloned(), before);
}

#[test]
fn full_run_is_recorded_as_finished() {
    let (mut ctl, clock, persistence) = setup();
    ctl.start(&three_step_loop("f")).unwrap();
    for _ in 0..3 {
        clock.advance_secs(30);
        ctl.complete_current_activity().unwrap();
    }
    assert_eq!(ctl.status(), ExecutionStatus::Completed);
    assert_eq!(ctl.active().unwrap().execution_state.time_spent_seconds, 90);

    ctl.complete("f").unwrap();
    assert_eq!(ctl.status(), ExecutionStatus::NotStarted);
    let run = &persistence.runs()[0];
    assert_eq!(run.outcome, RunOutcome::Finished);
    assert_eq!(run.time_spent_seconds, 90);
    assert_eq!(run.completed_count, 3);
}
