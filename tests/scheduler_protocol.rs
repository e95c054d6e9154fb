//! Integration tests for the driver/worker handoff
//!
//! Drives the script interpreter through the scheduler and checks what each
//! `step` reports back to the driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use segue::interpreter::{Completeness, Interpreter, ScriptInterpreter};
use segue::runtime::{
    Escape, ExitRequest, HandlerSlot, RunnerConfig, Scheduler, SchedulerError, SharedSink,
    StepOutcome, Suspension, WorkerContext,
};

struct Harness {
    scheduler: Scheduler<ScriptInterpreter>,
    output: Arc<Mutex<Vec<u8>>>,
    refreshes: Arc<AtomicUsize>,
    slot: Arc<HandlerSlot>,
}

impl Harness {
    fn new() -> Self {
        let output = Arc::new(Mutex::new(Vec::new()));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(HandlerSlot::new());

        let counter = Arc::clone(&refreshes);
        let interpreter = ScriptInterpreter::new(SharedSink::from_shared(Arc::clone(&output)));
        let scheduler = Scheduler::with_slot(
            interpreter,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            Arc::clone(&slot),
        );

        Self {
            scheduler,
            output,
            refreshes,
            slot,
        }
    }

    fn output(&self) -> String {
        String::from_utf8(self.output.lock().clone()).unwrap()
    }
}

#[test]
fn test_expression_completes_on_first_step() {
    let mut harness = Harness::new();
    harness.scheduler.load("1+1").unwrap();
    assert!(harness.scheduler.is_loaded());
    assert!(!harness.scheduler.running());

    assert_eq!(harness.scheduler.step(None).unwrap(), StepOutcome::Done);
    assert!(!harness.scheduler.running());
    assert!(!harness.scheduler.is_loaded());
    assert_eq!(harness.refreshes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_single_output_suspends_once() {
    let mut harness = Harness::new();
    harness.scheduler.load("print 1").unwrap();

    assert_eq!(
        harness.scheduler.step(None).unwrap(),
        StepOutcome::Suspended(Suspension::Refresh)
    );
    assert!(harness.scheduler.running());
    assert_eq!(harness.scheduler.suspension(), Some(Suspension::Refresh));
    assert_eq!(harness.refreshes.load(Ordering::SeqCst), 1);
    // Output reaches the sink before the driver regains control.
    assert_eq!(harness.output(), "1\n");

    assert_eq!(harness.scheduler.step(None).unwrap(), StepOutcome::Done);
    assert!(!harness.scheduler.running());
}

#[test]
fn test_load_while_loaded_is_reentry() {
    let mut harness = Harness::new();
    harness.scheduler.load("print 1").unwrap();

    let err = harness.scheduler.load("print 2").unwrap_err();
    assert!(matches!(err, SchedulerError::Reentry));
    assert!(err.is_defect());

    // Still reentry while the worker is suspended.
    harness.scheduler.step(None).unwrap();
    assert!(matches!(
        harness.scheduler.load("print 2"),
        Err(SchedulerError::Reentry)
    ));

    assert_eq!(harness.scheduler.step(None).unwrap(), StepOutcome::Done);
    harness.scheduler.load("print 2").unwrap();
}

#[test]
fn test_step_after_completion_is_not_loaded() {
    let mut harness = Harness::new();
    harness.scheduler.load("let x = 1").unwrap();
    assert_eq!(harness.scheduler.step(None).unwrap(), StepOutcome::Done);
    assert!(matches!(
        harness.scheduler.step(None),
        Err(SchedulerError::NotLoaded)
    ));
}

#[test]
fn test_incomplete_statement_is_unfinished() {
    let mut harness = Harness::new();
    harness.scheduler.load("repeat 2 {\nprint 1").unwrap();
    assert_eq!(harness.scheduler.step(None).unwrap(), StepOutcome::Unfinished);
    assert_eq!(harness.output(), "");

    harness.scheduler.load("repeat 2 {\nprint 1\n}").unwrap();
    let mut steps = 1;
    while !harness.scheduler.step(None).unwrap().is_complete() {
        steps += 1;
    }
    assert_eq!(steps, 3);
    assert_eq!(harness.output(), "1\n1\n");
}

#[test]
fn test_input_round_trip() {
    let mut harness = Harness::new();
    harness.scheduler.load("input word\nprint word + \"!\"").unwrap();

    assert_eq!(
        harness.scheduler.step(None).unwrap(),
        StepOutcome::Suspended(Suspension::Input)
    );
    assert_eq!(
        harness.scheduler.step(Some("hey".to_string())).unwrap(),
        StepOutcome::Suspended(Suspension::Refresh)
    );
    assert_eq!(harness.scheduler.step(None).unwrap(), StepOutcome::Done);
    assert_eq!(harness.output(), "hey!\n");
}

#[test]
fn test_exit_request_escalates_after_teardown() {
    let mut harness = Harness::new();
    let (prior, calls) = counting_handler();
    harness.slot.replace(Some(prior));

    harness.scheduler.load("print \"bye\"\nexit 3").unwrap();
    harness.scheduler.step(None).unwrap();

    let err = harness.scheduler.step(None).unwrap_err();
    assert_eq!(err.exit_request(), Some(ExitRequest::new(3)));
    assert!(!err.is_defect());
    assert!(!harness.scheduler.running());

    // The prior handler is back in place.
    assert!(harness.slot.raise());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Records the name of the thread it runs on.
struct ThreadNames(Arc<Mutex<Vec<String>>>);

impl Interpreter for ThreadNames {
    fn execute(&mut self, _source: &str, _worker: &WorkerContext) -> Result<Completeness, Escape> {
        let name = thread::current().name().unwrap_or_default().to_string();
        self.0.lock().push(name);
        Ok(Completeness::Complete)
    }
}

#[test]
fn test_worker_thread_uses_configured_name() {
    let names = Arc::new(Mutex::new(Vec::new()));
    let config = RunnerConfig {
        worker_name: "custom".to_string(),
        worker_stack_size: Some(256 * 1024),
        ..RunnerConfig::default()
    };
    let mut scheduler = Scheduler::with_slot(
        ThreadNames(Arc::clone(&names)),
        || {},
        Arc::new(HandlerSlot::new()),
    )
    .with_config(config);

    assert_eq!(scheduler.config().worker_name, "custom");
    for _ in 0..2 {
        scheduler.load("anything").unwrap();
        assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Done);
    }

    let names = names.lock();
    assert_eq!(names.len(), 2);
    for name in names.iter() {
        assert!(name.starts_with("custom-"), "unexpected thread name {name:?}");
        assert_eq!(name.len(), "custom-".len() + 8);
    }
    // A fresh worker per load.
    assert_ne!(names[0], names[1]);
}

#[test]
fn test_small_worker_stack_still_runs_scripts() {
    let output = Arc::new(Mutex::new(Vec::new()));
    let interpreter = ScriptInterpreter::new(SharedSink::from_shared(Arc::clone(&output)));
    let config = RunnerConfig {
        worker_stack_size: Some(256 * 1024),
        ..RunnerConfig::default()
    };
    let mut scheduler =
        Scheduler::with_slot(interpreter, || {}, Arc::new(HandlerSlot::new())).with_config(config);

    scheduler.load("print 40 + 2").unwrap();
    scheduler.step(None).unwrap();
    assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Done);
    assert_eq!(&*output.lock(), b"42\n");
}

fn counting_handler() -> (segue::runtime::InterruptHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let handler: segue::runtime::InterruptHandler = Arc::new(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (handler, calls)
}
