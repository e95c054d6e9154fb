//! Integration tests for interrupt routing
//!
//! Interrupts are raised into an independent handler slot so tests never
//! touch the process-wide one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use segue::interpreter::{Completeness, Interpreter, ScriptInterpreter};
use segue::runtime::{
    Escape, HandlerSlot, InterruptHandler, Scheduler, SharedSink, StepOutcome, Suspension,
    WorkerContext,
};

fn counting_handler() -> (InterruptHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let handler: InterruptHandler = Arc::new(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (handler, calls)
}

fn script_scheduler(slot: &Arc<HandlerSlot>) -> (Scheduler<ScriptInterpreter>, Arc<Mutex<Vec<u8>>>) {
    let output = Arc::new(Mutex::new(Vec::new()));
    let interpreter = ScriptInterpreter::new(SharedSink::from_shared(Arc::clone(&output)));
    (
        Scheduler::with_slot(interpreter, || {}, Arc::clone(slot)),
        output,
    )
}

/// Spins until interrupted, or completes immediately for any other source.
struct Spinner {
    slot: Arc<HandlerSlot>,
    raise_self: bool,
}

impl Interpreter for Spinner {
    fn execute(&mut self, source: &str, worker: &WorkerContext) -> Result<Completeness, Escape> {
        if source != "spin" {
            return Ok(Completeness::Complete);
        }
        if self.raise_self {
            // Raised from inside running code: must be observed synchronously.
            assert!(self.slot.raise());
        }
        loop {
            worker.check_interrupt()?;
            thread::yield_now();
        }
    }
}

#[test]
fn test_interrupt_at_prompt_is_delivered_to_suspension_point() {
    let slot = Arc::new(HandlerSlot::new());
    let (mut scheduler, output) = script_scheduler(&slot);

    scheduler.load("input x\nprint \"got\", x").unwrap();
    assert_eq!(
        scheduler.step(None).unwrap(),
        StepOutcome::Suspended(Suspension::Input)
    );

    assert!(!scheduler.interrupt_pending());
    assert!(slot.raise());
    assert!(scheduler.interrupt_pending());

    // The input is discarded; the worker sees the interrupt instead.
    assert_eq!(
        scheduler.step(Some("value".to_string())).unwrap(),
        StepOutcome::Suspended(Suspension::Refresh)
    );
    assert!(!scheduler.interrupt_pending());
    assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Done);

    assert_eq!(&*output.lock(), b"interrupted\n");
    assert!(scheduler.interpreter().unwrap().variable("x").is_none());
}

#[test]
fn test_interrupt_while_running_is_synchronous() {
    let slot = Arc::new(HandlerSlot::new());
    let (prior, calls) = counting_handler();
    slot.replace(Some(Arc::clone(&prior)));

    let spinner = Spinner {
        slot: Arc::clone(&slot),
        raise_self: true,
    };
    let mut scheduler = Scheduler::with_slot(spinner, || {}, Arc::clone(&slot));

    scheduler.load("spin").unwrap();
    assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Unfinished);

    // The router caught it, and the prior handler is restored exactly once.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!scheduler.interrupt_pending());
    assert!(slot.raise());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Reusable afterwards.
    scheduler.load("other").unwrap();
    assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Done);
    let current = slot.replace(None).unwrap();
    assert!(Arc::ptr_eq(&current, &prior));
}

#[test]
fn test_interrupt_from_another_thread_stops_loop() {
    let slot = Arc::new(HandlerSlot::new());
    let (prior, _) = counting_handler();
    slot.replace(Some(prior));

    let spinner = Spinner {
        slot: Arc::clone(&slot),
        raise_self: false,
    };
    let mut scheduler = Scheduler::with_slot(spinner, || {}, Arc::clone(&slot));

    let stop = Arc::new(AtomicBool::new(false));
    let raiser = {
        let slot = Arc::clone(&slot);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                slot.raise();
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    scheduler.load("spin").unwrap();
    assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Unfinished);
    stop.store(true, Ordering::SeqCst);
    raiser.join().unwrap();

    scheduler.load("next").unwrap();
    assert_eq!(scheduler.step(None).unwrap(), StepOutcome::Done);
}

#[test]
fn test_script_loop_is_interruptible() {
    let slot = Arc::new(HandlerSlot::new());
    let (mut scheduler, output) = script_scheduler(&slot);

    let raiser = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || {
            // Retry until the router is installed and takes the interrupt.
            while !slot.raise() {
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    scheduler.load("let n = 0\nloop { n = n + 1 }").unwrap();
    let mut outcome = scheduler.step(None).unwrap();
    while !outcome.is_complete() {
        outcome = scheduler.step(None).unwrap();
    }
    raiser.join().unwrap();

    assert_eq!(outcome, StepOutcome::Done);
    assert_eq!(&*output.lock(), b"interrupted\n");
    assert!(!slot.is_installed());
}

#[test]
fn test_cancel_restores_prior_handler() {
    let slot = Arc::new(HandlerSlot::new());
    let (prior, calls) = counting_handler();
    slot.replace(Some(prior));
    let (mut scheduler, _) = script_scheduler(&slot);

    scheduler.load("input x").unwrap();
    scheduler.step(None).unwrap();
    assert!(slot.raise());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    scheduler.cancel();
    assert!(!scheduler.running());
    assert!(!scheduler.interrupt_pending());
    assert!(slot.raise());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_leaves_sink_untouched() {
    let slot = Arc::new(HandlerSlot::new());
    let (mut scheduler, output) = script_scheduler(&slot);

    scheduler.load("print \"before\"\ninput x\nprint \"after\"").unwrap();
    assert_eq!(
        scheduler.step(None).unwrap(),
        StepOutcome::Suspended(Suspension::Refresh)
    );
    assert_eq!(
        scheduler.step(None).unwrap(),
        StepOutcome::Suspended(Suspension::Input)
    );

    scheduler.cancel();
    let after_cancel = output.lock().clone();
    assert_eq!(after_cancel, b"before\n");

    // The worker has finished; nothing shows up later either.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(&*output.lock(), b"before\n");
    assert!(scheduler.interpreter().unwrap().variable("x").is_none());
}
