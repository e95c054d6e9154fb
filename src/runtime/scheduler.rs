//! Driver/worker scheduler
//!
//! Owns the worker lifecycle and the handoff protocol. The driver calls
//! [`Scheduler::load`] once per source blob and then [`Scheduler::step`]
//! until it reports completion. Each `step` runs worker code until the
//! worker suspends or finishes, and returns to the driver exactly once.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::RunnerConfig;
use super::error::{Result, SchedulerError};
use super::interrupt::{HandlerSlot, InterruptRouter};
use super::worker::{Request, Resume, Worker};
use crate::interpreter::Interpreter;

/// Why a worker is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    /// The worker is blocked in `wait_for_input`; the next `step` should
    /// carry the input.
    Input,
    /// The worker produced output and asked for a refresh.
    Refresh,
}

/// Result of one [`Scheduler::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The worker suspended; call `step` again.
    Suspended(Suspension),
    /// The source ran to completion.
    Done,
    /// The source was an incomplete statement, or an uncaught interrupt
    /// unwound it.
    Unfinished,
}

impl StepOutcome {
    /// Whether the loaded source has finished (the worker is gone).
    pub fn is_complete(&self) -> bool {
        !matches!(self, StepOutcome::Suspended(_))
    }
}

/// Callback run by the driver each time the worker asks for a refresh.
pub type RefreshCallback = Box<dyn FnMut() + Send>;

/// Runs loaded code one segment at a time on a worker thread.
pub struct Scheduler<I: Interpreter> {
    config: RunnerConfig,
    interpreter: Arc<Mutex<I>>,
    source: Option<String>,
    worker: Option<Worker>,
    suspended: Option<Suspension>,
    router: InterruptRouter,
    on_refresh: RefreshCallback,
}

impl<I: Interpreter> Scheduler<I> {
    /// Create a scheduler routing interrupts from the process-wide slot.
    pub fn new(interpreter: I, on_refresh: impl FnMut() + Send + 'static) -> Self {
        Self::with_slot(interpreter, on_refresh, HandlerSlot::process())
    }

    /// Create a scheduler routing interrupts from `slot`.
    pub fn with_slot(
        interpreter: I,
        on_refresh: impl FnMut() + Send + 'static,
        slot: Arc<HandlerSlot>,
    ) -> Self {
        Self {
            config: RunnerConfig::default(),
            interpreter: Arc::new(Mutex::new(interpreter)),
            source: None,
            worker: None,
            suspended: None,
            router: InterruptRouter::new(slot),
            on_refresh: Box::new(on_refresh),
        }
    }

    /// Replace the configuration used for future workers.
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Prepare `source` to be run by subsequent `step` calls.
    ///
    /// Fails with [`SchedulerError::Reentry`] while other code is loaded.
    pub fn load(&mut self, source: impl Into<String>) -> Result<()> {
        if self.source.is_some() || self.worker.is_some() {
            return Err(SchedulerError::Reentry);
        }
        self.source = Some(source.into());
        self.suspended = None;
        Ok(())
    }

    /// Run the loaded code until it suspends or finishes.
    ///
    /// The first call after `load` starts the worker and ignores `input`.
    /// Later calls resume the suspended worker with `input`, unless an
    /// interrupt arrived since the last call, in which case the worker sees
    /// the interrupt instead.
    pub fn step(&mut self, input: Option<String>) -> Result<StepOutcome> {
        let (worker, request) = match self.worker.take() {
            None => self.start()?,
            Some(worker) => {
                if self.suspended.take().is_none() {
                    self.cancel_running(worker);
                    return Err(SchedulerError::Protocol(
                        "step called while the worker is not suspended".to_string(),
                    ));
                }
                self.router.install();
                let resume = if self.router.route_to_worker() {
                    debug!(worker = %worker.id(), "delivering pending interrupt");
                    Resume::Interrupted
                } else {
                    Resume::Value(input)
                };
                let request = worker.resume(resume);
                (worker, request)
            }
        };
        self.router.route_to_driver();

        let request = match request {
            Ok(request) => request,
            Err(err) => {
                warn!(worker = %worker.id(), error = %err, "tearing down worker");
                self.teardown(worker);
                return Err(err);
            }
        };

        match request {
            Request::WaitForInput => {
                self.worker = Some(worker);
                self.suspended = Some(Suspension::Input);
                Ok(StepOutcome::Suspended(Suspension::Input))
            }
            Request::Refresh => {
                self.worker = Some(worker);
                self.suspended = Some(Suspension::Refresh);
                (self.on_refresh)();
                Ok(StepOutcome::Suspended(Suspension::Refresh))
            }
            Request::Done => {
                self.teardown(worker);
                Ok(StepOutcome::Done)
            }
            Request::Unfinished => {
                self.teardown(worker);
                Ok(StepOutcome::Unfinished)
            }
            Request::Terminate(exit) => {
                info!(worker = %worker.id(), code = exit.code, "running code requested exit");
                self.teardown(worker);
                Err(SchedulerError::WorkerExit(exit))
            }
        }
    }

    /// Whether code is loaded and its worker has started.
    pub fn running(&self) -> bool {
        self.source.is_some() && self.worker.is_some()
    }

    /// Whether code is loaded, started or not.
    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    /// Why the worker is currently suspended, if it is.
    pub fn suspension(&self) -> Option<Suspension> {
        self.suspended
    }

    /// Whether an interrupt is waiting to be delivered by the next `step`.
    pub fn interrupt_pending(&self) -> bool {
        self.router.pending()
    }

    /// The slot this scheduler routes interrupts from.
    pub fn interrupt_slot(&self) -> &Arc<HandlerSlot> {
        self.router.slot()
    }

    /// Access the interpreter while no worker is using it.
    pub fn interpreter(&self) -> Option<MutexGuard<'_, I>> {
        if self.worker.is_some() {
            return None;
        }
        self.interpreter.try_lock()
    }

    /// Drop any loaded code, cancelling a suspended worker.
    ///
    /// The worker is woken with an interrupt it cannot suspend past, and
    /// this returns once its thread has unwound, so no worker code runs
    /// after the driver regains control.
    pub fn cancel(&mut self) {
        match self.worker.take() {
            Some(worker) => self.cancel_running(worker),
            None => {
                self.source = None;
                self.suspended = None;
            }
        }
    }

    fn start(&mut self) -> Result<(Worker, Result<Request>)> {
        let source = self.source.clone().ok_or(SchedulerError::NotLoaded)?;

        self.router.install();
        self.router.route_to_new_worker();

        let worker = match Worker::spawn(
            &self.config,
            Arc::clone(&self.interpreter),
            source,
            self.router.route(),
        ) {
            Ok(worker) => worker,
            Err(err) => {
                self.router.route_to_driver();
                self.router.restore();
                self.source = None;
                return Err(SchedulerError::Spawn(err));
            }
        };

        let request = worker.wait();
        Ok((worker, request))
    }

    fn teardown(&mut self, worker: Worker) {
        let id = worker.id();
        worker.join();
        self.router.restore();
        self.source = None;
        self.suspended = None;
        debug!(worker = %id, "worker torn down");
    }

    fn cancel_running(&mut self, worker: Worker) {
        self.router.cancel_worker();
        worker.cancel();
        self.router.restore();
        self.source = None;
        self.suspended = None;
    }
}

impl<I: Interpreter> Drop for Scheduler<I> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<I: Interpreter> fmt::Debug for Scheduler<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("loaded", &self.source.is_some())
            .field("worker", &self.worker.as_ref().map(Worker::id))
            .field("suspended", &self.suspended)
            .field("router", &self.router)
            .finish()
    }
}
