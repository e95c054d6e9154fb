//! Worker context: the thread that runs loaded code
//!
//! The worker and the driver trade control over two zero-capacity channels.
//! Every send is a rendezvous, so at any instant exactly one of the two sides
//! is unblocked and no transferred value can be buffered, lost, or duplicated.

use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::RunnerConfig;
use super::error::{Escape, ExitRequest, Interrupted, SchedulerError};
use super::interrupt::Route;
use crate::interpreter::{Completeness, Interpreter};

/// Worker identifier, one per loaded source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    /// Create a new random WorkerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the worker hands back to the driver along with control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    /// Blocked until the driver supplies input.
    WaitForInput,
    /// Output was produced; the driver should redraw.
    Refresh,
    /// The source ran to completion.
    Done,
    /// The source is an incomplete statement (or was interrupted).
    Unfinished,
    /// The source asked for process termination.
    Terminate(ExitRequest),
}

/// What the driver hands to a suspended worker along with control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resume {
    /// Value supplied by the driver.
    Value(Option<String>),
    /// An interrupt arrived while the driver held control.
    Interrupted,
}

/// Worker-side handle given to the interpreter for the duration of a run.
///
/// Not `Send`: the suspension primitives may only be called on the worker
/// thread they were created for.
pub struct WorkerContext {
    id: WorkerId,
    requests: flume::Sender<Request>,
    resumes: flume::Receiver<Resume>,
    route: Arc<Route>,
    _thread_bound: PhantomData<*const ()>,
}

impl WorkerContext {
    /// The identifier of the worker this context belongs to.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Suspend until the driver supplies input, and return it.
    pub fn wait_for_input(&self) -> Result<Option<String>, Interrupted> {
        self.suspend(Request::WaitForInput)
    }

    /// Suspend so the driver can refresh the display.
    ///
    /// Returns whatever the driver passed to the resuming `step`.
    pub fn request_refresh(&self) -> Result<Option<String>, Interrupted> {
        self.suspend(Request::Refresh)
    }

    /// Observe an interrupt that reached the worker while it was running.
    ///
    /// Interpreters call this between statements and on every loop iteration.
    pub fn check_interrupt(&self) -> Result<(), Interrupted> {
        self.route.check()
    }

    /// Whether the driver has cancelled this worker.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.route.is_cancelled()
    }

    fn suspend(&self, request: Request) -> Result<Option<String>, Interrupted> {
        self.route.leave_worker()?;
        trace!(worker = %self.id, ?request, "worker suspending");

        if self.requests.send(request).is_err() {
            // Driver is gone; nothing will ever resume us.
            return Err(Interrupted);
        }

        match self.resumes.recv() {
            Ok(Resume::Value(value)) => Ok(value),
            Ok(Resume::Interrupted) => {
                debug!(worker = %self.id, "interrupt delivered at suspension point");
                Err(Interrupted)
            }
            Err(_) => Err(Interrupted),
        }
    }

    fn finish(self, request: Request) {
        self.route.finish_worker();
        trace!(worker = %self.id, ?request, "worker finished");
        if self.requests.send(request).is_err() && !self.route.is_cancelled() {
            warn!(worker = %self.id, "driver disappeared before worker completed");
        }
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext").field("id", &self.id).finish()
    }
}

/// Driver-side handle on a live worker thread.
pub(crate) struct Worker {
    id: WorkerId,
    requests: flume::Receiver<Request>,
    resumes: flume::Sender<Resume>,
    thread: JoinHandle<()>,
}

impl Worker {
    /// Start a worker running `source`. Starting it is the first transfer of
    /// control; the caller must follow up with [`wait`](Self::wait).
    pub(crate) fn spawn<I: Interpreter>(
        config: &RunnerConfig,
        interpreter: Arc<Mutex<I>>,
        source: String,
        route: Arc<Route>,
    ) -> io::Result<Self> {
        let id = WorkerId::new();
        let (request_tx, request_rx) = flume::bounded(0);
        let (resume_tx, resume_rx) = flume::bounded(0);

        let mut builder = thread::Builder::new().name(config.worker_thread_name(&id));
        if let Some(size) = config.worker_stack_size {
            builder = builder.stack_size(size);
        }

        let thread = builder.spawn(move || {
            let context = WorkerContext {
                id,
                requests: request_tx,
                resumes: resume_rx,
                route,
                _thread_bound: PhantomData,
            };
            run_worker(&interpreter, &source, context);
        })?;

        debug!(worker = %id, "worker started");
        Ok(Self {
            id,
            requests: request_rx,
            resumes: resume_tx,
            thread,
        })
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// Block until the worker hands control back.
    pub(crate) fn wait(&self) -> Result<Request, SchedulerError> {
        self.requests.recv().map_err(|_| {
            SchedulerError::Protocol(format!(
                "worker {} exited without reporting completion",
                self.id
            ))
        })
    }

    /// Hand control to the suspended worker and block until it hands it back.
    pub(crate) fn resume(&self, resume: Resume) -> Result<Request, SchedulerError> {
        self.resumes.send(resume).map_err(|_| {
            SchedulerError::Protocol(format!("worker {} is not waiting to resume", self.id))
        })?;
        self.wait()
    }

    /// Wait for a worker that has reported completion (or died) to exit.
    pub(crate) fn join(self) {
        let Worker {
            id,
            requests,
            resumes,
            thread,
        } = self;
        drop(resumes);
        drop(requests);
        if thread.join().is_err() {
            warn!(worker = %id, "worker thread panicked");
        }
    }

    /// Stop a worker that may still be suspended, and wait for it to unwind.
    ///
    /// Its route must already be cancelled. Closing the channels wakes it
    /// with an interrupt it cannot suspend past, and every later interrupt
    /// check fails, so an interpreter that honours interrupts returns
    /// promptly.
    pub(crate) fn cancel(self) {
        debug!(worker = %self.id, "cancelling worker");
        self.join();
    }
}

/// The worker entry point: run the interpreter once and report how it ended.
fn run_worker<I: Interpreter>(interpreter: &Mutex<I>, source: &str, context: WorkerContext) {
    let request = {
        let mut interpreter = interpreter.lock();
        match interpreter.execute(source, &context) {
            Ok(Completeness::Complete) => Request::Done,
            Ok(Completeness::Incomplete) => Request::Unfinished,
            Err(Escape::Interrupted) => {
                debug!(worker = %context.id, "uncaught interrupt unwound the statement");
                Request::Unfinished
            }
            Err(Escape::Exit(exit)) => Request::Terminate(exit),
        }
    };
    context.finish(request);
}
