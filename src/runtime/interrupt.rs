//! Interrupt routing between the driver and the worker
//!
//! A [`HandlerSlot`] holds the one interrupt handler that an interrupt source
//! (Ctrl-C, a test, an embedding host) raises into. While a worker exists the
//! scheduler keeps an [`InterruptRouter`] installed in that slot. The router
//! decides at the instant an interrupt fires who receives it:
//!
//! - worker running: the worker observes it synchronously at its next
//!   interrupt check, or when it tries to suspend
//! - driver holding control: it is parked in the pending flag and delivered
//!   to the worker's suspension point by the next `step`

use std::sync::Arc;
use std::thread;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::error::Interrupted;

/// An interrupt handler stored in a [`HandlerSlot`].
pub type InterruptHandler = Arc<dyn Fn() + Send + Sync>;

static PROCESS_SLOT: Lazy<Arc<HandlerSlot>> = Lazy::new(|| Arc::new(HandlerSlot::new()));

/// The single place an interrupt is delivered to.
#[derive(Default)]
pub struct HandlerSlot {
    handler: RwLock<Option<InterruptHandler>>,
}

impl HandlerSlot {
    /// Create an empty, independent slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide slot OS interrupts are raised into.
    pub fn process() -> Arc<HandlerSlot> {
        Arc::clone(&PROCESS_SLOT)
    }

    /// Swap in a new handler, returning the one it replaces.
    pub fn replace(&self, handler: Option<InterruptHandler>) -> Option<InterruptHandler> {
        std::mem::replace(&mut *self.handler.write(), handler)
    }

    /// Whether a handler is installed.
    pub fn is_installed(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Deliver an interrupt to the installed handler.
    ///
    /// Returns `false` if the slot is empty and the interrupt was dropped.
    pub fn raise(&self) -> bool {
        // Clone out so the handler runs without the slot lock held.
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Which side of the handoff currently holds control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// The host loop calling `load`/`step`.
    Driver,
    /// The thread running loaded code.
    Worker,
}

#[derive(Debug)]
struct RouteState {
    active: Context,
    /// Interrupt that arrived while the driver held control.
    pending: bool,
    /// Interrupt that arrived while the worker was running, not yet observed.
    raised: bool,
    /// The worker is being cancelled; every check fails from now on.
    cancelled: bool,
}

/// Routing state shared between the driver and the worker thread.
#[derive(Debug)]
pub(crate) struct Route {
    state: Mutex<RouteState>,
}

impl Route {
    fn new() -> Self {
        Self {
            state: Mutex::new(RouteState {
                active: Context::Driver,
                pending: false,
                raised: false,
                cancelled: false,
            }),
        }
    }

    fn deliver(&self) {
        let mut state = self.state.lock();
        match state.active {
            Context::Worker => {
                debug!("interrupt while running code");
                state.raised = true;
            }
            Context::Driver => {
                debug!("interrupt while driver holds control; deferring to next step");
                state.pending = true;
            }
        }
    }

    /// Hand control to the worker, consuming any pending interrupt.
    fn enter_worker(&self) -> bool {
        let mut state = self.state.lock();
        state.active = Context::Worker;
        std::mem::take(&mut state.pending)
    }

    /// Hand control to a worker about to start.
    ///
    /// Only an interrupt that landed between `install` and this call can be
    /// pending here. There is no suspension to deliver it to, so it is marked
    /// raised and the worker trips over it at its first check.
    fn start_worker(&self) {
        let mut state = self.state.lock();
        state.active = Context::Worker;
        if std::mem::take(&mut state.pending) {
            state.raised = true;
        }
    }

    /// Worker side: give control back to the driver in order to suspend.
    ///
    /// Fails instead if an interrupt reached the worker while it was running,
    /// in which case the worker keeps control and must raise it.
    pub(crate) fn leave_worker(&self) -> Result<(), Interrupted> {
        let mut state = self.state.lock();
        if state.cancelled {
            return Err(Interrupted);
        }
        if std::mem::take(&mut state.raised) {
            return Err(Interrupted);
        }
        state.active = Context::Driver;
        Ok(())
    }

    /// Worker side: give control back for good; unobserved interrupts are dropped.
    pub(crate) fn finish_worker(&self) {
        let mut state = self.state.lock();
        state.raised = false;
        state.active = Context::Driver;
    }

    /// Worker side: observe an interrupt delivered while running.
    pub(crate) fn check(&self) -> Result<(), Interrupted> {
        let mut state = self.state.lock();
        if state.cancelled || std::mem::take(&mut state.raised) {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        state.active = Context::Driver;
    }
}

/// Installs context-aware interrupt routing into a [`HandlerSlot`].
pub struct InterruptRouter {
    slot: Arc<HandlerSlot>,
    route: Arc<Route>,
    installed: bool,
    prior: Option<InterruptHandler>,
}

impl InterruptRouter {
    /// Create a router for the given slot. Nothing is installed yet.
    pub fn new(slot: Arc<HandlerSlot>) -> Self {
        Self {
            slot,
            route: Arc::new(Route::new()),
            installed: false,
            prior: None,
        }
    }

    /// The slot this router installs into.
    pub fn slot(&self) -> &Arc<HandlerSlot> {
        &self.slot
    }

    pub(crate) fn route(&self) -> Arc<Route> {
        Arc::clone(&self.route)
    }

    /// Put the routing handler into the slot.
    ///
    /// The handler found in the slot is saved on the first install of a cycle
    /// and handed back by [`restore`](Self::restore).
    pub fn install(&mut self) {
        let route = Arc::clone(&self.route);
        let handler: InterruptHandler = Arc::new(move || route.deliver());
        let previous = self.slot.replace(Some(handler));
        if !self.installed {
            self.prior = previous;
            self.installed = true;
            debug!("interrupt router installed");
        }
    }

    /// Whether the routing handler is currently installed.
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Route interrupts to the worker. Returns whether an interrupt was pending.
    pub fn route_to_worker(&self) -> bool {
        self.route.enter_worker()
    }

    /// Route interrupts to a worker that is about to start.
    ///
    /// An interrupt caught since [`install`](Self::install) is raised inside
    /// that worker rather than left pending.
    pub fn route_to_new_worker(&self) {
        self.route.start_worker();
    }

    /// Route interrupts to the pending flag.
    pub fn route_to_driver(&self) {
        self.route.state.lock().active = Context::Driver;
    }

    /// Who would receive an interrupt raised right now.
    pub fn active(&self) -> Context {
        self.route.state.lock().active
    }

    /// Whether an interrupt is waiting for the next `step`.
    pub fn pending(&self) -> bool {
        self.route.state.lock().pending
    }

    /// Make every worker-side interrupt check fail from now on.
    pub(crate) fn cancel_worker(&self) {
        self.route.cancel();
    }

    /// Give the saved handler back to the slot and start a fresh cycle.
    ///
    /// Does nothing when the router is not installed.
    pub fn restore(&mut self) {
        if !self.installed {
            return;
        }
        self.slot.replace(self.prior.take());
        self.installed = false;
        // The next worker gets routing state of its own.
        self.route = Arc::new(Route::new());
        debug!("interrupt router removed, prior handler restored");
    }
}

impl Drop for InterruptRouter {
    fn drop(&mut self) {
        self.restore();
    }
}

impl std::fmt::Debug for InterruptRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptRouter")
            .field("installed", &self.installed)
            .field("route", &self.route)
            .finish()
    }
}

/// Raise `slot` every time the process receives Ctrl-C (SIGINT).
///
/// The listener lives on a background thread for the rest of the process.
/// Installing it replaces the default SIGINT disposition, so whatever sits in
/// the slot when no worker runs decides what Ctrl-C means at the prompt.
pub fn listen_for_ctrl_c(slot: Arc<HandlerSlot>) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("segue-ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        tracing::warn!(error = %err, "failed to listen for ctrl-c");
                        return;
                    }
                    if !slot.raise() {
                        debug!("ctrl-c with no handler installed");
                    }
                }
            })
        })?;

    Ok(())
}
