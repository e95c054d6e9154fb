//! Segue – run interpreted code one segment at a time
//!
//! This crate lets a host loop (the driver) run code without giving up
//! control to it:
//! - Loaded code runs on a worker thread that hands control back whenever it
//!   produces output or needs input
//! - Interrupts are routed to whichever side holds control, and the handler
//!   found before code was loaded is restored when it finishes
//! - Exit requests from running code are escalated to the driver after the
//!   worker has been torn down
//! - Pure line-editing operations and a key binding table for the prompt
//! - A small scripting language and a REPL session to drive it

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Pure cursor and text editing operations
pub mod editor;
/// Interpreter seam and the built-in script language
pub mod interpreter;
/// Scheduler, interrupt routing, and output relay
pub mod runtime;
/// REPL driver built on the scheduler
pub mod session;

// Re-export key types for convenience
pub use interpreter::{Completeness, Interpreter, ScriptInterpreter};
pub use runtime::{RunnerConfig, Scheduler, SchedulerError, StepOutcome, Suspension};
pub use session::{Session, SessionEnd, SessionError};

/// Current version of segue
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
