//! Execution scheduler and its collaborators
//!
//! This module provides the [`Scheduler`] that lets a host loop (the driver)
//! run loaded code (the worker) one segment at a time, the interrupt routing
//! it installs while code is loaded, and the output relay running code
//! writes through.

use serde::{Deserialize, Serialize};

// Submodules
pub mod config;
pub mod error;
pub mod interrupt;
pub mod output;
pub mod scheduler;
pub mod worker;

/// Configuration for schedulers and the sessions driving them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Prefix for worker thread names
    pub worker_name: String,

    /// Stack size for worker threads (platform default when unset)
    pub worker_stack_size: Option<usize>,

    /// Prompt shown before a new statement
    pub prompt: String,

    /// Prompt shown while a statement is incomplete
    pub continuation_prompt: String,

    /// Echo the value of bare expressions
    pub echo_results: bool,

    /// Enable debug tracing
    pub debug: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_name: "segue-worker".to_string(),
            worker_stack_size: None,
            prompt: ">>> ".to_string(),
            continuation_prompt: "... ".to_string(),
            echo_results: true,
            debug: false,
        }
    }
}

impl RunnerConfig {
    /// Thread name for the worker with the given id.
    pub fn worker_thread_name(&self, id: &worker::WorkerId) -> String {
        let id = id.to_string();
        format!("{}-{}", self.worker_name, &id[..8])
    }
}

// Re-export commonly used types
pub use error::{Escape, ExitRequest, Interrupted, SchedulerError};
pub use interrupt::{Context, HandlerSlot, InterruptHandler, InterruptRouter, listen_for_ctrl_c};
pub use output::{OutputRelay, SharedSink};
pub use scheduler::{Scheduler, StepOutcome, Suspension};
pub use worker::{WorkerContext, WorkerId};
