//! The interpreter seam and a small built-in scripting language.
//!
//! The scheduler treats interpreters as opaque: it hands one a source blob
//! and a [`WorkerContext`], and learns only whether the statement was
//! complete or whether the code wants out. Everything else, including how
//! ordinary errors are reported, is the interpreter's own business.
//!
//! [`ScriptInterpreter`] is the language used by the command line tool and
//! the test suite: statements like `print`, `input`, `let`, `if`, `repeat`,
//! `loop` and `exit` over integers, strings and booleans.

/// Syntax tree for the script language.
pub mod ast;
/// Lexer, completeness check, and parser for the script language.
pub mod parser;
/// Tree-walking evaluator implementing [`Interpreter`].
pub mod script;
/// Runtime values of the script language.
pub mod value;

pub use ast::{BinaryOp, Expr, Program, Stmt};
pub use parser::{completeness, parse_program};
pub use script::ScriptInterpreter;
pub use value::Value;

use crate::runtime::error::Escape;
use crate::runtime::worker::WorkerContext;
use thiserror::Error;

/// Whether a source blob forms a complete statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// The source was a complete statement and has been executed.
    Complete,
    /// More lines are needed before the source can run.
    Incomplete,
}

/// Something that can run a source blob inside a worker.
pub trait Interpreter: Send + 'static {
    /// Run `source` to completion.
    ///
    /// `worker` gives access to the suspension primitives. An uncaught
    /// interrupt or an exit request leaves through the `Err` side.
    fn execute(
        &mut self,
        source: &str,
        worker: &WorkerContext,
    ) -> std::result::Result<Completeness, Escape>;
}

/// Convenience result alias for script operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors surfaced by the script parser and evaluator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Parsing failed due to invalid syntax.
    #[error("invalid syntax: {0}")]
    Syntax(String),

    /// A variable was read before being assigned.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// A call named a function that does not exist.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        /// Function name
        name: String,
        /// Expected argument count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// An operation was applied to values of the wrong type.
    #[error("type error: {0}")]
    Type(String),

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic overflowed.
    #[error("integer overflow")]
    Overflow,

    /// `break` appeared outside `repeat`/`loop`.
    #[error("'break' outside loop")]
    BreakOutsideLoop,

    /// Writing output failed.
    #[error("output error: {0}")]
    Output(String),
}
