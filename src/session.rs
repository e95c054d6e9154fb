//! Read-eval-print sessions on top of the scheduler
//!
//! A [`Session`] is the reference driver: it reads lines, buffers them until
//! the interpreter reports a complete statement, and feeds input lines to
//! code waiting in `input`-style suspensions.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::interpreter::Interpreter;
use crate::runtime::{
    HandlerSlot, RunnerConfig, Scheduler, SchedulerError, SharedSink, StepOutcome, Suspension,
};

/// Errors that end a session abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The scheduler reported a defect.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Reading input or writing prompts failed.
    #[error("session I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A script ended in the middle of a statement.
    #[error("script ended inside an unfinished statement")]
    Unfinished,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Input ran out.
    Eof,
    /// Running code asked for the process to exit.
    Exit(i32),
}

impl SessionEnd {
    /// The process exit status this ending maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionEnd::Eof => 0,
            SessionEnd::Exit(code) => *code,
        }
    }
}

/// A REPL driving a [`Scheduler`] from a line reader.
pub struct Session<I: Interpreter, R, W = SharedSink> {
    scheduler: Scheduler<I>,
    input: R,
    output: W,
    buffer: Vec<String>,
}

impl<I, R, W> Session<I, R, W>
where
    I: Interpreter,
    R: BufRead,
    W: Write + Clone + Send + 'static,
{
    /// Create a session routing interrupts from the process-wide slot.
    pub fn new(interpreter: I, input: R, output: W) -> Self {
        Self::with_slot(interpreter, input, output, HandlerSlot::process())
    }

    /// Create a session routing interrupts from `slot`.
    ///
    /// Each refresh request from running code flushes `output`.
    pub fn with_slot(interpreter: I, input: R, output: W, slot: Arc<HandlerSlot>) -> Self {
        let mut sink = output.clone();
        let on_refresh = move || {
            if let Err(err) = sink.flush() {
                debug!(error = %err, "failed to flush output on refresh");
            }
        };

        Self {
            scheduler: Scheduler::with_slot(interpreter, on_refresh, slot),
            input,
            output,
            buffer: Vec::new(),
        }
    }

    /// Use `config` for prompts and workers.
    pub fn with_config(self, config: RunnerConfig) -> Self {
        let Session {
            scheduler,
            input,
            output,
            buffer,
        } = self;
        Self {
            scheduler: scheduler.with_config(config),
            input,
            output,
            buffer,
        }
    }

    /// The scheduler this session drives.
    pub fn scheduler(&self) -> &Scheduler<I> {
        &self.scheduler
    }

    /// Mutable access to the scheduler.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler<I> {
        &mut self.scheduler
    }

    /// Lines of the statement still waiting to be completed.
    pub fn pending_lines(&self) -> &[String] {
        &self.buffer
    }

    /// Run the read-eval-print loop until input runs out or code exits.
    pub fn run(&mut self) -> Result<SessionEnd, SessionError> {
        loop {
            let config = self.scheduler.config();
            let prompt = if self.buffer.is_empty() {
                config.prompt.clone()
            } else {
                config.continuation_prompt.clone()
            };
            self.output.write_all(prompt.as_bytes())?;
            self.output.flush()?;

            let Some(line) = self.read_line()? else {
                debug!("end of input");
                return Ok(SessionEnd::Eof);
            };
            self.buffer.push(line);

            let source = self.buffer.join("\n");
            match self.execute(&source) {
                Ok(StepOutcome::Unfinished) => {
                    trace!(lines = self.buffer.len(), "statement continues");
                }
                Ok(_) => self.buffer.clear(),
                Err(SessionError::Scheduler(SchedulerError::WorkerExit(exit))) => {
                    return Ok(SessionEnd::Exit(exit.code));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run a whole script as one source blob.
    ///
    /// Input requests are served from the session's reader.
    pub fn run_script(&mut self, source: &str) -> Result<SessionEnd, SessionError> {
        match self.execute(source) {
            Ok(StepOutcome::Unfinished) => Err(SessionError::Unfinished),
            Ok(_) => Ok(SessionEnd::Eof),
            Err(SessionError::Scheduler(SchedulerError::WorkerExit(exit))) => {
                Ok(SessionEnd::Exit(exit.code))
            }
            Err(err) => Err(err),
        }
    }

    /// Load `source` and step it to completion.
    pub fn execute(&mut self, source: &str) -> Result<StepOutcome, SessionError> {
        self.scheduler.load(source)?;
        let mut outcome = self.scheduler.step(None)?;

        loop {
            outcome = match outcome {
                StepOutcome::Suspended(Suspension::Input) => {
                    let line = match self.read_line() {
                        Ok(line) => line.unwrap_or_default(),
                        Err(err) => {
                            self.scheduler.cancel();
                            return Err(err.into());
                        }
                    };
                    self.scheduler.step(Some(line))?
                }
                StepOutcome::Suspended(Suspension::Refresh) => self.scheduler.step(None)?,
                finished => return Ok(finished),
            };
        }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

impl<I: Interpreter, R, W> std::fmt::Debug for Session<I, R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("scheduler", &self.scheduler)
            .field("pending_lines", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ScriptInterpreter;
    use parking_lot::Mutex;
    use std::io::Cursor;

    fn session(input: &str) -> (Session<ScriptInterpreter, Cursor<Vec<u8>>>, Arc<Mutex<Vec<u8>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = SharedSink::from_shared(Arc::clone(&captured));
        let interpreter = ScriptInterpreter::new(sink.clone()).with_echo(true);
        let session = Session::with_slot(
            interpreter,
            Cursor::new(input.as_bytes().to_vec()),
            sink,
            Arc::new(HandlerSlot::new()),
        );
        (session, captured)
    }

    fn text(captured: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(captured.lock().clone()).unwrap()
    }

    #[test]
    fn test_repl_echoes_and_prompts() {
        let (mut session, captured) = session("1 + 1\nprint \"hi\"\n");
        assert_eq!(session.run().unwrap(), SessionEnd::Eof);
        assert_eq!(text(&captured), ">>> 2\n>>> hi\n>>> ");
    }

    #[test]
    fn test_continuation_lines() {
        let (mut session, captured) = session("if true {\nprint 1\n}\n");
        assert_eq!(session.run().unwrap(), SessionEnd::Eof);
        assert_eq!(text(&captured), ">>> ... ... 1\n>>> ");
        assert!(session.pending_lines().is_empty());
    }

    #[test]
    fn test_input_is_read_from_the_same_reader() {
        let (mut session, captured) = session("input name \"who? \"\nprint \"hello\", name\n");
        // The second line is consumed by `input`, so nothing else runs.
        assert_eq!(session.run().unwrap(), SessionEnd::Eof);
        assert_eq!(text(&captured), ">>> who? >>> ");
        let interpreter = session.scheduler().interpreter().unwrap();
        assert_eq!(
            interpreter.variable("name").map(ToString::to_string).as_deref(),
            Some("print \"hello\", name")
        );
    }

    #[test]
    fn test_exit_ends_session() {
        let (mut session, _) = session("exit 7\nprint 1\n");
        let end = session.run().unwrap();
        assert_eq!(end, SessionEnd::Exit(7));
        assert_eq!(end.exit_code(), 7);
    }

    #[test]
    fn test_unfinished_script() {
        let (mut session, _) = session("");
        assert!(matches!(
            session.run_script("repeat 3 {"),
            Err(SessionError::Unfinished)
        ));
        assert_eq!(session.run_script("let x = 1").unwrap(), SessionEnd::Eof);
    }
}
