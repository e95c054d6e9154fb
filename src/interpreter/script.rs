use std::collections::HashMap;
use std::io;

use tracing::debug;

use super::ast::{BinaryOp, Expr, Stmt};
use super::parser::{completeness, parse_program};
use super::value::Value;
use super::{Completeness, Interpreter, ScriptError};
use crate::runtime::error::{Escape, ExitRequest, Interrupted};
use crate::runtime::output::{OutputRelay, SharedSink};
use crate::runtime::worker::WorkerContext;

/// Ways a statement can stop executing other than finishing normally.
#[derive(Debug)]
enum Fault {
    Escape(Escape),
    Error(ScriptError),
}

impl From<Escape> for Fault {
    fn from(escape: Escape) -> Self {
        Fault::Escape(escape)
    }
}

impl From<Interrupted> for Fault {
    fn from(interrupted: Interrupted) -> Self {
        Fault::Escape(interrupted.into())
    }
}

impl From<ScriptError> for Fault {
    fn from(err: ScriptError) -> Self {
        Fault::Error(err)
    }
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        if Interrupted::in_io(&err) {
            Fault::Escape(Escape::Interrupted)
        } else {
            Fault::Error(ScriptError::Output(err.to_string()))
        }
    }
}

enum Flow {
    Normal,
    Break,
}

type Exec<T> = std::result::Result<T, Fault>;

/// Tree-walking interpreter for the built-in script language.
///
/// Variables persist across `execute` calls, so a session builds up state
/// statement by statement. Interrupts are caught at the top of each run and
/// reported as `interrupted`; errors are reported as `error: …`. Both end
/// the run early but count as a complete statement.
pub struct ScriptInterpreter {
    variables: HashMap<String, Value>,
    sink: SharedSink,
    echo: bool,
}

impl ScriptInterpreter {
    /// Create an interpreter writing its output to `sink`.
    pub fn new(sink: SharedSink) -> Self {
        Self {
            variables: HashMap::new(),
            sink,
            echo: false,
        }
    }

    /// Echo the value of bare expression statements, REPL style.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Current value of a variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn run(&mut self, statements: &[Stmt], out: &mut Relay<'_>) -> Exec<Flow> {
        for stmt in statements {
            out.worker.check_interrupt()?;
            if let Flow::Break = self.exec(stmt, out)? {
                return Ok(Flow::Break);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, out: &mut Relay<'_>) -> Exec<Flow> {
        match stmt {
            Stmt::Print(args) => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.eval(arg)?.to_string());
                }
                out.relay.relay(&format!("{}\n", parts.join(" ")))?;
            }
            Stmt::Input { name, prompt } => {
                if let Some(prompt) = prompt {
                    let prompt = self.eval(prompt)?.to_string();
                    out.relay.relay(&prompt)?;
                }
                let line = out.worker.wait_for_input()?.unwrap_or_default();
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                self.variables.insert(name.clone(), Value::String(line));
            }
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.variables.insert(name.clone(), value);
            }
            Stmt::Exit(code) => {
                let code = match code {
                    Some(expr) => {
                        let value = self.eval(expr)?.as_integer("exit")?;
                        i32::try_from(value).map_err(|_| ScriptError::Overflow)?
                    }
                    None => 0,
                };
                return Err(Escape::Exit(ExitRequest::new(code)).into());
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.eval(cond)?.truthy() {
                    then
                } else {
                    otherwise
                };
                return self.run(branch, out);
            }
            Stmt::Repeat { count, body } => {
                let count = self.eval(count)?.as_integer("repeat")?;
                for _ in 0..count.max(0) {
                    out.worker.check_interrupt()?;
                    if let Flow::Break = self.run(body, out)? {
                        break;
                    }
                }
            }
            Stmt::Loop(body) => loop {
                out.worker.check_interrupt()?;
                if let Flow::Break = self.run(body, out)? {
                    break;
                }
            },
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Expr(expr) => {
                let value = self.eval(expr)?;
                if self.echo && value != Value::Unit {
                    out.relay.relay(&format!("{}\n", value.repr()))?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&self, expr: &Expr) -> super::Result<Value> {
        match expr {
            Expr::Integer(n) => Ok(Value::Integer(*n)),
            Expr::String(text) => Ok(Value::String(text.clone())),
            Expr::Boolean(flag) => Ok(Value::Boolean(*flag)),
            Expr::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::UnknownVariable(name.clone())),
            Expr::Negate(inner) => {
                let n = self.eval(inner)?.as_integer("negation")?;
                n.checked_neg().map(Value::Integer).ok_or(ScriptError::Overflow)
            }
            Expr::Not(inner) => Ok(Value::Boolean(!self.eval(inner)?.truthy())),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                match op {
                    BinaryOp::And if !lhs.truthy() => Ok(lhs),
                    BinaryOp::Or if lhs.truthy() => Ok(lhs),
                    BinaryOp::And | BinaryOp::Or => self.eval(rhs),
                    _ => lhs.binary(*op, &self.eval(rhs)?),
                }
            }
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                call_builtin(name, values)
            }
        }
    }
}

fn call_builtin(name: &str, args: Vec<Value>) -> super::Result<Value> {
    let expect = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(ScriptError::Arity {
                name: name.to_string(),
                expected,
                got: args.len(),
            })
        }
    };

    match name {
        "len" => {
            expect(1)?;
            match &args[0] {
                Value::String(text) => Ok(Value::Integer(text.chars().count() as i64)),
                other => Err(ScriptError::Type(format!(
                    "len() expects str, got {}",
                    other.type_name()
                ))),
            }
        }
        "int" => {
            expect(1)?;
            match &args[0] {
                Value::Integer(n) => Ok(Value::Integer(*n)),
                Value::Boolean(flag) => Ok(Value::Integer(i64::from(*flag))),
                Value::String(text) => text.trim().parse::<i64>().map(Value::Integer).map_err(
                    |_| ScriptError::Type(format!("int() cannot parse {text:?}")),
                ),
                Value::Unit => Err(ScriptError::Type("int() expects a value".to_string())),
            }
        }
        "str" => {
            expect(1)?;
            Ok(Value::String(args[0].to_string()))
        }
        _ => Err(ScriptError::UnknownFunction(name.to_string())),
    }
}

/// Output and suspension access for one run.
struct Relay<'w> {
    worker: &'w WorkerContext,
    relay: OutputRelay<'w, SharedSink>,
}

impl Interpreter for ScriptInterpreter {
    fn execute(
        &mut self,
        source: &str,
        worker: &WorkerContext,
    ) -> std::result::Result<Completeness, Escape> {
        if completeness(source) == Completeness::Incomplete {
            return Ok(Completeness::Incomplete);
        }

        let mut out = Relay {
            worker,
            relay: OutputRelay::new(worker, self.sink.clone()),
        };

        let outcome = match parse_program(source) {
            Ok(program) => match self.run(&program.statements, &mut out) {
                Ok(Flow::Normal) => Ok(()),
                Ok(Flow::Break) => Err(Fault::Error(ScriptError::BreakOutsideLoop)),
                Err(fault) => Err(fault),
            },
            Err(err) => Err(Fault::Error(err)),
        };

        match outcome {
            Ok(()) => {}
            Err(Fault::Escape(Escape::Interrupted)) => {
                debug!(worker = %worker.id(), "statement interrupted");
                report(&mut out, "interrupted\n")?;
            }
            Err(Fault::Escape(exit @ Escape::Exit(_))) => return Err(exit),
            Err(Fault::Error(err)) => report(&mut out, &format!("error: {err}\n"))?,
        }

        Ok(Completeness::Complete)
    }
}

/// Write a diagnostic. A second interrupt while reporting the first one is
/// not caught again.
fn report(out: &mut Relay<'_>, message: &str) -> std::result::Result<(), Escape> {
    match out.relay.relay(message) {
        Ok(()) => Ok(()),
        Err(err) if Interrupted::in_io(&err) => Err(Escape::Interrupted),
        Err(err) => {
            debug!(error = %err, "failed to write diagnostic");
            Ok(())
        }
    }
}
