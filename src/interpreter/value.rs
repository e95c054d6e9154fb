use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::{Result, ScriptError, ast::BinaryOp};

/// Runtime value of the script language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean.
    Boolean(bool),
    /// Result of a statement-like expression; never printed by echo.
    Unit,
}

impl Value {
    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "int",
            Value::String(_) => "str",
            Value::Boolean(_) => "bool",
            Value::Unit => "unit",
        }
    }

    /// Truthiness used by `if`, `and`, `or`, `not`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::String(text) => !text.is_empty(),
            Value::Boolean(flag) => *flag,
            Value::Unit => false,
        }
    }

    /// Source-like rendering used when echoing results.
    pub fn repr(&self) -> String {
        match self {
            Value::String(text) => format!("{text:?}"),
            other => other.to_string(),
        }
    }

    /// Integer payload, or a type error naming `context`.
    pub fn as_integer(&self, context: &str) -> Result<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            other => Err(ScriptError::Type(format!(
                "{context} expects int, got {}",
                other.type_name()
            ))),
        }
    }

    /// Apply a non-short-circuiting binary operator.
    pub fn binary(&self, op: BinaryOp, rhs: &Value) -> Result<Value> {
        use BinaryOp::*;
        match op {
            Eq => Ok(Value::Boolean(self == rhs)),
            Ne => Ok(Value::Boolean(self != rhs)),
            Lt | Le | Gt | Ge => {
                let ordering = self.compare(rhs)?;
                Ok(Value::Boolean(match op {
                    Lt => ordering == Ordering::Less,
                    Le => ordering != Ordering::Greater,
                    Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
            Add => match (self, rhs) {
                (Value::Integer(a), Value::Integer(b)) => {
                    a.checked_add(*b).map(Value::Integer).ok_or(ScriptError::Overflow)
                }
                (Value::String(_), _) | (_, Value::String(_)) => {
                    Ok(Value::String(format!("{self}{rhs}")))
                }
                _ => Err(self.mismatch("+", rhs)),
            },
            Sub | Mul | Div | Rem => {
                let (Value::Integer(a), Value::Integer(b)) = (self, rhs) else {
                    return Err(self.mismatch(op_symbol(op), rhs));
                };
                let result = match op {
                    Sub => a.checked_sub(*b),
                    Mul => a.checked_mul(*b),
                    Div | Rem if *b == 0 => return Err(ScriptError::DivisionByZero),
                    Div => a.checked_div(*b),
                    _ => a.checked_rem(*b),
                };
                result.map(Value::Integer).ok_or(ScriptError::Overflow)
            }
            And | Or => Err(ScriptError::Type(
                "logical operators are evaluated by the interpreter".to_string(),
            )),
        }
    }

    fn compare(&self, rhs: &Value) -> Result<Ordering> {
        match (self, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(self.mismatch("comparison", rhs)),
        }
    }

    fn mismatch(&self, op: &str, rhs: &Value) -> ScriptError {
        ScriptError::Type(format!(
            "unsupported operand types for {op}: {} and {}",
            self.type_name(),
            rhs.type_name()
        ))
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        _ => "operator",
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::String(text) => f.write_str(text),
            Value::Boolean(flag) => write!(f, "{flag}"),
            Value::Unit => Ok(()),
        }
    }
}
