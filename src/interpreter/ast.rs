use serde::{Deserialize, Serialize};

/// Expression nodes of the script language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Expr {
    /// Signed integer literal.
    Integer(i64),
    /// String literal.
    String(String),
    /// Boolean literal.
    Boolean(bool),
    /// Variable reference.
    Variable(String),
    /// Arithmetic negation.
    Negate(Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Built-in function call.
    Call {
        /// Function name.
        name: String,
        /// Arguments, evaluated left to right.
        args: Vec<Expr>,
    },
}

/// Binary operators, loosest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `or`, short-circuiting
    Or,
    /// `and`, short-circuiting
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

/// Statement nodes of the script language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Stmt {
    /// `print a, b, …`: one line of output.
    Print(Vec<Expr>),
    /// `input name ["prompt"]`: suspend for a line of input.
    Input {
        /// Variable receiving the line.
        name: String,
        /// Optional prompt written before waiting.
        prompt: Option<Expr>,
    },
    /// `let name = e` or `name = e`.
    Assign {
        /// Variable name.
        name: String,
        /// Assigned expression.
        value: Expr,
    },
    /// `exit [code]`: ask for process termination.
    Exit(Option<Expr>),
    /// `if cond { … } else { … }`.
    If {
        /// Condition.
        cond: Expr,
        /// Taken when the condition holds.
        then: Vec<Stmt>,
        /// Taken otherwise.
        otherwise: Vec<Stmt>,
    },
    /// `repeat n { … }`.
    Repeat {
        /// Iteration count.
        count: Expr,
        /// Loop body.
        body: Vec<Stmt>,
    },
    /// `loop { … }`, left only through `break`, an interrupt, or `exit`.
    Loop(Vec<Stmt>),
    /// `break`.
    Break,
    /// A bare expression.
    Expr(Expr),
}

/// A parsed source blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Top-level statements in execution order.
    pub statements: Vec<Stmt>,
    /// Original source text, retained for error reporting and debugging.
    pub source: String,
}

impl Program {
    /// Construct a program from parsed statements.
    pub fn new(source: impl Into<String>, statements: Vec<Stmt>) -> Self {
        Self {
            source: source.into(),
            statements,
        }
    }
}
