use super::ast::{BinaryOp, Expr, Program, Stmt};
use super::{Completeness, Result, ScriptError};

/// Decide whether `source` is a complete statement.
///
/// Unclosed `{` / `(`, an unterminated string, or a trailing `\` all mean
/// more lines are needed. Surplus closing brackets count as complete; the
/// parser reports them as syntax errors.
pub fn completeness(source: &str) -> Completeness {
    match Lexer::new(source).tokenize() {
        Err(Lex::Incomplete) => Completeness::Incomplete,
        Err(Lex::Invalid(_)) => Completeness::Complete,
        Ok(tokens) => {
            let mut depth: i64 = 0;
            for token in &tokens {
                match token {
                    Token::Punct("{") | Token::Punct("(") => depth += 1,
                    Token::Punct("}") | Token::Punct(")") => depth -= 1,
                    _ => {}
                }
            }
            if depth > 0 {
                Completeness::Incomplete
            } else {
                Completeness::Complete
            }
        }
    }
}

/// Parse script source text into a [`Program`].
pub fn parse_program(source: &str) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize().map_err(|err| match err {
        Lex::Incomplete => ScriptError::Syntax("unexpected end of input".to_string()),
        Lex::Invalid(detail) => ScriptError::Syntax(detail),
    })?;

    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let statements = parser.parse_statements(false)?;
    if !parser.at_end() {
        return Err(parser.error("unexpected input"));
    }
    Ok(Program::new(source, statements))
}

const KEYWORDS: &[&str] = &[
    "print", "input", "let", "exit", "if", "else", "repeat", "loop", "break", "and", "or", "not",
    "true", "false",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Integer(i64),
    String(String),
    Ident(String),
    Keyword(&'static str),
    Punct(&'static str),
    Separator,
}

enum Lex {
    Incomplete,
    Invalid(String),
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
    parens: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
            parens: 0,
        }
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn advance(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }

    fn tokenize(mut self) -> std::result::Result<Vec<Token>, Lex> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.current() {
            match ch {
                b' ' | b'\t' | b'\r' => self.advance(),
                b'\\' => {
                    // Line continuation.
                    self.advance();
                    match self.current() {
                        None => return Err(Lex::Incomplete),
                        Some(b'\n') => self.advance(),
                        Some(b'\r') if self.peek() == Some(b'\n') => {
                            self.advance();
                            self.advance();
                        }
                        Some(_) => return Err(Lex::Invalid("stray '\\'".to_string())),
                    }
                }
                b'#' => {
                    while let Some(ch) = self.current() {
                        if ch == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                b'\n' | b';' => {
                    self.advance();
                    if self.parens == 0 {
                        tokens.push(Token::Separator);
                    }
                }
                b'"' => tokens.push(self.lex_string()?),
                b'0'..=b'9' => tokens.push(self.lex_integer()?),
                ch if ch == b'_' || ch.is_ascii_alphabetic() => tokens.push(self.lex_word()),
                _ => tokens.push(self.lex_punct()?),
            }
        }
        Ok(tokens)
    }

    fn lex_string(&mut self) -> std::result::Result<Token, Lex> {
        // consume opening quote
        self.advance();
        let mut text = String::new();
        let mut start = self.index;
        loop {
            match self.current() {
                None => return Err(Lex::Incomplete),
                Some(b'"') => {
                    text.push_str(&self.src[start..self.index]);
                    self.advance();
                    return Ok(Token::String(text));
                }
                Some(b'\\') => {
                    text.push_str(&self.src[start..self.index]);
                    self.advance();
                    let escaped = match self.current() {
                        None => return Err(Lex::Incomplete),
                        Some(b'n') => '\n',
                        Some(b't') => '\t',
                        Some(b'"') => '"',
                        Some(b'\\') => '\\',
                        Some(other) => {
                            return Err(Lex::Invalid(format!(
                                "unknown escape '\\{}'",
                                other as char
                            )));
                        }
                    };
                    text.push(escaped);
                    self.advance();
                    start = self.index;
                }
                Some(_) => self.advance(),
            }
        }
    }

    fn lex_integer(&mut self) -> std::result::Result<Token, Lex> {
        let start = self.index;
        while matches!(self.current(), Some(b'0'..=b'9')) {
            self.advance();
        }
        let digits = &self.src[start..self.index];
        digits
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| Lex::Invalid(format!("integer literal too large: {digits}")))
    }

    fn lex_word(&mut self) -> Token {
        let start = self.index;
        while let Some(ch) = self.current() {
            if ch == b'_' || ch.is_ascii_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        let word = &self.src[start..self.index];
        match KEYWORDS.iter().find(|keyword| **keyword == word) {
            Some(keyword) => Token::Keyword(*keyword),
            None => Token::Ident(word.to_string()),
        }
    }

    fn lex_punct(&mut self) -> std::result::Result<Token, Lex> {
        const TWO: &[&str] = &["==", "!=", "<=", ">="];
        const ONE: &[&str] = &[
            "{", "}", "(", ")", ",", "=", "<", ">", "+", "-", "*", "/", "%",
        ];

        let rest = &self.src[self.index..];
        if let Some(op) = TWO.iter().find(|op| rest.starts_with(**op)) {
            self.index += 2;
            return Ok(Token::Punct(*op));
        }
        if let Some(op) = ONE.iter().find(|op| rest.starts_with(**op)) {
            self.index += 1;
            match *op {
                "(" => self.parens += 1,
                ")" => self.parens = self.parens.saturating_sub(1),
                _ => {}
            }
            return Ok(Token::Punct(*op));
        }

        let ch = rest.chars().next().unwrap_or('?');
        Err(Lex::Invalid(format!("unexpected character '{ch}'")))
    }
}

/// Nesting budget shared by parsing and evaluation, both of which recurse
/// on the syntax tree and would otherwise overflow the worker's stack.
const MAX_NESTING: usize = 1024;

/// What one level of parentheses costs: it descends through every
/// precedence level.
const EXPR_COST: usize = 4;

/// What one nested block costs.
const BLOCK_COST: usize = 4;

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() {
            self.index += 1;
        }
    }

    fn error(&self, message: &str) -> ScriptError {
        match self.current() {
            Some(token) => ScriptError::Syntax(format!("{message} near {}", describe(token))),
            None => ScriptError::Syntax(format!("{message} at end of input")),
        }
    }

    /// Charge `cost` against the nesting budget. Callers restore `depth`
    /// when the nested construct is done.
    fn nest(&mut self, cost: usize) -> Result<()> {
        self.depth += cost;
        if self.depth > MAX_NESTING {
            return Err(ScriptError::Syntax("expression nested too deeply".to_string()));
        }
        Ok(())
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.current(), Some(Token::Punct(p)) if *p == punct)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), Some(Token::Keyword(k)) if *k == keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{punct}'")))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.current() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.current(), Some(Token::Separator)) {
            self.advance();
        }
    }

    /// Statements up to end of input, or up to a closing `}` when `in_block`.
    fn parse_statements(&mut self, in_block: bool) -> Result<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at_end() || (in_block && self.is_punct("}")) {
                return Ok(statements);
            }
            statements.push(self.parse_statement()?);
            match self.current() {
                None | Some(Token::Separator) => {}
                Some(Token::Punct("}")) if in_block => {}
                Some(_) => return Err(self.error("expected end of statement")),
            }
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct("{")?;
        self.nest(BLOCK_COST)?;
        let body = self.parse_statements(true)?;
        self.depth -= BLOCK_COST;
        self.expect_punct("}")?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let Some(token) = self.current().cloned() else {
            return Err(self.error("expected a statement"));
        };

        match token {
            Token::Keyword("print") => {
                self.advance();
                let mut args = Vec::new();
                if !self.at_statement_end() {
                    args.push(self.parse_expr()?);
                    while self.eat_punct(",") {
                        args.push(self.parse_expr()?);
                    }
                }
                Ok(Stmt::Print(args))
            }
            Token::Keyword("input") => {
                self.advance();
                let name = self.expect_ident()?;
                let prompt = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Ok(Stmt::Input { name, prompt })
            }
            Token::Keyword("let") => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect_punct("=")?;
                let value = self.parse_expr()?;
                Ok(Stmt::Assign { name, value })
            }
            Token::Keyword("exit") => {
                self.advance();
                if self.at_statement_end() {
                    Ok(Stmt::Exit(None))
                } else {
                    Ok(Stmt::Exit(Some(self.parse_expr()?)))
                }
            }
            Token::Keyword("if") => self.parse_if(),
            Token::Keyword("repeat") => {
                self.advance();
                let count = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::Repeat { count, body })
            }
            Token::Keyword("loop") => {
                self.advance();
                Ok(Stmt::Loop(self.parse_block()?))
            }
            Token::Keyword("break") => {
                self.advance();
                Ok(Stmt::Break)
            }
            Token::Ident(name)
                if matches!(self.tokens.get(self.index + 1), Some(Token::Punct("="))) =>
            {
                self.advance();
                self.advance();
                let value = self.parse_expr()?;
                Ok(Stmt::Assign { name, value })
            }
            _ => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        // consume 'if'
        self.advance();
        let cond = self.parse_expr()?;
        let then = self.parse_block()?;
        let otherwise = if self.eat_keyword("else") {
            if self.is_keyword("if") {
                self.nest(BLOCK_COST)?;
                let chained = self.parse_if()?;
                self.depth -= BLOCK_COST;
                vec![chained]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.current(), None | Some(Token::Separator) | Some(Token::Punct("}")))
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.nest(EXPR_COST)?;
        let expr = self.parse_or()?;
        self.depth -= EXPR_COST;
        Ok(expr)
    }

    // Each operator in a left-associative chain adds a level to the tree,
    // so chains are charged per operator until the whole chain is parsed.

    fn parse_or(&mut self) -> Result<Expr> {
        let mark = self.depth;
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            self.nest(1)?;
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mark = self.depth;
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            self.nest(1)?;
            let rhs = self.parse_not()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        let mark = self.depth;
        let mut prefixes = 0;
        while self.eat_keyword("not") {
            self.nest(1)?;
            prefixes += 1;
        }
        let mut expr = self.parse_comparison()?;
        for _ in 0..prefixes {
            expr = Expr::Not(Box::new(expr));
        }
        self.depth = mark;
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.current() {
            Some(Token::Punct("==")) => BinaryOp::Eq,
            Some(Token::Punct("!=")) => BinaryOp::Ne,
            Some(Token::Punct("<")) => BinaryOp::Lt,
            Some(Token::Punct("<=")) => BinaryOp::Le,
            Some(Token::Punct(">")) => BinaryOp::Gt,
            Some(Token::Punct(">=")) => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mark = self.depth;
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Some(Token::Punct("+")) => BinaryOp::Add,
                Some(Token::Punct("-")) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.nest(1)?;
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mark = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Some(Token::Punct("*")) => BinaryOp::Mul,
                Some(Token::Punct("/")) => BinaryOp::Div,
                Some(Token::Punct("%")) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.nest(1)?;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = mark;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let mark = self.depth;
        let mut prefixes = 0;
        while self.eat_punct("-") {
            self.nest(1)?;
            prefixes += 1;
        }
        let mut expr = self.parse_primary()?;
        for _ in 0..prefixes {
            expr = Expr::Negate(Box::new(expr));
        }
        self.depth = mark;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(token) = self.current().cloned() else {
            return Err(self.error("expected an expression"));
        };

        match token {
            Token::Integer(n) => {
                self.advance();
                Ok(Expr::Integer(n))
            }
            Token::String(text) => {
                self.advance();
                Ok(Expr::String(text))
            }
            Token::Keyword("true") => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            Token::Keyword("false") => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            Token::Ident(name) => {
                self.advance();
                if self.eat_punct("(") {
                    let mut args = Vec::new();
                    if !self.is_punct(")") {
                        args.push(self.parse_expr()?);
                        while self.eat_punct(",") {
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect_punct(")")?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Token::Punct("(") => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            _ => Err(self.error("expected an expression")),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Integer(n) => n.to_string(),
        Token::String(text) => format!("{text:?}"),
        Token::Ident(name) => format!("'{name}'"),
        Token::Keyword(keyword) => format!("'{keyword}'"),
        Token::Punct(punct) => format!("'{punct}'"),
        Token::Separator => "end of statement".to_string(),
    }
}
