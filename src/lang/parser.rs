//! Recursive-descent parser for the Python subset.
//!
//! Two entry points mirror the two-phase parse the sandbox performs:
//! [`parse_expression`] treats the source as one isolated expression,
//! [`parse_program`] as a statement sequence. [`parse`] tries the former and
//! falls back to the latter, which is what the REPL pipeline uses.
//!
//! The parser deliberately understands constructs the sandbox will never
//! execute (`import`, `class`, `lambda`, `yield`, ...) so the policy
//! validator can reject them by name. Nesting depth is capped to keep
//! adversarial input from exhausting the parser stack.

use std::fmt;

use super::ast::*;
use super::lexer::{tokenize, LexError, RawFsPart, Tok, Token};

/// Parse failure with source line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            message: e.message,
            line: e.line,
        }
    }
}

/// Parse source as a single isolated expression.
pub fn parse_expression(source: &str, max_depth: usize) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, max_depth);
    let expr = parser.expression()?;
    parser.skip_newlines();
    parser.expect_eof()?;
    Ok(Program {
        body: vec![Stmt::Expr(expr)],
        kind: ProgramKind::Expression,
    })
}

/// Parse source as a statement sequence.
pub fn parse_program(source: &str, max_depth: usize) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, max_depth);
    let body = parser.statements_until_eof()?;
    Ok(Program {
        body,
        kind: ProgramKind::Statements,
    })
}

/// Expression-first parse with statement-sequence fallback.
///
/// The expression error is deliberately discarded: if both modes fail, the
/// statement-mode error is the one that names the real problem.
pub fn parse(source: &str, max_depth: usize) -> Result<Program, ParseError> {
    match parse_expression(source, max_depth) {
        Ok(program) => Ok(program),
        Err(_) => parse_program(source, max_depth),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_ahead(&self, n: usize) -> &Tok {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .map(|t| t.line)
            .or_else(|| self.tokens.last().map(|t| t.line))
            .unwrap_or(1)
    }

    fn bump(&mut self) -> Tok {
        let tok = self
            .tokens
            .get(self.pos)
            .map(|t| t.kind.clone())
            .unwrap_or(Tok::Eof);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &Tok) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: Tok) -> Result<(), ParseError> {
        if self.peek() == &kind {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {}, found {}", kind, self.peek())))
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line(),
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        if self.peek() == &Tok::Eof {
            Ok(())
        } else {
            Err(self.err(format!("unexpected {}", self.peek())))
        }
    }

    fn skip_newlines(&mut self) {
        while self.peek() == &Tok::Newline {
            self.bump();
        }
    }

    /// Run `f` one nesting level deeper, erroring once the cap is hit.
    fn with_depth<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(self.err("expression nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statements_until_eof(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        self.skip_newlines();
        while self.peek() != &Tok::Eof {
            body.extend(self.statement_line()?);
            self.skip_newlines();
        }
        if body.is_empty() {
            return Err(self.err("empty program"));
        }
        Ok(body)
    }

    /// One logical line: a compound statement, or `;`-separated simple
    /// statements terminated by a newline.
    fn statement_line(&mut self) -> Result<Vec<Stmt>, ParseError> {
        match self.peek() {
            Tok::KwIf => return Ok(vec![self.if_statement()?]),
            Tok::KwWhile => return Ok(vec![self.while_statement()?]),
            Tok::KwFor => return Ok(vec![self.for_statement()?]),
            Tok::KwDef => return Ok(vec![Stmt::FunctionDef(self.function_def()?)]),
            Tok::KwClass => return Ok(vec![self.class_def()?]),
            Tok::KwAsync => return Ok(vec![self.async_statement()?]),
            _ => {}
        }
        let mut stmts = vec![self.simple_statement()?];
        while self.eat(&Tok::Semicolon) {
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        self.end_of_line()?;
        Ok(stmts)
    }

    fn end_of_line(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Tok::Newline => {
                self.bump();
                Ok(())
            }
            Tok::Eof | Tok::Dedent => Ok(()),
            other => Err(self.err(format!("unexpected {other}"))),
        }
    }

    fn simple_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Tok::KwPass => {
                self.bump();
                Ok(Stmt::Pass)
            }
            Tok::KwBreak => {
                self.bump();
                Ok(Stmt::Break)
            }
            Tok::KwContinue => {
                self.bump();
                Ok(Stmt::Continue)
            }
            Tok::KwReturn => {
                self.bump();
                if matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Semicolon | Tok::Dedent) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.expression_list()?)))
                }
            }
            Tok::KwDel => {
                self.bump();
                let mut targets = vec![self.target()?];
                while self.eat(&Tok::Comma) {
                    targets.push(self.target()?);
                }
                Ok(Stmt::Delete(targets))
            }
            Tok::KwImport => self.import_statement(),
            Tok::KwFrom => self.from_import_statement(),
            Tok::KwGlobal => {
                self.bump();
                Ok(Stmt::Global(self.name_list()?))
            }
            Tok::KwNonlocal => {
                self.bump();
                Ok(Stmt::Nonlocal(self.name_list()?))
            }
            _ => self.expression_statement(),
        }
    }

    fn name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.ident()?];
        while self.eat(&Tok::Comma) {
            names.push(self.ident()?);
        }
        Ok(names)
    }

    fn dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.ident()?;
        while self.eat(&Tok::Dot) {
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    fn import_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let mut names = vec![self.dotted_name()?];
        if self.eat(&Tok::KwAs) {
            self.ident()?;
        }
        while self.eat(&Tok::Comma) {
            names.push(self.dotted_name()?);
            if self.eat(&Tok::KwAs) {
                self.ident()?;
            }
        }
        Ok(Stmt::Import { names })
    }

    fn from_import_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let module = self.dotted_name()?;
        self.expect(Tok::KwImport)?;
        let mut names = Vec::new();
        if self.eat(&Tok::Star) {
            names.push("*".to_string());
        } else {
            names.push(self.ident()?);
            if self.eat(&Tok::KwAs) {
                self.ident()?;
            }
            while self.eat(&Tok::Comma) {
                names.push(self.ident()?);
                if self.eat(&Tok::KwAs) {
                    self.ident()?;
                }
            }
        }
        Ok(Stmt::ImportFrom { module, names })
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let first = self.expression_list()?;

        if let Some(op) = self.aug_op() {
            self.bump();
            let target = self.expr_to_target(first)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.err("augmented assignment target cannot be a tuple"));
            }
            let value = self.expression_list()?;
            return Ok(Stmt::AugAssign { target, op, value });
        }

        if self.peek() == &Tok::Assign {
            let mut exprs = vec![first];
            while self.eat(&Tok::Assign) {
                exprs.push(self.expression_list()?);
            }
            let value = exprs.pop().unwrap();
            let targets = exprs
                .into_iter()
                .map(|e| self.expr_to_target(e))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Stmt::Assign { targets, value });
        }

        Ok(Stmt::Expr(first))
    }

    fn aug_op(&self) -> Option<BinOp> {
        Some(match self.peek() {
            Tok::PlusEq => BinOp::Add,
            Tok::MinusEq => BinOp::Sub,
            Tok::StarEq => BinOp::Mul,
            Tok::SlashEq => BinOp::Div,
            Tok::DoubleSlashEq => BinOp::FloorDiv,
            Tok::PercentEq => BinOp::Mod,
            Tok::DoubleStarEq => BinOp::Pow,
            Tok::AmpEq => BinOp::BitAnd,
            Tok::PipeEq => BinOp::BitOr,
            Tok::CaretEq => BinOp::BitXor,
            Tok::ShlEq => BinOp::Shl,
            Tok::ShrEq => BinOp::Shr,
            _ => return None,
        })
    }

    fn expr_to_target(&self, expr: Expr) -> Result<Target, ParseError> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Tuple(items) | Expr::List(items) => {
                let targets = items
                    .into_iter()
                    .map(|e| self.expr_to_target(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Target::Tuple(targets))
            }
            Expr::Subscript { value, index } => Ok(Target::Subscript {
                value: *value,
                index: *index,
            }),
            Expr::Attribute { value, attr } => Ok(Target::Attribute {
                value: *value,
                attr,
            }),
            _ => Err(self.err("cannot assign to this expression")),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let test = self.expression()?;
        let body = self.block()?;
        let orelse = match self.peek() {
            Tok::KwElif => vec![self.if_statement_from_elif()?],
            Tok::KwElse => {
                self.bump();
                self.block()?
            }
            _ => Vec::new(),
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn if_statement_from_elif(&mut self) -> Result<Stmt, ParseError> {
        // `elif` parses exactly like a nested `if`.
        self.bump();
        let test = self.expression()?;
        let body = self.block()?;
        let orelse = match self.peek() {
            Tok::KwElif => vec![self.if_statement_from_elif()?],
            Tok::KwElse => {
                self.bump();
                self.block()?
            }
            _ => Vec::new(),
        };
        Ok(Stmt::If { test, body, orelse })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let test = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::While { test, body })
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let target = self.target_list()?;
        self.expect(Tok::KwIn)?;
        let iter = self.expression_list()?;
        let body = self.block()?;
        Ok(Stmt::For { target, iter, body })
    }

    fn async_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        if self.peek() == &Tok::KwDef {
            let def = self.function_def()?;
            Ok(Stmt::AsyncFunctionDef(def))
        } else {
            Err(self.err("expected 'def' after 'async'"))
        }
    }

    fn function_def(&mut self) -> Result<FunctionDef, ParseError> {
        self.bump();
        let name = self.ident()?;
        self.expect(Tok::LParen)?;
        let params = self.parameter_list()?;
        self.expect(Tok::RParen)?;
        let body = self.block()?;
        Ok(FunctionDef { name, params, body })
    }

    fn parameter_list(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        let mut seen_default = false;
        while self.peek() != &Tok::RParen {
            if matches!(self.peek(), Tok::Star | Tok::DoubleStar) {
                return Err(self.err("star parameters are not supported"));
            }
            let name = self.ident()?;
            let default = if self.eat(&Tok::Assign) {
                seen_default = true;
                Some(self.expression()?)
            } else {
                if seen_default {
                    return Err(self.err("parameter without default follows parameter with default"));
                }
                None
            };
            if params.iter().any(|p: &Param| p.name == name) {
                return Err(self.err(format!("duplicate parameter '{name}'")));
            }
            params.push(Param { name, default });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn class_def(&mut self) -> Result<Stmt, ParseError> {
        self.bump();
        let name = self.ident()?;
        if self.eat(&Tok::LParen) {
            while self.peek() != &Tok::RParen {
                self.expression()?;
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen)?;
        }
        let body = self.block()?;
        Ok(Stmt::ClassDef { name, body })
    }

    /// `:` followed by either an inline simple-statement list or an indented
    /// block.
    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.with_depth(Self::block_inner)
    }

    fn block_inner(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(Tok::Colon)?;
        if self.peek() == &Tok::Newline {
            self.bump();
            self.expect(Tok::Indent)?;
            let mut body = Vec::new();
            self.skip_newlines();
            while self.peek() != &Tok::Dedent && self.peek() != &Tok::Eof {
                body.extend(self.statement_line()?);
                self.skip_newlines();
            }
            self.expect(Tok::Dedent)?;
            if body.is_empty() {
                return Err(self.err("expected an indented block"));
            }
            Ok(body)
        } else {
            let mut stmts = vec![self.simple_statement()?];
            while self.eat(&Tok::Semicolon) {
                if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                    break;
                }
                stmts.push(self.simple_statement()?);
            }
            self.end_of_line()?;
            Ok(stmts)
        }
    }

    fn target(&mut self) -> Result<Target, ParseError> {
        let expr = self.atom_expr()?;
        self.expr_to_target(expr)
    }

    /// Loop target: `x` / `x, y` / `(x, y)`.
    fn target_list(&mut self) -> Result<Target, ParseError> {
        let mut targets = vec![self.target()?];
        let mut trailing_comma = false;
        while self.eat(&Tok::Comma) {
            if self.peek() == &Tok::KwIn {
                trailing_comma = true;
                break;
            }
            targets.push(self.target()?);
        }
        if targets.len() == 1 && !trailing_comma {
            Ok(targets.pop().unwrap())
        } else {
            Ok(Target::Tuple(targets))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.err(format!("expected identifier, found {other}"))),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Comma-separated expression list; two or more elements become a tuple.
    fn expression_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.expression()?;
        if self.peek() != &Tok::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.expression_starts() {
                items.push(self.expression()?);
            } else {
                break;
            }
        }
        Ok(Expr::Tuple(items))
    }

    fn expression_starts(&self) -> bool {
        !matches!(
            self.peek(),
            Tok::Newline
                | Tok::Eof
                | Tok::Dedent
                | Tok::Semicolon
                | Tok::Assign
                | Tok::RParen
                | Tok::RBracket
                | Tok::RBrace
                | Tok::Colon
        )
    }

    /// Full expression: lambda / yield / conditional.
    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.with_depth(Self::expression_inner)
    }

    fn expression_inner(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Tok::KwLambda => return self.lambda_expr(),
            Tok::KwYield => {
                self.bump();
                if self.peek() == &Tok::KwFrom {
                    self.bump();
                    let value = self.expression()?;
                    return Ok(Expr::YieldFrom(Box::new(value)));
                }
                if self.expression_starts() {
                    let value = self.expression_list()?;
                    return Ok(Expr::Yield(Some(Box::new(value))));
                }
                return Ok(Expr::Yield(None));
            }
            _ => {}
        }
        let body = self.or_test()?;
        if self.peek() == &Tok::KwIf {
            self.bump();
            let test = self.or_test()?;
            self.expect(Tok::KwElse)?;
            let orelse = self.expression()?;
            return Ok(Expr::Conditional {
                body: Box::new(body),
                test: Box::new(test),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn lambda_expr(&mut self) -> Result<Expr, ParseError> {
        self.bump();
        let mut params = Vec::new();
        while self.peek() != &Tok::Colon {
            let name = self.ident()?;
            let default = if self.eat(&Tok::Assign) {
                Some(self.expression()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::Colon)?;
        let body = self.expression()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn or_test(&mut self) -> Result<Expr, ParseError> {
        let first = self.and_test()?;
        if self.peek() != &Tok::KwOr {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::KwOr) {
            values.push(self.and_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn and_test(&mut self) -> Result<Expr, ParseError> {
        let first = self.not_test()?;
        if self.peek() != &Tok::KwAnd {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::KwAnd) {
            values.push(self.not_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn not_test(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Tok::KwNot) {
            let operand = self.not_test()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.bit_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::EqEq => CmpOp::Eq,
                Tok::NotEq => CmpOp::NotEq,
                Tok::Lt => CmpOp::Lt,
                Tok::Le => CmpOp::LtE,
                Tok::Gt => CmpOp::Gt,
                Tok::Ge => CmpOp::GtE,
                Tok::KwIn => CmpOp::In,
                Tok::KwNot if self.peek_ahead(1) == &Tok::KwIn => CmpOp::NotIn,
                Tok::KwIs if self.peek_ahead(1) == &Tok::KwNot => CmpOp::IsNot,
                Tok::KwIs => CmpOp::Is,
                _ => break,
            };
            self.bump();
            if matches!(op, CmpOp::NotIn | CmpOp::IsNot) {
                self.bump();
            }
            ops.push(op);
            comparators.push(self.bit_or()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
            })
        }
    }

    fn bit_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.bit_xor()?;
        while self.peek() == &Tok::Pipe {
            self.bump();
            let right = self.bit_xor()?;
            left = Expr::Binary {
                op: BinOp::BitOr,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn bit_xor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.bit_and()?;
        while self.peek() == &Tok::Caret {
            self.bump();
            let right = self.bit_and()?;
            left = Expr::Binary {
                op: BinOp::BitXor,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.shift()?;
        while self.peek() == &Tok::Amp {
            self.bump();
            let right = self.shift()?;
            left = Expr::Binary {
                op: BinOp::BitAnd,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.arith()?;
        loop {
            let op = match self.peek() {
                Tok::Shl => BinOp::Shl,
                Tok::Shr => BinOp::Shr,
                _ => break,
            };
            self.bump();
            let right = self.arith()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::DoubleSlash => BinOp::FloorDiv,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.with_depth(Self::factor_inner)
    }

    fn factor_inner(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Tok::Minus => Some(UnaryOp::Neg),
            Tok::Plus => Some(UnaryOp::Pos),
            Tok::Tilde => Some(UnaryOp::Invert),
            Tok::KwAwait => {
                self.bump();
                let operand = self.factor()?;
                return Ok(Expr::Await(Box::new(operand)));
            }
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.factor()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.atom_expr()?;
        if self.eat(&Tok::DoubleStar) {
            // Right-associative, binds tighter than unary on the left.
            let exponent = self.factor()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    /// Atom followed by call / subscript / attribute trailers.
    fn atom_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Tok::LParen => {
                    self.bump();
                    let (args, kwargs) = self.call_arguments()?;
                    self.expect(Tok::RParen)?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Tok::LBracket => {
                    self.bump();
                    let index = self.subscript()?;
                    self.expect(Tok::RBracket)?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Tok::Dot => {
                    self.bump();
                    let attr = self.ident()?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while self.peek() != &Tok::RParen {
            if matches!(self.peek(), Tok::Star | Tok::DoubleStar) {
                return Err(self.err("star arguments are not supported"));
            }
            // keyword argument: NAME '=' expr
            if let (Tok::Ident(name), Tok::Assign) =
                (self.peek().clone(), self.peek_ahead(1).clone())
            {
                self.bump();
                self.bump();
                let value = self.expression()?;
                kwargs.push((name, value));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.err("positional argument follows keyword argument"));
                }
                let value = self.expression()?;
                // Bare generator expression argument: f(x for x in xs)
                if self.peek() == &Tok::KwFor && args.is_empty() && kwargs.is_empty() {
                    let generators = self.comp_clauses()?;
                    args.push(Expr::Comprehension {
                        kind: CompKind::Generator,
                        key: None,
                        value: Box::new(value),
                        generators,
                    });
                    return Ok((args, kwargs));
                }
                args.push(value);
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn subscript(&mut self) -> Result<Expr, ParseError> {
        let lower = if matches!(self.peek(), Tok::Colon) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        if !self.eat(&Tok::Colon) {
            return Ok(*lower.ok_or_else(|| self.err("expected subscript expression"))?);
        }
        let upper = if matches!(self.peek(), Tok::Colon | Tok::RBracket) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let step = if self.eat(&Tok::Colon) {
            if self.peek() == &Tok::RBracket {
                None
            } else {
                Some(Box::new(self.expression()?))
            }
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    /// `for target in or_test [if or_test]*`, one or more clauses.
    fn comp_clauses(&mut self) -> Result<Vec<Comprehension>, ParseError> {
        let mut generators = Vec::new();
        while self.peek() == &Tok::KwFor {
            self.bump();
            let target = self.target_list()?;
            self.expect(Tok::KwIn)?;
            let iter = self.or_test()?;
            let mut conditions = Vec::new();
            while self.peek() == &Tok::KwIf {
                self.bump();
                conditions.push(self.or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        self.with_depth(Self::atom_inner)
    }

    fn atom_inner(&mut self) -> Result<Expr, ParseError> {
        match self.bump() {
            Tok::Int(v) => Ok(Expr::Literal(Literal::Int(v))),
            Tok::Float(v) => Ok(Expr::Literal(Literal::Float(v))),
            Tok::Str(s) => {
                // Adjacent string literals concatenate: 'a' 'b' == 'ab'.
                let mut text = s;
                while let Tok::Str(next) = self.peek() {
                    text.push_str(next);
                    self.bump();
                }
                Ok(Expr::Literal(Literal::Str(text)))
            }
            Tok::FString(raw_parts) => self.fstring(raw_parts),
            Tok::KwTrue => Ok(Expr::Literal(Literal::Bool(true))),
            Tok::KwFalse => Ok(Expr::Literal(Literal::Bool(false))),
            Tok::KwNone => Ok(Expr::Literal(Literal::None)),
            Tok::Ident(name) => Ok(Expr::Name(name)),
            Tok::LParen => self.paren_atom(),
            Tok::LBracket => self.list_atom(),
            Tok::LBrace => self.brace_atom(),
            other => Err(self.err(format!("unexpected {other}"))),
        }
    }

    fn fstring(&mut self, raw_parts: Vec<RawFsPart>) -> Result<Expr, ParseError> {
        let mut parts = Vec::new();
        for raw in raw_parts {
            match raw {
                RawFsPart::Lit(text) => parts.push(FStringPart::Literal(text)),
                RawFsPart::Expr(source) => {
                    let remaining = self.max_depth.saturating_sub(self.depth).max(1);
                    let program = parse_expression(&source, remaining).map_err(|e| {
                        self.err(format!("invalid expression in f-string: {}", e.message))
                    })?;
                    let expr = match program.body.into_iter().next() {
                        Some(Stmt::Expr(expr)) => expr,
                        _ => return Err(self.err("invalid expression in f-string")),
                    };
                    parts.push(FStringPart::Expr(Box::new(expr)));
                }
            }
        }
        Ok(Expr::FString(parts))
    }

    fn paren_atom(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Tok::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expression()?;
        if self.peek() == &Tok::KwFor {
            let generators = self.comp_clauses()?;
            self.expect(Tok::RParen)?;
            return Ok(Expr::Comprehension {
                kind: CompKind::Generator,
                key: None,
                value: Box::new(first),
                generators,
            });
        }
        if self.peek() == &Tok::Comma {
            let mut items = vec![first];
            while self.eat(&Tok::Comma) {
                if self.peek() == &Tok::RParen {
                    break;
                }
                items.push(self.expression()?);
            }
            self.expect(Tok::RParen)?;
            return Ok(Expr::Tuple(items));
        }
        self.expect(Tok::RParen)?;
        Ok(first)
    }

    fn list_atom(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Tok::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        if self.peek() == &Tok::KwFor {
            let generators = self.comp_clauses()?;
            self.expect(Tok::RBracket)?;
            return Ok(Expr::Comprehension {
                kind: CompKind::List,
                key: None,
                value: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.peek() == &Tok::RBracket {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect(Tok::RBracket)?;
        Ok(Expr::List(items))
    }

    fn brace_atom(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Tok::RBrace) {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat(&Tok::Colon) {
            let value = self.expression()?;
            if self.peek() == &Tok::KwFor {
                let generators = self.comp_clauses()?;
                self.expect(Tok::RBrace)?;
                return Ok(Expr::Comprehension {
                    kind: CompKind::Dict,
                    key: Some(Box::new(first)),
                    value: Box::new(value),
                    generators,
                });
            }
            let mut pairs = vec![(first, value)];
            while self.eat(&Tok::Comma) {
                if self.peek() == &Tok::RBrace {
                    break;
                }
                let k = self.expression()?;
                self.expect(Tok::Colon)?;
                let v = self.expression()?;
                pairs.push((k, v));
            }
            self.expect(Tok::RBrace)?;
            return Ok(Expr::Dict(pairs));
        }
        if self.peek() == &Tok::KwFor {
            let generators = self.comp_clauses()?;
            self.expect(Tok::RBrace)?;
            return Ok(Expr::Comprehension {
                kind: CompKind::Set,
                key: None,
                value: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.peek() == &Tok::RBrace {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect(Tok::RBrace)?;
        Ok(Expr::Set(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH: usize = 64;

    fn expr(source: &str) -> Expr {
        let program = parse_expression(source, DEPTH).unwrap();
        match program.body.into_iter().next() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression, got {other:?}"),
        }
    }

    fn stmts(source: &str) -> Vec<Stmt> {
        parse_program(source, DEPTH).unwrap().body
    }

    #[test]
    fn test_parse_mode_fallback() {
        assert_eq!(parse("1 + 1", DEPTH).unwrap().kind, ProgramKind::Expression);
        assert_eq!(parse("x = 5", DEPTH).unwrap().kind, ProgramKind::Statements);
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        match expr("1 + 2 * 3") {
            Expr::Binary { op: BinOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_power_right_associative() {
        // 2 ** 3 ** 2 parses as 2 ** (3 ** 2)
        match expr("2 ** 3 ** 2") {
            Expr::Binary { op: BinOp::Pow, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinOp::Pow, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_chained_comparison() {
        match expr("1 < x < 10") {
            Expr::Compare { ops, comparators, .. } => {
                assert_eq!(ops, vec![CmpOp::Lt, CmpOp::Lt]);
                assert_eq!(comparators.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_not_in_and_is_not() {
        match expr("x not in ys") {
            Expr::Compare { ops, .. } => assert_eq!(ops, vec![CmpOp::NotIn]),
            other => panic!("unexpected {other:?}"),
        }
        match expr("x is not None") {
            Expr::Compare { ops, .. } => assert_eq!(ops, vec![CmpOp::IsNot]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_assignment_forms() {
        match &stmts("a = b = 1")[0] {
            Stmt::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match &stmts("a, b = 1, 2")[0] {
            Stmt::Assign { targets, .. } => {
                assert!(matches!(targets[0], Target::Tuple(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &stmts("x += 1")[0] {
            Stmt::AugAssign { op, .. } => assert_eq!(*op, BinOp::Add),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let body = stmts("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3");
        match &body[0] {
            Stmt::If { orelse, .. } => match &orelse[0] {
                Stmt::If { orelse: inner, .. } => assert_eq!(inner.len(), 1),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_function_def() {
        let body = stmts("def f(a, b=2):\n    return a + b");
        match &body[0] {
            Stmt::FunctionDef(def) => {
                assert_eq!(def.name, "f");
                assert_eq!(def.params.len(), 2);
                assert!(def.params[1].default.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_comprehensions() {
        match expr("[x * 2 for x in xs if x > 0]") {
            Expr::Comprehension { kind, generators, .. } => {
                assert_eq!(kind, CompKind::List);
                assert_eq!(generators.len(), 1);
                assert_eq!(generators[0].conditions.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        match expr("{k: v for k, v in pairs}") {
            Expr::Comprehension { kind, key, .. } => {
                assert_eq!(kind, CompKind::Dict);
                assert!(key.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_generator_argument() {
        match expr("sum(x * x for x in xs)") {
            Expr::Call { args, .. } => {
                assert!(matches!(
                    args[0],
                    Expr::Comprehension {
                        kind: CompKind::Generator,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_slices() {
        match expr("xs[1:10:2]") {
            Expr::Subscript { index, .. } => {
                assert!(matches!(*index, Expr::Slice { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejectable_constructs_parse() {
        assert!(matches!(&stmts("import os")[0], Stmt::Import { .. }));
        assert!(matches!(
            &stmts("from os import path")[0],
            Stmt::ImportFrom { .. }
        ));
        assert!(matches!(&stmts("del x")[0], Stmt::Delete(_)));
        assert!(matches!(&stmts("global x")[0], Stmt::Global(_)));
        assert!(matches!(&stmts("class C:\n    pass")[0], Stmt::ClassDef { .. }));
        assert!(matches!(
            &stmts("async def f():\n    pass")[0],
            Stmt::AsyncFunctionDef(_)
        ));
        assert!(matches!(expr("lambda x: x"), Expr::Lambda { .. }));
    }

    #[test]
    fn test_fstring_expression() {
        match expr(r#"f"val={x + 1}""#) {
            Expr::FString(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[1], FStringPart::Expr(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_conditional_expression() {
        assert!(matches!(expr("1 if x else 2"), Expr::Conditional { .. }));
    }

    #[test]
    fn test_depth_cap() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse_expression(&deep, 64).unwrap_err();
        assert!(err.message.contains("nesting too deep"));
    }

    #[test]
    fn test_semicolons() {
        assert_eq!(stmts("x = 1; y = 2").len(), 2);
    }

    #[test]
    fn test_syntax_error_not_panicking() {
        assert!(parse("def def def", DEPTH).is_err());
        assert!(parse("x ===== 1", DEPTH).is_err());
        assert!(parse("", DEPTH).is_err());
    }
}
