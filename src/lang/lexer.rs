//! Hand-written tokenizer for the Python subset.
//!
//! Produces a flat token stream with synthesized `Indent`/`Dedent` tokens so
//! the parser can treat block structure like ordinary delimiters. Newlines
//! are suppressed inside brackets (implicit line joining) and after a
//! backslash continuation, as in Python.

use std::fmt;

/// A token with its source position (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Tok,
    pub line: u32,
    pub col: u32,
}

/// Raw f-string piece: literal text, or the source text of an embedded
/// expression (parsed later by the parser).
#[derive(Debug, Clone, PartialEq)]
pub enum RawFsPart {
    Lit(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    FString(Vec<RawFsPart>),

    Newline,
    Indent,
    Dedent,
    Eof,

    // Keywords.
    KwAnd,
    KwOr,
    KwNot,
    KwIf,
    KwElif,
    KwElse,
    KwWhile,
    KwFor,
    KwIn,
    KwBreak,
    KwContinue,
    KwPass,
    KwDef,
    KwReturn,
    KwDel,
    KwImport,
    KwFrom,
    KwAs,
    KwGlobal,
    KwNonlocal,
    KwClass,
    KwLambda,
    KwAsync,
    KwAwait,
    KwYield,
    KwIs,
    KwTrue,
    KwFalse,
    KwNone,

    // Operators and delimiters.
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Pipe,
    Caret,
    Amp,
    Shl,
    Shr,
    Tilde,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    DoubleSlashEq,
    PercentEq,
    DoubleStarEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Ident(name) => write!(f, "identifier '{name}'"),
            Tok::Int(v) => write!(f, "integer {v}"),
            Tok::Float(v) => write!(f, "float {v}"),
            Tok::Str(_) => write!(f, "string literal"),
            Tok::FString(_) => write!(f, "f-string"),
            Tok::Newline => write!(f, "newline"),
            Tok::Indent => write!(f, "indent"),
            Tok::Dedent => write!(f, "dedent"),
            Tok::Eof => write!(f, "end of input"),
            other => write!(f, "'{}'", other.lexeme()),
        }
    }
}

impl Tok {
    fn lexeme(&self) -> &'static str {
        match self {
            Tok::KwAnd => "and",
            Tok::KwOr => "or",
            Tok::KwNot => "not",
            Tok::KwIf => "if",
            Tok::KwElif => "elif",
            Tok::KwElse => "else",
            Tok::KwWhile => "while",
            Tok::KwFor => "for",
            Tok::KwIn => "in",
            Tok::KwBreak => "break",
            Tok::KwContinue => "continue",
            Tok::KwPass => "pass",
            Tok::KwDef => "def",
            Tok::KwReturn => "return",
            Tok::KwDel => "del",
            Tok::KwImport => "import",
            Tok::KwFrom => "from",
            Tok::KwAs => "as",
            Tok::KwGlobal => "global",
            Tok::KwNonlocal => "nonlocal",
            Tok::KwClass => "class",
            Tok::KwLambda => "lambda",
            Tok::KwAsync => "async",
            Tok::KwAwait => "await",
            Tok::KwYield => "yield",
            Tok::KwIs => "is",
            Tok::KwTrue => "True",
            Tok::KwFalse => "False",
            Tok::KwNone => "None",
            Tok::Plus => "+",
            Tok::Minus => "-",
            Tok::Star => "*",
            Tok::DoubleStar => "**",
            Tok::Slash => "/",
            Tok::DoubleSlash => "//",
            Tok::Percent => "%",
            Tok::Pipe => "|",
            Tok::Caret => "^",
            Tok::Amp => "&",
            Tok::Shl => "<<",
            Tok::Shr => ">>",
            Tok::Tilde => "~",
            Tok::Lt => "<",
            Tok::Gt => ">",
            Tok::Le => "<=",
            Tok::Ge => ">=",
            Tok::EqEq => "==",
            Tok::NotEq => "!=",
            Tok::Assign => "=",
            Tok::PlusEq => "+=",
            Tok::MinusEq => "-=",
            Tok::StarEq => "*=",
            Tok::SlashEq => "/=",
            Tok::DoubleSlashEq => "//=",
            Tok::PercentEq => "%=",
            Tok::DoubleStarEq => "**=",
            Tok::AmpEq => "&=",
            Tok::PipeEq => "|=",
            Tok::CaretEq => "^=",
            Tok::ShlEq => "<<=",
            Tok::ShrEq => ">>=",
            Tok::LParen => "(",
            Tok::RParen => ")",
            Tok::LBracket => "[",
            Tok::RBracket => "]",
            Tok::LBrace => "{",
            Tok::RBrace => "}",
            Tok::Comma => ",",
            Tok::Colon => ":",
            Tok::Dot => ".",
            Tok::Semicolon => ";",
            _ => "",
        }
    }
}

/// Tokenization failure with position.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

fn keyword(name: &str) -> Option<Tok> {
    Some(match name {
        "and" => Tok::KwAnd,
        "or" => Tok::KwOr,
        "not" => Tok::KwNot,
        "if" => Tok::KwIf,
        "elif" => Tok::KwElif,
        "else" => Tok::KwElse,
        "while" => Tok::KwWhile,
        "for" => Tok::KwFor,
        "in" => Tok::KwIn,
        "break" => Tok::KwBreak,
        "continue" => Tok::KwContinue,
        "pass" => Tok::KwPass,
        "def" => Tok::KwDef,
        "return" => Tok::KwReturn,
        "del" => Tok::KwDel,
        "import" => Tok::KwImport,
        "from" => Tok::KwFrom,
        "as" => Tok::KwAs,
        "global" => Tok::KwGlobal,
        "nonlocal" => Tok::KwNonlocal,
        "class" => Tok::KwClass,
        "lambda" => Tok::KwLambda,
        "async" => Tok::KwAsync,
        "await" => Tok::KwAwait,
        "yield" => Tok::KwYield,
        "is" => Tok::KwIs,
        "True" => Tok::KwTrue,
        "False" => Tok::KwFalse,
        "None" => Tok::KwNone,
        _ => return None,
    })
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    bracket_depth: usize,
    indent_stack: Vec<usize>,
    tokens: Vec<Token>,
    at_line_start: bool,
}

/// Tokenize `source` into a stream ending with `Tok::Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
        bracket_depth: 0,
        indent_stack: vec![0],
        tokens: Vec::new(),
        at_line_start: true,
    };
    lexer.run()
}

impl Lexer {
    fn err(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: self.line,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: Tok) {
        self.tokens.push(Token {
            kind,
            line: self.line,
            col: self.col,
        });
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.bracket_depth == 0 {
                self.handle_indentation()?;
                if self.pos >= self.chars.len() {
                    break;
                }
            }
            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };
            match c {
                ' ' | '\t' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    if self.bracket_depth == 0 {
                        self.end_logical_line();
                    }
                }
                '\\' => {
                    // Explicit line continuation.
                    self.bump();
                    match self.peek() {
                        Some('\r') => {
                            self.bump();
                            if self.peek() == Some('\n') {
                                self.bump();
                            }
                        }
                        Some('\n') => {
                            self.bump();
                        }
                        _ => return Err(self.err("unexpected character after line continuation")),
                    }
                }
                '\'' | '"' => self.lex_string(false)?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek2().is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
                c if c.is_alphabetic() || c == '_' => self.lex_ident_or_prefixed_string()?,
                _ => self.lex_operator()?,
            }
        }

        // Close the final logical line and any open blocks.
        if self.bracket_depth == 0 {
            self.end_logical_line();
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    /// Measure leading whitespace of a fresh logical line and emit
    /// Indent/Dedent tokens. Blank and comment-only lines are skipped.
    fn handle_indentation(&mut self) -> Result<(), LexError> {
        loop {
            let mut width = 0usize;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => {
                        width += 1;
                        self.bump();
                    }
                    '\t' => {
                        width += 8 - (width % 8);
                        self.bump();
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // Blank or comment-only line: consume and retry.
                Some('\n') => {
                    self.bump();
                    continue;
                }
                Some('\r') => {
                    self.bump();
                    continue;
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                    continue;
                }
                None => {
                    self.at_line_start = false;
                    return Ok(());
                }
                Some(_) => {
                    let current = *self.indent_stack.last().unwrap_or(&0);
                    if width > current {
                        self.indent_stack.push(width);
                        self.push(Tok::Indent);
                    } else if width < current {
                        while *self.indent_stack.last().unwrap_or(&0) > width {
                            self.indent_stack.pop();
                            self.push(Tok::Dedent);
                        }
                        if *self.indent_stack.last().unwrap_or(&0) != width {
                            return Err(self.err("unindent does not match any outer level"));
                        }
                    }
                    self.at_line_start = false;
                    return Ok(());
                }
            }
        }
    }

    fn end_logical_line(&mut self) {
        // Suppress empty Newline tokens (blank lines, trailing newline).
        if matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(Tok::Newline) | Some(Tok::Indent) | Some(Tok::Dedent) | None
        ) {
            self.at_line_start = true;
            return;
        }
        self.push(Tok::Newline);
        self.at_line_start = true;
    }

    fn lex_ident_or_prefixed_string(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        // String prefixes: f"..." (interpolated) and r"..." (raw).
        if matches!(self.peek(), Some('\'') | Some('"')) {
            match name.as_str() {
                "f" | "F" => return self.lex_string(true),
                "r" | "R" => return self.lex_raw_string(),
                _ => {
                    return Err(self.err(format!("unsupported string prefix '{name}'")));
                }
            }
        }

        match keyword(&name) {
            Some(kw) => self.push(kw),
            None => self.push(Tok::Ident(name)),
        }
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        let start = self.pos;

        // Radix literals.
        if self.peek() == Some('0') {
            let radix = match self.peek2() {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let digits_start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        self.bump();
                    } else {
                        break;
                    }
                }
                let digits: String = self.chars[digits_start..self.pos]
                    .iter()
                    .filter(|c| **c != '_')
                    .collect();
                if digits.is_empty() {
                    return Err(self.err("invalid numeric literal"));
                }
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|_| self.err("integer literal out of range"))?;
                self.push(Tok::Int(value));
                return Ok(());
            }
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek2().map_or(true, |c| c != '.') {
            is_float = true;
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.pos + 1;
            if matches!(self.chars.get(lookahead), Some('+') | Some('-')) {
                lookahead += 1;
            }
            if self
                .chars
                .get(lookahead)
                .is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.err("invalid float literal"))?;
            self.push(Tok::Float(value));
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.err("integer literal out of range"))?;
            self.push(Tok::Int(value));
        }
        Ok(())
    }

    /// Consume an opening quote, returning (quote char, triple?).
    fn open_quote(&mut self) -> (char, bool) {
        let quote = self.bump().unwrap_or('"');
        if self.peek() == Some(quote) && self.peek2() == Some(quote) {
            self.bump();
            self.bump();
            (quote, true)
        } else {
            (quote, false)
        }
    }

    fn at_close_quote(&mut self, quote: char, triple: bool) -> bool {
        if triple {
            self.peek() == Some(quote)
                && self.peek2() == Some(quote)
                && self.chars.get(self.pos + 2) == Some(&quote)
        } else {
            self.peek() == Some(quote)
        }
    }

    fn consume_close_quote(&mut self, triple: bool) {
        self.bump();
        if triple {
            self.bump();
            self.bump();
        }
    }

    fn lex_raw_string(&mut self) -> Result<(), LexError> {
        let (quote, triple) = self.open_quote();
        let mut text = String::new();
        loop {
            if self.at_close_quote(quote, triple) {
                self.consume_close_quote(triple);
                break;
            }
            match self.peek() {
                None => return Err(self.err("unterminated string literal")),
                Some('\n') if !triple => return Err(self.err("unterminated string literal")),
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        self.push(Tok::Str(text));
        Ok(())
    }

    fn lex_string(&mut self, interpolated: bool) -> Result<(), LexError> {
        let (quote, triple) = self.open_quote();
        let mut parts: Vec<RawFsPart> = Vec::new();
        let mut text = String::new();
        loop {
            if self.at_close_quote(quote, triple) {
                self.consume_close_quote(triple);
                break;
            }
            let c = match self.peek() {
                Some(c) => c,
                None => return Err(self.err("unterminated string literal")),
            };
            match c {
                '\n' if !triple => return Err(self.err("unterminated string literal")),
                '\\' => {
                    self.bump();
                    let esc = self
                        .bump()
                        .ok_or_else(|| self.err("unterminated string literal"))?;
                    match esc {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '0' => text.push('\0'),
                        '\\' => text.push('\\'),
                        '\'' => text.push('\''),
                        '"' => text.push('"'),
                        '\n' => {}
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                }
                '{' if interpolated => {
                    if self.peek2() == Some('{') {
                        self.bump();
                        self.bump();
                        text.push('{');
                        continue;
                    }
                    self.bump();
                    if !text.is_empty() {
                        parts.push(RawFsPart::Lit(std::mem::take(&mut text)));
                    }
                    let expr = self.lex_fstring_expr(quote)?;
                    parts.push(RawFsPart::Expr(expr));
                }
                '}' if interpolated => {
                    if self.peek2() == Some('}') {
                        self.bump();
                        self.bump();
                        text.push('}');
                        continue;
                    }
                    return Err(self.err("single '}' is not allowed in f-string"));
                }
                c => {
                    text.push(c);
                    self.bump();
                }
            }
        }

        if interpolated {
            if !text.is_empty() {
                parts.push(RawFsPart::Lit(text));
            }
            self.push(Tok::FString(parts));
        } else {
            self.push(Tok::Str(text));
        }
        Ok(())
    }

    /// Collect the raw source of one `{...}` interpolation.
    fn lex_fstring_expr(&mut self, quote: char) -> Result<String, LexError> {
        let mut depth = 0usize;
        let mut expr = String::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => return Err(self.err("unterminated expression in f-string")),
            };
            match c {
                '{' | '[' | '(' => {
                    depth += 1;
                    expr.push(c);
                    self.bump();
                }
                '}' if depth == 0 => {
                    self.bump();
                    if expr.trim().is_empty() {
                        return Err(self.err("empty expression in f-string"));
                    }
                    return Ok(expr);
                }
                '}' | ']' | ')' => {
                    depth = depth.saturating_sub(1);
                    expr.push(c);
                    self.bump();
                }
                ':' | '!' if depth == 0 => {
                    return Err(self.err("format specifiers are not supported in f-strings"));
                }
                c if c == quote => {
                    return Err(self.err("quote character inside f-string expression"));
                }
                '\n' => return Err(self.err("unterminated expression in f-string")),
                c => {
                    expr.push(c);
                    self.bump();
                }
            }
        }
    }

    fn lex_operator(&mut self) -> Result<(), LexError> {
        let c = self.bump().unwrap_or('\0');
        let next = self.peek();
        let kind = match (c, next) {
            ('*', Some('*')) => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::DoubleStarEq
                } else {
                    Tok::DoubleStar
                }
            }
            ('/', Some('/')) => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::DoubleSlashEq
                } else {
                    Tok::DoubleSlash
                }
            }
            ('<', Some('<')) => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::ShlEq
                } else {
                    Tok::Shl
                }
            }
            ('>', Some('>')) => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::ShrEq
                } else {
                    Tok::Shr
                }
            }
            ('<', Some('=')) => {
                self.bump();
                Tok::Le
            }
            ('>', Some('=')) => {
                self.bump();
                Tok::Ge
            }
            ('=', Some('=')) => {
                self.bump();
                Tok::EqEq
            }
            ('!', Some('=')) => {
                self.bump();
                Tok::NotEq
            }
            ('+', Some('=')) => {
                self.bump();
                Tok::PlusEq
            }
            ('-', Some('=')) => {
                self.bump();
                Tok::MinusEq
            }
            ('*', Some('=')) => {
                self.bump();
                Tok::StarEq
            }
            ('/', Some('=')) => {
                self.bump();
                Tok::SlashEq
            }
            ('%', Some('=')) => {
                self.bump();
                Tok::PercentEq
            }
            ('&', Some('=')) => {
                self.bump();
                Tok::AmpEq
            }
            ('|', Some('=')) => {
                self.bump();
                Tok::PipeEq
            }
            ('^', Some('=')) => {
                self.bump();
                Tok::CaretEq
            }
            ('+', _) => Tok::Plus,
            ('-', _) => Tok::Minus,
            ('*', _) => Tok::Star,
            ('/', _) => Tok::Slash,
            ('%', _) => Tok::Percent,
            ('|', _) => Tok::Pipe,
            ('^', _) => Tok::Caret,
            ('&', _) => Tok::Amp,
            ('~', _) => Tok::Tilde,
            ('<', _) => Tok::Lt,
            ('>', _) => Tok::Gt,
            ('=', _) => Tok::Assign,
            ('(', _) => {
                self.bracket_depth += 1;
                Tok::LParen
            }
            (')', _) => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Tok::RParen
            }
            ('[', _) => {
                self.bracket_depth += 1;
                Tok::LBracket
            }
            (']', _) => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Tok::RBracket
            }
            ('{', _) => {
                self.bracket_depth += 1;
                Tok::LBrace
            }
            ('}', _) => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                Tok::RBrace
            }
            (',', _) => Tok::Comma,
            (':', _) => Tok::Colon,
            ('.', _) => Tok::Dot,
            (';', _) => Tok::Semicolon,
            (c, _) => return Err(self.err(format!("unexpected character '{c}'"))),
        };
        self.push(kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_expression() {
        assert_eq!(
            kinds("1 + 2"),
            vec![Tok::Int(1), Tok::Plus, Tok::Int(2), Tok::Newline, Tok::Eof]
        );
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("while xs"),
            vec![
                Tok::KwWhile,
                Tok::Ident("xs".into()),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_indentation_blocks() {
        let toks = kinds("if x:\n    y = 1\nz = 2");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
    }

    #[test]
    fn test_implicit_line_joining() {
        let toks = kinds("[1,\n 2,\n 3]");
        // No Newline/Indent tokens inside the bracketed expression.
        let newline_count = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newline_count, 1);
        assert!(!toks.contains(&Tok::Indent));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'a\nb'"#),
            vec![Tok::Str("a\nb".into()), Tok::Newline, Tok::Eof]
        );
    }

    #[test]
    fn test_fstring_parts() {
        let toks = kinds(r#"f"x={x}!""#);
        match &toks[0] {
            Tok::FString(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], RawFsPart::Lit("x=".into()));
                assert_eq!(parts[1], RawFsPart::Expr("x".into()));
                assert_eq!(parts[2], RawFsPart::Lit("!".into()));
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn test_fstring_brace_escape() {
        let toks = kinds(r#"f"{{literal}}""#);
        match &toks[0] {
            Tok::FString(parts) => {
                assert_eq!(parts, &vec![RawFsPart::Lit("{literal}".into())]);
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn test_radix_literals() {
        assert_eq!(
            kinds("0xff 0b101 0o17"),
            vec![
                Tok::Int(255),
                Tok::Int(5),
                Tok::Int(15),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_float_forms() {
        assert_eq!(
            kinds("1.5 2e3 .25"),
            vec![
                Tok::Float(1.5),
                Tok::Float(2000.0),
                Tok::Float(0.25),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_comments_ignored() {
        assert_eq!(
            kinds("x = 1  # set x\n# whole line\ny = 2"),
            vec![
                Tok::Ident("x".into()),
                Tok::Assign,
                Tok::Int(1),
                Tok::Newline,
                Tok::Ident("y".into()),
                Tok::Assign,
                Tok::Int(2),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_bad_dedent_rejected() {
        let err = tokenize("if x:\n    y = 1\n  z = 2").unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("'abc").is_err());
    }

    #[test]
    fn test_integer_overflow_literal() {
        assert!(tokenize("99999999999999999999999").is_err());
    }
}
