//! Syntax tree for the sandboxed Python subset.
//!
//! The tree is fully owned (`Box`/`Vec`/`String`, no interning) and carries
//! every construct the parser understands, including constructs that exist
//! only so the policy validator can reject them with a precise reason
//! instead of a generic syntax error (`import`, `class`, `lambda`, ...).

/// A parsed program: either a single isolated expression or a sequence of
/// statements. The distinction decides whether the run produces a terminal
/// value.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
    pub kind: ProgramKind,
}

/// Which parse mode produced the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// A lone expression; its value is the run's terminal value.
    Expression,
    /// A statement sequence; the run has no terminal value.
    Statements,
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `a = b = value`: one value, one or more targets.
    Assign { targets: Vec<Target>, value: Expr },
    /// `target op= value`.
    AugAssign { target: Target, op: BinOp, value: Expr },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While { test: Expr, body: Vec<Stmt> },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    FunctionDef(FunctionDef),
    Return(Option<Expr>),
    Break,
    Continue,
    Pass,

    // Parsed only so the validator can name the violated rule.
    Delete(Vec<Target>),
    Import { names: Vec<String> },
    ImportFrom { module: String, names: Vec<String> },
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    ClassDef { name: String, body: Vec<Stmt> },
    AsyncFunctionDef(FunctionDef),
}

/// A `def` body. Also the persisted form of a user function, so it must stay
/// free of interior mutability (`Send + Sync`).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

/// One function parameter with an optional default expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// Assignment targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    /// `a, b = ...` / `(a, b) = ...` / `[a, b] = ...`
    Tuple(Vec<Target>),
    Subscript { value: Expr, index: Expr },
    Attribute { value: Expr, attr: String },
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    /// f-string: alternating literal text and interpolated expressions.
    FString(Vec<FStringPart>),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    /// Insertion-ordered key/value pairs.
    Dict(Vec<(Expr, Expr)>),
    Set(Vec<Expr>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `and` / `or` over two or more values, short-circuiting.
    BoolOp { op: BoolOp, values: Vec<Expr> },
    /// Chained comparison: `left ops[0] comparators[0] ops[1] ...`.
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    /// Only valid as a subscript index: `a[lower:upper:step]`.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    /// `body if test else orelse`.
    Conditional {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    Comprehension {
        kind: CompKind,
        /// Key expression for dict comprehensions, `None` otherwise.
        key: Option<Box<Expr>>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },

    // Parsed only for the validator.
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
}

/// Literal values as they appear in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Expr(Box<Expr>),
}

/// One `for target in iter [if cond]*` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Target,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

/// Comprehension flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompKind {
    List,
    Set,
    Dict,
    /// Generator expressions are evaluated eagerly into a list.
    Generator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
}

impl BinOp {
    /// Operator spelling for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}
