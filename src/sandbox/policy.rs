//! Static policy validation of parsed code.
//!
//! A pure tree walk over the AST, run before anything executes. The walk
//! early-exits on the first violation and never evaluates any part of the
//! input. The deny sets are the conservative union of every allow/deny list
//! the original REPL shipped over its lifetime, plus an unconditional ban on
//! reflection-style dunder attributes.

use tracing::debug;

use crate::lang::ast::*;

/// A named policy violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The violated rule, human readable ("import statement",
    /// "attribute '__class__'", ...).
    pub rule: String,
}

impl Violation {
    fn new(rule: impl Into<String>) -> Self {
        Violation { rule: rule.into() }
    }
}

/// Lexically nested loop constructs allowed (loops and comprehensions).
const MAX_NESTED_LOOPS: usize = 3;

/// Generator clauses allowed inside a single comprehension.
const MAX_COMPREHENSION_CLAUSES: usize = 2;

/// Reflection attributes that enable sandbox escape, denied unconditionally.
const DENIED_ATTRIBUTES: &[&str] = &[
    "__globals__",
    "__builtins__",
    "__code__",
    "__getattribute__",
    "__class__",
    "__bases__",
    "__mro__",
    "__subclasses__",
    "__init__",
    "__new__",
    "__del__",
    "__dict__",
    "__closure__",
    "__self__",
    "__func__",
    "__import__",
    "__reduce__",
    "__reduce_ex__",
    "__repr__",
    "__str__",
];

/// Dunder attributes considered harmless.
const ALLOWED_DUNDER_ATTRIBUTES: &[&str] = &["__doc__", "__name__"];

/// Capability-granting call targets, denied whether reached as a bare name
/// or as an attribute.
const DENIED_CALLS: &[&str] = &[
    // dynamic evaluation / compilation
    "eval",
    "exec",
    "compile",
    "__import__",
    // file / process / network access
    "open",
    "system",
    "popen",
    "spawn",
    "fork",
    "kill",
    "remove",
    "unlink",
    "rmdir",
    "connect",
    "socket",
    // environment and interpreter introspection
    "globals",
    "locals",
    "vars",
    "dir",
    "getattr",
    "setattr",
    "delattr",
    "hasattr",
    "type",
    "super",
    "object",
    "memoryview",
    "classmethod",
    "staticmethod",
    "property",
    "environ",
    "getenv",
    "putenv",
    // interactive input and session control
    "input",
    "breakpoint",
    "exit",
    "quit",
    "help",
];

/// Substrings scanned for inside string literals. Best-effort only: this
/// catches trivially obfuscated escape attempts, it is not a security
/// boundary.
const DENIED_LITERAL_SUBSTRINGS: &[&str] = &[
    "__import__",
    "__globals__",
    "__builtins__",
    "__subclasses__",
    "eval(",
    "exec(",
    "subprocess",
    "os.system",
];

/// Validate a parsed program against the sandbox policy.
pub fn validate(program: &Program) -> Result<(), Violation> {
    let result = program
        .body
        .iter()
        .try_for_each(|stmt| check_stmt(stmt, 0));
    if let Err(violation) = &result {
        debug!(rule = %violation.rule, "policy rejected submitted code");
    }
    result
}

fn check_stmt(stmt: &Stmt, loop_depth: usize) -> Result<(), Violation> {
    match stmt {
        Stmt::Expr(e) => check_expr(e, loop_depth),
        Stmt::Assign { targets, value } => {
            targets
                .iter()
                .try_for_each(|t| check_target(t, loop_depth))?;
            check_expr(value, loop_depth)
        }
        Stmt::AugAssign { target, value, .. } => {
            check_target(target, loop_depth)?;
            check_expr(value, loop_depth)
        }
        Stmt::If { test, body, orelse } => {
            check_expr(test, loop_depth)?;
            body.iter().try_for_each(|s| check_stmt(s, loop_depth))?;
            orelse.iter().try_for_each(|s| check_stmt(s, loop_depth))
        }
        Stmt::While { test, body } => {
            let depth = enter_loop(loop_depth)?;
            check_expr(test, loop_depth)?;
            body.iter().try_for_each(|s| check_stmt(s, depth))
        }
        Stmt::For { target, iter, body } => {
            let depth = enter_loop(loop_depth)?;
            check_target(target, loop_depth)?;
            check_expr(iter, loop_depth)?;
            body.iter().try_for_each(|s| check_stmt(s, depth))
        }
        Stmt::FunctionDef(def) => check_function_def(def, loop_depth),
        Stmt::Return(value) => value
            .as_ref()
            .map_or(Ok(()), |e| check_expr(e, loop_depth)),
        Stmt::Break | Stmt::Continue | Stmt::Pass => Ok(()),

        Stmt::Delete(_) => Err(Violation::new("del statement")),
        Stmt::Import { .. } | Stmt::ImportFrom { .. } => {
            Err(Violation::new("import statement"))
        }
        Stmt::Global(_) => Err(Violation::new("global statement")),
        Stmt::Nonlocal(_) => Err(Violation::new("nonlocal statement")),
        Stmt::ClassDef { .. } => Err(Violation::new("class definition")),
        Stmt::AsyncFunctionDef(_) => Err(Violation::new("async function definition")),
    }
}

fn check_function_def(def: &FunctionDef, loop_depth: usize) -> Result<(), Violation> {
    for param in &def.params {
        if let Some(default) = &param.default {
            check_expr(default, loop_depth)?;
        }
    }
    // Loop nesting is a lexical property; a def inside a loop still counts
    // its own loops from the enclosing depth.
    def.body
        .iter()
        .try_for_each(|s| check_stmt(s, loop_depth))
}

fn check_target(target: &Target, loop_depth: usize) -> Result<(), Violation> {
    match target {
        Target::Name(_) => Ok(()),
        Target::Tuple(items) => items
            .iter()
            .try_for_each(|t| check_target(t, loop_depth)),
        Target::Subscript { value, index } => {
            check_expr(value, loop_depth)?;
            check_expr(index, loop_depth)
        }
        Target::Attribute { value, attr } => {
            check_attribute_name(attr)?;
            check_expr(value, loop_depth)
        }
    }
}

fn enter_loop(loop_depth: usize) -> Result<usize, Violation> {
    if loop_depth + 1 > MAX_NESTED_LOOPS {
        return Err(Violation::new(format!(
            "more than {MAX_NESTED_LOOPS} nested loops"
        )));
    }
    Ok(loop_depth + 1)
}

fn check_attribute_name(attr: &str) -> Result<(), Violation> {
    if DENIED_ATTRIBUTES.contains(&attr) {
        return Err(Violation::new(format!("attribute '{attr}'")));
    }
    let is_dunder = attr.starts_with("__") && attr.ends_with("__") && attr.len() > 4;
    if is_dunder && !ALLOWED_DUNDER_ATTRIBUTES.contains(&attr) {
        return Err(Violation::new(format!("attribute '{attr}'")));
    }
    Ok(())
}

fn check_call_target(func: &Expr) -> Result<(), Violation> {
    let name = match func {
        Expr::Name(name) => name.as_str(),
        Expr::Attribute { attr, .. } => attr.as_str(),
        _ => return Ok(()),
    };
    if DENIED_CALLS.contains(&name) {
        return Err(Violation::new(format!("call to '{name}'")));
    }
    Ok(())
}

fn check_literal(text: &str) -> Result<(), Violation> {
    for banned in DENIED_LITERAL_SUBSTRINGS {
        if text.contains(banned) {
            return Err(Violation::new(format!(
                "string literal containing '{banned}'"
            )));
        }
    }
    Ok(())
}

fn check_expr(expr: &Expr, loop_depth: usize) -> Result<(), Violation> {
    match expr {
        Expr::Literal(Literal::Str(s)) => check_literal(s),
        Expr::Literal(_) | Expr::Name(_) => Ok(()),
        Expr::FString(parts) => parts.iter().try_for_each(|part| match part {
            FStringPart::Literal(s) => check_literal(s),
            FStringPart::Expr(e) => check_expr(e, loop_depth),
        }),
        Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
            items.iter().try_for_each(|e| check_expr(e, loop_depth))
        }
        Expr::Dict(pairs) => pairs.iter().try_for_each(|(k, v)| {
            check_expr(k, loop_depth)?;
            check_expr(v, loop_depth)
        }),
        Expr::Unary { operand, .. } => check_expr(operand, loop_depth),
        Expr::Binary { left, right, .. } => {
            check_expr(left, loop_depth)?;
            check_expr(right, loop_depth)
        }
        Expr::BoolOp { values, .. } => {
            values.iter().try_for_each(|e| check_expr(e, loop_depth))
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            check_expr(left, loop_depth)?;
            comparators
                .iter()
                .try_for_each(|e| check_expr(e, loop_depth))
        }
        Expr::Call { func, args, kwargs } => {
            check_call_target(func)?;
            check_expr(func, loop_depth)?;
            args.iter().try_for_each(|e| check_expr(e, loop_depth))?;
            kwargs
                .iter()
                .try_for_each(|(_, e)| check_expr(e, loop_depth))
        }
        Expr::Attribute { value, attr } => {
            check_attribute_name(attr)?;
            check_expr(value, loop_depth)
        }
        Expr::Subscript { value, index } => {
            check_expr(value, loop_depth)?;
            check_expr(index, loop_depth)
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                check_expr(part, loop_depth)?;
            }
            Ok(())
        }
        Expr::Conditional { body, test, orelse } => {
            check_expr(test, loop_depth)?;
            check_expr(body, loop_depth)?;
            check_expr(orelse, loop_depth)
        }
        Expr::Comprehension {
            key,
            value,
            generators,
            ..
        } => {
            if generators.len() > MAX_COMPREHENSION_CLAUSES {
                return Err(Violation::new(format!(
                    "more than {MAX_COMPREHENSION_CLAUSES} generator clauses in a comprehension"
                )));
            }
            let depth = enter_loop(loop_depth)?;
            for generator in generators {
                check_target(&generator.target, depth)?;
                check_expr(&generator.iter, depth)?;
                generator
                    .conditions
                    .iter()
                    .try_for_each(|e| check_expr(e, depth))?;
            }
            if let Some(key) = key {
                check_expr(key, depth)?;
            }
            check_expr(value, depth)
        }

        Expr::Lambda { .. } => Err(Violation::new("lambda expression")),
        Expr::Await(_) => Err(Violation::new("await expression")),
        Expr::Yield(_) | Expr::YieldFrom(_) => Err(Violation::new("yield expression")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse;

    fn check(source: &str) -> Result<(), Violation> {
        let program = parse(source, 64).expect("test source must parse");
        validate(&program)
    }

    fn rejected(source: &str) -> String {
        check(source).expect_err("expected rejection").rule
    }

    #[test]
    fn test_accepts_plain_code() {
        assert!(check("x = 5").is_ok());
        assert!(check("sum(i * i for i in range(10))").is_ok());
        assert!(check("def f(a, b=1):\n    return a + b").is_ok());
        assert!(check("{k: v for k, v in pairs}").is_ok());
    }

    #[test]
    fn test_rejects_denied_statements() {
        assert_eq!(rejected("import os"), "import statement");
        assert_eq!(rejected("from os import path"), "import statement");
        assert_eq!(rejected("del x"), "del statement");
        assert_eq!(rejected("global x"), "global statement");
        assert_eq!(rejected("class C:\n    pass"), "class definition");
        assert_eq!(
            rejected("async def f():\n    pass"),
            "async function definition"
        );
    }

    #[test]
    fn test_rejects_denied_expressions() {
        assert_eq!(rejected("f = lambda x: x"), "lambda expression");
        assert!(rejected("def g():\n    yield 1").contains("yield"));
    }

    #[test]
    fn test_rejects_reflection_attributes() {
        assert_eq!(rejected("x.__class__"), "attribute '__class__'");
        // Outermost attribute of a chain is the first one seen.
        assert_eq!(
            rejected("().__class__.__bases__"),
            "attribute '__bases__'"
        );
        assert_eq!(rejected("f.__globals__"), "attribute '__globals__'");
        // Unlisted dunders are rejected too.
        assert_eq!(rejected("x.__weakref__"), "attribute '__weakref__'");
    }

    #[test]
    fn test_allows_harmless_dunders() {
        assert!(check("f.__name__").is_ok());
        assert!(check("f.__doc__").is_ok());
    }

    #[test]
    fn test_rejects_denied_calls() {
        assert_eq!(rejected("eval('1+1')"), "call to 'eval'");
        assert_eq!(rejected("exec('x = 1')"), "call to 'exec'");
        assert_eq!(rejected("open('/etc/passwd')"), "call to 'open'");
        assert_eq!(rejected("input()"), "call to 'input'");
        assert_eq!(rejected("getattr(x, 'y')"), "call to 'getattr'");
        assert_eq!(rejected("os.system('ls')"), "call to 'system'");
        assert_eq!(rejected("type(x)"), "call to 'type'");
    }

    #[test]
    fn test_rejection_before_any_effect_in_mixed_code() {
        // The denied construct is buried after harmless statements; the
        // validator still rejects the whole program.
        assert_eq!(
            rejected("x = 1\ny = 2\nimport os\nz = 3"),
            "import statement"
        );
    }

    #[test]
    fn test_nested_loop_ceiling() {
        let ok = "for a in x:\n    for b in y:\n        for c in z:\n            pass";
        assert!(check(ok).is_ok());
        let too_deep = "for a in x:\n    for b in y:\n        for c in z:\n            for d in w:\n                pass";
        assert!(rejected(too_deep).contains("nested loops"));
    }

    #[test]
    fn test_comprehension_counts_toward_nesting() {
        let mixed = "for a in x:\n    for b in y:\n        for c in z:\n            q = [i for i in c]";
        assert!(rejected(mixed).contains("nested loops"));
    }

    #[test]
    fn test_comprehension_clause_ceiling() {
        assert!(check("[i * j for i in x for j in y]").is_ok());
        assert!(
            rejected("[i for i in x for j in y for k in z]").contains("generator clauses")
        );
    }

    #[test]
    fn test_literal_substring_heuristic() {
        assert!(rejected("s = '__import__'").contains("string literal"));
        assert!(rejected("s = 'run eval(code)'").contains("string literal"));
        assert!(check("s = 'evaluation'").is_ok());
    }

    #[test]
    fn test_denied_call_via_attribute_chain() {
        assert_eq!(rejected("socket.socket()"), "call to 'socket'");
        assert_eq!(rejected("sub.popen('ls')"), "call to 'popen'");
    }

    #[test]
    fn test_attribute_assignment_checked() {
        assert_eq!(rejected("x.__dict__ = {}"), "attribute '__dict__'");
    }
}
