//! Binary, unary, comparison, and subscript operator semantics.
//!
//! Pure helpers shared by the interpreter. Errors are plain strings here;
//! the interpreter wraps them into its fault type. Operations that allocate
//! proportionally to an operand-controlled count (concatenation, repetition)
//! are capped with the guard ceilings at construction time, so a doubling
//! loop cannot outrun the post-execution check.

use std::rc::Rc;

use crate::lang::ast::{BinOp, CmpOp, UnaryOp};
use crate::sandbox::guard::GuardLimits;
use crate::sandbox::value::{
    format_float, range_len, values_compare, values_equal, Number, Value,
};

pub type OpResult = Result<Value, OpError>;

/// Operator failure: a runtime fault or a size-ceiling breach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    Runtime(String),
    Size(String),
}

fn runtime(msg: impl Into<String>) -> OpError {
    OpError::Runtime(msg.into())
}

fn type_error(op: &str, a: &Value, b: &Value) -> OpError {
    runtime(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        a.type_name(),
        b.type_name()
    ))
}

/// Python floor division for integers.
fn floor_div(a: i64, b: i64) -> Result<i64, OpError> {
    if b == 0 {
        return Err(runtime("division by zero"));
    }
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    Ok(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
}

/// Python modulo for integers: result takes the divisor's sign.
fn floor_mod(a: i64, b: i64) -> Result<i64, OpError> {
    if b == 0 {
        return Err(runtime("division by zero"));
    }
    let r = a.wrapping_rem(b);
    Ok(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
}

fn float_mod(a: f64, b: f64) -> Result<f64, OpError> {
    if b == 0.0 {
        return Err(runtime("division by zero"));
    }
    let r = a % b;
    Ok(if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    })
}

fn int_pow(base: i64, exp: i64) -> OpResult {
    if exp < 0 {
        return Ok(Value::Float((base as f64).powi(exp as i32)));
    }
    let exp = u32::try_from(exp).map_err(|_| runtime("exponent too large"))?;
    base.checked_pow(exp)
        .map(Value::Int)
        .ok_or_else(|| runtime("integer overflow"))
}

fn repeat_str(s: &str, n: i64, limits: &GuardLimits) -> OpResult {
    let n = n.max(0) as usize;
    let total = s.chars().count().saturating_mul(n);
    if total > limits.max_string_length {
        return Err(OpError::Size(format!(
            "string repetition exceeds {} characters",
            limits.max_string_length
        )));
    }
    Ok(Value::str(s.repeat(n)))
}

fn repeat_items(items: &[Value], n: i64, limits: &GuardLimits) -> Result<Vec<Value>, OpError> {
    let n = n.max(0) as usize;
    let total = items.len().saturating_mul(n);
    if total > limits.max_collection_size {
        return Err(OpError::Size(format!(
            "sequence repetition exceeds {} elements",
            limits.max_collection_size
        )));
    }
    let mut out = Vec::with_capacity(total);
    for _ in 0..n {
        out.extend(items.iter().cloned());
    }
    Ok(out)
}

fn concat_checked(a: usize, b: usize, limits: &GuardLimits) -> Result<(), OpError> {
    if a.saturating_add(b) > limits.max_collection_size {
        return Err(OpError::Size(format!(
            "sequence concatenation exceeds {} elements",
            limits.max_collection_size
        )));
    }
    Ok(())
}

/// Evaluate a binary operator.
pub fn binary(op: BinOp, a: &Value, b: &Value, limits: &GuardLimits) -> OpResult {
    // Numeric fast path with int/float promotion.
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return numeric_binary(op, x, y, a, b);
    }

    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            let total = x.chars().count() + y.chars().count();
            if total > limits.max_string_length {
                return Err(OpError::Size(format!(
                    "string concatenation exceeds {} characters",
                    limits.max_string_length
                )));
            }
            Ok(Value::str(format!("{x}{y}")))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            concat_checked(x.len(), y.len(), limits)?;
            Ok(Value::list(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            concat_checked(x.len(), y.len(), limits)?;
            Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) => repeat_str(s, *n, limits),
        (BinOp::Mul, Value::Int(n), Value::Str(s)) => repeat_str(s, *n, limits),
        (BinOp::Mul, Value::List(items), Value::Int(n)) => {
            Ok(Value::list(repeat_items(&items.borrow(), *n, limits)?))
        }
        (BinOp::Mul, Value::Int(n), Value::List(items)) => {
            Ok(Value::list(repeat_items(&items.borrow(), *n, limits)?))
        }
        (BinOp::Mul, Value::Tuple(items), Value::Int(n)) => {
            Ok(Value::tuple(repeat_items(items, *n, limits)?))
        }
        (BinOp::Mul, Value::Int(n), Value::Tuple(items)) => {
            Ok(Value::tuple(repeat_items(items, *n, limits)?))
        }
        // Set algebra.
        (BinOp::BitOr, Value::Set(x), Value::Set(y)) => {
            let mut out: Vec<Value> = x.borrow().clone();
            for item in y.borrow().iter() {
                if !out.iter().any(|v| values_equal(v, item)) {
                    out.push(item.clone());
                }
            }
            Ok(Value::set(out))
        }
        (BinOp::BitAnd, Value::Set(x), Value::Set(y)) => {
            let y = y.borrow();
            Ok(Value::set(
                x.borrow()
                    .iter()
                    .filter(|v| y.iter().any(|w| values_equal(v, w)))
                    .cloned()
                    .collect(),
            ))
        }
        (BinOp::Sub, Value::Set(x), Value::Set(y)) => {
            let y = y.borrow();
            Ok(Value::set(
                x.borrow()
                    .iter()
                    .filter(|v| !y.iter().any(|w| values_equal(v, w)))
                    .cloned()
                    .collect(),
            ))
        }
        (BinOp::BitXor, Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            let mut out: Vec<Value> = x
                .iter()
                .filter(|v| !y.iter().any(|w| values_equal(v, w)))
                .cloned()
                .collect();
            out.extend(
                y.iter()
                    .filter(|v| !x.iter().any(|w| values_equal(v, w)))
                    .cloned(),
            );
            Ok(Value::set(out))
        }
        (BinOp::Mod, Value::Str(_), _) => Err(runtime(
            "%-formatting of strings is not supported; use an f-string",
        )),
        (op, a, b) => Err(type_error(op.symbol(), a, b)),
    }
}

fn numeric_binary(op: BinOp, x: Number, y: Number, a: &Value, b: &Value) -> OpResult {
    use Number::*;
    match op {
        BinOp::Add => match (x, y) {
            (Int(x), Int(y)) => x
                .checked_add(y)
                .map(Value::Int)
                .ok_or_else(|| runtime("integer overflow")),
            (x, y) => Ok(Value::Float(x.as_f64() + y.as_f64())),
        },
        BinOp::Sub => match (x, y) {
            (Int(x), Int(y)) => x
                .checked_sub(y)
                .map(Value::Int)
                .ok_or_else(|| runtime("integer overflow")),
            (x, y) => Ok(Value::Float(x.as_f64() - y.as_f64())),
        },
        BinOp::Mul => match (x, y) {
            (Int(x), Int(y)) => x
                .checked_mul(y)
                .map(Value::Int)
                .ok_or_else(|| runtime("integer overflow")),
            (x, y) => Ok(Value::Float(x.as_f64() * y.as_f64())),
        },
        BinOp::Div => {
            let denominator = y.as_f64();
            if denominator == 0.0 {
                return Err(runtime("division by zero"));
            }
            Ok(Value::Float(x.as_f64() / denominator))
        }
        BinOp::FloorDiv => match (x, y) {
            (Int(x), Int(y)) => floor_div(x, y).map(Value::Int),
            (x, y) => {
                let denominator = y.as_f64();
                if denominator == 0.0 {
                    return Err(runtime("division by zero"));
                }
                Ok(Value::Float((x.as_f64() / denominator).floor()))
            }
        },
        BinOp::Mod => match (x, y) {
            (Int(x), Int(y)) => floor_mod(x, y).map(Value::Int),
            (x, y) => float_mod(x.as_f64(), y.as_f64()).map(Value::Float),
        },
        BinOp::Pow => match (x, y) {
            (Int(x), Int(y)) => int_pow(x, y),
            (x, y) => Ok(Value::Float(x.as_f64().powf(y.as_f64()))),
        },
        BinOp::BitOr | BinOp::BitXor | BinOp::BitAnd | BinOp::Shl | BinOp::Shr => {
            let (Int(x), Int(y)) = (x, y) else {
                return Err(type_error(op.symbol(), a, b));
            };
            match op {
                BinOp::BitOr => Ok(Value::Int(x | y)),
                BinOp::BitXor => Ok(Value::Int(x ^ y)),
                BinOp::BitAnd => Ok(Value::Int(x & y)),
                BinOp::Shl => {
                    if !(0..64).contains(&y) {
                        return Err(runtime("shift count out of range"));
                    }
                    x.checked_shl(y as u32)
                        .map(Value::Int)
                        .ok_or_else(|| runtime("integer overflow"))
                }
                BinOp::Shr => {
                    if !(0..64).contains(&y) {
                        return Err(runtime("shift count out of range"));
                    }
                    Ok(Value::Int(x >> y))
                }
                _ => unreachable!(),
            }
        }
    }
}

/// Evaluate a unary operator.
pub fn unary(op: UnaryOp, v: &Value) -> OpResult {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Int(x)) => x
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| runtime("integer overflow")),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-(*b as i64))),
        (UnaryOp::Pos, Value::Int(x)) => Ok(Value::Int(*x)),
        (UnaryOp::Pos, Value::Float(x)) => Ok(Value::Float(*x)),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        (UnaryOp::Invert, Value::Int(x)) => Ok(Value::Int(!x)),
        (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Int(!(*b as i64))),
        (op, v) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Invert => "~",
                UnaryOp::Not => "not",
            };
            Err(runtime(format!(
                "bad operand type for unary {}: '{}'",
                symbol,
                v.type_name()
            )))
        }
    }
}

/// Evaluate one comparison operator.
pub fn compare(op: CmpOp, a: &Value, b: &Value) -> OpResult {
    use std::cmp::Ordering;
    let result = match op {
        CmpOp::Eq => values_equal(a, b),
        CmpOp::NotEq => !values_equal(a, b),
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            let Some(ordering) = values_compare(a, b) else {
                return Err(runtime(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    a.type_name(),
                    b.type_name()
                )));
            };
            match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::LtE => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                CmpOp::GtE => ordering != Ordering::Less,
                _ => unreachable!(),
            }
        }
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => is_identical(a, b),
        CmpOp::IsNot => !is_identical(a, b),
    };
    Ok(Value::Bool(result))
}

/// Python `is`: identity for collections, value identity for interned
/// scalars (`None`, bools; small ints behave identically in practice).
fn is_identical(a: &Value, b: &Value) -> bool {
    match (a.identity(), b.identity()) {
        (Some(x), Some(y)) => x == y,
        (None, None) => match (a, b) {
            (Value::None, Value::None) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
            (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
            (Value::Builtin(x), Value::Builtin(y)) => x == y,
            _ => false,
        },
        _ => false,
    }
}

/// Membership test: `needle in haystack`.
pub fn contains(haystack: &Value, needle: &Value) -> Result<bool, OpError> {
    match haystack {
        Value::Str(s) => match needle {
            Value::Str(sub) => Ok(s.contains(sub.as_ref())),
            other => Err(runtime(format!(
                "'in <string>' requires string as left operand, not '{}'",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| values_equal(v, needle))),
        Value::Tuple(items) => Ok(items.iter().any(|v| values_equal(v, needle))),
        Value::Set(items) => Ok(items.borrow().iter().any(|v| values_equal(v, needle))),
        Value::Dict(pairs) => Ok(pairs.borrow().iter().any(|(k, _)| values_equal(k, needle))),
        Value::Range { start, stop, step } => match needle {
            Value::Int(v) => {
                let (start, stop, step) = (*start, *stop, *step);
                if step == 0 {
                    return Ok(false);
                }
                let in_bounds = if step > 0 {
                    *v >= start && *v < stop
                } else {
                    *v <= start && *v > stop
                };
                Ok(in_bounds && (v - start) % step == 0)
            }
            _ => Ok(false),
        },
        other => Err(runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Normalize a (possibly negative) index against `len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}

/// Subscript read: `value[index]` with an already-evaluated plain index.
pub fn index_value(value: &Value, index: &Value) -> OpResult {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let idx = require_int(index, "list indices must be integers")?;
            normalize_index(idx, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| runtime("list index out of range"))
        }
        Value::Tuple(items) => {
            let idx = require_int(index, "tuple indices must be integers")?;
            normalize_index(idx, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| runtime("tuple index out of range"))
        }
        Value::Str(s) => {
            let idx = require_int(index, "string indices must be integers")?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(idx, chars.len())
                .map(|i| Value::str(chars[i].to_string()))
                .ok_or_else(|| runtime("string index out of range"))
        }
        Value::Dict(pairs) => {
            if !index.is_hashable() {
                return Err(runtime(format!(
                    "unhashable type: '{}'",
                    index.type_name()
                )));
            }
            pairs
                .borrow()
                .iter()
                .find(|(k, _)| values_equal(k, index))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| runtime(format!("KeyError: {}", index.repr())))
        }
        Value::Range { start, stop, step } => {
            let idx = require_int(index, "range indices must be integers")?;
            let len = range_len(*start, *stop, *step);
            normalize_index(idx, len as usize)
                .map(|i| Value::Int(start + (i as i64) * step))
                .ok_or_else(|| runtime("range index out of range"))
        }
        other => Err(runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Slice read: `value[lower:upper:step]` with already-evaluated bounds.
pub fn slice_value(
    value: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> OpResult {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(runtime("slice step cannot be zero"));
    }
    match value {
        Value::List(items) => {
            let items = items.borrow();
            Ok(Value::list(slice_items(&items, lower, upper, step)))
        }
        Value::Tuple(items) => Ok(Value::tuple(slice_items(items, lower, upper, step))),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let values: Vec<char> = slice_indices(chars.len(), lower, upper, step)
                .into_iter()
                .map(|i| chars[i])
                .collect();
            Ok(Value::str(values.into_iter().collect::<String>()))
        }
        other => Err(runtime(format!(
            "'{}' object is not sliceable",
            other.type_name()
        ))),
    }
}

fn slice_items(items: &[Value], lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<Value> {
    slice_indices(items.len(), lower, upper, step)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

/// Python slice index arithmetic with clamping.
fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, low: i64, high: i64| v.max(low).min(high);
    let resolve = |v: i64| if v < 0 { v + len } else { v };

    let (start, stop) = if step > 0 {
        (
            clamp(lower.map(resolve).unwrap_or(0), 0, len),
            clamp(upper.map(resolve).unwrap_or(len), 0, len),
        )
    } else {
        (
            clamp(lower.map(resolve).unwrap_or(len - 1), -1, len - 1),
            clamp(upper.map(resolve).unwrap_or(-1), -1, len - 1),
        )
    };

    let mut indices = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            indices.push(i as usize);
            i += step;
        }
    } else {
        while i > stop {
            indices.push(i as usize);
            i += step;
        }
    }
    indices
}

fn require_int(v: &Value, message: &str) -> Result<i64, OpError> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(*b as i64),
        _ => Err(runtime(format!("{message}, not '{}'", v.type_name()))),
    }
}

/// Format a number the way `str()` would, for f-strings and `print`.
pub fn stringify_number(n: Number) -> String {
    match n {
        Number::Int(v) => v.to_string(),
        Number::Float(v) => format_float(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> GuardLimits {
        GuardLimits {
            max_string_length: 100,
            max_collection_size: 10,
            max_value_depth: 8,
        }
    }

    fn int(v: i64) -> Value {
        Value::Int(v)
    }

    #[test]
    fn test_int_arithmetic() {
        assert!(matches!(
            binary(BinOp::Add, &int(2), &int(3), &limits()),
            Ok(Value::Int(5))
        ));
        assert!(matches!(
            binary(BinOp::Pow, &int(2), &int(10), &limits()),
            Ok(Value::Int(1024))
        ));
    }

    #[test]
    fn test_true_division_promotes() {
        match binary(BinOp::Div, &int(7), &int(2), &limits()) {
            Ok(Value::Float(v)) => assert_eq!(v, 3.5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_floor_division_matches_python() {
        let cases = [(7, 2, 3), (-7, 2, -4), (7, -2, -4), (-7, -2, 3)];
        for (a, b, expect) in cases {
            match binary(BinOp::FloorDiv, &int(a), &int(b), &limits()) {
                Ok(Value::Int(v)) => assert_eq!(v, expect, "{a} // {b}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_modulo_sign_follows_divisor() {
        let cases = [(7, 3, 1), (-7, 3, 2), (7, -3, -2), (-7, -3, -1)];
        for (a, b, expect) in cases {
            match binary(BinOp::Mod, &int(a), &int(b), &limits()) {
                Ok(Value::Int(v)) => assert_eq!(v, expect, "{a} % {b}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_division_by_zero() {
        for op in [BinOp::Div, BinOp::FloorDiv, BinOp::Mod] {
            match binary(op, &int(1), &int(0), &limits()) {
                Err(OpError::Runtime(msg)) => assert!(msg.contains("division by zero")),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_integer_overflow_checked() {
        match binary(BinOp::Mul, &int(i64::MAX), &int(2), &limits()) {
            Err(OpError::Runtime(msg)) => assert!(msg.contains("overflow")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_string_ops() {
        match binary(BinOp::Add, &Value::str("ab"), &Value::str("cd"), &limits()) {
            Ok(Value::Str(s)) => assert_eq!(s.as_ref(), "abcd"),
            other => panic!("unexpected {other:?}"),
        }
        match binary(BinOp::Mul, &Value::str("ab"), &int(3), &limits()) {
            Ok(Value::Str(s)) => assert_eq!(s.as_ref(), "ababab"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_repetition_capped() {
        match binary(BinOp::Mul, &Value::str("x"), &int(1_000_000), &limits()) {
            Err(OpError::Size(msg)) => assert!(msg.contains("repetition")),
            other => panic!("unexpected {other:?}"),
        }
        let xs = Value::list(vec![int(1), int(2)]);
        match binary(BinOp::Mul, &xs, &int(1_000_000), &limits()) {
            Err(OpError::Size(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_type_errors_are_reported() {
        match binary(BinOp::Add, &int(1), &Value::str("x"), &limits()) {
            Err(OpError::Runtime(msg)) => {
                assert!(msg.contains("'int'") && msg.contains("'str'"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_set_algebra() {
        let a = Value::set(vec![int(1), int(2)]);
        let b = Value::set(vec![int(2), int(3)]);
        match binary(BinOp::BitOr, &a, &b, &limits()) {
            Ok(v) => assert_eq!(v.repr(), "{1, 2, 3}"),
            other => panic!("unexpected {other:?}"),
        }
        match binary(BinOp::BitAnd, &a, &b, &limits()) {
            Ok(v) => assert_eq!(v.repr(), "{2}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_comparisons() {
        assert!(matches!(
            compare(CmpOp::Lt, &int(1), &Value::Float(1.5)),
            Ok(Value::Bool(true))
        ));
        assert!(compare(CmpOp::Lt, &int(1), &Value::str("a")).is_err());
        assert!(matches!(
            compare(CmpOp::Is, &Value::None, &Value::None),
            Ok(Value::Bool(true))
        ));
    }

    #[test]
    fn test_membership() {
        let xs = Value::list(vec![int(1), int(2)]);
        assert!(matches!(
            compare(CmpOp::In, &int(2), &xs),
            Ok(Value::Bool(true))
        ));
        assert!(matches!(
            compare(CmpOp::NotIn, &int(5), &xs),
            Ok(Value::Bool(true))
        ));
        let r = Value::Range {
            start: 0,
            stop: 10,
            step: 3,
        };
        assert!(matches!(
            compare(CmpOp::In, &int(6), &r),
            Ok(Value::Bool(true))
        ));
        assert!(matches!(
            compare(CmpOp::In, &int(7), &r),
            Ok(Value::Bool(false))
        ));
    }

    #[test]
    fn test_indexing() {
        let xs = Value::list(vec![int(10), int(20), int(30)]);
        assert!(matches!(index_value(&xs, &int(-1)), Ok(Value::Int(30))));
        assert!(index_value(&xs, &int(3)).is_err());
        let d = Value::dict(vec![(Value::str("k"), int(1))]);
        assert!(matches!(index_value(&d, &Value::str("k")), Ok(Value::Int(1))));
        match index_value(&d, &Value::str("missing")) {
            Err(OpError::Runtime(msg)) => assert!(msg.contains("KeyError")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_slicing() {
        let xs = Value::list((0..6).map(int).collect());
        match slice_value(&xs, Some(1), Some(5), Some(2)) {
            Ok(v) => assert_eq!(v.repr(), "[1, 3]"),
            other => panic!("unexpected {other:?}"),
        }
        match slice_value(&xs, None, None, Some(-1)) {
            Ok(v) => assert_eq!(v.repr(), "[5, 4, 3, 2, 1, 0]"),
            other => panic!("unexpected {other:?}"),
        }
        match slice_value(&Value::str("hello"), Some(1), Some(4), None) {
            Ok(Value::Str(s)) => assert_eq!(s.as_ref(), "ell"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unary() {
        assert!(matches!(unary(UnaryOp::Neg, &int(5)), Ok(Value::Int(-5))));
        assert!(matches!(
            unary(UnaryOp::Not, &Value::str("")),
            Ok(Value::Bool(true))
        ));
        assert!(unary(UnaryOp::Invert, &Value::Float(1.0)).is_err());
    }
}
