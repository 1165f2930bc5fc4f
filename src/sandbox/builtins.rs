//! The immutable safe-builtin table shared by every execution.
//!
//! Mirrors the classic REPL allow-list: a curated set of pure builtins plus
//! a slice of the math module. The table is stored in frozen form so one
//! global instance can be shared read-only across worker threads; entries
//! thaw to [`Value`](crate::sandbox::value::Value) on namespace assembly.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::sandbox::value::StoredValue;

/// Identifies one built-in function. Dispatch lives in the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinId {
    Abs,
    All,
    Any,
    Ascii,
    Bin,
    Bool,
    Chr,
    Dict,
    Divmod,
    Enumerate,
    Filter,
    Float,
    Format,
    Hex,
    Int,
    Isinstance,
    Len,
    List,
    Map,
    Max,
    Min,
    Oct,
    Ord,
    Print,
    Range,
    Round,
    Set,
    Sorted,
    Str,
    Sum,
    Tuple,
    Zip,
    // math module subset
    Acos,
    Asin,
    Atan,
    Ceil,
    Cos,
    Degrees,
    Exp,
    Factorial,
    Floor,
    Log,
    Log10,
    MathPow,
    Radians,
    Sin,
    Sqrt,
    Tan,
}

impl BuiltinId {
    /// The name the function is bound to in the safe namespace.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinId::Abs => "abs",
            BuiltinId::All => "all",
            BuiltinId::Any => "any",
            BuiltinId::Ascii => "ascii",
            BuiltinId::Bin => "bin",
            BuiltinId::Bool => "bool",
            BuiltinId::Chr => "chr",
            BuiltinId::Dict => "dict",
            BuiltinId::Divmod => "divmod",
            BuiltinId::Enumerate => "enumerate",
            BuiltinId::Filter => "filter",
            BuiltinId::Float => "float",
            BuiltinId::Format => "format",
            BuiltinId::Hex => "hex",
            BuiltinId::Int => "int",
            BuiltinId::Isinstance => "isinstance",
            BuiltinId::Len => "len",
            BuiltinId::List => "list",
            BuiltinId::Map => "map",
            BuiltinId::Max => "max",
            BuiltinId::Min => "min",
            BuiltinId::Oct => "oct",
            BuiltinId::Ord => "ord",
            BuiltinId::Print => "print",
            BuiltinId::Range => "range",
            BuiltinId::Round => "round",
            BuiltinId::Set => "set",
            BuiltinId::Sorted => "sorted",
            BuiltinId::Str => "str",
            BuiltinId::Sum => "sum",
            BuiltinId::Tuple => "tuple",
            BuiltinId::Zip => "zip",
            BuiltinId::Acos => "acos",
            BuiltinId::Asin => "asin",
            BuiltinId::Atan => "atan",
            BuiltinId::Ceil => "ceil",
            BuiltinId::Cos => "cos",
            BuiltinId::Degrees => "degrees",
            BuiltinId::Exp => "exp",
            BuiltinId::Factorial => "factorial",
            BuiltinId::Floor => "floor",
            BuiltinId::Log => "log",
            BuiltinId::Log10 => "log10",
            // The math module's pow shadows the builtin, as in the
            // original allow-list merge order.
            BuiltinId::MathPow => "pow",
            BuiltinId::Radians => "radians",
            BuiltinId::Sin => "sin",
            BuiltinId::Sqrt => "sqrt",
            BuiltinId::Tan => "tan",
        }
    }
}

const ALL_BUILTINS: &[BuiltinId] = &[
    BuiltinId::Abs,
    BuiltinId::All,
    BuiltinId::Any,
    BuiltinId::Ascii,
    BuiltinId::Bin,
    BuiltinId::Bool,
    BuiltinId::Chr,
    BuiltinId::Dict,
    BuiltinId::Divmod,
    BuiltinId::Enumerate,
    BuiltinId::Filter,
    BuiltinId::Float,
    BuiltinId::Format,
    BuiltinId::Hex,
    BuiltinId::Int,
    BuiltinId::Isinstance,
    BuiltinId::Len,
    BuiltinId::List,
    BuiltinId::Map,
    BuiltinId::Max,
    BuiltinId::Min,
    BuiltinId::Oct,
    BuiltinId::Ord,
    BuiltinId::Print,
    BuiltinId::Range,
    BuiltinId::Round,
    BuiltinId::Set,
    BuiltinId::Sorted,
    BuiltinId::Str,
    BuiltinId::Sum,
    BuiltinId::Tuple,
    BuiltinId::Zip,
    BuiltinId::Acos,
    BuiltinId::Asin,
    BuiltinId::Atan,
    BuiltinId::Ceil,
    BuiltinId::Cos,
    BuiltinId::Degrees,
    BuiltinId::Exp,
    BuiltinId::Factorial,
    BuiltinId::Floor,
    BuiltinId::Log,
    BuiltinId::Log10,
    BuiltinId::MathPow,
    BuiltinId::Radians,
    BuiltinId::Sin,
    BuiltinId::Sqrt,
    BuiltinId::Tan,
];

/// The shared safe namespace: builtin functions plus math constants.
static SAFE_BUILTINS: LazyLock<HashMap<&'static str, StoredValue>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, StoredValue> = HashMap::new();
    for id in ALL_BUILTINS {
        table.insert(id.name(), StoredValue::Builtin(*id));
    }
    table.insert("pi", StoredValue::Float(std::f64::consts::PI));
    table.insert("e", StoredValue::Float(std::f64::consts::E));
    table
});

/// Get the global safe-builtin table.
pub fn safe_builtins() -> &'static HashMap<&'static str, StoredValue> {
    &SAFE_BUILTINS
}

/// Whether `name` is part of the safe namespace (and so never diffed into
/// a user's persisted variables).
pub fn is_builtin_name(name: &str) -> bool {
    SAFE_BUILTINS.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_contents() {
        assert!(is_builtin_name("len"));
        assert!(is_builtin_name("sqrt"));
        assert!(is_builtin_name("pi"));
        assert!(is_builtin_name("print"));
        assert!(!is_builtin_name("open"));
        assert!(!is_builtin_name("eval"));
        assert!(!is_builtin_name("__import__"));
    }

    #[test]
    fn test_math_pow_shadows_builtin_pow() {
        match safe_builtins().get("pow") {
            Some(StoredValue::Builtin(BuiltinId::MathPow)) => {}
            other => panic!("unexpected pow binding: {other:?}"),
        }
    }

    #[test]
    fn test_names_are_unique_and_consistent() {
        for id in ALL_BUILTINS {
            match safe_builtins().get(id.name()) {
                Some(StoredValue::Builtin(found)) => assert_eq!(found, id),
                other => panic!("{} missing from table: {other:?}", id.name()),
            }
        }
    }
}
