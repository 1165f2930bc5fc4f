//! Result Guard: post-execution size checks over produced value graphs.
//!
//! The interpreter bounds what code can *do*, not how large a value it can
//! build within those bounds. This walk runs before a value is serialized
//! into a response (or merged into the namespace) and rejects anything that
//! exceeds the configured ceilings. A seen-set keyed by collection identity
//! breaks cycles, so a self-referential structure is measured once instead
//! of forever.

use std::collections::HashSet;

use crate::sandbox::config::SandboxConfig;
use crate::sandbox::value::Value;

/// Ceilings the guard enforces.
#[derive(Debug, Clone)]
pub struct GuardLimits {
    /// Maximum length of any string, in characters.
    pub max_string_length: usize,
    /// Maximum element count of any single collection.
    pub max_collection_size: usize,
    /// Maximum traversal depth.
    pub max_value_depth: usize,
}

impl From<&SandboxConfig> for GuardLimits {
    fn from(config: &SandboxConfig) -> Self {
        GuardLimits {
            max_string_length: config.max_string_length,
            max_collection_size: config.max_collection_size,
            max_value_depth: config.max_value_depth,
        }
    }
}

/// A ceiling was exceeded; `reason` names which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeBreach {
    pub reason: String,
}

impl SizeBreach {
    fn new(reason: impl Into<String>) -> Self {
        SizeBreach {
            reason: reason.into(),
        }
    }
}

/// Recursively measure `value` against the ceilings.
pub fn check_value(value: &Value, limits: &GuardLimits) -> Result<(), SizeBreach> {
    let mut seen = HashSet::new();
    check_inner(value, limits, 0, &mut seen)
}

fn check_inner(
    value: &Value,
    limits: &GuardLimits,
    depth: usize,
    seen: &mut HashSet<usize>,
) -> Result<(), SizeBreach> {
    if depth > limits.max_value_depth {
        return Err(SizeBreach::new(format!(
            "value nesting exceeds depth {}",
            limits.max_value_depth
        )));
    }
    if let Some(id) = value.identity() {
        // Already measured (shared substructure or cycle).
        if !seen.insert(id) {
            return Ok(());
        }
    }
    match value {
        Value::Str(s) => {
            if s.chars().count() > limits.max_string_length {
                return Err(SizeBreach::new(format!(
                    "string longer than {} characters",
                    limits.max_string_length
                )));
            }
        }
        Value::List(items) => {
            let items = items.borrow();
            check_len(items.len(), limits)?;
            for item in items.iter() {
                check_inner(item, limits, depth + 1, seen)?;
            }
        }
        Value::Tuple(items) => {
            check_len(items.len(), limits)?;
            for item in items.iter() {
                check_inner(item, limits, depth + 1, seen)?;
            }
        }
        Value::Dict(pairs) => {
            let pairs = pairs.borrow();
            check_len(pairs.len(), limits)?;
            for (k, v) in pairs.iter() {
                check_inner(k, limits, depth + 1, seen)?;
                check_inner(v, limits, depth + 1, seen)?;
            }
        }
        Value::Set(items) => {
            let items = items.borrow();
            check_len(items.len(), limits)?;
            for item in items.iter() {
                check_inner(item, limits, depth + 1, seen)?;
            }
        }
        Value::Function(f) => {
            for default in &f.defaults {
                check_inner(default, limits, depth + 1, seen)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_len(len: usize, limits: &GuardLimits) -> Result<(), SizeBreach> {
    if len > limits.max_collection_size {
        return Err(SizeBreach::new(format!(
            "collection larger than {} elements",
            limits.max_collection_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn limits() -> GuardLimits {
        GuardLimits {
            max_string_length: 16,
            max_collection_size: 4,
            max_value_depth: 3,
        }
    }

    #[test]
    fn test_scalars_pass() {
        assert!(check_value(&Value::Int(5), &limits()).is_ok());
        assert!(check_value(&Value::str("short"), &limits()).is_ok());
    }

    #[test]
    fn test_long_string_rejected() {
        let long = "x".repeat(17);
        let err = check_value(&Value::str(long), &limits()).unwrap_err();
        assert!(err.reason.contains("string longer"));
    }

    #[test]
    fn test_large_collection_rejected() {
        let big = Value::list((0..5).map(Value::Int).collect());
        let err = check_value(&big, &limits()).unwrap_err();
        assert!(err.reason.contains("collection larger"));
    }

    #[test]
    fn test_nested_string_checked() {
        let v = Value::list(vec![Value::list(vec![Value::str("y".repeat(17))])]);
        assert!(check_value(&v, &limits()).is_err());
    }

    #[test]
    fn test_depth_ceiling() {
        let mut v = Value::Int(1);
        for _ in 0..5 {
            v = Value::list(vec![v]);
        }
        let err = check_value(&v, &limits()).unwrap_err();
        assert!(err.reason.contains("depth"));
    }

    #[test]
    fn test_cycle_measured_once() {
        let inner = Rc::new(RefCell::new(vec![Value::Int(1)]));
        let list = Value::List(Rc::clone(&inner));
        inner.borrow_mut().push(list.clone());
        // Cyclic but small: passes instead of looping forever.
        assert!(check_value(&list, &limits()).is_ok());
    }

    #[test]
    fn test_shared_substructure_measured_once() {
        let shared = Value::list(vec![Value::Int(1)]);
        let outer = Value::list(vec![shared.clone(), shared.clone(), shared]);
        assert!(check_value(&outer, &limits()).is_ok());
    }

    #[test]
    fn test_dict_keys_and_values_checked() {
        let d = Value::dict(vec![(Value::str("k"), Value::str("v".repeat(17)))]);
        assert!(check_value(&d, &limits()).is_err());
    }
}
