//! Methods on built-in types (`str.upper`, `list.append`, ...).
//!
//! Dispatch is by receiver type and method name. Methods that can grow data
//! proportionally to operand-controlled sizes either charge fuel per element
//! (`extend`, `update`) or cap their result with the guard ceilings
//! (`join`, `replace`, `zfill`), mirroring the operator-level caps.

use crate::sandbox::interp::{rt, Exec, ExecFault, Flow, Interpreter};
use crate::sandbox::value::{values_equal, Value};

/// Whether `name` is a known method of `receiver`'s type.
pub(crate) fn is_method(receiver: &Value, name: &str) -> bool {
    let table: &[&str] = match receiver {
        Value::Str(_) => &[
            "upper",
            "lower",
            "strip",
            "lstrip",
            "rstrip",
            "split",
            "join",
            "replace",
            "startswith",
            "endswith",
            "find",
            "rfind",
            "count",
            "index",
            "title",
            "capitalize",
            "isdigit",
            "isalpha",
            "isalnum",
            "isspace",
            "islower",
            "isupper",
            "zfill",
            "format",
        ],
        Value::List(_) => &[
            "append", "pop", "extend", "insert", "remove", "index", "count", "sort", "reverse",
            "clear", "copy",
        ],
        Value::Dict(_) => &[
            "get",
            "keys",
            "values",
            "items",
            "pop",
            "update",
            "clear",
            "copy",
            "setdefault",
        ],
        Value::Set(_) => &[
            "add",
            "remove",
            "discard",
            "union",
            "intersection",
            "difference",
            "clear",
            "copy",
        ],
        Value::Tuple(_) => &["count", "index"],
        _ => &[],
    };
    table.contains(&name)
}

/// Call `receiver.name(args...)`.
pub(crate) fn call_method(
    interp: &mut Interpreter,
    receiver: Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Exec<Value> {
    // Only list.sort takes keywords.
    if !kwargs.is_empty() && !(matches!(receiver, Value::List(_)) && name == "sort") {
        return Err(rt(format!("{name}() takes no keyword arguments")));
    }
    match &receiver {
        Value::Str(_) => str_method(interp, &receiver, name, args),
        Value::List(_) => list_method(interp, &receiver, name, args, kwargs),
        Value::Dict(_) => dict_method(interp, &receiver, name, args),
        Value::Set(_) => set_method(interp, &receiver, name, args),
        Value::Tuple(_) => tuple_method(&receiver, name, args),
        other => Err(rt(format!(
            "'{}' object has no attribute '{name}'",
            other.type_name()
        ))),
    }
}

fn no_such_method(receiver: &Value, name: &str) -> Flow {
    rt(format!(
        "'{}' object has no attribute '{name}'",
        receiver.type_name()
    ))
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Exec<()> {
    if args.len() < min || args.len() > max {
        return Err(rt(format!(
            "{name}() takes {min} to {max} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn expect_str(name: &str, v: &Value) -> Exec<String> {
    match v {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(rt(format!(
            "{name}() argument must be str, not '{}'",
            other.type_name()
        ))),
    }
}

fn capped_str(interp: &Interpreter, s: String) -> Exec<Value> {
    if s.chars().count() > interp.limits.max_string_length {
        return Err(Flow::Fault(ExecFault::Size(format!(
            "string longer than {} characters",
            interp.limits.max_string_length
        ))));
    }
    Ok(Value::str(s))
}

// ---------------------------------------------------------------------------
// str
// ---------------------------------------------------------------------------

fn str_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Exec<Value> {
    let Value::Str(s) = receiver else { unreachable!() };
    let s = s.as_ref();
    match name {
        "upper" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::str(s.to_uppercase()))
        }
        "lower" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::str(s.to_lowercase()))
        }
        "title" => {
            expect_args(name, &args, 0, 0)?;
            let mut out = String::with_capacity(s.len());
            let mut word_start = true;
            for c in s.chars() {
                if c.is_alphanumeric() {
                    if word_start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    word_start = false;
                } else {
                    out.push(c);
                    word_start = true;
                }
            }
            Ok(Value::str(out))
        }
        "capitalize" => {
            expect_args(name, &args, 0, 0)?;
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            };
            Ok(Value::str(out))
        }
        "strip" | "lstrip" | "rstrip" => {
            expect_args(name, &args, 0, 1)?;
            let custom = args
                .first()
                .map(|v| expect_str(name, v))
                .transpose()?;
            let matches_set = |c: char| match &custom {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matches_set),
                "lstrip" => s.trim_start_matches(matches_set),
                _ => s.trim_end_matches(matches_set),
            };
            Ok(Value::str(out.to_string()))
        }
        "split" => {
            expect_args(name, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None => s
                    .split_whitespace()
                    .map(|p| Value::str(p.to_string()))
                    .collect(),
                Some(sep) => {
                    let sep = expect_str(name, sep)?;
                    if sep.is_empty() {
                        return Err(rt("empty separator"));
                    }
                    s.split(sep.as_str())
                        .map(|p| Value::str(p.to_string()))
                        .collect()
                }
            };
            Ok(Value::list(parts))
        }
        "join" => {
            expect_args(name, &args, 1, 1)?;
            let items = interp.materialize(args.into_iter().next().unwrap())?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                interp.tick()?;
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(rt(format!(
                            "sequence item: expected str instance, '{}' found",
                            other.type_name()
                        )))
                    }
                }
            }
            capped_str(interp, parts.join(s))
        }
        "replace" => {
            expect_args(name, &args, 2, 2)?;
            let old = expect_str(name, &args[0])?;
            let new = expect_str(name, &args[1])?;
            if old.is_empty() {
                return Err(rt("replace() with empty search string is not supported"));
            }
            capped_str(interp, s.replace(&old, &new))
        }
        "startswith" => {
            expect_args(name, &args, 1, 1)?;
            let prefix = expect_str(name, &args[0])?;
            Ok(Value::Bool(s.starts_with(&prefix)))
        }
        "endswith" => {
            expect_args(name, &args, 1, 1)?;
            let suffix = expect_str(name, &args[0])?;
            Ok(Value::Bool(s.ends_with(&suffix)))
        }
        "find" | "rfind" | "index" => {
            expect_args(name, &args, 1, 1)?;
            let needle = expect_str(name, &args[0])?;
            let byte_pos = if name == "rfind" {
                s.rfind(&needle)
            } else {
                s.find(&needle)
            };
            match byte_pos {
                Some(pos) => Ok(Value::Int(s[..pos].chars().count() as i64)),
                None if name == "index" => Err(rt("substring not found")),
                None => Ok(Value::Int(-1)),
            }
        }
        "count" => {
            expect_args(name, &args, 1, 1)?;
            let needle = expect_str(name, &args[0])?;
            if needle.is_empty() {
                return Ok(Value::Int(s.chars().count() as i64 + 1));
            }
            Ok(Value::Int(s.matches(&needle).count() as i64))
        }
        "isdigit" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        )),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(char::is_alphanumeric),
        )),
        "isspace" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(char::is_whitespace),
        )),
        "islower" => Ok(Value::Bool(
            s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase),
        )),
        "isupper" => Ok(Value::Bool(
            s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase),
        )),
        "zfill" => {
            expect_args(name, &args, 1, 1)?;
            let width = interp.require_int(&args[0])?.max(0) as usize;
            let len = s.chars().count();
            if width <= len {
                return Ok(Value::str(s.to_string()));
            }
            let pad = "0".repeat(width - len);
            let out = if let Some(rest) = s.strip_prefix('-') {
                format!("-{pad}{rest}")
            } else {
                format!("{pad}{s}")
            };
            capped_str(interp, out)
        }
        "format" => {
            // Minimal str.format: auto `{}` and positional `{n}` fields,
            // no format specs (f-strings carry the same restriction).
            let mut out = String::new();
            let mut auto_index = 0usize;
            let mut chars = s.chars().peekable();
            while let Some(c) = chars.next() {
                match c {
                    '{' if chars.peek() == Some(&'{') => {
                        chars.next();
                        out.push('{');
                    }
                    '}' if chars.peek() == Some(&'}') => {
                        chars.next();
                        out.push('}');
                    }
                    '{' => {
                        let mut field = String::new();
                        loop {
                            match chars.next() {
                                Some('}') => break,
                                Some(c) => field.push(c),
                                None => return Err(rt("unmatched '{' in format string")),
                            }
                        }
                        let index = if field.is_empty() {
                            let i = auto_index;
                            auto_index += 1;
                            i
                        } else {
                            field
                                .parse::<usize>()
                                .map_err(|_| rt("format() supports only positional fields"))?
                        };
                        let value = args
                            .get(index)
                            .ok_or_else(|| rt("format() index out of range"))?;
                        out.push_str(&value.display());
                    }
                    c => out.push(c),
                }
            }
            capped_str(interp, out)
        }
        _ => Err(no_such_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Exec<Value> {
    let Value::List(items) = receiver else { unreachable!() };
    match name {
        "append" => {
            expect_args(name, &args, 1, 1)?;
            items.borrow_mut().push(args.into_iter().next().unwrap());
            Ok(Value::None)
        }
        "pop" => {
            expect_args(name, &args, 0, 1)?;
            let mut items = items.borrow_mut();
            let len = items.len();
            if len == 0 {
                return Err(rt("pop from empty list"));
            }
            let idx = match args.first() {
                None => len - 1,
                Some(v) => {
                    let idx = interp.require_int(v)?;
                    crate::sandbox::operators::normalize_index(idx, len)
                        .ok_or_else(|| rt("pop index out of range"))?
                }
            };
            Ok(items.remove(idx))
        }
        "extend" => {
            expect_args(name, &args, 1, 1)?;
            let extra = interp.materialize(args.into_iter().next().unwrap())?;
            for item in extra {
                // Charged per element so repeated self-extension cannot
                // outrun the fuel budget.
                interp.tick()?;
                items.borrow_mut().push(item);
            }
            Ok(Value::None)
        }
        "insert" => {
            expect_args(name, &args, 2, 2)?;
            let mut items = items.borrow_mut();
            let idx = interp.require_int(&args[0])?;
            let len = items.len() as i64;
            let idx = idx.clamp(-len, len);
            let idx = if idx < 0 { (idx + len) as usize } else { idx as usize };
            items.insert(idx, args[1].clone());
            Ok(Value::None)
        }
        "remove" => {
            expect_args(name, &args, 1, 1)?;
            let mut items = items.borrow_mut();
            let pos = items
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .ok_or_else(|| rt("list.remove(x): x not in list"))?;
            items.remove(pos);
            Ok(Value::None)
        }
        "index" => {
            expect_args(name, &args, 1, 1)?;
            let items = items.borrow();
            items
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| rt(format!("{} is not in list", args[0].repr())))
        }
        "count" => {
            expect_args(name, &args, 1, 1)?;
            let count = items
                .borrow()
                .iter()
                .filter(|v| values_equal(v, &args[0]))
                .count();
            Ok(Value::Int(count as i64))
        }
        "sort" => {
            expect_args(name, &args, 0, 0)?;
            let (key, reverse) = interp.sort_options(kwargs)?;
            let snapshot = items.borrow().clone();
            let sorted = interp.sort_items(snapshot, key, reverse)?;
            *items.borrow_mut() = sorted;
            Ok(Value::None)
        }
        "reverse" => {
            expect_args(name, &args, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            expect_args(name, &args, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        _ => Err(no_such_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// dict
// ---------------------------------------------------------------------------

fn dict_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Exec<Value> {
    let Value::Dict(pairs) = receiver else { unreachable!() };
    match name {
        "get" => {
            expect_args(name, &args, 1, 2)?;
            let found = pairs
                .borrow()
                .iter()
                .find(|(k, _)| values_equal(k, &args[0]))
                .map(|(_, v)| v.clone());
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::list(
                pairs.borrow().iter().map(|(k, _)| k.clone()).collect(),
            ))
        }
        "values" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::list(
                pairs.borrow().iter().map(|(_, v)| v.clone()).collect(),
            ))
        }
        "items" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::list(
                pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        "pop" => {
            expect_args(name, &args, 1, 2)?;
            let mut pairs = pairs.borrow_mut();
            match pairs.iter().position(|(k, _)| values_equal(k, &args[0])) {
                Some(pos) => Ok(pairs.remove(pos).1),
                None => args
                    .get(1)
                    .cloned()
                    .ok_or_else(|| rt(format!("KeyError: {}", args[0].repr()))),
            }
        }
        "update" => {
            expect_args(name, &args, 1, 1)?;
            let Value::Dict(other) = &args[0] else {
                return Err(rt(format!(
                    "update() argument must be dict, not '{}'",
                    args[0].type_name()
                )));
            };
            let additions = other.borrow().clone();
            for (k, v) in additions {
                interp.tick()?;
                let mut pairs = pairs.borrow_mut();
                if let Some(slot) = pairs.iter_mut().find(|(k2, _)| values_equal(k2, &k)) {
                    slot.1 = v;
                } else {
                    pairs.push((k, v));
                }
            }
            Ok(Value::None)
        }
        "setdefault" => {
            expect_args(name, &args, 1, 2)?;
            let key = args[0].clone();
            interp.require_hashable(&key)?;
            let mut pairs = pairs.borrow_mut();
            if let Some((_, v)) = pairs.iter().find(|(k, _)| values_equal(k, &key)) {
                return Ok(v.clone());
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            pairs.push((key, default.clone()));
            Ok(default)
        }
        "clear" => {
            expect_args(name, &args, 0, 0)?;
            pairs.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::dict(pairs.borrow().clone()))
        }
        _ => Err(no_such_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

fn set_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> Exec<Value> {
    let Value::Set(items) = receiver else { unreachable!() };
    match name {
        "add" => {
            expect_args(name, &args, 1, 1)?;
            let value = args.into_iter().next().unwrap();
            interp.require_hashable(&value)?;
            let mut items = items.borrow_mut();
            if !items.iter().any(|v| values_equal(v, &value)) {
                items.push(value);
            }
            Ok(Value::None)
        }
        "remove" => {
            expect_args(name, &args, 1, 1)?;
            let mut items = items.borrow_mut();
            match items.iter().position(|v| values_equal(v, &args[0])) {
                Some(pos) => {
                    items.remove(pos);
                    Ok(Value::None)
                }
                None => Err(rt(format!("KeyError: {}", args[0].repr()))),
            }
        }
        "discard" => {
            expect_args(name, &args, 1, 1)?;
            let mut items = items.borrow_mut();
            if let Some(pos) = items.iter().position(|v| values_equal(v, &args[0])) {
                items.remove(pos);
            }
            Ok(Value::None)
        }
        "union" | "intersection" | "difference" => {
            expect_args(name, &args, 1, 1)?;
            let other = interp.materialize(args.into_iter().next().unwrap())?;
            let current = items.borrow().clone();
            let result = match name {
                "union" => {
                    let mut out = current;
                    for item in other {
                        interp.tick()?;
                        interp.require_hashable(&item)?;
                        if !out.iter().any(|v| values_equal(v, &item)) {
                            out.push(item);
                        }
                    }
                    out
                }
                "intersection" => current
                    .into_iter()
                    .filter(|v| other.iter().any(|w| values_equal(v, w)))
                    .collect(),
                _ => current
                    .into_iter()
                    .filter(|v| !other.iter().any(|w| values_equal(v, w)))
                    .collect(),
            };
            Ok(Value::set(result))
        }
        "clear" => {
            expect_args(name, &args, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            expect_args(name, &args, 0, 0)?;
            Ok(Value::set(items.borrow().clone()))
        }
        _ => Err(no_such_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// tuple
// ---------------------------------------------------------------------------

fn tuple_method(receiver: &Value, name: &str, args: Vec<Value>) -> Exec<Value> {
    let Value::Tuple(items) = receiver else { unreachable!() };
    match name {
        "count" => {
            expect_args(name, &args, 1, 1)?;
            let count = items.iter().filter(|v| values_equal(v, &args[0])).count();
            Ok(Value::Int(count as i64))
        }
        "index" => {
            expect_args(name, &args, 1, 1)?;
            items
                .iter()
                .position(|v| values_equal(v, &args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| rt("tuple.index(x): x not in tuple"))
        }
        _ => Err(no_such_method(receiver, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse;
    use crate::sandbox::config::SandboxConfig;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Instant;

    fn run(source: &str) -> (Option<Value>, String) {
        let config = SandboxConfig::default();
        let program = parse(source, config.max_recursion_depth).expect("parse");
        let cancel = Arc::new(AtomicBool::new(false));
        let mut interp = Interpreter::new(
            &config,
            HashMap::new(),
            cancel,
            Instant::now() + config.timeout,
        );
        let value = interp.run(&program).expect("run");
        let (_, output) = interp.into_parts();
        (value, output)
    }

    fn repr(source: &str) -> String {
        run(source).0.expect("value").repr()
    }

    #[test]
    fn test_str_methods() {
        assert_eq!(repr("'hi'.upper()"), "'HI'");
        assert_eq!(repr("'HI'.lower()"), "'hi'");
        assert_eq!(repr("'  x  '.strip()"), "'x'");
        assert_eq!(repr("'a,b,c'.split(',')"), "['a', 'b', 'c']");
        assert_eq!(repr("'a b  c'.split()"), "['a', 'b', 'c']");
        assert_eq!(repr("'-'.join(['a', 'b'])"), "'a-b'");
        assert_eq!(repr("'aaa'.replace('a', 'b')"), "'bbb'");
        assert_eq!(repr("'hello'.startswith('he')"), "True");
        assert_eq!(repr("'hello'.find('llo')"), "2");
        assert_eq!(repr("'hello'.find('z')"), "-1");
        assert_eq!(repr("'banana'.count('an')"), "2");
        assert_eq!(repr("'42'.zfill(5)"), "'00042'");
        assert_eq!(repr("'-42'.zfill(5)"), "'-0042'");
        assert_eq!(repr("'123'.isdigit()"), "True");
        assert_eq!(repr("'ab c'.title()"), "'Ab C'");
        assert_eq!(repr("'{} + {} = {}'.format(1, 2, 3)"), "'1 + 2 = 3'");
        assert_eq!(repr("'{0}{0}'.format('ab')"), "'abab'");
    }

    #[test]
    fn test_list_methods() {
        let (_, output) = run("xs = [3, 1]\nxs.append(2)\nxs.sort()\nprint(xs)");
        assert_eq!(output, "[1, 2, 3]\n");
        assert_eq!(repr("[1, 2, 3].pop()"), "3");
        let (_, output) = run("xs = [1, 2, 3]\nxs.reverse()\nprint(xs)");
        assert_eq!(output, "[3, 2, 1]\n");
        assert_eq!(repr("[1, 2, 2].count(2)"), "2");
        assert_eq!(repr("[1, 2, 3].index(2)"), "1");
        let (_, output) = run("xs = [1]\nxs.extend([2, 3])\nprint(xs)");
        assert_eq!(output, "[1, 2, 3]\n");
        let (_, output) = run("xs = [1, 3]\nxs.insert(1, 2)\nprint(xs)");
        assert_eq!(output, "[1, 2, 3]\n");
        let (_, output) = run("xs = [1, 2]\nys = xs.copy()\nys.append(3)\nprint(xs, ys)");
        assert_eq!(output, "[1, 2] [1, 2, 3]\n");
    }

    #[test]
    fn test_sort_with_reverse_kwarg() {
        let (_, output) = run("xs = [1, 3, 2]\nxs.sort(reverse=True)\nprint(xs)");
        assert_eq!(output, "[3, 2, 1]\n");
    }

    #[test]
    fn test_dict_methods() {
        assert_eq!(repr("{'a': 1}.get('a')"), "1");
        assert_eq!(repr("{'a': 1}.get('b')"), "None");
        assert_eq!(repr("{'a': 1}.get('b', 0)"), "0");
        assert_eq!(repr("{'a': 1, 'b': 2}.keys()"), "['a', 'b']");
        assert_eq!(repr("{'a': 1}.items()"), "[('a', 1)]");
        let (_, output) = run("d = {'a': 1}\nd.update({'b': 2})\nprint(d)");
        assert_eq!(output, "{'a': 1, 'b': 2}\n");
        let (_, output) = run("d = {}\nprint(d.setdefault('k', []))\nprint(d)");
        assert_eq!(output, "[]\n{'k': []}\n");
        assert_eq!(repr("{'a': 1}.pop('a')"), "1");
    }

    #[test]
    fn test_set_methods() {
        let (_, output) = run("s = {1, 2}\ns.add(3)\ns.add(1)\nprint(len(s))");
        assert_eq!(output, "3\n");
        assert_eq!(repr("{1, 2}.union({2, 3})"), "{1, 2, 3}");
        assert_eq!(repr("{1, 2}.intersection({2, 3})"), "{2}");
        assert_eq!(repr("{1, 2}.difference({2, 3})"), "{1}");
        let (_, output) = run("s = {1, 2}\ns.discard(5)\nprint(len(s))");
        assert_eq!(output, "2\n");
    }

    #[test]
    fn test_tuple_methods() {
        assert_eq!(repr("(1, 2, 2).count(2)"), "2");
        assert_eq!(repr("(1, 2).index(2)"), "1");
    }

    #[test]
    fn test_method_errors() {
        let config = SandboxConfig::default();
        let program = parse("[].no_such()", config.max_recursion_depth).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut interp = Interpreter::new(
            &config,
            HashMap::new(),
            cancel,
            Instant::now() + config.timeout,
        );
        match interp.run(&program) {
            Err(ExecFault::Runtime(msg)) => {
                assert!(msg.contains("no attribute 'no_such'"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_mutation_persists_through_alias() {
        let (_, output) = run("d = {'xs': [1]}\nd['xs'].append(2)\nprint(d)");
        assert_eq!(output, "{'xs': [1, 2]}\n");
    }
}
