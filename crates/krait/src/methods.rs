//! Method dispatch tables for primitive values.
//!
//! Instances resolve methods through their class attribute maps in the
//! evaluator; everything else lands here, keyed by value kind plus method
//! name. Methods that call back into user code (sort keys) or consume
//! arbitrary iterables (extend, join, update) go through the [`MethodHost`]
//! trait so generator driving stays in the evaluator.

use std::cell::RefCell;

use crate::{
    args::Args,
    context::{Context, FileMode},
    exc::{ExcType, PyExc},
    fstring::{FPart, format_value, split_fstring},
    types::dict::{Dict, Set},
    value::Value,
};

/// Evaluator services available to primitive methods.
pub(crate) trait MethodHost {
    /// Calls a user-visible callable with positional arguments.
    fn call_callable(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, PyExc>;
    /// Materialises any iterable, including generators.
    fn materialize(&mut self, value: &Value) -> Result<Vec<Value>, PyExc>;
    /// The execution context, for file-handle methods.
    fn context(&mut self) -> &mut Context;
}

fn no_method(recv: &Value, name: &str) -> PyExc {
    PyExc::attribute_error(recv.type_name(), name)
}

/// Whether a primitive method with this name exists for the receiver kind,
/// used by `getattr` to build bound methods.
pub(crate) fn has_method(recv: &Value, name: &str) -> bool {
    let table: &[&str] = match recv {
        Value::Str(_) => &[
            "upper", "lower", "strip", "lstrip", "rstrip", "split", "splitlines", "join", "startswith",
            "endswith", "replace", "find", "rfind", "index", "count", "capitalize", "title", "casefold",
            "isdigit", "isnumeric", "isalpha", "isalnum", "isspace", "isupper", "islower", "zfill", "ljust",
            "rjust", "center", "format", "removeprefix", "removesuffix",
        ],
        Value::List(_) => &[
            "append", "extend", "insert", "remove", "pop", "clear", "index", "count", "sort", "reverse", "copy",
        ],
        Value::Dict(_) => &[
            "get", "keys", "values", "items", "pop", "popitem", "setdefault", "update", "clear", "copy",
        ],
        Value::Set(_) => &[
            "add", "remove", "discard", "pop", "clear", "copy", "union", "intersection", "difference",
            "symmetric_difference", "issubset", "issuperset", "isdisjoint", "update",
        ],
        Value::Tuple(_) => &["count", "index"],
        Value::File(_) => &["read", "readline", "readlines", "write", "writelines", "close"],
        _ => &[],
    };
    table.contains(&name)
}

/// Dispatches a primitive method call.
pub(crate) fn call_method(
    host: &mut dyn MethodHost,
    recv: &Value,
    name: &str,
    args: Args,
) -> Result<Value, PyExc> {
    match recv {
        Value::Str(s) => str_method(host, s, name, args),
        Value::List(_) => list_method(host, recv, name, args),
        Value::Dict(_) => dict_method(host, recv, name, args),
        Value::Set(_) => set_method(host, recv, name, args),
        Value::Tuple(items) => tuple_method(items, name, args),
        Value::File(id) => file_method(host.context(), *id, name, args),
        other => Err(no_method(other, name)),
    }
}

// --- str -------------------------------------------------------------------

fn str_method(host: &mut dyn MethodHost, s: &str, name: &str, mut args: Args) -> Result<Value, PyExc> {
    let full = |n: &str| format!("str.{n}");
    match name {
        "upper" => {
            args.check_zero(&full(name))?;
            Ok(Value::str(s.to_uppercase()))
        }
        "lower" | "casefold" => {
            args.check_zero(&full(name))?;
            Ok(Value::str(s.to_lowercase()))
        }
        "capitalize" => {
            args.check_zero(&full(name))?;
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            };
            Ok(Value::str(out))
        }
        "title" => {
            args.check_zero(&full(name))?;
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
        "strip" | "lstrip" | "rstrip" => {
            let chars = args.get_up_to(&full(name), 1)?.remove(0);
            let pattern: Option<Vec<char>> = match chars {
                None | Some(Value::None) => None,
                Some(Value::Str(p)) => Some(p.chars().collect()),
                Some(other) => {
                    return Err(PyExc::type_error(format!(
                        "{name} arg must be None or str, not {}",
                        other.type_name()
                    )));
                }
            };
            let matches = |c: char| match &pattern {
                None => c.is_whitespace(),
                Some(set) => set.contains(&c),
            };
            let out = match name {
                "strip" => s.trim_matches(|c| matches(c)),
                "lstrip" => s.trim_start_matches(|c| matches(c)),
                _ => s.trim_end_matches(|c| matches(c)),
            };
            Ok(Value::str(out))
        }
        "split" => {
            let mut parts = args.get_up_to(&full(name), 2)?;
            let maxsplit = match parts.pop().flatten() {
                None | Some(Value::None) => usize::MAX,
                Some(v) => {
                    let n = v.as_index("maxsplit")?;
                    if n < 0 { usize::MAX } else { n as usize }
                }
            };
            match parts.pop().flatten() {
                None | Some(Value::None) => {
                    let mut out: Vec<Value> = Vec::new();
                    let mut rest = s.trim_start();
                    while !rest.is_empty() {
                        if out.len() == maxsplit {
                            out.push(Value::str(rest));
                            rest = "";
                        } else {
                            match rest.find(char::is_whitespace) {
                                Some(idx) => {
                                    out.push(Value::str(&rest[..idx]));
                                    rest = rest[idx..].trim_start();
                                }
                                None => {
                                    out.push(Value::str(rest));
                                    rest = "";
                                }
                            }
                        }
                    }
                    Ok(Value::list(out))
                }
                Some(Value::Str(sep)) => {
                    if sep.is_empty() {
                        return Err(PyExc::value_error("empty separator"));
                    }
                    let out = s
                        .splitn(maxsplit.saturating_add(1), &*sep)
                        .map(Value::str)
                        .collect();
                    Ok(Value::list(out))
                }
                Some(other) => Err(PyExc::type_error(format!(
                    "must be str or None, not {}",
                    other.type_name()
                ))),
            }
        }
        "splitlines" => {
            args.check_zero(&full(name))?;
            Ok(Value::list(s.lines().map(Value::str).collect()))
        }
        "join" => {
            let iterable = args.get_one(&full(name))?;
            let items = host.materialize(&iterable)?;
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                let Value::Str(part) = item else {
                    return Err(PyExc::type_error(format!(
                        "sequence item {i}: expected str instance, {} found",
                        item.type_name()
                    )));
                };
                if i > 0 {
                    out.push_str(s);
                }
                out.push_str(part);
            }
            Ok(Value::str(out))
        }
        "startswith" | "endswith" => {
            let prefix = args.get_one(&full(name))?;
            let test = |p: &str| {
                if name == "startswith" {
                    s.starts_with(p)
                } else {
                    s.ends_with(p)
                }
            };
            match prefix {
                Value::Str(p) => Ok(Value::Bool(test(&p))),
                Value::Tuple(options) => {
                    for option in options.iter() {
                        let Value::Str(p) = option else {
                            return Err(PyExc::type_error(
                                "tuple for startswith must only contain str",
                            ));
                        };
                        if test(p) {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
                other => Err(PyExc::type_error(format!(
                    "{name} first arg must be str or a tuple of str, not {}",
                    other.type_name()
                ))),
            }
        }
        "replace" => {
            let (old, new) = args.get_two(&full(name))?;
            let (Value::Str(old), Value::Str(new)) = (&old, &new) else {
                return Err(PyExc::type_error("replace() arguments must be str"));
            };
            Ok(Value::str(s.replace(&**old, new)))
        }
        "find" | "rfind" | "index" => {
            let needle = args.get_one(&full(name))?;
            let Value::Str(needle) = &needle else {
                return Err(PyExc::type_error("must be str"));
            };
            let byte_pos = if name == "rfind" {
                s.rfind(&**needle)
            } else {
                s.find(&**needle)
            };
            match byte_pos {
                Some(pos) => Ok(Value::int(s[..pos].chars().count() as i64)),
                None if name == "index" => Err(PyExc::value_error("substring not found")),
                None => Ok(Value::int(-1)),
            }
        }
        "count" => {
            let needle = args.get_one(&full(name))?;
            let Value::Str(needle) = &needle else {
                return Err(PyExc::type_error("must be str"));
            };
            if needle.is_empty() {
                return Ok(Value::int(s.chars().count() as i64 + 1));
            }
            Ok(Value::int(s.matches(&**needle).count() as i64))
        }
        "isdigit" | "isnumeric" => {
            args.check_zero(&full(name))?;
            Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())))
        }
        "isalpha" => {
            args.check_zero(&full(name))?;
            Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)))
        }
        "isalnum" => {
            args.check_zero(&full(name))?;
            Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric)))
        }
        "isspace" => {
            args.check_zero(&full(name))?;
            Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace)))
        }
        "isupper" => {
            args.check_zero(&full(name))?;
            let has_cased = s.chars().any(|c| c.is_alphabetic());
            Ok(Value::Bool(has_cased && !s.chars().any(char::is_lowercase)))
        }
        "islower" => {
            args.check_zero(&full(name))?;
            let has_cased = s.chars().any(|c| c.is_alphabetic());
            Ok(Value::Bool(has_cased && !s.chars().any(char::is_uppercase)))
        }
        "zfill" => {
            let width = args.get_one(&full(name))?.as_index("zfill width")?.max(0) as usize;
            let len = s.chars().count();
            if len >= width {
                return Ok(Value::str(s));
            }
            let (sign, rest) = match s.chars().next() {
                Some(c @ ('+' | '-')) => (Some(c), &s[1..]),
                _ => (None, s),
            };
            let mut out = String::new();
            if let Some(c) = sign {
                out.push(c);
            }
            out.push_str(&"0".repeat(width - len));
            out.push_str(rest);
            Ok(Value::str(out))
        }
        "ljust" | "rjust" | "center" => {
            let (width, fill) = args.get_one_two(&full(name))?;
            let width = width.as_index("width")?.max(0) as usize;
            let fill = match fill {
                None => ' ',
                Some(Value::Str(f)) if f.chars().count() == 1 => f.chars().next().unwrap_or(' '),
                Some(_) => {
                    return Err(PyExc::type_error(
                        "the fill character must be exactly one character long",
                    ));
                }
            };
            let len = s.chars().count();
            if len >= width {
                return Ok(Value::str(s));
            }
            let missing = width - len;
            let out = match name {
                "ljust" => format!("{s}{}", fill.to_string().repeat(missing)),
                "rjust" => format!("{}{s}", fill.to_string().repeat(missing)),
                _ => {
                    let left = missing / 2;
                    format!(
                        "{}{s}{}",
                        fill.to_string().repeat(left),
                        fill.to_string().repeat(missing - left)
                    )
                }
            };
            Ok(Value::str(out))
        }
        "removeprefix" => {
            let prefix = args.get_one(&full(name))?;
            let Value::Str(prefix) = &prefix else {
                return Err(PyExc::type_error("argument must be str"));
            };
            Ok(Value::str(s.strip_prefix(&**prefix).unwrap_or(s)))
        }
        "removesuffix" => {
            let suffix = args.get_one(&full(name))?;
            let Value::Str(suffix) = &suffix else {
                return Err(PyExc::type_error("argument must be str"));
            };
            Ok(Value::str(s.strip_suffix(&**suffix).unwrap_or(s)))
        }
        "format" => str_format(s, args),
        _ => Err(no_method(&Value::str(s), name)),
    }
}

/// `str.format` with auto-numbered `{}`, positional `{0}`, and named `{name}`
/// fields, sharing the format-spec engine with f-strings.
fn str_format(template: &str, args: Args) -> Result<Value, PyExc> {
    let parts = split_fstring(template, true)?;
    let mut out = String::new();
    let mut auto = 0usize;
    for part in parts {
        match part {
            FPart::Literal(text) => out.push_str(&text),
            FPart::Field { expr, conversion, spec } => {
                let value = if expr.is_empty() {
                    let v = args.pos.get(auto).ok_or_else(|| {
                        PyExc::new(ExcType::IndexError, "Replacement index out of range")
                    })?;
                    auto += 1;
                    v.clone()
                } else if let Ok(index) = expr.parse::<usize>() {
                    args.pos
                        .get(index)
                        .ok_or_else(|| PyExc::new(ExcType::IndexError, "Replacement index out of range"))?
                        .clone()
                } else {
                    args.kw
                        .iter()
                        .find(|(k, _)| *k == expr)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| PyExc::key_error(&format!("'{expr}'")))?
                };
                let text = match conversion {
                    Some('r') => value.py_repr(),
                    _ => match &spec {
                        Some(spec) => format_value(&value, spec)?,
                        None => value.py_str(),
                    },
                };
                out.push_str(&text);
            }
        }
    }
    Ok(Value::str(out))
}

// --- list ------------------------------------------------------------------

fn list_method(host: &mut dyn MethodHost, recv: &Value, name: &str, mut args: Args) -> Result<Value, PyExc> {
    let Value::List(items) = recv else {
        return Err(PyExc::internal("list method on non-list"));
    };
    let full = |n: &str| format!("list.{n}");
    match name {
        "append" => {
            let item = args.get_one(&full(name))?;
            items.borrow_mut().push(item);
            Ok(Value::None)
        }
        "extend" => {
            let iterable = args.get_one(&full(name))?;
            let new_items = host.materialize(&iterable)?;
            items.borrow_mut().extend(new_items);
            Ok(Value::None)
        }
        "insert" => {
            let (index, item) = args.get_two(&full(name))?;
            let i = index.as_index("insert index")?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let pos = if i < 0 { (i + len).max(0) } else { i.min(len) } as usize;
            items.insert(pos, item);
            Ok(Value::None)
        }
        "remove" => {
            let needle = args.get_one(&full(name))?;
            let mut items = items.borrow_mut();
            match items.iter().position(|v| v.py_eq(&needle)) {
                Some(pos) => {
                    items.remove(pos);
                    Ok(Value::None)
                }
                None => Err(PyExc::value_error("list.remove(x): x not in list")),
            }
        }
        "pop" => {
            let index = args.get_up_to(&full(name), 1)?.remove(0);
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(PyExc::new(ExcType::IndexError, "pop from empty list"));
            }
            let pos = match index {
                None => items.len() - 1,
                Some(v) => {
                    let i = v.as_index("pop index")?;
                    crate::ops::resolve_index(i, items.len())
                        .ok_or_else(|| PyExc::new(ExcType::IndexError, "pop index out of range"))?
                }
            };
            Ok(items.remove(pos))
        }
        "clear" => {
            args.check_zero(&full(name))?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "index" => {
            let needle = args.get_one(&full(name))?;
            let items = items.borrow();
            items
                .iter()
                .position(|v| v.py_eq(&needle))
                .map(|i| Value::int(i as i64))
                .ok_or_else(|| PyExc::value_error(format!("{} is not in list", needle.py_repr())))
        }
        "count" => {
            let needle = args.get_one(&full(name))?;
            let count = items.borrow().iter().filter(|v| v.py_eq(&needle)).count();
            Ok(Value::int(count as i64))
        }
        "reverse" => {
            args.check_zero(&full(name))?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            args.check_zero(&full(name))?;
            let copy = items.borrow().clone();
            Ok(Value::list(copy))
        }
        "sort" => {
            let key = args.take_kw("key");
            let reverse = args.take_kw("reverse").map(|v| v.truthy()).unwrap_or(false);
            args.reject_kw(&full(name))?;
            if !args.pos.is_empty() {
                return Err(PyExc::type_error("sort() takes no positional arguments"));
            }
            let mut snapshot = items.borrow().clone();
            sort_values(host, &mut snapshot, key.as_ref(), reverse)?;
            *items.borrow_mut() = snapshot;
            Ok(Value::None)
        }
        _ => Err(no_method(recv, name)),
    }
}

/// Stable sort with optional key callable. Unorderable elements surface the
/// same TypeError the comparison operator would raise.
pub(crate) fn sort_values(
    host: &mut dyn MethodHost,
    values: &mut Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Result<(), PyExc> {
    let mut decorated: Vec<(Value, Value)> = Vec::with_capacity(values.len());
    for v in values.drain(..) {
        let k = match key {
            Some(Value::None) | None => v.clone(),
            Some(f) => host.call_callable(f, vec![v.clone()])?,
        };
        decorated.push((k, v));
    }
    let error: RefCell<Option<PyExc>> = RefCell::new(None);
    decorated.sort_by(|(a, _), (b, _)| {
        if error.borrow().is_some() {
            return std::cmp::Ordering::Equal;
        }
        match a.py_cmp(b) {
            Some(ordering) => ordering,
            None => {
                *error.borrow_mut() = Some(PyExc::type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    b.type_name(),
                    a.type_name()
                )));
                std::cmp::Ordering::Equal
            }
        }
    });
    if let Some(err) = error.into_inner() {
        return Err(err);
    }
    if reverse {
        decorated.reverse();
    }
    values.extend(decorated.into_iter().map(|(_, v)| v));
    Ok(())
}

// --- dict ------------------------------------------------------------------

fn dict_method(host: &mut dyn MethodHost, recv: &Value, name: &str, args: Args) -> Result<Value, PyExc> {
    let Value::Dict(d) = recv else {
        return Err(PyExc::internal("dict method on non-dict"));
    };
    let full = |n: &str| format!("dict.{n}");
    match name {
        "get" => {
            let (key, default) = args.get_one_two(&full(name))?;
            match d.borrow().get(&key)? {
                Some(v) => Ok(v),
                None => Ok(default.unwrap_or(Value::None)),
            }
        }
        "keys" => {
            args.check_zero(&full(name))?;
            Ok(Value::list(d.borrow().keys().cloned().collect()))
        }
        "values" => {
            args.check_zero(&full(name))?;
            Ok(Value::list(d.borrow().values().cloned().collect()))
        }
        "items" => {
            args.check_zero(&full(name))?;
            Ok(Value::list(
                d.borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        "pop" => {
            let (key, default) = args.get_one_two(&full(name))?;
            match d.borrow_mut().remove(&key)? {
                Some(v) => Ok(v),
                None => default.ok_or_else(|| PyExc::key_error(&key.py_repr())),
            }
        }
        "popitem" => {
            args.check_zero(&full(name))?;
            d.borrow_mut()
                .pop_last()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .ok_or_else(|| PyExc::key_error("'popitem(): dictionary is empty'"))
        }
        "setdefault" => {
            let (key, default) = args.get_one_two(&full(name))?;
            let mut d = d.borrow_mut();
            if let Some(v) = d.get(&key)? {
                return Ok(v);
            }
            let default = default.unwrap_or(Value::None);
            d.insert(key, default.clone())?;
            Ok(default)
        }
        "update" => {
            let other = args.get_one(&full(name))?;
            match &other {
                Value::Dict(other) => {
                    let pairs: Vec<(Value, Value)> = other
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    let mut d = d.borrow_mut();
                    for (k, v) in pairs {
                        d.insert(k, v)?;
                    }
                    Ok(Value::None)
                }
                other_iter => {
                    // An iterable of (key, value) pairs.
                    let items = host.materialize(other_iter)?;
                    let mut d = d.borrow_mut();
                    for item in items {
                        let pair = crate::ops::iter_values(&item)?;
                        let [k, v] = pair.as_slice() else {
                            return Err(PyExc::value_error(
                                "dictionary update sequence element is not a pair",
                            ));
                        };
                        d.insert(k.clone(), v.clone())?;
                    }
                    Ok(Value::None)
                }
            }
        }
        "clear" => {
            args.check_zero(&full(name))?;
            *d.borrow_mut() = Dict::new();
            Ok(Value::None)
        }
        "copy" => {
            args.check_zero(&full(name))?;
            let copy = d.borrow().clone();
            Ok(Value::dict(copy))
        }
        _ => Err(no_method(recv, name)),
    }
}

// --- set -------------------------------------------------------------------

fn set_method(host: &mut dyn MethodHost, recv: &Value, name: &str, args: Args) -> Result<Value, PyExc> {
    let Value::Set(s) = recv else {
        return Err(PyExc::internal("set method on non-set"));
    };
    let full = |n: &str| format!("set.{n}");
    match name {
        "add" => {
            let item = args.get_one(&full(name))?;
            s.borrow_mut().insert(item)?;
            Ok(Value::None)
        }
        "remove" => {
            let item = args.get_one(&full(name))?;
            if s.borrow_mut().remove(&item)? {
                Ok(Value::None)
            } else {
                Err(PyExc::key_error(&item.py_repr()))
            }
        }
        "discard" => {
            let item = args.get_one(&full(name))?;
            s.borrow_mut().remove(&item)?;
            Ok(Value::None)
        }
        "pop" => {
            args.check_zero(&full(name))?;
            s.borrow_mut()
                .pop()
                .ok_or_else(|| PyExc::key_error("'pop from an empty set'"))
        }
        "clear" => {
            args.check_zero(&full(name))?;
            *s.borrow_mut() = Set::new();
            Ok(Value::None)
        }
        "copy" => {
            args.check_zero(&full(name))?;
            let copy = s.borrow().clone();
            Ok(Value::set(copy))
        }
        "union" | "intersection" | "difference" | "symmetric_difference" => {
            let other = args.get_one(&full(name))?;
            let other_items = host.materialize(&other)?;
            let mut other_set = Set::new();
            for item in other_items {
                other_set.insert(item)?;
            }
            let current = s.borrow();
            let mut out = Set::new();
            match name {
                "union" => {
                    for item in current.iter().chain(other_set.iter()) {
                        out.insert(item.clone())?;
                    }
                }
                "intersection" => {
                    for item in current.iter() {
                        if other_set.contains(item)? {
                            out.insert(item.clone())?;
                        }
                    }
                }
                "difference" => {
                    for item in current.iter() {
                        if !other_set.contains(item)? {
                            out.insert(item.clone())?;
                        }
                    }
                }
                _ => {
                    for item in current.iter() {
                        if !other_set.contains(item)? {
                            out.insert(item.clone())?;
                        }
                    }
                    for item in other_set.iter() {
                        if !current.contains(item)? {
                            out.insert(item.clone())?;
                        }
                    }
                }
            }
            Ok(Value::set(out))
        }
        "update" => {
            let other = args.get_one(&full(name))?;
            let items = host.materialize(&other)?;
            let mut s = s.borrow_mut();
            for item in items {
                s.insert(item)?;
            }
            Ok(Value::None)
        }
        "issubset" | "issuperset" | "isdisjoint" => {
            let other = args.get_one(&full(name))?;
            let other_items = host.materialize(&other)?;
            let mut other_set = Set::new();
            for item in other_items {
                other_set.insert(item)?;
            }
            let current = s.borrow();
            let result = match name {
                "issubset" => current.is_subset(&other_set),
                "issuperset" => other_set.is_subset(&current),
                _ => {
                    let mut disjoint = true;
                    for item in current.iter() {
                        if other_set.contains(item)? {
                            disjoint = false;
                            break;
                        }
                    }
                    disjoint
                }
            };
            Ok(Value::Bool(result))
        }
        _ => Err(no_method(recv, name)),
    }
}

// --- tuple -----------------------------------------------------------------

fn tuple_method(items: &std::rc::Rc<Vec<Value>>, name: &str, args: Args) -> Result<Value, PyExc> {
    match name {
        "count" => {
            let needle = args.get_one("tuple.count")?;
            Ok(Value::int(items.iter().filter(|v| v.py_eq(&needle)).count() as i64))
        }
        "index" => {
            let needle = args.get_one("tuple.index")?;
            items
                .iter()
                .position(|v| v.py_eq(&needle))
                .map(|i| Value::int(i as i64))
                .ok_or_else(|| PyExc::value_error("tuple.index(x): x not in tuple"))
        }
        _ => Err(no_method(&Value::Tuple(items.clone()), name)),
    }
}

// --- file handles ----------------------------------------------------------

fn file_method(ctx: &mut Context, id: u64, name: &str, args: Args) -> Result<Value, PyExc> {
    match name {
        "read" => {
            args.check_zero("read")?;
            let handle = ctx.handle_mut(id)?;
            check_open(handle)?;
            let content = handle.content[handle.cursor.min(handle.content.len())..].to_string();
            handle.cursor = handle.content.len();
            Ok(Value::str(content))
        }
        "readline" => {
            args.check_zero("readline")?;
            let handle = ctx.handle_mut(id)?;
            check_open(handle)?;
            let rest = &handle.content[handle.cursor.min(handle.content.len())..];
            let line_end = rest.find('\n').map_or(rest.len(), |i| i + 1);
            let line = rest[..line_end].to_string();
            handle.cursor += line_end;
            Ok(Value::str(line))
        }
        "readlines" => {
            args.check_zero("readlines")?;
            let handle = ctx.handle_mut(id)?;
            check_open(handle)?;
            let rest = handle.content[handle.cursor.min(handle.content.len())..].to_string();
            handle.cursor = handle.content.len();
            let mut lines = Vec::new();
            let mut remaining = rest.as_str();
            while !remaining.is_empty() {
                let line_end = remaining.find('\n').map_or(remaining.len(), |i| i + 1);
                lines.push(Value::str(&remaining[..line_end]));
                remaining = &remaining[line_end..];
            }
            Ok(Value::list(lines))
        }
        "write" => {
            let data = args.get_one("write")?;
            let Value::Str(data) = &data else {
                return Err(PyExc::type_error(format!(
                    "write() argument must be str, not {}",
                    data.type_name()
                )));
            };
            let handle = ctx.handle_mut(id)?;
            check_open(handle)?;
            if handle.mode == FileMode::Read {
                return Err(PyExc::new(ExcType::OSError, "not writable"));
            }
            handle.content.push_str(data);
            let written = data.chars().count() as i64;
            Ok(Value::int(written))
        }
        "writelines" => {
            let lines = args.get_one("writelines")?;
            let items = crate::ops::iter_values(&lines)?;
            let handle = ctx.handle_mut(id)?;
            check_open(handle)?;
            if handle.mode == FileMode::Read {
                return Err(PyExc::new(ExcType::OSError, "not writable"));
            }
            for item in items {
                let Value::Str(line) = &item else {
                    return Err(PyExc::type_error("writelines() argument must be a list of str"));
                };
                handle.content.push_str(line);
            }
            Ok(Value::None)
        }
        "close" => {
            args.check_zero("close")?;
            ctx.close_handle(id)?;
            Ok(Value::None)
        }
        _ => Err(no_method(&Value::File(id), name)),
    }
}

fn check_open(handle: &crate::context::FileHandle) -> Result<(), PyExc> {
    if handle.closed {
        return Err(PyExc::value_error("I/O operation on closed file."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// A host with no callable support, enough for most methods.
    struct TestHost {
        ctx: Context,
    }

    impl MethodHost for TestHost {
        fn call_callable(&mut self, _func: &Value, _args: Vec<Value>) -> Result<Value, PyExc> {
            Err(PyExc::internal("no callables in this test"))
        }

        fn materialize(&mut self, value: &Value) -> Result<Vec<Value>, PyExc> {
            crate::ops::iter_values(value)
        }

        fn context(&mut self) -> &mut Context {
            &mut self.ctx
        }
    }

    fn call_on(recv: &Value, name: &str, pos: Vec<Value>) -> Result<Value, PyExc> {
        let mut host = TestHost {
            ctx: Context::default(),
        };
        call_method(&mut host, recv, name, Args::positional(pos))
    }

    #[test]
    fn str_basics() {
        let s = Value::str("  Hello World  ");
        assert_eq!(call_on(&s, "strip", vec![]).unwrap().py_str(), "Hello World");
        assert_eq!(call_on(&Value::str("abc"), "upper", vec![]).unwrap().py_str(), "ABC");
        assert_eq!(
            call_on(&Value::str("a,b,c"), "split", vec![Value::str(",")])
                .unwrap()
                .py_repr(),
            "['a', 'b', 'c']"
        );
        assert_eq!(
            call_on(&Value::str("-"), "join", vec![Value::list(vec![Value::str("a"), Value::str("b")])])
                .unwrap()
                .py_str(),
            "a-b"
        );
    }

    #[test]
    fn whitespace_split_collapses_runs() {
        let out = call_on(&Value::str("  a  b\t c "), "split", vec![]).unwrap();
        assert_eq!(out.py_repr(), "['a', 'b', 'c']");
    }

    #[test]
    fn str_format_positional_and_named() {
        let out = str_format(
            "{} + {} = {answer}",
            Args {
                pos: vec![Value::int(1), Value::int(2)],
                kw: vec![("answer".to_string(), Value::int(3))],
            },
        )
        .unwrap();
        assert_eq!(out.py_str(), "1 + 2 = 3");
    }

    #[test]
    fn list_mutators() {
        let list = Value::list(vec![Value::int(3), Value::int(1)]);
        call_on(&list, "append", vec![Value::int(2)]).unwrap();
        assert_eq!(list.py_repr(), "[3, 1, 2]");
        call_on(&list, "sort", vec![]).unwrap();
        assert_eq!(list.py_repr(), "[1, 2, 3]");
        call_on(&list, "reverse", vec![]).unwrap();
        assert_eq!(list.py_repr(), "[3, 2, 1]");
        let popped = call_on(&list, "pop", vec![]).unwrap();
        assert_eq!(popped.py_repr(), "1");
        let err = call_on(&list, "remove", vec![Value::int(99)]).unwrap_err();
        assert!(err.message.contains("not in list"));
    }

    #[test]
    fn dict_accessors() {
        let mut d = Dict::new();
        d.insert(Value::str("a"), Value::int(1)).unwrap();
        let dict = Value::dict(d);
        assert_eq!(
            call_on(&dict, "get", vec![Value::str("a")]).unwrap().py_repr(),
            "1"
        );
        assert_eq!(
            call_on(&dict, "get", vec![Value::str("z"), Value::int(0)])
                .unwrap()
                .py_repr(),
            "0"
        );
        assert_eq!(call_on(&dict, "items", vec![]).unwrap().py_repr(), "[('a', 1)]");
        call_on(&dict, "setdefault", vec![Value::str("b"), Value::int(2)]).unwrap();
        assert_eq!(call_on(&dict, "keys", vec![]).unwrap().py_repr(), "['a', 'b']");
    }

    #[test]
    fn set_algebra() {
        let mut a = Set::new();
        a.insert(Value::int(1)).unwrap();
        a.insert(Value::int(2)).unwrap();
        let sa = Value::set(a);
        let b = Value::list(vec![Value::int(2), Value::int(3)]);
        assert_eq!(
            call_on(&sa, "intersection", vec![b.clone()]).unwrap().py_repr(),
            "{2}"
        );
        assert_eq!(
            call_on(&sa, "union", vec![b.clone()]).unwrap().py_repr(),
            "{1, 2, 3}"
        );
        assert_eq!(call_on(&sa, "difference", vec![b]).unwrap().py_repr(), "{1}");
    }

    #[test]
    fn file_read_write() {
        let mut host = TestHost {
            ctx: Context::default(),
        };
        host.ctx.fs_write("in.txt", "line1\nline2\n", false).unwrap();
        let id = host.ctx.open_handle("in.txt", FileMode::Read).unwrap();
        let line = call_method(&mut host, &Value::File(id), "readline", Args::default()).unwrap();
        assert_eq!(line.py_str(), "line1\n");
        let rest = call_method(&mut host, &Value::File(id), "read", Args::default()).unwrap();
        assert_eq!(rest.py_str(), "line2\n");

        let out = host.ctx.open_handle("out.txt", FileMode::Write).unwrap();
        call_method(
            &mut host,
            &Value::File(out),
            "write",
            Args::positional(vec![Value::str("data")]),
        )
        .unwrap();
        call_method(&mut host, &Value::File(out), "close", Args::default()).unwrap();
        assert_eq!(host.ctx.memory_fs().unwrap().get("out.txt"), Some("data"));
    }
}
