//! Built-in functions.
//!
//! One enum variant per builtin; dispatch happens in [`call`]. Name
//! resolution falls back here (and to the exception classes) after the
//! environment misses, so builtins are shadowable by user bindings.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    args::Args,
    ast::BinOp,
    context::{FileMode, StepOutcome},
    eval::{Ev, Interp, Unwind},
    exc::{ExcType, PyExc},
    fstring::format_value,
    methods,
    ops,
    types::{
        dict::{Dict, Set},
        generator::GeneratorObj,
    },
    value::Value,
};

/// The fixed builtin function set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Builtin {
    Print,
    Len,
    Range,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Map,
    Filter,
    Any,
    All,
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
    Set,
    Tuple,
    Type,
    Isinstance,
    Repr,
    Round,
    Ord,
    Chr,
    Divmod,
    Pow,
    Hash,
    Open,
    Next,
    Iter,
    Getattr,
    Setattr,
    Hasattr,
    Format,
    Suspend,
}

impl Builtin {
    pub(crate) fn name(self) -> &'static str {
        self.into()
    }
}

/// Resolves a bare name against the builtin registry and the exception
/// classes.
pub(crate) fn lookup_name(name: &str) -> Option<Value> {
    use Builtin as B;
    let builtin = match name {
        "print" => B::Print,
        "len" => B::Len,
        "range" => B::Range,
        "abs" => B::Abs,
        "min" => B::Min,
        "max" => B::Max,
        "sum" => B::Sum,
        "sorted" => B::Sorted,
        "reversed" => B::Reversed,
        "enumerate" => B::Enumerate,
        "zip" => B::Zip,
        "map" => B::Map,
        "filter" => B::Filter,
        "any" => B::Any,
        "all" => B::All,
        "int" => B::Int,
        "float" => B::Float,
        "str" => B::Str,
        "bool" => B::Bool,
        "list" => B::List,
        "dict" => B::Dict,
        "set" => B::Set,
        "tuple" => B::Tuple,
        "type" => B::Type,
        "isinstance" => B::Isinstance,
        "repr" => B::Repr,
        "round" => B::Round,
        "ord" => B::Ord,
        "chr" => B::Chr,
        "divmod" => B::Divmod,
        "pow" => B::Pow,
        "hash" => B::Hash,
        "open" => B::Open,
        "next" => B::Next,
        "iter" => B::Iter,
        "getattr" => B::Getattr,
        "setattr" => B::Setattr,
        "hasattr" => B::Hasattr,
        "format" => B::Format,
        "suspend" => B::Suspend,
        other => return ExcType::from_name(other).map(Value::ExcClass),
    };
    Some(Value::Builtin(builtin))
}

/// Dispatches a builtin call.
pub(crate) fn call(interp: &mut Interp, builtin: Builtin, mut args: Args) -> Ev<Value> {
    use Builtin as B;
    match builtin {
        B::Print => {
            let sep = match args.take_kw("sep") {
                Some(Value::Str(s)) => s.to_string(),
                Some(Value::None) | None => " ".to_string(),
                Some(other) => {
                    return Err(PyExc::type_error(format!(
                        "sep must be None or a string, not {}",
                        other.type_name()
                    ))
                    .into());
                }
            };
            let _end = args.take_kw("end");
            args.reject_kw("print").map_err(Unwind::Raise)?;
            let mut parts = Vec::with_capacity(args.pos.len());
            for value in &args.pos {
                parts.push(interp.value_str(value)?);
            }
            interp.ctx.print_line(parts.join(&sep));
            Ok(Value::None)
        }
        B::Len => {
            let value = args.get_one("len").map_err(Unwind::Raise)?;
            let len = match &value {
                Value::Str(s) => s.chars().count() as i64,
                Value::List(items) => items.borrow().len() as i64,
                Value::Tuple(items) => items.len() as i64,
                Value::Dict(d) => d.borrow().len() as i64,
                Value::Set(s) => s.borrow().len() as i64,
                Value::Range(r) => r.len(),
                Value::Instance(_) => match interp.try_dunder(&value, "__len__", vec![])? {
                    Some(result) => result.as_index("__len__ result").map_err(Unwind::Raise)?,
                    None => {
                        return Err(PyExc::type_error(format!(
                            "object of type '{}' has no len()",
                            value.type_name()
                        ))
                        .into());
                    }
                },
                other => {
                    return Err(PyExc::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    ))
                    .into());
                }
            };
            Ok(Value::int(len))
        }
        B::Range => {
            let bounds = args.get_up_to("range", 3).map_err(Unwind::Raise)?;
            let (start, stop, step) = match bounds.as_slice() {
                [Some(stop), None, None] => (0, stop.as_index("range stop").map_err(Unwind::Raise)?, 1),
                [Some(start), Some(stop), maybe_step] => (
                    start.as_index("range start").map_err(Unwind::Raise)?,
                    stop.as_index("range stop").map_err(Unwind::Raise)?,
                    match maybe_step {
                        Some(step) => step.as_index("range step").map_err(Unwind::Raise)?,
                        None => 1,
                    },
                ),
                _ => {
                    return Err(PyExc::type_error("range expected at least 1 argument, got 0").into());
                }
            };
            Interp::make_range(start, stop, step).map_err(Unwind::Raise)
        }
        B::Abs => {
            let value = args.get_one("abs").map_err(Unwind::Raise)?;
            match value {
                Value::Bool(b) => Ok(Value::int(i64::from(b))),
                Value::Int(v) => Ok(Value::Int(num_traits::Signed::abs(&v))),
                Value::Float(v) => Ok(Value::Float(v.abs())),
                other => Err(PyExc::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))
                .into()),
            }
        }
        B::Min | B::Max => min_max(interp, builtin, args),
        B::Sum => {
            let (iterable, start) = args.get_one_two("sum").map_err(Unwind::Raise)?;
            let items = interp.iterate_value(&iterable)?;
            let mut total = start.unwrap_or(Value::int(0));
            for item in items {
                total = interp.binary_dispatch(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        B::Sorted => {
            let key = args.take_kw("key");
            let reverse = args.take_kw("reverse").map(|v| v.truthy()).unwrap_or(false);
            args.reject_kw("sorted").map_err(Unwind::Raise)?;
            let iterable = args.get_one("sorted").map_err(Unwind::Raise)?;
            let mut items = interp.iterate_value(&iterable)?;
            methods::sort_values(interp, &mut items, key.as_ref(), reverse).map_err(Unwind::Raise)?;
            Ok(Value::list(items))
        }
        B::Reversed => {
            let value = args.get_one("reversed").map_err(Unwind::Raise)?;
            let mut items = interp.iterate_value(&value)?;
            items.reverse();
            Ok(Value::list(items))
        }
        B::Enumerate => {
            let (iterable, start) = args.get_one_two("enumerate").map_err(Unwind::Raise)?;
            let start = match start {
                Some(v) => v.as_index("enumerate start").map_err(Unwind::Raise)?,
                None => 0,
            };
            let items = interp.iterate_value(&iterable)?;
            Ok(Value::list(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::tuple(vec![Value::int(start + i as i64), v]))
                    .collect(),
            ))
        }
        B::Zip => {
            let mut columns = Vec::with_capacity(args.pos.len());
            for value in &args.pos {
                columns.push(interp.iterate_value(value)?);
            }
            let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut rows = Vec::with_capacity(shortest);
            for i in 0..shortest {
                rows.push(Value::tuple(columns.iter().map(|c| c[i].clone()).collect()));
            }
            Ok(Value::list(rows))
        }
        B::Map => {
            let (func, iterable) = args.get_two("map").map_err(Unwind::Raise)?;
            let items = interp.iterate_value(&iterable)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interp.call_value(&func, Args::positional(vec![item]), 0)?);
            }
            Ok(Value::list(out))
        }
        B::Filter => {
            let (func, iterable) = args.get_two("filter").map_err(Unwind::Raise)?;
            let items = interp.iterate_value(&iterable)?;
            let mut out = Vec::new();
            for item in items {
                let keep = match &func {
                    Value::None => item.truthy(),
                    f => interp.call_value(f, Args::positional(vec![item.clone()]), 0)?.truthy(),
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::list(out))
        }
        B::Any | B::All => {
            let iterable = args.get_one(builtin.name()).map_err(Unwind::Raise)?;
            let items = interp.iterate_value(&iterable)?;
            let result = if builtin == B::Any {
                items.iter().any(Value::truthy)
            } else {
                items.iter().all(Value::truthy)
            };
            Ok(Value::Bool(result))
        }
        B::Int => convert_int(args),
        B::Float => {
            let value = args.get_up_to("float", 1).map_err(Unwind::Raise)?.remove(0);
            match value {
                None => Ok(Value::Float(0.0)),
                Some(Value::Bool(b)) => Ok(Value::Float(f64::from(i8::from(b)))),
                Some(Value::Int(v)) => Ok(Value::Float(v.to_f64().unwrap_or(f64::INFINITY))),
                Some(Value::Float(v)) => Ok(Value::Float(v)),
                Some(Value::Str(s)) => {
                    let trimmed = s.trim();
                    let parsed = match trimmed {
                        "inf" | "+inf" | "Infinity" | "infinity" => Some(f64::INFINITY),
                        "-inf" | "-Infinity" | "-infinity" => Some(f64::NEG_INFINITY),
                        "nan" | "+nan" | "-nan" => Some(f64::NAN),
                        other => other.parse().ok(),
                    };
                    parsed.map(Value::Float).ok_or_else(|| {
                        PyExc::value_error(format!("could not convert string to float: '{s}'")).into()
                    })
                }
                Some(other) => Err(PyExc::type_error(format!(
                    "float() argument must be a string or a real number, not '{}'",
                    other.type_name()
                ))
                .into()),
            }
        }
        B::Str => {
            let value = args.get_up_to("str", 1).map_err(Unwind::Raise)?.remove(0);
            match value {
                None => Ok(Value::str("")),
                Some(v) => {
                    let text = interp.value_str(&v)?;
                    Ok(Value::str(text))
                }
            }
        }
        B::Bool => {
            let value = args.get_up_to("bool", 1).map_err(Unwind::Raise)?.remove(0);
            Ok(Value::Bool(value.map(|v| v.truthy()).unwrap_or(false)))
        }
        B::List => {
            let value = args.get_up_to("list", 1).map_err(Unwind::Raise)?.remove(0);
            match value {
                None => Ok(Value::list(Vec::new())),
                Some(v) => Ok(Value::list(interp.iterate_value(&v)?)),
            }
        }
        B::Dict => {
            let mut d = Dict::new();
            if let Some(value) = args.pos.first() {
                match value {
                    Value::Dict(other) => {
                        for (k, v) in other.borrow().iter() {
                            d.insert(k.clone(), v.clone()).map_err(Unwind::Raise)?;
                        }
                    }
                    other => {
                        let pairs = interp.iterate_value(other)?;
                        for pair in pairs {
                            let kv = interp.iterate_value(&pair)?;
                            let [k, v] = kv.as_slice() else {
                                return Err(PyExc::value_error(
                                    "dictionary update sequence element is not a pair",
                                )
                                .into());
                            };
                            d.insert(k.clone(), v.clone()).map_err(Unwind::Raise)?;
                        }
                    }
                }
            }
            for (key, value) in args.kw {
                d.insert(Value::str(&key), value).map_err(Unwind::Raise)?;
            }
            Ok(Value::dict(d))
        }
        B::Set => {
            let value = args.get_up_to("set", 1).map_err(Unwind::Raise)?.remove(0);
            let mut s = Set::new();
            if let Some(v) = value {
                for item in interp.iterate_value(&v)? {
                    s.insert(item).map_err(Unwind::Raise)?;
                }
            }
            Ok(Value::set(s))
        }
        B::Tuple => {
            let value = args.get_up_to("tuple", 1).map_err(Unwind::Raise)?.remove(0);
            match value {
                None => Ok(Value::tuple(Vec::new())),
                Some(v) => Ok(Value::tuple(interp.iterate_value(&v)?)),
            }
        }
        B::Type => {
            let value = args.get_one("type").map_err(Unwind::Raise)?;
            Ok(match &value {
                Value::Instance(inst) => Value::Class(inst.class.clone()),
                Value::ExcInstance(inst) => Value::ExcClass(inst.exc_type),
                Value::Bool(_) => Value::Builtin(Builtin::Bool),
                Value::Int(_) => Value::Builtin(Builtin::Int),
                Value::Float(_) => Value::Builtin(Builtin::Float),
                Value::Str(_) => Value::Builtin(Builtin::Str),
                Value::List(_) => Value::Builtin(Builtin::List),
                Value::Dict(_) => Value::Builtin(Builtin::Dict),
                Value::Set(_) => Value::Builtin(Builtin::Set),
                Value::Tuple(_) => Value::Builtin(Builtin::Tuple),
                Value::Range(_) => Value::Builtin(Builtin::Range),
                other => Value::str(format!("<class '{}'>", other.type_name())),
            })
        }
        B::Isinstance => {
            let (value, class) = args.get_two("isinstance").map_err(Unwind::Raise)?;
            let result = interp.isinstance_check(&value, &class).map_err(Unwind::Raise)?;
            Ok(Value::Bool(result))
        }
        B::Repr => {
            let value = args.get_one("repr").map_err(Unwind::Raise)?;
            let text = interp.value_repr(&value)?;
            Ok(Value::str(text))
        }
        B::Round => round_builtin(args),
        B::Ord => {
            let value = args.get_one("ord").map_err(Unwind::Raise)?;
            let Value::Str(s) = &value else {
                return Err(PyExc::type_error(format!(
                    "ord() expected string of length 1, but {} found",
                    value.type_name()
                ))
                .into());
            };
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::int(c as i64)),
                _ => Err(PyExc::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))
                .into()),
            }
        }
        B::Chr => {
            let code = args.get_one("chr").map_err(Unwind::Raise)?;
            let code = code.as_index("chr code").map_err(Unwind::Raise)?;
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| PyExc::value_error("chr() arg not in range(0x110000)"))
                .map_err(Unwind::Raise)?;
            Ok(Value::str(c.to_string()))
        }
        B::Divmod => {
            let (a, b) = args.get_two("divmod").map_err(Unwind::Raise)?;
            let q = ops::binary(BinOp::FloorDiv, &a, &b).map_err(Unwind::Raise)?;
            let r = ops::binary(BinOp::Mod, &a, &b).map_err(Unwind::Raise)?;
            Ok(Value::tuple(vec![q, r]))
        }
        B::Pow => {
            let bounds = args.get_up_to("pow", 3).map_err(Unwind::Raise)?;
            match bounds.as_slice() {
                [Some(a), Some(b), None] => ops::binary(BinOp::Pow, a, b).map_err(Unwind::Raise),
                [Some(a), Some(b), Some(m)] => {
                    let (Value::Int(a), Value::Int(b), Value::Int(m)) = (a, b, m) else {
                        return Err(PyExc::type_error(
                            "pow() 3rd argument not allowed unless all arguments are integers",
                        )
                        .into());
                    };
                    if m.to_i64() == Some(0) {
                        return Err(PyExc::value_error("pow() 3rd argument cannot be 0").into());
                    }
                    if num_traits::Signed::is_negative(b) {
                        return Err(PyExc::value_error(
                            "pow() 2nd argument cannot be negative when 3rd argument specified",
                        )
                        .into());
                    }
                    Ok(Value::Int(a.modpow(b, m)))
                }
                _ => Err(PyExc::type_error("pow expected at least 2 arguments").into()),
            }
        }
        B::Hash => {
            let value = args.get_one("hash").map_err(Unwind::Raise)?;
            let h = value.py_hash().map_err(Unwind::Raise)?;
            Ok(Value::int(i64::from_ne_bytes(h.to_ne_bytes())))
        }
        B::Open => {
            let (path, mode) = args.get_one_two("open").map_err(Unwind::Raise)?;
            let Value::Str(path) = &path else {
                return Err(PyExc::type_error(format!(
                    "expected str, bytes or os.PathLike object, not {}",
                    path.type_name()
                ))
                .into());
            };
            let mode = match mode {
                None => FileMode::Read,
                Some(Value::Str(m)) => match &*m {
                    "r" | "rt" => FileMode::Read,
                    "w" | "wt" => FileMode::Write,
                    "a" | "at" => FileMode::Append,
                    other => {
                        return Err(PyExc::value_error(format!("invalid mode: '{other}'")).into());
                    }
                },
                Some(other) => {
                    return Err(PyExc::type_error(format!(
                        "open() mode must be str, not {}",
                        other.type_name()
                    ))
                    .into());
                }
            };
            let id = interp.ctx.open_handle(path, mode).map_err(Unwind::Raise)?;
            Ok(Value::File(id))
        }
        B::Next => {
            let (r#gen, default) = args.get_one_two("next").map_err(Unwind::Raise)?;
            let Value::Generator(r#gen) = &r#gen else {
                return Err(PyExc::type_error(format!(
                    "'{}' object is not an iterator",
                    r#gen.type_name()
                ))
                .into());
            };
            let r#gen = r#gen.clone();
            match interp.gen_next(&r#gen)? {
                Some(value) => Ok(value),
                None => match default {
                    Some(value) => Ok(value),
                    None => Err(PyExc::new(ExcType::StopIteration, "").into()),
                },
            }
        }
        B::Iter => {
            let value = args.get_one("iter").map_err(Unwind::Raise)?;
            if let Value::Generator(_) = &value {
                return Ok(value);
            }
            let items = interp.iterate_value(&value)?;
            Ok(Value::Generator(Rc::new(std::cell::RefCell::new(
                GeneratorObj::materialized("<iterator>".to_string(), items),
            ))))
        }
        B::Getattr => {
            let bounds = args.get_up_to("getattr", 3).map_err(Unwind::Raise)?;
            let [Some(obj), Some(name), default] = bounds.as_slice() else {
                return Err(PyExc::type_error("getattr expected at least 2 arguments").into());
            };
            let Value::Str(name) = name else {
                return Err(PyExc::type_error("attribute name must be string").into());
            };
            match interp.get_attr(obj, name) {
                Ok(value) => Ok(value),
                Err(Unwind::Raise(_)) if default.is_some() => Ok(default.clone().unwrap_or(Value::None)),
                Err(other) => Err(other),
            }
        }
        B::Setattr => {
            let bounds = args.get_up_to("setattr", 3).map_err(Unwind::Raise)?;
            let [Some(obj), Some(name), Some(value)] = bounds.as_slice() else {
                return Err(PyExc::type_error("setattr expected 3 arguments").into());
            };
            let Value::Str(name) = name else {
                return Err(PyExc::type_error("attribute name must be string").into());
            };
            interp.set_attr(obj, name, value.clone()).map_err(Unwind::Raise)?;
            Ok(Value::None)
        }
        B::Hasattr => {
            let (obj, name) = args.get_two("hasattr").map_err(Unwind::Raise)?;
            let Value::Str(name) = &name else {
                return Err(PyExc::type_error("attribute name must be string").into());
            };
            Ok(Value::Bool(interp.get_attr(&obj, name).is_ok()))
        }
        B::Format => {
            let (value, spec) = args.get_one_two("format").map_err(Unwind::Raise)?;
            let spec = match spec {
                None => String::new(),
                Some(Value::Str(s)) => s.to_string(),
                Some(other) => {
                    return Err(PyExc::type_error(format!(
                        "format() argument 2 must be str, not {}",
                        other.type_name()
                    ))
                    .into());
                }
            };
            Ok(Value::str(format_value(&value, &spec).map_err(Unwind::Raise)?))
        }
        B::Suspend => {
            args.check_zero("suspend").map_err(Unwind::Raise)?;
            match interp.ctx.next_step() {
                // Already suspended here in a previous run: keep going.
                StepOutcome::Replay(_) => Ok(Value::None),
                StepOutcome::Live => {
                    interp
                        .ctx
                        .record(crate::context::EventKind::Suspend, serde_json::Value::Null);
                    Err(Unwind::Suspend)
                }
            }
        }
    }
}

fn min_max(interp: &mut Interp, builtin: Builtin, mut args: Args) -> Ev<Value> {
    let name = builtin.name();
    let key = args.take_kw("key");
    let default = args.take_kw("default");
    args.reject_kw(name).map_err(Unwind::Raise)?;
    let items = if args.pos.len() == 1 {
        interp.iterate_value(&args.pos[0])?
    } else {
        args.pos
    };
    if items.is_empty() {
        return match default {
            Some(value) => Ok(value),
            None => Err(PyExc::value_error(format!("{name}() arg is an empty sequence")).into()),
        };
    }
    let mut best = items[0].clone();
    let mut best_key = match &key {
        Some(f) => interp.call_value(f, Args::positional(vec![best.clone()]), 0)?,
        None => best.clone(),
    };
    for item in &items[1..] {
        let item_key = match &key {
            Some(f) => interp.call_value(f, Args::positional(vec![item.clone()]), 0)?,
            None => item.clone(),
        };
        let Some(ordering) = item_key.py_cmp(&best_key) else {
            return Err(PyExc::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                item_key.type_name(),
                best_key.type_name()
            ))
            .into());
        };
        let better = if builtin == Builtin::Min {
            ordering == std::cmp::Ordering::Less
        } else {
            ordering == std::cmp::Ordering::Greater
        };
        if better {
            best = item.clone();
            best_key = item_key;
        }
    }
    Ok(best)
}

fn convert_int(args: Args) -> Ev<Value> {
    let bounds = args.get_up_to("int", 2).map_err(Unwind::Raise)?;
    match bounds.as_slice() {
        [None, None] => Ok(Value::int(0)),
        [Some(value), None] => match value {
            Value::Bool(b) => Ok(Value::int(i64::from(*b))),
            Value::Int(_) => Ok(value.clone()),
            Value::Float(f) => {
                if f.is_nan() {
                    return Err(PyExc::value_error("cannot convert float NaN to integer").into());
                }
                if f.is_infinite() {
                    return Err(
                        PyExc::new(ExcType::OverflowError, "cannot convert float infinity to integer").into(),
                    );
                }
                Ok(Value::Int(BigInt::from(f.trunc() as i128)))
            }
            Value::Str(s) => parse_int_str(s, 10),
            other => Err(PyExc::type_error(format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ))
            .into()),
        },
        [Some(value), Some(base)] => {
            let Value::Str(s) = value else {
                return Err(PyExc::type_error("int() can't convert non-string with explicit base").into());
            };
            let base = base.as_index("int base").map_err(Unwind::Raise)?;
            if !(2..=36).contains(&base) {
                return Err(PyExc::value_error("int() base must be >= 2 and <= 36, or 0").into());
            }
            parse_int_str(s, base as u32)
        }
        _ => Err(PyExc::type_error("int() takes at most 2 arguments").into()),
    }
}

fn parse_int_str(s: &str, base: u32) -> Ev<Value> {
    use num_traits::Num;
    let trimmed = s.trim().replace('_', "");
    let cleaned = match base {
        16 => trimmed.trim_start_matches("0x").trim_start_matches("0X").to_string(),
        8 => trimmed.trim_start_matches("0o").trim_start_matches("0O").to_string(),
        2 => trimmed.trim_start_matches("0b").trim_start_matches("0B").to_string(),
        _ => trimmed,
    };
    BigInt::from_str_radix(&cleaned, base)
        .map(Value::Int)
        .map_err(|_| {
            PyExc::value_error(format!(
                "invalid literal for int() with base {base}: {}",
                crate::value::str_repr(s)
            ))
            .into()
        })
}

fn round_builtin(args: Args) -> Ev<Value> {
    let (value, ndigits) = args.get_one_two("round").map_err(Unwind::Raise)?;
    let ndigits = match ndigits {
        None | Some(Value::None) => None,
        Some(v) => Some(v.as_index("ndigits").map_err(Unwind::Raise)?),
    };
    match (&value, ndigits) {
        (Value::Int(_) | Value::Bool(_), None) => Ok(value.clone()),
        (Value::Int(_) | Value::Bool(_), Some(_)) => Ok(value.clone()),
        (Value::Float(f), None) => {
            // Banker's rounding, matching Python.
            let rounded = f.round_ties_even();
            Ok(Value::Int(BigInt::from(rounded as i128)))
        }
        (Value::Float(f), Some(n)) => {
            let factor = 10f64.powi(n as i32);
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (other, _) => Err(PyExc::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))
        .into()),
    }
}
