//! Implementation of the `json` module: `dumps` and `loads` over the
//! serde_json bridge, with object key order preserved.

use crate::{
    args::Args,
    eval::{Ev, Unwind},
    exc::{ExcType, PyExc},
    object::Object,
    value::Value,
};

use super::{ModuleFn, module_value};

pub(crate) fn module() -> Value {
    module_value(
        "json",
        vec![
            ("dumps", Value::ModuleFn(ModuleFn::JsonDumps)),
            ("loads", Value::ModuleFn(ModuleFn::JsonLoads)),
        ],
    )
}

pub(crate) fn call(function: ModuleFn, mut args: Args) -> Ev<Value> {
    match function {
        ModuleFn::JsonDumps => {
            let indent = args.take_kw("indent");
            args.reject_kw("dumps").map_err(Unwind::Raise)?;
            let value = args.get_one("dumps").map_err(Unwind::Raise)?;
            check_serialisable(&value, 0).map_err(Unwind::Raise)?;
            let json = Object::from_value(&value).to_json();
            let text = match indent {
                Some(Value::None) | None => serde_json::to_string(&json),
                Some(_) => serde_json::to_string_pretty(&json),
            }
            .map_err(|e| Unwind::Raise(PyExc::value_error(format!("Out of range float values: {e}"))))?;
            Ok(Value::str(text))
        }
        ModuleFn::JsonLoads => {
            let text = args.get_one("loads").map_err(Unwind::Raise)?;
            let Value::Str(text) = &text else {
                return Err(PyExc::type_error(format!(
                    "the JSON object must be str, not {}",
                    text.type_name()
                ))
                .into());
            };
            let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
                Unwind::Raise(PyExc::new(
                    ExcType::JSONDecodeError,
                    format!("Expecting value: {e}"),
                ))
            })?;
            Ok(Object::from_json(&json).to_value().map_err(Unwind::Raise)?)
        }
        other => Err(PyExc::internal(format!("json dispatch for {}", other.name())).into()),
    }
}

/// Rejects values JSON cannot represent, with CPython's message shape.
fn check_serialisable(value: &Value, depth: u32) -> Result<(), PyExc> {
    if depth > 50 {
        return Err(PyExc::value_error("Circular reference detected"));
    }
    match value {
        Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => Ok(()),
        Value::List(items) => {
            for item in items.borrow().iter() {
                check_serialisable(item, depth + 1)?;
            }
            Ok(())
        }
        Value::Tuple(items) => {
            for item in items.iter() {
                check_serialisable(item, depth + 1)?;
            }
            Ok(())
        }
        Value::Dict(d) => {
            for (key, item) in d.borrow().iter() {
                if !matches!(key, Value::Str(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::None) {
                    return Err(PyExc::type_error(format!(
                        "keys must be str, int, float, bool or None, not {}",
                        key.type_name()
                    )));
                }
                check_serialisable(item, depth + 1)?;
            }
            Ok(())
        }
        other => Err(PyExc::type_error(format!(
            "Object of type {} is not JSON serializable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::dict::Dict;

    #[test]
    fn dumps_preserves_key_order() {
        let mut d = Dict::new();
        d.insert(Value::str("z"), Value::int(1)).unwrap();
        d.insert(Value::str("a"), Value::int(2)).unwrap();
        let out = call(ModuleFn::JsonDumps, Args::positional(vec![Value::dict(d)])).unwrap();
        assert_eq!(out.py_str(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn loads_round_trip() {
        let out = call(
            ModuleFn::JsonLoads,
            Args::positional(vec![Value::str(r#"{"a": [1, 2.5, null, true]}"#)]),
        )
        .unwrap();
        assert_eq!(out.py_repr(), "{'a': [1, 2.5, None, True]}");
    }

    #[test]
    fn loads_error_is_json_decode_error() {
        let err = call(ModuleFn::JsonLoads, Args::positional(vec![Value::str("{bad")])).unwrap_err();
        let crate::eval::Unwind::Raise(exc) = err else { panic!() };
        assert_eq!(exc.exc_type(), Some(ExcType::JSONDecodeError));
        // JSONDecodeError is caught by `except ValueError`.
        assert!(exc.matches_name("ValueError"));
    }

    #[test]
    fn unserialisable_rejected() {
        let err = call(
            ModuleFn::JsonDumps,
            Args::positional(vec![Value::set(crate::types::dict::Set::new())]),
        )
        .unwrap_err();
        let crate::eval::Unwind::Raise(exc) = err else { panic!() };
        assert!(exc.message.contains("not JSON serializable"));
    }
}
