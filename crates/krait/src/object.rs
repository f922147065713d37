//! Public value type for crossing the host boundary.
//!
//! [`Object`] is the host-facing mirror of the internal value union: it owns
//! all its data, can be freely cloned and serialised, and never exposes
//! interpreter internals. Values that have no direct mapping come back as
//! `Repr`, carrying their Python `repr` text.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{
    exc::PyExc,
    types::dict::{Dict, Set},
    value::Value,
};

/// A Python value that can be passed to or returned from the interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    None,
    Bool(bool),
    /// Integer within the i64 range.
    Int(i64),
    /// Arbitrary-precision integer beyond i64.
    BigInt(BigInt),
    Float(f64),
    String(String),
    List(Vec<Object>),
    Tuple(Vec<Object>),
    /// Insertion-ordered pairs.
    Dict(Vec<(Object, Object)>),
    Set(Vec<Object>),
    /// An exception observed as a value: type name plus message.
    Exception { exc_type: String, message: String },
    /// Output-only: a value with no direct `Object` mapping, rendered as its
    /// Python `repr`.
    Repr(String),
}

impl Object {
    /// Converts an internal value to its public form.
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::None => Self::None,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(v) => match v.to_i64() {
                Some(small) => Self::Int(small),
                None => Self::BigInt(v.clone()),
            },
            Value::Float(v) => Self::Float(*v),
            Value::Str(s) => Self::String(s.to_string()),
            Value::List(items) => Self::List(items.borrow().iter().map(Self::from_value).collect()),
            Value::Tuple(items) => Self::Tuple(items.iter().map(Self::from_value).collect()),
            Value::Dict(d) => Self::Dict(
                d.borrow()
                    .iter()
                    .map(|(k, v)| (Self::from_value(k), Self::from_value(v)))
                    .collect(),
            ),
            Value::Set(s) => Self::Set(s.borrow().iter().map(Self::from_value).collect()),
            other => Self::Repr(other.py_repr()),
        }
    }

    /// Converts a public object to an internal value.
    ///
    /// Fails only for key shapes the dict cannot hash.
    pub(crate) fn to_value(&self) -> Result<Value, PyExc> {
        Ok(match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(v) => Value::int(*v),
            Self::BigInt(v) => Value::Int(v.clone()),
            Self::Float(v) => Value::Float(*v),
            Self::String(s) => Value::str(s),
            Self::Repr(s) => Value::str(s),
            Self::Exception { exc_type, message } => Value::str(format!("{exc_type}: {message}")),
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_value()?);
                }
                Value::list(out)
            }
            Self::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_value()?);
                }
                Value::tuple(out)
            }
            Self::Dict(pairs) => {
                let mut d = Dict::new();
                for (k, v) in pairs {
                    d.insert(k.to_value()?, v.to_value()?)?;
                }
                Value::dict(d)
            }
            Self::Set(items) => {
                let mut s = Set::new();
                for item in items {
                    s.insert(item.to_value()?)?;
                }
                Value::set(s)
            }
        })
    }

    /// Converts from a JSON value, preserving object key order.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::Dict(
                map.iter()
                    .map(|(k, v)| (Self::String(k.clone()), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts to a JSON value. Tuples become arrays; non-string dict keys
    /// are stringified; unrepresentable values become their repr string.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::None => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::BigInt(v) => v
                .to_i64()
                .map_or_else(|| serde_json::Value::String(v.to_string()), serde_json::Value::from),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) | Self::Repr(s) => serde_json::Value::String(s.clone()),
            Self::Exception { exc_type, message } => {
                serde_json::Value::String(format!("{exc_type}: {message}"))
            }
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Dict(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    let key = match k {
                        Self::String(s) => s.clone(),
                        other => match other.to_value() {
                            Ok(v) => v.py_str(),
                            Err(_) => String::from("?"),
                        },
                    };
                    map.insert(key, v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn value_round_trip() {
        let obj = Object::Dict(vec![
            (Object::String("a".into()), Object::Int(1)),
            (Object::String("b".into()), Object::List(vec![Object::Float(2.5), Object::None])),
        ]);
        let value = obj.to_value().unwrap();
        assert_eq!(Object::from_value(&value), obj);
    }

    #[test]
    fn json_round_trip_preserves_order() {
        let json: serde_json::Value = serde_json::from_str(r#"{"z": 1, "a": [true, null]}"#).unwrap();
        let obj = Object::from_json(&json);
        let Object::Dict(pairs) = &obj else { panic!() };
        assert_eq!(pairs[0].0, Object::String("z".into()));
        assert_eq!(obj.to_json(), json);
    }

    #[test]
    fn internal_values_surface_as_repr() {
        let value = Value::Range(crate::value::RangeVal { start: 0, stop: 3, step: 1 });
        assert_eq!(Object::from_value(&value), Object::Repr("range(0, 3)".into()));
    }
}
