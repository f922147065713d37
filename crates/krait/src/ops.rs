//! Polymorphic operators over runtime values.
//!
//! Arithmetic, comparison, membership, subscription, and iteration for the
//! primitive kinds. Instances get a chance at their dunder methods in the
//! evaluator before these tables run; everything that falls through here and
//! doesn't match raises a CPython-style TypeError.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    ast::{BinOp, CmpOp, UnaryOp},
    exc::{ExcType, PyExc},
    types::dict::{Dict, Set},
    value::{RangeVal, Value},
};

/// Guard for results that would allocate absurd amounts of memory
/// (`2 ** 10_000_000`, `"a" * 10**9`). Checked before the operation runs.
const LARGE_RESULT_LIMIT: u64 = 50_000_000;

/// Applies a binary operator to primitive operands.
pub(crate) fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, PyExc> {
    use BinOp as B;
    match op {
        B::Add => add(left, right),
        B::Sub => sub(left, right),
        B::Mul => mul(left, right),
        B::Div => div(left, right),
        B::FloorDiv => floordiv(left, right),
        B::Mod => modulo(left, right),
        B::Pow => power(left, right),
        B::BitAnd => bitop(op, left, right),
        B::BitOr => bitop(op, left, right),
        B::BitXor => bitop(op, left, right),
        B::Shl | B::Shr => shift(op, left, right),
        B::MatMul => Err(unsupported(op, left, right)),
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> PyExc {
    PyExc::unsupported_binop(op.symbol(), left.type_name(), right.type_name())
}

/// Integer view including bool coercion.
fn as_int(v: &Value) -> Option<BigInt> {
    match v {
        Value::Bool(b) => Some(BigInt::from(i64::from(*b))),
        Value::Int(v) => Some(v.clone()),
        _ => None,
    }
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Bool(b) => Some(f64::from(i8::from(*b))),
        Value::Int(v) => Some(v.to_f64().unwrap_or(f64::INFINITY)),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

fn is_float(v: &Value) -> bool {
    matches!(v, Value::Float(_))
}

fn add(left: &Value, right: &Value) -> Result<Value, PyExc> {
    if is_float(left) || is_float(right) {
        if let (Some(a), Some(b)) = (as_float(left), as_float(right)) {
            return Ok(Value::Float(a + b));
        }
    }
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return Ok(Value::Int(a + b));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::str(s))
        }
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        _ => Err(unsupported(BinOp::Add, left, right)),
    }
}

fn sub(left: &Value, right: &Value) -> Result<Value, PyExc> {
    if is_float(left) || is_float(right) {
        if let (Some(a), Some(b)) = (as_float(left), as_float(right)) {
            return Ok(Value::Float(a - b));
        }
    }
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return Ok(Value::Int(a - b));
    }
    if let (Value::Set(a), Value::Set(b)) = (left, right) {
        let (a, b) = (a.borrow(), b.borrow());
        let mut out = Set::new();
        for item in a.iter() {
            if !b.contains(item)? {
                out.insert(item.clone())?;
            }
        }
        return Ok(Value::set(out));
    }
    Err(unsupported(BinOp::Sub, left, right))
}

fn mul(left: &Value, right: &Value) -> Result<Value, PyExc> {
    if is_float(left) || is_float(right) {
        if let (Some(a), Some(b)) = (as_float(left), as_float(right)) {
            return Ok(Value::Float(a * b));
        }
    }
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return Ok(Value::Int(a * b));
    }
    // Sequence repetition commutes: "ab" * 3 == 3 * "ab".
    let (seq, count) = match (as_int(left), as_int(right)) {
        (Some(n), None) => (right, n),
        (None, Some(n)) => (left, n),
        _ => return Err(unsupported(BinOp::Mul, left, right)),
    };
    let count = count.to_i64().unwrap_or(i64::MAX).max(0) as u64;
    match seq {
        Value::Str(s) => {
            check_result_size(s.len() as u64 * count)?;
            Ok(Value::str(s.repeat(count as usize)))
        }
        Value::List(items) => {
            let items = items.borrow();
            check_result_size(items.len() as u64 * count)?;
            let mut out = Vec::with_capacity(items.len() * count as usize);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        Value::Tuple(items) => {
            check_result_size(items.len() as u64 * count)?;
            let mut out = Vec::with_capacity(items.len() * count as usize);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::tuple(out))
        }
        _ => Err(unsupported(BinOp::Mul, left, right)),
    }
}

fn check_result_size(estimate: u64) -> Result<(), PyExc> {
    if estimate > LARGE_RESULT_LIMIT {
        return Err(PyExc::new(
            ExcType::MemoryError,
            "result is too large for the sandbox",
        ));
    }
    Ok(())
}

fn div(left: &Value, right: &Value) -> Result<Value, PyExc> {
    let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
        return Err(unsupported(BinOp::Div, left, right));
    };
    if b == 0.0 {
        let message = if is_float(left) || is_float(right) {
            "float division by zero"
        } else {
            "division by zero"
        };
        return Err(PyExc::zero_division(message));
    }
    Ok(Value::Float(a / b))
}

fn floordiv(left: &Value, right: &Value) -> Result<Value, PyExc> {
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        if !is_float(left) && !is_float(right) {
            if b.is_zero() {
                return Err(PyExc::zero_division("integer division or modulo by zero"));
            }
            // Floors toward negative infinity, matching Python for negative
            // operands.
            return Ok(Value::Int(a.div_floor(&b)));
        }
    }
    let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
        return Err(unsupported(BinOp::FloorDiv, left, right));
    };
    if b == 0.0 {
        return Err(PyExc::zero_division("float floor division by zero"));
    }
    Ok(Value::Float((a / b).floor()))
}

fn modulo(left: &Value, right: &Value) -> Result<Value, PyExc> {
    // `%` on a string is printf-style formatting.
    if let Value::Str(template) = left {
        return percent_format(template, right);
    }
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        if !is_float(left) && !is_float(right) {
            if b.is_zero() {
                return Err(PyExc::zero_division("integer division or modulo by zero"));
            }
            // Result carries the divisor's sign.
            return Ok(Value::Int(a.mod_floor(&b)));
        }
    }
    let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
        return Err(unsupported(BinOp::Mod, left, right));
    };
    if b == 0.0 {
        return Err(PyExc::zero_division("float modulo"));
    }
    let r = a - b * (a / b).floor();
    Ok(Value::Float(r))
}

/// Minimal printf-style string formatting: `%s %r %d %f %x %%`.
fn percent_format(template: &str, args: &Value) -> Result<Value, PyExc> {
    let items: Vec<Value> = match args {
        Value::Tuple(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    let mut out = String::new();
    let mut index = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(spec) = chars.next() else {
            return Err(PyExc::value_error("incomplete format"));
        };
        if spec == '%' {
            out.push('%');
            continue;
        }
        let arg = items.get(index).ok_or_else(|| {
            PyExc::type_error("not enough arguments for format string")
        })?;
        index += 1;
        match spec {
            's' => out.push_str(&arg.py_str()),
            'r' => out.push_str(&arg.py_repr()),
            'd' | 'i' => match as_int(arg) {
                Some(v) => out.push_str(&v.to_string()),
                None => match arg {
                    Value::Float(f) => out.push_str(&BigInt::from(*f as i64).to_string()),
                    _ => {
                        return Err(PyExc::type_error(format!(
                            "%d format: a real number is required, not {}",
                            arg.type_name()
                        )));
                    }
                },
            },
            'f' => match as_float(arg) {
                Some(v) => {
                    out.push_str(&format!("{v:.6}"));
                }
                None => {
                    return Err(PyExc::type_error(format!(
                        "%f format: a real number is required, not {}",
                        arg.type_name()
                    )));
                }
            },
            'x' => match as_int(arg) {
                Some(v) => out.push_str(&format!("{v:x}")),
                None => return Err(PyExc::type_error("%x format: an integer is required")),
            },
            other => {
                return Err(PyExc::value_error(format!(
                    "unsupported format character '{other}'"
                )));
            }
        }
    }
    if index < items.len() && matches!(args, Value::Tuple(_)) {
        return Err(PyExc::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(Value::str(out))
}

fn power(left: &Value, right: &Value) -> Result<Value, PyExc> {
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        if !is_float(left) && !is_float(right) {
            if b.is_negative() {
                let (af, bf) = (
                    a.to_f64().unwrap_or(f64::NAN),
                    b.to_f64().unwrap_or(f64::NAN),
                );
                if af == 0.0 {
                    return Err(PyExc::zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float(af.powf(bf)));
            }
            // The result needs roughly `exponent * bits(base)` bits; reject
            // sizes that would grind the sandbox before allocating them.
            const POW_RESULT_BITS_LIMIT: u64 = 1_000_000;
            let exp = b
                .to_u32()
                .filter(|e| u64::from(*e) * (a.bits().max(1)) <= POW_RESULT_BITS_LIMIT)
                .ok_or_else(|| {
                    PyExc::new(ExcType::OverflowError, "exponent too large for the sandbox")
                })?;
            return Ok(Value::Int(a.pow(exp)));
        }
    }
    let (Some(a), Some(b)) = (as_float(left), as_float(right)) else {
        return Err(unsupported(BinOp::Pow, left, right));
    };
    if a == 0.0 && b < 0.0 {
        return Err(PyExc::zero_division("0.0 cannot be raised to a negative power"));
    }
    Ok(Value::Float(a.powf(b)))
}

fn bitop(op: BinOp, left: &Value, right: &Value) -> Result<Value, PyExc> {
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        if !is_float(left) && !is_float(right) {
            let v = match op {
                BinOp::BitAnd => a & b,
                BinOp::BitOr => a | b,
                _ => a ^ b,
            };
            return Ok(Value::Int(v));
        }
    }
    if let (Value::Set(a), Value::Set(b)) = (left, right) {
        let (a, b) = (a.borrow(), b.borrow());
        let mut out = Set::new();
        match op {
            BinOp::BitAnd => {
                for item in a.iter() {
                    if b.contains(item)? {
                        out.insert(item.clone())?;
                    }
                }
            }
            BinOp::BitOr => {
                for item in a.iter().chain(b.iter()) {
                    out.insert(item.clone())?;
                }
            }
            _ => {
                for item in a.iter() {
                    if !b.contains(item)? {
                        out.insert(item.clone())?;
                    }
                }
                for item in b.iter() {
                    if !a.contains(item)? {
                        out.insert(item.clone())?;
                    }
                }
            }
        }
        return Ok(Value::set(out));
    }
    // PEP 584 dict union.
    if op == BinOp::BitOr {
        if let (Value::Dict(a), Value::Dict(b)) = (left, right) {
            let mut out = Dict::new();
            for (k, v) in a.borrow().iter() {
                out.insert(k.clone(), v.clone())?;
            }
            for (k, v) in b.borrow().iter() {
                out.insert(k.clone(), v.clone())?;
            }
            return Ok(Value::dict(out));
        }
    }
    Err(unsupported(op, left, right))
}

fn shift(op: BinOp, left: &Value, right: &Value) -> Result<Value, PyExc> {
    let (Some(a), Some(b)) = (as_int(left), as_int(right)) else {
        return Err(unsupported(op, left, right));
    };
    if is_float(left) || is_float(right) {
        return Err(unsupported(op, left, right));
    }
    if b.is_negative() {
        return Err(PyExc::value_error("negative shift count"));
    }
    let amount = b
        .to_u64()
        .filter(|v| *v <= LARGE_RESULT_LIMIT)
        .ok_or_else(|| PyExc::new(ExcType::OverflowError, "shift count too large"))?;
    let v = match op {
        BinOp::Shl => {
            check_result_size(a.bits() + amount)?;
            a << amount
        }
        _ => a >> amount,
    };
    Ok(Value::Int(v))
}

/// Applies a unary operator.
pub(crate) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, PyExc> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOp::Neg => match operand {
            Value::Bool(b) => Ok(Value::int(-i64::from(*b))),
            Value::Int(v) => Ok(Value::Int(-v.clone())),
            Value::Float(v) => Ok(Value::Float(-v)),
            other => Err(PyExc::type_error(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        },
        UnaryOp::Pos => match operand {
            Value::Bool(b) => Ok(Value::int(i64::from(*b))),
            Value::Int(_) | Value::Float(_) => Ok(operand.clone()),
            other => Err(PyExc::type_error(format!(
                "bad operand type for unary +: '{}'",
                other.type_name()
            ))),
        },
        UnaryOp::Invert => match operand {
            Value::Bool(b) => Ok(Value::int(-i64::from(*b) - 1)),
            Value::Int(v) => Ok(Value::Int(-v.clone() - 1)),
            other => Err(PyExc::type_error(format!(
                "bad operand type for unary ~: '{}'",
                other.type_name()
            ))),
        },
    }
}

/// One link of a (possibly chained) comparison.
pub(crate) fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<Value, PyExc> {
    let result = match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::Ne => !left.py_eq(right),
        CmpOp::Is => identity(left, right),
        CmpOp::IsNot => !identity(left, right),
        CmpOp::In => return contains(left, right).map(Value::Bool),
        CmpOp::NotIn => return contains(left, right).map(|b| Value::Bool(!b)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let Some(ordering) = left.py_cmp(right) else {
                return Err(PyExc::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                )));
            };
            match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
    };
    Ok(Value::Bool(result))
}

/// Identity by representation: `x is None` is the canonical none test.
fn identity(left: &Value, right: &Value) -> bool {
    use std::rc::Rc;
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
        (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
        (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
        (Value::ExcInstance(a), Value::ExcInstance(b)) => Rc::ptr_eq(a, b),
        (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
        (Value::ExcClass(a), Value::ExcClass(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::File(a), Value::File(b)) => a == b,
        _ => false,
    }
}

/// `item in container`: substring for strings, membership for sequences and
/// sets, key presence for dicts.
pub(crate) fn contains(item: &Value, container: &Value) -> Result<bool, PyExc> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(PyExc::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Set(s) => s.borrow().contains(item),
        Value::Dict(d) => d.borrow().contains(item),
        Value::Range(r) => {
            let Some(n) = as_int(item).and_then(|v| v.to_i64()) else {
                return Ok(false);
            };
            if r.step > 0 {
                Ok(n >= r.start && n < r.stop && (n - r.start) % r.step == 0)
            } else {
                Ok(n <= r.start && n > r.stop && (r.start - n) % (-r.step) == 0)
            }
        }
        other => Err(PyExc::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Resolves a (possibly negative) index against a sequence length.
pub(crate) fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

/// Python slice semantics: clamped bounds, negative steps included.
pub(crate) fn slice_indices(
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    len: usize,
) -> Result<Vec<usize>, PyExc> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(PyExc::value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |v: i64, low: i64, high: i64| v.clamp(low, high);
    let mut out = Vec::new();
    if step > 0 {
        let start = clamp(start.map_or(0, |s| if s < 0 { s + len } else { s }), 0, len);
        let stop = clamp(stop.map_or(len, |s| if s < 0 { s + len } else { s }), 0, len);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = clamp(
            start.map_or(len - 1, |s| if s < 0 { s + len } else { s }),
            -1,
            len - 1,
        );
        let stop = stop.map_or(-1, |s| if s < 0 { (s + len).max(-1) } else { s.min(len) });
        let mut i = start;
        while i > stop {
            if i >= 0 {
                out.push(i as usize);
            }
            i += step;
        }
    }
    Ok(out)
}

/// Subscript read: integer index, slice, or mapping key.
pub(crate) fn subscript_get(obj: &Value, index: &Value) -> Result<Value, PyExc> {
    match obj {
        Value::Str(s) => match index {
            Value::Int(_) | Value::Bool(_) => {
                let i = index.as_index("string index")?;
                let chars: Vec<char> = s.chars().collect();
                let pos = resolve_index(i, chars.len())
                    .ok_or_else(|| PyExc::new(ExcType::IndexError, "string index out of range"))?;
                Ok(Value::str(chars[pos].to_string()))
            }
            _ => Err(PyExc::type_error(format!(
                "string indices must be integers, not '{}'",
                index.type_name()
            ))),
        },
        Value::List(items) => {
            let items = items.borrow();
            let i = index.as_index("list index").map_err(|_| {
                PyExc::type_error(format!(
                    "list indices must be integers or slices, not {}",
                    index.type_name()
                ))
            })?;
            let pos = resolve_index(i, items.len()).ok_or_else(PyExc::index_error)?;
            Ok(items[pos].clone())
        }
        Value::Tuple(items) => {
            let i = index.as_index("tuple index").map_err(|_| {
                PyExc::type_error(format!(
                    "tuple indices must be integers or slices, not {}",
                    index.type_name()
                ))
            })?;
            let pos = resolve_index(i, items.len())
                .ok_or_else(|| PyExc::new(ExcType::IndexError, "tuple index out of range"))?;
            Ok(items[pos].clone())
        }
        Value::Dict(d) => {
            let d = d.borrow();
            d.get(index)?
                .ok_or_else(|| PyExc::key_error(&index.py_repr()))
        }
        Value::Range(r) => {
            let i = index.as_index("range index")?;
            let pos = resolve_index(i, r.len().max(0) as usize)
                .ok_or_else(|| PyExc::new(ExcType::IndexError, "range object index out of range"))?;
            Ok(Value::int(r.start + r.step * pos as i64))
        }
        other => Err(PyExc::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Subscript read with an explicit slice descriptor.
pub(crate) fn slice_get(
    obj: &Value,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Value, PyExc> {
    match obj {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let indices = slice_indices(start, stop, step, chars.len())?;
            Ok(Value::str(indices.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        Value::List(items) => {
            let items = items.borrow();
            let indices = slice_indices(start, stop, step, items.len())?;
            Ok(Value::list(indices.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let indices = slice_indices(start, stop, step, items.len())?;
            Ok(Value::tuple(indices.into_iter().map(|i| items[i].clone()).collect()))
        }
        other => Err(PyExc::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Subscript write.
pub(crate) fn subscript_set(obj: &Value, index: &Value, value: Value) -> Result<(), PyExc> {
    match obj {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = index.as_index("list index")?;
            let len = items.len();
            let pos = resolve_index(i, len)
                .ok_or_else(|| PyExc::new(ExcType::IndexError, "list assignment index out of range"))?;
            items[pos] = value;
            Ok(())
        }
        Value::Dict(d) => d.borrow_mut().insert(index.clone(), value),
        other => Err(PyExc::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Subscript delete.
pub(crate) fn subscript_del(obj: &Value, index: &Value) -> Result<(), PyExc> {
    match obj {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = index.as_index("list index")?;
            let len = items.len();
            let pos = resolve_index(i, len)
                .ok_or_else(|| PyExc::new(ExcType::IndexError, "list assignment index out of range"))?;
            items.remove(pos);
            Ok(())
        }
        Value::Dict(d) => {
            let removed = d.borrow_mut().remove(index)?;
            if removed.is_none() {
                return Err(PyExc::key_error(&index.py_repr()));
            }
            Ok(())
        }
        other => Err(PyExc::type_error(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

/// Materialises a primitive iterable into a vector.
///
/// Generators are driven by the evaluator, not here; a range this large is
/// rejected rather than ground through.
pub(crate) fn iter_values(value: &Value) -> Result<Vec<Value>, PyExc> {
    match value {
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Set(s) => Ok(s.borrow().iter().cloned().collect()),
        Value::Dict(d) => Ok(d.borrow().keys().cloned().collect()),
        Value::Range(r) => {
            let len = r.len();
            check_result_size(len.max(0) as u64)?;
            let mut out = Vec::with_capacity(len.max(0) as usize);
            let mut i = r.start;
            while if r.step > 0 { i < r.stop } else { i > r.stop } {
                out.push(Value::int(i));
                i += r.step;
            }
            Ok(out)
        }
        other => Err(PyExc::not_iterable(other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn int(v: i64) -> Value {
        Value::int(v)
    }

    fn eval_bin(op: BinOp, a: Value, b: Value) -> String {
        binary(op, &a, &b).unwrap().py_repr()
    }

    #[test]
    fn division_always_floats() {
        assert_eq!(eval_bin(BinOp::Div, int(7), int(2)), "3.5");
        assert_eq!(eval_bin(BinOp::Div, int(4), int(2)), "2.0");
    }

    #[test]
    fn floor_div_and_mod_match_python_for_negatives() {
        assert_eq!(eval_bin(BinOp::FloorDiv, int(-7), int(2)), "-4");
        assert_eq!(eval_bin(BinOp::FloorDiv, int(7), int(-2)), "-4");
        assert_eq!(eval_bin(BinOp::Mod, int(-7), int(2)), "1");
        assert_eq!(eval_bin(BinOp::Mod, int(7), int(-2)), "-1");
        assert_eq!(eval_bin(BinOp::Mod, int(-7), int(-2)), "-1");
    }

    #[test]
    fn floor_div_mod_identity() {
        for a in [-9i64, -4, -1, 0, 1, 5, 13] {
            for b in [-5i64, -2, -1, 1, 3, 7] {
                let q = binary(BinOp::FloorDiv, &int(a), &int(b)).unwrap();
                let r = binary(BinOp::Mod, &int(a), &int(b)).unwrap();
                let back = binary(
                    BinOp::Add,
                    &binary(BinOp::Mul, &q, &int(b)).unwrap(),
                    &r,
                )
                .unwrap();
                assert!(back.py_eq(&int(a)), "identity failed for {a} and {b}");
            }
        }
    }

    #[test]
    fn zero_division_raises() {
        for op in [BinOp::Div, BinOp::FloorDiv, BinOp::Mod] {
            let err = binary(op, &int(1), &int(0)).unwrap_err();
            assert_eq!(err.exc_type(), Some(ExcType::ZeroDivisionError));
            let err = binary(op, &Value::Float(-3.5), &Value::Float(0.0)).unwrap_err();
            assert_eq!(err.exc_type(), Some(ExcType::ZeroDivisionError));
        }
    }

    #[test]
    fn sequence_repetition_commutes() {
        assert_eq!(eval_bin(BinOp::Mul, Value::str("ab"), int(3)), "'ababab'");
        assert_eq!(eval_bin(BinOp::Mul, int(3), Value::str("ab")), "'ababab'");
        assert_eq!(
            eval_bin(BinOp::Mul, Value::list(vec![int(1)]), int(2)),
            "[1, 1]"
        );
    }

    #[test]
    fn unsupported_operands_message() {
        let err = binary(BinOp::Add, &int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.py_string(),
            "TypeError: unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn cross_type_ordering_raises() {
        let err = compare(CmpOp::Lt, &int(1), &Value::str("a")).unwrap_err();
        assert!(err.py_string().contains("not supported between instances"));
        // Equality across types is false, not an error.
        assert_eq!(
            compare(CmpOp::Eq, &int(1), &Value::str("a")).unwrap().py_repr(),
            "False"
        );
    }

    #[test]
    fn membership() {
        assert!(contains(&Value::str("ell"), &Value::str("hello")).unwrap());
        assert!(contains(&int(2), &Value::Range(RangeVal { start: 0, stop: 10, step: 2 })).unwrap());
        assert!(!contains(&int(3), &Value::Range(RangeVal { start: 0, stop: 10, step: 2 })).unwrap());
    }

    #[test]
    fn negative_indexing() {
        let list = Value::list(vec![int(10), int(20), int(30)]);
        assert_eq!(subscript_get(&list, &int(-1)).unwrap().py_repr(), "30");
        let err = subscript_get(&list, &int(3)).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::IndexError));
    }

    #[test]
    fn slices() {
        let list = Value::list((1..=5).map(int).collect());
        assert_eq!(slice_get(&list, Some(1), Some(4), None).unwrap().py_repr(), "[2, 3, 4]");
        assert_eq!(slice_get(&list, None, None, Some(-1)).unwrap().py_repr(), "[5, 4, 3, 2, 1]");
        assert_eq!(slice_get(&list, None, None, Some(2)).unwrap().py_repr(), "[1, 3, 5]");
        assert_eq!(
            slice_get(&Value::str("hello"), Some(-3), None, None).unwrap().py_repr(),
            "'llo'"
        );
    }

    #[test]
    fn power_guard() {
        let err = binary(BinOp::Pow, &int(2), &int(10_000_000)).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::OverflowError));
    }

    #[test]
    fn percent_formatting() {
        let out = binary(
            BinOp::Mod,
            &Value::str("%s has %d items"),
            &Value::tuple(vec![Value::str("cart"), int(3)]),
        )
        .unwrap();
        assert_eq!(out.py_str(), "cart has 3 items");
    }

    #[test]
    fn dict_union() {
        let mut a = Dict::new();
        a.insert(Value::str("a"), int(1)).unwrap();
        let mut b = Dict::new();
        b.insert(Value::str("b"), int(2)).unwrap();
        let merged = binary(BinOp::BitOr, &Value::dict(a), &Value::dict(b)).unwrap();
        assert_eq!(merged.py_repr(), "{'a': 1, 'b': 2}");
    }
}
