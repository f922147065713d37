//! Primary value type representing Python objects at runtime.
//!
//! All user-visible values live in one tagged union. Mutable containers
//! (list, dict, set, instances) are shared behind `Rc<RefCell<…>>` so that
//! aliasing assignments observe each other's mutations, matching Python
//! reference semantics. Method dispatch for primitives uses fixed per-kind
//! tables (see `methods`); user inheritance lives in the value, never in the
//! host language's type system.

use std::{cell::RefCell, cmp::Ordering, fmt::Write as _, rc::Rc};

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    builtins::Builtin,
    exc::{ExcType, PyExc},
    modules::ModuleFn,
    py_hash,
    types::{
        class::{ClassObj, InstanceObj, ModuleObj},
        dict::{Dict, Set},
        function::{BoundMethod, FuncObj, HostFunc},
        generator::GeneratorObj,
    },
};

/// A `range(start, stop, step)` descriptor. Iteration is lazy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RangeVal {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeVal {
    /// Number of elements produced by iteration.
    pub(crate) fn len(self) -> i64 {
        if self.step > 0 {
            ((self.stop - self.start).max(0) + self.step - 1) / self.step
        } else {
            ((self.start - self.stop).max(0) + (-self.step) - 1) / (-self.step)
        }
    }
}

/// Effect markers returned from effectful callables.
///
/// These are temporary return signals the evaluator intercepts; user code
/// never observes one as a normal value. (The `suspend()` primitive signals
/// through the unwind channel directly rather than through a marker.)
#[derive(Debug, Clone)]
pub(crate) enum Marker {
    /// A route-registration directive from the `web` module, intercepted at
    /// its top-level assignment or expression-statement site.
    RouteReg(Rc<RouteReg>),
    /// A partially-applied route decorator: `web.get("/path")` awaiting the
    /// handler function.
    RouteDecorator { method: Rc<str>, path: Rc<str> },
}

/// A route registration awaiting interception by the evaluator.
#[derive(Debug, Clone)]
pub(crate) struct RouteReg {
    pub method: String,
    pub path: String,
    pub handler: Value,
}

/// A constructed built-in exception instance (`e = ValueError("boom")`).
#[derive(Debug)]
pub(crate) struct ExcInstanceObj {
    pub exc_type: ExcType,
    pub args: Vec<Value>,
}

impl ExcInstanceObj {
    /// `str(e)`: the lone argument's text, or the args tuple repr.
    pub(crate) fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [single] => single.py_str(),
            _ => Value::tuple(self.args.clone()).py_repr(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    /// Arbitrary-precision integer.
    Int(BigInt),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Set>>),
    Range(RangeVal),
    /// A user-defined function or lambda.
    Func(Rc<FuncObj>),
    /// A fixed built-in function (`print`, `len`, …).
    Builtin(Builtin),
    /// A function belonging to a built-in module (`math.sqrt`, …).
    ModuleFn(ModuleFn),
    /// A callable supplied by the host through a custom module.
    HostFn(Rc<HostFunc>),
    /// A bound method capturing its receiver.
    Method(Rc<BoundMethod>),
    Class(Rc<ClassObj>),
    /// A built-in exception class object (`ValueError`, …).
    ExcClass(ExcType),
    /// An instance of a built-in exception class.
    ExcInstance(Rc<ExcInstanceObj>),
    Instance(Rc<InstanceObj>),
    Generator(Rc<RefCell<GeneratorObj>>),
    /// An open file handle indexing the context's handle table.
    File(u64),
    Module(Rc<ModuleObj>),
    /// Internal effect marker; never observable to user code.
    Marker(Marker),
}

impl Value {
    pub(crate) fn int(v: impl Into<BigInt>) -> Self {
        Self::Int(v.into())
    }

    pub(crate) fn str(v: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(v.as_ref()))
    }

    pub(crate) fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub(crate) fn dict(d: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(d)))
    }

    pub(crate) fn set(s: Set) -> Self {
        Self::Set(Rc::new(RefCell::new(s)))
    }

    /// The Python type name used in error messages.
    pub(crate) fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::Range(_) => "range",
            Self::Func(_) | Self::Method(_) => "function",
            Self::Builtin(_) | Self::ModuleFn(_) | Self::HostFn(_) => "builtin_function_or_method",
            Self::Class(_) | Self::ExcClass(_) => "type",
            Self::ExcInstance(obj) => obj.exc_type.into(),
            Self::Instance(obj) => obj.class.name_ref(),
            Self::Generator(_) => "generator",
            Self::File(_) => "TextIOWrapper",
            Self::Module(_) => "module",
            Self::Marker(_) => "object",
        }
    }

    /// Python truthiness. Never raises for supported types.
    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(v) => !v.is_zero(),
            Self::Float(v) => *v != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            Self::Set(s) => !s.borrow().is_empty(),
            Self::Range(r) => r.len() > 0,
            _ => true,
        }
    }

    /// Numeric view used by cross-type comparison and arithmetic coercion.
    pub(crate) fn as_number(&self) -> Option<Number<'_>> {
        match self {
            Self::Bool(b) => Some(Number::Int(IntSource::Small(i64::from(*b)))),
            Self::Int(v) => Some(Number::Int(IntSource::Big(v))),
            Self::Float(v) => Some(Number::Float(*v)),
            _ => None,
        }
    }

    /// Extracts an index-sized integer, raising TypeError otherwise.
    pub(crate) fn as_index(&self, what: &str) -> Result<i64, PyExc> {
        match self {
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Int(v) => v.to_i64().ok_or_else(|| {
                PyExc::new(ExcType::OverflowError, format!("{what} is too large"))
            }),
            _ => Err(PyExc::type_error(format!(
                "{what} cannot be interpreted as an integer ('{}')",
                self.type_name()
            ))),
        }
    }

    /// Python equality. Structural for primitives and containers, identity
    /// for functions, classes, and instances (user `__eq__` dispatch happens
    /// at the operator layer, not here).
    pub(crate) fn py_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Range(a), Self::Range(b)) => {
                let (la, lb) = (a.len(), b.len());
                la == lb && (la == 0 || (a.start == b.start && (la == 1 || a.step == b.step)))
            }
            (Self::List(a), Self::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                a.borrow().py_eq(&b.borrow())
            }
            (Self::Set(a), Self::Set(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                a.borrow().py_eq(&b.borrow())
            }
            (Self::Func(a), Self::Func(b)) => Rc::ptr_eq(a, b),
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::ExcClass(a), Self::ExcClass(b)) => a == b,
            (Self::ExcInstance(a), Self::ExcInstance(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) => Rc::ptr_eq(a, b),
            (Self::Generator(a), Self::Generator(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::ModuleFn(a), Self::ModuleFn(b)) => a == b,
            (Self::File(a), Self::File(b)) => a == b,
            (Self::Module(a), Self::Module(b)) => Rc::ptr_eq(a, b),
            _ => {
                // Cross-type numeric equality: 1 == True, 1 == 1.0.
                match (self.as_number(), other.as_number()) {
                    (Some(a), Some(b)) => a.cmp(&b) == Some(Ordering::Equal),
                    _ => false,
                }
            }
        }
    }

    /// Python ordering. `None` means the pair is unorderable (TypeError at
    /// the operator layer).
    pub(crate) fn py_cmp(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.cmp(&b);
        }
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                seq_cmp(&a, &b)
            }
            (Self::Tuple(a), Self::Tuple(b)) => seq_cmp(a, b),
            _ => None,
        }
    }

    /// Python hash for use as a dict/set key.
    ///
    /// Unhashable types (list, dict, set) raise TypeError.
    pub(crate) fn py_hash(&self) -> Result<u64, PyExc> {
        match self {
            Self::None => Ok(py_hash::hash_str("None") ^ 0x5f3c),
            Self::Bool(b) => Ok(py_hash::hash_int(&BigInt::from(i64::from(*b)))),
            Self::Int(v) => Ok(py_hash::hash_int(v)),
            Self::Float(v) => Ok(py_hash::hash_float(*v)),
            Self::Str(s) => Ok(py_hash::hash_str(s)),
            Self::Tuple(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items.iter() {
                    parts.push(item.py_hash()?);
                }
                Ok(py_hash::hash_tuple(parts.into_iter()))
            }
            Self::Range(r) => Ok(py_hash::hash_tuple(
                [
                    py_hash::hash_int(&BigInt::from(r.start)),
                    py_hash::hash_int(&BigInt::from(r.stop)),
                    py_hash::hash_int(&BigInt::from(r.step)),
                ]
                .into_iter(),
            )),
            // Identity hash for objects whose equality is identity.
            Self::Func(f) => Ok(Rc::as_ptr(f) as u64),
            Self::Class(c) => Ok(Rc::as_ptr(c) as u64),
            Self::ExcClass(t) => Ok(py_hash::hash_str(<&'static str>::from(*t))),
            Self::ExcInstance(i) => Ok(Rc::as_ptr(i) as u64),
            Self::Instance(i) => Ok(Rc::as_ptr(i) as u64),
            Self::Builtin(b) => Ok(py_hash::hash_str(b.name())),
            Self::ModuleFn(m) => Ok(py_hash::hash_str(m.name())),
            other => Err(PyExc::type_error(format!(
                "unhashable type: '{}'",
                other.type_name()
            ))),
        }
    }

    /// `str()` conversion.
    pub(crate) fn py_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            Self::ExcInstance(obj) => obj.message(),
            _ => self.py_repr(),
        }
    }

    /// `repr()` conversion.
    pub(crate) fn py_repr(&self) -> String {
        let mut out = String::new();
        self.repr_into(&mut out, 0);
        out
    }

    fn repr_into(&self, out: &mut String, depth: u32) {
        if depth > 20 {
            out.push_str("...");
            return;
        }
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(v) => {
                let _ = write!(out, "{v}");
            }
            Self::Float(v) => out.push_str(&format_float(*v)),
            Self::Str(s) => out.push_str(&str_repr(s)),
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.repr_into(out, depth + 1);
                }
                out.push(']');
            }
            Self::Tuple(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.repr_into(out, depth + 1);
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::Dict(d) => {
                out.push('{');
                for (i, (k, v)) in d.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.repr_into(out, depth + 1);
                    out.push_str(": ");
                    v.repr_into(out, depth + 1);
                }
                out.push('}');
            }
            Self::Set(s) => {
                let s = s.borrow();
                if s.is_empty() {
                    out.push_str("set()");
                } else {
                    out.push('{');
                    for (i, item) in s.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        item.repr_into(out, depth + 1);
                    }
                    out.push('}');
                }
            }
            Self::Range(r) => {
                if r.step == 1 {
                    let _ = write!(out, "range({}, {})", r.start, r.stop);
                } else {
                    let _ = write!(out, "range({}, {}, {})", r.start, r.stop, r.step);
                }
            }
            Self::Func(f) => {
                let _ = write!(out, "<function {}>", f.qualname);
            }
            Self::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name());
            }
            Self::ModuleFn(m) => {
                let _ = write!(out, "<built-in function {}>", m.name());
            }
            Self::HostFn(h) => {
                let _ = write!(out, "<built-in function {}>", h.name);
            }
            Self::Method(m) => {
                let _ = write!(out, "<bound method {}>", m.describe());
            }
            Self::Class(c) => {
                let _ = write!(out, "<class '{}'>", c.name_ref());
            }
            Self::ExcClass(t) => {
                let _ = write!(out, "<class '{t}'>");
            }
            Self::ExcInstance(obj) => {
                let _ = write!(out, "{}(", obj.exc_type);
                for (i, arg) in obj.args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.repr_into(out, depth + 1);
                }
                out.push(')');
            }
            Self::Instance(obj) => {
                let _ = write!(out, "<{} object>", obj.class.name_ref());
            }
            Self::Generator(_) => out.push_str("<generator object>"),
            Self::File(id) => {
                let _ = write!(out, "<file handle {id}>");
            }
            Self::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name);
            }
            Self::Marker(_) => out.push_str("<internal>"),
        }
    }
}

/// A numeric view onto bool/int/float values for cross-type comparison.
pub(crate) enum Number<'a> {
    Int(IntSource<'a>),
    Float(f64),
}

pub(crate) enum IntSource<'a> {
    Small(i64),
    Big(&'a BigInt),
}

impl IntSource<'_> {
    pub(crate) fn to_bigint(&self) -> BigInt {
        match self {
            Self::Small(v) => BigInt::from(*v),
            Self::Big(v) => (*v).clone(),
        }
    }

    fn to_f64_lossy(&self) -> f64 {
        match self {
            Self::Small(v) => *v as f64,
            Self::Big(v) => v.to_f64().unwrap_or(f64::INFINITY * if v.is_negative() { -1.0 } else { 1.0 }),
        }
    }
}

impl Number<'_> {
    /// Total numeric comparison matching Python semantics; `None` only for
    /// comparisons involving NaN.
    pub(crate) fn cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.to_bigint().cmp(&b.to_bigint())),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => a.to_f64_lossy().partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&b.to_f64_lossy()),
        }
    }
}

fn seq_cmp(a: &[Value], b: &[Value]) -> Option<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        if x.py_eq(y) {
            continue;
        }
        return x.py_cmp(y);
    }
    Some(a.len().cmp(&b.len()))
}

/// Formats an f64 the way Python's `repr` does: shortest round-trip digits,
/// positional notation for exponents in `[-4, 16)`, otherwise scientific with
/// a signed two-digit exponent.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format(value);
    // ryu emits either positional ("12.5") or exponent ("1e20", "1.5e-7")
    // form; normalize to Python's conventions.
    match shortest.split_once(['e', 'E']) {
        None => shortest.to_string(),
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
            let negative = mantissa.starts_with('-');
            let int_len = mantissa
                .trim_start_matches('-')
                .split('.')
                .next()
                .map_or(1, str::len) as i32;
            let point = int_len + exp;
            let digits = digits.trim_end_matches('0');
            let digits = if digits.is_empty() { "0" } else { digits };
            // Positional while the decimal exponent stays below 16, like
            // CPython's float repr.
            if (-3..17).contains(&point) {
                positional(digits, point, negative)
            } else {
                scientific(digits, point, negative)
            }
        }
    }
}

fn positional(digits: &str, point: i32, negative: bool) -> String {
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if point <= 0 {
        out.push_str("0.");
        for _ in 0..-point {
            out.push('0');
        }
        out.push_str(digits);
    } else if (point as usize) >= digits.len() {
        out.push_str(digits);
        for _ in 0..(point as usize - digits.len()) {
            out.push('0');
        }
        out.push_str(".0");
    } else {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    }
    out
}

fn scientific(digits: &str, point: i32, negative: bool) -> String {
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&digits[..1]);
    if digits.len() > 1 {
        out.push('.');
        out.push_str(&digits[1..]);
    }
    let exp = point - 1;
    if exp < 0 {
        let _ = write!(out, "e-{:02}", -exp);
    } else {
        let _ = write!(out, "e+{exp:02}");
    }
    out
}

/// Python `repr` for strings: single quotes preferred, double quotes when the
/// text contains a single quote but no double quote.
pub(crate) fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn float_repr_matches_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
        assert_eq!(format_float(1e15), "1000000000000000.0");
        assert_eq!(format_float(0.1), "0.1");
    }

    #[test]
    fn str_repr_quoting() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
        assert_eq!(str_repr("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn cross_type_equality() {
        assert!(Value::int(1).py_eq(&Value::Bool(true)));
        assert!(Value::int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Float(0.0).py_eq(&Value::Bool(false)));
        assert!(!Value::int(1).py_eq(&Value::str("1")));
    }

    #[test]
    fn sequence_comparison() {
        let a = Value::list(vec![Value::int(1), Value::int(2)]);
        let b = Value::list(vec![Value::int(1), Value::int(3)]);
        assert_eq!(a.py_cmp(&b), Some(Ordering::Less));
        // Cross-type ordering is unorderable.
        assert_eq!(Value::int(1).py_cmp(&Value::str("a")), None);
    }

    #[test]
    fn tuple_repr_trailing_comma() {
        assert_eq!(Value::tuple(vec![Value::int(1)]).py_repr(), "(1,)");
        assert_eq!(Value::tuple(vec![]).py_repr(), "()");
    }

    #[test]
    fn range_len() {
        assert_eq!(RangeVal { start: 0, stop: 10, step: 1 }.len(), 10);
        assert_eq!(RangeVal { start: 0, stop: 10, step: 3 }.len(), 4);
        assert_eq!(RangeVal { start: 10, stop: 0, step: -2 }.len(), 5);
        assert_eq!(RangeVal { start: 5, stop: 5, step: 1 }.len(), 0);
    }
}
