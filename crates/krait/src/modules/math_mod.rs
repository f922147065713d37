//! Implementation of the `math` module: constants plus the commonly-used
//! functions (powers, logarithms, trigonometry, predicates, integer helpers).

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    args::Args,
    eval::{Ev, Unwind},
    exc::{ExcType, PyExc},
    value::Value,
};

use super::{ModuleFn, module_value};

pub(crate) fn module() -> Value {
    use ModuleFn as M;
    let functions = [
        M::MathSqrt,
        M::MathFloor,
        M::MathCeil,
        M::MathFabs,
        M::MathTrunc,
        M::MathExp,
        M::MathLog,
        M::MathLog2,
        M::MathLog10,
        M::MathSin,
        M::MathCos,
        M::MathTan,
        M::MathAsin,
        M::MathAcos,
        M::MathAtan,
        M::MathAtan2,
        M::MathPow,
        M::MathHypot,
        M::MathRadians,
        M::MathDegrees,
        M::MathFactorial,
        M::MathGcd,
        M::MathIsnan,
        M::MathIsinf,
        M::MathIsclose,
    ];
    let mut attrs: Vec<(&str, Value)> = functions
        .into_iter()
        .map(|f| (f.name(), Value::ModuleFn(f)))
        .collect();
    attrs.push(("pi", Value::Float(std::f64::consts::PI)));
    attrs.push(("e", Value::Float(std::f64::consts::E)));
    attrs.push(("tau", Value::Float(std::f64::consts::TAU)));
    attrs.push(("inf", Value::Float(f64::INFINITY)));
    attrs.push(("nan", Value::Float(f64::NAN)));
    module_value("math", attrs)
}

fn float_arg(value: &Value, name: &str) -> Result<f64, PyExc> {
    match value {
        Value::Bool(b) => Ok(f64::from(i8::from(*b))),
        Value::Int(v) => Ok(v.to_f64().unwrap_or(f64::INFINITY)),
        Value::Float(v) => Ok(*v),
        other => Err(PyExc::type_error(format!(
            "must be real number, not {} (math.{name})",
            other.type_name()
        ))),
    }
}

fn domain_error() -> PyExc {
    PyExc::value_error("math domain error")
}

pub(crate) fn call(function: ModuleFn, args: Args) -> Ev<Value> {
    use ModuleFn as M;
    let name = function.name();
    match function {
        M::MathSqrt => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            if x < 0.0 {
                return Err(domain_error().into());
            }
            Ok(Value::Float(x.sqrt()))
        }
        M::MathFloor | M::MathCeil | M::MathTrunc => {
            let value = args.get_one(name).map_err(Unwind::Raise)?;
            if let Value::Int(_) | Value::Bool(_) = &value {
                return Ok(value);
            }
            let x = float_arg(&value, name).map_err(Unwind::Raise)?;
            if !x.is_finite() {
                return Err(match x.is_nan() {
                    true => PyExc::value_error("cannot convert float NaN to integer").into(),
                    false => {
                        PyExc::new(ExcType::OverflowError, "cannot convert float infinity to integer").into()
                    }
                });
            }
            let rounded = match function {
                M::MathFloor => x.floor(),
                M::MathCeil => x.ceil(),
                _ => x.trunc(),
            };
            Ok(Value::Int(BigInt::from(rounded as i128)))
        }
        M::MathFabs => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            Ok(Value::Float(x.abs()))
        }
        M::MathExp => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            Ok(Value::Float(x.exp()))
        }
        M::MathLog => {
            let (value, base) = args.get_one_two(name).map_err(Unwind::Raise)?;
            let x = float_arg(&value, name).map_err(Unwind::Raise)?;
            if x <= 0.0 {
                return Err(domain_error().into());
            }
            match base {
                None => Ok(Value::Float(x.ln())),
                Some(base) => {
                    let b = float_arg(&base, name).map_err(Unwind::Raise)?;
                    if b <= 0.0 || b == 1.0 {
                        return Err(domain_error().into());
                    }
                    Ok(Value::Float(x.log(b)))
                }
            }
        }
        M::MathLog2 | M::MathLog10 => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            if x <= 0.0 {
                return Err(domain_error().into());
            }
            Ok(Value::Float(if function == M::MathLog2 { x.log2() } else { x.log10() }))
        }
        M::MathSin | M::MathCos | M::MathTan => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            let y = match function {
                M::MathSin => x.sin(),
                M::MathCos => x.cos(),
                _ => x.tan(),
            };
            Ok(Value::Float(y))
        }
        M::MathAsin | M::MathAcos => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            if !(-1.0..=1.0).contains(&x) {
                return Err(domain_error().into());
            }
            Ok(Value::Float(if function == M::MathAsin { x.asin() } else { x.acos() }))
        }
        M::MathAtan => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            Ok(Value::Float(x.atan()))
        }
        M::MathAtan2 => {
            let (y, x) = args.get_two(name).map_err(Unwind::Raise)?;
            let y = float_arg(&y, name).map_err(Unwind::Raise)?;
            let x = float_arg(&x, name).map_err(Unwind::Raise)?;
            Ok(Value::Float(y.atan2(x)))
        }
        M::MathPow => {
            let (x, y) = args.get_two(name).map_err(Unwind::Raise)?;
            let x = float_arg(&x, name).map_err(Unwind::Raise)?;
            let y = float_arg(&y, name).map_err(Unwind::Raise)?;
            Ok(Value::Float(x.powf(y)))
        }
        M::MathHypot => {
            let mut total = 0.0f64;
            for value in &args.pos {
                let x = float_arg(value, name).map_err(Unwind::Raise)?;
                total += x * x;
            }
            Ok(Value::Float(total.sqrt()))
        }
        M::MathRadians => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            Ok(Value::Float(x.to_radians()))
        }
        M::MathDegrees => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            Ok(Value::Float(x.to_degrees()))
        }
        M::MathFactorial => {
            let value = args.get_one(name).map_err(Unwind::Raise)?;
            let n = value.as_index("factorial argument").map_err(Unwind::Raise)?;
            if n < 0 {
                return Err(PyExc::value_error("factorial() not defined for negative values").into());
            }
            if n > 10_000 {
                return Err(PyExc::new(ExcType::OverflowError, "factorial() argument is too large").into());
            }
            let mut result = BigInt::from(1);
            for i in 2..=n {
                result *= i;
            }
            Ok(Value::Int(result))
        }
        M::MathGcd => {
            let mut result = BigInt::zero();
            for value in &args.pos {
                let Value::Int(v) = value else {
                    return Err(PyExc::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        value.type_name()
                    ))
                    .into());
                };
                result = result.gcd(v);
            }
            Ok(Value::Int(result.abs()))
        }
        M::MathIsnan => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            Ok(Value::Bool(x.is_nan()))
        }
        M::MathIsinf => {
            let x = float_arg(&args.get_one(name).map_err(Unwind::Raise)?, name).map_err(Unwind::Raise)?;
            Ok(Value::Bool(x.is_infinite()))
        }
        M::MathIsclose => {
            let mut args = args;
            let rel_tol = match args.take_kw("rel_tol") {
                Some(v) => float_arg(&v, name).map_err(Unwind::Raise)?,
                None => 1e-9,
            };
            let abs_tol = match args.take_kw("abs_tol") {
                Some(v) => float_arg(&v, name).map_err(Unwind::Raise)?,
                None => 0.0,
            };
            let (a, b) = args.get_two(name).map_err(Unwind::Raise)?;
            let a = float_arg(&a, name).map_err(Unwind::Raise)?;
            let b = float_arg(&b, name).map_err(Unwind::Raise)?;
            if a == b {
                return Ok(Value::Bool(true));
            }
            if a.is_infinite() || b.is_infinite() {
                return Ok(Value::Bool(false));
            }
            let diff = (a - b).abs();
            Ok(Value::Bool(
                diff <= (rel_tol * b.abs()).max(rel_tol * a.abs()) || diff <= abs_tol,
            ))
        }
        _ => Err(PyExc::internal(format!("math dispatch for {name}")).into()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn call1(f: ModuleFn, v: Value) -> Value {
        call(f, Args::positional(vec![v])).unwrap()
    }

    #[test]
    fn sqrt_and_domain() {
        assert_eq!(call1(ModuleFn::MathSqrt, Value::Float(9.0)).py_repr(), "3.0");
        assert_eq!(call1(ModuleFn::MathSqrt, Value::int(16)).py_repr(), "4.0");
        assert!(call(ModuleFn::MathSqrt, Args::positional(vec![Value::Float(-1.0)])).is_err());
    }

    #[test]
    fn floor_returns_int() {
        assert_eq!(call1(ModuleFn::MathFloor, Value::Float(2.7)).py_repr(), "2");
        assert_eq!(call1(ModuleFn::MathCeil, Value::Float(-2.7)).py_repr(), "-2");
        assert_eq!(call1(ModuleFn::MathFloor, Value::int(5)).py_repr(), "5");
    }

    #[test]
    fn factorial_bigint() {
        assert_eq!(
            call1(ModuleFn::MathFactorial, Value::int(20)).py_repr(),
            "2432902008176640000"
        );
        assert!(call(ModuleFn::MathFactorial, Args::positional(vec![Value::int(-1)])).is_err());
    }
}
