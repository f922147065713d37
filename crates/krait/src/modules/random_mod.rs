//! Implementation of the `random` module.
//!
//! The generator is a seedable ChaCha stream so runs are deterministic:
//! identical seeds (or the default seed) reproduce identical sequences, and
//! snapshot replay re-draws the same values.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    args::Args,
    eval::{Ev, Interp, Unwind},
    exc::PyExc,
    value::Value,
};

use super::{ModuleFn, module_value};

pub(crate) fn module() -> Value {
    module_value(
        "random",
        vec![
            ("random", Value::ModuleFn(ModuleFn::RandomRandom)),
            ("randint", Value::ModuleFn(ModuleFn::RandomRandint)),
            ("uniform", Value::ModuleFn(ModuleFn::RandomUniform)),
            ("choice", Value::ModuleFn(ModuleFn::RandomChoice)),
            ("shuffle", Value::ModuleFn(ModuleFn::RandomShuffle)),
            ("seed", Value::ModuleFn(ModuleFn::RandomSeed)),
        ],
    )
}

fn rng(interp: &mut Interp) -> &mut ChaCha8Rng {
    let seed = interp.ctx.random_seed;
    interp.ctx.rng.get_or_insert_with(|| ChaCha8Rng::seed_from_u64(seed))
}

pub(crate) fn call(interp: &mut Interp, function: ModuleFn, args: Args) -> Ev<Value> {
    use ModuleFn as M;
    match function {
        M::RandomRandom => {
            args.check_zero("random").map_err(Unwind::Raise)?;
            let value: f64 = rng(interp).r#gen();
            Ok(Value::Float(value))
        }
        M::RandomRandint => {
            let (a, b) = args.get_two("randint").map_err(Unwind::Raise)?;
            let a = a.as_index("randint low").map_err(Unwind::Raise)?;
            let b = b.as_index("randint high").map_err(Unwind::Raise)?;
            if a > b {
                return Err(PyExc::value_error("empty range for randrange()").into());
            }
            let value = rng(interp).gen_range(a..=b);
            Ok(Value::int(value))
        }
        M::RandomUniform => {
            let (a, b) = args.get_two("uniform").map_err(Unwind::Raise)?;
            let to_f = |v: &Value| -> Result<f64, PyExc> {
                match v {
                    Value::Bool(x) => Ok(f64::from(i8::from(*x))),
                    Value::Int(x) => Ok(num_traits::ToPrimitive::to_f64(x).unwrap_or(0.0)),
                    Value::Float(x) => Ok(*x),
                    other => Err(PyExc::type_error(format!(
                        "must be real number, not {}",
                        other.type_name()
                    ))),
                }
            };
            let a = to_f(&a).map_err(Unwind::Raise)?;
            let b = to_f(&b).map_err(Unwind::Raise)?;
            let t: f64 = rng(interp).r#gen();
            Ok(Value::Float(a + t * (b - a)))
        }
        M::RandomChoice => {
            let seq = args.get_one("choice").map_err(Unwind::Raise)?;
            let items = interp.iterate_value(&seq)?;
            if items.is_empty() {
                return Err(PyExc::new(
                    crate::exc::ExcType::IndexError,
                    "Cannot choose from an empty sequence",
                )
                .into());
            }
            let index = rng(interp).gen_range(0..items.len());
            Ok(items[index].clone())
        }
        M::RandomShuffle => {
            let seq = args.get_one("shuffle").map_err(Unwind::Raise)?;
            let Value::List(items) = &seq else {
                return Err(PyExc::type_error(format!(
                    "'{}' object does not support item assignment",
                    seq.type_name()
                ))
                .into());
            };
            let mut snapshot = items.borrow().clone();
            // Fisher-Yates with the seeded stream.
            for i in (1..snapshot.len()).rev() {
                let j = rng(interp).gen_range(0..=i);
                snapshot.swap(i, j);
            }
            *items.borrow_mut() = snapshot;
            Ok(Value::None)
        }
        M::RandomSeed => {
            let seed = args.get_up_to("seed", 1).map_err(Unwind::Raise)?.remove(0);
            let seed = match seed {
                None | Some(Value::None) => 0,
                Some(v) => {
                    let n = v.as_index("seed").map_err(Unwind::Raise)?;
                    u64::from_ne_bytes(n.to_ne_bytes())
                }
            };
            interp.ctx.random_seed = seed;
            interp.ctx.rng = Some(ChaCha8Rng::seed_from_u64(seed));
            Ok(Value::None)
        }
        other => Err(PyExc::internal(format!("random dispatch for {}", other.name())).into()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::context::Context;

    #[test]
    fn seeded_sequences_are_deterministic() {
        let draws = |seed: i64| -> Vec<String> {
            let mut interp = Interp::new(Context::default());
            call(
                &mut interp,
                ModuleFn::RandomSeed,
                Args::positional(vec![Value::int(seed)]),
            )
            .unwrap();
            (0..3)
                .map(|_| {
                    call(&mut interp, ModuleFn::RandomRandom, Args::default())
                        .unwrap()
                        .py_repr()
                })
                .collect()
        };
        assert_eq!(draws(42), draws(42));
        assert_ne!(draws(42), draws(43));
    }

    #[test]
    fn randint_bounds_inclusive() {
        let mut interp = Interp::new(Context::default());
        for _ in 0..50 {
            let v = call(
                &mut interp,
                ModuleFn::RandomRandint,
                Args::positional(vec![Value::int(1), Value::int(3)]),
            )
            .unwrap();
            let n: i64 = v.as_index("test").unwrap();
            assert!((1..=3).contains(&n));
        }
    }
}
