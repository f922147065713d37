//! Implementation of the `time` module.
//!
//! Clock reads route through the event log so replayed runs observe the same
//! timestamps; `sleep` is recorded but never blocks the interpreter.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    args::Args,
    context::{EventKind, StepOutcome},
    eval::{Ev, Interp, Unwind},
    exc::PyExc,
    value::Value,
};

use super::{ModuleFn, module_value};

pub(crate) fn module() -> Value {
    module_value(
        "time",
        vec![
            ("time", Value::ModuleFn(ModuleFn::TimeTime)),
            ("monotonic", Value::ModuleFn(ModuleFn::TimeMonotonic)),
            ("sleep", Value::ModuleFn(ModuleFn::TimeSleep)),
        ],
    )
}

pub(crate) fn call(interp: &mut Interp, function: ModuleFn, args: Args) -> Ev<Value> {
    use ModuleFn as M;
    match function {
        M::TimeTime | M::TimeMonotonic => {
            args.check_zero(function.name()).map_err(Unwind::Raise)?;
            match interp.ctx.next_step() {
                StepOutcome::Replay(payload) => Ok(Value::Float(payload.as_f64().unwrap_or(0.0))),
                StepOutcome::Live => {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs_f64())
                        .unwrap_or(0.0);
                    interp.ctx.record(EventKind::SideEffect, serde_json::json!(now));
                    Ok(Value::Float(now))
                }
            }
        }
        M::TimeSleep => {
            let seconds = args.get_one("sleep").map_err(Unwind::Raise)?;
            let seconds = match &seconds {
                Value::Bool(_) | Value::Int(_) | Value::Float(_) => seconds.py_str(),
                other => {
                    return Err(PyExc::type_error(format!(
                        "an integer is required (got type {})",
                        other.type_name()
                    ))
                    .into());
                }
            };
            // Sleeping would burn wall-clock budget for nothing; the call is
            // recorded as a side effect and returns immediately.
            match interp.ctx.next_step() {
                StepOutcome::Replay(_) => {}
                StepOutcome::Live => {
                    interp
                        .ctx
                        .record(EventKind::SideEffect, serde_json::json!({"sleep": seconds}));
                }
            }
            Ok(Value::None)
        }
        other => Err(PyExc::internal(format!("time dispatch for {}", other.name())).into()),
    }
}
