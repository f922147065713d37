//! The `web` module: route registration primitives for the request
//! dispatcher.
//!
//! `web.get("/path")` returns a decorator whose application produces a
//! route-registration effect marker; `web.route(method, path, handler)`
//! produces the marker directly. The evaluator intercepts the marker at its
//! top-level assignment or expression-statement site and appends a compiled
//! entry to the context's route table.

use std::rc::Rc;

use crate::{
    args::Args,
    eval::{Ev, Unwind},
    exc::PyExc,
    value::{Marker, RouteReg, Value},
};

use super::{ModuleFn, module_value};

pub(crate) fn module() -> Value {
    module_value(
        "web",
        vec![
            ("get", Value::ModuleFn(ModuleFn::WebGet)),
            ("post", Value::ModuleFn(ModuleFn::WebPost)),
            ("put", Value::ModuleFn(ModuleFn::WebPut)),
            ("patch", Value::ModuleFn(ModuleFn::WebPatch)),
            ("delete", Value::ModuleFn(ModuleFn::WebDelete)),
            ("route", Value::ModuleFn(ModuleFn::WebRoute)),
        ],
    )
}

pub(crate) fn call(function: ModuleFn, args: Args) -> Ev<Value> {
    use ModuleFn as M;
    let method = match function {
        M::WebGet => "GET",
        M::WebPost => "POST",
        M::WebPut => "PUT",
        M::WebPatch => "PATCH",
        M::WebDelete => "DELETE",
        M::WebRoute => {
            let mut args = args;
            if args.pos.len() != 3 {
                return Err(PyExc::type_error(format!(
                    "route() takes 3 positional arguments but {} were given",
                    args.pos.len()
                ))
                .into());
            }
            let handler = args.pos.pop().unwrap_or(Value::None);
            let path = args.pos.pop().unwrap_or(Value::None);
            let method = args.pos.pop().unwrap_or(Value::None);
            let (Value::Str(method), Value::Str(path)) = (&method, &path) else {
                return Err(PyExc::type_error("route() method and path must be str").into());
            };
            return Ok(Value::Marker(Marker::RouteReg(Rc::new(RouteReg {
                method: method.to_string(),
                path: path.to_string(),
                handler,
            }))));
        }
        other => {
            return Err(PyExc::internal(format!("web dispatch for {}", other.name())).into());
        }
    };
    let path = args.get_one(function.name()).map_err(Unwind::Raise)?;
    let Value::Str(path) = &path else {
        return Err(PyExc::type_error(format!(
            "{}() path must be str, not {}",
            function.name(),
            path.type_name()
        ))
        .into());
    };
    Ok(Value::Marker(Marker::RouteDecorator {
        method: Rc::from(method),
        path: path.clone(),
    }))
}
