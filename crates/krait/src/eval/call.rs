//! Call dispatch: user functions, builtins, methods, classes, generators.

use std::{cell::RefCell, rc::Rc, time::Instant};

use indexmap::IndexMap;

use crate::{
    args::Args,
    context::{Context, GenMode},
    exc::{ExcType, PyExc},
    methods::{self, MethodHost},
    types::{
        class::{ClassObj, InstanceObj},
        function::{FuncBody, FuncObj, MethodKind},
        generator::{GenState, GeneratorObj},
    },
    value::{Marker, Value},
};

use super::{Ev, Interp, Unwind};

impl Interp {
    /// Calls any callable value.
    pub(crate) fn call_value(&mut self, callee: &Value, args: Args, line: u32) -> Ev<Value> {
        self.ctx.budget.check().map_err(Unwind::Raise)?;
        match callee {
            Value::Func(f) => {
                if f.is_generator {
                    self.make_generator(f, args)
                } else {
                    self.call_function(f, args)
                }
            }
            Value::Builtin(b) => crate::builtins::call(self, *b, args),
            Value::ModuleFn(m) => crate::modules::call(self, *m, args),
            Value::HostFn(h) => {
                args.reject_kw(&h.name).map_err(Unwind::Raise)?;
                let mut host_args = Vec::with_capacity(args.pos.len());
                for value in &args.pos {
                    host_args.push(crate::object::Object::from_value(value));
                }
                // Host callables run outside the compute budget, like any
                // other capability I/O.
                let paused = self.ctx.budget.pause();
                let result = h.call(host_args);
                self.ctx.budget.unpause(paused);
                match result {
                    Ok(obj) => Ok(obj.to_value().map_err(Unwind::Raise)?),
                    Err(message) => Err(Unwind::Raise(host_error_to_exc(&message))),
                }
            }
            Value::Method(bm) => match &bm.kind {
                MethodKind::User(f) => {
                    let mut all = Args {
                        pos: Vec::with_capacity(args.pos.len() + 1),
                        kw: args.kw,
                    };
                    all.pos.push(bm.recv.clone());
                    all.pos.extend(args.pos);
                    if f.is_generator {
                        self.make_generator(f, all)
                    } else {
                        self.call_function(f, all)
                    }
                }
                MethodKind::Primitive(name) => {
                    let recv = bm.recv.clone();
                    let name = name.clone();
                    methods::call_method(self, &recv, &name, args).map_err(Unwind::Raise)
                }
            },
            Value::Class(cls) => {
                let cls = cls.clone();
                self.instantiate(&cls, args)
            }
            Value::ExcClass(t) => Ok(Value::ExcInstance(Rc::new(crate::value::ExcInstanceObj {
                exc_type: *t,
                args: args.pos,
            }))),
            Value::Marker(Marker::RouteDecorator { method, path }) => {
                let (method, path) = (method.clone(), path.clone());
                self.apply_route_decorator(&method, &path, args)
            }
            other => {
                let _ = line;
                Err(PyExc::not_callable(other.type_name()).into())
            }
        }
    }

    /// Calls a non-generator user function or lambda.
    pub(crate) fn call_function(&mut self, f: &Rc<FuncObj>, args: Args) -> Ev<Value> {
        if self.call_depth + 1 > self.ctx.max_recursion_depth {
            return Err(PyExc::new(
                ExcType::RecursionError,
                "maximum recursion depth exceeded",
            )
            .into());
        }
        let profiling = self.ctx.profile.is_some();
        let started = if profiling { Some(Instant::now()) } else { None };

        let scope = self.bind_params(f, args)?;
        self.env.push_call_scope(scope);
        self.call_depth += 1;
        let result = match &f.body {
            FuncBody::Block(body) => match self.exec_block(body) {
                Ok(()) => Ok(Value::None),
                Err(Unwind::Return(value)) => Ok(value),
                Err(Unwind::Yield(..)) => {
                    Err(PyExc::internal(format!("yield escaped function '{}'", f.qualname)).into())
                }
                Err(Unwind::Break | Unwind::Continue) => {
                    Err(PyExc::internal(format!("loop control escaped function '{}'", f.qualname)).into())
                }
                Err(other) => Err(other),
            },
            FuncBody::Expr(expr) => {
                let expr = expr.clone();
                self.eval_expr(&expr)
            }
        };
        self.call_depth -= 1;
        self.env.pop_scope();

        if let (Some(started), Some(profile)) = (started, self.ctx.profile.as_mut()) {
            *profile.call_counts.entry(f.qualname.clone()).or_insert(0) += 1;
            *profile.call_micros.entry(f.qualname.clone()).or_insert(0) +=
                started.elapsed().as_micros() as u64;
        }
        result
    }

    /// Binds call arguments to a fresh call scope: the closure snapshot, the
    /// function's own name (so nested functions can recurse), then
    /// parameters.
    fn bind_params(&mut self, f: &Rc<FuncObj>, args: Args) -> Ev<IndexMap<String, Value>> {
        let mut scope = f.captured.clone();
        if !f.name.starts_with('<') {
            scope.insert(f.name.clone(), Value::Func(f.clone()));
        }
        let params = f.params.clone();

        let mut bound: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut pos_iter = args.pos.into_iter();
        for param in &params.pos {
            match pos_iter.next() {
                Some(value) => {
                    scope.insert(param.name.clone(), value);
                    bound.insert(param.name.clone());
                }
                None => break,
            }
        }
        let leftover: Vec<Value> = pos_iter.collect();
        if !leftover.is_empty() && params.var_args.is_none() {
            return Err(PyExc::arg_count(
                &f.name,
                params.pos.len(),
                params.pos.len() + leftover.len(),
            )
            .into());
        }

        let mut var_kwargs = crate::types::dict::Dict::new();
        for (key, value) in args.kw {
            let is_param = params.pos.iter().chain(params.kw_only.iter()).any(|p| p.name == key);
            if is_param {
                if bound.contains(key.as_str()) {
                    return Err(PyExc::type_error(format!(
                        "{}() got multiple values for argument '{key}'",
                        f.name
                    ))
                    .into());
                }
                scope.insert(key.clone(), value);
                bound.insert(key);
            } else if params.var_kwargs.is_some() {
                var_kwargs
                    .insert(Value::str(&key), value)
                    .map_err(Unwind::Raise)?;
            } else {
                return Err(PyExc::type_error(format!(
                    "{}() got an unexpected keyword argument '{key}'",
                    f.name
                ))
                .into());
            }
        }

        // Defaults evaluate at call time in the caller's scope.
        for param in params.pos.iter().chain(params.kw_only.iter()) {
            if bound.contains(param.name.as_str()) {
                continue;
            }
            match &param.default {
                Some(default) => {
                    let value = self.eval_expr(default)?;
                    scope.insert(param.name.clone(), value);
                }
                None => {
                    return Err(PyExc::type_error(format!(
                        "{}() missing 1 required positional argument: '{}'",
                        f.name, param.name
                    ))
                    .into());
                }
            }
        }

        if let Some(var_args) = &params.var_args {
            scope.insert(var_args.clone(), Value::tuple(leftover));
        }
        if let Some(kwargs_name) = &params.var_kwargs {
            scope.insert(kwargs_name.clone(), Value::dict(var_kwargs));
        }
        Ok(scope)
    }

    /// Instantiates a user class: fresh instance, `args` recorded for
    /// exception classes, then `__init__`.
    pub(crate) fn instantiate(&mut self, cls: &Rc<ClassObj>, args: Args) -> Ev<Value> {
        let instance = Rc::new(InstanceObj::new(cls.clone()));
        let value = Value::Instance(instance.clone());
        if cls.is_exception() {
            instance
                .attrs
                .borrow_mut()
                .insert("args".to_string(), Value::tuple(args.pos.clone()));
        }
        match cls.lookup("__init__") {
            Some(Value::Func(init)) => {
                let mut all = Args {
                    pos: Vec::with_capacity(args.pos.len() + 1),
                    kw: args.kw,
                };
                all.pos.push(value.clone());
                all.pos.extend(args.pos);
                self.call_function(&init, all)?;
            }
            _ => {
                if !(args.pos.is_empty() && args.kw.is_empty()) && !cls.is_exception() {
                    return Err(PyExc::type_error(format!("{}() takes no arguments", cls.name)).into());
                }
            }
        }
        Ok(value)
    }

    // --- generators ---------------------------------------------------------

    /// Calling a generator function: eager mode runs the body to completion
    /// into the accumulator; deferred mode returns a not-yet-started
    /// generator object.
    fn make_generator(&mut self, f: &Rc<FuncObj>, args: Args) -> Ev<Value> {
        let scope = self.bind_params(f, args)?;
        let FuncBody::Block(body) = &f.body else {
            return Err(PyExc::internal("generator without a block body").into());
        };
        match self.ctx.gen_mode {
            GenMode::Eager => {
                self.ctx.gen_accum.push(Vec::new());
                self.env.push_call_scope(scope);
                self.call_depth += 1;
                let result = self.exec_block(body);
                self.call_depth -= 1;
                self.env.pop_scope();
                let items = self.ctx.gen_accum.pop().unwrap_or_default();
                match result {
                    Ok(()) | Err(Unwind::Return(_)) => Ok(Value::Generator(Rc::new(RefCell::new(
                        GeneratorObj::materialized(f.qualname.clone(), items),
                    )))),
                    Err(other) => Err(other),
                }
            }
            GenMode::Deferred => Ok(Value::Generator(Rc::new(RefCell::new(GeneratorObj::deferred(
                f.qualname.clone(),
                f.clone(),
                scope,
            ))))),
        }
    }

    /// Advances a generator by one value. `None` means exhausted.
    pub(crate) fn gen_next(&mut self, r#gen: &Rc<RefCell<GeneratorObj>>) -> Ev<Option<Value>> {
        let state = std::mem::replace(&mut r#gen.borrow_mut().state, GenState::Running);
        match state {
            GenState::Materialized { mut items } => {
                let next = items.pop_front();
                r#gen.borrow_mut().state = if next.is_some() {
                    GenState::Materialized { items }
                } else {
                    GenState::Done
                };
                Ok(next)
            }
            GenState::NotStarted { func, scope } => {
                let FuncBody::Block(body) = &func.body else {
                    r#gen.borrow_mut().state = GenState::Done;
                    return Err(PyExc::internal("generator without a block body").into());
                };
                let body = body.clone();
                self.env.push_call_scope(scope);
                self.call_depth += 1;
                let result = self.exec_block(&body);
                self.call_depth -= 1;
                self.finish_gen_step(r#gen, result)
            }
            GenState::Suspended { frames, scope } => {
                self.env.push_call_scope(scope);
                self.call_depth += 1;
                let result = self.resume_frames(frames);
                self.call_depth -= 1;
                self.finish_gen_step(r#gen, result)
            }
            GenState::Running => {
                r#gen.borrow_mut().state = GenState::Running;
                Err(PyExc::value_error("generator already executing").into())
            }
            GenState::Done => {
                r#gen.borrow_mut().state = GenState::Done;
                Ok(None)
            }
        }
    }

    /// Interprets the outcome of one deferred-generator step. The function
    /// scope is still pushed and is either saved (on suspension) or dropped.
    fn finish_gen_step(
        &mut self,
        r#gen: &Rc<RefCell<GeneratorObj>>,
        result: Ev<()>,
    ) -> Ev<Option<Value>> {
        match result {
            Err(Unwind::Yield(value, frames)) => {
                let scope = self.env.pop_scope();
                r#gen.borrow_mut().state = GenState::Suspended { frames, scope };
                Ok(Some(value))
            }
            Ok(()) | Err(Unwind::Return(_)) => {
                self.env.pop_scope();
                r#gen.borrow_mut().state = GenState::Done;
                Ok(None)
            }
            Err(other) => {
                self.env.pop_scope();
                r#gen.borrow_mut().state = GenState::Done;
                Err(other)
            }
        }
    }

    /// Simplified call for host-side drivers and primitive-method callbacks:
    /// any non-exception unwind is an internal fault.
    pub(crate) fn call_simple(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, PyExc> {
        self.call_simple_kw(func, Args::positional(args))
    }

    /// Like [`Self::call_simple`], with keyword arguments.
    pub(crate) fn call_simple_kw(&mut self, func: &Value, args: Args) -> Result<Value, PyExc> {
        match self.call_value(func, args, 0) {
            Ok(value) => Ok(value),
            Err(Unwind::Raise(exc)) => Err(exc),
            Err(_) => Err(PyExc::internal("unexpected unwind from callable")),
        }
    }
}

impl MethodHost for Interp {
    fn call_callable(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, PyExc> {
        self.call_simple(func, args)
    }

    fn materialize(&mut self, value: &Value) -> Result<Vec<Value>, PyExc> {
        match value {
            Value::Generator(r#gen) => {
                let r#gen = r#gen.clone();
                match self.drain_generator(&r#gen) {
                    Ok(items) => Ok(items),
                    Err(Unwind::Raise(exc)) => Err(exc),
                    Err(_) => Err(PyExc::internal("unexpected unwind while draining generator")),
                }
            }
            other => crate::ops::iter_values(other),
        }
    }

    fn context(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

/// Maps a host-callable error string onto a Python exception, honoring an
/// explicit `"ClassName: …"` prefix.
fn host_error_to_exc(message: &str) -> PyExc {
    if let Some((prefix, rest)) = message.split_once(": ") {
        if let Some(exc_type) = ExcType::from_name(prefix) {
            return PyExc::new(exc_type, rest.to_string());
        }
    }
    PyExc::new(ExcType::RuntimeError, message.to_string())
}
