//! The tree-walking evaluator.
//!
//! Every statement and expression evaluates to an outcome: a value, or one of
//! the tagged unwind signals in [`Unwind`]. Python control flow never rides
//! on Rust panics; `?` propagates the unwind branch of the `Result` and each
//! construct consumes the tags it owns (loops eat `Break`/`Continue`,
//! function calls eat `Return`, `try` eats `Raise`, the generator driver eats
//! `Yield`).

mod call;
mod expr;
mod imports;
mod pattern;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{Block, ExceptHandler, Expr, ExprLoc, Stmt, StmtLoc, Target},
    context::{Context, EventKind, StepOutcome},
    env::Environment,
    error::Error,
    exc::{ExcClass, ExcType, PyExc},
    ops,
    types::{
        class::ClassObj,
        function::{FuncBody, FuncObj},
        generator::{ForIter, Frame, TryPending, TryStage, YieldSource},
    },
    value::{Marker, RangeVal, Value},
};

/// Non-local control flow, carried as the error branch of every eval result.
#[derive(Debug)]
pub(crate) enum Unwind {
    Return(Value),
    Break,
    Continue,
    Raise(PyExc),
    /// Deferred-mode generator suspension: the yielded value plus the
    /// continuation frames accumulated so far (innermost first).
    Yield(Value, Vec<Frame>),
    /// `suspend()` was called; the host may snapshot and resume later.
    Suspend,
}

impl From<PyExc> for Unwind {
    fn from(exc: PyExc) -> Self {
        Self::Raise(exc)
    }
}

/// Result alias used throughout the evaluator.
pub(crate) type Ev<T = Value> = Result<T, Unwind>;

/// The interpreter state for one run: scope stack plus context.
pub(crate) struct Interp {
    pub env: Environment,
    pub ctx: Context,
    pub(crate) call_depth: usize,
    /// Active exceptions for bare `raise` inside except blocks.
    pub(crate) active_excs: Vec<PyExc>,
    /// Qualified-name prefix stack (class bodies) for function metadata.
    pub(crate) qual_prefix: Vec<String>,
    /// Source modules currently executing their body, for cycle detection.
    pub(crate) loading_modules: Vec<String>,
}

impl Interp {
    pub(crate) fn new(ctx: Context) -> Self {
        Self {
            env: Environment::new(),
            ctx,
            call_depth: 0,
            active_excs: Vec::new(),
            qual_prefix: Vec::new(),
            loading_modules: Vec::new(),
        }
    }

    /// Runs a module body to completion.
    ///
    /// The result is the value of the final statement when it is an
    /// expression statement, `None` otherwise (an empty program yields
    /// `None`).
    pub(crate) fn run_module(&mut self, body: &[StmtLoc]) -> Result<Value, ModuleExit> {
        self.ctx.budget.start();
        let mut last = Value::None;
        for stmt in body {
            let is_expr = matches!(stmt.node, Stmt::Expr(_));
            match self.exec_stmt_capture(stmt) {
                Ok(value) => last = if is_expr { value } else { Value::None },
                Err(Unwind::Raise(exc)) => return Err(ModuleExit::Exc(exc)),
                Err(Unwind::Suspend) => return Err(ModuleExit::Suspended),
                Err(Unwind::Return(_)) => {
                    return Err(ModuleExit::Exc(PyExc::new(
                        ExcType::SyntaxError,
                        "'return' outside function",
                    )));
                }
                Err(Unwind::Break | Unwind::Continue) => {
                    return Err(ModuleExit::Exc(PyExc::new(
                        ExcType::SyntaxError,
                        "'break' outside loop",
                    )));
                }
                Err(Unwind::Yield(..)) => {
                    return Err(ModuleExit::Exc(PyExc::new(
                        ExcType::SyntaxError,
                        "'yield' outside function",
                    )));
                }
            }
        }
        Ok(last)
    }

    /// Executes one statement, returning the expression value for expression
    /// statements (used for the module-level result).
    fn exec_stmt_capture(&mut self, stmt: &StmtLoc) -> Ev<Value> {
        if let Stmt::Expr(e) = &stmt.node {
            self.budget_tick(stmt.line)?;
            let value = self.eval_expr(e)?;
            return Ok(self.intercept_marker(value)?);
        }
        self.exec_stmt(stmt)?;
        Ok(Value::None)
    }

    /// Budget and profiling bookkeeping, charged per statement.
    fn budget_tick(&mut self, line: u32) -> Result<(), PyExc> {
        self.ctx.budget.check()?;
        if let Some(profile) = &mut self.ctx.profile {
            *profile.line_counts.entry(line).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Executes the statements of a block starting at `start`.
    ///
    /// On a yield unwinding through, appends a block continuation frame for
    /// the remaining statements.
    pub(crate) fn exec_block_from(&mut self, body: &Block, start: usize) -> Ev<()> {
        for i in start..body.len() {
            match self.exec_stmt(&body[i]) {
                Ok(()) => {}
                Err(Unwind::Yield(value, mut frames)) => {
                    frames.push(Frame::Block {
                        body: body.clone(),
                        next: i + 1,
                    });
                    return Err(Unwind::Yield(value, frames));
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    pub(crate) fn exec_block(&mut self, body: &Block) -> Ev<()> {
        self.exec_block_from(body, 0)
    }

    pub(crate) fn exec_stmt(&mut self, stmt: &StmtLoc) -> Ev<()> {
        self.budget_tick(stmt.line)?;
        match self.exec_stmt_inner(stmt) {
            Err(Unwind::Raise(exc)) => Err(Unwind::Raise(exc.with_line(stmt.line))),
            other => other,
        }
    }

    fn exec_stmt_inner(&mut self, stmt: &StmtLoc) -> Ev<()> {
        match &stmt.node {
            Stmt::Expr(e) => {
                let value = self.eval_expr(e)?;
                self.intercept_marker(value)?;
                Ok(())
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval_expr(value)?;
                let value = self.intercept_marker(value)?;
                for target in targets {
                    self.bind_target(target, value.clone())?;
                }
                Ok(())
            }
            Stmt::AugAssign { target, op, value } => {
                let current = self.read_target(target)?;
                let rhs = self.eval_expr(value)?;
                let updated = self.binary_dispatch(*op, &current, &rhs)?;
                self.bind_target(target, updated)
            }
            Stmt::AnnAssign { target, value } => {
                if let Some(value) = value {
                    let value = self.eval_expr(value)?;
                    let value = self.intercept_marker(value)?;
                    self.bind_target(target, value)?;
                }
                Ok(())
            }
            Stmt::If { branches, or_else } => {
                for (cond, body) in branches {
                    if self.eval_expr(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = or_else {
                    return self.exec_block(body);
                }
                Ok(())
            }
            Stmt::While { cond, body, or_else } => self.exec_while(cond, body, or_else.as_ref()),
            Stmt::For {
                target,
                iter,
                body,
                or_else,
            } => {
                let iterable = self.eval_expr(iter)?;
                let iter_state = self.make_for_iter(&iterable)?;
                self.exec_for(target, iter_state, body, or_else.as_ref())
            }
            Stmt::Def(decl) => {
                let func = self.make_function(decl)?;
                let bound = self.apply_decorators(&decl.decorators, func)?;
                let bound = self.intercept_marker(bound)?;
                self.env.bind(&decl.name, bound);
                Ok(())
            }
            Stmt::Class {
                name,
                bases,
                body,
                decorators,
            } => self.exec_class(name, bases, body, decorators),
            Stmt::Return(value) => {
                let value = match value {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::None,
                };
                Err(Unwind::Return(value))
            }
            Stmt::Pass => Ok(()),
            Stmt::Break => Err(Unwind::Break),
            Stmt::Continue => Err(Unwind::Continue),
            Stmt::Raise(exc) => self.exec_raise(exc.as_ref()),
            Stmt::Try {
                body,
                handlers,
                or_else,
                finally,
            } => self.exec_try(body, handlers, or_else.as_ref(), finally.as_ref()),
            Stmt::With { expr, name, body } => self.exec_with(expr, name.as_deref(), body),
            Stmt::Assert { cond, msg } => {
                if self.eval_expr(cond)?.truthy() {
                    return Ok(());
                }
                let message = match msg {
                    Some(e) => self.eval_expr(e)?.py_str(),
                    None => String::new(),
                };
                Err(PyExc::new(ExcType::AssertionError, message).into())
            }
            Stmt::Del(targets) => {
                for target in targets {
                    self.delete_target(target)?;
                }
                Ok(())
            }
            Stmt::Global(names) => {
                for name in names {
                    self.env.declare_global(name);
                }
                Ok(())
            }
            Stmt::Nonlocal(names) => {
                for name in names {
                    self.env.declare_nonlocal(name)?;
                }
                Ok(())
            }
            Stmt::Import(names) => {
                for (module, alias) in names {
                    self.exec_import(module, alias.as_deref())?;
                }
                Ok(())
            }
            Stmt::FromImport { module, names } => self.exec_from_import(module, names),
            Stmt::Match { subject, cases } => self.exec_match(subject, cases),
        }
    }

    /// Intercepts effect markers at their top-level assignment or
    /// expression-statement site. Route registrations are appended to the
    /// context's route table; the original handler stands in as the value.
    pub(crate) fn intercept_marker(&mut self, value: Value) -> Result<Value, PyExc> {
        if let Value::Marker(Marker::RouteReg(reg)) = &value {
            let (segments, param_names) = crate::context::compile_path(&reg.path);
            self.ctx.routes.push(crate::context::RouteEntry {
                method: reg.method.to_uppercase(),
                segments,
                param_names,
                handler: reg.handler.clone(),
            });
            return Ok(reg.handler.clone());
        }
        Ok(value)
    }

    // --- loops --------------------------------------------------------------

    fn exec_while(&mut self, cond: &ExprLoc, body: &Block, or_else: Option<&Block>) -> Ev<()> {
        loop {
            self.ctx.budget.check().map_err(Unwind::Raise)?;
            if !self.eval_expr(cond)?.truthy() {
                break;
            }
            match self.exec_block(body) {
                Ok(()) => {}
                Err(Unwind::Break) => return Ok(()),
                Err(Unwind::Continue) => {}
                Err(Unwind::Yield(value, mut frames)) => {
                    frames.push(Frame::WhileLoop {
                        cond: cond.clone(),
                        body: body.clone(),
                        or_else: or_else.cloned(),
                    });
                    return Err(Unwind::Yield(value, frames));
                }
                Err(other) => return Err(other),
            }
        }
        if let Some(body) = or_else {
            self.exec_block(body)?;
        }
        Ok(())
    }

    /// Builds the lazy iteration state for a for-loop.
    pub(crate) fn make_for_iter(&mut self, iterable: &Value) -> Ev<ForIter> {
        match iterable {
            Value::Range(r) => Ok(ForIter::Range(*r)),
            Value::Generator(r#gen) => {
                let items = self.drain_generator(r#gen)?;
                Ok(ForIter::Items(items.into()))
            }
            other => Ok(ForIter::Items(ops::iter_values(other)?.into())),
        }
    }

    pub(crate) fn exec_for(
        &mut self,
        target: &Target,
        mut iter: ForIter,
        body: &Block,
        or_else: Option<&Block>,
    ) -> Ev<()> {
        loop {
            self.ctx.budget.check().map_err(Unwind::Raise)?;
            let Some(item) = iter.next() else { break };
            self.bind_target(target, item)?;
            match self.exec_block(body) {
                Ok(()) => {}
                Err(Unwind::Break) => return Ok(()),
                Err(Unwind::Continue) => {}
                Err(Unwind::Yield(value, mut frames)) => {
                    frames.push(Frame::ForLoop {
                        target: target.clone(),
                        iter,
                        body: body.clone(),
                        or_else: or_else.cloned(),
                    });
                    return Err(Unwind::Yield(value, frames));
                }
                Err(other) => return Err(other),
            }
        }
        if let Some(body) = or_else {
            self.exec_block(body)?;
        }
        Ok(())
    }

    // --- targets ------------------------------------------------------------

    pub(crate) fn bind_target(&mut self, target: &Target, value: Value) -> Ev<()> {
        match target {
            Target::Name(name) => {
                self.env.bind(name, value);
                Ok(())
            }
            Target::Attr { obj, attr } => {
                let obj = self.eval_expr(obj)?;
                self.set_attr(&obj, attr, value).map_err(Unwind::Raise)
            }
            Target::Subscript { obj, index } => {
                if matches!(index.node, Expr::Slice { .. }) {
                    return Err(PyExc::type_error("slice assignment is not supported").into());
                }
                let obj = self.eval_expr(obj)?;
                // `__setitem__` on instances dispatches through the class.
                if let Value::Instance(_) = &obj {
                    let index = self.eval_expr(index)?;
                    self.call_dunder(&obj, "__setitem__", vec![index, value])?;
                    return Ok(());
                }
                let index = self.eval_expr(index)?;
                ops::subscript_set(&obj, &index, value).map_err(Unwind::Raise)
            }
            Target::Tuple(targets) => {
                let items = match &value {
                    Value::Generator(r#gen) => self.drain_generator(r#gen)?,
                    other => ops::iter_values(other)?,
                };
                if items.len() != targets.len() {
                    let message = if items.len() < targets.len() {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    } else {
                        format!("too many values to unpack (expected {})", targets.len())
                    };
                    return Err(PyExc::value_error(message).into());
                }
                for (target, item) in targets.iter().zip(items) {
                    self.bind_target(target, item)?;
                }
                Ok(())
            }
        }
    }

    /// Reads the current value of an augmented-assignment target.
    fn read_target(&mut self, target: &Target) -> Ev<Value> {
        match target {
            Target::Name(name) => self
                .env
                .lookup(name)
                .ok_or_else(|| Unwind::Raise(PyExc::name_error(name))),
            Target::Attr { obj, attr } => {
                let obj = self.eval_expr(obj)?;
                self.get_attr(&obj, attr)
            }
            Target::Subscript { obj, index } => {
                if matches!(index.node, Expr::Slice { .. }) {
                    return Err(PyExc::type_error("slice assignment is not supported").into());
                }
                let obj = self.eval_expr(obj)?;
                let index = self.eval_expr(index)?;
                self.subscript_value(&obj, &index)
            }
            Target::Tuple(_) => Err(PyExc::new(
                ExcType::SyntaxError,
                "illegal target for augmented assignment",
            )
            .into()),
        }
    }

    fn delete_target(&mut self, target: &Target) -> Ev<()> {
        match target {
            Target::Name(name) => self.env.delete(name).map_err(Unwind::Raise),
            Target::Attr { obj, attr } => {
                let obj = self.eval_expr(obj)?;
                match &obj {
                    Value::Instance(inst) => {
                        if inst.attrs.borrow_mut().shift_remove(attr).is_none() {
                            return Err(PyExc::attribute_error(obj.type_name(), attr).into());
                        }
                        Ok(())
                    }
                    Value::Class(cls) => {
                        if cls.attrs.borrow_mut().shift_remove(attr).is_none() {
                            return Err(PyExc::attribute_error(obj.type_name(), attr).into());
                        }
                        Ok(())
                    }
                    other => Err(PyExc::attribute_error(other.type_name(), attr).into()),
                }
            }
            Target::Subscript { obj, index } => {
                if matches!(index.node, Expr::Slice { .. }) {
                    return Err(PyExc::type_error("slice deletion is not supported").into());
                }
                let obj = self.eval_expr(obj)?;
                let index = self.eval_expr(index)?;
                ops::subscript_del(&obj, &index).map_err(Unwind::Raise)
            }
            Target::Tuple(targets) => {
                for target in targets {
                    self.delete_target(target)?;
                }
                Ok(())
            }
        }
    }

    // --- raise / try --------------------------------------------------------

    fn exec_raise(&mut self, exc: Option<&ExprLoc>) -> Ev<()> {
        let Some(exc_expr) = exc else {
            // Bare raise re-raises the active exception.
            let Some(active) = self.active_excs.last().cloned() else {
                return Err(PyExc::new(ExcType::RuntimeError, "No active exception to re-raise").into());
            };
            return Err(Unwind::Raise(active));
        };
        let value = self.eval_expr(exc_expr)?;
        Err(Unwind::Raise(self.exception_from_value(value)?))
    }

    /// Converts a raised value into an in-flight exception.
    pub(crate) fn exception_from_value(&mut self, value: Value) -> Ev<PyExc> {
        match value {
            Value::ExcClass(t) => Ok(PyExc::new(t, "")),
            Value::ExcInstance(obj) => Ok(PyExc::new(obj.exc_type, obj.message())),
            Value::Class(cls) if cls.is_exception() => {
                let instance = self.instantiate(&cls, crate::args::Args::default())?;
                self.exception_from_value(instance)
            }
            Value::Instance(inst) if inst.class.is_exception() => {
                let message = inst
                    .attrs
                    .borrow()
                    .get("args")
                    .map(|args| match args {
                        Value::Tuple(items) => match items.as_slice() {
                            [] => String::new(),
                            [single] => single.py_str(),
                            _ => args.py_repr(),
                        },
                        other => other.py_str(),
                    })
                    .unwrap_or_default();
                Ok(PyExc {
                    class: ExcClass::User {
                        name: inst.class.name.clone(),
                        ancestry: inst.class.ancestry(),
                    },
                    message,
                    line: None,
                    catchable: true,
                })
            }
            other => Err(PyExc::type_error(format!(
                "exceptions must derive from BaseException, not '{}'",
                other.type_name()
            ))
            .into()),
        }
    }

    fn exec_try(
        &mut self,
        body: &Block,
        handlers: &[ExceptHandler],
        or_else: Option<&Block>,
        finally: Option<&Block>,
    ) -> Ev<()> {
        let env_depth = self.env.depth();
        let outcome = self.exec_block(body);
        self.try_step(outcome, TryStage::Body, handlers, or_else, finally, env_depth)
    }

    /// Applies try semantics after one region of the statement has produced
    /// an outcome: handler matching, the else block, then `finally` with
    /// outcome override.
    ///
    /// A yield in any region re-wraps into a [`Frame::Try`] continuation, so
    /// the statement stays protected across suspensions. `finally` runs on
    /// every true exit path (normal, exception, return, break, continue) but
    /// never at a suspension: a suspended try has not exited yet.
    fn try_step(
        &mut self,
        outcome: Ev<()>,
        stage: TryStage,
        handlers: &[ExceptHandler],
        or_else: Option<&Block>,
        finally: Option<&Block>,
        env_depth: usize,
    ) -> Ev<()> {
        let pending = match stage {
            TryStage::Body => match outcome {
                Ok(()) => {
                    // `else` runs iff no exception occurred.
                    if let Some(else_body) = or_else {
                        let else_outcome = self.exec_block(else_body);
                        return self.try_step(
                            else_outcome,
                            TryStage::OrElse,
                            handlers,
                            or_else,
                            finally,
                            env_depth,
                        );
                    }
                    TryPending::Normal
                }
                Err(Unwind::Yield(value, frames)) => {
                    return try_frame(value, frames, handlers, or_else, finally, TryStage::Body);
                }
                Err(Unwind::Raise(exc)) if exc.catchable => {
                    self.env.truncate(env_depth);
                    match self.find_handler(handlers, &exc)? {
                        Some(handler_index) => {
                            let handler = &handlers[handler_index];
                            if let Some(name) = &handler.name {
                                // `as name` binds the exception message.
                                self.env.bind(name, Value::str(&exc.message));
                            }
                            self.active_excs.push(exc.clone());
                            let handler_outcome = self.exec_block(&handler.body);
                            self.active_excs.pop();
                            return self.try_step(
                                handler_outcome,
                                TryStage::Handler(exc),
                                handlers,
                                or_else,
                                finally,
                                env_depth,
                            );
                        }
                        None => TryPending::Raise(exc),
                    }
                }
                // Replay re-executes from the top, so a suspension skips
                // cleanup entirely.
                Err(Unwind::Suspend) => return Err(Unwind::Suspend),
                Err(Unwind::Return(value)) => TryPending::Return(value),
                Err(Unwind::Break) => TryPending::Break,
                Err(Unwind::Continue) => TryPending::Continue,
                Err(Unwind::Raise(exc)) => TryPending::Raise(exc),
            },
            TryStage::Handler(exc) => match outcome {
                Ok(()) => TryPending::Normal,
                Err(Unwind::Yield(value, frames)) => {
                    return try_frame(value, frames, handlers, or_else, finally, TryStage::Handler(exc));
                }
                Err(Unwind::Suspend) => return Err(Unwind::Suspend),
                Err(Unwind::Return(value)) => TryPending::Return(value),
                Err(Unwind::Break) => TryPending::Break,
                Err(Unwind::Continue) => TryPending::Continue,
                Err(Unwind::Raise(raised)) => TryPending::Raise(raised),
            },
            TryStage::OrElse => match outcome {
                Ok(()) => TryPending::Normal,
                Err(Unwind::Yield(value, frames)) => {
                    return try_frame(value, frames, handlers, or_else, finally, TryStage::OrElse);
                }
                Err(Unwind::Suspend) => return Err(Unwind::Suspend),
                Err(Unwind::Return(value)) => TryPending::Return(value),
                Err(Unwind::Break) => TryPending::Break,
                Err(Unwind::Continue) => TryPending::Continue,
                Err(Unwind::Raise(raised)) => TryPending::Raise(raised),
            },
            TryStage::Finally(saved) => {
                // The finally block itself just ran and may override the
                // outcome it inherited.
                return match outcome {
                    Ok(()) => pending_to_ev(saved),
                    Err(Unwind::Yield(value, frames)) => {
                        try_frame(value, frames, handlers, or_else, finally, TryStage::Finally(saved))
                    }
                    overriding => overriding,
                };
            }
        };

        // The protected regions are done; the statement is exiting.
        if let Some(final_body) = finally {
            self.env.truncate(env_depth);
            let final_outcome = self.exec_block(final_body);
            return self.try_step(
                final_outcome,
                TryStage::Finally(pending),
                handlers,
                or_else,
                finally,
                env_depth,
            );
        }
        pending_to_ev(pending)
    }

    /// Finds the first except clause matching the exception, evaluating the
    /// clause class expressions on demand.
    fn find_handler(&mut self, handlers: &[ExceptHandler], exc: &PyExc) -> Ev<Option<usize>> {
        for (i, handler) in handlers.iter().enumerate() {
            if handler.classes.is_empty() {
                return Ok(Some(i));
            }
            for class_expr in &handler.classes {
                let class_value = self.eval_expr(class_expr)?;
                let name = match &class_value {
                    Value::ExcClass(t) => (*t).to_string(),
                    Value::Class(c) => c.name.clone(),
                    other => {
                        return Err(PyExc::type_error(format!(
                            "catching classes that do not inherit from BaseException is not allowed, got '{}'",
                            other.type_name()
                        ))
                        .into());
                    }
                };
                if exc.matches_name(&name) {
                    return Ok(Some(i));
                }
            }
        }
        Ok(None)
    }

    // --- with ---------------------------------------------------------------

    fn exec_with(&mut self, expr: &ExprLoc, name: Option<&str>, body: &Block) -> Ev<()> {
        let manager = self.eval_expr(expr)?;
        match &manager {
            Value::File(id) => {
                let id = *id;
                if let Some(name) = name {
                    self.env.bind(name, manager.clone());
                }
                let outcome = self.exec_block(body);
                // Close on every exit path.
                self.ctx.close_handle(id).map_err(Unwind::Raise)?;
                outcome
            }
            Value::Instance(_) => {
                let entered = self.call_dunder(&manager, "__enter__", vec![])?;
                if let Some(name) = name {
                    self.env.bind(name, entered);
                }
                let outcome = self.exec_block(body);
                let (exit_args, failed) = match &outcome {
                    Err(Unwind::Raise(exc)) if exc.catchable => (
                        vec![
                            Value::str(exc.class.name()),
                            Value::str(&exc.message),
                            Value::None,
                        ],
                        true,
                    ),
                    _ => (vec![Value::None, Value::None, Value::None], false),
                };
                let exit_result = self.call_dunder(&manager, "__exit__", exit_args)?;
                if failed && exit_result.truthy() {
                    // A truthy __exit__ swallows the exception.
                    return Ok(());
                }
                outcome
            }
            other => Err(PyExc::type_error(format!(
                "'{}' object does not support the context manager protocol",
                other.type_name()
            ))
            .into()),
        }
    }

    // --- def / class --------------------------------------------------------

    pub(crate) fn make_function(&mut self, decl: &Rc<crate::ast::FuncDecl>) -> Ev<Value> {
        let qualname = if self.qual_prefix.is_empty() {
            decl.name.clone()
        } else {
            format!("{}.{}", self.qual_prefix.join("."), decl.name)
        };
        let func = FuncObj {
            name: decl.name.clone(),
            qualname,
            params: Rc::new(decl.params.clone()),
            body: FuncBody::Block(decl.body.clone()),
            captured: self.env.snapshot_locals(),
            is_generator: decl.is_generator,
            line: decl.line,
        };
        Ok(Value::Func(Rc::new(func)))
    }

    fn apply_decorators(&mut self, decorators: &[ExprLoc], mut value: Value) -> Ev<Value> {
        for decorator in decorators.iter().rev() {
            let dec = self.eval_expr(decorator)?;
            value = self.call_value(&dec, crate::args::Args::positional(vec![value]), decorator.line)?;
        }
        Ok(value)
    }

    fn exec_class(
        &mut self,
        name: &str,
        base_exprs: &[ExprLoc],
        body: &Block,
        decorators: &[ExprLoc],
    ) -> Ev<()> {
        let mut bases: Vec<Rc<ClassObj>> = Vec::new();
        let mut exc_bases: Vec<ExcType> = Vec::new();
        for base in base_exprs {
            match self.eval_expr(base)? {
                Value::Class(c) => bases.push(c),
                Value::ExcClass(t) => exc_bases.push(t),
                other => {
                    return Err(PyExc::type_error(format!(
                        "class base must be a class, not '{}'",
                        other.type_name()
                    ))
                    .into());
                }
            }
        }
        // The class body executes in its own scope; the final contents become
        // the class attribute map.
        self.env.push_scope();
        self.qual_prefix.push(name.to_string());
        let body_result = self.exec_block(body);
        self.qual_prefix.pop();
        let attrs: IndexMap<String, Value> = self.env.pop_scope();
        body_result?;

        let class = Value::Class(Rc::new(ClassObj {
            name: name.to_string(),
            bases,
            exc_bases,
            attrs: std::cell::RefCell::new(attrs),
        }));
        let class = self.apply_decorators(decorators, class)?;
        self.env.bind(name, class);
        Ok(())
    }

    // --- generators (driving helpers shared with builtins) ------------------

    /// Materialises a generator completely. Used by for-loops, `list()`,
    /// unpacking, and eager `yield from`.
    pub(crate) fn drain_generator(
        &mut self,
        r#gen: &Rc<std::cell::RefCell<crate::types::generator::GeneratorObj>>,
    ) -> Ev<Vec<Value>> {
        let mut out = Vec::new();
        loop {
            self.ctx.budget.check().map_err(Unwind::Raise)?;
            match self.gen_next(r#gen)? {
                Some(value) => out.push(value),
                None => return Ok(out),
            }
        }
    }

    /// Restores a frame list by running it to the next suspension or to
    /// completion. `pending` threads break/continue across the frame chain.
    pub(crate) fn resume_frames(&mut self, mut frames: Vec<Frame>) -> Ev<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Pending {
            None,
            Break,
            Continue,
        }
        let mut pending = Pending::None;
        while !frames.is_empty() {
            let frame = frames.remove(0);
            match frame {
                Frame::Block { body, next } => {
                    if pending != Pending::None {
                        // A break/continue skips the rest of the block and
                        // keeps unwinding to the nearest loop frame.
                        continue;
                    }
                    match self.exec_block_from(&body, next) {
                        Ok(()) => {}
                        Err(Unwind::Break) => pending = Pending::Break,
                        Err(Unwind::Continue) => pending = Pending::Continue,
                        Err(Unwind::Yield(value, mut inner)) => {
                            inner.extend(frames);
                            return Err(Unwind::Yield(value, inner));
                        }
                        Err(other) => return Err(other),
                    }
                }
                Frame::ForLoop {
                    target,
                    iter,
                    body,
                    or_else,
                } => {
                    if pending == Pending::Break {
                        pending = Pending::None;
                        continue;
                    }
                    pending = Pending::None;
                    match self.exec_for(&target, iter, &body, or_else.as_ref()) {
                        Ok(()) => {}
                        Err(Unwind::Yield(value, mut inner)) => {
                            inner.extend(frames);
                            return Err(Unwind::Yield(value, inner));
                        }
                        Err(other) => return Err(other),
                    }
                }
                Frame::WhileLoop { cond, body, or_else } => {
                    if pending == Pending::Break {
                        pending = Pending::None;
                        continue;
                    }
                    pending = Pending::None;
                    match self.exec_while(&cond, &body, or_else.as_ref()) {
                        Ok(()) => {}
                        Err(Unwind::Yield(value, mut inner)) => {
                            inner.extend(frames);
                            return Err(Unwind::Yield(value, inner));
                        }
                        Err(other) => return Err(other),
                    }
                }
                Frame::YieldFrom { mut source } => {
                    if pending != Pending::None {
                        continue;
                    }
                    let next = match &mut source {
                        YieldSource::Items(items) => items.pop_front(),
                        YieldSource::Gen(inner) => {
                            let inner = inner.clone();
                            self.gen_next(&inner)?
                        }
                    };
                    if let Some(value) = next {
                        let mut inner = vec![Frame::YieldFrom { source }];
                        inner.extend(frames);
                        return Err(Unwind::Yield(value, inner));
                    }
                }
                Frame::Try {
                    inner,
                    handlers,
                    or_else,
                    finally,
                    stage,
                } => {
                    if pending != Pending::None {
                        // Protected continuations live inside the frame, so
                        // no preceding sibling can be unwinding here.
                        return Err(PyExc::internal("loop unwind reached a try continuation").into());
                    }
                    let env_depth = self.env.depth();
                    // Re-entering a handler restores its active exception so
                    // a bare `raise` after the suspension still works.
                    let outcome = if let TryStage::Handler(exc) = &stage {
                        self.active_excs.push(exc.clone());
                        let outcome = self.resume_frames(inner);
                        self.active_excs.pop();
                        outcome
                    } else {
                        self.resume_frames(inner)
                    };
                    match self.try_step(
                        outcome,
                        stage,
                        &handlers,
                        or_else.as_ref(),
                        finally.as_ref(),
                        env_depth,
                    ) {
                        Ok(()) => {}
                        Err(Unwind::Break) => pending = Pending::Break,
                        Err(Unwind::Continue) => pending = Pending::Continue,
                        Err(Unwind::Yield(value, mut inner_frames)) => {
                            inner_frames.extend(frames);
                            return Err(Unwind::Yield(value, inner_frames));
                        }
                        Err(other) => return Err(other),
                    }
                }
            }
        }
        match pending {
            Pending::None => Ok(()),
            Pending::Break => Err(Unwind::Break),
            Pending::Continue => Err(Unwind::Continue),
        }
    }

    /// Turns an uncaught unwind into a host error.
    pub(crate) fn unwind_to_error(unwind: Unwind) -> Error {
        match unwind {
            Unwind::Raise(exc) => Error::from(exc),
            Unwind::Return(_) => Error::new(
                crate::error::ErrorKind::Internal,
                "internal error: return escaped the evaluator",
            ),
            Unwind::Break | Unwind::Continue => Error::new(
                crate::error::ErrorKind::Internal,
                "internal error: loop control escaped the evaluator",
            ),
            Unwind::Yield(..) => Error::new(
                crate::error::ErrorKind::Internal,
                "internal error: yield escaped the evaluator",
            ),
            Unwind::Suspend => Error::new(
                crate::error::ErrorKind::Internal,
                "internal error: suspension escaped the evaluator",
            ),
        }
    }

    /// Records an import event.
    pub(crate) fn record_import(&mut self, name: &str, source: &str) {
        match self.ctx.next_step() {
            StepOutcome::Replay(_) => {}
            StepOutcome::Live => {
                self.ctx.record(
                    EventKind::Import,
                    serde_json::json!({"module": name, "source": source}),
                );
            }
        }
    }

    /// Builds a `range` value, shared by the builtin and iteration paths.
    pub(crate) fn make_range(start: i64, stop: i64, step: i64) -> Result<Value, PyExc> {
        if step == 0 {
            return Err(PyExc::value_error("range() arg 3 must not be zero"));
        }
        Ok(Value::Range(RangeVal { start, stop, step }))
    }
}

/// Wraps a suspension escaping a try region into a [`Frame::Try`]
/// continuation holding the protected frames.
fn try_frame(
    value: Value,
    inner: Vec<Frame>,
    handlers: &[ExceptHandler],
    or_else: Option<&Block>,
    finally: Option<&Block>,
    stage: TryStage,
) -> Ev<()> {
    Err(Unwind::Yield(
        value,
        vec![Frame::Try {
            inner,
            handlers: handlers.to_vec(),
            or_else: or_else.cloned(),
            finally: finally.cloned(),
            stage,
        }],
    ))
}

/// Converts the outcome a `finally` block inherited back into an unwind.
fn pending_to_ev(pending: TryPending) -> Ev<()> {
    match pending {
        TryPending::Normal => Ok(()),
        TryPending::Return(value) => Err(Unwind::Return(value)),
        TryPending::Break => Err(Unwind::Break),
        TryPending::Continue => Err(Unwind::Continue),
        TryPending::Raise(exc) => Err(Unwind::Raise(exc)),
    }
}

/// How a module-level run finished.
pub(crate) enum ModuleExit {
    Exc(PyExc),
    Suspended,
}
