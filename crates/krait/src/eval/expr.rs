//! Expression evaluation.

use std::rc::Rc;

use crate::{
    args::Args,
    ast::{BinOp, CallArg, CmpOp, CompClause, DictItem, Expr, ExprLoc, Literal, Target, UnaryOp},
    exc::{ExcType, PyExc},
    fstring::{FPart, format_value, split_fstring},
    ops,
    parse::parse_expression,
    types::{
        dict::{Dict, Set},
        function::{FuncBody, FuncObj},
        generator::{Frame, GeneratorObj, YieldSource},
    },
    value::{Marker, Value},
};

use super::{Ev, Interp, Unwind};

impl Interp {
    pub(crate) fn eval_expr(&mut self, expr: &ExprLoc) -> Ev<Value> {
        match self.eval_expr_inner(expr) {
            Err(Unwind::Raise(exc)) => Err(Unwind::Raise(exc.with_line(expr.line))),
            other => other,
        }
    }

    fn eval_expr_inner(&mut self, expr: &ExprLoc) -> Ev<Value> {
        match &expr.node {
            Expr::Lit(lit) => Ok(match lit {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(v) => Value::Int(v.clone()),
                Literal::Float(v) => Value::Float(*v),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Var(name) => self.lookup_name(name),
            Expr::FString { template, raw } => self.eval_fstring(template, *raw, expr.line),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.eval_display_item(item, &mut out)?;
                }
                Ok(Value::list(out))
            }
            Expr::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.eval_display_item(item, &mut out)?;
                }
                Ok(Value::tuple(out))
            }
            Expr::Set(items) => {
                let mut out = Set::new();
                for item in items {
                    let value = self.eval_expr(item)?;
                    out.insert(value).map_err(Unwind::Raise)?;
                }
                Ok(Value::set(out))
            }
            Expr::Dict(items) => {
                let mut out = Dict::new();
                for item in items {
                    match item {
                        DictItem::Pair(k, v) => {
                            // Key evaluates before value, left to right.
                            let key = self.eval_expr(k)?;
                            let value = self.eval_expr(v)?;
                            out.insert(key, value).map_err(Unwind::Raise)?;
                        }
                        DictItem::DoubleStar(e) => {
                            let other = self.eval_expr(e)?;
                            let Value::Dict(other) = &other else {
                                return Err(PyExc::type_error(format!(
                                    "argument after ** must be a mapping, not {}",
                                    other.type_name()
                                ))
                                .into());
                            };
                            let pairs: Vec<(Value, Value)> = other
                                .borrow()
                                .iter()
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect();
                            for (k, v) in pairs {
                                out.insert(k, v).map_err(Unwind::Raise)?;
                            }
                        }
                    }
                }
                Ok(Value::dict(out))
            }
            Expr::ListComp { elt, clauses } => {
                let items = self.run_comprehension(clauses, |interp, out: &mut Vec<Value>| {
                    let value = interp.eval_expr(elt)?;
                    out.push(value);
                    Ok(())
                })?;
                Ok(Value::list(items))
            }
            Expr::SetComp { elt, clauses } => {
                let items = self.run_comprehension(clauses, |interp, out: &mut Vec<Value>| {
                    let value = interp.eval_expr(elt)?;
                    out.push(value);
                    Ok(())
                })?;
                let mut set = Set::new();
                for item in items {
                    set.insert(item).map_err(Unwind::Raise)?;
                }
                Ok(Value::set(set))
            }
            Expr::DictComp { key, value, clauses } => {
                let pairs = self.run_comprehension(clauses, |interp, out: &mut Vec<(Value, Value)>| {
                    let k = interp.eval_expr(key)?;
                    let v = interp.eval_expr(value)?;
                    out.push((k, v));
                    Ok(())
                })?;
                let mut dict = Dict::new();
                for (k, v) in pairs {
                    dict.insert(k, v).map_err(Unwind::Raise)?;
                }
                Ok(Value::dict(dict))
            }
            Expr::GenExp { elt, clauses } => {
                // The element expressions run in their own scope; the values
                // materialise into a generator object consumed lazily.
                let items = self.run_comprehension(clauses, |interp, out: &mut Vec<Value>| {
                    let value = interp.eval_expr(elt)?;
                    out.push(value);
                    Ok(())
                })?;
                Ok(Value::Generator(Rc::new(std::cell::RefCell::new(
                    GeneratorObj::materialized("<genexpr>".to_string(), items),
                ))))
            }
            Expr::Ternary { cond, then, or_else } => {
                if self.eval_expr(cond)?.truthy() {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(or_else)
                }
            }
            Expr::BoolOp { is_or, left, right } => {
                // Short-circuit, returning the last evaluated operand.
                let left = self.eval_expr(left)?;
                if *is_or == left.truthy() {
                    return Ok(left);
                }
                self.eval_expr(right)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval_expr(first)?;
                for (op, right_expr) in rest {
                    let right = self.eval_expr(right_expr)?;
                    let ok = self.compare_dispatch(*op, &left, &right)?;
                    if !ok.truthy() {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::BinOp { op, left, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.binary_dispatch(*op, &left, &right)
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval_expr(operand)?;
                if let (UnaryOp::Not, Value::Instance(_)) = (*op, &operand) {
                    if let Some(result) = self.try_dunder(&operand, "__bool__", vec![])? {
                        return Ok(Value::Bool(!result.truthy()));
                    }
                }
                ops::unary(*op, &operand).map_err(Unwind::Raise)
            }
            Expr::Call { func, args } => {
                let callee = self.eval_expr(func)?;
                let call_args = self.eval_call_args(args)?;
                self.call_value(&callee, call_args, expr.line)
            }
            Expr::GetAttr { obj, attr } => {
                let obj = self.eval_expr(obj)?;
                self.get_attr(&obj, attr)
            }
            Expr::Subscript { obj, index } => {
                let obj = self.eval_expr(obj)?;
                if let Expr::Slice { start, stop, step } = &index.node {
                    let start = self.eval_slice_bound(start.as_deref())?;
                    let stop = self.eval_slice_bound(stop.as_deref())?;
                    let step = self.eval_slice_bound(step.as_deref())?;
                    return ops::slice_get(&obj, start, stop, step).map_err(Unwind::Raise);
                }
                let index = self.eval_expr(index)?;
                self.subscript_value(&obj, &index)
            }
            Expr::Slice { .. } => Err(PyExc::internal("slice outside subscript").into()),
            Expr::Lambda { params, body } => {
                let func = FuncObj {
                    name: "<lambda>".to_string(),
                    qualname: "<lambda>".to_string(),
                    params: params.clone(),
                    body: FuncBody::Expr(body.clone()),
                    captured: self.env.snapshot_locals(),
                    is_generator: false,
                    line: expr.line,
                };
                Ok(Value::Func(Rc::new(func)))
            }
            Expr::Yield(inner) => {
                let value = match inner {
                    Some(e) => self.eval_expr(e)?,
                    None => Value::None,
                };
                self.emit_yield(value)
            }
            Expr::YieldFrom(inner) => {
                let source = self.eval_expr(inner)?;
                self.emit_yield_from(source)
            }
            Expr::Walrus { name, value } => {
                let value = self.eval_expr(value)?;
                self.env.bind_escaping(name, value.clone());
                Ok(value)
            }
            Expr::Starred(_) => Err(PyExc::new(
                ExcType::SyntaxError,
                "starred expression is only valid in call arguments and displays",
            )
            .into()),
        }
    }

    fn eval_display_item(&mut self, item: &ExprLoc, out: &mut Vec<Value>) -> Ev<()> {
        if let Expr::Starred(inner) = &item.node {
            let iterable = self.eval_expr(inner)?;
            out.extend(self.iterate_value(&iterable)?);
            return Ok(());
        }
        let value = self.eval_expr(item)?;
        out.push(value);
        Ok(())
    }

    fn eval_slice_bound(&mut self, bound: Option<&ExprLoc>) -> Ev<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(e) => {
                let value = self.eval_expr(e)?;
                if matches!(value, Value::None) {
                    return Ok(None);
                }
                Ok(Some(value.as_index("slice index").map_err(Unwind::Raise)?))
            }
        }
    }

    /// Name resolution: environment, then the builtin registry, then the
    /// float literals `inf`/`nan` reserved for bare-identifier use.
    pub(crate) fn lookup_name(&mut self, name: &str) -> Ev<Value> {
        if let Some(value) = self.env.lookup(name) {
            return Ok(value);
        }
        if let Some(value) = crate::builtins::lookup_name(name) {
            return Ok(value);
        }
        match name {
            "inf" => Ok(Value::Float(f64::INFINITY)),
            "nan" => Ok(Value::Float(f64::NAN)),
            _ => Err(PyExc::name_error(name).into()),
        }
    }

    /// Materialises any iterable, driving generators.
    pub(crate) fn iterate_value(&mut self, value: &Value) -> Ev<Vec<Value>> {
        match value {
            Value::Generator(r#gen) => self.drain_generator(r#gen),
            other => ops::iter_values(other).map_err(Unwind::Raise),
        }
    }

    // --- operator dispatch with instance dunders ----------------------------

    pub(crate) fn binary_dispatch(&mut self, op: BinOp, left: &Value, right: &Value) -> Ev<Value> {
        if matches!(left, Value::Instance(_)) {
            let dunder = match op {
                BinOp::Add => "__add__",
                BinOp::Sub => "__sub__",
                BinOp::Mul => "__mul__",
                BinOp::Div => "__truediv__",
                BinOp::FloorDiv => "__floordiv__",
                BinOp::Mod => "__mod__",
                BinOp::Pow => "__pow__",
                BinOp::MatMul => "__matmul__",
                BinOp::BitAnd => "__and__",
                BinOp::BitOr => "__or__",
                BinOp::BitXor => "__xor__",
                BinOp::Shl => "__lshift__",
                BinOp::Shr => "__rshift__",
            };
            if let Some(result) = self.try_dunder(left, dunder, vec![right.clone()])? {
                return Ok(result);
            }
        }
        ops::binary(op, left, right).map_err(Unwind::Raise)
    }

    pub(crate) fn compare_dispatch(&mut self, op: CmpOp, left: &Value, right: &Value) -> Ev<Value> {
        let dunder = match op {
            CmpOp::Eq => Some("__eq__"),
            CmpOp::Ne => Some("__ne__"),
            CmpOp::Lt => Some("__lt__"),
            CmpOp::Le => Some("__le__"),
            CmpOp::Gt => Some("__gt__"),
            CmpOp::Ge => Some("__ge__"),
            _ => None,
        };
        if let Some(dunder) = dunder {
            if matches!(left, Value::Instance(_)) {
                if let Some(result) = self.try_dunder(left, dunder, vec![right.clone()])? {
                    return Ok(result);
                }
                // Instance equality without __eq__ falls back to identity.
                if op == CmpOp::Eq {
                    return Ok(Value::Bool(left.py_eq(right)));
                }
                if op == CmpOp::Ne {
                    return Ok(Value::Bool(!left.py_eq(right)));
                }
            }
        }
        if matches!(op, CmpOp::In | CmpOp::NotIn) {
            if let Value::Instance(_) = right {
                if let Some(result) = self.try_dunder(right, "__contains__", vec![left.clone()])? {
                    let found = result.truthy();
                    return Ok(Value::Bool(if op == CmpOp::In { found } else { !found }));
                }
            }
            if let Value::Generator(r#gen) = right {
                let items = self.drain_generator(r#gen)?;
                let found = items.iter().any(|v| v.py_eq(left));
                return Ok(Value::Bool(if op == CmpOp::In { found } else { !found }));
            }
        }
        ops::compare(op, left, right).map_err(Unwind::Raise)
    }

    pub(crate) fn subscript_value(&mut self, obj: &Value, index: &Value) -> Ev<Value> {
        if let Value::Instance(_) = obj {
            if let Some(result) = self.try_dunder(obj, "__getitem__", vec![index.clone()])? {
                return Ok(result);
            }
        }
        ops::subscript_get(obj, index).map_err(Unwind::Raise)
    }

    // --- attributes ---------------------------------------------------------

    pub(crate) fn get_attr(&mut self, obj: &Value, attr: &str) -> Ev<Value> {
        match obj {
            Value::Instance(inst) => {
                if let Some(value) = inst.attrs.borrow().get(attr) {
                    return Ok(value.clone());
                }
                match inst.class.lookup(attr) {
                    Some(Value::Func(f)) => Ok(Value::Method(Rc::new(
                        crate::types::function::BoundMethod {
                            recv: obj.clone(),
                            kind: crate::types::function::MethodKind::User(f),
                        },
                    ))),
                    Some(value) => Ok(value),
                    None => Err(PyExc::attribute_error(obj.type_name(), attr).into()),
                }
            }
            Value::Class(cls) => cls
                .lookup(attr)
                .ok_or_else(|| PyExc::type_error(format!("type object '{}' has no attribute '{attr}'", cls.name)).into()),
            Value::Module(module) => {
                if let Some(value) = module.attrs.borrow().get(attr) {
                    return Ok(value.clone());
                }
                Err(PyExc::new(
                    ExcType::AttributeError,
                    format!("module '{}' has no attribute '{attr}'", module.name),
                )
                .into())
            }
            Value::ExcInstance(inst) => match attr {
                "args" => Ok(Value::tuple(inst.args.clone())),
                _ => Err(PyExc::attribute_error(obj.type_name(), attr).into()),
            },
            other => {
                if crate::methods::has_method(other, attr) {
                    return Ok(Value::Method(Rc::new(crate::types::function::BoundMethod {
                        recv: other.clone(),
                        kind: crate::types::function::MethodKind::Primitive(Rc::from(attr)),
                    })));
                }
                Err(PyExc::attribute_error(other.type_name(), attr).into())
            }
        }
    }

    pub(crate) fn set_attr(&mut self, obj: &Value, attr: &str, value: Value) -> Result<(), PyExc> {
        match obj {
            Value::Instance(inst) => {
                inst.attrs.borrow_mut().insert(attr.to_string(), value);
                Ok(())
            }
            Value::Class(cls) => {
                cls.attrs.borrow_mut().insert(attr.to_string(), value);
                Ok(())
            }
            Value::Module(module) => {
                module.attrs.borrow_mut().insert(attr.to_string(), value);
                Ok(())
            }
            other => Err(PyExc::attribute_error(other.type_name(), attr)),
        }
    }

    // --- call argument evaluation -------------------------------------------

    pub(crate) fn eval_call_args(&mut self, args: &[CallArg]) -> Ev<Args> {
        let mut out = Args::default();
        for arg in args {
            match arg {
                CallArg::Pos(e) => {
                    let value = self.eval_expr(e)?;
                    out.pos.push(value);
                }
                CallArg::Star(e) => {
                    let iterable = self.eval_expr(e)?;
                    out.pos.extend(self.iterate_value(&iterable)?);
                }
                CallArg::Kw(name, e) => {
                    let value = self.eval_expr(e)?;
                    out.kw.push((name.clone(), value));
                }
                CallArg::DoubleStar(e) => {
                    let mapping = self.eval_expr(e)?;
                    let Value::Dict(d) = &mapping else {
                        return Err(PyExc::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            mapping.type_name()
                        ))
                        .into());
                    };
                    for (k, v) in d.borrow().iter() {
                        let Value::Str(key) = k else {
                            return Err(PyExc::type_error("keywords must be strings").into());
                        };
                        out.kw.push((key.to_string(), v.clone()));
                    }
                }
            }
        }
        Ok(out)
    }

    // --- comprehensions -----------------------------------------------------

    /// Runs comprehension clauses in a fresh transparent scope, invoking
    /// `emit` once per innermost iteration.
    fn run_comprehension<T: Default>(
        &mut self,
        clauses: &[CompClause],
        mut emit: impl FnMut(&mut Self, &mut T) -> Ev<()>,
    ) -> Ev<T> {
        self.env.push_scope();
        let mut collected = T::default();
        let result = self.comp_level(clauses, 0, &mut collected, &mut emit);
        self.env.pop_scope();
        result?;
        Ok(collected)
    }

    fn comp_level<T: Default>(
        &mut self,
        clauses: &[CompClause],
        depth: usize,
        out: &mut T,
        emit: &mut impl FnMut(&mut Self, &mut T) -> Ev<()>,
    ) -> Ev<()> {
        let Some(clause) = clauses.get(depth) else {
            return emit(self, out);
        };
        match clause {
            CompClause::For { target, iter } => {
                let iterable = self.eval_expr(iter)?;
                let mut iter_state = self.make_for_iter(&iterable)?;
                loop {
                    self.ctx.budget.check().map_err(Unwind::Raise)?;
                    let Some(item) = iter_state.next() else { break };
                    self.bind_target(target, item)?;
                    self.comp_level(clauses, depth + 1, out, emit)?;
                }
                Ok(())
            }
            CompClause::If(cond) => {
                if self.eval_expr(cond)?.truthy() {
                    self.comp_level(clauses, depth + 1, out, emit)?;
                }
                Ok(())
            }
        }
    }

    // --- f-strings ----------------------------------------------------------

    /// Each embedded expression is tokenized and parsed on demand, evaluated
    /// in the current scope, stringified (honoring `__str__`), and
    /// concatenated with the literal fragments.
    fn eval_fstring(&mut self, template: &str, raw: bool, line: u32) -> Ev<Value> {
        let parts = split_fstring(template, raw).map_err(Unwind::Raise)?;
        let mut out = String::new();
        for part in parts {
            match part {
                FPart::Literal(text) => out.push_str(&text),
                FPart::Field { expr, conversion, spec } => {
                    if expr.is_empty() {
                        return Err(PyExc::new(
                            ExcType::SyntaxError,
                            "f-string: empty expression not allowed",
                        )
                        .into());
                    }
                    let parsed = parse_expression(&expr, line).map_err(|e| {
                        Unwind::Raise(PyExc::new(ExcType::SyntaxError, e.message).with_line(line))
                    })?;
                    let value = self.eval_expr(&parsed)?;
                    let text = match conversion {
                        Some('r') => value.py_repr(),
                        Some('s') => self.value_str(&value)?,
                        _ => match &spec {
                            Some(spec) => format_value(&value, spec).map_err(Unwind::Raise)?,
                            None => self.value_str(&value)?,
                        },
                    };
                    out.push_str(&text);
                }
            }
        }
        Ok(Value::str(out))
    }

    /// `str()` honoring a user `__str__`.
    pub(crate) fn value_str(&mut self, value: &Value) -> Ev<String> {
        if let Value::Instance(_) = value {
            if let Some(result) = self.try_dunder(value, "__str__", vec![])? {
                return Ok(result.py_str());
            }
            if let Some(result) = self.try_dunder(value, "__repr__", vec![])? {
                return Ok(result.py_str());
            }
        }
        Ok(value.py_str())
    }

    /// `repr()` honoring a user `__repr__`.
    pub(crate) fn value_repr(&mut self, value: &Value) -> Ev<String> {
        if let Value::Instance(_) = value {
            if let Some(result) = self.try_dunder(value, "__repr__", vec![])? {
                return Ok(result.py_str());
            }
        }
        Ok(value.py_repr())
    }

    // --- yields -------------------------------------------------------------

    /// A `yield` expression: accumulate in eager mode, suspend in deferred
    /// mode with an empty frame list for the enclosing constructs to fill.
    fn emit_yield(&mut self, value: Value) -> Ev<Value> {
        if let Some(accum) = self.ctx.gen_accum.last_mut() {
            accum.push(value);
            return Ok(Value::None);
        }
        Err(Unwind::Yield(value, Vec::new()))
    }

    fn emit_yield_from(&mut self, source: Value) -> Ev<Value> {
        if self.ctx.gen_accum.last().is_some() {
            // Eager: append each sub-value to the accumulator.
            let items = self.iterate_value(&source)?;
            if let Some(accum) = self.ctx.gen_accum.last_mut() {
                accum.extend(items);
            }
            return Ok(Value::None);
        }
        // Deferred: forward suspensions of the inner iterator and install a
        // yield-from continuation frame holding the unconsumed items.
        match &source {
            Value::Generator(inner) => {
                let inner = inner.clone();
                match self.gen_next(&inner)? {
                    Some(value) => Err(Unwind::Yield(
                        value,
                        vec![Frame::YieldFrom {
                            source: YieldSource::Gen(inner),
                        }],
                    )),
                    None => Ok(Value::None),
                }
            }
            other => {
                let mut items: std::collections::VecDeque<Value> =
                    ops::iter_values(other).map_err(Unwind::Raise)?.into();
                match items.pop_front() {
                    Some(first) => Err(Unwind::Yield(
                        first,
                        vec![Frame::YieldFrom {
                            source: YieldSource::Items(items),
                        }],
                    )),
                    None => Ok(Value::None),
                }
            }
        }
    }

    /// Calls a dunder resolved on an instance's class, if present.
    pub(crate) fn try_dunder(&mut self, obj: &Value, name: &str, args: Vec<Value>) -> Ev<Option<Value>> {
        let Value::Instance(inst) = obj else {
            return Ok(None);
        };
        let Some(Value::Func(f)) = inst.class.lookup(name) else {
            return Ok(None);
        };
        let mut all_args = vec![obj.clone()];
        all_args.extend(args);
        let result = self.call_function(&f, Args::positional(all_args))?;
        Ok(Some(result))
    }

    /// Calls a dunder that must exist (`__enter__`, `__exit__`).
    pub(crate) fn call_dunder(&mut self, obj: &Value, name: &str, args: Vec<Value>) -> Ev<Value> {
        match self.try_dunder(obj, name, args)? {
            Some(result) => Ok(result),
            None => Err(PyExc::attribute_error(obj.type_name(), name).into()),
        }
    }

    /// Effect-marker aware call used when a route decorator is applied.
    pub(crate) fn apply_route_decorator(
        &mut self,
        method: &Rc<str>,
        path: &Rc<str>,
        args: Args,
    ) -> Ev<Value> {
        let handler = args.get_one("route decorator").map_err(Unwind::Raise)?;
        Ok(Value::Marker(Marker::RouteReg(Rc::new(crate::value::RouteReg {
            method: method.to_string(),
            path: path.to_string(),
            handler,
        }))))
    }
}

