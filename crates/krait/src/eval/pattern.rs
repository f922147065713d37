//! `match`/`case` pattern matching.

use crate::{
    ast::{ExprLoc, MatchCase, Pattern},
    exc::PyExc,
    ops,
    types::dict::Dict,
    value::Value,
};

use super::{Ev, Interp, Unwind};

impl Interp {
    pub(crate) fn exec_match(&mut self, subject: &ExprLoc, cases: &[MatchCase]) -> Ev<()> {
        let subject = self.eval_expr(subject)?;
        for case in cases {
            let mut bindings = Vec::new();
            if !self.match_pattern(&case.pattern, &subject, &mut bindings)? {
                continue;
            }
            // Bindings apply before the guard runs, as in Python.
            for (name, value) in bindings {
                self.env.bind(&name, value);
            }
            if let Some(guard) = &case.guard {
                if !self.eval_expr(guard)?.truthy() {
                    continue;
                }
            }
            return self.exec_block(&case.body);
        }
        Ok(())
    }

    fn match_pattern(
        &mut self,
        pattern: &Pattern,
        subject: &Value,
        bindings: &mut Vec<(String, Value)>,
    ) -> Ev<bool> {
        match pattern {
            Pattern::Literal(expr) => {
                let expected = self.eval_expr(expr)?;
                Ok(expected.py_eq(subject))
            }
            Pattern::Wildcard => Ok(true),
            Pattern::Capture(name) => {
                bindings.push((name.clone(), subject.clone()));
                Ok(true)
            }
            Pattern::Star(_) => Err(PyExc::internal("star pattern outside a sequence").into()),
            Pattern::Sequence(items) => self.match_sequence(items, subject, bindings),
            Pattern::Mapping { items, rest } => {
                let Value::Dict(d) = subject else {
                    return Ok(false);
                };
                let mut matched_keys = Vec::new();
                for (key_expr, value_pattern) in items {
                    let key = self.eval_expr(key_expr)?;
                    let Some(value) = d.borrow().get(&key).map_err(Unwind::Raise)? else {
                        return Ok(false);
                    };
                    if !self.match_pattern(value_pattern, &value, bindings)? {
                        return Ok(false);
                    }
                    matched_keys.push(key);
                }
                if let Some(rest_name) = rest {
                    let mut remaining = Dict::new();
                    for (k, v) in d.borrow().iter() {
                        if !matched_keys.iter().any(|mk| mk.py_eq(k)) {
                            remaining.insert(k.clone(), v.clone()).map_err(Unwind::Raise)?;
                        }
                    }
                    bindings.push((rest_name.clone(), Value::dict(remaining)));
                }
                Ok(true)
            }
            Pattern::Class {
                class,
                positional,
                keyword,
            } => {
                let class_value = self.eval_expr(class)?;
                if !self.isinstance_check(subject, &class_value).map_err(Unwind::Raise)? {
                    return Ok(false);
                }
                if !positional.is_empty() {
                    // Positional sub-patterns need __match_args__ on the class.
                    let Value::Class(cls) = &class_value else {
                        return Err(PyExc::type_error(format!(
                            "{}() accepts 0 positional sub-patterns",
                            class_value.py_repr()
                        ))
                        .into());
                    };
                    let Some(match_args) = cls.lookup("__match_args__") else {
                        return Err(PyExc::type_error(format!(
                            "{}() accepts 0 positional sub-patterns (no __match_args__)",
                            cls.name
                        ))
                        .into());
                    };
                    let names = ops::iter_values(&match_args).map_err(Unwind::Raise)?;
                    if positional.len() > names.len() {
                        return Err(PyExc::type_error(format!(
                            "{}() accepts {} positional sub-patterns ({} given)",
                            cls.name,
                            names.len(),
                            positional.len()
                        ))
                        .into());
                    }
                    for (sub_pattern, attr_name) in positional.iter().zip(names) {
                        let Value::Str(attr) = &attr_name else {
                            return Err(PyExc::type_error("__match_args__ elements must be strings").into());
                        };
                        let Ok(attr_value) = self.get_attr(subject, attr) else {
                            return Ok(false);
                        };
                        if !self.match_pattern(sub_pattern, &attr_value, bindings)? {
                            return Ok(false);
                        }
                    }
                }
                for (attr, sub_pattern) in keyword {
                    let Ok(attr_value) = self.get_attr(subject, attr) else {
                        return Ok(false);
                    };
                    if !self.match_pattern(sub_pattern, &attr_value, bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Pattern::Or(alternatives) => {
                for alternative in alternatives {
                    if self.match_pattern(alternative, subject, bindings)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn match_sequence(
        &mut self,
        patterns: &[Pattern],
        subject: &Value,
        bindings: &mut Vec<(String, Value)>,
    ) -> Ev<bool> {
        // Strings are not sequence-pattern subjects, matching Python.
        let items: Vec<Value> = match subject {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.as_ref().clone(),
            _ => return Ok(false),
        };
        let star_pos = patterns.iter().position(|p| matches!(p, Pattern::Star(_)));
        match star_pos {
            None => {
                if items.len() != patterns.len() {
                    return Ok(false);
                }
                for (pattern, item) in patterns.iter().zip(&items) {
                    if !self.match_pattern(pattern, item, bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Some(star) => {
                let suffix_len = patterns.len() - star - 1;
                if items.len() < star + suffix_len {
                    return Ok(false);
                }
                for (pattern, item) in patterns[..star].iter().zip(&items[..star]) {
                    if !self.match_pattern(pattern, item, bindings)? {
                        return Ok(false);
                    }
                }
                let tail_start = items.len() - suffix_len;
                if let Pattern::Star(Some(name)) = &patterns[star] {
                    bindings.push((name.clone(), Value::list(items[star..tail_start].to_vec())));
                }
                for (pattern, item) in patterns[star + 1..].iter().zip(&items[tail_start..]) {
                    if !self.match_pattern(pattern, item, bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// `isinstance` over class values: user classes, built-in exception
    /// classes, and the builtin type constructors.
    pub(crate) fn isinstance_check(&mut self, value: &Value, class: &Value) -> Result<bool, PyExc> {
        match class {
            Value::Tuple(options) => {
                for option in options.iter() {
                    if self.isinstance_check(value, option)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Class(cls) => match value {
                Value::Instance(inst) => Ok(derives_from(&inst.class, cls)),
                _ => Ok(false),
            },
            Value::ExcClass(t) => match value {
                Value::ExcInstance(inst) => Ok(inst.exc_type.is_subclass_of(*t)),
                Value::Instance(inst) => Ok(inst.class.isa(<&'static str>::from(*t))),
                _ => Ok(false),
            },
            Value::Builtin(b) => {
                let name = b.name();
                Ok(match name {
                    "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
                    "float" => matches!(value, Value::Float(_)),
                    "str" => matches!(value, Value::Str(_)),
                    "bool" => matches!(value, Value::Bool(_)),
                    "list" => matches!(value, Value::List(_)),
                    "dict" => matches!(value, Value::Dict(_)),
                    "set" => matches!(value, Value::Set(_)),
                    "tuple" => matches!(value, Value::Tuple(_)),
                    "range" => matches!(value, Value::Range(_)),
                    "object" => true,
                    _ => {
                        return Err(PyExc::type_error(
                            "isinstance() arg 2 must be a type or tuple of types",
                        ));
                    }
                })
            }
            _ => Err(PyExc::type_error(
                "isinstance() arg 2 must be a type or tuple of types",
            )),
        }
    }
}

/// Whether `class` is, or transitively derives from, `target` (by identity).
fn derives_from(
    class: &std::rc::Rc<crate::types::class::ClassObj>,
    target: &std::rc::Rc<crate::types::class::ClassObj>,
) -> bool {
    if std::rc::Rc::ptr_eq(class, target) {
        return true;
    }
    class.bases.iter().any(|base| derives_from(base, target))
}
