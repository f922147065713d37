//! Evaluated call arguments and arity-checking helpers.
//!
//! Builtins and primitive methods share these helpers so TypeError messages
//! stay uniform across call sites.

use crate::{exc::PyExc, value::Value};

/// Positional and keyword arguments, already evaluated left-to-right.
#[derive(Debug, Default)]
pub(crate) struct Args {
    pub pos: Vec<Value>,
    pub kw: Vec<(String, Value)>,
}

impl Args {
    pub(crate) fn positional(pos: Vec<Value>) -> Self {
        Self { pos, kw: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.pos.len()
    }

    /// Checks that no arguments were passed.
    pub(crate) fn check_zero(self, name: &str) -> Result<(), PyExc> {
        if self.pos.is_empty() && self.kw.is_empty() {
            Ok(())
        } else {
            Err(PyExc::type_error(format!(
                "{name}() takes no arguments ({} given)",
                self.pos.len() + self.kw.len()
            )))
        }
    }

    /// Checks that exactly one positional argument was passed, returning it.
    pub(crate) fn get_one(mut self, name: &str) -> Result<Value, PyExc> {
        if self.pos.len() == 1 && self.kw.is_empty() {
            Ok(self.pos.pop().unwrap_or(Value::None))
        } else {
            Err(PyExc::arg_count(name, 1, self.pos.len() + self.kw.len()))
        }
    }

    /// Checks that exactly two positional arguments were passed.
    pub(crate) fn get_two(mut self, name: &str) -> Result<(Value, Value), PyExc> {
        if self.pos.len() == 2 && self.kw.is_empty() {
            let b = self.pos.pop().unwrap_or(Value::None);
            let a = self.pos.pop().unwrap_or(Value::None);
            Ok((a, b))
        } else {
            Err(PyExc::arg_count(name, 2, self.pos.len() + self.kw.len()))
        }
    }

    /// One required plus one optional positional argument.
    pub(crate) fn get_one_two(mut self, name: &str) -> Result<(Value, Option<Value>), PyExc> {
        match (self.pos.len(), self.kw.is_empty()) {
            (1, true) => Ok((self.pos.pop().unwrap_or(Value::None), None)),
            (2, true) => {
                let b = self.pos.pop().unwrap_or(Value::None);
                let a = self.pos.pop().unwrap_or(Value::None);
                Ok((a, Some(b)))
            }
            _ => Err(PyExc::type_error(format!(
                "{name}() expected 1 or 2 arguments, got {}",
                self.pos.len() + self.kw.len()
            ))),
        }
    }

    /// Up to `max` positional arguments, padded with `None`.
    pub(crate) fn get_up_to(self, name: &str, max: usize) -> Result<Vec<Option<Value>>, PyExc> {
        if self.pos.len() > max || !self.kw.is_empty() {
            return Err(PyExc::type_error(format!(
                "{name}() expected at most {max} arguments, got {}",
                self.pos.len() + self.kw.len()
            )));
        }
        let mut out: Vec<Option<Value>> = self.pos.into_iter().map(Some).collect();
        out.resize(max, None);
        Ok(out)
    }

    /// Removes a keyword argument by name.
    pub(crate) fn take_kw(&mut self, name: &str) -> Option<Value> {
        let idx = self.kw.iter().position(|(k, _)| k == name)?;
        Some(self.kw.remove(idx).1)
    }

    /// Errors if any keyword arguments remain unconsumed.
    pub(crate) fn reject_kw(&self, name: &str) -> Result<(), PyExc> {
        if let Some((key, _)) = self.kw.first() {
            return Err(PyExc::type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
        Ok(())
    }
}
