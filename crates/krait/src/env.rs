//! Lexical scope stack.
//!
//! A function call pushes one *barrier* scope holding parameter bindings plus
//! a snapshot of the defining scope (closure capture by snapshot). Name
//! lookup walks inner scopes up to and including the nearest barrier, then
//! jumps straight to the module scope: caller locals are never visible to a
//! callee. Class bodies and comprehensions push non-barrier scopes that stay
//! transparent to the enclosing visibility region.

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    exc::{ExcType, PyExc},
    value::Value,
};

#[derive(Debug, Default)]
pub(crate) struct Scope {
    pub vars: IndexMap<String, Value>,
    /// Names declared `global` in this scope.
    globals: AHashSet<String>,
    /// Names declared `nonlocal` in this scope.
    nonlocals: AHashSet<String>,
    /// True for function-call scopes; lookup stops here and falls through to
    /// the module scope only.
    barrier: bool,
}

#[derive(Debug)]
pub(crate) struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    /// Creates an environment holding only the module scope.
    pub(crate) fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Pushes a function-call scope seeded with the given bindings.
    pub(crate) fn push_call_scope(&mut self, vars: IndexMap<String, Value>) {
        self.scopes.push(Scope {
            vars,
            globals: AHashSet::new(),
            nonlocals: AHashSet::new(),
            barrier: true,
        });
    }

    /// Pushes a transparent scope (class body, comprehension).
    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pops the innermost scope, returning its bindings.
    pub(crate) fn pop_scope(&mut self) -> IndexMap<String, Value> {
        debug_assert!(self.scopes.len() > 1, "module scope must not be popped");
        self.scopes.pop().map(|s| s.vars).unwrap_or_default()
    }

    pub(crate) fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Truncates back to a recorded depth; used to unwind abandoned scopes
    /// after an error escapes mid-construct.
    pub(crate) fn truncate(&mut self, depth: usize) {
        while self.scopes.len() > depth.max(1) {
            self.scopes.pop();
        }
    }

    /// Indices of the scopes visible from the innermost scope, inner first:
    /// inner transparent scopes, the nearest barrier, then the module scope.
    fn visible_indices(&self) -> std::vec::IntoIter<usize> {
        let top = self.scopes.len() - 1;
        let mut indices = Vec::with_capacity(4);
        let mut i = top;
        loop {
            indices.push(i);
            if self.scopes[i].barrier || i == 0 {
                break;
            }
            i -= 1;
        }
        if *indices.last().unwrap_or(&0) != 0 {
            indices.push(0);
        }
        indices.into_iter()
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        for i in self.visible_indices() {
            if let Some(v) = self.scopes[i].vars.get(name) {
                return Some(v.clone());
            }
        }
        None
    }

    /// Binds a name, honoring `global`/`nonlocal` declarations made in the
    /// innermost scope.
    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        let top = self.scopes.len() - 1;
        if self.scopes[top].globals.contains(name) {
            self.scopes[0].vars.insert(name.to_string(), value);
            return;
        }
        self.scopes[top].vars.insert(name.to_string(), value);
    }

    /// Rebinds at the defining scope within the visible chain, falling back
    /// to the innermost scope. Used for walrus bindings inside transparent
    /// scopes so `[y := x]` leaks into the enclosing function, as in Python.
    pub(crate) fn rebind(&mut self, name: &str, value: Value) {
        let top = self.scopes.len() - 1;
        if self.scopes[top].globals.contains(name) {
            self.scopes[0].vars.insert(name.to_string(), value);
            return;
        }
        for i in self.visible_indices() {
            if self.scopes[i].vars.contains_key(name) {
                self.scopes[i].vars.insert(name.to_string(), value);
                return;
            }
        }
        self.bind(name, value);
    }

    /// Walrus binding: writes to the defining scope when the name exists,
    /// otherwise to the nearest function (or module) scope, so bindings made
    /// inside comprehension scopes leak to the enclosing function as in
    /// Python.
    pub(crate) fn bind_escaping(&mut self, name: &str, value: Value) {
        for i in self.visible_indices() {
            if self.scopes[i].vars.contains_key(name) {
                self.scopes[i].vars.insert(name.to_string(), value);
                return;
            }
        }
        let target = self
            .visible_indices()
            .find(|i| self.scopes[*i].barrier || *i == 0)
            .unwrap_or(0);
        self.scopes[target].vars.insert(name.to_string(), value);
    }

    /// Marks a name as `global` in the innermost scope. Any captured local
    /// copy is dropped so subsequent reads hit the module scope.
    pub(crate) fn declare_global(&mut self, name: &str) {
        let top = self.scopes.len() - 1;
        self.scopes[top].globals.insert(name.to_string());
        if top != 0 {
            self.scopes[top].vars.shift_remove(name);
        }
    }

    /// Marks a name as `nonlocal`. The binding must already exist in the
    /// enclosing visibility chain (typically via the closure snapshot);
    /// rebinding writes to that captured copy.
    pub(crate) fn declare_nonlocal(&mut self, name: &str) -> Result<(), PyExc> {
        let top = self.scopes.len() - 1;
        let found = self
            .visible_indices()
            .skip(1)
            .any(|i| i != 0 && self.scopes[i].vars.contains_key(name))
            || self.scopes[top].vars.contains_key(name);
        if !found {
            return Err(PyExc::new(
                ExcType::SyntaxError,
                format!("no binding for nonlocal '{name}' found"),
            ));
        }
        self.scopes[top].nonlocals.insert(name.to_string());
        Ok(())
    }

    /// Deletes a name from the visible chain.
    pub(crate) fn delete(&mut self, name: &str) -> Result<(), PyExc> {
        for i in self.visible_indices() {
            if self.scopes[i].vars.shift_remove(name).is_some() {
                return Ok(());
            }
        }
        Err(PyExc::name_error(name))
    }

    /// Snapshot of the local (non-module) bindings visible here, outer first
    /// so inner bindings win. This is the closure capture of `def`/`lambda`.
    pub(crate) fn snapshot_locals(&self) -> IndexMap<String, Value> {
        let mut indices: Vec<usize> = self.visible_indices().filter(|i| *i != 0).collect();
        indices.reverse();
        let mut snapshot = IndexMap::new();
        for i in indices {
            for (k, v) in &self.scopes[i].vars {
                snapshot.insert(k.clone(), v.clone());
            }
        }
        snapshot
    }

    /// Direct access to the module scope (used by `App` to look up handlers
    /// and by imports executing a module body).
    pub(crate) fn module_scope(&self) -> &IndexMap<String, Value> {
        &self.scopes[0].vars
    }

    pub(crate) fn module_scope_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.scopes[0].vars
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn value_of(env: &Environment, name: &str) -> String {
        env.lookup(name).unwrap().py_repr()
    }

    #[test]
    fn bind_and_lookup_innermost_wins() {
        let mut env = Environment::new();
        env.bind("x", Value::int(1));
        env.push_call_scope(IndexMap::new());
        env.bind("x", Value::int(2));
        assert_eq!(value_of(&env, "x"), "2");
        env.pop_scope();
        assert_eq!(value_of(&env, "x"), "1");
    }

    #[test]
    fn caller_locals_invisible_to_callee() {
        let mut env = Environment::new();
        env.bind("g", Value::int(0));
        env.push_call_scope(IndexMap::new());
        env.bind("caller_local", Value::int(1));
        env.push_call_scope(IndexMap::new());
        assert!(env.lookup("caller_local").is_none());
        assert!(env.lookup("g").is_some());
    }

    #[test]
    fn transparent_scope_sees_function_locals() {
        let mut env = Environment::new();
        env.push_call_scope(IndexMap::new());
        env.bind("x", Value::int(5));
        env.push_scope();
        assert_eq!(value_of(&env, "x"), "5");
    }

    #[test]
    fn global_declaration_redirects_binding() {
        let mut env = Environment::new();
        env.bind("x", Value::int(1));
        env.push_call_scope(IndexMap::new());
        env.declare_global("x");
        env.bind("x", Value::int(9));
        env.pop_scope();
        assert_eq!(value_of(&env, "x"), "9");
    }

    #[test]
    fn nonlocal_requires_existing_binding() {
        let mut env = Environment::new();
        env.push_call_scope(IndexMap::new());
        assert!(env.declare_nonlocal("missing").is_err());

        let mut captured = IndexMap::new();
        captured.insert("n".to_string(), Value::int(0));
        env.push_call_scope(captured);
        assert!(env.declare_nonlocal("n").is_ok());
    }

    #[test]
    fn walrus_rebind_leaks_from_transparent_scope() {
        let mut env = Environment::new();
        env.push_call_scope(IndexMap::new());
        env.bind("y", Value::int(1));
        env.push_scope();
        env.rebind("y", Value::int(2));
        env.pop_scope();
        assert_eq!(value_of(&env, "y"), "2");
    }

    #[test]
    fn delete_missing_name_errors() {
        let mut env = Environment::new();
        assert!(env.delete("nope").is_err());
        env.bind("x", Value::int(1));
        env.delete("x").unwrap();
        assert!(env.lookup("x").is_none());
    }

    #[test]
    fn snapshot_excludes_module_scope() {
        let mut env = Environment::new();
        env.bind("g", Value::int(0));
        env.push_call_scope(IndexMap::new());
        env.bind("a", Value::int(1));
        let snap = env.snapshot_locals();
        assert!(snap.contains_key("a"));
        assert!(!snap.contains_key("g"));
    }
}
