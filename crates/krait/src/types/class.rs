//! User classes, instances, and module objects.
//!
//! Method resolution is depth-first left-to-right over the base list; the
//! user's inheritance tree lives entirely in these values, never in the host
//! language's type system.

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{exc::ExcType, value::Value};

/// A user-defined class: name, bases, and the attribute map produced by
/// executing the class body in its own scope.
#[derive(Debug)]
pub(crate) struct ClassObj {
    pub name: String,
    /// User-defined base classes, in declaration order.
    pub bases: Vec<Rc<ClassObj>>,
    /// Built-in exception bases (`class AppError(ValueError)`), linking the
    /// class into the exception hierarchy.
    pub exc_bases: Vec<ExcType>,
    pub attrs: RefCell<IndexMap<String, Value>>,
}

impl ClassObj {
    pub(crate) fn name_ref(&self) -> &str {
        &self.name
    }

    /// Looks up an attribute on this class or, depth-first left-to-right, on
    /// its transitive bases.
    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.attrs.borrow().get(name) {
            return Some(v.clone());
        }
        for base in &self.bases {
            if let Some(v) = base.lookup(name) {
                return Some(v);
            }
        }
        None
    }

    /// All transitive base-class names, depth-first, including built-in
    /// exception names. Used for except-clause matching and `isinstance`.
    pub(crate) fn ancestry(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_ancestry(&mut names);
        names
    }

    fn collect_ancestry(&self, names: &mut Vec<String>) {
        for base in &self.bases {
            names.push(base.name.clone());
            base.collect_ancestry(names);
        }
        for exc in &self.exc_bases {
            names.push(exc.to_string());
        }
    }

    /// Whether instances of this class can be raised.
    pub(crate) fn is_exception(&self) -> bool {
        if !self.exc_bases.is_empty() {
            return true;
        }
        self.bases.iter().any(|b| b.is_exception())
    }

    /// The nearest built-in exception type this class derives from.
    pub(crate) fn builtin_exc_base(&self) -> Option<ExcType> {
        if let Some(t) = self.exc_bases.first() {
            return Some(*t);
        }
        self.bases.iter().find_map(|b| b.builtin_exc_base())
    }

    /// Whether this class is, or transitively derives from, `name`.
    pub(crate) fn isa(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        self.bases.iter().any(|b| b.isa(name))
            || self
                .exc_bases
                .iter()
                .any(|t| ExcType::from_name(name).is_some_and(|h| t.is_subclass_of(h)))
    }
}

/// An instance: its class plus per-instance fields.
#[derive(Debug)]
pub(crate) struct InstanceObj {
    pub class: Rc<ClassObj>,
    pub attrs: RefCell<IndexMap<String, Value>>,
}

impl InstanceObj {
    pub(crate) fn new(class: Rc<ClassObj>) -> Self {
        Self {
            class,
            attrs: RefCell::new(IndexMap::new()),
        }
    }
}

/// A resolved module: imported source files, built-in modules, and custom
/// host modules all normalize to this shape.
#[derive(Debug)]
pub(crate) struct ModuleObj {
    pub name: String,
    pub attrs: RefCell<IndexMap<String, Value>>,
}

impl ModuleObj {
    pub(crate) fn new(name: impl Into<String>, attrs: IndexMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            attrs: RefCell::new(attrs),
        }
    }
}
