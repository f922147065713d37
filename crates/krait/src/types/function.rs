//! Callable value representations: user functions, bound methods, and
//! host-supplied callables.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{Block, ExprLoc, Params},
    object::Object,
    value::Value,
};

/// The body of a user callable: a statement block for `def`, a single
/// expression for `lambda`.
#[derive(Debug, Clone)]
pub(crate) enum FuncBody {
    Block(Block),
    Expr(Rc<ExprLoc>),
}

/// A user-defined function or lambda.
///
/// `captured` is a snapshot of the local scopes visible at the definition
/// point (module globals stay live and are not captured). Mutable shared
/// rebinding across sibling closures is out of scope; the snapshot model is
/// the documented behavior.
#[derive(Debug, Clone)]
pub(crate) struct FuncObj {
    pub name: String,
    pub qualname: String,
    pub params: Rc<Params>,
    pub body: FuncBody,
    pub captured: IndexMap<String, Value>,
    pub is_generator: bool,
    pub line: u32,
}

/// How a bound method resolves when called.
#[derive(Debug, Clone)]
pub(crate) enum MethodKind {
    /// A user function found on the receiver's class.
    User(Rc<FuncObj>),
    /// A primitive method resolved by name against the per-kind tables.
    Primitive(Rc<str>),
}

/// A bound method capturing its receiver.
#[derive(Debug, Clone)]
pub(crate) struct BoundMethod {
    pub recv: Value,
    pub kind: MethodKind,
}

impl BoundMethod {
    pub(crate) fn describe(&self) -> String {
        match &self.kind {
            MethodKind::User(f) => f.qualname.clone(),
            MethodKind::Primitive(name) => format!("{}.{name}", self.recv.type_name()),
        }
    }
}

/// A callable attribute of a caller-supplied custom module.
///
/// Arguments cross the boundary as public [`Object`] values; an `Err` string
/// from the host surfaces as a `RuntimeError` unless it already carries a
/// `"ClassName: …"` exception prefix.
pub struct HostFunc {
    pub(crate) name: String,
    #[allow(clippy::type_complexity)]
    pub(crate) func: Box<dyn Fn(Vec<Object>) -> Result<Object, String>>,
}

impl HostFunc {
    pub(crate) fn new(name: impl Into<String>, func: impl Fn(Vec<Object>) -> Result<Object, String> + 'static) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub(crate) fn call(&self, args: Vec<Object>) -> Result<Object, String> {
        (self.func)(args)
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc").field("name", &self.name).finish_non_exhaustive()
    }
}
