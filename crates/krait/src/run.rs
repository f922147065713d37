//! Public host entry points: compile, run, resume, snapshot.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::StmtLoc,
    context::{Budget, Context, FsAdapter, NetworkPolicy, Profile},
    error::Error,
    eval::{Interp, ModuleExit},
    fs::{Filesystem, MemoryFs},
    object::Object,
    parse::parse_module,
    types::{class::ModuleObj, function::HostFunc},
    value::Value,
};

/// A compiled program: the positionally-annotated AST.
///
/// Compiling never throws; errors come back as values. Running a compiled
/// AST is equivalent to running its source.
#[derive(Debug, Clone)]
pub struct Ast {
    pub(crate) body: Vec<StmtLoc>,
}

/// Compiles source into an AST, or returns a structured syntax error with a
/// line number.
pub fn compile(source: &str) -> Result<Ast, Error> {
    parse_module(source).map(|body| Ast { body })
}

/// One attribute of a caller-supplied module.
pub enum ModuleAttr {
    /// A plain value.
    Value(Object),
    /// A callable. Errors may carry a `"ClassName: …"` exception prefix to
    /// surface as that Python exception.
    Func(Box<dyn Fn(Vec<Object>) -> Result<Object, String>>),
}

/// A caller-supplied module, overriding or extending the builtin registry.
#[derive(Default)]
pub struct CustomModule {
    attrs: Vec<(String, ModuleAttr)>,
}

impl CustomModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain-value attribute.
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: Object) -> Self {
        self.attrs.push((name.into(), ModuleAttr::Value(value)));
        self
    }

    /// Adds a callable attribute.
    #[must_use]
    pub fn func(
        mut self,
        name: impl Into<String>,
        f: impl Fn(Vec<Object>) -> Result<Object, String> + 'static,
    ) -> Self {
        self.attrs.push((name.into(), ModuleAttr::Func(Box::new(f))));
        self
    }
}

/// Options controlling one run. All fields are optional; the defaults give a
/// fully-closed sandbox: in-memory filesystem, no network, no time limit.
#[derive(Default)]
pub struct RunOptions {
    modules: Vec<(String, CustomModule)>,
    filesystem: Option<Box<dyn Filesystem>>,
    memory_fs: Option<MemoryFs>,
    env: IndexMap<String, String>,
    timeout_ms: Option<u64>,
    network: NetworkPolicy,
    sql: bool,
    object_storage: bool,
    profile: bool,
    allowed_modules: Option<Vec<String>>,
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom module, authoritative over the builtin registry.
    #[must_use]
    pub fn module(mut self, name: impl Into<String>, module: CustomModule) -> Self {
        self.modules.push((name.into(), module));
        self
    }

    /// Supplies a filesystem capability implementation.
    #[must_use]
    pub fn filesystem(mut self, fs: impl Filesystem + 'static) -> Self {
        self.filesystem = Some(Box::new(fs));
        self
    }

    /// Seeds the default in-memory filesystem.
    #[must_use]
    pub fn memory_fs(mut self, fs: MemoryFs) -> Self {
        self.memory_fs = Some(fs);
        self
    }

    /// Sets an environment variable visible through `os.environ`.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the compute budget in milliseconds.
    #[must_use]
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the network policy; the default denies everything.
    #[must_use]
    pub fn network(mut self, policy: NetworkPolicy) -> Self {
        self.network = policy;
        self
    }

    /// Opts into the `sql` module.
    #[must_use]
    pub fn sql(mut self, enabled: bool) -> Self {
        self.sql = enabled;
        self
    }

    /// Opts into the object-storage module.
    #[must_use]
    pub fn object_storage(mut self, enabled: bool) -> Self {
        self.object_storage = enabled;
        self
    }

    /// Turns on per-line and per-call profile counters.
    #[must_use]
    pub fn profile(mut self, enabled: bool) -> Self {
        self.profile = enabled;
        self
    }

    /// Restricts the permitted builtin modules to the given names.
    #[must_use]
    pub fn allowed_modules(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_modules = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the execution context these options describe.
    pub(crate) fn into_context(self) -> Result<Context, Error> {
        let mut ctx = Context {
            fs: match (self.filesystem, self.memory_fs) {
                (Some(fs), _) => FsAdapter::Host(fs),
                (None, Some(fs)) => FsAdapter::Memory(fs),
                (None, None) => FsAdapter::Memory(MemoryFs::new()),
            },
            env_vars: self.env,
            network: self.network,
            sql: self.sql,
            object_storage: self.object_storage,
            budget: Budget::new(self.timeout_ms),
            profile: self.profile.then(Profile::default),
            allowed_modules: self
                .allowed_modules
                .map(|names| names.into_iter().collect()),
            ..Context::default()
        };
        for (name, module) in self.modules {
            let mut attrs = IndexMap::new();
            for (attr_name, attr) in module.attrs {
                let value = match attr {
                    ModuleAttr::Value(obj) => obj.to_value().map_err(Error::from)?,
                    ModuleAttr::Func(f) => Value::HostFn(Rc::new(HostFunc::new(attr_name.clone(), f))),
                };
                attrs.insert(attr_name, value);
            }
            ctx.custom_modules
                .insert(name.clone(), Value::Module(Rc::new(ModuleObj::new(name, attrs))));
        }
        Ok(ctx)
    }
}

/// Outcome of a completed or suspended run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The program ran to completion.
    Complete {
        /// The value of the final expression statement, `None` otherwise.
        value: Object,
        /// The final context: output, events, filesystem, profile.
        context: Context,
    },
    /// The program called `suspend()`; snapshot the context to resume later.
    Suspended { context: Context },
}

impl RunOutcome {
    /// The completed value, if the run finished.
    #[must_use]
    pub fn value(&self) -> Option<&Object> {
        match self {
            Self::Complete { value, .. } => Some(value),
            Self::Suspended { .. } => None,
        }
    }

    /// The context, whichever way the run ended.
    #[must_use]
    pub fn context(&self) -> &Context {
        match self {
            Self::Complete { context, .. } | Self::Suspended { context } => context,
        }
    }
}

/// Compiles and runs a program under fresh options.
pub fn run(source: &str, options: RunOptions) -> Result<RunOutcome, Error> {
    let ast = compile(source)?;
    run_ast(&ast, options)
}

/// Runs an already-compiled program. Equivalent to [`run`] on its source.
pub fn run_ast(ast: &Ast, options: RunOptions) -> Result<RunOutcome, Error> {
    let ctx = options.into_context()?;
    run_in_context(ast, ctx)
}

/// Runs a program under an explicit, possibly pre-populated context.
pub fn run_in_context(ast: &Ast, ctx: Context) -> Result<RunOutcome, Error> {
    let mut interp = Interp::new(ctx);
    match interp.run_module(&ast.body) {
        Ok(value) => Ok(RunOutcome::Complete {
            value: Object::from_value(&value),
            context: interp.ctx,
        }),
        Err(ModuleExit::Suspended) => Ok(RunOutcome::Suspended { context: interp.ctx }),
        Err(ModuleExit::Exc(exc)) => Err(Error::from(exc)),
    }
}

/// Serialises a context into an opaque snapshot.
pub fn snapshot(context: &Context) -> Result<Vec<u8>, Error> {
    context.snapshot_bytes()
}

/// Resumes a program from a snapshot.
///
/// The source re-executes deterministically with replay armed: output and
/// side effects recorded before the snapshot are not re-performed, and the
/// `suspend()` call that produced the snapshot returns instead of
/// suspending.
pub fn resume(source: &str, snapshot: &[u8], options: RunOptions) -> Result<RunOutcome, Error> {
    let ast = compile(source)?;
    let mut ctx = options.into_context()?;
    ctx.apply_snapshot(snapshot)?;
    run_in_context(&ast, ctx)
}
