//! Import resolution: custom modules → filesystem `.py` sources → the
//! built-in registry, cached in the context so a second import is a map
//! lookup. Host-supplied custom modules are authoritative.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    env::Environment,
    exc::{ExcType, PyExc},
    parse::parse_module,
    types::class::ModuleObj,
    value::Value,
};

use super::{Ev, Interp, ModuleExit, Unwind};

impl Interp {
    pub(crate) fn exec_import(&mut self, module: &str, alias: Option<&str>) -> Ev<()> {
        // `import a.b` binds `a`; `import a.b as c` binds the full module.
        let (resolve_name, bind_name) = match alias {
            Some(alias) => (module.to_string(), alias.to_string()),
            None => match module.split_once('.') {
                Some((first, _)) => (first.to_string(), first.to_string()),
                None => (module.to_string(), module.to_string()),
            },
        };
        let value = self.resolve_module(&resolve_name)?;
        self.env.bind(&bind_name, value);
        Ok(())
    }

    pub(crate) fn exec_from_import(&mut self, module: &str, names: &[(String, Option<String>)]) -> Ev<()> {
        let module_value = self.resolve_module(module)?;
        for (name, alias) in names {
            let attr = self.get_attr(&module_value, name).map_err(|_| {
                Unwind::Raise(PyExc::new(
                    ExcType::ImportError,
                    format!("cannot import name '{name}' from '{module}'"),
                ))
            })?;
            self.env.bind(alias.as_deref().unwrap_or(name), attr);
        }
        Ok(())
    }

    /// Resolves a module name through the three-tier order, with caching.
    pub(crate) fn resolve_module(&mut self, name: &str) -> Ev<Value> {
        if let Some(cached) = self.ctx.module_cache.get(name) {
            return Ok(cached.clone());
        }

        // Tier 1: caller-supplied custom modules override everything.
        if let Some(module) = self.ctx.custom_modules.get(name) {
            let module = module.clone();
            self.record_import(name, "custom");
            self.ctx.module_cache.insert(name.to_string(), module.clone());
            return Ok(module);
        }

        // Tier 2: importable source files from the filesystem capability.
        let path = format!("{}.py", name.replace('.', "/"));
        if self.ctx.fs_exists(&path) {
            let module = self.import_source_file(name, &path)?;
            self.ctx.module_cache.insert(name.to_string(), module.clone());
            return Ok(module);
        }

        // Tier 3: the built-in registry, behind the capability gates.
        self.check_module_allowed(name).map_err(Unwind::Raise)?;
        if let Some(module) = crate::modules::load_builtin(self, name)? {
            self.record_import(name, "builtin");
            self.ctx.module_cache.insert(name.to_string(), module.clone());
            return Ok(module);
        }

        Err(PyExc::new(
            ExcType::ModuleNotFoundError,
            format!("No module named '{name}'"),
        )
        .into())
    }

    /// Evaluates a `.py` file in its own module scope.
    fn import_source_file(&mut self, name: &str, path: &str) -> Ev<Value> {
        if self.loading_modules.iter().any(|m| m == name) {
            return Err(PyExc::new(
                ExcType::ImportError,
                format!("circular import of '{name}'"),
            )
            .into());
        }
        let source = self.ctx.fs_read(path).map_err(Unwind::Raise)?;
        let body = parse_module(&source).map_err(|e| {
            Unwind::Raise(PyExc::new(
                ExcType::ImportError,
                format!("invalid module '{name}': {}", e.message),
            ))
        })?;

        self.loading_modules.push(name.to_string());
        let saved_env = std::mem::replace(&mut self.env, Environment::new());
        let mut exit = None;
        for stmt in &body {
            if let Err(unwind) = self.exec_stmt(stmt) {
                exit = Some(unwind);
                break;
            }
        }
        let module_env = std::mem::replace(&mut self.env, saved_env);
        self.loading_modules.pop();

        match exit {
            None => {}
            Some(Unwind::Raise(exc)) => return Err(Unwind::Raise(exc)),
            Some(other) => return Err(other),
        }

        let attrs: IndexMap<String, Value> = module_env.module_scope().clone();
        self.record_import(name, "filesystem");
        Ok(Value::Module(Rc::new(ModuleObj::new(name, attrs))))
    }

    /// Capability gate for built-in modules: the permitted-module set plus
    /// the sql / object-storage opt-ins.
    fn check_module_allowed(&self, name: &str) -> Result<(), PyExc> {
        if matches!(name, "sql" | "s3") {
            let enabled = match name {
                "sql" => self.ctx.sql,
                _ => self.ctx.object_storage,
            };
            if !enabled {
                return Err(PyExc::new(
                    ExcType::ImportError,
                    format!("module '{name}' is disabled by the sandbox policy"),
                ));
            }
            return Ok(());
        }
        if let Some(allowed) = &self.ctx.allowed_modules {
            if !allowed.contains(name) {
                return Err(PyExc::new(
                    ExcType::ImportError,
                    format!("module '{name}' is disabled by the sandbox policy"),
                ));
            }
        }
        Ok(())
    }
}
