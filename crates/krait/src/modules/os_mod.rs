//! Implementation of the `os` module: environment variables plus
//! capability-routed filesystem helpers. `os.path` is exposed both as an
//! attribute of `os` and as an importable module of its own.

use crate::{
    args::Args,
    eval::{Ev, Interp, Unwind},
    exc::PyExc,
    types::dict::Dict,
    value::Value,
};

use super::{ModuleFn, module_value};

pub(crate) fn module(interp: &mut Interp) -> Value {
    let mut environ = Dict::new();
    for (key, value) in &interp.ctx.env_vars {
        // Host-provided names are always hashable strings.
        let _ = environ.insert(Value::str(key), Value::str(value));
    }
    module_value(
        "os",
        vec![
            ("environ", Value::dict(environ)),
            ("getenv", Value::ModuleFn(ModuleFn::OsGetenv)),
            ("listdir", Value::ModuleFn(ModuleFn::OsListdir)),
            ("remove", Value::ModuleFn(ModuleFn::OsRemove)),
            ("path", path_module()),
        ],
    )
}

pub(crate) fn path_module() -> Value {
    module_value(
        "os.path",
        vec![
            ("exists", Value::ModuleFn(ModuleFn::OsPathExists)),
            ("join", Value::ModuleFn(ModuleFn::OsPathJoin)),
            ("basename", Value::ModuleFn(ModuleFn::OsPathBasename)),
            ("dirname", Value::ModuleFn(ModuleFn::OsPathDirname)),
            ("splitext", Value::ModuleFn(ModuleFn::OsPathSplitext)),
        ],
    )
}

fn str_arg(value: &Value, what: &str) -> Result<String, PyExc> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(PyExc::type_error(format!(
            "{what} must be str, not {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn call(interp: &mut Interp, function: ModuleFn, args: Args) -> Ev<Value> {
    use ModuleFn as M;
    match function {
        M::OsGetenv => {
            let (name, default) = args.get_one_two("getenv").map_err(Unwind::Raise)?;
            let name = str_arg(&name, "getenv name").map_err(Unwind::Raise)?;
            match interp.ctx.env_vars.get(&name) {
                Some(value) => Ok(Value::str(value)),
                None => Ok(default.unwrap_or(Value::None)),
            }
        }
        M::OsListdir => {
            let path = match args.get_up_to("listdir", 1).map_err(Unwind::Raise)?.remove(0) {
                None => ".".to_string(),
                Some(v) => str_arg(&v, "listdir path").map_err(Unwind::Raise)?,
            };
            let names = interp.ctx.fs_list_dir(&path).map_err(Unwind::Raise)?;
            Ok(Value::list(names.into_iter().map(Value::str).collect()))
        }
        M::OsRemove => {
            let path = args.get_one("remove").map_err(Unwind::Raise)?;
            let path = str_arg(&path, "remove path").map_err(Unwind::Raise)?;
            interp.ctx.fs_delete(&path).map_err(Unwind::Raise)?;
            Ok(Value::None)
        }
        M::OsPathExists => {
            let path = args.get_one("exists").map_err(Unwind::Raise)?;
            let path = str_arg(&path, "exists path").map_err(Unwind::Raise)?;
            Ok(Value::Bool(interp.ctx.fs_exists(&path)))
        }
        M::OsPathJoin => {
            let mut parts: Vec<String> = Vec::with_capacity(args.pos.len());
            for value in &args.pos {
                parts.push(str_arg(value, "join component").map_err(Unwind::Raise)?);
            }
            let mut joined = String::new();
            for part in parts {
                if part.starts_with('/') {
                    joined = part;
                } else {
                    if !joined.is_empty() && !joined.ends_with('/') {
                        joined.push('/');
                    }
                    joined.push_str(&part);
                }
            }
            Ok(Value::str(joined))
        }
        M::OsPathBasename => {
            let path = args.get_one("basename").map_err(Unwind::Raise)?;
            let path = str_arg(&path, "basename path").map_err(Unwind::Raise)?;
            Ok(Value::str(path.rsplit('/').next().unwrap_or("")))
        }
        M::OsPathDirname => {
            let path = args.get_one("dirname").map_err(Unwind::Raise)?;
            let path = str_arg(&path, "dirname path").map_err(Unwind::Raise)?;
            match path.rsplit_once('/') {
                Some((dir, _)) => Ok(Value::str(if dir.is_empty() { "/" } else { dir })),
                None => Ok(Value::str("")),
            }
        }
        M::OsPathSplitext => {
            let path = args.get_one("splitext").map_err(Unwind::Raise)?;
            let path = str_arg(&path, "splitext path").map_err(Unwind::Raise)?;
            let basename_start = path.rfind('/').map_or(0, |i| i + 1);
            match path[basename_start..].rfind('.') {
                Some(dot) if dot > 0 => {
                    let split = basename_start + dot;
                    Ok(Value::tuple(vec![
                        Value::str(&path[..split]),
                        Value::str(&path[split..]),
                    ]))
                }
                _ => Ok(Value::tuple(vec![Value::str(&path), Value::str("")])),
            }
        }
        other => Err(PyExc::internal(format!("os dispatch for {}", other.name())).into()),
    }
}
