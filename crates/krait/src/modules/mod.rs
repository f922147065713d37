//! Built-in module implementations.
//!
//! A module is a mapping from attribute name to value; callable attributes
//! are [`ModuleFn`] variants dispatched in [`call`]. Modules are created on
//! demand when an import resolves and cached in the context. The set here is
//! deliberately small: every entry exercises the same contract caller-
//! supplied custom modules use.

use indexmap::IndexMap;

use crate::{
    args::Args,
    eval::{Ev, Interp},
    types::class::ModuleObj,
    value::Value,
};

pub(crate) mod json_mod;
pub(crate) mod math_mod;
pub(crate) mod os_mod;
pub(crate) mod random_mod;
pub(crate) mod time_mod;
pub(crate) mod web_mod;

/// Functions belonging to built-in modules.
///
/// The enum is the identity stored in `Value::ModuleFn`; dispatch happens in
/// [`call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ModuleFn {
    // math
    MathSqrt,
    MathFloor,
    MathCeil,
    MathFabs,
    MathTrunc,
    MathExp,
    MathLog,
    MathLog2,
    MathLog10,
    MathSin,
    MathCos,
    MathTan,
    MathAsin,
    MathAcos,
    MathAtan,
    MathAtan2,
    MathPow,
    MathHypot,
    MathRadians,
    MathDegrees,
    MathFactorial,
    MathGcd,
    MathIsnan,
    MathIsinf,
    MathIsclose,
    // json
    JsonDumps,
    JsonLoads,
    // os
    OsGetenv,
    OsListdir,
    OsRemove,
    OsPathExists,
    OsPathJoin,
    OsPathBasename,
    OsPathDirname,
    OsPathSplitext,
    // time
    TimeTime,
    TimeMonotonic,
    TimeSleep,
    // random
    RandomRandom,
    RandomRandint,
    RandomUniform,
    RandomChoice,
    RandomShuffle,
    RandomSeed,
    // web
    WebGet,
    WebPost,
    WebPut,
    WebPatch,
    WebDelete,
    WebRoute,
}

impl ModuleFn {
    /// The attribute name as user code sees it.
    pub(crate) fn name(self) -> &'static str {
        use ModuleFn as M;
        match self {
            M::MathSqrt => "sqrt",
            M::MathFloor => "floor",
            M::MathCeil => "ceil",
            M::MathFabs => "fabs",
            M::MathTrunc => "trunc",
            M::MathExp => "exp",
            M::MathLog => "log",
            M::MathLog2 => "log2",
            M::MathLog10 => "log10",
            M::MathSin => "sin",
            M::MathCos => "cos",
            M::MathTan => "tan",
            M::MathAsin => "asin",
            M::MathAcos => "acos",
            M::MathAtan => "atan",
            M::MathAtan2 => "atan2",
            M::MathPow => "pow",
            M::MathHypot => "hypot",
            M::MathRadians => "radians",
            M::MathDegrees => "degrees",
            M::MathFactorial => "factorial",
            M::MathGcd => "gcd",
            M::MathIsnan => "isnan",
            M::MathIsinf => "isinf",
            M::MathIsclose => "isclose",
            M::JsonDumps => "dumps",
            M::JsonLoads => "loads",
            M::OsGetenv => "getenv",
            M::OsListdir => "listdir",
            M::OsRemove => "remove",
            M::OsPathExists => "exists",
            M::OsPathJoin => "join",
            M::OsPathBasename => "basename",
            M::OsPathDirname => "dirname",
            M::OsPathSplitext => "splitext",
            M::TimeTime => "time",
            M::TimeMonotonic => "monotonic",
            M::TimeSleep => "sleep",
            M::RandomRandom => "random",
            M::RandomRandint => "randint",
            M::RandomUniform => "uniform",
            M::RandomChoice => "choice",
            M::RandomShuffle => "shuffle",
            M::RandomSeed => "seed",
            M::WebGet => "get",
            M::WebPost => "post",
            M::WebPut => "put",
            M::WebPatch => "patch",
            M::WebDelete => "delete",
            M::WebRoute => "route",
        }
    }
}

/// Dispatches a module-function call.
pub(crate) fn call(interp: &mut Interp, function: ModuleFn, args: Args) -> Ev<Value> {
    use ModuleFn as M;
    match function {
        M::MathSqrt
        | M::MathFloor
        | M::MathCeil
        | M::MathFabs
        | M::MathTrunc
        | M::MathExp
        | M::MathLog
        | M::MathLog2
        | M::MathLog10
        | M::MathSin
        | M::MathCos
        | M::MathTan
        | M::MathAsin
        | M::MathAcos
        | M::MathAtan
        | M::MathAtan2
        | M::MathPow
        | M::MathHypot
        | M::MathRadians
        | M::MathDegrees
        | M::MathFactorial
        | M::MathGcd
        | M::MathIsnan
        | M::MathIsinf
        | M::MathIsclose => math_mod::call(function, args),
        M::JsonDumps | M::JsonLoads => json_mod::call(function, args),
        M::OsGetenv
        | M::OsListdir
        | M::OsRemove
        | M::OsPathExists
        | M::OsPathJoin
        | M::OsPathBasename
        | M::OsPathDirname
        | M::OsPathSplitext => os_mod::call(interp, function, args),
        M::TimeTime | M::TimeMonotonic | M::TimeSleep => time_mod::call(interp, function, args),
        M::RandomRandom | M::RandomRandint | M::RandomUniform | M::RandomChoice | M::RandomShuffle
        | M::RandomSeed => random_mod::call(interp, function, args),
        M::WebGet | M::WebPost | M::WebPut | M::WebPatch | M::WebDelete | M::WebRoute => {
            web_mod::call(function, args)
        }
    }
}

/// Loads a built-in module by name, if it exists.
pub(crate) fn load_builtin(interp: &mut Interp, name: &str) -> Ev<Option<Value>> {
    let module = match name {
        "math" => math_mod::module(),
        "json" => json_mod::module(),
        "os" => os_mod::module(interp),
        "os.path" => os_mod::path_module(),
        "time" => time_mod::module(),
        "random" => random_mod::module(),
        "web" => web_mod::module(),
        _ => return Ok(None),
    };
    Ok(Some(module))
}

/// Builds a module value from name/value pairs.
pub(crate) fn module_value(name: &str, attrs: Vec<(&str, Value)>) -> Value {
    let mut map = IndexMap::new();
    for (attr, value) in attrs {
        map.insert(attr.to_string(), value);
    }
    Value::Module(std::rc::Rc::new(ModuleObj::new(name, map)))
}
