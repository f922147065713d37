//! # krait
//!
//! A sandboxed tree-walking interpreter for a subset of Python 3, designed to
//! execute untrusted, machine-generated programs inside a host application as
//! a pure function: no OS process, no language VM, no dynamic code loading.
//!
//! The library owns no global mutable state, spawns no background workers,
//! and performs no I/O except through explicit capability objects supplied by
//! the host. Dataflow is strictly `source → tokens → AST → value`; every
//! stage returns either a success payload or a structured error carrying a
//! line number.
//!
//! ```
//! use krait::{Object, RunOptions, run};
//!
//! let outcome = run("2 + 3", RunOptions::new()).unwrap();
//! assert_eq!(outcome.value(), Some(&Object::Int(5)));
//! ```
//!
//! Programs can also be booted as lightweight web applications whose routes
//! are registered through the `web` module; see [`App`].

mod args;
mod ast;
mod builtins;
mod context;
mod dispatch;
mod env;
mod error;
mod eval;
mod exc;
mod fs;
mod fstring;
mod lex;
mod methods;
mod modules;
mod object;
mod ops;
mod parse;
mod py_hash;
mod run;
mod types;
mod value;

pub use crate::{
    context::{Context, Event, EventKind, NetworkPolicy, Profile},
    dispatch::{App, Request, Response, StreamResponse},
    error::{Error, ErrorKind},
    exc::ExcType,
    fs::{DirFs, Filesystem, FsError, MemoryFs},
    object::Object,
    run::{Ast, CustomModule, ModuleAttr, RunOptions, RunOutcome, compile, resume, run, run_ast, run_in_context, snapshot},
};
