//! Request dispatcher for the lightweight web handler.
//!
//! Programs register routes through the `web` module; the evaluator compiles
//! each registration into the context's route table. [`App`] owns the booted
//! program (module executed once, routes registered) and dispatches requests
//! against it. Handler state persists across requests because every handler
//! runs under the shared context.

use serde_json::json;

use crate::{
    args::Args,
    ast::Params,
    context::{Context, EventKind, GenMode, RouteEntry, Segment, StepOutcome},
    error::{Error, ErrorKind},
    eval::{Interp, ModuleExit, Unwind},
    exc::PyExc,
    object::Object,
    parse::parse_module,
    run::RunOptions,
    types::function::MethodKind,
    value::Value,
};

/// An incoming request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Request {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// A non-streaming response: status, headers, and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// A booted application: the program's module scope plus its route table,
/// retained across requests.
pub struct App {
    pub(crate) interp: Interp,
}

impl App {
    /// Parses and boots a program: the module body runs once, registering
    /// routes and initialising state.
    pub fn new(source: &str, options: RunOptions) -> Result<Self, Error> {
        let body = parse_module(source)?;
        let ctx = options.into_context()?;
        let mut interp = Interp::new(ctx);
        match interp.run_module(&body) {
            Ok(_) => Ok(Self { interp }),
            Err(ModuleExit::Exc(exc)) => Err(Error::from(exc)),
            Err(ModuleExit::Suspended) => Err(Error::new(
                ErrorKind::Internal,
                "suspend() is not supported during application boot",
            )),
        }
    }

    /// The execution context, for event/output inspection between requests.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.interp.ctx
    }

    /// Dispatches a request to the first matching route.
    ///
    /// The route table is consulted in registration order; the first entry
    /// whose method and segment shape match wins. Path parameters bind by
    /// name, then query parameters, then parsed body fields.
    pub fn handle(&mut self, request: &Request) -> Result<Response, Error> {
        let (route, path_params) = self.match_route(request)?;
        let handler = route.handler.clone();
        let args = self.bind_handler_args(&handler, request, path_params)?;

        self.record_request(request);
        self.interp.ctx.budget.start();
        let result = self.interp.call_value(&handler, args, 0);
        match result {
            Ok(value) => Ok(package_response(&value)),
            Err(Unwind::Raise(exc)) => Err(Error::from(exc)),
            Err(other) => Err(Interp::unwind_to_error(other)),
        }
    }

    /// Dispatches a request whose handler produces a generator, exposing the
    /// yields as a lazy chunk sequence driven in deferred mode.
    pub fn handle_stream(&mut self, request: &Request) -> Result<StreamResponse<'_>, Error> {
        let (route, path_params) = self.match_route(request)?;
        let handler = route.handler.clone();
        let args = self.bind_handler_args(&handler, request, path_params)?;

        self.record_request(request);
        self.interp.ctx.budget.start();
        self.interp.ctx.gen_mode = GenMode::Deferred;
        let result = self.interp.call_value(&handler, args, 0);
        match result {
            Ok(Value::Generator(r#gen)) => Ok(StreamResponse {
                status: 200,
                headers: Vec::new(),
                r#gen,
                app: self,
            }),
            Ok(other) => {
                self.interp.ctx.gen_mode = GenMode::Eager;
                Err(Error::new(
                    ErrorKind::Runtime,
                    format!(
                        "TypeError: streaming handler must return a generator, not '{}'",
                        other.type_name()
                    ),
                ))
            }
            Err(Unwind::Raise(exc)) => {
                self.interp.ctx.gen_mode = GenMode::Eager;
                Err(Error::from(exc))
            }
            Err(other) => {
                self.interp.ctx.gen_mode = GenMode::Eager;
                Err(Interp::unwind_to_error(other))
            }
        }
    }

    fn record_request(&mut self, request: &Request) {
        match self.interp.ctx.next_step() {
            StepOutcome::Replay(_) => {}
            StepOutcome::Live => {
                self.interp.ctx.record(
                    EventKind::HttpOp,
                    json!({"method": request.method, "path": request.path}),
                );
            }
        }
    }

    /// Finds the first route matching method, segment count, and literal
    /// segments; binds path parameters by name.
    fn match_route(&self, request: &Request) -> Result<(RouteEntry, Vec<(String, String)>), Error> {
        let segments: Vec<&str> = request
            .path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        for route in &self.interp.ctx.routes {
            if !route.method.eq_ignore_ascii_case(&request.method) {
                continue;
            }
            if route.segments.len() != segments.len() {
                continue;
            }
            let mut params = Vec::new();
            let mut matched = true;
            for (pattern, actual) in route.segments.iter().zip(&segments) {
                match pattern {
                    Segment::Literal(text) => {
                        if text != actual {
                            matched = false;
                            break;
                        }
                    }
                    Segment::Param(name) => params.push((name.clone(), (*actual).to_string())),
                }
            }
            if matched {
                return Ok((route.clone(), params));
            }
        }
        Err(Error::new(
            ErrorKind::RouteNotFound,
            format!("no route matches {} {}", request.method, request.path),
        ))
    }

    /// Fills the handler's declared formal parameters from path parameters,
    /// query parameters, and the parsed body. A parameter whose annotation
    /// names a user class receives the body validated into an instance of
    /// that class.
    fn bind_handler_args(
        &mut self,
        handler: &Value,
        request: &Request,
        path_params: Vec<(String, String)>,
    ) -> Result<Args, Error> {
        let Some(params) = handler_params(handler) else {
            return Ok(Args::default());
        };
        let body_is_json_object = request
            .body
            .as_ref()
            .is_some_and(serde_json::Value::is_object);
        let accepts_body = matches!(request.method.as_str(), "POST" | "PUT" | "PATCH");

        let mut args = Args::default();
        for param in &params.pos {
            // (a) path parameters
            if let Some((_, value)) = path_params.iter().find(|(name, _)| *name == param.name) {
                args.kw.push((param.name.clone(), Value::str(value)));
                continue;
            }
            // (b) query parameters
            if let Some((_, value)) = request.query.iter().find(|(name, _)| *name == param.name) {
                args.kw.push((param.name.clone(), Value::str(value)));
                continue;
            }
            // (c) body fields, optionally validated into a declared model
            if accepts_body {
                if let Some(model_name) = &param.annotation {
                    if let Some(model_class) = self.lookup_model(model_name) {
                        let instance = self
                            .validate_body(&model_class, request)
                            .map_err(Error::from)?;
                        args.kw.push((param.name.clone(), instance));
                        continue;
                    }
                }
                if body_is_json_object {
                    if let Some(field) = request
                        .body
                        .as_ref()
                        .and_then(|b| b.get(&param.name))
                    {
                        let value = Object::from_json(field).to_value().map_err(Error::from)?;
                        args.kw.push((param.name.clone(), value));
                        continue;
                    }
                }
            }
            // Parameters with defaults fall back to them at bind time.
        }
        Ok(args)
    }

    /// Looks up a handler annotation name in the program's module scope.
    fn lookup_model(&self, name: &str) -> Option<Value> {
        match self.interp.env.module_scope().get(name) {
            Some(class @ Value::Class(_)) => Some(class.clone()),
            _ => None,
        }
    }

    /// Instantiates a model class from the request body's fields.
    fn validate_body(&mut self, model_class: &Value, request: &Request) -> Result<Value, PyExc> {
        let Some(serde_json::Value::Object(fields)) = &request.body else {
            return Err(PyExc::type_error("request body must be a JSON object"));
        };
        let mut args = Args::default();
        for (key, value) in fields {
            args.kw
                .push((key.clone(), Object::from_json(value).to_value()?));
        }
        self.interp.call_simple_kw(model_class, args)
    }
}

/// Extracts the declared formal parameters of a handler callable.
fn handler_params(handler: &Value) -> Option<std::rc::Rc<Params>> {
    match handler {
        Value::Func(f) => Some(f.params.clone()),
        Value::Method(m) => match &m.kind {
            MethodKind::User(f) => Some(f.params.clone()),
            MethodKind::Primitive(_) => None,
        },
        _ => None,
    }
}

/// Packages a handler's return value: a mapping carrying a `status` key is
/// an explicit response description, anything else becomes a 200 body.
fn package_response(value: &Value) -> Response {
    if let Value::Dict(d) = value {
        let d = d.borrow();
        let status = d
            .get(&Value::str("status"))
            .ok()
            .flatten()
            .and_then(|s| s.as_index("status").ok());
        if let Some(status) = status {
            let headers = d
                .get(&Value::str("headers"))
                .ok()
                .flatten()
                .map(|h| match &h {
                    Value::Dict(headers) => headers
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.py_str(), v.py_str()))
                        .collect(),
                    _ => Vec::new(),
                })
                .unwrap_or_default();
            let body = d
                .get(&Value::str("body"))
                .ok()
                .flatten()
                .map(|b| Object::from_value(&b).to_json())
                .unwrap_or(serde_json::Value::Null);
            return Response {
                status: status as u16,
                headers,
                body,
            };
        }
    }
    Response {
        status: 200,
        headers: Vec::new(),
        body: Object::from_value(value).to_json(),
    }
}

/// A streaming response: the body is a lazy chunk sequence pulled from a
/// deferred-mode generator, one value per consumer demand.
pub struct StreamResponse<'a> {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    r#gen: std::rc::Rc<std::cell::RefCell<crate::types::generator::GeneratorObj>>,
    app: &'a mut App,
}

impl Iterator for StreamResponse<'_> {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let r#gen = self.r#gen.clone();
        match self.app.interp.gen_next(&r#gen) {
            Ok(Some(value)) => Some(Ok(value.py_str())),
            Ok(None) => None,
            Err(Unwind::Raise(exc)) => Some(Err(Error::from(exc))),
            Err(other) => Some(Err(Interp::unwind_to_error(other))),
        }
    }
}

impl Drop for StreamResponse<'_> {
    fn drop(&mut self) {
        // Later non-streaming requests run eagerly again.
        self.app.interp.ctx.gen_mode = GenMode::Eager;
    }
}
