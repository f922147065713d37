//! Request dispatcher: route registration, matching, parameter binding,
//! body validation, state persistence, and streaming.

use krait::{App, ErrorKind, Request, RunOptions};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn decorator_registration_and_dispatch() {
    let program = r#"
import web

@web.get("/health")
def health():
    return {"ok": True}
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let response = app.handle(&Request::get("/health")).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"ok": true}));
}

#[test]
fn path_parameters_bind_by_name() {
    let program = r#"
import web

@web.get("/items/{item_id}/tags/{tag}")
def show(item_id, tag):
    return item_id + ":" + tag
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let response = app.handle(&Request::get("/items/42/tags/new")).unwrap();
    assert_eq!(response.body, json!("42:new"));
}

#[test]
fn first_matching_route_wins() {
    let program = r#"
import web

@web.get("/items/special")
def special():
    return "special"

@web.get("/items/{item_id}")
def generic(item_id):
    return "generic " + item_id
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    assert_eq!(app.handle(&Request::get("/items/special")).unwrap().body, json!("special"));
    assert_eq!(
        app.handle(&Request::get("/items/7")).unwrap().body,
        json!("generic 7")
    );
}

#[test]
fn query_parameters_fill_handler_args() {
    let program = r#"
import web

@web.get("/search")
def search(q, limit="10"):
    return q + "/" + limit
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let response = app
        .handle(&Request::get("/search").with_query("q", "snakes"))
        .unwrap();
    assert_eq!(response.body, json!("snakes/10"));
    let response = app
        .handle(
            &Request::get("/search")
                .with_query("q", "snakes")
                .with_query("limit", "5"),
        )
        .unwrap();
    assert_eq!(response.body, json!("snakes/5"));
}

#[test]
fn post_body_fields_bind_by_name() {
    let program = r#"
import web

@web.post("/sum")
def add(a, b):
    return a + b
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let response = app
        .handle(&Request::post("/sum", json!({"a": 2, "b": 3})))
        .unwrap();
    assert_eq!(response.body, json!(5));
}

#[test]
fn body_validates_into_declared_model() {
    let program = r#"
import web

class Item:
    def __init__(self, name, price):
        self.name = name
        self.price = price

@web.post("/items")
def create(item: Item):
    return {"name": item.name, "total": item.price * 2}
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let response = app
        .handle(&Request::post("/items", json!({"name": "rope", "price": 4})))
        .unwrap();
    assert_eq!(response.body, json!({"name": "rope", "total": 8}));

    // A missing field surfaces the constructor's TypeError.
    let err = app
        .handle(&Request::post("/items", json!({"name": "rope"})))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.message.contains("missing 1 required positional argument"));
}

#[test]
fn unmatched_routes_are_route_not_found() {
    let program = "import web\n\nweb.route(\"GET\", \"/only\", lambda: 'here')\n";
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let err = app.handle(&Request::get("/other")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RouteNotFound);
    // Wrong method on an existing path also misses.
    let err = app
        .handle(&Request {
            method: "POST".to_string(),
            path: "/only".to_string(),
            query: Vec::new(),
            body: None,
        })
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RouteNotFound);
}

#[test]
fn handler_state_persists_across_requests() {
    let program = r#"
import web

counts = {"hits": 0}

@web.get("/hit")
def hit():
    counts["hits"] = counts["hits"] + 1
    return counts["hits"]
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    assert_eq!(app.handle(&Request::get("/hit")).unwrap().body, json!(1));
    assert_eq!(app.handle(&Request::get("/hit")).unwrap().body, json!(2));
    assert_eq!(app.handle(&Request::get("/hit")).unwrap().body, json!(3));
}

#[test]
fn file_writes_persist_across_requests() {
    let program = r#"
import web

@web.post("/log")
def log(message):
    with open("app.log", "a") as f:
        f.write(message + "\n")
    return "ok"

@web.get("/log")
def read_log():
    with open("app.log") as f:
        return f.read()
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    app.handle(&Request::post("/log", json!({"message": "first"}))).unwrap();
    app.handle(&Request::post("/log", json!({"message": "second"}))).unwrap();
    let response = app.handle(&Request::get("/log")).unwrap();
    assert_eq!(response.body, json!("first\nsecond\n"));
}

#[test]
fn explicit_status_and_headers() {
    let program = r#"
import web

@web.get("/created")
def created():
    return {"status": 201, "headers": {"x-kind": "demo"}, "body": {"id": 9}}
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let response = app.handle(&Request::get("/created")).unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.headers, vec![("x-kind".to_string(), "demo".to_string())]);
    assert_eq!(response.body, json!({"id": 9}));
}

#[test]
fn handler_exceptions_surface_with_kind() {
    let program = r#"
import web

@web.get("/boom")
def boom():
    raise ValueError("exploded")
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let err = app.handle(&Request::get("/boom")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert_eq!(err.message, "ValueError: exploded");
}

#[test]
fn streaming_response_is_pulled_on_demand() {
    let program = r#"
import web

@web.get("/report/{name}")
def report(name):
    yield "header:" + name
    for i in range(3):
        yield "row-" + str(i)
    yield "footer"
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let chunks: Vec<String> = app
        .handle_stream(&Request::get("/report/daily"))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(chunks, vec!["header:daily", "row-0", "row-1", "row-2", "footer"]);

    // A later non-streaming request still works.
    let program_result = app.handle_stream(&Request::get("/report/x")).unwrap().next();
    assert!(program_result.is_some());
}

#[test]
fn http_events_are_logged() {
    let program = r#"
import web

@web.get("/ping")
def ping():
    return "pong"
"#;
    let mut app = App::new(program, RunOptions::new()).unwrap();
    app.handle(&Request::get("/ping")).unwrap();
    let has_http_event = app
        .context()
        .events()
        .iter()
        .any(|e| e.kind == krait::EventKind::HttpOp);
    assert!(has_http_event);
}
