//! Generator semantics across both execution modes.
//!
//! Eager mode materialises synchronously; deferred mode is driven through
//! the streaming dispatcher one value per demand. For any terminating
//! generator the two modes must produce the same sequence.

use krait::{App, Object, Request, RunOptions, RunOutcome, run};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Object {
    match run(source, RunOptions::new()).expect("run failed") {
        RunOutcome::Complete { value, .. } => value,
        RunOutcome::Suspended { .. } => panic!("unexpected suspension"),
    }
}

/// Drains a generator-returning handler through the deferred-mode driver.
fn stream_all(program: &str, limit: usize) -> Vec<String> {
    let mut app = App::new(program, RunOptions::new()).expect("boot failed");
    let stream = app.handle_stream(&Request::get("/gen")).expect("stream failed");
    stream.take(limit).map(|chunk| chunk.expect("chunk error")).collect()
}

/// Wraps a generator body into a routed program for deferred driving.
fn routed(gen_def: &str) -> String {
    format!("import web\n\n{gen_def}\n\nweb.route(\"GET\", \"/gen\", gen)\n")
}

#[test]
fn eager_list_materialises_all_yields() {
    let source = "\
def gen():
    yield 1
    yield 2
    yield 3

list(gen())
";
    assert_eq!(
        eval(source),
        Object::List(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
}

#[test]
fn eager_equals_deferred_for_terminating_generators() {
    let cases = [
        "def gen():\n    yield 1\n    yield 2\n    yield 3\n",
        "def gen():\n    for i in range(4):\n        yield i * 10\n",
        "def gen():\n    n = 0\n    while n < 3:\n        yield n\n        n += 1\n",
        "def gen():\n    for i in range(3):\n        for j in range(2):\n            yield i * 10 + j\n",
        "def gen():\n    yield 0\n    yield from [1, 2]\n    yield 3\n",
        "def gen():\n    try:\n        yield 1\n        yield 2\n    finally:\n        pass\n",
        "def gen():\n    try:\n        yield 1\n        raise ValueError('x')\n    except ValueError:\n        yield 2\n",
    ];
    for gen_def in cases {
        let eager = eval(&format!("{gen_def}\n[str(v) for v in gen()]"));
        let Object::List(eager) = eager else { panic!() };
        let eager: Vec<String> = eager
            .into_iter()
            .map(|v| match v {
                Object::String(s) => s,
                other => panic!("expected str, got {other:?}"),
            })
            .collect();
        let deferred = stream_all(&routed(gen_def), usize::MAX);
        assert_eq!(eager, deferred, "mode mismatch for {gen_def:?}");
    }
}

#[test]
fn infinite_generator_streams_lazily() {
    let started = std::time::Instant::now();
    let program = routed("def gen():\n    i = 0\n    while True:\n        yield i\n        i += 1\n");
    let chunks = stream_all(&program, 3);
    assert_eq!(chunks, vec!["0", "1", "2"]);
    assert!(
        started.elapsed() < std::time::Duration::from_millis(200),
        "deferred mode must not materialise the infinite generator"
    );
}

#[test]
fn yields_preserve_order_across_nesting() {
    let program = routed(
        "def gen():\n    yield 'start'\n    for i in range(2):\n        yield 'loop-' + str(i)\n        yield from ['a-' + str(i), 'b-' + str(i)]\n    yield 'end'\n",
    );
    assert_eq!(
        stream_all(&program, usize::MAX),
        vec!["start", "loop-0", "a-0", "b-0", "loop-1", "a-1", "b-1", "end"]
    );
}

#[test]
fn yield_from_nested_generators() {
    let source = "\
def inner():
    yield 1
    yield 2

def outer():
    yield 0
    yield from inner()
    yield 3

list(outer())
";
    assert_eq!(
        eval(source),
        Object::List(vec![Object::Int(0), Object::Int(1), Object::Int(2), Object::Int(3)])
    );

    let program = "\
import web

def inner():
    yield 1
    yield 2

def gen():
    yield 0
    yield from inner()
    yield 3

web.route(\"GET\", \"/gen\", gen)
";
    let mut app = App::new(program, RunOptions::new()).unwrap();
    let chunks: Vec<String> = app
        .handle_stream(&Request::get("/gen"))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(chunks, vec!["0", "1", "2", "3"]);
}

#[test]
fn generator_consumed_by_for_loop() {
    let source = "\
def countdown(n):
    while n > 0:
        yield n
        n -= 1

total = 0
for v in countdown(4):
    total += v
total
";
    assert_eq!(eval(source), Object::Int(10));
}

#[test]
fn next_builtin_and_stop_iteration() {
    let source = "\
def gen():
    yield 'only'

g = gen()
first = next(g)
fallback = next(g, 'done')
[first, fallback]
";
    assert_eq!(
        eval(source),
        Object::List(vec![Object::String("only".into()), Object::String("done".into())])
    );

    let err = run(
        "def gen():\n    yield 1\n\ng = gen()\nnext(g)\nnext(g)\n",
        RunOptions::new(),
    )
    .unwrap_err();
    assert!(err.message.starts_with("StopIteration"));
}

#[test]
fn generator_expressions_feed_builtins() {
    assert_eq!(eval("sum(x * x for x in range(4))"), Object::Int(14));
    assert_eq!(eval("list(c for c in 'abc')"), Object::List(vec![
        Object::String("a".into()),
        Object::String("b".into()),
        Object::String("c".into())
    ]));
}

#[test]
fn generator_return_ends_iteration() {
    let source = "\
def gen(stop):
    for i in range(10):
        if i == stop:
            return
        yield i

list(gen(3))
";
    assert_eq!(
        eval(source),
        Object::List(vec![Object::Int(0), Object::Int(1), Object::Int(2)])
    );
}

#[test]
fn break_inside_generator_loop_across_suspensions() {
    let program = routed(
        "def gen():\n    for i in range(10):\n        if i == 3:\n            break\n        yield i\n    yield 'tail'\n",
    );
    assert_eq!(stream_all(&program, usize::MAX), vec!["0", "1", "2", "tail"]);
}

#[test]
fn finally_runs_once_at_exhaustion_not_per_yield() {
    let program = routed(
        "def gen():\n    try:\n        yield 1\n        yield 2\n    finally:\n        print('cleanup')\n",
    );
    let mut app = App::new(&program, RunOptions::new()).unwrap();
    {
        let mut stream = app.handle_stream(&Request::get("/gen")).unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), "1");
    }
    // Abandoned mid-stream: the generator never exited its try, so finally
    // has not run.
    assert!(app.context().output().is_empty());

    let chunks: Vec<String> = app
        .handle_stream(&Request::get("/gen"))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(chunks, vec!["1", "2"]);
    assert_eq!(app.context().output(), ["cleanup"]);
}

#[test]
fn exception_after_resume_is_still_caught() {
    let program = routed(
        "def gen():\n    try:\n        yield 'a'\n        raise ValueError('late')\n        yield 'never'\n    except ValueError as e:\n        yield 'caught: ' + e\n    finally:\n        print('cleanup')\n",
    );
    let mut app = App::new(&program, RunOptions::new()).unwrap();
    let chunks: Vec<String> = app
        .handle_stream(&Request::get("/gen"))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(chunks, vec!["a", "caught: late"]);
    assert_eq!(app.context().output(), ["cleanup"]);
}

#[test]
fn yield_inside_finally_block() {
    let program = routed("def gen():\n    try:\n        yield 1\n    finally:\n        yield 2\n");
    assert_eq!(stream_all(&program, usize::MAX), vec!["1", "2"]);
}

#[test]
fn loop_yields_inside_try_keep_handler_protection() {
    let program = routed(
        "def gen():\n    try:\n        for i in range(4):\n            if i == 2:\n                raise ValueError(str(i))\n            yield i\n    except ValueError as e:\n        yield 'stopped at ' + e\n",
    );
    assert_eq!(stream_all(&program, usize::MAX), vec!["0", "1", "stopped at 2"]);
}

#[test]
fn exception_inside_generator_propagates() {
    let err = run(
        "def gen():\n    yield 1\n    raise ValueError('mid-stream')\n\nlist(gen())\n",
        RunOptions::new(),
    )
    .unwrap_err();
    assert_eq!(err.message, "ValueError: mid-stream");
}

#[test]
fn eager_infinite_generator_hits_budget() {
    let err = run(
        "def gen():\n    while True:\n        yield 1\n\nlist(gen())\n",
        RunOptions::new().timeout_ms(50),
    )
    .unwrap_err();
    assert_eq!(err.kind, krait::ErrorKind::Timeout);
}
