//! End-to-end tests of the public run API.

use krait::{ErrorKind, Object, RunOptions, RunOutcome, compile, run, run_ast};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Object {
    match run(source, RunOptions::new()).expect("run failed") {
        RunOutcome::Complete { value, .. } => value,
        RunOutcome::Suspended { .. } => panic!("unexpected suspension"),
    }
}

fn eval_err(source: &str) -> krait::Error {
    run(source, RunOptions::new()).expect_err("expected an error")
}

#[test]
fn arithmetic_expression() {
    assert_eq!(eval("2 + 3"), Object::Int(5));
}

#[test]
fn sorted_builtin() {
    assert_eq!(
        eval("sorted([3, 1, 2])"),
        Object::List(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
}

#[test]
fn function_composition() {
    let source = "\
def add(a, b):
    return a + b

def multiply(x, y):
    return x * y

multiply(add(3, 4), 5)
";
    assert_eq!(eval(source), Object::Int(35));
}

#[test]
fn haversine_distances() {
    let source = r#"
import math

airports = {
    "JFK": (40.6392, -73.7639),
    "LAX": (33.9382, -118.3866),
    "PDX": (45.5958, -122.6092),
}

def distance(a, b):
    lat1, lon1 = airports[a]
    lat2, lon2 = airports[b]
    radius = 3440.065
    phi1 = math.radians(lat1)
    phi2 = math.radians(lat2)
    dphi = math.radians(lat2 - lat1)
    dlam = math.radians(lon2 - lon1)
    h = math.sin(dphi / 2) ** 2 + math.cos(phi1) * math.cos(phi2) * math.sin(dlam / 2) ** 2
    return round(2 * radius * math.asin(math.sqrt(h)))

{"JFK-LAX": distance("JFK", "LAX"), "JFK-PDX": distance("JFK", "PDX"), "PDX-LAX": distance("PDX", "LAX")}
"#;
    assert_eq!(
        eval(source),
        Object::Dict(vec![
            (Object::String("JFK-LAX".into()), Object::Int(2146)),
            (Object::String("JFK-PDX".into()), Object::Int(2128)),
            (Object::String("PDX-LAX".into()), Object::Int(726)),
        ])
    );
}

#[test]
fn class_fields() {
    let source = r#"
class Article:
    def __init__(self, title, slug):
        self.title = title
        self.slug = slug

article = Article("Hello World", "hello-world")
[article.title, article.slug]
"#;
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::String("Hello World".into()),
            Object::String("hello-world".into())
        ])
    );
}

#[test]
fn empty_program_is_none() {
    assert_eq!(eval(""), Object::None);
    assert_eq!(eval("\n\n# only a comment\n"), Object::None);
}

#[test]
fn ast_run_equals_source_run() {
    let sources = [
        "2 + 3",
        "x = [i * i for i in range(5)]\nsum(x)",
        "def f(n):\n    return n + 1\nf(41)",
    ];
    for source in sources {
        let ast = compile(source).unwrap();
        let from_ast = match run_ast(&ast, RunOptions::new()).unwrap() {
            RunOutcome::Complete { value, .. } => value,
            RunOutcome::Suspended { .. } => panic!(),
        };
        assert_eq!(from_ast, eval(source), "mismatch for {source:?}");
    }
}

#[test]
fn compile_returns_errors_as_values() {
    for bad in ["def f(:", "if x", "1 +", "a = = 1", "while:", "(((", "x = 'open"] {
        let err = compile(bad).expect_err("expected syntax error");
        assert_eq!(err.kind, ErrorKind::Syntax, "for {bad:?}");
        assert!(err.line.is_some(), "syntax error must carry a line for {bad:?}");
    }
}

#[test]
fn deeply_nested_blocks_return_error_not_overflow() {
    let mut source = String::new();
    for depth in 0..300 {
        source.push_str(&"    ".repeat(depth));
        source.push_str("if True:\n");
    }
    source.push_str(&"    ".repeat(300));
    source.push_str("pass\n");
    let err = compile(&source).expect_err("expected a nesting error");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(err.line.is_some());
}

#[test]
fn runtime_errors_carry_lines() {
    let err = eval_err("x = 1\ny = unknown_name\n");
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert_eq!(err.line, Some(2));
    assert_eq!(err.message, "NameError: name 'unknown_name' is not defined");
}

#[test]
fn zero_division_regardless_of_signs() {
    for source in ["1 / 0", "-1 / 0", "1.5 / 0.0", "7 // 0", "7 % 0"] {
        let err = eval_err(source);
        assert!(
            err.message.starts_with("ZeroDivisionError:"),
            "got {} for {source:?}",
            err.message
        );
    }
}

#[test]
fn cross_type_comparison_semantics() {
    assert_eq!(eval("1 == 'a'"), Object::Bool(false));
    assert_eq!(eval("1 == True"), Object::Bool(true));
    assert_eq!(eval("1.0 == 1"), Object::Bool(true));
    let err = eval_err("1 < 'a'");
    assert_eq!(
        err.message,
        "TypeError: '<' not supported between instances of 'int' and 'str'"
    );
}

#[test]
fn negative_indexing_and_bounds() {
    assert_eq!(eval("[10, 20, 30][-1]"), Object::Int(30));
    assert_eq!(eval("'hello'[-2]"), Object::String("l".into()));
    let err = eval_err("[1, 2][5]");
    assert!(err.message.starts_with("IndexError:"));
}

#[test]
fn type_error_message_quality() {
    let err = eval_err("1 + 'a'");
    assert_eq!(
        err.message,
        "TypeError: unsupported operand type(s) for +: 'int' and 'str'"
    );
}

#[test]
fn dict_preserves_insertion_order() {
    assert_eq!(
        eval("list({'z': 1, 'a': 2, 'm': 3}.keys())"),
        Object::List(vec![
            Object::String("z".into()),
            Object::String("a".into()),
            Object::String("m".into())
        ])
    );
    // Comprehension order follows iteration order.
    assert_eq!(
        eval("list({k: k for k in ['b', 'c', 'a']}.keys())"),
        Object::List(vec![
            Object::String("b".into()),
            Object::String("c".into()),
            Object::String("a".into())
        ])
    );
}

#[test]
fn dict_keys_use_python_equality() {
    assert_eq!(eval("d = {1: 'one', True: 'true', 1.0: 'float'}\nlen(d)"), Object::Int(1));
    assert_eq!(eval("{1: 'x'}[True]"), Object::String("x".into()));
}

#[test]
fn repr_round_trips_for_serialisable_primitives() {
    for literal in ["42", "-7", "2.5", "'text'", "True", "None", "[1, 'a', None, [2.5]]"] {
        let original = eval(literal);
        let round_tripped = eval(&format!("repr({literal})"));
        let Object::String(repr_text) = round_tripped else {
            panic!("repr did not return a string")
        };
        assert_eq!(eval(&repr_text), original, "repr round trip failed for {literal}");
    }
}

#[test]
fn floor_division_and_modulo_identity() {
    let source = "\
checks = []
for a in [-9, -4, -1, 0, 1, 5, 13]:
    for b in [-5, -2, -1, 1, 3, 7]:
        checks.append((a // b) * b + (a % b) == a)
all(checks)
";
    assert_eq!(eval(source), Object::Bool(true));
    // The remainder takes the divisor's sign.
    assert_eq!(eval("-7 % 2"), Object::Int(1));
    assert_eq!(eval("7 % -2"), Object::Int(-1));
}

#[test]
fn arbitrary_precision_integers() {
    assert_eq!(
        eval("2 ** 100"),
        Object::BigInt("1267650600228229401496703205376".parse().unwrap())
    );
    assert_eq!(eval("(2 ** 100) % 97"), Object::Int(16));
}

#[test]
fn output_capture() {
    let outcome = run("print('a', 1, sep='-')\nprint('b')", RunOptions::new()).unwrap();
    assert_eq!(outcome.context().output(), ["a-1", "b"]);
}

#[test]
fn string_and_list_repetition_commute() {
    assert_eq!(eval("'ab' * 3 == 3 * 'ab'"), Object::Bool(true));
    assert_eq!(eval("[0] * 2 + 2 * [1]"), Object::List(vec![
        Object::Int(0),
        Object::Int(0),
        Object::Int(1),
        Object::Int(1)
    ]));
}

#[test]
fn timeout_surfaces_as_timeout_kind() {
    let err = run("while True:\n    pass\n", RunOptions::new().timeout_ms(30)).expect_err("must time out");
    assert_eq!(err.kind, ErrorKind::Timeout);
    // Budget exhaustion is not catchable by user code.
    let err = run(
        "try:\n    while True:\n        pass\nexcept Exception:\n    x = 'caught'\n",
        RunOptions::new().timeout_ms(30),
    )
    .expect_err("must time out despite except");
    assert_eq!(err.kind, ErrorKind::Timeout);
}

#[test]
fn recursion_limit_is_catchable() {
    let source = "\
def loop():
    return loop()

try:
    loop()
except RecursionError:
    result = 'caught'
result
";
    assert_eq!(eval(source), Object::String("caught".into()));
}
