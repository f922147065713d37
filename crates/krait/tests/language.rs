//! Statement and expression semantics: control flow, classes, scopes,
//! pattern matching, f-strings.

use krait::{Object, RunOptions, RunOutcome, run};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> Object {
    match run(source, RunOptions::new()).expect("run failed") {
        RunOutcome::Complete { value, .. } => value,
        RunOutcome::Suspended { .. } => panic!("unexpected suspension"),
    }
}

fn eval_str(source: &str) -> String {
    match eval(source) {
        Object::String(s) => s,
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn try_except_binds_message() {
    let source = "\
try:
    1 / 0
except ZeroDivisionError as e:
    result = 'caught: ' + e
result
";
    assert_eq!(eval_str(source), "caught: division by zero");
}

#[test]
fn except_matches_by_inheritance() {
    let source = "\
try:
    {}['missing']
except LookupError:
    result = 'lookup'
result
";
    assert_eq!(eval_str(source), "lookup");

    let source = "\
class AppError(ValueError):
    pass

try:
    raise AppError('bad input')
except ValueError as e:
    result = e
result
";
    assert_eq!(eval_str(source), "bad input");
}

#[test]
fn except_tuple_and_else() {
    let source = "\
log = []
try:
    log.append('body')
except (KeyError, IndexError):
    log.append('handler')
else:
    log.append('else')
finally:
    log.append('finally')
log
";
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::String("body".into()),
            Object::String("else".into()),
            Object::String("finally".into())
        ])
    );
}

#[test]
fn finally_overrides_return() {
    let source = "\
def f():
    try:
        return 1
    finally:
        return 2
f()
";
    assert_eq!(eval(source), Object::Int(2));
}

#[test]
fn finally_runs_on_break() {
    let source = "\
log = []
for i in range(3):
    try:
        if i == 1:
            break
    finally:
        log.append(i)
log
";
    assert_eq!(eval(source), Object::List(vec![Object::Int(0), Object::Int(1)]));
}

#[test]
fn bare_raise_reraises() {
    let source = "\
try:
    try:
        raise ValueError('original')
    except ValueError:
        raise
except ValueError as e:
    result = e
result
";
    assert_eq!(eval_str(source), "original");
}

#[test]
fn with_calls_exit_and_can_swallow() {
    let source = "\
class Tracker:
    def __init__(self):
        self.events = []
    def __enter__(self):
        self.events.append('enter')
        return self
    def __exit__(self, exc_type, exc, tb):
        self.events.append('exit')
        return True

t = Tracker()
with t as handle:
    handle.events.append('body')
    raise ValueError('swallowed')
t.events
";
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::String("enter".into()),
            Object::String("body".into()),
            Object::String("exit".into())
        ])
    );
}

#[test]
fn loop_else_clauses() {
    let source = "\
found = 'no break'
for i in range(5):
    if i == 10:
        found = 'broke'
        break
else:
    found = 'else ran'
found
";
    assert_eq!(eval_str(source), "else ran");

    let source = "\
result = []
for i in range(5):
    if i == 2:
        break
else:
    result.append('else')
result
";
    assert_eq!(eval(source), Object::List(vec![]));
}

#[test]
fn while_else_runs_without_break() {
    let source = "\
n = 0
while n < 3:
    n += 1
else:
    n = n * 10
n
";
    assert_eq!(eval(source), Object::Int(30));
}

#[test]
fn match_statement_full_pattern_set() {
    let source = r#"
def describe(value):
    match value:
        case 0:
            return "zero"
        case [x, y]:
            return "pair"
        case [first, *rest]:
            return "list of " + str(1 + len(rest))
        case {"kind": kind, **extra}:
            return "mapping " + kind
        case str() if len(value) > 3:
            return "long string"
        case 1 | 2 | 3:
            return "small"
        case _:
            return "other"

[describe(0), describe([1, 2]), describe([1, 2, 3]), describe({"kind": "x", "other": 1}),
 describe("hello"), describe(2), describe(9.5)]
"#;
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::String("zero".into()),
            Object::String("pair".into()),
            Object::String("list of 3".into()),
            Object::String("mapping x".into()),
            Object::String("long string".into()),
            Object::String("small".into()),
            Object::String("other".into())
        ])
    );
}

#[test]
fn match_class_pattern() {
    let source = r#"
class Point:
    __match_args__ = ("x", "y")
    def __init__(self, x, y):
        self.x = x
        self.y = y

def where(p):
    match p:
        case Point(0, 0):
            return "origin"
        case Point(0, y=y):
            return "y-axis at " + str(y)
        case Point(x, y):
            return str(x) + "," + str(y)

[where(Point(0, 0)), where(Point(0, 5)), where(Point(2, 3))]
"#;
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::String("origin".into()),
            Object::String("y-axis at 5".into()),
            Object::String("2,3".into())
        ])
    );
}

#[test]
fn class_inheritance_depth_first() {
    let source = "\
class A:
    def who(self):
        return 'A'

class B(A):
    pass

class C(A):
    def who(self):
        return 'C'

class D(B, C):
    pass

D().who()
";
    // Depth-first left-to-right: D -> B -> A.
    assert_eq!(eval_str(source), "A");
}

#[test]
fn dunder_operators_on_instances() {
    let source = "\
class Vec:
    def __init__(self, x, y):
        self.x = x
        self.y = y
    def __add__(self, other):
        return Vec(self.x + other.x, self.y + other.y)
    def __eq__(self, other):
        return self.x == other.x and self.y == other.y
    def __str__(self):
        return 'Vec(' + str(self.x) + ', ' + str(self.y) + ')'

v = Vec(1, 2) + Vec(3, 4)
[str(v), v == Vec(4, 6)]
";
    assert_eq!(
        eval(source),
        Object::List(vec![Object::String("Vec(4, 6)".into()), Object::Bool(true)])
    );
}

#[test]
fn closures_capture_by_snapshot() {
    let source = "\
def make_adder(n):
    def adder(x):
        return x + n
    return adder

add5 = make_adder(5)
add10 = make_adder(10)
[add5(1), add10(1)]
";
    assert_eq!(eval(source), Object::List(vec![Object::Int(6), Object::Int(11)]));
}

#[test]
fn global_declaration() {
    let source = "\
counter = 0

def bump():
    global counter
    counter = counter + 1

bump()
bump()
counter
";
    assert_eq!(eval(source), Object::Int(2));
}

#[test]
fn recursive_nested_function() {
    let source = "\
def make():
    def fact(n):
        if n <= 1:
            return 1
        return n * fact(n - 1)
    return fact

make()(5)
";
    assert_eq!(eval(source), Object::Int(120));
}

#[test]
fn comprehension_scope_does_not_leak_loop_var() {
    let source = "\
x = 'outer'
squares = [x * x for x in range(4)]
[x, squares]
";
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::String("outer".into()),
            Object::List(vec![Object::Int(0), Object::Int(1), Object::Int(4), Object::Int(9)])
        ])
    );
}

#[test]
fn walrus_binds_and_yields() {
    let source = "\
if (n := 10) > 5:
    result = n * 2
result
";
    assert_eq!(eval(source), Object::Int(20));
}

#[test]
fn chained_comparison_short_circuits() {
    let source = "\
calls = []

def note(v):
    calls.append(v)
    return v

result = note(1) < note(0) < note(2)
[result, calls]
";
    // The third operand never evaluates.
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::Bool(false),
            Object::List(vec![Object::Int(1), Object::Int(0)])
        ])
    );
}

#[test]
fn boolean_operators_return_operands() {
    assert_eq!(eval("0 or 'fallback'"), Object::String("fallback".into()));
    assert_eq!(eval("'first' or 'second'"), Object::String("first".into()));
    assert_eq!(eval("1 and [2]"), Object::List(vec![Object::Int(2)]));
    assert_eq!(eval("'' and 'unreached'"), Object::String("".into()));
}

#[test]
fn fstring_interpolation() {
    assert_eq!(eval_str("name = 'world'\nf'hello {name}!'"), "hello world!");
    assert_eq!(eval_str("total = 3.14159\nf'{total:.2f}'"), "3.14");
    assert_eq!(eval_str("d = {'k': 7}\nf\"value={d['k']}\""), "value=7");
    assert_eq!(eval_str("x = 'abc'\nf'{x!r}'"), "'abc'");
    assert_eq!(eval_str("f'{{literal}}'"), "{literal}");
    assert_eq!(eval_str("f'{1 + 2}'"), "3");
}

#[test]
fn fstring_honors_user_str() {
    let source = "\
class Tag:
    def __init__(self, name):
        self.name = name
    def __str__(self):
        return '#' + self.name

f'tag: {Tag(\"rust\")}'
";
    assert_eq!(eval_str(source), "tag: #rust");
}

#[test]
fn string_methods_chain() {
    assert_eq!(eval_str("'  a,b,c '.strip().split(',')[1]"), "b");
    assert_eq!(eval_str("'-'.join(['x', 'y', 'z'])"), "x-y-z");
    assert_eq!(eval_str("'{} and {}'.format('a', 'b')"), "a and b");
}

#[test]
fn tuple_unpacking() {
    assert_eq!(eval("a, b = 1, 2\nb, a = a, b\n[a, b]"), Object::List(vec![
        Object::Int(2),
        Object::Int(1)
    ]));
    let err = run("a, b = [1, 2, 3]", RunOptions::new()).unwrap_err();
    assert_eq!(err.message, "ValueError: too many values to unpack (expected 2)");
}

#[test]
fn multi_target_and_augmented_assignment() {
    assert_eq!(eval("a = b = 5\na + b"), Object::Int(10));
    assert_eq!(eval("x = 10\nx //= 3\nx"), Object::Int(3));
    assert_eq!(eval("items = [1]\nitems += [2]\nitems"), Object::List(vec![
        Object::Int(1),
        Object::Int(2)
    ]));
}

#[test]
fn del_statement() {
    let source = "\
d = {'a': 1, 'b': 2}
del d['a']
items = [1, 2, 3]
del items[0]
[d, items]
";
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::Dict(vec![(Object::String("b".into()), Object::Int(2))]),
            Object::List(vec![Object::Int(2), Object::Int(3)])
        ])
    );
    let err = run("x = 1\ndel x\nx", RunOptions::new()).unwrap_err();
    assert!(err.message.starts_with("NameError:"));
}

#[test]
fn lambda_and_higher_order_builtins() {
    assert_eq!(
        eval("list(map(lambda x: x * 2, [1, 2, 3]))"),
        Object::List(vec![Object::Int(2), Object::Int(4), Object::Int(6)])
    );
    assert_eq!(
        eval("sorted(['bb', 'a', 'ccc'], key=lambda s: len(s), reverse=True)"),
        Object::List(vec![
            Object::String("ccc".into()),
            Object::String("bb".into()),
            Object::String("a".into())
        ])
    );
    assert_eq!(
        eval("max([(1, 'a'), (3, 'b'), (2, 'c')], key=lambda p: p[0])"),
        Object::Tuple(vec![Object::Int(3), Object::String("b".into())])
    );
}

#[test]
fn star_args_and_kwargs() {
    let source = "\
def describe(first, *rest, sep=', ', **extra):
    parts = [str(first)]
    for item in rest:
        parts.append(str(item))
    if len(extra) > 0:
        parts.append('extra=' + str(len(extra)))
    return sep.join(parts)

[describe(1, 2, 3), describe(1, sep='-'), describe(1, 2, tag='x')]
";
    assert_eq!(
        eval(source),
        Object::List(vec![
            Object::String("1, 2, 3".into()),
            Object::String("1".into()),
            Object::String("1, 2, extra=1".into())
        ])
    );
}

#[test]
fn call_spread_arguments() {
    let source = "\
def add3(a, b, c):
    return a + b + c

args = [1, 2]
kwargs = {'c': 3}
add3(*args, **kwargs)
";
    assert_eq!(eval(source), Object::Int(6));
}

#[test]
fn default_values_evaluate_at_call_time() {
    let source = "\
base = 10

def offset(x, delta=base):
    return x + delta

first = offset(1)
base = 100
second = offset(1)
[first, second]
";
    assert_eq!(eval(source), Object::List(vec![Object::Int(11), Object::Int(101)]));
}

#[test]
fn decorators_wrap_in_order() {
    let source = "\
def exclaim(f):
    def wrapped(x):
        return f(x) + '!'
    return wrapped

def shout(f):
    def wrapped(x):
        return f(x).upper()
    return wrapped

@exclaim
@shout
def greet(name):
    return 'hello ' + name

greet('world')
";
    assert_eq!(eval_str(source), "HELLO WORLD!");
}

#[test]
fn ternary_and_slicing() {
    assert_eq!(eval_str("'yes' if 2 > 1 else 'no'"), "yes");
    assert_eq!(eval_str("'abcdef'[1:4]"), "bcd");
    assert_eq!(eval_str("'abcdef'[::-1]"), "fedcba");
    assert_eq!(
        eval("list(range(10))[2:8:2]"),
        Object::List(vec![Object::Int(2), Object::Int(4), Object::Int(6)])
    );
}

#[test]
fn exception_instances_as_values() {
    let source = "\
e = ValueError('stored')
try:
    raise e
except ValueError as caught:
    result = caught
result
";
    assert_eq!(eval_str(source), "stored");
    assert_eq!(eval_str("str(ValueError('msg'))"), "msg");
    assert_eq!(eval("isinstance(ValueError('x'), Exception)"), Object::Bool(true));
}

#[test]
fn assert_statement() {
    assert_eq!(eval("assert 1 == 1\n'ok'"), Object::String("ok".into()));
    let err = run("assert 1 == 2, 'values differ'", RunOptions::new()).unwrap_err();
    assert_eq!(err.message, "AssertionError: values differ");
}
