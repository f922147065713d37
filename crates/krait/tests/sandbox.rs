//! Capability sandboxing: filesystem, environment, imports, custom modules,
//! events, profiling, and snapshot/resume.

use krait::{
    CustomModule, ErrorKind, EventKind, MemoryFs, NetworkPolicy, Object, RunOptions, RunOutcome, resume, run,
    snapshot,
};
use pretty_assertions::assert_eq;

fn complete(outcome: RunOutcome) -> (Object, krait::Context) {
    match outcome {
        RunOutcome::Complete { value, context } => (value, context),
        RunOutcome::Suspended { .. } => panic!("unexpected suspension"),
    }
}

#[test]
fn file_io_round_trip_through_memory_fs() {
    let source = "\
with open('notes.txt', 'w') as f:
    f.write('line one\\n')
    f.write('line two\\n')

with open('notes.txt') as f:
    lines = f.readlines()

len(lines)
";
    let (value, context) = complete(run(source, RunOptions::new()).unwrap());
    assert_eq!(value, Object::Int(2));
    assert_eq!(
        context.memory_fs().unwrap().get("notes.txt"),
        Some("line one\nline two\n")
    );
}

#[test]
fn seeded_filesystem_is_readable() {
    let mut fs = MemoryFs::new();
    fs.seed("data/config.json", r#"{"retries": 3}"#);
    let source = "\
import json

with open('data/config.json') as f:
    config = json.loads(f.read())

config['retries']
";
    let (value, _) = complete(run(source, RunOptions::new().memory_fs(fs)).unwrap());
    assert_eq!(value, Object::Int(3));
}

#[test]
fn missing_file_is_catchable() {
    let source = "\
try:
    open('nope.txt')
except FileNotFoundError as e:
    result = 'missing'
result
";
    let (value, _) = complete(run(source, RunOptions::new()).unwrap());
    assert_eq!(value, Object::String("missing".into()));
}

#[test]
fn uncaught_io_error_surfaces_as_io_kind() {
    let err = run("open('nope.txt')", RunOptions::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Io);
    assert!(err.message.starts_with("FileNotFoundError:"));
}

#[test]
fn environment_variables_through_os() {
    let source = "\
import os

[os.environ['MODE'], os.getenv('MISSING', 'default')]
";
    let (value, _) = complete(run(source, RunOptions::new().env("MODE", "test")).unwrap());
    assert_eq!(
        value,
        Object::List(vec![Object::String("test".into()), Object::String("default".into())])
    );
}

#[test]
fn custom_modules_override_and_extend() {
    let options = RunOptions::new().module(
        "helpers",
        CustomModule::new()
            .value("GREETING", Object::String("hello".into()))
            .func("double", |args| match args.first() {
                Some(Object::Int(n)) => Ok(Object::Int(n * 2)),
                _ => Err("TypeError: double() requires an int".to_string()),
            }),
    );
    let source = "\
import helpers

[helpers.GREETING, helpers.double(21)]
";
    let (value, _) = complete(run(source, options).unwrap());
    assert_eq!(
        value,
        Object::List(vec![Object::String("hello".into()), Object::Int(42)])
    );
}

#[test]
fn custom_module_errors_are_catchable_python_exceptions() {
    let options = RunOptions::new().module(
        "helpers",
        CustomModule::new().func("double", |args| match args.first() {
            Some(Object::Int(n)) => Ok(Object::Int(n * 2)),
            _ => Err("TypeError: double() requires an int".to_string()),
        }),
    );
    let source = "\
import helpers

try:
    helpers.double('not an int')
except TypeError as e:
    result = e
result
";
    let (value, _) = complete(run(source, options).unwrap());
    assert_eq!(value, Object::String("double() requires an int".into()));
}

#[test]
fn filesystem_source_imports_are_cached() {
    let mut fs = MemoryFs::new();
    fs.seed("util.py", "def triple(x):\n    return x * 3\n\ncalls = 0\n");
    let source = "\
import util
from util import triple

[util.triple(4), triple(5)]
";
    let (value, context) = complete(run(source, RunOptions::new().memory_fs(fs)).unwrap());
    assert_eq!(value, Object::List(vec![Object::Int(12), Object::Int(15)]));
    // The module body executed once: one filesystem import event.
    let imports = context
        .events()
        .iter()
        .filter(|e| e.kind == EventKind::Import)
        .count();
    assert_eq!(imports, 1);
}

#[test]
fn unknown_import_is_module_not_found() {
    let err = run("import does_not_exist", RunOptions::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Import);
    assert_eq!(err.message, "ModuleNotFoundError: No module named 'does_not_exist'");

    // Catchable from user code.
    let source = "\
try:
    import does_not_exist
except ModuleNotFoundError:
    result = 'caught'
result
";
    let (value, _) = complete(run(source, RunOptions::new()).unwrap());
    assert_eq!(value, Object::String("caught".into()));
}

#[test]
fn module_policy_gates() {
    // sql is denied unless opted in.
    let err = run("import sql", RunOptions::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Import);
    assert!(err.message.contains("disabled by the sandbox policy"));

    // A restricted allow-list blocks other builtin modules.
    let err = run("import math", RunOptions::new().allowed_modules(["json"])).unwrap_err();
    assert!(err.message.contains("disabled by the sandbox policy"));
    let (value, _) = complete(
        run(
            "import json\njson.dumps([1, 2])",
            RunOptions::new().allowed_modules(["json"]),
        )
        .unwrap(),
    );
    assert_eq!(value, Object::String("[1,2]".into()));
}

#[test]
fn network_policy_defaults_to_deny() {
    assert!(!NetworkPolicy::default().allows("GET", "https://example.com/"));
    assert!(NetworkPolicy::AllowAll.allows("POST", "https://example.com/"));
}

#[test]
fn events_are_ordered_and_typed() {
    let source = "\
print('first')
with open('log.txt', 'w') as f:
    f.write('data')
print('second')
";
    let (_, context) = complete(run(source, RunOptions::new()).unwrap());
    let kinds: Vec<EventKind> = context.events().iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::Output));
    assert!(kinds.contains(&EventKind::FileOp));
    let steps: Vec<u64> = context.events().iter().map(|e| e.step).collect();
    let mut sorted = steps.clone();
    sorted.sort_unstable();
    assert_eq!(steps, sorted, "steps must be monotonic");
    assert_eq!(context.output(), ["first", "second"]);
}

#[test]
fn profile_counts_lines_and_calls() {
    let source = "\
def work(n):
    total = 0
    for i in range(n):
        total += i
    return total

work(10)
work(10)
";
    let (_, context) = complete(run(source, RunOptions::new().profile(true)).unwrap());
    let profile = context.profile().expect("profiling enabled");
    assert_eq!(profile.call_counts.get("work"), Some(&2));
    // The accumulator line ran 10 times per call.
    assert_eq!(profile.line_counts.get(&4), Some(&20));
}

#[test]
fn snapshot_resume_matches_uninterrupted_run() {
    let source = "\
print('phase one')
values = [1, 2, 3]
suspend()
print('phase two')
sum(values)
";
    // Uninterrupted reference: strip the suspension point.
    let reference = source.replace("suspend()\n", "");
    let (ref_value, ref_context) = complete(run(&reference, RunOptions::new()).unwrap());

    let RunOutcome::Suspended { context } = run(source, RunOptions::new()).unwrap() else {
        panic!("expected suspension");
    };
    assert_eq!(context.output(), ["phase one"]);
    let bytes = snapshot(&context).unwrap();

    let (value, resumed_context) = complete(resume(source, &bytes, RunOptions::new()).unwrap());
    assert_eq!(value, ref_value);
    assert_eq!(resumed_context.output(), ref_context.output());
}

#[test]
fn snapshot_resume_does_not_duplicate_file_effects() {
    let source = "\
with open('log.txt', 'a') as f:
    f.write('once\\n')
suspend()
with open('log.txt', 'a') as f:
    f.write('twice\\n')
'done'
";
    let RunOutcome::Suspended { context } = run(source, RunOptions::new()).unwrap() else {
        panic!("expected suspension");
    };
    let bytes = snapshot(&context).unwrap();
    let (value, context) = complete(resume(source, &bytes, RunOptions::new()).unwrap());
    assert_eq!(value, Object::String("done".into()));
    assert_eq!(context.memory_fs().unwrap().get("log.txt"), Some("once\ntwice\n"));
}

#[test]
fn repeated_suspensions_resume_in_order() {
    let source = "\
print('one')
suspend()
print('two')
suspend()
print('three')
'finished'
";
    let RunOutcome::Suspended { context } = run(source, RunOptions::new()).unwrap() else {
        panic!("first suspension expected");
    };
    let bytes = snapshot(&context).unwrap();
    let RunOutcome::Suspended { context } = resume(source, &bytes, RunOptions::new()).unwrap() else {
        panic!("second suspension expected");
    };
    assert_eq!(context.output(), ["one", "two"]);
    let bytes = snapshot(&context).unwrap();
    let (value, context) = complete(resume(source, &bytes, RunOptions::new()).unwrap());
    assert_eq!(value, Object::String("finished".into()));
    assert_eq!(context.output(), ["one", "two", "three"]);
}

#[test]
fn seeded_random_is_deterministic() {
    let source = "\
import random

random.seed(7)
[random.randint(1, 100), random.randint(1, 100), random.random() < 1.0]
";
    let (first, _) = complete(run(source, RunOptions::new()).unwrap());
    let (second, _) = complete(run(source, RunOptions::new()).unwrap());
    assert_eq!(first, second);
}

#[test]
fn json_module_round_trip() {
    let source = r#"
import json

data = {"name": "krait", "tags": ["a", "b"], "count": 2}
decoded = json.loads(json.dumps(data))
decoded == data
"#;
    let (value, _) = complete(run(source, RunOptions::new()).unwrap());
    assert_eq!(value, Object::Bool(true));
}
