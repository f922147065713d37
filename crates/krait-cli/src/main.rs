use std::{env, fs, process::ExitCode, time::Instant};

use krait::{RunOptions, RunOutcome, run};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: krait <script.py> [timeout_ms]");
        return ExitCode::FAILURE;
    };
    let code = match fs::read_to_string(file_path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: cannot read {file_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut options = RunOptions::new();
    if let Some(timeout) = args.get(2).and_then(|t| t.parse().ok()) {
        options = options.timeout_ms(timeout);
    }

    let start = Instant::now();
    match run(&code, options) {
        Ok(RunOutcome::Complete { value, context }) => {
            let elapsed = start.elapsed();
            for line in context.output() {
                println!("{line}");
            }
            eprintln!("success after {elapsed:?}");
            println!("{value:?}");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Suspended { .. }) => {
            eprintln!("program suspended; the CLI does not resume snapshots");
            ExitCode::FAILURE
        }
        Err(err) => {
            let elapsed = start.elapsed();
            eprintln!("error after {elapsed:?} [{}]\n{err}", err.kind);
            ExitCode::FAILURE
        }
    }
}
