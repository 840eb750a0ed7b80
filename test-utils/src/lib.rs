//! Helpers for integration tests: run MiniScript source through the public
//! interpreter API and capture everything it writes to its output sinks.

use std::cell::RefCell;
use std::rc::Rc;

use miniscript::interpreter::Interpreter;

pub struct Expected<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
}

/// Compile and run `source` to completion, returning (stdout, stderr). Each
/// print call becomes one line.
pub fn run_source(source: &str) -> (String, String) {
    let stdout = Rc::new(RefCell::new(String::new()));
    let stderr = Rc::new(RefCell::new(String::new()));

    let out = stdout.clone();
    let err = stderr.clone();
    let mut interpreter = Interpreter::with_outputs(
        source,
        Rc::new(move |s: &str| {
            let mut out = out.borrow_mut();
            out.push_str(s);
            out.push('\n');
        }),
        Rc::new(move |s: &str| {
            let mut err = err.borrow_mut();
            err.push_str(s);
            err.push('\n');
        }),
    );

    match interpreter.compile() {
        Ok(()) => {
            // errors stop the machine, so this always terminates for the
            // sources under test
            for _ in 0..100 {
                if interpreter.is_done() {
                    break;
                }
                interpreter.run_until_done(5.0, false);
            }
        }
        Err(e) => {
            let mut err = stderr.borrow_mut();
            err.push_str(&e.to_string());
            err.push('\n');
        }
    }

    let result = (stdout.borrow().clone(), stderr.borrow().clone());
    result
}

pub fn check_output(source: &str, expected: Expected) {
    let (stdout, stderr) = run_source(source);
    assert_eq!(stdout, expected.stdout, "stdout mismatch for:\n{source}");
    assert_eq!(stderr, expected.stderr, "stderr mismatch for:\n{source}");
}

/// Expect the program to fail, with stderr containing `needle`.
pub fn check_error_contains(source: &str, needle: &str) {
    let (_, stderr) = run_source(source);
    assert!(
        stderr.contains(needle),
        "stderr {stderr:?} does not contain {needle:?} for:\n{source}"
    );
}
