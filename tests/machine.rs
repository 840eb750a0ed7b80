use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use miniscript::interpreter::Interpreter;
use miniscript::value::Value;

fn capturing_interpreter(source: &str) -> (Interpreter, Rc<RefCell<String>>) {
    let stdout = Rc::new(RefCell::new(String::new()));
    let out = stdout.clone();
    let interpreter = Interpreter::with_outputs(
        source,
        Rc::new(move |s: &str| {
            let mut out = out.borrow_mut();
            out.push_str(s);
            out.push('\n');
        }),
        Rc::new(|s: &str| panic!("unexpected error: {s}")),
    );
    (interpreter, stdout)
}

#[test]
fn yield_suspends_until_the_next_run() {
    let (mut interpreter, stdout) = capturing_interpreter("print 1\nyield\nprint 2");
    interpreter.run_until_done(5.0, false);
    assert!(!interpreter.is_done());
    assert_eq!(*stdout.borrow(), "1\n");
    interpreter.run_until_done(5.0, false);
    assert!(interpreter.is_done());
    assert_eq!(*stdout.borrow(), "1\n2\n");
}

#[test]
fn wait_returns_early_and_resumes_via_partial_result() {
    let (mut interpreter, stdout) = capturing_interpreter("wait 0.05\nprint \"done\"");
    interpreter.run_until_done(5.0, true);
    // the wait is in flight; the host gets control back right away
    assert!(!interpreter.is_done());
    assert_eq!(*stdout.borrow(), "");

    let deadline = Instant::now() + Duration::from_secs(5);
    while !interpreter.is_done() {
        assert!(Instant::now() < deadline, "wait never completed");
        interpreter.run_until_done(1.0, true);
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(*stdout.borrow(), "done\n");
}

#[test]
fn time_limit_interrupts_a_busy_loop() {
    let (mut interpreter, _stdout) = capturing_interpreter("while true\nend while");
    let start = Instant::now();
    interpreter.run_until_done(0.05, false);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!interpreter.is_done());

    interpreter.stop();
    assert!(interpreter.is_done());
}

#[test]
fn restart_runs_the_program_again() {
    let (mut interpreter, stdout) = capturing_interpreter("print \"hi\"");
    interpreter.run_until_done(5.0, false);
    interpreter.restart();
    assert!(!interpreter.is_done());
    interpreter.run_until_done(5.0, false);
    assert_eq!(*stdout.borrow(), "hi\nhi\n");
}

#[test]
fn reset_replaces_the_program() {
    let (mut interpreter, stdout) = capturing_interpreter("print 1");
    interpreter.run_until_done(5.0, false);
    interpreter.reset("print 2");
    interpreter.run_until_done(5.0, false);
    assert_eq!(*stdout.borrow(), "1\n2\n");
}

#[test]
fn stepping_executes_one_line_at_a_time() {
    let (mut interpreter, stdout) = capturing_interpreter("print 1\nprint 2");
    interpreter.compile().unwrap();
    let mut steps = 0;
    while !interpreter.is_done() {
        interpreter.step();
        steps += 1;
        assert!(steps < 100);
    }
    assert_eq!(*stdout.borrow(), "1\n2\n");
    assert!(steps > 2, "each print takes several TAC steps");
}

#[test]
fn manually_push_call_invokes_a_script_function() {
    let (mut interpreter, stdout) =
        capturing_interpreter("f = function()\nprint \"called\"\nend function");
    interpreter.run_until_done(5.0, false);
    assert!(interpreter.is_done());

    let f = interpreter.get_global_value("f").unwrap();
    interpreter
        .machine_mut()
        .unwrap()
        .manually_push_call(&f, Value::Null)
        .unwrap();
    interpreter.run_until_done(5.0, false);
    assert_eq!(*stdout.borrow(), "called\n");
}

#[test]
fn time_intrinsic_advances() {
    let (mut interpreter, stdout) = capturing_interpreter("print time >= 0");
    interpreter.run_until_done(5.0, false);
    assert_eq!(*stdout.borrow(), "1\n");
}

#[test]
fn find_short_name_sees_globals() {
    let (mut interpreter, _stdout) = capturing_interpreter("dog = {\"name\": \"Rex\"}");
    interpreter.run_until_done(5.0, false);
    let dog = interpreter.get_global_value("dog").unwrap();
    let machine = interpreter.machine().unwrap();
    assert_eq!(machine.find_short_name(&dog), Some("dog".to_string()));
    assert_eq!(machine.find_short_name(&Value::number(1.0)), None);
}
