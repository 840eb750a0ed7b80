use std::cell::RefCell;
use std::rc::Rc;

use miniscript::interpreter::Interpreter;
use miniscript::value::Value;

struct Session {
    interpreter: Interpreter,
    stdout: Rc<RefCell<String>>,
    stderr: Rc<RefCell<String>>,
}

impl Session {
    fn new() -> Self {
        let stdout = Rc::new(RefCell::new(String::new()));
        let stderr = Rc::new(RefCell::new(String::new()));
        let out = stdout.clone();
        let err = stderr.clone();
        let mut interpreter = Interpreter::with_outputs(
            "",
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
        interpreter.implicit_output = Some(interpreter.standard_output.clone());
        Self {
            interpreter,
            stdout,
            stderr,
        }
    }

    fn line(&mut self, source: &str) {
        self.interpreter.repl(source, 60.0);
    }

    fn stdout(&self) -> String {
        self.stdout.borrow().clone()
    }

    fn stderr(&self) -> String {
        self.stderr.borrow().clone()
    }
}

#[test]
fn implicit_results_are_printed() {
    let mut session = Session::new();
    session.line("6*7");
    assert_eq!(session.stdout(), "42\n");
    assert_eq!(session.stderr(), "");
}

#[test]
fn assignments_print_nothing() {
    let mut session = Session::new();
    session.line("x = 5");
    assert_eq!(session.stdout(), "");
}

#[test]
fn print_results_are_not_echoed_again() {
    let mut session = Session::new();
    session.line("print 5");
    assert_eq!(session.stdout(), "5\n");
}

#[test]
fn line_continuation_buffers_input() {
    let mut session = Session::new();
    session.line("x = 1 +");
    assert!(session.interpreter.need_more_input());
    session.line("2");
    assert!(!session.interpreter.need_more_input());
    session.line("print x");
    assert_eq!(session.stdout(), "3\n");
}

#[test]
fn multi_line_function_definition() {
    let mut session = Session::new();
    session.line("f = function(x)");
    assert!(session.interpreter.need_more_input());
    session.line("return x * 2");
    session.line("end function");
    assert!(!session.interpreter.need_more_input());
    session.line("print f(21)");
    assert_eq!(session.stdout(), "42\n");
}

#[test]
fn multi_line_blocks_run_when_closed() {
    let mut session = Session::new();
    session.line("if 1 > 2 then");
    assert!(session.interpreter.need_more_input());
    session.line("print \"impossible\"");
    session.line("end if");
    session.line("print \"after\"");
    assert_eq!(session.stdout(), "after\n");
}

#[test]
fn errors_are_reported_and_recovered_from() {
    let mut session = Session::new();
    session.line("print bogus");
    assert!(session.stderr().contains("Undefined Identifier"));
    session.line("print 5");
    assert_eq!(session.stdout(), "5\n");
}

#[test]
fn state_persists_between_lines() {
    let mut session = Session::new();
    session.line("a = [1, 2]");
    session.line("a.push 3");
    session.line("print a");
    assert_eq!(session.stdout(), "[1, 2, 3]\n");
}

#[test]
fn global_values_are_reachable_from_the_host() {
    let mut session = Session::new();
    session
        .interpreter
        .set_global_value("x", Value::number(5.0))
        .unwrap();
    session.line("print x * 2");
    assert_eq!(session.stdout(), "10\n");
    let x = session.interpreter.get_global_value("x").unwrap();
    assert_eq!(x.double_value(), 5.0);
    let a = session.interpreter.get_global_value("a");
    assert!(a.is_none());
}
