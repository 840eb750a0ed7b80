//! The host API: owns a parser and a machine, and ties them together for
//! one-shot runs, stepping, and the REPL.

use std::rc::Rc;

use log::debug;

use crate::errors::Error;
use crate::machine::{Machine, OutputFn};
use crate::parser::Parser;
use crate::value::Value;

pub struct Interpreter {
    pub standard_output: OutputFn,
    /// When set, bare-expression results are reported here after each REPL
    /// line (and `_` tracking is enabled).
    pub implicit_output: Option<OutputFn>,
    pub error_output: OutputFn,
    source: String,
    parser: Option<Parser>,
    vm: Option<Machine>,
}

impl Interpreter {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_outputs(
            source,
            Rc::new(|s: &str| println!("{s}")),
            Rc::new(|s: &str| eprintln!("{s}")),
        )
    }

    pub fn with_outputs(
        source: impl Into<String>,
        standard_output: OutputFn,
        error_output: OutputFn,
    ) -> Self {
        Self {
            standard_output,
            implicit_output: None,
            error_output,
            source: source.into(),
            parser: None,
            vm: None,
        }
    }

    /// Lex and parse the source, then build the machine. A no-op when
    /// already compiled.
    pub fn compile(&mut self) -> Result<(), Error> {
        if self.vm.is_some() {
            return Ok(());
        }
        // always a fresh parser, so a failed parse can't leave half-compiled
        // lines behind for a retry
        let mut parser = Parser::new();
        parser.parse(&self.source, false)?;
        let code = parser.global_code();
        debug!("compiled {} TAC lines", code.borrow().len());
        self.vm = Some(Machine::new(code, self.standard_output.clone()));
        self.parser = Some(parser);
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.vm.as_ref().map(|vm| vm.done()).unwrap_or(true)
    }

    pub fn need_more_input(&self) -> bool {
        self.parser
            .as_ref()
            .map(|p| p.need_more_input())
            .unwrap_or(false)
    }

    /// Run the compiled program (compiling first if needed) until it
    /// finishes, yields, waits on a partial result (with `return_early`), or
    /// the time limit passes. Errors are reported to `error_output` and stop
    /// the machine.
    pub fn run_until_done(&mut self, time_limit: f64, return_early: bool) {
        if self.vm.is_none() {
            if let Err(e) = self.compile() {
                self.report_error(&e);
                return;
            }
        }
        self.sync_output();
        let vm = self.vm.as_mut().unwrap();
        if let Err(e) = vm.run_until_done(time_limit, return_early) {
            let e = Error::Runtime(e);
            self.report_error(&e);
            self.vm.as_mut().unwrap().stop();
        }
    }

    /// Execute a single TAC line.
    pub fn step(&mut self) {
        if self.vm.is_none() {
            if let Err(e) = self.compile() {
                self.report_error(&e);
                return;
            }
        }
        self.sync_output();
        let vm = self.vm.as_mut().unwrap();
        if let Err(e) = vm.step() {
            let e = Error::Runtime(e);
            self.report_error(&e);
            self.vm.as_mut().unwrap().stop();
        }
    }

    /// Rewind the same program for another run.
    pub fn restart(&mut self) {
        if let Some(vm) = &mut self.vm {
            vm.reset();
        }
    }

    /// Abandon execution and any partially-entered REPL input.
    pub fn stop(&mut self) {
        if let Some(vm) = &mut self.vm {
            vm.stop();
        }
        if let Some(parser) = &mut self.parser {
            parser.partial_reset();
        }
    }

    /// Replace the program entirely.
    pub fn reset(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.parser = None;
        self.vm = None;
    }

    /// Accept one line of REPL input; compiles and runs it (or buffers it,
    /// when incomplete), printing any implicit result. On error the machine
    /// is stopped and incomplete blocks are abandoned, ready for the next
    /// line.
    pub fn repl(&mut self, source_line: &str, time_limit: f64) {
        if self.parser.is_none() {
            self.parser = Some(Parser::new());
        }
        if self.vm.is_none() {
            let code = self.parser.as_ref().unwrap().global_code();
            self.vm = Some(Machine::new(code, self.standard_output.clone()));
        }
        self.sync_output();
        let start_implicit;
        {
            let vm = self.vm.as_mut().unwrap();
            vm.store_implicit = self.implicit_output.is_some();
            start_implicit = vm.global_context().implicit_result_counter;
        }

        if let Err(e) = self.repl_line(source_line, time_limit, start_implicit) {
            self.report_error(&e);
            debug!("REPL recovering after error");
            if let Some(vm) = &mut self.vm {
                vm.stop();
            }
            if let Some(parser) = &mut self.parser {
                parser.partial_reset();
            }
        }
    }

    fn repl_line(
        &mut self,
        source_line: &str,
        time_limit: f64,
        start_implicit: usize,
    ) -> Result<(), Error> {
        let parser = self.parser.as_mut().unwrap();
        parser.parse(source_line, true)?;
        if parser.need_more_input() {
            return Ok(());
        }

        let vm = self.vm.as_mut().unwrap();
        vm.shared.yielding.set(false);
        let start_time = vm.run_time();
        while !vm.done() && !vm.yielding() {
            if vm.run_time() - start_time > time_limit {
                return Ok(());
            }
            vm.step().map_err(Error::Runtime)?;
        }

        if let Some(implicit_out) = &self.implicit_output {
            let vm = self.vm.as_ref().unwrap();
            if vm.global_context().implicit_result_counter > start_implicit {
                if let Some(result) = vm.get_global("_") {
                    // a null implicit result is not worth echoing
                    if !matches!(result, Value::Null) {
                        implicit_out(&vm.describe(&result));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get_global_value(&self, name: &str) -> Option<Value> {
        self.vm.as_ref()?.get_global(name)
    }

    pub fn set_global_value(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.compile()?;
        self.vm
            .as_mut()
            .unwrap()
            .set_global(name, value)
            .map_err(Error::Runtime)
    }

    /// Direct access to the machine, e.g. for `manually_push_call`.
    pub fn machine(&self) -> Option<&Machine> {
        self.vm.as_ref()
    }

    pub fn machine_mut(&mut self) -> Option<&mut Machine> {
        self.vm.as_mut()
    }

    /// Compile (if needed) and render the TAC listing of the global code.
    pub fn tac_listing(&mut self) -> Result<String, Error> {
        self.compile()?;
        Ok(self.vm.as_ref().unwrap().tac_listing())
    }

    fn report_error(&self, e: &Error) {
        (self.error_output)(&e.to_string());
    }

    // output sinks are swappable at any time; push the current one down
    // into the machine before running
    fn sync_output(&mut self) {
        if let Some(vm) = &self.vm {
            *vm.shared.standard_output.borrow_mut() = self.standard_output.clone();
        }
    }
}
