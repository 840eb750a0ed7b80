//! The virtual machine: a stack of call frames driven one TAC line per step,
//! with a wall-clock-limited run loop, cooperative yielding, and the
//! partial-result protocol for long-running intrinsics.

pub mod context;
pub mod error;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use crate::intrinsics;
use crate::machine::context::Context;
use crate::machine::error::RuntimeError;
use crate::tac::{Code, Line, Op};
use crate::value::Value;

/// The only sink the runtime writes text through.
pub type OutputFn = Rc<dyn Fn(&str)>;

/// State shared between the machine and every context it creates, so
/// intrinsics can reach the output sink, the yield flag, and the clock.
pub struct MachineShared {
    pub standard_output: RefCell<OutputFn>,
    pub yielding: Cell<bool>,
    start_time: Cell<Option<Instant>>,
}

impl MachineShared {
    fn new(standard_output: OutputFn) -> Self {
        Self {
            standard_output: RefCell::new(standard_output),
            yielding: Cell::new(false),
            start_time: Cell::new(None),
        }
    }

    /// Seconds since this machine first ran.
    pub fn run_time(&self) -> f64 {
        match self.start_time.get() {
            Some(start) => start.elapsed().as_secs_f64(),
            None => {
                self.start_time.set(Some(Instant::now()));
                0.0
            }
        }
    }

    pub fn emit(&self, text: &str) {
        let out = self.standard_output.borrow().clone();
        out(text);
    }
}

pub struct Machine {
    /// Call stack; the bottom entry is always the global context.
    stack: Vec<Context>,
    pub shared: Rc<MachineShared>,
    /// Whether bare expression statements store their value into `_`
    /// (enabled by the REPL).
    pub store_implicit: bool,
}

impl Machine {
    pub fn new(global_code: Code, standard_output: OutputFn) -> Self {
        let shared = Rc::new(MachineShared::new(standard_output));
        let global = Context::new_global(global_code, shared.clone());
        Self {
            stack: vec![global],
            shared,
            store_implicit: false,
        }
    }

    pub fn done(&self) -> bool {
        self.stack.len() == 1 && self.stack[0].done()
    }

    pub fn yielding(&self) -> bool {
        self.shared.yielding.get()
    }

    pub fn run_time(&self) -> f64 {
        self.shared.run_time()
    }

    pub fn global_context(&self) -> &Context {
        &self.stack[0]
    }

    pub fn global_context_mut(&mut self) -> &mut Context {
        &mut self.stack[0]
    }

    pub fn top_context(&self) -> &Context {
        self.stack.last().unwrap()
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.stack[0].variables.as_ref()?.get_str(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.stack[0].set_var(name, value)
    }

    /// Execute one line on the top context, popping any finished frames
    /// first. Errors come back annotated with a source location.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        while self.stack.len() > 1 && self.stack.last().unwrap().done() {
            self.pop_context()?;
        }
        let top = self.stack.last_mut().unwrap();
        if top.done() {
            return Ok(());
        }
        let line = top.code.borrow()[top.line_num].clone();
        top.line_num += 1;
        match self.execute_line(&line) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.annotate_error(e, &line)),
        }
    }

    /// Run until completion, a yield, or the wall-clock limit; with
    /// `return_early`, also bail as soon as the top context is waiting on a
    /// partial result, so the host can do other work and resume later.
    pub fn run_until_done(
        &mut self,
        time_limit: f64,
        return_early: bool,
    ) -> Result<(), RuntimeError> {
        self.shared.yielding.set(false);
        let start_time = self.run_time();
        while !self.done() && !self.shared.yielding.get() {
            if self.run_time() - start_time > time_limit {
                return Ok(());
            }
            self.step()?;
            if return_early
                && self
                    .stack
                    .last()
                    .map(|c| c.partial_result.is_some())
                    .unwrap_or(false)
            {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Host entry point: invoke a FunctionValue as if the script had called
    /// it with no arguments. The next run drives that function.
    pub fn manually_push_call(
        &mut self,
        func: &Value,
        result_storage: Value,
    ) -> Result<(), RuntimeError> {
        let Value::Function(fd, outer) = func else {
            return Err(RuntimeError::type_mismatch("can't call a non-function"));
        };
        let top = self.stack.last_mut().unwrap();
        let mut next = top.next_call_context(fd, 0, false, result_storage)?;
        next.outer_vars = outer.clone();
        self.stack.push(next);
        Ok(())
    }

    /// Abandon execution: pop everything above the global context and move
    /// its program counter past the end of the code.
    pub fn stop(&mut self) {
        self.stack.truncate(1);
        self.stack[0].jump_to_end();
        self.shared.yielding.set(false);
    }

    /// Rewind the global context for a fresh run of the same code.
    pub fn reset(&mut self) {
        self.stack.truncate(1);
        self.stack[0].line_num = 0;
        self.shared.yielding.set(false);
    }

    pub fn find_short_name(&self, v: &Value) -> Option<String> {
        self.stack[0].find_short_name(v)
    }

    pub fn describe(&self, v: &Value) -> String {
        self.stack[0].describe(v)
    }

    /// Numbered dump of the global code, for `--dump-tac`.
    pub fn tac_listing(&self) -> String {
        let code = self.stack[0].code.borrow();
        let mut out = String::new();
        for (i, line) in code.iter().enumerate() {
            out.push_str(&format!("{i}: {line}\n"));
        }
        out
    }

    fn execute_line(&mut self, line: &Line) -> Result<(), RuntimeError> {
        match line.op {
            Op::PushParam => {
                let top = self.stack.last_mut().unwrap();
                let value = line.rhs_a.val(top)?;
                top.push_param(value)
            }
            Op::CallFunctionA => self.call_function(line),
            Op::CallIntrinsicA => self.call_intrinsic(line),
            Op::ReturnA => {
                let top = self.stack.last_mut().unwrap();
                let value = line.evaluate(top)?.unwrap_or(Value::Null);
                top.set_temp(0, value);
                if self.stack.len() > 1 {
                    self.pop_context()?;
                } else {
                    // return at global scope just ends the program
                    self.stack[0].jump_to_end();
                }
                Ok(())
            }
            Op::AssignImplicit => {
                let store = self.store_implicit;
                let top = self.stack.last_mut().unwrap();
                let value = line.evaluate(top)?.unwrap_or(Value::Null);
                if store {
                    top.set_var("_", value)?;
                    top.implicit_result_counter += 1;
                }
                Ok(())
            }
            _ => {
                let top = self.stack.last_mut().unwrap();
                if let Some(value) = line.evaluate(top)? {
                    top.store_value(&line.lhs, value)?;
                }
                Ok(())
            }
        }
    }

    /// `CallFunctionA`: resolve the callee; push a new context for a
    /// function (binding self/super), or just store any other value when no
    /// arguments were supplied.
    fn call_function(&mut self, line: &Line) -> Result<(), RuntimeError> {
        let top = self.stack.last_mut().unwrap();
        let arg_count = line.rhs_b.val(top)?.int_value().max(0) as usize;
        let (callee, value_found_in) = line.rhs_a.val_pair(top)?;

        if let Value::Function(fd, outer) = &callee {
            // With dot syntax the receiver becomes self, except when
            // invoking through the literal name `super`, which keeps the
            // current self.
            let mut self_value: Option<Value> = None;
            if let Value::SeqElem { sequence, .. } = &line.rhs_a {
                let via_super =
                    matches!(&**sequence, Value::Var { name, .. } if &**name == "super");
                if via_super {
                    self_value = Some(top.self_value.clone());
                } else {
                    self_value = Some(sequence.val(top)?);
                }
            }
            let super_value = value_found_in
                .as_ref()
                .map(|m| m.get_str(crate::value::ISA_KEY).unwrap_or(Value::Null));

            let mut next =
                top.next_call_context(fd, arg_count, self_value.is_some(), line.lhs.clone())?;
            next.outer_vars = outer.clone();
            if let Some(sup) = super_value {
                next.set_var("super", sup)?;
            }
            if let Some(s) = self_value {
                next.self_value = s;
            }
            self.stack.push(next);
            Ok(())
        } else {
            if arg_count > 0 {
                return Err(RuntimeError::too_many_arguments());
            }
            top.store_value(&line.lhs, callee)
        }
    }

    /// `CallIntrinsicA`: dispatch by numeric id. A not-done result is
    /// stashed on the context and the program counter rewound so the same
    /// line re-invokes the intrinsic next step.
    fn call_intrinsic(&mut self, line: &Line) -> Result<(), RuntimeError> {
        let top = self.stack.last_mut().unwrap();
        let id = line.rhs_a.val(top)?.int_value();
        let intrinsic = intrinsics::get_by_id(id.max(0) as usize)
            .ok_or_else(|| RuntimeError::generic(format!("unknown intrinsic id {id}")))?;
        let partial = top.partial_result.take();
        let result = (intrinsic.code())(top, partial)?;
        if result.done {
            top.store_value(&line.lhs, result.value)
        } else {
            top.partial_result = Some(result);
            top.line_num -= 1;
            Ok(())
        }
    }

    /// Pop the finished top frame, copying its temp 0 into the caller's
    /// result storage.
    fn pop_context(&mut self) -> Result<(), RuntimeError> {
        debug_assert!(self.stack.len() > 1);
        let child = self.stack.pop().unwrap();
        let result = child.get_temp(0);
        let storage = child.result_storage.clone();
        let parent = self.stack.last_mut().unwrap();
        parent.store_value(&storage, result)
    }

    /// Give the error a source location: the failing line's, else the
    /// nearest located line walking down the context stack.
    fn annotate_error(&self, e: RuntimeError, line: &Line) -> RuntimeError {
        if e.location().is_some() {
            return e;
        }
        if let Some(loc) = &line.location {
            return e.with_location(loc.clone());
        }
        for ctx in self.stack.iter().rev() {
            let code = ctx.code.borrow();
            let idx = ctx.line_num.min(code.len().saturating_sub(1));
            if let Some(l) = code.get(idx) {
                if let Some(loc) = &l.location {
                    return e.with_location(loc.clone());
                }
            }
        }
        e
    }
}
