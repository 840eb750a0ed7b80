//! One call frame: code, program counter, locals, temporaries, argument
//! stack, and the plumbing that name resolution and lvalue stores go through.

use std::rc::Rc;

use crate::intrinsics::{self, IntrinsicResult};
use crate::machine::error::RuntimeError;
use crate::machine::MachineShared;
use crate::tac::Code;
use crate::value::{FuncDef, ValMap, Value};

/// Maximum depth of the in-flight argument stack.
pub const MAX_ARG_STACK: usize = 256;

pub struct Context {
    pub code: Code,
    /// Program counter: index of the next line to execute.
    pub line_num: usize,
    /// Local variables, created lazily on first assignment (or when the
    /// `locals` built-in is read).
    pub variables: Option<Rc<ValMap>>,
    /// Captured lexical environment, when this frame runs a closure.
    pub outer_vars: Option<Rc<ValMap>>,
    pub self_value: Value,
    /// Arguments being stacked up for the next call.
    pub args: Vec<Value>,
    /// Lvalue in the caller that receives this frame's return value.
    pub result_storage: Value,
    /// In-flight state of a long-running intrinsic on the current line.
    pub partial_result: Option<IntrinsicResult>,
    pub implicit_result_counter: usize,
    /// Root frame's variables; None when this frame *is* the root.
    globals: Option<Rc<ValMap>>,
    pub shared: Rc<MachineShared>,
    temps: Vec<Value>,
}

impl Context {
    pub fn new_global(code: Code, shared: Rc<MachineShared>) -> Self {
        Self {
            code,
            line_num: 0,
            variables: Some(Rc::new(ValMap::new())),
            outer_vars: None,
            self_value: Value::Null,
            args: Vec::new(),
            result_storage: Value::Null,
            partial_result: None,
            implicit_result_counter: 0,
            globals: None,
            shared,
            temps: Vec::new(),
        }
    }

    pub fn done(&self) -> bool {
        self.line_num >= self.code.borrow().len()
    }

    pub fn jump_to_end(&mut self) {
        self.line_num = self.code.borrow().len();
    }

    pub fn variables_map(&mut self) -> Rc<ValMap> {
        if self.variables.is_none() {
            self.variables = Some(Rc::new(ValMap::new()));
        }
        self.variables.clone().unwrap()
    }

    pub fn globals_map(&mut self) -> Rc<ValMap> {
        match &self.globals {
            Some(g) => g.clone(),
            None => self.variables_map(),
        }
    }

    pub fn get_temp(&self, num: usize) -> Value {
        self.temps.get(num).cloned().unwrap_or(Value::Null)
    }

    pub fn set_temp(&mut self, num: usize, value: Value) {
        if self.temps.len() <= num {
            self.temps.resize(num + 1, Value::Null);
        }
        self.temps[num] = value;
    }

    /// Name resolution: special built-ins, then locals, then the closure
    /// environment, then globals, then the intrinsic registry.
    pub fn get_var(&mut self, name: &str) -> Result<Value, RuntimeError> {
        match name {
            "self" => return Ok(self.self_value.clone()),
            "locals" => return Ok(Value::Map(self.variables_map())),
            "globals" => return Ok(Value::Map(self.globals_map())),
            "outer" => {
                if let Some(outer) = self.outer_vars.clone() {
                    return Ok(Value::Map(outer));
                }
                return Ok(Value::Map(self.globals_map()));
            }
            _ => {}
        }
        if let Some(vars) = &self.variables {
            if let Some(v) = vars.get_str(name) {
                return Ok(v);
            }
        }
        if let Some(outer) = &self.outer_vars {
            if let Some(v) = outer.get_str(name) {
                return Ok(v);
            }
        }
        if let Some(globals) = &self.globals {
            if let Some(v) = globals.get_str(name) {
                return Ok(v);
            }
        }
        if let Some(intrinsic) = intrinsics::get_by_name(name) {
            return Ok(intrinsic.get_func());
        }
        Err(RuntimeError::undefined_identifier(name))
    }

    pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if name == "globals" || name == "locals" {
            return Err(RuntimeError::generic(format!("can't assign to {name}")));
        }
        if name == "self" {
            self.self_value = value;
            return Ok(());
        }
        self.variables_map()
            .set_elem(Value::string(name), value);
        Ok(())
    }

    /// Store a value through an lvalue: a temporary, a variable, or a
    /// sequence element. A Null lvalue means "no destination".
    pub fn store_value(&mut self, lhs: &Value, value: Value) -> Result<(), RuntimeError> {
        match lhs {
            Value::Null => Ok(()),
            Value::Temp(num) => {
                self.set_temp(*num, value);
                Ok(())
            }
            Value::Var { name, .. } => self.set_var(name, value),
            Value::SeqElem {
                sequence, index, ..
            } => {
                let seq = sequence.val(self)?;
                let idx = index.val(self)?;
                seq.set_indexed(idx, value)
            }
            v => Err(RuntimeError::generic(format!(
                "can't assign to {}",
                v.code_form(1)
            ))),
        }
    }

    pub fn push_param(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.args.len() >= MAX_ARG_STACK {
            return Err(RuntimeError::limit_exceeded("argument stack overflow"));
        }
        self.args.push(value);
        Ok(())
    }

    /// Build the child frame for a call, binding arguments (stacked in
    /// reverse order) to parameter names. With `got_self`, a leading `self`
    /// parameter is skipped so dot-syntax arguments line up; unfilled
    /// parameters take their defaults.
    pub fn next_call_context(
        &mut self,
        func: &Rc<FuncDef>,
        arg_count: usize,
        got_self: bool,
        result_storage: Value,
    ) -> Result<Context, RuntimeError> {
        let mut next = Context {
            code: func.code.clone(),
            line_num: 0,
            variables: None,
            outer_vars: None,
            self_value: Value::Null,
            args: Vec::new(),
            result_storage,
            partial_result: None,
            implicit_result_counter: 0,
            globals: Some(self.globals_map()),
            shared: self.shared.clone(),
            temps: Vec::new(),
        };

        let self_param = usize::from(
            got_self
                && func
                    .parameters
                    .first()
                    .map(|p| p.name == "self")
                    .unwrap_or(false),
        );
        for i in 0..arg_count {
            let argument = self
                .args
                .pop()
                .ok_or_else(|| RuntimeError::generic("internal: argument stack underflow"))?;
            let param_num = arg_count - 1 - i + self_param;
            if param_num >= func.parameters.len() {
                return Err(RuntimeError::too_many_arguments());
            }
            let name = func.parameters[param_num].name.clone();
            next.set_var(&name, argument)?;
        }
        for param in func.parameters.iter().skip(arg_count + self_param) {
            next.set_var(&param.name, param.default_value.clone())?;
        }
        Ok(next)
    }

    /// Print-friendly rendering of a value. Ordinary maps print their
    /// contents; the built-in type maps print as their intrinsic names, and
    /// functions prefer whatever global name they're bound to.
    pub fn describe(&self, v: &Value) -> String {
        match v {
            Value::Map(_) => {
                if let Some(name) = intrinsics::short_name_for(v) {
                    return name;
                }
            }
            Value::Function(..) => {
                if let Some(name) = self.find_short_name(v) {
                    return name;
                }
            }
            _ => {}
        }
        v.to_display_string()
    }

    /// Reverse lookup: a global variable holding exactly this value, else an
    /// intrinsic short name (listType and friends).
    pub fn find_short_name(&self, v: &Value) -> Option<String> {
        let globals = self.globals.as_ref().or(self.variables.as_ref())?;
        for (key, global) in globals.iter_pairs() {
            if ref_identical(&global, v) {
                if let Value::String(s) = key {
                    return Some(s.to_string());
                }
            }
        }
        intrinsics::short_name_for(v)
    }
}

fn ref_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Map(x), Value::Map(y)) => Rc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x, _), Value::Function(y, _)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}
