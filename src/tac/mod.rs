//! Three-address code: the instruction record and its per-opcode semantics.
//!
//! Each `Line` has one destination and up to two source operands. The parser
//! emits lines directly (there is no AST); the machine drives
//! `Line::evaluate` one line at a time. Call-related opcodes manipulate the
//! context stack and are handled by the machine itself.

use std::cell::RefCell;
use std::fmt::{self, Display};
use std::rc::Rc;

use crate::machine::context::Context;
use crate::machine::error::RuntimeError;
use crate::value::{ValMap, Value, MAX_SEQUENCE_SIZE};

/// A block of TAC lines, shared between the parser (which may still be
/// appending, e.g. in the REPL) and any contexts executing it.
pub type Code = Rc<RefCell<Vec<Line>>>;

pub fn new_code() -> Code {
    Rc::new(RefCell::new(Vec::new()))
}

/// Where a line of code came from, for error reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLoc {
    pub context: Option<String>,
    pub line_num: usize,
}

impl Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "[{} line {}]", ctx, self.line_num),
            None => write!(f, "[line {}]", self.line_num),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Noop,
    AssignA,
    AssignImplicit,
    CopyA,
    APlusB,
    AMinusB,
    ATimesB,
    ADividedByB,
    AModB,
    APowB,
    AEqualB,
    ANotEqualB,
    AGreaterThanB,
    AGreatOrEqualB,
    ALessThanB,
    ALessOrEqualB,
    AisaB,
    AAndB,
    AOrB,
    NotA,
    GotoA,
    GotoAifB,
    GotoAifTrulyB,
    GotoAifNotB,
    PushParam,
    CallFunctionA,
    CallIntrinsicA,
    ReturnA,
    ElemBofA,
    ElemBofIterA,
    LengthOfA,
    BindAssignA,
}

#[derive(Clone, Debug)]
pub struct Line {
    pub lhs: Value,
    pub op: Op,
    pub rhs_a: Value,
    pub rhs_b: Value,
    pub location: Option<SourceLoc>,
}

impl Line {
    pub fn new(lhs: Value, op: Op, rhs_a: Value, rhs_b: Value) -> Self {
        Self {
            lhs,
            op,
            rhs_a,
            rhs_b,
            location: None,
        }
    }

    /// Evaluate this line in the given context. Returns the value to store
    /// into `lhs` (None for jumps, which only move the program counter).
    /// The call-family opcodes never reach this method.
    pub fn evaluate(&self, ctx: &mut Context) -> Result<Option<Value>, RuntimeError> {
        match self.op {
            Op::Noop => Ok(None),
            Op::AssignA | Op::ReturnA | Op::AssignImplicit => {
                // a list or map operand here is a literal straight out of the
                // code, which needs its contents resolved now
                match &self.rhs_a {
                    v @ (Value::List(_) | Value::Map(_)) => Ok(Some(v.full_eval(ctx)?)),
                    v => Ok(Some(v.val(ctx)?)),
                }
            }
            Op::CopyA => Ok(Some(self.rhs_a.eval_copy(ctx)?)),
            Op::BindAssignA => match &self.rhs_a {
                Value::Function(fd, _) => Ok(Some(Value::Function(
                    fd.clone(),
                    Some(ctx.variables_map()),
                ))),
                _ => Err(RuntimeError::generic("internal: bind of a non-function")),
            },
            Op::GotoA => {
                let target = self.rhs_a.val(ctx)?;
                ctx.line_num = target.int_value() as usize;
                Ok(None)
            }
            Op::GotoAifB => {
                let cond = self.rhs_b.val(ctx)?;
                if cond.bool_value() {
                    let target = self.rhs_a.val(ctx)?;
                    ctx.line_num = target.int_value() as usize;
                }
                Ok(None)
            }
            Op::GotoAifTrulyB => {
                // branch only on an integer-nonzero truth value, so fuzzy
                // intermediates survive an `or` chain
                let cond = self.rhs_b.val(ctx)?;
                if cond.int_value() != 0 {
                    let target = self.rhs_a.val(ctx)?;
                    ctx.line_num = target.int_value() as usize;
                }
                Ok(None)
            }
            Op::GotoAifNotB => {
                let cond = self.rhs_b.val(ctx)?;
                if !cond.bool_value() {
                    let target = self.rhs_a.val(ctx)?;
                    ctx.line_num = target.int_value() as usize;
                }
                Ok(None)
            }
            Op::ElemBofA => {
                let a = self.rhs_a.val(ctx)?;
                let b = self.rhs_b.val(ctx)?;
                Ok(Some(Value::indexed_pair(&a, &b)?.0))
            }
            Op::ElemBofIterA => {
                let a = self.rhs_a.val(ctx)?;
                let b = self.rhs_b.val(ctx)?;
                Ok(Some(iter_elem(&a, &b)?))
            }
            Op::LengthOfA => {
                let a = self.rhs_a.val(ctx)?;
                match &a {
                    Value::String(s) => Ok(Some(Value::number(s.chars().count() as f64))),
                    Value::List(l) => Ok(Some(Value::number(l.borrow().len() as f64))),
                    Value::Map(m) => Ok(Some(Value::number(m.len() as f64))),
                    v => Err(RuntimeError::type_mismatch(format!(
                        "can't get length of a {}",
                        v.type_name()
                    ))),
                }
            }
            Op::NotA => {
                let a = self.rhs_a.val(ctx)?;
                match &a {
                    Value::Number(n) => Ok(Some(Value::number(1.0 - clamp01(n.abs())))),
                    v => Ok(Some(Value::truth(!v.bool_value()))),
                }
            }
            Op::AisaB => {
                let a = self.rhs_a.val(ctx)?;
                let b = self.rhs_b.val(ctx)?;
                Ok(Some(Value::truth(a.is_a(&b))))
            }
            Op::AEqualB => {
                let a = self.rhs_a.val(ctx)?;
                let b = self.rhs_b.val(ctx)?;
                Ok(Some(Value::number(a.equality(&b, crate::value::DEFAULT_EQUALITY_DEPTH))))
            }
            Op::ANotEqualB => {
                let a = self.rhs_a.val(ctx)?;
                let b = self.rhs_b.val(ctx)?;
                Ok(Some(Value::number(
                    1.0 - a.equality(&b, crate::value::DEFAULT_EQUALITY_DEPTH),
                )))
            }
            Op::AAndB | Op::AOrB => {
                let a = truth_number(&self.rhs_a.val(ctx)?);
                let b = truth_number(&self.rhs_b.val(ctx)?);
                let result = if self.op == Op::AAndB {
                    clamp01((a * b).abs())
                } else {
                    clamp01((a + b - a * b).abs())
                };
                Ok(Some(Value::number(result)))
            }
            Op::APlusB
            | Op::AMinusB
            | Op::ATimesB
            | Op::ADividedByB
            | Op::AModB
            | Op::APowB => {
                let a = self.rhs_a.val(ctx)?;
                let b = self.rhs_b.val(ctx)?;
                Ok(Some(eval_arithmetic(self.op, &a, &b, ctx)?))
            }
            Op::AGreaterThanB | Op::AGreatOrEqualB | Op::ALessThanB | Op::ALessOrEqualB => {
                let a = self.rhs_a.val(ctx)?;
                let b = self.rhs_b.val(ctx)?;
                Ok(Some(eval_comparison(self.op, &a, &b)?))
            }
            Op::PushParam | Op::CallFunctionA | Op::CallIntrinsicA => Err(
                RuntimeError::generic("internal: call opcode outside the machine"),
            ),
        }
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Truth value as a number: numbers contribute themselves, everything else
/// its boolean value.
fn truth_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => *n,
        other => {
            if other.bool_value() {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn eval_arithmetic(
    op: Op,
    a: &Value,
    b: &Value,
    ctx: &mut Context,
) -> Result<Value, RuntimeError> {
    // a string on either side of + means concatenation
    if op == Op::APlusB
        && (matches!(a, Value::String(_)) || matches!(b, Value::String(_)))
    {
        let text = format!("{}{}", concat_text(a), concat_text(b));
        if text.chars().count() > MAX_SEQUENCE_SIZE {
            return Err(RuntimeError::limit_exceeded("string too large"));
        }
        return Ok(Value::string(text));
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(Value::number(apply_numeric(op, *x, *y))),
        (Value::Number(x), Value::Null) => Ok(Value::number(apply_numeric(op, *x, 0.0))),
        (Value::Null, Value::Number(y)) => Ok(Value::number(apply_numeric(op, 0.0, *y))),
        (Value::Null, Value::Null) => Ok(Value::Null),
        (Value::String(s), Value::Number(n)) if op == Op::ATimesB => {
            replicate_string(s, *n)
        }
        (Value::String(s), Value::Number(n)) if op == Op::ADividedByB => {
            replicate_string(s, 1.0 / *n)
        }
        (Value::List(_), Value::Null) if op == Op::APlusB => Ok(a.clone()),
        (Value::List(la), Value::List(lb)) if op == Op::APlusB => {
            let mut out = Vec::new();
            for item in la.borrow().iter().chain(lb.borrow().iter()) {
                out.push(item.val(ctx)?);
            }
            if out.len() > MAX_SEQUENCE_SIZE {
                return Err(RuntimeError::limit_exceeded("list too large"));
            }
            Ok(Value::from_vec(out))
        }
        (Value::List(l), Value::Number(n)) if op == Op::ATimesB => replicate_list(l, *n),
        (Value::List(l), Value::Number(n)) if op == Op::ADividedByB => {
            replicate_list(l, 1.0 / *n)
        }
        (Value::Map(_), Value::Null) if op == Op::APlusB => Ok(a.clone()),
        (Value::Map(ma), Value::Map(mb)) if op == Op::APlusB => {
            let out = ValMap::new();
            for (k, v) in ma.iter_pairs().into_iter().chain(mb.iter_pairs()) {
                out.set(k.val(ctx)?, v.val(ctx)?);
            }
            Ok(Value::Map(Rc::new(out)))
        }
        _ => Err(RuntimeError::type_mismatch(format!(
            "while attempting to {} a {} and a {}",
            op_verb(op),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn apply_numeric(op: Op, x: f64, y: f64) -> f64 {
    match op {
        Op::APlusB => x + y,
        Op::AMinusB => x - y,
        Op::ATimesB => x * y,
        Op::ADividedByB => x / y,
        Op::AModB => x % y,
        Op::APowB => x.powf(y),
        _ => unreachable!("non-arithmetic op"),
    }
}

fn op_verb(op: Op) -> &'static str {
    match op {
        Op::APlusB => "add",
        Op::AMinusB => "subtract",
        Op::ATimesB => "multiply",
        Op::ADividedByB => "divide",
        Op::AModB => "mod",
        Op::APowB => "raise",
        _ => "combine",
    }
}

/// Text used when a value takes part in string concatenation; null
/// contributes nothing so `s + null == s`.
fn concat_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.to_string(),
        other => other.to_display_string(),
    }
}

/// String replication with a fractional-part suffix: `"abc" * 2.5` is
/// "abc" twice plus the first half of it.
fn replicate_string(s: &str, factor: f64) -> Result<Value, RuntimeError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Ok(Value::empty_string());
    }
    let chars: Vec<char> = s.chars().collect();
    let whole = factor.floor() as usize;
    let extra = ((factor - factor.floor()) * chars.len() as f64) as usize;
    let total = whole
        .saturating_mul(chars.len())
        .saturating_add(extra);
    if total > MAX_SEQUENCE_SIZE {
        return Err(RuntimeError::limit_exceeded("string too large"));
    }
    let mut out = String::with_capacity(total);
    for _ in 0..whole {
        out.push_str(s);
    }
    out.extend(chars[..extra].iter());
    Ok(Value::string(out))
}

fn replicate_list(
    list: &Rc<RefCell<Vec<Value>>>,
    factor: f64,
) -> Result<Value, RuntimeError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Ok(Value::from_vec(vec![]));
    }
    let items = list.borrow();
    let whole = factor.floor() as usize;
    let extra = ((factor - factor.floor()) * items.len() as f64) as usize;
    let total = whole
        .saturating_mul(items.len())
        .saturating_add(extra);
    if total > MAX_SEQUENCE_SIZE {
        return Err(RuntimeError::limit_exceeded("list too large"));
    }
    let mut out = Vec::with_capacity(total);
    for _ in 0..whole {
        out.extend(items.iter().cloned());
    }
    out.extend(items[..extra].iter().cloned());
    Ok(Value::from_vec(out))
}

fn eval_comparison(op: Op, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let result = match (a, b) {
        (Value::Number(x), Value::Number(y)) => match op {
            Op::AGreaterThanB => x > y,
            Op::AGreatOrEqualB => x >= y,
            Op::ALessThanB => x < y,
            Op::ALessOrEqualB => x <= y,
            _ => unreachable!("non-comparison op"),
        },
        (Value::String(x), Value::String(y)) => match op {
            Op::AGreaterThanB => x > y,
            Op::AGreatOrEqualB => x >= y,
            Op::ALessThanB => x < y,
            Op::ALessOrEqualB => x <= y,
            _ => unreachable!("non-comparison op"),
        },
        _ => {
            return Err(RuntimeError::type_mismatch(format!(
                "while attempting to compare a {} and a {}",
                a.type_name(),
                b.type_name()
            )))
        }
    };
    Ok(Value::truth(result))
}

/// Iterator step: maps yield a {key, value} mini-map for the given ordinal,
/// lists and strings are plain indexed access.
fn iter_elem(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match a {
        Value::Map(m) => {
            let idx = b.int_value();
            let (key, value) = m
                .get_key_value_pair(idx.max(0) as usize)
                .ok_or_else(|| RuntimeError::index_out_of_range(idx, "map"))?;
            let pair = ValMap::new();
            pair.set(Value::string("key"), key);
            pair.set(Value::string("value"), value);
            Ok(Value::Map(Rc::new(pair)))
        }
        Value::List(_) | Value::String(_) => a.get_indexed(b),
        v => Err(RuntimeError::type_mismatch(format!(
            "can't iterate over a {}",
            v.type_name()
        ))),
    }
}

// Display is only used for TAC dumps.
impl Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lhs = &self.lhs;
        let a = &self.rhs_a;
        let b = &self.rhs_b;
        match self.op {
            Op::Noop => write!(f, "noop"),
            Op::AssignA => write!(f, "{lhs} := {a}"),
            Op::AssignImplicit => write!(f, "_ := {a}"),
            Op::CopyA => write!(f, "{lhs} := copy of {a}"),
            Op::APlusB => write!(f, "{lhs} := {a} + {b}"),
            Op::AMinusB => write!(f, "{lhs} := {a} - {b}"),
            Op::ATimesB => write!(f, "{lhs} := {a} * {b}"),
            Op::ADividedByB => write!(f, "{lhs} := {a} / {b}"),
            Op::AModB => write!(f, "{lhs} := {a} % {b}"),
            Op::APowB => write!(f, "{lhs} := {a} ^ {b}"),
            Op::AEqualB => write!(f, "{lhs} := {a} == {b}"),
            Op::ANotEqualB => write!(f, "{lhs} := {a} != {b}"),
            Op::AGreaterThanB => write!(f, "{lhs} := {a} > {b}"),
            Op::AGreatOrEqualB => write!(f, "{lhs} := {a} >= {b}"),
            Op::ALessThanB => write!(f, "{lhs} := {a} < {b}"),
            Op::ALessOrEqualB => write!(f, "{lhs} := {a} <= {b}"),
            Op::AisaB => write!(f, "{lhs} := {a} isa {b}"),
            Op::AAndB => write!(f, "{lhs} := {a} and {b}"),
            Op::AOrB => write!(f, "{lhs} := {a} or {b}"),
            Op::NotA => write!(f, "{lhs} := not {a}"),
            Op::GotoA => write!(f, "goto {a}"),
            Op::GotoAifB => write!(f, "goto {a} if {b}"),
            Op::GotoAifTrulyB => write!(f, "goto {a} if truly {b}"),
            Op::GotoAifNotB => write!(f, "goto {a} if not {b}"),
            Op::PushParam => write!(f, "push param {a}"),
            Op::CallFunctionA => write!(f, "{lhs} := call {a} with {b} args"),
            Op::CallIntrinsicA => write!(f, "{lhs} := intrinsic {a}"),
            Op::ReturnA => write!(f, "return {a}"),
            Op::ElemBofA => write!(f, "{lhs} := {a}[{b}]"),
            Op::ElemBofIterA => write!(f, "{lhs} := {a} iter {b}"),
            Op::LengthOfA => write!(f, "{lhs} := len {a}"),
            Op::BindAssignA => write!(f, "{lhs} := bind {a}"),
        }
    }
}
