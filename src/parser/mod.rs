//! The parser: a recursive-descent, operator-precedence parser that emits
//! three-address code directly, with back-patching for forward jumps.
//!
//! There is no AST. Each precedence level parses its operands, emits the
//! lines computing them into temporaries, and hands back the operand value
//! for the level above. Statements are compiled into the state on top of the
//! output stack; a `function` literal opens a fresh state that becomes
//! current once the statement that contained the literal ends.

mod parse_state;

pub use parse_state::*;

use std::rc::Rc;
use std::{error::Error as StdError, fmt::Display};

use log::debug;

use crate::errors::Error;
use crate::intrinsics;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::tac::{new_code, Code, Line, Op, SourceLoc};
use crate::value::{FuncDef, Param, ValMap, Value, ISA_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerError {
    pub message: String,
    pub location: Option<SourceLoc>,
}

impl Display for CompilerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Compiler Error: {}", self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " {loc}")?;
        }
        Ok(())
    }
}

impl StdError for CompilerError {}

pub struct Parser {
    /// Name used in source locations (a file name, usually).
    pub error_context: Option<String>,
    partial_input: String,
    output_stack: Vec<ParseState>,
    pending_state: Option<ParseState>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            error_context: None,
            partial_input: String::new(),
            output_stack: vec![ParseState::new(new_code())],
            pending_state: None,
        }
    }

    /// The global code block; shared with any machine built from this
    /// parser, so REPL input appends seamlessly.
    pub fn global_code(&self) -> Code {
        self.output_stack[0].code.clone()
    }

    /// Parse source, appending to the global code. In REPL mode an input
    /// that ends in a line continuation is buffered and no error raised;
    /// otherwise unterminated blocks are a compiler error.
    pub fn parse(&mut self, source: &str, repl_mode: bool) -> Result<(), Error> {
        if repl_mode && Self::ends_with_line_continuation(source) {
            self.partial_input.push_str(&Lexer::trim_comment(source));
            self.partial_input.push(' ');
            return Ok(());
        }
        let full_source = if self.partial_input.is_empty() {
            source.to_string()
        } else {
            let mut s = std::mem::take(&mut self.partial_input);
            s.push_str(source);
            s
        };
        debug!("parsing {} chars", full_source.len());
        let mut tokens = Lexer::new(&full_source);
        self.parse_multiple_lines(&mut tokens)?;

        if !repl_mode && self.need_more_input() {
            // report past the last line, to make clear this is an EOF problem
            let line_num = tokens.line_num() + 1;
            let message = if self.output_stack.len() > 1 || self.pending_state.is_some() {
                "'function' without matching 'end function'".to_string()
            } else {
                match self.output_stack[0].backpatches.last().map(|bp| bp.waiting_for.as_str()) {
                    Some("end for") | Some("break") => "'for' without matching 'end for'".to_string(),
                    Some("end while") => "'while' without matching 'end while'".to_string(),
                    Some("end if") | Some("else") | Some("if:MARK") => {
                        "'if' without matching 'end if'".to_string()
                    }
                    _ => "unmatched block opener".to_string(),
                }
            };
            return Err(Error::Compiler(CompilerError {
                message,
                location: Some(SourceLoc {
                    context: self.error_context.clone(),
                    line_num,
                }),
            }));
        }
        Ok(())
    }

    /// True while an open block, a pending function body, or buffered
    /// partial input keeps the parser from having a complete program.
    pub fn need_more_input(&self) -> bool {
        !self.partial_input.is_empty()
            || self.output_stack.len() > 1
            || self.pending_state.is_some()
            || !self.output_stack.last().unwrap().backpatches.is_empty()
    }

    /// Abandon any incomplete blocks, keeping already-compiled global code.
    pub fn partial_reset(&mut self) {
        self.output_stack.truncate(1);
        let state = &mut self.output_stack[0];
        state.backpatches.clear();
        state.jump_points.clear();
        state.next_temp_num = 0;
        self.partial_input.clear();
        self.pending_state = None;
    }

    /// Whether a REPL line is visibly incomplete: the token stream ends in a
    /// binary operator, open bracket, comma, colon, dot, or assignment. A
    /// lexing failure yields false so a later parse reports the real error.
    pub fn ends_with_line_continuation(source: &str) -> bool {
        let tok = Lexer::last_token(source);
        matches!(
            tok.kind,
            TokenKind::OpAssign
                | TokenKind::OpPlus
                | TokenKind::OpMinus
                | TokenKind::OpTimes
                | TokenKind::OpDivide
                | TokenKind::OpMod
                | TokenKind::OpPower
                | TokenKind::OpEqual
                | TokenKind::OpNotEqual
                | TokenKind::OpGreater
                | TokenKind::OpGreatEqual
                | TokenKind::OpLesser
                | TokenKind::OpLessEqual
                | TokenKind::LParen
                | TokenKind::LSquare
                | TokenKind::LCurly
                | TokenKind::Comma
                | TokenKind::Dot
                | TokenKind::Colon
        ) || (tok.kind == TokenKind::Keyword
            && matches!(tok.text.as_str(), "and" | "or" | "isa" | "not" | "new"))
    }

    fn output(&mut self) -> &mut ParseState {
        self.output_stack.last_mut().unwrap()
    }

    fn cerr(&self, tokens: &Lexer, message: impl Into<String>) -> Error {
        Error::Compiler(CompilerError {
            message: message.into(),
            location: Some(SourceLoc {
                context: self.error_context.clone(),
                line_num: tokens.line_num(),
            }),
        })
    }

    fn parse_multiple_lines(&mut self, tokens: &mut Lexer) -> Result<(), Error> {
        while !tokens.at_end() {
            if tokens.peek()?.kind == TokenKind::EOL {
                tokens.dequeue()?;
                continue;
            }
            let location = SourceLoc {
                context: self.error_context.clone(),
                line_num: tokens.line_num(),
            };

            // 'end function' closes the current compilation target
            if tokens.peek()?.is_keyword("end function") {
                tokens.dequeue()?;
                if self.output_stack.len() > 1 {
                    self.output_stack.pop();
                } else {
                    return Err(self
                        .cerr(tokens, "'end function' without matching block starter"));
                }
                continue;
            }

            let output_start = self.output().code_len();
            self.parse_statement(tokens, false).map_err(|e| match e {
                Error::Compiler(ce) if ce.location.is_none() => Error::Compiler(CompilerError {
                    location: Some(location.clone()),
                    ..ce
                }),
                other => other,
            })?;

            // stamp the lines this statement produced with its location
            let out = self.output();
            let code_len = out.code_len();
            if output_start < code_len {
                let mut code = out.code.borrow_mut();
                for line in code[output_start..].iter_mut() {
                    line.location = Some(location.clone());
                }
            }
        }
        Ok(())
    }

    fn parse_statement(&mut self, tokens: &mut Lexer, allow_extra: bool) -> Result<(), Error> {
        let mut require_eol = true;
        let tok = tokens.peek()?;
        if tok.kind == TokenKind::Keyword {
            match tok.text.as_str() {
                "return" => {
                    tokens.dequeue()?;
                    let peek = tokens.peek()?;
                    let value = if peek.kind == TokenKind::EOL || peek.is_keyword("else") {
                        Value::Null
                    } else {
                        self.parse_expr_val(tokens)?
                    };
                    self.output()
                        .add(Line::new(Value::Temp(0), Op::ReturnA, value, Value::Null));
                }
                "if" => {
                    tokens.dequeue()?;
                    let condition = self.parse_expr_val(tokens)?;
                    self.require_keyword(tokens, "then")?;
                    let out = self.output();
                    out.add(Line::new(Value::Null, Op::GotoAifNotB, Value::Null, condition));
                    out.add_backpatch("if:MARK");
                    out.add_backpatch("else");

                    if tokens.peek()?.kind != TokenKind::EOL {
                        // single-line if
                        self.parse_statement(tokens, true)?;
                        let peek = tokens.peek()?;
                        if peek.is_keyword("else") {
                            tokens.dequeue()?;
                            self.start_else_clause(tokens)?;
                            self.parse_statement(tokens, true)?;
                        } else if peek.kind != TokenKind::EOL {
                            return Err(self.cerr(
                                tokens,
                                format!("got {peek} where 'else' or end of line is required"),
                            ));
                        }
                        self.output()
                            .patch_if_block()
                            .map_err(|m| self.cerr(tokens, m))?;
                    } else {
                        tokens.dequeue()?;
                    }
                    require_eol = false;
                }
                "else" => {
                    tokens.dequeue()?;
                    self.start_else_clause(tokens)?;
                }
                "else if" => {
                    tokens.dequeue()?;
                    self.start_else_clause(tokens)?;
                    let condition = self.parse_expr_val(tokens)?;
                    self.require_keyword(tokens, "then")?;
                    let out = self.output();
                    out.add(Line::new(Value::Null, Op::GotoAifNotB, Value::Null, condition));
                    out.add_backpatch("else");
                }
                "end if" => {
                    tokens.dequeue()?;
                    self.output()
                        .patch_if_block()
                        .map_err(|m| self.cerr(tokens, m))?;
                }
                "while" => {
                    tokens.dequeue()?;
                    // the jump point comes first so the condition re-runs
                    // every iteration
                    self.output().add_jump_point("while");
                    let condition = self.parse_expr_val(tokens)?;
                    let out = self.output();
                    out.add(Line::new(Value::Null, Op::GotoAifNotB, Value::Null, condition));
                    out.add_backpatch("end while");
                }
                "end while" => {
                    tokens.dequeue()?;
                    let jump = self
                        .output()
                        .close_jump_point("while")
                        .ok_or_else(|| self.cerr(tokens, "'end while' without matching 'while'"))?;
                    let out = self.output();
                    out.add(Line::new(
                        Value::Null,
                        Op::GotoA,
                        Value::number(jump.line_num as f64),
                        Value::Null,
                    ));
                    out.patch("end while", true, 0)
                        .map_err(|m| self.cerr(tokens, m))?;
                }
                "for" => {
                    tokens.dequeue()?;
                    let loop_var = self.require_token(tokens, TokenKind::Identifier)?;
                    self.require_keyword(tokens, "in")?;
                    let stuff = self.parse_expr_val(tokens)?;

                    let index_var = Value::var(format!("__{}_idx", loop_var.text));
                    let out = self.output();
                    out.add(Line::new(
                        index_var.clone(),
                        Op::AssignA,
                        Value::number(-1.0),
                        Value::Null,
                    ));
                    out.add_jump_point("for");
                    out.add(Line::new(
                        index_var.clone(),
                        Op::APlusB,
                        index_var.clone(),
                        Value::one(),
                    ));
                    let size = Value::Temp(out.next_temp());
                    out.add(Line::new(size.clone(), Op::LengthOfA, stuff.clone(), Value::Null));
                    let too_big = Value::Temp(out.next_temp());
                    out.add(Line::new(
                        too_big.clone(),
                        Op::AGreatOrEqualB,
                        index_var.clone(),
                        size,
                    ));
                    out.add(Line::new(Value::Null, Op::GotoAifB, Value::Null, too_big));
                    out.add_backpatch("end for");
                    out.add(Line::new(
                        Value::var(&loop_var.text),
                        Op::ElemBofIterA,
                        stuff,
                        index_var,
                    ));
                }
                "end for" => {
                    tokens.dequeue()?;
                    let jump = self
                        .output()
                        .close_jump_point("for")
                        .ok_or_else(|| self.cerr(tokens, "'end for' without matching 'for'"))?;
                    let out = self.output();
                    out.add(Line::new(
                        Value::Null,
                        Op::GotoA,
                        Value::number(jump.line_num as f64),
                        Value::Null,
                    ));
                    out.patch("end for", true, 0)
                        .map_err(|m| self.cerr(tokens, m))?;
                }
                "break" => {
                    tokens.dequeue()?;
                    if self.output().jump_points.is_empty() {
                        return Err(self.cerr(tokens, "'break' without open loop block"));
                    }
                    let out = self.output();
                    out.add(Line::new(Value::Null, Op::GotoA, Value::Null, Value::Null));
                    out.add_backpatch("break");
                }
                "continue" => {
                    tokens.dequeue()?;
                    let Some(jump) = self.output().jump_points.last().cloned() else {
                        return Err(self.cerr(tokens, "'continue' without open loop block"));
                    };
                    self.output().add(Line::new(
                        Value::Null,
                        Op::GotoA,
                        Value::number(jump.line_num as f64),
                        Value::Null,
                    ));
                }
                _ => self.parse_assignment(tokens)?,
            }
        } else {
            self.parse_assignment(tokens)?;
        }

        if require_eol && !allow_extra {
            self.require_eol(tokens)?;
        }

        // a function literal parsed during this statement becomes the new
        // compilation target now that the statement is complete
        if let Some(pending) = self.pending_state.take() {
            self.output_stack.push(pending);
        }
        Ok(())
    }

    /// Close the open if-branch and start its else clause: jump over the
    /// else body from the end of the if body, patch the conditional branch
    /// to land here, and leave the new jump waiting for `end if`.
    fn start_else_clause(&mut self, tokens: &mut Lexer) -> Result<(), Error> {
        let out = self.output();
        out.add(Line::new(Value::Null, Op::GotoA, Value::Null, Value::Null));
        out.patch("else", false, 0).map_err(|m| self.cerr(tokens, m))?;
        self.output().add_backpatch("end if");
        Ok(())
    }

    /// An expression statement: plain expression (implicit result),
    /// assignment, or a paren-less command call.
    fn parse_assignment(&mut self, tokens: &mut Lexer) -> Result<(), Error> {
        let expr = self.parse_expr(tokens, true, true)?;
        let peek = tokens.peek()?;

        if peek.kind == TokenKind::EOL || peek.is_keyword("else") || peek.is_keyword("else if") {
            // bare expression: store the implicit result
            let rhs = self.fully_evaluate(expr);
            self.output()
                .add(Line::new(Value::Null, Op::AssignImplicit, rhs, Value::Null));
            return Ok(());
        }

        if peek.kind == TokenKind::OpAssign {
            tokens.dequeue()?;
            let lhs = expr;
            let rhs = self.parse_expr(tokens, false, false)?;
            let rhs = self.fully_evaluate(rhs);

            // If the last line computed our rhs into a temp, just retarget
            // that line at our lhs -- unless something jumps to the current
            // position expecting the temp to exist.
            let out = self.output();
            if let Value::Temp(temp_num) = &rhs {
                let code_len = out.code_len();
                if code_len > 0 && !out.is_jump_target(code_len) {
                    let mut code = out.code.borrow_mut();
                    let last = &mut code[code_len - 1];
                    if matches!(&last.lhs, Value::Temp(n) if n == temp_num) {
                        last.lhs = lhs;
                        return Ok(());
                    }
                }
            }
            out.add(Line::new(lhs, Op::AssignA, rhs, Value::Null));
            return Ok(());
        }

        // command syntax: the rest of the line is comma-separated arguments
        let mut arg_count = 0;
        loop {
            let arg = self.parse_expr(tokens, false, false)?;
            let arg = self.fully_evaluate(arg);
            self.output()
                .add(Line::new(Value::Null, Op::PushParam, arg, Value::Null));
            arg_count += 1;
            let peek = tokens.peek()?;
            if peek.kind == TokenKind::EOL || peek.is_keyword("else") || peek.is_keyword("else if")
            {
                break;
            }
            if peek.kind != TokenKind::Comma {
                return Err(self.cerr(tokens, format!("got {peek} where a comma is required")));
            }
            tokens.dequeue()?;
            self.allow_line_break(tokens)?;
        }
        let out = self.output();
        let result = Value::Temp(out.next_temp());
        out.add(Line::new(
            result.clone(),
            Op::CallFunctionA,
            expr,
            Value::number(arg_count as f64),
        ));
        out.add(Line::new(Value::Null, Op::AssignImplicit, result, Value::Null));
        Ok(())
    }

    fn parse_expr(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        self.parse_function_literal(tokens, as_lval, statement_start)
    }

    /// Parse an expression and force it to a usable value (auto-calling
    /// variable and member references).
    fn parse_expr_val(&mut self, tokens: &mut Lexer) -> Result<Value, Error> {
        let val = self.parse_expr(tokens, false, false)?;
        Ok(self.fully_evaluate(val))
    }

    /// Whenever a variable or sequence-element reference is used as a value,
    /// emit a zero-argument call on it (which resolves the reference and
    /// invokes it if it names a function). `@`-protected references and
    /// self/super stay raw; a function literal gets bound to the current
    /// environment instead.
    fn fully_evaluate(&mut self, val: Value) -> Value {
        let op = match &val {
            Value::Var { name, no_invoke } => {
                if *no_invoke || &**name == "self" || &**name == "super" {
                    return val;
                }
                Op::CallFunctionA
            }
            Value::SeqElem { no_invoke, .. } => {
                if *no_invoke {
                    return val;
                }
                Op::CallFunctionA
            }
            Value::Function(..) => Op::BindAssignA,
            _ => return val,
        };
        let out = self.output();
        let temp = Value::Temp(out.next_temp());
        let rhs_b = if op == Op::CallFunctionA {
            Value::zero()
        } else {
            Value::Null
        };
        out.add(Line::new(temp.clone(), op, val, rhs_b));
        temp
    }

    /// A function literal inside a container literal may start its body on
    /// the very next line, before the container closes. Compile the body
    /// statements here, up to the matching `end function`, so the container
    /// can continue parsing afterwards.
    fn finish_pending_function(&mut self, tokens: &mut Lexer) -> Result<(), Error> {
        if self.pending_state.is_none() || tokens.peek()?.kind != TokenKind::EOL {
            return Ok(());
        }
        let depth = self.output_stack.len();
        self.output_stack.push(self.pending_state.take().unwrap());
        while self.output_stack.len() > depth {
            if tokens.at_end() {
                return Err(self.cerr(tokens, "'function' without matching 'end function'"));
            }
            if tokens.peek()?.kind == TokenKind::EOL {
                tokens.dequeue()?;
                continue;
            }
            if tokens.peek()?.is_keyword("end function") {
                tokens.dequeue()?;
                self.output_stack.pop();
                continue;
            }
            self.parse_statement(tokens, false)?;
        }
        Ok(())
    }

    fn parse_function_literal(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        if !tokens.peek()?.is_keyword("function") {
            return self.parse_or(tokens, as_lval, statement_start);
        }
        tokens.dequeue()?;

        let mut parameters = Vec::new();
        if tokens.peek()?.kind == TokenKind::LParen {
            tokens.dequeue()?;
            loop {
                if tokens.peek()?.kind == TokenKind::RParen {
                    tokens.dequeue()?;
                    break;
                }
                let ident = self.require_token(tokens, TokenKind::Identifier)?;
                let mut default_value = Value::Null;
                if tokens.peek()?.kind == TokenKind::OpAssign {
                    tokens.dequeue()?;
                    default_value = self.parse_default_value(tokens)?;
                }
                parameters.push(Param {
                    name: ident.text,
                    default_value,
                });
                let next = self.require_either(tokens, TokenKind::Comma, TokenKind::RParen)?;
                if next.kind == TokenKind::RParen {
                    break;
                }
                self.allow_line_break(tokens)?;
            }
        }

        if self.pending_state.is_some() {
            return Err(self.cerr(tokens, "can't start two functions in one statement"));
        }
        let code = new_code();
        let mut state = ParseState::new(code.clone());
        state.next_temp_num = 1; // temp 0 is the return value
        self.pending_state = Some(state);

        Ok(Value::Function(
            Rc::new(FuncDef { parameters, code }),
            None,
        ))
    }

    /// Parameter defaults are literals only.
    fn parse_default_value(&mut self, tokens: &mut Lexer) -> Result<Value, Error> {
        let tok = tokens.dequeue()?;
        match tok.kind {
            TokenKind::Number => self.number_from(tokens, &tok),
            TokenKind::OpMinus => {
                let num = self.require_token(tokens, TokenKind::Number)?;
                let value = self.number_from(tokens, &num)?;
                Ok(Value::number(-value.double_value()))
            }
            TokenKind::String => Ok(Value::string(tok.text)),
            TokenKind::Keyword if tok.text == "null" => Ok(Value::Null),
            TokenKind::Keyword if tok.text == "true" => Ok(Value::one()),
            TokenKind::Keyword if tok.text == "false" => Ok(Value::zero()),
            _ => Err(self.cerr(
                tokens,
                format!("got {tok} where a default parameter value is required"),
            )),
        }
    }

    fn parse_or(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_and(tokens, as_lval, statement_start)?;
        let mut jump_lines: Vec<usize> = Vec::new();
        while tokens.peek()?.is_keyword("or") {
            tokens.dequeue()?;
            val = self.fully_evaluate(val);
            self.allow_line_break(tokens)?;

            // short-circuit only on an absolutely-true value, so fuzzy
            // intermediates keep combining
            let out = self.output();
            out.add(Line::new(
                Value::Null,
                Op::GotoAifTrulyB,
                Value::Null,
                val.clone(),
            ));
            jump_lines.push(out.code_len() - 1);

            let op_b = self.parse_and(tokens, false, false)?;
            let op_b = self.fully_evaluate(op_b);
            let out = self.output();
            let temp = Value::Temp(out.next_temp());
            out.add(Line::new(temp.clone(), Op::AOrB, val, op_b));
            val = temp;
        }
        if !jump_lines.is_empty() {
            let out = self.output();
            let len = out.code_len();
            out.add(Line::new(
                Value::Null,
                Op::GotoA,
                Value::number((len + 2) as f64),
                Value::Null,
            ));
            out.add(Line::new(val.clone(), Op::AssignA, Value::one(), Value::Null));
            let target = Value::number((out.code_len() - 1) as f64);
            let mut code = out.code.borrow_mut();
            for idx in jump_lines {
                code[idx].rhs_a = target.clone();
            }
        }
        Ok(val)
    }

    fn parse_and(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_not(tokens, as_lval, statement_start)?;
        let mut jump_lines: Vec<usize> = Vec::new();
        while tokens.peek()?.is_keyword("and") {
            tokens.dequeue()?;
            val = self.fully_evaluate(val);
            self.allow_line_break(tokens)?;

            let out = self.output();
            out.add(Line::new(
                Value::Null,
                Op::GotoAifNotB,
                Value::Null,
                val.clone(),
            ));
            jump_lines.push(out.code_len() - 1);

            let op_b = self.parse_not(tokens, false, false)?;
            let op_b = self.fully_evaluate(op_b);
            let out = self.output();
            let temp = Value::Temp(out.next_temp());
            out.add(Line::new(temp.clone(), Op::AAndB, val, op_b));
            val = temp;
        }
        if !jump_lines.is_empty() {
            let out = self.output();
            let len = out.code_len();
            out.add(Line::new(
                Value::Null,
                Op::GotoA,
                Value::number((len + 2) as f64),
                Value::Null,
            ));
            out.add(Line::new(val.clone(), Op::AssignA, Value::zero(), Value::Null));
            let target = Value::number((out.code_len() - 1) as f64);
            let mut code = out.code.borrow_mut();
            for idx in jump_lines {
                code[idx].rhs_a = target.clone();
            }
        }
        Ok(val)
    }

    fn parse_not(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        if !tokens.peek()?.is_keyword("not") {
            return self.parse_isa(tokens, as_lval, statement_start);
        }
        tokens.dequeue()?;
        let val = self.parse_isa(tokens, false, false)?;
        let val = self.fully_evaluate(val);
        let out = self.output();
        let temp = Value::Temp(out.next_temp());
        out.add(Line::new(temp.clone(), Op::NotA, val, Value::Null));
        Ok(temp)
    }

    fn parse_isa(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_comparisons(tokens, as_lval, statement_start)?;
        while tokens.peek()?.is_keyword("isa") {
            tokens.dequeue()?;
            val = self.fully_evaluate(val);
            self.allow_line_break(tokens)?;
            let op_b = self.parse_comparisons(tokens, false, false)?;
            let op_b = self.fully_evaluate(op_b);
            let out = self.output();
            let temp = Value::Temp(out.next_temp());
            out.add(Line::new(temp.clone(), Op::AisaB, val, op_b));
            val = temp;
        }
        Ok(val)
    }

    /// Comparisons chain: `1 < x < 10` becomes the fuzzy AND (product) of
    /// the pairwise comparisons.
    fn parse_comparisons(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_add_sub(tokens, as_lval, statement_start)?;
        let mut op_a = val.clone();
        let mut first = true;
        loop {
            let opcode = match tokens.peek()?.kind {
                TokenKind::OpEqual => Op::AEqualB,
                TokenKind::OpNotEqual => Op::ANotEqualB,
                TokenKind::OpGreater => Op::AGreaterThanB,
                TokenKind::OpGreatEqual => Op::AGreatOrEqualB,
                TokenKind::OpLesser => Op::ALessThanB,
                TokenKind::OpLessEqual => Op::ALessOrEqualB,
                _ => break,
            };
            tokens.dequeue()?;
            op_a = self.fully_evaluate(op_a);
            self.allow_line_break(tokens)?;
            let op_b = self.parse_add_sub(tokens, false, false)?;
            let op_b = self.fully_evaluate(op_b);
            let out = self.output();
            let comparison = Value::Temp(out.next_temp());
            out.add(Line::new(comparison.clone(), opcode, op_a.clone(), op_b.clone()));
            if first {
                val = comparison;
                first = false;
            } else {
                let out = self.output();
                let combined = Value::Temp(out.next_temp());
                out.add(Line::new(combined.clone(), Op::ATimesB, val, comparison));
                val = combined;
            }
            op_a = op_b;
        }
        Ok(val)
    }

    fn parse_add_sub(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_mult_div(tokens, as_lval, statement_start)?;
        loop {
            let tok = tokens.peek()?;
            let opcode = match tok.kind {
                TokenKind::OpPlus => Op::APlusB,
                // at statement start, `a -b` is a command statement passing
                // the argument -b, not a subtraction
                TokenKind::OpMinus
                    if !statement_start || !tok.after_space || tokens.is_at_whitespace() =>
                {
                    Op::AMinusB
                }
                _ => break,
            };
            tokens.dequeue()?;
            val = self.fully_evaluate(val);
            self.allow_line_break(tokens)?;
            let op_b = self.parse_mult_div(tokens, false, false)?;
            let op_b = self.fully_evaluate(op_b);
            let out = self.output();
            let temp = Value::Temp(out.next_temp());
            out.add(Line::new(temp.clone(), opcode, val, op_b));
            val = temp;
        }
        Ok(val)
    }

    fn parse_mult_div(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_unary_minus(tokens, as_lval, statement_start)?;
        loop {
            let opcode = match tokens.peek()?.kind {
                TokenKind::OpTimes => Op::ATimesB,
                TokenKind::OpDivide => Op::ADividedByB,
                TokenKind::OpMod => Op::AModB,
                _ => break,
            };
            tokens.dequeue()?;
            val = self.fully_evaluate(val);
            self.allow_line_break(tokens)?;
            let op_b = self.parse_unary_minus(tokens, false, false)?;
            let op_b = self.fully_evaluate(op_b);
            let out = self.output();
            let temp = Value::Temp(out.next_temp());
            out.add(Line::new(temp.clone(), opcode, val, op_b));
            val = temp;
        }
        Ok(val)
    }

    fn parse_unary_minus(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        if tokens.peek()?.kind != TokenKind::OpMinus {
            return self.parse_new(tokens, as_lval, statement_start);
        }
        tokens.dequeue()?;
        let val = self.parse_new(tokens, false, false)?;
        // constant-fold a literal number
        if let Value::Number(n) = val {
            return Ok(Value::number(-n));
        }
        let val = self.fully_evaluate(val);
        let out = self.output();
        let temp = Value::Temp(out.next_temp());
        out.add(Line::new(temp.clone(), Op::AMinusB, Value::zero(), val));
        Ok(temp)
    }

    fn parse_new(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        if !tokens.peek()?.is_keyword("new") {
            return self.parse_address_of(tokens, as_lval, statement_start);
        }
        tokens.dequeue()?;
        let isa = self.parse_new(tokens, false, false)?;
        let isa = self.fully_evaluate(isa);
        // a map literal with just __isa, copied afresh on each execution
        let map = ValMap::new();
        map.set(Value::string(ISA_KEY), isa);
        let out = self.output();
        let temp = Value::Temp(out.next_temp());
        out.add(Line::new(
            temp.clone(),
            Op::CopyA,
            Value::Map(Rc::new(map)),
            Value::Null,
        ));
        Ok(temp)
    }

    fn parse_address_of(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        if tokens.peek()?.kind != TokenKind::AddressOf {
            return self.parse_power(tokens, as_lval, statement_start);
        }
        tokens.dequeue()?;
        let val = self.parse_power(tokens, true, statement_start)?;
        Ok(match val {
            Value::Var { name, .. } => Value::Var {
                name,
                no_invoke: true,
            },
            Value::SeqElem {
                sequence, index, ..
            } => Value::SeqElem {
                sequence,
                index,
                no_invoke: true,
            },
            other => other,
        })
    }

    fn parse_power(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_call_expr(tokens, as_lval, statement_start)?;
        while tokens.peek()?.kind == TokenKind::OpPower {
            tokens.dequeue()?;
            val = self.fully_evaluate(val);
            self.allow_line_break(tokens)?;
            // the right side loops back up so `2^-3` and `2^3^2` work
            let op_b = self.parse_unary_minus(tokens, false, false)?;
            let op_b = self.fully_evaluate(op_b);
            let out = self.output();
            let temp = Value::Temp(out.next_temp());
            out.add(Line::new(temp.clone(), Op::APowB, val, op_b));
            val = temp;
        }
        Ok(val)
    }

    fn parse_call_expr(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        let mut val = self.parse_map(tokens, as_lval, statement_start)?;
        loop {
            let tok = tokens.peek()?;
            match tok.kind {
                TokenKind::Dot => {
                    tokens.dequeue()?;
                    let ident = self.require_token(tokens, TokenKind::Identifier)?;
                    val = self.fully_evaluate(val);
                    val = Value::seq_elem(val, Value::string(ident.text));
                    let peek = tokens.peek()?;
                    if peek.kind == TokenKind::LParen && !peek.after_space {
                        val = self.parse_call_args(val, tokens)?;
                    }
                }
                TokenKind::LSquare => {
                    tokens.dequeue()?;
                    val = self.fully_evaluate(val);
                    if tokens.peek()?.kind == TokenKind::Colon {
                        // seq[:to]
                        tokens.dequeue()?;
                        let to = if tokens.peek()?.kind == TokenKind::RSquare {
                            Value::Null
                        } else {
                            self.parse_expr_val(tokens)?
                        };
                        val = self.compile_slice(val, Value::zero(), to);
                    } else {
                        let index = self.parse_expr(tokens, false, false)?;
                        if tokens.peek()?.kind == TokenKind::Colon {
                            // seq[from:to] or seq[from:]
                            tokens.dequeue()?;
                            let from = self.fully_evaluate(index);
                            let to = if tokens.peek()?.kind == TokenKind::RSquare {
                                Value::Null
                            } else {
                                self.parse_expr_val(tokens)?
                            };
                            val = self.compile_slice(val, from, to);
                        } else {
                            let index = self.fully_evaluate(index);
                            val = Value::seq_elem(val, index);
                        }
                    }
                    self.require_token(tokens, TokenKind::RSquare)?;
                }
                TokenKind::LParen if !tok.after_space => {
                    val = self.parse_call_args(val, tokens)?;
                }
                _ => break,
            }
        }
        Ok(val)
    }

    fn parse_call_args(&mut self, func_ref: Value, tokens: &mut Lexer) -> Result<Value, Error> {
        let mut arg_count = 0;
        if tokens.peek()?.kind == TokenKind::LParen {
            tokens.dequeue()?;
            if tokens.peek()?.kind == TokenKind::RParen {
                tokens.dequeue()?;
            } else {
                loop {
                    self.allow_line_break(tokens)?;
                    let arg = self.parse_expr(tokens, false, false)?;
                    let arg = self.fully_evaluate(arg);
                    self.output()
                        .add(Line::new(Value::Null, Op::PushParam, arg, Value::Null));
                    arg_count += 1;
                    self.allow_line_break(tokens)?;
                    let next =
                        self.require_either(tokens, TokenKind::Comma, TokenKind::RParen)?;
                    if next.kind == TokenKind::RParen {
                        break;
                    }
                }
            }
        }
        let out = self.output();
        let result = Value::Temp(out.next_temp());
        out.add(Line::new(
            result.clone(),
            Op::CallFunctionA,
            func_ref,
            Value::number(arg_count as f64),
        ));
        Ok(result)
    }

    /// Slices compile to a call of the `slice` intrinsic's wrapper.
    fn compile_slice(&mut self, seq: Value, from: Value, to: Value) -> Value {
        let out = self.output();
        out.add(Line::new(Value::Null, Op::PushParam, seq, Value::Null));
        out.add(Line::new(Value::Null, Op::PushParam, from, Value::Null));
        out.add(Line::new(Value::Null, Op::PushParam, to, Value::Null));
        let func = intrinsics::get_by_name("slice")
            .map(|i| i.get_func())
            .unwrap_or(Value::Null);
        let result = Value::Temp(out.next_temp());
        out.add(Line::new(
            result.clone(),
            Op::CallFunctionA,
            func,
            Value::number(3.0),
        ));
        result
    }

    fn parse_map(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        if tokens.peek()?.kind != TokenKind::LCurly {
            return self.parse_list(tokens, as_lval, statement_start);
        }
        tokens.dequeue()?;
        let map = ValMap::new();
        loop {
            self.allow_line_break(tokens)?;
            if tokens.peek()?.kind == TokenKind::RCurly {
                tokens.dequeue()?;
                break;
            }
            // a bare identifier directly before the colon is a string key
            let peek = tokens.peek()?;
            let key = if peek.kind == TokenKind::Identifier
                && tokens.peek_ahead(1)?.kind == TokenKind::Colon
            {
                tokens.dequeue()?;
                Value::string(peek.text)
            } else {
                self.parse_expr_val(tokens)?
            };
            self.require_token(tokens, TokenKind::Colon)?;
            self.allow_line_break(tokens)?;
            let value = self.parse_expr_val(tokens)?;
            self.finish_pending_function(tokens)?;
            map.set(key, value);
            let next = self.require_either(tokens, TokenKind::Comma, TokenKind::RCurly)?;
            if next.kind == TokenKind::RCurly {
                break;
            }
        }
        let out = self.output();
        let temp = Value::Temp(out.next_temp());
        out.add(Line::new(
            temp.clone(),
            Op::CopyA,
            Value::Map(Rc::new(map)),
            Value::Null,
        ));
        Ok(temp)
    }

    fn parse_list(
        &mut self,
        tokens: &mut Lexer,
        as_lval: bool,
        statement_start: bool,
    ) -> Result<Value, Error> {
        if tokens.peek()?.kind != TokenKind::LSquare {
            return self.parse_quantity(tokens, as_lval, statement_start);
        }
        tokens.dequeue()?;
        let mut items = Vec::new();
        loop {
            self.allow_line_break(tokens)?;
            if tokens.peek()?.kind == TokenKind::RSquare {
                tokens.dequeue()?;
                break;
            }
            let item = self.parse_expr_val(tokens)?;
            self.finish_pending_function(tokens)?;
            items.push(item);
            let next = self.require_either(tokens, TokenKind::Comma, TokenKind::RSquare)?;
            if next.kind == TokenKind::RSquare {
                break;
            }
        }
        let out = self.output();
        let temp = Value::Temp(out.next_temp());
        out.add(Line::new(
            temp.clone(),
            Op::CopyA,
            Value::from_vec(items),
            Value::Null,
        ));
        Ok(temp)
    }

    fn parse_quantity(
        &mut self,
        tokens: &mut Lexer,
        _as_lval: bool,
        _statement_start: bool,
    ) -> Result<Value, Error> {
        if tokens.peek()?.kind != TokenKind::LParen {
            return self.parse_atom(tokens);
        }
        tokens.dequeue()?;
        self.allow_line_break(tokens)?;
        let val = self.parse_expr(tokens, false, false)?;
        self.allow_line_break(tokens)?;
        self.require_token(tokens, TokenKind::RParen)?;
        Ok(val)
    }

    fn parse_atom(&mut self, tokens: &mut Lexer) -> Result<Value, Error> {
        let tok = tokens.dequeue()?;
        match tok.kind {
            TokenKind::Number => self.number_from(tokens, &tok),
            TokenKind::String => Ok(Value::string(tok.text)),
            TokenKind::Identifier => Ok(Value::var(tok.text)),
            TokenKind::Keyword if tok.text == "null" => Ok(Value::Null),
            TokenKind::Keyword if tok.text == "true" => Ok(Value::one()),
            TokenKind::Keyword if tok.text == "false" => Ok(Value::zero()),
            _ => Err(self.cerr(
                tokens,
                format!("got {tok} where number, string, or identifier is required"),
            )),
        }
    }

    fn number_from(&self, tokens: &Lexer, tok: &Token) -> Result<Value, Error> {
        tok.text
            .parse::<f64>()
            .map(Value::number)
            .map_err(|_| self.cerr(tokens, format!("invalid numeric literal '{}'", tok.text)))
    }

    /// Skip newlines inside bracketed or operator-continued expressions.
    fn allow_line_break(&mut self, tokens: &mut Lexer) -> Result<(), Error> {
        while !tokens.at_end() {
            let tok = tokens.peek()?;
            if tok.kind == TokenKind::EOL && tok.text == "\n" {
                tokens.dequeue()?;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn require_token(&mut self, tokens: &mut Lexer, kind: TokenKind) -> Result<Token, Error> {
        let tok = tokens.dequeue()?;
        if tok.kind != kind {
            return Err(self.cerr(tokens, format!("got {tok} where {kind:?} is required")));
        }
        Ok(tok)
    }

    fn require_either(
        &mut self,
        tokens: &mut Lexer,
        kind_a: TokenKind,
        kind_b: TokenKind,
    ) -> Result<Token, Error> {
        let tok = tokens.dequeue()?;
        if tok.kind != kind_a && tok.kind != kind_b {
            return Err(self.cerr(
                tokens,
                format!("got {tok} where {kind_a:?} or {kind_b:?} is required"),
            ));
        }
        Ok(tok)
    }

    fn require_keyword(&mut self, tokens: &mut Lexer, text: &str) -> Result<Token, Error> {
        let tok = tokens.dequeue()?;
        if !tok.is_keyword(text) {
            return Err(self.cerr(tokens, format!("got {tok} where '{text}' is required")));
        }
        Ok(tok)
    }

    fn require_eol(&mut self, tokens: &mut Lexer) -> Result<(), Error> {
        let tok = tokens.peek()?;
        if tok.kind != TokenKind::EOL {
            return Err(self.cerr(tokens, format!("got {tok} where end of line is required")));
        }
        tokens.dequeue()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ops(source: &str) -> Vec<Op> {
        let mut parser = Parser::new();
        parser.parse(source, false).unwrap();
        let code = parser.global_code();
        let ops: Vec<Op> = code.borrow().iter().map(|l| l.op).collect();
        ops
    }

    #[test]
    fn test_assignment_optimization_retargets_temp() {
        let mut parser = Parser::new();
        parser.parse("x = 1 + 2", false).unwrap();
        let code = parser.global_code();
        let code = code.borrow();
        // the add goes straight into x, with no separate AssignA
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].op, Op::APlusB);
        assert!(matches!(&code[0].lhs, Value::Var { name, .. } if &**name == "x"));
    }

    #[test]
    fn test_plain_literal_assignment() {
        let mut parser = Parser::new();
        parser.parse("x = 42", false).unwrap();
        let code = parser.global_code();
        let code = code.borrow();
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].op, Op::AssignA);
    }

    #[test]
    fn test_expression_statement_gets_implicit_result() {
        let ops = parse_ops("6*7");
        assert_eq!(ops, vec![Op::ATimesB, Op::AssignImplicit]);
    }

    #[test]
    fn test_variable_reads_become_zero_arg_calls() {
        let ops = parse_ops("x = y");
        assert_eq!(ops, vec![Op::CallFunctionA]);
    }

    #[test]
    fn test_address_of_suppresses_call() {
        let mut parser = Parser::new();
        parser.parse("x = @y", false).unwrap();
        let code = parser.global_code();
        let code = code.borrow();
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].op, Op::AssignA);
        assert!(matches!(&code[0].rhs_a, Value::Var { no_invoke: true, .. }));
    }

    #[test]
    fn test_if_backpatching_resolves() {
        let mut parser = Parser::new();
        parser
            .parse("if 1 then\nx = 1\nelse\nx = 2\nend if", false)
            .unwrap();
        let code = parser.global_code();
        for line in code.borrow().iter() {
            if matches!(line.op, Op::GotoA | Op::GotoAifNotB) {
                assert!(
                    matches!(line.rhs_a, Value::Number(_)),
                    "unpatched jump: {line}"
                );
            }
        }
    }

    #[test]
    fn test_while_loop_shape() {
        let ops = parse_ops("while x < 3\nx = x + 1\nend while");
        assert_eq!(ops.last(), Some(&Op::GotoA));
        assert!(ops.contains(&Op::GotoAifNotB));
    }

    #[test]
    fn test_for_loop_lowering() {
        let ops = parse_ops("for i in [1,2]\nend for");
        assert!(ops.contains(&Op::LengthOfA));
        assert!(ops.contains(&Op::ElemBofIterA));
        assert!(ops.contains(&Op::AGreatOrEqualB));
    }

    #[test]
    fn test_function_literal_binds() {
        let ops = parse_ops("f = function(x)\nreturn x\nend function");
        assert_eq!(ops, vec![Op::BindAssignA]);
    }

    #[test]
    fn test_mismatched_block_fails() {
        let mut parser = Parser::new();
        assert!(parser.parse("end while", false).is_err());
        let mut parser = Parser::new();
        assert!(parser.parse("break", false).is_err());
        let mut parser = Parser::new();
        assert!(parser.parse("if 1 then\nx = 1", false).is_err());
    }

    #[test]
    fn test_repl_partial_input() {
        let mut parser = Parser::new();
        parser.parse("x = 1 +", true).unwrap();
        assert!(parser.need_more_input());
        parser.parse("2", true).unwrap();
        assert!(!parser.need_more_input());
    }

    #[test]
    fn test_repl_open_function_needs_more() {
        let mut parser = Parser::new();
        parser.parse("f = function(x)", true).unwrap();
        assert!(parser.need_more_input());
        parser.parse("return x", true).unwrap();
        assert!(parser.need_more_input());
        parser.parse("end function", true).unwrap();
        assert!(!parser.need_more_input());
    }

    #[test]
    fn test_ends_with_line_continuation() {
        assert!(Parser::ends_with_line_continuation("x = 1 +"));
        assert!(Parser::ends_with_line_continuation("f(1,"));
        assert!(Parser::ends_with_line_continuation("x and"));
        assert!(!Parser::ends_with_line_continuation("x = 1"));
        assert!(!Parser::ends_with_line_continuation("print \"hi\""));
    }
}
