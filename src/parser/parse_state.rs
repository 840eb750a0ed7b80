//! One compilation target: the code block currently being emitted into,
//! plus its pending forward jumps (back-patches) and loop headers (jump
//! points). The parser keeps a stack of these, one per open function body.

use crate::tac::{Code, Line, Op};
use crate::value::Value;

/// A forward jump whose target is filled in when the matching block
/// terminator is reached.
#[derive(Debug, Clone)]
pub struct BackPatch {
    pub line_num: usize,
    pub waiting_for: String,
}

/// A loop header that `continue` and the loop terminator jump back to.
#[derive(Debug, Clone)]
pub struct JumpPoint {
    pub line_num: usize,
    pub keyword: String,
}

pub struct ParseState {
    pub code: Code,
    pub backpatches: Vec<BackPatch>,
    pub jump_points: Vec<JumpPoint>,
    /// Temporary 0 is reserved for the return value.
    pub next_temp_num: usize,
}

impl ParseState {
    pub fn new(code: Code) -> Self {
        Self {
            code,
            backpatches: Vec::new(),
            jump_points: Vec::new(),
            next_temp_num: 0,
        }
    }

    pub fn add(&mut self, line: Line) {
        self.code.borrow_mut().push(line);
    }

    pub fn code_len(&self) -> usize {
        self.code.borrow().len()
    }

    pub fn next_temp(&mut self) -> usize {
        let n = self.next_temp_num;
        self.next_temp_num += 1;
        n
    }

    /// Record that the just-emitted jump waits for the given terminator.
    pub fn add_backpatch(&mut self, waiting_for: &str) {
        self.backpatches.push(BackPatch {
            line_num: self.code_len().saturating_sub(1),
            waiting_for: waiting_for.to_string(),
        });
    }

    pub fn add_jump_point(&mut self, keyword: &str) {
        self.jump_points.push(JumpPoint {
            line_num: self.code_len(),
            keyword: keyword.to_string(),
        });
    }

    pub fn close_jump_point(&mut self, keyword: &str) -> Option<JumpPoint> {
        match self.jump_points.last() {
            Some(jp) if jp.keyword == keyword => self.jump_points.pop(),
            _ => None,
        }
    }

    /// Whether any emitted goto (or open loop header) targets the given
    /// code position.
    pub fn is_jump_target(&self, line_num: usize) -> bool {
        let code = self.code.borrow();
        for line in code.iter() {
            if matches!(
                line.op,
                Op::GotoA | Op::GotoAifB | Op::GotoAifNotB | Op::GotoAifTrulyB
            ) {
                if let Value::Number(target) = line.rhs_a {
                    if target == line_num as f64 {
                        return true;
                    }
                }
            }
        }
        self.jump_points.iter().any(|jp| jp.line_num == line_num)
    }

    /// Walk back-patches newest to oldest, patching every one waiting for
    /// `keyword_found` (and, for loop terminators, any pending `break`s) to
    /// the current end of code. Stops after the matching opener's patch.
    pub fn patch(
        &mut self,
        keyword_found: &str,
        also_break: bool,
        reserving_lines: usize,
    ) -> Result<(), String> {
        let target = Value::number((self.code_len() + reserving_lines) as f64);
        let mut idx = self.backpatches.len();
        while idx > 0 {
            idx -= 1;
            let waiting_for = self.backpatches[idx].waiting_for.clone();
            if waiting_for == keyword_found {
                let line_num = self.backpatches[idx].line_num;
                self.code.borrow_mut()[line_num].rhs_a = target.clone();
                self.backpatches.remove(idx);
                return Ok(());
            } else if waiting_for == "break" {
                if also_break {
                    let line_num = self.backpatches[idx].line_num;
                    self.code.borrow_mut()[line_num].rhs_a = target.clone();
                    self.backpatches.remove(idx);
                }
                // otherwise leave it for the enclosing loop
            } else {
                return Err(format!("'{keyword_found}' skips open block"));
            }
        }
        Err(format!("'{keyword_found}' without matching block opener"))
    }

    /// Close an `if` block: patch every `else`/`end if` jump down to (and
    /// remove) the `if:MARK` sentinel that opened it. Pending `break`s are
    /// left for their loop.
    pub fn patch_if_block(&mut self) -> Result<(), String> {
        let target = Value::number(self.code_len() as f64);
        let mut idx = self.backpatches.len();
        while idx > 0 {
            idx -= 1;
            let waiting_for = self.backpatches[idx].waiting_for.clone();
            match waiting_for.as_str() {
                "if:MARK" => {
                    self.backpatches.remove(idx);
                    return Ok(());
                }
                "else" | "end if" => {
                    let line_num = self.backpatches[idx].line_num;
                    self.code.borrow_mut()[line_num].rhs_a = target.clone();
                    self.backpatches.remove(idx);
                }
                "break" => {}
                _ => return Err("'end if' skips open block".to_string()),
            }
        }
        Err("'end if' without matching 'if'".to_string())
    }
}
