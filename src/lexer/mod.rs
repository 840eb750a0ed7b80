//! Tokenization of MiniScript source.
//!
//! The lexer hands out tokens one at a time through `peek`/`dequeue`, tracking
//! the current line number and whether each token was preceded by whitespace
//! (which the parser needs for statement-level minus disambiguation).

mod token;

pub use token::*;

use std::collections::VecDeque;
use std::{collections::HashSet, error::Error, fmt::Display};

use once_cell::sync::Lazy;

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "break", "continue", "else", "end", "for", "function", "if", "in", "isa", "new", "null",
        "then", "repeat", "return", "while", "and", "or", "not", "true", "false",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub line_num: usize,
}

pub type LexResult<T> = Result<T, LexError>;

impl LexError {
    fn new(message: impl Into<String>, line_num: usize) -> Self {
        Self {
            message: message.into(),
            line_num,
        }
    }
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lexer Error: {} [line {}]", self.message, self.line_num)
    }
}

impl Error for LexError {}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line_num: usize,
    pending: VecDeque<Token>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line_num: 1,
            pending: VecDeque::new(),
        }
    }

    /// 1-based line number of the token about to be produced.
    pub fn line_num(&self) -> usize {
        self.line_num
    }

    pub fn at_end(&mut self) -> bool {
        self.skip_inline_whitespace_probe();
        self.pending.is_empty() && self.position >= self.input.len()
    }

    /// Return the next token without consuming it. At end of input this
    /// returns an EOL token.
    pub fn peek(&mut self) -> LexResult<Token> {
        if self.pending.is_empty() {
            let tok = self.scan_token()?;
            self.pending.push_back(tok);
        }
        Ok(self.pending.front().cloned().unwrap())
    }

    /// Look `n` tokens past the next one (peek() is peek_ahead(0)).
    pub fn peek_ahead(&mut self, n: usize) -> LexResult<Token> {
        while self.pending.len() <= n {
            let tok = self.scan_token()?;
            self.pending.push_back(tok);
        }
        Ok(self.pending[n].clone())
    }

    /// Consume and return the next token.
    pub fn dequeue(&mut self) -> LexResult<Token> {
        if let Some(tok) = self.pending.pop_front() {
            return Ok(tok);
        }
        self.scan_token()
    }

    /// True when the character right after the already-scanned tokens is
    /// whitespace (or the end of input). Look-ahead used together with
    /// `after_space` for the unary-minus rule.
    pub fn is_at_whitespace(&self) -> bool {
        match self.input.get(self.position) {
            Some(c) => c.is_whitespace(),
            None => true,
        }
    }

    /// Last token of `source`, skipping comments. A lexing failure yields an
    /// Unknown token so that the parser gets to report the real error.
    pub fn last_token(source: &str) -> Token {
        let mut lexer = Lexer::new(source);
        let mut last = Token::eol();
        while !lexer.at_end() {
            match lexer.dequeue() {
                // the empty EOL produced at end of input is not a real token
                Ok(tok) if tok.kind == TokenKind::EOL && tok.text.is_empty() => {}
                Ok(tok) => last = tok,
                Err(_) => return Token::new(TokenKind::Unknown, ""),
            }
        }
        last
    }

    /// Strip a trailing `// ...` comment, leaving string literals intact.
    pub fn trim_comment(line: &str) -> String {
        let chars: Vec<char> = line.chars().collect();
        let mut in_string = false;
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '"' => in_string = !in_string,
                '/' if !in_string && i + 1 < chars.len() && chars[i + 1] == '/' => {
                    return chars[..i].iter().collect();
                }
                _ => {}
            }
            i += 1;
        }
        line.to_string()
    }

    // `at_end` must not report true while spaces still precede a real token,
    // nor false for trailing spaces; resolving that requires no side effects,
    // so this only inspects.
    fn skip_inline_whitespace_probe(&mut self) {
        while self
            .input
            .get(self.position)
            .map(|c| *c == ' ' || *c == '\t' || *c == '\r')
            .unwrap_or(false)
        {
            self.position += 1;
        }
    }

    fn scan_token(&mut self) -> LexResult<Token> {
        let mut after_space = false;
        loop {
            match self.input.get(self.position) {
                Some(' ') | Some('\t') | Some('\r') => {
                    after_space = true;
                    self.position += 1;
                }
                Some('/')
                    if self.input.get(self.position + 1) == Some(&'/') =>
                {
                    // comment runs to end of line; the newline itself still
                    // produces an EOL token
                    while self
                        .input
                        .get(self.position)
                        .map(|c| *c != '\n')
                        .unwrap_or(false)
                    {
                        self.position += 1;
                    }
                    after_space = true;
                }
                _ => break,
            }
        }

        let Some(&c) = self.input.get(self.position) else {
            let mut tok = Token::eol();
            tok.after_space = after_space;
            return Ok(tok);
        };

        let mut tok = match c {
            '\n' => {
                self.position += 1;
                self.line_num += 1;
                Token::new(TokenKind::EOL, "\n")
            }
            ';' => {
                self.position += 1;
                Token::new(TokenKind::EOL, ";")
            }
            '"' => self.scan_string()?,
            '0'..='9' => self.scan_number()?,
            '.' if matches!(self.input.get(self.position + 1), Some('0'..='9')) => {
                self.scan_number()?
            }
            'a'..='z' | 'A'..='Z' | '_' => self.scan_identifier(),
            _ => self.scan_operator()?,
        };
        tok.after_space = after_space;
        Ok(tok)
    }

    fn scan_string(&mut self) -> LexResult<Token> {
        let start_line = self.line_num;
        self.position += 1; // opening quote
        let mut text = String::new();
        loop {
            match self.input.get(self.position) {
                None => {
                    return Err(LexError::new("unterminated string literal", start_line));
                }
                Some('"') => {
                    // doubled quote is an embedded quote, anything else ends
                    // the literal
                    if self.input.get(self.position + 1) == Some(&'"') {
                        text.push('"');
                        self.position += 2;
                    } else {
                        self.position += 1;
                        break;
                    }
                }
                Some('\n') => {
                    return Err(LexError::new("unterminated string literal", start_line));
                }
                Some(&c) => {
                    text.push(c);
                    self.position += 1;
                }
            }
        }
        Ok(Token::new(TokenKind::String, text))
    }

    fn scan_number(&mut self) -> LexResult<Token> {
        let mut text = String::new();
        while let Some(&c) = self.input.get(self.position) {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.position += 1;
            } else if c == 'e' || c == 'E' {
                text.push(c);
                self.position += 1;
                if let Some(&sign) = self.input.get(self.position) {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.position += 1;
                    }
                }
            } else {
                break;
            }
        }
        if text.parse::<f64>().is_err() {
            return Err(LexError::new(
                format!("invalid numeric literal '{text}'"),
                self.line_num,
            ));
        }
        Ok(Token::new(TokenKind::Number, text))
    }

    fn scan_identifier(&mut self) -> Token {
        let text = self.read_identifier_text();
        if !KEYWORDS.contains(text.as_str()) {
            return Token::new(TokenKind::Identifier, text);
        }
        // "end function", "end if", "end while", "end for" and "else if" are
        // single keyword tokens
        let joinable: &[&str] = match text.as_str() {
            "end" => &["function", "if", "while", "for"],
            "else" => &["if"],
            _ => &[],
        };
        if !joinable.is_empty() {
            let saved = self.position;
            while self
                .input
                .get(self.position)
                .map(|c| *c == ' ' || *c == '\t')
                .unwrap_or(false)
            {
                self.position += 1;
            }
            if matches!(self.input.get(self.position), Some(c) if c.is_ascii_alphabetic()) {
                let next = self.read_identifier_text();
                if joinable.contains(&next.as_str()) {
                    return Token::new(TokenKind::Keyword, format!("{text} {next}"));
                }
            }
            self.position = saved;
        }
        Token::new(TokenKind::Keyword, text)
    }

    fn read_identifier_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(&c) = self.input.get(self.position) {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.position += 1;
            } else {
                break;
            }
        }
        text
    }

    fn scan_operator(&mut self) -> LexResult<Token> {
        let c = self.input[self.position];
        let next = self.input.get(self.position + 1).copied();
        let (kind, len) = match (c, next) {
            ('=', Some('=')) => (TokenKind::OpEqual, 2),
            ('=', _) => (TokenKind::OpAssign, 1),
            ('!', Some('=')) => (TokenKind::OpNotEqual, 2),
            ('>', Some('=')) => (TokenKind::OpGreatEqual, 2),
            ('>', _) => (TokenKind::OpGreater, 1),
            ('<', Some('=')) => (TokenKind::OpLessEqual, 2),
            ('<', _) => (TokenKind::OpLesser, 1),
            ('+', _) => (TokenKind::OpPlus, 1),
            ('-', _) => (TokenKind::OpMinus, 1),
            ('*', _) => (TokenKind::OpTimes, 1),
            ('/', _) => (TokenKind::OpDivide, 1),
            ('%', _) => (TokenKind::OpMod, 1),
            ('^', _) => (TokenKind::OpPower, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LSquare, 1),
            (']', _) => (TokenKind::RSquare, 1),
            ('{', _) => (TokenKind::LCurly, 1),
            ('}', _) => (TokenKind::RCurly, 1),
            ('@', _) => (TokenKind::AddressOf, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('.', _) => (TokenKind::Dot, 1),
            (':', _) => (TokenKind::Colon, 1),
            _ => {
                return Err(LexError::new(
                    format!("unexpected character '{c}'"),
                    self.line_num,
                ));
            }
        };
        let text: String = self.input[self.position..self.position + len]
            .iter()
            .collect();
        self.position += len;
        Ok(Token::new(kind, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut result = vec![];
        while !lexer.at_end() {
            result.push(lexer.dequeue().unwrap().kind);
        }
        result
    }

    fn texts(source: &str) -> Vec<String> {
        let mut lexer = Lexer::new(source);
        let mut result = vec![];
        while !lexer.at_end() {
            result.push(lexer.dequeue().unwrap().text);
        }
        result
    }

    #[test]
    fn test_lex_identifier() {
        let mut lexer = Lexer::new("letter");
        assert_eq!(
            Ok(Token::new(TokenKind::Identifier, "letter")),
            lexer.dequeue()
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(texts("1337 3.14 .5 1e3 2.5e-4"), ["1337", "3.14", ".5", "1e3", "2.5e-4"]);
        assert_eq!(
            kinds("1337 3.14"),
            [TokenKind::Number, TokenKind::Number]
        );
    }

    #[test]
    fn test_lex_invalid_number() {
        let mut lexer = Lexer::new("1.2.3");
        assert!(lexer.dequeue().is_err());
    }

    #[test]
    fn test_lex_string_with_embedded_quote() {
        let mut lexer = Lexer::new("\"say \"\"hi\"\"\"");
        assert_eq!(
            Ok(Token::new(TokenKind::String, "say \"hi\"")),
            lexer.dequeue()
        );
    }

    #[test]
    fn test_lex_unterminated_string() {
        let mut lexer = Lexer::new("\"oops");
        assert!(lexer.dequeue().is_err());
    }

    #[test]
    fn test_lex_keywords_and_compounds() {
        assert_eq!(
            texts("if x then end if"),
            ["if", "x", "then", "end if"]
        );
        assert_eq!(texts("end function"), ["end function"]);
        assert_eq!(texts("else if"), ["else if"]);
        // "end" followed by a non-block word stays a bare keyword
        assert_eq!(texts("end game"), ["end", "game"]);
    }

    #[test]
    fn test_lex_operators_longest_match() {
        assert_eq!(
            kinds("== != >= <= > < ="),
            [
                TokenKind::OpEqual,
                TokenKind::OpNotEqual,
                TokenKind::OpGreatEqual,
                TokenKind::OpLessEqual,
                TokenKind::OpGreater,
                TokenKind::OpLesser,
                TokenKind::OpAssign,
            ]
        );
    }

    #[test]
    fn test_semicolon_is_eol() {
        let mut lexer = Lexer::new("a; b");
        lexer.dequeue().unwrap();
        let semi = lexer.dequeue().unwrap();
        assert_eq!(semi.kind, TokenKind::EOL);
        assert_eq!(semi.text, ";");
        assert_eq!(lexer.line_num(), 1);
    }

    #[test]
    fn test_line_numbers() {
        let mut lexer = Lexer::new("a\nb\nc");
        assert_eq!(lexer.line_num(), 1);
        lexer.dequeue().unwrap(); // a
        lexer.dequeue().unwrap(); // EOL
        assert_eq!(lexer.line_num(), 2);
        lexer.dequeue().unwrap(); // b
        lexer.dequeue().unwrap(); // EOL
        lexer.dequeue().unwrap(); // c
        assert_eq!(lexer.line_num(), 3);
    }

    #[test]
    fn test_after_space_flag() {
        let mut lexer = Lexer::new("a -1");
        lexer.dequeue().unwrap();
        let minus = lexer.dequeue().unwrap();
        assert_eq!(minus.kind, TokenKind::OpMinus);
        assert!(minus.after_space);
        assert!(!lexer.is_at_whitespace());

        let mut lexer = Lexer::new("a - 1");
        lexer.dequeue().unwrap();
        lexer.peek().unwrap();
        assert!(lexer.is_at_whitespace());
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(texts("a // comment\nb"), ["a", "\n", "b"]);
    }

    #[test]
    fn test_last_token() {
        assert_eq!(Lexer::last_token("x = y +").kind, TokenKind::OpPlus);
        assert_eq!(Lexer::last_token("x = 1").kind, TokenKind::Number);
        assert_eq!(
            Lexer::last_token("x = 1 // trailing").kind,
            TokenKind::Number
        );
    }

    #[test]
    fn test_trim_comment() {
        assert_eq!(Lexer::trim_comment("x = 1 // note"), "x = 1 ");
        assert_eq!(Lexer::trim_comment("s = \"//not\" // yes"), "s = \"//not\" ");
    }
}
