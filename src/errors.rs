//! The three error families of the pipeline, unified for the host API.

use std::{error::Error as StdError, fmt::Display};

use crate::lexer::LexError;
use crate::machine::error::RuntimeError;
use crate::parser::CompilerError;

#[derive(Clone, Debug)]
pub enum Error {
    Lexer(LexError),
    Compiler(CompilerError),
    Runtime(RuntimeError),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Lexer(e) => e.fmt(f),
            Error::Compiler(e) => e.fmt(f),
            Error::Runtime(e) => e.fmt(f),
        }
    }
}

impl StdError for Error {}

impl From<LexError> for Error {
    fn from(e: LexError) -> Self {
        Error::Lexer(e)
    }
}

impl From<CompilerError> for Error {
    fn from(e: CompilerError) -> Self {
        Error::Compiler(e)
    }
}

impl From<RuntimeError> for Error {
    fn from(e: RuntimeError) -> Self {
        Error::Runtime(e)
    }
}
