use std::{error::Error, fmt::Display};

use crate::tac::SourceLoc;

/// Runtime error family. Each kind carries its payload plus an optional
/// source location, attached by the machine once the error surfaces through
/// the stepper.
#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeError {
    UndefinedIdentifier(UndefinedIdentifier, Option<SourceLoc>),
    KeyNotFound(KeyNotFound, Option<SourceLoc>),
    IndexOutOfRange(IndexOutOfRange, Option<SourceLoc>),
    TypeMismatch(TypeMismatch, Option<SourceLoc>),
    TooManyArguments(Option<SourceLoc>),
    LimitExceeded(LimitExceeded, Option<SourceLoc>),
    Generic(GenericError, Option<SourceLoc>),
}

impl RuntimeError {
    pub fn undefined_identifier(name: impl Into<String>) -> Self {
        RuntimeError::UndefinedIdentifier(
            UndefinedIdentifier {
                identifier: name.into(),
            },
            None,
        )
    }

    pub fn key_not_found(key: impl Into<String>) -> Self {
        RuntimeError::KeyNotFound(KeyNotFound { key: key.into() }, None)
    }

    pub fn index_out_of_range(index: i64, what: &'static str) -> Self {
        RuntimeError::IndexOutOfRange(IndexOutOfRange { index, what }, None)
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch(
            TypeMismatch {
                message: message.into(),
            },
            None,
        )
    }

    pub fn too_many_arguments() -> Self {
        RuntimeError::TooManyArguments(None)
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        RuntimeError::LimitExceeded(
            LimitExceeded {
                message: message.into(),
            },
            None,
        )
    }

    pub fn generic(message: impl Into<String>) -> Self {
        RuntimeError::Generic(
            GenericError {
                message: message.into(),
            },
            None,
        )
    }

    pub fn location(&self) -> Option<&SourceLoc> {
        match self {
            RuntimeError::UndefinedIdentifier(_, loc)
            | RuntimeError::KeyNotFound(_, loc)
            | RuntimeError::IndexOutOfRange(_, loc)
            | RuntimeError::TypeMismatch(_, loc)
            | RuntimeError::TooManyArguments(loc)
            | RuntimeError::LimitExceeded(_, loc)
            | RuntimeError::Generic(_, loc) => loc.as_ref(),
        }
    }

    /// Attach a location if the error doesn't already carry one.
    pub fn with_location(mut self, new_loc: SourceLoc) -> Self {
        let loc = match &mut self {
            RuntimeError::UndefinedIdentifier(_, loc)
            | RuntimeError::KeyNotFound(_, loc)
            | RuntimeError::IndexOutOfRange(_, loc)
            | RuntimeError::TypeMismatch(_, loc)
            | RuntimeError::TooManyArguments(loc)
            | RuntimeError::LimitExceeded(_, loc)
            | RuntimeError::Generic(_, loc) => loc,
        };
        if loc.is_none() {
            *loc = Some(new_loc);
        }
        self
    }

    fn message(&self) -> String {
        match self {
            RuntimeError::UndefinedIdentifier(e, _) => e.to_string(),
            RuntimeError::KeyNotFound(e, _) => e.to_string(),
            RuntimeError::IndexOutOfRange(e, _) => e.to_string(),
            RuntimeError::TypeMismatch(e, _) => e.to_string(),
            RuntimeError::TooManyArguments(_) => "Too Many Arguments".into(),
            RuntimeError::LimitExceeded(e, _) => e.to_string(),
            RuntimeError::Generic(e, _) => e.to_string(),
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Runtime Error: {}", self.message())?;
        if let Some(loc) = self.location() {
            write!(f, " {loc}")?;
        }
        Ok(())
    }
}

impl Error for RuntimeError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndefinedIdentifier {
    pub identifier: String,
}

impl Display for UndefinedIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Undefined Identifier: '{}' is unknown in this context",
            self.identifier
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyNotFound {
    pub key: String,
}

impl Display for KeyNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key Not Found: '{}' not found in map", self.key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexOutOfRange {
    pub index: i64,
    pub what: &'static str,
}

impl Display for IndexOutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Index Error ({} index {} out of range)",
            self.what, self.index
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeMismatch {
    pub message: String,
}

impl Display for TypeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Type Error ({})", self.message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimitExceeded {
    pub message: String,
}

impl Display for LimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericError {
    pub message: String,
}

impl Display for GenericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
