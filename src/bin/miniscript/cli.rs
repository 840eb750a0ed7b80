//! # Cli
//!
//! This module contains everything needed for parsing the CLI arguments for
//! the MiniScript interpreter.

use clap::{Parser, ValueEnum};

/// Struct containing the CLI configuration for the interpreter.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// The MiniScript source file to run; omit it for an interactive REPL.
    #[arg(index = 1)]
    pub file: Option<std::path::PathBuf>,

    /// Print the compiled three-address code instead of running.
    #[arg(long)]
    pub dump_tac: bool,

    /// Specify the log level of the interpreter.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

/// Enum for specifying the log level.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// The default log level. Only critical errors will be logged.
    #[default]
    #[value(alias("0"))]
    Error,

    /// A log level where warnings are logged as well.
    #[value(alias("1"))]
    Warn,

    /// Also log information about the general state of the interpreter,
    /// e.g., which files are compiled, etc.
    #[value(alias("2"))]
    Info,

    /// Log everything which happens internally in the interpreter.
    #[value(alias("3"))]
    Debug,

    /// Log extra information. This output can be quite clunky.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}
