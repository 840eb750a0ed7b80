//! # MiniScript
//!
//! This binary is the command-line front-end for the MiniScript runtime. It
//! runs a script file to completion, or drops into an interactive REPL when
//! no file is given.

mod cli;

use cli::*;

use std::cell::Cell;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::rc::Rc;

use colored::Colorize;
use log::info;
use miniscript::interpreter::Interpreter;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::init();

    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    match &args.file {
        Some(file) => run_file(file, args.dump_tac),
        None => repl(),
    }
}

fn run_file(path: &Path, dump_tac: bool) -> Result<(), Box<dyn Error>> {
    let source = std::fs::read_to_string(path)?;

    let had_error = Rc::new(Cell::new(false));
    let error_flag = had_error.clone();
    let mut interpreter = Interpreter::with_outputs(
        source,
        Rc::new(|s: &str| println!("{s}")),
        Rc::new(move |s: &str| {
            error_flag.set(true);
            eprintln!("{}", s.red());
        }),
    );

    if dump_tac {
        match interpreter.tac_listing() {
            Ok(listing) => {
                print!("{listing}");
                return Ok(());
            }
            Err(e) => {
                eprintln!("{}", e.to_string().red());
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = interpreter.compile() {
        eprintln!("{}", e.to_string().red());
        std::process::exit(1);
    }
    info!("running {}", path.display());

    while !interpreter.is_done() && !had_error.get() {
        interpreter.run_until_done(60.0, false);
    }

    if had_error.get() {
        std::process::exit(1);
    }
    Ok(())
}

fn repl() -> Result<(), Box<dyn Error>> {
    let mut interpreter = Interpreter::new("");
    interpreter.implicit_output = Some(interpreter.standard_output.clone());
    interpreter.error_output = Rc::new(|s: &str| eprintln!("{}", s.red()));

    let stdin = io::stdin();
    loop {
        let prompt = if interpreter.need_more_input() {
            ">>> "
        } else {
            "> "
        };
        print!("{prompt}");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        interpreter.repl(line.trim_end_matches(['\n', '\r']), 60.0);
    }
    Ok(())
}
