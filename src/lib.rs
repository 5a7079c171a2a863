//! # Ji
//! This repository contains the core of the Ji scripting language:
//! a tokenizer, a parser that lowers source straight to stack bytecode,
//! and a VM that runs it.
//! If you're looking for the command line host, see `ji-cli`.
//!
//! ## Embedding Ji in Rust
//! Add ji to your `Cargo.toml`:
//! ```toml
//! ji = 0.1
//! ```
//! Then simply:
//! ```no_run
//! use ji::{run, Source};
//!
//! fn main() {
//!     let source = Source::source("void Main() { Print(\"Hello from Ji!\"); }");
//!     if let Err(error) = run(source, "Main") {
//!         eprintln!("{}", error);
//!     }
//! }
//! ```
//!
//! ## Overview of the compilation process
//! Within the compiler pipeline, source code is represented as a `Source` object.
//! The lexer turns it into tokens, keeping bracketed groups whole.
//! The parser turns top-level declarations into `FunctionDef`s,
//! lexing group interiors as it goes, and collects them in a `Program`.
//! A `VM` compiles each definition on load (resolving labels and
//! hoisting locals), after which any function can be invoked by name.

pub mod common;
pub mod compiler;
pub mod construct;
pub mod vm;

use std::{fmt, rc::Rc};

pub use common::source::Source;
pub use compiler::syntax::Syntax;
pub use construct::function::Program;
pub use vm::{trace::Trace, value::Value, vm::VM};

/// Either kind of error a source can produce on its way to a result.
#[derive(Debug, PartialEq)]
pub enum Error {
    Syntax(Syntax),
    Trace(Trace),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax(syntax) => fmt::Display::fmt(syntax, f),
            Error::Trace(trace) => fmt::Display::fmt(trace, f),
        }
    }
}

impl From<Syntax> for Error {
    fn from(syntax: Syntax) -> Error {
        Error::Syntax(syntax)
    }
}

impl From<Trace> for Error {
    fn from(trace: Trace) -> Error {
        Error::Trace(trace)
    }
}

/// Compiles a source to a `Program`, ready to be loaded into a `VM`.
pub fn compile(source: Rc<Source>) -> Result<Program, Syntax> {
    compiler::parse(source)
}

/// Compiles a source, loads it into a fresh VM printing to stdout,
/// and invokes `entry` with no arguments.
pub fn run(source: Rc<Source>, entry: &str) -> Result<Option<Value>, Error> {
    let program = compile(source)?;
    let mut vm = VM::init();
    vm.load(program)?;
    Ok(vm.invoke(entry, vec![])?)
}
