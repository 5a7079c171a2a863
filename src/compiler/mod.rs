//! This module contains the compiler implementation.
//!
//! Each step in the compiler pipeline turns one datatype into another.
//! loosely, starting with `Source` (string + path):
//!
//! 1. Tokens:   `lex.rs`
//! 2. Program:  `parse.rs`, with expressions in `expr.rs`
//!
//! There is no tree in between: statements are lowered straight
//! to stack code, one function body at a time.
//! Bracketed groups are kept whole by the lexer and
//! lexed again when the parser needs what's inside them.

pub mod expr;
pub mod lex;
pub mod parse;

pub mod syntax;

use std::rc::Rc;

use crate::{
    common::source::Source,
    compiler::{lex::Lexer, parse::Parser, syntax::Syntax},
    construct::{function::Program, token::Tokens},
};

/// Lexes a source into a flat stream of top-level tokens.
pub fn lex(source: Rc<Source>) -> Result<Tokens, Syntax> {
    Lexer::lex(source)
}

/// Parses a source into a `Program`, ready to be loaded into a VM.
pub fn parse(source: Rc<Source>) -> Result<Program, Syntax> {
    Parser::parse(source)
}
