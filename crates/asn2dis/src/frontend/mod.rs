//! Frontend for the specification notation
//!
//! Lexes and parses one source file into the AST module the registration
//! engine consumes. The engine itself takes [`crate::ast::Module`]
//! values; any other producer of that model (tests build it directly) is
//! equally supported.

pub mod lexer;
pub mod parser;

pub use parser::Parser;

use crate::ast::Module;
use crate::common::CompileResult;

/// Parse one source file into a module
pub fn parse_module(source: &str) -> CompileResult<Module> {
    Parser::new(source)?.parse()
}
