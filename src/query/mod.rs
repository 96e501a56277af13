//! Query construction module.
//!
//! Operations sent to the catalog are assembled as a typed intermediate
//! representation rather than as query text, and snippets found in
//! configuration are parsed into the same representation.

mod expr;
mod parser;

pub use expr::{Expr, Statement, Transaction, Verb};
pub use parser::parse_snippet;
