//! Command-line override grammar.
//!
//! ```text
//! override  := ['+' | '~'] path ['=' values]
//! values    := element (',' element)*
//! element   := quoted | '[' [element (',' element)*] ']' | bare
//! ```
//!
//! A single element is a plain assignment; several comma-separated elements
//! form a sweep axis. Commas inside brackets or quotes do not split.

mod error;
mod lexer;
mod parser;

pub use error::ParseError;
pub use parser::{parse_all, parse_override, Override, OverrideKind, OverrideValue};
