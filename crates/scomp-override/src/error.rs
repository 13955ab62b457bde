//! Override parse errors.

use scomp_spec::SpecError;
use thiserror::Error;

/// Errors produced while parsing a `path=value` assignment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("override '{raw}' is missing '='")]
    MissingEquals { raw: String },

    #[error("override '{raw}' has an invalid path: {source}")]
    InvalidPath {
        raw: String,
        #[source]
        source: SpecError,
    },

    #[error("override '{raw}' has an unterminated quote")]
    UnterminatedQuote { raw: String },

    #[error("override '{raw}' has unbalanced brackets")]
    UnbalancedBracket { raw: String },

    #[error("override '{raw}' has an empty value at position {position}")]
    EmptyElement { raw: String, position: usize },

    #[error("override '{raw}' has trailing characters after a closed value: '{rest}'")]
    TrailingInput { raw: String, rest: String },

    #[error("delete override '{raw}' must not carry a value")]
    DeleteWithValue { raw: String },
}
