//! Error types for tree operations.

use thiserror::Error;

/// Errors from tree construction, parsing and file I/O.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid node handle")]
    InvalidNode,
    #[error("invalid node name")]
    InvalidName,
    #[error("parse error at byte {offset}: {kind}")]
    Parse { offset: usize, kind: ParseErrorKind },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory)
    }
}

/// What went wrong while reading the text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("missing node name")]
    MissingName,
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid escape \\{0}")]
    InvalidEscape(char),
    #[error("value must directly follow the node name")]
    MisplacedValue,
}
