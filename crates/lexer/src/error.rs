use thiserror::Error;

/// Result type for lexer operations
pub type Result<T> = std::result::Result<T, LexError>;

/// Errors that can occur while tokenizing a source unit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// String literal reached end of input without its closing quote
    #[error("Unterminated string literal starting at line {line}")]
    UnterminatedString { line: u32 },

    /// Block comment reached end of input without `*/`
    #[error("Unterminated comment starting at line {line}")]
    UnterminatedComment { line: u32 },

    /// Character that cannot start any token
    #[error("Unexpected character {ch:?} at line {line}")]
    UnexpectedChar { ch: char, line: u32 },
}

impl LexError {
    /// Line the offending construct starts on (1-indexed)
    #[must_use]
    pub const fn line(&self) -> u32 {
        match self {
            Self::UnterminatedString { line }
            | Self::UnterminatedComment { line }
            | Self::UnexpectedChar { line, .. } => *line,
        }
    }
}
