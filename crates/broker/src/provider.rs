use crate::error::TokenizeError;
use crate::path::SourcePath;
use crate::source::read_source;
use refbroker_lexer::{Lexer, TokenStream};

/// Produces the token stream of one source unit.
///
/// Tokenizing must be free of side effects on the broker.
pub trait TokenStreamProvider {
    fn tokenize(&self, path: &SourcePath) -> Result<TokenStream, TokenizeError>;
}

/// Reads a unit from disk or an archive and runs the lexer over it
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTokenizer {
    lexer: Lexer,
}

impl FileTokenizer {
    #[must_use]
    pub const fn new(lexer: Lexer) -> Self {
        Self { lexer }
    }
}

impl TokenStreamProvider for FileTokenizer {
    fn tokenize(&self, path: &SourcePath) -> Result<TokenStream, TokenizeError> {
        let source = read_source(path)?;
        let stream = self.lexer.tokenize(&source)?;
        log::debug!("Tokenized {} ({} tokens)", path, stream.len());
        Ok(stream)
    }
}
