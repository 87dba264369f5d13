//! # Refbroker Lexer
//!
//! Tokenizer for PHP-style declaration sources.
//!
//! The lexer turns one source unit into an immutable [`TokenStream`]. It never
//! interprets what it reads: declarations are discovered later by walking the
//! stream, so the only failures here are lexical ones (an unterminated string
//! or comment, a stray control character).
//!
//! ```text
//! Source text
//!     │
//!     ├──> Inline text (outside <?php ... ?>)
//!     │
//!     └──> Code
//!          ├─> Keywords / names / variables
//!          ├─> Literals (strings, numbers)
//!          ├─> Comments (doc comments kept distinct)
//!          └─> Punctuation
//! ```
//!
//! ## Example
//!
//! ```rust
//! use refbroker_lexer::{Lexer, TokenKind};
//!
//! let stream = Lexer::new().tokenize("<?php\nclass Greeter {}\n").unwrap();
//! assert_eq!(stream.get(1).map(|t| t.kind), Some(TokenKind::Class));
//! assert_eq!(stream.get(2).map(|t| t.text.as_str()), Some("Greeter"));
//! ```

mod error;
mod lexer;
mod token;

pub use error::{LexError, Result};
pub use lexer::Lexer;
pub use token::{Token, TokenKind, TokenStream, NAMESPACE_SEPARATOR};
