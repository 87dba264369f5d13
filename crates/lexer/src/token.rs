use serde::{Deserialize, Serialize};

/// Separator between namespace segments in qualified names (`A\B\C`)
pub const NAMESPACE_SEPARATOR: char = '\\';

/// A single lexical token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Token category
    pub kind: TokenKind,

    /// Exact source text of the token
    pub text: String,

    /// Line the token starts on (1-indexed)
    pub line: u32,

    /// Byte offset of the first character
    pub offset: usize,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, text: impl Into<String>, line: u32, offset: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            offset,
        }
    }

    /// Last line covered by this token (multi-line comments and strings)
    #[must_use]
    pub fn end_line(&self) -> u32 {
        let newlines = self.text.bytes().filter(|b| *b == b'\n').count();
        self.line + u32::try_from(newlines).unwrap_or(u32::MAX - self.line)
    }

    /// Comments and inline text carry no structure
    #[must_use]
    pub const fn is_trivia(&self) -> bool {
        self.kind.is_trivia()
    }

    /// Check for a punctuation token with the given text
    #[must_use]
    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }
}

/// Category of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// `<?php` or `<?`
    OpenTag,
    /// `?>`
    CloseTag,
    /// Text outside of code tags
    InlineText,

    Namespace,
    Class,
    Interface,
    Trait,
    Function,
    Const,
    Extends,
    Implements,
    Abstract,
    Final,
    Use,
    New,
    Return,

    /// Bare or qualified name (`Foo`, `A\B`, `\A\B`)
    Name,
    /// `$name`
    Variable,
    /// Quoted string literal, quotes included
    String,
    /// Integer or float literal
    Number,
    /// `//` or `#` comment
    Comment,
    /// `/* ... */` comment
    BlockComment,
    /// `/** ... */` comment
    DocComment,
    /// Any operator or delimiter
    Punct,
}

impl TokenKind {
    /// Map a word to its keyword kind (case-insensitive, like the language)
    #[must_use]
    pub fn keyword(word: &str) -> Option<Self> {
        let kind = match word.to_ascii_lowercase().as_str() {
            "namespace" => Self::Namespace,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "trait" => Self::Trait,
            "function" => Self::Function,
            "const" => Self::Const,
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "abstract" => Self::Abstract,
            "final" => Self::Final,
            "use" => Self::Use,
            "new" => Self::New,
            "return" => Self::Return,
            _ => return None,
        };
        Some(kind)
    }

    #[must_use]
    pub const fn is_trivia(self) -> bool {
        matches!(
            self,
            Self::Comment | Self::BlockComment | Self::DocComment | Self::InlineText
        )
    }

    /// Keywords that open a class-like declaration
    #[must_use]
    pub const fn is_class_like(self) -> bool {
        matches!(self, Self::Class | Self::Interface | Self::Trait)
    }
}

/// Ordered, immutable token sequence for exactly one source unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    #[must_use]
    pub const fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Token] {
        &self.tokens
    }

    /// Index of the next non-trivia token at or after `from`
    #[must_use]
    pub fn next_significant(&self, from: usize) -> Option<usize> {
        (from..self.tokens.len()).find(|&idx| !self.tokens[idx].is_trivia())
    }

    /// Index of the bracket closing the one at `open`.
    ///
    /// Works for `{`, `(` and `[`; returns `None` when `open` is not an opening
    /// bracket or the bracket is never closed.
    #[must_use]
    pub fn matching_bracket(&self, open: usize) -> Option<usize> {
        let opener = self.tokens.get(open)?;
        let closer = match opener.text.as_str() {
            "{" => "}",
            "(" => ")",
            "[" => "]",
            _ => return None,
        };
        if opener.kind != TokenKind::Punct {
            return None;
        }

        let mut depth = 0usize;
        for (idx, token) in self.tokens.iter().enumerate().skip(open) {
            if token.kind != TokenKind::Punct {
                continue;
            }
            if token.text == opener.text {
                depth += 1;
            } else if token.text == closer {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
        }
        None
    }

    /// Last line touched by any token
    #[must_use]
    pub fn last_line(&self) -> u32 {
        self.tokens.last().map_or(0, Token::end_line)
    }
}

impl<'a> IntoIterator for &'a TokenStream {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}
