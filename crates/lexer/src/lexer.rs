use crate::error::{LexError, Result};
use crate::token::{Token, TokenKind, TokenStream, NAMESPACE_SEPARATOR};

/// Operators recognised as a single token, longest first
const MULTI_CHAR_PUNCT: &[&str] = &[
    "===", "!==", "<=>", "**=", "...", "??=", "<<=", ">>=", "::", "->", "=>", "==", "!=", "<>",
    "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", ".=", "%=", "&=", "|=",
    "^=", "**", "<<", ">>",
];

/// Tokenizer for PHP-style sources
#[derive(Debug, Clone, Copy)]
pub struct Lexer {
    require_open_tag: bool,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    /// Lexer that treats everything before `<?php` as inline text
    #[must_use]
    pub const fn new() -> Self {
        Self {
            require_open_tag: true,
        }
    }

    /// Lexer that starts directly in code mode (no open tag needed)
    #[must_use]
    pub const fn code_only() -> Self {
        Self {
            require_open_tag: false,
        }
    }

    /// Tokenize a complete source unit
    pub fn tokenize(&self, source: &str) -> Result<TokenStream> {
        let mut cursor = Cursor::new(source);
        let mut in_code = !self.require_open_tag;

        while !cursor.at_end() {
            if in_code {
                in_code = cursor.scan_code_token()?;
            } else {
                cursor.scan_inline();
                in_code = true;
            }
        }

        Ok(TokenStream::new(cursor.tokens))
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    tokens: Vec<Token>,
}

impl<'a> Cursor<'a> {
    const fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            tokens: Vec::new(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance(&mut self, len: usize) -> &'a str {
        let text = &self.src[self.pos..self.pos + len];
        let newlines = text.bytes().filter(|b| *b == b'\n').count();
        self.line += u32::try_from(newlines).unwrap_or(0);
        self.pos += len;
        text
    }

    fn emit(&mut self, kind: TokenKind, len: usize) {
        let line = self.line;
        let offset = self.pos;
        let text = self.advance(len);
        self.tokens.push(Token::new(kind, text, line, offset));
    }

    /// Inline text up to (and including) the next open tag
    fn scan_inline(&mut self) {
        let rest = self.rest();
        let Some(tag_start) = rest.find("<?") else {
            self.emit(TokenKind::InlineText, rest.len());
            return;
        };
        if tag_start > 0 {
            self.emit(TokenKind::InlineText, tag_start);
        }

        let rest = self.rest();
        let tag_len = if rest
            .get(..5)
            .is_some_and(|tag| tag.eq_ignore_ascii_case("<?php"))
        {
            5
        } else if rest.starts_with("<?=") {
            3
        } else {
            2
        };
        self.emit(TokenKind::OpenTag, tag_len);
    }

    /// Scan one token in code mode; returns whether we are still in code
    fn scan_code_token(&mut self) -> Result<bool> {
        let Some(ch) = self.peek() else {
            return Ok(true);
        };

        if ch.is_whitespace() {
            let len = self
                .rest()
                .find(|c: char| !c.is_whitespace())
                .unwrap_or(self.rest().len());
            self.advance(len);
            return Ok(true);
        }

        let rest = self.rest();
        if rest.starts_with("?>") {
            self.emit(TokenKind::CloseTag, 2);
            return Ok(false);
        }
        if rest.starts_with("//") || ch == '#' {
            let len = rest.find('\n').unwrap_or(rest.len());
            self.emit(TokenKind::Comment, len);
            return Ok(true);
        }
        if rest.starts_with("/*") {
            self.scan_block_comment()?;
            return Ok(true);
        }

        match ch {
            '\'' | '"' => self.scan_string(ch)?,
            '$' if self.peek_nth(1).is_some_and(is_ident_start) => {
                let len = 1 + ident_len(&rest[1..]);
                self.emit(TokenKind::Variable, len);
            }
            c if is_ident_start(c) => self.scan_name(),
            NAMESPACE_SEPARATOR if self.peek_nth(1).is_some_and(is_ident_start) => {
                self.scan_name();
            }
            c if c.is_ascii_digit() => {
                let len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                    .unwrap_or(rest.len());
                self.emit(TokenKind::Number, len);
            }
            c if c.is_control() => {
                return Err(LexError::UnexpectedChar {
                    ch: c,
                    line: self.line,
                });
            }
            c => {
                let len = MULTI_CHAR_PUNCT
                    .iter()
                    .find(|op| rest.starts_with(*op))
                    .map_or(c.len_utf8(), |op| op.len());
                self.emit(TokenKind::Punct, len);
            }
        }
        Ok(true)
    }

    fn scan_block_comment(&mut self) -> Result<()> {
        let rest = self.rest();
        let Some(end) = rest[2..].find("*/") else {
            return Err(LexError::UnterminatedComment { line: self.line });
        };
        let len = end + 4;
        // `/**/` is an empty block comment, not a doc comment
        let kind = if rest.starts_with("/**") && len > 4 {
            TokenKind::DocComment
        } else {
            TokenKind::BlockComment
        };
        self.emit(kind, len);
        Ok(())
    }

    fn scan_string(&mut self, quote: char) -> Result<()> {
        let rest = self.rest();
        let mut escaped = false;
        for (idx, c) in rest.char_indices().skip(1) {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                self.emit(TokenKind::String, idx + c.len_utf8());
                return Ok(());
            }
        }
        Err(LexError::UnterminatedString { line: self.line })
    }

    /// Bare or qualified name; keywords only when unqualified
    fn scan_name(&mut self) {
        let rest = self.rest();
        let mut len = 0;
        loop {
            let tail = &rest[len..];
            if tail.starts_with(NAMESPACE_SEPARATOR)
                && tail[1..].chars().next().is_some_and(is_ident_start)
            {
                len += 1;
            }
            let segment = ident_len(&rest[len..]);
            if segment == 0 {
                break;
            }
            len += segment;
            if !rest[len..].starts_with(NAMESPACE_SEPARATOR) {
                break;
            }
        }

        let text = &rest[..len];
        let kind = if text.contains(NAMESPACE_SEPARATOR) {
            TokenKind::Name
        } else {
            TokenKind::keyword(text).unwrap_or(TokenKind::Name)
        };
        self.emit(kind, len);
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn ident_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(idx, _)| idx)
}
