//! Tokenizer for the subset of Starlark that shows up in BUILD files.

use compact_str::CompactString;

/// Operators made up of two characters, checked before single character punctuation.
static TWO_CHAR_PUNCT: &[&str] = &[
    "**", "==", "!=", "<=", ">=", "//", "+=", "-=", "*=", "/=", "%=", "|=", "&=", "->",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(CompactString),
    /// Numeric literal, kept as text since we only ever re-emit it.
    Number(CompactString),
    Str {
        value: String,
        /// Triple-quoted, prefixed (e.g. `r"..."`), or using an escape we don't decode (e.g.
        /// `\x41`). Re-emitting these from `value` would change what they mean or how they're
        /// written.
        verbatim: bool,
    },
    Punct(CompactString),
    Comment(CompactString),
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line of the first character.
    pub line: usize,
    /// 0-based column of the first character.
    pub col: usize,
    /// 1-based line of the last character.
    pub end_line: usize,
    /// For comments, whether nothing else precedes it on its line.
    pub own_line: bool,
}

impl Token {
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::Comment(_))
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(p) if p == punct)
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name.as_str()),
            _ => None,
        }
    }

    /// How this token changes bracket nesting.
    pub fn depth_delta(&self) -> i32 {
        match &self.kind {
            TokenKind::Punct(p) if matches!(p.as_str(), "(" | "[" | "{") => 1,
            TokenKind::Punct(p) if matches!(p.as_str(), ")" | "]" | "}") => -1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub line: usize,
    pub col: usize,
    pub message: &'static str,
}

pub(crate) struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    col: usize,
    /// Line of the most recent non-comment token.
    last_token_line: Option<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
            col: 0,
            last_token_line: None,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let (start, line, col) = (self.pos, self.line, self.col);

            let kind = match c {
                ' ' | '\t' | '\r' | '\n' | '\x0c' => {
                    self.bump();
                    continue;
                }
                '\\' if matches!(self.peek_at(1), Some('\n')) => {
                    self.bump();
                    self.bump();
                    continue;
                }
                '\\' if self.src[self.pos..].starts_with("\\\r\n") => {
                    self.bump();
                    self.bump();
                    self.bump();
                    continue;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                    let text = self.src[start..self.pos].trim_end();
                    let own_line = self.last_token_line != Some(line);
                    tokens.push(Token {
                        kind: TokenKind::Comment(CompactString::new(text)),
                        start,
                        end: start + text.len(),
                        line,
                        col,
                        end_line: line,
                        own_line,
                    });
                    continue;
                }
                '"' | '\'' => self.string(false, false)?,
                c if c.is_alphabetic() || c == '_' => {
                    while let Some(c) = self.peek() {
                        if !(c.is_alphanumeric() || c == '_') {
                            break;
                        }
                        self.bump();
                    }
                    let ident = &self.src[start..self.pos];
                    let lowered = ident.to_ascii_lowercase();
                    let is_prefix = matches!(lowered.as_str(), "r" | "b" | "rb" | "br");
                    if is_prefix && matches!(self.peek(), Some('"' | '\'')) {
                        self.string(lowered.contains('r'), true)?
                    } else {
                        TokenKind::Ident(CompactString::new(ident))
                    }
                }
                c if c.is_ascii_digit() => {
                    while let Some(c) = self.peek() {
                        if !(c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                            break;
                        }
                        self.bump();
                    }
                    TokenKind::Number(CompactString::new(&self.src[start..self.pos]))
                }
                _ => {
                    let rest = &self.src[self.pos..];
                    match TWO_CHAR_PUNCT.iter().find(|p| rest.starts_with(**p)) {
                        Some(punct) => {
                            self.bump();
                            self.bump();
                            TokenKind::Punct(CompactString::new(punct))
                        }
                        None => {
                            self.bump();
                            TokenKind::Punct(CompactString::new(&self.src[start..self.pos]))
                        }
                    }
                }
            };

            tokens.push(Token {
                kind,
                start,
                end: self.pos,
                line,
                col,
                end_line: self.line,
                own_line: false,
            });
            self.last_token_line = Some(self.line);
        }

        Ok(tokens)
    }

    /// Lex a string literal, the cursor is positioned on the opening quote.
    fn string(&mut self, raw: bool, prefixed: bool) -> Result<TokenKind, LexError> {
        let (line, col) = (self.line, self.col);
        let unterminated = LexError {
            line,
            col,
            message: "unterminated string literal",
        };

        let Some(quote) = self.bump() else {
            return Err(unterminated);
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        let mut verbatim = triple || prefixed;
        loop {
            let Some(c) = self.bump() else {
                return Err(unterminated);
            };
            match c {
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(unterminated);
                    };
                    if raw {
                        value.push('\\');
                        value.push(escaped);
                        continue;
                    }
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '\\' | '"' | '\'' => value.push(escaped),
                        '\n' => {}
                        other => {
                            verbatim = true;
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c if c == quote && !triple => break,
                c if c == quote => {
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.bump();
                        self.bump();
                        break;
                    }
                    value.push(c);
                }
                '\n' if !triple => return Err(unterminated),
                c => value.push(c),
            }
        }

        Ok(TokenKind::Str { value, verbatim })
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }
}
