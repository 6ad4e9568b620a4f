//! Lexical analysis (tokenization)
//!
//! The lexer turns Heta source into tokens on demand; the compiler pulls one
//! token at a time. Newlines are tokens. String interpolation (`"a %(b) c"`)
//! is handled here by tracking unmatched parentheses per nesting level, so the
//! `)` that closes an interpolated expression resumes string scanning.
//!
//! Lexical errors are collected rather than reported directly; the compiler
//! drains them with [`Lexer::take_errors`] and reports them with its other
//! diagnostics.

use crate::token::{Token, TokenKind};

mod literals;

/// Interpolated expressions may nest this deep.
pub const MAX_INTERPOLATION_NESTING: usize = 8;

/// A lexical error with its source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: u32,
    pub message: String,
}

/// Lexer state for tokenizing source code
pub struct Lexer {
    /// Source bytes
    pub(super) source: Vec<u8>,
    /// Current position in source
    pub(super) current: usize,
    /// Start position of current token
    pub(super) start: usize,
    /// Current line number (1-indexed)
    pub(super) line: u32,
    /// Line the current token started on
    pub(super) start_line: u32,
    /// Unmatched `(` count for each open interpolation
    pub(super) parens: Vec<u32>,
    /// Collected errors
    pub(super) errors: Vec<LexError>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: impl Into<String>) -> Self {
        let source: String = source.into();
        Self {
            source: source.into_bytes(),
            current: 0,
            start: 0,
            line: 1,
            start_line: 1,
            parens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the whole source, returning tokens and any errors
    pub fn tokenize(&mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        (tokens, self.take_errors())
    }

    /// Errors found since the last call
    pub fn take_errors(&mut self) -> Vec<LexError> {
        std::mem::take(&mut self.errors)
    }

    /// Scan the next token
    pub fn next_token(&mut self) -> Token {
        if self.current == 0 {
            self.skip_shebang();
        }

        loop {
            self.start = self.current;
            self.start_line = self.line;

            if self.is_at_end() {
                return self.make_token(TokenKind::Eof);
            }

            let c = self.advance();
            let kind = match c {
                b'(' => {
                    if let Some(open) = self.parens.last_mut() {
                        *open += 1;
                    }
                    TokenKind::LeftParen
                }
                b')' => {
                    if let Some(open) = self.parens.last_mut() {
                        *open -= 1;
                        if *open == 0 {
                            // This ")" ends an interpolated expression; the
                            // template string continues after it.
                            self.parens.pop();
                            return self.string();
                        }
                    }
                    TokenKind::RightParen
                }
                b'[' => TokenKind::LeftBracket,
                b']' => TokenKind::RightBracket,
                b'{' => TokenKind::LeftBrace,
                b'}' => TokenKind::RightBrace,
                b':' => TokenKind::Colon,
                b',' => TokenKind::Comma,
                b'*' => TokenKind::Star,
                b'%' => TokenKind::Percent,
                b'^' => TokenKind::Caret,
                b'+' => TokenKind::Plus,
                b'-' => TokenKind::Minus,
                b'~' => TokenKind::Tilde,
                b'?' => TokenKind::Question,
                b'.' => {
                    if self.match_byte(b'.') {
                        if self.match_byte(b'.') {
                            TokenKind::DotDotDot
                        } else {
                            TokenKind::DotDot
                        }
                    } else {
                        TokenKind::Dot
                    }
                }
                b'|' => self.one_or_two(b'|', TokenKind::PipePipe, TokenKind::Pipe),
                b'&' => self.one_or_two(b'&', TokenKind::AmpAmp, TokenKind::Amp),
                b'=' => self.one_or_two(b'=', TokenKind::EqEq, TokenKind::Eq),
                b'!' => self.one_or_two(b'=', TokenKind::BangEq, TokenKind::Bang),
                b'<' => {
                    if self.match_byte(b'<') {
                        TokenKind::LtLt
                    } else {
                        self.one_or_two(b'=', TokenKind::LtEq, TokenKind::Lt)
                    }
                }
                b'>' => {
                    if self.match_byte(b'>') {
                        TokenKind::GtGt
                    } else {
                        self.one_or_two(b'=', TokenKind::GtEq, TokenKind::Gt)
                    }
                }
                b'/' => {
                    if self.match_byte(b'/') {
                        self.skip_line_comment();
                        continue;
                    }
                    if self.match_byte(b'*') {
                        self.skip_block_comment();
                        continue;
                    }
                    TokenKind::Slash
                }
                b' ' | b'\r' | b'\t' => {
                    while matches!(self.peek(), b' ' | b'\r' | b'\t') {
                        self.advance();
                    }
                    continue;
                }
                b'\n' => TokenKind::Line,
                b'"' => return self.string(),
                b'_' => {
                    let kind = if self.peek() == b'_' {
                        TokenKind::StaticField
                    } else {
                        TokenKind::Field
                    };
                    return self.name(kind);
                }
                b'0' if self.peek() == b'x' => return self.hex_number(),
                c if c.is_ascii_digit() => return self.number(),
                c if is_name_start(c) => return self.name(TokenKind::Name),
                c => {
                    let message = if c.is_ascii_graphic() {
                        format!("Invalid character '{}'.", c as char)
                    } else {
                        format!("Invalid byte 0x{c:x}.")
                    };
                    self.error(message);
                    TokenKind::Error
                }
            };
            return self.make_token(kind);
        }
    }

    fn one_or_two(&mut self, second: u8, two: TokenKind, one: TokenKind) -> TokenKind {
        if self.match_byte(second) {
            two
        } else {
            one
        }
    }

    fn skip_shebang(&mut self) {
        if self.source.starts_with(b"#!") {
            self.skip_line_comment();
        }
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != b'\n' {
            self.advance();
        }
    }

    /// Skip a block comment; they nest.
    fn skip_block_comment(&mut self) {
        let mut nesting = 1;
        while nesting > 0 {
            if self.is_at_end() {
                self.error("Unterminated block comment.");
                return;
            }
            if self.peek() == b'/' && self.peek_next() == b'*' {
                self.advance();
                self.advance();
                nesting += 1;
            } else if self.peek() == b'*' && self.peek_next() == b'/' {
                self.advance();
                self.advance();
                nesting -= 1;
            } else {
                self.advance();
            }
        }
    }

    // === Character navigation ===

    /// Advance to the next byte and return it, tracking lines
    pub(super) fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        if c == b'\n' {
            self.line += 1;
        }
        c
    }

    /// Current byte, or `0` at the end
    pub(super) fn peek(&self) -> u8 {
        self.source.get(self.current).copied().unwrap_or(0)
    }

    pub(super) fn peek_next(&self) -> u8 {
        self.source.get(self.current + 1).copied().unwrap_or(0)
    }

    pub(super) fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == expected && !self.is_at_end() {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    // === Token creation ===

    pub(super) fn lexeme(&self) -> String {
        String::from_utf8_lossy(&self.source[self.start..self.current]).into_owned()
    }

    pub(super) fn make_token(&self, kind: TokenKind) -> Token {
        let lexeme = if kind == TokenKind::Line {
            "\n".to_string()
        } else {
            self.lexeme()
        };
        Token::new(kind, lexeme, self.start_line)
    }

    pub(super) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(LexError {
            line: self.line,
            message: message.into(),
        });
    }
}

pub(super) fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Literal;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(source).tokenize();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_input_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[rstest]
    #[case("..", TokenKind::DotDot)]
    #[case("...", TokenKind::DotDotDot)]
    #[case("<<", TokenKind::LtLt)]
    #[case("<=", TokenKind::LtEq)]
    #[case(">>", TokenKind::GtGt)]
    #[case("!=", TokenKind::BangEq)]
    #[case("==", TokenKind::EqEq)]
    #[case("&&", TokenKind::AmpAmp)]
    #[case("||", TokenKind::PipePipe)]
    #[case("~", TokenKind::Tilde)]
    fn operators(#[case] source: &str, #[case] expected: TokenKind) {
        assert_eq!(kinds(source), vec![expected, TokenKind::Eof]);
    }

    #[test]
    fn newlines_are_tokens() {
        assert_eq!(
            kinds("a\nb"),
            vec![TokenKind::Name, TokenKind::Line, TokenKind::Name, TokenKind::Eof]
        );
    }

    #[test]
    fn fields_and_keywords() {
        assert_eq!(
            kinds("class _x __y construct"),
            vec![
                TokenKind::Class,
                TokenKind::Field,
                TokenKind::StaticField,
                TokenKind::Construct,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn comments_nest_and_are_skipped() {
        assert_eq!(
            kinds("a /* x /* y */ z */ b // tail"),
            vec![TokenKind::Name, TokenKind::Name, TokenKind::Eof]
        );
    }

    #[test]
    fn shebang_line_is_ignored() {
        assert_eq!(
            kinds("#!/usr/bin/env heta\nx"),
            vec![TokenKind::Line, TokenKind::Name, TokenKind::Eof]
        );
    }

    #[test]
    fn line_numbers_follow_newlines() {
        let (tokens, _) = Lexer::new("a\n\nb").tokenize();
        let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 2, 3, 3]);
    }

    #[test]
    fn interpolation_splits_the_string() {
        let (tokens, errors) = Lexer::new(r#""a %(1 + (2)) b""#).tokenize();
        assert!(errors.is_empty());
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Interpolation,
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::LeftParen,
                TokenKind::Number,
                TokenKind::RightParen,
                TokenKind::String,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[0].value, Literal::Str(b"a ".to_vec()));
        assert_eq!(tokens[6].value, Literal::Str(b" b".to_vec()));
    }

    #[test]
    fn invalid_character_is_reported() {
        let (tokens, errors) = Lexer::new("a $ b").tokenize();
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Invalid character '$'.");
    }

    #[test]
    fn unterminated_block_comment_is_reported() {
        let (_, errors) = Lexer::new("/* open").tokenize();
        assert_eq!(errors[0].message, "Unterminated block comment.");
    }
}
