//! Token types for lexical analysis
//!
//! Defines all token types recognized by the Heta lexer. Newlines are
//! significant and produce [`TokenKind::Line`] tokens; the compiler decides
//! where they may be skipped.

/// Token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source text of this token
    pub lexeme: String,
    /// 1-based source line
    pub line: u32,
    /// Decoded literal, for numbers and strings
    pub value: Literal,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            value: Literal::None,
        }
    }

    pub fn with_value(mut self, value: Literal) -> Self {
        self.value = value;
        self
    }
}

/// Value carried by a literal token
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Literal {
    #[default]
    None,
    Num(f64),
    /// String contents after escape processing. May hold any bytes, since
    /// `\x` escapes produce raw bytes.
    Str(Vec<u8>),
}

/// Classification of token types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Punctuation
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Colon,
    Dot,
    /// `..` (inclusive range)
    DotDot,
    /// `...` (exclusive range)
    DotDotDot,
    Comma,
    Question,
    /// `=`
    Eq,

    // Operators
    Star,
    Slash,
    Percent,
    Plus,
    Minus,
    /// `<<`
    LtLt,
    /// `>>`
    GtGt,
    Pipe,
    PipePipe,
    Caret,
    Amp,
    AmpAmp,
    Bang,
    Tilde,
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    BangEq,

    // Keywords
    As,
    Break,
    Class,
    Construct,
    Continue,
    Else,
    False,
    For,
    Foreign,
    If,
    Import,
    In,
    Is,
    Null,
    Return,
    Static,
    Super,
    This,
    True,
    Var,
    While,

    // Names and literals
    /// `_name`: an instance field
    Field,
    /// `__name`: a static field
    StaticField,
    Name,
    Number,
    /// A complete string, or the final part of an interpolated one
    String,
    /// A string part that ends at `%(`
    Interpolation,

    // Special
    /// Newline
    Line,
    /// Lexer error, already reported
    Error,
    /// End of file
    Eof,
}

impl TokenKind {
    /// Check if a name is a keyword and return its token kind
    pub fn keyword(name: &str) -> Option<TokenKind> {
        let kind = match name {
            "as" => TokenKind::As,
            "break" => TokenKind::Break,
            "class" => TokenKind::Class,
            "construct" => TokenKind::Construct,
            "continue" => TokenKind::Continue,
            "else" => TokenKind::Else,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "foreign" => TokenKind::Foreign,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "null" => TokenKind::Null,
            "return" => TokenKind::Return,
            "static" => TokenKind::Static,
            "super" => TokenKind::Super,
            "this" => TokenKind::This,
            "true" => TokenKind::True,
            "var" => TokenKind::Var,
            "while" => TokenKind::While,
            _ => return None,
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("class", Some(TokenKind::Class))]
    #[case("construct", Some(TokenKind::Construct))]
    #[case("foreign", Some(TokenKind::Foreign))]
    #[case("as", Some(TokenKind::As))]
    #[case("this", Some(TokenKind::This))]
    #[case("let", None)]
    #[case("Class", None)]
    fn keyword_lookup(#[case] name: &str, #[case] expected: Option<TokenKind>) {
        assert_eq!(TokenKind::keyword(name), expected);
    }
}
