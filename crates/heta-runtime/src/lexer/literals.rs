//! Literal scanning: strings, numbers and names

use super::{is_name_start, Lexer, MAX_INTERPOLATION_NESTING};
use crate::token::{Literal, Token, TokenKind};
use crate::utils::utf8_encode;

impl Lexer {
    /// Scan a string body. The opening `"` (or the `)` closing an
    /// interpolated expression) has been consumed.
    pub(super) fn string(&mut self) -> Token {
        let mut bytes = Vec::new();
        let mut kind = TokenKind::String;

        loop {
            if self.is_at_end() {
                self.error("Unterminated string.");
                break;
            }

            let c = self.advance();
            match c {
                b'"' => break,
                b'\r' => {}
                b'%' => {
                    if self.parens.len() < MAX_INTERPOLATION_NESTING {
                        if !self.match_byte(b'(') {
                            self.error("Expect '(' after '%'.");
                        }
                        self.parens.push(1);
                        kind = TokenKind::Interpolation;
                        break;
                    }
                    self.error(format!(
                        "Interpolation may only nest {MAX_INTERPOLATION_NESTING} levels deep."
                    ));
                    bytes.push(c);
                }
                b'\\' => self.escape(&mut bytes),
                _ => bytes.push(c),
            }
        }

        self.make_token(kind).with_value(Literal::Str(bytes))
    }

    fn escape(&mut self, out: &mut Vec<u8>) {
        if self.is_at_end() {
            self.error("Unterminated string.");
            return;
        }
        let c = self.advance();
        let byte = match c {
            b'"' => b'"',
            b'\\' => b'\\',
            b'%' => b'%',
            b'0' => 0,
            b'a' => 0x07,
            b'b' => 0x08,
            b'e' => 0x1b,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'u' => {
                self.unicode_escape(4, out);
                return;
            }
            b'U' => {
                self.unicode_escape(8, out);
                return;
            }
            b'x' => match self.hex_escape(2, "byte") {
                Some(value) => value as u8,
                None => return,
            },
            other => {
                self.error(format!("Invalid escape character '{}'.", other as char));
                return;
            }
        };
        out.push(byte);
    }

    fn unicode_escape(&mut self, digits: usize, out: &mut Vec<u8>) {
        if let Some(value) = self.hex_escape(digits, "Unicode") {
            utf8_encode(value, out);
        }
    }

    /// Read exactly `digits` hex digits.
    fn hex_escape(&mut self, digits: usize, description: &str) -> Option<u32> {
        let mut value: u32 = 0;
        for _ in 0..digits {
            if self.is_at_end() || self.peek() == b'"' {
                self.error(format!("Incomplete {description} escape sequence."));
                return None;
            }
            let c = self.advance();
            let Some(digit) = (c as char).to_digit(16) else {
                self.error(format!("Invalid {description} escape sequence."));
                return None;
            };
            value = (value << 4) | digit;
        }
        Some(value)
    }

    /// Decimal number; the first digit has been consumed.
    pub(super) fn number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // A "." only continues the number when a digit follows, so that
        // method calls on literals like `1.abs` still lex.
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        if self.match_byte(b'e') || self.match_byte(b'E') {
            if !self.match_byte(b'+') {
                self.match_byte(b'-');
            }
            if !self.peek().is_ascii_digit() {
                self.error("Unterminated scientific notation.");
            }
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = self.lexeme();
        let value = match text.parse::<f64>() {
            Ok(n) if n.is_finite() => n,
            Ok(_) => {
                self.error("Number literal was too large.");
                0.0
            }
            // Only reachable after an unterminated exponent, already reported.
            Err(_) => 0.0,
        };
        self.make_token(TokenKind::Number)
            .with_value(Literal::Num(value))
    }

    /// `0x` hex integer; the `0` has been consumed.
    pub(super) fn hex_number(&mut self) -> Token {
        self.advance();
        while self.peek().is_ascii_hexdigit() {
            self.advance();
        }

        let digits = &self.source[self.start + 2..self.current];
        let text = String::from_utf8_lossy(digits);
        let value = match i64::from_str_radix(&text, 16) {
            Ok(n) => n as f64,
            Err(_) if digits.is_empty() => {
                self.error("Expect hex digits after '0x'.");
                0.0
            }
            Err(_) => {
                self.error("Number literal was too large.");
                0.0
            }
        };
        self.make_token(TokenKind::Number)
            .with_value(Literal::Num(value))
    }

    /// Identifier, keyword or field name; the first byte has been consumed.
    pub(super) fn name(&mut self, kind: TokenKind) -> Token {
        while is_name_start(self.peek()) || self.peek().is_ascii_digit() {
            self.advance();
        }

        let text = self.lexeme();
        let kind = match kind {
            TokenKind::Name => TokenKind::keyword(&text).unwrap_or(TokenKind::Name),
            other => other,
        };
        Token::new(kind, text, self.start_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn single(source: &str) -> (Token, Vec<String>) {
        let mut lexer = Lexer::new(source);
        let token = lexer.next_token();
        let errors = lexer.take_errors().into_iter().map(|e| e.message).collect();
        (token, errors)
    }

    #[rstest]
    #[case("0", 0.0)]
    #[case("42", 42.0)]
    #[case("3.25", 3.25)]
    #[case("1e3", 1000.0)]
    #[case("2.5E-1", 0.25)]
    #[case("0xff", 255.0)]
    #[case("0x7FFFFFFF", 2_147_483_647.0)]
    fn numbers(#[case] source: &str, #[case] expected: f64) {
        let (token, errors) = single(source);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(token.kind, TokenKind::Number);
        assert_eq!(token.value, Literal::Num(expected));
    }

    #[test]
    fn dot_after_integer_is_a_method_call() {
        let (tokens, _) = Lexer::new("1.abs").tokenize();
        assert_eq!(tokens[0].value, Literal::Num(1.0));
        assert_eq!(tokens[1].kind, TokenKind::Dot);
        assert_eq!(tokens[2].kind, TokenKind::Name);
    }

    #[test]
    fn unterminated_exponent_is_an_error() {
        let (_, errors) = single("1e");
        assert_eq!(errors, vec!["Unterminated scientific notation.".to_string()]);
    }

    #[test]
    fn huge_literal_is_an_error() {
        let (token, errors) = single("1e999");
        assert_eq!(token.value, Literal::Num(0.0));
        assert_eq!(errors, vec!["Number literal was too large.".to_string()]);
    }

    #[rstest]
    #[case(r#""plain""#, b"plain".to_vec())]
    #[case(r#""a\nb""#, b"a\nb".to_vec())]
    #[case(r#""\"q\"""#, b"\"q\"".to_vec())]
    #[case(r#""100\%""#, b"100%".to_vec())]
    #[case(r#""\x41\x7e""#, b"A~".to_vec())]
    #[case(r#""é""#, "é".as_bytes().to_vec())]
    #[case(r#""\U0001F600""#, "😀".as_bytes().to_vec())]
    #[case("\"two\nlines\"", b"two\nlines".to_vec())]
    fn string_escapes(#[case] source: &str, #[case] expected: Vec<u8>) {
        let (token, errors) = single(source);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.value, Literal::Str(expected));
    }

    #[rstest]
    #[case(r#""abc"#, "Unterminated string.")]
    #[case(r#""\q""#, "Invalid escape character 'q'.")]
    #[case(r#""\x4""#, "Incomplete byte escape sequence.")]
    #[case(r#""\u12""#, "Incomplete Unicode escape sequence.")]
    #[case(r#""\xzz""#, "Invalid byte escape sequence.")]
    fn string_errors(#[case] source: &str, #[case] message: &str) {
        let (_, errors) = single(source);
        assert_eq!(errors.first().map(String::as_str), Some(message));
    }

    #[test]
    fn names_may_contain_digits_and_underscores() {
        let (token, _) = single("foo_2bar");
        assert_eq!(token.kind, TokenKind::Name);
        assert_eq!(token.lexeme, "foo_2bar");
    }
}
