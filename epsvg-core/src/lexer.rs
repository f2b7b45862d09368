//! The EPS lexer.
//!
//! `next_token` produces one typed token per call and `Eof` forever after
//! exhaustion. A delimiter is ASCII whitespace or any of `{ } [ ] /`; end of
//! input delimits too, so a document need not end in whitespace. Running
//! past the end of the buffer while scanning for a closing terminator
//! (`)` or `>`) is a fatal lexical error; the diagnostic shows the
//! offending content truncated to 64 characters with control characters
//! escaped.

use crate::error::{ErrorKind, InterpResult, MachineError};
use crate::token::{Keyword, Token, TokenKind};

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'{' | b'}' | b'[' | b']' | b'/')
}

/// First 64 characters of `s`, with control characters escaped, and a
/// trailing `...` when truncated.
fn excerpt(s: &str) -> String {
    let mut out = String::new();
    for (i, c) in s.chars().enumerate() {
        if i == 64 {
            out.push_str("...");
            break;
        }
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    #[must_use]
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn bytes(&self) -> &'src [u8] {
        self.src.as_bytes()
    }

    /// Skip whitespace, counting CR, LF, and CRLF each as one line.
    fn skip_whitespace(&mut self) {
        let bytes = self.bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\r' => {
                    self.pos += 1;
                    self.line += 1;
                    self.column = 1;
                    if self.pos < bytes.len() && bytes[self.pos] == b'\n' {
                        self.pos += 1;
                    }
                }
                b'\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.column = 1;
                }
                b if b.is_ascii_whitespace() => {
                    self.pos += 1;
                    self.column += 1;
                }
                _ => break,
            }
        }
    }

    /// Slice from `start` up to the next delimiter. End of input delimits.
    fn until_delimiter(&self, start: usize) -> &'src str {
        let bytes = self.bytes();
        for end in start..bytes.len() {
            if is_delimiter(bytes[end]) {
                return &self.src[start..end];
            }
        }
        &self.src[start..]
    }

    /// Slice from `start` up to the closing byte. Hitting end of input
    /// first is a lexical error.
    fn until_close(&self, start: usize, close: u8) -> InterpResult<&'src str> {
        let bytes = self.bytes();
        for end in start..bytes.len() {
            if bytes[end] == close {
                return Ok(&self.src[start..end]);
            }
        }
        Err(self.err(format!(
            "no closing '{}' before end of input in \"{}\"",
            char::from(close),
            excerpt(&self.src[start..])
        )))
    }

    /// Slice from `start` up to the next line end. End of input delimits.
    fn until_line_end(&self, start: usize) -> &'src str {
        let bytes = self.bytes();
        for end in start..bytes.len() {
            if bytes[end] == b'\n' || bytes[end] == b'\r' {
                return &self.src[start..end];
            }
        }
        &self.src[start..]
    }

    fn err(&self, message: String) -> MachineError {
        MachineError::new(ErrorKind::Lexical, message)
            .with_position(self.line, self.column)
    }

    /// The next token. Returns `Eof` forever once the input is exhausted.
    pub fn next_token(&mut self) -> InterpResult<Token<'src>> {
        self.skip_whitespace();

        let line = self.line;
        let column = self.column;
        let token = |kind, content| Token {
            kind,
            content,
            line,
            column,
        };

        let bytes = self.bytes();
        if self.pos >= bytes.len() {
            return Ok(token(TokenKind::Eof, ""));
        }

        match bytes[self.pos] {
            b'%' => {
                let content = self.until_line_end(self.pos + 1);
                let kind = if content.starts_with('!') {
                    TokenKind::PageTag
                } else {
                    TokenKind::Comment
                };
                self.pos += content.len() + 1;
                self.column += u32::try_from(content.len()).unwrap_or(u32::MAX) + 1;
                Ok(token(kind, content))
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => {
                let content = self.until_delimiter(self.pos);
                let kind = if content.contains('.') {
                    let value = content.parse::<f64>().map_err(|_| {
                        self.err(format!("malformed number \"{}\"", excerpt(content)))
                    })?;
                    TokenKind::Real(value)
                } else {
                    let value = content.parse::<i64>().map_err(|_| {
                        self.err(format!("malformed number \"{}\"", excerpt(content)))
                    })?;
                    TokenKind::Integer(value)
                };
                self.advance(content.len());
                Ok(token(kind, content))
            }
            b'{' => {
                self.advance(1);
                Ok(token(TokenKind::LeftBrace, "{"))
            }
            b'}' => {
                self.advance(1);
                Ok(token(TokenKind::RightBrace, "}"))
            }
            b'[' => {
                self.advance(1);
                Ok(token(TokenKind::LeftBracket, "["))
            }
            b']' => {
                self.advance(1);
                Ok(token(TokenKind::RightBracket, "]"))
            }
            b'(' => {
                let content = self.until_close(self.pos + 1, b')')?;
                self.advance(content.len() + 2);
                Ok(token(TokenKind::Str, content))
            }
            b'<' => {
                let content = self.until_close(self.pos + 1, b'>')?;
                self.advance(content.len() + 2);
                Ok(token(TokenKind::HexStr, content))
            }
            b'/' => {
                let content = self.until_delimiter(self.pos + 1);
                self.advance(content.len() + 1);
                Ok(token(TokenKind::LiteralName, content))
            }
            _ => {
                let content = self.until_delimiter(self.pos);
                let kind = match content {
                    "true" => TokenKind::Boolean(true),
                    "false" => TokenKind::Boolean(false),
                    _ => match Keyword::lookup(content) {
                        Some(kw) => TokenKind::Keyword(kw),
                        None => TokenKind::Name,
                    },
                };
                self.advance(content.len());
                Ok(token(kind, content))
            }
        }
    }

    fn advance(&mut self, len: usize) {
        self.pos += len;
        self.column += u32::try_from(len).unwrap_or(u32::MAX);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            if tok.kind.is_eof() {
                return out;
            }
            out.push(tok.kind);
        }
    }

    #[test]
    fn number_classification() {
        assert_eq!(kinds("3.14 "), vec![TokenKind::Real(3.14)]);
        assert_eq!(kinds("42 "), vec![TokenKind::Integer(42)]);
        assert_eq!(kinds("-7 "), vec![TokenKind::Integer(-7)]);
        assert_eq!(kinds("-0.5 "), vec![TokenKind::Real(-0.5)]);
    }

    #[test]
    fn literal_name() {
        let mut lexer = Lexer::new("/Foo ");
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::LiteralName);
        assert_eq!(tok.content, "Foo");
    }

    #[test]
    fn slash_is_a_delimiter() {
        let mut lexer = Lexer::new("/a/b ");
        let a = lexer.next_token().unwrap();
        let b = lexer.next_token().unwrap();
        assert_eq!((a.kind, a.content), (TokenKind::LiteralName, "a"));
        assert_eq!((b.kind, b.content), (TokenKind::LiteralName, "b"));
    }

    #[test]
    fn procedure_tokens() {
        assert_eq!(
            kinds("{ 1 2 add }"),
            vec![
                TokenKind::LeftBrace,
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Keyword(Keyword::Add),
                TokenKind::RightBrace,
            ]
        );
    }

    #[test]
    fn booleans_and_names() {
        assert_eq!(
            kinds("true false foo "),
            vec![
                TokenKind::Boolean(true),
                TokenKind::Boolean(false),
                TokenKind::Name,
            ]
        );
    }

    #[test]
    fn comments_and_page_tags() {
        let mut lexer = Lexer::new("%!PS-Adobe-3.0 EPSF-3.0\n% plain comment\n1 ");
        let tag = lexer.next_token().unwrap();
        assert_eq!(tag.kind, TokenKind::PageTag);
        assert_eq!(tag.content, "!PS-Adobe-3.0 EPSF-3.0");
        let comment = lexer.next_token().unwrap();
        assert_eq!(comment.kind, TokenKind::Comment);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Integer(1));
    }

    #[test]
    fn string_and_hex_string() {
        let mut lexer = Lexer::new("(hello world) <48656C> ");
        let s = lexer.next_token().unwrap();
        assert_eq!((s.kind, s.content), (TokenKind::Str, "hello world"));
        let h = lexer.next_token().unwrap();
        assert_eq!((h.kind, h.content), (TokenKind::HexStr, "48656C"));
    }

    #[test]
    fn line_and_column_tracking() {
        let mut lexer = Lexer::new("ab cd\nef\r\ngh ");
        let ab = lexer.next_token().unwrap();
        assert_eq!((ab.line, ab.column), (1, 1));
        let cd = lexer.next_token().unwrap();
        assert_eq!((cd.line, cd.column), (1, 4));
        let ef = lexer.next_token().unwrap();
        assert_eq!((ef.line, ef.column), (2, 1));
        let gh = lexer.next_token().unwrap();
        assert_eq!((gh.line, gh.column), (3, 1));
    }

    #[test]
    fn eof_forever() {
        let mut lexer = Lexer::new("1 ");
        lexer.next_token().unwrap();
        for _ in 0..3 {
            assert!(lexer.next_token().unwrap().kind.is_eof());
        }
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let mut lexer = Lexer::new("(never closed");
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
        assert!(err.message.contains("never closed"), "{}", err.message);
    }

    #[test]
    fn long_error_content_is_truncated() {
        let long = format!("({}", "x".repeat(100));
        let mut lexer = Lexer::new(&long);
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains(&"x".repeat(64)));
        assert!(!err.message.contains(&"x".repeat(65)));
        assert!(err.message.contains("..."));
    }

    #[test]
    fn end_of_input_acts_as_a_delimiter() {
        assert_eq!(kinds("42"), vec![TokenKind::Integer(42)]);
        assert_eq!(kinds("3.5"), vec![TokenKind::Real(3.5)]);
        assert_eq!(kinds("fill"), vec![TokenKind::Keyword(Keyword::Fill)]);

        let mut lexer = Lexer::new("/Name");
        let tok = lexer.next_token().unwrap();
        assert_eq!((tok.kind, tok.content), (TokenKind::LiteralName, "Name"));

        let mut lexer = Lexer::new("% no newline");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Comment);
        assert!(lexer.next_token().unwrap().kind.is_eof());
    }

    #[test]
    fn control_characters_escaped_in_error() {
        let mut lexer = Lexer::new("(a\tb");
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("\\t"), "{}", err.message);
    }

    #[test]
    fn malformed_number_is_fatal() {
        let mut lexer = Lexer::new("1.2.3 ");
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
    }
}
