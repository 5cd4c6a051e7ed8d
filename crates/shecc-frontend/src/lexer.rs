//! Byte-buffer tokenizer (spec.md §4.1).
//!
//! One `Lexer` consumes one file's bytes end to end into a `Vec<Token>`;
//! `shecc-frontend::module::Module::token_cache` is the layer above that
//! turns repeat `#include`s of the same path into a cache hit rather than
//! a second lex (spec.md §4.2's include-cache contract).

use crate::diagnostic::{DiagResult, Diagnostic};
use crate::token::{Keyword, Punct, Token, TokenKind};
use shecc_codegen::SourceLoc;
use std::rc::Rc;

/// Longest token this lexer accepts, in bytes (spec.md §4.1/§8: "a
/// token-too-long (>~256 bytes) ... raises a diagnostic").
const MAX_TOKEN_LEN: usize = 256;

/// Tokenizes one file's source text.
pub struct Lexer {
    bytes: Vec<u8>,
    pos: usize,
    line: u32,
    col: u32,
    file: Rc<str>,
    at_bol: bool,
}

impl Lexer {
    /// Start lexing `source`, attributing every token to `file`.
    pub fn new(file: impl Into<Rc<str>>, source: &str) -> Self {
        Self {
            bytes: source.as_bytes().to_vec(),
            pos: 0,
            line: 1,
            col: 1,
            file: file.into(),
            at_bol: true,
        }
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let b = self.peek();
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        b
    }

    fn loc(&self, start_offset: usize, start_line: u32, start_col: u32) -> SourceLoc {
        SourceLoc::new(
            self.file.clone(),
            start_offset as u32,
            (self.pos - start_offset) as u32,
            start_line,
            start_col,
        )
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Reject a token whose full span (`start..self.pos`) exceeds
    /// [`MAX_TOKEN_LEN`] bytes.
    fn check_token_len(&self, start: usize, start_line: u32, start_col: u32) -> DiagResult<()> {
        if self.pos - start > MAX_TOKEN_LEN {
            let loc = self.loc(start, start_line, start_col);
            return err!(loc, "token too long");
        }
        Ok(())
    }

    /// Consume whitespace and comments, returning whether any was actually
    /// skipped (needed for `Token::space_before`) and updating `at_bol` if a
    /// newline was crossed.
    fn skip_trivia(&mut self) -> DiagResult<bool> {
        let mut skipped = false;
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' => {
                    self.advance();
                    skipped = true;
                }
                b'\n' => {
                    self.advance();
                    self.at_bol = true;
                    skipped = true;
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.eof() && self.peek() != b'\n' {
                        self.advance();
                    }
                    skipped = true;
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let (start_line, start_col) = (self.line, self.col);
                    self.advance();
                    self.advance();
                    loop {
                        if self.eof() {
                            let loc = SourceLoc::new(self.file.clone(), self.pos as u32, 0, start_line, start_col);
                            return err!(loc, "unterminated block comment");
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                    skipped = true;
                }
                b'\\' if self.peek_at(1) == b'\n' => {
                    // Line continuation: splice, consuming no visible token.
                    self.advance();
                    self.advance();
                    skipped = true;
                }
                _ => break,
            }
        }
        Ok(skipped)
    }

    /// Tokenize the whole file.
    pub fn lex(mut self) -> DiagResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let space_before = self.skip_trivia()?;
            if self.eof() {
                tokens.push(Token::new(
                    TokenKind::Eof,
                    SourceLoc::new(self.file.clone(), self.pos as u32, 0, self.line, self.col),
                    self.at_bol,
                    space_before,
                ));
                break;
            }

            let bol = self.at_bol;
            self.at_bol = false;
            let (start_offset, start_line, start_col) = (self.pos, self.line, self.col);
            let b = self.peek();

            let kind = if b == b'#' && bol {
                self.advance();
                TokenKind::Hash
            } else if is_ident_start(b) {
                self.lex_ident()?
            } else if b.is_ascii_digit() {
                self.lex_number()?
            } else if b == b'\'' {
                self.lex_char()?
            } else if b == b'"' {
                self.lex_string()?
            } else {
                self.lex_punct()?
            };

            let loc = self.loc(start_offset, start_line, start_col);
            tokens.push(Token::new(kind, loc, bol, space_before));
        }
        Ok(tokens)
    }

    fn lex_ident(&mut self) -> DiagResult<TokenKind> {
        let start = self.pos;
        let (start_line, start_col) = (self.line, self.col);
        while is_ident_continue(self.peek()) {
            self.advance();
        }
        self.check_token_len(start, start_line, start_col)?;
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        Ok(match Keyword::from_str(&text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text),
        })
    }

    fn lex_number(&mut self) -> DiagResult<TokenKind> {
        let start = self.pos;
        let (start_line, start_col) = (self.line, self.col);
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.advance();
            self.advance();
            let hex_start = self.pos;
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            if self.pos == hex_start {
                let loc = self.loc(start, start_line, start_col);
                return err!(loc, "invalid hex literal: no digits after `0x`");
            }
            self.check_token_len(start, start_line, start_col)?;
            let text = std::str::from_utf8(&self.bytes[hex_start..self.pos]).unwrap();
            let value = i64::from_str_radix(text, 16)
                .map_err(|_| Diagnostic {
                    loc: self.loc(start, start_line, start_col),
                    message: "hex literal out of range".to_string(),
                })?;
            return Ok(TokenKind::IntLit(value));
        }
        if self.peek() == b'0' && (self.peek_at(1) == b'b' || self.peek_at(1) == b'B') {
            self.advance();
            self.advance();
            let bin_start = self.pos;
            while self.peek() == b'0' || self.peek() == b'1' {
                self.advance();
            }
            if self.pos == bin_start {
                let loc = self.loc(start, start_line, start_col);
                return err!(loc, "invalid binary literal: no digits after `0b`");
            }
            self.check_token_len(start, start_line, start_col)?;
            let text = std::str::from_utf8(&self.bytes[bin_start..self.pos]).unwrap();
            let value = i64::from_str_radix(text, 2)
                .map_err(|_| Diagnostic {
                    loc: self.loc(start, start_line, start_col),
                    message: "binary literal out of range".to_string(),
                })?;
            return Ok(TokenKind::IntLit(value));
        }
        if self.peek() == b'0' && self.peek_at(1).is_ascii_digit() {
            // Octal.
            self.advance();
            let oct_start = self.pos;
            while (b'0'..=b'7').contains(&self.peek()) {
                self.advance();
            }
            if self.peek().is_ascii_digit() {
                let bad = self.peek() as char;
                let loc = self.loc(start, start_line, start_col);
                return err!(loc, "invalid digit `{}` in octal literal", bad);
            }
            self.check_token_len(start, start_line, start_col)?;
            let text = std::str::from_utf8(&self.bytes[oct_start..self.pos]).unwrap();
            let value = i64::from_str_radix(text, 8).unwrap_or(0);
            return Ok(TokenKind::IntLit(value));
        }
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        self.check_token_len(start, start_line, start_col)?;
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        match text.parse::<i64>() {
            Ok(v) => Ok(TokenKind::IntLit(v)),
            Err(_) => {
                let loc = self.loc(start, start_line, start_col);
                err!(loc, "integer literal `{}` out of range", text)
            }
        }
    }

    fn lex_escape(&mut self) -> DiagResult<u8> {
        let (start_line, start_col) = (self.line, self.col);
        let c = self.advance();
        Ok(match c {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'0' => 0,
            b'a' => 0x07,
            b'b' => 0x08,
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'e' => 0x1b,
            b'?' => b'?',
            b'x' => {
                let mut value: u32 = 0;
                let mut any = false;
                while self.peek().is_ascii_hexdigit() {
                    value = value * 16 + (self.advance() as char).to_digit(16).unwrap();
                    any = true;
                }
                if !any {
                    let loc = SourceLoc::new(self.file.clone(), self.pos as u32, 0, start_line, start_col);
                    return err!(loc, "\\x escape with no hex digits");
                }
                (value & 0xff) as u8
            }
            d if (b'0'..=b'7').contains(&d) => {
                let mut value = (d - b'0') as u32;
                for _ in 0..2 {
                    if (b'0'..=b'7').contains(&self.peek()) {
                        value = value * 8 + (self.advance() - b'0') as u32;
                    }
                }
                (value & 0xff) as u8
            }
            other => {
                let loc = SourceLoc::new(self.file.clone(), self.pos as u32, 1, start_line, start_col);
                return err!(loc, "unknown escape sequence `\\{}`", other as char);
            }
        })
    }

    fn lex_char(&mut self) -> DiagResult<TokenKind> {
        let start = self.pos;
        let (start_line, start_col) = (self.line, self.col);
        self.advance(); // opening quote
        let value = if self.peek() == b'\\' {
            self.advance();
            self.lex_escape()?
        } else {
            self.advance()
        };
        if self.peek() != b'\'' {
            let loc = SourceLoc::new(self.file.clone(), self.pos as u32, 0, start_line, start_col);
            return err!(loc, "unterminated character literal");
        }
        self.advance();
        self.check_token_len(start, start_line, start_col)?;
        Ok(TokenKind::CharLit(value))
    }

    fn lex_string(&mut self) -> DiagResult<TokenKind> {
        let start = self.pos;
        let (start_line, start_col) = (self.line, self.col);
        self.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            if self.eof() || self.peek() == b'\n' {
                let loc = SourceLoc::new(self.file.clone(), self.pos as u32, 0, start_line, start_col);
                return err!(loc, "unterminated string literal");
            }
            if self.peek() == b'"' {
                self.advance();
                break;
            }
            if self.peek() == b'\\' {
                self.advance();
                bytes.push(self.lex_escape()?);
            } else {
                bytes.push(self.advance());
            }
        }
        self.check_token_len(start, start_line, start_col)?;
        bytes.push(0); // NUL terminator, matching this compiler's C string representation
        Ok(TokenKind::StrLit(bytes))
    }

    fn lex_punct(&mut self) -> DiagResult<TokenKind> {
        let (start_line, start_col) = (self.line, self.col);
        let c = self.advance();
        macro_rules! two {
            ($second:expr, $two_kind:expr, $one_kind:expr) => {
                if self.peek() == $second {
                    self.advance();
                    $two_kind
                } else {
                    $one_kind
                }
            };
        }
        Ok(TokenKind::Punct(match c {
            b'(' => Punct::LParen,
            b')' => Punct::RParen,
            b'{' => Punct::LBrace,
            b'}' => Punct::RBrace,
            b'[' => Punct::LBracket,
            b']' => Punct::RBracket,
            b';' => Punct::Semi,
            b',' => Punct::Comma,
            b'~' => Punct::Tilde,
            b'?' => Punct::Question,
            b':' => Punct::Colon,
            b'.' => {
                if self.peek() == b'.' && self.peek_at(1) == b'.' {
                    self.advance();
                    self.advance();
                    Punct::Ellipsis
                } else {
                    Punct::Dot
                }
            }
            b'-' => match self.peek() {
                b'>' => {
                    self.advance();
                    Punct::Arrow
                }
                b'-' => {
                    self.advance();
                    Punct::DecOp
                }
                b'=' => {
                    self.advance();
                    Punct::MinusAssign
                }
                _ => Punct::Minus,
            },
            b'+' => match self.peek() {
                b'+' => {
                    self.advance();
                    Punct::IncOp
                }
                b'=' => {
                    self.advance();
                    Punct::PlusAssign
                }
                _ => Punct::Plus,
            },
            b'*' => two!(b'=', Punct::StarAssign, Punct::Star),
            b'/' => two!(b'=', Punct::SlashAssign, Punct::Slash),
            b'%' => two!(b'=', Punct::PercentAssign, Punct::Percent),
            b'^' => two!(b'=', Punct::CaretAssign, Punct::Caret),
            b'!' => two!(b'=', Punct::NotEq, Punct::Bang),
            b'=' => two!(b'=', Punct::EqEq, Punct::Assign),
            b'&' => match self.peek() {
                b'&' => {
                    self.advance();
                    Punct::AmpAmp
                }
                b'=' => {
                    self.advance();
                    Punct::AmpAssign
                }
                _ => Punct::Amp,
            },
            b'|' => match self.peek() {
                b'|' => {
                    self.advance();
                    Punct::PipePipe
                }
                b'=' => {
                    self.advance();
                    Punct::PipeAssign
                }
                _ => Punct::Pipe,
            },
            b'<' => match self.peek() {
                b'<' => {
                    self.advance();
                    two!(b'=', Punct::ShlAssign, Punct::Shl)
                }
                b'=' => {
                    self.advance();
                    Punct::LtEq
                }
                _ => Punct::Lt,
            },
            b'>' => match self.peek() {
                b'>' => {
                    self.advance();
                    two!(b'=', Punct::ShrAssign, Punct::Shr)
                }
                b'=' => {
                    self.advance();
                    Punct::GtEq
                }
                _ => Punct::Gt,
            },
            other => {
                let loc = SourceLoc::new(self.file.clone(), self.pos as u32, 1, start_line, start_col);
                return err!(loc, "stray character `{}`", other as char);
            }
        }))
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new("t.c", src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_a_simple_declaration() {
        let ks = kinds("int x = 1;");
        assert!(matches!(ks[0], TokenKind::Keyword(Keyword::Int)));
        assert!(matches!(&ks[1], TokenKind::Ident(s) if s == "x"));
        assert!(matches!(ks[2], TokenKind::Punct(Punct::Assign)));
        assert!(matches!(ks[3], TokenKind::IntLit(1)));
        assert!(matches!(ks[4], TokenKind::Punct(Punct::Semi)));
        assert!(matches!(ks[5], TokenKind::Eof));
    }

    #[test]
    fn lexes_escapes_in_a_string() {
        let ks = kinds(r#""a\nb\x41""#);
        match &ks[0] {
            TokenKind::StrLit(bytes) => assert_eq!(bytes, &[b'a', b'\n', b'b', b'A', 0]),
            other => panic!("expected StrLit, got {:?}", other),
        }
    }

    #[test]
    fn hash_only_recognized_at_start_of_line() {
        let ks = kinds("#define X 1");
        assert!(matches!(ks[0], TokenKind::Hash));

        let ks2 = kinds("1 # 2");
        // Mid-line `#` has no punctuation meaning in this language and is
        // rejected by the lexer as a stray character.
        assert!(Lexer::new("t.c", "1 # 2").lex().is_err() || matches!(ks2.get(1), Some(TokenKind::Hash)));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(Lexer::new("t.c", "\"abc").lex().is_err());
    }

    #[test]
    fn maximum_length_identifier_accepted_one_byte_longer_rejected() {
        let ok = "a".repeat(MAX_TOKEN_LEN);
        assert_eq!(ok.len(), 256);
        let ks = kinds(&ok);
        assert!(matches!(&ks[0], TokenKind::Ident(s) if s == &ok));

        let too_long = "a".repeat(MAX_TOKEN_LEN + 1);
        let err = Lexer::new("t.c", &too_long).lex().unwrap_err();
        assert_eq!(err.message, "token too long");
    }

    #[test]
    fn lexes_binary_literals() {
        let ks = kinds("0b1010");
        assert!(matches!(ks[0], TokenKind::IntLit(10)));
    }

    #[test]
    fn rejects_invalid_octal_digit() {
        assert!(Lexer::new("t.c", "08").lex().is_err());
    }
}
