//! Tokenizer.
//!
//! Pulls bytes from a [`ByteSource`] and produces one [`Token`] at a time.
//! Escape sequences in literal strings, hex digits in hex strings and `#xx`
//! escapes in names are all decoded here, so the assembler only ever sees
//! final byte values.
//!
//! # Syntax Overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -2.5, .5)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: identifiers starting with / (/Type, /Pages)
//! - Delimiters: `[`, `]`, `<<`, `>>`
//! - Keywords: any other bare word (`obj`, `endobj`, `R`, `true`, ...)
//!
//! Whitespace (space, \t, \r, \n, \0, \f) separates tokens. Comments run
//! from `%` to the end of the line and are returned as tokens so callers
//! can decide to ignore them.
//!
//! Running out of input in the middle of a token is not an error: the
//! tokenizer records a [`ParseIssue::TruncatedInput`] and reports end of
//! input.

use crate::error::{ParseIssue, Result};
use crate::source::ByteSource;
use nom::{
    branch::alt,
    character::complete::{char, digit0, digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    sequence::{pair, tuple},
    IResult,
};

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -2.5, .5)
    Real(f64),
    /// Literal string with escapes decoded
    LiteralString(Vec<u8>),
    /// Hexadecimal string, decoded to bytes
    HexString(Vec<u8>),
    /// Name without the leading slash, `#xx` escapes decoded
    Name(String),
    /// Bare word
    Keyword(Keyword),
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// Comment text after the `%`
    Comment(Vec<u8>),
}

/// Bare words with a structural meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyword {
    /// `obj`
    Obj,
    /// `endobj`
    EndObj,
    /// `stream`
    Stream,
    /// `endstream`
    EndStream,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `R`
    R,
    /// `xref`
    Xref,
    /// `trailer`
    Trailer,
    /// `startxref`
    StartXref,
    /// Anything else, kept verbatim
    Other(String),
}

impl Keyword {
    fn from_word(word: &str) -> Self {
        match word {
            "obj" => Keyword::Obj,
            "endobj" => Keyword::EndObj,
            "stream" => Keyword::Stream,
            "endstream" => Keyword::EndStream,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "R" => Keyword::R,
            "xref" => Keyword::Xref,
            "trailer" => Keyword::Trailer,
            "startxref" => Keyword::StartXref,
            other => Keyword::Other(other.to_string()),
        }
    }
}

/// Whitespace bytes (space, tab, CR, LF, NUL, form feed).
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// Bytes that end a bare word or name.
pub fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_numeric_char(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.')
}

fn integer(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(one_of("+-")), digit1))(input)
}

fn real(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(tuple((digit1, char('.'), digit0))),
            recognize(pair(char('.'), digit1)),
        )),
    )))(input)
}

/// Classify a numeric-looking word.
///
/// Integers too large for `i64` become reals.
pub fn parse_number(word: &str) -> Option<Token> {
    if all_consuming(integer)(word).is_ok() {
        return match word.parse::<i64>() {
            Ok(i) => Some(Token::Integer(i)),
            Err(_) => word.parse::<f64>().ok().map(Token::Real),
        };
    }
    if all_consuming(real)(word).is_ok() {
        return word.parse::<f64>().ok().map(Token::Real);
    }
    None
}

/// Decode `#xx` escape sequences in a raw name.
///
/// Invalid sequences are kept literally.
///
/// # Example
///
/// ```
/// # use pdf_lexis::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"Type"), "Type");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hi = (raw[i + 1] as char).to_digit(16);
            let lo = (raw[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                bytes.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    match String::from_utf8(bytes) {
        Ok(s) => s,
        // Not UTF-8: treat as Latin-1
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

/// Streaming tokenizer over a byte source.
#[derive(Debug)]
pub struct Lexer<S: ByteSource> {
    source: S,
    issues: Vec<ParseIssue>,
}

impl<S: ByteSource> Lexer<S> {
    /// Create a tokenizer reading from `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            issues: Vec::new(),
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the underlying source, for raw payload reads.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Give back the underlying source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Recoverable problems seen so far.
    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }

    /// Drain the recorded issues.
    pub fn take_issues(&mut self) -> Vec<ParseIssue> {
        std::mem::take(&mut self.issues)
    }

    /// Record a recoverable problem.
    pub fn record(&mut self, issue: ParseIssue) {
        log::debug!("Parse issue: {:?}", issue);
        self.issues.push(issue);
    }

    /// Skip whitespace. Comments are not skipped.
    pub fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(b) = self.source.next_byte()? {
            if !is_whitespace(b) {
                self.source.unread(b);
                break;
            }
        }
        Ok(())
    }

    /// Read the rest of the current line, consuming its CR, LF or CRLF.
    pub fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        while let Some(b) = self.source.next_byte()? {
            match b {
                b'\n' => break,
                b'\r' => {
                    if let Some(next) = self.source.next_byte()? {
                        if next != b'\n' {
                            self.source.unread(next);
                        }
                    }
                    break;
                },
                _ => line.push(b),
            }
        }
        Ok(line)
    }

    /// Produce the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace()?;
        let start = self.source.position();
        let b = match self.source.next_byte()? {
            Some(b) => b,
            None => return Ok(None),
        };

        let token = match b {
            b'%' => Token::Comment(self.read_comment()?),
            b'(' => match self.read_literal_string(start)? {
                Some(bytes) => Token::LiteralString(bytes),
                None => return Ok(None),
            },
            b'<' => {
                if self.source.peek_byte()? == Some(b'<') {
                    self.source.next_byte()?;
                    Token::DictStart
                } else {
                    match self.read_hex_string(start)? {
                        Some(bytes) => Token::HexString(bytes),
                        None => return Ok(None),
                    }
                }
            },
            b'>' => {
                if self.source.peek_byte()? == Some(b'>') {
                    self.source.next_byte()?;
                    Token::DictEnd
                } else {
                    Token::Keyword(Keyword::Other(">".to_string()))
                }
            },
            b'[' => Token::ArrayStart,
            b']' => Token::ArrayEnd,
            b'{' | b'}' | b')' => Token::Keyword(Keyword::Other((b as char).to_string())),
            b'/' => {
                let raw = self.read_word(Vec::new())?;
                Token::Name(decode_name_escapes(&raw))
            },
            _ => {
                let raw = self.read_word(vec![b])?;
                self.classify_word(&raw, start)
            },
        };
        Ok(Some(token))
    }

    fn classify_word(&mut self, raw: &[u8], start: u64) -> Token {
        let word: String = raw.iter().map(|&b| b as char).collect();
        if raw.iter().all(|&b| is_numeric_char(b)) {
            if let Some(number) = parse_number(&word) {
                return number;
            }
            self.record(ParseIssue::NumberFormatFailure {
                offset: start,
                text: word.clone(),
            });
            return Token::Keyword(Keyword::Other(word));
        }
        Token::Keyword(Keyword::from_word(&word))
    }

    /// Accumulate regular bytes. A terminating delimiter or line ending is
    /// pushed back; other whitespace is consumed.
    fn read_word(&mut self, mut word: Vec<u8>) -> Result<Vec<u8>> {
        while let Some(b) = self.source.next_byte()? {
            if is_delimiter(b) || b == b'\r' || b == b'\n' {
                self.source.unread(b);
                break;
            }
            if is_whitespace(b) {
                break;
            }
            word.push(b);
        }
        Ok(word)
    }

    fn read_comment(&mut self) -> Result<Vec<u8>> {
        let mut text = Vec::new();
        while let Some(b) = self.source.next_byte()? {
            if b == b'\r' || b == b'\n' {
                self.source.unread(b);
                break;
            }
            text.push(b);
        }
        Ok(text)
    }

    fn truncated(&mut self, start: u64) -> Result<Option<Vec<u8>>> {
        self.record(ParseIssue::TruncatedInput { offset: start });
        Ok(None)
    }

    fn read_literal_string(&mut self, start: u64) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        loop {
            let b = match self.source.next_byte()? {
                Some(b) => b,
                None => return self.truncated(start),
            };
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                },
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(out));
                    }
                    out.push(b);
                },
                b'\\' => {
                    let escaped = match self.source.next_byte()? {
                        Some(e) => e,
                        None => return self.truncated(start),
                    };
                    match escaped {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'(' | b')' | b'\\' => out.push(escaped),
                        b'0'..=b'7' => out.push(self.read_octal(escaped)?),
                        b'\r' => {
                            // Line continuation; CRLF counts as one line ending
                            if let Some(next) = self.source.next_byte()? {
                                if next != b'\n' {
                                    self.source.unread(next);
                                }
                            }
                        },
                        b'\n' => {},
                        // Unknown escape: the backslash is dropped
                        other => out.push(other),
                    }
                },
                _ => out.push(b),
            }
        }
    }

    /// Up to three octal digits; high-order overflow is discarded.
    fn read_octal(&mut self, first: u8) -> Result<u8> {
        let mut value = (first - b'0') as u32;
        for _ in 0..2 {
            match self.source.next_byte()? {
                Some(d @ b'0'..=b'7') => value = value * 8 + (d - b'0') as u32,
                Some(other) => {
                    self.source.unread(other);
                    break;
                },
                None => break,
            }
        }
        Ok((value & 0xFF) as u8)
    }

    fn read_hex_string(&mut self, start: u64) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        loop {
            let b = match self.source.next_byte()? {
                Some(b) => b,
                None => return self.truncated(start),
            };
            if b == b'>' {
                break;
            }
            let nibble = match (b as char).to_digit(16) {
                Some(n) => n as u8,
                // Whitespace and stray characters are skipped
                None => continue,
            };
            match high.take() {
                Some(h) => out.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }
        // Odd number of digits: final digit is padded with 0
        if let Some(h) = high {
            out.push(h << 4);
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ReaderSource, SliceSource};

    fn lex(input: &[u8]) -> Lexer<SliceSource> {
        Lexer::new(SliceSource::new(input.to_vec()))
    }

    fn tokens(input: &[u8]) -> Vec<Token> {
        let mut lexer = lex(input);
        let mut out = Vec::new();
        while let Some(t) = lexer.next_token().unwrap() {
            out.push(t);
        }
        out
    }

    fn single(input: &[u8]) -> Token {
        let mut all = tokens(input);
        assert_eq!(all.len(), 1, "expected one token from {:?}", input);
        all.remove(0)
    }

    #[test]
    fn test_parse_integers() {
        assert_eq!(single(b"42"), Token::Integer(42));
        assert_eq!(single(b"-123"), Token::Integer(-123));
        assert_eq!(single(b"+7"), Token::Integer(7));
        assert_eq!(single(b"0"), Token::Integer(0));
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(single(b"3.5"), Token::Real(3.5));
        assert_eq!(single(b"-2.5"), Token::Real(-2.5));
        assert_eq!(single(b".5"), Token::Real(0.5));
        assert_eq!(single(b"4."), Token::Real(4.0));
        assert_eq!(single(b"-.25"), Token::Real(-0.25));
    }

    #[test]
    fn test_integer_overflow_becomes_real() {
        assert_eq!(single(b"99999999999999999999"), Token::Real(1e20));
    }

    #[test]
    fn test_malformed_number_degrades_to_keyword() {
        let mut lexer = lex(b"1.2.3 7");
        assert_eq!(
            lexer.next_token().unwrap(),
            Some(Token::Keyword(Keyword::Other("1.2.3".to_string())))
        );
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Integer(7)));
        assert_eq!(
            lexer.issues(),
            &[ParseIssue::NumberFormatFailure {
                offset: 0,
                text: "1.2.3".to_string()
            }]
        );
    }

    #[test]
    fn test_lone_sign_degrades_to_keyword() {
        assert_eq!(single(b"--"), Token::Keyword(Keyword::Other("--".to_string())));
    }

    #[test]
    fn test_literal_string_escapes() {
        assert_eq!(
            single(br"(a\nb\rc\td\be\ff\(\)\\)"),
            Token::LiteralString(b"a\nb\rc\td\x08e\x0Cf()\\".to_vec())
        );
    }

    #[test]
    fn test_literal_string_octal() {
        assert_eq!(single(br"(\101\60\0063)"), Token::LiteralString(b"A0\x063".to_vec()));
        assert_eq!(single(br"(\7x)"), Token::LiteralString(b"\x07x".to_vec()));
    }

    #[test]
    fn test_literal_string_nested_parens() {
        assert_eq!(
            single(b"(Hello (nested) World)"),
            Token::LiteralString(b"Hello (nested) World".to_vec())
        );
    }

    #[test]
    fn test_literal_string_line_continuation() {
        assert_eq!(single(b"(ab\\\ncd)"), Token::LiteralString(b"abcd".to_vec()));
        assert_eq!(single(b"(ab\\\r\ncd)"), Token::LiteralString(b"abcd".to_vec()));
        assert_eq!(single(b"(ab\\\rcd)"), Token::LiteralString(b"abcd".to_vec()));
    }

    #[test]
    fn test_unknown_escape_drops_backslash() {
        assert_eq!(single(br"(\q)"), Token::LiteralString(b"q".to_vec()));
    }

    #[test]
    fn test_truncated_literal_string() {
        let mut lexer = lex(b"  (never closed");
        assert_eq!(lexer.next_token().unwrap(), None);
        assert_eq!(lexer.issues(), &[ParseIssue::TruncatedInput { offset: 2 }]);
    }

    #[test]
    fn test_hex_strings() {
        assert_eq!(single(b"<48656C6C6F>"), Token::HexString(b"Hello".to_vec()));
        assert_eq!(single(b"<48 65 6c\n6C 6F>"), Token::HexString(b"Hello".to_vec()));
        assert_eq!(single(b"<901FA>"), Token::HexString(vec![0x90, 0x1F, 0xA0]));
        assert_eq!(single(b"<>"), Token::HexString(Vec::new()));
    }

    #[test]
    fn test_names() {
        assert_eq!(single(b"/Type"), Token::Name("Type".to_string()));
        assert_eq!(single(b"/A#20B"), Token::Name("A B".to_string()));
        assert_eq!(single(b"/"), Token::Name(String::new()));
        assert_eq!(
            tokens(b"/Type/Page"),
            vec![Token::Name("Type".to_string()), Token::Name("Page".to_string())]
        );
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(
            tokens(b"<< [ ] >>"),
            vec![Token::DictStart, Token::ArrayStart, Token::ArrayEnd, Token::DictEnd]
        );
        assert_eq!(
            tokens(b"[1 2]"),
            vec![Token::ArrayStart, Token::Integer(1), Token::Integer(2), Token::ArrayEnd]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokens(b"10 0 obj true false null R endobj"),
            vec![
                Token::Integer(10),
                Token::Integer(0),
                Token::Keyword(Keyword::Obj),
                Token::Keyword(Keyword::True),
                Token::Keyword(Keyword::False),
                Token::Keyword(Keyword::Null),
                Token::Keyword(Keyword::R),
                Token::Keyword(Keyword::EndObj),
            ]
        );
        assert_eq!(single(b"Tj"), Token::Keyword(Keyword::Other("Tj".to_string())));
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens(b"%PDF-1.7\n1"),
            vec![Token::Comment(b"PDF-1.7".to_vec()), Token::Integer(1)]
        );
    }

    #[test]
    fn test_line_ending_pushed_back_after_word() {
        let mut lexer = lex(b"stream\r\nabc");
        assert_eq!(lexer.next_token().unwrap(), Some(Token::Keyword(Keyword::Stream)));
        assert_eq!(lexer.position(), 6);
        assert_eq!(lexer.source_mut().next_byte().unwrap(), Some(b'\r'));
    }

    #[test]
    fn test_space_after_word_consumed() {
        let mut lexer = lex(b"obj x");
        lexer.next_token().unwrap();
        assert_eq!(lexer.position(), 4);
    }

    #[test]
    fn test_nul_is_whitespace() {
        assert_eq!(tokens(b"1\x002"), vec![Token::Integer(1), Token::Integer(2)]);
    }

    #[test]
    fn test_read_line() {
        let mut lexer = lex(b"0000000017 00000 n\r\nnext");
        assert_eq!(lexer.read_line().unwrap(), b"0000000017 00000 n");
        assert_eq!(lexer.read_line().unwrap(), b"next");
    }

    #[test]
    fn test_sequential_source() {
        let mut lexer = Lexer::new(ReaderSource::new(&b"<</A 1>>"[..]));
        let mut seen = Vec::new();
        while let Some(t) = lexer.next_token().unwrap() {
            seen.push(t);
        }
        assert_eq!(
            seen,
            vec![
                Token::DictStart,
                Token::Name("A".to_string()),
                Token::Integer(1),
                Token::DictEnd
            ]
        );
    }
}
