//! Span-based JSON tokenizer and typed value parsing.
//!
//! [`tokenize`] splits a document into a flat array of [`Token`]s that point
//! back into the source text, in document order, without copying or
//! unescaping anything. Typed values are then read out of individual tokens
//! with [`Document::value`], which hands the token's text to
//! `serde-json-core` and range-checks the result.
//!
//! ```rust
//! use libshadow::json::{Document, Token};
//!
//! let mut tokens = [Token::default(); 16];
//! let doc = Document::parse(r#"{"state":{"delta":{"on":true}},"version":7}"#, &mut tokens).unwrap();
//! assert_eq!(doc.version(), Some(7));
//!
//! let on = doc.find("on").unwrap();
//! assert_eq!(doc.value::<bool>(on), Ok(true));
//! ```

use core::fmt;

use serde::de::DeserializeOwned;

/// JSON key that carries the correlation token of a request.
pub const CLIENT_TOKEN_KEY: &str = "clientToken";
/// JSON key that carries a document version.
pub const VERSION_KEY: &str = "version";
/// Key scans for fields stop at this key.
pub const METADATA_KEY: &str = "metadata";

/// Errors from tokenizing or reading typed values.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The text is not valid JSON.
    Invalid,
    /// The text ended inside a value.
    Partial,
    /// The document has more tokens than the token buffer holds.
    TooManyTokens,
    /// The top-level value is not an object.
    NotAnObject,
    /// The token is of the wrong kind for the requested type.
    TypeMismatch,
    /// The token text does not parse as the requested type.
    InvalidValue,
    /// The number does not fit the requested type.
    OutOfRange,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Invalid => "invalid JSON",
            Error::Partial => "truncated JSON",
            Error::TooManyTokens => "too many JSON tokens",
            Error::NotAnObject => "top-level JSON value is not an object",
            Error::TypeMismatch => "JSON token has the wrong kind",
            Error::InvalidValue => "JSON value does not parse",
            Error::OutOfRange => "JSON number out of range",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Invalid => defmt::write!(f, "Invalid"),
            Error::Partial => defmt::write!(f, "Partial"),
            Error::TooManyTokens => defmt::write!(f, "TooManyTokens"),
            Error::NotAnObject => defmt::write!(f, "NotAnObject"),
            Error::TypeMismatch => defmt::write!(f, "TypeMismatch"),
            Error::InvalidValue => defmt::write!(f, "InvalidValue"),
            Error::OutOfRange => defmt::write!(f, "OutOfRange"),
        }
    }
}

/// Kind of value a token spans.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TokenKind {
    /// `{ ... }`
    #[default]
    Object,
    /// `[ ... ]`
    Array,
    /// A string; the span excludes the quotes.
    String,
    /// A number, `true`, `false` or `null`.
    Primitive,
}

/// A span of the source text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Token {
    /// What the span holds.
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// Number of direct children. A key string has exactly one: its value.
    pub size: usize,
}

// Containers are allocated before their end is known. Every finished token
// ends past offset 0, so 0 marks a container that is still open.
const OPEN: usize = 0;

impl Token {
    fn is_open(&self) -> bool {
        self.end == OPEN
    }

    fn is_container(&self) -> bool {
        matches!(self.kind, TokenKind::Object | TokenKind::Array)
    }

    /// Whether this token is an object key.
    pub fn is_key(&self) -> bool {
        self.kind == TokenKind::String && self.size == 1
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span is empty.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

fn alloc(tokens: &mut [Token], next: &mut usize, token: Token) -> Result<usize, Error> {
    let slot = tokens.get_mut(*next).ok_or(Error::TooManyTokens)?;
    *slot = token;
    *next += 1;
    Ok(*next - 1)
}

/// Tokenize `json` into `tokens`, returning the number of tokens used.
///
/// Primitives are accepted leniently (any run of printable characters up to a
/// delimiter); their text is validated when read with [`Document::value`].
pub fn tokenize(json: &str, tokens: &mut [Token]) -> Result<usize, Error> {
    let bytes = json.as_bytes();
    let mut next = 0usize;
    let mut parent: Option<usize> = None;
    let mut pos = 0usize;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b'{' | b'[' => {
                let kind = if c == b'{' { TokenKind::Object } else { TokenKind::Array };
                let idx = alloc(
                    tokens,
                    &mut next,
                    Token {
                        kind,
                        start: pos,
                        end: OPEN,
                        size: 0,
                    },
                )?;
                if let Some(p) = parent {
                    tokens[p].size += 1;
                }
                parent = Some(idx);
            }
            b'}' | b']' => {
                let kind = if c == b'}' { TokenKind::Object } else { TokenKind::Array };
                let closed = (0..next)
                    .rev()
                    .find(|&i| tokens[i].is_open())
                    .ok_or(Error::Invalid)?;
                if tokens[closed].kind != kind {
                    return Err(Error::Invalid);
                }
                tokens[closed].end = pos + 1;
                parent = (0..closed).rev().find(|&i| tokens[i].is_open());
            }
            b'"' => {
                let end = scan_string(bytes, pos + 1)?;
                alloc(
                    tokens,
                    &mut next,
                    Token {
                        kind: TokenKind::String,
                        start: pos + 1,
                        end,
                        size: 0,
                    },
                )?;
                if let Some(p) = parent {
                    tokens[p].size += 1;
                }
                pos = end;
            }
            b'\t' | b'\r' | b'\n' | b' ' => {}
            b':' => parent = next.checked_sub(1),
            b',' => {
                if let Some(p) = parent {
                    if !tokens[p].is_container() {
                        parent = (0..next)
                            .rev()
                            .find(|&i| tokens[i].is_container() && tokens[i].is_open());
                    }
                }
            }
            _ => {
                let end = scan_primitive(bytes, pos)?;
                alloc(
                    tokens,
                    &mut next,
                    Token {
                        kind: TokenKind::Primitive,
                        start: pos,
                        end,
                        size: 0,
                    },
                )?;
                if let Some(p) = parent {
                    tokens[p].size += 1;
                }
                pos = end - 1;
            }
        }
        pos += 1;
    }

    if tokens[..next].iter().any(Token::is_open) {
        return Err(Error::Partial);
    }
    Ok(next)
}

/// Returns the offset of the closing quote of a string whose body starts at `start`.
fn scan_string(bytes: &[u8], start: usize) -> Result<usize, Error> {
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'"' => return Ok(pos),
            b'\\' => {
                pos += 1;
                match bytes.get(pos) {
                    Some(b'"' | b'/' | b'\\' | b'b' | b'f' | b'r' | b'n' | b't') => {}
                    Some(b'u') => {
                        let hex = bytes.get(pos + 1..pos + 5).ok_or(Error::Partial)?;
                        if !hex.iter().all(u8::is_ascii_hexdigit) {
                            return Err(Error::Invalid);
                        }
                        pos += 4;
                    }
                    Some(_) => return Err(Error::Invalid),
                    None => return Err(Error::Partial),
                }
            }
            _ => {}
        }
        pos += 1;
    }
    Err(Error::Partial)
}

/// Returns the offset one past the end of a primitive starting at `start`.
fn scan_primitive(bytes: &[u8], start: usize) -> Result<usize, Error> {
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\t' | b'\r' | b'\n' | b' ' | b',' | b']' | b'}' | b':' => break,
            b if !(32..127).contains(&b) => return Err(Error::Invalid),
            _ => {}
        }
        pos += 1;
    }
    Ok(pos)
}

/// A value that can be read from a single token.
pub trait FromToken: Sized {
    /// Parse `text`, the span of a token of kind `kind`.
    fn from_token(text: &str, kind: TokenKind) -> Result<Self, Error>;
}

fn primitive<N: DeserializeOwned>(text: &str, kind: TokenKind) -> Result<N, Error> {
    if kind != TokenKind::Primitive {
        return Err(Error::TypeMismatch);
    }
    serde_json_core::from_str::<N>(text)
        .map(|(value, _)| value)
        .map_err(|_| Error::InvalidValue)
}

macro_rules! signed_from_token {
    ($($ty:ty),*) => {$(
        impl FromToken for $ty {
            fn from_token(text: &str, kind: TokenKind) -> Result<Self, Error> {
                let wide: i64 = primitive(text, kind)?;
                <$ty>::try_from(wide).map_err(|_| Error::OutOfRange)
            }
        }
    )*};
}

macro_rules! unsigned_from_token {
    ($($ty:ty),*) => {$(
        impl FromToken for $ty {
            fn from_token(text: &str, kind: TokenKind) -> Result<Self, Error> {
                if text.starts_with('-') {
                    return Err(Error::InvalidValue);
                }
                let wide: u64 = primitive(text, kind)?;
                <$ty>::try_from(wide).map_err(|_| Error::OutOfRange)
            }
        }
    )*};
}

signed_from_token!(i8, i16, i32);
unsigned_from_token!(u8, u16, u32);

impl FromToken for f32 {
    fn from_token(text: &str, kind: TokenKind) -> Result<Self, Error> {
        primitive(text, kind)
    }
}

impl FromToken for f64 {
    fn from_token(text: &str, kind: TokenKind) -> Result<Self, Error> {
        primitive(text, kind)
    }
}

impl FromToken for bool {
    fn from_token(text: &str, kind: TokenKind) -> Result<Self, Error> {
        primitive(text, kind)
    }
}

/// A tokenized JSON object.
#[derive(Debug, Clone, Copy)]
pub struct Document<'j, 't> {
    json: &'j str,
    tokens: &'t [Token],
}

impl<'j, 't> Document<'j, 't> {
    /// Tokenize `json` into `tokens` and require the top-level value to be an
    /// object.
    pub fn parse(json: &'j str, tokens: &'t mut [Token]) -> Result<Self, Error> {
        let count = tokenize(json, tokens)?;
        let tokens = &tokens[..count];
        match tokens.first() {
            Some(root) if root.kind == TokenKind::Object => Ok(Self { json, tokens }),
            _ => Err(Error::NotAnObject),
        }
    }

    /// The source text.
    pub fn json(&self) -> &'j str {
        self.json
    }

    /// All tokens, root first.
    pub fn tokens(&self) -> &'t [Token] {
        self.tokens
    }

    /// The text a token spans.
    pub fn text(&self, token: &Token) -> &'j str {
        self.json.get(token.start..token.end).unwrap_or("")
    }

    fn key_eq(&self, token: &Token, key: &str) -> bool {
        token.is_key() && self.text(token) == key
    }

    fn values_of<'s>(&'s self, key: &'s str) -> impl Iterator<Item = &'t Token> + 's {
        let tokens = self.tokens;
        (1..tokens.len().saturating_sub(1))
            .filter(move |&i| self.key_eq(&tokens[i], key))
            .map(move |i| &tokens[i + 1])
    }

    /// The value of the first `key` anywhere in the document, scanning in
    /// document order and stopping at a `"metadata"` key.
    pub fn find(&self, key: &str) -> Option<&'t Token> {
        for i in 1..self.tokens.len().saturating_sub(1) {
            let token = &self.tokens[i];
            if self.key_eq(token, key) {
                return Some(&self.tokens[i + 1]);
            }
            if self.key_eq(token, METADATA_KEY) {
                return None;
            }
        }
        None
    }

    /// Read a typed value out of `token`.
    pub fn value<V: FromToken>(&self, token: &Token) -> Result<V, Error> {
        V::from_token(self.text(token), token.kind)
    }

    /// The raw (still escaped) text of a string token.
    pub fn str(&self, token: &Token) -> Result<&'j str, Error> {
        if token.kind != TokenKind::String {
            return Err(Error::TypeMismatch);
        }
        Ok(self.text(token))
    }

    /// The first `"clientToken"` value, if it is a string.
    pub fn client_token(&self) -> Option<&'j str> {
        self.values_of(CLIENT_TOKEN_KEY)
            .next()
            .and_then(|token| self.str(token).ok())
    }

    /// The first `"version"` value that parses as a `u32`.
    pub fn version(&self) -> Option<u32> {
        self.values_of(VERSION_KEY)
            .find_map(|token| self.value::<u32>(token).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(json: &str) -> heapless::Vec<(TokenKind, usize), 32> {
        let mut tokens = [Token::default(); 32];
        let n = tokenize(json, &mut tokens).unwrap();
        tokens[..n].iter().map(|t| (t.kind, t.size)).collect()
    }

    #[test]
    fn nested_structure() {
        use TokenKind::*;
        assert_eq!(
            kinds(r#"{"a":[1,"x"],"b":{"c":null}}"#).as_slice(),
            &[
                (Object, 2),
                (String, 1),
                (Array, 2),
                (Primitive, 0),
                (String, 0),
                (String, 1),
                (Object, 1),
                (String, 1),
                (Primitive, 0),
            ]
        );
    }

    #[test]
    fn spans_point_into_source() {
        let json = r#"{ "key" : "va\"lue", "n": -12.5 }"#;
        let mut tokens = [Token::default(); 8];
        let doc = Document::parse(json, &mut tokens).unwrap();
        assert_eq!(doc.tokens().len(), 5);
        assert_eq!(doc.text(&doc.tokens()[1]), "key");
        assert_eq!(doc.text(&doc.tokens()[2]), r#"va\"lue"#);
        assert_eq!(doc.text(&doc.tokens()[4]), "-12.5");
        assert_eq!(doc.tokens()[0].len(), json.len());
    }

    #[test]
    fn malformed_documents() {
        let mut tokens = [Token::default(); 8];
        assert_eq!(tokenize(r#"{"a":1"#, &mut tokens), Err(Error::Partial));
        assert_eq!(tokenize(r#"{"a":"#, &mut tokens), Err(Error::Partial));
        assert_eq!(tokenize(r#"{"a:1}"#, &mut tokens), Err(Error::Partial));
        assert_eq!(tokenize(r#"{"a":1]"#, &mut tokens), Err(Error::Invalid));
        assert_eq!(tokenize(r#"}"#, &mut tokens), Err(Error::Invalid));
        assert_eq!(tokenize(r#"{"a":"\q"}"#, &mut tokens), Err(Error::Invalid));
        assert_eq!(tokenize(r#"[1,2,3,4,5,6,7,8]"#, &mut tokens), Err(Error::TooManyTokens));
    }

    #[test]
    fn top_level_must_be_an_object() {
        let mut tokens = [Token::default(); 8];
        assert_eq!(Document::parse("[1]", &mut tokens).err(), Some(Error::NotAnObject));
        assert_eq!(Document::parse("", &mut tokens).err(), Some(Error::NotAnObject));
    }

    #[test]
    fn typed_values() {
        let json = r#"{"u":200,"neg":-5,"big":70000,"f":1.5,"b":false,"s":"on","o":{}}"#;
        let mut tokens = [Token::default(); 16];
        let doc = Document::parse(json, &mut tokens).unwrap();
        let get = |key| doc.find(key).unwrap();

        assert_eq!(doc.value::<u8>(get("u")), Ok(200));
        assert_eq!(doc.value::<i8>(get("u")), Err(Error::OutOfRange));
        assert_eq!(doc.value::<u32>(get("neg")), Err(Error::InvalidValue));
        assert_eq!(doc.value::<i16>(get("neg")), Ok(-5));
        assert_eq!(doc.value::<u16>(get("big")), Err(Error::OutOfRange));
        assert_eq!(doc.value::<i32>(get("big")), Ok(70_000));
        assert_eq!(doc.value::<f32>(get("f")), Ok(1.5));
        assert_eq!(doc.value::<f64>(get("f")), Ok(1.5));
        assert_eq!(doc.value::<bool>(get("b")), Ok(false));
        assert_eq!(doc.value::<bool>(get("u")), Err(Error::InvalidValue));
        assert_eq!(doc.value::<i32>(get("s")), Err(Error::TypeMismatch));
        assert_eq!(doc.str(get("s")), Ok("on"));
        assert_eq!(doc.str(get("u")), Err(Error::TypeMismatch));
        assert_eq!(doc.value::<u32>(get("o")), Err(Error::TypeMismatch));
    }

    #[test]
    fn find_stops_at_metadata() {
        let json = r#"{"state":{"a":1},"metadata":{"b":{"timestamp":1}},"b":2}"#;
        let mut tokens = [Token::default(); 16];
        let doc = Document::parse(json, &mut tokens).unwrap();
        assert!(doc.find("a").is_some());
        assert!(doc.find("b").is_none());
    }

    #[test]
    fn keys_are_not_confused_with_values() {
        let json = r#"{"mode":"version","version":3}"#;
        let mut tokens = [Token::default(); 8];
        let doc = Document::parse(json, &mut tokens).unwrap();
        assert_eq!(doc.version(), Some(3));
    }

    #[test]
    fn client_token_and_version() {
        let json = r#"{"state":{},"version":"x","clientToken":"dev-3","timestamp":1,"version":12}"#;
        let mut tokens = [Token::default(); 16];
        let doc = Document::parse(json, &mut tokens).unwrap();
        assert_eq!(doc.client_token(), Some("dev-3"));
        assert_eq!(doc.version(), Some(12));
    }
}
