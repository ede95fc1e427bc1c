//! Shadow request documents and client tokens.
//!
//! An update document is assembled in place:
//!
//! ```text
//! {"state":{"reported":{"k":v,...},"desired":{"k":v,...}}, "clientToken":"<id>-<n>"}
//! ```
//!
//! Get and delete requests only carry a client token.

use core::fmt::Write;

use heapless::String;
use serde::Serialize;

use super::config::{MAX_CLIENT_ID_LEN, MAX_CLIENT_TOKEN_LEN, REQUEST_BODY_LEN};
use super::error::Error;
use super::field::JsonField;

/// Generates `<client id>-<sequence>` tokens, the sequence counting up from 0.
#[derive(Debug, Default, Clone)]
pub struct ClientTokens {
    client_id: String<MAX_CLIENT_ID_LEN>,
    next: u32,
}

impl ClientTokens {
    /// A generator for `client_id`, starting at sequence 0.
    pub fn new(client_id: &str) -> Result<Self, Error> {
        Ok(Self {
            client_id: String::try_from(client_id).map_err(|_| Error::InvalidArgument)?,
            next: 0,
        })
    }

    /// Restart the sequence at 0.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Write the next token into `out`. The sequence advances even if the
    /// token does not fit.
    pub fn write_next<W: Write>(&mut self, out: &mut W) -> Result<(), Error> {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        write!(out, "{}-{}", self.client_id, seq).map_err(|_| Error::BufferTruncated)
    }

    /// The next token.
    pub fn next_token(&mut self) -> Result<String<MAX_CLIENT_TOKEN_LEN>, Error> {
        let mut token = String::new();
        self.write_next(&mut token)?;
        Ok(token)
    }
}

#[derive(Serialize)]
struct TokenOnly<'t> {
    #[serde(rename = "clientToken")]
    client_token: &'t str,
}

/// `{"clientToken":"<token>"}`, the body of get and delete requests.
pub fn request_body(tokens: &mut ClientTokens) -> Result<String<REQUEST_BODY_LEN>, Error> {
    let token = tokens.next_token()?;
    serde_json_core::to_string(&TokenOnly { client_token: &token }).map_err(|_| Error::BufferTruncated)
}

/// An update document under construction in a buffer of `N` bytes.
///
/// ```rust
/// use libshadow::shadow::{ClientTokens, FieldValue, JsonField, UpdateDocument};
///
/// let mut tokens = ClientTokens::new("lamp").unwrap();
/// let on = JsonField::new("on", FieldValue::Bool(true));
///
/// let mut doc = UpdateDocument::<128>::new().unwrap();
/// doc.add_reported(&[&on]).unwrap();
/// doc.finalize(&mut tokens).unwrap();
/// assert_eq!(
///     doc.as_str(),
///     r#"{"state":{"reported":{"on":true}}, "clientToken":"lamp-0"}"#
/// );
/// ```
#[derive(Debug, Clone)]
pub struct UpdateDocument<const N: usize> {
    buf: String<N>,
}

impl<const N: usize> UpdateDocument<N> {
    /// Start a document: `{"state":{`.
    pub fn new() -> Result<Self, Error> {
        let mut buf = String::new();
        buf.push_str("{\"state\":{").map_err(|_| Error::BufferTruncated)?;
        Ok(Self { buf })
    }

    /// Append a `"reported"` section with `fields`.
    pub fn add_reported(&mut self, fields: &[&JsonField<'_>]) -> Result<(), Error> {
        self.add_section("reported", fields)
    }

    /// Append a `"desired"` section with `fields`.
    pub fn add_desired(&mut self, fields: &[&JsonField<'_>]) -> Result<(), Error> {
        self.add_section("desired", fields)
    }

    fn ensure_room(&self) -> Result<(), Error> {
        if N - self.buf.len() <= 1 {
            return Err(Error::DocumentError);
        }
        Ok(())
    }

    fn add_section(&mut self, name: &str, fields: &[&JsonField<'_>]) -> Result<(), Error> {
        self.ensure_room()?;
        write!(self.buf, "\"{}\":{{", name).map_err(|_| Error::BufferTruncated)?;
        for field in fields {
            self.ensure_room()?;
            field.write_json(&mut self.buf).map_err(|_| Error::BufferTruncated)?;
            self.buf.push(',').map_err(|_| Error::BufferTruncated)?;
        }
        // The trailing separator becomes the section's closing brace.
        if self.buf.ends_with(',') {
            self.buf.pop();
        }
        self.buf.push_str("},").map_err(|_| Error::BufferTruncated)
    }

    /// Close the state object and append a fresh client token.
    pub fn finalize(&mut self, tokens: &mut ClientTokens) -> Result<(), Error> {
        self.ensure_room()?;
        if self.buf.ends_with(',') {
            self.buf.pop();
        }
        self.buf
            .push_str("}, \"clientToken\":\"")
            .map_err(|_| Error::BufferTruncated)?;
        self.ensure_room()?;
        tokens.write_next(&mut self.buf)?;
        self.ensure_room()?;
        self.buf.push_str("\"}").map_err(|_| Error::BufferTruncated)
    }

    /// The document text.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing was written. Never true for a constructed document.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::FieldValue;

    #[test]
    fn tokens_count_up_from_zero() {
        let mut tokens = ClientTokens::new("dev").unwrap();
        assert_eq!(tokens.next_token().unwrap().as_str(), "dev-0");
        assert_eq!(tokens.next_token().unwrap().as_str(), "dev-1");
        tokens.reset();
        assert_eq!(tokens.next_token().unwrap().as_str(), "dev-0");
    }

    #[test]
    fn get_and_delete_body() {
        let mut tokens = ClientTokens::new("dev").unwrap();
        tokens.next_token().unwrap();
        assert_eq!(request_body(&mut tokens).unwrap().as_str(), r#"{"clientToken":"dev-1"}"#);
    }

    #[test]
    fn reported_then_desired() {
        let mut tokens = ClientTokens::new("c").unwrap();
        let temp = JsonField::new("temp", FieldValue::F64(1.5));
        let on = JsonField::new("on", FieldValue::Bool(false));
        let mode = JsonField::new("mode", FieldValue::Str(String::try_from("eco").unwrap()));

        let mut doc = UpdateDocument::<256>::new().unwrap();
        doc.add_reported(&[&temp, &on]).unwrap();
        doc.add_desired(&[&mode]).unwrap();
        doc.finalize(&mut tokens).unwrap();
        assert_eq!(
            doc.as_str(),
            r#"{"state":{"reported":{"temp":1.500000,"on":false},"desired":{"mode":"eco"}}, "clientToken":"c-0"}"#
        );
    }

    #[test]
    fn overflow_is_reported() {
        let mut tokens = ClientTokens::new("c").unwrap();
        let big = JsonField::new("value", FieldValue::U32(123_456));

        let mut doc = UpdateDocument::<24>::new().unwrap();
        assert_eq!(doc.add_reported(&[&big]), Err(Error::BufferTruncated));

        let mut full = UpdateDocument::<11>::new().unwrap();
        assert_eq!(full.len(), 10);
        assert_eq!(full.finalize(&mut tokens), Err(Error::DocumentError));
    }
}
