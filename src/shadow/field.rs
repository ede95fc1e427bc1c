//! Typed shadow fields shared by the document builder and the delta dispatcher.

use core::cell::RefCell;
use core::fmt::{self, Write};

use heapless::String;

use super::config::MAX_FIELD_STR_LEN;
use crate::json::{self, Document, Token};

/// The value of a shadow field, tagged with its type.
///
/// Numbers and booleans are read from primitive tokens, strings from string
/// tokens. `Object` holds raw JSON text: it is written verbatim into
/// documents and never parsed from a delta.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `int32_t`
    I32(i32),
    /// `int16_t`
    I16(i16),
    /// `int8_t`
    I8(i8),
    /// `uint32_t`
    U32(u32),
    /// `uint16_t`
    U16(u16),
    /// `uint8_t`
    U8(u8),
    /// Single precision float, written with six decimals.
    F32(f32),
    /// Double precision float, written with six decimals.
    F64(f64),
    /// `true` / `false`
    Bool(bool),
    /// A string, stored without quotes and without unescaping.
    Str(String<MAX_FIELD_STR_LEN>),
    /// A raw JSON object.
    Object(String<MAX_FIELD_STR_LEN>),
}

impl FieldValue {
    /// Whether this is a raw object value.
    pub fn is_object(&self) -> bool {
        matches!(self, FieldValue::Object(_))
    }

    pub(super) fn write_json<W: Write>(&self, out: &mut W) -> fmt::Result {
        match self {
            FieldValue::I32(v) => write!(out, "{}", v),
            FieldValue::I16(v) => write!(out, "{}", v),
            FieldValue::I8(v) => write!(out, "{}", v),
            FieldValue::U32(v) => write!(out, "{}", v),
            FieldValue::U16(v) => write!(out, "{}", v),
            FieldValue::U8(v) => write!(out, "{}", v),
            FieldValue::F32(v) => write!(out, "{:.6}", v),
            FieldValue::F64(v) => write!(out, "{:.6}", v),
            FieldValue::Bool(v) => out.write_str(if *v { "true" } else { "false" }),
            FieldValue::Str(s) => write!(out, "\"{}\"", s),
            FieldValue::Object(s) => out.write_str(s),
        }
    }

    /// Overwrite the value from `token`, keeping the current type. On error the
    /// value is left untouched.
    pub(super) fn update_from(&mut self, doc: &Document<'_, '_>, token: &Token) -> Result<(), json::Error> {
        match self {
            FieldValue::I32(v) => *v = doc.value(token)?,
            FieldValue::I16(v) => *v = doc.value(token)?,
            FieldValue::I8(v) => *v = doc.value(token)?,
            FieldValue::U32(v) => *v = doc.value(token)?,
            FieldValue::U16(v) => *v = doc.value(token)?,
            FieldValue::U8(v) => *v = doc.value(token)?,
            FieldValue::F32(v) => *v = doc.value(token)?,
            FieldValue::F64(v) => *v = doc.value(token)?,
            FieldValue::Bool(v) => *v = doc.value(token)?,
            FieldValue::Str(s) => {
                *s = String::try_from(doc.str(token)?).map_err(|_| json::Error::OutOfRange)?;
            }
            FieldValue::Object(_) => {}
        }
        Ok(())
    }
}

/// Called for a registered field whenever a delta carries its key.
///
/// Implemented for every `Fn(&str, &JsonField)` closure.
pub trait DeltaCallback {
    /// `value` is the raw text of the matched value (without quotes for
    /// strings). By the time this runs `field` already holds the parsed value,
    /// unless parsing failed or the field is an object.
    fn on_delta(&self, value: &str, field: &JsonField<'_>);
}

impl<F> DeltaCallback for F
where
    F: Fn(&str, &JsonField<'_>),
{
    fn on_delta(&self, value: &str, field: &JsonField<'_>) {
        self(value, field)
    }
}

/// A keyed shadow field.
///
/// Fields are shared by reference between the application, the document
/// builder and the delta table, so the value sits behind a [`RefCell`].
///
/// ```rust
/// use libshadow::shadow::{FieldValue, JsonField};
///
/// let temperature = JsonField::new("temperature", FieldValue::F32(21.5));
/// temperature.set(FieldValue::F32(22.0));
/// assert_eq!(temperature.value(), FieldValue::F32(22.0));
/// ```
pub struct JsonField<'a> {
    key: &'a str,
    value: RefCell<FieldValue>,
    callback: Option<&'a dyn DeltaCallback>,
}

impl<'a> JsonField<'a> {
    /// A field without a delta callback.
    pub fn new(key: &'a str, value: FieldValue) -> Self {
        Self {
            key,
            value: RefCell::new(value),
            callback: None,
        }
    }

    /// A field whose callback runs on every delta that carries `key`.
    pub fn with_callback(key: &'a str, value: FieldValue, callback: &'a dyn DeltaCallback) -> Self {
        Self {
            key,
            value: RefCell::new(value),
            callback: Some(callback),
        }
    }

    /// The JSON key.
    pub fn key(&self) -> &'a str {
        self.key
    }

    /// A copy of the current value.
    pub fn value(&self) -> FieldValue {
        self.value.borrow().clone()
    }

    /// Replace the value.
    pub fn set(&self, value: FieldValue) {
        *self.value.borrow_mut() = value;
    }

    pub(super) fn callback(&self) -> Option<&'a dyn DeltaCallback> {
        self.callback
    }

    pub(super) fn write_json<W: Write>(&self, out: &mut W) -> fmt::Result {
        write!(out, "\"{}\":", self.key)?;
        self.value.borrow().write_json(out)
    }

    /// Parse `token` into the value unless it is an object.
    pub(super) fn update_from(&self, doc: &Document<'_, '_>, token: &Token) -> Result<(), json::Error> {
        let mut value = self.value.try_borrow_mut().map_err(|_| json::Error::TypeMismatch)?;
        if value.is_object() {
            return Ok(());
        }
        value.update_from(doc, token)
    }
}

impl fmt::Debug for JsonField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonField")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(value: FieldValue) -> String<64> {
        let mut out = String::new();
        value.write_json(&mut out).unwrap();
        out
    }

    #[test]
    fn values_render_like_the_wire_format() {
        assert_eq!(render(FieldValue::I8(-3)).as_str(), "-3");
        assert_eq!(render(FieldValue::U32(4_000_000_000)).as_str(), "4000000000");
        assert_eq!(render(FieldValue::F32(21.5)).as_str(), "21.500000");
        assert_eq!(render(FieldValue::F64(-0.25)).as_str(), "-0.250000");
        assert_eq!(render(FieldValue::Bool(true)).as_str(), "true");
        assert_eq!(
            render(FieldValue::Str(String::try_from("on").unwrap())).as_str(),
            "\"on\""
        );
        assert_eq!(
            render(FieldValue::Object(String::try_from("{\"a\":1}").unwrap())).as_str(),
            "{\"a\":1}"
        );
    }

    #[test]
    fn update_keeps_type_and_rejects_mismatch() {
        let mut tokens = [Token::default(); 16];
        let doc = Document::parse(r#"{"n":7,"s":"x","o":{"a":1}}"#, &mut tokens).unwrap();

        let field = JsonField::new("n", FieldValue::U8(0));
        field.update_from(&doc, doc.find("n").unwrap()).unwrap();
        assert_eq!(field.value(), FieldValue::U8(7));

        assert_eq!(
            field.update_from(&doc, doc.find("s").unwrap()),
            Err(json::Error::TypeMismatch)
        );
        assert_eq!(field.value(), FieldValue::U8(7));

        let raw = JsonField::new("o", FieldValue::Object(String::new()));
        raw.update_from(&doc, doc.find("o").unwrap()).unwrap();
        assert_eq!(raw.value(), FieldValue::Object(String::new()));
    }
}
