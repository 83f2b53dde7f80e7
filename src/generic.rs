//! Schema-less payload decoding.
//!
//! Payloads without a usable message type are decoded by wire type alone. Varints,
//! fixed-width values and length-delimited values are recognized from the tag, and
//! length-delimited values are further inferred to be a nested message, a UTF-8 string or raw
//! bytes, in that order of preference.
//!
//! ```
//! use trafficlight::generic::GenericMessage;
//!
//! let value = GenericMessage::decode(b"\x08\x96\x01\x12\x03abc");
//! assert_eq!(value.to_json_string(true), r#"{"1":150,"2":"abc"}"#);
//! ```

use bytes::Bytes;
use serde_json::{json, Map, Value as Json};

use crate::decode::read_varint;

/// Nested payloads deeper than this are kept as bytes rather than parsed.
const MAX_NESTING: usize = 64;

/// A message decoded without a schema.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct GenericMessage
{
    /// Fields in payload order.
    pub fields: Vec<GenericField>,

    /// Bytes at the end of the payload that could not be read as a field tag.
    pub garbage: Option<Bytes>,
}

/// A single field of a [`GenericMessage`].
#[derive(Debug, PartialEq, Clone)]
pub struct GenericField
{
    /// Field number.
    pub number: u64,

    /// Inferred value.
    pub value: GenericValue,
}

/// A value with an inferred type.
#[derive(Debug, PartialEq, Clone)]
pub enum GenericValue
{
    /// Varint (wire type 0), kept as the raw 64 bits.
    Varint(u64),

    /// 64-bit value (wire type 1).
    Fixed64(u64),

    /// 32-bit value (wire type 5).
    Fixed32(u32),

    /// Length-delimited value that decodes completely as a message.
    Message(GenericMessage),

    /// Length-delimited value that is valid UTF-8.
    String(String),

    /// Any other length-delimited value.
    Bytes(Bytes),

    /// The payload ended in the middle of the value.
    Incomplete(Bytes),

    /// The tag had a wire type that does not exist; the rest of the payload is kept here.
    Invalid(Bytes),
}

impl GenericMessage
{
    /// Decodes a payload. Never fails: damaged regions end up in `Incomplete` or `Invalid`
    /// values or in `garbage`, see [`GenericMessage::is_complete`].
    pub fn decode(data: &[u8]) -> Self
    {
        Self::decode_at(data, 0)
    }

    fn decode_at(mut data: &[u8], depth: usize) -> Self
    {
        let mut msg = GenericMessage::default();
        while !data.is_empty() {
            let before_tag = data;
            let tag = match read_varint(&mut data) {
                Some(tag) if tag >> 3 != 0 => tag,
                _ => {
                    msg.garbage = Some(Bytes::copy_from_slice(before_tag));
                    break;
                }
            };

            let number = tag >> 3;
            let value = GenericValue::decode(&mut data, (tag & 0x07) as u8, depth);
            msg.fields.push(GenericField { number, value });
        }

        msg
    }

    /// Decodes a nested payload, yielding `None` unless every byte is accounted for.
    fn decode_nested(data: &[u8], depth: usize) -> Option<Self>
    {
        if data.is_empty() || depth >= MAX_NESTING {
            return None;
        }

        let msg = Self::decode_at(data, depth + 1);
        match msg.is_complete() {
            true => Some(msg),
            false => None,
        }
    }

    /// True if the payload decoded without any damaged region.
    pub fn is_complete(&self) -> bool
    {
        self.garbage.is_none()
            && self.fields.iter().all(|f| match &f.value {
                GenericValue::Incomplete(..) | GenericValue::Invalid(..) => false,
                GenericValue::Message(m) => m.is_complete(),
                _ => true,
            })
    }

    /// Converts the message into JSON keyed by field number.
    ///
    /// Field numbers that occur more than once become arrays, in the order of first
    /// occurrence. Garbage is included under a `"garbage"` key as hex. Damaged values are
    /// wrapped as `{"incomplete": "<hex>"}` or `{"invalid": "<hex>"}`.
    pub fn to_json(&self) -> Json
    {
        let mut map = Map::new();
        for (number, values) in self.grouped() {
            let value = match values.as_slice() {
                [single] => single.to_json(),
                many => Json::Array(many.iter().map(|v| v.to_json()).collect()),
            };
            map.insert(number.to_string(), value);
        }

        if let Some(garbage) = &self.garbage {
            map.insert("garbage".to_string(), Json::String(hex(garbage)));
        }

        Json::Object(map)
    }

    /// The inferred type of every field, as `{ "<number>": { "type": ... } }`.
    ///
    /// Nested messages carry their own definition under `"message_typedef"`. When a repeated
    /// field mixes types, the first occurrence decides.
    pub fn typedef(&self) -> Json
    {
        let mut map = Map::new();
        for (number, values) in self.grouped() {
            let first = values[0];
            let mut entry = Map::new();
            entry.insert("type".to_string(), json!(first.type_name()));
            if let GenericValue::Message(m) = first {
                entry.insert("message_typedef".to_string(), m.typedef());
            }
            map.insert(number.to_string(), Json::Object(entry));
        }

        Json::Object(map)
    }

    /// Renders the JSON form, either compact or indented by two spaces.
    pub fn to_json_string(&self, one_line: bool) -> String
    {
        let json = self.to_json();
        let rendered = match one_line {
            true => serde_json::to_string(&json),
            false => serde_json::to_string_pretty(&json),
        };

        // Serializing a `serde_json::Value` cannot fail.
        rendered.unwrap_or_default()
    }

    fn grouped(&self) -> Vec<(u64, Vec<&GenericValue>)>
    {
        let mut groups: Vec<(u64, Vec<&GenericValue>)> = vec![];
        for field in &self.fields {
            match groups.iter_mut().find(|(n, _)| *n == field.number) {
                Some((_, values)) => values.push(&field.value),
                None => groups.push((field.number, vec![&field.value])),
            }
        }
        groups
    }
}

impl GenericValue
{
    fn decode(data: &mut &[u8], wire_type: u8, depth: usize) -> Self
    {
        let original = *data;
        let value = match wire_type {
            0 => read_varint(data).map(GenericValue::Varint),
            1 => take(data, 8).map(|b| {
                let mut le = [0u8; 8];
                le.copy_from_slice(b);
                GenericValue::Fixed64(u64::from_le_bytes(le))
            }),
            5 => take(data, 4).map(|b| {
                let mut le = [0u8; 4];
                le.copy_from_slice(b);
                GenericValue::Fixed32(u32::from_le_bytes(le))
            }),
            2 => read_varint(data)
                .and_then(|len| take(data, len as usize))
                .map(|b| Self::infer_length_delimited(b, depth)),
            _ => {
                *data = &[];
                return GenericValue::Invalid(Bytes::copy_from_slice(original));
            }
        };

        value.unwrap_or_else(|| {
            *data = &[];
            GenericValue::Incomplete(Bytes::copy_from_slice(original))
        })
    }

    fn infer_length_delimited(bytes: &[u8], depth: usize) -> Self
    {
        if let Some(msg) = GenericMessage::decode_nested(bytes, depth) {
            return GenericValue::Message(msg);
        }

        match std::str::from_utf8(bytes) {
            Ok(s) => GenericValue::String(s.to_string()),
            Err(_) => GenericValue::Bytes(Bytes::copy_from_slice(bytes)),
        }
    }

    /// Name of the inferred type.
    pub fn type_name(&self) -> &'static str
    {
        match self {
            GenericValue::Varint(..) => "int",
            GenericValue::Fixed64(..) => "fixed64",
            GenericValue::Fixed32(..) => "fixed32",
            GenericValue::Message(..) => "message",
            GenericValue::String(..) => "string",
            GenericValue::Bytes(..) => "bytes",
            GenericValue::Incomplete(..) => "incomplete",
            GenericValue::Invalid(..) => "invalid",
        }
    }

    fn to_json(&self) -> Json
    {
        match self {
            // Varints are shown as two's complement signed integers.
            GenericValue::Varint(v) => json!(*v as i64),
            GenericValue::Fixed64(v) => json!(v),
            GenericValue::Fixed32(v) => json!(v),
            GenericValue::Message(m) => m.to_json(),
            GenericValue::String(s) => json!(s),
            GenericValue::Bytes(b) => json!(hex(b)),
            GenericValue::Incomplete(b) => json!({ "incomplete": hex(b) }),
            GenericValue::Invalid(b) => json!({ "invalid": hex(b) }),
        }
    }
}

fn take<'a>(data: &mut &'a [u8], len: usize) -> Option<&'a [u8]>
{
    if data.len() < len {
        return None;
    }

    let (taken, remainder) = data.split_at(len);
    *data = remainder;
    Some(taken)
}

fn hex(data: &[u8]) -> String
{
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn infers_nested_messages_and_strings()
    {
        // 1: 150, 2: { 1: "hi there" }, 3: "é", 4: [0xff, 0xfe]
        let payload = b"\x08\x96\x01\x12\x0a\x0a\x08hi there\x1a\x02\xc3\xa9\x22\x02\xff\xfe";
        let value = GenericMessage::decode(payload);

        assert!(value.is_complete());
        assert_eq!(
            value.to_json(),
            json!({
                "1": 150,
                "2": { "1": "hi there" },
                "3": "é",
                "4": "fffe"
            })
        );
        assert_eq!(
            value.typedef(),
            json!({
                "1": { "type": "int" },
                "2": {
                    "type": "message",
                    "message_typedef": { "1": { "type": "string" } }
                },
                "3": { "type": "string" },
                "4": { "type": "bytes" }
            })
        );
    }

    #[test]
    fn repeated_fields_keep_first_appearance_order()
    {
        let payload = b"\x10\x01\x08\x05\x10\x02\x10\x03";
        let value = GenericMessage::decode(payload);
        assert_eq!(value.to_json_string(true), r#"{"2":[1,2,3],"1":5}"#);
    }

    #[test]
    fn negative_varints_and_fixed_values()
    {
        let mut payload = vec![0x08];
        payload.extend_from_slice(b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01");
        payload.push(0x15); // 2: fixed32
        payload.extend_from_slice(&7u32.to_le_bytes());
        payload.push(0x19); // 3: fixed64
        payload.extend_from_slice(&9u64.to_le_bytes());

        let value = GenericMessage::decode(&payload);
        assert_eq!(value.to_json(), json!({ "1": -1, "2": 7, "3": 9 }));
    }

    #[test]
    fn damaged_payloads_are_flagged()
    {
        // Length prefix runs past the end.
        let value = GenericMessage::decode(b"\x08\x01\x12\x09abc");
        assert!(!value.is_complete());
        assert_eq!(
            value.fields[1].value,
            GenericValue::Incomplete(Bytes::from_static(b"\x09abc"))
        );
        assert_eq!(
            value.to_json(),
            json!({ "1": 1, "2": { "incomplete": "09616263" } })
        );

        // Wire type 7, next to a valid bytes field of the same content.
        let value = GenericMessage::decode(b"\x22\x01\xff\x0f\xff");
        assert!(!value.is_complete());
        assert_eq!(value.to_json(), json!({ "4": "ff", "1": { "invalid": "ff" } }));

        // Field number zero.
        let value = GenericMessage::decode(b"\x08\x01\x00\x00");
        assert!(!value.is_complete());
        assert_eq!(value.to_json(), json!({ "1": 1, "garbage": "0000" }));
    }

    #[test]
    fn pretty_output_is_two_space_indented_and_unescaped()
    {
        let value = GenericMessage::decode("\x0a\x06\u{30d4}\u{30ab}".as_bytes());
        assert_eq!(value.to_json_string(false), "{\n  \"1\": \"ピカ\"\n}");
    }
}
