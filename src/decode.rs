//! Binary payload decoding against message types from a [`Context`].
//!
//! Decoding itself is total: whatever cannot be read is kept in the result as
//! [`Value::Incomplete`], [`UnknownValue::Invalid`], [`UnknownValue::NotUtf8`] or
//! [`MessageValue::garbage`].
//! [`MessageInfo::try_decode`] turns any of those into a [`DecodeError`].

use crate::context::*;
use bytes::Bytes;
use snafu::Snafu;
use std::convert::{TryFrom, TryInto};

/// Messages nested deeper than this are kept as [`Value::Incomplete`] rather than decoded.
pub const MAX_DEPTH: usize = 100;

/// A field value.
#[derive(Debug, PartialEq, Clone)]
pub enum Value
{
    /// `double`
    Double(f64),
    /// `float`
    Float(f32),
    /// `int32`
    Int32(i32),
    /// `int64`
    Int64(i64),
    /// `uint32`
    UInt32(u32),
    /// `uint64`
    UInt64(u64),
    /// `sint32`
    SInt32(i32),
    /// `sint64`
    SInt64(i64),
    /// `fixed32`
    Fixed32(u32),
    /// `fixed64`
    Fixed64(u64),
    /// `sfixed32`
    SFixed32(i32),
    /// `sfixed64`
    SFixed64(i64),
    /// `bool`
    Bool(bool),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Bytes),

    /// Every value of one packed record of a repeated scalar field.
    Packed(PackedArray),

    /// Nested message.
    Message(Box<MessageValue>),

    /// Enum value, which need not be one of the declared values.
    Enum(EnumValue),

    /// The payload ended before the value did, or the value is a message nested deeper than
    /// [`MAX_DEPTH`]. Holds the bytes from after the tag to the end of the enclosing message.
    Incomplete(Bytes),

    /// A field the message type does not declare, or a declared field sent with a wire type
    /// that does not match its type.
    Unknown(UnknownValue),
}

/// Values of a packed repeated field.
#[derive(Debug, PartialEq, Clone)]
pub enum PackedArray
{
    /// `repeated double`
    Double(Vec<f64>),
    /// `repeated float`
    Float(Vec<f32>),
    /// `repeated int32`
    Int32(Vec<i32>),
    /// `repeated int64`
    Int64(Vec<i64>),
    /// `repeated uint32`
    UInt32(Vec<u32>),
    /// `repeated uint64`
    UInt64(Vec<u64>),
    /// `repeated sint32`
    SInt32(Vec<i32>),
    /// `repeated sint64`
    SInt64(Vec<i64>),
    /// `repeated fixed32`
    Fixed32(Vec<u32>),
    /// `repeated fixed64`
    Fixed64(Vec<u64>),
    /// `repeated sfixed32`
    SFixed32(Vec<i32>),
    /// `repeated sfixed64`
    SFixed64(Vec<i64>),
    /// `repeated bool`
    Bool(Vec<bool>),
    /// Repeated enum of the given type.
    Enum(EnumRef, Vec<i64>),
}

/// A value read by its wire type alone.
#[derive(Debug, PartialEq, Clone)]
pub enum UnknownValue
{
    /// Wire type 0.
    Varint(u64),

    /// Wire type 1.
    Fixed64(u64),

    /// Wire type 2.
    VariableLength(Bytes),

    /// Wire type 5.
    Fixed32(u32),

    /// A `string` field whose bytes are not UTF-8.
    NotUtf8(Bytes),

    /// A wire type without a known size. The rest of the enclosing message is consumed,
    /// since there is no telling where the value ends.
    Invalid(Bytes),
}

/// Enum field value.
#[derive(Debug, PartialEq, Clone)]
pub struct EnumValue
{
    /// Enum type of the field.
    pub enum_ref: EnumRef,

    /// Numeric value.
    pub value: i64,
}

/// A decoded message.
#[derive(Debug, PartialEq, Clone)]
pub struct MessageValue
{
    /// Message type.
    pub msg_ref: MessageRef,

    /// Fields in the order they appeared in the payload. A field may occur more than once.
    pub fields: Vec<FieldValue>,

    /// Bytes at the end of the message that do not start with a usable tag.
    pub garbage: Option<Bytes>,
}

/// One occurrence of a field.
#[derive(Debug, PartialEq, Clone)]
pub struct FieldValue
{
    /// Field number.
    pub number: u64,

    /// Value.
    pub value: Value,
}

/// A payload that does not decode cleanly against its message type.
///
/// `path` lists the field numbers from the outermost message to the damaged value, separated
/// by dots. An empty path refers to the outermost message itself.
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum DecodeError
{
    /// The payload ended in the middle of a value.
    #[snafu(display("Truncated value at field '{}'", path))]
    IncompleteValue
    {
        /// Field path.
        path: String,
    },

    /// A field used a wire type that does not exist.
    #[snafu(display("Invalid wire type at field '{}'", path))]
    InvalidWireType
    {
        /// Field path.
        path: String,
    },

    /// A `string` field held bytes that are not UTF-8.
    #[snafu(display("Invalid UTF-8 at field '{}'", path))]
    InvalidUtf8
    {
        /// Field path.
        path: String,
    },

    /// Bytes that could not be read as a field tag.
    #[snafu(display("{} bytes of trailing garbage in message '{}'", len, path))]
    TrailingGarbage
    {
        /// Path of the message containing the garbage.
        path: String,

        /// Number of garbage bytes.
        len: usize,
    },
}

/// A value as laid out on the wire, before its field type is applied.
enum Raw<'a>
{
    Varint(u64),
    Fixed64([u8; 8]),
    Delimited(&'a [u8]),
    Fixed32([u8; 4]),
}

impl<'a> Raw<'a>
{
    /// Reads one value of the wire type. `data` is left as it was if the value is cut short.
    fn read(data: &mut &'a [u8], wire_type: u8) -> Option<Self>
    {
        match wire_type {
            0 => read_varint(data).map(Raw::Varint),
            1 => take(data, 8).and_then(|b| b.try_into().ok()).map(Raw::Fixed64),
            2 => read_delimited(data).map(Raw::Delimited),
            5 => take(data, 4).and_then(|b| b.try_into().ok()).map(Raw::Fixed32),
            _ => None,
        }
    }
}

impl Value
{
    fn from_raw(raw: Raw, vt: &ValueType, ctx: &Context, depth: usize) -> Option<Self>
    {
        Some(match (raw, vt) {
            (Raw::Varint(v), ValueType::Int32) => Value::Int32(v as i32),
            (Raw::Varint(v), ValueType::Int64) => Value::Int64(v as i64),
            (Raw::Varint(v), ValueType::UInt32) => Value::UInt32(v as u32),
            (Raw::Varint(v), ValueType::UInt64) => Value::UInt64(v),
            (Raw::Varint(v), ValueType::SInt32) => Value::SInt32(unzigzag(v) as i32),
            (Raw::Varint(v), ValueType::SInt64) => Value::SInt64(unzigzag(v)),
            (Raw::Varint(v), ValueType::Bool) => Value::Bool(v != 0),
            (Raw::Varint(v), ValueType::Enum(enum_ref)) => Value::Enum(EnumValue {
                enum_ref: *enum_ref,
                value: v as i64,
            }),
            (Raw::Fixed64(b), ValueType::Double) => Value::Double(f64::from_le_bytes(b)),
            (Raw::Fixed64(b), ValueType::Fixed64) => Value::Fixed64(u64::from_le_bytes(b)),
            (Raw::Fixed64(b), ValueType::SFixed64) => Value::SFixed64(i64::from_le_bytes(b)),
            (Raw::Fixed32(b), ValueType::Float) => Value::Float(f32::from_le_bytes(b)),
            (Raw::Fixed32(b), ValueType::Fixed32) => Value::Fixed32(u32::from_le_bytes(b)),
            (Raw::Fixed32(b), ValueType::SFixed32) => Value::SFixed32(i32::from_le_bytes(b)),
            (Raw::Delimited(b), ValueType::String) => match std::str::from_utf8(b) {
                Ok(s) => Value::String(s.to_string()),
                Err(_) => Value::Unknown(UnknownValue::NotUtf8(Bytes::copy_from_slice(b))),
            },
            (Raw::Delimited(b), ValueType::Bytes) => Value::Bytes(Bytes::copy_from_slice(b)),
            (Raw::Delimited(b), ValueType::Message(msg_ref)) if depth < MAX_DEPTH => {
                let inner = ctx.resolve_message(*msg_ref).decode_at(b, ctx, depth + 1);
                Value::Message(Box::new(inner))
            }
            _ => return None,
        })
    }

    fn decode(data: &mut &[u8], vt: &ValueType, ctx: &Context, depth: usize) -> Self
    {
        let original = *data;
        Raw::read(data, vt.wire_type())
            .and_then(|raw| Value::from_raw(raw, vt, ctx, depth))
            .unwrap_or_else(|| incomplete(data, original))
    }

    fn decode_packed(data: &mut &[u8], vt: &ValueType, ctx: &Context) -> Self
    {
        let original = *data;
        let packed = match read_delimited(data) {
            Some(packed) => packed,
            None => return incomplete(data, original),
        };

        let mut items = vec![];
        let mut rest = packed;
        while !rest.is_empty() {
            let item = Raw::read(&mut rest, vt.wire_type())
                .and_then(|raw| Value::from_raw(raw, vt, ctx, 0));
            match item {
                Some(item) => items.push(item),
                None => return incomplete(data, original),
            }
        }

        match PackedArray::from_values(vt, items) {
            Some(array) => Value::Packed(array),
            None => Value::Unknown(UnknownValue::VariableLength(Bytes::copy_from_slice(packed))),
        }
    }

    fn decode_unknown(data: &mut &[u8], wire_type: u8) -> Self
    {
        let original = *data;
        let value = match Raw::read(data, wire_type) {
            Some(Raw::Varint(v)) => UnknownValue::Varint(v),
            Some(Raw::Fixed64(b)) => UnknownValue::Fixed64(u64::from_le_bytes(b)),
            Some(Raw::Delimited(b)) => UnknownValue::VariableLength(Bytes::copy_from_slice(b)),
            Some(Raw::Fixed32(b)) => UnknownValue::Fixed32(u32::from_le_bytes(b)),
            None => match wire_type {
                0 | 1 | 2 | 5 => return incomplete(data, original),
                _ => {
                    *data = &[];
                    UnknownValue::Invalid(Bytes::copy_from_slice(original))
                }
            },
        };
        Value::Unknown(value)
    }
}

impl PackedArray
{
    /// Collects decoded scalars into an array of the field type. `None` for types that do
    /// not pack.
    pub(crate) fn from_values(vt: &ValueType, values: Vec<Value>) -> Option<Self>
    {
        macro_rules! collect {
            ($variant:ident) => {
                PackedArray::$variant(
                    values
                        .into_iter()
                        .filter_map(|v| match v {
                            Value::$variant(v) => Some(v),
                            _ => None,
                        })
                        .collect(),
                )
            };
        }

        Some(match vt {
            ValueType::Double => collect!(Double),
            ValueType::Float => collect!(Float),
            ValueType::Int32 => collect!(Int32),
            ValueType::Int64 => collect!(Int64),
            ValueType::UInt32 => collect!(UInt32),
            ValueType::UInt64 => collect!(UInt64),
            ValueType::SInt32 => collect!(SInt32),
            ValueType::SInt64 => collect!(SInt64),
            ValueType::Fixed32 => collect!(Fixed32),
            ValueType::Fixed64 => collect!(Fixed64),
            ValueType::SFixed32 => collect!(SFixed32),
            ValueType::SFixed64 => collect!(SFixed64),
            ValueType::Bool => collect!(Bool),
            ValueType::Enum(enum_ref) => PackedArray::Enum(
                *enum_ref,
                values
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Enum(e) => Some(e.value),
                        _ => None,
                    })
                    .collect(),
            ),
            ValueType::String | ValueType::Bytes | ValueType::Message(..) => return None,
        })
    }
}

/// Consumes the rest of `data` into an incomplete value starting at `original`.
fn incomplete(data: &mut &[u8], original: &[u8]) -> Value
{
    *data = &[];
    Value::Incomplete(Bytes::copy_from_slice(original))
}

fn take<'a>(data: &mut &'a [u8], len: usize) -> Option<&'a [u8]>
{
    if data.len() < len {
        return None;
    }

    let (head, tail) = data.split_at(len);
    *data = tail;
    Some(head)
}

/// Reads a length prefix and the bytes it covers. Leaves `data` untouched on failure.
fn read_delimited<'a>(data: &mut &'a [u8]) -> Option<&'a [u8]>
{
    let mut rest = *data;
    let len = read_varint(&mut rest).and_then(|len| usize::try_from(len).ok())?;
    let value = take(&mut rest, len)?;
    *data = rest;
    Some(value)
}

/// Reads a base-128 varint of at most ten bytes. Leaves `data` untouched on failure.
pub(crate) fn read_varint(data: &mut &[u8]) -> Option<u64>
{
    let bytes = *data;
    let mut result = 0u64;
    for (idx, b) in bytes.iter().take(10).enumerate() {
        result |= u64::from(b & 0x7f) << (idx * 7);
        if b & 0x80 == 0 {
            *data = &bytes[idx + 1..];
            return Some(result);
        }
    }

    None
}

fn unzigzag(v: u64) -> i64
{
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

impl MessageRef
{
    /// Decodes a payload as this message type.
    ///
    /// Panics if the reference belongs to another context.
    pub fn decode(self, data: &[u8], ctx: &Context) -> MessageValue
    {
        ctx.resolve_message(self).decode(data, ctx)
    }

    /// Like [`MessageRef::decode`], but rejects payloads with damaged regions.
    pub fn try_decode(self, data: &[u8], ctx: &Context) -> Result<MessageValue, DecodeError>
    {
        ctx.resolve_message(self).try_decode(data, ctx)
    }
}

impl MessageInfo
{
    /// Decodes a payload as this message type.
    pub fn decode(&self, data: &[u8], ctx: &Context) -> MessageValue
    {
        self.decode_at(data, ctx, 0)
    }

    fn decode_at(&self, data: &[u8], ctx: &Context, depth: usize) -> MessageValue
    {
        let mut fields = vec![];
        let mut rest = data;
        while !rest.is_empty() {
            let before_tag = rest;
            let (number, wire_type) = match read_varint(&mut rest) {
                Some(tag) if tag >> 3 != 0 => (tag >> 3, (tag & 0x07) as u8),

                // Field number zero is never valid.
                _ => {
                    return MessageValue {
                        msg_ref: self.self_ref,
                        fields,
                        garbage: Some(Bytes::copy_from_slice(before_tag)),
                    }
                }
            };

            let value = self.decode_field(&mut rest, number, wire_type, ctx, depth);
            fields.push(FieldValue { number, value });
        }

        MessageValue {
            msg_ref: self.self_ref,
            fields,
            garbage: None,
        }
    }

    fn decode_field(
        &self,
        data: &mut &[u8],
        number: u64,
        wire_type: u8,
        ctx: &Context,
        depth: usize,
    ) -> Value
    {
        let field = match self.get_field(number) {
            Some(field) => field,
            None => return Value::decode_unknown(data, wire_type),
        };

        // Repeated scalars are accepted both packed and unpacked.
        let vt = &field.field_type;
        match wire_type {
            2 if field.is_repeated() && vt.is_scalar() => Value::decode_packed(data, vt, ctx),
            _ if wire_type == vt.wire_type() => Value::decode(data, vt, ctx, depth),
            _ => Value::decode_unknown(data, wire_type),
        }
    }

    /// Decodes a payload, rejecting it if any part of it is damaged.
    ///
    /// Unknown fields are accepted as long as they are well formed.
    pub fn try_decode(&self, data: &[u8], ctx: &Context) -> Result<MessageValue, DecodeError>
    {
        let value = self.decode(data, ctx);
        value.check()?;
        Ok(value)
    }
}

impl MessageValue
{
    /// Checks that the value and all its nested messages decoded without damage.
    pub fn check(&self) -> Result<(), DecodeError>
    {
        self.check_at(&mut vec![])
    }

    fn check_at(&self, path: &mut Vec<u64>) -> Result<(), DecodeError>
    {
        if let Some(garbage) = &self.garbage {
            return TrailingGarbage {
                path: format_path(path),
                len: garbage.len(),
            }
            .fail();
        }

        for field in &self.fields {
            path.push(field.number);
            match &field.value {
                Value::Incomplete(..) => {
                    return IncompleteValue {
                        path: format_path(path),
                    }
                    .fail()
                }
                Value::Unknown(UnknownValue::Invalid(..)) => {
                    return InvalidWireType {
                        path: format_path(path),
                    }
                    .fail()
                }
                Value::Unknown(UnknownValue::NotUtf8(..)) => {
                    return InvalidUtf8 {
                        path: format_path(path),
                    }
                    .fail()
                }
                Value::Message(inner) => inner.check_at(path)?,
                _ => {}
            }
            path.pop();
        }

        Ok(())
    }

    /// Gets the last value of a field. Protobuf merges repeated occurrences of a singular
    /// field by letting the last one win.
    pub fn get_field(&self, number: u64) -> Option<&Value>
    {
        self.fields
            .iter()
            .rev()
            .find(|f| f.number == number)
            .map(|f| &f.value)
    }
}

fn format_path(path: &[u64]) -> String
{
    path.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod test
{
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn context() -> Context
    {
        Context::parse(&[r#"
            syntax = "proto3";
            message Message {
                string s = 1;
                sint32 signed = 2;
                int32 small = 3;
                Message child = 4;
                repeated uint32 values = 5;
            }
        "#])
        .unwrap()
    }

    #[test]
    fn negative_and_zigzag()
    {
        let ctx = context();
        let msg = ctx.get_message("Message").unwrap();

        let mut payload = BytesMut::new();
        payload.put_u8(2 << 3); // sint32 -1
        payload.put_u8(0x01);
        payload.put_u8(2 << 3); // sint32 1
        payload.put_u8(0x02);
        payload.put_u8(3 << 3); // int32 -1, sign extended to ten bytes
        payload.put_slice(b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01");

        let value = msg.try_decode(&payload, &ctx).unwrap();
        assert_eq!(
            value.fields,
            vec![
                FieldValue {
                    number: 2,
                    value: Value::SInt32(-1),
                },
                FieldValue {
                    number: 2,
                    value: Value::SInt32(1),
                },
                FieldValue {
                    number: 3,
                    value: Value::Int32(-1),
                },
            ]
        );
        assert_eq!(value.get_field(2), Some(&Value::SInt32(1)));
    }

    #[test]
    fn packed_and_unpacked_repeated()
    {
        let ctx = context();
        let msg = ctx.get_message("Message").unwrap();

        let value = msg.decode(b"\x2a\x02\x01\x02\x28\x03", &ctx);
        assert_eq!(
            value.fields,
            vec![
                FieldValue {
                    number: 5,
                    value: Value::Packed(PackedArray::UInt32(vec![1, 2])),
                },
                FieldValue {
                    number: 5,
                    value: Value::UInt32(3),
                },
            ]
        );
    }

    #[test]
    fn truncated_nested_message()
    {
        let ctx = context();
        let msg = ctx.get_message("Message").unwrap();

        // Child holds seven bytes but its string claims ten.
        let payload = b"\x22\x07\x0a\x0ashort";
        let value = msg.decode(payload, &ctx);
        match &value.fields[0].value {
            Value::Message(child) => {
                assert_eq!(
                    child.fields[0].value,
                    Value::Incomplete(Bytes::from_static(b"\x0ashort"))
                );
            }
            other => panic!("Not a message: {:?}", other),
        }

        assert_eq!(
            msg.try_decode(payload, &ctx),
            Err(DecodeError::IncompleteValue {
                path: "4.1".to_string()
            })
        );
    }

    #[test]
    fn garbage_and_invalid_wire_types()
    {
        let ctx = context();
        let msg = ctx.get_message("Message").unwrap();

        // Field number zero.
        let value = msg.decode(b"\x0a\x01a\x00\x01", &ctx);
        assert_eq!(value.garbage, Some(Bytes::from_static(b"\x00\x01")));
        assert_eq!(
            value.check(),
            Err(DecodeError::TrailingGarbage {
                path: String::new(),
                len: 2
            })
        );

        // Wire type 7 does not exist.
        let value = msg.decode(b"\x0f\x01\x02", &ctx);
        assert_eq!(
            value.fields[0].value,
            Value::Unknown(UnknownValue::Invalid(Bytes::from_static(b"\x01\x02")))
        );
        assert_eq!(
            value.check(),
            Err(DecodeError::InvalidWireType {
                path: "1".to_string()
            })
        );
    }

    /// `levels` messages each holding the next in field 4, built without quadratic copying.
    fn nested_children(levels: usize) -> BytesMut
    {
        let mut lengths = vec![0usize];
        for _ in 0..levels {
            let inner = *lengths.last().unwrap();
            let mut prefix = BytesMut::new();
            crate::encode::write_varint(&mut prefix, inner as u64);
            lengths.push(1 + prefix.len() + inner);
        }

        let mut payload = BytesMut::with_capacity(lengths[levels]);
        for len in lengths[..levels].iter().rev() {
            payload.put_u8(4 << 3 | 2);
            crate::encode::write_varint(&mut payload, *len as u64);
        }
        payload
    }

    #[test]
    fn nesting_is_capped()
    {
        let ctx = context();
        let msg = ctx.get_message("Message").unwrap();

        assert!(msg.try_decode(&nested_children(MAX_DEPTH), &ctx).is_ok());

        let path = vec!["4"; MAX_DEPTH + 1].join(".");
        for levels in &[MAX_DEPTH + 1, 200_000] {
            let payload = nested_children(*levels);
            assert_eq!(
                msg.try_decode(&payload, &ctx),
                Err(DecodeError::IncompleteValue { path: path.clone() })
            );
            assert_eq!(msg.decode(&payload, &ctx).encode(), payload.freeze());
        }
    }

    #[test]
    fn strings_must_be_utf8()
    {
        let ctx = context();
        let msg = ctx.get_message("Message").unwrap();

        let payload = b"\x0a\x02\xff\xfe\x18\x01";
        let value = msg.decode(payload, &ctx);
        assert_eq!(
            value.fields[0].value,
            Value::Unknown(UnknownValue::NotUtf8(Bytes::from_static(b"\xff\xfe")))
        );
        assert_eq!(value.get_field(3), Some(&Value::Int32(1)));
        assert_eq!(value.encode(), Bytes::from_static(payload));
        assert_eq!(
            msg.try_decode(payload, &ctx),
            Err(DecodeError::InvalidUtf8 {
                path: "1".to_string()
            })
        );
    }

    #[test]
    fn unknown_fields_are_clean()
    {
        let ctx = context();
        let msg = ctx.get_message("Message").unwrap();

        let value = msg.try_decode(b"\x50\x96\x01", &ctx).unwrap();
        assert_eq!(
            value.fields,
            vec![FieldValue {
                number: 10,
                value: Value::Unknown(UnknownValue::Varint(150)),
            }]
        );
    }
}
