//! Protocol buffer binary payload encoding.
//!
//! Encoding is the inverse of [decoding](crate::decode). Unknown fields and trailing garbage
//! are written back as they were decoded. Incomplete and invalid values keep only the bytes
//! after their tag, so those are written without one.

use crate::decode::*;
use bytes::{BufMut, Bytes, BytesMut};

impl MessageValue
{
    /// Encode the message into protobuf binary format.
    pub fn encode(&self) -> Bytes
    {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    fn encode_into(&self, buf: &mut BytesMut)
    {
        for field in &self.fields {
            field.value.encode_field(field.number, buf);
        }

        if let Some(garbage) = &self.garbage {
            buf.put_slice(garbage);
        }
    }
}

impl Value
{
    fn encode_field(&self, number: u64, buf: &mut BytesMut)
    {
        let tag = |buf: &mut BytesMut, wire_type: u64| write_varint(buf, number << 3 | wire_type);

        match self {
            Value::Double(v) => {
                tag(buf, 1);
                buf.put_f64_le(*v);
            }
            Value::Float(v) => {
                tag(buf, 5);
                buf.put_f32_le(*v);
            }
            Value::Int32(v) => {
                tag(buf, 0);
                write_varint(buf, i64::from(*v) as u64);
            }
            Value::Int64(v) => {
                tag(buf, 0);
                write_varint(buf, *v as u64);
            }
            Value::UInt32(v) => {
                tag(buf, 0);
                write_varint(buf, u64::from(*v));
            }
            Value::UInt64(v) => {
                tag(buf, 0);
                write_varint(buf, *v);
            }
            Value::SInt32(v) => {
                tag(buf, 0);
                write_varint(buf, zigzag(i64::from(*v)));
            }
            Value::SInt64(v) => {
                tag(buf, 0);
                write_varint(buf, zigzag(*v));
            }
            Value::Fixed32(v) => {
                tag(buf, 5);
                buf.put_u32_le(*v);
            }
            Value::Fixed64(v) => {
                tag(buf, 1);
                buf.put_u64_le(*v);
            }
            Value::SFixed32(v) => {
                tag(buf, 5);
                buf.put_i32_le(*v);
            }
            Value::SFixed64(v) => {
                tag(buf, 1);
                buf.put_i64_le(*v);
            }
            Value::Bool(v) => {
                tag(buf, 0);
                write_varint(buf, *v as u64);
            }
            Value::String(v) => {
                tag(buf, 2);
                write_length_delimited(buf, v.as_bytes());
            }
            Value::Bytes(v) => {
                tag(buf, 2);
                write_length_delimited(buf, v);
            }
            Value::Enum(v) => {
                tag(buf, 0);
                write_varint(buf, v.value as u64);
            }
            Value::Message(msg) => {
                tag(buf, 2);
                let mut inner = BytesMut::new();
                msg.encode_into(&mut inner);
                write_length_delimited(buf, &inner);
            }
            Value::Packed(array) => {
                tag(buf, 2);
                let mut inner = BytesMut::new();
                array.encode_into(&mut inner);
                write_length_delimited(buf, &inner);
            }
            Value::Unknown(UnknownValue::Varint(v)) => {
                tag(buf, 0);
                write_varint(buf, *v);
            }
            Value::Unknown(UnknownValue::Fixed64(v)) => {
                tag(buf, 1);
                buf.put_u64_le(*v);
            }
            Value::Unknown(UnknownValue::VariableLength(v))
            | Value::Unknown(UnknownValue::NotUtf8(v)) => {
                tag(buf, 2);
                write_length_delimited(buf, v);
            }
            Value::Unknown(UnknownValue::Fixed32(v)) => {
                tag(buf, 5);
                buf.put_u32_le(*v);
            }

            // The original tag is unknown for these. The bytes are all we have.
            Value::Unknown(UnknownValue::Invalid(v)) | Value::Incomplete(v) => buf.put_slice(v),
        }
    }
}

impl PackedArray
{
    fn encode_into(&self, buf: &mut BytesMut)
    {
        match self {
            PackedArray::Double(v) => v.iter().for_each(|i| buf.put_f64_le(*i)),
            PackedArray::Float(v) => v.iter().for_each(|i| buf.put_f32_le(*i)),
            PackedArray::Int32(v) => v
                .iter()
                .for_each(|i| write_varint(buf, i64::from(*i) as u64)),
            PackedArray::Int64(v) => v.iter().for_each(|i| write_varint(buf, *i as u64)),
            PackedArray::UInt32(v) => v.iter().for_each(|i| write_varint(buf, u64::from(*i))),
            PackedArray::UInt64(v) => v.iter().for_each(|i| write_varint(buf, *i)),
            PackedArray::SInt32(v) => v
                .iter()
                .for_each(|i| write_varint(buf, zigzag(i64::from(*i)))),
            PackedArray::SInt64(v) => v.iter().for_each(|i| write_varint(buf, zigzag(*i))),
            PackedArray::Fixed32(v) => v.iter().for_each(|i| buf.put_u32_le(*i)),
            PackedArray::Fixed64(v) => v.iter().for_each(|i| buf.put_u64_le(*i)),
            PackedArray::SFixed32(v) => v.iter().for_each(|i| buf.put_i32_le(*i)),
            PackedArray::SFixed64(v) => v.iter().for_each(|i| buf.put_i64_le(*i)),
            PackedArray::Bool(v) => v.iter().for_each(|i| write_varint(buf, *i as u64)),
            PackedArray::Enum(_, v) => v.iter().for_each(|i| write_varint(buf, *i as u64)),
        }
    }
}

fn write_length_delimited(buf: &mut BytesMut, data: &[u8])
{
    write_varint(buf, data.len() as u64);
    buf.put_slice(data);
}

pub(crate) fn write_varint(buf: &mut BytesMut, mut value: u64)
{
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

fn zigzag(v: i64) -> u64
{
    ((v << 1) ^ (v >> 63)) as u64
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn varints()
    {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 1);
        write_varint(&mut buf, 300);
        write_varint(&mut buf, u64::MAX);
        assert_eq!(
            &buf[..],
            b"\x01\xac\x02\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01"
        );
    }

    #[test]
    fn zigzag_encoding()
    {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(i64::MIN), u64::MAX);
    }
}
