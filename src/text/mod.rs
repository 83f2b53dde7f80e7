//! Protobuf text format for decoded values.
//!
//! Fields are printed in field number order as `name: value`, nested messages as
//! `name { ... }`. Repeated fields, packed or not, print one entry per element. Fields that are
//! not part of the message type are left out. [`MessageInfo::parse_text`] reads the format
//! back.

use crate::context::*;
use crate::decode::*;

mod parse;

pub use parse::TextError;

impl MessageValue
{
    /// Renders the message in protobuf text format.
    ///
    /// The multi-line form indents nested messages by two spaces and ends every field with a
    /// newline. The single-line form separates fields with single spaces.
    pub fn to_text(&self, ctx: &Context, one_line: bool) -> String
    {
        let mut printer = Printer {
            ctx,
            one_line,
            indent: 0,
            out: String::new(),
        };
        printer.message(self);

        if one_line {
            let len = printer.out.trim_end().len();
            printer.out.truncate(len);
        }
        printer.out
    }
}

struct Printer<'a>
{
    ctx: &'a Context,
    one_line: bool,
    indent: usize,
    out: String,
}

impl<'a> Printer<'a>
{
    fn message(&mut self, msg: &MessageValue)
    {
        let ctx = self.ctx;
        let info = ctx.resolve_message(msg.msg_ref);
        for field in info.iter_fields() {
            let values = msg
                .fields
                .iter()
                .filter(|f| f.number == field.number)
                .map(|f| &f.value)
                .filter(|v| !matches!(v, Value::Unknown(..) | Value::Incomplete(..)));

            match field.is_repeated() {
                true => values.for_each(|v| self.field(&field.name, v)),
                false => {
                    // The last occurrence of a singular field wins.
                    if let Some(v) = values.last() {
                        self.field(&field.name, v);
                    }
                }
            }
        }
    }

    fn field(&mut self, name: &str, value: &Value)
    {
        match value {
            Value::Message(inner) => {
                self.start_line();
                self.out.push_str(name);
                self.out.push_str(" {");
                self.end_line();

                self.indent += 1;
                self.message(inner);
                self.indent -= 1;

                self.start_line();
                self.out.push('}');
                self.end_line();
            }
            Value::Packed(array) => {
                for item in self.packed_items(array) {
                    self.scalar_field(name, &item);
                }
            }
            other => {
                if let Some(text) = self.scalar(other) {
                    self.scalar_field(name, &text);
                }
            }
        }
    }

    fn scalar_field(&mut self, name: &str, text: &str)
    {
        self.start_line();
        self.out.push_str(name);
        self.out.push_str(": ");
        self.out.push_str(text);
        self.end_line();
    }

    fn start_line(&mut self)
    {
        if !self.one_line {
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
        }
    }

    fn end_line(&mut self)
    {
        match self.one_line {
            true => self.out.push(' '),
            false => self.out.push('\n'),
        }
    }

    fn scalar(&self, value: &Value) -> Option<String>
    {
        Some(match value {
            Value::Double(v) => float_text(*v),
            Value::Float(v) => float_text(*v),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::UInt32(v) => v.to_string(),
            Value::UInt64(v) => v.to_string(),
            Value::SInt32(v) => v.to_string(),
            Value::SInt64(v) => v.to_string(),
            Value::Fixed32(v) => v.to_string(),
            Value::Fixed64(v) => v.to_string(),
            Value::SFixed32(v) => v.to_string(),
            Value::SFixed64(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::String(v) => quote_str(v),
            Value::Bytes(v) => quote_bytes(v),
            Value::Enum(v) => self.enum_text(v.enum_ref, v.value),
            Value::Message(..)
            | Value::Packed(..)
            | Value::Incomplete(..)
            | Value::Unknown(..) => return None,
        })
    }

    fn packed_items(&self, array: &PackedArray) -> Vec<String>
    {
        fn all<T: ToString>(v: &[T]) -> Vec<String>
        {
            v.iter().map(|i| i.to_string()).collect()
        }

        match array {
            PackedArray::Double(v) => v.iter().map(|i| float_text(*i)).collect(),
            PackedArray::Float(v) => v.iter().map(|i| float_text(*i)).collect(),
            PackedArray::Int32(v) => all(v),
            PackedArray::Int64(v) => all(v),
            PackedArray::UInt32(v) => all(v),
            PackedArray::UInt64(v) => all(v),
            PackedArray::SInt32(v) => all(v),
            PackedArray::SInt64(v) => all(v),
            PackedArray::Fixed32(v) => all(v),
            PackedArray::Fixed64(v) => all(v),
            PackedArray::SFixed32(v) => all(v),
            PackedArray::SFixed64(v) => all(v),
            PackedArray::Bool(v) => all(v),
            PackedArray::Enum(eref, v) => v.iter().map(|i| self.enum_text(*eref, *i)).collect(),
        }
    }

    fn enum_text(&self, enum_ref: EnumRef, value: i64) -> String
    {
        match self.ctx.resolve_enum(enum_ref).get_field_by_value(value) {
            Some(field) => field.name.clone(),
            None => value.to_string(),
        }
    }
}

fn float_text<T>(v: T) -> String
where
    T: Into<f64> + std::fmt::Display + Copy,
{
    let wide: f64 = v.into();
    if wide.is_nan() {
        "nan".to_string()
    } else if wide.is_infinite() {
        match wide > 0.0 {
            true => "inf".to_string(),
            false => "-inf".to_string(),
        }
    } else if wide.fract() == 0.0 && wide.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

/// Quotes a string. Non-ASCII characters are kept as they are.
fn quote_str(s: &str) -> String
{
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c.is_ascii() {
            true => push_escaped(&mut out, c as u8),
            false => out.push(c),
        }
    }
    out.push('"');
    out
}

fn quote_bytes(data: &[u8]) -> String
{
    let mut out = String::with_capacity(data.len() + 2);
    out.push('"');
    for b in data {
        push_escaped(&mut out, *b);
    }
    out.push('"');
    out
}

fn push_escaped(out: &mut String, b: u8)
{
    match b {
        b'\n' => out.push_str("\\n"),
        b'\r' => out.push_str("\\r"),
        b'\t' => out.push_str("\\t"),
        b'"' => out.push_str("\\\""),
        b'\'' => out.push_str("\\'"),
        b'\\' => out.push_str("\\\\"),
        0x20..=0x7e => out.push(b as char),
        _ => out.push_str(&format!("\\{:03o}", b)),
    }
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
            enum Color { RED = 0; GREEN = 1; }
            message Inner { int32 x = 1; }
            message Outer {
                string name = 1;
                Color color = 2;
                Inner inner = 3;
                repeated int32 values = 4;
                bytes blob = 5;
                double ratio = 6;
            }
        "#])
        .unwrap()
    }

    fn payload() -> BytesMut
    {
        let mut payload = BytesMut::new();
        payload.put_slice(b"\x10\x01"); // color, before name on the wire
        payload.put_slice(b"\x0a\x04a\"b\n");
        payload.put_slice(b"\x1a\x02\x08\x07");
        payload.put_slice(b"\x22\x02\x01\x02");
        payload.put_slice(b"\x2a\x02\x00\xff");
        payload.put_u8(0x31);
        payload.put_f64_le(1.5);
        payload.put_slice(b"\x48\x01"); // unknown field 9
        payload
    }

    #[test]
    fn multi_line()
    {
        let ctx = context();
        let value = ctx
            .get_message("Outer")
            .unwrap()
            .try_decode(&payload(), &ctx)
            .unwrap();

        assert_eq!(
            value.to_text(&ctx, false),
            concat!(
                "name: \"a\\\"b\\n\"\n",
                "color: GREEN\n",
                "inner {\n",
                "  x: 7\n",
                "}\n",
                "values: 1\n",
                "values: 2\n",
                "blob: \"\\000\\377\"\n",
                "ratio: 1.5\n",
            )
        );
    }

    #[test]
    fn one_line()
    {
        let ctx = context();
        let value = ctx.get_message("Outer").unwrap().decode(&payload(), &ctx);

        assert_eq!(
            value.to_text(&ctx, true),
            r#"name: "a\"b\n" color: GREEN inner { x: 7 } values: 1 values: 2 blob: "\000\377" ratio: 1.5"#
        );
    }

    #[test]
    fn unknown_enum_values_and_utf8()
    {
        let ctx = context();
        let mut payload = BytesMut::new();
        payload.put_slice(b"\x10\x05");
        payload.put_slice(b"\x0a\x06");
        payload.put_slice("ピカ".as_bytes());
        payload.put_u8(0x31);
        payload.put_f64_le(2.0);
        payload.put_slice(b"\x1a\x00");

        let value = ctx.get_message("Outer").unwrap().decode(&payload, &ctx);
        assert_eq!(
            value.to_text(&ctx, true),
            r#"name: "ピカ" color: 5 inner { } ratio: 2.0"#
        );
    }
}
