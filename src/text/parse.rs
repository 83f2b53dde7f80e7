use bytes::Bytes;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::context::*;
use crate::decode::*;

#[derive(pest_derive::Parser)]
#[grammar = "text.pest"]
struct TextParser;

/// Error reading a message from protobuf text format.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum TextError
{
    /// The text is not in text format.
    #[snafu(display("Syntax error: {}", source))]
    Syntax
    {
        /// Grammar error with the position of the offending token.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The message type has no field of the name.
    #[snafu(display("Message '{}' has no field '{}'", message, field))]
    UnknownField
    {
        /// Full name of the message type.
        message: String,

        /// Field name as written.
        field: String,
    },

    /// The value does not fit the type of the field.
    #[snafu(display("Invalid value '{}' for field '{}'", value, field))]
    InvalidValue
    {
        /// Field name.
        field: String,

        /// Value as written.
        value: String,
    },
}

impl MessageInfo
{
    /// Reads a message of this type from protobuf text format, single or multi-line.
    ///
    /// Consecutive values of a packed field are collected into one [`Value::Packed`], so a
    /// rendered value reads back to the value it was rendered from as long as its fields
    /// were in field number order and it held no unknown or damaged fields.
    pub fn parse_text(&self, text: &str, ctx: &Context) -> Result<MessageValue, TextError>
    {
        let root = TextParser::parse(Rule::text, text)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            .context(Syntax)?
            .next()
            .unwrap();

        self.fields_from_text(root.into_inner(), ctx)
    }

    fn fields_from_text(
        &self,
        pairs: Pairs<Rule>,
        ctx: &Context,
    ) -> Result<MessageValue, TextError>
    {
        let mut fields = vec![];
        for pair in pairs.filter(|p| p.as_rule() == Rule::field) {
            let mut inner = pair.into_inner();
            let name = inner.next().unwrap().as_str();
            let field = self.get_field_by_name(name).context(UnknownField {
                message: self.full_name.as_str(),
                field: name,
            })?;

            let value = value_from_text(field, inner.next().unwrap(), ctx)?;
            fields.push(FieldValue {
                number: field.number,
                value,
            });
        }

        Ok(MessageValue {
            msg_ref: self.self_ref,
            fields: self.pack(fields),
            garbage: None,
        })
    }

    fn pack(&self, fields: Vec<FieldValue>) -> Vec<FieldValue>
    {
        let mut packed = Vec::with_capacity(fields.len());
        let mut run = vec![];
        let mut fields = fields.into_iter().peekable();
        while let Some(fv) = fields.next() {
            let field = match self.get_field(fv.number) {
                Some(f) if f.multiplicity == Multiplicity::RepeatedPacked => f,
                _ => {
                    packed.push(fv);
                    continue;
                }
            };

            run.push(fv.value);
            if fields.peek().map(|next| next.number) == Some(field.number) {
                continue;
            }

            let values = std::mem::take(&mut run);
            if let Some(array) = PackedArray::from_values(&field.field_type, values) {
                packed.push(FieldValue {
                    number: field.number,
                    value: Value::Packed(array),
                });
            }
        }

        packed
    }
}

fn value_from_text(
    field: &MessageField,
    pair: Pair<Rule>,
    ctx: &Context,
) -> Result<Value, TextError>
{
    let text = pair.as_str();
    let value = match (pair.as_rule(), &field.field_type) {
        (Rule::message, ValueType::Message(msg_ref)) => {
            let inner = ctx
                .resolve_message(*msg_ref)
                .fields_from_text(pair.into_inner(), ctx)?;
            Some(Value::Message(Box::new(inner)))
        }
        (Rule::number, vt) => number_value(text, vt),
        (Rule::string, ValueType::String) => {
            String::from_utf8(unescape(string_body(pair))).ok().map(Value::String)
        }
        (Rule::string, ValueType::Bytes) => {
            Some(Value::Bytes(Bytes::from(unescape(string_body(pair)))))
        }
        (Rule::ident, ValueType::Bool) => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (Rule::ident, ValueType::Enum(enum_ref)) => ctx
            .resolve_enum(*enum_ref)
            .get_field_by_name(text)
            .map(|f| {
                Value::Enum(EnumValue {
                    enum_ref: *enum_ref,
                    value: f.value,
                })
            }),
        _ => None,
    };

    value.context(InvalidValue {
        field: field.name.as_str(),
        value: text,
    })
}

fn number_value(text: &str, vt: &ValueType) -> Option<Value>
{
    Some(match vt {
        ValueType::Double => Value::Double(text.parse().ok()?),
        ValueType::Float => Value::Float(text.parse().ok()?),
        ValueType::Int32 => Value::Int32(text.parse().ok()?),
        ValueType::Int64 => Value::Int64(text.parse().ok()?),
        ValueType::UInt32 => Value::UInt32(text.parse().ok()?),
        ValueType::UInt64 => Value::UInt64(text.parse().ok()?),
        ValueType::SInt32 => Value::SInt32(text.parse().ok()?),
        ValueType::SInt64 => Value::SInt64(text.parse().ok()?),
        ValueType::Fixed32 => Value::Fixed32(text.parse().ok()?),
        ValueType::Fixed64 => Value::Fixed64(text.parse().ok()?),
        ValueType::SFixed32 => Value::SFixed32(text.parse().ok()?),
        ValueType::SFixed64 => Value::SFixed64(text.parse().ok()?),
        ValueType::Enum(enum_ref) => Value::Enum(EnumValue {
            enum_ref: *enum_ref,
            value: text.parse().ok()?,
        }),
        ValueType::Bool | ValueType::String | ValueType::Bytes | ValueType::Message(..) => {
            return None
        }
    })
}

fn string_body<'i>(p: Pair<'i, Rule>) -> &'i str
{
    p.into_inner().next().map(|c| c.as_str()).unwrap_or_default()
}

/// Resolves the escapes written by the renderer: `\n`, `\r`, `\t`, octal `\ooo`, hex `\xhh`
/// and backslash-quoted characters.
fn unescape(s: &str) -> Vec<u8>
{
    let mut out = Vec::with_capacity(s.len());
    let mut bytes = s.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }

        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(first @ b'0'..=b'7') => {
                let mut value = u32::from(first - b'0');
                for _ in 0..2 {
                    match bytes.peek().copied() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            Some(b'x') => {
                let mut value = 0;
                for _ in 0..2 {
                    match bytes.peek().and_then(|d| (*d as char).to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            bytes.next();
                        }
                        None => break,
                    }
                }
                out.push(value as u8);
            }
            Some(other) => out.push(other),
            None => out.push(b'\\'),
        }
    }
    out
}
