use pest::{
    iterators::{Pair, Pairs},
    Parser,
};
use snafu::ResultExt;

use super::builder::*;
use super::*;

#[derive(pest_derive::Parser)]
#[grammar = "proto.pest"]
struct ProtoParser;

impl Context
{
    /// Reads the `.proto` sources into a context. Types may refer to types declared in any of
    /// the sources.
    pub fn parse<T, S>(files: T) -> Result<Self, ParseError>
    where
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let builder = ContextBuilder {
            packages: files
                .into_iter()
                .map(|f| PackageBuilder::parse_str(f.as_ref()))
                .collect::<Result<_, _>>()?,
        };

        builder.build()
    }
}

impl PackageBuilder
{
    pub fn parse_str(input: &str) -> Result<Self, ParseError>
    {
        let pairs = ProtoParser::parse(Rule::proto, input)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            .context(SyntaxError {})?;

        let mut package = PackageBuilder::default();
        for item in pairs.flat_map(|p| p.into_inner()) {
            match item.as_rule() {
                Rule::syntax | Rule::edition => {
                    let version = item.into_inner().next().unwrap();
                    package.syntax = match string_content(version).as_str() {
                        "proto2" => Syntax::Proto2,
                        _ => Syntax::Proto3,
                    };
                }
                Rule::topLevelDef => {
                    if let Some(ty) = TypeBuilder::parse_top_level(item)? {
                        package.types.push(ty);
                    }
                }
                Rule::package => package.name = Some(next_text(&mut item.into_inner())),
                Rule::import | Rule::option | Rule::emptyStatement | Rule::EOI => {}
                r => unreachable!("{:?}: {:?}", r, item),
            }
        }

        Ok(package)
    }
}

impl TypeBuilder
{
    /// Parses a top level definition. Services and extensions carry no types and are skipped.
    fn parse_top_level(p: Pair<Rule>) -> Result<Option<Self>, ParseError>
    {
        let pair = p.into_inner().next().unwrap();
        Ok(match pair.as_rule() {
            Rule::message => Some(TypeBuilder::Message(MessageBuilder::parse(pair)?)),
            Rule::enum_ => Some(TypeBuilder::Enum(EnumBuilder::parse(pair)?)),
            Rule::service | Rule::extend => None,
            r => unreachable!("{:?}: {:?}", r, pair),
        })
    }
}

impl MessageBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner();
        let name = next_text(&mut inner);

        let mut message = MessageBuilder {
            name,
            ..Default::default()
        };
        let body = inner.next().unwrap();
        for p in body.into_inner() {
            match p.as_rule() {
                Rule::field => message.fields.push(FieldBuilder::parse(p)?),
                Rule::enum_ => message
                    .inner_types
                    .push(TypeBuilder::Enum(EnumBuilder::parse(p)?)),
                Rule::message => message
                    .inner_types
                    .push(TypeBuilder::Message(MessageBuilder::parse(p)?)),
                Rule::oneof => message.parse_oneof(p)?,
                Rule::mapField => message.parse_map_field(p)?,

                // Neither affects how payloads decode.
                Rule::option | Rule::reserved | Rule::extensions | Rule::extend => {}
                Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(message)
    }

    fn parse_oneof(&mut self, p: Pair<Rule>) -> Result<(), ParseError>
    {
        let oneof_idx = self.oneofs.len();
        let mut inner = p.into_inner();
        self.oneofs
            .push(next_text(&mut inner));

        for p in inner {
            match p.as_rule() {
                Rule::oneofField => {
                    let mut field = FieldBuilder::parse_oneof(p)?;
                    field.oneof = Some(oneof_idx);
                    self.fields.push(field);
                }
                Rule::option | Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(())
    }

    /// Map fields are encoded as a repeated `<Name>Entry` message with `key = 1` and
    /// `value = 2`, so that is what gets declared here.
    fn parse_map_field(&mut self, p: Pair<Rule>) -> Result<(), ParseError>
    {
        let mut inner = p.into_inner();
        let key_type = parse_field_type(&next_text(&mut inner));
        let value_type = parse_field_type(&next_text(&mut inner));
        let name = next_text(&mut inner);
        let number = parse_uint_literal(inner.next().unwrap())?;
        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        let entry_name = format!("{}Entry", camel_case(&name));
        self.inner_types.push(TypeBuilder::Message(MessageBuilder {
            name: entry_name.clone(),
            fields: vec![
                FieldBuilder::single("key", 1, key_type),
                FieldBuilder::single("value", 2, value_type),
            ],
            ..Default::default()
        }));
        self.fields.push(FieldBuilder {
            multiplicity: Multiplicity::Repeated,
            field_type: FieldTypeBuilder::Unknown(entry_name),
            name,
            number,
            options,
            oneof: None,
        });

        Ok(())
    }
}

impl EnumBuilder
{
    fn parse(p: Pair<Rule>) -> Result<EnumBuilder, ParseError>
    {
        let mut inner = p.into_inner();
        let name = next_text(&mut inner);

        let mut fields = vec![];
        let body = inner.next().unwrap();
        for p in body.into_inner() {
            match p.as_rule() {
                Rule::enumField => {
                    let mut inner = p.into_inner();
                    fields.push(EnumField {
                        name: next_text(&mut inner),
                        value: parse_int_literal(inner.next().unwrap())?,
                    })
                }
                Rule::option | Rule::reserved | Rule::emptyStatement => {}
                r => unreachable!("{:?}: {:?}", r, p),
            }
        }

        Ok(EnumBuilder { name, fields })
    }
}

impl FieldBuilder
{
    pub fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner().peekable();
        let multiplicity = match inner.peek().map(|p| p.as_rule()) {
            Some(Rule::label) => match inner.next().unwrap().as_str() {
                "repeated" => Multiplicity::Repeated,
                "optional" => Multiplicity::Optional,
                _ => Multiplicity::Single,
            },
            _ => Multiplicity::Single,
        };

        let mut field = Self::parse_rest(inner)?;
        field.multiplicity = multiplicity;
        Ok(field)
    }

    pub fn parse_oneof(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        Self::parse_rest(p.into_inner())
    }

    fn parse_rest<'a>(mut inner: impl Iterator<Item = Pair<'a, Rule>>) -> Result<Self, ParseError>
    {
        let field_type = parse_field_type(&next_text(&mut inner));
        let name = next_text(&mut inner);
        let number = parse_uint_literal(inner.next().unwrap())?;

        let options = match inner.next() {
            Some(p) => ProtoOption::parse_options(p.into_inner())?,
            None => vec![],
        };

        Ok(FieldBuilder {
            multiplicity: Multiplicity::Single,
            field_type,
            name,
            number,
            options,
            oneof: None,
        })
    }

    fn single(name: &str, number: u64, field_type: FieldTypeBuilder) -> Self
    {
        FieldBuilder {
            multiplicity: Multiplicity::Single,
            field_type,
            name: name.to_string(),
            number,
            options: vec![],
            oneof: None,
        }
    }
}

/// Text of the next pair. The grammar guarantees that the pair exists.
fn next_text<'a>(pairs: &mut impl Iterator<Item = Pair<'a, Rule>>) -> String
{
    pairs.next().unwrap().as_str().to_string()
}

fn parse_field_type(t: &str) -> FieldTypeBuilder
{
    FieldTypeBuilder::Builtin(match t {
        "double" => ValueType::Double,
        "float" => ValueType::Float,
        "int32" => ValueType::Int32,
        "int64" => ValueType::Int64,
        "uint32" => ValueType::UInt32,
        "uint64" => ValueType::UInt64,
        "sint32" => ValueType::SInt32,
        "sint64" => ValueType::SInt64,
        "fixed32" => ValueType::Fixed32,
        "fixed64" => ValueType::Fixed64,
        "sfixed32" => ValueType::SFixed32,
        "sfixed64" => ValueType::SFixed64,
        "bool" => ValueType::Bool,
        "string" => ValueType::String,
        "bytes" => ValueType::Bytes,
        _ => return FieldTypeBuilder::Unknown(t.to_string()),
    })
}

/// `friend_codes` becomes `FriendCodes`, as protoc names map entry types.
fn camel_case(name: &str) -> String
{
    name.split('_')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn parse_uint_literal(p: Pair<Rule>) -> Result<u64, ParseError>
{
    let literal = p.as_str().to_string();
    let value = parse_int_literal(p)?;
    if value < 0 {
        return Err(ParseError::InvalidLiteral { literal });
    }
    Ok(value as u64)
}

fn parse_int_literal(p: Pair<Rule>) -> Result<i64, ParseError>
{
    let literal = p.as_str().to_string();
    let mut sign = 1;
    let mut value = None;
    for part in p.into_inner() {
        let parsed = match part.as_rule() {
            Rule::sign => {
                if part.as_str() == "-" {
                    sign = -1;
                }
                continue;
            }
            Rule::decimalLit => part.as_str().parse::<i64>().ok(),
            Rule::octalLit => i64::from_str_radix(part.as_str(), 8).ok(),
            Rule::hexLit => i64::from_str_radix(&part.as_str()[2..], 16).ok(),
            r => unreachable!("{:?}: {:?}", r, part),
        };
        value = parsed;
    }

    match value {
        Some(v) => Ok(sign * v),
        None => Err(ParseError::InvalidLiteral { literal }),
    }
}

impl ProtoOption
{
    fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let mut inner = p.into_inner();
        Ok(Self {
            name: next_text(&mut inner),
            value: Constant::parse(inner.next().unwrap())?,
        })
    }

    fn parse_options(pairs: Pairs<Rule>) -> Result<Vec<Self>, ParseError>
    {
        pairs
            .map(|p| match p.as_rule() {
                Rule::fieldOption => Self::parse(p),
                r => unreachable!("{:?}: {:?}", r, p),
            })
            .collect()
    }
}

impl Constant
{
    fn parse(p: Pair<Rule>) -> Result<Self, ParseError>
    {
        let p = p.into_inner().next().unwrap();
        Ok(match p.as_rule() {
            Rule::fullIdent => Constant::Ident(p.as_str().to_string()),
            Rule::intLit => Constant::Integer(parse_int_literal(p)?),
            Rule::floatLit => Constant::Float(parse_float_literal(p.as_str())),
            Rule::strLit => Constant::String(string_content(p)),
            Rule::boolLit => Constant::Bool(p.as_str() == "true"),
            Rule::aggregate => Constant::Aggregate(p.as_str().to_string()),
            r => unreachable!("{:?}: {:?}", r, p),
        })
    }
}

fn parse_float_literal(s: &str) -> f64
{
    let (sign, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.trim_start_matches('+')),
    };
    let value = match magnitude {
        "inf" => f64::INFINITY,
        "nan" => f64::NAN,
        _ => magnitude.parse::<f64>().unwrap_or(f64::NAN),
    };
    sign * value
}

fn string_content(p: Pair<Rule>) -> String
{
    p.into_inner()
        .next()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default()
}
