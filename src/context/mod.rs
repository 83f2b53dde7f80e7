//! Message and enum types read from `.proto` files.
//!
//! The context owns every type declared in the files. Types refer to each other through
//! [`MessageRef`] and [`EnumRef`], which stay valid for the lifetime of the context that
//! handed them out.

use snafu::Snafu;
use std::collections::{BTreeMap, HashMap};

mod api;
mod builder;
mod parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TypeIndex(usize);

/// Handle to a message type, resolved with [`Context::resolve_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef(TypeIndex);

/// Handle to an enum type, resolved with [`Context::resolve_enum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumRef(TypeIndex);

/// Error reading `.proto` files into a context.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ParseError
{
    /// The file does not follow the `.proto` grammar.
    #[snafu(display("Syntax error: {}", source))]
    SyntaxError
    {
        /// Grammar error with the position of the offending token.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Two declarations share a full name.
    #[snafu(display("Type '{}' is declared more than once", name))]
    DuplicateType
    {
        /// Full name of the type.
        name: String,
    },

    /// A field names a type that is declared nowhere.
    #[snafu(display("Field type '{}' used in '{}' does not exist", name, context))]
    TypeNotFound
    {
        /// The type name as written on the field.
        name: String,

        /// Full name of the message holding the field.
        context: String,
    },

    /// A numeric literal that does not fit its target type.
    #[snafu(display("Invalid literal '{}'", literal))]
    InvalidLiteral
    {
        /// The literal as written in the file.
        literal: String,
    },
}

/// Whether a declaration is a message or an enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind
{
    /// `message`
    Message,

    /// `enum`
    Enum,
}

/// All types declared in a set of `.proto` files.
///
/// Built once with [`Context::parse`] and read-only afterwards.
#[derive(Default, Debug, PartialEq)]
pub struct Context
{
    types: Vec<TypeInfo>,
    by_full_name: HashMap<String, usize>,
}

/// A declared type.
#[derive(Debug, PartialEq)]
pub enum TypeInfo
{
    /// A message declaration.
    Message(MessageInfo),

    /// An enum declaration.
    Enum(EnumInfo),
}

/// A message declaration.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct MessageInfo
{
    /// Name as declared, e.g. `GetInboxProto`.
    pub name: String,

    /// Name qualified with the package and enclosing messages, e.g. `Game.Rpc.GetInboxProto`.
    pub full_name: String,

    /// Handle of this message.
    pub self_ref: MessageRef,

    /// `oneof` group names in declaration order. [`MessageField::oneof`] indexes this list.
    pub oneofs: Vec<String>,

    fields: BTreeMap<u64, MessageField>,
    field_numbers: BTreeMap<String, u64>,
}

/// An enum declaration.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub struct EnumInfo
{
    /// Name as declared.
    pub name: String,

    /// Name qualified with the package and enclosing messages.
    pub full_name: String,

    /// Handle of this enum.
    pub self_ref: EnumRef,

    // The first name declared for a value wins over its aliases.
    values: BTreeMap<i64, EnumField>,
    values_by_name: BTreeMap<String, i64>,
}

/// A field of a message.
#[derive(Debug, PartialEq, Clone)]
#[non_exhaustive]
pub struct MessageField
{
    /// Field name.
    pub name: String,

    /// Field number, used as the tag on the wire.
    pub number: u64,

    /// Declared type.
    pub field_type: ValueType,

    /// How many values the field holds and how repeated values are laid out.
    pub multiplicity: Multiplicity,

    /// Options declared in brackets after the field number.
    pub options: Vec<ProtoOption>,

    /// Position of the field's `oneof` group in [`MessageInfo::oneofs`].
    pub oneof: Option<usize>,
}

/// Field cardinality.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Multiplicity
{
    /// Plain field without a label.
    Single,

    /// Field labelled `optional`.
    Optional,

    /// `repeated` field with one tag per value.
    Repeated,

    /// `repeated` scalar field with all values in one length-delimited record.
    RepeatedPacked,
}

/// A named enum value.
#[derive(Debug, PartialEq, Clone)]
pub struct EnumField
{
    /// Value name, e.g. `REQUEST_TYPE_GET_INBOX`.
    pub name: String,

    /// Numeric value.
    pub value: i64,
}

/// Type of a message field.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueType
{
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `sint32`, zigzag encoded.
    SInt32,
    /// `sint64`, zigzag encoded.
    SInt64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    SFixed32,
    /// `sfixed64`
    SFixed64,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,

    /// A field holding another message.
    Message(MessageRef),

    /// A field holding an enum value.
    Enum(EnumRef),
}

/// `name = value` option attached to a field or enum value.
#[derive(Debug, PartialEq, Clone)]
pub struct ProtoOption
{
    /// Option name. Custom options keep their parentheses, e.g. `(my.opt).x`.
    pub name: String,

    /// Option value.
    pub value: Constant,
}

/// Option value.
#[derive(Debug, PartialEq, Clone)]
pub enum Constant
{
    /// Identifier such as an enum value name.
    Ident(String),

    /// Integer literal.
    Integer(i64),

    /// Float literal, including `inf` and `nan`.
    Float(f64),

    /// String literal with its escapes left as written.
    String(String),

    /// `true` or `false`.
    Bool(bool),

    /// Text-format aggregate `{ ... }` as written.
    Aggregate(String),
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn nested_names()
    {
        let ctx = Context::parse(&[r#"
            syntax = "proto3";
            package Outer;
            message Message {
                message Inner { Kind kind = 1; }
                enum Kind { NONE = 0; SOME = 1; }
                Inner inner = 1;
            }
        "#])
        .unwrap();

        let m = ctx.get_message("Outer.Message").unwrap();
        let inner = ctx.get_message("Outer.Message.Inner").unwrap();
        assert_eq!(inner.name, "Inner");
        assert_eq!(
            m.get_field(1).unwrap().field_type,
            ValueType::Message(inner.self_ref)
        );

        let kind = ctx.get_type("Outer.Message.Kind").unwrap();
        assert_eq!(kind.kind(), TypeKind::Enum);
        let kind = match kind {
            TypeInfo::Enum(e) => e.self_ref,
            other => panic!("Not an enum: {:?}", other),
        };
        assert_eq!(inner.get_field(1).unwrap().field_type, ValueType::Enum(kind));
    }

    #[test]
    fn find_by_suffix()
    {
        let ctx = Context::parse(&[
            r#"
                syntax = "proto3";
                package First;
                message Message {}
                message Unique {}
            "#,
            r#"
                syntax = "proto3";
                package Second;
                message Message {}
            "#,
        ])
        .unwrap();

        assert_eq!(ctx.find_message("Unique").unwrap().full_name, "First.Unique");
        assert_eq!(
            ctx.find_message("Second.Message").unwrap().full_name,
            "Second.Message"
        );

        // Ambiguous suffixes resolve to nothing.
        assert!(ctx.find_message("Message").is_none());
        assert_eq!(ctx.iter_types().count(), 3);
    }
}
