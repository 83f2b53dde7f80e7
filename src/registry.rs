//! Schema registry mapping method identifiers to message types.

use bytes::Bytes;
use snafu::{OptionExt, Snafu};
use std::collections::{BTreeMap, HashMap};

use crate::config::{Config, RegistryConfig, ResolverConfig};
use crate::context::*;
use crate::decode::{DecodeError, MessageValue};
use crate::message::Direction;
use crate::text::TextError;

/// Numeric method identifier.
pub type MethodId = i64;

/// Error building a registry from a context.
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum RegistryError
{
    /// A configured type does not exist in the context.
    #[snafu(display("Type '{}' not found", name))]
    MissingType
    {
        /// Configured type name.
        name: String,
    },

    /// A configured container type is an enum.
    #[snafu(display("Type '{}' is not a message", name))]
    NotAMessage
    {
        /// Configured type name.
        name: String,
    },

    /// The configured method type is a message.
    #[snafu(display("Type '{}' is not an enum", name))]
    NotAnEnum
    {
        /// Configured type name.
        name: String,
    },

    /// A container field does not have a message type.
    #[snafu(display("Field '{}' of '{}' is not a message", field, message))]
    FieldNotMessage
    {
        /// Container message.
        message: String,

        /// Field name.
        field: String,
    },

    /// The proxy schema lacks a field needed to unwrap the envelope.
    #[snafu(display("Proxy schema '{}' has no usable field '{}'", message, field))]
    MissingProxyField
    {
        /// Proxy message type.
        message: String,

        /// Field name.
        field: String,
    },
}

/// Read-only mapping of method identifiers to request and response schemas and method names.
#[derive(Debug)]
pub struct Registry
{
    context: Context,
    requests: BTreeMap<MethodId, MessageRef>,
    responses: BTreeMap<MethodId, MessageRef>,
    methods: BTreeMap<MethodId, String>,
    ids_by_name: HashMap<String, MethodId>,
}

/// A message type known to the registry.
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a>
{
    /// Message type.
    pub info: &'a MessageInfo,

    ctx: &'a Context,
}

impl Registry
{
    /// Builds the registry from the container messages and the method enum named in the
    /// config.
    pub fn new(context: Context, config: &Config) -> Result<Self, RegistryError>
    {
        let RegistryConfig {
            requests_message,
            responses_message,
            methods_enum,
            method_prefix,
        } = &config.registry;

        let requests = container_fields(&context, requests_message)?;
        let responses = container_fields(&context, responses_message)?;

        let methods = match find(&context, methods_enum)? {
            TypeInfo::Enum(e) => e
                .iter_fields()
                .map(|f| {
                    let name = f.name.strip_prefix(method_prefix.as_str()).unwrap_or(&f.name);
                    (f.value, name.to_string())
                })
                .collect(),
            TypeInfo::Message(..) => {
                return NotAnEnum {
                    name: methods_enum.as_str(),
                }
                .fail()
            }
        };

        // Later fields win when two request fields share a message type.
        let ids_by_name = requests
            .iter()
            .map(|(id, mref)| (context.resolve_message(*mref).name.clone(), *id))
            .collect();

        let registry = Registry {
            context,
            requests,
            responses,
            methods,
            ids_by_name,
        };
        registry.validate_proxy(&config.resolver)?;
        Ok(registry)
    }

    fn validate_proxy(&self, config: &ResolverConfig) -> Result<(), RegistryError>
    {
        if let Some(request) = self.request_schema(config.proxy_method) {
            require_field(request.info, &config.proxy_action_field, is_integer)?;
            require_field(request.info, &config.proxy_payload_field, is_payload)?;
        }
        if let Some(response) = self.response_schema(config.proxy_method) {
            require_field(response.info, &config.proxy_payload_field, is_payload)?;
        }
        Ok(())
    }

    /// The context the schemas belong to.
    pub fn context(&self) -> &Context
    {
        &self.context
    }

    /// Request schema for a method.
    pub fn request_schema(&self, id: MethodId) -> Option<Schema>
    {
        self.requests.get(&id).map(|mref| self.schema_for(*mref))
    }

    /// Response schema for a method.
    pub fn response_schema(&self, id: MethodId) -> Option<Schema>
    {
        self.responses.get(&id).map(|mref| self.schema_for(*mref))
    }

    /// Schema for a method in the given direction.
    pub fn schema(&self, direction: Direction, id: MethodId) -> Option<Schema>
    {
        match direction {
            Direction::Request => self.request_schema(id),
            Direction::Response => self.response_schema(id),
        }
    }

    /// True if either direction has a schema for the method.
    pub fn has_schema(&self, id: MethodId) -> bool
    {
        self.requests.contains_key(&id) || self.responses.contains_key(&id)
    }

    /// Method name with the configured prefix removed.
    pub fn method_name(&self, id: MethodId) -> Option<&str>
    {
        self.methods.get(&id).map(String::as_str)
    }

    /// Method identifier of a request message type, by its short name.
    pub fn id_by_name(&self, message_name: &str) -> Option<MethodId>
    {
        self.ids_by_name.get(message_name).copied()
    }

    fn schema_for(&self, mref: MessageRef) -> Schema
    {
        Schema {
            info: self.context.resolve_message(mref),
            ctx: &self.context,
        }
    }
}

impl<'a> Schema<'a>
{
    /// Short name of the message type.
    pub fn name(&self) -> &'a str
    {
        &self.info.name
    }

    /// Decodes a payload leniently.
    pub fn decode(&self, data: &[u8]) -> MessageValue
    {
        self.info.decode(data, self.ctx)
    }

    /// Decodes a payload, rejecting anything that does not decode cleanly.
    pub fn try_decode(&self, data: &[u8]) -> Result<MessageValue, DecodeError>
    {
        self.info.try_decode(data, self.ctx)
    }

    /// Encodes a value of this type.
    pub fn encode(&self, value: &MessageValue) -> Bytes
    {
        value.encode()
    }

    /// Reads a value of this type from protobuf text format.
    pub fn parse_text(&self, text: &str) -> Result<MessageValue, TextError>
    {
        self.info.parse_text(text, self.ctx)
    }
}

fn find<'a>(context: &'a Context, name: &str) -> Result<&'a TypeInfo, RegistryError>
{
    context.find_type(name).context(MissingType { name })
}

fn container_fields(
    context: &Context,
    name: &str,
) -> Result<BTreeMap<MethodId, MessageRef>, RegistryError>
{
    let container = match find(context, name)? {
        TypeInfo::Message(m) => m,
        TypeInfo::Enum(..) => return NotAMessage { name }.fail(),
    };

    container
        .iter_fields()
        .map(|f| match f.field_type {
            ValueType::Message(mref) => Ok((f.number as MethodId, mref)),
            _ => FieldNotMessage {
                message: container.full_name.as_str(),
                field: f.name.as_str(),
            }
            .fail(),
        })
        .collect()
}

fn require_field(
    info: &MessageInfo,
    name: &str,
    accept: fn(&ValueType) -> bool,
) -> Result<(), RegistryError>
{
    match info.get_field_by_name(name) {
        Some(field) if accept(&field.field_type) && !field.is_repeated() => Ok(()),
        _ => MissingProxyField {
            message: info.full_name.as_str(),
            field: name,
        }
        .fail(),
    }
}

fn is_integer(vt: &ValueType) -> bool
{
    match vt {
        ValueType::Int32
        | ValueType::Int64
        | ValueType::UInt32
        | ValueType::UInt64
        | ValueType::SInt32
        | ValueType::SInt64
        | ValueType::Fixed32
        | ValueType::Fixed64
        | ValueType::SFixed32
        | ValueType::SFixed64
        | ValueType::Enum(..) => true,
        _ => false,
    }
}

fn is_payload(vt: &ValueType) -> bool
{
    match vt {
        ValueType::String | ValueType::Bytes => true,
        _ => false,
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    const SCHEMA: &str = r#"
        syntax = "proto3";
        package Game;

        message GetInboxProto { string id = 1; }
        message GetInboxOutProto { int32 count = 1; }
        message ProxyRequestProto { uint32 action = 1; bytes payload = 2; }
        message ProxyResponseProto { int32 status = 1; bytes payload = 3; }

        message AllTypesAndMessagesResponsesProto {
            message AllMessagesProto {
                GetInboxProto get_inbox = 42;
                ProxyRequestProto proxy = 5012;
            }
            message AllResponsesProto {
                GetInboxOutProto get_inbox = 42;
                ProxyResponseProto proxy = 5012;
            }
            enum AllResquestTypesProto {
                REQUEST_TYPE_UNSET = 0;
                REQUEST_TYPE_SOCIAL_ACTION_GET_INBOX = 42;
                REQUEST_TYPE_CLIENT_ACTION_PROXY_SOCIAL_ACTION = 5012;
                UNPREFIXED = 7;
            }
        }
    "#;

    fn registry(schema: &str) -> Result<Registry, RegistryError>
    {
        Registry::new(Context::parse(&[schema]).unwrap(), &Config::default())
    }

    #[test]
    fn lookups()
    {
        let registry = registry(SCHEMA).unwrap();

        assert_eq!(registry.request_schema(42).unwrap().name(), "GetInboxProto");
        assert_eq!(
            registry.response_schema(42).unwrap().name(),
            "GetInboxOutProto"
        );
        assert_eq!(
            registry.schema(Direction::Response, 5012).unwrap().name(),
            "ProxyResponseProto"
        );
        assert!(registry.request_schema(7).is_none());
        assert!(registry.has_schema(42));
        assert!(!registry.has_schema(7));

        assert_eq!(registry.method_name(42), Some("SOCIAL_ACTION_GET_INBOX"));
        assert_eq!(registry.method_name(0), Some("UNSET"));
        assert_eq!(registry.method_name(7), Some("UNPREFIXED"));
        assert_eq!(registry.method_name(8), None);

        assert_eq!(registry.id_by_name("GetInboxProto"), Some(42));
        assert_eq!(registry.id_by_name("GetInboxOutProto"), None);
    }

    #[test]
    fn schema_decoding()
    {
        let registry = registry(SCHEMA).unwrap();
        let schema = registry.request_schema(42).unwrap();

        let value = schema.try_decode(b"\x0a\x03abc").unwrap();
        assert_eq!(schema.encode(&value), Bytes::from_static(b"\x0a\x03abc"));
        let text = value.to_text(registry.context(), false);
        assert_eq!(schema.parse_text(&text).unwrap(), value);
        assert!(schema.try_decode(b"\x0a\x09abc").is_err());
        assert_eq!(schema.decode(b"\x0a\x09abc").fields.len(), 1);
    }

    #[test]
    fn missing_and_mistyped_containers()
    {
        assert_eq!(
            registry("syntax = \"proto3\"; message A {}").unwrap_err(),
            RegistryError::MissingType {
                name: "AllTypesAndMessagesResponsesProto.AllMessagesProto".to_string()
            }
        );

        let not_message = SCHEMA.replace("GetInboxProto get_inbox = 42;", "int32 get_inbox = 42;");
        assert_eq!(
            registry(&not_message).unwrap_err(),
            RegistryError::FieldNotMessage {
                message: "Game.AllTypesAndMessagesResponsesProto.AllMessagesProto".to_string(),
                field: "get_inbox".to_string(),
            }
        );
    }

    #[test]
    fn proxy_fields_are_validated()
    {
        let no_action = SCHEMA.replace("uint32 action = 1;", "");
        assert_eq!(
            registry(&no_action).unwrap_err(),
            RegistryError::MissingProxyField {
                message: "Game.ProxyRequestProto".to_string(),
                field: "action".to_string(),
            }
        );

        let wrong_payload = SCHEMA.replace("int32 status = 1; bytes payload = 3;", "int32 payload = 3;");
        assert_eq!(
            registry(&wrong_payload).unwrap_err(),
            RegistryError::MissingProxyField {
                message: "Game.ProxyResponseProto".to_string(),
                field: "payload".to_string(),
            }
        );
    }
}
