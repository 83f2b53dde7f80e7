//! Resolution of captured exchanges into decoded records.
//!
//! A record pairs the request and response payloads of one RPC. The method identifier picks
//! the schemas. Proxy envelopes carry a second action inside them; such records are unwrapped
//! recursively into [`Record::proxy`].

use bytes::Bytes;
use snafu::Snafu;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::context::ValueType;
use crate::decode::{MessageValue, Value};
use crate::message::{Direction, Message, RawPayload};
use crate::registry::{MethodId, Registry};

/// Error resolving a record.
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum ResolveError
{
    /// Proxy envelopes were nested deeper than allowed.
    #[snafu(display("Record {} nests proxy envelopes deeper than {}", rpc_id, max_depth))]
    ProxyDepthExceeded
    {
        /// Record identifier.
        rpc_id: i64,

        /// Configured maximum depth.
        max_depth: usize,
    },
}

/// One decoded RPC exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Record
{
    /// Record identifier from the capture.
    pub rpc_id: i64,

    /// Method identifier the payloads were decoded with. May differ from the captured one when
    /// it was recovered from the method name.
    pub method_value: MethodId,

    /// Method name, if the method is known.
    pub method_name: Option<String>,

    /// Decoded request.
    pub request: Message,

    /// Decoded response.
    pub response: Message,

    /// The action wrapped inside a proxy envelope.
    pub proxy: Option<Box<Record>>,
}

/// Method name and the identifier to decode with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod
{
    /// Method name with the enum prefix removed.
    pub name: Option<String>,

    /// Effective method identifier.
    pub value: MethodId,
}

/// Resolves captured exchanges against a registry.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a>
{
    registry: &'a Registry,
    config: &'a ResolverConfig,
}

impl Record
{
    /// The record followed by the records unwrapped from its proxy envelopes.
    pub fn chain(&self) -> impl Iterator<Item = &Record>
    {
        std::iter::successors(Some(self), |r| r.proxy.as_deref())
    }

    /// Request, then response.
    pub fn messages(&self) -> impl Iterator<Item = &Message>
    {
        std::iter::once(&self.request).chain(std::iter::once(&self.response))
    }
}

impl<'a> Resolver<'a>
{
    /// Creates a resolver.
    pub fn new(registry: &'a Registry, config: &'a ResolverConfig) -> Self
    {
        Resolver { registry, config }
    }

    /// Decodes an exchange, unwrapping proxy envelopes.
    ///
    /// Undecodable payloads never fail the record; they are decoded without a schema instead.
    pub fn resolve(
        &self,
        rpc_id: i64,
        method_value: MethodId,
        raw_request: RawPayload,
        raw_response: RawPayload,
    ) -> Result<Record, ResolveError>
    {
        self.resolve_at(rpc_id, method_value, raw_request, raw_response, 0)
    }

    fn resolve_at(
        &self,
        rpc_id: i64,
        method_value: MethodId,
        raw_request: RawPayload,
        raw_response: RawPayload,
        depth: usize,
    ) -> Result<Record, ResolveError>
    {
        let ResolvedMethod { name, value } = self.resolve_method_name(method_value);
        let request = Message::decode(self.registry, Direction::Request, value, raw_request);
        let response = Message::decode(self.registry, Direction::Response, value, raw_response);

        let proxy = match (request.strict(), response.strict()) {
            (Some(req), Some(resp)) if value == self.config.proxy_method => {
                if depth >= self.config.max_proxy_depth {
                    return ProxyDepthExceeded {
                        rpc_id,
                        max_depth: self.config.max_proxy_depth,
                    }
                    .fail();
                }

                let action = self.inner_action(req);
                let inner_request = self.inner_payload(req);
                let inner_response = self.inner_payload(resp);
                let inner =
                    self.resolve_at(rpc_id, action, inner_request, inner_response, depth + 1)?;
                Some(Box::new(inner))
            }
            _ => None,
        };

        Ok(Record {
            rpc_id,
            method_value: value,
            method_name: name,
            request,
            response,
            proxy,
        })
    }

    /// Looks up the method name and, for unknown social actions, recovers the identifier of
    /// the message type the name refers to.
    ///
    /// `SOCIAL_ACTION_GET_INBOX` probes `GetInboxV2Proto` and then `GetInboxProto` among the
    /// request types. The first type whose identifier has a method name of its own wins.
    pub fn resolve_method_name(&self, method_value: MethodId) -> ResolvedMethod
    {
        let name = self.registry.method_name(method_value);
        let unresolved = ResolvedMethod {
            name: name.map(str::to_string),
            value: method_value,
        };

        if self.registry.has_schema(method_value) {
            return unresolved;
        }

        let prefix = self.config.social_action_prefix.as_str();
        let base = match name.and_then(|n| n.strip_prefix(prefix)) {
            Some(base) => title_case(base),
            None => return unresolved,
        };

        for candidate in &[format!("{}V2Proto", base), format!("{}Proto", base)] {
            let id = match self.registry.id_by_name(candidate) {
                Some(id) => id,
                None => continue,
            };

            if let Some(name) = self.registry.method_name(id) {
                debug!(
                    from = method_value,
                    to = id,
                    candidate = candidate.as_str(),
                    "Recovered method identifier from the method name"
                );
                return ResolvedMethod {
                    name: Some(name.to_string()),
                    value: id,
                };
            }
        }

        unresolved
    }

    fn inner_action(&self, request: &MessageValue) -> MethodId
    {
        self.proxy_field(request, &self.config.proxy_action_field)
            .and_then(integer)
            .unwrap_or(0)
    }

    fn inner_payload(&self, value: &MessageValue) -> RawPayload
    {
        match self.proxy_field(value, &self.config.proxy_payload_field) {
            Some(Value::Bytes(b)) => RawPayload::Binary(b.clone()),
            Some(Value::String(s)) => RawPayload::Text(s.clone()),
            _ => match self.proxy_field_type(value, &self.config.proxy_payload_field) {
                Some(ValueType::String) => RawPayload::Text(String::new()),
                _ => RawPayload::Binary(Bytes::new()),
            },
        }
    }

    fn proxy_field<'v>(&self, value: &'v MessageValue, name: &str) -> Option<&'v Value>
    {
        let info = self.registry.context().resolve_message(value.msg_ref);
        info.get_field_by_name(name)
            .and_then(|field| value.get_field(field.number))
    }

    fn proxy_field_type(&self, value: &MessageValue, name: &str) -> Option<&'a ValueType>
    {
        let info = self.registry.context().resolve_message(value.msg_ref);
        info.get_field_by_name(name).map(|field| &field.field_type)
    }
}

fn integer(value: &Value) -> Option<i64>
{
    Some(match value {
        Value::Int32(v) | Value::SInt32(v) | Value::SFixed32(v) => i64::from(*v),
        Value::Int64(v) | Value::SInt64(v) | Value::SFixed64(v) => *v,
        Value::UInt32(v) | Value::Fixed32(v) => i64::from(*v),
        Value::UInt64(v) | Value::Fixed64(v) => *v as i64,
        Value::Enum(e) => e.value,
        _ => return None,
    })
}

/// `GET_INBOX` to `GetInbox`. Letters following another letter are lowercased, the rest
/// uppercased.
fn title_case(name: &str) -> String
{
    let mut out = String::with_capacity(name.len());
    for segment in name.split('_') {
        let mut after_letter = false;
        for c in segment.chars() {
            match (c.is_alphabetic(), after_letter) {
                (true, false) => out.extend(c.to_uppercase()),
                (true, true) => out.extend(c.to_lowercase()),
                _ => out.push(c),
            }
            after_letter = c.is_alphabetic();
        }
    }
    out
}
