//! Decoding of a single request or response payload.

use base64::prelude::*;
use bytes::Bytes;
use std::fmt;
use tracing::{debug, warn};

use crate::context::Context;
use crate::decode::MessageValue;
use crate::generic::GenericMessage;
use crate::registry::{MethodId, Registry, Schema};

/// Which half of an exchange a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction
{
    /// Client to server.
    Request,

    /// Server to client.
    Response,
}

/// Payload as captured, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload
{
    /// Base64 text, possibly padded with NUL characters.
    Text(String),

    /// Bytes taken from a `bytes` field of a proxy envelope. Used as they are.
    Binary(Bytes),
}

/// Decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload
{
    /// Decoded cleanly against the schema of the method.
    Strict(MessageValue),

    /// Decoded without a schema.
    Generic(GenericMessage),
}

/// One decoded payload of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Message
{
    /// Request or response.
    pub direction: Direction,

    /// The payload as captured.
    pub raw: RawPayload,

    /// Short name of the schema registered for the method, if any. Set even when the payload
    /// did not decode against it.
    pub schema_name: Option<String>,

    /// Decoded value.
    pub payload: Payload,
}

impl fmt::Display for Direction
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Direction::Request => write!(f, "Request"),
            Direction::Response => write!(f, "Response"),
        }
    }
}

impl RawPayload
{
    /// Payload bytes ready for decoding.
    ///
    /// Text is stripped of trailing NULs and ASCII whitespace, then base64-decoded. Text that
    /// is not valid base64 is used as its UTF-8 bytes instead.
    pub fn to_bytes(&self) -> Bytes
    {
        match self {
            RawPayload::Binary(b) => b.clone(),
            RawPayload::Text(s) => match BASE64_STANDARD.decode(base64_text(s)) {
                Ok(decoded) => Bytes::from(decoded),
                Err(e) => {
                    debug!(error = %e, "Payload is not base64, decoding it as is");
                    Bytes::copy_from_slice(s.as_bytes())
                }
            },
        }
    }

    /// The captured bytes, before any decoding.
    pub fn as_raw(&self) -> &[u8]
    {
        match self {
            RawPayload::Text(s) => s.as_bytes(),
            RawPayload::Binary(b) => b,
        }
    }
}

fn base64_text(s: &str) -> String
{
    s.trim_end_matches('\0')
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect()
}

impl From<String> for RawPayload
{
    fn from(s: String) -> Self
    {
        RawPayload::Text(s)
    }
}

impl From<&str> for RawPayload
{
    fn from(s: &str) -> Self
    {
        RawPayload::Text(s.to_string())
    }
}

impl From<Bytes> for RawPayload
{
    fn from(b: Bytes) -> Self
    {
        RawPayload::Binary(b)
    }
}

impl fmt::Display for RawPayload
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            RawPayload::Text(s) => write!(f, "{}", s.trim_end_matches('\0')),
            RawPayload::Binary(b) => write!(f, "{}", BASE64_STANDARD.encode(b)),
        }
    }
}

impl Message
{
    /// Decodes a payload against the schema registered for the method, falling back to
    /// schema-less decoding when there is no schema or the payload does not fit it.
    pub fn decode(
        registry: &Registry,
        direction: Direction,
        id: MethodId,
        raw: RawPayload,
    ) -> Self
    {
        let schema = registry.schema(direction, id);
        let bytes = raw.to_bytes();

        let payload = match schema.and_then(|s| try_strict(&s, &bytes, &raw)) {
            Some(value) => Payload::Strict(value),
            None => {
                let value = GenericMessage::decode(&bytes);
                if !value.is_complete() {
                    warn!(
                        %direction,
                        id,
                        raw = %raw,
                        "Payload is damaged, generic decoding is partial"
                    );
                }
                Payload::Generic(value)
            }
        };

        Message {
            direction,
            raw,
            schema_name: schema.map(|s| s.name().to_string()),
            payload,
        }
    }

    /// The schema-backed value, if the payload decoded against its schema.
    pub fn strict(&self) -> Option<&MessageValue>
    {
        match &self.payload {
            Payload::Strict(v) => Some(v),
            Payload::Generic(..) => None,
        }
    }

    /// The schema-less value, if the payload was decoded without a schema.
    pub fn generic(&self) -> Option<&GenericMessage>
    {
        match &self.payload {
            Payload::Strict(..) => None,
            Payload::Generic(v) => Some(v),
        }
    }

    /// False if the payload had regions that could not be decoded at all.
    pub fn is_complete(&self) -> bool
    {
        match &self.payload {
            Payload::Strict(..) => true,
            Payload::Generic(v) => v.is_complete(),
        }
    }

    /// Renders the value: protobuf text format for strict values, JSON for generic ones.
    pub fn render(&self, ctx: &Context, one_line: bool) -> String
    {
        match &self.payload {
            Payload::Strict(v) => v.to_text(ctx, one_line),
            Payload::Generic(v) => v.to_json_string(one_line),
        }
    }
}

fn try_strict(schema: &Schema, bytes: &[u8], raw: &RawPayload) -> Option<MessageValue>
{
    match schema.try_decode(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                schema = schema.name(),
                raw = %raw,
                error = %e,
                "Strict decoding failed, falling back to generic decoding"
            );
            None
        }
    }
}
