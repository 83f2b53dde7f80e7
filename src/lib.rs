//!
//! Trafficlight decodes captured game RPC traffic. Each captured exchange carries a method
//! identifier and base64 encoded request and response payloads. The payload schemas come from
//! .proto-files supplied at runtime: the method identifier picks the request and response
//! message types, payloads that do not fit their type are decoded without a schema, and proxy
//! envelopes are unwrapped into the action they carry.
//!
//! ```
//! use trafficlight::{Config, Context, Registry, Resolver};
//!
//! let context = Context::parse(&[r#"
//!   syntax = "proto3";
//!
//!   message SwimProto { string kind = 1; }
//!   message SwimOutProto { int32 distance = 1; }
//!
//!   message AllTypesAndMessagesResponsesProto {
//!     message AllMessagesProto { SwimProto swim = 7; }
//!     message AllResponsesProto { SwimOutProto swim = 7; }
//!     enum AllResquestTypesProto { REQUEST_TYPE_SWIM = 7; }
//!   }
//! "#]).unwrap();
//!
//! let config = Config::default();
//! let registry = Registry::new(context, &config).unwrap();
//! let resolver = Resolver::new(&registry, &config.resolver);
//!
//! // `CgVQZXJjaA==` is `\x0a\x05Perch`, `CKlG` is `\x08\xa9\x46`.
//! let record = resolver.resolve(1, 7, "CgVQZXJjaA==".into(), "CKlG".into()).unwrap();
//! assert_eq!(record.method_name.as_deref(), Some("SWIM"));
//! assert_eq!(record.request.render(registry.context(), true), r#"kind: "Perch""#);
//! assert_eq!(record.response.render(registry.context(), true), "distance: 9001");
//!
//! // Unknown methods are decoded without a schema.
//! let record = resolver.resolve(2, 8, "CKlG".into(), "".into()).unwrap();
//! assert_eq!(record.method_name, None);
//! assert_eq!(record.request.render(registry.context(), true), r#"{"1":9001}"#);
//! ```
#![warn(missing_docs)]
#![allow(clippy::match_bool)]

pub mod capture;
pub mod config;
pub mod context;
pub mod decode;
pub mod encode;
pub mod generic;
pub mod message;
pub mod output;
pub mod record;
pub mod registry;
pub mod text;

pub use config::{Config, RegistryConfig, ResolverConfig};
pub use context::{Context, MessageRef, ParseError};
pub use decode::{MessageValue, Value};
pub use message::{Direction, Message, Payload, RawPayload};
pub use record::{Record, Resolver};
pub use registry::Registry;
