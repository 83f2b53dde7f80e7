//! Naming conventions and proxy settings.
//!
//! The defaults match the game client's schema files. Both halves can be loaded from a JSON
//! file; missing keys keep their default values.

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::path::Path;

/// Error loading a configuration file.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ConfigError
{
    /// The file could not be read.
    #[snafu(display("Could not read config '{}': {}", path, source))]
    ReadConfig
    {
        /// File path.
        path: String,

        /// Source error.
        source: std::io::Error,
    },

    /// The file was not valid JSON for the config structure.
    #[snafu(display("Invalid config '{}': {}", path, source))]
    InvalidConfig
    {
        /// File path.
        path: String,

        /// Source error.
        source: serde_json::Error,
    },
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Registry naming conventions.
    pub registry: RegistryConfig,

    /// Record resolution settings.
    pub resolver: ResolverConfig,
}

/// Where the registry finds its mappings in the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig
{
    /// Message whose fields map method identifiers to request schemas.
    pub requests_message: String,

    /// Message whose fields map method identifiers to response schemas.
    pub responses_message: String,

    /// Enum whose values name the methods.
    pub methods_enum: String,

    /// Prefix stripped from the method enum value names.
    pub method_prefix: String,
}

impl Default for RegistryConfig
{
    fn default() -> Self
    {
        Self {
            requests_message: "AllTypesAndMessagesResponsesProto.AllMessagesProto".to_string(),
            responses_message: "AllTypesAndMessagesResponsesProto.AllResponsesProto".to_string(),
            methods_enum: "AllTypesAndMessagesResponsesProto.AllResquestTypesProto".to_string(),
            method_prefix: "REQUEST_TYPE_".to_string(),
        }
    }
}

/// Proxy envelope detection and method name recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig
{
    /// Method identifier of the proxy envelope (`CLIENT_ACTION_PROXY_SOCIAL_ACTION`).
    pub proxy_method: i64,

    /// Request field holding the inner method identifier.
    pub proxy_action_field: String,

    /// Request and response field holding the inner payload.
    pub proxy_payload_field: String,

    /// Method name prefix that enables the name-based identifier recovery.
    pub social_action_prefix: String,

    /// Maximum number of nested proxy envelopes.
    pub max_proxy_depth: usize,
}

impl Default for ResolverConfig
{
    fn default() -> Self
    {
        Self {
            proxy_method: 5012,
            proxy_action_field: "action".to_string(),
            proxy_payload_field: "payload".to_string(),
            social_action_prefix: "SOCIAL_ACTION_".to_string(),
            max_proxy_depth: 4,
        }
    }
}

impl Config
{
    /// Parses a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error>
    {
        serde_json::from_str(json)
    }

    /// Loads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError>
    {
        let display = path.display().to_string();
        let json = std::fs::read_to_string(path).context(ReadConfig {
            path: display.clone(),
        })?;
        Self::from_json(&json).context(InvalidConfig { path: display })
    }
}

#[cfg(test)]
mod test
{
    use super::*;

    #[test]
    fn partial_json_keeps_defaults()
    {
        let config = Config::from_json(
            r#"{
                "registry": { "method_prefix": "METHOD_" },
                "resolver": { "max_proxy_depth": 1 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.registry.method_prefix, "METHOD_");
        assert_eq!(
            config.registry.requests_message,
            RegistryConfig::default().requests_message
        );
        assert_eq!(config.resolver.max_proxy_depth, 1);
        assert_eq!(config.resolver.proxy_method, 5012);
    }

    #[test]
    fn empty_json_is_default()
    {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn missing_file()
    {
        match Config::load(Path::new("/nonexistent/trafficlight.json")) {
            Err(ConfigError::ReadConfig { path, .. }) => {
                assert_eq!(path, "/nonexistent/trafficlight.json")
            }
            other => panic!("Expected read error: {:?}", other),
        }
    }
}
