//! Error types for config loading and validation.

use thiserror::Error;

/// Errors produced by the Config Loader & Validator (spec §4.1, §7).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse workflow config: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    #[error("invalid workflow schema: {0}")]
    ConfigSchemaError(String),

    #[error("name collision after normalization: '{a}' and '{b}' both normalize to '{normalized}'")]
    NameCollisionError {
        a: String,
        b: String,
        normalized: String,
    },

    #[error("required file not found in source tree: {0}")]
    MissingFileError(String),

    #[error("referenced secret not found: {namespace}/{name}")]
    SecretNotFoundError { namespace: String, name: String },

    #[error("validation failed: {0}")]
    ValidationError(String),
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
