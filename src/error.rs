//! Error types for dynwire-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all registry, codec and dispatch operations.
#[derive(Debug, Error)]
pub enum DynwireError {
    /// Schema source could not be parsed.
    #[error("schema parse error at line {line}: {message}")]
    SchemaParse { line: usize, message: String },

    /// Payload failed validation against the request type, or a payload was
    /// supplied where none is expected (and vice versa).
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Response bytes do not conform to the expected response type.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Command is not in the protocol's catalog.
    #[error("unknown command '{command}' for protocol '{protocol}'")]
    UnknownCommand { protocol: String, command: String },

    /// Protocol id has not been loaded into the registry.
    #[error("protocol not loaded: {0}")]
    ProtocolNotLoaded(String),

    /// Bundle does not consist of exactly one schema and one manifest.
    #[error("unsupported bundle for protocol '{protocol}': {reason}")]
    UnsupportedBundleShape { protocol: String, reason: String },

    /// Message type is not defined in the schema.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A field references a type that does not resolve in its schema.
    #[error("field '{field}' references unresolved type '{type_name}'")]
    UnresolvedType { field: String, type_name: String },

    /// Message types nest deeper than a template can be rendered.
    #[error("message type '{type_name}' nests deeper than {limit} levels")]
    NestingTooDeep { type_name: String, limit: usize },

    /// Manifest JSON is malformed.
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Transport exchange failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Transport exchange did not complete in time.
    #[error("exchange timed out after {0:?}")]
    Timeout(Duration),

    /// An exchange for the same protocol and command is still outstanding.
    #[error("command '{command}' for protocol '{protocol}' is already in flight")]
    InFlight { protocol: String, command: String },
}

impl DynwireError {
    pub(crate) fn schema(line: usize, message: impl Into<String>) -> Self {
        Self::SchemaParse {
            line,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for DynwireError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type alias using DynwireError.
pub type Result<T> = std::result::Result<T, DynwireError>;
