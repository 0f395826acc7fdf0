//! Error types for the mail forwarder.

/// Top-level error type for one forwarding invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Forward error: {0}")]
    Forward(#[from] ForwardError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
///
/// Surfaced before any message is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised by the forwarding core itself.
///
/// Every variant is terminal for the invocation that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("No rule matched recipients [{}] and no catch-all is configured", .candidates.join(", "))]
    NoRuleMatched { candidates: Vec<String> },

    #[error("Re-enveloped forwarding requires MailFromEmailAddress to be set")]
    MissingSenderConfiguration,

    #[error("Message is addressed to the forwarder itself ({address}), refusing to forward")]
    ForwardLoop { address: String },
}

/// Storage collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Stored message not found: {key}")]
    NotFound { key: String },

    #[error("Invalid storage key: {key}")]
    InvalidKey { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid envelope address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

/// Result type alias for the forwarder.
pub type Result<T> = std::result::Result<T, Error>;
