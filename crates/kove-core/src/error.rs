//! Error types for the Kove exporter

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KoveError>;

#[derive(Error, Debug)]
pub enum KoveError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Unable to load policy source {path}: {reason}")]
    PolicyLoad { path: String, reason: String },

    #[error("Policy evaluation failed: {reason}")]
    EvaluationError { reason: String },

    #[error("Malformed violation from policy evaluator: missing field {field}")]
    MalformedViolation { field: String },

    #[error("Resource discovery failed: {reason}")]
    DiscoveryError { reason: String },

    #[error("Unsupported group version: {group_version}")]
    UnsupportedVersion { group_version: String },

    #[error("Watch source failed: {reason}")]
    WatchError { reason: String },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("YAML error: {source}")]
    YamlError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
