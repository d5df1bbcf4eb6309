//! Error types for the antbox content repository.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using antbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A single property-level validation failure.
///
/// Aggregated into [`Error::Validation`] so one round trip reports
/// every offending property at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyError {
    /// Fully qualified property key, e.g. `"<aspectUuid>:<name>"`.
    pub property: String,
    /// Human-readable description of the failure.
    pub message: String,
}

impl PropertyError {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PropertyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// Core error type for antbox operations.
///
/// Tag names are contractual; messages are informative only.
#[derive(Error, Debug)]
pub enum Error {
    /// Node not found by uuid or fid
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Folder not found (or target is not a folder)
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Smart folder not found (or target is not a smart folder)
    #[error("Smart folder not found: {0}")]
    SmartFolderNotFound(String),

    /// Api key node not found
    #[error("Api key not found: {0}")]
    ApiKeyNotFound(String),

    /// Feature node not found
    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    /// Binary content not found for a node
    #[error("Node file not found: {0}")]
    NodeFileNotFound(String),

    /// Anonymous caller lacking permission
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated caller lacking permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Shape errors, mismatched mimetypes, feature rule violations,
    /// built-in protection, uuid/fid collisions
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// One or more property-level errors from the aspect validator
    #[error("Validation failed: {}", format_property_errors(.0))]
    Validation(Vec<PropertyError>),

    /// Smart folder aggregation formula failure
    #[error("Aggregation formula error: {0}")]
    AggregationFormula(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transient or internal failure
    #[error("Unknown error: {0}")]
    Unknown(String),
}

fn format_property_errors(errors: &[PropertyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Build a [`Error::Validation`] from a single property error.
    pub fn validation(property: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(vec![PropertyError::new(property, message)])
    }

    /// Whether this error is any of the not-found kinds.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NodeNotFound(_)
                | Error::FolderNotFound(_)
                | Error::SmartFolderNotFound(_)
                | Error::ApiKeyNotFound(_)
                | Error::FeatureNotFound(_)
                | Error::NodeFileNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
