//! Error types for the isdoc-core library.

use thiserror::Error;

/// Main error type for the isdoc library.
#[derive(Error, Debug)]
pub enum IsdocError {
    /// Container scanning error.
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// The payload is not well-formed XML.
    #[error("XML error: {0}")]
    Xml(String),

    /// Schema loading error.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Rule set loading error.
    #[error("rules error: {0}")]
    Rules(#[from] RulesError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while looking for a payload inside a PDF container.
///
/// Everything except [`ContainerError::NotFound`] stays inside a single
/// extraction strategy and only makes that strategy give up.
#[derive(Error, Debug, Clone)]
pub enum ContainerError {
    /// Failed to parse the PDF object graph.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and the empty password did not open it.
    #[error("PDF is encrypted")]
    Encrypted,

    /// An expected dictionary entry is missing or has the wrong type.
    #[error("missing or malformed entry: {0}")]
    MissingKey(String),

    /// A stream could not be decoded.
    #[error("failed to decode stream: {0}")]
    Decode(String),

    /// The on-disk copy of the container is unavailable.
    #[error("spool file unavailable: {0}")]
    Spool(String),

    /// Every extraction strategy was exhausted.
    #[error("no ISDOC payload found in container")]
    NotFound,
}

/// Errors related to loading an XSD schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The schema file could not be read.
    #[error("failed to load schema {path}: {reason}")]
    Load { path: String, reason: String },

    /// The schema file is not a well-formed XSD document.
    #[error("failed to parse schema: {0}")]
    Parse(String),

    /// The schema uses a construct this validator cannot evaluate.
    #[error("unsupported schema construct: {0}")]
    Unsupported(String),
}

/// Errors related to rule set artifacts.
#[derive(Error, Debug)]
pub enum RulesError {
    /// The rules file could not be read or written.
    #[error("failed to access rules file: {0}")]
    Io(#[from] std::io::Error),

    /// The rules file is not valid JSON in the rule set shape.
    #[error("invalid rule set: {0}")]
    Json(#[from] serde_json::Error),

    /// No validation profile is registered for the document source.
    #[error("no validation profile for {0}")]
    NoProfile(String),
}

/// Result type for the isdoc library.
pub type Result<T> = std::result::Result<T, IsdocError>;
