//! Error handling for the CQL -> ELM pipeline
//!
//! This module provides idiomatic Rust error types using thiserror for
//! better error messages and proper error chain handling. Per-part decode
//! failures inside a multipart response are deliberately NOT represented
//! here: they are logged and skipped where they occur, and only their
//! aggregate effect (an empty result mapping) surfaces as an error.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for resource processing
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("no boundary parameter found in content-type '{content_type}'")]
    MissingBoundary { content_type: String },

    #[error("resource file not found: {}", .path.display())]
    ResourceNotFound { path: PathBuf },

    #[error("no text/cql content found in resource: {reason}")]
    NoSourceContent { reason: String },

    #[error("invalid ELM structure in JSON response (top-level fields: {fields})")]
    InvalidArtifactShape { fields: String },

    #[error("unsupported response format (content-type '{content_type}'): {source}")]
    UnsupportedResponseFormat {
        content_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no valid ELM libraries found in response")]
    NoArtifactsDecoded,

    #[error("no ELM content found for main library '{name}'")]
    MainArtifactNotFound { name: String },

    #[error("translation service returned {status}: {body}")]
    TranslatorStatus { status: u16, body: String },

    #[error("no application/elm+json content entry found in resource")]
    NoElmContentEntry,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded content is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ProcessorError>;
