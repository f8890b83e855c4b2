//! Translation response dispatch
//!
//! The service's response shape is unknown a priori: multi-library
//! requests come back as multipart form data, single-library requests as
//! one JSON document, and some deployments omit the content-type
//! entirely. This module routes the raw body to the right decoding path
//! and guarantees the caller a non-empty mapping.

use serde_json::Value;
use tracing::{info, warn};

use crate::elm::{self, ElmLibraryMap};
use crate::error::{ProcessorError, Result};
use crate::multipart;

/// Decode a translation response body into a library name -> ELM map.
///
/// An empty mapping is an error even when the transport succeeded: a
/// response that decodes to zero usable libraries must not look like
/// success to the caller.
pub fn decode_response(body: &str, content_type: &str) -> Result<ElmLibraryMap> {
    let libraries = if content_type.contains("multipart/form-data") {
        multipart::decode_multipart(body, content_type)?
    } else if content_type.contains("application/json") {
        decode_single(body)?
    } else {
        // Absent or unrecognized content-type: try the single-JSON path
        // as a best effort before giving up.
        decode_fallback(body, content_type)?
    };

    if libraries.is_empty() {
        return Err(ProcessorError::NoArtifactsDecoded);
    }

    info!(count = libraries.len(), "decoded ELM libraries");
    for (name, value) in &libraries {
        if let Some(identity) = elm::identity(value) {
            info!(library = %name, version = %identity.version, "decoded");
        }
    }

    Ok(libraries)
}

/// Single JSON document path: the library is keyed by its own identifier,
/// not by a transport-supplied name. A shape mismatch here is fatal;
/// there is no other part to fall back on.
fn decode_single(body: &str) -> Result<ElmLibraryMap> {
    let value: Value = serde_json::from_str(body)?;

    let Some(identity) = elm::identity(&value) else {
        return Err(ProcessorError::InvalidArtifactShape {
            fields: elm::top_level_fields(&value),
        });
    };

    let mut libraries = ElmLibraryMap::new();
    libraries.insert(identity.id, value);
    Ok(libraries)
}

/// Best-effort path for an absent or unrecognized content-type. A parse
/// failure is fatal and carries the content-type for diagnostics; a shape
/// mismatch yields no entry and surfaces through the empty-mapping check.
fn decode_fallback(body: &str, content_type: &str) -> Result<ElmLibraryMap> {
    let value: Value =
        serde_json::from_str(body).map_err(|source| ProcessorError::UnsupportedResponseFormat {
            content_type: content_type.to_string(),
            source,
        })?;

    let mut libraries = ElmLibraryMap::new();
    match elm::identity(&value) {
        Some(identity) => {
            info!(library = %identity.id, "parsed ELM library without content-type");
            libraries.insert(identity.id, value);
        }
        None => {
            warn!(
                fields = %elm::top_level_fields(&value),
                "fallback response parsed but is not an ELM document"
            );
        }
    }
    Ok(libraries)
}
