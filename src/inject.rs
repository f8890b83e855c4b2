//! Direct ELM injection
//!
//! Splices an already-compiled ELM JSON file into the
//! `application/elm+json` content entry of a library resource on disk,
//! bypassing the translation service. Useful when the ELM was produced
//! out of band and only the resource needs refreshing.

use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::elm;
use crate::error::Result;
use crate::resource::LibraryResource;

/// Summary of an injection, for reporting
#[derive(Debug)]
pub struct InjectSummary {
    pub elm_bytes: usize,
    pub old_data_len: usize,
    pub new_data_len: usize,
}

/// Read an ELM file and splice it into the resource file's existing
/// `application/elm+json` entry, rewriting the resource in place.
pub fn inject_elm_file(elm_path: &Path, resource_path: &Path) -> Result<InjectSummary> {
    let elm_text = std::fs::read_to_string(elm_path)?;
    let elm_json: Value = serde_json::from_str(&elm_text)?;

    if let Some(identity) = elm::identity(&elm_json) {
        info!(library = %identity.id, version = %identity.version, "ELM file loaded");
    }

    let mut resource = LibraryResource::load(resource_path)?;
    let (old_data_len, new_data_len) = resource.splice_elm_data(&elm_text)?;
    std::fs::write(resource_path, resource.to_pretty_json()?)?;

    info!(path = %resource_path.display(), "updated library file");
    Ok(InjectSummary {
        elm_bytes: elm_text.len(),
        old_data_len,
        new_data_len,
    })
}
