//! FHIR Library/Measure resource handling
//!
//! A resource is kept as raw JSON behind a thin wrapper so that persisted
//! output preserves the input's key ordering. The wrapper owns the
//! content-list invariant: after a merge there is at most one entry per
//! content type.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ProcessorError, Result};

/// Content type of the authored CQL source attachment
pub const CQL_CONTENT_TYPE: &str = "text/cql";

/// Content type of the compiled ELM attachment
pub const ELM_CONTENT_TYPE: &str = "application/elm+json";

/// Library name used when a resource yields no better identity
const FALLBACK_LIBRARY_NAME: &str = "main";

/// A FHIR Library or Measure resource
#[derive(Debug, Clone)]
pub struct LibraryResource {
    json: Value,
}

impl LibraryResource {
    pub fn from_value(json: Value) -> Self {
        Self { json }
    }

    /// Load a resource from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_value(serde_json::from_str(&text)?))
    }

    /// Resolve a resource argument to an existing file path.
    ///
    /// Absolute paths and paths containing a separator are taken as
    /// given; bare names are looked up in `resources_dir`, with a `.json`
    /// suffix added when the plain name does not exist.
    pub fn resolve_path(name: &str, resources_dir: &Path) -> Result<PathBuf> {
        let given = Path::new(name);
        let path = if given.is_absolute() || name.contains('/') {
            given.to_path_buf()
        } else {
            let direct = resources_dir.join(name);
            if direct.exists() || name.ends_with(".json") {
                direct
            } else {
                resources_dir.join(format!("{name}.json"))
            }
        };

        if !path.exists() {
            return Err(ProcessorError::ResourceNotFound { path });
        }
        Ok(path)
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Pretty-printed JSON, key order preserved from input.
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.json)?)
    }

    /// The content list: either the resource's own `content` or, for a
    /// container-style resource, the first nested library's.
    fn content_list(&self) -> Option<&Vec<Value>> {
        if let Some(content) = self.json.get("content").and_then(Value::as_array) {
            return Some(content);
        }
        self.json
            .get("library")?
            .as_array()?
            .first()?
            .get("content")?
            .as_array()
    }

    /// Decode the embedded CQL source text.
    ///
    /// The single `text/cql` content entry must exist; its absence is a
    /// hard failure.
    pub fn extract_cql(&self) -> Result<String> {
        let content = self
            .content_list()
            .ok_or_else(|| ProcessorError::NoSourceContent {
                reason: "no content array found in resource".to_string(),
            })?;

        let data = content
            .iter()
            .find(|entry| entry_content_type(entry) == Some(CQL_CONTENT_TYPE))
            .and_then(|entry| entry.get("data"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProcessorError::NoSourceContent {
                reason: "no text/cql content element found".to_string(),
            })?;

        let cql = decode_base64_text(data)?;
        debug!(chars = cql.len(), "extracted CQL content");
        Ok(cql)
    }

    /// Name of the main library, used to select the matching entry from
    /// a multi-library translation result. Precedence: the `library`
    /// directive in the CQL itself, then the resource's `name`, then its
    /// `id`, then a fixed fallback.
    pub fn main_library_name(&self, cql: &str) -> String {
        if let Some(name) = declared_library_name(cql) {
            return name;
        }
        if let Some(name) = self.json.get("name").and_then(Value::as_str) {
            return name.to_string();
        }
        if let Some(id) = self.json.get("id").and_then(Value::as_str) {
            return id.to_string();
        }
        FALLBACK_LIBRARY_NAME.to_string()
    }

    /// Filename hint for the main CQL source. Unlike
    /// [`main_library_name`](Self::main_library_name) this prefers the
    /// resource metadata, matching how the source files are laid out on
    /// disk.
    pub fn main_cql_filename(&self, cql: &str) -> String {
        if let Some(name) = self.json.get("name").and_then(Value::as_str) {
            return format!("{name}.cql");
        }
        if let Some(id) = self.json.get("id").and_then(Value::as_str) {
            return format!("{id}.cql");
        }
        if let Some(name) = declared_library_name(cql) {
            return format!("{name}.cql");
        }
        format!("{FALLBACK_LIBRARY_NAME}.cql")
    }

    /// Merge a compiled ELM document into the resource's content list.
    ///
    /// The ELM is serialized as pretty JSON and base64 encoded; any prior
    /// `application/elm+json` entry is removed first, so merging the same
    /// document twice leaves the list unchanged.
    pub fn merge_elm(&mut self, elm: &Value) -> Result<()> {
        let encoded = BASE64.encode(serde_json::to_string_pretty(elm)?);

        let root = self
            .json
            .as_object_mut()
            .ok_or_else(|| ProcessorError::NoSourceContent {
                reason: "resource is not a JSON object".to_string(),
            })?;

        let content = root
            .entry("content")
            .or_insert_with(|| Value::Array(Vec::new()));
        let entries = content
            .as_array_mut()
            .ok_or_else(|| ProcessorError::NoSourceContent {
                reason: "resource content is not an array".to_string(),
            })?;

        entries.retain(|entry| entry_content_type(entry) != Some(ELM_CONTENT_TYPE));
        entries.push(json!({
            "contentType": ELM_CONTENT_TYPE,
            "data": encoded,
        }));

        debug!("merged ELM content into resource");
        Ok(())
    }

    /// Replace the data of the existing `application/elm+json` entry with
    /// the base64 encoding of `elm_text`. Unlike
    /// [`merge_elm`](Self::merge_elm) this requires the entry to already
    /// be there, and returns the old and new data lengths.
    pub fn splice_elm_data(&mut self, elm_text: &str) -> Result<(usize, usize)> {
        let entries = self
            .json
            .get_mut("content")
            .and_then(Value::as_array_mut)
            .ok_or(ProcessorError::NoElmContentEntry)?;

        let entry = entries
            .iter_mut()
            .find(|entry| entry_content_type(entry) == Some(ELM_CONTENT_TYPE))
            .ok_or(ProcessorError::NoElmContentEntry)?;

        let old_len = entry
            .get("data")
            .and_then(Value::as_str)
            .map(str::len)
            .unwrap_or(0);
        let encoded = BASE64.encode(elm_text);
        let new_len = encoded.len();
        entry["data"] = Value::String(encoded);
        Ok((old_len, new_len))
    }
}

fn entry_content_type(entry: &Value) -> Option<&str> {
    entry.get("contentType").and_then(Value::as_str)
}

/// Decode base64 attachment data, tolerating embedded whitespace.
fn decode_base64_text(data: &str) -> Result<String> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact)?;
    Ok(String::from_utf8(bytes)?)
}

/// Extract the library name declared at the start of a CQL line, e.g.
/// `library Foo version '1.0.0'` yields `Foo`.
pub fn declared_library_name(cql: &str) -> Option<String> {
    cql.lines().find_map(|line| {
        let rest = line.strip_prefix("library")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        rest.split_whitespace().next().map(str::to_string)
    })
}
