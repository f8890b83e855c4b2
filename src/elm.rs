//! ELM payload shapes
//!
//! Decoded translator payloads are kept as raw `serde_json::Value`s; a
//! payload is accepted only if it carries the nested
//! `library.identifier` structure every real ELM document has. Validation
//! is a pure predicate over the parsed value, separate from parsing, so
//! the two failure classes stay distinct.

use indexmap::IndexMap;
use serde_json::Value;

/// Library name -> decoded ELM document, in decode order
pub type ElmLibraryMap = IndexMap<String, Value>;

/// Version string reported when a library omits one
pub const UNKNOWN_VERSION: &str = "unknown";

/// Identity of a compiled ELM library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElmIdentity {
    pub id: String,
    pub version: String,
}

/// Check that a parsed value has the shape of an ELM document and pull
/// out its identity. Returns `None` for anything without a
/// `library.identifier` object.
pub fn identity(value: &Value) -> Option<ElmIdentity> {
    let identifier = value.get("library")?.get("identifier")?;
    if !identifier.is_object() {
        return None;
    }

    let id = identifier
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let version = identifier
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_VERSION)
        .to_string();

    Some(ElmIdentity { id, version })
}

/// Comma-joined top-level field names, for shape-mismatch diagnostics.
pub fn top_level_fields(value: &Value) -> String {
    match value.as_object() {
        Some(map) => map.keys().cloned().collect::<Vec<_>>().join(", "),
        None => format!("(not an object: {})", json_type_name(value)),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_accepts_full_shape() {
        let value = json!({"library": {"identifier": {"id": "Foo", "version": "1.0.0"}}});
        let identity = identity(&value).unwrap();
        assert_eq!(identity.id, "Foo");
        assert_eq!(identity.version, "1.0.0");
    }

    #[test]
    fn test_identity_defaults_missing_version() {
        let value = json!({"library": {"identifier": {"id": "Foo"}}});
        assert_eq!(identity(&value).unwrap().version, UNKNOWN_VERSION);
    }

    #[test]
    fn test_identity_rejects_wrong_shapes() {
        assert!(identity(&json!({"errors": []})).is_none());
        assert!(identity(&json!({"library": {}})).is_none());
        assert!(identity(&json!({"library": {"identifier": "Foo"}})).is_none());
        assert!(identity(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_top_level_fields_diagnostics() {
        let value = json!({"errorSeverity": "error", "message": "boom"});
        assert_eq!(top_level_fields(&value), "errorSeverity, message");
        assert_eq!(top_level_fields(&json!(42)), "(not an object: number)");
    }
}
