//! Tolerant multipart response decoding
//!
//! The translation service answers multi-library requests with a
//! `multipart/form-data` body that is only loosely RFC compliant:
//! boundary markers, header terminators, and trailing delimiters vary
//! across producer versions. This module recovers every valid JSON part
//! it can find and never lets one malformed part abort the response.
//!
//! A malformed individual part (missing name, missing header terminator,
//! truncated body, bad JSON) is logged and skipped; only the caller's
//! empty-mapping check can turn that into an error.

use serde_json::Value;
use tracing::{debug, warn};

use crate::elm::{self, ElmLibraryMap};
use crate::error::{ProcessorError, Result};

/// Header/body separator conventions, in priority order for ties
const HEADER_SEPARATORS: [&str; 3] = ["\r\n\r\n", "\n\n", "\r\r"];

/// Bodies shorter than this cannot be a usable ELM document
const MIN_JSON_LEN: usize = 10;

const HEAD_PREVIEW_CHARS: usize = 200;
const TAIL_PREVIEW_CHARS: usize = 100;

/// Extract the boundary token from a content-type header.
///
/// Accepts both quoted and unquoted forms; the token ends at the next
/// `;`, `,`, or whitespace, and surrounding quotes are stripped.
pub fn resolve_boundary(content_type: &str) -> Result<String> {
    let missing = || ProcessorError::MissingBoundary {
        content_type: content_type.to_string(),
    };

    let start = content_type.find("boundary=").ok_or_else(missing)? + "boundary=".len();
    let token: &str = content_type[start..]
        .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .next()
        .unwrap_or("");
    let token = token.trim_matches(|c| c == '"' || c == '\'');

    if token.is_empty() {
        return Err(missing());
    }
    Ok(token.to_string())
}

/// Decode a multipart translation response into a library name -> ELM map.
///
/// Same-name parts overwrite last-write-wins; producers have been seen
/// emitting true duplicates and the final occurrence is authoritative.
pub fn decode_multipart(body: &str, content_type: &str) -> Result<ElmLibraryMap> {
    let boundary = resolve_boundary(content_type)?;
    debug!(boundary = %boundary, "decoding multipart response");

    let delimiter = format!("--{}", boundary);
    let mut libraries = ElmLibraryMap::new();

    for (index, part) in body.split(delimiter.as_str()).enumerate() {
        let trimmed = part.trim();
        // Preamble, the terminal "--" marker, and anything that is not a
        // named part get dropped before decoding.
        if trimmed.is_empty() || trimmed == "--" || !part.contains("Content-Disposition") {
            debug!(part = index, "skipping non-payload part");
            continue;
        }

        let Some((name, parsed)) = decode_part(index, part) else {
            continue;
        };

        match elm::identity(&parsed) {
            Some(identity) => {
                if libraries.contains_key(&name) {
                    warn!(library = %name, "duplicate part name, keeping the later payload");
                }
                debug!(library = %name, version = %identity.version, "decoded ELM library");
                libraries.insert(name, parsed);
            }
            None => {
                warn!(
                    library = %name,
                    fields = %elm::top_level_fields(&parsed),
                    "invalid ELM structure, dropping part"
                );
            }
        }
    }

    Ok(libraries)
}

/// Decode one candidate part into `(name, parsed JSON)`.
///
/// Any failure here is soft: log and return `None`.
fn decode_part(index: usize, part: &str) -> Option<(String, Value)> {
    let Some(name) = part_name(part) else {
        warn!(part = index, "no name found in part headers, skipping");
        return None;
    };

    let Some(body_start) = header_end(part) else {
        warn!(
            part = index,
            library = %name,
            preview = %preview_head(part, HEAD_PREVIEW_CHARS),
            "no header terminator found, skipping"
        );
        return None;
    };

    let body = strip_boundary_residue(&part[body_start..]).trim();

    if body.len() < MIN_JSON_LEN {
        warn!(
            library = %name,
            length = body.len(),
            "part body too short to be ELM, skipping"
        );
        return None;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => Some((name.to_string(), parsed)),
        Err(error) => {
            warn!(
                library = %name,
                %error,
                head = %preview_head(body, HEAD_PREVIEW_CHARS),
                tail = %preview_tail(body, TAIL_PREVIEW_CHARS),
                "failed to parse part body as JSON, skipping"
            );
            None
        }
    }
}

/// Pull the declared part name out of a `name="..."` header attribute.
fn part_name(part: &str) -> Option<&str> {
    let start = part.find("name=\"")? + "name=\"".len();
    let rest = &part[start..];
    let end = rest.find('"')?;
    if end == 0 {
        return None;
    }
    Some(&rest[..end])
}

/// Find the end of the header block.
///
/// All three separator conventions are searched as literal substrings and
/// the earliest match by position wins, so whichever convention the
/// producer actually used takes effect. Returns the offset just past the
/// separator.
fn header_end(part: &str) -> Option<usize> {
    HEADER_SEPARATORS
        .iter()
        .filter_map(|sep| part.find(sep).map(|at| at + sep.len()))
        .min()
}

/// Strip a trailing boundary-residue fragment from a part body.
///
/// The naive boundary split can leave the next part's opening delimiter
/// attached to this body when the producer varies its trailing marker.
/// The residue shape is `--Boundary_<digits>_<digits>_<digits>` to end of
/// string, optionally preceded by a line break.
fn strip_boundary_residue(body: &str) -> &str {
    const MARKER: &str = "--Boundary_";

    let mut from = 0;
    while let Some(found) = body[from..].find(MARKER) {
        let at = from + found;
        if looks_like_boundary_token(&body[at + MARKER.len()..]) {
            let bytes = body.as_bytes();
            let mut cut = at;
            if cut > 0 && bytes[cut - 1] == b'\n' {
                cut -= 1;
            }
            if cut > 0 && bytes[cut - 1] == b'\r' {
                cut -= 1;
            }
            return &body[..cut];
        }
        from = at + 1;
    }
    body
}

/// True if the text starts with `<digits>_<digits>_<digits>`.
fn looks_like_boundary_token(text: &str) -> bool {
    let mut rest = text;
    for leg in 0..3 {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        rest = &rest[digits..];
        if leg < 2 {
            match rest.strip_prefix('_') {
                Some(after) => rest = after,
                None => return false,
            }
        }
    }
    true
}

/// First `limit` characters of `text`.
fn preview_head(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

/// Last `limit` characters of `text`.
fn preview_tail(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }
    match text.char_indices().nth(count - limit) {
        Some((at, _)) => &text[at..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ELM_FOO: &str = r#"{"library":{"identifier":{"id":"Foo","version":"1.0.0"}}}"#;
    const ELM_HELPERS: &str =
        r#"{"library":{"identifier":{"id":"FHIRHelpers","version":"4.4.0"}}}"#;

    fn part(name: &str, sep: &str, body: &str) -> String {
        format!(
            "\r\nContent-Disposition: form-data; name=\"{}\"{}{}\r\n",
            name, sep, body
        )
    }

    fn two_part_body(boundary: &str) -> String {
        format!(
            "--{b}{foo}--{b}{helpers}--{b}--\r\n",
            b = boundary,
            foo = part("Foo", "\r\n\r\n", ELM_FOO),
            helpers = part("FHIRHelpers", "\r\n\r\n", ELM_HELPERS),
        )
    }

    #[test]
    fn test_boundary_quoted() {
        let boundary =
            resolve_boundary("multipart/form-data; boundary=\"Boundary_123\"").unwrap();
        assert_eq!(boundary, "Boundary_123");
    }

    #[test]
    fn test_boundary_unquoted() {
        let boundary = resolve_boundary("multipart/form-data; boundary=Boundary_123").unwrap();
        assert_eq!(boundary, "Boundary_123");
    }

    #[test]
    fn test_boundary_followed_by_parameter() {
        let boundary =
            resolve_boundary("multipart/form-data; boundary=abc; charset=utf-8").unwrap();
        assert_eq!(boundary, "abc");
    }

    #[test]
    fn test_boundary_missing() {
        let err = resolve_boundary("application/json").unwrap_err();
        assert!(matches!(err, ProcessorError::MissingBoundary { .. }));
    }

    #[test]
    fn test_decodes_every_well_formed_part() {
        let body = two_part_body("Boundary_1_2_3");
        let libraries =
            decode_multipart(&body, "multipart/form-data; boundary=Boundary_1_2_3").unwrap();

        assert_eq!(libraries.len(), 2);
        assert_eq!(
            libraries["Foo"]["library"]["identifier"]["version"],
            json!("1.0.0")
        );
        assert!(libraries.contains_key("FHIRHelpers"));
    }

    #[test]
    fn test_part_order_is_preserved() {
        let body = two_part_body("b");
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        let names: Vec<&str> = libraries.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Foo", "FHIRHelpers"]);
    }

    #[test]
    fn test_lf_only_separator() {
        let body = format!(
            "--b\nContent-Disposition: form-data; name=\"Foo\"\n\n{}\n--b--\n",
            ELM_FOO
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 1);
    }

    #[test]
    fn test_cr_only_separator() {
        let body = format!(
            "--b\rContent-Disposition: form-data; name=\"Foo\"\r\r{}\r--b--",
            ELM_FOO
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 1);
    }

    #[test]
    fn test_earliest_separator_wins() {
        // An LF-LF sequence appears before the CRLF-CRLF one; the body must
        // start after the earlier separator even though CRLF-CRLF has
        // higher tie priority.
        let part = "headers\n\nmore\r\n\r\ntail";
        assert_eq!(header_end(part), Some("headers\n\n".len()));
    }

    #[test]
    fn test_malformed_part_is_skipped_not_fatal() {
        // Three parts: good, missing header terminator, good.
        let body = format!(
            "--b{good}--bContent-Disposition: form-data; name=\"Broken\" no separator here--b{also_good}--b--",
            good = part("Foo", "\r\n\r\n", ELM_FOO),
            also_good = part("FHIRHelpers", "\r\n\r\n", ELM_HELPERS),
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 2);
        assert!(!libraries.contains_key("Broken"));
    }

    #[test]
    fn test_truncated_json_is_skipped() {
        let body = format!(
            "--b{good}--b{broken}--b--",
            good = part("Foo", "\r\n\r\n", ELM_FOO),
            broken = part("Broken", "\r\n\r\n", r#"{"library":{"identifier""#),
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 1);
        assert!(libraries.contains_key("Foo"));
    }

    #[test]
    fn test_sub_threshold_body_is_skipped() {
        let body = format!(
            "--b{short}--b{good}--b--",
            short = part("Tiny", "\r\n\r\n", "{}"),
            good = part("Foo", "\r\n\r\n", ELM_FOO),
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 1);
    }

    #[test]
    fn test_unnamed_part_is_skipped() {
        let body = format!(
            "--bContent-Disposition: form-data\r\n\r\n{}\r\n--b{good}--b--",
            ELM_FOO,
            good = part("Foo", "\r\n\r\n", ELM_FOO),
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 1);
    }

    #[test]
    fn test_invalid_shape_is_dropped() {
        let body = format!(
            "--b{bad}--b{good}--b--",
            bad = part("NotElm", "\r\n\r\n", r#"{"errors":["something went wrong"]}"#),
            good = part("Foo", "\r\n\r\n", ELM_FOO),
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 1);
        assert!(!libraries.contains_key("NotElm"));
    }

    #[test]
    fn test_duplicate_part_names_last_write_wins() {
        // Intentional compatibility behavior: the later payload replaces
        // the earlier one instead of being rejected.
        let second = r#"{"library":{"identifier":{"id":"Foo","version":"2.0.0"}}}"#;
        let body = format!(
            "--b{first}--b{second}--b--",
            first = part("Foo", "\r\n\r\n", ELM_FOO),
            second = part("Foo", "\r\n\r\n", second),
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=b").unwrap();
        assert_eq!(libraries.len(), 1);
        assert_eq!(
            libraries["Foo"]["library"]["identifier"]["version"],
            json!("2.0.0")
        );
    }

    #[test]
    fn test_boundary_residue_is_stripped() {
        let body_with_residue = format!("{}\r\n--Boundary_12_34_56\r\n", ELM_FOO);
        let body = format!(
            "--outer{p}--outer--",
            p = part("Foo", "\r\n\r\n", &body_with_residue)
        );
        let libraries = decode_multipart(&body, "multipart/form-data; boundary=outer").unwrap();
        assert_eq!(libraries.len(), 1);
    }

    #[test]
    fn test_residue_scan_matches_marker_only() {
        assert_eq!(
            strip_boundary_residue("{\"a\":1}\n--Boundary_1_2_3"),
            "{\"a\":1}"
        );
        // Digits missing a leg: not residue, body kept intact.
        let kept = "{\"a\":1}\n--Boundary_12";
        assert_eq!(strip_boundary_residue(kept), kept);
        // Marker inside a JSON string earlier, real residue later.
        let mixed = "{\"note\":\"--Boundary_x\"}\r\n--Boundary_9_9_9 trailing";
        assert_eq!(strip_boundary_residue(mixed), "{\"note\":\"--Boundary_x\"}");
    }

    #[test]
    fn test_previews_are_bounded() {
        let long = "x".repeat(500);
        assert_eq!(preview_head(&long, 200).len(), 200);
        assert_eq!(preview_tail(&long, 100).len(), 100);
        assert_eq!(preview_head("short", 200), "short");
        assert_eq!(preview_tail("short", 100), "short");
    }
}
