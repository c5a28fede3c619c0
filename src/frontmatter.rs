//! Frontmatter parsing (component A).
//!
//! Splits a document into an optional YAML header and its body, the way every other stage of
//! the pipeline expects: `---`-fenced block at the very top, or no header at all.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use crate::error::VaultError;

const FENCE: &str = "---";

/// The parsed frontmatter of one document.
///
/// `raw` retains every key the document declared, including `id`/`tags`/`related`/`references`
/// themselves, so round-tripping and display code doesn't need two separate sources of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    pub id: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub related: Vec<String>,
    pub references: Vec<String>,
    pub raw: BTreeMap<String, YamlValue>,
}

impl Frontmatter {
    /// Case-insensitive tag membership check.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// A raw field as a string, if present and string-typed (numbers are not coerced here —
    /// only the `id` field gets that treatment, per spec).
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.raw.get(key) {
            Some(YamlValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// A raw field as a sequence of strings, filtering out any non-string elements rather than
    /// failing the whole lookup.
    pub fn get_string_seq(&self, key: &str) -> Option<Vec<String>> {
        match self.raw.get(key) {
            Some(YamlValue::Sequence(seq)) => Some(
                seq.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }
}

fn yaml_string_seq(value: Option<&YamlValue>) -> Result<Vec<String>, VaultError> {
    match value {
        None | Some(YamlValue::Null) => Ok(Vec::new()),
        Some(YamlValue::Sequence(seq)) => Ok(seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(YamlValue::String(_)) => Err(VaultError::InvalidHeader(
            "expected a sequence of strings, found a single scalar string".to_string(),
        )),
        Some(other) => Err(VaultError::InvalidHeader(format!(
            "expected a sequence of strings, found {other:?}"
        ))),
    }
}

fn yaml_id(value: Option<&YamlValue>) -> Result<String, VaultError> {
    match value {
        Some(YamlValue::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(YamlValue::Number(n)) => Ok(n.to_string()),
        _ => Err(VaultError::MissingId),
    }
}

/// Split `text` into an optional header and a body.
///
/// Returns `(None, text)` unchanged when the document doesn't open with a `---` fence. When it
/// does, the header is parsed as YAML and must declare a non-empty `id` or this fails with
/// [`VaultError::MissingId`]. A malformed YAML block fails with [`VaultError::InvalidHeader`].
pub fn parse_frontmatter(text: &str) -> Result<(Option<Frontmatter>, String), VaultError> {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return Ok((None, text.to_string()));
    };
    // Accept `---` followed immediately by a newline (or EOF for an empty vault file).
    let rest = match rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) {
        Some(r) => r,
        None if rest.is_empty() => rest,
        None => return Ok((None, text.to_string())),
    };

    let Some(end_idx) = find_closing_fence(rest) else {
        return Ok((None, text.to_string()));
    };

    let header_text = &rest[..end_idx];
    let body_start = end_idx + closing_fence_len(rest, end_idx);
    let body = rest[body_start..].to_string();

    let raw: BTreeMap<String, YamlValue> = if header_text.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_yaml::from_str(header_text)?
    };

    let id = yaml_id(raw.get("id"))?;
    let title = raw.get("title").and_then(|v| v.as_str()).map(str::to_string);
    let tags = yaml_string_seq(raw.get("tags"))?;
    let related = yaml_string_seq(raw.get("related"))?;
    let references = yaml_string_seq(raw.get("references"))?;

    Ok((
        Some(Frontmatter {
            id,
            title,
            tags,
            related,
            references,
            raw,
        }),
        body,
    ))
}

/// Find the byte offset (within `rest`, the text after the opening fence) of the line
/// consisting solely of `---` that closes the header block.
fn find_closing_fence(rest: &str) -> Option<usize> {
    let mut offset = 0usize;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == FENCE {
            return Some(offset);
        }
        offset += line.len();
    }
    // Final line with no trailing newline.
    if rest[offset..].trim_end_matches('\r') == FENCE {
        return Some(offset);
    }
    None
}

fn closing_fence_len(rest: &str, end_idx: usize) -> usize {
    let tail = &rest[end_idx..];
    if let Some(stripped) = tail.strip_prefix(FENCE) {
        FENCE.len()
            + stripped
                .find('\n')
                .map(|i| i + 1)
                .unwrap_or(stripped.len())
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_fence_returns_whole_text_as_body() {
        let (header, body) = parse_frontmatter("# Just a heading\n\nSome text.").unwrap();
        assert!(header.is_none());
        assert_eq!(body, "# Just a heading\n\nSome text.");
    }

    #[test]
    fn basic_header_with_id() {
        let text = "---\nid: foo\ntitle: Foo\ntags:\n  - a\n  - b\n---\nBody text\n";
        let (header, body) = parse_frontmatter(text).unwrap();
        let header = header.unwrap();
        assert_eq!(header.id, "foo");
        assert_eq!(header.title.as_deref(), Some("Foo"));
        assert_eq!(header.tags, vec!["a", "b"]);
        assert_eq!(body, "Body text\n");
    }

    #[test]
    fn numeric_id_is_coerced_to_string() {
        let text = "---\nid: 42\n---\nBody\n";
        let (header, _) = parse_frontmatter(text).unwrap();
        assert_eq!(header.unwrap().id, "42");
    }

    #[test]
    fn missing_id_fails() {
        let text = "---\ntitle: No Id\n---\nBody\n";
        let err = parse_frontmatter(text).unwrap_err();
        assert!(matches!(err, VaultError::MissingId));
    }

    #[test]
    fn empty_id_fails() {
        let text = "---\nid: \"\"\n---\nBody\n";
        let err = parse_frontmatter(text).unwrap_err();
        assert!(matches!(err, VaultError::MissingId));
    }

    #[test]
    fn scalar_tags_fail() {
        let text = "---\nid: foo\ntags: not-a-list\n---\nBody\n";
        let err = parse_frontmatter(text).unwrap_err();
        assert!(matches!(err, VaultError::InvalidHeader(_)));
    }

    #[test]
    fn mixed_type_sequence_filters_non_strings() {
        let text = "---\nid: foo\ntags:\n  - a\n  - 5\n  - b\n---\nBody\n";
        let (header, _) = parse_frontmatter(text).unwrap();
        assert_eq!(header.unwrap().tags, vec!["a", "b"]);
    }

    #[test]
    fn has_tag_is_case_insensitive() {
        let text = "---\nid: foo\ntags:\n  - Project\n---\nBody\n";
        let (header, _) = parse_frontmatter(text).unwrap();
        assert!(header.unwrap().has_tag("project"));
    }

    #[test]
    fn invalid_yaml_fails() {
        let text = "---\nid: [unterminated\n---\nBody\n";
        let err = parse_frontmatter(text).unwrap_err();
        assert!(matches!(err, VaultError::InvalidHeader(_)));
    }
}
