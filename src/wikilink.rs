//! Wikilink extraction (component B).
//!
//! Implemented as a small hand-written scanner rather than a single regex: the spec requires
//! nested single square brackets inside a link's content to be tolerated (`[[a [b] c]]`), which
//! needs bracket-depth tracking a regex's fixed character classes can't express without
//! swallowing or rejecting the match outright.

/// `wikilink` for a plain `[[...]]` reference, `embed` for a `![[...]]` inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Wikilink,
    Embed,
}

/// One `[[wikilink]]` or `![[embed]]` occurrence found in a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    /// The full matched text, e.g. `"[[Target#Intro|Intro]]"`.
    pub raw_text: String,
    /// The raw target text before `#section`/`|alias`, e.g. `"Some Note"` in `[[Some Note#Intro|Intro]]`.
    pub target: String,
    /// The `#section` fragment, if present.
    pub section: Option<String>,
    /// The `|alias` display text, if present.
    pub alias: Option<String>,
    /// `true` for `![[...]]` embeds, `false` for plain `[[...]]` links.
    pub is_embed: bool,
    /// Byte offset of the match's start within the body text it was extracted from.
    pub position: usize,
}

impl WikiLink {
    /// [`LinkType::Embed`] or [`LinkType::Wikilink`], matching [`Self::is_embed`].
    pub fn link_type(&self) -> LinkType {
        if self.is_embed {
            LinkType::Embed
        } else {
            LinkType::Wikilink
        }
    }
    /// The text to display for this link: the alias if present, else the target plus a
    /// `#section` suffix if one was given (or just the section, for a section-only self link
    /// with an empty target).
    pub fn display_text(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.section {
            Some(section) if self.target.is_empty() => format!("#{section}"),
            Some(section) => format!("{}#{section}", self.target),
            None => self.target.clone(),
        }
    }

    /// `true` when this link has no resolvable target of its own (a bare `#section` or
    /// completely empty `[[]]`), per the spec's "empty-link" edge case.
    pub fn is_empty_target(&self) -> bool {
        self.target.trim().is_empty()
    }
}

/// Extract every wiki link and embed occurrence from `body`, in document order.
///
/// Scans char-by-char (tracking positions by char index, translated to byte offsets only at
/// slice boundaries we've proven are char boundaries) rather than slicing at arbitrary byte
/// offsets, so multi-byte body text can't trip a boundary panic.
pub fn extract_links(body: &str) -> Vec<WikiLink> {
    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let n = chars.len();
    let mut links = Vec::new();
    let mut k = 0usize;

    while k < n {
        let is_embed = chars[k].1 == '!' && k + 2 < n && chars[k + 1].1 == '[' && chars[k + 2].1 == '[';
        let bracket_k = if is_embed { k + 1 } else { k };
        let has_open = bracket_k + 1 < n && chars[bracket_k].1 == '[' && chars[bracket_k + 1].1 == '[';
        if !has_open {
            k += 1;
            continue;
        }

        let content_start_k = bracket_k + 2;
        match find_closing_fence(&chars, content_start_k) {
            Some((content_end_k, after_k)) => {
                let start_byte = chars[k].0;
                let content_start_byte = byte_at(&chars, content_start_k, body.len());
                let content_end_byte = byte_at(&chars, content_end_k, body.len());
                let after_byte = byte_at(&chars, after_k, body.len());

                let content = &body[content_start_byte..content_end_byte];
                let (target, section, alias) = split_content(content);

                links.push(WikiLink {
                    raw_text: body[start_byte..after_byte].to_string(),
                    target: target.trim().to_string(),
                    section: section.map(|s| s.trim().to_string()),
                    alias: alias.map(|s| s.trim().to_string()),
                    is_embed,
                    position: start_byte,
                });
                k = after_k;
            }
            None => k += 1,
        }
    }

    links
}

fn byte_at(chars: &[(usize, char)], k: usize, body_len: usize) -> usize {
    chars.get(k).map(|(byte, _)| *byte).unwrap_or(body_len)
}

/// Find the closing `]]` for a link whose content begins at char index `start_k`, tracking
/// bracket depth so a nested `[[...]]` run inside the content doesn't close the outer link
/// early, while a lone `[` or `]` is just ordinary content (spec: nested brackets are allowed).
///
/// Returns `(content_end_k, after_k)`: the char index the content ends at, and the char index
/// just past the closing `]]`.
fn find_closing_fence(chars: &[(usize, char)], start_k: usize) -> Option<(usize, usize)> {
    let n = chars.len();
    let mut depth = 1i32;
    let mut j = start_k;

    while j < n {
        if chars[j].1 == '[' && j + 1 < n && chars[j + 1].1 == '[' {
            depth += 1;
            j += 2;
            continue;
        }
        if chars[j].1 == ']' && j + 1 < n && chars[j + 1].1 == ']' {
            depth -= 1;
            if depth == 0 {
                return Some((j, j + 2));
            }
            j += 2;
            continue;
        }
        j += 1;
    }
    None
}

/// Split a link's content into `(target, section, alias)` on the first `#` and first
/// subsequent `|`, mirroring `[[TARGET#SECTION|DISPLAY]]` field order.
fn split_content(content: &str) -> (&str, Option<&str>, Option<&str>) {
    match content.find('#') {
        Some(hash_idx) => {
            let target = &content[..hash_idx];
            let rest = &content[hash_idx + '#'.len_utf8()..];
            match rest.find('|') {
                Some(pipe_idx) => (target, Some(&rest[..pipe_idx]), Some(&rest[pipe_idx + 1..])),
                None => (target, Some(rest), None),
            }
        }
        None => match content.find('|') {
            Some(pipe_idx) => (&content[..pipe_idx], None, Some(&content[pipe_idx + 1..])),
            None => (content, None, None),
        },
    }
}

/// The unique, non-empty targets referenced by `links`, in first-seen order.
pub fn unique_targets(links: &[WikiLink]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    links
        .iter()
        .filter(|l| !l.is_empty_target())
        .map(|l| l.target.clone())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// `links` restricted to the given [`LinkType`], preserving document order.
pub fn filter_by_type(links: &[WikiLink], link_type: LinkType) -> Vec<&WikiLink> {
    links.iter().filter(|l| l.link_type() == link_type).collect()
}

/// Normalize a link target (or filename stem) for loose matching: lowercase, trim, and collapse
/// internal whitespace. Idempotent: `normalize_target(normalize_target(s)) == normalize_target(s)`.
pub fn normalize_target(target: &str) -> String {
    target
        .trim()
        .to_ascii_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_link() {
        let links = extract_links("See [[Target Note]] for more.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Target Note");
        assert!(links[0].section.is_none());
        assert!(links[0].alias.is_none());
        assert!(!links[0].is_embed);
    }

    #[test]
    fn link_with_section_and_alias() {
        let links = extract_links("[[Target#Intro|See Intro]]");
        assert_eq!(links[0].target, "Target");
        assert_eq!(links[0].section.as_deref(), Some("Intro"));
        assert_eq!(links[0].alias.as_deref(), Some("See Intro"));
    }

    #[test]
    fn embed_is_flagged() {
        let links = extract_links("![[image.png]]");
        assert!(links[0].is_embed);
        assert_eq!(links[0].target, "image.png");
    }

    #[test]
    fn section_only_self_link() {
        let links = extract_links("[[#Some Heading]]");
        assert!(links[0].is_empty_target());
        assert_eq!(links[0].section.as_deref(), Some("Some Heading"));
        assert_eq!(links[0].display_text(), "#Some Heading");
    }

    #[test]
    fn target_with_section_and_no_alias_keeps_section_marker() {
        let links = extract_links("[[Target#Intro]]");
        assert_eq!(links[0].target, "Target");
        assert_eq!(links[0].section.as_deref(), Some("Intro"));
        assert!(links[0].alias.is_none());
        assert_eq!(links[0].display_text(), "Target#Intro");
    }

    #[test]
    fn empty_link_is_ignored_gracefully() {
        let links = extract_links("[[]]");
        assert_eq!(links.len(), 1);
        assert!(links[0].is_empty_target());
        assert!(links[0].section.is_none());
    }

    #[test]
    fn multiple_links_in_one_line() {
        let links = extract_links("[[A]] and [[B]] and [[C|alias]]");
        assert_eq!(links.len(), 3);
        assert_eq!(links[2].display_text(), "alias");
    }

    #[test]
    fn nested_brackets_do_not_confuse_matching() {
        // A malformed nested link shouldn't swallow the following valid one.
        let links = extract_links("[[outer [[inner]] ]] then [[real]]");
        assert!(links.iter().any(|l| l.target == "real"));
    }

    #[test]
    fn nested_single_brackets_are_allowed_in_target() {
        let links = extract_links("[[a [b] c]]");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "a [b] c");
    }

    #[test]
    fn whitespace_around_fields_is_trimmed() {
        let links = extract_links("[[ Target  |  Alias  ]]");
        assert_eq!(links[0].target, "Target");
        assert_eq!(links[0].alias.as_deref(), Some("Alias"));
    }

    #[test]
    fn position_is_the_byte_offset_of_the_match() {
        let links = extract_links("abc [[Target]]");
        assert_eq!(links[0].position, 4);
    }

    #[test]
    fn position_is_a_byte_offset_even_with_multibyte_text_before_it() {
        let links = extract_links("caf\u{e9} [[Target]]");
        assert_eq!(links[0].position, "caf\u{e9} ".len());
    }

    #[test]
    fn unique_targets_dedupes_preserving_order() {
        let links = extract_links("[[B]] [[A]] [[B]] [[#section-only]]");
        assert_eq!(unique_targets(&links), vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn filter_by_type_separates_embeds_from_links() {
        let links = extract_links("[[A]] ![[B.png]]");
        assert_eq!(filter_by_type(&links, LinkType::Wikilink).len(), 1);
        assert_eq!(filter_by_type(&links, LinkType::Embed).len(), 1);
    }

    #[test]
    fn normalize_target_is_idempotent() {
        let raw = "  Some   Note  ";
        let once = normalize_target(raw);
        assert_eq!(once, "some note");
        assert_eq!(normalize_target(&once), once);
    }
}
