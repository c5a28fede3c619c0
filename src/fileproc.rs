//! Markdown file processing (component C).
//!
//! Turns raw file bytes into a [`ParsedFile`]: frontmatter split off, wiki links extracted from
//! the body, and the bits of path bookkeeping the classifier and resolver both need.

use std::path::Path;

use time::OffsetDateTime;

use crate::error::VaultError;
use crate::frontmatter::{self, Frontmatter};
use crate::wikilink::{self, WikiLink};

/// One markdown file, fully parsed but not yet resolved against the rest of the vault.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    /// Path relative to the vault root, forward-slash separated.
    pub relative_path: String,
    pub frontmatter: Option<Frontmatter>,
    pub body: String,
    pub links: Vec<WikiLink>,
    /// Filesystem modification time, when the caller had one to offer. `created_at`/`updated_at`
    /// both fall back to this (the underlying fs commonly lacks a birth-time distinct from
    /// mtime); `None` when parsing from a bare byte stream with no backing file, in which case
    /// the graph builder falls back to wall-clock time (spec §4.C).
    pub modified: Option<OffsetDateTime>,
}

impl ParsedFile {
    /// Parse `contents` (already read from disk) as the file at `relative_path`.
    pub fn parse(relative_path: String, contents: &str) -> Result<Self, VaultError> {
        let (frontmatter, body) = frontmatter::parse_frontmatter(contents)?;
        let links = wikilink::extract_links(&body);
        Ok(ParsedFile {
            relative_path,
            frontmatter,
            body,
            links,
            modified: None,
        })
    }

    /// Attach the filesystem modification time the caller read alongside `contents`.
    pub fn with_modified(mut self, modified: OffsetDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// The node id for this file, supplied by its frontmatter. `None` when the file has no
    /// frontmatter header at all — such files are never graph nodes (spec §4.G: "missing id ->
    /// increment files_skipped, continue").
    pub fn node_id(&self) -> Option<&str> {
        self.frontmatter.as_ref().map(|fm| fm.id.as_str())
    }

    /// Display title: frontmatter `title`, else the file stem.
    pub fn title(&self) -> String {
        match &self.frontmatter {
            Some(fm) if fm.title.is_some() => fm.title.clone().unwrap(),
            _ => self.file_stem().to_string(),
        }
    }

    /// The filename without its extension, e.g. `"notes/foo.md"` -> `"foo"`.
    pub fn file_stem(&self) -> &str {
        Path::new(&self.relative_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.relative_path)
    }

    /// Tags declared in frontmatter, or empty if there is none.
    pub fn tags(&self) -> &[String] {
        self.frontmatter
            .as_ref()
            .map(|fm| fm.tags.as_slice())
            .unwrap_or(&[])
    }

    #[cfg(test)]
    pub fn for_test(relative_path: &str, tags: Vec<String>) -> Self {
        let frontmatter = if tags.is_empty() {
            None
        } else {
            Some(Frontmatter {
                id: relative_path.to_string(),
                title: None,
                tags,
                related: Vec::new(),
                references: Vec::new(),
                raw: Default::default(),
            })
        };
        ParsedFile {
            relative_path: relative_path.to_string(),
            frontmatter,
            body: String::new(),
            links: Vec::new(),
            modified: None,
        }
    }
}
