//! Link resolution (component E).
//!
//! Four indexes, built once per run over every successfully parsed (non-duplicate) file, are
//! consulted in a fixed priority cascade per spec §4.E: exact path, path relative to the
//! linking file, unique basename, then normalized basename. The first strategy to produce a
//! match wins; ambiguous basename/normalized-basename hits are broken by preferring a
//! candidate in the same directory as the source, else the first-registered candidate.

use std::collections::HashMap;
use std::path::Path;

use path_clean::PathClean;

/// Index of known nodes, built once per parse run and queried once per link.
pub struct ResolverIndex {
    /// vault-relative path with `.md` stripped -> node id.
    path_to_id: HashMap<String, String>,
    /// node id -> vault-relative path (with extension).
    id_to_path: HashMap<String, String>,
    /// file stem (case-sensitive, no extension) -> ids, in registration order.
    basename_to_ids: HashMap<String, Vec<String>>,
    /// `normalize(file stem)` -> ids, in registration order.
    normalized_to_ids: HashMap<String, Vec<String>>,
    /// node id -> the directory component of its path (empty string for vault-root files).
    dir_of_id: HashMap<String, String>,
}

impl ResolverIndex {
    /// Build an index over `files`, given as `(node_id, relative_path)` pairs. Iteration order
    /// is significant: it is the tie-break ("first registered") for ambiguous basename lookups.
    pub fn build<'a, I>(files: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut path_to_id = HashMap::new();
        let mut id_to_path = HashMap::new();
        let mut basename_to_ids: HashMap<String, Vec<String>> = HashMap::new();
        let mut normalized_to_ids: HashMap<String, Vec<String>> = HashMap::new();
        let mut dir_of_id = HashMap::new();

        for (id, relative_path) in files {
            path_to_id.insert(strip_md(relative_path), id.to_string());
            id_to_path.insert(id.to_string(), relative_path.to_string());
            dir_of_id.insert(id.to_string(), dirname(relative_path));

            let stem = file_stem(relative_path);
            basename_to_ids
                .entry(stem.to_string())
                .or_default()
                .push(id.to_string());
            normalized_to_ids
                .entry(normalize(stem))
                .or_default()
                .push(id.to_string());
        }

        ResolverIndex {
            path_to_id,
            id_to_path,
            basename_to_ids,
            normalized_to_ids,
            dir_of_id,
        }
    }

    pub fn id_to_path(&self, id: &str) -> Option<&str> {
        self.id_to_path.get(id).map(String::as_str)
    }

    /// Resolve a raw link `target` (as written in `[[target]]`, the text before any
    /// `#section`/`|alias`), considered relative to the file at `source_path`.
    ///
    /// Returns `(id, true)` on success, `("", false)` on failure, mirroring the spec's
    /// `ResolveLink` contract.
    pub fn resolve(&self, source_path: &str, target: &str) -> (String, bool) {
        if target.trim().is_empty() {
            return (String::new(), false);
        }

        // 1. Exact path.
        if let Some(id) = self.path_to_id.get(target) {
            return (id.clone(), true);
        }
        let stripped = strip_md(target);
        if let Some(id) = self.path_to_id.get(&stripped) {
            return (id.clone(), true);
        }

        // 2. Relative to source.
        let joined = clean_relative_link(source_path, &stripped);
        if let Some(id) = self.path_to_id.get(&joined) {
            return (id.clone(), true);
        }

        let source_dir = dirname(source_path);
        let target_base = file_stem(target);

        // 3. Basename.
        if let Some(id) = self.pick(self.basename_to_ids.get(target_base), &source_dir) {
            return (id, true);
        }

        // 4. Normalized basename.
        let normalized = normalize(target_base);
        if let Some(id) = self.pick(self.normalized_to_ids.get(&normalized), &source_dir) {
            return (id, true);
        }

        (String::new(), false)
    }

    /// Among `candidates`, prefer one whose directory equals `source_dir`; otherwise the first
    /// registered candidate. `None` if there are no candidates at all.
    fn pick(&self, candidates: Option<&Vec<String>>, source_dir: &str) -> Option<String> {
        let candidates = candidates?;
        candidates
            .iter()
            .find(|id| self.dir_of_id.get(id.as_str()).map(String::as_str) == Some(source_dir))
            .or_else(|| candidates.first())
            .cloned()
    }
}

/// Normalize a basename for loose matching per spec §4.E: lowercase; strip a leading `~` or
/// `+`; replace `-`/`_` with spaces; collapse whitespace runs. Idempotent.
pub fn normalize(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    let stripped = lower
        .strip_prefix('~')
        .or_else(|| lower.strip_prefix('+'))
        .unwrap_or(&lower);
    let spaced: String = stripped
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_md(path: &str) -> String {
    path.strip_suffix(".md").unwrap_or(path).to_string()
}

fn dirname(path: &str) -> String {
    match Path::new(path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().replace('\\', "/"),
        _ => String::new(),
    }
}

fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

/// Clean a relative link `target` (already stripped of any `.md`) against the directory
/// containing `source_path`.
fn clean_relative_link(source_path: &str, target: &str) -> String {
    let source_dir = Path::new(source_path)
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let joined = source_dir.join(target);
    joined.clean().to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<(String, String)> {
        vec![
            ("note-a".to_string(), "a.md".to_string()),
            ("note-b".to_string(), "folder/b.md".to_string()),
            ("note-c".to_string(), "folder/sub/c.md".to_string()),
        ]
    }

    fn index(files: &[(String, String)]) -> ResolverIndex {
        ResolverIndex::build(files.iter().map(|(id, p)| (id.as_str(), p.as_str())))
    }

    #[test]
    fn resolves_by_exact_path() {
        let idx = index(&files());
        assert_eq!(idx.resolve("x.md", "folder/b.md"), ("note-b".to_string(), true));
        assert_eq!(idx.resolve("x.md", "folder/b"), ("note-b".to_string(), true));
    }

    #[test]
    fn resolves_relative_to_source() {
        let idx = index(&files());
        assert_eq!(
            idx.resolve("folder/sub/c.md", "../b"),
            ("note-b".to_string(), true)
        );
    }

    #[test]
    fn resolves_by_unique_basename() {
        let idx = index(&files());
        assert_eq!(idx.resolve("x.md", "c"), ("note-c".to_string(), true));
    }

    #[test]
    fn resolves_by_normalized_basename() {
        let files = vec![("note".to_string(), "folder/My Note.md".to_string())];
        let idx = index(&files);
        assert_eq!(
            idx.resolve("x.md", "my_note"),
            ("note".to_string(), true)
        );
        assert_eq!(
            idx.resolve("x.md", "~My-Note"),
            ("note".to_string(), true)
        );
    }

    #[test]
    fn ambiguous_basename_prefers_same_directory_as_source() {
        let files = vec![
            ("root-note".to_string(), "note.md".to_string()),
            ("sub-note".to_string(), "folder/note.md".to_string()),
        ];
        let idx = index(&files);
        assert_eq!(
            idx.resolve("folder/other.md", "note"),
            ("sub-note".to_string(), true)
        );
        assert_eq!(idx.resolve("top.md", "note"), ("root-note".to_string(), true));
    }

    #[test]
    fn ambiguous_basename_falls_back_to_first_registered() {
        let files = vec![
            ("first".to_string(), "a/note.md".to_string()),
            ("second".to_string(), "b/note.md".to_string()),
        ];
        let idx = index(&files);
        // source dir "c" matches neither candidate's directory.
        assert_eq!(idx.resolve("c/other.md", "note"), ("first".to_string(), true));
    }

    #[test]
    fn empty_target_does_not_resolve() {
        let idx = index(&files());
        assert_eq!(idx.resolve("x.md", ""), (String::new(), false));
        assert_eq!(idx.resolve("x.md", "   "), (String::new(), false));
    }

    #[test]
    fn unmatched_target_returns_unresolved() {
        let idx = index(&files());
        assert_eq!(idx.resolve("x.md", "nonexistent"), (String::new(), false));
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("~My--Cool_Note");
        assert_eq!(normalize(&once), once);
    }
}
