//! Node classification (component F).
//!
//! Config-driven rule dispatch: each [`ClassificationRule`] is compiled once, at construction
//! time, into a [`CompiledRule`] so matching a rule against a file never re-parses a regex or
//! re-lowercases a string it already lowercased for the last file.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::NodeClassificationConfig;
use crate::error::VaultError;
use crate::fileproc::ParsedFile;

/// One entry in `graph.node_classification.classification_rules`.
///
/// `kind` and `matcher` are deserialized as separate scalar fields rather than an internally
/// tagged enum so config authors can write plain TOML/YAML without a nested table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub name: String,
    pub kind: RuleKind,
    pub matcher: String,
    pub node_type: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Tag,
    FilenamePrefix,
    FilenameSuffix,
    FilenameMatch,
    PathContains,
    Regex,
}

/// Validation failure for one rule, or for the rule set as a whole.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("rule '{0}': duplicate rule name")]
    DuplicateRuleName(String),
    #[error("rule '{0}': matcher must not be empty")]
    NilMatcher(String),
    #[error("rule '{0}': node_type must not be empty")]
    EmptyNodeType(String),
    #[error("rule '{0}': priority must not be negative")]
    NegativePriority(String),
    #[error("rule '{0}': node_type '{1}' is not declared in node_types")]
    UndefinedNodeType(String, String),
    #[error("rule '{0}': invalid regex matcher: {1}")]
    InvalidRegex(String, String),
    #[error("priority must be in the range 1..=100")]
    InvalidPriority,
    #[error("node type '{0}': size_multiplier must be positive")]
    InvalidSizeMultiplier(String),
    #[error("node type '{0}': display_name must not be empty")]
    MissingDisplayName(String),
    #[error("node type name must not be empty")]
    EmptyNodeTypeName,
}

impl From<RuleError> for VaultError {
    fn from(err: RuleError) -> Self {
        VaultError::InvalidConfig(err.to_string())
    }
}

/// A rule whose matcher has already been compiled/normalized.
#[derive(Debug, Clone)]
enum CompiledMatcher {
    Tag(String),
    FilenamePrefix(String),
    FilenameSuffix(String),
    FilenameMatch(String),
    PathContains(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    matcher: CompiledMatcher,
    node_type: String,
    priority: i32,
}

/// The compiled, priority-sorted rule set, ready to classify parsed files.
#[derive(Debug, Clone)]
pub struct Classifier {
    default_node_type: String,
    rules: Vec<CompiledRule>,
}

impl Classifier {
    /// Validate and compile `config` into a [`Classifier`].
    ///
    /// Validation order matches the spec's listed failure modes: node type declarations are
    /// checked first, then each rule, then cross-rule uniqueness.
    pub fn new(config: &NodeClassificationConfig) -> Result<Self, VaultError> {
        if config.default_node_type.trim().is_empty() {
            return Err(RuleError::EmptyNodeTypeName.into());
        }

        for (name, def) in &config.node_types {
            if name.trim().is_empty() {
                return Err(RuleError::EmptyNodeTypeName.into());
            }
            if def.display_name.trim().is_empty() {
                return Err(RuleError::MissingDisplayName(name.clone()).into());
            }
            if def.size_multiplier <= 0.0 {
                return Err(RuleError::InvalidSizeMultiplier(name.clone()).into());
            }
        }

        let mut seen_names = std::collections::HashSet::new();
        let mut rules = Vec::with_capacity(config.classification_rules.len());

        for rule in &config.classification_rules {
            if !seen_names.insert(rule.name.clone()) {
                return Err(RuleError::DuplicateRuleName(rule.name.clone()).into());
            }
            if rule.matcher.trim().is_empty() {
                return Err(RuleError::NilMatcher(rule.name.clone()).into());
            }
            if rule.node_type.trim().is_empty() {
                return Err(RuleError::EmptyNodeType(rule.name.clone()).into());
            }
            if rule.priority < 0 {
                return Err(RuleError::NegativePriority(rule.name.clone()).into());
            }
            if !(1..=100).contains(&rule.priority) {
                return Err(RuleError::InvalidPriority.into());
            }
            if !config.node_types.contains_key(&rule.node_type)
                && rule.node_type != config.default_node_type
            {
                return Err(RuleError::UndefinedNodeType(
                    rule.name.clone(),
                    rule.node_type.clone(),
                )
                .into());
            }

            let matcher = match rule.kind {
                RuleKind::Tag => CompiledMatcher::Tag(rule.matcher.to_ascii_lowercase()),
                RuleKind::FilenamePrefix => {
                    CompiledMatcher::FilenamePrefix(rule.matcher.to_ascii_lowercase())
                }
                RuleKind::FilenameSuffix => {
                    // stripped of a trailing `.md` so e.g. matcher "-draft" matches "foo-draft.md"
                    CompiledMatcher::FilenameSuffix(
                        rule.matcher
                            .trim_end_matches(".md")
                            .to_ascii_lowercase(),
                    )
                }
                RuleKind::FilenameMatch => {
                    CompiledMatcher::FilenameMatch(rule.matcher.to_ascii_lowercase())
                }
                RuleKind::PathContains => {
                    CompiledMatcher::PathContains(rule.matcher.to_ascii_lowercase())
                }
                RuleKind::Regex => {
                    let re = Regex::new(&format!("(?i){}", rule.matcher)).map_err(|e| {
                        RuleError::InvalidRegex(rule.name.clone(), e.to_string())
                    })?;
                    CompiledMatcher::Regex(re)
                }
            };

            rules.push(CompiledRule {
                name: rule.name.clone(),
                matcher,
                node_type: rule.node_type.clone(),
                priority: rule.priority,
            });
        }

        // Lower priority number wins; ties keep declaration order (stable sort).
        rules.sort_by(|a, b| a.priority.cmp(&b.priority));

        Ok(Classifier {
            default_node_type: config.default_node_type.clone(),
            rules,
        })
    }

    /// Classify one parsed file, returning the node type of the first matching rule (in
    /// ascending-priority order) or the configured default when nothing matches. A file whose
    /// path fails validation never reaches rule matching; it always gets the default type.
    pub fn classify(&self, file: &ParsedFile) -> String {
        if path_fails_validation(&file.relative_path) {
            return self.default_node_type.clone();
        }
        for rule in &self.rules {
            if self.rule_matches(rule, file) {
                return rule.node_type.clone();
            }
        }
        self.default_node_type.clone()
    }

    /// The name of the first matching rule, if any, for diagnostic/explain purposes. Always
    /// `None` for a file whose path fails validation, since no rule is ever consulted for one.
    pub fn matching_rule_name(&self, file: &ParsedFile) -> Option<&str> {
        if path_fails_validation(&file.relative_path) {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| self.rule_matches(rule, file))
            .map(|rule| rule.name.as_str())
    }

    fn rule_matches(&self, rule: &CompiledRule, file: &ParsedFile) -> bool {
        match &rule.matcher {
            CompiledMatcher::Tag(tag) => file
                .frontmatter
                .as_ref()
                .map(|fm| fm.has_tag(tag))
                .unwrap_or(false),
            CompiledMatcher::FilenamePrefix(prefix) => {
                basename(file).to_ascii_lowercase().starts_with(prefix.as_str())
            }
            CompiledMatcher::FilenameSuffix(suffix) => {
                file.file_stem().to_ascii_lowercase().ends_with(suffix.as_str())
            }
            CompiledMatcher::FilenameMatch(exact) => {
                basename(file).to_ascii_lowercase() == *exact
            }
            CompiledMatcher::PathContains(needle) => file
                .relative_path
                .to_ascii_lowercase()
                .split('/')
                .any(|segment| segment == needle.as_str()),
            CompiledMatcher::Regex(re) => re.is_match(basename(file)),
        }
    }
}

/// The file's basename including extension, e.g. `"notes/foo.md"` -> `"foo.md"`.
fn basename(file: &ParsedFile) -> &str {
    std::path::Path::new(&file.relative_path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(&file.relative_path)
}

/// A `relative_path` an ingestion run should never trust: absolute, escaping its root via `..`,
/// carrying a Windows-style separator, embedding a null byte, or unreasonably long.
fn path_fails_validation(path: &str) -> bool {
    std::path::Path::new(path).is_absolute()
        || path.split('/').any(|segment| segment == "..")
        || path.contains('\\')
        || path.contains('\0')
        || path.len() > 500
}
