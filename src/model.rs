//! Entity definitions for the persisted graph (component K).
//!
//! These types mirror the DDL in `db::schema` field for field. `Node`/`Edge` are the two
//! tables cleared and repopulated by every ingestion run; `NodePosition`, `VaultMetadata`, and
//! `ParseHistory` are the tables that survive (or audit) a run without being part of the
//! replaced graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use uuid::Uuid;

/// One markdown file, represented as a graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Node {
    pub id: String,
    pub title: String,
    pub node_type: String,
    pub tags: Vec<String>,
    pub content: String,
    #[sqlx(json)]
    pub metadata: BTreeMap<String, JsonValue>,
    pub file_path: String,
    pub in_degree: i32,
    pub out_degree: i32,
    pub centrality: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// The kind of cross-reference a wiki link represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Wikilink,
    Embed,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Wikilink => "wikilink",
            EdgeType::Embed => "embed",
        }
    }
}

impl std::str::FromStr for EdgeType {
    type Err = crate::error::VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wikilink" => Ok(EdgeType::Wikilink),
            "embed" => Ok(EdgeType::Embed),
            other => Err(crate::error::VaultError::Serialization(format!(
                "unknown edge_type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed link between two nodes, derived from one wiki link occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub display_text: String,
    pub weight: f64,
    pub created_at: OffsetDateTime,
}

/// Hand-placed visual position for a node, orthogonal to graph content.
///
/// No foreign key to `nodes.id` by design (see spec invariant 4): a position may outlive the
/// node it refers to across a replace, and re-associates automatically when a node with the
/// same `id` reappears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodePosition {
    pub node_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub locked: bool,
    pub updated_at: OffsetDateTime,
}

/// A small persistent key/value store. The core only ever writes `last_parse` and reads
/// `vault_path`; everything else is the UI layer's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VaultMetadataEntry {
    pub key: String,
    pub value: String,
    pub updated_at: OffsetDateTime,
}

pub const METADATA_KEY_LAST_PARSE: &str = "last_parse";
pub const METADATA_KEY_VAULT_PATH: &str = "vault_path";

/// Status of one ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Running,
    Completed,
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Running => "running",
            ParseStatus::Completed => "completed",
            ParseStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ParseStatus {
    type Err = crate::error::VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ParseStatus::Running),
            "completed" => Ok(ParseStatus::Completed),
            "failed" => Ok(ParseStatus::Failed),
            other => Err(crate::error::VaultError::Serialization(format!(
                "unknown parse status '{other}'"
            ))),
        }
    }
}

/// Aggregate counters for a completed ingestion run, stored as `parse_history.stats` JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseStats {
    pub total_files: usize,
    pub parsed_files: usize,
    pub files_skipped: usize,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub duplicate_ids: usize,
    pub orphaned_nodes: usize,
    pub unresolved_links: usize,
    pub duration_ms: u64,
}

/// One row in the ingestion audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseHistoryRecord {
    pub id: Uuid,
    pub started_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub status: ParseStatus,
    pub error: Option<String>,
    pub stats: Option<ParseStats>,
}

/// A link whose target was not found among parsed files, recorded for operator visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnresolvedLinkRecord {
    pub source_id: String,
    pub target_text: String,
}

/// A file whose frontmatter `id` collided with one already seen during graph assembly.
///
/// Per spec invariant 2, the first occurrence wins; every later file with the same id is
/// recorded here instead of being inserted as a `Node`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateId {
    pub id: String,
    pub kept_path: String,
    pub skipped_paths: Vec<String>,
}
