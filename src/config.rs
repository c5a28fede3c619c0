//! Recognized configuration surface (see SPEC_FULL.md §6 and §10.3).
//!
//! The core never reads a config file itself — loading config from disk is a host
//! responsibility — but it owns the typed shape callers populate, with defaults matching the
//! spec's stated fallbacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classifier::ClassificationRule;

fn default_concurrency() -> i64 {
    4
}

fn default_batch_size() -> i64 {
    100
}

fn default_weight() -> f64 {
    1.0
}

fn default_node_type() -> String {
    "note".to_string()
}

/// `graph.*` options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    #[serde(default = "default_concurrency")]
    pub max_concurrency: i64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_weight")]
    pub default_edge_weight: f64,
    pub skip_orphans: bool,
    pub node_classification: NodeClassificationConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            max_concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            default_edge_weight: default_weight(),
            skip_orphans: false,
            node_classification: NodeClassificationConfig::default(),
        }
    }
}

impl GraphConfig {
    /// Worker count after applying the spec's "≤ 0 → 4" fallback.
    pub fn resolved_concurrency(&self) -> usize {
        if self.max_concurrency <= 0 {
            4
        } else {
            self.max_concurrency as usize
        }
    }

    /// Advisory batch size after applying the spec's "≤ 0 → 100" fallback.
    pub fn resolved_batch_size(&self) -> usize {
        if self.batch_size <= 0 {
            100
        } else {
            self.batch_size as usize
        }
    }
}

/// Declaration of one node type available to the classifier (§4.F).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDef {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: String,
    pub size_multiplier: f64,
}

/// `graph.node_classification.*` options: the declared node types plus the ordered rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeClassificationConfig {
    #[serde(default = "default_node_type")]
    pub default_node_type: String,
    pub node_types: BTreeMap<String, NodeTypeDef>,
    pub classification_rules: Vec<ClassificationRule>,
}

impl Default for NodeClassificationConfig {
    fn default() -> Self {
        NodeClassificationConfig {
            default_node_type: default_node_type(),
            node_types: BTreeMap::new(),
            classification_rules: Vec::new(),
        }
    }
}

/// `database.*` options, consumed when the host constructs the connection pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub max_idle_connections: u32,
    pub connection_max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            max_connections: 10,
            max_idle_connections: 5,
            connection_max_lifetime_secs: 1800,
        }
    }
}

/// The whole recognized configuration surface, as the core receives it from the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub database: DatabaseConfig,
}
