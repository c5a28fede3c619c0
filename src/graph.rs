//! Graph assembly (component G).
//!
//! Two deterministic passes over the parsed files: nodes first (so duplicate ids and orphans
//! are resolved before any edge is considered), then edges (so every edge's endpoints are
//! known nodes). Plain `BTreeMap`/`HashMap` rather than `petgraph` for the assembly itself —
//! `petgraph` stays in the dependency set for downstream in-memory traversal/analysis built on
//! top of the persisted graph, not for this builder.

use std::collections::{BTreeMap, HashMap, HashSet};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::config::GraphConfig;
use crate::fileproc::ParsedFile;
use crate::model::{DuplicateId, Edge, EdgeType, Node, UnresolvedLinkRecord};
use crate::resolver::ResolverIndex;

/// The in-memory result of one assembly pass, ready for persistence.
pub struct BuiltGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub duplicates: Vec<DuplicateId>,
    pub unresolved_links: Vec<UnresolvedLinkRecord>,
    pub orphaned_node_ids: Vec<String>,
    /// Files with no frontmatter `id` at all (spec §4.G: not an error, just excluded).
    pub files_skipped: usize,
}

/// Assemble a [`BuiltGraph`] from every successfully parsed file.
///
/// `files` need not be sorted; assembly itself establishes determinism by always iterating
/// nodes in `relative_path` order regardless of walk/completion order.
pub fn build_graph(
    mut files: Vec<ParsedFile>,
    classifier: &Classifier,
    config: &GraphConfig,
    now: OffsetDateTime,
) -> BuiltGraph {
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    // Pass 1: nodes. First occurrence of an id wins; later ones become duplicates; files with
    // no frontmatter id at all are skipped and counted, never compared for duplication.
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
    let mut duplicates: BTreeMap<String, DuplicateId> = BTreeMap::new();
    let mut kept_files: Vec<&ParsedFile> = Vec::with_capacity(files.len());
    let mut files_skipped = 0usize;

    for file in &files {
        let Some(id) = file.node_id() else {
            files_skipped += 1;
            continue;
        };

        if let Some(existing) = nodes.get(id) {
            duplicates
                .entry(id.to_string())
                .or_insert_with(|| DuplicateId {
                    id: id.to_string(),
                    kept_path: existing.file_path.clone(),
                    skipped_paths: Vec::new(),
                })
                .skipped_paths
                .push(file.relative_path.clone());
            continue;
        }

        let node_type = classifier.classify(file);
        let timestamp = file.modified.unwrap_or(now);
        nodes.insert(
            id.to_string(),
            Node {
                id: id.to_string(),
                title: file.title(),
                node_type,
                tags: file.tags().to_vec(),
                content: file.body.clone(),
                metadata: frontmatter_metadata(file),
                file_path: file.relative_path.clone(),
                in_degree: 0,
                out_degree: 0,
                centrality: 0.0,
                created_at: timestamp,
                updated_at: timestamp,
            },
        );
        kept_files.push(file);
    }

    // Pass 2: edges, resolved against the surviving (non-duplicate) node set only.
    let resolver_entries: Vec<(&str, &str)> = kept_files
        .iter()
        .map(|f| (f.node_id().expect("kept_files always have an id"), f.relative_path.as_str()))
        .collect();
    let index = ResolverIndex::build(resolver_entries);

    let mut edges = Vec::new();
    let mut unresolved_links = Vec::new();
    let mut out_degree: HashMap<String, i32> = HashMap::new();
    let mut in_degree: HashMap<String, i32> = HashMap::new();
    let mut seen_edge_keys: HashSet<(String, String, EdgeType)> = HashSet::new();

    for file in &kept_files {
        let source_id = file.node_id().expect("kept_files always have an id").to_string();
        for link in &file.links {
            if link.is_empty_target() {
                continue;
            }
            let (target_id, resolved) = index.resolve(&file.relative_path, &link.target);
            if !resolved {
                unresolved_links.push(UnresolvedLinkRecord {
                    source_id: source_id.clone(),
                    target_text: link.target.clone(),
                });
                continue;
            }
            if !nodes.contains_key(&target_id) {
                // Resolved to a file that had no valid node (shouldn't happen since the index
                // is built only from kept_files, but guard it defensively per spec).
                unresolved_links.push(UnresolvedLinkRecord {
                    source_id: source_id.clone(),
                    target_text: link.target.clone(),
                });
                continue;
            }

            let edge_type = edge_type_for(link.is_embed);
            let key = (source_id.clone(), target_id.clone(), edge_type);
            if !seen_edge_keys.insert(key) {
                continue;
            }

            *out_degree.entry(source_id.clone()).or_insert(0) += 1;
            *in_degree.entry(target_id.clone()).or_insert(0) += 1;

            edges.push(Edge {
                id: Uuid::new_v4(),
                source_id: source_id.clone(),
                target_id,
                edge_type,
                display_text: link.display_text(),
                weight: config.default_edge_weight,
                created_at: now,
            });
        }
    }

    for (id, node) in nodes.iter_mut() {
        node.out_degree = *out_degree.get(id).unwrap_or(&0);
        node.in_degree = *in_degree.get(id).unwrap_or(&0);
    }

    let orphaned_node_ids: Vec<String> = nodes
        .values()
        .filter(|n| n.in_degree == 0 && n.out_degree == 0)
        .map(|n| n.id.clone())
        .collect();

    let mut node_list: Vec<Node> = nodes.into_values().collect();
    if config.skip_orphans {
        let orphan_set: HashSet<&str> = orphaned_node_ids.iter().map(String::as_str).collect();
        node_list.retain(|n| !orphan_set.contains(n.id.as_str()));
    }

    // Deterministic ordering per spec §4.G finalization.
    node_list.sort_by(|a, b| a.id.cmp(&b.id));
    edges.sort_by(|a, b| {
        (&a.source_id, &a.target_id, a.edge_type).cmp(&(&b.source_id, &b.target_id, b.edge_type))
    });
    let mut duplicates: Vec<DuplicateId> = duplicates.into_values().collect();
    duplicates.sort_by(|a, b| a.id.cmp(&b.id));

    BuiltGraph {
        nodes: node_list,
        edges,
        duplicates,
        unresolved_links,
        orphaned_node_ids,
        files_skipped,
    }
}

fn edge_type_for(is_embed: bool) -> EdgeType {
    if is_embed {
        EdgeType::Embed
    } else {
        EdgeType::Wikilink
    }
}

fn frontmatter_metadata(file: &ParsedFile) -> BTreeMap<String, serde_json::Value> {
    match &file.frontmatter {
        Some(fm) => fm
            .raw
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "id" | "title" | "tags"))
            .filter_map(|(k, v)| {
                serde_json::to_value(v).ok().map(|jv| (k.clone(), jv))
            })
            .collect(),
        None => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeClassificationConfig;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn classifier() -> Classifier {
        Classifier::new(&NodeClassificationConfig {
            default_node_type: "note".to_string(),
            node_types: Default::default(),
            classification_rules: Vec::new(),
        })
        .unwrap()
    }

    fn parse(path: &str, text: &str) -> ParsedFile {
        ParsedFile::parse(path.to_string(), text).unwrap()
    }

    #[test]
    fn minimal_triangle_builds_nodes_and_edges() {
        let files = vec![
            parse("a.md", "---\nid: a\n---\n[[b]]"),
            parse("b.md", "---\nid: b\n---\n[[c]]"),
            parse("c.md", "---\nid: c\n---\n[[a]]"),
        ];
        let graph = build_graph(files, &classifier(), &GraphConfig::default(), now());
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.unresolved_links.is_empty());
        assert!(graph.orphaned_node_ids.is_empty());
        for node in &graph.nodes {
            assert_eq!(node.in_degree, 1);
            assert_eq!(node.out_degree, 1);
        }
    }

    #[test]
    fn duplicate_id_keeps_first_by_path_order() {
        let files = vec![
            parse("a.md", "---\nid: dup\n---\nFirst"),
            parse("b.md", "---\nid: dup\n---\nSecond"),
        ];
        let graph = build_graph(files, &classifier(), &GraphConfig::default(), now());
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].file_path, "a.md");
        assert_eq!(graph.duplicates.len(), 1);
        assert_eq!(graph.duplicates[0].kept_path, "a.md");
        assert_eq!(graph.duplicates[0].skipped_paths, vec!["b.md".to_string()]);
        assert_eq!(graph.files_skipped, 0);
    }

    #[test]
    fn files_without_frontmatter_are_skipped_not_nodes() {
        let files = vec![
            parse("a.md", "---\nid: a\n---\nHas frontmatter"),
            parse("no-header.md", "Just plain text, no frontmatter at all."),
        ];
        let graph = build_graph(files, &classifier(), &GraphConfig::default(), now());
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.files_skipped, 1);
    }

    #[test]
    fn vault_with_only_headerless_files_produces_zero_nodes() {
        let files = vec![
            parse("a.md", "Plain text"),
            parse("b.md", "More plain text"),
        ];
        let graph = build_graph(files, &classifier(), &GraphConfig::default(), now());
        assert_eq!(graph.nodes.len(), 0);
        assert_eq!(graph.edges.len(), 0);
        assert_eq!(graph.files_skipped, 2);
    }

    #[test]
    fn orphan_nodes_are_reported_and_optionally_skipped() {
        let files = vec![
            parse("a.md", "---\nid: a\n---\n[[b]]"),
            parse("b.md", "---\nid: b\n---\nNo links here"),
            parse("isolated.md", "---\nid: isolated\n---\nNothing links here"),
        ];
        let graph = build_graph(
            files.clone(),
            &classifier(),
            &GraphConfig::default(),
            now(),
        );
        assert_eq!(graph.orphaned_node_ids, vec!["isolated".to_string()]);
        assert_eq!(graph.nodes.len(), 3);

        let mut skip_config = GraphConfig::default();
        skip_config.skip_orphans = true;
        let graph = build_graph(files, &classifier(), &skip_config, now());
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn unresolved_links_are_recorded_not_fatal() {
        let files = vec![parse("a.md", "---\nid: a\n---\n[[does-not-exist]]")];
        let graph = build_graph(files, &classifier(), &GraphConfig::default(), now());
        assert_eq!(graph.unresolved_links.len(), 1);
        assert_eq!(graph.unresolved_links[0].target_text, "does-not-exist");
    }

    #[test]
    fn self_referential_link_produces_one_edge_with_degree_one() {
        let files = vec![parse("a.md", "---\nid: a\n---\nSee [[a]] for more.")];
        let graph = build_graph(files, &classifier(), &GraphConfig::default(), now());
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source_id, "a");
        assert_eq!(graph.edges[0].target_id, "a");
        assert_eq!(graph.nodes[0].in_degree, 1);
        assert_eq!(graph.nodes[0].out_degree, 1);
    }

    #[test]
    fn duplicate_links_to_same_target_dedupe_to_one_edge() {
        let files = vec![
            parse("a.md", "---\nid: a\n---\n[[b]] and [[b]] again"),
            parse("b.md", "---\nid: b\n---\nNo links"),
        ];
        let graph = build_graph(files, &classifier(), &GraphConfig::default(), now());
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.nodes.iter().find(|n| n.id == "a").unwrap().out_degree, 1);
        assert_eq!(graph.nodes.iter().find(|n| n.id == "b").unwrap().in_degree, 1);
    }
}
