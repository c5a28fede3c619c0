//! # vaultgraph-core
//!
//! Ingestion engine that compiles a Markdown vault into a directed property graph, stored in
//! Postgres with atomic replace-on-parse semantics.
//!
//! ## Overview
//!
//! Point `vaultgraph-core` at a directory of `*.md` files with YAML frontmatter and it produces
//! a deterministic node/edge graph: one node per file with an `id`, one edge per wikilink
//! (`[[target]]`) or embed (`![[target]]`) that resolves to another file in the vault. Every
//! ingestion run replaces the previously persisted graph atomically — a failed run never leaves
//! a half-written graph behind, and hand-placed node positions survive the replace untouched.
//!
//! ## Pipeline
//!
//! An ingestion run strings together the library's components in order:
//!
//! 1. [`walker`] discovers and parses every `*.md` file under the vault root in parallel.
//! 2. [`frontmatter`] and [`wikilink`] turn each file's raw text into structured frontmatter and
//!    extracted links; [`fileproc`] ties the two together as a [`fileproc::ParsedFile`].
//! 3. [`resolver`] resolves each wikilink target against the vault's file set using the
//!    exact-path / relative-to-source / basename / normalized-basename cascade.
//! 4. [`classifier`] assigns each node a type from configured classification rules.
//! 5. [`graph`] assembles the deduplicated, deterministically ordered node and edge set.
//! 6. [`db`] persists the result: [`db::replace::replace_graph`] clears and reinserts
//!    `nodes`/`edges`/`unresolved_links` in one transaction, leaving `node_positions` untouched.
//!
//! [`service::VaultService`] drives the whole pipeline as a single orchestrated run: it admits
//! at most one ingestion at a time, records every attempt in `parse_history`, and converts a
//! panic anywhere in the run into a failed history row rather than a poisoned service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vaultgraph_core::config::Config;
//! use vaultgraph_core::db::connect_and_migrate;
//! use vaultgraph_core::git::NoopGitManager;
//! use vaultgraph_core::service::VaultService;
//!
//! # async fn example() -> Result<(), vaultgraph_core::error::VaultError> {
//! let db_config = vaultgraph_core::config::DatabaseConfig::default();
//! let pool = connect_and_migrate("postgres://localhost/vaultgraph", &db_config).await?;
//! let git = Arc::new(NoopGitManager::new("/path/to/vault".into()));
//! let service = VaultService::new(Config::default(), pool, git)?;
//!
//! let stats = service
//!     .parse_and_index_vault(tokio_util::sync::CancellationToken::new())
//!     .await?;
//! println!("indexed {} nodes, {} edges", stats.total_nodes, stats.total_edges);
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! This crate owns parsing, graph assembly, and persistence. A host process is expected to
//! supply configuration (loaded from disk however it prefers), a [`git::GitManager`]
//! implementation if the vault lives in a git repository, and an HTTP/API layer in front of
//! [`service::VaultService`] — none of those are this crate's concern.

pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod fileproc;
pub mod frontmatter;
pub mod git;
pub mod graph;
pub mod model;
pub mod resolver;
pub mod service;
pub mod walker;
pub mod wikilink;

pub use error::VaultError;
