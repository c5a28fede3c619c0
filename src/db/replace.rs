//! Atomic replace-graph persistence (component I).
//!
//! One transaction clears and reinserts `nodes`/`edges`/`unresolved_links`, then upserts
//! `vault_metadata.last_parse` before committing, so that row's presence always implies the
//! graph rows beside it are from that same run. `node_positions` is never touched here, so
//! hand-placed layout survives a replace even when the node it belongs to briefly disappears
//! and reappears under the same id.

use sqlx::{Acquire, Pool, Postgres};
use time::OffsetDateTime;

use super::{edges, metadata, nodes};
use crate::error::VaultError;
use crate::graph::BuiltGraph;
use crate::model::METADATA_KEY_LAST_PARSE;

/// Progress reported mid-replace, for a caller to forward to a status channel.
#[derive(Debug, Clone, Copy)]
pub enum ReplaceProgress {
    NodesInserted { inserted: usize, total: usize },
    EdgesInserted { inserted: usize, total: usize },
}

/// Replace the entire persisted graph with `graph` in a single transaction, inserting nodes and
/// edges in batches of 1000 and reporting progress after each batch (spec §4.I steps 4-5), then
/// recording `now` as `vault_metadata.last_parse` before committing (spec §4.I step 6).
pub async fn replace_graph<F>(
    pool: &Pool<Postgres>,
    graph: &BuiltGraph,
    now: OffsetDateTime,
    mut on_progress: F,
) -> Result<(), VaultError>
where
    F: FnMut(ReplaceProgress),
{
    let mut tx = pool.begin().await?;

    edges::delete_all(&mut *tx).await?;
    nodes::delete_all(&mut *tx).await?;

    // Best effort per spec §4.I step 3: `unresolved_links` is auxiliary bookkeeping, so a
    // failure to clear it must not doom the whole replace. A savepoint lets this one statement
    // fail and roll back on its own without poisoning the outer transaction.
    match tx.begin().await {
        Ok(mut savepoint) => match edges::delete_unresolved_links(&mut *savepoint).await {
            Ok(()) => {
                if let Err(err) = savepoint.commit().await {
                    tracing::warn!(error = %err, "failed to commit unresolved_links clear, continuing");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to clear unresolved_links, continuing");
                let _ = savepoint.rollback().await;
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "failed to open savepoint for unresolved_links clear");
        }
    }

    let total_nodes = graph.nodes.len();
    nodes::insert_batched_with_progress(&mut tx, &graph.nodes, |inserted| {
        on_progress(ReplaceProgress::NodesInserted {
            inserted,
            total: total_nodes,
        });
    })
    .await?;

    let total_edges = graph.edges.len();
    edges::insert_batched_with_progress(&mut tx, &graph.edges, |inserted| {
        on_progress(ReplaceProgress::EdgesInserted {
            inserted,
            total: total_edges,
        });
    })
    .await?;

    // Also best effort: the table is auxiliary bookkeeping (spec §9 open questions), not part
    // of the invariants §8 quantifies over.
    match tx.begin().await {
        Ok(mut savepoint) => match edges::insert_unresolved_links(&mut *savepoint, &graph.unresolved_links).await {
            Ok(()) => {
                if let Err(err) = savepoint.commit().await {
                    tracing::warn!(error = %err, "failed to commit unresolved_links insert, continuing");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to insert unresolved_links, continuing");
                let _ = savepoint.rollback().await;
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "failed to open savepoint for unresolved_links insert");
        }
    }

    let formatted = now
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| VaultError::Serialization(e.to_string()))?;
    metadata::set(&mut *tx, METADATA_KEY_LAST_PARSE, &formatted, now).await?;

    tx.commit().await?;
    Ok(())
}
