//! Edge repository functions, same `Executor`-generic shape as [`super::nodes`].

use sqlx::{Executor, Postgres, QueryBuilder, Transaction};

use crate::error::VaultError;
use crate::model::{Edge, UnresolvedLinkRecord};

const INSERT_BATCH_CHUNK: usize = 1000;

pub async fn create<'c, E>(executor: E, edge: &Edge) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    insert_batch(executor, std::slice::from_ref(edge)).await
}

pub async fn delete<'c, E>(executor: E, id: uuid::Uuid) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM edges WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(VaultError::NotFound(format!("edge '{id}'")));
    }
    Ok(())
}

pub async fn delete_by_node<'c, E>(executor: E, node_id: &str) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("DELETE FROM edges WHERE source_id = $1 OR target_id = $1")
        .bind(node_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_all<'c, E>(executor: E) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("DELETE FROM edges").execute(executor).await?;
    Ok(())
}

pub async fn insert_batch<'c, E>(executor: E, edges: &[Edge]) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    if edges.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO edges (id, source_id, target_id, edge_type, display_text, weight, created_at) ",
    );
    qb.push_values(edges, |mut b, edge| {
        b.push_bind(edge.id)
            .push_bind(&edge.source_id)
            .push_bind(&edge.target_id)
            .push_bind(edge.edge_type.as_str())
            .push_bind(&edge.display_text)
            .push_bind(edge.weight)
            .push_bind(edge.created_at);
    });
    qb.build().execute(executor).await?;
    Ok(())
}

/// Insert `edges` in chunks of 1000 (spec §4.I step 5), invoking `on_batch(inserted_so_far)`
/// after each chunk commits so the caller can publish ingestion progress.
pub async fn insert_batched_with_progress<F>(
    tx: &mut Transaction<'_, Postgres>,
    edges: &[Edge],
    mut on_batch: F,
) -> Result<(), VaultError>
where
    F: FnMut(usize),
{
    let mut inserted = 0;
    for chunk in edges.chunks(INSERT_BATCH_CHUNK) {
        insert_batch(&mut **tx, chunk).await?;
        inserted += chunk.len();
        on_batch(inserted);
    }
    Ok(())
}

/// Insert-or-update every edge in `edges` by its dedup key `(source_id, target_id, edge_type)`,
/// used by hosts that re-sync a subset of edges outside a full replace-graph run.
pub async fn upsert_batch<'c, E>(executor: E, edges: &[Edge]) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    if edges.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO edges (id, source_id, target_id, edge_type, display_text, weight, created_at) ",
    );
    qb.push_values(edges, |mut b, edge| {
        b.push_bind(edge.id)
            .push_bind(&edge.source_id)
            .push_bind(&edge.target_id)
            .push_bind(edge.edge_type.as_str())
            .push_bind(&edge.display_text)
            .push_bind(edge.weight)
            .push_bind(edge.created_at);
    });
    qb.push(
        " ON CONFLICT (source_id, target_id, edge_type) DO UPDATE SET \
          display_text = EXCLUDED.display_text, weight = EXCLUDED.weight",
    );
    qb.build().execute(executor).await?;
    Ok(())
}

pub async fn get_by_id<'c, E>(executor: E, id: uuid::Uuid) -> Result<Edge, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query_as::<_, EdgeRow>(
        "SELECT id, source_id, target_id, edge_type, display_text, weight, created_at \
         FROM edges WHERE id = $1",
    )
    .bind(id)
    .fetch_one(executor)
    .await?;
    row.try_into_edge()
}

pub async fn get_by_source_and_target<'c, E>(
    executor: E,
    source_id: &str,
    target_id: &str,
) -> Result<Vec<Edge>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT id, source_id, target_id, edge_type, display_text, weight, created_at \
         FROM edges WHERE source_id = $1 AND target_id = $2",
    )
    .bind(source_id)
    .bind(target_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(EdgeRow::try_into_edge).collect()
}

pub async fn get_incoming<'c, E>(executor: E, node_id: &str) -> Result<Vec<Edge>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT id, source_id, target_id, edge_type, display_text, weight, created_at \
         FROM edges WHERE target_id = $1",
    )
    .bind(node_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(EdgeRow::try_into_edge).collect()
}

pub async fn get_outgoing<'c, E>(executor: E, node_id: &str) -> Result<Vec<Edge>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT id, source_id, target_id, edge_type, display_text, weight, created_at \
         FROM edges WHERE source_id = $1",
    )
    .bind(node_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(EdgeRow::try_into_edge).collect()
}

pub async fn list_for_node<'c, E>(executor: E, node_id: &str) -> Result<Vec<Edge>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT id, source_id, target_id, edge_type, display_text, weight, created_at \
         FROM edges WHERE source_id = $1 OR target_id = $1",
    )
    .bind(node_id)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(EdgeRow::try_into_edge).collect()
}

pub async fn get_all<'c, E>(executor: E) -> Result<Vec<Edge>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT id, source_id, target_id, edge_type, display_text, weight, created_at \
         FROM edges ORDER BY source_id, target_id, edge_type",
    )
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(EdgeRow::try_into_edge).collect()
}

pub async fn count<'c, E>(executor: E) -> Result<i64, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM edges")
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}

pub async fn delete_unresolved_links<'c, E>(executor: E) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("DELETE FROM unresolved_links")
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn insert_unresolved_links<'c, E>(
    executor: E,
    links: &[UnresolvedLinkRecord],
) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    if links.is_empty() {
        return Ok(());
    }
    let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO unresolved_links (source_id, target_text) ");
    qb.push_values(links, |mut b, link| {
        b.push_bind(&link.source_id).push_bind(&link.target_text);
    });
    qb.build().execute(executor).await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct EdgeRow {
    id: uuid::Uuid,
    source_id: String,
    target_id: String,
    edge_type: String,
    display_text: String,
    weight: f64,
    created_at: time::OffsetDateTime,
}

impl EdgeRow {
    fn try_into_edge(self) -> Result<Edge, VaultError> {
        Ok(Edge {
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            edge_type: self.edge_type.parse()?,
            display_text: self.display_text,
            weight: self.weight,
            created_at: self.created_at,
        })
    }
}
