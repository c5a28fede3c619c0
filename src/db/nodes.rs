//! Node repository functions.
//!
//! Every function here is generic over `sqlx::Executor<'c, Database = Postgres>`, so the same
//! code runs against a pooled connection or an open transaction without duplicating a single
//! query — the native sqlx equivalent of this codebase's old hand-rolled `Transaction` type.

use sqlx::{Executor, Postgres, QueryBuilder, Transaction};

use crate::error::VaultError;
use crate::model::Node;

const UPSERT_BATCH_CHUNK: usize = 1000;

pub async fn create<'c, E>(executor: E, node: &Node) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    insert_batch(executor, std::slice::from_ref(node)).await
}

pub async fn update<'c, E>(executor: E, node: &Node) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE nodes SET title = $2, node_type = $3, tags = $4, content = $5, metadata = $6, \
         file_path = $7, in_degree = $8, out_degree = $9, centrality = $10, updated_at = $11 \
         WHERE id = $1",
    )
    .bind(&node.id)
    .bind(&node.title)
    .bind(&node.node_type)
    .bind(&node.tags)
    .bind(sqlx::types::Json(&node.metadata))
    .bind(&node.content)
    .bind(&node.file_path)
    .bind(node.in_degree)
    .bind(node.out_degree)
    .bind(node.centrality)
    .bind(node.updated_at)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(VaultError::NotFound(format!("node '{}'", node.id)));
    }
    Ok(())
}

pub async fn delete<'c, E>(executor: E, id: &str) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(VaultError::NotFound(format!("node '{id}'")));
    }
    Ok(())
}

pub async fn delete_all<'c, E>(executor: E) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("DELETE FROM nodes").execute(executor).await?;
    Ok(())
}

pub async fn insert_batch<'c, E>(executor: E, nodes: &[Node]) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    if nodes.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO nodes (id, title, node_type, tags, content, metadata, file_path, \
         in_degree, out_degree, centrality, created_at, updated_at) ",
    );
    qb.push_values(nodes, |mut b, node| {
        b.push_bind(&node.id)
            .push_bind(&node.title)
            .push_bind(&node.node_type)
            .push_bind(&node.tags)
            .push_bind(&node.content)
            .push_bind(sqlx::types::Json(&node.metadata))
            .push_bind(&node.file_path)
            .push_bind(node.in_degree)
            .push_bind(node.out_degree)
            .push_bind(node.centrality)
            .push_bind(node.created_at)
            .push_bind(node.updated_at);
    });
    qb.build().execute(executor).await?;
    Ok(())
}

/// Insert `nodes` in chunks of 1000 (spec §4.I step 4), invoking `on_batch(inserted_so_far)`
/// after each chunk commits so the caller can publish ingestion progress.
pub async fn insert_batched_with_progress<F>(
    tx: &mut Transaction<'_, Postgres>,
    nodes: &[Node],
    mut on_batch: F,
) -> Result<(), VaultError>
where
    F: FnMut(usize),
{
    let mut inserted = 0;
    for chunk in nodes.chunks(UPSERT_BATCH_CHUNK) {
        insert_batch(&mut **tx, chunk).await?;
        inserted += chunk.len();
        on_batch(inserted);
    }
    Ok(())
}

/// Insert-or-update every node in `nodes` by primary key, used by hosts that re-sync a subset
/// of nodes outside a full replace-graph run.
pub async fn upsert_batch<'c, E>(executor: E, nodes: &[Node]) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    if nodes.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO nodes (id, title, node_type, tags, content, metadata, file_path, \
         in_degree, out_degree, centrality, created_at, updated_at) ",
    );
    qb.push_values(nodes, |mut b, node| {
        b.push_bind(&node.id)
            .push_bind(&node.title)
            .push_bind(&node.node_type)
            .push_bind(&node.tags)
            .push_bind(&node.content)
            .push_bind(sqlx::types::Json(&node.metadata))
            .push_bind(&node.file_path)
            .push_bind(node.in_degree)
            .push_bind(node.out_degree)
            .push_bind(node.centrality)
            .push_bind(node.created_at)
            .push_bind(node.updated_at);
    });
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, node_type = EXCLUDED.node_type, \
          tags = EXCLUDED.tags, content = EXCLUDED.content, metadata = EXCLUDED.metadata, \
          file_path = EXCLUDED.file_path, in_degree = EXCLUDED.in_degree, \
          out_degree = EXCLUDED.out_degree, centrality = EXCLUDED.centrality, \
          updated_at = EXCLUDED.updated_at",
    );
    qb.build().execute(executor).await?;
    Ok(())
}

pub async fn get_by_id<'c, E>(executor: E, id: &str) -> Result<Node, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = $1")
        .bind(id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
}

pub async fn get_by_path<'c, E>(executor: E, file_path: &str) -> Result<Node, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE file_path = $1")
        .bind(file_path)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
}

pub async fn get_by_ids<'c, E>(executor: E, ids: &[String]) -> Result<Vec<Node>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = ANY($1) ORDER BY id")
        .bind(ids)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
}

pub async fn get_by_type<'c, E>(executor: E, node_type: &str) -> Result<Vec<Node>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE node_type = $1 ORDER BY id")
        .bind(node_type)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
}

pub async fn get_all<'c, E>(executor: E, limit: i64, offset: i64) -> Result<Vec<Node>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Node>("SELECT * FROM nodes ORDER BY id LIMIT $1 OFFSET $2")
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
}

pub async fn list_all<'c, E>(executor: E) -> Result<Vec<Node>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Node>("SELECT * FROM nodes ORDER BY id")
        .fetch_all(executor)
        .await
        .map_err(Into::into)
}

pub async fn search<'c, E>(executor: E, query: &str, limit: i64) -> Result<Vec<Node>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Node>(
        "SELECT * FROM nodes \
         WHERE search_vector @@ plainto_tsquery('english', $1) \
         ORDER BY ts_rank(search_vector, plainto_tsquery('english', $1)) DESC \
         LIMIT $2",
    )
    .bind(query)
    .bind(limit)
    .fetch_all(executor)
    .await
    .map_err(Into::into)
}

pub async fn count<'c, E>(executor: E) -> Result<i64, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes")
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}
