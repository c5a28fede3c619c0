//! Node position repository. Positions live in a table orthogonal to `nodes`/`edges` — a
//! replace-graph run never touches this table, per the invariant that hand-placed layout
//! survives re-parsing.

use sqlx::{Executor, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::error::VaultError;
use crate::model::NodePosition;

pub async fn upsert<'c, E>(
    executor: E,
    node_id: &str,
    x: f64,
    y: f64,
    z: f64,
    locked: bool,
    now: OffsetDateTime,
) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO node_positions (node_id, x, y, z, locked, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (node_id) DO UPDATE SET x = $2, y = $3, z = $4, locked = $5, updated_at = $6",
    )
    .bind(node_id)
    .bind(x)
    .bind(y)
    .bind(z)
    .bind(locked)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Upsert every position in `positions` in a single round trip.
pub async fn upsert_batch<'c, E>(executor: E, positions: &[NodePosition]) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    if positions.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO node_positions (node_id, x, y, z, locked, updated_at) ",
    );
    qb.push_values(positions, |mut b, pos| {
        b.push_bind(&pos.node_id)
            .push_bind(pos.x)
            .push_bind(pos.y)
            .push_bind(pos.z)
            .push_bind(pos.locked)
            .push_bind(pos.updated_at);
    });
    qb.push(
        " ON CONFLICT (node_id) DO UPDATE SET x = EXCLUDED.x, y = EXCLUDED.y, z = EXCLUDED.z, \
          locked = EXCLUDED.locked, updated_at = EXCLUDED.updated_at",
    );
    qb.build().execute(executor).await?;
    Ok(())
}

pub async fn delete_by_node_id<'c, E>(executor: E, node_id: &str) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM node_positions WHERE node_id = $1")
        .bind(node_id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(VaultError::NotFound(format!("node position '{node_id}'")));
    }
    Ok(())
}

pub async fn list_all<'c, E>(executor: E) -> Result<Vec<NodePosition>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, NodePosition>("SELECT * FROM node_positions ORDER BY node_id")
        .fetch_all(executor)
        .await
        .map_err(Into::into)
}

pub async fn get<'c, E>(executor: E, node_id: &str) -> Result<NodePosition, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, NodePosition>("SELECT * FROM node_positions WHERE node_id = $1")
        .bind(node_id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
}
