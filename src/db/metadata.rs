//! Vault metadata key/value store and the parse-history audit trail.

use sqlx::{Executor, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::VaultError;
use crate::model::{ParseHistoryRecord, ParseStats, ParseStatus};

pub async fn set<'c, E>(executor: E, key: &str, value: &str, now: OffsetDateTime) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO vault_metadata (key, value, updated_at) VALUES ($1, $2, $3) \
         ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = $3",
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get<'c, E>(executor: E, key: &str) -> Result<String, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: (String,) = sqlx::query_as("SELECT value FROM vault_metadata WHERE key = $1")
        .bind(key)
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}

pub async fn start_parse_history<'c, E>(
    executor: E,
    id: Uuid,
    started_at: OffsetDateTime,
) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "INSERT INTO parse_history (id, started_at, completed_at, status, error, stats) \
         VALUES ($1, $2, NULL, $3, NULL, NULL)",
    )
    .bind(id)
    .bind(started_at)
    .bind(ParseStatus::Running.as_str())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn complete_parse_history<'c, E>(
    executor: E,
    id: Uuid,
    completed_at: OffsetDateTime,
    stats: &ParseStats,
) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "UPDATE parse_history SET completed_at = $2, status = $3, stats = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(completed_at)
    .bind(ParseStatus::Completed.as_str())
    .bind(sqlx::types::Json(stats))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn fail_parse_history<'c, E>(
    executor: E,
    id: Uuid,
    completed_at: OffsetDateTime,
    error: &str,
) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("UPDATE parse_history SET completed_at = $2, status = $3, error = $4 WHERE id = $1")
        .bind(id)
        .bind(completed_at)
        .bind(ParseStatus::Failed.as_str())
        .bind(error)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn list_parse_history<'c, E>(
    executor: E,
    limit: i64,
) -> Result<Vec<ParseHistoryRecord>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, ParseHistoryRow>(
        "SELECT id, started_at, completed_at, status, error, stats FROM parse_history \
         ORDER BY started_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;
    rows.into_iter().map(ParseHistoryRow::try_into_record).collect()
}

/// Update the status (and, for a failed run, the error) of an existing parse-history row.
///
/// Covers both `complete_parse_history` and `fail_parse_history` under one name, matching the
/// single `UpdateParseStatus(id, status, error?)` form.
pub async fn update_parse_status<'c, E>(
    executor: E,
    id: Uuid,
    completed_at: OffsetDateTime,
    status: ParseStatus,
    error: Option<&str>,
) -> Result<(), VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("UPDATE parse_history SET completed_at = $2, status = $3, error = $4 WHERE id = $1")
        .bind(id)
        .bind(completed_at)
        .bind(status.as_str())
        .bind(error)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn get_latest_parse<'c, E>(executor: E) -> Result<ParseHistoryRecord, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query_as::<_, ParseHistoryRow>(
        "SELECT id, started_at, completed_at, status, error, stats FROM parse_history \
         ORDER BY started_at DESC LIMIT 1",
    )
    .fetch_one(executor)
    .await?;
    row.try_into_record()
}

pub async fn get_parse_by_id<'c, E>(executor: E, id: Uuid) -> Result<ParseHistoryRecord, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query_as::<_, ParseHistoryRow>(
        "SELECT id, started_at, completed_at, status, error, stats FROM parse_history WHERE id = $1",
    )
    .bind(id)
    .fetch_one(executor)
    .await?;
    row.try_into_record()
}

/// All `vault_metadata` rows, e.g. for a debug/inspect UI.
pub async fn get_all<'c, E>(executor: E) -> Result<Vec<crate::model::VaultMetadataEntry>, VaultError>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, crate::model::VaultMetadataEntry>(
        "SELECT * FROM vault_metadata ORDER BY key",
    )
    .fetch_all(executor)
    .await
    .map_err(Into::into)
}

#[derive(sqlx::FromRow)]
struct ParseHistoryRow {
    id: Uuid,
    started_at: OffsetDateTime,
    completed_at: Option<OffsetDateTime>,
    status: String,
    error: Option<String>,
    stats: Option<sqlx::types::Json<ParseStats>>,
}

impl ParseHistoryRow {
    fn try_into_record(self) -> Result<ParseHistoryRecord, VaultError> {
        Ok(ParseHistoryRecord {
            id: self.id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            status: self.status.parse()?,
            error: self.error,
            stats: self.stats.map(|j| j.0),
        })
    }
}
