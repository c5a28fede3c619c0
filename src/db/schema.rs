//! Schema migrations, retargeted to Postgres from this codebase's sqlite `Migration`/
//! `Migrator` pattern (see the teacher's `db.rs`). The shape is the same: a `Migration` list
//! fed into `sqlx::migrate::Migrator` via a custom `MigrationSource`.

use sqlx::error::BoxDynError;
use sqlx::migrate::{MigrateDatabase, Migration as SqlxMigration, MigrationSource, MigrationType};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};

use crate::config::DatabaseConfig;
use crate::error::VaultError;

/// A migration definition, analogous to the teacher's sqlite `Migration` struct.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
    pub kind: MigrationType,
}

#[derive(Debug, Clone)]
struct MigrationList(Vec<Migration>);

impl MigrationSource<'static> for MigrationList {
    fn resolve(self) -> futures_core::future::BoxFuture<'static, Result<Vec<SqlxMigration>, BoxDynError>> {
        Box::pin(async move {
            let mut migrations = Vec::new();
            for migration in self.0 {
                if matches!(migration.kind, MigrationType::ReversibleUp) {
                    migrations.push(SqlxMigration::new(
                        migration.version,
                        migration.description.into(),
                        migration.kind,
                        migration.sql.into(),
                        false,
                    ));
                }
            }
            Ok(migrations)
        })
    }
}

fn migrations() -> MigrationList {
    MigrationList(vec![Migration {
        version: 1,
        description: "create_initial_tables",
        sql: "\
            CREATE TABLE IF NOT EXISTS nodes ( \
                id TEXT PRIMARY KEY, \
                title TEXT NOT NULL, \
                node_type TEXT NOT NULL, \
                tags TEXT[] NOT NULL DEFAULT '{}', \
                content TEXT NOT NULL, \
                metadata JSONB NOT NULL DEFAULT '{}', \
                file_path TEXT NOT NULL UNIQUE, \
                in_degree INTEGER NOT NULL DEFAULT 0, \
                out_degree INTEGER NOT NULL DEFAULT 0, \
                centrality DOUBLE PRECISION NOT NULL DEFAULT 0, \
                search_vector tsvector GENERATED ALWAYS AS \
                    (to_tsvector('english', coalesce(title, '') || ' ' || coalesce(content, ''))) STORED, \
                created_at TIMESTAMPTZ NOT NULL, \
                updated_at TIMESTAMPTZ NOT NULL \
            ); \
            CREATE INDEX IF NOT EXISTS nodes_search_idx ON nodes USING GIN (search_vector); \
            CREATE INDEX IF NOT EXISTS nodes_node_type_idx ON nodes (node_type); \
            CREATE TABLE IF NOT EXISTS edges ( \
                id UUID PRIMARY KEY, \
                source_id TEXT NOT NULL REFERENCES nodes (id) ON DELETE CASCADE, \
                target_id TEXT NOT NULL REFERENCES nodes (id) ON DELETE CASCADE, \
                edge_type TEXT NOT NULL CHECK (edge_type IN ('wikilink', 'embed')), \
                display_text TEXT NOT NULL, \
                weight DOUBLE PRECISION NOT NULL DEFAULT 1.0 CHECK (weight >= 0), \
                created_at TIMESTAMPTZ NOT NULL, \
                UNIQUE (source_id, target_id, edge_type) \
            ); \
            CREATE INDEX IF NOT EXISTS edges_source_idx ON edges (source_id); \
            CREATE INDEX IF NOT EXISTS edges_target_idx ON edges (target_id); \
            CREATE TABLE IF NOT EXISTS node_positions ( \
                node_id TEXT PRIMARY KEY, \
                x DOUBLE PRECISION NOT NULL DEFAULT 0, \
                y DOUBLE PRECISION NOT NULL DEFAULT 0, \
                z DOUBLE PRECISION NOT NULL DEFAULT 0, \
                locked BOOLEAN NOT NULL DEFAULT FALSE, \
                updated_at TIMESTAMPTZ NOT NULL \
            ); \
            CREATE TABLE IF NOT EXISTS vault_metadata ( \
                key TEXT PRIMARY KEY, \
                value TEXT NOT NULL, \
                updated_at TIMESTAMPTZ NOT NULL \
            ); \
            CREATE TABLE IF NOT EXISTS parse_history ( \
                id UUID PRIMARY KEY, \
                started_at TIMESTAMPTZ NOT NULL, \
                completed_at TIMESTAMPTZ, \
                status TEXT NOT NULL, \
                error TEXT, \
                stats JSONB \
            ); \
            CREATE TABLE IF NOT EXISTS unresolved_links ( \
                source_id TEXT NOT NULL, \
                target_text TEXT NOT NULL \
            );",
        kind: MigrationType::ReversibleUp,
    }])
}

/// Connect to `database_url`, creating the database if it doesn't exist, and run every
/// migration in [`migrations`].
pub async fn connect_and_migrate(
    database_url: &str,
    config: &DatabaseConfig,
) -> Result<Pool<Postgres>, VaultError> {
    if !Postgres::database_exists(database_url).await.unwrap_or(false) {
        Postgres::create_database(database_url).await?;
    }

    let options: PgConnectOptions = database_url.parse().map_err(|e: sqlx::Error| e)?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.max_idle_connections)
        .max_lifetime(std::time::Duration::from_secs(
            config.connection_max_lifetime_secs,
        ))
        .connect_with(options)
        .await?;

    let migrator = Migrator::new(migrations()).await?;
    migrator.run(&pool).await?;

    Ok(pool)
}
