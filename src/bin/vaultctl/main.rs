//! vaultctl CLI
//!
//! One-shot ingestion runner for manual verification of the vaultgraph-core pipeline, without
//! standing up the HTTP layer the core is agnostic to. Mirrors the `parse` subcommand shape of
//! this codebase's other front-end binary: a path argument, a `--config` file, verbose output.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use vaultgraph_core::config::Config;
use vaultgraph_core::db::connect_and_migrate;
use vaultgraph_core::git::NoopGitManager;
use vaultgraph_core::service::VaultService;

#[derive(Parser)]
#[command(name = "vaultctl")]
#[command(author, version, about = "Run a one-shot vaultgraph-core ingestion", long_about = None)]
struct Cli {
    /// Path to the vault directory to parse.
    path: PathBuf,

    /// Postgres connection string. Falls back to the `DATABASE_URL` environment variable.
    #[arg(long)]
    database_url: Option<String>,

    /// Optional TOML config file (see `Config` for recognized fields). Defaults are used for
    /// anything not present in the file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let database_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or("no --database-url given and DATABASE_URL is not set")?;

    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        }
        None => Config::default(),
    };

    if cli.verbose {
        println!("Vault: {}", cli.path.display());
        println!(
            "Config: {}",
            cli.config
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<defaults>".to_string())
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let pool = connect_and_migrate(&database_url, &config.database).await?;
        let git = Arc::new(NoopGitManager::new(cli.path.clone()));
        let service = VaultService::new(config, pool, git)?;

        let stats = service.parse_and_index_vault(CancellationToken::new()).await?;

        println!("\n=== Parse Results ===");
        println!("Total files:      {}", stats.total_files);
        println!("Parsed files:     {}", stats.parsed_files);
        println!("Files skipped:    {}", stats.files_skipped);
        println!("Nodes:            {}", stats.total_nodes);
        println!("Edges:            {}", stats.total_edges);
        println!("Duplicate ids:    {}", stats.duplicate_ids);
        println!("Orphaned nodes:   {}", stats.orphaned_nodes);
        println!("Unresolved links: {}", stats.unresolved_links);
        println!("Duration:         {} ms", stats.duration_ms);

        Ok::<(), vaultgraph_core::VaultError>(())
    })?;

    Ok(())
}
