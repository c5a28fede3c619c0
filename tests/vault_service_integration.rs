//! End-to-end ingestion scenarios against a live Postgres instance.
//!
//! These need a real database (`DATABASE_URL`), so they're marked `#[ignore]` and skipped by a
//! plain `cargo test`; run them with:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/vaultgraph_test cargo test -- --ignored
//! ```
//!
//! Each test connects, migrates, and wipes the relevant tables itself so repeated runs against
//! the same database don't interfere with each other.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vaultgraph_core::config::Config;
use vaultgraph_core::db::{connect_and_migrate, edges, nodes, positions};
use vaultgraph_core::git::NoopGitManager;
use vaultgraph_core::service::VaultService;

fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

async fn fresh_pool() -> sqlx::Pool<sqlx::Postgres> {
    let url = database_url().expect("DATABASE_URL must be set to run --ignored integration tests");
    let pool = connect_and_migrate(&url, &Config::default().database)
        .await
        .expect("connect_and_migrate");
    edges::delete_all(&pool).await.unwrap();
    nodes::delete_all(&pool).await.unwrap();
    pool
}

fn write_note(dir: &TempDir, relative_path: &str, id: &str, body: &str) {
    let path = dir.path().join(relative_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(
        path,
        format!("---\nid: {id}\n---\n\n{body}\n"),
    )
    .unwrap();
}

fn service_for(dir: &TempDir, pool: sqlx::Pool<sqlx::Postgres>) -> VaultService {
    let git = Arc::new(NoopGitManager::new(dir.path().to_path_buf()));
    VaultService::new(Config::default(), pool, git).expect("service construction")
}

/// Scenario 1: a cyclic triangle of wiki links produces 3 nodes and 3 edges, each node with
/// in_degree = 1 and out_degree = 1, zero orphans, zero unresolved links.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn minimal_triangle_round_trips_through_postgres() {
    let pool = fresh_pool().await;
    let dir = TempDir::new().unwrap();
    write_note(&dir, "a.md", "a", "Links to [[b]].");
    write_note(&dir, "b.md", "b", "Links to [[c]].");
    write_note(&dir, "c.md", "c", "Links to [[a]].");

    let service = service_for(&dir, pool.clone());
    let stats = service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .expect("parse_and_index_vault");

    assert_eq!(stats.total_nodes, 3);
    assert_eq!(stats.total_edges, 3);
    assert_eq!(stats.orphaned_nodes, 0);
    assert_eq!(stats.unresolved_links, 0);

    for id in ["a", "b", "c"] {
        let node = nodes::get_by_id(&pool, id).await.expect("node exists");
        assert_eq!(node.in_degree, 1, "{id} in_degree");
        assert_eq!(node.out_degree, 1, "{id} out_degree");
    }
}

/// Scenario 2: two files with the same frontmatter id keep the first-encountered path and
/// record the rest as skipped, without failing the run.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_ids_keep_first_and_skip_the_rest() {
    let pool = fresh_pool().await;
    let dir = TempDir::new().unwrap();
    write_note(&dir, "folder1/note.md", "duplicate", "First copy.");
    write_note(&dir, "folder2/note.md", "duplicate", "Second copy.");

    let service = service_for(&dir, pool.clone());
    let stats = service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .expect("parse_and_index_vault");

    assert_eq!(stats.total_nodes, 1);
    assert_eq!(stats.duplicate_ids, 1);
    assert_eq!(stats.files_skipped, 1);

    let node = nodes::get_by_id(&pool, "duplicate").await.unwrap();
    assert_eq!(node.file_path, "folder1/note.md");
}

/// Scenario 3: a file with no links and no inbound links is reported as an orphan, and is
/// persisted or not depending on `skip_orphans`.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn orphans_are_reported_and_optionally_omitted() {
    let pool = fresh_pool().await;
    let dir = TempDir::new().unwrap();
    write_note(&dir, "x.md", "x", "No links here.");

    let mut config = Config::default();
    config.graph.skip_orphans = false;
    let git: Arc<dyn vaultgraph_core::git::GitManager> =
        Arc::new(NoopGitManager::new(dir.path().to_path_buf()));
    let service = VaultService::new(config, pool.clone(), Arc::clone(&git)).unwrap();
    let stats = service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.orphaned_nodes, 1);
    assert!(nodes::get_by_id(&pool, "x").await.is_ok());

    edges::delete_all(&pool).await.unwrap();
    nodes::delete_all(&pool).await.unwrap();

    let mut config = Config::default();
    config.graph.skip_orphans = true;
    let service = VaultService::new(config, pool.clone(), git).unwrap();
    let stats = service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.orphaned_nodes, 1);
    assert!(nodes::get_by_id(&pool, "x").await.is_err());
}

/// Scenario 4: hand-placed node positions survive a graph replacement even though the node
/// backing them briefly disappears and reappears under the same id.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn positions_survive_reparse() {
    let pool = fresh_pool().await;
    let dir = TempDir::new().unwrap();
    write_note(&dir, "n1.md", "n1", "First revision.");

    let service = service_for(&dir, pool.clone());
    service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .unwrap();

    let now = time::OffsetDateTime::now_utc();
    positions::upsert(&pool, "n1", 100.0, 200.0, 0.0, false, now)
        .await
        .unwrap();

    write_note(&dir, "n1.md", "n1", "Updated revision with more text.");
    service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .unwrap();

    let position = positions::get(&pool, "n1").await.expect("position survives replace");
    assert_eq!(position.x, 100.0);
    assert_eq!(position.y, 200.0);
}

/// Scenario 5: a second call made while a run is in flight is rejected immediately rather than
/// queued, and a later call after the first completes succeeds.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_calls_are_rejected_then_a_later_call_succeeds() {
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use vaultgraph_core::git::GitManager;

    struct BlockingGitManager {
        release: Arc<tokio::sync::Notify>,
        entered: Arc<AtomicBool>,
        local_path: PathBuf,
    }

    #[async_trait]
    impl GitManager for BlockingGitManager {
        async fn pull(&self) -> Result<(), vaultgraph_core::VaultError> {
            self.entered.store(true, Ordering::SeqCst);
            self.release.notified().await;
            Ok(())
        }
        fn get_local_path(&self) -> PathBuf {
            self.local_path.clone()
        }
    }

    let pool = fresh_pool().await;
    let dir = TempDir::new().unwrap();
    write_note(&dir, "a.md", "a", "No links.");

    let release = Arc::new(tokio::sync::Notify::new());
    let entered = Arc::new(AtomicBool::new(false));
    let git: Arc<dyn GitManager> = Arc::new(BlockingGitManager {
        release: Arc::clone(&release),
        entered: Arc::clone(&entered),
        local_path: dir.path().to_path_buf(),
    });
    let service = Arc::new(VaultService::new(Config::default(), pool, git).unwrap());

    let blocked = Arc::clone(&service);
    let first_run = tokio::spawn(
        async move { blocked.parse_and_index_vault(CancellationToken::new()).await },
    );

    while !entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let rejection = service.parse_and_index_vault(CancellationToken::new()).await;
    assert!(matches!(rejection, Err(vaultgraph_core::VaultError::ParseInProgress(_))));

    release.notify_one();
    let stats = first_run.await.unwrap().expect("first run completes");
    assert_eq!(stats.total_nodes, 1);

    let stats = service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .expect("third run succeeds once the second one has released the lock");
    assert_eq!(stats.total_nodes, 1);
}

/// Scenario 6: a panic during the pipeline self-heals — the lock releases, the history row is
/// marked failed, and the next run proceeds normally.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn panic_during_ingestion_is_recorded_as_a_failed_run() {
    use async_trait::async_trait;
    use std::path::PathBuf;
    use vaultgraph_core::git::GitManager;

    struct PanickingGitManager;

    #[async_trait]
    impl GitManager for PanickingGitManager {
        async fn pull(&self) -> Result<(), vaultgraph_core::VaultError> {
            panic!("simulated git failure");
        }
        fn get_local_path(&self) -> PathBuf {
            PathBuf::from(".")
        }
    }

    let pool = fresh_pool().await;
    let dir = TempDir::new().unwrap();
    write_note(&dir, "a.md", "a", "No links.");

    let panicking_git: Arc<dyn GitManager> = Arc::new(PanickingGitManager);
    let service = VaultService::new(Config::default(), pool.clone(), panicking_git).unwrap();

    let result = service.parse_and_index_vault(CancellationToken::new()).await;
    let err = result.expect_err("panicking git pull should surface as an error");
    assert!(err.to_string().contains("panic"));

    let (in_progress, _) = service.is_parse_in_progress();
    assert!(!in_progress);

    let status = service
        .get_parse_status()
        .await
        .unwrap()
        .expect("a history row was recorded");
    assert_eq!(status.status, vaultgraph_core::model::ParseStatus::Failed);

    // Wait out any race between the panic barrier releasing the lock and our next call.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let git = Arc::new(NoopGitManager::new(dir.path().to_path_buf()));
    let service = VaultService::new(Config::default(), pool, git).unwrap();
    let stats = service
        .parse_and_index_vault(CancellationToken::new())
        .await
        .expect("next run succeeds after the panic self-heals");
    assert_eq!(stats.total_nodes, 1);
}
