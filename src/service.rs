//! Vault Service orchestrator (component J).
//!
//! Owns the run-lifecycle state behind a single `parking_lot::Mutex`: at most one
//! [`VaultService::parse_and_index_vault`] run proceeds at a time, a contending caller is turned
//! away immediately with [`VaultError::ParseInProgress`] rather than queued, and the pipeline
//! itself runs as one `tokio::spawn`ed task so a panic anywhere inside it (sync or async) is
//! caught by the task's `JoinHandle` instead of unwinding into the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Postgres};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::db;
use crate::db::replace::ReplaceProgress;
use crate::error::VaultError;
use crate::git::GitManager;
use crate::graph;
use crate::model::{ParseHistoryRecord, ParseStats, ParseStatus};
use crate::walker;

/// Progress snapshot for an in-flight (or just-finished) run, polled via [`VaultService::get_parse_status`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseProgress {
    pub total_files: usize,
    pub processed_files: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub error_count: usize,
}

/// Response shape for `GET /parse/status` (spec §6): synthesized from the in-flight run when
/// one exists, otherwise read back from the latest `parse_history` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseStatusSnapshot {
    pub id: Uuid,
    pub status: ParseStatus,
    pub started_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub error: Option<String>,
    pub progress: Option<ParseProgress>,
    pub stats: Option<ParseStats>,
}

impl From<ParseHistoryRecord> for ParseStatusSnapshot {
    fn from(record: ParseHistoryRecord) -> Self {
        ParseStatusSnapshot {
            id: record.id,
            status: record.status,
            started_at: record.started_at,
            completed_at: record.completed_at,
            error: record.error,
            progress: None,
            stats: record.stats,
        }
    }
}

#[derive(Default)]
struct RunState {
    is_parsing: bool,
    current_parse_id: Option<Uuid>,
    parse_start_time: Option<OffsetDateTime>,
    parse_progress: Option<ParseProgress>,
}

/// Releases the run lock on every exit path, including an unexpected unwind. Holding this is
/// what `is_parsing` means; dropping it is the only way `is_parsing` becomes `false` again.
struct RunGuard {
    state: Arc<Mutex<RunState>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.is_parsing = false;
        state.current_parse_id = None;
        state.parse_start_time = None;
        state.parse_progress = None;
    }
}

/// Orchestrates one ingestion run end to end — `git pull` -> walk & parse -> classify & build
/// graph -> atomic replace — recording every attempt in `parse_history` and admitting only one
/// run in flight at a time.
pub struct VaultService {
    config: Config,
    pool: Pool<Postgres>,
    git: Arc<dyn GitManager>,
    classifier: Arc<Classifier>,
    state: Arc<Mutex<RunState>>,
}

impl VaultService {
    /// Builds the classifier from `config.graph.node_classification` immediately: an invalid
    /// classification config is fatal here, at construction, rather than discovered mid-run.
    pub fn new(config: Config, pool: Pool<Postgres>, git: Arc<dyn GitManager>) -> Result<Self, VaultError> {
        let classifier = Classifier::new(&config.graph.node_classification)?;
        Ok(VaultService {
            config,
            pool,
            git,
            classifier: Arc::new(classifier),
            state: Arc::new(Mutex::new(RunState::default())),
        })
    }

    /// Snapshot of whether a run is currently in flight, and its id if so.
    pub fn is_parse_in_progress(&self) -> (bool, Option<Uuid>) {
        let state = self.state.lock();
        (state.is_parsing, state.current_parse_id)
    }

    fn acquire(&self) -> Result<(RunGuard, Uuid, OffsetDateTime), VaultError> {
        let mut state = self.state.lock();
        if state.is_parsing {
            let id = state
                .current_parse_id
                .map(|id| id.to_string())
                .unwrap_or_default();
            return Err(VaultError::ParseInProgress(id));
        }
        let id = Uuid::new_v4();
        let started_at = OffsetDateTime::now_utc();
        state.is_parsing = true;
        state.current_parse_id = Some(id);
        state.parse_start_time = Some(started_at);
        state.parse_progress = None;
        drop(state);
        Ok((
            RunGuard {
                state: Arc::clone(&self.state),
            },
            id,
            started_at,
        ))
    }

    fn set_progress(&self, progress: ParseProgress) {
        self.state.lock().parse_progress = Some(progress);
    }

    /// Run one ingestion pass. Spec §4.J steps 1-6.
    pub async fn parse_and_index_vault(&self, cancel: CancellationToken) -> Result<ParseStats, VaultError> {
        let (_guard, id, started_at) = self.acquire()?;
        let start_instant = Instant::now();

        db::metadata::start_parse_history(&self.pool, id, started_at).await?;

        let config = self.config.clone();
        let pool = self.pool.clone();
        let git = Arc::clone(&self.git);
        let classifier = Arc::clone(&self.classifier);
        let state = Arc::clone(&self.state);
        let cancel_for_task = cancel.clone();

        let join_result = tokio::spawn(async move {
            run_pipeline(config, pool, git, classifier, state, cancel_for_task).await
        })
        .await;

        let result = match join_result {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(VaultError::Panic(format!("parse pipeline panicked: {join_err}")))
            }
            Err(join_err) => Err(VaultError::Io(format!("parse task did not complete: {join_err}"))),
        };

        let completed_at = OffsetDateTime::now_utc();
        match &result {
            Ok(stats) => {
                let mut stats = stats.clone();
                stats.duration_ms = start_instant.elapsed().as_millis() as u64;
                db::metadata::complete_parse_history(&self.pool, id, completed_at, &stats).await?;
            }
            Err(err) => {
                // Best effort: if the database itself is unreachable the history row can't be
                // written either, but the run lock still releases via RunGuard's drop.
                if let Err(record_err) =
                    db::metadata::fail_parse_history(&self.pool, id, completed_at, &err.to_string()).await
                {
                    tracing::error!(error = %record_err, "failed to record failed parse run");
                }
            }
        }

        result
    }

    /// Spec §6 `GET /parse/status`: synthesized from the in-flight run if one exists, else the
    /// latest history row. A vault that has never been parsed is not an error — `None`.
    pub async fn get_parse_status(&self) -> Result<Option<ParseStatusSnapshot>, VaultError> {
        let (is_parsing, id, started_at, progress) = {
            let state = self.state.lock();
            (
                state.is_parsing,
                state.current_parse_id,
                state.parse_start_time,
                state.parse_progress.clone(),
            )
        };

        if is_parsing {
            let id = id.expect("is_parsing implies current_parse_id is set");
            let started_at = started_at.expect("is_parsing implies parse_start_time is set");
            return Ok(Some(ParseStatusSnapshot {
                id,
                status: ParseStatus::Running,
                started_at,
                completed_at: None,
                error: None,
                progress,
                stats: None,
            }));
        }

        match db::metadata::get_latest_parse(&self.pool).await {
            Ok(record) => Ok(Some(record.into())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Polls [`Self::is_parse_in_progress`] every 500ms until idle or `timeout` elapses (spec
    /// §4.J `WaitForParse`).
    pub async fn wait_for_parse(&self, timeout: Duration) -> Result<(), VaultError> {
        let deadline = Instant::now() + timeout;
        let mut saw_running = false;
        let mut interval = tokio::time::interval(Duration::from_millis(500));

        loop {
            let (is_parsing, _) = self.is_parse_in_progress();
            if is_parsing {
                saw_running = true;
            } else if saw_running {
                break;
            } else {
                // Never observed a running parse: either nothing is happening, or we arrived
                // after it already finished. Either way there's nothing to wait for.
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(VaultError::Timeout(timeout));
            }
            interval.tick().await;
        }

        match db::metadata::get_latest_parse(&self.pool).await {
            Ok(record) if record.status == ParseStatus::Failed => Err(VaultError::Io(format!(
                "parse failed: {}",
                record.error.unwrap_or_default()
            ))),
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Spec §4.J `GetVaultPath`: reads `vault_metadata["vault_path"]`.
    pub async fn get_vault_path(&self) -> Result<String, VaultError> {
        db::metadata::get(&self.pool, crate::model::METADATA_KEY_VAULT_PATH).await
    }
}

fn wrap_stage(stage: &str, err: VaultError) -> VaultError {
    match err {
        VaultError::Panic(_) => err,
        other => VaultError::Io(format!("failed to {stage}: {other}")),
    }
}

async fn run_pipeline(
    config: Config,
    pool: Pool<Postgres>,
    git: Arc<dyn GitManager>,
    classifier: Arc<Classifier>,
    state: Arc<Mutex<RunState>>,
    cancel: CancellationToken,
) -> Result<ParseStats, VaultError> {
    tokio::select! {
        _ = cancel.cancelled() => {
            return Err(VaultError::Timeout(Duration::from_secs(0)));
        }
        result = git.pull() => {
            result.map_err(|e| wrap_stage("pull vault repository", e))?;
        }
    }

    let vault_path = git.get_local_path();
    let concurrency = config.graph.resolved_concurrency();

    let walk = walker::walk_and_parse(&vault_path, concurrency).map_err(|e| wrap_stage("walk vault", e))?;
    let total_files = walk.total_files;
    let parsed_files = walk.parsed.len();
    let files_with_errors = walk.skipped.len();

    {
        let mut guard = state.lock();
        guard.parse_progress = Some(ParseProgress {
            total_files,
            processed_files: total_files,
            nodes_created: 0,
            edges_created: 0,
            error_count: files_with_errors,
        });
    }

    let now = OffsetDateTime::now_utc();
    let built = graph::build_graph(walk.parsed, &classifier, &config.graph, now);
    let total_nodes = built.nodes.len();
    let total_edges = built.edges.len();
    let unresolved_links = built.unresolved_links.len();
    let duplicate_ids = built.duplicates.len();
    let orphaned_nodes = built.orphaned_node_ids.len();
    let files_skipped = built.files_skipped;

    let progress_state = Arc::clone(&state);
    db::replace::replace_graph(&pool, &built, now, move |progress| {
        let mut guard = progress_state.lock();
        let current = guard.parse_progress.get_or_insert_with(ParseProgress::default);
        match progress {
            ReplaceProgress::NodesInserted { inserted, .. } => current.nodes_created = inserted,
            ReplaceProgress::EdgesInserted { inserted, .. } => current.edges_created = inserted,
        }
    })
    .await
    .map_err(|e| wrap_stage("replace graph", e))?;

    Ok(ParseStats {
        total_files,
        parsed_files,
        files_skipped,
        total_nodes,
        total_edges,
        duplicate_ids,
        orphaned_nodes,
        unresolved_links,
        duration_ms: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::git::NoopGitManager;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn test_config() -> Config {
        Config::default()
    }

    #[test]
    fn service_construction_rejects_invalid_classification_config() {
        let mut config = test_config();
        config.graph.node_classification.default_node_type = String::new();
        let pool = sqlx::Pool::<Postgres>::connect_lazy("postgres://localhost/does-not-matter").unwrap();
        let git: Arc<dyn GitManager> = Arc::new(NoopGitManager::new(PathBuf::from(".")));
        let result = VaultService::new(config, pool, git);
        assert!(result.is_err());
    }

    #[test]
    fn fresh_service_reports_no_parse_in_progress() {
        let pool = sqlx::Pool::<Postgres>::connect_lazy("postgres://localhost/does-not-matter").unwrap();
        let git: Arc<dyn GitManager> = Arc::new(NoopGitManager::new(PathBuf::from(".")));
        let service = VaultService::new(test_config(), pool, git).unwrap();
        let (in_progress, id) = service.is_parse_in_progress();
        assert!(!in_progress);
        assert!(id.is_none());
    }

    struct PanickingGitManager;

    #[async_trait]
    impl GitManager for PanickingGitManager {
        async fn pull(&self) -> Result<(), VaultError> {
            panic!("simulated git failure");
        }
        fn get_local_path(&self) -> PathBuf {
            PathBuf::from(".")
        }
    }

    struct BlockingGitManager {
        release: Arc<tokio::sync::Notify>,
        entered: Arc<AtomicBool>,
    }

    #[async_trait]
    impl GitManager for BlockingGitManager {
        async fn pull(&self) -> Result<(), VaultError> {
            self.entered.store(true, Ordering::SeqCst);
            self.release.notified().await;
            Ok(())
        }
        fn get_local_path(&self) -> PathBuf {
            PathBuf::from(".")
        }
    }

    // The next two tests exercise the run-lock and panic barrier against a real tokio runtime
    // but without a live database: `start_parse_history` on an unreachable pool fails fast,
    // which is enough to observe lock acquisition/release and panic conversion without needing
    // `DATABASE_URL` (see `tests/` for the full end-to-end scenarios that do need it).

    #[tokio::test]
    async fn concurrent_runs_are_rejected_without_blocking() {
        let pool = sqlx::Pool::<Postgres>::connect_lazy("postgres://localhost:1/does-not-exist").unwrap();
        let release = Arc::new(tokio::sync::Notify::new());
        let entered = Arc::new(AtomicBool::new(false));
        let git: Arc<dyn GitManager> = Arc::new(BlockingGitManager {
            release: Arc::clone(&release),
            entered: Arc::clone(&entered),
        });
        let service = Arc::new(VaultService::new(test_config(), pool, git).unwrap());

        // Directly exercise the lock rather than the full pipeline (which needs a real
        // database past `start_parse_history`): acquire once, then assert a second acquire is
        // rejected immediately.
        let (_guard, _id, _started_at) = service.acquire().unwrap();
        let second = service.acquire();
        assert!(matches!(second, Err(VaultError::ParseInProgress(_))));
    }

    #[test]
    fn lock_releases_when_guard_drops() {
        let pool = sqlx::Pool::<Postgres>::connect_lazy("postgres://localhost/does-not-matter").unwrap();
        let git: Arc<dyn GitManager> = Arc::new(NoopGitManager::new(PathBuf::from(".")));
        let service = VaultService::new(test_config(), pool, git).unwrap();

        {
            let (_guard, _id, _started_at) = service.acquire().unwrap();
            assert!(service.is_parse_in_progress().0);
        }
        assert!(!service.is_parse_in_progress().0);
    }

    #[tokio::test]
    async fn panicking_git_manager_is_caught_by_the_task_join_handle() {
        let cancel = CancellationToken::new();
        let classifier = Arc::new(Classifier::new(&Default::default()).unwrap());
        let state = Arc::new(Mutex::new(RunState::default()));
        let git: Arc<dyn GitManager> = Arc::new(PanickingGitManager);
        let pool = sqlx::Pool::<Postgres>::connect_lazy("postgres://localhost/does-not-matter").unwrap();

        let join_result = tokio::spawn(run_pipeline(
            test_config(),
            pool,
            git,
            classifier,
            state,
            cancel,
        ))
        .await;

        assert!(join_result.is_err());
        assert!(join_result.unwrap_err().is_panic());
    }
}
