//! Vault walker / parallel parser (component D).
//!
//! The walk itself uses `walkdir`; the bounded worker pool is plain `std::thread` +
//! `std::sync::mpsc` rather than async, since this is CPU/IO-bound filesystem work with no
//! need for a reactor. Shared result state uses `parking_lot::Mutex`, matching the pattern the
//! rest of this codebase uses for other cross-thread accumulators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::error::VaultError;
use crate::fileproc::ParsedFile;

/// One markdown file discovered under the vault root, not yet parsed.
struct Candidate {
    relative_path: String,
    absolute_path: PathBuf,
}

/// A per-file failure that doesn't abort the overall walk: the file is skipped and the error
/// recorded, matching the spec's "malformed files are non-fatal" rule.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub relative_path: String,
    pub error: String,
}

/// The outcome of walking and parsing an entire vault.
pub struct WalkResult {
    pub parsed: Vec<ParsedFile>,
    pub skipped: Vec<SkippedFile>,
    pub total_files: usize,
}

/// Walk `root` for `*.md` files and parse each one, fanning the work out across `concurrency`
/// worker threads.
///
/// Directories and files are visited in `walkdir`'s default order, but because work is
/// distributed over a channel to multiple workers, completion order (and therefore the order
/// of `parsed`/`skipped`) is not guaranteed to match the directory walk. Callers that need a
/// deterministic order must sort afterwards by `relative_path`.
pub fn walk_and_parse(root: &Path, concurrency: usize) -> Result<WalkResult, VaultError> {
    let candidates = discover(root)?;
    let total_files = candidates.len();

    let worker_count = concurrency.max(1).min(total_files.max(1));
    let (work_tx, work_rx) = mpsc::channel::<Candidate>();
    let work_rx = Arc::new(Mutex::new(work_rx));

    let parsed: Arc<Mutex<Vec<ParsedFile>>> = Arc::new(Mutex::new(Vec::with_capacity(total_files)));
    let skipped: Arc<Mutex<Vec<SkippedFile>>> = Arc::new(Mutex::new(Vec::new()));
    let processed_count = Arc::new(AtomicUsize::new(0));

    for candidate in candidates {
        // Channel is unbounded: the walk has already completed, so there is no producer
        // still running that sending could block against.
        work_tx
            .send(candidate)
            .expect("receiver outlives all sends: workers join before this scope ends");
    }
    drop(work_tx);

    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let work_rx = Arc::clone(&work_rx);
        let parsed = Arc::clone(&parsed);
        let skipped = Arc::clone(&skipped);
        let processed_count = Arc::clone(&processed_count);

        handles.push(std::thread::spawn(move || loop {
            let candidate = {
                let rx = work_rx.lock();
                rx.recv()
            };
            let candidate = match candidate {
                Ok(c) => c,
                Err(mpsc::RecvError) => break,
            };

            match fs::read_to_string(&candidate.absolute_path) {
                Ok(contents) => {
                    match ParsedFile::parse(candidate.relative_path.clone(), &contents) {
                        Ok(file) => {
                            let file = match fs::metadata(&candidate.absolute_path)
                                .and_then(|meta| meta.modified())
                            {
                                Ok(modified) => file.with_modified(modified.into()),
                                Err(_) => file,
                            };
                            parsed.lock().push(file);
                        }
                        Err(err) => skipped.lock().push(SkippedFile {
                            relative_path: candidate.relative_path,
                            error: err.to_string(),
                        }),
                    }
                }
                Err(err) => skipped.lock().push(SkippedFile {
                    relative_path: candidate.relative_path,
                    error: err.to_string(),
                }),
            }

            let done = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 100 == 0 {
                tracing::info!(
                    processed = done,
                    total = total_files,
                    parsed = parsed.lock().len(),
                    failed = skipped.lock().len(),
                    "vault walk progress"
                );
            }
        }));
    }

    for handle in handles {
        handle
            .join()
            .map_err(|_| VaultError::Panic("vault walker worker thread panicked".to_string()))?;
    }

    let parsed = Arc::try_unwrap(parsed)
        .expect("all worker threads joined")
        .into_inner();
    let skipped = Arc::try_unwrap(skipped)
        .expect("all worker threads joined")
        .into_inner();

    Ok(WalkResult {
        parsed,
        skipped,
        total_files,
    })
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn discover(root: &Path) -> Result<Vec<Candidate>, VaultError> {
    let mut candidates = Vec::new();
    // Skip any directory or file whose basename begins with `.` (spec §4.D); `filter_entry`
    // prunes a hidden directory's entire subtree rather than just the directory entry itself.
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        candidates.push(Candidate {
            relative_path: relative,
            absolute_path: entry.path().to_path_buf(),
        });
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn walks_and_parses_all_markdown_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.md", "---\nid: a\n---\nBody A [[b]]");
        write_file(dir.path(), "sub/b.md", "---\nid: b\n---\nBody B");
        write_file(dir.path(), "notes.txt", "not markdown");

        let result = walk_and_parse(dir.path(), 2).unwrap();
        assert_eq!(result.total_files, 2);
        assert_eq!(result.parsed.len(), 2);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn malformed_frontmatter_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "good.md", "---\nid: good\n---\nok");
        write_file(dir.path(), "bad.md", "---\ntitle: no id\n---\nBody");

        let result = walk_and_parse(dir.path(), 2).unwrap();
        assert_eq!(result.total_files, 2);
        assert_eq!(result.parsed.len(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].relative_path, "bad.md");
    }

    #[test]
    fn hidden_files_and_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "visible.md", "---\nid: visible\n---\nok");
        write_file(dir.path(), ".hidden.md", "---\nid: hidden\n---\nshould be skipped");
        write_file(dir.path(), ".obsidian/config.md", "---\nid: config\n---\nshould be skipped");

        let result = walk_and_parse(dir.path(), 2).unwrap();
        assert_eq!(result.total_files, 1);
        assert_eq!(result.parsed[0].relative_path, "visible.md");
    }

    #[test]
    fn empty_vault_produces_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = walk_and_parse(dir.path(), 4).unwrap();
        assert_eq!(result.total_files, 0);
        assert!(result.parsed.is_empty());
    }
}
