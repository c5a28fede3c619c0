//! Outbound git collaborator surface.
//!
//! The core only consumes `pull`/`get_local_path`; everything else about git integration is a
//! host responsibility and out of scope here. Modeled as a trait so tests can supply a fake
//! that blocks or panics on demand (seed scenarios 5 and 6).

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::VaultError;

/// Capability the vault service depends on to refresh the working tree before ingesting it.
#[async_trait]
pub trait GitManager: Send + Sync {
    async fn pull(&self) -> Result<(), VaultError>;
    fn get_local_path(&self) -> PathBuf;
}

/// A [`GitManager`] that treats a fixed local directory as already up to date. Useful when the
/// vault isn't backed by git at all, or for tests that don't exercise the pull step.
pub struct NoopGitManager {
    local_path: PathBuf,
}

impl NoopGitManager {
    pub fn new(local_path: PathBuf) -> Self {
        NoopGitManager { local_path }
    }
}

#[async_trait]
impl GitManager for NoopGitManager {
    async fn pull(&self) -> Result<(), VaultError> {
        Ok(())
    }

    fn get_local_path(&self) -> PathBuf {
        self.local_path.clone()
    }
}
