use std::{io, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The single error type returned by every public API in this crate.
///
/// Variants are the ones named in the spec's error-handling design: per-file parse problems
/// are non-fatal and recorded rather than returned, but everything that legitimately aborts a
/// stage or a run surfaces as one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum VaultError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("parse already in progress (id={0})")]
    ParseInProgress(String),

    #[error("invalid frontmatter: {0}")]
    InvalidHeader(String),

    #[error("frontmatter present but missing required 'id' field")]
    MissingId,

    #[error("invalid classification config: {0}")]
    InvalidConfig(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("(de)serialization error: {0}")]
    Serialization(String),

    #[error("panic during parse: {0}")]
    Panic(String),
}

impl VaultError {
    /// True for variants a caller can treat as "nothing was there", matching the spec's
    /// distinction between `NotFound` and every other failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }

    pub fn is_parse_in_progress(&self) -> bool {
        matches!(self, VaultError::ParseInProgress(_))
    }

    /// An HTTP status code a host's web layer can use without this crate depending on an HTTP
    /// stack itself. Plain `u16` rather than a typed status so the host picks its own crate for
    /// that translation.
    pub fn status_code(&self) -> u16 {
        match self {
            VaultError::NotFound(_) => 404,
            VaultError::ParseInProgress(_) => 409,
            VaultError::InvalidHeader(_) => 400,
            VaultError::MissingId => 400,
            VaultError::InvalidConfig(_) => 400,
            VaultError::Timeout(_) => 504,
            VaultError::Io(_) => 500,
            VaultError::Serialization(_) => 500,
            VaultError::Panic(_) => 500,
        }
    }
}

impl From<io::Error> for VaultError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VaultError::NotFound(format!("{err}")),
            _ => VaultError::Io(format!("{err}")),
        }
    }
}

impl From<walkdir::Error> for VaultError {
    fn from(err: walkdir::Error) -> Self {
        VaultError::Io(format!("vault walk failed: {err}"))
    }
}

impl From<serde_yaml::Error> for VaultError {
    fn from(err: serde_yaml::Error) -> Self {
        VaultError::InvalidHeader(format!("{err}"))
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(format!("{err}"))
    }
}

impl From<regex::Error> for VaultError {
    fn from(err: regex::Error) -> Self {
        VaultError::InvalidConfig(format!("invalid regex: {err}"))
    }
}

impl From<toml::de::Error> for VaultError {
    fn from(err: toml::de::Error) -> Self {
        VaultError::Serialization(format!("toml deserialization error: {err}"))
    }
}

impl From<uuid::Error> for VaultError {
    fn from(err: uuid::Error) -> Self {
        VaultError::Serialization(format!("uuid conversion failed: {err}"))
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => VaultError::NotFound("row not found".to_string()),
            other => VaultError::Io(format!("database error: {other}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for VaultError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        VaultError::Io(format!("migration error: {err}"))
    }
}
