use locker_db::operations::OperationError;
use locker_source::{BlobError, SourceError};
use thiserror::Error;

use crate::normalize::NormalizeError;
use crate::resolve::ResolveError;

/// Driver-level error for a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Db(#[from] OperationError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),
}

impl SyncError {
    /// Whether this error only affects a single entity, so the page can log
    /// it and continue. Store failures and rejected credentials abort the
    /// run instead — continuing would corrupt or spam.
    pub fn is_per_item(&self) -> bool {
        match self {
            Self::Normalize(_) | Self::Resolve(_) => true,
            Self::Source(e) => !matches!(e, SourceError::NeedsCredentials(_)),
            Self::Blob(_) => true,
            Self::Db(_) | Self::Sqlite(_) | Self::Bootstrap(_) => false,
        }
    }
}
