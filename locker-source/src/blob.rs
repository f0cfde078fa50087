//! Blob storage for cached binary assets.
//!
//! The sync engine addresses blobs by `folder/name` references and never
//! deletes outright: stale entries are moved to a trash area so a bad sync
//! can be recovered by hand.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Stored metadata for one blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    /// Freshness token of the source the blob was fetched from. Empty when
    /// the source sent none.
    pub etag: String,
    pub size: u64,
    pub stored_at: String,
}

/// Blob storage as the sync engine sees it: upload by folder + name, read
/// metadata by reference, move to trash.
pub trait BlobStore {
    /// Store a blob and its metadata. Returns the blob reference.
    fn upload(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
        etag: &str,
    ) -> Result<String, BlobError>;

    /// Metadata for a blob reference, or `None` when no blob is stored there.
    fn metadata(&self, blob_ref: &str) -> Result<Option<BlobMeta>, BlobError>;

    /// Move a blob (and its metadata) to the trash area.
    fn trash(&self, blob_ref: &str) -> Result<(), BlobError>;
}

/// Filesystem-backed blob store.
///
/// Blobs live at `<root>/<folder>/<name>` with a JSON sidecar at
/// `<name>.meta`; trashed blobs move to `<root>/.trash/` with the folder
/// flattened into the file name.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, blob_ref: &str) -> PathBuf {
        self.root.join(blob_ref)
    }

    fn meta_path(&self, blob_ref: &str) -> PathBuf {
        self.root.join(format!("{blob_ref}.meta"))
    }

    fn trash_dir(&self) -> PathBuf {
        self.root.join(".trash")
    }
}

impl BlobStore for LocalBlobStore {
    fn upload(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
        etag: &str,
    ) -> Result<String, BlobError> {
        let blob_ref = format!("{folder}/{name}");
        let path = self.blob_path(&blob_ref);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;

        let meta = BlobMeta {
            etag: etag.to_string(),
            size: bytes.len() as u64,
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        std::fs::write(self.meta_path(&blob_ref), serde_json::to_vec(&meta)?)?;

        Ok(blob_ref)
    }

    fn metadata(&self, blob_ref: &str) -> Result<Option<BlobMeta>, BlobError> {
        if !self.blob_path(blob_ref).exists() {
            return Ok(None);
        }
        let meta_path = self.meta_path(blob_ref);
        let contents = match std::fs::read(&meta_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    fn trash(&self, blob_ref: &str) -> Result<(), BlobError> {
        let trash_dir = self.trash_dir();
        std::fs::create_dir_all(&trash_dir)?;

        let flattened = blob_ref.replace('/', "__");
        move_if_present(&self.blob_path(blob_ref), &trash_dir.join(&flattened))?;
        move_if_present(
            &self.meta_path(blob_ref),
            &trash_dir.join(format!("{flattened}.meta")),
        )?;
        Ok(())
    }
}

fn move_if_present(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let blob_ref = store.upload("armor", "w1.png", b"png-bytes", "etag-1").unwrap();
        assert_eq!(blob_ref, "armor/w1.png");

        let meta = store.metadata(&blob_ref).unwrap().unwrap();
        assert_eq!(meta.etag, "etag-1");
        assert_eq!(meta.size, 9);
    }

    #[test]
    fn metadata_missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(store.metadata("armor/nope.png").unwrap().is_none());
    }

    #[test]
    fn trash_removes_blob_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let blob_ref = store.upload("armor", "w1.png", b"old", "etag-1").unwrap();
        store.trash(&blob_ref).unwrap();

        assert!(store.metadata(&blob_ref).unwrap().is_none());
        assert!(dir.path().join(".trash/armor__w1.png").exists());
    }
}
