//! Asset cache: reuse or refresh cached binary assets by freshness token.

use locker_source::{BlobStore, CatalogSource};

use crate::retry::retry;

/// Well-known reference returned when an asset cannot be fetched. Paired
/// with an empty freshness token so the next run always retries — the
/// placeholder never sticks as a valid cache entry.
pub const PLACEHOLDER_REF: &str = "placeholder/missing.png";

/// One asset to ensure in the cache.
#[derive(Debug, Clone)]
pub struct AssetRequest<'a> {
    /// Remote path of the binary at the source.
    pub remote_path: &'a str,
    /// Blob-store folder the cached copy lives in.
    pub folder: &'a str,
    /// Blob name within the folder.
    pub key: &'a str,
    /// Freshness token the caller stored the last time this asset was
    /// cached, if any.
    pub prior_etag: Option<&'a str>,
}

/// Flatten a remote path into a blob name.
pub fn asset_key(remote_path: &str) -> String {
    remote_path.trim_start_matches('/').replace('/', "_")
}

/// Ensure a cached copy of one remote asset, returning its blob reference
/// and freshness token.
///
/// A cached blob whose probed token matches the caller's prior token is
/// returned unchanged without a fetch. A mismatch or a missing entry fetches
/// the binary, stores it, and trashes the stale blob. Exhausted retries
/// return [`PLACEHOLDER_REF`] with an empty token instead of an error.
pub async fn ensure_asset<S: CatalogSource, B: BlobStore>(
    source: &S,
    blobs: &B,
    req: AssetRequest<'_>,
    max_attempts: u32,
) -> (String, String) {
    let blob_ref = format!("{}/{}", req.folder, req.key);

    let cached = blobs.metadata(&blob_ref).unwrap_or_else(|e| {
        log::warn!("Failed to read blob metadata for '{blob_ref}': {e}");
        None
    });

    if let (Some(meta), Some(prior)) = (&cached, req.prior_etag) {
        if !prior.is_empty() && meta.etag == prior {
            match retry(max_attempts, || source.probe(req.remote_path)).await {
                Ok(Some(current)) if current == prior => {
                    return (blob_ref, current);
                }
                Ok(_) => {
                    // Token moved (or the source stopped sending one); fall
                    // through to a fresh fetch.
                }
                Err(e) => {
                    // The probe is an optimization; keep serving the cached
                    // copy and let the next run re-validate.
                    log::warn!("Freshness probe failed for '{}': {e}", req.remote_path);
                    return (blob_ref, prior.to_string());
                }
            }
        }
    }

    match retry(max_attempts, || source.fetch_bytes(req.remote_path)).await {
        Ok((bytes, etag)) => {
            let etag = etag.unwrap_or_default();
            if cached.is_some() {
                if let Err(e) = blobs.trash(&blob_ref) {
                    log::warn!("Failed to trash stale blob '{blob_ref}': {e}");
                }
            }
            match blobs.upload(req.folder, req.key, &bytes, &etag) {
                Ok(stored_ref) => (stored_ref, etag),
                Err(e) => {
                    log::warn!("Failed to store asset '{blob_ref}': {e}");
                    (PLACEHOLDER_REF.to_string(), String::new())
                }
            }
        }
        Err(e) => {
            log::warn!(
                "Giving up on asset '{}' after {} attempts: {e}",
                req.remote_path,
                max_attempts
            );
            (PLACEHOLDER_REF.to_string(), String::new())
        }
    }
}
