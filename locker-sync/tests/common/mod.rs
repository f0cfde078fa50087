//! Shared fakes and seed helpers for the sync-engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use locker_catalog::Category;
use locker_db::operations::{self, LookupKind};
use locker_source::{BlobError, BlobMeta, BlobStore, CatalogSource, FetchResult, SourceError};
use rusqlite::Connection;
use serde_json::Value;

// ── Fake catalog source ─────────────────────────────────────────────────────

/// In-memory catalog source with call counters.
#[derive(Default)]
pub struct FakeSource {
    snapshots: Mutex<HashMap<String, (Value, Option<String>)>>,
    assets: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
    pub fetch_calls: AtomicU64,
    pub probe_calls: AtomicU64,
    pub bytes_calls: AtomicU64,
    /// Force every binary fetch to fail with a server error.
    pub fail_bytes: AtomicBool,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_snapshot(&self, path: &str, body: Value, etag: &str) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(path.to_string(), (body, Some(etag.to_string())));
    }

    pub fn put_asset(&self, path: &str, bytes: &[u8], etag: &str) {
        self.assets
            .lock()
            .unwrap()
            .insert(path.to_string(), (bytes.to_vec(), Some(etag.to_string())));
    }

    pub fn remove_snapshot(&self, path: &str) {
        self.snapshots.lock().unwrap().remove(path);
    }

    pub fn fetches(&self) -> u64 {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    pub fn probes(&self) -> u64 {
        self.probe_calls.load(Ordering::Relaxed)
    }

    pub fn byte_fetches(&self) -> u64 {
        self.bytes_calls.load(Ordering::Relaxed)
    }
}

impl CatalogSource for FakeSource {
    async fn fetch(
        &self,
        path: &str,
        prior_etag: Option<&str>,
    ) -> Result<FetchResult, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshots.lock().unwrap().get(path).cloned();
        let Some((body, etag)) = snapshot else {
            return Err(SourceError::NotFound {
                path: path.to_string(),
            });
        };
        if let (Some(prior), Some(current)) = (prior_etag, etag.as_deref()) {
            if prior == current {
                return Ok(FetchResult::NotModified);
            }
        }
        Ok(FetchResult::Fetched { body, etag })
    }

    async fn probe(&self, path: &str) -> Result<Option<String>, SourceError> {
        self.probe_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .assets
            .lock()
            .unwrap()
            .get(path)
            .and_then(|(_, etag)| etag.clone()))
    }

    async fn fetch_bytes(&self, path: &str) -> Result<(Vec<u8>, Option<String>), SourceError> {
        self.bytes_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_bytes.load(Ordering::Relaxed) {
            return Err(SourceError::ServerError {
                status: 500,
                message: "forced failure".to_string(),
            });
        }
        let asset = self.assets.lock().unwrap().get(path).cloned();
        match asset {
            Some((bytes, etag)) => Ok((bytes, etag)),
            None => Err(SourceError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}

// ── In-memory blob store ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryBlobs {
    blobs: Mutex<HashMap<String, (Vec<u8>, BlobMeta)>>,
    trashed: Mutex<Vec<String>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trashed_refs(&self) -> Vec<String> {
        self.trashed.lock().unwrap().clone()
    }

    pub fn contains(&self, blob_ref: &str) -> bool {
        self.blobs.lock().unwrap().contains_key(blob_ref)
    }
}

impl BlobStore for MemoryBlobs {
    fn upload(
        &self,
        folder: &str,
        name: &str,
        bytes: &[u8],
        etag: &str,
    ) -> Result<String, BlobError> {
        let blob_ref = format!("{folder}/{name}");
        let meta = BlobMeta {
            etag: etag.to_string(),
            size: bytes.len() as u64,
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        self.blobs
            .lock()
            .unwrap()
            .insert(blob_ref.clone(), (bytes.to_vec(), meta));
        Ok(blob_ref)
    }

    fn metadata(&self, blob_ref: &str) -> Result<Option<BlobMeta>, BlobError> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .get(blob_ref)
            .map(|(_, meta)| meta.clone()))
    }

    fn trash(&self, blob_ref: &str) -> Result<(), BlobError> {
        self.blobs.lock().unwrap().remove(blob_ref);
        self.trashed.lock().unwrap().push(blob_ref.to_string());
        Ok(())
    }
}

// ── Seed helpers ────────────────────────────────────────────────────────────

/// In-memory store with the bootstrap dictionaries seeded.
pub fn seed_db() -> Connection {
    let conn = locker_db::open_memory().unwrap();

    for (id, name) in [
        ("q-common", "Common"),
        ("q-rare", "Rare"),
        ("q-legendary", "Legendary"),
    ] {
        operations::upsert_lookup(&conn, LookupKind::Quality, id, name).unwrap();
    }
    for (id, name) in [("m-forge", "Forge Dynamics"), ("m-aster", "Aster Works")] {
        operations::upsert_lookup(&conn, LookupKind::Manufacturer, id, name).unwrap();
    }
    for (id, name) in [("rel-1", "Season One"), ("rel-2", "Season Two")] {
        operations::upsert_lookup(&conn, LookupKind::Release, id, name).unwrap();
    }
    for (id, name) in [
        ("st-pending", "Pending"),
        ("st-shop", "Shop"),
        ("st-pass", "Pass"),
        ("st-challenge", "Challenge"),
    ] {
        operations::upsert_lookup(&conn, LookupKind::SourceType, id, name).unwrap();
    }

    conn
}

/// Insert a core row directly, for resolution tests.
pub fn seed_core(conn: &Connection, category: Category, id: &str, name: &str) {
    let mut core = locker_catalog::CoreRecord::new(id, category);
    core.name = name.to_string();
    core.etag = "seed".to_string();
    operations::upsert_core(conn, &core).unwrap();
}

/// A minimal armor item snapshot.
pub fn armor_snapshot(name: &str, slot: &str, cores: &[&str]) -> Value {
    serde_json::json!({
        "Title": name,
        "Slot": slot,
        "Description": format!("{name} description"),
        "Quality": "Rare",
        "Manufacturer": "Forge Dynamics",
        "Season": "Season One",
        "ParentCores": cores,
        "HideUntilOwned": false,
    })
}
