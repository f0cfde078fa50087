//! Checkpointed batch driver: walk large input lists through the pipeline
//! in bounded pages with a resumable offset.
//!
//! A page processes entries in input order, deduplicates by path within the
//! run, and reconciles kit children and attachments before the parent item
//! that references them. Every store write and network fetch runs under the
//! bounded [`retry`] helper. Whole-run serialization is the operator's
//! responsibility: no cross-run lock is taken.

use std::collections::{BTreeMap, HashMap};

use futures::stream::{self, StreamExt};
use locker_catalog::types::{PaletteRecord, PaletteSlot, RecordKind};
use locker_catalog::Category;
use locker_db::{operations, queries};
use locker_source::{BlobStore, CatalogSource, FetchResult, SourceError};
use rusqlite::Connection;

use crate::assets::{self, AssetRequest};
use crate::availability;
use crate::context::{ProcessedPath, RunContext};
use crate::diff::{self, CoreOutcome, Outcome};
use crate::error::SyncError;
use crate::normalize::{self, DraftHints};
use crate::progress::SyncProgress;
use crate::report::{LifecycleReport, OutcomeKind, SyncStats};
use crate::resolve::{self, PaletteResolution};
use crate::retry::{retry, retry_blocking, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_PREFETCH_WORKERS: usize = 4;

/// Options for one category's batch pass.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub category: Category,
    /// Checkpoint key; one persisted offset per named input list.
    pub list_name: String,
    pub page_size: usize,
    pub max_attempts: u32,
    /// Concurrency ceiling for bulk palette-asset prefetching.
    pub prefetch_workers: usize,
}

impl BatchOptions {
    pub fn new(category: Category, list_name: impl Into<String>) -> Self {
        Self {
            category,
            list_name: list_name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            prefetch_workers: DEFAULT_PREFETCH_WORKERS,
        }
    }
}

/// Result of driving one page through the pipeline.
#[derive(Debug)]
pub struct PageOutcome {
    /// Offset this page started at.
    pub offset: usize,
    /// Persisted offset for the next run; 0 once the list is exhausted.
    pub next_offset: usize,
    /// The final page was observed, so the checkpoint was reset.
    pub list_finished: bool,
    /// Per-path outcome for the page's own entries (children reconciled on
    /// the way are counted in `stats` only).
    pub outcomes: Vec<(String, OutcomeKind)>,
    pub stats: SyncStats,
}

/// Per-child context threaded through recursive item processing.
#[derive(Debug, Clone, Default)]
struct ChildContext {
    kit_only: bool,
    parent_type: Option<String>,
    parent_cores: Vec<String>,
}

/// Drive one page of item paths, starting at the persisted offset.
pub async fn run_page<S: CatalogSource, B: BlobStore>(
    conn: &Connection,
    ctx: &mut RunContext,
    source: &S,
    blobs: &B,
    options: &BatchOptions,
    paths: &[String],
    progress: &dyn SyncProgress,
) -> Result<PageOutcome, SyncError> {
    let offset = queries::checkpoint(conn, &options.list_name)?.min(paths.len());
    let end = (offset + options.page_size.max(1)).min(paths.len());
    let page = &paths[offset..end];

    progress.on_phase(&format!(
        "Reconciling {} '{}': paths {}..{} of {}",
        options.category,
        options.list_name,
        offset,
        end,
        paths.len(),
    ));

    let mut stats = SyncStats::default();
    let mut outcomes = Vec::new();

    for (i, path) in page.iter().enumerate() {
        match process_item_path(
            conn,
            ctx,
            source,
            blobs,
            options,
            &mut stats,
            path,
            ChildContext::default(),
        )
        .await
        {
            Ok((_done, Some(kind))) => outcomes.push((path.clone(), kind)),
            Ok((_done, None)) => {
                // Already reconciled earlier in this run via another parent.
                stats.skipped += 1;
            }
            Err(e) if e.is_per_item() => {
                log::warn!("Skipping '{path}': {e}");
                stats.errors += 1;
            }
            Err(e) => return Err(e),
        }
        progress.on_item(i + 1, page.len(), path);
    }

    let list_finished = end >= paths.len();
    let next_offset = if list_finished { 0 } else { end };
    retry_blocking(options.max_attempts, || {
        operations::set_checkpoint(conn, &options.list_name, next_offset)
    })?;

    progress.on_complete(&format!("Page done: {}", stats.summary()));

    Ok(PageOutcome {
        offset,
        next_offset,
        list_finished,
        outcomes,
        stats,
    })
}

/// Reconcile one item path, its children first.
///
/// Returns the processed identity plus the outcome, or `None` for the
/// outcome when the path was already handled earlier in this run.
#[allow(clippy::too_many_arguments)]
async fn process_item_path<S: CatalogSource, B: BlobStore>(
    conn: &Connection,
    ctx: &mut RunContext,
    source: &S,
    blobs: &B,
    options: &BatchOptions,
    stats: &mut SyncStats,
    path: &str,
    child_ctx: ChildContext,
) -> Result<(ProcessedPath, Option<OutcomeKind>), SyncError> {
    if let Some(done) = ctx.processed.get(path) {
        return Ok((done.clone(), None));
    }

    let probe_id = normalize::external_id_from_path(path);
    let mut existing = retry_blocking(options.max_attempts, || {
        operations::get_item(conn, options.category, &probe_id)
    })?;

    let default_hint = ctx
        .known_defaults
        .get(&(options.category, probe_id.clone()))
        .cloned();

    // Conditional fetch: only when the stored token could short-circuit the
    // diff anyway, i.e. no kit-only correction and no newly declared default.
    let prior_etag = existing.as_ref().and_then(|cur| {
        let newly_unkitted = cur.kit_only && !child_ctx.kit_only;
        let newly_default = default_hint.is_some() && cur.default_of_core.is_none();
        (!cur.etag.is_empty() && !newly_unkitted && !newly_default).then(|| cur.etag.clone())
    });

    let fetched = retry(options.max_attempts, || {
        source.fetch(path, prior_etag.as_deref())
    })
    .await
    .map_err(SyncError::from)?;

    let (body, etag) = match fetched {
        FetchResult::NotModified => {
            let Some(cur) = existing else {
                return Err(SyncError::Source(SourceError::Api(format!(
                    "source returned not-modified for '{path}' without a prior token"
                ))));
            };
            let done = ProcessedPath {
                external_id: cur.id.clone(),
                title: cur.name.clone(),
            };
            ctx.processed.insert(path.to_string(), done.clone());
            stats.tally_item(OutcomeKind::Unchanged);
            return Ok((done, Some(OutcomeKind::Unchanged)));
        }
        FetchResult::Fetched { body, etag } => (body, etag),
    };
    let etag = etag.unwrap_or_default();

    // Children before the parent that references them.
    let (attachment_paths, kit_paths) = normalize::child_paths(&body, options.category);
    let parent_cores = normalize::raw_core_names(&body, options.category);
    let parent_type = normalize::raw_item_type(&body, options.category);

    let mut attachment_names = Vec::new();
    for child in &attachment_paths {
        let cctx = ChildContext {
            kit_only: false,
            parent_type: parent_type.clone(),
            parent_cores: parent_cores.clone(),
        };
        match Box::pin(process_item_path(
            conn, ctx, source, blobs, options, stats, child, cctx,
        ))
        .await
        {
            Ok((done, _)) => attachment_names.push(done.title),
            Err(e) if e.is_per_item() => {
                log::warn!("Skipping attachment '{child}' of '{path}': {e}");
                stats.errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let mut kit_item_ids = Vec::new();
    for child in &kit_paths {
        let cctx = ChildContext {
            kit_only: true,
            parent_type: parent_type.clone(),
            parent_cores: parent_cores.clone(),
        };
        match Box::pin(process_item_path(
            conn, ctx, source, blobs, options, stats, child, cctx,
        ))
        .await
        {
            Ok((done, _)) => kit_item_ids.push(done.external_id),
            Err(e) if e.is_per_item() => {
                log::warn!("Skipping kit child '{child}' of '{path}': {e}");
                stats.errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let hints = DraftHints {
        attachment_names,
        kit_item_ids,
        default_of_core: default_hint,
        kit_only: child_ctx.kit_only,
        parent_type: child_ctx.parent_type,
        parent_cores: child_ctx.parent_cores,
    };
    let draft = normalize::normalize(path, &body, options.category, &hints)?;

    // Palettes are created eagerly so the diff only ever references
    // existing records.
    for config in &draft.palette_configs {
        if let PaletteResolution::NeedsCreation = resolve::resolve_palette(conn, ctx, config)? {
            create_palette(conn, ctx, source, blobs, config, options, stats).await?;
        }
    }

    if draft.external_id != probe_id {
        existing = retry_blocking(options.max_attempts, || {
            operations::get_item(conn, options.category, &draft.external_id)
        })?;
    }

    let outcome = diff::reconcile_item(
        conn,
        ctx,
        source,
        blobs,
        existing.as_ref(),
        &draft,
        options.category,
        &etag,
        options.max_attempts,
    )
    .await?;

    let kind = outcome.kind();
    match &outcome {
        Outcome::Created { record, changes } | Outcome::Updated { record, changes } => {
            retry_blocking(options.max_attempts, || operations::upsert_item(conn, record))?;
            retry_blocking(options.max_attempts, || {
                operations::append_changes(
                    conn,
                    RecordKind::Item,
                    options.category,
                    &record.id,
                    changes,
                )
            })?;
        }
        Outcome::Unchanged => {
            // No field changed but the source may have re-tokenized the
            // snapshot; refresh the token so the next run short-circuits.
            if let Some(cur) = existing.as_ref() {
                if !etag.is_empty() && cur.etag != etag {
                    let now = chrono::Utc::now().to_rfc3339();
                    retry_blocking(options.max_attempts, || {
                        operations::touch_item_sync(
                            conn,
                            options.category,
                            &cur.id,
                            &etag,
                            &now,
                        )
                    })?;
                }
            }
        }
    }
    stats.tally_item(kind);

    let done = ProcessedPath {
        external_id: draft.external_id.clone(),
        title: draft.name.clone(),
    };
    ctx.processed.insert(path.to_string(), done.clone());
    Ok((done, Some(kind)))
}

// ── Palette Creation ────────────────────────────────────────────────────────

/// One asset to prefetch into the blob cache.
#[derive(Debug, Clone)]
struct AssetJob {
    remote_path: String,
    folder: String,
    key: String,
}

/// Bulk-prefetch assets with a bounded worker fan-out. Results are keyed by
/// remote path; a failed fetch maps to the placeholder reference.
async fn prefetch_assets<S: CatalogSource, B: BlobStore>(
    source: &S,
    blobs: &B,
    jobs: Vec<AssetJob>,
    workers: usize,
    max_attempts: u32,
) -> HashMap<String, (String, String)> {
    stream::iter(jobs)
        .map(|job| async move {
            let stored = assets::ensure_asset(
                source,
                blobs,
                AssetRequest {
                    remote_path: &job.remote_path,
                    folder: &job.folder,
                    key: &job.key,
                    prior_etag: None,
                },
                max_attempts,
            )
            .await;
            (job.remote_path, stored)
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

/// Fetch a palette configuration, prefetch its slot assets, and persist the
/// new record.
async fn create_palette<S: CatalogSource, B: BlobStore>(
    conn: &Connection,
    ctx: &mut RunContext,
    source: &S,
    blobs: &B,
    config_id: &str,
    options: &BatchOptions,
    stats: &mut SyncStats,
) -> Result<(), SyncError> {
    let path = format!("palettes/{config_id}.json");
    let fetched = retry(options.max_attempts, || source.fetch(&path, None))
        .await
        .map_err(SyncError::from)?;
    let (body, _etag) = fetched_body(&path, fetched)?;
    let draft = normalize::normalize_palette(config_id, &body)?;

    let mut jobs = Vec::new();
    for slot in &draft.slots {
        for remote in [&slot.primary_path, &slot.secondary_path] {
            if !remote.is_empty() {
                jobs.push(AssetJob {
                    remote_path: remote.clone(),
                    folder: "palettes".to_string(),
                    key: assets::asset_key(remote),
                });
            }
        }
    }
    let cached = prefetch_assets(source, blobs, jobs, options.prefetch_workers, options.max_attempts).await;
    let blob_ref_for = |remote: &str| {
        cached
            .get(remote)
            .map(|(blob_ref, _)| blob_ref.clone())
            .unwrap_or_default()
    };

    let mut slots = BTreeMap::new();
    for slot in draft.slots {
        slots.insert(
            slot.nameplate_id.clone(),
            PaletteSlot {
                primary_ref: blob_ref_for(&slot.primary_path),
                secondary_ref: blob_ref_for(&slot.secondary_path),
                text_color: slot.text_color,
            },
        );
    }

    let record = PaletteRecord {
        id: config_id.to_string(),
        config_id: config_id.to_string(),
        name: draft.name,
        slots,
    };
    retry_blocking(options.max_attempts, || {
        operations::upsert_palette(conn, &record)
    })?;
    ctx.memoize_palette(config_id, record.id.clone());
    stats.palettes_created += 1;
    log::debug!("Created palette '{}' ({config_id})", record.name);
    Ok(())
}

// ── Cores ───────────────────────────────────────────────────────────────────

/// Reconcile a category's core snapshots, extending the run's core-name map
/// and default-item hints as it goes. Cores come before item pages so item
/// drafts can resolve their parents.
pub async fn sync_cores<S: CatalogSource, B: BlobStore>(
    conn: &Connection,
    ctx: &mut RunContext,
    source: &S,
    blobs: &B,
    category: Category,
    paths: &[String],
    max_attempts: u32,
) -> Result<SyncStats, SyncError> {
    let mut stats = SyncStats::default();
    for path in paths {
        if ctx.processed.contains_key(path) {
            stats.skipped += 1;
            continue;
        }
        match sync_one_core(conn, ctx, source, blobs, category, path, max_attempts, &mut stats)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_per_item() => {
                log::warn!("Skipping core '{path}': {e}");
                stats.errors += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
async fn sync_one_core<S: CatalogSource, B: BlobStore>(
    conn: &Connection,
    ctx: &mut RunContext,
    source: &S,
    blobs: &B,
    category: Category,
    path: &str,
    max_attempts: u32,
    stats: &mut SyncStats,
) -> Result<(), SyncError> {
    let probe_id = normalize::external_id_from_path(path);
    let mut existing = retry_blocking(max_attempts, || {
        operations::get_core(conn, category, &probe_id)
    })?;

    let prior_etag = existing
        .as_ref()
        .filter(|cur| !cur.etag.is_empty())
        .map(|cur| cur.etag.clone());

    let fetched = retry(max_attempts, || source.fetch(path, prior_etag.as_deref()))
        .await
        .map_err(SyncError::from)?;

    let (body, etag) = match fetched {
        FetchResult::NotModified => {
            if let Some(cur) = existing {
                ctx.processed.insert(
                    path.to_string(),
                    ProcessedPath {
                        external_id: cur.id,
                        title: cur.name,
                    },
                );
                stats.tally_core(OutcomeKind::Unchanged);
            }
            return Ok(());
        }
        FetchResult::Fetched { body, etag } => (body, etag),
    };
    let etag = etag.unwrap_or_default();

    let draft = normalize::normalize_core(path, &body, category)?;
    if draft.external_id != probe_id {
        existing = retry_blocking(max_attempts, || {
            operations::get_core(conn, category, &draft.external_id)
        })?;
    }

    let outcome = diff::reconcile_core(
        ctx,
        source,
        blobs,
        existing.as_ref(),
        &draft,
        category,
        &etag,
        max_attempts,
    )
    .await?;

    match &outcome {
        CoreOutcome::Created { record, changes } | CoreOutcome::Updated { record, changes } => {
            retry_blocking(max_attempts, || operations::upsert_core(conn, record))?;
            retry_blocking(max_attempts, || {
                operations::append_changes(conn, RecordKind::Core, category, &record.id, changes)
            })?;
        }
        CoreOutcome::Unchanged => {
            if let Some(cur) = existing.as_ref() {
                if !etag.is_empty() && cur.etag != etag {
                    let now = chrono::Utc::now().to_rfc3339();
                    retry_blocking(max_attempts, || {
                        operations::touch_core_sync(conn, category, &cur.id, &etag, &now)
                    })?;
                }
            }
        }
    }
    stats.tally_core(outcome.kind());

    ctx.memoize_core(category, draft.name.clone(), draft.external_id.clone());
    if let Some(default_id) = &draft.default_item_id {
        ctx.known_defaults
            .insert((category, default_id.clone()), draft.name.clone());
    }
    ctx.processed.insert(
        path.to_string(),
        ProcessedPath {
            external_id: draft.external_id,
            title: draft.name,
        },
    );
    Ok(())
}

// ── Listings ────────────────────────────────────────────────────────────────

/// Fetch and normalize one page of listing snapshots, then fold it into the
/// availability lifecycle.
pub async fn run_listing_pass<S: CatalogSource>(
    conn: &Connection,
    ctx: &mut RunContext,
    source: &S,
    kind: locker_catalog::ListingKind,
    paths: &[String],
    max_attempts: u32,
) -> Result<LifecycleReport, SyncError> {
    let mut drafts = Vec::new();
    for path in paths {
        let fetched = match retry(max_attempts, || source.fetch(path, None)).await {
            Ok(fetched) => fetched,
            Err(e) => {
                let e = SyncError::from(e);
                if e.is_per_item() {
                    log::warn!("Skipping listing '{path}': {e}");
                    continue;
                }
                return Err(e);
            }
        };
        let (body, _etag) = fetched_body(path, fetched)?;
        match normalize::normalize_listing(path, &body, kind) {
            Ok(draft) => drafts.push(draft),
            Err(e) => log::warn!("Skipping listing '{path}': {e}"),
        }
    }

    availability::apply_listing_page(conn, ctx, kind, &drafts, max_attempts)
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn fetched_body(
    path: &str,
    fetched: FetchResult,
) -> Result<(serde_json::Value, Option<String>), SyncError> {
    match fetched {
        FetchResult::Fetched { body, etag } => Ok((body, etag)),
        FetchResult::NotModified => Err(SyncError::Source(SourceError::Api(format!(
            "source returned not-modified for '{path}' without a prior token"
        )))),
    }
}
