//! Diff & audit engine: compare a resolved draft against the stored record,
//! build the merged record, and produce the audit trail.
//!
//! The engine never mutates the caller's `existing` snapshot — it works on a
//! deep copy, so a failed write downstream leaves the stored record exactly
//! as it was.

use locker_catalog::types::*;
use locker_catalog::Category;
use locker_source::{BlobStore, CatalogSource};
use rusqlite::Connection;

use crate::assets::{self, AssetRequest};
use crate::context::RunContext;
use crate::error::SyncError;
use crate::normalize::CoreDraft;
use crate::report::OutcomeKind;
use crate::resolve::{self, PaletteResolution};

/// Result of reconciling one item snapshot.
#[derive(Debug)]
pub enum Outcome {
    Unchanged,
    Updated {
        record: Box<ItemRecord>,
        changes: Vec<ChangeEntry>,
    },
    Created {
        record: Box<ItemRecord>,
        changes: Vec<ChangeEntry>,
    },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Unchanged => OutcomeKind::Unchanged,
            Self::Updated { .. } => OutcomeKind::Updated,
            Self::Created { .. } => OutcomeKind::Created,
        }
    }
}

/// Result of reconciling one core snapshot.
#[derive(Debug)]
pub enum CoreOutcome {
    Unchanged,
    Updated {
        record: Box<CoreRecord>,
        changes: Vec<ChangeEntry>,
    },
    Created {
        record: Box<CoreRecord>,
        changes: Vec<ChangeEntry>,
    },
}

impl CoreOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Unchanged => OutcomeKind::Unchanged,
            Self::Updated { .. } => OutcomeKind::Updated,
            Self::Created { .. } => OutcomeKind::Created,
        }
    }
}

/// Reconcile one item draft against the stored record.
///
/// When the stored freshness token equals the source token and no override
/// applies (a kit-only correction or a newly declared core default), this
/// returns `Unchanged` without resolving a single reference — the primary
/// cost control against re-diffing thousands of unchanged snapshots.
#[allow(clippy::too_many_arguments)]
pub async fn reconcile_item<S: CatalogSource, B: BlobStore>(
    conn: &Connection,
    ctx: &mut RunContext,
    source: &S,
    blobs: &B,
    existing: Option<&ItemRecord>,
    draft: &EntityDraft,
    category: Category,
    etag: &str,
    max_attempts: u32,
) -> Result<Outcome, SyncError> {
    let now = chrono::Utc::now().to_rfc3339();

    if let Some(current) = existing {
        let newly_unkitted = current.kit_only && !draft.kit_only;
        let newly_default =
            draft.default_of_core.is_some() && current.default_of_core.is_none();
        if !current.etag.is_empty() && current.etag == etag && !newly_unkitted && !newly_default
        {
            return Ok(Outcome::Unchanged);
        }
    }

    // Resolve references before any comparison.
    let cores = resolve::resolve_cores(ctx, category, &draft.core_names);
    let attachments = resolve::resolve_attachments(conn, ctx, category, &draft.attachment_names)?;
    let kit_items = resolve::resolve_kit_items(conn, ctx, category, &draft.kit_item_ids)?;
    let mut palettes = Vec::new();
    for config in &draft.palette_configs {
        match resolve::resolve_palette(conn, ctx, config)? {
            PaletteResolution::Existing(id) => palettes.push(id),
            PaletteResolution::NeedsCreation => {
                log::debug!("Palette config '{config}' has no record yet; reference skipped");
            }
        }
    }
    let default_of_core = match &draft.default_of_core {
        Some(name) => resolve::resolve_cores(ctx, category, std::slice::from_ref(name))
            .into_iter()
            .next(),
        None => None,
    };

    let Some(current) = existing else {
        return create_item(
            ctx, source, blobs, draft, category, etag, &now, cores, attachments, kit_items,
            palettes, default_of_core, max_attempts,
        )
        .await;
    };

    // Deep copy; `current` stays untouched.
    let mut record = current.clone();
    let mut changes: Vec<ChangeEntry> = Vec::new();

    // Fixed comparison order. Every difference appends exactly one entry.
    if record.name != draft.name {
        changes.push(ChangeEntry::changed(&now, "name", &record.name, &draft.name));
        record.name = draft.name.clone();
    }

    let type_changed = record.item_type != draft.item_type;
    if type_changed {
        changes.push(ChangeEntry::changed(
            &now,
            "item_type",
            &record.item_type,
            &draft.item_type,
        ));
        record.item_type = draft.item_type.clone();
    }

    compare_lookup(
        &mut record.quality_id,
        draft.quality.as_deref(),
        &ctx.qualities,
        "quality",
        &now,
        &mut changes,
    );
    compare_lookup(
        &mut record.manufacturer_id,
        draft.manufacturer.as_deref(),
        &ctx.manufacturers,
        "manufacturer",
        &now,
        &mut changes,
    );
    compare_lookup(
        &mut record.release_id,
        draft.release.as_deref(),
        &ctx.releases,
        "release",
        &now,
        &mut changes,
    );

    if let Some(description) = &draft.description {
        if record.description.as_ref() != Some(description) {
            changes.push(ChangeEntry::changed(
                &now,
                "description",
                record.description.as_deref().unwrap_or_default(),
                description,
            ));
            record.description = Some(description.clone());
        }
    }

    // A hidden record only ever flips to visible through this path; hiding
    // again is owned by manual curation.
    if record.hidden && !draft.hidden {
        changes.push(ChangeEntry::changed(&now, "hidden", "true", "false"));
        record.hidden = false;
    }

    if record.kit_only != draft.kit_only {
        changes.push(ChangeEntry::changed(
            &now,
            "kit_only",
            record.kit_only.to_string(),
            draft.kit_only.to_string(),
        ));
        record.kit_only = draft.kit_only;
    }

    let cores_changed = compare_ref_set(&mut record.cores, &cores, "cores", &now, &mut changes);
    compare_ref_set(
        &mut record.attachments,
        &attachments,
        "attachments",
        &now,
        &mut changes,
    );
    compare_ref_set(
        &mut record.kit_items,
        &kit_items,
        "kit_items",
        &now,
        &mut changes,
    );
    compare_ref_set(
        &mut record.palettes,
        &palettes,
        "palettes",
        &now,
        &mut changes,
    );

    if let Some(core_id) = default_of_core {
        if record.default_of_core.as_ref() != Some(&core_id) {
            changes.push(ChangeEntry::changed(
                &now,
                "default_of_core",
                record.default_of_core.as_deref().unwrap_or_default(),
                &core_id,
            ));
            record.default_of_core = Some(core_id);
        }
    }

    // The image is only recomputed when its governing type or relationship
    // actually changed, or when no valid cached copy exists (a placeholder
    // carries an empty token and retries every run).
    let image_stale =
        record.image_ref.is_none() || record.image_etag.is_empty();
    if (type_changed || cores_changed || image_stale) && draft.image_path.is_some() {
        let remote_path = draft.image_path.as_deref().unwrap_or_default();
        let key = assets::asset_key(remote_path);
        let prior = (!record.image_etag.is_empty()).then_some(record.image_etag.as_str());
        let (new_ref, new_etag) = assets::ensure_asset(
            source,
            blobs,
            AssetRequest {
                remote_path,
                folder: category.schema().asset_folder,
                key: &key,
                prior_etag: prior,
            },
            max_attempts,
        )
        .await;
        if record.image_ref.as_deref() != Some(new_ref.as_str()) {
            changes.push(ChangeEntry::changed(
                &now,
                "image",
                record.image_ref.as_deref().unwrap_or_default(),
                &new_ref,
            ));
            record.image_ref = Some(new_ref);
        }
        record.image_etag = new_etag;
    }

    if changes.is_empty() {
        return Ok(Outcome::Unchanged);
    }

    record.needs_review = true;
    record.etag = etag.to_string();
    record.last_synced = now;

    Ok(Outcome::Updated {
        record: Box::new(record),
        changes,
    })
}

/// Build a brand-new item record from a resolved draft.
#[allow(clippy::too_many_arguments)]
async fn create_item<S: CatalogSource, B: BlobStore>(
    ctx: &RunContext,
    source: &S,
    blobs: &B,
    draft: &EntityDraft,
    category: Category,
    etag: &str,
    now: &str,
    cores: Vec<String>,
    attachments: Vec<String>,
    kit_items: Vec<String>,
    palettes: Vec<String>,
    default_of_core: Option<String>,
    max_attempts: u32,
) -> Result<Outcome, SyncError> {
    let mut record = ItemRecord::new(&draft.external_id, category);
    record.name = draft.name.clone();
    record.item_type = draft.item_type.clone();
    record.quality_id = resolve_lookup(draft.quality.as_deref(), &ctx.qualities, "quality");
    record.manufacturer_id = resolve_lookup(
        draft.manufacturer.as_deref(),
        &ctx.manufacturers,
        "manufacturer",
    );
    record.release_id = resolve_lookup(draft.release.as_deref(), &ctx.releases, "release");
    record.description = draft.description.clone();
    record.hidden = draft.hidden;
    record.kit_only = draft.kit_only;
    record.cores = cores;
    record.attachments = attachments;
    record.kit_items = kit_items;
    record.palettes = palettes;
    record.default_of_core = default_of_core;
    record.source_types = vec![ctx.pending_source_type().to_string()];

    if let Some(remote_path) = draft.image_path.as_deref() {
        let key = assets::asset_key(remote_path);
        let (image_ref, image_etag) = assets::ensure_asset(
            source,
            blobs,
            AssetRequest {
                remote_path,
                folder: category.schema().asset_folder,
                key: &key,
                prior_etag: None,
            },
            max_attempts,
        )
        .await;
        record.image_ref = Some(image_ref);
        record.image_etag = image_etag;
    }

    record.needs_review = true;
    record.etag = etag.to_string();
    record.last_synced = now.to_string();

    Ok(Outcome::Created {
        record: Box::new(record),
        changes: vec![ChangeEntry::created(now)],
    })
}

/// Reconcile one core draft against the stored core record.
pub async fn reconcile_core<S: CatalogSource, B: BlobStore>(
    ctx: &RunContext,
    source: &S,
    blobs: &B,
    existing: Option<&CoreRecord>,
    draft: &CoreDraft,
    category: Category,
    etag: &str,
    max_attempts: u32,
) -> Result<CoreOutcome, SyncError> {
    let now = chrono::Utc::now().to_rfc3339();

    if let Some(current) = existing {
        if !current.etag.is_empty() && current.etag == etag {
            return Ok(CoreOutcome::Unchanged);
        }
    }

    let Some(current) = existing else {
        let mut record = CoreRecord::new(&draft.external_id, category);
        record.name = draft.name.clone();
        record.quality_id = resolve_lookup(draft.quality.as_deref(), &ctx.qualities, "quality");
        record.manufacturer_id = resolve_lookup(
            draft.manufacturer.as_deref(),
            &ctx.manufacturers,
            "manufacturer",
        );
        record.release_id = resolve_lookup(draft.release.as_deref(), &ctx.releases, "release");
        record.description = draft.description.clone();
        record.hidden = draft.hidden;
        record.source_types = vec![ctx.pending_source_type().to_string()];
        if let Some(remote_path) = draft.image_path.as_deref() {
            let key = assets::asset_key(remote_path);
            let (image_ref, image_etag) = assets::ensure_asset(
                source,
                blobs,
                AssetRequest {
                    remote_path,
                    folder: category.schema().asset_folder,
                    key: &key,
                    prior_etag: None,
                },
                max_attempts,
            )
            .await;
            record.image_ref = Some(image_ref);
            record.image_etag = image_etag;
        }
        record.needs_review = true;
        record.etag = etag.to_string();
        record.last_synced = now.clone();
        return Ok(CoreOutcome::Created {
            record: Box::new(record),
            changes: vec![ChangeEntry::created(&now)],
        });
    };

    let mut record = current.clone();
    let mut changes: Vec<ChangeEntry> = Vec::new();

    let name_changed = record.name != draft.name;
    if name_changed {
        changes.push(ChangeEntry::changed(&now, "name", &record.name, &draft.name));
        record.name = draft.name.clone();
    }

    compare_lookup(
        &mut record.quality_id,
        draft.quality.as_deref(),
        &ctx.qualities,
        "quality",
        &now,
        &mut changes,
    );
    compare_lookup(
        &mut record.manufacturer_id,
        draft.manufacturer.as_deref(),
        &ctx.manufacturers,
        "manufacturer",
        &now,
        &mut changes,
    );
    compare_lookup(
        &mut record.release_id,
        draft.release.as_deref(),
        &ctx.releases,
        "release",
        &now,
        &mut changes,
    );

    if let Some(description) = &draft.description {
        if record.description.as_ref() != Some(description) {
            changes.push(ChangeEntry::changed(
                &now,
                "description",
                record.description.as_deref().unwrap_or_default(),
                description,
            ));
            record.description = Some(description.clone());
        }
    }

    if record.hidden && !draft.hidden {
        changes.push(ChangeEntry::changed(&now, "hidden", "true", "false"));
        record.hidden = false;
    }

    let image_stale = record.image_ref.is_none() || record.image_etag.is_empty();
    if (name_changed || image_stale) && draft.image_path.is_some() {
        let remote_path = draft.image_path.as_deref().unwrap_or_default();
        let key = assets::asset_key(remote_path);
        let prior = (!record.image_etag.is_empty()).then_some(record.image_etag.as_str());
        let (new_ref, new_etag) = assets::ensure_asset(
            source,
            blobs,
            AssetRequest {
                remote_path,
                folder: category.schema().asset_folder,
                key: &key,
                prior_etag: prior,
            },
            max_attempts,
        )
        .await;
        if record.image_ref.as_deref() != Some(new_ref.as_str()) {
            changes.push(ChangeEntry::changed(
                &now,
                "image",
                record.image_ref.as_deref().unwrap_or_default(),
                &new_ref,
            ));
            record.image_ref = Some(new_ref);
        }
        record.image_etag = new_etag;
    }

    if changes.is_empty() {
        return Ok(CoreOutcome::Unchanged);
    }

    record.needs_review = true;
    record.etag = etag.to_string();
    record.last_synced = now;

    Ok(CoreOutcome::Updated {
        record: Box::new(record),
        changes,
    })
}

// ── Comparison helpers ──────────────────────────────────────────────────────

/// Compare a reference set by set equality irrespective of order. A changed
/// set replaces the whole array and is logged as one entry naming the field.
/// Empty incoming sets never touch the stored set.
fn compare_ref_set(
    stored: &mut Vec<String>,
    incoming: &[String],
    field: &'static str,
    now: &str,
    changes: &mut Vec<ChangeEntry>,
) -> bool {
    if incoming.is_empty() {
        return false;
    }
    let mut old_sorted = stored.clone();
    old_sorted.sort();
    let mut new_sorted = incoming.to_vec();
    new_sorted.sort();
    if old_sorted == new_sorted {
        return false;
    }

    changes.push(ChangeEntry::changed(
        now,
        field,
        stored.join(", "),
        incoming.join(", "),
    ));
    *stored = incoming.to_vec();
    true
}

/// Resolve a raw dictionary name and fold a difference into the record.
/// Absent or unresolvable names never clear the stored reference.
fn compare_lookup(
    stored: &mut Option<String>,
    raw: Option<&str>,
    map: &std::collections::HashMap<String, String>,
    field: &'static str,
    now: &str,
    changes: &mut Vec<ChangeEntry>,
) {
    let Some(resolved) = resolve_lookup(raw, map, field) else {
        return;
    };
    if stored.as_ref() != Some(&resolved) {
        changes.push(ChangeEntry::changed(
            now,
            field,
            stored.as_deref().unwrap_or_default(),
            &resolved,
        ));
        *stored = Some(resolved);
    }
}

fn resolve_lookup(
    raw: Option<&str>,
    map: &std::collections::HashMap<String, String>,
    field: &'static str,
) -> Option<String> {
    let name = raw?;
    match map.get(name) {
        Some(id) => Some(id.clone()),
        None => {
            log::debug!("Unknown {field} name '{name}' in snapshot; keeping stored value");
            None
        }
    }
}
