//! Availability lifecycle: fold one freshly fetched listing page into the
//! stored listings and fan availability out to the records they reference.
//!
//! A listing transitions `Unavailable → Available` when it appears on the
//! page without being in the previously-available set, and back when a
//! previously-available listing is absent. Referenced item/core records only
//! ever *gain* availability here — shared sub-items are owned by the union
//! of all listings that reference them, so no single listing's departure
//! revokes them.

use std::collections::{BTreeMap, HashSet};

use locker_catalog::types::*;
use locker_catalog::{Category, ANY_CORE};
use locker_db::{operations, queries};
use rusqlite::Connection;

use crate::context::RunContext;
use crate::error::SyncError;
use crate::normalize::ListingDraft;
use crate::report::{ItemSummary, LifecycleReport, ListingTransition};
use crate::retry::retry_blocking;

/// Apply one page of listing snapshots of a single kind.
///
/// Within one pass a given listing undergoes at most one transition: the
/// became-available set is drawn from the page, the became-unavailable set
/// from previously-available listings absent from it, and the two cannot
/// overlap.
pub fn apply_listing_page(
    conn: &Connection,
    ctx: &mut RunContext,
    kind: ListingKind,
    drafts: &[ListingDraft],
    max_attempts: u32,
) -> Result<LifecycleReport, SyncError> {
    let now = chrono::Utc::now().to_rfc3339();
    let previously_available: HashSet<String> =
        queries::available_listing_ids(conn, kind)?.into_iter().collect();
    let on_page: HashSet<String> = drafts.iter().map(|d| d.external_id.clone()).collect();

    let mut report = LifecycleReport::default();

    for draft in drafts {
        let refs = resolve_listing_refs(conn, ctx, draft)?;

        let mut listing = ListingRecord::new(&draft.external_id, kind);
        listing.name = draft.name.clone();
        listing.description = draft.description.clone();
        listing.price = draft.price;
        listing.direct_available = draft.direct;
        listing.bundle_available = draft.bundle;
        listing.refs = refs;
        listing.last_synced = now.clone();
        retry_blocking(max_attempts, || operations::upsert_listing(conn, &listing))?;

        if previously_available.contains(&draft.external_id) {
            continue;
        }

        // Transition to Available.
        retry_blocking(max_attempts, || {
            operations::push_listing_date(conn, &draft.external_id, &now)
        })?;
        let latest = queries::latest_price(conn, &draft.external_id)?;
        if latest != Some(draft.price) {
            retry_blocking(max_attempts, || {
                operations::push_listing_price(conn, &draft.external_id, draft.price)
            })?;
        }

        let mut items = Vec::new();
        for targets in listing.refs.values() {
            for target in targets {
                if let Some(summary) =
                    fan_out_available(conn, ctx, target, &draft.description, kind, &now)?
                {
                    items.push(summary);
                }
            }
        }

        report.became_available.push(ListingTransition {
            listing_id: draft.external_id.clone(),
            name: draft.name.clone(),
            items,
        });
    }

    // Previously-available listings absent from the page flip off. Their
    // referenced records keep whatever availability they have.
    let mut retired: Vec<String> = previously_available
        .difference(&on_page)
        .cloned()
        .collect();
    retired.sort();
    for listing_id in retired {
        retry_blocking(max_attempts, || {
            operations::set_listing_availability(conn, &listing_id, false, false)
        })?;
        report.became_unavailable.push(listing_id);
    }

    Ok(report)
}

/// Resolve a listing draft's natural-name references to record ids, grouped
/// by relationship field (`<category>_items` / `<category>_cores`).
fn resolve_listing_refs(
    conn: &Connection,
    ctx: &mut RunContext,
    draft: &ListingDraft,
) -> Result<BTreeMap<String, Vec<RefTarget>>, SyncError> {
    let mut refs: BTreeMap<String, Vec<RefTarget>> = BTreeMap::new();

    for entry in &draft.items {
        let resolved = match entry.kind {
            RecordKind::Core => ctx
                .cores
                .get(&(entry.category, entry.name.clone()))
                .cloned(),
            RecordKind::Item => {
                resolve_item_by_name(conn, ctx, entry.category, &entry.name)?
            }
        };

        let Some(id) = resolved else {
            ctx.stats.names_dropped += 1;
            log::debug!(
                "Dropping listing reference '{}' ({} {}) in '{}': no record",
                entry.name,
                entry.category,
                entry.kind.as_str(),
                draft.name,
            );
            continue;
        };

        let field = format!("{}_{}s", entry.category, entry.kind.as_str());
        refs.entry(field).or_default().push(RefTarget {
            kind: entry.kind,
            category: entry.category,
            id,
        });
    }

    Ok(refs)
}

/// Memoized single-name item lookup used for listing references.
fn resolve_item_by_name(
    conn: &Connection,
    ctx: &mut RunContext,
    category: Category,
    name: &str,
) -> Result<Option<String>, SyncError> {
    if let Some(id) = ctx.attachment_memo.get(&(category, name.to_string())) {
        ctx.stats.memo_hits += 1;
        return Ok(Some(id.clone()));
    }
    ctx.stats.store_queries += 1;
    let rows = queries::items_by_names(conn, category, std::slice::from_ref(&name.to_string()))?;
    for (name, id) in &rows {
        ctx.attachment_memo
            .insert((category, name.clone()), id.clone());
    }
    Ok(rows.into_iter().next().map(|(_, id)| id))
}

/// Grant availability to one referenced record.
///
/// Idempotent: the provenance text is only appended when absent, the
/// provenance type only inserted when missing (replacing a solitary
/// `Pending`), and the availability flag only flipped when off.
fn fan_out_available(
    conn: &Connection,
    ctx: &RunContext,
    target: &RefTarget,
    description: &str,
    kind: ListingKind,
    now: &str,
) -> Result<Option<ItemSummary>, SyncError> {
    let granted_type = ctx.source_types.get(kind.source_type_name()).cloned();
    let pending = ctx.pending_source_type().to_string();

    match target.kind {
        RecordKind::Item => {
            let Some(item) = operations::get_item(conn, target.category, &target.id)? else {
                log::warn!(
                    "Listing references missing item '{}' ({})",
                    target.id,
                    target.category
                );
                return Ok(None);
            };

            if !item.available {
                operations::set_item_available(conn, target.category, &target.id, true)?;
                operations::append_change(
                    conn,
                    RecordKind::Item,
                    target.category,
                    &target.id,
                    &ChangeEntry::changed(now, "available", "false", "true"),
                )?;
            }

            if !description.is_empty() && !item.source_text.contains(description) {
                let new_text = if item.source_text.is_empty() {
                    description.to_string()
                } else {
                    format!("{}\n{}", item.source_text, description)
                };
                operations::set_source_text(
                    conn,
                    RecordKind::Item,
                    target.category,
                    &target.id,
                    &new_text,
                )?;
            }

            if let Some(type_id) = granted_type {
                if !item.source_types.contains(&type_id) {
                    if item.source_types.len() == 1 && item.source_types[0] == pending {
                        operations::delete_ref(
                            conn,
                            RecordKind::Item,
                            target.category,
                            &target.id,
                            "source_types",
                            &pending,
                        )?;
                    }
                    operations::insert_ref(
                        conn,
                        RecordKind::Item,
                        target.category,
                        &target.id,
                        "source_types",
                        &type_id,
                    )?;
                }
            }

            let core = single_core_name(conn, &item)?;
            Ok(Some(ItemSummary {
                name: item.name,
                item_type: item.item_type,
                core,
            }))
        }
        RecordKind::Core => {
            let Some(core) = operations::get_core(conn, target.category, &target.id)? else {
                log::warn!(
                    "Listing references missing core '{}' ({})",
                    target.id,
                    target.category
                );
                return Ok(None);
            };

            if !core.available {
                operations::set_core_available(conn, target.category, &target.id, true)?;
                operations::append_change(
                    conn,
                    RecordKind::Core,
                    target.category,
                    &target.id,
                    &ChangeEntry::changed(now, "available", "false", "true"),
                )?;
            }

            if !description.is_empty() && !core.source_text.contains(description) {
                let new_text = if core.source_text.is_empty() {
                    description.to_string()
                } else {
                    format!("{}\n{}", core.source_text, description)
                };
                operations::set_source_text(
                    conn,
                    RecordKind::Core,
                    target.category,
                    &target.id,
                    &new_text,
                )?;
            }

            if let Some(type_id) = granted_type {
                if !core.source_types.contains(&type_id) {
                    if core.source_types.len() == 1 && core.source_types[0] == pending {
                        operations::delete_ref(
                            conn,
                            RecordKind::Core,
                            target.category,
                            &target.id,
                            "source_types",
                            &pending,
                        )?;
                    }
                    operations::insert_ref(
                        conn,
                        RecordKind::Core,
                        target.category,
                        &target.id,
                        "source_types",
                        &type_id,
                    )?;
                }
            }

            Ok(Some(ItemSummary {
                name: core.name,
                item_type: "Core".to_string(),
                core: None,
            }))
        }
    }
}

/// Display name of the item's owning core, when it has exactly one real
/// (non-"Any") core reference.
fn single_core_name(
    conn: &Connection,
    item: &ItemRecord,
) -> Result<Option<String>, SyncError> {
    let real: Vec<&String> = item.cores.iter().filter(|c| *c != ANY_CORE).collect();
    if real.len() != 1 {
        return Ok(None);
    }
    Ok(queries::core_name(conn, item.category, real[0])?)
}
