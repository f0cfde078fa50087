//! Reference resolution: natural identifiers → persisted record ids.
//!
//! All resolution is memoized in the per-run [`RunContext`], so resolving
//! the same key twice in one run never re-queries the store. Core names
//! resolve purely against the bootstrap map; attachments and kit children
//! go through one batched "matches any of" store query per call.

use locker_catalog::{Category, ANY_CORE};
use locker_db::queries;
use rusqlite::Connection;
use thiserror::Error;

use crate::context::RunContext;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("No {entity} records matched any of {count} requested keys")]
    NotFound { entity: &'static str, count: usize },
    #[error("Palette configuration '{0}' matches more than one record")]
    Ambiguous(String),
}

/// Resolve core display names against the bootstrap map.
///
/// Unresolvable names are dropped, not errors; the drop is counted and
/// logged so a noisy source shows up in the run stats.
pub fn resolve_cores(ctx: &mut RunContext, category: Category, names: &[String]) -> Vec<String> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        if name == ANY_CORE {
            ids.push(ANY_CORE.to_string());
            continue;
        }
        match ctx.cores.get(&(category, name.clone())) {
            Some(id) => ids.push(id.clone()),
            None => {
                ctx.stats.names_dropped += 1;
                log::debug!("Dropping unresolvable core name '{name}' ({category})");
            }
        }
    }
    ids
}

/// Resolve attachment display names to record ids with one batched query.
///
/// Zero rows for a non-empty batch signals upstream inconsistency and is an
/// error; a partial match drops only the missing names.
pub fn resolve_attachments(
    conn: &Connection,
    ctx: &mut RunContext,
    category: Category,
    names: &[String],
) -> Result<Vec<String>, ResolveError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let misses: Vec<String> = names
        .iter()
        .filter(|name| !ctx.attachment_memo.contains_key(&(category, (*name).clone())))
        .cloned()
        .collect();
    ctx.stats.memo_hits += (names.len() - misses.len()) as u64;

    if !misses.is_empty() {
        ctx.stats.store_queries += 1;
        let rows = queries::items_by_names(conn, category, &misses)?;
        if rows.is_empty() {
            return Err(ResolveError::NotFound {
                entity: "attachment",
                count: misses.len(),
            });
        }
        for (name, id) in rows {
            ctx.attachment_memo.insert((category, name), id);
        }
    }

    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        match ctx.attachment_memo.get(&(category, name.clone())) {
            Some(id) => ids.push(id.clone()),
            None => {
                ctx.stats.names_dropped += 1;
                log::debug!("Dropping unresolvable attachment name '{name}' ({category})");
            }
        }
    }
    Ok(ids)
}

/// Resolve kit-child external ids to persisted record ids with one batched
/// query. Same contract as [`resolve_attachments`].
pub fn resolve_kit_items(
    conn: &Connection,
    ctx: &mut RunContext,
    category: Category,
    ids: &[String],
) -> Result<Vec<String>, ResolveError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let misses: Vec<String> = ids
        .iter()
        .filter(|id| !ctx.kit_item_memo.contains(&(category, (*id).clone())))
        .cloned()
        .collect();
    ctx.stats.memo_hits += (ids.len() - misses.len()) as u64;

    if !misses.is_empty() {
        ctx.stats.store_queries += 1;
        let found = queries::items_by_ids(conn, category, &misses)?;
        if found.is_empty() {
            return Err(ResolveError::NotFound {
                entity: "kit child",
                count: misses.len(),
            });
        }
        for id in found {
            ctx.kit_item_memo.insert((category, id));
        }
    }

    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        if ctx.kit_item_memo.contains(&(category, id.clone())) {
            resolved.push(id.clone());
        } else {
            ctx.stats.names_dropped += 1;
            log::debug!("Dropping unresolvable kit child '{id}' ({category})");
        }
    }
    Ok(resolved)
}

/// Outcome of resolving a palette configuration id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaletteResolution {
    Existing(String),
    /// No record holds this configuration yet; the caller creates one.
    NeedsCreation,
}

/// Resolve a palette configuration id, memo first.
///
/// More than one stored record for a configuration id is a consistency
/// error and fatal; a total miss signals "needs creation" rather than
/// erroring.
pub fn resolve_palette(
    conn: &Connection,
    ctx: &mut RunContext,
    config_id: &str,
) -> Result<PaletteResolution, ResolveError> {
    if let Some(id) = ctx.palette_memo.get(config_id) {
        ctx.stats.memo_hits += 1;
        return Ok(PaletteResolution::Existing(id.clone()));
    }

    ctx.stats.store_queries += 1;
    let mut ids = queries::palettes_by_config(conn, config_id)?;
    match ids.len() {
        0 => Ok(PaletteResolution::NeedsCreation),
        1 => {
            let id = ids.remove(0);
            ctx.memoize_palette(config_id, id.clone());
            Ok(PaletteResolution::Existing(id))
        }
        _ => Err(ResolveError::Ambiguous(config_id.to_string())),
    }
}
