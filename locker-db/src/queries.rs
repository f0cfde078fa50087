//! Read-side query APIs: batched lookups, reverse references, change-log
//! reads, bootstrap dictionary loaders, and checkpoint state.

use std::collections::{BTreeMap, HashMap};

use locker_catalog::types::*;
use locker_catalog::Category;
use rusqlite::{params, params_from_iter, Connection};

use crate::operations::LookupKind;

type Result<T> = std::result::Result<T, rusqlite::Error>;

// ── Batched Lookups ─────────────────────────────────────────────────────────

/// Batch "matches any of" lookup of items by display name.
///
/// Returns `(name, id)` pairs for every row whose name matches one of the
/// inputs. Callers decide what a partial or empty result means.
pub fn items_by_names(
    conn: &Connection,
    category: Category,
    names: &[String],
) -> Result<Vec<(String, String)>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let vars = placeholders(names.len());
    let sql = format!("SELECT name, id FROM items WHERE category = ?1 AND name IN ({vars})");
    let mut stmt = conn.prepare(&sql)?;
    let params = std::iter::once(category.as_str().to_string())
        .chain(names.iter().cloned())
        .collect::<Vec<_>>();
    let rows = stmt
        .query_map(params_from_iter(params), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

/// Batch "matches any of" lookup of items by external id. Returns the ids
/// that exist in the store.
pub fn items_by_ids(
    conn: &Connection,
    category: Category,
    ids: &[String],
) -> Result<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let vars = placeholders(ids.len());
    let sql = format!("SELECT id FROM items WHERE category = ?1 AND id IN ({vars})");
    let mut stmt = conn.prepare(&sql)?;
    let params = std::iter::once(category.as_str().to_string())
        .chain(ids.iter().cloned())
        .collect::<Vec<_>>();
    let rows = stmt
        .query_map(params_from_iter(params), |row| row.get(0))?
        .collect::<Result<Vec<String>>>()?;
    Ok(rows)
}

/// Display name of a single item, if present.
pub fn item_name(conn: &Connection, category: Category, id: &str) -> Result<Option<String>> {
    opt_row(conn.query_row(
        "SELECT name FROM items WHERE category = ?1 AND id = ?2",
        params![category.as_str(), id],
        |row| row.get(0),
    ))
}

/// Display name of a single core, if present.
pub fn core_name(conn: &Connection, category: Category, id: &str) -> Result<Option<String>> {
    opt_row(conn.query_row(
        "SELECT name FROM cores WHERE category = ?1 AND id = ?2",
        params![category.as_str(), id],
        |row| row.get(0),
    ))
}

/// Core display-name → id map for one category (bootstrap dictionary).
pub fn core_name_map(conn: &Connection, category: Category) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT name, id FROM cores WHERE category = ?1")?;
    let mut map = HashMap::new();
    let rows = stmt.query_map(params![category.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (name, id) = row?;
        map.insert(name, id);
    }
    Ok(map)
}

// ── Reverse References ──────────────────────────────────────────────────────

/// Records whose relationship `field` contains `ref_id`.
pub fn reverse_refs(
    conn: &Connection,
    field: &str,
    ref_id: &str,
) -> Result<Vec<(RecordKind, Category, String)>> {
    let mut stmt = conn.prepare(
        "SELECT owner_kind, category, owner_id FROM record_refs
         WHERE field = ?1 AND ref_id = ?2
         ORDER BY owner_kind, category, owner_id",
    )?;
    let rows = stmt
        .query_map(params![field, ref_id], |row| {
            Ok((
                RecordKind::from_str_loose(&row.get::<_, String>(0)?),
                Category::from_str_loose(&row.get::<_, String>(1)?),
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

/// Listings of a given kind whose references include the record.
pub fn listings_referencing(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    ref_id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT listing_id FROM listing_refs
         WHERE ref_kind = ?1 AND ref_category = ?2 AND ref_id = ?3
         ORDER BY listing_id",
    )?;
    let rows = stmt
        .query_map(params![kind.as_str(), category.as_str(), ref_id], |row| {
            row.get(0)
        })?
        .collect::<Result<Vec<String>>>()?;
    Ok(rows)
}

// ── Change Log ──────────────────────────────────────────────────────────────

/// Full change log for one record, most recent first.
pub fn change_log_for(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    owner_id: &str,
) -> Result<Vec<ChangeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, changed_at, field, old_value, new_value FROM change_log
         WHERE owner_kind = ?1 AND category = ?2 AND owner_id = ?3
         ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map(params![kind.as_str(), category.as_str(), owner_id], |row| {
            Ok(ChangeEntry {
                id: row.get(0)?,
                changed_at: row.get(1)?,
                field: row.get(2)?,
                old_value: row.get(3)?,
                new_value: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

// ── Palettes ────────────────────────────────────────────────────────────────

/// All palette ids sharing a configuration id. The resolver asserts this has
/// at most one element.
pub fn palettes_by_config(conn: &Connection, config_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM palettes WHERE config_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map(params![config_id], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()?;
    Ok(rows)
}

/// Load a palette with its nameplate slots.
pub fn get_palette(conn: &Connection, id: &str) -> Result<Option<PaletteRecord>> {
    let header = opt_row(conn.query_row(
        "SELECT id, config_id, name FROM palettes WHERE id = ?1",
        params![id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    ))?;
    let Some((id, config_id, name)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT nameplate_id, primary_ref, secondary_ref, text_color
         FROM palette_slots WHERE palette_id = ?1",
    )?;
    let mut slots = BTreeMap::new();
    let rows = stmt.query_map(params![id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            PaletteSlot {
                primary_ref: row.get(1)?,
                secondary_ref: row.get(2)?,
                text_color: row.get(3)?,
            },
        ))
    })?;
    for row in rows {
        let (nameplate_id, slot) = row?;
        slots.insert(nameplate_id, slot);
    }

    Ok(Some(PaletteRecord {
        id,
        config_id,
        name,
        slots,
    }))
}

// ── Listings ────────────────────────────────────────────────────────────────

/// Ids of listings of one kind currently available through any channel.
pub fn available_listing_ids(conn: &Connection, kind: ListingKind) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM listings
         WHERE kind = ?1 AND (direct_available = 1 OR bundle_available = 1)
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![kind.as_str()], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()?;
    Ok(rows)
}

/// Load a listing with its references and histories.
pub fn get_listing(conn: &Connection, id: &str) -> Result<Option<ListingRecord>> {
    let result = conn.query_row(
        "SELECT id, kind, name, description, price, direct_available, bundle_available, last_synced
         FROM listings WHERE id = ?1",
        params![id],
        |row| {
            Ok(ListingRecord {
                id: row.get(0)?,
                kind: ListingKind::from_str_loose(&row.get::<_, String>(1)?),
                name: row.get(2)?,
                description: row.get(3)?,
                price: row.get(4)?,
                direct_available: row.get(5)?,
                bundle_available: row.get(6)?,
                last_synced: row.get(7)?,
                available_dates: Vec::new(),
                price_history: Vec::new(),
                refs: BTreeMap::new(),
            })
        },
    );
    let mut listing = match opt_row(result)? {
        Some(listing) => listing,
        None => return Ok(None),
    };

    let mut stmt = conn.prepare(
        "SELECT field, ref_kind, ref_category, ref_id FROM listing_refs
         WHERE listing_id = ?1 ORDER BY field, position",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            RefTarget {
                kind: RecordKind::from_str_loose(&row.get::<_, String>(1)?),
                category: Category::from_str_loose(&row.get::<_, String>(2)?),
                id: row.get(3)?,
            },
        ))
    })?;
    for row in rows {
        let (field, target) = row?;
        listing.refs.entry(field).or_default().push(target);
    }

    let mut stmt = conn.prepare(
        "SELECT seen_at FROM listing_dates WHERE listing_id = ?1 ORDER BY id",
    )?;
    listing.available_dates = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<Result<Vec<String>>>()?;

    let mut stmt = conn.prepare(
        "SELECT price FROM listing_prices WHERE listing_id = ?1 ORDER BY id",
    )?;
    listing.price_history = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<Result<Vec<i64>>>()?;

    Ok(Some(listing))
}

/// Most recent entry in a listing's price history.
pub fn latest_price(conn: &Connection, listing_id: &str) -> Result<Option<i64>> {
    opt_row(conn.query_row(
        "SELECT price FROM listing_prices WHERE listing_id = ?1 ORDER BY id DESC LIMIT 1",
        params![listing_id],
        |row| row.get(0),
    ))
}

// ── Bootstrap Dictionaries ──────────────────────────────────────────────────

/// Name → id map for one bootstrap dictionary.
pub fn lookup_map(conn: &Connection, kind: LookupKind) -> Result<HashMap<String, String>> {
    let sql = format!("SELECT name, id FROM {}", kind.table());
    let mut stmt = conn.prepare(&sql)?;
    let mut map = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (name, id) = row?;
        map.insert(name, id);
    }
    Ok(map)
}

// ── Checkpoints ─────────────────────────────────────────────────────────────

/// Persisted next offset for a named input list, 0 when absent.
pub fn checkpoint(conn: &Connection, list_name: &str) -> Result<usize> {
    let result = conn.query_row(
        "SELECT next_offset FROM sync_state WHERE list_name = ?1",
        params![list_name],
        |row| row.get::<_, i64>(0),
    );
    Ok(opt_row(result)?.unwrap_or(0).max(0) as usize)
}

// ── Store Stats ─────────────────────────────────────────────────────────────

/// Row counts across the store, for reporting.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub items: i64,
    pub cores: i64,
    pub palettes: i64,
    pub listings: i64,
    pub change_entries: i64,
}

pub fn store_stats(conn: &Connection) -> Result<StoreStats> {
    let count = |sql: &str| conn.query_row(sql, [], |row| row.get::<_, i64>(0));
    Ok(StoreStats {
        items: count("SELECT COUNT(*) FROM items")?,
        cores: count("SELECT COUNT(*) FROM cores")?,
        palettes: count("SELECT COUNT(*) FROM palettes")?,
        listings: count("SELECT COUNT(*) FROM listings")?,
        change_entries: count("SELECT COUNT(*) FROM change_log")?,
    })
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn placeholders(n: usize) -> String {
    (2..n + 2)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn opt_row<T>(result: std::result::Result<T, rusqlite::Error>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}
