//! CRUD operations for all catalog record types.

use locker_catalog::types::*;
use locker_catalog::Category;
use rusqlite::{params, Connection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Entity not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },
}

/// Relationship fields stored for item records, in persistence order.
pub const ITEM_REF_FIELDS: &[&str] = &[
    "cores",
    "attachments",
    "kit_items",
    "palettes",
    "source_types",
];

// ── Item Operations ─────────────────────────────────────────────────────────

/// Insert or update an item record, replacing its non-empty relationship sets.
pub fn upsert_item(conn: &Connection, item: &ItemRecord) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO items (category, id, name, item_type, default_of_core, quality_id,
             manufacturer_id, release_id, description, source_text, hidden, available,
             kit_only, image_ref, image_etag, needs_review, etag, last_synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
         ON CONFLICT(category, id) DO UPDATE SET
             name = excluded.name,
             item_type = excluded.item_type,
             default_of_core = excluded.default_of_core,
             quality_id = excluded.quality_id,
             manufacturer_id = excluded.manufacturer_id,
             release_id = excluded.release_id,
             description = excluded.description,
             source_text = excluded.source_text,
             hidden = excluded.hidden,
             available = excluded.available,
             kit_only = excluded.kit_only,
             image_ref = excluded.image_ref,
             image_etag = excluded.image_etag,
             needs_review = excluded.needs_review,
             etag = excluded.etag,
             last_synced = excluded.last_synced,
             updated_at = datetime('now')",
        params![
            item.category.as_str(),
            item.id,
            item.name,
            item.item_type,
            item.default_of_core,
            item.quality_id,
            item.manufacturer_id,
            item.release_id,
            item.description,
            item.source_text,
            item.hidden,
            item.available,
            item.kit_only,
            item.image_ref,
            item.image_etag,
            item.needs_review,
            item.etag,
            item.last_synced,
        ],
    )?;

    for (field, refs) in [
        ("cores", &item.cores),
        ("attachments", &item.attachments),
        ("kit_items", &item.kit_items),
        ("palettes", &item.palettes),
        ("source_types", &item.source_types),
    ] {
        replace_refs(conn, RecordKind::Item, item.category, &item.id, field, refs)?;
    }

    Ok(())
}

/// Insert or update many item records in one transaction.
pub fn bulk_upsert_items(conn: &Connection, items: &[ItemRecord]) -> Result<(), OperationError> {
    let tx = conn.unchecked_transaction()?;
    for item in items {
        upsert_item(&tx, item)?;
    }
    tx.commit()?;
    Ok(())
}

/// Point lookup by category + external id.
pub fn get_item(
    conn: &Connection,
    category: Category,
    id: &str,
) -> Result<Option<ItemRecord>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT category, id, name, item_type, default_of_core, quality_id,
                manufacturer_id, release_id, description, source_text, hidden,
                available, kit_only, image_ref, image_etag, needs_review, etag, last_synced
         FROM items WHERE category = ?1 AND id = ?2",
    )?;
    let result = stmt.query_row(params![category.as_str(), id], |row| {
        Ok(ItemRecord {
            category: Category::from_str_loose(&row.get::<_, String>(0)?),
            id: row.get(1)?,
            name: row.get(2)?,
            item_type: row.get(3)?,
            default_of_core: row.get(4)?,
            quality_id: row.get(5)?,
            manufacturer_id: row.get(6)?,
            release_id: row.get(7)?,
            description: row.get(8)?,
            source_text: row.get(9)?,
            hidden: row.get(10)?,
            available: row.get(11)?,
            kit_only: row.get(12)?,
            image_ref: row.get(13)?,
            image_etag: row.get(14)?,
            needs_review: row.get(15)?,
            etag: row.get(16)?,
            last_synced: row.get(17)?,
            cores: Vec::new(),
            attachments: Vec::new(),
            kit_items: Vec::new(),
            palettes: Vec::new(),
            source_types: Vec::new(),
        })
    });

    let mut item = match result {
        Ok(item) => item,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    item.cores = refs_for(conn, RecordKind::Item, category, id, "cores")?;
    item.attachments = refs_for(conn, RecordKind::Item, category, id, "attachments")?;
    item.kit_items = refs_for(conn, RecordKind::Item, category, id, "kit_items")?;
    item.palettes = refs_for(conn, RecordKind::Item, category, id, "palettes")?;
    item.source_types = refs_for(conn, RecordKind::Item, category, id, "source_types")?;

    Ok(Some(item))
}

/// Refresh only the freshness token and sync timestamp, leaving all other
/// fields and the change log untouched.
pub fn touch_item_sync(
    conn: &Connection,
    category: Category,
    id: &str,
    etag: &str,
    last_synced: &str,
) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE items SET etag = ?3, last_synced = ?4, updated_at = datetime('now')
         WHERE category = ?1 AND id = ?2",
        params![category.as_str(), id, etag, last_synced],
    )?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: "item".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Set the availability flag on an item without touching anything else.
pub fn set_item_available(
    conn: &Connection,
    category: Category,
    id: &str,
    available: bool,
) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE items SET available = ?3, needs_review = 1, updated_at = datetime('now')
         WHERE category = ?1 AND id = ?2",
        params![category.as_str(), id, available],
    )?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: "item".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// ── Core Operations ─────────────────────────────────────────────────────────

/// Insert or update a core record.
pub fn upsert_core(conn: &Connection, core: &CoreRecord) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO cores (category, id, name, quality_id, manufacturer_id, release_id,
             description, source_text, hidden, available, image_ref, image_etag,
             needs_review, etag, last_synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(category, id) DO UPDATE SET
             name = excluded.name,
             quality_id = excluded.quality_id,
             manufacturer_id = excluded.manufacturer_id,
             release_id = excluded.release_id,
             description = excluded.description,
             source_text = excluded.source_text,
             hidden = excluded.hidden,
             available = excluded.available,
             image_ref = excluded.image_ref,
             image_etag = excluded.image_etag,
             needs_review = excluded.needs_review,
             etag = excluded.etag,
             last_synced = excluded.last_synced,
             updated_at = datetime('now')",
        params![
            core.category.as_str(),
            core.id,
            core.name,
            core.quality_id,
            core.manufacturer_id,
            core.release_id,
            core.description,
            core.source_text,
            core.hidden,
            core.available,
            core.image_ref,
            core.image_etag,
            core.needs_review,
            core.etag,
            core.last_synced,
        ],
    )?;

    replace_refs(
        conn,
        RecordKind::Core,
        core.category,
        &core.id,
        "source_types",
        &core.source_types,
    )?;

    Ok(())
}

/// Point lookup by category + external id.
pub fn get_core(
    conn: &Connection,
    category: Category,
    id: &str,
) -> Result<Option<CoreRecord>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT category, id, name, quality_id, manufacturer_id, release_id, description,
                source_text, hidden, available, image_ref, image_etag, needs_review,
                etag, last_synced
         FROM cores WHERE category = ?1 AND id = ?2",
    )?;
    let result = stmt.query_row(params![category.as_str(), id], |row| {
        Ok(CoreRecord {
            category: Category::from_str_loose(&row.get::<_, String>(0)?),
            id: row.get(1)?,
            name: row.get(2)?,
            quality_id: row.get(3)?,
            manufacturer_id: row.get(4)?,
            release_id: row.get(5)?,
            description: row.get(6)?,
            source_text: row.get(7)?,
            hidden: row.get(8)?,
            available: row.get(9)?,
            image_ref: row.get(10)?,
            image_etag: row.get(11)?,
            needs_review: row.get(12)?,
            etag: row.get(13)?,
            last_synced: row.get(14)?,
            source_types: Vec::new(),
        })
    });

    let mut core = match result {
        Ok(core) => core,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    core.source_types = refs_for(conn, RecordKind::Core, category, id, "source_types")?;

    Ok(Some(core))
}

/// Refresh only a core's freshness token and sync timestamp.
pub fn touch_core_sync(
    conn: &Connection,
    category: Category,
    id: &str,
    etag: &str,
    last_synced: &str,
) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE cores SET etag = ?3, last_synced = ?4, updated_at = datetime('now')
         WHERE category = ?1 AND id = ?2",
        params![category.as_str(), id, etag, last_synced],
    )?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: "core".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Set the availability flag on a core without touching anything else.
pub fn set_core_available(
    conn: &Connection,
    category: Category,
    id: &str,
    available: bool,
) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE cores SET available = ?3, needs_review = 1, updated_at = datetime('now')
         WHERE category = ?1 AND id = ?2",
        params![category.as_str(), id, available],
    )?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: "core".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Replace the provenance text on an item or core record.
pub fn set_source_text(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    id: &str,
    source_text: &str,
) -> Result<(), OperationError> {
    let table = record_table(kind);
    let sql = format!(
        "UPDATE {table} SET source_text = ?3, needs_review = 1, updated_at = datetime('now')
         WHERE category = ?1 AND id = ?2"
    );
    let changed = conn.execute(&sql, params![category.as_str(), id, source_text])?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: kind.as_str().to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// ── Relationship Primitives ─────────────────────────────────────────────────

/// Replace all references for one relationship field.
///
/// Applies the none-if-empty guard: an empty incoming set is a no-op, never a
/// clear. Returns the number of references written.
pub fn replace_refs(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    owner_id: &str,
    field: &str,
    refs: &[String],
) -> Result<usize, OperationError> {
    if refs.is_empty() {
        return Ok(0);
    }

    conn.execute(
        "DELETE FROM record_refs
         WHERE owner_kind = ?1 AND category = ?2 AND owner_id = ?3 AND field = ?4",
        params![kind.as_str(), category.as_str(), owner_id, field],
    )?;

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO record_refs (owner_kind, category, owner_id, field, ref_id, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (position, ref_id) in refs.iter().enumerate() {
        stmt.execute(params![
            kind.as_str(),
            category.as_str(),
            owner_id,
            field,
            ref_id,
            position as i64,
        ])?;
    }

    Ok(refs.len())
}

/// Insert a single reference if not already present. Returns true when a row
/// was actually inserted.
pub fn insert_ref(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    owner_id: &str,
    field: &str,
    ref_id: &str,
) -> Result<bool, OperationError> {
    let next_position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM record_refs
         WHERE owner_kind = ?1 AND category = ?2 AND owner_id = ?3 AND field = ?4",
        params![kind.as_str(), category.as_str(), owner_id, field],
        |row| row.get(0),
    )?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO record_refs (owner_kind, category, owner_id, field, ref_id, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            kind.as_str(),
            category.as_str(),
            owner_id,
            field,
            ref_id,
            next_position,
        ],
    )?;
    Ok(inserted > 0)
}

/// Delete a single reference. Returns true when a row was removed.
pub fn delete_ref(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    owner_id: &str,
    field: &str,
    ref_id: &str,
) -> Result<bool, OperationError> {
    let deleted = conn.execute(
        "DELETE FROM record_refs
         WHERE owner_kind = ?1 AND category = ?2 AND owner_id = ?3 AND field = ?4 AND ref_id = ?5",
        params![kind.as_str(), category.as_str(), owner_id, field, ref_id],
    )?;
    Ok(deleted > 0)
}

/// All references for one relationship field, in stored order.
pub fn refs_for(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    owner_id: &str,
    field: &str,
) -> Result<Vec<String>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT ref_id FROM record_refs
         WHERE owner_kind = ?1 AND category = ?2 AND owner_id = ?3 AND field = ?4
         ORDER BY position",
    )?;
    let refs = stmt
        .query_map(
            params![kind.as_str(), category.as_str(), owner_id, field],
            |row| row.get(0),
        )?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(refs)
}

// ── Change Log ──────────────────────────────────────────────────────────────

/// Append one audit entry to a record's change log.
pub fn append_change(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    owner_id: &str,
    entry: &ChangeEntry,
) -> Result<i64, OperationError> {
    conn.execute(
        "INSERT INTO change_log (owner_kind, category, owner_id, changed_at, field, old_value, new_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            kind.as_str(),
            category.as_str(),
            owner_id,
            entry.changed_at,
            entry.field,
            entry.old_value,
            entry.new_value,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Append several audit entries in order.
pub fn append_changes(
    conn: &Connection,
    kind: RecordKind,
    category: Category,
    owner_id: &str,
    entries: &[ChangeEntry],
) -> Result<(), OperationError> {
    for entry in entries {
        append_change(conn, kind, category, owner_id, entry)?;
    }
    Ok(())
}

// ── Palette Operations ──────────────────────────────────────────────────────

/// Insert or update a palette and its nameplate slots.
pub fn upsert_palette(conn: &Connection, palette: &PaletteRecord) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO palettes (id, config_id, name)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             config_id = excluded.config_id,
             name = excluded.name",
        params![palette.id, palette.config_id, palette.name],
    )?;

    conn.execute(
        "DELETE FROM palette_slots WHERE palette_id = ?1",
        params![palette.id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO palette_slots (palette_id, nameplate_id, primary_ref, secondary_ref, text_color)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (nameplate_id, slot) in &palette.slots {
        stmt.execute(params![
            palette.id,
            nameplate_id,
            slot.primary_ref,
            slot.secondary_ref,
            slot.text_color,
        ])?;
    }

    Ok(())
}

// ── Listing Operations ──────────────────────────────────────────────────────

/// Insert or update a listing's scalar fields and its non-empty reference
/// sets. Date and price histories are appended separately.
pub fn upsert_listing(conn: &Connection, listing: &ListingRecord) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO listings (id, kind, name, description, price, direct_available,
             bundle_available, last_synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             kind = excluded.kind,
             name = excluded.name,
             description = excluded.description,
             price = excluded.price,
             direct_available = excluded.direct_available,
             bundle_available = excluded.bundle_available,
             last_synced = excluded.last_synced,
             updated_at = datetime('now')",
        params![
            listing.id,
            listing.kind.as_str(),
            listing.name,
            listing.description,
            listing.price,
            listing.direct_available,
            listing.bundle_available,
            listing.last_synced,
        ],
    )?;

    for (field, targets) in &listing.refs {
        // None-if-empty guard: empty sets never touch stored references.
        if targets.is_empty() {
            continue;
        }
        conn.execute(
            "DELETE FROM listing_refs WHERE listing_id = ?1 AND field = ?2",
            params![listing.id, field],
        )?;
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO listing_refs (listing_id, field, ref_kind, ref_category, ref_id, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, target) in targets.iter().enumerate() {
            stmt.execute(params![
                listing.id,
                field,
                target.kind.as_str(),
                target.category.as_str(),
                target.id,
                position as i64,
            ])?;
        }
    }

    Ok(())
}

/// Flip the availability channel flags on a listing.
pub fn set_listing_availability(
    conn: &Connection,
    id: &str,
    direct: bool,
    bundle: bool,
) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE listings SET direct_available = ?2, bundle_available = ?3,
             updated_at = datetime('now')
         WHERE id = ?1",
        params![id, direct, bundle],
    )?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: "listing".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Append one entry to a listing's availability-date history.
pub fn push_listing_date(
    conn: &Connection,
    listing_id: &str,
    seen_at: &str,
) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO listing_dates (listing_id, seen_at) VALUES (?1, ?2)",
        params![listing_id, seen_at],
    )?;
    Ok(())
}

/// Append one entry to a listing's price history.
pub fn push_listing_price(
    conn: &Connection,
    listing_id: &str,
    price: i64,
) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO listing_prices (listing_id, price) VALUES (?1, ?2)",
        params![listing_id, price],
    )?;
    Ok(())
}

// ── Bootstrap Dictionaries ──────────────────────────────────────────────────

/// Which bootstrap dictionary a lookup row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Quality,
    Manufacturer,
    Release,
    SourceType,
}

impl LookupKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Quality => "qualities",
            Self::Manufacturer => "manufacturers",
            Self::Release => "releases",
            Self::SourceType => "source_types",
        }
    }
}

/// Insert or update a bootstrap dictionary row.
pub fn upsert_lookup(
    conn: &Connection,
    kind: LookupKind,
    id: &str,
    name: &str,
) -> Result<(), OperationError> {
    let sql = format!(
        "INSERT INTO {} (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        kind.table()
    );
    conn.execute(&sql, params![id, name])?;
    Ok(())
}

// ── Checkpoints ─────────────────────────────────────────────────────────────

/// Persist the next offset for a named input list.
pub fn set_checkpoint(
    conn: &Connection,
    list_name: &str,
    next_offset: usize,
) -> Result<(), OperationError> {
    conn.execute(
        "INSERT INTO sync_state (list_name, next_offset, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(list_name) DO UPDATE SET
             next_offset = excluded.next_offset,
             updated_at = datetime('now')",
        params![list_name, next_offset as i64],
    )?;
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn record_table(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Item => "items",
        RecordKind::Core => "cores",
    }
}
