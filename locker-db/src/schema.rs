//! SQLite schema creation and migration.

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: expected version {expected}, found {found}")]
    VersionMismatch { expected: i32, found: i32 },
}

/// Current schema version. Increment when adding migrations.
pub const CURRENT_VERSION: i32 = 1;

/// Create all tables and indexes if they don't exist.
///
/// This is idempotent — safe to call on an existing database.
pub fn create_schema(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(SCHEMA_SQL)?;
    set_schema_version(conn, CURRENT_VERSION)?;
    Ok(())
}

/// Open or create a catalog database at the given path.
pub fn open_database(path: &std::path::Path) -> Result<Connection, SchemaError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    let version = get_schema_version(&conn)?;
    if version == 0 {
        create_schema(&conn)?;
    } else if version < CURRENT_VERSION {
        migrate(&conn, version)?;
    }

    Ok(conn)
}

/// Open an in-memory database with the full schema. Useful for testing.
pub fn open_memory() -> Result<Connection, SchemaError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Get the current schema version, or 0 if no schema exists.
fn get_schema_version(conn: &Connection) -> Result<i32, SchemaError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Record a schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), SchemaError> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Run migrations from `from_version` up to `CURRENT_VERSION`.
fn migrate(conn: &Connection, from_version: i32) -> Result<(), SchemaError> {
    if from_version > CURRENT_VERSION {
        return Err(SchemaError::VersionMismatch {
            expected: CURRENT_VERSION,
            found: from_version,
        });
    }

    let mut version = from_version;
    while version < CURRENT_VERSION {
        version += 1;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Customization items. External id is unique within a category.
CREATE TABLE IF NOT EXISTS items (
    category TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    item_type TEXT NOT NULL,
    default_of_core TEXT,
    quality_id TEXT,
    manufacturer_id TEXT,
    release_id TEXT,
    description TEXT,
    source_text TEXT NOT NULL DEFAULT '',
    hidden INTEGER NOT NULL DEFAULT 0,
    available INTEGER NOT NULL DEFAULT 0,
    kit_only INTEGER NOT NULL DEFAULT 0,
    image_ref TEXT,
    image_etag TEXT NOT NULL DEFAULT '',
    needs_review INTEGER NOT NULL DEFAULT 0,
    etag TEXT NOT NULL DEFAULT '',
    last_synced TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (category, id)
);
CREATE INDEX IF NOT EXISTS idx_items_name ON items(category, name);
CREATE INDEX IF NOT EXISTS idx_items_available ON items(available);

-- Cores: top-level grouping records without relationship lists.
CREATE TABLE IF NOT EXISTS cores (
    category TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    quality_id TEXT,
    manufacturer_id TEXT,
    release_id TEXT,
    description TEXT,
    source_text TEXT NOT NULL DEFAULT '',
    hidden INTEGER NOT NULL DEFAULT 0,
    available INTEGER NOT NULL DEFAULT 0,
    image_ref TEXT,
    image_etag TEXT NOT NULL DEFAULT '',
    needs_review INTEGER NOT NULL DEFAULT 0,
    etag TEXT NOT NULL DEFAULT '',
    last_synced TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (category, id)
);
CREATE INDEX IF NOT EXISTS idx_cores_name ON cores(category, name);

-- Relationship sets for items and cores, ordered by position.
CREATE TABLE IF NOT EXISTS record_refs (
    owner_kind TEXT NOT NULL,
    category TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    field TEXT NOT NULL,
    ref_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (owner_kind, category, owner_id, field, ref_id)
);
CREATE INDEX IF NOT EXISTS idx_refs_reverse ON record_refs(field, ref_id);

-- Append-only audit log, most recent first (rowid DESC).
CREATE TABLE IF NOT EXISTS change_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_kind TEXT NOT NULL,
    category TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    changed_at TEXT NOT NULL,
    field TEXT NOT NULL,
    old_value TEXT NOT NULL DEFAULT '',
    new_value TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_change_owner ON change_log(owner_kind, category, owner_id);

-- Shared palette configurations, deduplicated by config_id.
CREATE TABLE IF NOT EXISTS palettes (
    id TEXT PRIMARY KEY,
    config_id TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_palettes_config ON palettes(config_id);

CREATE TABLE IF NOT EXISTS palette_slots (
    palette_id TEXT NOT NULL REFERENCES palettes(id),
    nameplate_id TEXT NOT NULL,
    primary_ref TEXT NOT NULL DEFAULT '',
    secondary_ref TEXT NOT NULL DEFAULT '',
    text_color TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (palette_id, nameplate_id)
);

-- Shop/pass/challenge listings.
CREATE TABLE IF NOT EXISTS listings (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price INTEGER NOT NULL DEFAULT 0,
    direct_available INTEGER NOT NULL DEFAULT 0,
    bundle_available INTEGER NOT NULL DEFAULT 0,
    last_synced TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_listings_kind ON listings(kind);

CREATE TABLE IF NOT EXISTS listing_refs (
    listing_id TEXT NOT NULL REFERENCES listings(id),
    field TEXT NOT NULL,
    ref_kind TEXT NOT NULL,
    ref_category TEXT NOT NULL,
    ref_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (listing_id, field, ref_kind, ref_category, ref_id)
);
CREATE INDEX IF NOT EXISTS idx_listing_refs_reverse ON listing_refs(ref_kind, ref_category, ref_id);

-- Ordered availability-date history and parallel price history.
CREATE TABLE IF NOT EXISTS listing_dates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id TEXT NOT NULL REFERENCES listings(id),
    seen_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_listing_dates ON listing_dates(listing_id);

CREATE TABLE IF NOT EXISTS listing_prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id TEXT NOT NULL REFERENCES listings(id),
    price INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_listing_prices ON listing_prices(listing_id);

-- Bootstrap dictionaries.
CREATE TABLE IF NOT EXISTS qualities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS manufacturers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS releases (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS source_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

-- Resumable batch-driver checkpoints, one row per input list.
CREATE TABLE IF NOT EXISTS sync_state (
    list_name TEXT PRIMARY KEY,
    next_offset INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
