//! SQLite persistence layer for the customization catalog.
//!
//! Provides schema creation, CRUD operations, relationship-mutation
//! primitives, and query APIs backed by SQLite (via rusqlite with the
//! bundled feature).

pub mod operations;
pub mod queries;
pub mod schema;

pub use operations::{
    append_change, append_changes, bulk_upsert_items, delete_ref, get_core, get_item,
    insert_ref, refs_for, replace_refs, set_checkpoint, set_core_available,
    set_item_available, set_listing_availability, set_source_text, touch_core_sync,
    touch_item_sync,
    upsert_core, upsert_item, upsert_listing, upsert_lookup, upsert_palette,
    push_listing_date, push_listing_price, LookupKind, OperationError, ITEM_REF_FIELDS,
};
pub use queries::{
    available_listing_ids, change_log_for, checkpoint, core_name, core_name_map,
    get_listing, get_palette, item_name, items_by_ids, items_by_names, latest_price,
    listings_referencing, lookup_map, palettes_by_config, reverse_refs, store_stats,
    StoreStats,
};
pub use schema::{create_schema, open_database, open_memory, SchemaError};
