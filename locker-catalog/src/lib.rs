//! Data model for the customization catalog.
//!
//! Pure types only: records, drafts, listings, the audit change log, and
//! per-category snapshot schemas. Persistence lives in `locker-db`; all
//! transformation logic lives in `locker-sync`.

pub mod category;
pub mod types;

pub use category::{ANY_CORE, Category, CategorySchema};
pub use types::{
    CREATION_FIELD, CREATION_MESSAGE, ChangeEntry, CoreRecord, EntityDraft, ItemRecord,
    ListingKind, ListingRecord, PaletteRecord, PaletteSlot, RecordKind, RefTarget,
    SOURCE_TYPE_PENDING,
};
