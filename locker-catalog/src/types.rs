//! Data model types for the customization catalog.
//!
//! These types represent the persistent record schema: items, cores,
//! palettes, shop/pass/challenge listings, the audit change log, and the
//! ephemeral draft produced by snapshot normalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::Category;

// ── Draft ───────────────────────────────────────────────────────────────────

/// Canonical, category-independent form of one raw external snapshot.
///
/// Built fresh by the normalizer and consumed by exactly one reconciliation
/// call; never persisted. Relationship lists still carry the source's
/// natural identifiers (core display names, attachment display names,
/// kit-child external ids, palette configuration ids).
#[derive(Debug, Clone, Default)]
pub struct EntityDraft {
    pub external_id: String,
    pub name: String,
    pub item_type: String,
    /// Raw external quality/manufacturer/release names, unresolved.
    pub quality: Option<String>,
    pub manufacturer: Option<String>,
    pub release: Option<String>,
    pub description: Option<String>,
    pub hidden: bool,
    pub core_names: Vec<String>,
    pub attachment_names: Vec<String>,
    pub kit_item_ids: Vec<String>,
    pub palette_configs: Vec<String>,
    /// Parent type hint for sub-items reached through another item.
    pub parent_type: Option<String>,
    pub kit_only: bool,
    /// Core display name this item is the default of, if any.
    pub default_of_core: Option<String>,
    /// Remote path of the item's image asset.
    pub image_path: Option<String>,
}

// ── Records ─────────────────────────────────────────────────────────────────

/// A persisted customization item. One per external identifier per category.
#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub id: String,
    pub category: Category,
    pub name: String,
    pub item_type: String,
    pub cores: Vec<String>,
    pub attachments: Vec<String>,
    pub kit_items: Vec<String>,
    pub palettes: Vec<String>,
    /// Core id this item is the default of. Cardinality 0 or 1.
    pub default_of_core: Option<String>,
    pub quality_id: Option<String>,
    pub manufacturer_id: Option<String>,
    pub release_id: Option<String>,
    pub description: Option<String>,
    /// Human-readable "how to obtain" text, appended as sources accrue.
    pub source_text: String,
    pub source_types: Vec<String>,
    pub hidden: bool,
    pub available: bool,
    pub kit_only: bool,
    pub image_ref: Option<String>,
    /// Freshness token of the cached image. Empty when the placeholder is
    /// in place, so the next run always retries the fetch.
    pub image_etag: String,
    pub needs_review: bool,
    /// Freshness token of the source snapshot this record was built from.
    pub etag: String,
    pub last_synced: String,
}

impl ItemRecord {
    /// A blank record for a newly seen external id.
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
            name: String::new(),
            item_type: String::new(),
            cores: Vec::new(),
            attachments: Vec::new(),
            kit_items: Vec::new(),
            palettes: Vec::new(),
            default_of_core: None,
            quality_id: None,
            manufacturer_id: None,
            release_id: None,
            description: None,
            source_text: String::new(),
            source_types: Vec::new(),
            hidden: false,
            available: false,
            kit_only: false,
            image_ref: None,
            image_etag: String::new(),
            needs_review: false,
            etag: String::new(),
            last_synced: String::new(),
        }
    }
}

/// A top-level core: owns a family of sub-items but carries no relationship
/// lists of its own.
#[derive(Debug, Clone)]
pub struct CoreRecord {
    pub id: String,
    pub category: Category,
    pub name: String,
    pub quality_id: Option<String>,
    pub manufacturer_id: Option<String>,
    pub release_id: Option<String>,
    pub description: Option<String>,
    pub source_text: String,
    pub source_types: Vec<String>,
    pub hidden: bool,
    pub available: bool,
    pub image_ref: Option<String>,
    pub image_etag: String,
    pub needs_review: bool,
    pub etag: String,
    pub last_synced: String,
}

impl CoreRecord {
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
            name: String::new(),
            quality_id: None,
            manufacturer_id: None,
            release_id: None,
            description: None,
            source_text: String::new(),
            source_types: Vec::new(),
            hidden: false,
            available: false,
            image_ref: None,
            image_etag: String::new(),
            needs_review: false,
            etag: String::new(),
            last_synced: String::new(),
        }
    }
}

// ── Palette ─────────────────────────────────────────────────────────────────

/// Cached assets and color hint for one nameplate within a palette.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteSlot {
    pub primary_ref: String,
    pub secondary_ref: String,
    pub text_color: String,
}

/// A shared palette configuration referenced by many items.
///
/// Deduplicated by `config_id`, which is globally unique — the display name
/// is informational only and several display paths may map to one config.
#[derive(Debug, Clone)]
pub struct PaletteRecord {
    pub id: String,
    pub config_id: String,
    pub name: String,
    /// Nameplate id → cached slot assets.
    pub slots: BTreeMap<String, PaletteSlot>,
}

// ── Listings ────────────────────────────────────────────────────────────────

/// Kind of availability listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Shop,
    Pass,
    Challenge,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shop => "shop",
            Self::Pass => "pass",
            Self::Challenge => "challenge",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pass" => Self::Pass,
            "challenge" => Self::Challenge,
            _ => Self::Shop,
        }
    }

    /// Display name of the provenance type this listing kind grants.
    pub fn source_type_name(&self) -> &'static str {
        match self {
            Self::Shop => "Shop",
            Self::Pass => "Pass",
            Self::Challenge => "Challenge",
        }
    }
}

/// Provenance type granted to records before any listing has referenced them.
pub const SOURCE_TYPE_PENDING: &str = "Pending";

/// Which kind of record a listing reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Item,
    Core,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Core => "core",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "core" => Self::Core,
            _ => Self::Item,
        }
    }
}

/// A fully-qualified reference from a listing to an item or core record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefTarget {
    pub kind: RecordKind,
    pub category: Category,
    pub id: String,
}

/// A persisted shop bundle, seasonal pass, or challenge reward listing.
#[derive(Debug, Clone)]
pub struct ListingRecord {
    pub id: String,
    pub kind: ListingKind,
    pub name: String,
    pub description: String,
    pub price: i64,
    /// Independent availability channels.
    pub direct_available: bool,
    pub bundle_available: bool,
    /// Ordered availability-date history, oldest first.
    pub available_dates: Vec<String>,
    /// Price history parallel to the date history.
    pub price_history: Vec<i64>,
    /// Referenced records grouped by relationship field.
    pub refs: BTreeMap<String, Vec<RefTarget>>,
    pub last_synced: String,
}

impl ListingRecord {
    pub fn new(id: impl Into<String>, kind: ListingKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: String::new(),
            description: String::new(),
            price: 0,
            direct_available: false,
            bundle_available: false,
            available_dates: Vec::new(),
            price_history: Vec::new(),
            refs: BTreeMap::new(),
            last_synced: String::new(),
        }
    }

    /// Available through any channel.
    pub fn is_available(&self) -> bool {
        self.direct_available || self.bundle_available
    }

    /// Relationship fields that actually carry references, so empty sets are
    /// never touched in the store.
    pub fn populated_fields(&self) -> Vec<&str> {
        self.refs
            .iter()
            .filter(|(_, targets)| !targets.is_empty())
            .map(|(field, _)| field.as_str())
            .collect()
    }
}

// ── Change log ──────────────────────────────────────────────────────────────

/// Change-log entry field name used for record creation.
pub const CREATION_FIELD: &str = "record";

/// Change-log message recorded when a record is first created.
pub const CREATION_MESSAGE: &str = "Added item to DB";

/// One append-only audit entry. The log is ordered most-recent-first and is
/// never truncated or reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub id: i64,
    pub changed_at: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

impl ChangeEntry {
    /// A field-change entry.
    pub fn changed(
        changed_at: impl Into<String>,
        field: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            changed_at: changed_at.into(),
            field: field.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }

    /// The entry recorded when a record is first created.
    pub fn created(changed_at: impl Into<String>) -> Self {
        Self::changed(changed_at, CREATION_FIELD, "", CREATION_MESSAGE)
    }

    pub fn is_creation(&self) -> bool {
        self.field == CREATION_FIELD && self.new_value == CREATION_MESSAGE
    }

    /// Human-readable rendering used by downstream reporting.
    pub fn summary(&self) -> String {
        if self.is_creation() {
            format!("{}: {}", self.changed_at, self.new_value)
        } else {
            format!(
                "{}: Changed {}, Was: {}, Is: {}",
                self.changed_at, self.field, self.old_value, self.new_value
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_entry_summary_formats() {
        let e = ChangeEntry::changed("2025-01-01T00:00:00Z", "name", "Alpha", "Alpha Prime");
        assert_eq!(
            e.summary(),
            "2025-01-01T00:00:00Z: Changed name, Was: Alpha, Is: Alpha Prime"
        );

        let c = ChangeEntry::created("2025-01-01T00:00:00Z");
        assert!(c.is_creation());
        assert_eq!(c.summary(), "2025-01-01T00:00:00Z: Added item to DB");
    }

    #[test]
    fn listing_populated_fields_skips_empty_sets() {
        let mut listing = ListingRecord::new("bundle-1", ListingKind::Shop);
        listing.refs.insert("armor_items".to_string(), vec![RefTarget {
            kind: RecordKind::Item,
            category: Category::Armor,
            id: "w1".to_string(),
        }]);
        listing.refs.insert("weapon_items".to_string(), vec![]);

        assert_eq!(listing.populated_fields(), vec!["armor_items"]);
    }

    #[test]
    fn category_cross_core_policy() {
        assert!(Category::Armor.schema().is_cross_core("Emblem"));
        assert!(!Category::Armor.schema().is_cross_core("Helmet"));
        // Every identity type is cross-core.
        assert!(Category::Identity.schema().is_cross_core("Nameplate"));
    }
}
