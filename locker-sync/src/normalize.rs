//! Snapshot normalization: raw external JSON → canonical drafts.
//!
//! Pure transformations — no I/O happens here. Each category's
//! [`CategorySchema`] says where the raw fields live; everything downstream
//! of this module only ever sees [`EntityDraft`] and friends.

use serde_json::Value;
use thiserror::Error;

use locker_catalog::types::EntityDraft;
use locker_catalog::{Category, ANY_CORE};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Snapshot at '{path}' is missing required field '{field}'")]
    MissingField { path: String, field: &'static str },
    #[error("No parent core resolvable for '{name}' (type '{item_type}')")]
    UnresolvedParentCore { name: String, item_type: String },
}

/// Driver-supplied context for normalizing one snapshot.
///
/// Every field defaults to "not applicable"; the driver fills in what it
/// knows from the surrounding structure (kit membership, reconciled child
/// names, the core's declared default item).
#[derive(Debug, Default, Clone)]
pub struct DraftHints {
    /// Display names of already-reconciled attachment children.
    pub attachment_names: Vec<String>,
    /// External ids of already-reconciled kit children.
    pub kit_item_ids: Vec<String>,
    /// Core display name this item is the declared default of.
    pub default_of_core: Option<String>,
    /// The snapshot was reached through a kit and is not sold alone.
    pub kit_only: bool,
    /// Type of the parent item, for sub-items reached through another item.
    pub parent_type: Option<String>,
    /// Parent core names inherited from the enclosing item, used when the
    /// snapshot carries no core list of its own.
    pub parent_cores: Vec<String>,
}

/// Derive the stable external id from a snapshot path: the final path
/// segment without its extension.
pub fn external_id_from_path(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

/// Build a canonical draft from one raw item snapshot.
///
/// A non-cross-core type with no core list and no inherited parent cores is
/// an error — without a parent core the record cannot be placed. Cross-core
/// types never resolve parentage and always carry the reserved
/// [`ANY_CORE`] marker.
pub fn normalize(
    path: &str,
    raw: &Value,
    category: Category,
    hints: &DraftHints,
) -> Result<EntityDraft, NormalizeError> {
    let schema = category.schema();

    let name = required_str(path, raw, schema.title_field)?;
    let item_type = required_str(path, raw, schema.type_field)?;

    let core_names = if schema.is_cross_core(&item_type) {
        vec![ANY_CORE.to_string()]
    } else {
        let mut names = str_list(raw, schema.core_list_field);
        if names.is_empty() {
            names = hints.parent_cores.clone();
        }
        if names.is_empty() {
            return Err(NormalizeError::UnresolvedParentCore {
                name,
                item_type,
            });
        }
        names
    };

    Ok(EntityDraft {
        external_id: opt_str(raw, "Id").unwrap_or_else(|| external_id_from_path(path)),
        name,
        item_type,
        quality: opt_str(raw, schema.quality_field),
        manufacturer: opt_str(raw, schema.manufacturer_field),
        release: opt_str(raw, schema.release_field),
        description: opt_str(raw, schema.description_field),
        hidden: raw
            .get(schema.hidden_field)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        core_names,
        attachment_names: hints.attachment_names.clone(),
        kit_item_ids: hints.kit_item_ids.clone(),
        palette_configs: str_or_list(raw, schema.palette_field),
        parent_type: hints.parent_type.clone(),
        kit_only: hints.kit_only,
        default_of_core: hints.default_of_core.clone(),
        image_path: opt_str(raw, schema.image_field),
    })
}

/// Child snapshot paths referenced by a raw item: attachments first, then
/// kit contents. The driver reconciles these before the item itself.
pub fn child_paths(raw: &Value, category: Category) -> (Vec<String>, Vec<String>) {
    let schema = category.schema();
    (
        str_list(raw, schema.attachment_list_field),
        str_list(raw, schema.kit_list_field),
    )
}

/// The raw core-name list of a snapshot, for passing down to children.
pub fn raw_core_names(raw: &Value, category: Category) -> Vec<String> {
    str_list(raw, category.schema().core_list_field)
}

/// The raw type/socket of a snapshot, for the children's parent-type hint.
pub fn raw_item_type(raw: &Value, category: Category) -> Option<String> {
    opt_str(raw, category.schema().type_field)
}

// ── Cores ───────────────────────────────────────────────────────────────────

/// Canonical form of one raw core snapshot.
#[derive(Debug, Clone, Default)]
pub struct CoreDraft {
    pub external_id: String,
    pub name: String,
    pub quality: Option<String>,
    pub manufacturer: Option<String>,
    pub release: Option<String>,
    pub description: Option<String>,
    pub hidden: bool,
    pub image_path: Option<String>,
    /// External id of the item this core declares as its default, if any.
    pub default_item_id: Option<String>,
}

/// Build a canonical draft from one raw core snapshot. Cores share the
/// category's field names but carry no relationship lists.
pub fn normalize_core(
    path: &str,
    raw: &Value,
    category: Category,
) -> Result<CoreDraft, NormalizeError> {
    let schema = category.schema();
    let name = required_str(path, raw, schema.title_field)?;

    Ok(CoreDraft {
        external_id: opt_str(raw, "Id").unwrap_or_else(|| external_id_from_path(path)),
        name,
        quality: opt_str(raw, schema.quality_field),
        manufacturer: opt_str(raw, schema.manufacturer_field),
        release: opt_str(raw, schema.release_field),
        description: opt_str(raw, schema.description_field),
        hidden: raw
            .get(schema.hidden_field)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        image_path: opt_str(raw, schema.image_field),
        default_item_id: opt_str(raw, "DefaultItemId"),
    })
}

// ── Palettes ────────────────────────────────────────────────────────────────

/// Canonical form of one raw palette configuration snapshot.
#[derive(Debug, Clone)]
pub struct PaletteDraft {
    pub config_id: String,
    pub name: String,
    pub slots: Vec<PaletteSlotDraft>,
}

#[derive(Debug, Clone)]
pub struct PaletteSlotDraft {
    pub nameplate_id: String,
    pub primary_path: String,
    pub secondary_path: String,
    pub text_color: String,
}

/// Build a palette draft from a raw configuration snapshot. Slots missing a
/// nameplate id are dropped; asset paths may be empty and then no asset is
/// prefetched for that side.
pub fn normalize_palette(config_id: &str, raw: &Value) -> Result<PaletteDraft, NormalizeError> {
    let name = opt_str(raw, "Name").unwrap_or_else(|| config_id.to_string());

    let mut slots = Vec::new();
    if let Some(entries) = raw.get("Nameplates").and_then(Value::as_array) {
        for entry in entries {
            let Some(nameplate_id) = opt_str(entry, "NameplateId") else {
                continue;
            };
            slots.push(PaletteSlotDraft {
                nameplate_id,
                primary_path: opt_str(entry, "PrimaryPath").unwrap_or_default(),
                secondary_path: opt_str(entry, "SecondaryPath").unwrap_or_default(),
                text_color: opt_str(entry, "TextColor").unwrap_or_default(),
            });
        }
    }

    Ok(PaletteDraft {
        config_id: config_id.to_string(),
        name,
        slots,
    })
}

// ── Listings ────────────────────────────────────────────────────────────────

/// One record reference inside a raw listing, still by natural name.
#[derive(Debug, Clone)]
pub struct ListingItemName {
    pub kind: locker_catalog::RecordKind,
    pub category: Category,
    pub name: String,
}

/// Canonical form of one raw listing snapshot.
#[derive(Debug, Clone)]
pub struct ListingDraft {
    pub external_id: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub direct: bool,
    pub bundle: bool,
    pub items: Vec<ListingItemName>,
}

/// Build a listing draft from a raw shop/pass/challenge snapshot.
///
/// Entries whose category key is unknown are dropped with a log line; an
/// unknown category in listing data is source noise, not a schema change.
pub fn normalize_listing(
    path: &str,
    raw: &Value,
    _kind: locker_catalog::ListingKind,
) -> Result<ListingDraft, NormalizeError> {
    let name = required_str(path, raw, "Title")?;

    let channels = raw.get("Channels");
    let direct = channels
        .and_then(|c| c.get("Direct"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let bundle = channels
        .and_then(|c| c.get("Bundle"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut items = Vec::new();
    if let Some(entries) = raw.get("Items").and_then(Value::as_array) {
        for entry in entries {
            let Some(item_name) = opt_str(entry, "Name") else {
                continue;
            };
            let category_key = opt_str(entry, "Category").unwrap_or_default();
            let Some(category) = Category::from_key(&category_key) else {
                log::debug!(
                    "Dropping listing entry '{}' with unknown category '{}'",
                    item_name,
                    category_key
                );
                continue;
            };
            let kind = locker_catalog::RecordKind::from_str_loose(
                &opt_str(entry, "Kind").unwrap_or_default(),
            );
            items.push(ListingItemName {
                kind,
                category,
                name: item_name,
            });
        }
    }

    Ok(ListingDraft {
        external_id: opt_str(raw, "Id").unwrap_or_else(|| external_id_from_path(path)),
        name,
        description: opt_str(raw, "Description").unwrap_or_default(),
        price: raw.get("Price").and_then(Value::as_i64).unwrap_or(0),
        direct,
        bundle,
        items,
    })
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn required_str(path: &str, raw: &Value, field: &'static str) -> Result<String, NormalizeError> {
    opt_str(raw, field).ok_or_else(|| NormalizeError::MissingField {
        path: path.to_string(),
        field,
    })
}

fn opt_str(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn str_list(raw: &Value, field: &str) -> Vec<String> {
    raw.get(field)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A field that is either a single string or a list of strings.
fn str_or_list(raw: &Value, field: &str) -> Vec<String> {
    match raw.get(field) {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(_)) => str_list(raw, field),
        _ => Vec::new(),
    }
}
