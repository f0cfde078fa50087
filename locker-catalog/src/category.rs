//! Item categories and their snapshot schemas.
//!
//! The external catalog uses different field names per category for the same
//! concepts (title, socket, rarity, image, relationship lists). Each category
//! carries a [`CategorySchema`] describing where the normalizer finds those
//! fields, so nothing else in the pipeline ever touches a raw field name.

use serde::{Deserialize, Serialize};

/// Reserved core marker assigned to cross-core item types instead of a
/// resolved parent core.
pub const ANY_CORE: &str = "Any";

/// Top-level customization category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Armor,
    Weapon,
    Vehicle,
    Identity,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Armor => "armor",
            Self::Weapon => "weapon",
            Self::Vehicle => "vehicle",
            Self::Identity => "identity",
        }
    }

    /// Parse a category key. Unknown keys are a configuration error the
    /// caller must surface — every downstream step depends on the schema.
    pub fn from_key(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "armor" => Some(Self::Armor),
            "weapon" => Some(Self::Weapon),
            "vehicle" => Some(Self::Vehicle),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }

    /// Loose parse for values read back from the store, where only keys this
    /// code wrote can appear.
    pub fn from_str_loose(s: &str) -> Self {
        Self::from_key(s).unwrap_or(Self::Armor)
    }

    pub fn all() -> &'static [Category] {
        &[Self::Armor, Self::Weapon, Self::Vehicle, Self::Identity]
    }

    /// The snapshot schema for this category.
    pub fn schema(&self) -> &'static CategorySchema {
        match self {
            Self::Armor => &ARMOR_SCHEMA,
            Self::Weapon => &WEAPON_SCHEMA,
            Self::Vehicle => &VEHICLE_SCHEMA,
            Self::Identity => &IDENTITY_SCHEMA,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw-snapshot field names and policies for one category.
#[derive(Debug)]
pub struct CategorySchema {
    pub title_field: &'static str,
    pub type_field: &'static str,
    pub description_field: &'static str,
    pub quality_field: &'static str,
    pub manufacturer_field: &'static str,
    pub release_field: &'static str,
    pub image_field: &'static str,
    pub hidden_field: &'static str,
    /// List of parent core display names.
    pub core_list_field: &'static str,
    /// List of attachment snapshot paths.
    pub attachment_list_field: &'static str,
    /// List of kit-child snapshot paths.
    pub kit_list_field: &'static str,
    /// Palette configuration id (string or list of strings).
    pub palette_field: &'static str,
    /// Item types that apply to any core and never resolve parentage.
    pub cross_core_types: &'static [&'static str],
    /// Every type in this category is cross-core.
    pub all_cross_core: bool,
    /// Blob-store folder for cached images.
    pub asset_folder: &'static str,
}

impl CategorySchema {
    /// Whether an item type skips parent-core resolution entirely.
    pub fn is_cross_core(&self, item_type: &str) -> bool {
        self.all_cross_core
            || self
                .cross_core_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(item_type))
    }
}

static ARMOR_SCHEMA: CategorySchema = CategorySchema {
    title_field: "Title",
    type_field: "Slot",
    description_field: "Description",
    quality_field: "Quality",
    manufacturer_field: "Manufacturer",
    release_field: "Season",
    image_field: "DisplayPath",
    hidden_field: "HideUntilOwned",
    core_list_field: "ParentCores",
    attachment_list_field: "Attachments",
    kit_list_field: "KitContents",
    palette_field: "PaletteConfigId",
    cross_core_types: &["Emblem", "Effect"],
    all_cross_core: false,
    asset_folder: "armor",
};

static WEAPON_SCHEMA: CategorySchema = CategorySchema {
    title_field: "DisplayName",
    type_field: "Socket",
    description_field: "Flavor",
    quality_field: "Rarity",
    manufacturer_field: "Maker",
    release_field: "Season",
    image_field: "IconPath",
    hidden_field: "Hidden",
    core_list_field: "CoreNames",
    attachment_list_field: "Charms",
    kit_list_field: "BundledItems",
    palette_field: "PaletteConfigId",
    cross_core_types: &["Charm", "Emblem", "KillEffect"],
    all_cross_core: false,
    asset_folder: "weapons",
};

static VEHICLE_SCHEMA: CategorySchema = CategorySchema {
    title_field: "Name",
    type_field: "Socket",
    description_field: "Description",
    quality_field: "Rarity",
    manufacturer_field: "Manufacturer",
    release_field: "Season",
    image_field: "ImagePath",
    hidden_field: "Hidden",
    core_list_field: "ParentCores",
    attachment_list_field: "Attachments",
    kit_list_field: "BundledItems",
    palette_field: "PaletteConfigId",
    cross_core_types: &["Emblem"],
    all_cross_core: false,
    asset_folder: "vehicles",
};

static IDENTITY_SCHEMA: CategorySchema = CategorySchema {
    title_field: "Title",
    type_field: "Kind",
    description_field: "Description",
    quality_field: "Quality",
    manufacturer_field: "Manufacturer",
    release_field: "Season",
    image_field: "DisplayPath",
    hidden_field: "Hidden",
    core_list_field: "ParentCores",
    attachment_list_field: "Attachments",
    kit_list_field: "KitContents",
    palette_field: "PaletteConfigId",
    cross_core_types: &[],
    all_cross_core: true,
    asset_folder: "identity",
};
