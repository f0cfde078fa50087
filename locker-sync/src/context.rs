//! Per-run context: bootstrap dictionaries, resolution memos, and the
//! processed-path set.
//!
//! One `RunContext` is built at the start of a reconciliation pass and
//! passed explicitly through the pipeline. Nothing in the engine is
//! process-global, so two runs never share state and tests can assert on a
//! run's counters in isolation.

use std::collections::{HashMap, HashSet};

use locker_catalog::types::SOURCE_TYPE_PENDING;
use locker_catalog::Category;
use locker_db::operations::LookupKind;
use locker_db::queries;
use rusqlite::Connection;

use crate::error::SyncError;

/// Resolution counters for one run. `store_queries` is the number of store
/// round-trips the resolver issued; memoized repeats never re-query.
#[derive(Debug, Default, Clone)]
pub struct ResolveStats {
    pub store_queries: u64,
    pub memo_hits: u64,
    pub names_dropped: u64,
}

/// A path already reconciled in this run, with enough of its identity for
/// parents that reach it again through another relationship.
#[derive(Debug, Clone)]
pub struct ProcessedPath {
    pub external_id: String,
    pub title: String,
}

pub struct RunContext {
    /// Core display name → core id, per category. Loaded at bootstrap and
    /// extended as new cores are reconciled during the run.
    pub cores: HashMap<(Category, String), String>,
    pub qualities: HashMap<String, String>,
    pub manufacturers: HashMap<String, String>,
    pub releases: HashMap<String, String>,
    pub source_types: HashMap<String, String>,
    /// Item ids that a reconciled core names as its default, with the core's
    /// display name. Consulted as the "is default" hint for items.
    pub known_defaults: HashMap<(Category, String), String>,
    pub(crate) palette_memo: HashMap<String, String>,
    pub(crate) attachment_memo: HashMap<(Category, String), String>,
    pub(crate) kit_item_memo: HashSet<(Category, String)>,
    pub processed: HashMap<String, ProcessedPath>,
    pub stats: ResolveStats,
}

impl RunContext {
    /// Load the bootstrap dictionaries for a fresh run.
    ///
    /// Failure here is always fatal: every subsequent item depends on these
    /// maps, so a partial bootstrap would mis-resolve the whole page.
    pub fn bootstrap(conn: &Connection) -> Result<Self, SyncError> {
        let mut cores = HashMap::new();
        for &category in Category::all() {
            for (name, id) in queries::core_name_map(conn, category)? {
                cores.insert((category, name), id);
            }
        }

        let source_types = queries::lookup_map(conn, LookupKind::SourceType)?;
        if !source_types.contains_key(SOURCE_TYPE_PENDING) {
            return Err(SyncError::Bootstrap(format!(
                "source_types dictionary is missing the '{SOURCE_TYPE_PENDING}' entry"
            )));
        }

        Ok(Self {
            cores,
            qualities: queries::lookup_map(conn, LookupKind::Quality)?,
            manufacturers: queries::lookup_map(conn, LookupKind::Manufacturer)?,
            releases: queries::lookup_map(conn, LookupKind::Release)?,
            source_types,
            known_defaults: HashMap::new(),
            palette_memo: HashMap::new(),
            attachment_memo: HashMap::new(),
            kit_item_memo: HashSet::new(),
            processed: HashMap::new(),
            stats: ResolveStats::default(),
        })
    }

    /// Id of the provenance type granted to records no listing has
    /// referenced yet. Presence is checked at bootstrap.
    pub fn pending_source_type(&self) -> &str {
        self.source_types
            .get(SOURCE_TYPE_PENDING)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Record a newly created palette so later references in the same run
    /// resolve from the memo.
    pub fn memoize_palette(&mut self, config_id: impl Into<String>, palette_id: impl Into<String>) {
        self.palette_memo.insert(config_id.into(), palette_id.into());
    }

    /// Record a reconciled core so later drafts resolve its name without a
    /// store query.
    pub fn memoize_core(
        &mut self,
        category: Category,
        name: impl Into<String>,
        id: impl Into<String>,
    ) {
        self.cores.insert((category, name.into()), id.into());
    }
}
