//! Pass-level statistics and reporting types consumed by downstream
//! notification generation.

/// How one record came out of reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Created,
    Updated,
    Unchanged,
}

/// Statistics from one reconciliation pass.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub items_created: u64,
    pub items_updated: u64,
    pub items_unchanged: u64,
    pub cores_created: u64,
    pub cores_updated: u64,
    pub cores_unchanged: u64,
    pub palettes_created: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl SyncStats {
    pub fn tally_item(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Created => self.items_created += 1,
            OutcomeKind::Updated => self.items_updated += 1,
            OutcomeKind::Unchanged => self.items_unchanged += 1,
        }
    }

    pub fn tally_core(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Created => self.cores_created += 1,
            OutcomeKind::Updated => self.cores_updated += 1,
            OutcomeKind::Unchanged => self.cores_unchanged += 1,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} created, {} updated, {} unchanged ({} cores touched, {} palettes created, {} skipped, {} errors)",
            self.items_created,
            self.items_updated,
            self.items_unchanged,
            self.cores_created + self.cores_updated,
            self.palettes_created,
            self.skipped,
            self.errors,
        )
    }
}

/// Human-oriented summary of one record referenced by a listing transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub name: String,
    pub item_type: String,
    /// Display name of the owning core, when the record belongs to exactly
    /// one real core.
    pub core: Option<String>,
}

/// One listing that became available in this pass.
#[derive(Debug, Clone)]
pub struct ListingTransition {
    pub listing_id: String,
    pub name: String,
    pub items: Vec<ItemSummary>,
}

/// Availability transitions observed for one listing page.
///
/// The two sets are disjoint by construction: a listing cannot both gain
/// and lose availability within one pass.
#[derive(Debug, Default)]
pub struct LifecycleReport {
    pub became_available: Vec<ListingTransition>,
    pub became_unavailable: Vec<String>,
}
