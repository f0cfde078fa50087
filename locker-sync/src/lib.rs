//! Incremental reconciliation engine for the customization catalog.
//!
//! For each incoming snapshot the engine decides whether the stored record
//! needs to change, what exactly changed, how its relationships resolve, and
//! how its binary asset is cached — safely across repeated, resumable,
//! partially-failing batch runs. The external catalog and blob storage are
//! consumed through the `locker-source` traits; persistence goes through
//! `locker-db`.

pub mod assets;
pub mod availability;
pub mod batch;
pub mod context;
pub mod diff;
pub mod error;
pub mod normalize;
pub mod progress;
pub mod report;
pub mod resolve;
pub mod retry;

pub use assets::{asset_key, ensure_asset, AssetRequest, PLACEHOLDER_REF};
pub use availability::apply_listing_page;
pub use batch::{
    run_listing_pass, run_page, sync_cores, BatchOptions, PageOutcome, DEFAULT_PAGE_SIZE,
    DEFAULT_PREFETCH_WORKERS,
};
pub use context::{ProcessedPath, ResolveStats, RunContext};
pub use diff::{reconcile_core, reconcile_item, CoreOutcome, Outcome};
pub use error::SyncError;
pub use normalize::{
    child_paths, external_id_from_path, normalize, normalize_core, normalize_listing,
    normalize_palette, CoreDraft, DraftHints, ListingDraft, ListingItemName, NormalizeError,
    PaletteDraft, PaletteSlotDraft,
};
pub use progress::{LogProgress, SilentProgress, SyncProgress};
pub use report::{ItemSummary, LifecycleReport, ListingTransition, OutcomeKind, SyncStats};
pub use resolve::{
    resolve_attachments, resolve_cores, resolve_kit_items, resolve_palette, PaletteResolution,
    ResolveError,
};
pub use retry::{retry, retry_blocking, Retryable, DEFAULT_MAX_ATTEMPTS};
