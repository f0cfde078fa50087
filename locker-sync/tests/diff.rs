mod common;

use common::{FakeSource, MemoryBlobs};
use locker_catalog::types::*;
use locker_catalog::Category;
use locker_db::{operations, queries};
use locker_sync::diff::{self, Outcome};
use locker_sync::{DraftHints, RunContext};
use serde_json::json;

const MAX_ATTEMPTS: u32 = 3;

fn draft_for(name: &str, cores: &[&str]) -> EntityDraft {
    let raw = common::armor_snapshot(name, "Helmet", cores);
    locker_sync::normalize(
        &format!("items/{}.json", "W1"),
        &raw,
        Category::Armor,
        &DraftHints::default(),
    )
    .unwrap()
}

fn persist(conn: &rusqlite::Connection, outcome: &Outcome) {
    match outcome {
        Outcome::Created { record, changes } | Outcome::Updated { record, changes } => {
            operations::upsert_item(conn, record).unwrap();
            operations::append_changes(conn, RecordKind::Item, record.category, &record.id, changes)
                .unwrap();
        }
        Outcome::Unchanged => {}
    }
}

#[tokio::test]
async fn create_then_unchanged_then_update() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    // An attachment record, so the full diff path issues a resolver query.
    let mut spike = ItemRecord::new("a1", Category::Armor);
    spike.name = "Spike".to_string();
    spike.item_type = "Attachment".to_string();
    operations::upsert_item(&conn, &spike).unwrap();

    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let mut ctx = RunContext::bootstrap(&conn).unwrap();

    let mut draft = draft_for("Alpha", &["Yoroi"]);
    draft.external_id = "W1".to_string();
    draft.attachment_names = vec!["Spike".to_string()];

    // First sight: Created, with the creation audit entry.
    let outcome = diff::reconcile_item(
        &conn, &mut ctx, &source, &blobs, None, &draft, Category::Armor, "etag-1", MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    let Outcome::Created { record, changes } = &outcome else {
        panic!("expected Created, got {outcome:?}");
    };
    assert_eq!(record.id, "W1");
    assert_eq!(record.name, "Alpha");
    assert_eq!(record.cores, vec!["core-yoroi"]);
    assert_eq!(record.attachments, vec!["a1"]);
    assert_eq!(record.source_types, vec!["st-pending"]);
    assert_eq!(record.etag, "etag-1");
    assert!(record.needs_review);
    assert_eq!(changes.len(), 1);
    assert!(changes[0].is_creation());
    assert_eq!(changes[0].new_value, "Added item to DB");
    persist(&conn, &outcome);

    let queries_after_create = ctx.stats.store_queries;
    assert!(queries_after_create >= 1);

    // Same token again: Unchanged, zero additional resolver calls, zero new
    // audit entries.
    let existing = operations::get_item(&conn, Category::Armor, "W1").unwrap().unwrap();
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &draft,
        Category::Armor,
        "etag-1",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Outcome::Unchanged));
    assert_eq!(ctx.stats.store_queries, queries_after_create);
    let log = queries::change_log_for(&conn, RecordKind::Item, Category::Armor, "W1").unwrap();
    assert_eq!(log.len(), 1);

    // New token and a rename: Updated with exactly one entry for the name.
    let mut renamed = draft.clone();
    renamed.name = "Alpha Prime".to_string();
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &renamed,
        Category::Armor,
        "etag-2",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    let Outcome::Updated { record, changes } = &outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert_eq!(record.name, "Alpha Prime");
    assert_eq!(record.etag, "etag-2");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].field, "name");
    assert_eq!(changes[0].old_value, "Alpha");
    assert_eq!(changes[0].new_value, "Alpha Prime");
    // The caller-held snapshot was never mutated.
    assert_eq!(existing.name, "Alpha");
    assert_eq!(existing.etag, "etag-1");
    persist(&conn, &outcome);

    let log = queries::change_log_for(&conn, RecordKind::Item, Category::Armor, "W1").unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].field, "name");
    assert!(log[1].is_creation());
}

#[tokio::test]
async fn reference_sets_compare_as_sets() {
    let conn = common::seed_db();
    for (id, name) in [("core-a", "CoreA"), ("core-b", "CoreB"), ("core-c", "CoreC")] {
        common::seed_core(&conn, Category::Armor, id, name);
    }
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let mut ctx = RunContext::bootstrap(&conn).unwrap();

    let mut draft = draft_for("Trim", &["CoreA", "CoreB", "CoreC"]);
    draft.external_id = "W2".to_string();
    let outcome = diff::reconcile_item(
        &conn, &mut ctx, &source, &blobs, None, &draft, Category::Armor, "e1", MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    persist(&conn, &outcome);
    let existing = operations::get_item(&conn, Category::Armor, "W2").unwrap().unwrap();
    assert_eq!(existing.cores, vec!["core-a", "core-b", "core-c"]);

    // Reordered set: no change reported.
    let mut reordered = draft.clone();
    reordered.core_names = vec!["CoreC".into(), "CoreA".into(), "CoreB".into()];
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &reordered,
        Category::Armor,
        "e2",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Outcome::Unchanged));

    // Shrunk set: exactly one entry naming the field, whole array replaced.
    let mut shrunk = draft.clone();
    shrunk.core_names = vec!["CoreA".into(), "CoreB".into()];
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &shrunk,
        Category::Armor,
        "e3",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    let Outcome::Updated { record, changes } = &outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].field, "cores");
    assert_eq!(record.cores, vec!["core-a", "core-b"]);
}

#[tokio::test]
async fn change_log_accumulates_most_recent_first() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let mut ctx = RunContext::bootstrap(&conn).unwrap();

    let mut draft = draft_for("X", &["Yoroi"]);
    draft.external_id = "W3".to_string();
    let outcome = diff::reconcile_item(
        &conn, &mut ctx, &source, &blobs, None, &draft, Category::Armor, "e1", MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    persist(&conn, &outcome);

    for (name, etag) in [("Y", "e2"), ("Z", "e3")] {
        let existing = operations::get_item(&conn, Category::Armor, "W3").unwrap().unwrap();
        let mut renamed = draft.clone();
        renamed.name = name.to_string();
        let outcome = diff::reconcile_item(
            &conn,
            &mut ctx,
            &source,
            &blobs,
            Some(&existing),
            &renamed,
            Category::Armor,
            etag,
            MAX_ATTEMPTS,
        )
        .await
        .unwrap();
        persist(&conn, &outcome);
    }

    let log = queries::change_log_for(&conn, RecordKind::Item, Category::Armor, "W3").unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!((log[0].old_value.as_str(), log[0].new_value.as_str()), ("Y", "Z"));
    assert_eq!((log[1].old_value.as_str(), log[1].new_value.as_str()), ("X", "Y"));
    assert!(log[2].is_creation());
}

#[tokio::test]
async fn hidden_only_flips_to_visible() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let mut ctx = RunContext::bootstrap(&conn).unwrap();

    let mut hidden_draft = draft_for("Shade", &["Yoroi"]);
    hidden_draft.external_id = "W4".to_string();
    hidden_draft.hidden = true;
    let outcome = diff::reconcile_item(
        &conn, &mut ctx, &source, &blobs, None, &hidden_draft, Category::Armor, "e1", MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    persist(&conn, &outcome);

    // Hidden → visible is applied and logged.
    let existing = operations::get_item(&conn, Category::Armor, "W4").unwrap().unwrap();
    let mut visible = hidden_draft.clone();
    visible.hidden = false;
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &visible,
        Category::Armor,
        "e2",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    let Outcome::Updated { record, changes } = &outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert!(!record.hidden);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].field, "hidden");
    persist(&conn, &outcome);

    // Visible → hidden is never applied by this path.
    let existing = operations::get_item(&conn, Category::Armor, "W4").unwrap().unwrap();
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &hidden_draft,
        Category::Armor,
        "e3",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Outcome::Unchanged));
}

#[tokio::test]
async fn overrides_bypass_the_freshness_short_circuit() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let mut ctx = RunContext::bootstrap(&conn).unwrap();

    let mut kit_draft = draft_for("Kit Piece", &["Yoroi"]);
    kit_draft.external_id = "W5".to_string();
    kit_draft.kit_only = true;
    let outcome = diff::reconcile_item(
        &conn, &mut ctx, &source, &blobs, None, &kit_draft, Category::Armor, "e1", MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    persist(&conn, &outcome);

    // Same token, but the item is newly un-kit-only'd: the short circuit
    // must not swallow the correction.
    let existing = operations::get_item(&conn, Category::Armor, "W5").unwrap().unwrap();
    let mut unkitted = kit_draft.clone();
    unkitted.kit_only = false;
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &unkitted,
        Category::Armor,
        "e1",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    let Outcome::Updated { record, changes } = &outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert!(!record.kit_only);
    assert!(changes.iter().any(|c| c.field == "kit_only"));
    persist(&conn, &outcome);

    // Same token, but newly declared default-of-core.
    let existing = operations::get_item(&conn, Category::Armor, "W5").unwrap().unwrap();
    let mut defaulted = unkitted.clone();
    defaulted.default_of_core = Some("Yoroi".to_string());
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &defaulted,
        Category::Armor,
        "e1",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    let Outcome::Updated { record, changes } = &outcome else {
        panic!("expected Updated, got {outcome:?}");
    };
    assert_eq!(record.default_of_core.as_deref(), Some("core-yoroi"));
    assert!(changes.iter().any(|c| c.field == "default_of_core"));
}

#[tokio::test]
async fn image_recomputed_only_when_governing_fields_change() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    source.put_asset("images/w6.png", b"png", "img-etag-1");
    let blobs = MemoryBlobs::new();
    let mut ctx = RunContext::bootstrap(&conn).unwrap();

    let mut raw = common::armor_snapshot("Helm", "Helmet", &["Yoroi"]);
    raw["DisplayPath"] = json!("images/w6.png");
    let mut draft = locker_sync::normalize(
        "items/W6.json",
        &raw,
        Category::Armor,
        &DraftHints::default(),
    )
    .unwrap();
    draft.external_id = "W6".to_string();

    let outcome = diff::reconcile_item(
        &conn, &mut ctx, &source, &blobs, None, &draft, Category::Armor, "e1", MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    let Outcome::Created { record, .. } = &outcome else {
        panic!("expected Created, got {outcome:?}");
    };
    assert_eq!(record.image_ref.as_deref(), Some("armor/images_w6.png"));
    assert_eq!(record.image_etag, "img-etag-1");
    assert_eq!(source.byte_fetches(), 1);
    persist(&conn, &outcome);

    // A rename alone does not touch the image.
    let existing = operations::get_item(&conn, Category::Armor, "W6").unwrap().unwrap();
    let mut renamed = draft.clone();
    renamed.name = "Helm Prime".to_string();
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &renamed,
        Category::Armor,
        "e2",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Outcome::Updated { .. }));
    assert_eq!(source.byte_fetches(), 1);
    assert_eq!(source.probes(), 0);
    persist(&conn, &outcome);

    // A type change re-validates the image; the matching token means the
    // cached blob is reused without a fetch.
    let existing = operations::get_item(&conn, Category::Armor, "W6").unwrap().unwrap();
    let mut retyped = renamed.clone();
    retyped.item_type = "Visor".to_string();
    let outcome = diff::reconcile_item(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Some(&existing),
        &retyped,
        Category::Armor,
        "e3",
        MAX_ATTEMPTS,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Outcome::Updated { .. }));
    assert_eq!(source.probes(), 1);
    assert_eq!(source.byte_fetches(), 1);
}
