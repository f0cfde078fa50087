mod common;

use common::{FakeSource, MemoryBlobs};
use locker_catalog::Category;
use locker_db::{operations, queries};
use locker_sync::batch::{run_page, sync_cores, BatchOptions};
use locker_sync::{RunContext, SilentProgress};
use serde_json::json;

fn options(page_size: usize) -> BatchOptions {
    let mut options = BatchOptions::new(Category::Armor, "armor-items");
    options.page_size = page_size;
    options.max_attempts = 3;
    options
}

fn seed_source_items(source: &FakeSource, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let path = format!("items/w{i}.json");
            source.put_snapshot(
                &path,
                common::armor_snapshot(&format!("Item {i}"), "Helmet", &["Yoroi"]),
                &format!("etag-w{i}"),
            );
            path
        })
        .collect()
}

#[tokio::test]
async fn checkpoint_covers_every_element_exactly_once() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let paths = seed_source_items(&source, 7);
    let options = options(3);

    // ceil(7 / 3) = 3 runs, offset carried between them.
    let mut offsets = Vec::new();
    for _ in 0..3 {
        let mut ctx = RunContext::bootstrap(&conn).unwrap();
        let outcome = run_page(
            &conn,
            &mut ctx,
            &source,
            &blobs,
            &options,
            &paths,
            &SilentProgress,
        )
        .await
        .unwrap();
        offsets.push((outcome.offset, outcome.next_offset, outcome.list_finished));
    }

    assert_eq!(offsets, vec![(0, 3, false), (3, 6, false), (6, 0, true)]);
    assert_eq!(queries::checkpoint(&conn, "armor-items").unwrap(), 0);

    // Every element visited exactly once.
    assert_eq!(source.fetches(), 7);
    for i in 0..7 {
        assert!(operations::get_item(&conn, Category::Armor, &format!("w{i}"))
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn exact_multiple_of_page_size_still_resets() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let paths = seed_source_items(&source, 6);
    let options = options(3);

    for _ in 0..2 {
        let mut ctx = RunContext::bootstrap(&conn).unwrap();
        run_page(&conn, &mut ctx, &source, &blobs, &options, &paths, &SilentProgress)
            .await
            .unwrap();
    }
    assert_eq!(queries::checkpoint(&conn, "armor-items").unwrap(), 0);
}

#[tokio::test]
async fn kit_children_reconcile_before_parent_and_dedup() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();

    source.put_snapshot(
        "items/w7.json",
        common::armor_snapshot("Kit Shoulder", "Shoulder", &["Yoroi"]),
        "etag-w7",
    );
    source.put_snapshot(
        "items/kit1.json",
        json!({
            "Title": "Big Kit",
            "Slot": "Kit",
            "ParentCores": ["Yoroi"],
            "KitContents": ["items/w7.json"],
        }),
        "etag-kit1",
    );

    // The kit child is also reachable as a top-level path.
    let paths = vec!["items/kit1.json".to_string(), "items/w7.json".to_string()];
    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    let outcome = run_page(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        &options(10),
        &paths,
        &SilentProgress,
    )
    .await
    .unwrap();

    // The child was reconciled exactly once, via the kit.
    assert_eq!(outcome.stats.items_created, 2);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(source.fetches(), 2);

    // The kit resolved its child because the child was persisted first.
    let kit = operations::get_item(&conn, Category::Armor, "kit1").unwrap().unwrap();
    assert_eq!(kit.kit_items, vec!["w7"]);

    let child = operations::get_item(&conn, Category::Armor, "w7").unwrap().unwrap();
    assert!(child.kit_only);
}

#[tokio::test]
async fn attachments_reconcile_before_parent() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();

    // The attachment snapshot has no core list of its own; it inherits the
    // parent's.
    source.put_snapshot(
        "items/a1.json",
        json!({ "Title": "Spike", "Slot": "Attachment" }),
        "etag-a1",
    );
    source.put_snapshot(
        "items/w10.json",
        json!({
            "Title": "Horned Helm",
            "Slot": "Helmet",
            "ParentCores": ["Yoroi"],
            "Attachments": ["items/a1.json"],
        }),
        "etag-w10",
    );

    let paths = vec!["items/w10.json".to_string()];
    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    let outcome = run_page(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        &options(10),
        &paths,
        &SilentProgress,
    )
    .await
    .unwrap();
    assert_eq!(outcome.stats.items_created, 2);

    let spike = operations::get_item(&conn, Category::Armor, "a1").unwrap().unwrap();
    assert_eq!(spike.cores, vec!["core-yoroi"]);
    assert!(!spike.kit_only);

    let helm = operations::get_item(&conn, Category::Armor, "w10").unwrap().unwrap();
    assert_eq!(helm.attachments, vec!["a1"]);
}

#[tokio::test]
async fn per_item_failures_skip_without_aborting_the_page() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();

    source.put_snapshot(
        "items/w1.json",
        common::armor_snapshot("Good Item", "Helmet", &["Yoroi"]),
        "etag-w1",
    );
    // items/missing.json is never seeded; items/orphan.json cannot resolve
    // a parent core.
    source.put_snapshot(
        "items/orphan.json",
        json!({ "Title": "Orphan", "Slot": "Helmet" }),
        "etag-orphan",
    );

    let paths = vec![
        "items/missing.json".to_string(),
        "items/orphan.json".to_string(),
        "items/w1.json".to_string(),
    ];
    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    let outcome = run_page(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        &options(10),
        &paths,
        &SilentProgress,
    )
    .await
    .unwrap();

    assert_eq!(outcome.stats.errors, 2);
    assert_eq!(outcome.stats.items_created, 1);
    assert!(operations::get_item(&conn, Category::Armor, "w1").unwrap().is_some());
    // The page completed, so the checkpoint was still advanced (and reset,
    // since this was the final page).
    assert!(outcome.list_finished);
}

#[tokio::test]
async fn second_run_short_circuits_on_freshness_tokens() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();
    let paths = seed_source_items(&source, 3);
    let options = options(10);

    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    let first = run_page(&conn, &mut ctx, &source, &blobs, &options, &paths, &SilentProgress)
        .await
        .unwrap();
    assert_eq!(first.stats.items_created, 3);

    // A fresh run over unchanged snapshots: every fetch is conditional and
    // every item passes through unchanged.
    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    let second = run_page(&conn, &mut ctx, &source, &blobs, &options, &paths, &SilentProgress)
        .await
        .unwrap();
    assert_eq!(second.stats.items_created, 0);
    assert_eq!(second.stats.items_updated, 0);
    assert_eq!(second.stats.items_unchanged, 3);

    // No resolver store traffic at all on the unchanged run.
    assert_eq!(ctx.stats.store_queries, 0);
}

#[tokio::test]
async fn palettes_created_once_and_assets_prefetched() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();

    for id in ["w1", "w2"] {
        let mut raw = common::armor_snapshot(&format!("Item {id}"), "Helmet", &["Yoroi"]);
        raw["PaletteConfigId"] = json!("cfg-1");
        source.put_snapshot(&format!("items/{id}.json"), raw, &format!("etag-{id}"));
    }
    source.put_snapshot(
        "palettes/cfg-1.json",
        json!({
            "Name": "Crimson",
            "Nameplates": [
                { "NameplateId": "np-1", "PrimaryPath": "p/np1-a.png", "SecondaryPath": "p/np1-b.png", "TextColor": "#f00" },
                { "NameplateId": "np-2", "PrimaryPath": "p/np2-a.png", "SecondaryPath": "p/np2-b.png", "TextColor": "#0f0" },
            ],
        }),
        "etag-cfg-1",
    );
    for path in ["p/np1-a.png", "p/np1-b.png", "p/np2-a.png", "p/np2-b.png"] {
        source.put_asset(path, b"png", "img-etag");
    }

    let paths = vec!["items/w1.json".to_string(), "items/w2.json".to_string()];
    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    let outcome = run_page(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        &options(10),
        &paths,
        &SilentProgress,
    )
    .await
    .unwrap();

    // One palette for two referencing items; the second resolution came
    // from the run memo.
    assert_eq!(outcome.stats.palettes_created, 1);
    let palette = queries::get_palette(&conn, "cfg-1").unwrap().unwrap();
    assert_eq!(palette.slots.len(), 2);
    assert_eq!(palette.slots["np-1"].primary_ref, "palettes/p_np1-a.png");
    assert_eq!(palette.slots["np-2"].secondary_ref, "palettes/p_np2-b.png");
    assert_eq!(palette.slots["np-1"].text_color, "#f00");
    assert_eq!(source.byte_fetches(), 4);

    for id in ["w1", "w2"] {
        let item = operations::get_item(&conn, Category::Armor, id).unwrap().unwrap();
        assert_eq!(item.palettes, vec!["cfg-1"]);
    }
}

#[tokio::test]
async fn listing_pass_fetches_and_applies_the_page() {
    let conn = common::seed_db();
    common::seed_core(&conn, Category::Armor, "core-yoroi", "Yoroi");
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();

    // An item the listing can reference.
    let paths = seed_source_items(&source, 1);
    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    run_page(&conn, &mut ctx, &source, &blobs, &options(10), &paths, &SilentProgress)
        .await
        .unwrap();

    source.put_snapshot(
        "shop/bundle-1.json",
        json!({
            "Title": "Weekly Bundle",
            "Description": "Shop exclusive.",
            "Price": 900,
            "Items": [ { "Name": "Item 0", "Category": "armor", "Kind": "item" } ],
        }),
        "etag-bundle",
    );

    let report = locker_sync::batch::run_listing_pass(
        &conn,
        &mut ctx,
        &source,
        locker_catalog::ListingKind::Shop,
        &["shop/bundle-1.json".to_string(), "shop/missing.json".to_string()],
        3,
    )
    .await
    .unwrap();

    // The missing snapshot was skipped; the present one transitioned.
    assert_eq!(report.became_available.len(), 1);
    assert_eq!(report.became_available[0].name, "Weekly Bundle");
    assert_eq!(report.became_available[0].items[0].name, "Item 0");

    let item = operations::get_item(&conn, Category::Armor, "w0").unwrap().unwrap();
    assert!(item.available);
    assert_eq!(item.source_types, vec!["st-shop"]);
}

#[tokio::test]
async fn core_sync_feeds_name_map_and_default_hints() {
    let conn = common::seed_db();
    let source = FakeSource::new();
    let blobs = MemoryBlobs::new();

    source.put_snapshot(
        "cores/yoroi.json",
        json!({
            "Title": "Yoroi",
            "Quality": "Legendary",
            "Season": "Season Two",
            "DefaultItemId": "w1",
        }),
        "etag-core",
    );
    source.put_snapshot(
        "items/w1.json",
        common::armor_snapshot("Default Helm", "Helmet", &["Yoroi"]),
        "etag-w1",
    );

    let mut ctx = RunContext::bootstrap(&conn).unwrap();
    let core_paths = vec!["cores/yoroi.json".to_string()];
    let stats = sync_cores(
        &conn,
        &mut ctx,
        &source,
        &blobs,
        Category::Armor,
        &core_paths,
        3,
    )
    .await
    .unwrap();
    assert_eq!(stats.cores_created, 1);

    let core = operations::get_core(&conn, Category::Armor, "yoroi").unwrap().unwrap();
    assert_eq!(core.name, "Yoroi");
    assert_eq!(core.quality_id.as_deref(), Some("q-legendary"));
    assert_eq!(core.release_id.as_deref(), Some("rel-2"));

    // Items reconciled later in the same run resolve the new core and pick
    // up the declared default.
    let paths = vec!["items/w1.json".to_string()];
    run_page(&conn, &mut ctx, &source, &blobs, &options(10), &paths, &SilentProgress)
        .await
        .unwrap();

    let item = operations::get_item(&conn, Category::Armor, "w1").unwrap().unwrap();
    assert_eq!(item.cores, vec!["yoroi"]);
    assert_eq!(item.default_of_core.as_deref(), Some("yoroi"));
}
