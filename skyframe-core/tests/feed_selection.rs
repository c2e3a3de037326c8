//! End-to-end tests for the feed selection engine over the in-memory catalog.

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use skyframe_core::{
    build_feed_selection, persist_seen_for_feed, FeedConfig, FeedRequest, ImageRecord,
    MemoryCatalog,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("skyframe_core=debug")
        .with_test_writer()
        .try_init();
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap()
}

/// Catalog record whose observation time advances with its id, so newest-first
/// order equals descending id order.
fn record(id: i64, user_id: i64) -> ImageRecord {
    ImageRecord {
        id,
        user_id,
        uploader_name: format!("observer{user_id}"),
        category: "Planets".into(),
        object_name: "Saturn".into(),
        observer_name: format!("observer{user_id}"),
        observed_at: now() - Duration::days(5) + Duration::hours(id),
        created_at: now() - Duration::days(5),
        location: None,
        filter: Some("RGB".into()),
        telescope: None,
        camera: None,
        allow_scientific_use: false,
        signature_sha256: None,
        signature_phash: None,
        signature_dhash: None,
        watermark_hash: None,
    }
}

fn config() -> FeedConfig {
    FeedConfig {
        page_size: 5,
        fresh_days: 0,
        prioritized_pct: 40,
        candidate_multiplier: 3,
        max_per_uploader: 0,
        max_consecutive: 0,
        seen_enabled: false,
        seen_retention_days: 14,
        seen_max_ids: 500,
    }
}

fn ids(selection: &[ImageRecord]) -> Vec<i64> {
    selection.iter().map(|r| r.id).collect()
}

#[test]
fn prioritized_slots_fill_first_then_discovery() {
    init_tracing();
    // Ten images from ten uploaders. The viewer likes image 3 and follows the
    // uploader of image 7; with a 40% prioritized share of a 5-item page, two
    // slots go to the prioritized pool, newest first.
    let mut catalog = MemoryCatalog::new();
    for id in 1..=10 {
        catalog.insert(record(id, id * 100));
    }
    let request = FeedRequest {
        liked_ids: HashSet::from([3]),
        following_ids: HashSet::from([700]),
        cursor: None,
        viewer_id: Some(1),
    };
    let mut rng = StdRng::seed_from_u64(11);

    let page = build_feed_selection(&catalog, &catalog, &request, &config(), &mut rng, now())
        .unwrap();

    let page_ids = ids(&page.images);
    assert_eq!(page_ids.len(), 5);
    assert_eq!(&page_ids[..2], &[7, 3], "prioritized slots, newest first");
    let unique: HashSet<i64> = page_ids.iter().copied().collect();
    assert_eq!(unique.len(), 5, "no id repeats within a page");
    assert!(!page_ids[2..].contains(&3) && !page_ids[2..].contains(&7));
    assert!(page.next_cursor.starts_with("p="));
    assert!(page.next_cursor.contains("g=random"));
    assert!(page.has_more);
}

#[test]
fn page_is_bounded_and_filled_when_possible() {
    let mut catalog = MemoryCatalog::new();
    for id in 1..=20 {
        catalog.insert(record(id, id));
    }
    let request = FeedRequest {
        viewer_id: Some(1),
        ..FeedRequest::default()
    };
    let mut rng = StdRng::seed_from_u64(3);

    let page = build_feed_selection(&catalog, &catalog, &request, &config(), &mut rng, now())
        .unwrap();
    assert_eq!(page.images.len(), 5);
    assert!(page.has_more);
}

#[test]
fn per_uploader_cap_holds_in_emitted_pages() {
    let mut catalog = MemoryCatalog::new();
    // Uploader 1 floods the catalog; a handful of others exist.
    for id in 1..=10 {
        catalog.insert(record(id, 1));
    }
    for id in 11..=16 {
        catalog.insert(record(id, id));
    }
    let config = FeedConfig {
        max_per_uploader: 2,
        ..config()
    };
    let request = FeedRequest {
        viewer_id: Some(1),
        ..FeedRequest::default()
    };

    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let page =
            build_feed_selection(&catalog, &catalog, &request, &config, &mut rng, now()).unwrap();
        let from_flooder = page.images.iter().filter(|r| r.user_id == 1).count();
        assert!(from_flooder <= 2, "uploader cap violated: {from_flooder}");
        assert_eq!(page.images.len(), 5);
    }
}

#[test]
fn seen_ledger_prevents_repeats_across_pages() {
    init_tracing();
    let mut catalog = MemoryCatalog::new();
    for id in 1..=12 {
        catalog.insert(record(id, id));
    }
    let config = FeedConfig {
        seen_enabled: true,
        ..config()
    };
    let mut emitted: Vec<i64> = Vec::new();
    let mut cursor = None;

    for _ in 0..3 {
        let request = FeedRequest {
            cursor: cursor.clone(),
            viewer_id: Some(9),
            ..FeedRequest::default()
        };
        let mut rng = StdRng::seed_from_u64(21);
        let page =
            build_feed_selection(&catalog, &catalog, &request, &config, &mut rng, now()).unwrap();
        for id in ids(&page.images) {
            assert!(!emitted.contains(&id), "image {id} served twice");
            emitted.push(id);
        }
        persist_seen_for_feed(
            &mut catalog,
            Some(9),
            &page.images,
            config.seen_retention_days,
            now(),
        )
        .unwrap();
        cursor = Some(page.next_cursor.clone());
    }

    assert_eq!(emitted.len(), 12, "three pages cover the whole catalog");
    assert_eq!(cursor.as_deref(), Some(""), "no further pages");
}

#[test]
fn fully_seen_catalog_degrades_to_random_fallback() {
    init_tracing();
    let mut catalog = MemoryCatalog::new();
    for id in 1..=6 {
        catalog.insert(record(id, id));
    }
    let all_ids: Vec<i64> = (1..=6).collect();
    use skyframe_core::SeenStore;
    catalog.seen_upsert(9, &all_ids, now()).unwrap();

    let config = FeedConfig {
        seen_enabled: true,
        ..config()
    };
    let request = FeedRequest {
        viewer_id: Some(9),
        ..FeedRequest::default()
    };
    let mut rng = StdRng::seed_from_u64(2);

    let page =
        build_feed_selection(&catalog, &catalog, &request, &config, &mut rng, now()).unwrap();
    // The feed never returns hard-empty on a non-empty catalog.
    assert_eq!(page.images.len(), 5);
    assert_eq!(page.next_cursor, "random");
    assert!(page.has_more);
}

#[test]
fn empty_catalog_yields_empty_page_and_cursor() {
    let catalog = MemoryCatalog::new();
    let config = FeedConfig {
        seen_enabled: true,
        ..config()
    };
    let request = FeedRequest {
        viewer_id: Some(1),
        ..FeedRequest::default()
    };
    let mut rng = StdRng::seed_from_u64(5);

    let page =
        build_feed_selection(&catalog, &catalog, &request, &config, &mut rng, now()).unwrap();
    assert!(page.images.is_empty());
    assert_eq!(page.next_cursor, "");
    assert!(!page.has_more);
}

#[test]
fn prioritized_cursor_paginates_without_seen_tracking() {
    // All eight images are liked, so the prioritized stream paginates
    // positionally and never re-serves an item. Discovery refills on the
    // final short page may still repeat: without seen-tracking only the
    // prioritized stream carries a position, and the seen ledger is the
    // repeat suppressor.
    let mut catalog = MemoryCatalog::new();
    for id in 1..=8 {
        catalog.insert(record(id, id));
    }
    let config = FeedConfig {
        page_size: 3,
        prioritized_pct: 100,
        ..config()
    };
    let request_for = |cursor: Option<String>| FeedRequest {
        liked_ids: (1..=8).collect(),
        following_ids: HashSet::new(),
        cursor,
        viewer_id: None,
    };
    let mut rng = StdRng::seed_from_u64(13);

    let first =
        build_feed_selection(&catalog, &catalog, &request_for(None), &config, &mut rng, now())
            .unwrap();
    assert_eq!(ids(&first.images), vec![8, 7, 6]);
    assert!(first.has_more);

    let second = build_feed_selection(
        &catalog,
        &catalog,
        &request_for(Some(first.next_cursor.clone())),
        &config,
        &mut rng,
        now(),
    )
    .unwrap();
    assert_eq!(ids(&second.images), vec![5, 4, 3]);

    let third = build_feed_selection(
        &catalog,
        &catalog,
        &request_for(Some(second.next_cursor.clone())),
        &config,
        &mut rng,
        now(),
    )
    .unwrap();
    let third_ids = ids(&third.images);
    // The prioritized remainder leads the page; the third slot is a discovery
    // refill drawn from the already-served range.
    assert_eq!(&third_ids[..2], &[2, 1]);
    assert_eq!(third_ids.len(), 3);
    assert!((3..=8).contains(&third_ids[2]));
}

#[test]
fn freshness_window_limits_the_prioritized_pool() {
    let mut catalog = MemoryCatalog::new();
    let mut stale = record(1, 1);
    stale.observed_at = now() - Duration::days(90);
    catalog.insert(stale);
    catalog.insert(record(2, 2));

    let config = FeedConfig {
        fresh_days: 30,
        prioritized_pct: 100,
        ..config()
    };
    let request = FeedRequest {
        liked_ids: HashSet::from([1, 2]),
        ..FeedRequest::default()
    };
    let mut rng = StdRng::seed_from_u64(4);

    let page =
        build_feed_selection(&catalog, &catalog, &request, &config, &mut rng, now()).unwrap();
    // Image 1 fell outside the freshness window, so it can only surface via
    // discovery, never as a prioritized candidate; image 2 leads the page.
    assert_eq!(page.images[0].id, 2);
}

#[test]
fn corrupted_cursor_surfaces_as_invalid_cursor() {
    let mut catalog = MemoryCatalog::new();
    catalog.insert(record(1, 1));
    let request = FeedRequest {
        cursor: Some("p=definitely-broken|g=random".into()),
        ..FeedRequest::default()
    };
    let mut rng = StdRng::seed_from_u64(6);

    let result = build_feed_selection(&catalog, &catalog, &request, &config(), &mut rng, now());
    assert!(matches!(
        result,
        Err(skyframe_core::SkyFrameError::InvalidCursor(_))
    ));
}
