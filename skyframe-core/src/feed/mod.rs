//! Feed selection engine.
//!
//! Each request runs the same pipeline: compute cutoffs, fetch the
//! prioritized candidate pool (liked images and followed uploaders), fetch
//! the discovery pool (unbiased random sample of the rest), blend both under
//! the diversity caps, and emit the page with its next cursor. No state is
//! held between requests beyond the persistent seen ledger; everything else
//! round-trips through the cursor.
//!
//! The engine never fails a request because the pools came up short: an empty
//! blend degrades to an unconstrained random sample, since "no good feed" is
//! a valid product state, not a fault.

mod blend;
mod cursor;

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tracing::{debug, info};

use crate::catalog::{CatalogStore, ImageQuery, ImageRecord, SeenStore};
use crate::config::FeedConfig;
use crate::error::Result;

use blend::blend_feed;
pub use cursor::{format_feed_cursor, parse_feed_cursor, FeedCursor};

/// Marker emitted while seen-tracking paginates; it only signals "more pages
/// exist", the ledger itself carries the position.
const SEEN_MARKER: &str = "seen";
/// Marker telling the next call to draw a fresh random discovery slice.
const DISCOVERY_RESUME_MARKER: &str = "random";

/// One viewer's feed request.
#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    /// Image ids the viewer has liked.
    pub liked_ids: HashSet<i64>,
    /// Uploader ids the viewer follows.
    pub following_ids: HashSet<i64>,
    /// Raw cursor from the previous page, if any.
    pub cursor: Option<String>,
    /// Known viewer id; `None` for anonymous viewers (no seen-tracking).
    pub viewer_id: Option<i64>,
}

/// One emitted feed page.
#[derive(Debug, Clone)]
pub struct FeedSelection {
    pub images: Vec<ImageRecord>,
    /// Cursor for the next page; empty when no further pages exist.
    pub next_cursor: String,
    /// The seen ids that were excluded from this page's candidates.
    pub seen_ids: HashSet<i64>,
    pub has_more: bool,
}

/// Select and order one page of the viewer's feed.
///
/// The random source is injected so tests can seed it; production passes
/// thread-local entropy. The draw must never depend on viewer identity.
pub fn build_feed_selection<C, S>(
    catalog: &C,
    seen_store: &S,
    request: &FeedRequest,
    config: &FeedConfig,
    rng: &mut dyn RngCore,
    now: DateTime<Utc>,
) -> Result<FeedSelection>
where
    C: CatalogStore,
    S: SeenStore,
{
    let prioritized_pct = config.prioritized_pct.min(100);
    let use_seen = config.seen_enabled && request.viewer_id.is_some();
    let prioritized_target =
        ((config.page_size as f64) * (f64::from(prioritized_pct) / 100.0)).round() as usize;
    let candidate_limit = (config.page_size * config.candidate_multiplier).max(config.page_size);

    let cursor_state = parse_feed_cursor(request.cursor.as_deref())?;
    let cutoff = fresh_cutoff(config.fresh_days, now);

    let seen_ids: HashSet<i64> = match (use_seen, request.viewer_id) {
        (true, Some(viewer)) => {
            seen_store.seen_lookup(viewer, config.seen_retention_days, config.seen_max_ids, now)?
        }
        _ => HashSet::new(),
    };

    let has_prioritized_filter =
        !request.liked_ids.is_empty() || !request.following_ids.is_empty();
    let prioritized_candidates = if has_prioritized_filter {
        let query = ImageQuery {
            liked_ids: (!request.liked_ids.is_empty()).then(|| request.liked_ids.clone()),
            uploader_ids: (!request.following_ids.is_empty())
                .then(|| request.following_ids.clone()),
            exclude_ids: seen_ids.clone(),
            min_observed_at: cutoff,
            // With seen-tracking on, the ledger carries the position and the
            // positional cursor is not applied.
            before: if use_seen {
                None
            } else {
                cursor_state.prioritized
            },
            limit: candidate_limit,
        };
        catalog.query_images(&query)?
    } else {
        Vec::new()
    };

    let prioritized_ids: HashSet<i64> = prioritized_candidates.iter().map(|r| r.id).collect();
    let mut discovery_exclude = seen_ids.clone();
    discovery_exclude.extend(&prioritized_ids);
    let discovery_candidates = catalog.random_sample(&discovery_exclude, candidate_limit, rng)?;

    let prioritized_count = prioritized_candidates.len();
    let discovery_count = discovery_candidates.len();
    debug!(
        prioritized = prioritized_count,
        discovery = discovery_count,
        target = prioritized_target,
        "feed candidate pools loaded"
    );

    let (mut images, last_prioritized) = blend_feed(
        prioritized_candidates,
        discovery_candidates,
        config.page_size,
        prioritized_target,
        config.max_per_uploader,
        config.max_consecutive,
    );

    let mut has_more = prioritized_count + discovery_count > images.len();
    let mut next_cursor = if use_seen {
        if has_more {
            SEEN_MARKER.to_string()
        } else {
            String::new()
        }
    } else {
        let prioritized_cursor = match (&last_prioritized, has_prioritized_filter) {
            (Some(key), true) => Some(cursor::encode_sort_key(key)),
            _ => cursor_state.prioritized.as_ref().map(cursor::encode_sort_key),
        };
        let global_cursor = if discovery_count > 0 {
            Some(DISCOVERY_RESUME_MARKER.to_string())
        } else {
            cursor_state.global_new.clone()
        };
        if images.is_empty() {
            String::new()
        } else {
            format_feed_cursor(prioritized_cursor.as_deref(), global_cursor.as_deref())
        }
    };

    if images.is_empty() {
        // Never hard-empty on a non-empty catalog: drop every filter and
        // serve a plain random sample.
        images = catalog.random_sample(&HashSet::new(), config.page_size, rng)?;
        if !images.is_empty() {
            info!(count = images.len(), "feed pools empty, served random fallback");
        }
        next_cursor = if images.is_empty() {
            String::new()
        } else {
            DISCOVERY_RESUME_MARKER.to_string()
        };
        has_more = !images.is_empty();
    }

    Ok(FeedSelection {
        images,
        next_cursor,
        seen_ids,
        has_more,
    })
}

/// Record an emitted page in the viewer's seen ledger and prune stale
/// entries. A no-op for anonymous viewers and empty pages.
///
/// Upserts are idempotent per (viewer, image), so concurrent requests that
/// raced on the same snapshot converge instead of erroring.
pub fn persist_seen_for_feed<S: SeenStore>(
    seen_store: &mut S,
    viewer_id: Option<i64>,
    images: &[ImageRecord],
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(viewer) = viewer_id else {
        return Ok(());
    };
    if images.is_empty() {
        return Ok(());
    }
    let image_ids: Vec<i64> = images.iter().map(|r| r.id).collect();
    seen_store.seen_upsert(viewer, &image_ids, now)?;
    if retention_days > 0 {
        let removed = seen_store.seen_prune(viewer, retention_days, now)?;
        if removed > 0 {
            debug!(viewer, removed, "pruned stale seen entries");
        }
    }
    Ok(())
}

fn fresh_cutoff(days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (days > 0).then(|| now - Duration::days(i64::from(days)))
}
