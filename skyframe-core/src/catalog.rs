//! Image catalog data model and storage collaborator contracts.
//!
//! The core engines never talk to a database directly. They consume the
//! [`CatalogStore`] and [`SeenStore`] traits, which the hosting application
//! implements over its storage layer. [`MemoryCatalog`] implements both over
//! plain maps; the test suites run on it, and it doubles as a reference for
//! the query semantics a real backend must honor.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A catalog entry for one stored image.
///
/// The content-addressing fields (`signature_sha256`, `signature_phash`,
/// `signature_dhash`, `watermark_hash`) are immutable once assigned unless the
/// pixel bytes themselves are rewritten, in which case all of them must be
/// recomputed together over the new bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: i64,
    pub user_id: i64,
    pub uploader_name: String,
    pub category: String,
    pub object_name: String,
    pub observer_name: String,
    /// When the observation was made; drives feed ordering.
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub location: Option<String>,
    pub filter: Option<String>,
    pub telescope: Option<String>,
    pub camera: Option<String>,
    pub allow_scientific_use: bool,
    /// SHA-256 of the stored bytes, lowercase hex.
    pub signature_sha256: Option<String>,
    /// 64-bit frequency-domain fingerprint, 16 hex chars.
    pub signature_phash: Option<String>,
    /// 64-bit gradient fingerprint, 16 hex chars.
    pub signature_dhash: Option<String>,
    /// Short hex id embedded in the stored file's comment segment.
    pub watermark_hash: Option<String>,
}

impl ImageRecord {
    /// Position of this record in the feed's strict total order.
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            observed_at: self.observed_at,
            id: self.id,
        }
    }
}

/// Sort position of an image in the feed ordering: observation timestamp with
/// the id as tie-breaker. Timestamps are not unique, so the id is required for
/// a strict total order; without it, equal timestamps could skip or duplicate
/// items across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    pub observed_at: DateTime<Utc>,
    pub id: i64,
}

/// Read-only provenance view returned by the verification service.
///
/// Built from an [`ImageRecord`] at the serialization boundary; the persisted
/// record is never decorated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub image_id: i64,
    pub uploader: String,
    pub object_name: String,
    pub observer_name: String,
    pub category: String,
    pub observed_at: DateTime<Utc>,
    pub telescope: Option<String>,
    pub camera: Option<String>,
    pub filter: Option<String>,
    pub location: Option<String>,
    pub allow_scientific_use: bool,
}

impl Provenance {
    pub fn from_record(record: &ImageRecord) -> Self {
        Self {
            image_id: record.id,
            uploader: record.uploader_name.clone(),
            object_name: record.object_name.clone(),
            observer_name: record.observer_name.clone(),
            category: record.category.clone(),
            observed_at: record.observed_at,
            telescope: record.telescope.clone(),
            camera: record.camera.clone(),
            filter: record.filter.clone(),
            location: record.location.clone(),
            allow_scientific_use: record.allow_scientific_use,
        }
    }
}

/// Filter for an ordered catalog query.
///
/// When `liked_ids` or `uploader_ids` is present the query matches images in
/// either set (logical OR); when both are absent it matches the whole catalog.
/// Results are always ordered newest-first by [`SortKey`], descending.
#[derive(Debug, Clone, Default)]
pub struct ImageQuery {
    pub liked_ids: Option<HashSet<i64>>,
    pub uploader_ids: Option<HashSet<i64>>,
    pub exclude_ids: HashSet<i64>,
    pub min_observed_at: Option<DateTime<Utc>>,
    /// Resume strictly after this position in the descending order.
    pub before: Option<SortKey>,
    pub limit: usize,
}

/// Catalog queries the core engines depend on.
pub trait CatalogStore {
    /// Look up the image whose stored bytes hash to `sha256_hex` exactly.
    fn find_by_content_hash(&self, sha256_hex: &str) -> Result<Option<ImageRecord>>;

    /// All images carrying both perceptual fingerprints.
    fn scan_with_fingerprints(&self) -> Result<Vec<ImageRecord>>;

    /// Filtered query, ordered newest-first with id tie-break, limited.
    fn query_images(&self, query: &ImageQuery) -> Result<Vec<ImageRecord>>;

    /// Uniform random sample of up to `limit` images outside `exclude`.
    ///
    /// The draw must not be seeded from viewer identity; the caller supplies
    /// the random source so tests can make it deterministic.
    fn random_sample(
        &self,
        exclude: &HashSet<i64>,
        limit: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ImageRecord>>;
}

/// Per-viewer ledger of served image ids.
pub trait SeenStore {
    /// Most recent `max_ids` entries within the retention window
    /// (`retention_days` of 0 means unbounded).
    fn seen_lookup(
        &self,
        viewer_id: i64,
        retention_days: u32,
        max_ids: usize,
        now: DateTime<Utc>,
    ) -> Result<HashSet<i64>>;

    /// Record served ids. Idempotent per (viewer, image): re-seeing an image
    /// leaves the original entry untouched.
    fn seen_upsert(&mut self, viewer_id: i64, image_ids: &[i64], now: DateTime<Utc>) -> Result<()>;

    /// Drop entries older than the retention window. Returns how many were
    /// removed.
    fn seen_prune(&mut self, viewer_id: i64, retention_days: u32, now: DateTime<Utc>)
        -> Result<usize>;
}

fn retention_cutoff(retention_days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if retention_days == 0 {
        return None;
    }
    Some(now - chrono::Duration::days(i64::from(retention_days)))
}

/// In-memory catalog and seen ledger.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    images: BTreeMap<i64, ImageRecord>,
    /// (viewer_id, image_id) -> first time the image was served.
    seen: BTreeMap<(i64, i64), DateTime<Utc>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ImageRecord) {
        self.images.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&ImageRecord> {
        self.images.get(&id)
    }

    /// Number of ledger entries for one viewer.
    pub fn seen_entry_count(&self, viewer_id: i64) -> usize {
        self.seen.keys().filter(|(v, _)| *v == viewer_id).count()
    }

    /// When the viewer first saw the image, if ever.
    pub fn seen_at(&self, viewer_id: i64, image_id: i64) -> Option<DateTime<Utc>> {
        self.seen.get(&(viewer_id, image_id)).copied()
    }
}

impl CatalogStore for MemoryCatalog {
    fn find_by_content_hash(&self, sha256_hex: &str) -> Result<Option<ImageRecord>> {
        Ok(self
            .images
            .values()
            .find(|record| record.signature_sha256.as_deref() == Some(sha256_hex))
            .cloned())
    }

    fn scan_with_fingerprints(&self) -> Result<Vec<ImageRecord>> {
        Ok(self
            .images
            .values()
            .filter(|record| record.signature_phash.is_some() && record.signature_dhash.is_some())
            .cloned()
            .collect())
    }

    fn query_images(&self, query: &ImageQuery) -> Result<Vec<ImageRecord>> {
        let mut matches: Vec<ImageRecord> = self
            .images
            .values()
            .filter(|record| {
                let in_liked = query
                    .liked_ids
                    .as_ref()
                    .is_some_and(|ids| ids.contains(&record.id));
                let in_uploaders = query
                    .uploader_ids
                    .as_ref()
                    .is_some_and(|ids| ids.contains(&record.user_id));
                if query.liked_ids.is_some() || query.uploader_ids.is_some() {
                    in_liked || in_uploaders
                } else {
                    true
                }
            })
            .filter(|record| !query.exclude_ids.contains(&record.id))
            .filter(|record| {
                query
                    .min_observed_at
                    .is_none_or(|cutoff| record.observed_at >= cutoff)
            })
            .filter(|record| query.before.is_none_or(|point| record.sort_key() < point))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        matches.truncate(query.limit);
        Ok(matches)
    }

    fn random_sample(
        &self,
        exclude: &HashSet<i64>,
        limit: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ImageRecord>> {
        let mut ids: Vec<i64> = self
            .images
            .keys()
            .filter(|id| !exclude.contains(id))
            .copied()
            .collect();
        ids.shuffle(rng);
        ids.truncate(limit);
        Ok(ids
            .into_iter()
            .filter_map(|id| self.images.get(&id).cloned())
            .collect())
    }
}

impl SeenStore for MemoryCatalog {
    fn seen_lookup(
        &self,
        viewer_id: i64,
        retention_days: u32,
        max_ids: usize,
        now: DateTime<Utc>,
    ) -> Result<HashSet<i64>> {
        let cutoff = retention_cutoff(retention_days, now);
        let mut entries: Vec<(DateTime<Utc>, i64)> = self
            .seen
            .iter()
            .filter(|((viewer, _), _)| *viewer == viewer_id)
            .filter(|(_, seen_at)| cutoff.is_none_or(|c| **seen_at >= c))
            .map(|((_, image_id), seen_at)| (*seen_at, *image_id))
            .collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.truncate(max_ids);
        Ok(entries.into_iter().map(|(_, image_id)| image_id).collect())
    }

    fn seen_upsert(&mut self, viewer_id: i64, image_ids: &[i64], now: DateTime<Utc>) -> Result<()> {
        for image_id in image_ids {
            self.seen.entry((viewer_id, *image_id)).or_insert(now);
        }
        Ok(())
    }

    fn seen_prune(
        &mut self,
        viewer_id: i64,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let Some(cutoff) = retention_cutoff(retention_days, now) else {
            return Ok(0);
        };
        let stale: Vec<(i64, i64)> = self
            .seen
            .iter()
            .filter(|((viewer, _), seen_at)| *viewer == viewer_id && **seen_at < cutoff)
            .map(|(key, _)| *key)
            .collect();
        let removed = stale.len();
        for key in stale {
            self.seen.remove(&key);
        }
        Ok(removed)
    }
}
