//! Engine tunables with startup-time validation.
//!
//! Every knob mirrors a deployment setting of the hosting application. The
//! validators reject nonsensical values once, at startup, so the engines never
//! have to re-check them per request.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkyFrameError};

/// Fingerprints are 64 bits, so no Hamming distance can exceed this.
pub const MAX_FINGERPRINT_DISTANCE: u32 = 64;

/// Feed selection tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Number of images per feed page.
    pub page_size: usize,
    /// Freshness window for prioritized candidates, in days (0 = unbounded).
    pub fresh_days: u32,
    /// Target share of prioritized items per page, in percent (clamped to 0-100).
    pub prioritized_pct: u8,
    /// Candidate pools are oversampled to `page_size * candidate_multiplier`
    /// so the blender can skip capped uploaders without starving the page.
    pub candidate_multiplier: usize,
    /// Maximum items per uploader in one page (0 = unconstrained).
    pub max_per_uploader: usize,
    /// Maximum consecutive items from the same uploader (0 = unconstrained).
    pub max_consecutive: usize,
    /// Track served image ids per viewer to suppress repeats.
    pub seen_enabled: bool,
    /// Seen-ledger retention window in days (0 = keep forever).
    pub seen_retention_days: u32,
    /// Most recent seen entries consulted per viewer.
    pub seen_max_ids: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            fresh_days: 30,
            prioritized_pct: 40,
            candidate_multiplier: 3,
            max_per_uploader: 3,
            max_consecutive: 2,
            seen_enabled: true,
            seen_retention_days: 14,
            seen_max_ids: 500,
        }
    }
}

impl FeedConfig {
    /// Reject values the blending algorithm cannot work with.
    ///
    /// `prioritized_pct` is not an error case: out-of-range values are clamped
    /// at request time.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SkyFrameError::Configuration(
                "feed page_size must be at least 1".into(),
            ));
        }
        if self.candidate_multiplier == 0 {
            return Err(SkyFrameError::Configuration(
                "feed candidate_multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Verification service tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Maximum phash Hamming distance for a near-duplicate candidate.
    pub phash_max_distance: u32,
    /// Maximum dhash Hamming distance for a near-duplicate candidate.
    pub dhash_max_distance: u32,
    /// When false, verification answers exact-match only.
    pub similarity_enabled: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            phash_max_distance: 10,
            dhash_max_distance: 10,
            similarity_enabled: true,
        }
    }
}

impl VerifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.phash_max_distance > MAX_FINGERPRINT_DISTANCE
            || self.dhash_max_distance > MAX_FINGERPRINT_DISTANCE
        {
            return Err(SkyFrameError::Configuration(format!(
                "fingerprint distance thresholds cannot exceed {} bits",
                MAX_FINGERPRINT_DISTANCE
            )));
        }
        Ok(())
    }
}

/// Watermark rendering tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Alpha of the embedded payload text, out of 255.
    pub opacity: u8,
    /// Distance from the bottom-right corner, in pixels.
    pub padding: u32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            opacity: 12,
            padding: 12,
        }
    }
}
