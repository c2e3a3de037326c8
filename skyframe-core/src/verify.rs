//! Verification service: prove provenance of an uploaded probe image.
//!
//! A probe either matches a stored image exactly (content hash equality),
//! approximately (both perceptual distances under their thresholds), or not
//! at all. "No match" is a successful answer with `valid: false`, never an
//! error; only undecodable probe bytes fail, and they fail before any catalog
//! lookup happens.
//!
//! The similarity scan is O(N) in catalog size by design; an index structure
//! is a scaling concern for later, not a correctness one.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{CatalogStore, Provenance};
use crate::config::VerifyConfig;
use crate::error::Result;
use crate::signature::{hamming_distance, ImageSignature};

/// Outcome of a verification probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// True only on an exact content-hash match.
    pub valid: bool,
    /// SHA-256 of the probe bytes, lowercase hex.
    pub computed_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhash: Option<String>,
    /// Present when similarity was consulted: whether a near-duplicate
    /// qualified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phash_distance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhash_distance: Option<u32>,
    /// Provenance of the exact or best similar match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

/// Verify probe bytes against the catalog.
pub fn verify_bytes<C: CatalogStore>(
    catalog: &C,
    probe: &[u8],
    config: &VerifyConfig,
) -> Result<VerificationOutcome> {
    // Decode failures surface here, before any lookup.
    let signature = ImageSignature::from_bytes(probe)?;

    if let Some(record) = catalog.find_by_content_hash(&signature.sha256)? {
        info!(image_id = record.id, "verification probe matched exactly");
        return Ok(VerificationOutcome {
            valid: true,
            computed_hash: signature.sha256,
            phash: Some(signature.phash),
            dhash: Some(signature.dhash),
            similar: None,
            phash_distance: None,
            dhash_distance: None,
            provenance: Some(Provenance::from_record(&record)),
        });
    }

    if !config.similarity_enabled {
        return Ok(VerificationOutcome {
            valid: false,
            computed_hash: signature.sha256,
            phash: None,
            dhash: None,
            similar: None,
            phash_distance: None,
            dhash_distance: None,
            provenance: None,
        });
    }

    let mut best: Option<(Provenance, u32, u32)> = None;
    let mut best_score: Option<(u32, i64)> = None;
    for record in catalog.scan_with_fingerprints()? {
        let Some(phash_dist) = record
            .signature_phash
            .as_deref()
            .and_then(|stored| hamming_distance(&signature.phash, stored))
        else {
            continue;
        };
        let Some(dhash_dist) = record
            .signature_dhash
            .as_deref()
            .and_then(|stored| hamming_distance(&signature.dhash, stored))
        else {
            continue;
        };
        if phash_dist > config.phash_max_distance || dhash_dist > config.dhash_max_distance {
            continue;
        }
        // Minimize the combined distance; equal scores break toward the
        // lowest image id so the answer is independent of scan order.
        let score = (phash_dist + dhash_dist, record.id);
        if best_score.is_none_or(|current| score < current) {
            best_score = Some(score);
            best = Some((Provenance::from_record(&record), phash_dist, dhash_dist));
        }
    }

    match best {
        Some((provenance, phash_dist, dhash_dist)) => {
            info!(
                image_id = provenance.image_id,
                phash_dist, dhash_dist, "verification probe matched approximately"
            );
            Ok(VerificationOutcome {
                valid: false,
                computed_hash: signature.sha256,
                phash: Some(signature.phash),
                dhash: Some(signature.dhash),
                similar: Some(true),
                phash_distance: Some(phash_dist),
                dhash_distance: Some(dhash_dist),
                provenance: Some(provenance),
            })
        }
        None => {
            debug!("verification probe matched nothing");
            Ok(VerificationOutcome {
                valid: false,
                computed_hash: signature.sha256,
                phash: Some(signature.phash),
                dhash: Some(signature.dhash),
                similar: Some(false),
                phash_distance: None,
                dhash_distance: None,
                provenance: None,
            })
        }
    }
}
