//! SkyFrame Core - feed ranking and content authentication for an
//! astrophotography community.
//!
//! This crate implements the two hard surfaces of the SkyFrame platform:
//!
//! - **Content authentication**: SHA-256 content hashes, 64-bit perceptual
//!   fingerprints (frequency-domain and gradient-based), attributable
//!   low-opacity watermarks with a recoverable embedded id, and a
//!   verification service answering exact and near-duplicate provenance
//!   queries.
//! - **Feed ranking**: blending of prioritized content (liked images,
//!   followed uploaders) with random discovery content under per-uploader
//!   diversity caps, cursor-based pagination, and a per-viewer seen ledger.
//!
//! The surrounding web application (routes, sessions, templates, migrations)
//! stays outside this crate and reaches the engines through the
//! [`CatalogStore`] and [`SeenStore`] collaborator traits.
//!
//! # Example
//!
//! ```no_run
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use skyframe_core::{build_feed_selection, FeedConfig, FeedRequest, MemoryCatalog};
//!
//! # fn example() -> skyframe_core::Result<()> {
//! let catalog = MemoryCatalog::new();
//! let config = FeedConfig::default();
//! config.validate()?;
//!
//! let request = FeedRequest {
//!     viewer_id: Some(7),
//!     ..FeedRequest::default()
//! };
//! let mut rng = StdRng::seed_from_u64(1);
//! let page = build_feed_selection(
//!     &catalog,
//!     &catalog,
//!     &request,
//!     &config,
//!     &mut rng,
//!     chrono::Utc::now(),
//! )?;
//! assert!(page.images.len() <= config.page_size);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod feed;
pub mod signature;
pub mod verify;
pub mod watermark;

// Re-export the main types for convenience
pub use catalog::{
    CatalogStore, ImageQuery, ImageRecord, MemoryCatalog, Provenance, SeenStore, SortKey,
};
pub use config::{FeedConfig, VerifyConfig, WatermarkConfig};
pub use error::{Result, SkyFrameError};
pub use feed::{
    build_feed_selection, format_feed_cursor, parse_feed_cursor, persist_seen_for_feed,
    FeedCursor, FeedRequest, FeedSelection,
};
pub use signature::{dhash64, hamming_distance, phash64, sha256_hex, ImageSignature};
pub use verify::{verify_bytes, VerificationOutcome};
pub use watermark::{
    apply as apply_watermark, extract as extract_watermark, watermark_and_sign, AppliedWatermark,
    WatermarkedUpload,
};
