//! Watermark engine: attributable, near-invisible provenance marking.
//!
//! Applying a watermark does three things in one step:
//!
//! 1. Builds a payload of the sanitized owner name and the current instant
//!    (`"{owner}|{YYYY-MM-DD HH:MM:SS}"`).
//! 2. Composites the payload as very low-alpha text into the bottom-right
//!    corner of the image, then flattens to an opaque JPEG.
//! 3. Derives a 16-hex-char watermark id from the payload and embeds it in a
//!    JPEG comment segment so it survives independently of any database.
//!
//! Re-watermarking rewrites the pixel bytes, which invalidates the stored
//! signatures; [`watermark_and_sign`] exists so the watermark and the
//! signature triple are always computed together over the same bytes.

mod comment;
mod glyphs;

use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::WatermarkConfig;
use crate::error::{Result, SkyFrameError};
use crate::signature::ImageSignature;

pub use comment::{COMMENT_PREFIX, WATERMARK_ID_LEN};

/// Extensions accepted for upload and verification probes.
const ALLOWED_IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// JPEG quality for the persisted, watermarked image.
const JPEG_QUALITY: u8 = 90;

/// Fallback owner segment when sanitization strips everything.
const DEFAULT_OWNER: &str = "observer";

/// Result of applying a watermark.
#[derive(Debug, Clone)]
pub struct AppliedWatermark {
    /// Final JPEG bytes, comment segment included. These are the bytes to
    /// persist and to compute signatures over.
    pub jpeg_bytes: Vec<u8>,
    /// First 16 hex chars of the SHA-256 of the payload string.
    pub watermark_hash: String,
}

/// A watermarked upload with its signature triple, computed atomically.
#[derive(Debug, Clone)]
pub struct WatermarkedUpload {
    pub jpeg_bytes: Vec<u8>,
    pub watermark_hash: String,
    pub signature: ImageSignature,
}

/// Reject filenames whose extension is outside the allowed set. Runs before
/// any decode attempt.
pub fn ensure_supported(filename: &str) -> Result<()> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ALLOWED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(SkyFrameError::UnsupportedFormat(format!(
            "extension {extension:?} is not in the allowed set"
        )))
    }
}

/// Restrict an owner identifier to letters, digits, space, underscore and
/// hyphen. An empty result falls back to a generic label so the payload never
/// loses its shape.
pub fn sanitize_owner(owner: &str) -> String {
    let cleaned: String = owner
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    if cleaned.is_empty() {
        DEFAULT_OWNER.to_string()
    } else {
        cleaned
    }
}

/// Watermark id for a payload string: first 16 hex chars of its SHA-256.
pub fn watermark_id_for_payload(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..WATERMARK_ID_LEN].to_string()
}

/// Apply a watermark stamped with the current time.
pub fn apply(
    image: &DynamicImage,
    owner: &str,
    config: &WatermarkConfig,
) -> Result<AppliedWatermark> {
    apply_at(image, owner, Utc::now(), config)
}

/// Apply a watermark stamped with an explicit instant (second granularity).
pub fn apply_at(
    image: &DynamicImage,
    owner: &str,
    timestamp: DateTime<Utc>,
    config: &WatermarkConfig,
) -> Result<AppliedWatermark> {
    let payload = format!(
        "{}|{}",
        sanitize_owner(owner),
        timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    let watermark_hash = watermark_id_for_payload(&payload);

    let mut canvas = image.to_rgb8();
    draw_payload(&mut canvas, &payload, config);

    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    DynamicImage::ImageRgb8(canvas)
        .write_with_encoder(encoder)
        .map_err(|e| SkyFrameError::InvalidImage(e.to_string()))?;

    let comment = format!("{COMMENT_PREFIX}{watermark_hash}");
    let jpeg_bytes = comment::insert_jpeg_comment(&buffer.into_inner(), &comment)
        .ok_or_else(|| SkyFrameError::InvalidImage("JPEG encoder produced no SOI".into()))?;

    debug!(watermark_hash, "applied watermark");
    Ok(AppliedWatermark {
        jpeg_bytes,
        watermark_hash,
    })
}

/// Decode uploaded bytes and apply a watermark.
pub fn apply_to_bytes(
    bytes: &[u8],
    owner: &str,
    config: &WatermarkConfig,
) -> Result<AppliedWatermark> {
    let image =
        image::load_from_memory(bytes).map_err(|e| SkyFrameError::InvalidImage(e.to_string()))?;
    apply(&image, owner, config)
}

/// Watermark an image and compute its signature triple over the final bytes.
///
/// This is the single atomic step of the upload path. Computing signatures
/// before watermarking, or re-watermarking without re-signing, leaves an
/// inconsistent (watermark_hash, content_hash) pair on the record.
pub fn watermark_and_sign(
    image: &DynamicImage,
    owner: &str,
    config: &WatermarkConfig,
) -> Result<WatermarkedUpload> {
    let applied = apply(image, owner, config)?;
    let signature = ImageSignature::from_bytes(&applied.jpeg_bytes)?;
    Ok(WatermarkedUpload {
        jpeg_bytes: applied.jpeg_bytes,
        watermark_hash: applied.watermark_hash,
        signature,
    })
}

/// Recover the embedded watermark id from persisted bytes.
///
/// Absence is a valid outcome, not an error: files with no comment segment,
/// corrupt segments, or foreign formats all yield `None`.
pub fn extract(bytes: &[u8]) -> Option<String> {
    comment::extract_comment_token(bytes)
}

/// Composite the payload text into the bottom-right corner, alpha-blending
/// white glyph pixels over the original image.
fn draw_payload(canvas: &mut RgbImage, payload: &str, config: &WatermarkConfig) {
    let (width, height) = canvas.dimensions();
    let text_width = payload.chars().count() as u32 * glyphs::GLYPH_ADVANCE;
    let origin_x = width.saturating_sub(config.padding + text_width);
    let origin_y = height.saturating_sub(config.padding + glyphs::GLYPH_HEIGHT);
    let alpha = u16::from(config.opacity);

    for (index, ch) in payload.chars().enumerate() {
        let Some(rows) = glyphs::glyph(ch) else {
            continue;
        };
        let glyph_x = origin_x + index as u32 * glyphs::GLYPH_ADVANCE;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..glyphs::GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let x = glyph_x + col;
                let y = origin_y + row as u32;
                if x >= width || y >= height {
                    continue;
                }
                let pixel = canvas.get_pixel_mut(x, y);
                for channel in pixel.0.iter_mut() {
                    let blended = (255 * alpha + u16::from(*channel) * (255 - alpha)) / 255;
                    *channel = blended as u8;
                }
            }
        }
    }
}
